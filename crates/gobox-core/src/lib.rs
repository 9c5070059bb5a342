//! gobox core library
//!
//! Sandboxed execution of untrusted, machine-generated Go programs. A guest
//! program is normalized by the [`preprocess`] helpers, checked by the
//! [`validator`], and then either compiled to WASI wasm by the [`compiler`]
//! and run under wasmtime ([`backend::wasm`]), or evaluated directly by the
//! embedded interpreter ([`backend::interpreted`]). Both backends return an
//! [`ExecutionResult`].

pub mod backend;
pub mod bridge;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod obs;
pub mod pool;
pub mod preprocess;
mod scan;
pub mod source;
pub mod telemetry;
pub mod validator;

pub use backend::interpreted::InterpretedBackend;
pub use backend::wasm::CompiledSandboxBackend;
pub use backend::{ExecutionError, ExecutionErrorKind, ExecutionResult};
pub use bridge::{HostError, HostFn, HostFunctionBridge, ToolCall};
pub use cache::{CompilationCache, CompiledArtifact};
pub use compiler::toolchain::{TinyGo, ToolOutput, Toolchain};
pub use compiler::Compiler;
pub use config::{
    CacheConfig, EngineConfig, InterpreterConfig, ResourceLimits, ToolchainConfig,
    ValidationConfig,
};
pub use engine::SandboxEngine;
pub use error::{CompilationError, ConfigError, EngineError, StructureError, ValidationError};
pub use pool::InterpreterPool;
pub use preprocess::{extract_code, preprocess, rewrite_host_calls, validate_structure};
pub use source::{Digest, SourceUnit};
pub use validator::{ValidationPolicy, Validator};

/// Canonical identifier guest programs use to reach the host bridge.
pub const CANONICAL_HOST_CALL: &str = "callTool";

/// Compile a fixed pattern on first use.
pub(crate) fn static_regex(
    cell: &'static std::sync::OnceLock<regex::Regex>,
    pattern: &str,
) -> &'static regex::Regex {
    cell.get_or_init(|| {
        regex::Regex::new(pattern).unwrap_or_else(|e| panic!("invalid pattern {pattern:?}: {e}"))
    })
}
