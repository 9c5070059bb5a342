//! End-to-end pipeline: raw generated text in, [`ExecutionResult`] out.
//!
//! ```text
//! raw text ─ preprocess ─ validate_structure ─ validate ─┬─ compile ─ wasm backend
//!                                                        └─ interpreted backend
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::backend::interpreted::InterpretedBackend;
use crate::backend::wasm::CompiledSandboxBackend;
use crate::backend::ExecutionResult;
use crate::bridge::HostFunctionBridge;
use crate::cache::CompilationCache;
use crate::compiler::toolchain::{TinyGo, Toolchain};
use crate::compiler::Compiler;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::obs::{self, ExecutionSpan};
use crate::preprocess::{extract_code, preprocess, validate_structure};
use crate::source::SourceUnit;
use crate::validator::Validator;

const COMPILED: &str = "compiled";
const INTERPRETED: &str = "interpreted";

pub struct SandboxEngine {
    config: EngineConfig,
    validator: Validator,
    compiler: Compiler,
    compiled: CompiledSandboxBackend,
    interpreted: InterpretedBackend,
}

impl SandboxEngine {
    pub fn new(config: EngineConfig, toolchain: Arc<dyn Toolchain>) -> Self {
        let validator = Validator::new(config.validation.clone().into());
        let compiler = Compiler::new(toolchain, CompilationCache::new(config.cache));
        let compiled =
            CompiledSandboxBackend::new(config.limits, config.interpreter.output_cap_bytes);
        let interpreted = InterpretedBackend::new(config.limits, config.interpreter.clone());
        Self {
            config,
            validator,
            compiler,
            compiled,
            interpreted,
        }
    }

    /// Engine driving the configured TinyGo binary.
    pub fn with_tinygo(config: EngineConfig) -> Self {
        let toolchain = Arc::new(TinyGo::new(config.toolchain.clone()));
        Self::new(config, toolchain)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn compiled_backend(&self) -> &CompiledSandboxBackend {
        &self.compiled
    }

    pub fn interpreted_backend(&self) -> &InterpretedBackend {
        &self.interpreted
    }

    pub async fn run_compiled(&self, raw: &str) -> Result<ExecutionResult, EngineError> {
        self.run_compiled_cancellable(raw, &CancellationToken::new())
            .await
    }

    pub async fn run_compiled_cancellable(
        &self,
        raw: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let exec = ExecutionSpan::new(COMPILED);
        async {
            // No bridge exists in the compiled sandbox, so nothing to rewrite.
            let unit = self.admit(extract_code(raw))?;
            obs::emit_execution_started(COMPILED, unit.len());
            let artifact = self.compiler.compile(unit).await?;
            let result = self
                .compiled
                .execute_cancellable(&artifact, None, cancel)
                .await;
            finished(COMPILED, &result);
            Ok::<_, EngineError>(result)
        }
        .instrument(exec.span().clone())
        .await
    }

    pub async fn run_interpreted(
        &self,
        raw: &str,
        bridge: Option<HostFunctionBridge>,
    ) -> Result<ExecutionResult, EngineError> {
        self.run_interpreted_cancellable(raw, bridge, &CancellationToken::new())
            .await
    }

    pub async fn run_interpreted_cancellable(
        &self,
        raw: &str,
        bridge: Option<HostFunctionBridge>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let exec = ExecutionSpan::new(INTERPRETED);
        async {
            let unit = self.admit(preprocess(raw, &self.config.interpreter.bridge_name))?;
            obs::emit_execution_started(INTERPRETED, unit.len());
            let result = self
                .interpreted
                .execute_cancellable(unit.text(), None, bridge, cancel)
                .await;
            finished(INTERPRETED, &result);
            Ok::<_, EngineError>(result)
        }
        .instrument(exec.span().clone())
        .await
    }

    /// Structure check, then the security gate.
    fn admit(&self, code: String) -> Result<SourceUnit, EngineError> {
        let checked = validate_structure(&code)
            .map_err(EngineError::from)
            .and_then(|()| self.validator.validate(&code).map_err(EngineError::from));
        if let Err(e) = &checked {
            obs::emit_validation_rejected(e);
        }
        checked.map(|()| SourceUnit::new(code))
    }
}

fn finished(backend: &str, result: &ExecutionResult) {
    obs::emit_execution_finished(
        backend,
        result.duration,
        result.success,
        result.kind().map(|k| k.as_str()),
    );
}
