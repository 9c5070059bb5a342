//! Error taxonomy for the pre-execution pipeline.
//!
//! Execution failures are not errors in this sense: every backend call
//! returns an [`ExecutionResult`](crate::ExecutionResult), and its
//! classification lives in [`crate::backend`].

use std::time::Duration;

/// Rejections from the static security gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("source is {size} bytes, exceeding the limit of {limit} bytes")]
    SizeExceeded { size: usize, limit: usize },

    #[error("source is empty")]
    Empty,

    #[error("import of {0:?} is not allowed")]
    ForbiddenImport(String),

    #[error("directive {0:?} is not allowed")]
    ForbiddenDirective(String),
}

/// The cheap entry-point check run before validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructureError {
    #[error("missing `package main` clause")]
    MissingPackageMain,

    #[error("missing `func main()` entry point")]
    MissingMainFunc,
}

/// Failures while turning source into a wasm artifact.
#[derive(Debug, thiserror::Error)]
pub enum CompilationError {
    /// The toolchain ran and rejected the program. `message` is the first
    /// diagnostic line; `diagnostics` is the full combined output.
    #[error("compilation failed: {message}")]
    ToolInvocationFailed { message: String, diagnostics: String },

    #[error("toolchain {program:?} is not installed or not in PATH")]
    ToolchainUnavailable { program: String },

    #[error("toolchain timed out after {0:?}")]
    TimedOut(Duration),

    #[error("build workspace error: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("toolchain reported success but produced no artifact")]
    MissingArtifact,
}

impl CompilationError {
    /// Full toolchain output, when there is any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            CompilationError::ToolInvocationFailed { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}

/// Loading an [`EngineConfig`](crate::EngineConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything that stops a program before a backend runs it.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("malformed program: {0}")]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Compilation(#[from] CompilationError),
}
