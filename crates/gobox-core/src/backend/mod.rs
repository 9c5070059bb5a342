//! Execution backends and their shared result type.
//!
//! Every execution call returns an [`ExecutionResult`], including failed
//! ones; output captured before the failure is kept.

pub mod classify;
pub mod interpreted;
pub mod wasm;

use std::time::Duration;

use serde::Serialize;

/// Why an execution did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    /// Wall-clock deadline or step budget ran out.
    Timeout,
    /// The caller's cancellation token fired.
    Canceled,
    /// Memory ceiling hit or out-of-bounds access.
    Memory,
    /// Guest panic, illegal instruction or stack overflow.
    Trap,
    Runtime,
}

impl ExecutionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionErrorKind::Timeout => "timeout",
            ExecutionErrorKind::Canceled => "canceled",
            ExecutionErrorKind::Memory => "memory",
            ExecutionErrorKind::Trap => "trap",
            ExecutionErrorKind::Runtime => "runtime",
        }
    }
}

impl std::fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
}

impl ExecutionError {
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            ExecutionErrorKind::Timeout,
            format!("execution exceeded timeout of {limit:?}"),
        )
    }

    pub fn canceled() -> Self {
        Self::new(ExecutionErrorKind::Canceled, "execution canceled")
    }
}

/// Outcome of one execution. Serializes to exactly `stdout`, `stderr`,
/// `duration`, `success` and `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub success: bool,
    /// Empty on success.
    pub error: String,
    #[serde(skip)]
    kind: Option<ExecutionErrorKind>,
}

impl ExecutionResult {
    pub fn succeeded(stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            stdout,
            stderr,
            duration,
            success: true,
            error: String::new(),
            kind: None,
        }
    }

    pub fn failed(stdout: String, stderr: String, duration: Duration, err: ExecutionError) -> Self {
        Self {
            stdout,
            stderr,
            duration,
            success: false,
            error: err.to_string(),
            kind: Some(err.kind),
        }
    }

    pub(crate) fn from_outcome(
        stdout: String,
        stderr: String,
        duration: Duration,
        outcome: Result<(), ExecutionError>,
    ) -> Self {
        match outcome {
            Ok(()) => Self::succeeded(stdout, stderr, duration),
            Err(err) => Self::failed(stdout, stderr, duration, err),
        }
    }

    /// Classified failure, `None` on success.
    pub fn kind(&self) -> Option<ExecutionErrorKind> {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_fields_are_exact() {
        let result = ExecutionResult::failed(
            "partial".into(),
            String::new(),
            Duration::from_millis(5),
            ExecutionError::canceled(),
        );
        let json = serde_json::to_value(&result).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["duration", "error", "stderr", "stdout", "success"]);
        assert_eq!(json["error"], "canceled: execution canceled");
        assert_eq!(result.kind(), Some(ExecutionErrorKind::Canceled));
    }

    #[test]
    fn success_has_empty_error_and_no_kind() {
        let result = ExecutionResult::succeeded("ok\n".into(), String::new(), Duration::ZERO);
        assert!(result.success);
        assert!(result.error.is_empty());
        assert_eq!(result.kind(), None);
    }
}
