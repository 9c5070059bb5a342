//! Mapping backend failures onto [`ExecutionErrorKind`].
//!
//! One function per backend. Typed errors are matched first; message text
//! is only consulted for wasmtime errors that carry no type of their own.

use std::any::Any;
use std::sync::atomic::{AtomicU8, Ordering};

use gobox_interp::InterpError;

use super::{ExecutionError, ExecutionErrorKind};

/// Why the host stopped a run, if it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StopReason {
    Running = 0,
    Deadline = 1,
    Canceled = 2,
}

/// Shared between the watchdog and the classifier. First writer wins.
#[derive(Debug, Default)]
pub struct StopFlag(AtomicU8);

impl StopFlag {
    pub fn new() -> Self {
        Self(AtomicU8::new(StopReason::Running as u8))
    }

    /// Record `reason` unless another reason is already recorded.
    pub fn stop(&self, reason: StopReason) -> bool {
        self.0
            .compare_exchange(
                StopReason::Running as u8,
                reason as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub fn reason(&self) -> StopReason {
        match self.0.load(Ordering::SeqCst) {
            1 => StopReason::Deadline,
            2 => StopReason::Canceled,
            _ => StopReason::Running,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.reason() != StopReason::Running
    }
}

/// Error for a run the host stopped.
pub fn stopped(reason: StopReason, timeout: std::time::Duration) -> ExecutionError {
    match reason {
        StopReason::Canceled => ExecutionError::canceled(),
        _ => ExecutionError::timeout(timeout),
    }
}

/// Classify a failed wasm instantiation or `_start` call.
///
/// Returns `Ok(())` for a WASI `proc_exit(0)`.
pub fn classify_wasm(
    err: &anyhow::Error,
    reason: StopReason,
    timeout: std::time::Duration,
) -> Result<(), ExecutionError> {
    if let Some(exit) = err.downcast_ref::<wasmtime_wasi::I32Exit>() {
        return match exit.0 {
            0 => Ok(()),
            code => Err(ExecutionError::new(
                ExecutionErrorKind::Runtime,
                format!("exit status {code}"),
            )),
        };
    }

    if let Some(trap) = err.downcast_ref::<wasmtime::Trap>() {
        return Err(match trap {
            wasmtime::Trap::Interrupt => stopped(reason, timeout),
            wasmtime::Trap::MemoryOutOfBounds | wasmtime::Trap::HeapMisaligned => {
                ExecutionError::new(ExecutionErrorKind::Memory, trap.to_string())
            }
            other => ExecutionError::new(ExecutionErrorKind::Trap, other.to_string()),
        });
    }

    let message = format!("{err:#}");
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("forcing trap when growing memory")
        || lowered.contains("exceeds memory limits")
        || lowered.contains("memory growth failure")
    {
        return Err(ExecutionError::new(ExecutionErrorKind::Memory, message));
    }
    if lowered.contains("write beyond capacity") {
        return Err(ExecutionError::new(
            ExecutionErrorKind::Runtime,
            "output limit exceeded",
        ));
    }
    if reason != StopReason::Running {
        return Err(stopped(reason, timeout));
    }
    Err(ExecutionError::new(ExecutionErrorKind::Runtime, message))
}

/// Classify an interpreter run. A host-stopped run is classified by the
/// stop reason whatever the evaluator reported.
pub fn classify_interp(
    outcome: Result<(), InterpError>,
    reason: StopReason,
    timeout: std::time::Duration,
) -> Result<(), ExecutionError> {
    if reason != StopReason::Running {
        return Err(stopped(reason, timeout));
    }
    let err = match outcome {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    Err(match err {
        InterpError::Interrupted => stopped(reason, timeout),
        InterpError::BudgetExhausted(_) => {
            ExecutionError::new(ExecutionErrorKind::Timeout, err.to_string())
        }
        InterpError::Panic { .. } | InterpError::StackOverflow(_) => {
            ExecutionError::new(ExecutionErrorKind::Trap, err.to_string())
        }
        InterpError::Exit(_) | InterpError::Parse(_) | InterpError::Runtime { .. } => {
            ExecutionError::new(ExecutionErrorKind::Runtime, err.to_string())
        }
    })
}

/// A Rust panic caught from the evaluation thread. As with
/// [`classify_interp`], a set stop reason takes precedence.
pub fn classify_panic(
    payload: Box<dyn Any + Send>,
    reason: StopReason,
    timeout: std::time::Duration,
) -> ExecutionError {
    if reason != StopReason::Running {
        return stopped(reason, timeout);
    }
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    ExecutionError::new(
        ExecutionErrorKind::Trap,
        format!("interpreter panic: {detail}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const LIMIT: Duration = Duration::from_millis(100);

    #[test]
    fn stop_flag_keeps_first_reason() {
        let flag = StopFlag::new();
        assert!(!flag.is_stopped());
        assert!(flag.stop(StopReason::Canceled));
        assert!(!flag.stop(StopReason::Deadline));
        assert_eq!(flag.reason(), StopReason::Canceled);
    }

    #[test]
    fn exit_codes() {
        let ok = anyhow::Error::new(wasmtime_wasi::I32Exit(0));
        assert!(classify_wasm(&ok, StopReason::Running, LIMIT).is_ok());
        let bad = anyhow::Error::new(wasmtime_wasi::I32Exit(3));
        let err = classify_wasm(&bad, StopReason::Running, LIMIT).unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::Runtime);
        assert_eq!(err.message, "exit status 3");
    }

    #[test]
    fn typed_traps() {
        let cases = [
            (wasmtime::Trap::UnreachableCodeReached, ExecutionErrorKind::Trap),
            (wasmtime::Trap::MemoryOutOfBounds, ExecutionErrorKind::Memory),
            (wasmtime::Trap::StackOverflow, ExecutionErrorKind::Trap),
        ];
        for (trap, kind) in cases {
            let err = anyhow::Error::new(trap);
            assert_eq!(classify_wasm(&err, StopReason::Running, LIMIT).unwrap_err().kind, kind);
        }
    }

    #[test]
    fn interrupt_uses_stop_reason() {
        let err = anyhow::Error::new(wasmtime::Trap::Interrupt);
        assert_eq!(
            classify_wasm(&err, StopReason::Deadline, LIMIT).unwrap_err().kind,
            ExecutionErrorKind::Timeout
        );
        assert_eq!(
            classify_wasm(&err, StopReason::Canceled, LIMIT).unwrap_err().kind,
            ExecutionErrorKind::Canceled
        );
    }

    #[test]
    fn untyped_memory_errors_fall_back_to_text() {
        let err = anyhow::anyhow!("forcing trap when growing memory to 196608 bytes");
        assert_eq!(
            classify_wasm(&err, StopReason::Running, LIMIT).unwrap_err().kind,
            ExecutionErrorKind::Memory
        );
        let err = anyhow::anyhow!("something else entirely");
        assert_eq!(
            classify_wasm(&err, StopReason::Running, LIMIT).unwrap_err().kind,
            ExecutionErrorKind::Runtime
        );
    }

    #[test]
    fn interpreter_outcomes() {
        let kind = |e: InterpError, r| classify_interp(Err(e), r, LIMIT).unwrap_err().kind;
        assert_eq!(
            kind(InterpError::Panic { message: "panic: boom".into() }, StopReason::Running),
            ExecutionErrorKind::Trap
        );
        assert_eq!(kind(InterpError::StackOverflow(10), StopReason::Running), ExecutionErrorKind::Trap);
        assert_eq!(kind(InterpError::BudgetExhausted(5), StopReason::Running), ExecutionErrorKind::Timeout);
        assert_eq!(kind(InterpError::Interrupted, StopReason::Canceled), ExecutionErrorKind::Canceled);
        assert_eq!(kind(InterpError::Exit(2), StopReason::Running), ExecutionErrorKind::Runtime);
        // A native call refused after the deadline surfaces as a runtime
        // error inside the guest; the stop reason still wins.
        assert_eq!(
            kind(InterpError::Runtime { message: "x".into() }, StopReason::Deadline),
            ExecutionErrorKind::Timeout
        );
        assert!(classify_interp(Ok(()), StopReason::Running, LIMIT).is_ok());
        assert!(classify_interp(Ok(()), StopReason::Deadline, LIMIT).is_err());
    }

    #[test]
    fn rust_panics_are_traps() {
        let err = classify_panic(Box::new("index out of bounds"), StopReason::Running, LIMIT);
        assert_eq!(err.kind, ExecutionErrorKind::Trap);
        assert_eq!(err.message, "interpreter panic: index out of bounds");
        let err = classify_panic(Box::new(String::from("owned")), StopReason::Running, LIMIT);
        assert!(err.message.ends_with("owned"));
    }

    #[test]
    fn panic_after_stop_keeps_the_stop_reason() {
        let err = classify_panic(Box::new("late"), StopReason::Deadline, LIMIT);
        assert_eq!(err.kind, ExecutionErrorKind::Timeout);
        let err = classify_panic(Box::new("late"), StopReason::Canceled, LIMIT);
        assert_eq!(err.kind, ExecutionErrorKind::Canceled);
    }
}
