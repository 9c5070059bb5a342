//! Interpreted backend: evaluates guest source with the embedded
//! interpreter on a dedicated thread.
//!
//! Output goes to per-call buffers, so concurrent executions never share a
//! stream. The caller's future races the evaluation against the deadline
//! and the cancellation token; on either, the interrupt flag is raised and
//! the evaluator stops at its next check point. Output captured up to then
//! is returned. No memory ceiling is enforced here.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gobox_interp::{InterpError, Interpreter, OutputBuffer, RunOptions};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::classify::{classify_interp, classify_panic, stopped, StopFlag, StopReason};
use super::{ExecutionError, ExecutionErrorKind, ExecutionResult};
use crate::bridge::HostFunctionBridge;
use crate::config::{InterpreterConfig, ResourceLimits};
use crate::pool::InterpreterPool;

/// Stack for the evaluation thread; the tree walker recurses per call.
const EVAL_STACK_BYTES: usize = 64 * 1024 * 1024;

/// How long a stopped evaluation gets to reach its next check point before
/// its result is abandoned.
const STOP_GRACE: Duration = Duration::from_millis(50);

type EvalOutcome = (Interpreter, std::thread::Result<Result<(), InterpError>>);

pub struct InterpretedBackend {
    pool: InterpreterPool,
    limits: ResourceLimits,
    config: InterpreterConfig,
}

impl Default for InterpretedBackend {
    fn default() -> Self {
        Self::new(ResourceLimits::default(), InterpreterConfig::default())
    }
}

impl InterpretedBackend {
    pub fn new(limits: ResourceLimits, config: InterpreterConfig) -> Self {
        Self {
            pool: InterpreterPool::new(config.pool_size),
            limits,
            config,
        }
    }

    pub fn pool(&self) -> &InterpreterPool {
        &self.pool
    }

    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }

    pub async fn execute(&self, source: &str, limits: Option<ResourceLimits>) -> ExecutionResult {
        self.execute_cancellable(source, limits, None, &CancellationToken::new())
            .await
    }

    pub async fn execute_with_host_functions(
        &self,
        source: &str,
        limits: Option<ResourceLimits>,
        bridge: HostFunctionBridge,
    ) -> ExecutionResult {
        self.execute_cancellable(source, limits, Some(bridge), &CancellationToken::new())
            .await
    }

    /// Must be called from within a tokio runtime; tool dispatch in
    /// `bridge` blocks on it from the evaluation thread.
    pub async fn execute_cancellable(
        &self,
        source: &str,
        limits: Option<ResourceLimits>,
        bridge: Option<HostFunctionBridge>,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let limits = limits.unwrap_or(self.limits);
        let timeout = limits.timeout();
        let started = Instant::now();

        // Bridged runs get an ephemeral instance that is never pooled.
        let pooled = bridge.is_none();
        let interp = if pooled {
            self.pool.acquire()
        } else {
            Interpreter::new()
        };

        let stdout = OutputBuffer::new(self.config.output_cap_bytes);
        let stderr = OutputBuffer::new(self.config.output_cap_bytes);
        let interrupt = Arc::new(AtomicBool::new(false));
        let mut opts = RunOptions::new()
            .stdout(stdout.clone())
            .stderr(stderr.clone())
            .interrupt(interrupt.clone())
            .max_call_depth(self.config.max_call_depth)
            .max_alloc(self.config.max_alloc);
        if let Some(steps) = self.config.max_steps {
            opts = opts.max_steps(steps);
        }
        if let Some(bridge) = bridge {
            opts.natives = bridge.into_natives(Handle::current());
        }

        let (tx, mut rx) = oneshot::channel::<EvalOutcome>();
        let source = source.to_string();
        let spawned = std::thread::Builder::new()
            .name("gobox-eval".into())
            .stack_size(EVAL_STACK_BYTES)
            .spawn(move || {
                let outcome =
                    std::panic::catch_unwind(AssertUnwindSafe(|| interp.run(&source, opts)));
                let _ = tx.send((interp, outcome));
            });
        if let Err(e) = spawned {
            return ExecutionResult::failed(
                String::new(),
                String::new(),
                started.elapsed(),
                ExecutionError::new(
                    ExecutionErrorKind::Runtime,
                    format!("failed to start evaluation thread: {e}"),
                ),
            );
        }

        let stop = StopFlag::new();
        let received = tokio::select! {
            biased;
            done = &mut rx => Some(done),
            _ = cancel.cancelled() => {
                stop.stop(StopReason::Canceled);
                None
            }
            _ = tokio::time::sleep(timeout) => {
                stop.stop(StopReason::Deadline);
                None
            }
        };
        let received = match received {
            Some(done) => done.ok(),
            None => {
                interrupt.store(true, Ordering::SeqCst);
                debug!(reason = ?stop.reason(), "interrupting interpreted guest");
                tokio::time::timeout(STOP_GRACE, rx)
                    .await
                    .ok()
                    .and_then(Result::ok)
            }
        };

        let outcome = match received {
            Some((interp, Ok(run))) => {
                if pooled && !stop.is_stopped() {
                    self.pool.release(interp);
                }
                classify_interp(run, stop.reason(), timeout)
            }
            Some((_, Err(payload))) => {
                warn!(reason = ?stop.reason(), "interpreter panicked");
                Err(classify_panic(payload, stop.reason(), timeout))
            }
            None if stop.is_stopped() => {
                warn!(reason = ?stop.reason(), "abandoning evaluation thread");
                Err(stopped(stop.reason(), timeout))
            }
            None => Err(ExecutionError::new(
                ExecutionErrorKind::Runtime,
                "evaluation thread exited without a result",
            )),
        };

        ExecutionResult::from_outcome(stdout.contents(), stderr.contents(), started.elapsed(), outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    async fn hello_world() {
        let backend = InterpretedBackend::default();
        let src = "package main\nimport \"fmt\"\nfunc main() { fmt.Println(\"hello\") }\n";
        let result = backend.execute(src, None).await;
        assert!(result.success, "{}", result.error);
        assert_eq!(result.stdout, "hello\n");
    }

    #[tokio::test]
    async fn guest_panic_is_trap() {
        let backend = InterpretedBackend::default();
        let src = "package main\nfunc main() { panic(\"boom\") }\n";
        let result = backend.execute(src, None).await;
        assert_eq!(result.kind(), Some(ExecutionErrorKind::Trap));
        assert!(result.error.contains("boom"));
    }

    #[tokio::test]
    async fn pooled_instance_is_returned() {
        let backend = InterpretedBackend::new(
            ResourceLimits::default(),
            InterpreterConfig {
                pool_size: 2,
                ..InterpreterConfig::default()
            },
        );
        let src = "package main\nfunc main() {}\n";
        backend.execute(src, None).await;
        assert_eq!(backend.pool().available(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bridged_runs_leave_the_pool_alone() {
        let backend = InterpretedBackend::default();
        let bridge = HostFunctionBridge::new().with_function("ping", |_| Ok(Value::from("pong")));
        let src = "package main\nimport \"fmt\"\nfunc main() { r, _ := ping(nil); fmt.Println(r) }\n";
        let result = backend.execute_with_host_functions(src, None, bridge).await;
        assert_eq!(result.stdout, "pong\n", "{}", result.error);
        assert_eq!(backend.pool().available(), 5);
    }
}
