//! Compiled-sandbox backend against hand-written WAT modules.

use std::time::{Duration, Instant};

use gobox_core::config::WASM_PAGE_SIZE;
use gobox_core::{CompiledArtifact, CompiledSandboxBackend, ExecutionErrorKind, ResourceLimits};
use tokio_util::sync::CancellationToken;

fn module(wat: &str) -> CompiledArtifact {
    CompiledArtifact::from(wat.as_bytes().to_vec())
}

fn limits(timeout_ms: u64, pages: u64) -> Option<ResourceLimits> {
    Some(ResourceLimits::new(
        pages * WASM_PAGE_SIZE,
        Duration::from_millis(timeout_ms),
    ))
}

const HELLO: &str = r#"
(module
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "hello\n")
  (func (export "_start")
    (i32.store (i32.const 0) (i32.const 16))
    (i32.store (i32.const 4) (i32.const 6))
    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))))
"#;

const SPIN: &str = r#"
(module
  (func (export "_start")
    (loop $forever (br $forever))))
"#;

fn exit_with(code: i32) -> String {
    format!(
        r#"
(module
  (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start") (call $exit (i32.const {code}))))
"#
    )
}

// ---------------------------------------------------------------------------
// Success paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trivial_program_succeeds_with_empty_output() {
    let backend = CompiledSandboxBackend::default();
    let result = backend
        .execute(&module(r#"(module (func (export "_start")))"#), None)
        .await;
    assert!(result.success, "{}", result.error);
    assert!(result.stdout.is_empty());
    assert!(result.stderr.is_empty());
    assert!(result.error.is_empty());
}

#[tokio::test]
async fn stdout_is_captured() {
    let backend = CompiledSandboxBackend::default();
    let result = backend.execute(&module(HELLO), None).await;
    assert!(result.success, "{}", result.error);
    assert_eq!(result.stdout, "hello\n");
}

#[tokio::test]
async fn proc_exit_zero_is_success() {
    let backend = CompiledSandboxBackend::default();
    let result = backend.execute(&module(&exit_with(0)), None).await;
    assert!(result.success, "{}", result.error);
}

#[tokio::test]
async fn proc_exit_nonzero_is_runtime() {
    let backend = CompiledSandboxBackend::default();
    let result = backend.execute(&module(&exit_with(3)), None).await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Runtime));
    assert!(result.error.contains("exit status 3"), "{}", result.error);
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn infinite_loop_times_out_promptly() {
    let backend = CompiledSandboxBackend::default();
    let started = Instant::now();
    let result = backend.execute(&module(SPIN), limits(100, 16)).await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Timeout), "{}", result.error);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(result.duration >= Duration::from_millis(100));
}

#[tokio::test]
async fn cancellation_is_reported_as_canceled() {
    let backend = CompiledSandboxBackend::default();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let result = backend
        .execute_cancellable(&module(SPIN), limits(10_000, 16), &cancel)
        .await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Canceled), "{}", result.error);
}

#[tokio::test]
async fn growing_past_the_ceiling_is_memory() {
    let wat = r#"
(module
  (memory (export "memory") 1)
  (func (export "_start")
    (drop (memory.grow (i32.const 64)))))
"#;
    let backend = CompiledSandboxBackend::default();
    let result = backend.execute(&module(wat), limits(5_000, 2)).await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Memory), "{}", result.error);
}

#[tokio::test]
async fn initial_memory_over_the_ceiling_is_memory() {
    let wat = r#"(module (memory (export "memory") 8) (func (export "_start")))"#;
    let backend = CompiledSandboxBackend::default();
    let result = backend.execute(&module(wat), limits(5_000, 2)).await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Memory), "{}", result.error);
}

#[tokio::test]
async fn out_of_bounds_load_is_memory() {
    let wat = r#"
(module
  (memory (export "memory") 1)
  (func (export "_start")
    (drop (i32.load (i32.const 1000000)))))
"#;
    let backend = CompiledSandboxBackend::default();
    let result = backend.execute(&module(wat), None).await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Memory), "{}", result.error);
}

// ---------------------------------------------------------------------------
// Traps
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_is_trap() {
    let wat = r#"(module (func (export "_start") unreachable))"#;
    let backend = CompiledSandboxBackend::default();
    let result = backend.execute(&module(wat), None).await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Trap), "{}", result.error);
}

#[tokio::test]
async fn output_before_a_trap_is_kept() {
    let wat = HELLO.replace(
        "(i32.const 8)))))",
        "(i32.const 8)))\n    unreachable))",
    );
    let backend = CompiledSandboxBackend::default();
    let result = backend.execute(&module(&wat), None).await;
    assert_eq!(result.kind(), Some(ExecutionErrorKind::Trap), "{}", result.error);
    assert_eq!(result.stdout, "hello\n");
}

#[tokio::test]
async fn runs_are_isolated_from_each_other() {
    let backend = CompiledSandboxBackend::default();
    let (hello, spin) = (module(HELLO), module(SPIN));
    let (a, b) = tokio::join!(
        backend.execute(&hello, None),
        backend.execute(&spin, limits(100, 16)),
    );
    assert_eq!(a.stdout, "hello\n");
    assert!(a.success);
    assert_eq!(b.kind(), Some(ExecutionErrorKind::Timeout));
    assert!(b.stdout.is_empty());
}
