//! Structured lifecycle events for guest executions.
//!
//! Every execution runs inside an [`ExecutionSpan`] so log lines emitted by
//! the validator, compiler and backends carry the same `execution_id`.
//! Events are `info!` unless noted; set `RUST_LOG=gobox_core=debug` for the
//! per-stage detail.

use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::source::Digest;

/// Execution-scoped span tagged with a fresh `execution_id`.
///
/// Instrument the execution future with [`span`](Self::span); use
/// [`enter`](Self::enter) only around synchronous sections.
pub struct ExecutionSpan {
    id: Uuid,
    span: tracing::Span,
}

impl ExecutionSpan {
    pub fn new(backend: &'static str) -> Self {
        let id = Uuid::new_v4();
        Self {
            span: tracing::info_span!("gobox.execution", execution_id = %id, backend = backend),
            id,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

pub fn emit_execution_started(backend: &str, source_bytes: usize) {
    info!(event = "execution.started", backend = %backend, source_bytes = source_bytes);
}

pub fn emit_execution_finished(backend: &str, duration: Duration, success: bool, kind: Option<&str>) {
    info!(
        event = "execution.finished",
        backend = %backend,
        duration_ms = duration.as_millis() as u64,
        success = success,
        kind = kind.unwrap_or("none"),
    );
}

/// Rejected before any backend ran (warning level).
pub fn emit_validation_rejected(reason: &dyn std::fmt::Display) {
    warn!(event = "validation.rejected", reason = %reason);
}

pub fn emit_cache_hit(digest: &Digest) {
    info!(event = "cache.hit", digest = %digest.short());
}

pub fn emit_cache_miss(digest: &Digest) {
    info!(event = "cache.miss", digest = %digest.short());
}

/// Toolchain rejected the program (warning level).
pub fn emit_compile_failed(digest: &Digest, message: &str) {
    warn!(event = "compile.failed", digest = %digest.short(), message = %message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_span_ids_are_unique() {
        let a = ExecutionSpan::new("interpreted");
        let b = ExecutionSpan::new("compiled");
        let _guard = a.enter();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn emitters_do_not_panic_without_subscriber() {
        let d = Digest::compute(b"x");
        emit_execution_started("compiled", 10);
        emit_execution_finished("compiled", Duration::from_millis(3), false, Some("timeout"));
        emit_validation_rejected(&"source is empty");
        emit_cache_hit(&d);
        emit_cache_miss(&d);
        emit_compile_failed(&d, "main.go:1:1: oops");
    }
}
