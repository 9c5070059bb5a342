//! Compiled-sandbox backend: WASI wasm under wasmtime.
//!
//! Each call builds a fresh engine and store, so nothing leaks between
//! guests. The guest sees only stdout and stderr (both captured in memory)
//! and a single argument, the program name. A watchdog task bumps the
//! engine epoch once the deadline passes or the caller cancels, which
//! traps the guest at its next epoch check.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;
use wasmtime::{Config, Engine, Linker, Module, Store, StoreLimits, StoreLimitsBuilder};
use wasmtime_wasi::pipe::MemoryOutputPipe;
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::WasiCtxBuilder;

use super::classify::{classify_wasm, StopFlag, StopReason};
use super::{ExecutionError, ExecutionErrorKind, ExecutionResult};
use crate::cache::CompiledArtifact;
use crate::config::ResourceLimits;

/// How often the watchdog re-bumps the epoch after stopping a guest.
const EPOCH_TICK: Duration = Duration::from_millis(10);

const PROGRAM_NAME: &str = "main";

struct GuestState {
    wasi: WasiP1Ctx,
    limits: StoreLimits,
}

#[derive(Debug, Clone)]
pub struct CompiledSandboxBackend {
    limits: ResourceLimits,
    output_cap: usize,
}

impl Default for CompiledSandboxBackend {
    fn default() -> Self {
        Self::new(ResourceLimits::default(), gobox_interp::DEFAULT_OUTPUT_CAP)
    }
}

impl CompiledSandboxBackend {
    /// `limits` apply when a call does not bring its own; `output_cap`
    /// bounds each captured stream.
    pub fn new(limits: ResourceLimits, output_cap: usize) -> Self {
        Self { limits, output_cap }
    }

    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }

    pub async fn execute(
        &self,
        artifact: &CompiledArtifact,
        limits: Option<ResourceLimits>,
    ) -> ExecutionResult {
        self.execute_cancellable(artifact, limits, &CancellationToken::new())
            .await
    }

    pub async fn execute_cancellable(
        &self,
        artifact: &CompiledArtifact,
        limits: Option<ResourceLimits>,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let limits = limits.unwrap_or(self.limits);
        let started = Instant::now();

        let mut config = Config::new();
        config.epoch_interruption(true);
        let engine = match Engine::new(&config) {
            Ok(engine) => engine,
            Err(e) => {
                return ExecutionResult::failed(
                    String::new(),
                    String::new(),
                    started.elapsed(),
                    ExecutionError::new(ExecutionErrorKind::Runtime, format!("engine setup: {e:#}")),
                )
            }
        };

        let stdout = MemoryOutputPipe::new(self.output_cap);
        let stderr = MemoryOutputPipe::new(self.output_cap);
        let stop = Arc::new(StopFlag::new());
        let done = CancellationToken::new();

        let watchdog = tokio::spawn(watch(
            engine.clone(),
            limits.timeout(),
            cancel.clone(),
            done.clone(),
            stop.clone(),
        ));

        let run = tokio::task::spawn_blocking({
            let engine = engine.clone();
            let artifact = artifact.clone();
            let (stdout, stderr) = (stdout.clone(), stderr.clone());
            let ceiling = limits.memory_ceiling();
            move || run_module(&engine, artifact.bytes(), ceiling, stdout, stderr)
        });
        let joined = run.await;
        done.cancel();
        let _ = watchdog.await;

        let outcome = match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => classify_wasm(&err, stop.reason(), limits.timeout()),
            Err(join) => Err(ExecutionError::new(
                ExecutionErrorKind::Trap,
                format!("sandbox worker failed: {join}"),
            )),
        };

        let out = captured(&stdout, self.output_cap);
        let err_text = captured(&stderr, self.output_cap);
        debug!(
            size = artifact.len(),
            memory_pages = limits.memory_pages(),
            ok = outcome.is_ok(),
            "compiled guest finished"
        );
        ExecutionResult::from_outcome(out, err_text, started.elapsed(), outcome)
    }
}

/// A full pipe reports itself closed to the guest, so reaching the cap is
/// the only sign that writes were dropped.
fn captured(pipe: &MemoryOutputPipe, cap: usize) -> String {
    let bytes = pipe.contents();
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if cap > 0 && bytes.len() >= cap {
        text.push_str(gobox_interp::TRUNCATION_MARKER);
    }
    text
}

/// Runs on a blocking worker until `_start` returns or traps.
fn run_module(
    engine: &Engine,
    bytes: &[u8],
    memory_ceiling: usize,
    stdout: MemoryOutputPipe,
    stderr: MemoryOutputPipe,
) -> anyhow::Result<()> {
    let module = Module::new(engine, bytes)?;

    let mut linker: Linker<GuestState> = Linker::new(engine);
    preview1::add_to_linker_sync(&mut linker, |state: &mut GuestState| &mut state.wasi)?;

    let wasi = WasiCtxBuilder::new()
        .stdout(stdout)
        .stderr(stderr)
        .args(&[PROGRAM_NAME])
        .build_p1();
    let limits = StoreLimitsBuilder::new()
        .memory_size(memory_ceiling)
        .trap_on_grow_failure(true)
        .build();

    let mut store = Store::new(engine, GuestState { wasi, limits });
    store.limiter(|state| &mut state.limits);
    store.set_epoch_deadline(1);

    let instance = linker.instantiate(&mut store, &module)?;
    let start = instance.get_typed_func::<(), ()>(&mut store, "_start")?;
    start.call(&mut store, ())
}

/// Interrupt the guest on deadline or cancellation. Keeps bumping the
/// epoch until the run ends, so a store created after the first bump is
/// still interrupted.
async fn watch(
    engine: Engine,
    timeout: Duration,
    cancel: CancellationToken,
    done: CancellationToken,
    stop: Arc<StopFlag>,
) {
    let reason = tokio::select! {
        biased;
        _ = done.cancelled() => return,
        _ = cancel.cancelled() => StopReason::Canceled,
        _ = tokio::time::sleep(timeout) => StopReason::Deadline,
    };
    stop.stop(reason);
    debug!(?reason, "interrupting compiled guest");
    loop {
        engine.increment_epoch();
        tokio::select! {
            biased;
            _ = done.cancelled() => return,
            _ = tokio::time::sleep(EPOCH_TICK) => {}
        }
    }
}
