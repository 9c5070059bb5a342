//! gobox-interp: an embeddable interpreter for the Go subset that
//! machine-generated guest programs are written in.
//!
//! The interpreter never touches process-wide state. Output goes to the
//! [`OutputBuffer`]s supplied per run, host functions are injected per run,
//! and the host stops a run by setting the shared interrupt flag, which the
//! evaluator observes at every statement, loop iteration and call.
//!
//! ```ignore
//! let interp = Interpreter::new();
//! let stdout = OutputBuffer::new(1 << 20);
//! interp.run(src, RunOptions::new().stdout(stdout.clone()))?;
//! ```

pub mod ast;
pub mod error;
mod eval;
mod format;
mod lexer;
pub mod output;
pub mod parser;
mod stdlib;
pub mod value;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::debug;

pub use error::{InterpError, ParseError};
pub use output::{OutputBuffer, TRUNCATION_MARKER};
pub use stdlib::SymbolTable;
pub use value::{NativeFn, Value};

use error::EvalError;
use eval::{Evaluator, RunContext};

/// Default cap on captured bytes per stream.
pub const DEFAULT_OUTPUT_CAP: usize = 1 << 20;

/// Default maximum guest call depth.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// Default cap on elements in one slice and bytes in one string.
pub const DEFAULT_MAX_ALLOC: usize = 1 << 24;

/// Per-run settings.
pub struct RunOptions {
    pub stdout: OutputBuffer,
    pub stderr: OutputBuffer,
    pub interrupt: Arc<AtomicBool>,
    /// `None` means unbounded; the interrupt flag is then the only stop.
    pub max_steps: Option<u64>,
    pub max_call_depth: usize,
    /// Largest slice (in elements) or string (in bytes) a guest may build
    /// in one step. Past it the guest gets a Go runtime panic.
    pub max_alloc: usize,
    /// Host functions bound as guest globals for this run only.
    pub natives: Vec<(String, NativeFn)>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            stdout: OutputBuffer::new(DEFAULT_OUTPUT_CAP),
            stderr: OutputBuffer::new(DEFAULT_OUTPUT_CAP),
            interrupt: Arc::new(AtomicBool::new(false)),
            max_steps: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_alloc: DEFAULT_MAX_ALLOC,
            natives: Vec::new(),
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout(mut self, buf: OutputBuffer) -> Self {
        self.stdout = buf;
        self
    }

    pub fn stderr(mut self, buf: OutputBuffer) -> Self {
        self.stderr = buf;
        self
    }

    pub fn interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn max_alloc(mut self, units: usize) -> Self {
        self.max_alloc = units;
        self
    }

    pub fn native(mut self, name: impl Into<String>, func: NativeFn) -> Self {
        self.natives.push((name.into(), func));
        self
    }
}

/// A pre-warmed interpreter: the standard-library symbol table is built
/// once and shared by every run. Runs keep no state on the instance.
#[derive(Clone)]
pub struct Interpreter {
    symbols: Arc<SymbolTable>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("packages", &self.symbols.packages())
            .finish()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            symbols: Arc::new(SymbolTable::standard()),
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Parse and run a guest program to completion. `os.Exit(0)` counts
    /// as success.
    pub fn run(&self, source: &str, opts: RunOptions) -> Result<(), InterpError> {
        let program = parser::parse_program(source)?;
        let ctx = RunContext {
            stdout: opts.stdout,
            stderr: opts.stderr,
            interrupt: opts.interrupt,
            max_steps: opts.max_steps,
            max_call_depth: opts.max_call_depth,
            max_alloc: opts.max_alloc,
        };
        let mut ev = Evaluator::new(self.symbols.clone(), ctx);
        let outcome = ev.run_program(&program, opts.natives);
        debug!(steps = ev.steps(), ok = outcome.is_ok(), "guest run finished");
        match outcome {
            Ok(()) | Err(EvalError::Exit(0)) => Ok(()),
            Err(err) => Err(InterpError::from_eval(err, ev.line)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_captures_stdout() {
        let out = OutputBuffer::new(1024);
        let src = "package main\nimport \"fmt\"\nfunc main() { fmt.Println(\"hi\", 42) }\n";
        Interpreter::new()
            .run(src, RunOptions::new().stdout(out.clone()))
            .unwrap();
        assert_eq!(out.contents(), "hi 42\n");
    }

    #[test]
    fn os_exit_zero_is_success() {
        let src = "package main\nimport \"os\"\nfunc main() { os.Exit(0) }\n";
        assert!(Interpreter::new().run(src, RunOptions::new()).is_ok());
    }

    #[test]
    fn os_exit_nonzero_is_reported() {
        let src = "package main\nimport \"os\"\nfunc main() { os.Exit(3) }\n";
        let err = Interpreter::new().run(src, RunOptions::new()).unwrap_err();
        assert!(matches!(err, InterpError::Exit(3)));
    }

    #[test]
    fn syntax_errors_surface_as_parse_errors() {
        let err = Interpreter::new()
            .run("package main\nfunc main() {", RunOptions::new())
            .unwrap_err();
        assert!(matches!(err, InterpError::Parse(_)));
    }
}
