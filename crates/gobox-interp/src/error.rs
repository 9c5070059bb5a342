//! Error types for parsing and evaluating guest programs.

use thiserror::Error;

/// Source position (1-based line and column).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A syntax error produced by the lexer or parser.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{pos}: {message}")]
pub struct ParseError {
    pub pos: Pos,
    pub message: String,
}

impl ParseError {
    pub fn new(pos: Pos, message: impl Into<String>) -> Self {
        Self {
            pos,
            message: message.into(),
        }
    }
}

/// Failures raised while evaluating a parsed program.
///
/// `Break`/`Continue`/`Return` are control-flow signals and never escape a
/// function body.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// A Go-level panic: explicit `panic(...)` or a runtime fault such as an
    /// out-of-range index.
    #[error("panic: {0}")]
    Panic(String),

    /// A static or dynamic error that Go would have reported at compile time
    /// (undefined names, wrong arity, unsupported constructs).
    #[error("{0}")]
    Runtime(String),

    /// The host asked the evaluation to stop.
    #[error("evaluation interrupted")]
    Interrupted,

    /// The step budget ran out.
    #[error("step budget of {0} exhausted")]
    BudgetExhausted(u64),

    /// Call depth exceeded the configured maximum.
    #[error("stack overflow: call depth exceeded {0}")]
    StackOverflow(usize),

    /// `os.Exit(code)`.
    #[error("exit status {0}")]
    Exit(i32),

    #[error("break outside loop")]
    Break,

    #[error("continue outside loop")]
    Continue,

    #[error("return outside function")]
    Return(crate::value::Value),
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;

pub(crate) fn runtime(msg: impl Into<String>) -> EvalError {
    EvalError::Runtime(msg.into())
}

pub(crate) fn panic(msg: impl Into<String>) -> EvalError {
    EvalError::Panic(msg.into())
}

/// Classified outcome of a whole run, as seen by the embedding host.
#[derive(Debug, Clone, Error)]
pub enum InterpError {
    #[error("syntax error: {0}")]
    Parse(#[from] ParseError),

    #[error("{message}")]
    Panic { message: String },

    #[error("{message}")]
    Runtime { message: String },

    #[error("evaluation interrupted")]
    Interrupted,

    #[error("step budget of {0} exhausted")]
    BudgetExhausted(u64),

    #[error("stack overflow: call depth exceeded {0}")]
    StackOverflow(usize),

    #[error("exit status {0}")]
    Exit(i32),
}

impl InterpError {
    /// Wrap an evaluation error, prefixing the line it happened on.
    pub(crate) fn from_eval(err: EvalError, line: u32) -> Self {
        let at = |m: String| {
            if line > 0 {
                format!("line {line}: {m}")
            } else {
                m
            }
        };
        match err {
            EvalError::Panic(m) => InterpError::Panic {
                message: at(format!("panic: {m}")),
            },
            EvalError::Runtime(m) => InterpError::Runtime { message: at(m) },
            EvalError::Interrupted => InterpError::Interrupted,
            EvalError::BudgetExhausted(n) => InterpError::BudgetExhausted(n),
            EvalError::StackOverflow(n) => InterpError::StackOverflow(n),
            EvalError::Exit(code) => InterpError::Exit(code),
            EvalError::Break | EvalError::Continue => InterpError::Runtime {
                message: at(err.to_string()),
            },
            EvalError::Return(_) => InterpError::Runtime {
                message: at("return outside function".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_includes_position() {
        let err = ParseError::new(Pos { line: 3, col: 7 }, "unexpected '}'");
        assert_eq!(err.to_string(), "3:7: unexpected '}'");
    }

    #[test]
    fn from_eval_prefixes_line() {
        let err = InterpError::from_eval(EvalError::Panic("boom".into()), 12);
        assert_eq!(err.to_string(), "line 12: panic: boom");
    }

    #[test]
    fn from_eval_keeps_control_errors_unprefixed() {
        let err = InterpError::from_eval(EvalError::Interrupted, 4);
        assert!(matches!(err, InterpError::Interrupted));
    }
}
