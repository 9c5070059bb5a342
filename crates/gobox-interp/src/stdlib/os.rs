use super::{int_arg, want, Member, Package};
use crate::error::{EvalError, EvalResult};
use crate::eval::Evaluator;
use crate::value::{Stream, Value};

pub(super) fn members() -> Package {
    [
        ("Stdout", Member::Stream(Stream::Stdout)),
        ("Stderr", Member::Stream(Stream::Stderr)),
        ("Exit", Member::Func(exit)),
    ]
    .into_iter()
    .collect()
}

/// `os.Exit`: deferred calls do not run.
fn exit(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "os.Exit")?;
    let code = int_arg(&args, 0, "os.Exit")?;
    Err(EvalError::Exit(code as i32))
}
