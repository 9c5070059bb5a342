use super::{funcs, str_arg, want, Package};
use crate::error::EvalResult;
use crate::eval::Evaluator;
use crate::value::{values_equal, Value};

pub(super) fn members() -> Package {
    funcs(&[("New", new), ("Is", is), ("Unwrap", unwrap)])
}

/// Bound on `Unwrap` chains, which may be cyclic in user code.
const MAX_CHAIN: usize = 100;

fn new(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "errors.New")?;
    Ok(Value::error(str_arg(&args, 0, "errors.New")?.to_string()))
}

fn unwrap_once(ev: &mut Evaluator, err: &Value) -> EvalResult<Value> {
    match err {
        Value::Error(e) => Ok(e.wrapped.clone().unwrap_or(Value::Nil)),
        other => {
            let method = Evaluator::method_type(other).and_then(|t| ev.find_method(&t, "Unwrap"));
            match method {
                Some(decl) => ev.call_method_decl(&decl, other.clone(), Vec::new(), false),
                None => Ok(Value::Nil),
            }
        }
    }
}

fn is(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "errors.Is")?;
    let target = &args[1];
    let mut current = args[0].clone();
    for _ in 0..MAX_CHAIN {
        if current.is_nil() {
            return Ok(Value::Bool(target.is_nil()));
        }
        if values_equal(&current, target).unwrap_or(false) {
            return Ok(Value::Bool(true));
        }
        current = unwrap_once(ev, &current)?;
        if current.is_nil() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(false))
}

fn unwrap(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "errors.Unwrap")?;
    unwrap_once(ev, &args[0])
}
