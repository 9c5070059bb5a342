use std::rc::Rc;

use super::{funcs, ok, str_arg, Package};
use crate::error::{runtime, EvalResult};
use crate::eval::{Evaluator, BUILDER_TYPE};
use crate::format;
use crate::value::{ErrorVal, Value};

pub(super) fn members() -> Package {
    funcs(&[
        ("Println", println),
        ("Printf", printf),
        ("Print", print),
        ("Sprintln", sprintln),
        ("Sprintf", sprintf),
        ("Sprint", sprint),
        ("Errorf", errorf),
        ("Fprintln", fprintln),
        ("Fprintf", fprintf),
        ("Fprint", fprint),
    ])
}

fn written(ev: &mut Evaluator, text: &str) -> Value {
    ev.stdout.write(text.as_bytes());
    ok(Value::Int(text.len() as i64))
}

fn println(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let text = format::sprintln(ev, &args)?;
    Ok(written(ev, &text))
}

fn print(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let text = format::sprint(ev, &args)?;
    Ok(written(ev, &text))
}

fn printf(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let fmt = str_arg(&args, 0, "fmt.Printf")?;
    let text = format::sprintf(ev, &fmt, &args[1..])?;
    Ok(written(ev, &text))
}

fn sprintln(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::str(&format::sprintln(ev, &args)?))
}

fn sprint(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::str(&format::sprint(ev, &args)?))
}

fn sprintf(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let fmt = str_arg(&args, 0, "fmt.Sprintf")?;
    Ok(Value::str(&format::sprintf(ev, &fmt, &args[1..])?))
}

/// `fmt.Errorf`; the operand of the first `%w` becomes the wrapped error.
fn errorf(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let fmt = str_arg(&args, 0, "fmt.Errorf")?;
    let operands = &args[1..];
    let message = format::sprintf(ev, &fmt, operands)?;
    let wrapped = wrap_operand(&fmt)
        .and_then(|i| operands.get(i))
        .filter(|v| !v.is_nil())
        .cloned();
    Ok(Value::Error(Rc::new(ErrorVal { message, wrapped })))
}

/// Operand index consumed by the first `%w` verb.
fn wrap_operand(fmt: &str) -> Option<usize> {
    let mut chars = fmt.chars().peekable();
    let mut index = 0;
    while let Some(c) = chars.next() {
        if c != '%' {
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            continue;
        }
        while let Some(&f) = chars.peek() {
            if f == '*' {
                index += 1;
            } else if !(f.is_ascii_digit() || "+-# .".contains(f)) {
                break;
            }
            chars.next();
        }
        match chars.next() {
            Some('w') => return Some(index),
            Some(_) => index += 1,
            None => break,
        }
    }
    None
}

/// Destination of the `Fprint` family: an `os` stream or a `strings.Builder`.
fn emit(ev: &mut Evaluator, dest: &Value, text: &str) -> EvalResult<Value> {
    match dest {
        Value::Stream(stream) => ev.write_stream(*stream, text),
        Value::Pointer(s) | Value::Struct(s) if &*s.borrow().def.name == BUILDER_TYPE => {
            let mut builder = s.borrow_mut();
            let current = builder.fields.first().and_then(|v| v.as_str().ok());
            let mut joined = current.map(|c| c.to_string()).unwrap_or_default();
            joined.push_str(text);
            if let Some(slot) = builder.fields.first_mut() {
                *slot = Value::str(&joined);
            }
        }
        other => {
            return Err(runtime(format!(
                "cannot use {} as io.Writer value",
                other.type_name()
            )))
        }
    }
    Ok(ok(Value::Int(text.len() as i64)))
}

fn split_dest(args: Vec<Value>, func: &str) -> EvalResult<(Value, Vec<Value>)> {
    let mut args = args.into_iter();
    let dest = args
        .next()
        .ok_or_else(|| runtime(format!("not enough arguments in call to {func}")))?;
    Ok((dest, args.collect()))
}

fn fprintln(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (dest, rest) = split_dest(args, "fmt.Fprintln")?;
    let text = format::sprintln(ev, &rest)?;
    emit(ev, &dest, &text)
}

fn fprint(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (dest, rest) = split_dest(args, "fmt.Fprint")?;
    let text = format::sprint(ev, &rest)?;
    emit(ev, &dest, &text)
}

fn fprintf(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (dest, rest) = split_dest(args, "fmt.Fprintf")?;
    let fmt = str_arg(&rest, 0, "fmt.Fprintf")?;
    let text = format::sprintf(ev, &fmt, &rest[1..])?;
    emit(ev, &dest, &text)
}
