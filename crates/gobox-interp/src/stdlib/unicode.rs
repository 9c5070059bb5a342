use super::{funcs, int_arg, str_arg, want, Member, Package, StdFn};
use crate::error::EvalResult;
use crate::eval::Evaluator;
use crate::value::Value;

pub(super) fn members() -> Package {
    let predicates: [(&'static str, StdFn); 8] = [
        ("IsLetter", |ev, a| test(ev, a, "unicode.IsLetter", char::is_alphabetic)),
        ("IsDigit", |ev, a| test(ev, a, "unicode.IsDigit", is_digit)),
        ("IsNumber", |ev, a| test(ev, a, "unicode.IsNumber", char::is_numeric)),
        ("IsSpace", |ev, a| test(ev, a, "unicode.IsSpace", char::is_whitespace)),
        ("IsUpper", |ev, a| test(ev, a, "unicode.IsUpper", char::is_uppercase)),
        ("IsLower", |ev, a| test(ev, a, "unicode.IsLower", char::is_lowercase)),
        ("IsPunct", |ev, a| test(ev, a, "unicode.IsPunct", is_punct)),
        ("IsControl", |ev, a| test(ev, a, "unicode.IsControl", char::is_control)),
    ];
    let mut pkg: Package = predicates
        .into_iter()
        .map(|(n, f)| (n, Member::Func(f)))
        .collect();
    pkg.insert("ToUpper", Member::Func(to_upper));
    pkg.insert("ToLower", Member::Func(to_lower));
    pkg.insert("MaxRune", Member::Int(0x10FFFF));
    pkg
}

pub(super) fn utf8_members() -> Package {
    let mut pkg = funcs(&[
        ("RuneCountInString", rune_count),
        ("RuneLen", rune_len),
        ("ValidString", valid_string),
    ]);
    pkg.insert("RuneError", Member::Int(0xFFFD));
    pkg.insert("UTFMax", Member::Int(4));
    pkg
}

fn rune(args: &[Value], func: &str) -> EvalResult<Option<char>> {
    want(args, 1, func)?;
    Ok(char::from_u32(int_arg(args, 0, func)? as u32))
}

fn test(
    _: &mut Evaluator,
    args: Vec<Value>,
    func: &str,
    pred: fn(char) -> bool,
) -> EvalResult<Value> {
    Ok(Value::Bool(rune(&args, func)?.is_some_and(pred)))
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit() || (!c.is_ascii() && c.is_numeric())
}

/// ASCII punctuation plus the general-category punctuation Rust exposes.
fn is_punct(c: char) -> bool {
    if c.is_ascii() {
        return c.is_ascii_punctuation() && !"$+<=>^`|~".contains(c);
    }
    !c.is_alphanumeric() && !c.is_whitespace() && !c.is_control()
}

fn to_upper(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let Some(c) = rune(&args, "unicode.ToUpper")? else {
        return Ok(args[0].clone());
    };
    Ok(Value::Int(c.to_uppercase().next().unwrap_or(c) as i64))
}

fn to_lower(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let Some(c) = rune(&args, "unicode.ToLower")? else {
        return Ok(args[0].clone());
    };
    Ok(Value::Int(c.to_lowercase().next().unwrap_or(c) as i64))
}

fn rune_count(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "utf8.RuneCountInString")?;
    let s = str_arg(&args, 0, "utf8.RuneCountInString")?;
    Ok(Value::Int(s.chars().count() as i64))
}

fn rune_len(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::Int(match rune(&args, "utf8.RuneLen")? {
        Some(c) => c.len_utf8() as i64,
        None => -1,
    }))
}

fn valid_string(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "utf8.ValidString")?;
    let s = str_arg(&args, 0, "utf8.ValidString")?;
    Ok(Value::Bool(!s.contains('\u{FFFD}')))
}
