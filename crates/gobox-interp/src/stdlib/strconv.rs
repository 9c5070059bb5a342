use super::{float_arg, funcs, int_arg, ok, str_arg, want, Package};
use crate::error::{runtime, EvalResult};
use crate::eval::Evaluator;
use crate::format;
use crate::value::Value;

pub(super) fn members() -> Package {
    funcs(&[
        ("Itoa", itoa),
        ("Atoi", atoi),
        ("ParseInt", parse_int),
        ("ParseFloat", parse_float),
        ("ParseBool", parse_bool),
        ("FormatInt", format_int),
        ("FormatFloat", format_float),
        ("FormatBool", format_bool),
        ("Quote", quote),
    ])
}

/// `*strconv.NumError` rendered the way Go prints it.
fn num_error(func: &str, input: &str, reason: &str) -> Value {
    Value::error(format!("strconv.{func}: parsing {}: {reason}", format::quote(input)))
}

fn failed(zero: Value, func: &str, input: &str, reason: &str) -> Value {
    Value::tuple(vec![zero, num_error(func, input, reason)])
}

fn itoa(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "strconv.Itoa")?;
    Ok(Value::str(&int_arg(&args, 0, "strconv.Itoa")?.to_string()))
}

fn atoi(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "strconv.Atoi")?;
    let s = str_arg(&args, 0, "strconv.Atoi")?;
    Ok(match parse_integer(&s, 10, 64) {
        Ok(i) => ok(Value::Int(i)),
        Err((clamped, reason)) => failed(Value::Int(clamped), "Atoi", &s, reason),
    })
}

fn parse_int(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 3, "strconv.ParseInt")?;
    let s = str_arg(&args, 0, "strconv.ParseInt")?;
    let base = int_arg(&args, 1, "strconv.ParseInt")?;
    let bits = int_arg(&args, 2, "strconv.ParseInt")?;
    if base == 1 || !(0..=36).contains(&base) {
        return Ok(failed(Value::Int(0), "ParseInt", &s, "invalid base"));
    }
    let bits = if bits == 0 { 64 } else { bits };
    Ok(match parse_integer(&s, base as u32, bits as u32) {
        Ok(i) => ok(Value::Int(i)),
        Err((clamped, reason)) => failed(Value::Int(clamped), "ParseInt", &s, reason),
    })
}

/// Signed integer parse with Go's prefix, underscore and range rules. On
/// overflow the error carries the clamped value Go returns.
fn parse_integer(s: &str, base: u32, bits: u32) -> Result<i64, (i64, &'static str)> {
    const SYNTAX: &str = "invalid syntax";
    const RANGE: &str = "value out of range";
    let (negative, body) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (radix, digits, prefixed) = if base == 0 {
        let lower = body.to_ascii_lowercase();
        if lower.starts_with("0x") {
            (16, &body[2..], true)
        } else if lower.starts_with("0b") {
            (2, &body[2..], true)
        } else if lower.starts_with("0o") {
            (8, &body[2..], true)
        } else if body.len() > 1 && body.starts_with('0') {
            (8, &body[1..], true)
        } else {
            (10, body, false)
        }
    } else {
        (base, body, false)
    };
    let digits: String = if prefixed {
        digits.chars().filter(|c| *c != '_').collect()
    } else {
        digits.to_string()
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err((0, SYNTAX));
    }
    let magnitude = u128::from_str_radix(&digits, radix).map_err(|e| match e.kind() {
        std::num::IntErrorKind::PosOverflow => (if negative { i64::MIN } else { i64::MAX }, RANGE),
        _ => (0, SYNTAX),
    })?;
    let limit = 1u128 << (bits.clamp(1, 64) - 1);
    if negative {
        if magnitude > limit {
            return Err((-(limit as i128) as i64, RANGE));
        }
        Ok((-(magnitude as i128)) as i64)
    } else {
        if magnitude >= limit {
            return Err(((limit - 1) as i64, RANGE));
        }
        Ok(magnitude as i64)
    }
}

fn parse_float(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "strconv.ParseFloat")?;
    let s = str_arg(&args, 0, "strconv.ParseFloat")?;
    let bits = int_arg(&args, 1, "strconv.ParseFloat")?;
    let cleaned = s.replace('_', "");
    let valid_chars = !s.is_empty()
        && !s.starts_with('_')
        && !s.ends_with('_')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || "+-._".contains(c));
    Ok(match cleaned.parse::<f64>() {
        Ok(f) if valid_chars => {
            let f = if bits == 32 { f as f32 as f64 } else { f };
            if f.is_infinite() && !cleaned.to_ascii_lowercase().contains("inf") {
                failed(Value::Float(f), "ParseFloat", &s, "value out of range")
            } else {
                ok(Value::Float(f))
            }
        }
        _ => failed(Value::Float(0.0), "ParseFloat", &s, "invalid syntax"),
    })
}

fn parse_bool(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "strconv.ParseBool")?;
    let s = str_arg(&args, 0, "strconv.ParseBool")?;
    Ok(match &*s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => ok(Value::Bool(true)),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => ok(Value::Bool(false)),
        _ => failed(Value::Bool(false), "ParseBool", &s, "invalid syntax"),
    })
}

fn format_int(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "strconv.FormatInt")?;
    let i = int_arg(&args, 0, "strconv.FormatInt")?;
    let base = int_arg(&args, 1, "strconv.FormatInt")?;
    if !(2..=36).contains(&base) {
        return Err(crate::error::panic("strconv: illegal AppendInt/FormatInt base"));
    }
    Ok(Value::str(&to_radix(i, base as u32)))
}

fn to_radix(i: i64, base: u32) -> String {
    let mut n = i.unsigned_abs();
    if n == 0 {
        return "0".into();
    }
    let mut digits = Vec::new();
    while n > 0 {
        let d = (n % base as u64) as u32;
        digits.push(std::char::from_digit(d, base).unwrap_or('?'));
        n /= base as u64;
    }
    if i < 0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn format_float(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 4, "strconv.FormatFloat")?;
    let f = float_arg(&args, 0, "strconv.FormatFloat")?;
    let verb = int_arg(&args, 1, "strconv.FormatFloat")?;
    let prec = int_arg(&args, 2, "strconv.FormatFloat")?;
    let bits = int_arg(&args, 3, "strconv.FormatFloat")?;
    let verb = u8::try_from(verb)
        .ok()
        .map(char::from)
        .filter(|c| "beEfgGxX".contains(*c))
        .ok_or_else(|| runtime("strconv.FormatFloat: unsupported format"))?;
    let f = if bits == 32 { f as f32 as f64 } else { f };
    Ok(Value::str(&format::format_float(f, verb, prec as i32)))
}

fn format_bool(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "strconv.FormatBool")?;
    Ok(Value::str(&args[0].as_bool()?.to_string()))
}

fn quote(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "strconv.Quote")?;
    Ok(Value::str(&format::quote(&str_arg(&args, 0, "strconv.Quote")?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_integer_handles_signs_and_prefixes() {
        assert_eq!(parse_integer("42", 10, 64), Ok(42));
        assert_eq!(parse_integer("-42", 10, 64), Ok(-42));
        assert_eq!(parse_integer("+7", 10, 64), Ok(7));
        assert_eq!(parse_integer("0x1f", 0, 64), Ok(31));
        assert_eq!(parse_integer("0b101", 0, 64), Ok(5));
        assert_eq!(parse_integer("017", 0, 64), Ok(15));
        assert_eq!(parse_integer("ff", 16, 64), Ok(255));
    }

    #[test]
    fn parse_integer_reports_syntax_and_range() {
        assert_eq!(parse_integer("abc", 10, 64), Err((0, "invalid syntax")));
        assert_eq!(parse_integer("", 10, 64), Err((0, "invalid syntax")));
        assert_eq!(parse_integer(" 1", 10, 64), Err((0, "invalid syntax")));
        assert_eq!(parse_integer("128", 10, 8), Err((127, "value out of range")));
        assert_eq!(parse_integer("-129", 10, 8), Err((-128, "value out of range")));
        assert_eq!(
            parse_integer("99999999999999999999", 10, 64),
            Err((i64::MAX, "value out of range"))
        );
    }

    #[test]
    fn num_error_text_matches_go() {
        match num_error("Atoi", "abc", "invalid syntax") {
            Value::Error(e) => assert_eq!(e.message, "strconv.Atoi: parsing \"abc\": invalid syntax"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn to_radix_covers_negative_and_hex() {
        assert_eq!(to_radix(255, 16), "ff");
        assert_eq!(to_radix(-5, 2), "-101");
        assert_eq!(to_radix(0, 8), "0");
    }
}
