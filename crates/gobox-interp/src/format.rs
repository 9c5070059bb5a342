//! Go `fmt` formatting: `%v` rendering, `Printf` verbs, and the float and
//! quoting helpers shared with `strconv`.

use std::rc::Rc;

use crate::error::EvalResult;
use crate::value::{MapVal, SliceVal, Value};

/// Gives the formatter access to user-defined `Error()` / `String()`
/// methods, which only the evaluator can call.
pub trait MethodHook {
    fn display_method(&mut self, value: &Value) -> EvalResult<Option<String>>;
}

const MAX_DEPTH: usize = 64;

/// Widths and precisions past this are ignored, as in Go.
const MAX_WIDTH: usize = 1_000_000;

// ----------------------------------------------------------------------
// Print / Println / Printf
// ----------------------------------------------------------------------

/// `fmt.Sprint`: spaces only between operands when neither is a string.
pub fn sprint(hook: &mut dyn MethodHook, args: &[Value]) -> EvalResult<String> {
    let mut out = String::new();
    let mut prev_string = true;
    for (i, arg) in args.iter().enumerate() {
        let is_string = matches!(arg, Value::Str(_));
        if i > 0 && !is_string && !prev_string {
            out.push(' ');
        }
        out.push_str(&format_v(hook, arg, false, false, 0)?);
        prev_string = is_string;
    }
    Ok(out)
}

/// `fmt.Sprintln`: always space separated, newline terminated.
pub fn sprintln(hook: &mut dyn MethodHook, args: &[Value]) -> EvalResult<String> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        parts.push(format_v(hook, arg, false, false, 0)?);
    }
    let mut out = parts.join(" ");
    out.push('\n');
    Ok(out)
}

#[derive(Debug, Default, Clone, Copy)]
struct Spec {
    minus: bool,
    plus: bool,
    sharp: bool,
    space: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

/// `fmt.Sprintf`.
pub fn sprintf(hook: &mut dyn MethodHook, format: &str, args: &[Value]) -> EvalResult<String> {
    let mut out = String::new();
    let mut arg_index = 0;
    let chars: Vec<char> = format.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut spec = Spec::default();
        while i < chars.len() {
            match chars[i] {
                '-' => spec.minus = true,
                '+' => spec.plus = true,
                '#' => spec.sharp = true,
                ' ' => spec.space = true,
                '0' => spec.zero = true,
                _ => break,
            }
            i += 1;
        }
        if i < chars.len() && chars[i] == '*' {
            i += 1;
            spec.width = star_arg(args, &mut arg_index);
        } else {
            spec.width = digits(&chars, &mut i);
        }
        if i < chars.len() && chars[i] == '.' {
            i += 1;
            if i < chars.len() && chars[i] == '*' {
                i += 1;
                spec.precision = star_arg(args, &mut arg_index);
            } else {
                spec.precision = Some(digits(&chars, &mut i).unwrap_or(0));
            }
        }

        let Some(&verb) = chars.get(i) else {
            out.push_str("%!(NOVERB)");
            break;
        };
        i += 1;

        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = args.get(arg_index) else {
            out.push_str(&format!("%!{verb}(MISSING)"));
            continue;
        };
        arg_index += 1;
        let text = format_verb(hook, arg, verb, &spec)?;
        out.push_str(&text);
    }

    if arg_index < args.len() {
        out.push_str("%!(EXTRA ");
        let mut extras = Vec::new();
        for arg in &args[arg_index..] {
            extras.push(format!(
                "{}={}",
                arg.type_name(),
                format_v(hook, arg, false, false, 0)?
            ));
        }
        out.push_str(&extras.join(", "));
        out.push(')');
    }
    Ok(out)
}

fn digits(chars: &[char], i: &mut usize) -> Option<usize> {
    let start = *i;
    let mut n = 0usize;
    while *i < chars.len() && chars[*i].is_ascii_digit() {
        n = n.saturating_mul(10).saturating_add(chars[*i] as usize - '0' as usize);
        *i += 1;
    }
    (*i > start && n <= MAX_WIDTH).then_some(n)
}

fn star_arg(args: &[Value], arg_index: &mut usize) -> Option<usize> {
    let n = match args.get(*arg_index) {
        Some(Value::Int(n)) if *n >= 0 && *n as u64 <= MAX_WIDTH as u64 => Some(*n as usize),
        _ => None,
    };
    *arg_index += 1;
    n
}

fn format_verb(
    hook: &mut dyn MethodHook,
    arg: &Value,
    verb: char,
    spec: &Spec,
) -> EvalResult<String> {
    let numeric = matches!(
        verb,
        'd' | 'b' | 'o' | 'x' | 'X' | 'e' | 'E' | 'f' | 'F' | 'g' | 'G'
    );
    let body = match (verb, arg) {
        ('v' | 'w', _) => format_v(hook, arg, spec.plus, spec.sharp, 0)?,
        ('T', _) => arg.type_name(),
        ('t', Value::Bool(b)) => b.to_string(),
        ('d', Value::Int(n)) => signed(n.to_string(), *n >= 0, spec),
        ('d', Value::Float(f)) if f.fract() == 0.0 => signed(format!("{}", *f as i64), *f >= 0.0, spec),
        ('b', Value::Int(n)) => radix(*n, 2, false, spec),
        ('o', Value::Int(n)) => radix(*n, 8, false, spec),
        ('x', Value::Int(n)) => radix(*n, 16, false, spec),
        ('X', Value::Int(n)) => radix(*n, 16, true, spec),
        ('x', Value::Str(s)) => hex_bytes(s.as_bytes(), false),
        ('X', Value::Str(s)) => hex_bytes(s.as_bytes(), true),
        ('c', Value::Int(n)) => char::from_u32(*n as u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER)
            .to_string(),
        ('q', Value::Int(n)) => quote_rune(*n),
        ('U', Value::Int(n)) => format!("U+{:04X}", n),
        ('e' | 'E' | 'f' | 'F' | 'g' | 'G', Value::Int(_) | Value::Float(_)) => {
            let f = arg.as_float()?;
            let default_prec = if matches!(verb, 'g' | 'G') { -1 } else { 6 };
            let prec = spec.precision.map(|p| p as i32).unwrap_or(default_prec);
            let text = format_float(f, verb, prec);
            signed(text, f >= 0.0 || f.is_nan(), spec)
        }
        ('s' | 'q', _) => match string_form(hook, arg)? {
            Some(s) => {
                let s = match spec.precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s,
                };
                if verb == 'q' {
                    quote(&s)
                } else {
                    s
                }
            }
            None => match arg {
                Value::Slice(s) => elementwise(hook, s, verb, spec)?,
                _ => bad_verb(hook, arg, verb)?,
            },
        },
        ('p', Value::Pointer(p)) => format!("{:p}", Rc::as_ptr(p)),
        ('p', Value::Ref(r)) => format!("{:p}", Rc::as_ptr(r)),
        ('d' | 'b' | 'o' | 'x' | 'X' | 'e' | 'f' | 'g', Value::Slice(s)) => {
            elementwise(hook, s, verb, spec)?
        }
        _ => bad_verb(hook, arg, verb)?,
    };
    Ok(pad(body, spec, numeric && !spec.minus))
}

/// The string a value renders as under `%s`, if it has one.
fn string_form(hook: &mut dyn MethodHook, arg: &Value) -> EvalResult<Option<String>> {
    if let Some(s) = hook.display_method(arg)? {
        return Ok(Some(s));
    }
    Ok(match arg {
        Value::Str(s) => Some(s.to_string()),
        Value::Error(e) => Some(e.message.clone()),
        Value::Struct(_) | Value::Pointer(_) | Value::Map(_) => {
            Some(format_v(hook, arg, false, false, 0)?)
        }
        _ => None,
    })
}

fn elementwise(
    hook: &mut dyn MethodHook,
    s: &SliceVal,
    verb: char,
    spec: &Spec,
) -> EvalResult<String> {
    let mut parts = Vec::with_capacity(s.len);
    let inner = Spec {
        width: None,
        ..*spec
    };
    for item in s.to_vec() {
        parts.push(format_verb(hook, &item, verb, &inner)?);
    }
    Ok(format!("[{}]", parts.join(" ")))
}

fn bad_verb(hook: &mut dyn MethodHook, arg: &Value, verb: char) -> EvalResult<String> {
    if matches!(arg, Value::Nil) {
        return Ok(format!("%!{verb}(<nil>)"));
    }
    Ok(format!(
        "%!{verb}({}={})",
        arg.type_name(),
        format_v(hook, arg, false, false, 0)?
    ))
}

fn signed(text: String, non_negative: bool, spec: &Spec) -> String {
    if non_negative && !text.starts_with('+') {
        if spec.plus {
            return format!("+{text}");
        }
        if spec.space {
            return format!(" {text}");
        }
    }
    text
}

fn radix(n: i64, base: u32, upper: bool, spec: &Spec) -> String {
    let magnitude = n.unsigned_abs();
    let digits = match base {
        2 => format!("{magnitude:b}"),
        8 => format!("{magnitude:o}"),
        _ if upper => format!("{magnitude:X}"),
        _ => format!("{magnitude:x}"),
    };
    let prefix = match (spec.sharp, base) {
        (true, 2) => "0b",
        (true, 8) => "0",
        (true, 16) if upper => "0X",
        (true, 16) => "0x",
        _ => "",
    };
    let sign = if n < 0 {
        "-"
    } else if spec.plus {
        "+"
    } else {
        ""
    };
    format!("{sign}{prefix}{digits}")
}

fn hex_bytes(bytes: &[u8], upper: bool) -> String {
    if upper {
        bytes.iter().map(|b| format!("{b:02X}")).collect()
    } else {
        hex_lower(bytes)
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn pad(body: String, spec: &Spec, zero_ok: bool) -> String {
    let Some(width) = spec.width else {
        return body;
    };
    let len = body.chars().count();
    if len >= width {
        return body;
    }
    let fill = width - len;
    if spec.minus {
        format!("{body}{}", " ".repeat(fill))
    } else if spec.zero && zero_ok {
        let (sign, digits) = match body.chars().next() {
            Some(c @ ('-' | '+' | ' ')) => (c.to_string(), &body[1..]),
            _ => (String::new(), body.as_str()),
        };
        format!("{sign}{}{digits}", "0".repeat(fill))
    } else {
        format!("{}{body}", " ".repeat(fill))
    }
}

// ----------------------------------------------------------------------
// %v
// ----------------------------------------------------------------------

/// Render `value` with `%v` (or `%+v` / `%#v`).
pub fn format_v(
    hook: &mut dyn MethodHook,
    value: &Value,
    plus: bool,
    sharp: bool,
    depth: usize,
) -> EvalResult<String> {
    if depth > MAX_DEPTH {
        return Ok("...".into());
    }
    if !sharp {
        if let Some(s) = hook.display_method(value)? {
            return Ok(s);
        }
    }
    Ok(match value {
        Value::Nil => "<nil>".into(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => format_float_v(*f),
        Value::Str(s) if sharp => quote(s),
        Value::Str(s) => s.to_string(),
        Value::Slice(s) => {
            let mut parts = Vec::with_capacity(s.len);
            for item in s.to_vec() {
                parts.push(format_v(hook, &item, plus, sharp, depth + 1)?);
            }
            if sharp {
                format!("{}{{{}}}", value.type_name(), parts.join(", "))
            } else {
                format!("[{}]", parts.join(" "))
            }
        }
        Value::Map(m) => format_map(hook, m, plus, sharp, depth)?,
        Value::Struct(s) => {
            let s = s.borrow();
            let mut parts = Vec::with_capacity(s.fields.len());
            for (def, field) in s.def.fields.iter().zip(s.fields.iter()) {
                let rendered = format_v(hook, field, plus, sharp, depth + 1)?;
                if plus || sharp {
                    parts.push(format!("{}:{rendered}", def.name));
                } else {
                    parts.push(rendered);
                }
            }
            if sharp {
                format!("main.{}{{{}}}", s.def.name, parts.join(", "))
            } else {
                format!("{{{}}}", parts.join(" "))
            }
        }
        Value::Pointer(p) if depth == 0 => {
            let inner = Value::Struct(p.clone());
            format!("&{}", format_v(hook, &inner, plus, sharp, depth + 1)?)
        }
        Value::Pointer(p) => format!("{:p}", Rc::as_ptr(p)),
        Value::Ref(r) => format!("{:p}", Rc::as_ptr(r)),
        Value::Error(e) => e.message.clone(),
        Value::Func(f) => format!("func {}", f.name()),
        Value::Tuple(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items.iter() {
                parts.push(format_v(hook, item, plus, sharp, depth + 1)?);
            }
            parts.join(" ")
        }
        Value::Stream(_) => "&{file}".into(),
    })
}

fn format_map(
    hook: &mut dyn MethodHook,
    m: &MapVal,
    plus: bool,
    sharp: bool,
    depth: usize,
) -> EvalResult<String> {
    let mut parts = Vec::with_capacity(m.len());
    for (k, v) in m.snapshot() {
        let key = format_v(hook, &k.to_value(), plus, sharp, depth + 1)?;
        let val = format_v(hook, &v, plus, sharp, depth + 1)?;
        parts.push(format!("{key}:{val}"));
    }
    Ok(if sharp {
        format!("map[string]interface {{}}{{{}}}", parts.join(", "))
    } else {
        format!("map[{}]", parts.join(" "))
    })
}

// ----------------------------------------------------------------------
// floats
// ----------------------------------------------------------------------

/// Shortest decimal digits and decimal exponent of a finite non-zero
/// float: `1234.5` -> (`"12345"`, 3).
fn shortest_digits(f: f64) -> (String, i32) {
    let sci = format!("{:e}", f.abs());
    let (mantissa, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    (digits, exp.parse().unwrap_or(0))
}

fn special(f: f64) -> Option<String> {
    if f.is_nan() {
        Some("NaN".into())
    } else if f.is_infinite() {
        Some(if f > 0.0 { "+Inf" } else { "-Inf" }.into())
    } else {
        None
    }
}

/// Go `%v` / `strconv.FormatFloat(f, 'g', -1, 64)`.
pub fn format_float_v(f: f64) -> String {
    format_float(f, 'g', -1)
}

/// `strconv.FormatFloat(f, fmt, prec, 64)` for `fmt` in `eEfFgG`.
/// A negative `prec` means the shortest representation.
pub fn format_float(f: f64, fmt: char, prec: i32) -> String {
    if let Some(s) = special(f) {
        return s;
    }
    let sign = if f.is_sign_negative() { "-" } else { "" };
    let body = match fmt {
        'e' | 'E' => exp_form(f.abs(), prec.max(-1), fmt == 'E'),
        'f' | 'F' => {
            if prec < 0 {
                shortest_fixed(f.abs())
            } else {
                format!("{:.*}", prec as usize, f.abs())
            }
        }
        _ => general_form(f.abs(), prec, fmt == 'G'),
    };
    format!("{sign}{body}")
}

fn fix_exponent(s: &str, upper: bool) -> String {
    let (mantissa, exp) = s.split_once('e').unwrap_or((s, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let e = if upper { 'E' } else { 'e' };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{e}{sign}{:02}", exp.abs())
}

fn exp_form(f: f64, prec: i32, upper: bool) -> String {
    let raw = if prec < 0 {
        format!("{f:e}")
    } else {
        format!("{:.*e}", prec as usize, f)
    };
    fix_exponent(&raw, upper)
}

fn shortest_fixed(f: f64) -> String {
    if f == 0.0 {
        return "0".into();
    }
    let (digits, exp) = shortest_digits(f);
    place_point(&digits, exp)
}

/// Render digit string `d1d2d3...` with value `d1.d2d3... * 10^exp`.
fn place_point(digits: &str, exp: i32) -> String {
    if exp < 0 {
        let zeros = "0".repeat((-exp - 1) as usize);
        return format!("0.{zeros}{digits}");
    }
    let int_len = exp as usize + 1;
    if digits.len() <= int_len {
        format!("{digits}{}", "0".repeat(int_len - digits.len()))
    } else {
        format!("{}.{}", &digits[..int_len], &digits[int_len..])
    }
}

fn general_form(f: f64, prec: i32, upper: bool) -> String {
    if f == 0.0 {
        return "0".into();
    }
    let (digits, exp) = if prec < 0 {
        shortest_digits(f)
    } else {
        let p = prec.max(1) as usize;
        let sci = format!("{:.*e}", p - 1, f);
        let (mantissa, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
        let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
        let digits = digits.trim_end_matches('0').to_string();
        let digits = if digits.is_empty() { "0".to_string() } else { digits };
        (digits, exp.parse().unwrap_or(0))
    };
    let eprec = if prec < 0 { 6 } else { prec.max(1) };
    if exp < -4 || exp >= eprec {
        let mantissa = if digits.len() > 1 {
            format!("{}.{}", &digits[..1], &digits[1..])
        } else {
            digits
        };
        fix_exponent(&format!("{mantissa}e{exp}"), upper)
    } else {
        place_point(&digits, exp)
    }
}

// ----------------------------------------------------------------------
// quoting
// ----------------------------------------------------------------------

/// `strconv.Quote`.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        push_escaped(&mut out, c, '"');
    }
    out.push('"');
    out
}

/// `strconv.QuoteRune`.
pub fn quote_rune(n: i64) -> String {
    let c = char::from_u32(n as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
    let mut out = String::from("'");
    push_escaped(&mut out, c, '\'');
    out.push('\'');
    out
}

fn push_escaped(out: &mut String, c: char, delim: char) {
    match c {
        '\x07' => out.push_str("\\a"),
        '\x08' => out.push_str("\\b"),
        '\x0C' => out.push_str("\\f"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\x0B' => out.push_str("\\v"),
        '\\' => out.push_str("\\\\"),
        c if c == delim => {
            out.push('\\');
            out.push(c);
        }
        c if (c as u32) < 0x20 || c as u32 == 0x7F => {
            out.push_str(&format!("\\x{:02x}", c as u32));
        }
        c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
        c => out.push(c),
    }
}

/// Formatting used by the `print`/`println` builtins.
pub fn format_builtin(value: &Value) -> String {
    match value {
        Value::Float(f) => {
            if let Some(s) = special(*f) {
                return s;
            }
            let s = exp_form(f.abs(), 6, false);
            let (mantissa, exp) = s.split_once('e').unwrap_or((&s, "+00"));
            let (sign, digits) = exp.split_at(1);
            let sign_m = if f.is_sign_negative() { '-' } else { '+' };
            format!("{sign_m}{mantissa}e{sign}{digits:0>3}")
        }
        Value::Nil => "nil".into(),
        Value::Str(s) => s.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Error(e) => format!("({:p})", Rc::as_ptr(e)),
        other => format!("({})", other.type_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoMethods;

    impl MethodHook for NoMethods {
        fn display_method(&mut self, _value: &Value) -> EvalResult<Option<String>> {
            Ok(None)
        }
    }

    #[test]
    fn oversized_widths_are_ignored() {
        assert_eq!(f("%*d", &[Value::Int(1 << 40), Value::Int(7)]), "7");
        assert_eq!(f("%9999999d", &[Value::Int(7)]), "7");
        assert_eq!(f("%*d", &[Value::Int(3), Value::Int(7)]), "  7");
    }

    fn f(format: &str, args: &[Value]) -> String {
        sprintf(&mut NoMethods, format, args).unwrap()
    }

    #[test]
    fn float_v_matches_go() {
        assert_eq!(format_float_v(3.0), "3");
        assert_eq!(format_float_v(2.5), "2.5");
        assert_eq!(format_float_v(0.1), "0.1");
        assert_eq!(format_float_v(1e6), "1e+06");
        assert_eq!(format_float_v(123456.0), "123456");
        assert_eq!(format_float_v(1234567.0), "1.234567e+06");
        assert_eq!(format_float_v(0.00001), "1e-05");
        assert_eq!(format_float_v(0.0001), "0.0001");
        assert_eq!(format_float_v(-1.5), "-1.5");
        assert_eq!(format_float_v(f64::NAN), "NaN");
        assert_eq!(format_float_v(f64::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn fixed_and_exponent_verbs() {
        assert_eq!(f("%.2f", &[Value::Float(3.14159)]), "3.14");
        assert_eq!(f("%f", &[Value::Float(1.5)]), "1.500000");
        assert_eq!(f("%e", &[Value::Float(1234.5678)]), "1.234568e+03");
        assert_eq!(f("%g", &[Value::Float(0.000012)]), "1.2e-05");
        assert_eq!(f("%.3g", &[Value::Float(3.14159)]), "3.14");
    }

    #[test]
    fn integer_verbs_and_padding() {
        assert_eq!(f("%d|%5d|%-5d|%05d", &[Value::Int(7), Value::Int(42), Value::Int(3), Value::Int(-12)]), "7|   42|3    |-0012");
        assert_eq!(f("%x %X %#x %b %o", &[Value::Int(255), Value::Int(255), Value::Int(255), Value::Int(5), Value::Int(8)]), "ff FF 0xff 101 10");
        assert_eq!(f("%+d", &[Value::Int(5)]), "+5");
        assert_eq!(f("%c%c", &[Value::Int(72), Value::Int(105)]), "Hi");
    }

    #[test]
    fn string_verbs() {
        assert_eq!(f("%s=%q", &[Value::str("k"), Value::str("a\"b\n")]), "k=\"a\\\"b\\n\"");
        assert_eq!(f("%-6s|%6s|", &[Value::str("ab"), Value::str("cd")]), "ab    |    cd|");
        assert_eq!(f("%.2s", &[Value::str("hello")]), "he");
        assert_eq!(f("%x", &[Value::str("hi")]), "6869");
    }

    #[test]
    fn composite_v() {
        let slice = Value::slice(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(f("%v", &[slice.clone()]), "[1 2]");
        assert_eq!(f("%d", &[slice]), "[1 2]");
        let m = Value::from_json(&serde_json::json!({"b": 2, "a": "x"}));
        assert_eq!(f("%v", &[m]), "map[a:x b:2]");
    }

    #[test]
    fn missing_extra_and_bad_verbs() {
        assert_eq!(f("%d %d", &[Value::Int(1)]), "1 %!d(MISSING)");
        assert_eq!(f("%d", &[Value::Int(1), Value::str("x")]), "1%!(EXTRA string=x)");
        assert_eq!(f("%d", &[Value::str("x")]), "%!d(string=x)");
        assert_eq!(f("%s", &[Value::Nil]), "%!s(<nil>)");
        assert_eq!(f("100%%", &[]), "100%");
    }

    #[test]
    fn print_spacing_rules() {
        let args = [Value::str("a"), Value::Int(1), Value::Int(2), Value::str("b")];
        assert_eq!(sprint(&mut NoMethods, &args).unwrap(), "a1 2b");
        assert_eq!(sprintln(&mut NoMethods, &args).unwrap(), "a 1 2 b\n");
    }

    #[test]
    fn type_verb() {
        assert_eq!(f("%T %T %T", &[Value::Int(1), Value::Float(1.0), Value::str("")]), "int float64 string");
    }

    #[test]
    fn format_float_strconv_forms() {
        assert_eq!(format_float(1.5, 'f', -1), "1.5");
        assert_eq!(format_float(100.0, 'f', -1), "100");
        assert_eq!(format_float(0.000123, 'f', -1), "0.000123");
        assert_eq!(format_float(2.0, 'f', 2), "2.00");
        assert_eq!(format_float(-3.25, 'e', 2), "-3.25e+00");
    }

    #[test]
    fn builtin_println_float_style() {
        assert_eq!(format_builtin(&Value::Float(1.5)), "+1.500000e+000");
    }
}
