//! `encoding/json` marshalling with Go's output rules: sorted map keys,
//! struct tags, HTML-safe string escaping and Go float formatting.

use super::{ok, str_arg, want, Package};
use crate::error::EvalResult;
use crate::eval::Evaluator;
use crate::format;
use crate::value::{Func, Value};

pub(super) fn members() -> Package {
    super::funcs(&[("Marshal", marshal), ("MarshalIndent", marshal_indent)])
}

const MAX_DEPTH: usize = 100;

struct Indent<'a> {
    prefix: &'a str,
    unit: &'a str,
}

fn as_bytes(text: &str) -> Value {
    Value::slice(text.bytes().map(|b| Value::Int(b as i64)).collect())
}

fn result(encoded: Result<String, String>) -> Value {
    match encoded {
        Ok(text) => ok(as_bytes(&text)),
        Err(message) => Value::tuple(vec![Value::Nil, Value::error(message)]),
    }
}

fn marshal(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "json.Marshal")?;
    let mut out = String::new();
    Ok(result(encode(&args[0], &mut out, None, 0).map(|()| out)))
}

fn marshal_indent(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 3, "json.MarshalIndent")?;
    let prefix = str_arg(&args, 1, "json.MarshalIndent")?;
    let unit = str_arg(&args, 2, "json.MarshalIndent")?;
    let indent = Indent {
        prefix: &prefix,
        unit: &unit,
    };
    let mut out = String::new();
    Ok(result(
        encode(&args[0], &mut out, Some(&indent), 0).map(|()| out),
    ))
}

fn newline(out: &mut String, indent: Option<&Indent<'_>>, level: usize) {
    if let Some(ind) = indent {
        out.push('\n');
        out.push_str(ind.prefix);
        for _ in 0..level {
            out.push_str(ind.unit);
        }
    }
}

fn encode(
    value: &Value,
    out: &mut String,
    indent: Option<&Indent<'_>>,
    level: usize,
) -> Result<(), String> {
    if level > MAX_DEPTH {
        return Err("json: unsupported value: encountered a cycle".into());
    }
    match value {
        Value::Nil => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => out.push_str(&encode_float(*f)?),
        Value::Str(s) => encode_string(s, out),
        Value::Slice(s) if s.is_nil() => out.push_str("null"),
        Value::Slice(s) => {
            let items = s.to_vec();
            if items.is_empty() {
                out.push_str("[]");
                return Ok(());
            }
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                newline(out, indent, level + 1);
                encode(item, out, indent, level + 1)?;
            }
            newline(out, indent, level);
            out.push(']');
        }
        Value::Map(m) => match &m.entries {
            None => out.push_str("null"),
            Some(entries) => {
                let mut pairs: Vec<(String, Value)> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect();
                pairs.sort_by(|a, b| a.0.cmp(&b.0));
                encode_object(&pairs, out, indent, level)?;
            }
        },
        Value::Struct(s) | Value::Pointer(s) => {
            let fields = s.borrow().json_fields();
            encode_object(&fields, out, indent, level)?;
        }
        Value::Ref(cell) => {
            let inner = cell.borrow().clone();
            encode(&inner, out, indent, level + 1)?;
        }
        Value::Error(_) => out.push_str("{}"),
        Value::Func(f) => {
            let kind = match f {
                Func::Builtin(_) | Func::Std(..) | Func::Native(..) => "func",
                Func::Closure(_) | Func::Method(_) => "func()",
            };
            return Err(format!("json: unsupported type: {kind}"));
        }
        other => return Err(format!("json: unsupported type: {}", other.type_name())),
    }
    Ok(())
}

fn encode_object(
    pairs: &[(String, Value)],
    out: &mut String,
    indent: Option<&Indent<'_>>,
    level: usize,
) -> Result<(), String> {
    if pairs.is_empty() {
        out.push_str("{}");
        return Ok(());
    }
    out.push('{');
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        newline(out, indent, level + 1);
        encode_string(key, out);
        out.push(':');
        if indent.is_some() {
            out.push(' ');
        }
        encode(value, out, indent, level + 1)?;
    }
    newline(out, indent, level);
    out.push('}');
    Ok(())
}

/// Go's float encoding: shortest representation, exponent form outside
/// `[1e-6, 1e21)`, and a trimmed `e-07`-style exponent.
fn encode_float(f: f64) -> Result<String, String> {
    if f.is_nan() || f.is_infinite() {
        return Err(format!(
            "json: unsupported value: {}",
            format::format_float(f, 'g', -1)
        ));
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-6..1e21).contains(&abs) {
        let mut s = format::format_float(f, 'e', -1);
        let n = s.len();
        let bytes = s.as_bytes();
        if n >= 4 && bytes[n - 4] == b'e' && bytes[n - 3] == b'-' && bytes[n - 2] == b'0' {
            s.remove(n - 2);
        }
        Ok(s)
    } else {
        Ok(format::format_float(f, 'f', -1))
    }
}

/// JSON string with Go's HTML-safe escaping.
fn encode_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '<' | '>' | '&' | '\u{2028}' | '\u{2029}' => {
                out.push_str(&format!("\\u{:04x}", c as u32))
            }
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}
