use super::{funcs, int_arg, str_arg, want, Package};
use crate::error::{panic, runtime, EvalResult};
use crate::eval::Evaluator;
use crate::value::Value;

pub(super) fn members() -> Package {
    funcs(&[
        ("Contains", contains),
        ("ContainsAny", contains_any),
        ("ContainsRune", contains_rune),
        ("HasPrefix", has_prefix),
        ("HasSuffix", has_suffix),
        ("Index", index),
        ("IndexAny", index_any),
        ("IndexByte", index_byte),
        ("IndexRune", index_rune),
        ("LastIndex", last_index),
        ("Split", split),
        ("SplitN", split_n),
        ("Fields", fields),
        ("Join", join),
        ("Replace", replace),
        ("ReplaceAll", replace_all),
        ("ToUpper", to_upper),
        ("ToLower", to_lower),
        ("Title", title),
        ("TrimSpace", trim_space),
        ("Trim", trim),
        ("TrimLeft", trim_left),
        ("TrimRight", trim_right),
        ("TrimPrefix", trim_prefix),
        ("TrimSuffix", trim_suffix),
        ("TrimFunc", trim_func),
        ("Repeat", repeat),
        ("Count", count),
        ("EqualFold", equal_fold),
        ("Compare", compare),
        ("Cut", cut),
        ("Map", map),
    ])
}

fn two_strs(args: &[Value], func: &str) -> EvalResult<(std::rc::Rc<str>, std::rc::Rc<str>)> {
    want(args, 2, func)?;
    Ok((str_arg(args, 0, func)?, str_arg(args, 1, func)?))
}

fn offset(found: Option<usize>) -> Value {
    Value::Int(found.map_or(-1, |i| i as i64))
}

fn strs(items: impl IntoIterator<Item = impl AsRef<str>>) -> Value {
    Value::slice(items.into_iter().map(|s| Value::str(s.as_ref())).collect())
}

fn contains(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (s, sub) = two_strs(&args, "strings.Contains")?;
    Ok(Value::Bool(s.contains(&*sub)))
}

fn contains_any(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (s, chars) = two_strs(&args, "strings.ContainsAny")?;
    Ok(Value::Bool(s.chars().any(|c: char| chars.contains(c))))
}

fn contains_rune(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "strings.ContainsRune")?;
    let s = str_arg(&args, 0, "strings.ContainsRune")?;
    let r = int_arg(&args, 1, "strings.ContainsRune")?;
    Ok(Value::Bool(
        char::from_u32(r as u32).is_some_and(|c| s.contains(c)),
    ))
}

fn has_prefix(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (s, prefix) = two_strs(&args, "strings.HasPrefix")?;
    Ok(Value::Bool(s.starts_with(&*prefix)))
}

fn has_suffix(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (s, suffix) = two_strs(&args, "strings.HasSuffix")?;
    Ok(Value::Bool(s.ends_with(&*suffix)))
}

fn index(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (s, sub) = two_strs(&args, "strings.Index")?;
    Ok(offset(s.find(&*sub)))
}

fn index_any(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (s, chars) = two_strs(&args, "strings.IndexAny")?;
    Ok(offset(s.find(|c: char| chars.contains(c))))
}

fn index_byte(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "strings.IndexByte")?;
    let s = str_arg(&args, 0, "strings.IndexByte")?;
    let b = int_arg(&args, 1, "strings.IndexByte")? as u8;
    Ok(offset(s.bytes().position(|x| x == b)))
}

fn index_rune(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "strings.IndexRune")?;
    let s = str_arg(&args, 0, "strings.IndexRune")?;
    let r = int_arg(&args, 1, "strings.IndexRune")?;
    Ok(offset(char::from_u32(r as u32).and_then(|c| s.find(c))))
}

fn last_index(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (s, sub) = two_strs(&args, "strings.LastIndex")?;
    Ok(offset(s.rfind(&*sub)))
}

fn split(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (s, sep) = two_strs(&args, "strings.Split")?;
    Ok(split_impl(&s, &sep, -1))
}

fn split_n(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 3, "strings.SplitN")?;
    let s = str_arg(&args, 0, "strings.SplitN")?;
    let sep = str_arg(&args, 1, "strings.SplitN")?;
    let n = int_arg(&args, 2, "strings.SplitN")?;
    Ok(split_impl(&s, &sep, n))
}

/// Go `strings.SplitN`: an empty separator splits after each rune, `n < 0`
/// means no limit and `n == 0` yields a nil slice.
fn split_impl(s: &str, sep: &str, n: i64) -> Value {
    if n == 0 {
        return Value::Slice(crate::value::SliceVal::nil());
    }
    let parts: Vec<String> = if sep.is_empty() {
        let chars: Vec<String> = s.chars().map(String::from).collect();
        if n > 0 && chars.len() > n as usize {
            let head = n as usize - 1;
            let mut out: Vec<String> = chars[..head].to_vec();
            out.push(chars[head..].concat());
            out
        } else {
            chars
        }
    } else if n > 0 {
        s.splitn(n as usize, sep).map(String::from).collect()
    } else {
        s.split(sep).map(String::from).collect()
    };
    strs(parts)
}

fn fields(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "strings.Fields")?;
    let s = str_arg(&args, 0, "strings.Fields")?;
    Ok(strs(s.split_whitespace()))
}

fn join(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "strings.Join")?;
    let items = match &args[0] {
        Value::Slice(s) => s.to_vec(),
        Value::Nil => Vec::new(),
        other => {
            return Err(runtime(format!(
                "cannot use {} as []string value in argument to strings.Join",
                other.type_name()
            )))
        }
    };
    let sep = str_arg(&args, 1, "strings.Join")?;
    let parts = items
        .iter()
        .map(|v| v.as_str().map(|s| s.to_string()))
        .collect::<EvalResult<Vec<_>>>()?;
    Ok(Value::str(&parts.join(&*sep)))
}

fn replace(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 4, "strings.Replace")?;
    let s = str_arg(&args, 0, "strings.Replace")?;
    let old = str_arg(&args, 1, "strings.Replace")?;
    let new = str_arg(&args, 2, "strings.Replace")?;
    let n = int_arg(&args, 3, "strings.Replace")?;
    Ok(Value::str(&if n < 0 {
        s.replace(&*old, &new)
    } else {
        s.replacen(&*old, &new, n as usize)
    }))
}

fn replace_all(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 3, "strings.ReplaceAll")?;
    let s = str_arg(&args, 0, "strings.ReplaceAll")?;
    let old = str_arg(&args, 1, "strings.ReplaceAll")?;
    let new = str_arg(&args, 2, "strings.ReplaceAll")?;
    Ok(Value::str(&s.replace(&*old, &new)))
}

fn one_str(args: &[Value], func: &str) -> EvalResult<std::rc::Rc<str>> {
    want(args, 1, func)?;
    str_arg(args, 0, func)
}

fn to_upper(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::str(&one_str(&args, "strings.ToUpper")?.to_uppercase()))
}

fn to_lower(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::str(&one_str(&args, "strings.ToLower")?.to_lowercase()))
}

/// Upper-cases the first letter of each word.
fn title(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let s = one_str(&args, "strings.Title")?;
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !(c.is_alphanumeric() || c == '_' || c == '\'');
    }
    Ok(Value::str(&out))
}

fn trim_space(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::str(one_str(&args, "strings.TrimSpace")?.trim()))
}

fn trim(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (s, cutset) = two_strs(&args, "strings.Trim")?;
    Ok(Value::str(s.trim_matches(|c: char| cutset.contains(c))))
}

fn trim_left(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (s, cutset) = two_strs(&args, "strings.TrimLeft")?;
    Ok(Value::str(s.trim_start_matches(|c: char| cutset.contains(c))))
}

fn trim_right(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (s, cutset) = two_strs(&args, "strings.TrimRight")?;
    Ok(Value::str(s.trim_end_matches(|c: char| cutset.contains(c))))
}

fn trim_prefix(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (s, prefix) = two_strs(&args, "strings.TrimPrefix")?;
    Ok(Value::str(s.strip_prefix(&*prefix).unwrap_or(&*s)))
}

fn trim_suffix(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (s, suffix) = two_strs(&args, "strings.TrimSuffix")?;
    Ok(Value::str(s.strip_suffix(&*suffix).unwrap_or(&*s)))
}

fn rune_predicate(ev: &mut Evaluator, f: &Value, c: char) -> EvalResult<bool> {
    ev.call_value(f, vec![Value::Int(c as i64)])?.as_bool()
}

fn trim_func(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "strings.TrimFunc")?;
    let s = str_arg(&args, 0, "strings.TrimFunc")?;
    let f = &args[1];
    let mut start = s.len();
    for (i, c) in s.char_indices() {
        if !rune_predicate(ev, f, c)? {
            start = i;
            break;
        }
    }
    let mut end = start;
    for (i, c) in s[start..].char_indices().rev() {
        if !rune_predicate(ev, f, c)? {
            end = start + i + c.len_utf8();
            break;
        }
    }
    Ok(Value::str(&s[start..end]))
}

fn map(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "strings.Map")?;
    let f = args[0].clone();
    let s = str_arg(&args, 1, "strings.Map")?;
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let mapped = ev.call_value(&f, vec![Value::Int(c as i64)])?.as_int()?;
        if mapped >= 0 {
            out.push(char::from_u32(mapped as u32).unwrap_or('\u{FFFD}'));
        }
    }
    Ok(Value::str(&out))
}

fn repeat(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "strings.Repeat")?;
    let s = str_arg(&args, 0, "strings.Repeat")?;
    let n = int_arg(&args, 1, "strings.Repeat")?;
    if n < 0 {
        return Err(panic("strings: negative Repeat count"));
    }
    let total = s.len().checked_mul(n as usize).unwrap_or(usize::MAX);
    ev.check_alloc(total, "strings: Repeat output length overflow")?;
    Ok(Value::str(&s.repeat(n as usize)))
}

fn count(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (s, sub) = two_strs(&args, "strings.Count")?;
    let n = if sub.is_empty() {
        s.chars().count() + 1
    } else {
        s.matches(&*sub).count()
    };
    Ok(Value::Int(n as i64))
}

fn equal_fold(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (a, b) = two_strs(&args, "strings.EqualFold")?;
    Ok(Value::Bool(a.to_lowercase() == b.to_lowercase()))
}

fn compare(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (a, b) = two_strs(&args, "strings.Compare")?;
    Ok(Value::Int(match a.cmp(&b) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }))
}

fn cut(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    let (s, sep) = two_strs(&args, "strings.Cut")?;
    Ok(match s.split_once(&*sep) {
        Some((before, after)) => Value::tuple(vec![
            Value::str(before),
            Value::str(after),
            Value::Bool(true),
        ]),
        None => Value::tuple(vec![Value::Str(s.clone()), Value::str(""), Value::Bool(false)]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(v: Value) -> Vec<String> {
        match v {
            Value::Slice(s) => s
                .to_vec()
                .iter()
                .map(|v| v.as_str().unwrap().to_string())
                .collect(),
            _ => panic!("not a slice"),
        }
    }

    #[test]
    fn split_matches_go_edge_cases() {
        assert_eq!(parts(split_impl("a,b,c", ",", -1)), ["a", "b", "c"]);
        assert_eq!(parts(split_impl("a,b,c", ",", 2)), ["a", "b,c"]);
        assert_eq!(parts(split_impl("abc", "", -1)), ["a", "b", "c"]);
        assert_eq!(parts(split_impl("abc", "", 2)), ["a", "bc"]);
        assert_eq!(parts(split_impl("", ",", -1)), [""]);
        assert!(split_impl("a,b", ",", 0).is_nil());
    }
}
