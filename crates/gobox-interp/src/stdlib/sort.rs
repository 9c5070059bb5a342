use std::cmp::Ordering;

use super::{funcs, int_arg, want, Package};
use crate::error::{runtime, EvalResult};
use crate::eval::Evaluator;
use crate::value::{SliceVal, Value};

pub(super) fn members() -> Package {
    funcs(&[
        ("Ints", ints),
        ("Strings", strings),
        ("Float64s", float64s),
        ("Slice", slice),
        ("SliceStable", slice),
        ("SliceIsSorted", slice_is_sorted),
        ("Sort", sort_interface),
        ("Stable", sort_interface),
        ("Search", search),
        ("SearchInts", search_ints),
        ("SearchStrings", search_strings),
        ("IntsAreSorted", ints_are_sorted),
        ("StringsAreSorted", strings_are_sorted),
    ])
}

fn slice_arg(args: &[Value], func: &str) -> EvalResult<Option<SliceVal>> {
    match args.first() {
        Some(Value::Slice(s)) => Ok(Some(s.clone())),
        Some(Value::Nil) => Ok(None),
        Some(other) => Err(runtime(format!(
            "cannot use {} as slice value in argument to {func}",
            other.type_name()
        ))),
        None => Err(runtime(format!("not enough arguments in call to {func}"))),
    }
}

/// Sort a slice in place with a comparator over element values.
fn sort_by_value(
    args: &[Value],
    func: &str,
    cmp: fn(&Value, &Value) -> Ordering,
) -> EvalResult<Value> {
    want(args, 1, func)?;
    let Some(s) = slice_arg(args, func)? else {
        return Ok(Value::Nil);
    };
    let mut items = s.to_vec();
    items.sort_by(cmp);
    for (i, v) in items.into_iter().enumerate() {
        s.set(i, v);
    }
    Ok(Value::Nil)
}

fn cmp_int(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn cmp_str(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// NaNs order first, as in `sort.Float64s`.
fn cmp_float(a: &Value, b: &Value) -> Ordering {
    let (x, y) = (a.as_float().unwrap_or(f64::NAN), b.as_float().unwrap_or(f64::NAN));
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

fn ints(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    sort_by_value(&args, "sort.Ints", cmp_int)
}

fn strings(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    sort_by_value(&args, "sort.Strings", cmp_str)
}

fn float64s(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    sort_by_value(&args, "sort.Float64s", cmp_float)
}

/// Stable merge sort of an index permutation with a fallible comparator.
fn merge_sort(
    idx: &mut [usize],
    less: &mut dyn FnMut(usize, usize) -> EvalResult<bool>,
) -> EvalResult<()> {
    let n = idx.len();
    if n < 2 {
        return Ok(());
    }
    let mid = n / 2;
    merge_sort(&mut idx[..mid], less)?;
    merge_sort(&mut idx[mid..], less)?;
    let mut merged = Vec::with_capacity(n);
    let (mut i, mut j) = (0, mid);
    while i < mid && j < n {
        if less(idx[j], idx[i])? {
            merged.push(idx[j]);
            j += 1;
        } else {
            merged.push(idx[i]);
            i += 1;
        }
    }
    merged.extend_from_slice(&idx[i..mid]);
    merged.extend_from_slice(&idx[j..n]);
    idx.copy_from_slice(&merged);
    Ok(())
}

/// `sort.Slice(x, less)`. The guest's `less` indexes the slice it closed
/// over, so the slice stays untouched while an index permutation is sorted
/// and the result is applied in one pass.
fn slice(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "sort.Slice")?;
    let Some(s) = slice_arg(&args, "sort.Slice")? else {
        return Ok(Value::Nil);
    };
    let less = args[1].clone();
    let mut idx: Vec<usize> = (0..s.len).collect();
    merge_sort(&mut idx, &mut |i, j| {
        ev.call_value(&less, vec![Value::Int(i as i64), Value::Int(j as i64)])?
            .as_bool()
    })?;
    let items = s.to_vec();
    for (k, src) in idx.into_iter().enumerate() {
        s.set(k, items[src].clone());
    }
    Ok(Value::Nil)
}

fn slice_is_sorted(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "sort.SliceIsSorted")?;
    let Some(s) = slice_arg(&args, "sort.SliceIsSorted")? else {
        return Ok(Value::Bool(true));
    };
    for i in (1..s.len).rev() {
        let pair = vec![Value::Int(i as i64), Value::Int(i as i64 - 1)];
        if ev.call_value(&args[1], pair)?.as_bool()? {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

/// `sort.Sort` over a value with `Len`, `Less` and `Swap` methods.
fn sort_interface(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "sort.Sort")?;
    let data = args[0].clone();
    let n = ev.call_method(data.clone(), "Len", Vec::new(), false)?.as_int()?;
    for i in 1..n {
        let mut j = i;
        while j > 0 {
            let pair = vec![Value::Int(j), Value::Int(j - 1)];
            if !ev.call_method(data.clone(), "Less", pair.clone(), false)?.as_bool()? {
                break;
            }
            ev.call_method(data.clone(), "Swap", pair, false)?;
            j -= 1;
        }
    }
    Ok(Value::Nil)
}

/// Smallest index in `[0, n)` for which `f` is true, or `n`.
fn search(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "sort.Search")?;
    let n = int_arg(&args, 0, "sort.Search")?;
    let (mut lo, mut hi) = (0i64, n);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if ev.call_value(&args[1], vec![Value::Int(mid)])?.as_bool()? {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    Ok(Value::Int(lo))
}

fn lower_bound(items: &[Value], target: &Value, cmp: fn(&Value, &Value) -> Ordering) -> i64 {
    items.partition_point(|v| cmp(v, target) == Ordering::Less) as i64
}

fn search_ints(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "sort.SearchInts")?;
    let items = slice_arg(&args, "sort.SearchInts")?.map(|s| s.to_vec()).unwrap_or_default();
    Ok(Value::Int(lower_bound(&items, &args[1], cmp_int)))
}

fn search_strings(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "sort.SearchStrings")?;
    let items = slice_arg(&args, "sort.SearchStrings")?.map(|s| s.to_vec()).unwrap_or_default();
    Ok(Value::Int(lower_bound(&items, &args[1], cmp_str)))
}

fn is_sorted(args: &[Value], func: &str, cmp: fn(&Value, &Value) -> Ordering) -> EvalResult<Value> {
    want(args, 1, func)?;
    let items = slice_arg(args, func)?.map(|s| s.to_vec()).unwrap_or_default();
    Ok(Value::Bool(
        items.windows(2).all(|w| cmp(&w[0], &w[1]) != Ordering::Greater),
    ))
}

fn ints_are_sorted(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    is_sorted(&args, "sort.IntsAreSorted", cmp_int)
}

fn strings_are_sorted(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    is_sorted(&args, "sort.StringsAreSorted", cmp_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sort_is_stable() {
        let keys = [3, 1, 3, 2, 1];
        let mut idx: Vec<usize> = (0..keys.len()).collect();
        merge_sort(&mut idx, &mut |i, j| Ok(keys[i] < keys[j])).unwrap();
        assert_eq!(idx, vec![1, 4, 3, 0, 2]);
    }

    #[test]
    fn merge_sort_propagates_comparator_errors() {
        let mut idx: Vec<usize> = (0..4).collect();
        let err = merge_sort(&mut idx, &mut |_, _| Err(runtime("boom"))).unwrap_err();
        assert!(matches!(err, crate::error::EvalError::Runtime(m) if m == "boom"));
    }

    #[test]
    fn float_order_puts_nan_first() {
        let mut items = vec![Value::Float(2.0), Value::Float(f64::NAN), Value::Float(1.0)];
        items.sort_by(cmp_float);
        assert!(matches!(items[0], Value::Float(f) if f.is_nan()));
        assert!(matches!(items[1], Value::Float(f) if f == 1.0));
    }

    #[test]
    fn lower_bound_finds_insertion_point() {
        let items: Vec<Value> = [1, 3, 5, 7].into_iter().map(Value::Int).collect();
        assert_eq!(lower_bound(&items, &Value::Int(5), cmp_int), 2);
        assert_eq!(lower_bound(&items, &Value::Int(6), cmp_int), 3);
        assert_eq!(lower_bound(&items, &Value::Int(9), cmp_int), 4);
    }
}
