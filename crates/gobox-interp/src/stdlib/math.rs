use std::f64::consts;

use super::{float_arg, int_arg, want, Member, Package, StdFn};
use crate::error::EvalResult;
use crate::eval::Evaluator;
use crate::value::Value;

pub(super) fn members() -> Package {
    let mut pkg: Package = [
        ("Pi", Member::Float(consts::PI)),
        ("E", Member::Float(consts::E)),
        ("Sqrt2", Member::Float(consts::SQRT_2)),
        ("Ln2", Member::Float(consts::LN_2)),
        ("Ln10", Member::Float(consts::LN_10)),
        ("Phi", Member::Float(1.618_033_988_749_895)),
        ("MaxFloat64", Member::Float(f64::MAX)),
        ("SmallestNonzeroFloat64", Member::Float(f64::from_bits(1))),
        ("MaxFloat32", Member::Float(f32::MAX as f64)),
        ("MaxInt", Member::Int(i64::MAX)),
        ("MinInt", Member::Int(i64::MIN)),
        ("MaxInt64", Member::Int(i64::MAX)),
        ("MinInt64", Member::Int(i64::MIN)),
        ("MaxInt32", Member::Int(i32::MAX as i64)),
        ("MinInt32", Member::Int(i32::MIN as i64)),
        ("MaxInt16", Member::Int(i16::MAX as i64)),
        ("MinInt16", Member::Int(i16::MIN as i64)),
        ("MaxInt8", Member::Int(i8::MAX as i64)),
        ("MinInt8", Member::Int(i8::MIN as i64)),
        ("MaxUint8", Member::Int(u8::MAX as i64)),
        ("MaxUint16", Member::Int(u16::MAX as i64)),
        ("MaxUint32", Member::Int(u32::MAX as i64)),
    ]
    .into_iter()
    .collect();

    let unary_fns: [(&'static str, StdFn); 21] = [
        ("Sqrt", |ev, a| unary(ev, a, "math.Sqrt", f64::sqrt)),
        ("Abs", |ev, a| unary(ev, a, "math.Abs", f64::abs)),
        ("Floor", |ev, a| unary(ev, a, "math.Floor", f64::floor)),
        ("Ceil", |ev, a| unary(ev, a, "math.Ceil", f64::ceil)),
        ("Round", |ev, a| unary(ev, a, "math.Round", f64::round)),
        ("RoundToEven", |ev, a| unary(ev, a, "math.RoundToEven", round_to_even)),
        ("Trunc", |ev, a| unary(ev, a, "math.Trunc", f64::trunc)),
        ("Cbrt", |ev, a| unary(ev, a, "math.Cbrt", f64::cbrt)),
        ("Exp", |ev, a| unary(ev, a, "math.Exp", f64::exp)),
        ("Exp2", |ev, a| unary(ev, a, "math.Exp2", f64::exp2)),
        ("Log", |ev, a| unary(ev, a, "math.Log", f64::ln)),
        ("Log2", |ev, a| unary(ev, a, "math.Log2", f64::log2)),
        ("Log10", |ev, a| unary(ev, a, "math.Log10", f64::log10)),
        ("Log1p", |ev, a| unary(ev, a, "math.Log1p", f64::ln_1p)),
        ("Sin", |ev, a| unary(ev, a, "math.Sin", f64::sin)),
        ("Cos", |ev, a| unary(ev, a, "math.Cos", f64::cos)),
        ("Tan", |ev, a| unary(ev, a, "math.Tan", f64::tan)),
        ("Asin", |ev, a| unary(ev, a, "math.Asin", f64::asin)),
        ("Acos", |ev, a| unary(ev, a, "math.Acos", f64::acos)),
        ("Atan", |ev, a| unary(ev, a, "math.Atan", f64::atan)),
        ("Tanh", |ev, a| unary(ev, a, "math.Tanh", f64::tanh)),
    ];
    let binary_fns: [(&'static str, StdFn); 8] = [
        ("Pow", |ev, a| binary(ev, a, "math.Pow", f64::powf)),
        ("Atan2", |ev, a| binary(ev, a, "math.Atan2", f64::atan2)),
        ("Hypot", |ev, a| binary(ev, a, "math.Hypot", f64::hypot)),
        ("Mod", |ev, a| binary(ev, a, "math.Mod", |x, y| x % y)),
        ("Max", |ev, a| binary(ev, a, "math.Max", go_max)),
        ("Min", |ev, a| binary(ev, a, "math.Min", go_min)),
        ("Dim", |ev, a| binary(ev, a, "math.Dim", |x, y| (x - y).max(0.0))),
        ("Copysign", |ev, a| binary(ev, a, "math.Copysign", f64::copysign)),
    ];
    let other_fns: [(&'static str, StdFn); 5] = [
        ("Inf", inf),
        ("NaN", |_, _| Ok(Value::Float(f64::NAN))),
        ("IsNaN", is_nan),
        ("IsInf", is_inf),
        ("Signbit", signbit),
    ];
    for (name, f) in unary_fns.into_iter().chain(binary_fns).chain(other_fns) {
        pkg.insert(name, Member::Func(f));
    }
    pkg
}

fn unary(
    _: &mut Evaluator,
    args: Vec<Value>,
    func: &str,
    op: fn(f64) -> f64,
) -> EvalResult<Value> {
    want(&args, 1, func)?;
    Ok(Value::Float(op(float_arg(&args, 0, func)?)))
}

fn binary(
    _: &mut Evaluator,
    args: Vec<Value>,
    func: &str,
    op: fn(f64, f64) -> f64,
) -> EvalResult<Value> {
    want(&args, 2, func)?;
    Ok(Value::Float(op(
        float_arg(&args, 0, func)?,
        float_arg(&args, 1, func)?,
    )))
}

fn round_to_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
        r - x.signum()
    } else {
        r
    }
}

/// `math.Max`: NaN wins, and +0 beats -0.
fn go_max(x: f64, y: f64) -> f64 {
    if x.is_nan() || y.is_nan() {
        f64::NAN
    } else if x == 0.0 && y == 0.0 {
        if x.is_sign_negative() {
            y
        } else {
            x
        }
    } else {
        x.max(y)
    }
}

fn go_min(x: f64, y: f64) -> f64 {
    if x.is_nan() || y.is_nan() {
        f64::NAN
    } else if x == 0.0 && y == 0.0 {
        if x.is_sign_negative() {
            x
        } else {
            y
        }
    } else {
        x.min(y)
    }
}

fn inf(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "math.Inf")?;
    let sign = int_arg(&args, 0, "math.Inf")?;
    Ok(Value::Float(if sign >= 0 {
        f64::INFINITY
    } else {
        f64::NEG_INFINITY
    }))
}

fn is_nan(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "math.IsNaN")?;
    Ok(Value::Bool(float_arg(&args, 0, "math.IsNaN")?.is_nan()))
}

fn is_inf(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 2, "math.IsInf")?;
    let f = float_arg(&args, 0, "math.IsInf")?;
    let sign = int_arg(&args, 1, "math.IsInf")?;
    Ok(Value::Bool(
        (sign >= 0 && f == f64::INFINITY) || (sign <= 0 && f == f64::NEG_INFINITY),
    ))
}

fn signbit(_: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    want(&args, 1, "math.Signbit")?;
    Ok(Value::Bool(
        float_arg(&args, 0, "math.Signbit")?.is_sign_negative(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_even_breaks_ties_downward_on_even() {
        assert_eq!(round_to_even(2.5), 2.0);
        assert_eq!(round_to_even(3.5), 4.0);
        assert_eq!(round_to_even(-2.5), -2.0);
        assert_eq!(round_to_even(2.4), 2.0);
    }

    #[test]
    fn max_min_follow_go_special_cases() {
        assert!(go_max(1.0, f64::NAN).is_nan());
        assert!(go_max(-0.0, 0.0).is_sign_positive());
        assert!(go_min(0.0, -0.0).is_sign_negative());
        assert_eq!(go_min(3.0, 2.0), 2.0);
    }

    #[test]
    fn every_function_member_is_registered() {
        let pkg = members();
        for name in ["Sqrt", "Pow", "Inf", "IsNaN", "Mod", "Floor", "Max"] {
            assert!(matches!(pkg.get(name), Some(Member::Func(_))), "{name}");
        }
        assert!(matches!(pkg.get("Pi"), Some(Member::Float(_))));
    }
}
