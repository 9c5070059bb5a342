//! Predeclared functions and type conversions.

use std::cell::RefCell;
use std::rc::Rc;

use super::{basic_of, wrap_int, Basic, Evaluator, Env, TypeDef};
use crate::ast::{Expr, TypeExpr, UnOp};
use crate::error::{panic, runtime, EvalResult};
use crate::format::{self, format_builtin};
use crate::value::{MapKey, MapVal, SliceVal, StructVal, Value};

/// Elements zero-filled by `make` between interrupt checks.
const FILL_TICK: i64 = 4096;

impl Evaluator {
    /// Builtins called by name; `make` and `new` take a type operand.
    pub(crate) fn call_builtin(
        &mut self,
        name: &'static str,
        args: &[Expr],
        spread: bool,
        scope: &Env,
    ) -> EvalResult<Value> {
        match name {
            "make" => {
                let Some(first) = args.first() else {
                    return Err(runtime("not enough arguments for make()"));
                };
                let ty = type_operand(first)?;
                let mut sizes = Vec::with_capacity(2);
                for arg in &args[1..] {
                    sizes.push(self.eval(arg, scope)?.as_int()?);
                }
                self.make(&ty, &sizes)
            }
            "new" => {
                let [arg] = args else {
                    return Err(runtime("wrong number of arguments for new()"));
                };
                let ty = type_operand(arg)?;
                Ok(match self.zero_value(&ty)? {
                    Value::Struct(s) => Value::Pointer(s),
                    other => Value::Ref(Rc::new(RefCell::new(other))),
                })
            }
            "append" if spread => {
                let mut argv = self.eval_args(args, scope)?;
                let tail = match argv.pop() {
                    Some(Value::Slice(s)) => s.to_vec(),
                    Some(Value::Str(s)) => s.bytes().map(|b| Value::Int(b as i64)).collect(),
                    Some(Value::Nil) => Vec::new(),
                    _ => return Err(runtime("cannot use ... with non-slice argument")),
                };
                argv.extend(tail);
                self.call_builtin_values(name, argv)
            }
            _ => {
                let mut argv = self.eval_args(args, scope)?;
                if spread {
                    argv = super::expand_spread(argv)?;
                }
                self.call_builtin_values(name, argv)
            }
        }
    }

    fn make(&mut self, ty: &TypeExpr, sizes: &[i64]) -> EvalResult<Value> {
        let resolved = self.underlying(ty).clone();
        match &resolved {
            TypeExpr::Slice(elem) => {
                let len = sizes.first().copied().ok_or_else(|| {
                    runtime("invalid operation: make([]T) expects 2 or 3 arguments")
                })?;
                let cap = sizes.get(1).copied().unwrap_or(len);
                if len < 0 {
                    return Err(panic("runtime error: makeslice: len out of range"));
                }
                if cap < len {
                    return Err(panic("runtime error: makeslice: cap out of range"));
                }
                self.check_alloc(len as usize, "runtime error: makeslice: len out of range")?;
                self.check_alloc(cap as usize, "runtime error: makeslice: cap out of range")?;
                let mut items = Vec::with_capacity(len as usize);
                for i in 0..len {
                    if i % FILL_TICK == 0 {
                        self.tick()?;
                    }
                    items.push(self.zero_value(elem)?);
                }
                Ok(Value::Slice(SliceVal::with_capacity(items, cap as usize)))
            }
            TypeExpr::Map(_, value) => Ok(Value::Map(MapVal::new(self.zero_value(value)?))),
            other => Err(runtime(format!(
                "invalid argument: cannot make {}",
                super::expressions::type_string(other)
            ))),
        }
    }

    /// Builtins over already-evaluated arguments.
    pub(crate) fn call_builtin_values(
        &mut self,
        name: &str,
        mut args: Vec<Value>,
    ) -> EvalResult<Value> {
        match name {
            "len" => {
                let [v] = args.as_slice() else {
                    return Err(arity(name));
                };
                let n = match v {
                    Value::Str(s) => s.len(),
                    Value::Slice(s) => s.len,
                    Value::Map(m) => m.len(),
                    Value::Nil => 0,
                    Value::Ref(cell) => match &*cell.borrow() {
                        Value::Slice(s) => s.len,
                        other => return Err(invalid_arg(name, other)),
                    },
                    other => return Err(invalid_arg(name, other)),
                };
                Ok(Value::Int(n as i64))
            }
            "cap" => {
                let [v] = args.as_slice() else {
                    return Err(arity(name));
                };
                Ok(Value::Int(match v {
                    Value::Slice(s) => s.cap,
                    Value::Nil => 0,
                    other => return Err(invalid_arg(name, other)),
                } as i64))
            }
            "append" => {
                if args.is_empty() {
                    return Err(runtime("not enough arguments for append()"));
                }
                let items: Vec<Value> = args.split_off(1).iter().map(Value::copied).collect();
                let limit = self.max_alloc();
                match args.pop() {
                    Some(Value::Slice(s)) => Ok(Value::Slice(s.append(items, limit)?)),
                    Some(Value::Nil) => Ok(Value::Slice(SliceVal::nil().append(items, limit)?)),
                    Some(other) => Err(runtime(format!(
                        "invalid argument: {} (type {}) is not a slice",
                        format_builtin(&other),
                        other.type_name()
                    ))),
                    None => Err(arity(name)),
                }
            }
            "delete" => {
                let [m, k] = args.as_slice() else {
                    return Err(arity(name));
                };
                match m {
                    Value::Map(m) => m.remove(&MapKey::from_value(k)?),
                    Value::Nil => {}
                    other => return Err(invalid_arg(name, other)),
                }
                Ok(Value::Nil)
            }
            "copy" => {
                let [dst, src] = args.as_slice() else {
                    return Err(arity(name));
                };
                let source: Vec<Value> = match src {
                    Value::Slice(s) => s.to_vec(),
                    Value::Str(s) => s.bytes().map(|b| Value::Int(b as i64)).collect(),
                    Value::Nil => Vec::new(),
                    other => return Err(invalid_arg(name, other)),
                };
                match dst {
                    Value::Slice(d) => {
                        let n = d.len.min(source.len());
                        for (i, v) in source.into_iter().take(n).enumerate() {
                            d.set(i, v.copied());
                        }
                        Ok(Value::Int(n as i64))
                    }
                    Value::Nil => Ok(Value::Int(0)),
                    other => Err(invalid_arg(name, other)),
                }
            }
            "clear" => {
                let [v] = args.as_slice() else {
                    return Err(arity(name));
                };
                match v {
                    Value::Map(m) => {
                        if let Some(entries) = &m.entries {
                            entries.borrow_mut().clear();
                        }
                    }
                    Value::Slice(s) => {
                        for i in 0..s.len {
                            let zero = s.get(i).map(|v| zero_like(&v)).unwrap_or(Value::Nil);
                            s.set(i, zero);
                        }
                    }
                    Value::Nil => {}
                    other => return Err(invalid_arg(name, other)),
                }
                Ok(Value::Nil)
            }
            "panic" => {
                let [v] = args.as_slice() else {
                    return Err(arity(name));
                };
                let message = match v {
                    Value::Str(s) => s.to_string(),
                    Value::Error(e) => e.message.clone(),
                    Value::Nil => "panic called with nil argument (use runtime.PanicNilError)".into(),
                    other => match self.display_error(other)? {
                        Some(s) => s,
                        None => format::format_v(self, other, false, false, 0)?,
                    },
                };
                Err(panic(message))
            }
            "recover" => Ok(self.recover()),
            "print" | "println" => {
                let parts: Vec<String> = args.iter().map(format_builtin).collect();
                let mut text = if name == "println" {
                    parts.join(" ")
                } else {
                    parts.concat()
                };
                if name == "println" {
                    text.push('\n');
                }
                self.stderr.write(text.as_bytes());
                Ok(Value::Nil)
            }
            "min" | "max" => {
                let mut iter = args.into_iter();
                let Some(mut best) = iter.next() else {
                    return Err(arity(name));
                };
                for v in iter {
                    let ord = match (&best, &v) {
                        (Value::Int(a), Value::Int(b)) => a.cmp(b),
                        (Value::Str(a), Value::Str(b)) => a.cmp(b),
                        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                            let (a, b) = (best.as_float()?, v.as_float()?);
                            if a.is_nan() || b.is_nan() {
                                best = Value::Float(f64::NAN);
                                continue;
                            }
                            best = Value::Float(a);
                            a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
                        }
                        _ => return Err(invalid_arg(name, &v)),
                    };
                    let replace = match name {
                        "min" => ord == std::cmp::Ordering::Greater,
                        _ => ord == std::cmp::Ordering::Less,
                    };
                    if replace {
                        best = match (&best, v) {
                            (Value::Float(_), Value::Int(i)) => Value::Float(i as f64),
                            (_, v) => v,
                        };
                    }
                }
                Ok(best)
            }
            "close" => Err(runtime("channels are not supported in the sandbox")),
            _ => Err(runtime(format!("undefined: {name}"))),
        }
    }

    /// `Error()` of a user error value, used when it is passed to `panic`.
    fn display_error(&mut self, value: &Value) -> EvalResult<Option<String>> {
        let Some(type_name) = Self::method_type(value) else {
            return Ok(None);
        };
        let Some(decl) = self.find_method(&type_name, "Error") else {
            return Ok(None);
        };
        match self.call_method_decl(&decl, value.clone(), Vec::new(), false)? {
            Value::Str(s) => Ok(Some(s.to_string())),
            _ => Ok(None),
        }
    }

    /// `T(x)`.
    pub(crate) fn convert(&mut self, value: Value, ty: &TypeExpr) -> EvalResult<Value> {
        let target = self.underlying(ty).clone();
        match &target {
            TypeExpr::Named(name) => match basic_of(name) {
                Some(Basic::Int) => {
                    let raw = match &value {
                        Value::Int(i) => *i,
                        Value::Float(f) if f.is_nan() => i64::MIN,
                        Value::Float(f) => f.trunc() as i64,
                        other => return Err(cannot_convert(other, ty)),
                    };
                    Ok(Value::Int(wrap_int(name, raw)))
                }
                Some(Basic::Float) => {
                    let f = match &value {
                        Value::Int(i) => *i as f64,
                        Value::Float(f) => *f,
                        other => return Err(cannot_convert(other, ty)),
                    };
                    Ok(Value::Float(if name == "float32" { f as f32 as f64 } else { f }))
                }
                Some(Basic::String) => match &value {
                    Value::Str(_) => Ok(value.clone()),
                    Value::Int(i) => {
                        let c = u32::try_from(*i)
                            .ok()
                            .and_then(char::from_u32)
                            .unwrap_or('\u{FFFD}');
                        Ok(Value::str(&c.to_string()))
                    }
                    Value::Slice(s) => Ok(Value::str(&slice_to_string(&s.to_vec())?)),
                    Value::Nil => Ok(Value::str("")),
                    other => Err(cannot_convert(other, ty)),
                },
                Some(Basic::Bool) => match value {
                    Value::Bool(_) => Ok(value),
                    other => Err(cannot_convert(&other, ty)),
                },
                None => match self.types.get(name) {
                    Some(TypeDef::Struct { def, .. }) => match &value {
                        Value::Struct(s) | Value::Pointer(s) => {
                            let fields = s.borrow().fields.iter().map(Value::copied).collect();
                            Ok(Value::Struct(Rc::new(RefCell::new(StructVal {
                                def: def.clone(),
                                fields,
                            }))))
                        }
                        other => Err(cannot_convert(other, ty)),
                    },
                    _ => Ok(value),
                },
            },
            TypeExpr::Slice(elem) => match (&**elem, value) {
                (TypeExpr::Named(e), Value::Str(s)) if matches!(e.as_str(), "byte" | "uint8") => {
                    Ok(Value::slice(s.bytes().map(|b| Value::Int(b as i64)).collect()))
                }
                (TypeExpr::Named(e), Value::Str(s)) if matches!(e.as_str(), "rune" | "int32") => {
                    Ok(Value::slice(s.chars().map(|c| Value::Int(c as i64)).collect()))
                }
                (_, v @ (Value::Slice(_) | Value::Nil)) => Ok(v),
                (_, other) => Err(cannot_convert(&other, ty)),
            },
            _ => Ok(value),
        }
    }
}

/// The type operand of `make`/`new`.
fn type_operand(expr: &Expr) -> EvalResult<TypeExpr> {
    Ok(match expr {
        Expr::Type(ty) => ty.clone(),
        Expr::Ident(name) => TypeExpr::Named(name.clone()),
        Expr::Selector(pkg, name) => match &**pkg {
            Expr::Ident(pkg) => TypeExpr::Qualified(pkg.clone(), name.clone()),
            _ => return Err(runtime("expected type")),
        },
        Expr::Unary(UnOp::Deref, inner) => TypeExpr::Pointer(Box::new(type_operand(inner)?)),
        _ => return Err(runtime("expected type")),
    })
}

/// `string(xs)` for `[]byte` and `[]rune`. Element values alone cannot tell
/// the two apart, so a slice of byte-sized values that forms valid UTF-8 is
/// read as bytes.
fn slice_to_string(items: &[Value]) -> EvalResult<String> {
    let mut codes = Vec::with_capacity(items.len());
    for item in items {
        codes.push(item.as_int()?);
    }
    if codes.iter().all(|c| (0..256).contains(c)) {
        let bytes: Vec<u8> = codes.iter().map(|c| *c as u8).collect();
        if let Ok(s) = String::from_utf8(bytes) {
            return Ok(s);
        }
    }
    Ok(codes
        .iter()
        .map(|c| {
            u32::try_from(*c)
                .ok()
                .and_then(char::from_u32)
                .unwrap_or('\u{FFFD}')
        })
        .collect())
}

fn zero_like(value: &Value) -> Value {
    match value {
        Value::Int(_) => Value::Int(0),
        Value::Float(_) => Value::Float(0.0),
        Value::Str(_) => Value::str(""),
        Value::Bool(_) => Value::Bool(false),
        _ => Value::Nil,
    }
}

fn arity(name: &str) -> crate::error::EvalError {
    runtime(format!("wrong number of arguments for {name}()"))
}

fn invalid_arg(name: &str, value: &Value) -> crate::error::EvalError {
    runtime(format!(
        "invalid argument: {} (type {}) for built-in {name}",
        format_builtin(value),
        value.type_name()
    ))
}

fn cannot_convert(value: &Value, ty: &TypeExpr) -> crate::error::EvalError {
    runtime(format!(
        "cannot convert {} (type {}) to type {}",
        format_builtin(value),
        value.type_name(),
        super::expressions::type_string(ty)
    ))
}
