use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use super::statements::{index_of, nil_deref};
use super::{basic_of, Evaluator, Env, TypeDef, BUILDER_TYPE};
use crate::ast::{BinOp, Expr, TypeExpr, UnOp};
use crate::error::{panic, runtime, EvalResult};
use crate::stdlib::Member;
use crate::value::{
    values_equal, BoundMethod, Closure, Func, MapKey, MapVal, SliceVal, StructDef, StructVal,
    Value,
};

pub(crate) const BUILTINS: &[&str] = &[
    "append", "cap", "clear", "close", "copy", "delete", "len", "make", "max", "min", "new",
    "panic", "print", "println", "recover",
];

pub(crate) fn builtin_name(name: &str) -> Option<&'static str> {
    BUILTINS.iter().copied().find(|b| *b == name)
}

/// Render a type the way compiler messages print it.
pub(crate) fn type_string(ty: &TypeExpr) -> String {
    match ty {
        TypeExpr::Named(n) => n.clone(),
        TypeExpr::Qualified(p, n) => format!("{p}.{n}"),
        TypeExpr::Slice(e) => format!("[]{}", type_string(e)),
        TypeExpr::Array(Some(n), e) => format!("[{n}]{}", type_string(e)),
        TypeExpr::Array(None, e) => format!("[...]{}", type_string(e)),
        TypeExpr::Map(k, v) => format!("map[{}]{}", type_string(k), type_string(v)),
        TypeExpr::Pointer(e) => format!("*{}", type_string(e)),
        TypeExpr::Func => "func".into(),
        TypeExpr::Interface(m) if m.is_empty() => "interface {}".into(),
        TypeExpr::Interface(_) => "interface".into(),
        TypeExpr::Struct(_) => "struct".into(),
    }
}

impl Evaluator {
    pub(crate) fn eval(&mut self, expr: &Expr, scope: &Env) -> EvalResult<Value> {
        match expr {
            Expr::Ident(name) => self.eval_ident(name, scope),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Char(c) => Ok(Value::Int(*c)),
            Expr::Composite { ty, elems } => self.eval_composite(ty, elems, scope),
            Expr::FuncLit(lit) => Ok(Value::Func(Func::Closure(Rc::new(Closure {
                name: Rc::from("func"),
                lit: lit.clone(),
                env: scope.clone(),
            })))),
            Expr::Unary(op, inner) => self.eval_unary(*op, inner, scope),
            Expr::Binary(BinOp::LogAnd, l, r) => {
                if !self.eval(l, scope)?.as_bool()? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(r, scope)?.as_bool()?))
            }
            Expr::Binary(BinOp::LogOr, l, r) => {
                if self.eval(l, scope)?.as_bool()? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(r, scope)?.as_bool()?))
            }
            Expr::Binary(op, l, r) => {
                let l = self.eval(l, scope)?;
                let r = self.eval(r, scope)?;
                self.binary_values(*op, l, r)
            }
            Expr::Call { func, args, spread } => self.eval_call(func, args, *spread, scope),
            Expr::Selector(base, name) => {
                if self.is_package_ref(base, scope) {
                    if let Expr::Ident(pkg) = &**base {
                        return self.package_member(pkg, name);
                    }
                }
                let base = self.eval(base, scope)?;
                self.select(base, name)
            }
            Expr::Index(target, key) => {
                let target = self.eval(target, scope)?;
                let key = self.eval(key, scope)?;
                self.index_value(target, key)
            }
            Expr::Slice { target, lo, hi } => {
                let target = self.eval(target, scope)?;
                let lo = match lo {
                    Some(e) => Some(self.eval(e, scope)?.as_int()?),
                    None => None,
                };
                let hi = match hi {
                    Some(e) => Some(self.eval(e, scope)?.as_int()?),
                    None => None,
                };
                slice_value(target, lo, hi)
            }
            Expr::TypeAssert(inner, ty) => {
                let value = self.eval(inner, scope)?;
                if self.type_matches(&value, ty) {
                    Ok(self.assignable(value, ty))
                } else {
                    let have = match &value {
                        Value::Nil => "nil".to_string(),
                        other => other.type_name(),
                    };
                    Err(panic(format!(
                        "interface conversion: interface {{}} is {have}, not {}",
                        type_string(ty)
                    )))
                }
            }
            Expr::Type(ty) => Err(runtime(format!(
                "{} (type) is not an expression",
                type_string(ty)
            ))),
        }
    }

    fn eval_ident(&mut self, name: &str, scope: &Env) -> EvalResult<Value> {
        if let Some(cell) = scope.lookup(name) {
            return Ok(cell.borrow().clone());
        }
        match name {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "nil" => Ok(Value::Nil),
            _ => {
                if let Some(builtin) = builtin_name(name) {
                    return Ok(Value::Func(Func::Builtin(builtin)));
                }
                if self.imports.contains_key(name) {
                    return Err(runtime(format!("use of package {name} without selector")));
                }
                Err(runtime(format!("undefined: {name}")))
            }
        }
    }

    /// Whether `expr` names an imported package rather than a variable.
    pub(crate) fn is_package_ref(&self, expr: &Expr, scope: &Env) -> bool {
        match expr {
            Expr::Ident(name) => self.imports.contains_key(name) && scope.lookup(name).is_none(),
            _ => false,
        }
    }

    pub(crate) fn package_member(&self, pkg: &str, name: &str) -> EvalResult<Value> {
        let path = self
            .imports
            .get(pkg)
            .copied()
            .ok_or_else(|| runtime(format!("undefined: {pkg}")))?;
        match self.symbols.lookup(path, name) {
            Some((name, Member::Func(f))) => Ok(Value::Func(Func::Std(name, f))),
            Some((_, Member::Int(i))) => Ok(Value::Int(i)),
            Some((_, Member::Float(f))) => Ok(Value::Float(f)),
            Some((_, Member::Stream(s))) => Ok(Value::Stream(s)),
            None => Err(runtime(format!("undefined: {pkg}.{name}"))),
        }
    }

    /// Evaluate call arguments; a single multi-value call expands in place.
    pub(crate) fn eval_args(&mut self, args: &[Expr], scope: &Env) -> EvalResult<Vec<Value>> {
        if let [only] = args {
            return Ok(match self.eval(only, scope)? {
                Value::Tuple(items) => items.to_vec(),
                other => vec![other],
            });
        }
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match self.eval(arg, scope)? {
                Value::Tuple(_) => {
                    return Err(runtime("multiple-value in single-value context"));
                }
                v => values.push(v),
            }
        }
        Ok(values)
    }

    fn eval_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        spread: bool,
        scope: &Env,
    ) -> EvalResult<Value> {
        match func {
            Expr::Ident(name) if scope.lookup(name).is_none() => {
                if let Some(builtin) = builtin_name(name) {
                    return self.call_builtin(builtin, args, spread, scope);
                }
                if basic_of(name).is_some() || self.types.contains_key(name.as_str()) {
                    return self.eval_conversion(&TypeExpr::Named(name.clone()), args, scope);
                }
            }
            Expr::Type(ty) => return self.eval_conversion(ty, args, scope),
            Expr::Selector(base, method) => {
                if self.is_package_ref(base, scope) {
                    if let Expr::Ident(pkg) = &**base {
                        let qualified = self.qualified_type_name(pkg, method)?;
                        if self.types.contains_key(&qualified) {
                            let ty = TypeExpr::Qualified(pkg.clone(), method.clone());
                            return self.eval_conversion(&ty, args, scope);
                        }
                        let f = self.package_member(pkg, method)?;
                        let argv = self.eval_args(args, scope)?;
                        return self.call_value_spread(&f, argv, spread);
                    }
                }
                let recv = self.eval(base, scope)?;
                let argv = self.eval_args(args, scope)?;
                return self.call_method(recv, method, argv, spread);
            }
            _ => {}
        }
        let callee = self.eval(func, scope)?;
        let argv = self.eval_args(args, scope)?;
        self.call_value_spread(&callee, argv, spread)
    }

    fn eval_conversion(&mut self, ty: &TypeExpr, args: &[Expr], scope: &Env) -> EvalResult<Value> {
        let [arg] = args else {
            return Err(runtime(format!(
                "wrong argument count in conversion to {}",
                type_string(ty)
            )));
        };
        let value = self.eval(arg, scope)?;
        self.convert(value, ty)
    }

    /// `recv.name(args)`.
    pub(crate) fn call_method(
        &mut self,
        recv: Value,
        name: &str,
        args: Vec<Value>,
        spread: bool,
    ) -> EvalResult<Value> {
        match &recv {
            Value::Error(e) => match name {
                "Error" => Ok(Value::str(&e.message)),
                "Unwrap" => Ok(e.wrapped.clone().unwrap_or(Value::Nil)),
                _ => Err(runtime(format!("error has no method {name}"))),
            },
            Value::Struct(s) | Value::Pointer(s) => {
                let type_name = s.borrow().def.name.clone();
                if &*type_name == BUILDER_TYPE {
                    return self.builder_method(s, name, args);
                }
                if let Some(decl) = self.find_method(&type_name, name) {
                    return self.call_method_decl(&decl, recv.clone(), args, spread);
                }
                let field = s.borrow().get(name);
                if let Some(f @ Value::Func(_)) = field {
                    return self.call_value_spread(&f, args, spread);
                }
                // methods promoted from embedded structs
                let embedded: Vec<Value> = {
                    let sv = s.borrow();
                    sv.def
                        .fields
                        .iter()
                        .zip(sv.fields.iter())
                        .filter(|(def, _)| def.embedded)
                        .map(|(_, v)| v.clone())
                        .collect()
                };
                for inner in embedded {
                    if self.has_promoted_method(&inner, name) {
                        return self.call_method(inner, name, args, spread);
                    }
                }
                Err(runtime(format!(
                    "{type_name}.{name} undefined (type {type_name} has no field or method {name})"
                )))
            }
            Value::Nil => Err(nil_deref()),
            Value::Func(_) => Err(runtime(format!("func has no method {name}"))),
            other => Err(runtime(format!(
                "{}.{name} undefined (type {} has no field or method {name})",
                other.type_name(),
                other.type_name()
            ))),
        }
    }

    fn has_promoted_method(&self, value: &Value, name: &str) -> bool {
        match value {
            Value::Struct(s) | Value::Pointer(s) => {
                let sv = s.borrow();
                if &*sv.def.name == BUILDER_TYPE || self.find_method(&sv.def.name, name).is_some() {
                    return true;
                }
                sv.def
                    .fields
                    .iter()
                    .zip(sv.fields.iter())
                    .any(|(def, v)| def.embedded && self.has_promoted_method(v, name))
            }
            Value::Error(_) => name == "Error",
            _ => false,
        }
    }

    /// A method value with its receiver bound, as used by `defer x.f()` and
    /// `f := x.Method`.
    pub(crate) fn method_value(&mut self, recv: Value, name: &str) -> EvalResult<Value> {
        if let Some(type_name) = Self::method_type(&recv) {
            if let Some(decl) = self.find_method(&type_name, name) {
                return Ok(Value::Func(Func::Method(Rc::new(BoundMethod { recv, decl }))));
            }
        }
        match &recv {
            Value::Struct(s) | Value::Pointer(s) => {
                if let Some(v) = s.borrow().get(name) {
                    return Ok(v);
                }
            }
            Value::Nil => return Err(nil_deref()),
            _ => {}
        }
        Err(runtime(format!(
            "{}.{name} is not a method value that can be deferred",
            recv.type_name()
        )))
    }

    fn builder_method(
        &mut self,
        builder: &Rc<RefCell<StructVal>>,
        name: &str,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        let current = match builder.borrow().fields.first() {
            Some(Value::Str(s)) => s.clone(),
            _ => Rc::from(""),
        };
        if name.starts_with("Write") {
            let incoming = match args.as_slice() {
                [Value::Str(s)] => s.len(),
                [Value::Slice(bytes)] => bytes.len,
                _ => 4,
            };
            self.check_alloc(
                current.len().saturating_add(incoming),
                "runtime error: strings.Builder too large",
            )?;
        }
        let append = |text: &str| {
            let mut joined = String::with_capacity(current.len() + text.len());
            joined.push_str(&current);
            joined.push_str(text);
            if let Some(slot) = builder.borrow_mut().fields.first_mut() {
                *slot = Value::str(&joined);
            }
        };
        match (name, args.as_slice()) {
            ("WriteString", [Value::Str(s)]) => {
                append(s);
                Ok(Value::tuple(vec![Value::Int(s.len() as i64), Value::Nil]))
            }
            ("WriteByte", [Value::Int(b)]) => {
                append(&char::from(*b as u8).to_string());
                Ok(Value::Nil)
            }
            ("WriteRune", [Value::Int(r)]) => {
                let c = char::from_u32(*r as u32).unwrap_or('\u{FFFD}');
                append(&c.to_string());
                Ok(Value::tuple(vec![Value::Int(c.len_utf8() as i64), Value::Nil]))
            }
            ("Write", [Value::Slice(bytes)]) => {
                let raw: Vec<u8> = bytes
                    .to_vec()
                    .iter()
                    .map(|b| b.as_int().map(|b| b as u8))
                    .collect::<EvalResult<_>>()?;
                append(&String::from_utf8_lossy(&raw));
                Ok(Value::tuple(vec![Value::Int(raw.len() as i64), Value::Nil]))
            }
            ("String", []) => Ok(Value::Str(current)),
            ("Len", []) => Ok(Value::Int(current.len() as i64)),
            ("Reset", []) => {
                if let Some(slot) = builder.borrow_mut().fields.first_mut() {
                    *slot = Value::str("");
                }
                Ok(Value::Nil)
            }
            ("Grow", [_]) => Ok(Value::Nil),
            _ => Err(runtime(format!(
                "strings.Builder.{name} called with unsupported arguments"
            ))),
        }
    }

    /// `x.name` where `x` is not a package.
    fn select(&mut self, base: Value, name: &str) -> EvalResult<Value> {
        match &base {
            Value::Struct(s) | Value::Pointer(s) => {
                let field = s.borrow().get(name);
                if let Some(v) = field {
                    return Ok(v);
                }
                self.method_value(base.clone(), name).map_err(|_| {
                    let type_name = s.borrow().def.name.clone();
                    runtime(format!(
                        "{type_name}.{name} undefined (type {type_name} has no field or method {name})"
                    ))
                })
            }
            Value::Ref(cell) => {
                let inner = cell.borrow().clone();
                self.select(inner, name)
            }
            Value::Nil => Err(nil_deref()),
            other => Err(runtime(format!(
                "{}.{name} undefined (type {} has no field or method {name})",
                other.type_name(),
                other.type_name()
            ))),
        }
    }

    pub(crate) fn index_value(&mut self, target: Value, key: Value) -> EvalResult<Value> {
        match target {
            Value::Slice(s) => {
                let i = index_of(&key, s.len)?;
                Ok(s.get(i).unwrap_or(Value::Nil))
            }
            Value::Str(s) => {
                let i = index_of(&key, s.len())?;
                Ok(Value::Int(s.as_bytes()[i] as i64))
            }
            Value::Map(m) => {
                let key = MapKey::from_value(&key)?;
                Ok(m.lookup(&key).unwrap_or_else(|| m.zero.copied()))
            }
            Value::Ref(cell) => {
                let inner = cell.borrow().clone();
                self.index_value(inner, key)
            }
            Value::Nil => {
                let i = key.as_int()?;
                Err(panic(format!(
                    "runtime error: index out of range [{i}] with length 0"
                )))
            }
            other => Err(runtime(format!(
                "invalid operation: cannot index {}",
                other.type_name()
            ))),
        }
    }

    fn eval_unary(&mut self, op: UnOp, inner: &Expr, scope: &Env) -> EvalResult<Value> {
        if op == UnOp::Addr {
            return self.address_of(inner, scope);
        }
        let value = self.eval(inner, scope)?;
        match (op, value) {
            (UnOp::Neg, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
            (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnOp::Plus, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
            (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnOp::BitNot, Value::Int(i)) => Ok(Value::Int(!i)),
            (UnOp::Deref, Value::Pointer(s)) => Ok(Value::Struct(s)),
            (UnOp::Deref, Value::Ref(cell)) => {
                let target = cell.borrow().clone();
                Ok(target)
            }
            (UnOp::Deref, Value::Nil) => Err(nil_deref()),
            (op, v) => Err(runtime(format!(
                "invalid operation: operator {} not defined on {}",
                unary_symbol(op),
                v.type_name()
            ))),
        }
    }

    fn address_of(&mut self, inner: &Expr, scope: &Env) -> EvalResult<Value> {
        if let Expr::Ident(name) = inner {
            let cell = scope
                .lookup(name)
                .ok_or_else(|| runtime(format!("undefined: {name}")))?;
            let target = match &*cell.borrow() {
                Value::Struct(s) => Some(s.clone()),
                _ => None,
            };
            return Ok(match target {
                Some(s) => Value::Pointer(s),
                None => Value::Ref(cell),
            });
        }
        Ok(match self.eval(inner, scope)? {
            Value::Struct(s) => Value::Pointer(s),
            other => Value::Ref(Rc::new(RefCell::new(other))),
        })
    }

    pub(crate) fn binary_values(&mut self, op: BinOp, l: Value, r: Value) -> EvalResult<Value> {
        match op {
            BinOp::Eq => return Ok(Value::Bool(values_equal(&l, &r)?)),
            BinOp::Ne => return Ok(Value::Bool(!values_equal(&l, &r)?)),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ord = compare(&l, &r, op)?;
                let result = match (op, ord) {
                    (_, None) => false,
                    (BinOp::Lt, Some(o)) => o == Ordering::Less,
                    (BinOp::Le, Some(o)) => o != Ordering::Greater,
                    (BinOp::Gt, Some(o)) => o == Ordering::Greater,
                    (_, Some(o)) => o != Ordering::Less,
                };
                return Ok(Value::Bool(result));
            }
            _ => {}
        }
        match (&l, &r) {
            (Value::Int(a), Value::Int(b)) => int_op(op, *a, *b),
            (Value::Str(a), Value::Str(b)) if op == BinOp::Add => {
                self.check_alloc(
                    a.len().saturating_add(b.len()),
                    "runtime error: string concatenation too long",
                )?;
                let mut joined = String::with_capacity(a.len() + b.len());
                joined.push_str(a);
                joined.push_str(b);
                Ok(Value::str(&joined))
            }
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                float_op(op, l.as_float()?, r.as_float()?)
            }
            _ => Err(runtime(format!(
                "invalid operation: operator {} not defined on {} and {}",
                op.symbol(),
                l.type_name(),
                r.type_name()
            ))),
        }
    }

    fn eval_composite(
        &mut self,
        ty: &TypeExpr,
        elems: &[(Option<Expr>, Expr)],
        scope: &Env,
    ) -> EvalResult<Value> {
        let resolved = self.underlying(ty).clone();
        match &resolved {
            TypeExpr::Slice(elem) => {
                let items = self.sequence_items(elem, elems, scope)?;
                Ok(Value::Slice(SliceVal::new(items)))
            }
            TypeExpr::Array(len, elem) => {
                let mut items = self.sequence_items(elem, elems, scope)?;
                if let Some(len) = len {
                    if items.len() > *len {
                        return Err(runtime(format!(
                            "array index {} out of bounds [0:{len}]",
                            items.len() - 1
                        )));
                    }
                    self.check_alloc(*len, "runtime error: array too large")?;
                    while items.len() < *len {
                        items.push(self.zero_value(elem)?);
                    }
                }
                let mut slice = SliceVal::new(items);
                slice.array = true;
                Ok(Value::Slice(slice))
            }
            TypeExpr::Map(key_ty, value_ty) => {
                let map = MapVal::new(self.zero_value(value_ty)?);
                for (key, value) in elems {
                    let Some(key) = key else {
                        return Err(runtime("missing key in map literal"));
                    };
                    let key = self.eval_elem(key, key_ty, scope)?;
                    let value = self.eval_elem(value, value_ty, scope)?;
                    map.insert(MapKey::from_value(&key)?, value)?;
                }
                Ok(Value::Map(map))
            }
            TypeExpr::Named(name) => {
                let (def, field_types) = self.struct_parts(name)?;
                self.build_struct(def, field_types, elems, scope)
            }
            TypeExpr::Qualified(pkg, name) => {
                let qualified = self.qualified_type_name(pkg, name)?;
                let (def, field_types) = self.struct_parts(&qualified)?;
                self.build_struct(def, field_types, elems, scope)
            }
            TypeExpr::Struct(fields) => {
                let def = StructDef {
                    name: Rc::from("struct"),
                    fields: fields
                        .iter()
                        .map(|f| crate::value::FieldDef::new(&f.name, f.embedded, f.tag.as_deref()))
                        .collect(),
                };
                let field_types = fields.iter().map(|f| f.ty.clone()).collect();
                self.build_struct(Rc::new(def), field_types, elems, scope)
            }
            other => Err(runtime(format!(
                "invalid composite literal type {}",
                type_string(other)
            ))),
        }
    }

    fn struct_parts(&self, name: &str) -> EvalResult<(Rc<StructDef>, Vec<TypeExpr>)> {
        match self.types.get(name) {
            Some(TypeDef::Struct { def, field_types }) => Ok((def.clone(), field_types.clone())),
            Some(TypeDef::Alias(_)) => Err(runtime(format!(
                "invalid composite literal type {name}"
            ))),
            None => Err(runtime(format!("undefined: {name}"))),
        }
    }

    fn sequence_items(
        &mut self,
        elem: &TypeExpr,
        elems: &[(Option<Expr>, Expr)],
        scope: &Env,
    ) -> EvalResult<Vec<Value>> {
        let mut items: Vec<Value> = Vec::with_capacity(elems.len());
        let mut next = 0usize;
        for (key, value) in elems {
            if let Some(key) = key {
                let at = self.eval(key, scope)?.as_int()?;
                if at < 0 {
                    return Err(runtime(format!("index {at} must be non-negative")));
                }
                next = at as usize;
                self.check_alloc(next, "runtime error: composite literal index too large")?;
            }
            let value = self.eval_elem(value, elem, scope)?;
            while items.len() < next {
                items.push(self.zero_value(elem)?);
            }
            if next < items.len() {
                items[next] = value;
            } else {
                items.push(value);
            }
            next += 1;
        }
        Ok(items)
    }

    /// Element of a composite literal; nested literals may elide their type.
    fn eval_elem(&mut self, expr: &Expr, ty: &TypeExpr, scope: &Env) -> EvalResult<Value> {
        let value = self.eval(expr, scope)?;
        Ok(self.assignable(value.copied(), ty))
    }

    fn build_struct(
        &mut self,
        def: Rc<StructDef>,
        field_types: Vec<TypeExpr>,
        elems: &[(Option<Expr>, Expr)],
        scope: &Env,
    ) -> EvalResult<Value> {
        let mut fields = Vec::with_capacity(field_types.len());
        for ty in &field_types {
            fields.push(self.zero_value(ty)?);
        }
        let keyed = elems.iter().any(|(k, _)| k.is_some());
        if keyed {
            for (key, value) in elems {
                let Some(Expr::Ident(field)) = key else {
                    return Err(runtime(format!(
                        "mixture of field:value and value elements in {} literal",
                        def.name
                    )));
                };
                let index = def
                    .fields
                    .iter()
                    .position(|f| *f.name == **field)
                    .ok_or_else(|| runtime(format!("unknown field {field} in struct literal of type {}", def.name)))?;
                fields[index] = self.eval_elem(value, &field_types[index], scope)?;
            }
        } else if !elems.is_empty() {
            if elems.len() != field_types.len() {
                return Err(runtime(format!(
                    "too few values in struct literal of type {}",
                    def.name
                )));
            }
            for (index, (_, value)) in elems.iter().enumerate() {
                fields[index] = self.eval_elem(value, &field_types[index], scope)?;
            }
        }
        Ok(Value::Struct(Rc::new(RefCell::new(StructVal { def, fields }))))
    }
}

fn unary_symbol(op: UnOp) -> &'static str {
    match op {
        UnOp::Neg => "-",
        UnOp::Plus => "+",
        UnOp::Not => "!",
        UnOp::BitNot => "^",
        UnOp::Deref => "*",
        UnOp::Addr => "&",
    }
}

fn compare(l: &Value, r: &Value, op: BinOp) -> EvalResult<Option<Ordering>> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(Some(a.cmp(b))),
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.as_bytes().cmp(b.as_bytes()))),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            Ok(l.as_float()?.partial_cmp(&r.as_float()?))
        }
        _ => Err(runtime(format!(
            "invalid operation: operator {} not defined on {} and {}",
            op.symbol(),
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn int_op(op: BinOp, a: i64, b: i64) -> EvalResult<Value> {
    Ok(Value::Int(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div | BinOp::Rem if b == 0 => {
            return Err(panic("runtime error: integer divide by zero"))
        }
        BinOp::Div => a.wrapping_div(b),
        BinOp::Rem => a.wrapping_rem(b),
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::AndNot => a & !b,
        BinOp::Shl | BinOp::Shr if b < 0 => {
            return Err(panic("runtime error: negative shift amount"))
        }
        BinOp::Shl if b >= 64 => 0,
        BinOp::Shl => a.wrapping_shl(b as u32),
        BinOp::Shr if b >= 64 => {
            if a < 0 {
                -1
            } else {
                0
            }
        }
        BinOp::Shr => a >> b,
        other => {
            return Err(runtime(format!(
                "invalid operation: operator {} not defined on int",
                other.symbol()
            )))
        }
    }))
}

fn float_op(op: BinOp, a: f64, b: f64) -> EvalResult<Value> {
    Ok(Value::Float(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        other => {
            return Err(runtime(format!(
                "invalid operation: operator {} not defined on float64",
                other.symbol()
            )))
        }
    }))
}

/// `x[lo:hi]` for slices, arrays and strings.
fn slice_value(target: Value, lo: Option<i64>, hi: Option<i64>) -> EvalResult<Value> {
    let bound = |v: Option<i64>, default: usize| -> EvalResult<usize> {
        match v {
            None => Ok(default),
            Some(i) if i < 0 => Err(panic(format!(
                "runtime error: slice bounds out of range [{i}:]"
            ))),
            Some(i) => Ok(i as usize),
        }
    };
    match target {
        Value::Slice(s) => {
            let lo = bound(lo, 0)?;
            let hi = bound(hi, s.len)?;
            Ok(Value::Slice(s.reslice(lo, hi)?))
        }
        Value::Str(s) => {
            let lo = bound(lo, 0)?;
            let hi = bound(hi, s.len())?;
            if lo > hi || hi > s.len() {
                return Err(panic(format!(
                    "runtime error: slice bounds out of range [{lo}:{hi}] with length {}",
                    s.len()
                )));
            }
            Ok(match s.get(lo..hi) {
                Some(sub) => Value::str(sub),
                None => Value::str(&String::from_utf8_lossy(&s.as_bytes()[lo..hi])),
            })
        }
        Value::Ref(cell) => {
            let inner = cell.borrow().clone();
            slice_value(inner, lo, hi)
        }
        Value::Nil => match (lo.unwrap_or(0), hi.unwrap_or(0)) {
            (0, 0) => Ok(Value::Slice(SliceVal::nil())),
            (lo, hi) => Err(panic(format!(
                "runtime error: slice bounds out of range [{lo}:{hi}] with capacity 0"
            ))),
        },
        other => Err(runtime(format!("cannot slice {}", other.type_name()))),
    }
}
