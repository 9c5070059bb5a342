use std::rc::Rc;

use super::{bare_return, Evaluator, Env, Scope};
use crate::ast::{Expr, Stmt, StmtKind, SwitchCase, TypeCase, TypeExpr, ValueSpec};
use crate::error::{panic, runtime, EvalError, EvalResult};
use crate::value::{values_equal, MapKey, Value};

/// Keep a float-typed destination float when an untyped integer lands in it.
pub(crate) fn coerce_like(old: &Value, new: Value) -> Value {
    match (old, new) {
        (Value::Float(_), Value::Int(i)) => Value::Float(i as f64),
        (_, new) => new,
    }
}

/// Bounds-checked index for a container of length `len`.
pub(crate) fn index_of(key: &Value, len: usize) -> EvalResult<usize> {
    let i = key.as_int()?;
    if i < 0 || i as usize >= len {
        return Err(panic(format!(
            "runtime error: index out of range [{i}] with length {len}"
        )));
    }
    Ok(i as usize)
}

impl Evaluator {
    pub(crate) fn exec_block(&mut self, stmts: &[Stmt], scope: &Env) -> EvalResult<()> {
        for stmt in stmts {
            self.exec_stmt(stmt, scope)?;
        }
        Ok(())
    }

    pub(crate) fn exec_stmt(&mut self, stmt: &Stmt, scope: &Env) -> EvalResult<()> {
        self.line = stmt.line;
        self.tick()?;
        match &stmt.kind {
            StmtKind::Empty | StmtKind::Fallthrough => Ok(()),
            StmtKind::Expr(expr) => self.eval(expr, scope).map(|_| ()),
            StmtKind::Var(spec) => self.exec_value_spec(spec, false, scope),
            StmtKind::Const(spec) => self.exec_value_spec(spec, true, scope),
            StmtKind::Type(spec) => {
                self.declare_type(spec);
                Ok(())
            }
            StmtKind::Define(names, values) => self.exec_define(names, values, scope),
            StmtKind::Assign(targets, values) => {
                let values = self.eval_rhs(values, targets.len(), scope)?;
                for (target, value) in targets.iter().zip(values) {
                    self.assign_to(target, value.copied(), scope)?;
                }
                Ok(())
            }
            StmtKind::OpAssign(op, target, value) => {
                let current = self.eval(target, scope)?;
                let rhs = self.eval(value, scope)?;
                let updated = self.binary_values(*op, current, rhs)?;
                self.assign_to(target, updated, scope)
            }
            StmtKind::IncDec(target, inc) => {
                let current = self.eval(target, scope)?;
                let updated = match current {
                    Value::Int(i) => Value::Int(if *inc { i.wrapping_add(1) } else { i.wrapping_sub(1) }),
                    Value::Float(f) => Value::Float(if *inc { f + 1.0 } else { f - 1.0 }),
                    other => {
                        return Err(runtime(format!(
                            "invalid operation: non-numeric operand (type {})",
                            other.type_name()
                        )))
                    }
                };
                self.assign_to(target, updated, scope)
            }
            StmtKind::Block(stmts) => self.exec_block(stmts, &Scope::child(scope)),
            StmtKind::If {
                init,
                cond,
                then,
                els,
            } => {
                let if_scope = Scope::child(scope);
                if let Some(init) = init {
                    self.exec_stmt(init, &if_scope)?;
                }
                if self.eval(cond, &if_scope)?.as_bool()? {
                    self.exec_block(then, &Scope::child(&if_scope))
                } else if let Some(els) = els {
                    self.exec_stmt(els, &if_scope)
                } else {
                    Ok(())
                }
            }
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => self.exec_for(init.as_deref(), cond.as_ref(), post.as_deref(), body, scope),
            StmtKind::Range {
                key,
                value,
                define,
                iter,
                body,
            } => self.exec_range(key.as_ref(), value.as_ref(), *define, iter, body, scope),
            StmtKind::Switch { init, tag, cases } => {
                self.exec_switch(init.as_deref(), tag.as_ref(), cases, scope)
            }
            StmtKind::TypeSwitch {
                init,
                binding,
                subject,
                cases,
            } => self.exec_type_switch(init.as_deref(), binding.as_deref(), subject, cases, scope),
            StmtKind::Return(exprs) => {
                let value = match exprs.len() {
                    0 => bare_return(),
                    1 => self.eval(&exprs[0], scope)?,
                    _ => {
                        let mut values = Vec::with_capacity(exprs.len());
                        for e in exprs {
                            values.push(self.eval(e, scope)?);
                        }
                        Value::tuple(values)
                    }
                };
                Err(EvalError::Return(value))
            }
            StmtKind::Break => Err(EvalError::Break),
            StmtKind::Continue => Err(EvalError::Continue),
            StmtKind::Defer(expr) => self.exec_defer(expr, scope),
        }
    }

    pub(crate) fn exec_value_spec(
        &mut self,
        spec: &ValueSpec,
        is_const: bool,
        scope: &Env,
    ) -> EvalResult<()> {
        self.line = spec.line;
        let values = if spec.values.is_empty() {
            let Some(ty) = &spec.ty else {
                return Err(runtime("missing init expr for const declaration"));
            };
            let mut zeros = Vec::with_capacity(spec.names.len());
            for _ in &spec.names {
                zeros.push(self.zero_value(ty)?);
            }
            zeros
        } else if is_const {
            let iota_scope = Scope::child(scope);
            iota_scope.define("iota", Value::Int(spec.iota));
            self.eval_rhs(&spec.values, spec.names.len(), &iota_scope)?
        } else {
            self.eval_rhs(&spec.values, spec.names.len(), scope)?
        };
        let sized = spec.ty.as_ref().and_then(|ty| self.sized_int(ty));
        for (name, value) in spec.names.iter().zip(values) {
            let value = match &spec.ty {
                Some(ty) => self.assignable(value.copied(), ty),
                None => value.copied(),
            };
            scope.define_sized(name, value, sized);
        }
        Ok(())
    }

    /// Evaluate the right-hand side of an `n`-target assignment, handling
    /// multi-value calls and the comma-ok forms.
    pub(crate) fn eval_rhs(
        &mut self,
        values: &[Expr],
        n: usize,
        scope: &Env,
    ) -> EvalResult<Vec<Value>> {
        if values.len() == n {
            let mut out = Vec::with_capacity(n);
            for e in values {
                let v = self.eval(e, scope)?;
                if let Value::Tuple(items) = &v {
                    if n > 1 || !items.is_empty() {
                        return Err(runtime(format!(
                            "multiple-value in single-value context ({} values)",
                            items.len()
                        )));
                    }
                }
                out.push(v);
            }
            return Ok(out);
        }
        if values.len() == 1 {
            if n == 2 && matches!(values[0], Expr::Index(..) | Expr::TypeAssert(..)) {
                let (v, ok) = self.eval_comma_ok(&values[0], scope)?;
                return Ok(vec![v, Value::Bool(ok)]);
            }
            match self.eval(&values[0], scope)? {
                Value::Tuple(items) if items.len() == n => return Ok(items.to_vec()),
                Value::Tuple(items) => {
                    return Err(runtime(format!(
                        "assignment mismatch: {n} variables but {} values",
                        items.len()
                    )))
                }
                _ => {}
            }
        }
        Err(runtime(format!(
            "assignment mismatch: {n} variables but {} values",
            values.len()
        )))
    }

    /// `v, ok := m[k]` and `v, ok := x.(T)`.
    fn eval_comma_ok(&mut self, expr: &Expr, scope: &Env) -> EvalResult<(Value, bool)> {
        match expr {
            Expr::Index(target, key) => {
                let container = self.eval(target, scope)?;
                let key = self.eval(key, scope)?;
                match container {
                    Value::Map(m) => {
                        let key = MapKey::from_value(&key)?;
                        Ok(match m.lookup(&key) {
                            Some(v) => (v, true),
                            None => (m.zero.copied(), false),
                        })
                    }
                    Value::Nil => Ok((Value::Nil, false)),
                    other => Err(runtime(format!(
                        "assignment mismatch: 2 variables but index of {} yields 1 value",
                        other.type_name()
                    ))),
                }
            }
            Expr::TypeAssert(inner, ty) => {
                let v = self.eval(inner, scope)?;
                if self.type_matches(&v, ty) {
                    Ok((self.assignable(v, ty), true))
                } else {
                    Ok((self.zero_value(ty)?, false))
                }
            }
            _ => Err(runtime("assignment mismatch: 2 variables but 1 value")),
        }
    }

    fn exec_define(&mut self, names: &[String], exprs: &[Expr], scope: &Env) -> EvalResult<()> {
        let sized: Vec<Option<&'static str>> = if exprs.len() == names.len() {
            exprs
                .iter()
                .map(|e| self.conversion_int_type(e, scope))
                .collect()
        } else {
            vec![None; names.len()]
        };
        let values = self.eval_rhs(exprs, names.len(), scope)?;
        let mut any_new = false;
        for ((name, value), int_type) in names.iter().zip(values).zip(sized) {
            if name == "_" {
                continue;
            }
            let value = value.copied();
            match scope.local(name) {
                Some(cell) => {
                    let updated = coerce_like(&cell.borrow(), value);
                    *cell.borrow_mut() = updated;
                }
                None => {
                    any_new = true;
                    scope.define_sized(name, value, int_type);
                }
            }
        }
        if !any_new && names.iter().any(|n| n != "_") {
            return Err(runtime("no new variables on left side of :="));
        }
        Ok(())
    }

    /// Sized integer type `expr` explicitly converts to, as in
    /// `x := byte(200)`.
    fn conversion_int_type(&self, expr: &Expr, scope: &Env) -> Option<&'static str> {
        let Expr::Call { func, .. } = expr else {
            return None;
        };
        match &**func {
            Expr::Ident(name) if scope.lookup(name).is_none() => {
                self.sized_int(&TypeExpr::Named(name.clone()))
            }
            Expr::Type(ty) => self.sized_int(ty),
            _ => None,
        }
    }

    pub(crate) fn assign_to(&mut self, target: &Expr, value: Value, scope: &Env) -> EvalResult<()> {
        match target {
            Expr::Ident(name) => {
                if name == "_" {
                    return Ok(());
                }
                let cell = scope
                    .lookup(name)
                    .ok_or_else(|| runtime(format!("undefined: {name}")))?;
                let updated = match (coerce_like(&cell.borrow(), value), scope.sized_int(name)) {
                    (Value::Int(i), Some(int_type)) => Value::Int(super::wrap_int(int_type, i)),
                    (v, _) => v,
                };
                *cell.borrow_mut() = updated;
                Ok(())
            }
            Expr::Index(container, key) => {
                let container = self.eval(container, scope)?;
                let key = self.eval(key, scope)?;
                self.store_index(container, key, value)
            }
            Expr::Selector(base, field) => {
                let base = self.eval(base, scope)?;
                match base {
                    Value::Struct(s) | Value::Pointer(s) => {
                        let mut s = s.borrow_mut();
                        let old = s.get(field).unwrap_or(Value::Nil);
                        if !s.set(field, coerce_like(&old, value)) {
                            return Err(runtime(format!(
                                "{}.{field} undefined (type has no field {field})",
                                s.def.name
                            )));
                        }
                        Ok(())
                    }
                    Value::Nil => Err(nil_deref()),
                    other => Err(runtime(format!(
                        "cannot assign to field {field} of {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::Unary(crate::ast::UnOp::Deref, inner) => match self.eval(inner, scope)? {
                Value::Ref(cell) => {
                    let updated = coerce_like(&cell.borrow(), value);
                    *cell.borrow_mut() = updated;
                    Ok(())
                }
                Value::Pointer(dst) => match value {
                    Value::Struct(src) | Value::Pointer(src) => {
                        if !Rc::ptr_eq(&dst, &src) {
                            let fields = src.borrow().fields.iter().map(Value::copied).collect();
                            dst.borrow_mut().fields = fields;
                        }
                        Ok(())
                    }
                    other => Err(runtime(format!(
                        "cannot assign {} through struct pointer",
                        other.type_name()
                    ))),
                },
                Value::Nil => Err(nil_deref()),
                other => Err(runtime(format!(
                    "invalid indirect of {}",
                    other.type_name()
                ))),
            },
            _ => Err(runtime("cannot assign to expression")),
        }
    }

    fn store_index(&mut self, container: Value, key: Value, value: Value) -> EvalResult<()> {
        match container {
            Value::Slice(s) => {
                let i = index_of(&key, s.len)?;
                let old = s.get(i).unwrap_or(Value::Nil);
                s.set(i, coerce_like(&old, value));
                Ok(())
            }
            Value::Map(m) => {
                let key = MapKey::from_value(&key)?;
                let value = coerce_like(&m.zero, value);
                m.insert(key, value)
            }
            Value::Ref(cell) => {
                let inner = cell.borrow().clone();
                self.store_index(inner, key, value)
            }
            Value::Nil => Err(panic("assignment to entry in nil map")),
            Value::Str(_) => Err(runtime("cannot assign to string index (strings are immutable)")),
            other => Err(runtime(format!(
                "invalid operation: cannot index {}",
                other.type_name()
            ))),
        }
    }

    fn exec_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        post: Option<&Stmt>,
        body: &[Stmt],
        scope: &Env,
    ) -> EvalResult<()> {
        // Variables declared in the init clause are fresh per iteration.
        let loop_vars: Vec<String> = match init.map(|s| &s.kind) {
            Some(StmtKind::Define(names, _)) => names.clone(),
            _ => Vec::new(),
        };
        let mut iter_scope = Scope::child(scope);
        if let Some(init) = init {
            self.exec_stmt(init, &iter_scope)?;
        }
        loop {
            self.tick()?;
            if let Some(cond) = cond {
                if !self.eval(cond, &iter_scope)?.as_bool()? {
                    break;
                }
            }
            match self.exec_block(body, &Scope::child(&iter_scope)) {
                Ok(()) | Err(EvalError::Continue) => {}
                Err(EvalError::Break) => break,
                Err(e) => return Err(e),
            }
            if !loop_vars.is_empty() {
                let next = Scope::child(scope);
                for name in &loop_vars {
                    if let Some(cell) = iter_scope.local(name) {
                        next.define(name, cell.borrow().clone());
                    }
                }
                iter_scope = next;
            }
            if let Some(post) = post {
                self.exec_stmt(post, &iter_scope)?;
            }
        }
        Ok(())
    }

    fn exec_range(
        &mut self,
        key: Option<&Expr>,
        value: Option<&Expr>,
        define: bool,
        iter: &Expr,
        body: &[Stmt],
        scope: &Env,
    ) -> EvalResult<()> {
        let subject = self.eval(iter, scope)?;
        match subject {
            Value::Slice(s) => {
                for i in 0..s.len {
                    let item = s.get(i).unwrap_or(Value::Nil);
                    if !self.range_step(key, value, define, Value::Int(i as i64), item, body, scope)? {
                        break;
                    }
                }
            }
            Value::Map(m) => {
                for (k, v) in m.snapshot() {
                    // entries removed during iteration are not produced
                    if m.lookup(&k).is_none() {
                        continue;
                    }
                    if !self.range_step(key, value, define, k.to_value(), v, body, scope)? {
                        break;
                    }
                }
            }
            Value::Str(s) => {
                let runes: Vec<(usize, char)> = s.char_indices().collect();
                for (i, c) in runes {
                    let (k, v) = (Value::Int(i as i64), Value::Int(c as i64));
                    if !self.range_step(key, value, define, k, v, body, scope)? {
                        break;
                    }
                }
            }
            Value::Int(n) => {
                if value.is_some() {
                    return Err(runtime("range over int permits only one iteration variable"));
                }
                for i in 0..n.max(0) {
                    if !self.range_step(key, None, define, Value::Int(i), Value::Nil, body, scope)? {
                        break;
                    }
                }
            }
            Value::Nil => {}
            other => {
                return Err(runtime(format!(
                    "cannot range over value of type {}",
                    other.type_name()
                )))
            }
        }
        Ok(())
    }

    /// One range iteration; returns `false` on `break`.
    #[allow(clippy::too_many_arguments)]
    fn range_step(
        &mut self,
        key: Option<&Expr>,
        value: Option<&Expr>,
        define: bool,
        k: Value,
        v: Value,
        body: &[Stmt],
        scope: &Env,
    ) -> EvalResult<bool> {
        self.tick()?;
        let iter_scope = Scope::child(scope);
        if define {
            if let Some(Expr::Ident(name)) = key {
                iter_scope.define(name, k);
            }
            if let Some(Expr::Ident(name)) = value {
                iter_scope.define(name, v.copied());
            }
        } else {
            if let Some(target) = key {
                self.assign_to(target, k, scope)?;
            }
            if let Some(target) = value {
                self.assign_to(target, v.copied(), scope)?;
            }
        }
        match self.exec_block(body, &iter_scope) {
            Ok(()) | Err(EvalError::Continue) => Ok(true),
            Err(EvalError::Break) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn exec_switch(
        &mut self,
        init: Option<&Stmt>,
        tag: Option<&Expr>,
        cases: &[SwitchCase],
        scope: &Env,
    ) -> EvalResult<()> {
        let switch_scope = Scope::child(scope);
        if let Some(init) = init {
            self.exec_stmt(init, &switch_scope)?;
        }
        let tag = match tag {
            Some(t) => Some(self.eval(t, &switch_scope)?),
            None => None,
        };

        let mut matched = None;
        'cases: for (i, case) in cases.iter().enumerate() {
            for expr in &case.exprs {
                let v = self.eval(expr, &switch_scope)?;
                let hit = match &tag {
                    Some(t) => values_equal(t, &v)?,
                    None => v.as_bool()?,
                };
                if hit {
                    matched = Some(i);
                    break 'cases;
                }
            }
        }

        let Some(mut i) = matched.or_else(|| cases.iter().position(|c| c.is_default)) else {
            return Ok(());
        };
        loop {
            let case = &cases[i];
            match self.exec_block(&case.body, &Scope::child(&switch_scope)) {
                Ok(()) => {}
                Err(EvalError::Break) => return Ok(()),
                Err(e) => return Err(e),
            }
            let falls_through = matches!(
                case.body.last().map(|s| &s.kind),
                Some(StmtKind::Fallthrough)
            );
            if falls_through && i + 1 < cases.len() {
                i += 1;
            } else {
                return Ok(());
            }
        }
    }

    fn exec_type_switch(
        &mut self,
        init: Option<&Stmt>,
        binding: Option<&str>,
        subject: &Expr,
        cases: &[TypeCase],
        scope: &Env,
    ) -> EvalResult<()> {
        let switch_scope = Scope::child(scope);
        if let Some(init) = init {
            self.exec_stmt(init, &switch_scope)?;
        }
        let value = self.eval(subject, &switch_scope)?;

        let mut matched: Option<(usize, Option<&TypeExpr>)> = None;
        'cases: for (i, case) in cases.iter().enumerate() {
            for ty in &case.types {
                let hit = match ty {
                    None => matches!(value, Value::Nil),
                    Some(t) => self.type_matches(&value, t),
                };
                if hit {
                    let single = if case.types.len() == 1 { ty.as_ref() } else { None };
                    matched = Some((i, single));
                    break 'cases;
                }
            }
        }
        let (index, single) = match matched {
            Some(m) => m,
            None => match cases.iter().position(|c| c.is_default) {
                Some(i) => (i, None),
                None => return Ok(()),
            },
        };

        let body_scope = Scope::child(&switch_scope);
        if let Some(name) = binding {
            let bound = match single {
                Some(ty) => self.assignable(value.clone(), ty),
                None => value.clone(),
            };
            body_scope.define(name, bound);
        }
        match self.exec_block(&cases[index].body, &body_scope) {
            Ok(()) | Err(EvalError::Break) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn exec_defer(&mut self, expr: &Expr, scope: &Env) -> EvalResult<()> {
        let Expr::Call { func, args, spread } = expr else {
            return Err(runtime("expression in defer must be function call"));
        };
        let callee = match &**func {
            Expr::Selector(recv, method) if !self.is_package_ref(recv, scope) => {
                let recv = self.eval(recv, scope)?;
                self.method_value(recv, method)?
            }
            other => self.eval(other, scope)?,
        };
        let mut argv = self.eval_args(args, scope)?;
        if *spread {
            argv = super::expand_spread(argv)?;
        }
        self.push_defer(callee, argv)
    }
}

pub(crate) fn nil_deref() -> EvalError {
    panic("runtime error: invalid memory address or nil pointer dereference")
}
