//! Tree-walking evaluator.
//!
//! One [`Evaluator`] is built per run. It owns the global scope, the type
//! and method tables, and the per-run limits: every statement, loop
//! iteration and call goes through [`Evaluator::tick`], which enforces the
//! step budget and observes the host's interrupt flag.

mod builtins;
mod expressions;
mod statements;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::ast::{Decl, FieldDecl, FuncDecl, FuncLit, Program, TypeExpr, TypeSpec};
use crate::error::{panic, runtime, EvalError, EvalResult};
use crate::format::{self, MethodHook};
use crate::output::OutputBuffer;
use crate::stdlib::SymbolTable;
use crate::value::{
    Closure, FieldDef, Func, MapVal, NativeFn, SliceVal, Stream, StructDef, StructVal, Value,
};

pub type Env = Rc<Scope>;

/// A lexical scope. Variables live in their own cells so closures and
/// `&x` can share them.
#[derive(Default)]
pub struct Scope {
    vars: RefCell<HashMap<Rc<str>, Rc<RefCell<Value>>>>,
    /// Variables declared with a sized integer type, and that type.
    sized: RefCell<HashMap<Rc<str>, &'static str>>,
    parent: Option<Env>,
}

impl Scope {
    pub fn root() -> Env {
        Rc::new(Scope::default())
    }

    pub fn child(parent: &Env) -> Env {
        Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            sized: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Rc<RefCell<Value>>> {
        let mut scope = self;
        loop {
            if let Some(cell) = scope.vars.borrow().get(name) {
                return Some(cell.clone());
            }
            match &scope.parent {
                Some(parent) => scope = parent,
                None => return None,
            }
        }
    }

    pub fn define(&self, name: &str, value: Value) {
        if name == "_" {
            return;
        }
        self.sized.borrow_mut().remove(name);
        self.vars
            .borrow_mut()
            .insert(Rc::from(name), Rc::new(RefCell::new(value)));
    }

    /// Define `name` with a declared integer type narrower than 64 bits;
    /// later assignments through the name wrap to that width.
    pub fn define_sized(&self, name: &str, value: Value, int_type: Option<&'static str>) {
        self.define(name, value);
        if let Some(int_type) = int_type.filter(|_| name != "_") {
            self.sized.borrow_mut().insert(Rc::from(name), int_type);
        }
    }

    /// Declared sized integer type of the variable `name` resolves to.
    pub fn sized_int(&self, name: &str) -> Option<&'static str> {
        let mut scope = self;
        loop {
            if scope.vars.borrow().contains_key(name) {
                return scope.sized.borrow().get(name).copied();
            }
            match &scope.parent {
                Some(parent) => scope = parent,
                None => return None,
            }
        }
    }

    pub fn local(&self, name: &str) -> Option<Rc<RefCell<Value>>> {
        self.vars.borrow().get(name).cloned()
    }
}

/// A declared named type.
pub(crate) enum TypeDef {
    Struct {
        def: Rc<StructDef>,
        field_types: Vec<TypeExpr>,
    },
    /// Named non-struct type, e.g. `type Celsius float64` or an interface.
    Alias(TypeExpr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Basic {
    Int,
    Float,
    String,
    Bool,
}

pub(crate) fn basic_of(name: &str) -> Option<Basic> {
    Some(match name {
        "int" | "int8" | "int16" | "int32" | "int64" | "uint" | "uint8" | "uint16" | "uint32"
        | "uint64" | "uintptr" | "byte" | "rune" => Basic::Int,
        "float32" | "float64" => Basic::Float,
        "string" => Basic::String,
        "bool" => Basic::Bool,
        _ => return None,
    })
}

/// Wrap `v` to the width of the integer type `name`. 64-bit types pass
/// through unchanged.
pub(crate) fn wrap_int(name: &str, v: i64) -> i64 {
    match name {
        "int8" => v as i8 as i64,
        "int16" => v as i16 as i64,
        "int32" | "rune" => v as i32 as i64,
        "uint8" | "byte" => v as u8 as i64,
        "uint16" => v as u16 as i64,
        "uint32" => v as u32 as i64,
        _ => v,
    }
}

fn sized_int_name(name: &str) -> Option<&'static str> {
    Some(match name {
        "int8" => "int8",
        "int16" => "int16",
        "int32" => "int32",
        "rune" => "rune",
        "uint8" => "uint8",
        "byte" => "byte",
        "uint16" => "uint16",
        "uint32" => "uint32",
        _ => return None,
    })
}

struct Deferred {
    func: Value,
    args: Vec<Value>,
}

pub(crate) const BUILDER_TYPE: &str = "strings.Builder";

/// Per-run settings handed over by the embedding host.
pub(crate) struct RunContext {
    pub stdout: OutputBuffer,
    pub stderr: OutputBuffer,
    pub interrupt: Arc<AtomicBool>,
    pub max_steps: Option<u64>,
    pub max_call_depth: usize,
    pub max_alloc: usize,
}

pub struct Evaluator {
    pub(crate) globals: Env,
    pub(crate) symbols: Arc<SymbolTable>,
    pub(crate) types: HashMap<String, TypeDef>,
    pub(crate) methods: HashMap<String, HashMap<String, Rc<FuncDecl>>>,
    /// Local package name -> import path.
    pub(crate) imports: HashMap<String, &'static str>,
    pub(crate) stdout: OutputBuffer,
    pub(crate) stderr: OutputBuffer,
    interrupt: Arc<AtomicBool>,
    max_steps: Option<u64>,
    max_call_depth: usize,
    max_alloc: usize,
    steps: u64,
    depth: usize,
    /// Line of the statement being executed, for error messages.
    pub(crate) line: u32,
    defers: Vec<Vec<Deferred>>,
    /// Value of the panic currently unwinding through deferred calls.
    panicking: Option<Value>,
}

impl Evaluator {
    pub(crate) fn new(symbols: Arc<SymbolTable>, ctx: RunContext) -> Self {
        let mut types = HashMap::new();
        types.insert(
            BUILDER_TYPE.to_string(),
            TypeDef::Struct {
                def: Rc::new(StructDef {
                    name: Rc::from(BUILDER_TYPE),
                    fields: vec![FieldDef::new("buf", false, None)],
                }),
                field_types: vec![TypeExpr::Named("string".into())],
            },
        );
        Self {
            globals: Scope::root(),
            symbols,
            types,
            methods: HashMap::new(),
            imports: HashMap::new(),
            stdout: ctx.stdout,
            stderr: ctx.stderr,
            interrupt: ctx.interrupt,
            max_steps: ctx.max_steps,
            max_call_depth: ctx.max_call_depth,
            max_alloc: ctx.max_alloc,
            steps: 0,
            depth: 0,
            line: 0,
            defers: Vec::new(),
            panicking: None,
        }
    }

    pub(crate) fn steps(&self) -> u64 {
        self.steps
    }

    /// Load declarations, then run `init` functions and `main`.
    pub(crate) fn run_program(
        &mut self,
        program: &Program,
        natives: Vec<(String, NativeFn)>,
    ) -> EvalResult<()> {
        if program.package != "main" {
            return Err(runtime(format!(
                "package {} is not a main package",
                program.package
            )));
        }

        for import in &program.imports {
            let path = self.symbols.package_path(&import.path).ok_or_else(|| {
                runtime(format!(
                    "package {} is not available in the sandbox",
                    import.path
                ))
            })?;
            match import.local_name() {
                "_" => {}
                "." => return Err(runtime("dot imports are not supported")),
                local => {
                    self.imports.insert(local.to_string(), path);
                }
            }
        }

        for decl in &program.decls {
            if let Decl::Type(specs) = decl {
                for spec in specs {
                    self.declare_type(spec);
                }
            }
        }

        let mut inits = Vec::new();
        for decl in &program.decls {
            let Decl::Func(func) = decl else { continue };
            match &func.receiver {
                Some(recv) => {
                    self.methods
                        .entry(recv.type_name.clone())
                        .or_default()
                        .insert(func.name.clone(), func.clone());
                }
                None if func.name == "init" => inits.push(func.clone()),
                None => {
                    let closure = Closure {
                        name: Rc::from(func.name.as_str()),
                        lit: func.func.clone(),
                        env: self.globals.clone(),
                    };
                    self.globals
                        .define(&func.name, Value::Func(Func::Closure(Rc::new(closure))));
                }
            }
        }

        // Host bindings shadow any guest declaration of the same name.
        for (name, native) in natives {
            debug!(binding = %name, "injecting host function");
            let value = Value::Func(Func::Native(Rc::from(name.as_str()), native));
            self.globals.define(&name, value);
        }

        let globals = self.globals.clone();
        for decl in &program.decls {
            match decl {
                Decl::Var(specs) => {
                    for spec in specs {
                        self.exec_value_spec(spec, false, &globals)?;
                    }
                }
                Decl::Const(specs) => {
                    for spec in specs {
                        self.exec_value_spec(spec, true, &globals)?;
                    }
                }
                _ => {}
            }
        }

        for init in inits {
            self.line = init.line;
            self.invoke(&init.func, &globals, None, Vec::new(), false)?;
        }

        let main = self
            .globals
            .local("main")
            .ok_or_else(|| runtime("function main is undeclared in the main package"))?;
        let main = main.borrow().clone();
        self.call_value(&main, Vec::new())?;
        Ok(())
    }

    pub(crate) fn declare_type(&mut self, spec: &TypeSpec) {
        let def = match &spec.ty {
            TypeExpr::Struct(fields) => self.struct_typedef(&spec.name, fields),
            other => TypeDef::Alias(other.clone()),
        };
        self.types.insert(spec.name.clone(), def);
    }

    fn struct_typedef(&self, name: &str, fields: &[FieldDecl]) -> TypeDef {
        let def = StructDef {
            name: Rc::from(name),
            fields: fields
                .iter()
                .map(|f| FieldDef::new(&f.name, f.embedded, f.tag.as_deref()))
                .collect(),
        };
        TypeDef::Struct {
            def: Rc::new(def),
            field_types: fields.iter().map(|f| f.ty.clone()).collect(),
        }
    }

    // ------------------------------------------------------------------
    // limits
    // ------------------------------------------------------------------

    pub(crate) fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    /// Account one unit of work.
    pub(crate) fn max_alloc(&self) -> usize {
        self.max_alloc
    }

    /// Go panic with `message` when `units` exceeds the allocation cap.
    pub(crate) fn check_alloc(&self, units: usize, message: &str) -> EvalResult<()> {
        if units > self.max_alloc {
            return Err(panic(message));
        }
        Ok(())
    }

    pub(crate) fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        if let Some(max) = self.max_steps {
            if self.steps > max {
                return Err(EvalError::BudgetExhausted(max));
            }
        }
        if self.interrupted() {
            return Err(EvalError::Interrupted);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // calls
    // ------------------------------------------------------------------

    pub(crate) fn call_value(&mut self, func: &Value, args: Vec<Value>) -> EvalResult<Value> {
        self.call_value_spread(func, args, false)
    }

    pub(crate) fn call_value_spread(
        &mut self,
        func: &Value,
        mut args: Vec<Value>,
        spread: bool,
    ) -> EvalResult<Value> {
        match func {
            Value::Func(Func::Closure(c)) => {
                let c = c.clone();
                self.invoke(&c.lit, &c.env, None, args, spread)
            }
            Value::Func(Func::Method(m)) => {
                let m = m.clone();
                self.call_method_decl(&m.decl, m.recv.clone(), args, spread)
            }
            Value::Func(f) => {
                if spread {
                    args = expand_spread(args)?;
                }
                match f {
                    Func::Builtin(name) => self.call_builtin_values(name, args),
                    Func::Std(_, f) => {
                        self.tick()?;
                        f(self, args)
                    }
                    Func::Native(name, f) => {
                        let (name, f) = (name.clone(), f.clone());
                        self.call_native(&name, &f, args)
                    }
                    Func::Closure(_) | Func::Method(_) => Err(runtime("unreachable call form")),
                }
            }
            Value::Nil => Err(panic(
                "runtime error: invalid memory address or nil pointer dereference",
            )),
            other => Err(runtime(format!(
                "invalid operation: cannot call non-function (type {})",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn call_method_decl(
        &mut self,
        decl: &Rc<FuncDecl>,
        recv: Value,
        args: Vec<Value>,
        spread: bool,
    ) -> EvalResult<Value> {
        let Some(receiver) = &decl.receiver else {
            return Err(runtime(format!("{} is not a method", decl.name)));
        };
        let bound = match recv {
            Value::Struct(s) if receiver.pointer => Value::Pointer(s),
            Value::Pointer(s) if !receiver.pointer => Value::Struct(s).copied(),
            other => other.copied(),
        };
        let globals = self.globals.clone();
        let recv_binding = receiver.name.as_deref().map(|n| (n, bound));
        self.invoke(&decl.func, &globals, recv_binding, args, spread)
    }

    /// Call a guest function body.
    pub(crate) fn invoke(
        &mut self,
        lit: &Rc<FuncLit>,
        env: &Env,
        recv: Option<(&str, Value)>,
        args: Vec<Value>,
        spread: bool,
    ) -> EvalResult<Value> {
        self.tick()?;
        if self.depth >= self.max_call_depth {
            return Err(EvalError::StackOverflow(self.max_call_depth));
        }

        let scope = Scope::child(env);
        if let Some((name, value)) = recv {
            scope.define(name, value);
        }
        self.bind_params(lit, &scope, args, spread)?;

        let named: Vec<&str> = lit
            .results
            .iter()
            .filter_map(|r| r.name.as_deref())
            .collect();
        let has_named = !named.is_empty() && named.len() == lit.results.len();
        if has_named {
            for result in &lit.results {
                let zero = self.zero_value(&result.ty)?;
                scope.define(result.name.as_deref().unwrap_or("_"), zero);
            }
        }

        self.depth += 1;
        self.defers.push(Vec::new());
        let mut outcome = match self.exec_block(&lit.body, &scope) {
            Ok(()) => Ok(None),
            Err(EvalError::Return(v)) => Ok(Some(v)),
            Err(e) => Err(e),
        };
        if has_named {
            if let Ok(Some(value)) = &outcome {
                if !is_bare_return(value) {
                    let values = spread_results(value.clone(), named.len());
                    for (name, v) in named.iter().zip(values) {
                        if let Some(cell) = scope.local(name) {
                            *cell.borrow_mut() = v;
                        }
                    }
                }
            }
        }
        let frame = self.defers.pop().unwrap_or_default();
        if !frame.is_empty() && matches!(outcome, Ok(_) | Err(EvalError::Panic(_))) {
            outcome = self.run_deferred(frame, outcome);
        }
        self.depth -= 1;

        let value = match outcome? {
            _ if has_named => {
                let mut values = Vec::with_capacity(named.len());
                for name in &named {
                    let v = scope
                        .local(name)
                        .map(|c| c.borrow().clone())
                        .unwrap_or(Value::Nil);
                    values.push(v);
                }
                pack_results(values)
            }
            Some(v) if is_bare_return(&v) => Value::Nil,
            Some(v) => v,
            None => Value::Nil,
        };
        Ok(self.convert_results(value, &lit.results))
    }

    fn bind_params(
        &mut self,
        lit: &FuncLit,
        scope: &Env,
        mut args: Vec<Value>,
        spread: bool,
    ) -> EvalResult<()> {
        let want = lit.params.len();
        if lit.variadic && !spread {
            let fixed = want.saturating_sub(1);
            if args.len() < fixed {
                return Err(runtime(format!(
                    "not enough arguments in call: have {}, want at least {fixed}",
                    args.len()
                )));
            }
            let rest = args.split_off(fixed);
            args.push(Value::Slice(if rest.is_empty() {
                SliceVal::nil()
            } else {
                SliceVal::new(rest)
            }));
        }
        if args.len() != want {
            return Err(runtime(format!(
                "wrong number of arguments in call: have {}, want {want}",
                args.len()
            )));
        }
        for (param, arg) in lit.params.iter().zip(args) {
            let value = self.assignable(arg.copied(), &param.ty);
            if let Some(name) = &param.name {
                scope.define_sized(name, value, self.sized_int(&param.ty));
            }
        }
        Ok(())
    }

    fn convert_results(&self, value: Value, results: &[crate::ast::Param]) -> Value {
        match (results.len(), value) {
            (1, v) => self.assignable(v, &results[0].ty),
            (n, Value::Tuple(items)) if n == items.len() => {
                let converted: Vec<Value> = items
                    .iter()
                    .zip(results)
                    .map(|(v, r)| self.assignable(v.clone(), &r.ty))
                    .collect();
                Value::tuple(converted)
            }
            (_, v) => v,
        }
    }

    fn run_deferred(
        &mut self,
        frame: Vec<Deferred>,
        mut outcome: EvalResult<Option<Value>>,
    ) -> EvalResult<Option<Value>> {
        let saved = self.panicking.take();
        for deferred in frame.into_iter().rev() {
            let was_panicking = match &outcome {
                Err(EvalError::Panic(message)) => {
                    self.panicking = Some(Value::str(message));
                    true
                }
                _ => {
                    self.panicking = None;
                    false
                }
            };
            match self.call_value(&deferred.func, deferred.args) {
                Ok(_) => {}
                Err(err @ EvalError::Panic(_)) => {
                    outcome = Err(err);
                    continue;
                }
                Err(err) => {
                    self.panicking = saved;
                    return Err(err);
                }
            }
            if was_panicking && self.panicking.is_none() {
                debug!("panic recovered by deferred call");
                outcome = Ok(None);
            }
        }
        self.panicking = saved;
        outcome
    }

    pub(crate) fn push_defer(&mut self, func: Value, args: Vec<Value>) -> EvalResult<()> {
        match self.defers.last_mut() {
            Some(frame) => {
                frame.push(Deferred { func, args });
                Ok(())
            }
            None => Err(runtime("defer outside function")),
        }
    }

    /// `recover()`: stops the current panic and returns its value.
    pub(crate) fn recover(&mut self) -> Value {
        self.panicking.take().unwrap_or(Value::Nil)
    }

    fn call_native(&mut self, name: &str, func: &NativeFn, args: Vec<Value>) -> EvalResult<Value> {
        self.tick()?;
        let json_args = args
            .iter()
            .map(Value::to_json)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| runtime(format!("{name}: {e}")))?;
        debug!(binding = name, args = json_args.len(), "guest host call");
        let outcome = func(json_args);
        // A call that was in flight when the interrupt fired completes, but
        // the guest never observes its result.
        if self.interrupted() {
            return Err(EvalError::Interrupted);
        }
        Ok(match outcome {
            Ok(v) => Value::tuple(vec![Value::from_json(&v), Value::Nil]),
            Err(message) => Value::tuple(vec![Value::Nil, Value::error(message)]),
        })
    }

    // ------------------------------------------------------------------
    // methods
    // ------------------------------------------------------------------

    pub(crate) fn find_method(&self, type_name: &str, method: &str) -> Option<Rc<FuncDecl>> {
        self.methods.get(type_name)?.get(method).cloned()
    }

    /// Dynamic type name used for method lookup.
    pub(crate) fn method_type(value: &Value) -> Option<Rc<str>> {
        match value {
            Value::Struct(s) | Value::Pointer(s) => Some(s.borrow().def.name.clone()),
            _ => None,
        }
    }

    pub(crate) fn has_method(&self, value: &Value, method: &str) -> bool {
        match value {
            Value::Error(_) => method == "Error",
            _ => Self::method_type(value)
                .map(|t| self.find_method(&t, method).is_some())
                .unwrap_or(false),
        }
    }

    // ------------------------------------------------------------------
    // types
    // ------------------------------------------------------------------

    /// Resolve declared aliases down to a non-named type.
    pub(crate) fn underlying<'t>(&'t self, ty: &'t TypeExpr) -> &'t TypeExpr {
        let mut ty = ty;
        for _ in 0..32 {
            match ty {
                TypeExpr::Named(name) => match self.types.get(name) {
                    Some(TypeDef::Alias(inner)) => ty = inner,
                    _ => return ty,
                },
                _ => return ty,
            }
        }
        ty
    }

    pub(crate) fn basic_kind(&self, ty: &TypeExpr) -> Option<Basic> {
        match self.underlying(ty) {
            TypeExpr::Named(name) => basic_of(name),
            _ => None,
        }
    }

    /// Underlying sized integer type of `ty`, if it is one.
    pub(crate) fn sized_int(&self, ty: &TypeExpr) -> Option<&'static str> {
        match self.underlying(ty) {
            TypeExpr::Named(name) => sized_int_name(name),
            _ => None,
        }
    }

    /// Apply the implicit numeric conversion Go performs on untyped
    /// constants when they meet a typed destination.
    pub(crate) fn assignable(&self, value: Value, ty: &TypeExpr) -> Value {
        match (self.basic_kind(ty), value) {
            (Some(Basic::Float), Value::Int(i)) => Value::Float(i as f64),
            (Some(Basic::Int), Value::Float(f)) if f.fract() == 0.0 => {
                self.assignable(Value::Int(f as i64), ty)
            }
            (Some(Basic::Int), Value::Int(i)) => match self.sized_int(ty) {
                Some(name) => Value::Int(wrap_int(name, i)),
                None => Value::Int(i),
            },
            (_, v) => v,
        }
    }

    pub(crate) fn zero_value(&self, ty: &TypeExpr) -> EvalResult<Value> {
        self.zero_at_depth(ty, 0)
    }

    fn zero_at_depth(&self, ty: &TypeExpr, depth: usize) -> EvalResult<Value> {
        if depth > 32 {
            return Err(runtime("invalid recursive type"));
        }
        Ok(match ty {
            TypeExpr::Named(name) => match basic_of(name) {
                Some(Basic::Int) => Value::Int(0),
                Some(Basic::Float) => Value::Float(0.0),
                Some(Basic::String) => Value::str(""),
                Some(Basic::Bool) => Value::Bool(false),
                None => match name.as_str() {
                    "error" | "any" => Value::Nil,
                    _ => match self.types.get(name) {
                        Some(TypeDef::Struct { def, field_types }) => {
                            self.new_struct(def, field_types, depth)?
                        }
                        Some(TypeDef::Alias(inner)) => self.zero_at_depth(inner, depth + 1)?,
                        None => return Err(runtime(format!("undefined: {name}"))),
                    },
                },
            },
            TypeExpr::Qualified(pkg, name) => {
                let qualified = self.qualified_type_name(pkg, name)?;
                match self.types.get(&qualified) {
                    Some(TypeDef::Struct { def, field_types }) => {
                        self.new_struct(def, field_types, depth)?
                    }
                    _ => return Err(runtime(format!("undefined: {pkg}.{name}"))),
                }
            }
            TypeExpr::Slice(_) => Value::Slice(SliceVal::nil()),
            TypeExpr::Array(len, elem) => {
                let len = len.unwrap_or(0);
                self.check_alloc(len, "runtime error: array too large")?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.zero_at_depth(elem, depth + 1)?);
                }
                let mut slice = SliceVal::new(items);
                slice.array = true;
                Value::Slice(slice)
            }
            TypeExpr::Map(_, value) => Value::Map(MapVal::nil(self.zero_at_depth(value, depth + 1)?)),
            TypeExpr::Pointer(_) | TypeExpr::Func | TypeExpr::Interface(_) => Value::Nil,
            TypeExpr::Struct(fields) => match self.struct_typedef("struct", fields) {
                TypeDef::Struct { def, field_types } => self.new_struct(&def, &field_types, depth)?,
                TypeDef::Alias(_) => Value::Nil,
            },
        })
    }

    fn new_struct(
        &self,
        def: &Rc<StructDef>,
        field_types: &[TypeExpr],
        depth: usize,
    ) -> EvalResult<Value> {
        let mut fields = Vec::with_capacity(field_types.len());
        for ty in field_types {
            fields.push(self.zero_at_depth(ty, depth + 1)?);
        }
        Ok(Value::Struct(Rc::new(RefCell::new(StructVal {
            def: def.clone(),
            fields,
        }))))
    }

    pub(crate) fn qualified_type_name(&self, pkg: &str, name: &str) -> EvalResult<String> {
        match self.imports.get(pkg) {
            Some(path) => Ok(format!("{path}.{name}")),
            None => Err(runtime(format!("undefined: {pkg}"))),
        }
    }

    /// Whether `value`'s dynamic type satisfies `ty`, for type assertions
    /// and type switches.
    pub(crate) fn type_matches(&self, value: &Value, ty: &TypeExpr) -> bool {
        match ty {
            TypeExpr::Named(name) => {
                if let Some(kind) = basic_of(name) {
                    return matches!(
                        (kind, value),
                        (Basic::Int, Value::Int(_))
                            | (Basic::Float, Value::Float(_))
                            | (Basic::String, Value::Str(_))
                            | (Basic::Bool, Value::Bool(_))
                    );
                }
                match name.as_str() {
                    "error" => self.has_method(value, "Error"),
                    "any" => !matches!(value, Value::Nil),
                    _ => match self.types.get(name) {
                        Some(TypeDef::Struct { def, .. }) => {
                            matches!(value, Value::Struct(s) if Rc::ptr_eq(&s.borrow().def, def))
                        }
                        Some(TypeDef::Alias(TypeExpr::Interface(methods))) => {
                            !matches!(value, Value::Nil)
                                && methods.iter().all(|m| self.has_method(value, m))
                        }
                        Some(TypeDef::Alias(inner)) => self.type_matches(value, inner),
                        None => false,
                    },
                }
            }
            TypeExpr::Qualified(_, name) if name == "Stringer" => self.has_method(value, "String"),
            TypeExpr::Qualified(pkg, name) => match self.qualified_type_name(pkg, name) {
                Ok(q) => matches!(value, Value::Struct(s) if *s.borrow().def.name == *q),
                Err(_) => false,
            },
            TypeExpr::Pointer(inner) => match (&**inner, value) {
                (TypeExpr::Named(name), Value::Pointer(s)) => *s.borrow().def.name == **name,
                (_, Value::Ref(cell)) => self.type_matches(&cell.borrow(), inner),
                _ => false,
            },
            TypeExpr::Slice(_) => matches!(value, Value::Slice(s) if !s.array),
            TypeExpr::Array(len, _) => {
                matches!(value, Value::Slice(s) if s.array && len.map_or(true, |n| n == s.len))
            }
            TypeExpr::Map(_, _) => matches!(value, Value::Map(_)),
            TypeExpr::Func => matches!(value, Value::Func(_)),
            TypeExpr::Interface(methods) => {
                !matches!(value, Value::Nil) && methods.iter().all(|m| self.has_method(value, m))
            }
            TypeExpr::Struct(_) => matches!(value, Value::Struct(_)),
        }
    }

    // ------------------------------------------------------------------
    // output
    // ------------------------------------------------------------------

    pub(crate) fn write_stream(&self, stream: Stream, text: &str) {
        match stream {
            Stream::Stdout => self.stdout.write(text.as_bytes()),
            Stream::Stderr => self.stderr.write(text.as_bytes()),
        }
    }
}

impl MethodHook for Evaluator {
    fn display_method(&mut self, value: &Value) -> EvalResult<Option<String>> {
        let Some(type_name) = Self::method_type(value) else {
            return Ok(None);
        };
        for method in ["Error", "String"] {
            let Some(decl) = self.find_method(&type_name, method) else {
                continue;
            };
            if !decl.func.params.is_empty() {
                continue;
            }
            let result = self.call_method_decl(&decl, value.clone(), Vec::new(), false)?;
            return Ok(Some(match result {
                Value::Str(s) => s.to_string(),
                other => format::format_v(self, &other, false, false, 1)?,
            }));
        }
        Ok(None)
    }
}

/// Marker a bare `return` leaves behind.
pub(crate) fn bare_return() -> Value {
    Value::Tuple(Rc::from(Vec::new()))
}

fn is_bare_return(value: &Value) -> bool {
    matches!(value, Value::Tuple(items) if items.is_empty())
}

fn spread_results(value: Value, n: usize) -> Vec<Value> {
    match value {
        Value::Tuple(items) if n > 1 => items.to_vec(),
        other => vec![other],
    }
}

fn pack_results(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::tuple(values)
    }
}

/// Expand `f(xs...)` for functions that take plain argument lists.
fn expand_spread(mut args: Vec<Value>) -> EvalResult<Vec<Value>> {
    match args.pop() {
        Some(Value::Slice(s)) => {
            args.extend(s.to_vec());
            Ok(args)
        }
        Some(Value::Nil) => Ok(args),
        _ => Err(runtime("cannot use ... with non-slice argument")),
    }
}
