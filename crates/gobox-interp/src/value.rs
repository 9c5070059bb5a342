//! Runtime values.
//!
//! Reference types (slices, maps, pointers) share their backing storage
//! through `Rc<RefCell<..>>`. Structs and arrays are values in Go, so they
//! are deep-copied by [`Value::copied`] whenever they are assigned or passed.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::ast::{FuncDecl, FuncLit};
use crate::error::{panic, runtime, EvalResult};
use crate::eval::Env;
use crate::stdlib::StdFn;

/// Host-provided function. Arguments and result cross as JSON values; an
/// `Err` surfaces in the guest as a non-nil `error`.
pub type NativeFn =
    Arc<dyn Fn(Vec<serde_json::Value>) -> Result<serde_json::Value, String> + Send + Sync>;

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Slice(SliceVal),
    Map(MapVal),
    Struct(Rc<RefCell<StructVal>>),
    /// Pointer to a struct; shares storage with the struct it was taken from.
    Pointer(Rc<RefCell<StructVal>>),
    /// Pointer to a non-struct variable.
    Ref(Rc<RefCell<Value>>),
    Func(Func),
    Error(Rc<ErrorVal>),
    /// Multiple return values.
    Tuple(Rc<[Value]>),
    Stream(Stream),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug)]
pub struct ErrorVal {
    pub message: String,
    /// Error wrapped with `%w`.
    pub wrapped: Option<Value>,
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn error(message: impl Into<String>) -> Value {
        Value::Error(Rc::new(ErrorVal {
            message: message.into(),
            wrapped: None,
        }))
    }

    pub fn tuple(values: Vec<Value>) -> Value {
        Value::Tuple(Rc::from(values))
    }

    pub fn slice(items: Vec<Value>) -> Value {
        Value::Slice(SliceVal::new(items))
    }

    pub fn is_nil(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::Slice(s) => s.is_nil(),
            Value::Map(m) => m.entries.is_none(),
            _ => false,
        }
    }

    /// Copy with Go value semantics: structs and arrays are duplicated,
    /// everything else shares.
    pub fn copied(&self) -> Value {
        match self {
            Value::Struct(s) => Value::Struct(Rc::new(RefCell::new(s.borrow().deep_copy()))),
            Value::Slice(s) if s.array => Value::Slice(s.deep_copy()),
            other => other.clone(),
        }
    }

    pub fn as_bool(&self) -> EvalResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(runtime(format!(
                "non-boolean condition (type {})",
                other.type_name()
            ))),
        }
    }

    pub fn as_int(&self) -> EvalResult<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            other => Err(runtime(format!(
                "cannot use {} as int value",
                other.type_name()
            ))),
        }
    }

    pub fn as_float(&self) -> EvalResult<f64> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            other => Err(runtime(format!(
                "cannot use {} as float64 value",
                other.type_name()
            ))),
        }
    }

    pub fn as_str(&self) -> EvalResult<Rc<str>> {
        match self {
            Value::Str(s) => Ok(s.clone()),
            other => Err(runtime(format!(
                "cannot use {} as string value",
                other.type_name()
            ))),
        }
    }

    /// Go-style dynamic type name, as printed by `%T`.
    pub fn type_name(&self) -> String {
        match self {
            Value::Nil => "<nil>".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float64".into(),
            Value::Str(_) => "string".into(),
            Value::Slice(s) => {
                let elem = s
                    .to_vec()
                    .first()
                    .map(|v| v.type_name())
                    .unwrap_or_else(|| "interface {}".into());
                if s.array {
                    format!("[{}]{elem}", s.len)
                } else {
                    format!("[]{elem}")
                }
            }
            Value::Map(_) => "map[string]interface {}".into(),
            Value::Struct(s) => format!("main.{}", s.borrow().def.name),
            Value::Pointer(s) => format!("*main.{}", s.borrow().def.name),
            Value::Ref(r) => format!("*{}", r.borrow().type_name()),
            Value::Func(_) => "func()".into(),
            Value::Error(_) => "*errors.errorString".into(),
            Value::Tuple(_) => "tuple".into(),
            Value::Stream(_) => "*os.File".into(),
        }
    }

    /// Convert to JSON for the host boundary.
    pub fn to_json(&self) -> Result<serde_json::Value, String> {
        use serde_json::Value as J;
        Ok(match self {
            Value::Nil => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Int(i) => J::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(J::Number)
                .ok_or_else(|| format!("json: unsupported value: {f}"))?,
            Value::Str(s) => J::String(s.to_string()),
            Value::Slice(s) => {
                if s.is_nil() {
                    J::Null
                } else {
                    J::Array(
                        s.to_vec()
                            .iter()
                            .map(Value::to_json)
                            .collect::<Result<_, _>>()?,
                    )
                }
            }
            Value::Map(m) => match &m.entries {
                None => J::Null,
                Some(entries) => {
                    let mut out = serde_json::Map::new();
                    for (k, v) in entries.borrow().iter() {
                        out.insert(k.to_string(), v.to_json()?);
                    }
                    J::Object(out)
                }
            },
            Value::Struct(s) | Value::Pointer(s) => {
                let s = s.borrow();
                let mut out = serde_json::Map::new();
                for (name, value) in s.json_fields() {
                    out.insert(name, value.to_json()?);
                }
                J::Object(out)
            }
            Value::Ref(r) => r.borrow().to_json()?,
            Value::Error(e) => J::String(e.message.clone()),
            other => return Err(format!("json: unsupported type: {}", other.type_name())),
        })
    }

    /// Convert a host JSON value into a guest value. Numbers always become
    /// `float64`, objects become `map[string]interface{}`.
    pub fn from_json(value: &serde_json::Value) -> Value {
        use serde_json::Value as J;
        match value {
            J::Null => Value::Nil,
            J::Bool(b) => Value::Bool(*b),
            J::Number(n) => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            J::String(s) => Value::str(s),
            J::Array(items) => Value::slice(items.iter().map(Value::from_json).collect()),
            J::Object(obj) => {
                let map: BTreeMap<MapKey, Value> = obj
                    .iter()
                    .map(|(k, v)| (MapKey::Str(Rc::from(k.as_str())), Value::from_json(v)))
                    .collect();
                Value::Map(MapVal::from_entries(map, Value::Nil))
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Slice(s) => f.debug_list().entries(s.to_vec()).finish(),
            Value::Map(m) => match &m.entries {
                Some(e) => f.debug_map().entries(e.borrow().iter()).finish(),
                None => write!(f, "Map(nil)"),
            },
            Value::Struct(s) => write!(f, "Struct({})", s.borrow().def.name),
            Value::Pointer(s) => write!(f, "Pointer({})", s.borrow().def.name),
            Value::Ref(r) => write!(f, "Ref({:?})", r.borrow()),
            Value::Func(func) => write!(f, "Func({})", func.name()),
            Value::Error(e) => write!(f, "Error({:?})", e.message),
            Value::Tuple(t) => f.debug_tuple("Tuple").field(&t.len()).finish(),
            Value::Stream(s) => write!(f, "Stream({s:?})"),
        }
    }
}

/// Go `==` over two values.
pub fn values_equal(a: &Value, b: &Value) -> EvalResult<bool> {
    Ok(match (a, b) {
        (Value::Nil, other) | (other, Value::Nil) => other.is_nil(),
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            a.as_float()? == b.as_float()?
        }
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Struct(x), Value::Struct(y)) => {
            if Rc::ptr_eq(x, y) {
                return Ok(true);
            }
            let (x, y) = (x.borrow(), y.borrow());
            if !Rc::ptr_eq(&x.def, &y.def) {
                return Ok(false);
            }
            for (fx, fy) in x.fields.iter().zip(y.fields.iter()) {
                if !values_equal(fx, fy)? {
                    return Ok(false);
                }
            }
            true
        }
        (Value::Pointer(x), Value::Pointer(y)) => Rc::ptr_eq(x, y),
        (Value::Ref(x), Value::Ref(y)) => Rc::ptr_eq(x, y),
        (Value::Error(x), Value::Error(y)) => Rc::ptr_eq(x, y),
        (Value::Stream(x), Value::Stream(y)) => x == y,
        (Value::Slice(x), Value::Slice(y)) if x.array && y.array => {
            let (x, y) = (x.to_vec(), y.to_vec());
            if x.len() != y.len() {
                return Ok(false);
            }
            for (vx, vy) in x.iter().zip(y.iter()) {
                if !values_equal(vx, vy)? {
                    return Ok(false);
                }
            }
            true
        }
        (Value::Slice(_), _) | (_, Value::Slice(_)) => {
            return Err(runtime("slice can only be compared to nil"))
        }
        (Value::Map(_), _) | (_, Value::Map(_)) => {
            return Err(runtime("map can only be compared to nil"))
        }
        (Value::Func(_), _) | (_, Value::Func(_)) => {
            return Err(runtime("func can only be compared to nil"))
        }
        _ => false,
    })
}

// ----------------------------------------------------------------------
// slices
// ----------------------------------------------------------------------

/// A view into a shared backing array. The backing vector may be shorter
/// than `start + cap`; capacity beyond it is materialized on append.
#[derive(Clone)]
pub struct SliceVal {
    pub data: Rc<RefCell<Vec<Value>>>,
    pub start: usize,
    pub len: usize,
    pub cap: usize,
    /// Fixed-size array rather than slice.
    pub array: bool,
    /// The nil slice, as opposed to an empty one.
    pub nil: bool,
}

impl SliceVal {
    pub fn new(items: Vec<Value>) -> Self {
        let len = items.len();
        Self {
            data: Rc::new(RefCell::new(items)),
            start: 0,
            len,
            cap: len,
            array: false,
            nil: false,
        }
    }

    pub fn with_capacity(items: Vec<Value>, cap: usize) -> Self {
        let mut s = Self::new(items);
        s.cap = cap.max(s.len);
        s
    }

    pub fn nil() -> Self {
        Self {
            nil: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn is_nil(&self) -> bool {
        self.nil
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        if index >= self.len {
            return None;
        }
        Some(
            self.data
                .borrow()
                .get(self.start + index)
                .cloned()
                .unwrap_or(Value::Nil),
        )
    }

    pub fn set(&self, index: usize, value: Value) -> bool {
        if index >= self.len {
            return false;
        }
        let mut data = self.data.borrow_mut();
        let at = self.start + index;
        while data.len() <= at {
            data.push(Value::Nil);
        }
        data[at] = value;
        true
    }

    pub fn to_vec(&self) -> Vec<Value> {
        let data = self.data.borrow();
        (0..self.len)
            .map(|i| data.get(self.start + i).cloned().unwrap_or(Value::Nil))
            .collect()
    }

    /// `s[lo:hi]`; bounds are checked against capacity.
    pub fn reslice(&self, lo: usize, hi: usize) -> EvalResult<SliceVal> {
        if lo > hi || hi > self.cap {
            return Err(panic(format!(
                "runtime error: slice bounds out of range [{lo}:{hi}] with capacity {}",
                self.cap
            )));
        }
        Ok(SliceVal {
            data: self.data.clone(),
            start: self.start + lo,
            len: hi - lo,
            cap: self.cap - lo,
            array: false,
            nil: self.nil && hi == 0,
        })
    }

    /// Go `append`: writes in place while capacity allows, otherwise grows
    /// into a fresh backing array. Growth never takes capacity past
    /// `limit` elements.
    pub fn append(&self, items: Vec<Value>, limit: usize) -> EvalResult<SliceVal> {
        let needed = self.len + items.len();
        if needed > limit {
            return Err(panic("runtime error: growslice: len out of range"));
        }
        if needed <= self.cap && !self.array {
            {
                let mut data = self.data.borrow_mut();
                for (i, item) in items.into_iter().enumerate() {
                    let at = self.start + self.len + i;
                    while data.len() < at {
                        data.push(Value::Nil);
                    }
                    if at < data.len() {
                        data[at] = item;
                    } else {
                        data.push(item);
                    }
                }
            }
            return Ok(SliceVal {
                data: self.data.clone(),
                start: self.start,
                len: needed,
                cap: self.cap,
                array: false,
                nil: self.nil && needed == 0,
            });
        }
        let cap = needed.max(self.cap.saturating_mul(2)).max(4).min(limit.max(needed));
        let mut fresh = Vec::with_capacity(needed);
        fresh.extend(self.to_vec());
        fresh.extend(items);
        Ok(SliceVal::with_capacity(fresh, cap))
    }

    fn deep_copy(&self) -> SliceVal {
        let items = self.to_vec().iter().map(Value::copied).collect();
        let mut s = SliceVal::new(items);
        s.array = self.array;
        s.nil = self.nil;
        s
    }
}

// ----------------------------------------------------------------------
// maps
// ----------------------------------------------------------------------

#[derive(Clone)]
pub struct MapVal {
    /// `None` is a nil map.
    pub entries: Option<Rc<RefCell<BTreeMap<MapKey, Value>>>>,
    /// Returned for missing keys.
    pub zero: Rc<Value>,
}

impl MapVal {
    pub fn new(zero: Value) -> Self {
        Self::from_entries(BTreeMap::new(), zero)
    }

    pub fn nil(zero: Value) -> Self {
        Self {
            entries: None,
            zero: Rc::new(zero),
        }
    }

    pub fn from_entries(entries: BTreeMap<MapKey, Value>, zero: Value) -> Self {
        Self {
            entries: Some(Rc::new(RefCell::new(entries))),
            zero: Rc::new(zero),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map(|e| e.borrow().len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookup(&self, key: &MapKey) -> Option<Value> {
        self.entries.as_ref()?.borrow().get(key).cloned()
    }

    pub fn insert(&self, key: MapKey, value: Value) -> EvalResult<()> {
        match &self.entries {
            Some(entries) => {
                entries.borrow_mut().insert(key, value);
                Ok(())
            }
            None => Err(panic("assignment to entry in nil map")),
        }
    }

    pub fn remove(&self, key: &MapKey) {
        if let Some(entries) = &self.entries {
            entries.borrow_mut().remove(key);
        }
    }

    pub fn snapshot(&self) -> Vec<(MapKey, Value)> {
        match &self.entries {
            Some(entries) => entries
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Hashable subset of values usable as map keys. Ordering matches the
/// sorted key order `fmt` prints maps in.
#[derive(Debug, Clone)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
}

impl MapKey {
    pub fn from_value(value: &Value) -> EvalResult<MapKey> {
        Ok(match value {
            Value::Bool(b) => MapKey::Bool(*b),
            Value::Int(i) => MapKey::Int(*i),
            Value::Float(f) => MapKey::Float(*f),
            Value::Str(s) => MapKey::Str(s.clone()),
            other => {
                return Err(runtime(format!(
                    "unsupported map key type {}",
                    other.type_name()
                )))
            }
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(i) => Value::Int(*i),
            MapKey::Float(f) => Value::Float(*f),
            MapKey::Str(s) => Value::Str(s.clone()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            MapKey::Bool(_) => 0,
            MapKey::Int(_) => 1,
            MapKey::Float(_) => 2,
            MapKey::Str(_) => 3,
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(b) => write!(f, "{b}"),
            MapKey::Int(i) => write!(f, "{i}"),
            MapKey::Float(x) => f.write_str(&crate::format::format_float_v(*x)),
            MapKey::Str(s) => f.write_str(s),
        }
    }
}

impl Ord for MapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (MapKey::Bool(a), MapKey::Bool(b)) => a.cmp(b),
            (MapKey::Int(a), MapKey::Int(b)) => a.cmp(b),
            (MapKey::Float(a), MapKey::Float(b)) => a.total_cmp(b),
            (MapKey::Str(a), MapKey::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for MapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MapKey {}

// ----------------------------------------------------------------------
// structs
// ----------------------------------------------------------------------

#[derive(Debug)]
pub struct StructDef {
    pub name: Rc<str>,
    pub fields: Vec<FieldDef>,
}

#[derive(Debug)]
pub struct FieldDef {
    pub name: Rc<str>,
    pub embedded: bool,
    /// Key used by `encoding/json`; `None` when the field is skipped.
    pub json_name: Option<String>,
    pub omit_empty: bool,
}

impl FieldDef {
    pub fn new(name: &str, embedded: bool, tag: Option<&str>) -> Self {
        let exported = name.chars().next().is_some_and(char::is_uppercase);
        let mut json_name = exported.then(|| name.to_string());
        let mut omit_empty = false;
        if let Some(spec) = tag.and_then(|t| struct_tag_value(t, "json")) {
            let mut parts = spec.split(',');
            match parts.next() {
                Some("-") => json_name = None,
                Some("") | None => {}
                Some(renamed) if exported => json_name = Some(renamed.to_string()),
                Some(_) => {}
            }
            omit_empty = parts.any(|p| p == "omitempty");
        }
        Self {
            name: Rc::from(name),
            embedded,
            json_name,
            omit_empty,
        }
    }
}

/// Look up `key:"value"` in a raw struct tag.
fn struct_tag_value<'a>(tag: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("{key}:\"");
    let start = tag.find(&needle)? + needle.len();
    let rest = &tag[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

pub struct StructVal {
    pub def: Rc<StructDef>,
    pub fields: Vec<Value>,
}

impl StructVal {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.def.fields.iter().position(|f| &*f.name == name)
    }

    /// Field lookup including fields promoted from embedded structs.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(i) = self.field_index(name) {
            return Some(self.fields[i].clone());
        }
        self.def
            .fields
            .iter()
            .zip(self.fields.iter())
            .filter(|(def, _)| def.embedded)
            .find_map(|(_, value)| match value {
                Value::Struct(inner) | Value::Pointer(inner) => inner.borrow().get(name),
                _ => None,
            })
    }

    pub fn set(&mut self, name: &str, value: Value) -> bool {
        if let Some(i) = self.field_index(name) {
            self.fields[i] = value;
            return true;
        }
        for (def, field) in self.def.fields.iter().zip(self.fields.iter()) {
            if !def.embedded {
                continue;
            }
            if let Value::Struct(inner) | Value::Pointer(inner) = field {
                if inner.borrow_mut().set(name, value.clone()) {
                    return true;
                }
            }
        }
        false
    }

    fn deep_copy(&self) -> StructVal {
        StructVal {
            def: self.def.clone(),
            fields: self.fields.iter().map(Value::copied).collect(),
        }
    }

    /// Fields visible to `encoding/json`, in declaration order.
    pub fn json_fields(&self) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        for (def, value) in self.def.fields.iter().zip(self.fields.iter()) {
            if def.embedded {
                if let Value::Struct(inner) | Value::Pointer(inner) = value {
                    out.extend(inner.borrow().json_fields());
                    continue;
                }
            }
            let Some(name) = &def.json_name else {
                continue;
            };
            if def.omit_empty && is_empty_value(value) {
                continue;
            }
            out.push((name.clone(), value.clone()));
        }
        out
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Nil => true,
        Value::Bool(b) => !b,
        Value::Int(i) => *i == 0,
        Value::Float(f) => *f == 0.0,
        Value::Str(s) => s.is_empty(),
        Value::Slice(s) => s.len == 0,
        Value::Map(m) => m.is_empty(),
        _ => false,
    }
}

// ----------------------------------------------------------------------
// functions
// ----------------------------------------------------------------------

#[derive(Clone)]
pub enum Func {
    Closure(Rc<Closure>),
    Method(Rc<BoundMethod>),
    Builtin(&'static str),
    Std(&'static str, StdFn),
    Native(Rc<str>, NativeFn),
}

impl Func {
    pub fn name(&self) -> &str {
        match self {
            Func::Closure(c) => &c.name,
            Func::Method(m) => &m.decl.name,
            Func::Builtin(name) | Func::Std(name, _) => name,
            Func::Native(name, _) => name,
        }
    }
}

pub struct Closure {
    pub name: Rc<str>,
    pub lit: Rc<FuncLit>,
    pub env: Env,
}

/// A method value with its receiver already bound.
pub struct BoundMethod {
    pub recv: Value,
    pub decl: Rc<FuncDecl>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_within_capacity_aliases_backing_array() {
        let base = SliceVal::with_capacity(vec![Value::Int(1)], 4);
        let a = base.append(vec![Value::Int(2)], usize::MAX).unwrap();
        let b = base.append(vec![Value::Int(3)], usize::MAX).unwrap();
        // Both appends wrote into the same slot, as in Go.
        assert!(matches!(a.get(1), Some(Value::Int(3))));
        assert!(matches!(b.get(1), Some(Value::Int(3))));
    }

    #[test]
    fn append_beyond_capacity_copies() {
        let base = SliceVal::new(vec![Value::Int(1)]);
        let grown = base.append(vec![Value::Int(2)], usize::MAX).unwrap();
        grown.set(0, Value::Int(9));
        assert!(matches!(base.get(0), Some(Value::Int(1))));
        assert_eq!(grown.len, 2);
    }

    #[test]
    fn reslice_checks_capacity() {
        let s = SliceVal::new(vec![Value::Int(1), Value::Int(2)]);
        assert!(s.reslice(0, 3).is_err());
        let tail = s.reslice(1, 2).unwrap();
        assert!(matches!(tail.get(0), Some(Value::Int(2))));
    }

    #[test]
    fn nil_slice_equals_nil() {
        let s = Value::Slice(SliceVal::nil());
        assert!(values_equal(&s, &Value::Nil).unwrap());
    }

    #[test]
    fn empty_slice_is_not_nil() {
        let empty = Value::Slice(SliceVal::new(Vec::new()));
        assert!(!values_equal(&empty, &Value::Nil).unwrap());
        assert!(!SliceVal::with_capacity(Vec::new(), 0).is_nil());
        assert!(SliceVal::nil().reslice(0, 0).unwrap().is_nil());
    }

    #[test]
    fn append_past_the_limit_panics() {
        let base = SliceVal::new(vec![Value::Int(1), Value::Int(2)]);
        assert!(base.append(vec![Value::Int(3)], 2).is_err());
        let grown = base.append(vec![Value::Int(3)], 3).unwrap();
        assert_eq!(grown.cap, 3);
    }

    #[test]
    fn slices_are_not_comparable() {
        let a = Value::slice(vec![Value::Int(1)]);
        let b = Value::slice(vec![Value::Int(1)]);
        assert!(values_equal(&a, &b).is_err());
    }

    #[test]
    fn nil_map_insert_panics() {
        let m = MapVal::nil(Value::Int(0));
        let err = m.insert(MapKey::Str(Rc::from("a")), Value::Int(1)).unwrap_err();
        assert!(err.to_string().contains("nil map"));
    }

    #[test]
    fn map_keys_sort_numerically() {
        let mut keys = vec![MapKey::Int(10), MapKey::Int(2), MapKey::Int(-1)];
        keys.sort();
        assert_eq!(keys, vec![MapKey::Int(-1), MapKey::Int(2), MapKey::Int(10)]);
    }

    #[test]
    fn json_numbers_arrive_as_floats() {
        let v = Value::from_json(&serde_json::json!({"a": 2}));
        let Value::Map(m) = v else { panic!("expected map") };
        assert!(matches!(
            m.lookup(&MapKey::Str(Rc::from("a"))),
            Some(Value::Float(f)) if f == 2.0
        ));
    }

    #[test]
    fn field_def_honours_json_tags() {
        let renamed = FieldDef::new("Name", false, Some(r#"json:"name,omitempty""#));
        assert_eq!(renamed.json_name.as_deref(), Some("name"));
        assert!(renamed.omit_empty);
        let skipped = FieldDef::new("Secret", false, Some(r#"json:"-""#));
        assert!(skipped.json_name.is_none());
        let private = FieldDef::new("count", false, None);
        assert!(private.json_name.is_none());
    }

    #[test]
    fn struct_copy_is_independent() {
        let def = Rc::new(StructDef {
            name: Rc::from("P"),
            fields: vec![FieldDef::new("X", false, None)],
        });
        let original = Value::Struct(Rc::new(RefCell::new(StructVal {
            def,
            fields: vec![Value::Int(1)],
        })));
        let copy = original.copied();
        if let Value::Struct(s) = &copy {
            s.borrow_mut().set("X", Value::Int(2));
        }
        if let Value::Struct(s) = &original {
            assert!(matches!(s.borrow().get("X"), Some(Value::Int(1))));
        }
    }
}
