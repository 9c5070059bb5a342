//! Standard library packages available to guest programs.
//!
//! Each package is a flat table of members. Functions take the evaluator so
//! they can write output, call back into guest closures and dispatch
//! user-defined `String()`/`Error()` methods while formatting.

mod errors;
mod fmt;
mod json;
mod math;
mod os;
mod sort;
mod strconv;
mod strings;
mod unicode;

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{runtime, EvalResult};
use crate::eval::Evaluator;
use crate::value::{Stream, Value};

pub type StdFn = fn(&mut Evaluator, Vec<Value>) -> EvalResult<Value>;

#[derive(Clone, Copy)]
pub enum Member {
    Func(StdFn),
    Int(i64),
    Float(f64),
    Stream(Stream),
}

type Package = HashMap<&'static str, Member>;

/// Import path -> package members.
pub struct SymbolTable {
    packages: HashMap<&'static str, Package>,
}

impl SymbolTable {
    pub fn standard() -> Self {
        let mut packages = HashMap::new();
        packages.insert("fmt", fmt::members());
        packages.insert("strings", strings::members());
        packages.insert("strconv", strconv::members());
        packages.insert("math", math::members());
        packages.insert("errors", errors::members());
        packages.insert("sort", sort::members());
        packages.insert("unicode", unicode::members());
        packages.insert("unicode/utf8", unicode::utf8_members());
        packages.insert("os", os::members());
        packages.insert("encoding/json", json::members());
        Self { packages }
    }

    /// Canonical import path, if the package is available.
    pub fn package_path(&self, path: &str) -> Option<&'static str> {
        self.packages.get_key_value(path).map(|(k, _)| *k)
    }

    pub fn lookup(&self, path: &str, name: &str) -> Option<(&'static str, Member)> {
        self.packages
            .get(path)?
            .get_key_value(name)
            .map(|(k, m)| (*k, *m))
    }

    /// Available import paths, sorted.
    pub fn packages(&self) -> Vec<&'static str> {
        let mut paths: Vec<_> = self.packages.keys().copied().collect();
        paths.sort_unstable();
        paths
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn funcs(entries: &[(&'static str, StdFn)]) -> Package {
    entries.iter().map(|(n, f)| (*n, Member::Func(*f))).collect()
}

// ----------------------------------------------------------------------
// argument helpers
// ----------------------------------------------------------------------

pub(crate) fn want(args: &[Value], n: usize, func: &str) -> EvalResult<()> {
    if args.len() != n {
        return Err(runtime(format!(
            "wrong number of arguments in call to {func}: have {}, want {n}",
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn str_arg(args: &[Value], i: usize, func: &str) -> EvalResult<Rc<str>> {
    match args.get(i) {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(other) => Err(runtime(format!(
            "cannot use {} as string value in argument to {func}",
            other.type_name()
        ))),
        None => Err(runtime(format!("not enough arguments in call to {func}"))),
    }
}

pub(crate) fn int_arg(args: &[Value], i: usize, func: &str) -> EvalResult<i64> {
    match args.get(i) {
        Some(v) => v.as_int(),
        None => Err(runtime(format!("not enough arguments in call to {func}"))),
    }
}

pub(crate) fn float_arg(args: &[Value], i: usize, func: &str) -> EvalResult<f64> {
    match args.get(i) {
        Some(v) => v.as_float(),
        None => Err(runtime(format!("not enough arguments in call to {func}"))),
    }
}

/// `(value, nil)`.
pub(crate) fn ok(value: Value) -> Value {
    Value::tuple(vec![value, Value::Nil])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_resolves_nested_paths() {
        let table = SymbolTable::standard();
        assert_eq!(table.package_path("encoding/json"), Some("encoding/json"));
        assert!(table.package_path("net/http").is_none());
        assert!(table.lookup("strings", "ToUpper").is_some());
        assert!(table.lookup("strings", "NoSuchThing").is_none());
    }

    #[test]
    fn constants_are_exposed_as_members() {
        let table = SymbolTable::standard();
        assert!(matches!(
            table.lookup("math", "MaxInt64"),
            Some((_, Member::Int(i64::MAX)))
        ));
        assert!(matches!(
            table.lookup("os", "Stdout"),
            Some((_, Member::Stream(Stream::Stdout)))
        ));
    }

    #[test]
    fn packages_are_listed_sorted() {
        let paths = SymbolTable::standard().packages();
        let mut sorted = paths.clone();
        sorted.sort_unstable();
        assert_eq!(paths, sorted);
        assert!(paths.contains(&"fmt"));
    }
}
