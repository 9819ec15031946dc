/*!
Call-site guards and the typed kwargs extractor.

The guards mirror the argument decorators of the built-in function
protocol: reject positional arguments, reject keyword arguments, assert
all-string positionals, reject unknown keyword names. The extractor
consumes a kwargs map once per call and hands out typed values with
located error messages.

*/
use super::value::Value;
use crate::diagnostics::{DiagResult, Diagnostic};
use std::collections::HashMap;

pub fn no_posargs(fname: &str, args: &[Value]) -> DiagResult<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(Diagnostic::invalid_arguments(format!(
            "{} does not take positional arguments.",
            fname
        )))
    }
}

pub fn no_kwargs(fname: &str, kwargs: &HashMap<String, Value>) -> DiagResult<()> {
    if kwargs.is_empty() {
        Ok(())
    } else {
        Err(Diagnostic::invalid_arguments(format!(
            "{} does not take keyword arguments.",
            fname
        )))
    }
}

pub fn string_args(args: &[Value]) -> DiagResult<Vec<String>> {
    args.iter()
        .map(|a| {
            a.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| Diagnostic::invalid_arguments("Arguments must be strings."))
        })
        .collect()
}

pub fn check_arity(fname: &str, args: &[Value], expected: usize) -> DiagResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(Diagnostic::invalid_arguments(format!(
            "{} expected {} arguments, got {}.",
            fname,
            expected,
            args.len()
        )))
    }
}

/// Typed keyword argument extractor. Construct with the permitted key
/// set to reject unknown names up front, then take values out by type.
#[derive(Debug)]
pub struct Kwargs {
    fname: String,
    map: HashMap<String, Value>,
}

impl Kwargs {
    pub fn permitted(
        fname: &str,
        map: HashMap<String, Value>,
        allowed: &[&str],
    ) -> DiagResult<Kwargs> {
        let mut unknown: Vec<&str> = map
            .keys()
            .filter(|k| !allowed.contains(&k.as_str()))
            .map(|k| k.as_str())
            .collect();
        if !unknown.is_empty() {
            unknown.sort();
            return Err(Diagnostic::invalid_arguments(format!(
                "{} got unknown keyword arguments: {}",
                fname,
                unknown.join(", ")
            )));
        }
        Ok(Kwargs {
            fname: fname.to_string(),
            map,
        })
    }

    /// No key validation; for built-ins that forward their kwargs.
    pub fn any(fname: &str, map: HashMap<String, Value>) -> Kwargs {
        Kwargs {
            fname: fname.to_string(),
            map,
        }
    }

    pub fn take(&mut self, key: &str) -> Option<Value> {
        self.map.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    fn type_error(&self, key: &str, wanted: &str) -> Diagnostic {
        Diagnostic::invalid_arguments(format!(
            "Keyword argument '{}' of {} must be {}.",
            key, self.fname, wanted
        ))
    }

    pub fn take_str(&mut self, key: &str) -> DiagResult<Option<String>> {
        match self.map.remove(key) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(_) => Err(self.type_error(key, "a string")),
        }
    }

    pub fn require_str(&mut self, key: &str) -> DiagResult<String> {
        self.take_str(key)?.ok_or_else(|| {
            Diagnostic::invalid_arguments(format!(
                "Missing keyword argument '{}' in {}.",
                key, self.fname
            ))
        })
    }

    pub fn take_bool(&mut self, key: &str, default: bool) -> DiagResult<bool> {
        match self.map.remove(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(b),
            Some(_) => Err(self.type_error(key, "a boolean")),
        }
    }

    pub fn take_int(&mut self, key: &str, default: i64) -> DiagResult<i64> {
        match self.map.remove(key) {
            None => Ok(default),
            Some(Value::Int(i)) => Ok(i),
            Some(_) => Err(self.type_error(key, "an integer")),
        }
    }

    /// A value that may be given as a scalar or a list; always returns a
    /// list.
    pub fn take_list(&mut self, key: &str) -> Vec<Value> {
        match self.map.remove(key) {
            None => Vec::new(),
            Some(value) => value.listify(),
        }
    }

    /// A list (or scalar) of strings.
    pub fn take_string_list(&mut self, key: &str) -> DiagResult<Vec<String>> {
        let items = self.take_list(key);
        items
            .into_iter()
            .map(|v| match v {
                Value::Str(s) => Ok(s),
                _ => Err(self.type_error(key, "a string or a list of strings")),
            })
            .collect()
    }
}
