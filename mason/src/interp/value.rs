use crate::build::{ExtractedObjects, File, GeneratedList, GeneratorId, IncludeDirs, TargetId};
use crate::common::ConfigurationData;
use crate::compilers::checks::CheckRunResult;
use crate::compilers::Language;
use crate::coredata::DepRecord;
use crate::deps::{ExternalLibrary, ExternalProgram};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Runtime values of the build language. Lists are the only aggregate;
/// everything else scripts touch through methods is an [`Object`].
#[derive(Debug, Clone)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    File(File),
    Object(Object),
}

/// Which machine a machine object describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineScope {
    Build,
    Host,
    Target,
}

/// Configuration data gains an immutability latch once consumed by
/// `configure_file`.
#[derive(Debug, Default)]
pub struct ConfDataHolder {
    pub data: ConfigurationData,
    pub used: bool,
}

/// A finished subproject: its exported variable table.
#[derive(Debug)]
pub struct SubprojectData {
    pub name: String,
    pub variables: HashMap<String, Value>,
}

/// The result of `run_command()`.
#[derive(Debug)]
pub struct RunResultData {
    pub returncode: i64,
    pub stdout: String,
    pub stderr: String,
}

/// A dependency as scripts see it.
#[derive(Debug)]
pub enum Dep {
    External(DepRecord),
    Internal {
        include_dirs: Vec<IncludeDirs>,
        link_with: Vec<TargetId>,
        sources: Vec<File>,
    },
    NotFound {
        name: String,
    },
}

impl Dep {
    pub fn found(&self) -> bool {
        match self {
            Dep::External(record) => record.found,
            Dep::Internal { .. } => true,
            Dep::NotFound { .. } => false,
        }
    }

}

/// Domain entities wrapped for script access. Method dispatch matches on
/// the variant and then on the method name, so script-visible error
/// messages keep their string keys.
#[derive(Debug, Clone)]
pub enum Object {
    ConfigData(Rc<RefCell<ConfDataHolder>>),
    Target(TargetId),
    ExtractedObjects(Rc<ExtractedObjects>),
    Generator(GeneratorId),
    GeneratedList(Rc<GeneratedList>),
    Dependency(Rc<Dep>),
    ExternalProgram(Rc<ExternalProgram>),
    ExternalLibrary(Rc<ExternalLibrary>),
    IncludeDirs(Rc<IncludeDirs>),
    /// Return value of the install declaration functions; carries no
    /// methods, but stays assignable.
    Installable(&'static str),
    RunResult(Rc<RunResultData>),
    TryRunResult(Rc<CheckRunResult>),
    Compiler {
        language: Language,
        native: bool,
    },
    Machine(MachineScope),
    MesonMain,
    Subproject(Rc<SubprojectData>),
    Module(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::File(_) => "file",
            Value::Object(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Wrap a non-list into a one-element list; pass lists through.
    pub fn listify(self) -> Vec<Value> {
        match self {
            Value::List(items) => items,
            other => vec![other],
        }
    }
}

/// Recursively inline nested lists, the calling convention of most
/// built-in functions.
pub fn flatten(values: Vec<Value>) -> Vec<Value> {
    let mut out = Vec::new();
    for value in values {
        match value {
            Value::List(items) => out.extend(flatten(items)),
            other => out.push(other),
        }
    }
    out
}

/// Script-level equality: structural over elementary types and files,
/// identity over wrapped objects.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::File(x), Value::File(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => objects_identical(x, y),
        _ => false,
    }
}

fn objects_identical(a: &Object, b: &Object) -> bool {
    match (a, b) {
        (Object::Target(x), Object::Target(y)) => x == y,
        (Object::Generator(x), Object::Generator(y)) => x == y,
        (Object::ConfigData(x), Object::ConfigData(y)) => Rc::ptr_eq(x, y),
        (Object::Dependency(x), Object::Dependency(y)) => Rc::ptr_eq(x, y),
        (Object::ExternalProgram(x), Object::ExternalProgram(y)) => Rc::ptr_eq(x, y),
        (Object::ExternalLibrary(x), Object::ExternalLibrary(y)) => Rc::ptr_eq(x, y),
        (Object::Machine(x), Object::Machine(y)) => x == y,
        (Object::MesonMain, Object::MesonMain) => true,
        _ => false,
    }
}

/// Render a value the way `message()` presents user arguments: strings
/// quoted inside lists, booleans lowercase.
pub fn stringify_user(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(format!("'{}'", s)),
        Value::Int(i) => Some(i.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::List(items) => {
            let rendered: Option<Vec<String>> = items.iter().map(stringify_user).collect();
            Some(format!("[{}]", rendered?.join(", ")))
        }
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flatten_inlines_nested_lists() {
        let nested = vec![
            Value::Str("a".to_string()),
            Value::List(vec![
                Value::Str("b".to_string()),
                Value::List(vec![Value::Str("c".to_string())]),
            ]),
        ];
        let flat = flatten(nested);
        let names: Vec<&str> = flat.iter().filter_map(|v| v.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn equality_is_structural_for_elementary_types() {
        assert!(values_equal(
            &Value::List(vec![Value::Int(1), Value::Str("x".to_string())]),
            &Value::List(vec![Value::Int(1), Value::Str("x".to_string())]),
        ));
        assert!(!values_equal(&Value::Int(1), &Value::Str("1".to_string())));
        assert!(!values_equal(&Value::Bool(true), &Value::Int(1)));
    }

    #[test]
    fn object_equality_is_identity() {
        let holder = Rc::new(RefCell::new(ConfDataHolder::default()));
        let a = Value::Object(Object::ConfigData(holder.clone()));
        let b = Value::Object(Object::ConfigData(holder));
        let c = Value::Object(Object::ConfigData(Rc::new(RefCell::new(
            ConfDataHolder::default(),
        ))));
        assert!(values_equal(&a, &b));
        assert!(!values_equal(&a, &c));
    }

    #[test]
    fn stringify_renders_like_the_original() {
        let value = Value::List(vec![
            Value::Str("a".to_string()),
            Value::Int(1),
            Value::List(vec![Value::Str("b".to_string())]),
        ]);
        assert_eq!(stringify_user(&value).unwrap(), "['a', 1, ['b']]");
        assert_eq!(stringify_user(&Value::Bool(true)).unwrap(), "true");
        assert!(stringify_user(&Value::Object(Object::MesonMain)).is_none());
    }
}
