/*!
# The interpreter

Walks the AST of a build description, dispatching statements to the
built-in functions and object methods, maintaining the immutable
variable table, and recursing into subdirectories and subprojects. All
mutation of the build graph and option store happens here, on state
borrowed from the configure driver.

*/
mod functions;
mod kwargs;
mod objects;
mod value;

pub use value::{Dep, MachineScope, Object, SubprojectData, Value};

use crate::build::Build;
use crate::diagnostics::{DiagResult, Diagnostic};
use crate::env::{Environment, BUILD_FILENAME, OPTIONS_FILENAME};
use crate::options::OptionInterpreter;
use lazy_static::lazy_static;
use log::info;
use mason_lang::{Args, ArithOp, CmpOp, Node, NodeKind};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

lazy_static! {
    static ref VARIABLE_NAME: Regex = Regex::new("^[_a-zA-Z][_0-9a-zA-Z]*$").unwrap();
}

const BUILTIN_VARIABLES: &[&str] = &["meson", "build_machine", "host_machine", "target_machine"];

pub struct Interpreter<'a> {
    pub env: &'a mut Environment,
    pub build: &'a mut Build,
    pub subproject: String,
    pub subdir: String,
    pub subproject_dir: String,
    pub variables: HashMap<String, Value>,
    ast: Node,
    pub build_def_files: Vec<String>,
    visited_subdirs: HashSet<String>,
    pub global_args_frozen: bool,
    pub subprojects: HashMap<String, Value>,
    pub subproject_stack: Vec<String>,
    pub active_projectname: String,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        env: &'a mut Environment,
        build: &'a mut Build,
        subproject: &str,
        subdir: &str,
        subproject_dir: &str,
    ) -> DiagResult<Interpreter<'a>> {
        let option_file = env.source_dir.join(subdir).join(OPTIONS_FILENAME);
        if option_file.exists() {
            let cmd_line = env.cmd_line_options.clone();
            let mut oi =
                OptionInterpreter::new(&mut env.coredata.options, subproject, &cmd_line)
                    .map_err(Diagnostic::from)?;
            oi.process(&option_file)?;
        }

        let mesonfile = env.source_dir.join(subdir).join(BUILD_FILENAME);
        if !mesonfile.is_file() {
            return Err(Diagnostic::invalid_arguments(format!(
                "Missing Meson file in {}",
                mesonfile.display()
            )));
        }
        let code = std::fs::read_to_string(&mesonfile).map_err(|e| {
            Diagnostic::environment(format!("Could not read {}: {}", mesonfile.display(), e))
        })?;
        if code.trim().is_empty() {
            return Err(Diagnostic::invalid_code("Builder file is empty."));
        }
        let ast = parse_build_file(&code, &relative_build_file(subdir))?;
        let interp = Interpreter {
            env,
            build,
            subproject: subproject.to_string(),
            subdir: subdir.to_string(),
            subproject_dir: subproject_dir.to_string(),
            variables: HashMap::new(),
            ast,
            build_def_files: vec![relative_build_file(subdir).to_string_lossy().into_owned()],
            visited_subdirs: HashSet::new(),
            global_args_frozen: false,
            subprojects: HashMap::new(),
            subproject_stack: Vec::new(),
            active_projectname: String::new(),
        };
        interp.sanity_check_ast()?;
        Ok(interp)
    }

    fn sanity_check_ast(&self) -> DiagResult<()> {
        let lines = match &self.ast.kind {
            NodeKind::CodeBlock(lines) => lines,
            _ => return Err(Diagnostic::internal("AST root is not a code block.")),
        };
        if lines.is_empty() {
            return Err(Diagnostic::invalid_code("No statements in code."));
        }
        match &lines[0].kind {
            NodeKind::Function { name, .. } if name == "project" => Ok(()),
            _ => Err(Diagnostic::invalid_code(
                "First statement must be a call to project",
            )),
        }
    }

    pub fn run(&mut self) -> DiagResult<()> {
        let ast = self.ast.clone();
        self.evaluate_codeblock(&ast)?;
        if self.subproject.is_empty() {
            info!("Build targets in project: {}", self.build.targets.len());
        }
        Ok(())
    }

    pub fn is_subproject(&self) -> bool {
        !self.subproject.is_empty()
    }

    /// The build file currently being evaluated, relative to the source
    /// root; used to decorate diagnostics.
    pub(super) fn current_file(&self) -> PathBuf {
        relative_build_file(&self.subdir)
    }

    pub(super) fn evaluate_codeblock(&mut self, node: &Node) -> DiagResult<()> {
        let lines = match &node.kind {
            NodeKind::CodeBlock(lines) => lines,
            _ => {
                return Err(Diagnostic::internal(
                    "Tried to execute a non-codeblock. Possibly a bug in the parser.",
                ))
            }
        };
        for statement in lines {
            self.evaluate_statement(statement).map_err(|e| {
                e.or_location(self.current_file(), statement.line, statement.col)
            })?;
        }
        Ok(())
    }

    /// Evaluate one statement or expression. `None` means the statement
    /// produced no value; assigning it is an error.
    pub(super) fn evaluate_statement(&mut self, node: &Node) -> DiagResult<Option<Value>> {
        match &node.kind {
            NodeKind::Function { name, args } => self.function_call(node, name, args),
            NodeKind::Method {
                receiver,
                name,
                args,
            } => self.method_call(node, receiver, name, args),
            NodeKind::Assign { name, value } => {
                let rhs = self.evaluate_require_value(value)?;
                self.set_variable(name, rhs)?;
                Ok(None)
            }
            NodeKind::PlusAssign { name, value } => {
                self.evaluate_plusassign(name, value)?;
                Ok(None)
            }
            NodeKind::If {
                branches,
                else_block,
            } => {
                for branch in branches {
                    let cond = self.evaluate_require_value(&branch.condition)?;
                    let cond = cond.as_bool().ok_or_else(|| {
                        Diagnostic::invalid_code("If clause does not evaluate to true or false.")
                    })?;
                    if cond {
                        self.evaluate_codeblock(&branch.block)?;
                        return Ok(None);
                    }
                }
                if let Some(block) = else_block {
                    self.evaluate_codeblock(block)?;
                }
                Ok(None)
            }
            NodeKind::Foreach { var, items, block } => {
                let items = self.evaluate_require_value(items)?;
                let items = match items {
                    Value::List(items) => items,
                    _ => {
                        return Err(Diagnostic::invalid_arguments(
                            "Items of foreach loop is not an array",
                        ))
                    }
                };
                for item in items {
                    // The loop variable binds in the enclosing scope.
                    self.set_variable(var, item)?;
                    self.evaluate_codeblock(block)?;
                }
                Ok(None)
            }
            NodeKind::Index { object, index } => {
                let object = self.evaluate_require_value(object)?;
                let items = match object {
                    Value::List(items) => items,
                    _ => {
                        return Err(Diagnostic::invalid_code(
                            "Tried to index a non-array object.",
                        ))
                    }
                };
                let index = self.evaluate_require_value(index)?;
                let index = index.as_int().ok_or_else(|| {
                    Diagnostic::invalid_code("Index value is not an integer.")
                })?;
                let len = items.len() as i64;
                if index < -len || index >= len {
                    return Err(Diagnostic::invalid_code(format!(
                        "Index {} out of bounds of array of size {}.",
                        index, len
                    )));
                }
                let effective = if index < 0 { index + len } else { index } as usize;
                Ok(Some(items[effective].clone()))
            }
            NodeKind::Array(args) => {
                let (positional, kwargs) = self.reduce_arguments(args)?;
                if !kwargs.is_empty() {
                    return Err(Diagnostic::invalid_code(
                        "Keyword arguments are invalid in array construction.",
                    ));
                }
                Ok(Some(Value::List(positional)))
            }
            NodeKind::Arith { op, left, right } => {
                self.evaluate_arithmetic(*op, left, right).map(Some)
            }
            NodeKind::Cmp { op, left, right } => {
                let l = self.evaluate_require_value(left)?;
                let r = self.evaluate_require_value(right)?;
                let equal = value::values_equal(&l, &r);
                Ok(Some(Value::Bool(match op {
                    CmpOp::Eq => equal,
                    CmpOp::Ne => !equal,
                })))
            }
            NodeKind::And { left, right } => {
                let l = self.evaluate_bool(left, "First argument to \"and\" is not a boolean.")?;
                if !l {
                    return Ok(Some(Value::Bool(false)));
                }
                let r =
                    self.evaluate_bool(right, "Second argument to \"and\" is not a boolean.")?;
                Ok(Some(Value::Bool(r)))
            }
            NodeKind::Or { left, right } => {
                let l = self.evaluate_bool(left, "First argument to \"or\" is not a boolean.")?;
                if l {
                    return Ok(Some(Value::Bool(true)));
                }
                let r = self.evaluate_bool(right, "Second argument to \"or\" is not a boolean.")?;
                Ok(Some(Value::Bool(r)))
            }
            NodeKind::Not(inner) => {
                let v = self.evaluate_bool(inner, "Argument to \"not\" is not a boolean.")?;
                Ok(Some(Value::Bool(!v)))
            }
            NodeKind::Neg(inner) => {
                let v = self.evaluate_require_value(inner)?;
                let v = v.as_int().ok_or_else(|| {
                    Diagnostic::invalid_code("Argument to negation is not an integer.")
                })?;
                Ok(Some(Value::Int(-v)))
            }
            NodeKind::Id(name) => self.get_variable(name).map(Some),
            NodeKind::Str(s) => Ok(Some(Value::Str(s.clone()))),
            NodeKind::Num(n) => Ok(Some(Value::Int(*n))),
            NodeKind::Bool(b) => Ok(Some(Value::Bool(*b))),
            NodeKind::Empty => Ok(None),
            NodeKind::CodeBlock(_) => Err(Diagnostic::invalid_code("Unknown statement.")),
        }
    }

    pub(super) fn evaluate_require_value(&mut self, node: &Node) -> DiagResult<Value> {
        self.evaluate_statement(node)?.ok_or_else(|| {
            Diagnostic::invalid_code("Expression does not produce a value.")
        })
    }

    fn evaluate_bool(&mut self, node: &Node, message: &str) -> DiagResult<bool> {
        let v = self.evaluate_require_value(node)?;
        v.as_bool()
            .ok_or_else(|| Diagnostic::invalid_code(message))
    }

    fn evaluate_arithmetic(&mut self, op: ArithOp, left: &Node, right: &Node) -> DiagResult<Value> {
        let l = self.evaluate_require_value(left)?;
        let r = self.evaluate_require_value(right)?;
        match op {
            ArithOp::Add => match (l, r) {
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
                (Value::List(mut a), Value::List(b)) => {
                    a.extend(b);
                    Ok(Value::List(a))
                }
                (Value::List(mut a), scalar) => {
                    a.push(scalar);
                    Ok(Value::List(a))
                }
                (a, b) => Err(Diagnostic::invalid_code(format!(
                    "Invalid use of addition: {} + {}",
                    a.type_name(),
                    b.type_name()
                ))),
            },
            ArithOp::Sub => {
                let (a, b) = both_ints(&l, &r, "Subtraction works only with integers.")?;
                Ok(Value::Int(a - b))
            }
            ArithOp::Mul => {
                let (a, b) = both_ints(&l, &r, "Multiplication works only with integers.")?;
                Ok(Value::Int(a * b))
            }
            ArithOp::Div => {
                let (a, b) = both_ints(&l, &r, "Division works only with integers.")?;
                if b == 0 {
                    return Err(Diagnostic::invalid_code("Division by zero."));
                }
                // Floor division: round toward negative infinity.
                let quotient = a / b;
                let remainder = a % b;
                let quotient = if remainder != 0 && (remainder < 0) != (b < 0) {
                    quotient - 1
                } else {
                    quotient
                };
                Ok(Value::Int(quotient))
            }
        }
    }

    fn evaluate_plusassign(&mut self, name: &str, value: &Node) -> DiagResult<()> {
        let addition = self.evaluate_require_value(value)?;
        // All variables are immutable; build a full new value and rebind.
        let old = self.get_variable(name)?;
        let old_items = match old {
            Value::List(items) => items,
            _ => {
                return Err(Diagnostic::invalid_arguments(
                    "The += operator currently only works with arrays.",
                ))
            }
        };
        let mut new_items = old_items;
        match addition {
            Value::List(items) => new_items.extend(items),
            scalar => new_items.push(scalar),
        }
        self.set_variable(name, Value::List(new_items))
    }

    pub(super) fn get_variable(&self, name: &str) -> DiagResult<Value> {
        match name {
            "meson" => return Ok(Value::Object(Object::MesonMain)),
            "build_machine" => return Ok(Value::Object(Object::Machine(MachineScope::Build))),
            "host_machine" => return Ok(Value::Object(Object::Machine(MachineScope::Host))),
            "target_machine" => return Ok(Value::Object(Object::Machine(MachineScope::Target))),
            _ => {}
        }
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| Diagnostic::invalid_code(format!("Unknown variable \"{}\".", name)))
    }

    pub(super) fn set_variable(&mut self, name: &str, value: Value) -> DiagResult<()> {
        if !VARIABLE_NAME.is_match(name) {
            return Err(Diagnostic::invalid_code(format!(
                "Invalid variable name: {}",
                name
            )));
        }
        if BUILTIN_VARIABLES.contains(&name) {
            return Err(Diagnostic::invalid_code(format!(
                "Tried to overwrite internal variable \"{}\"",
                name
            )));
        }
        self.variables.insert(name.to_string(), value);
        Ok(())
    }

    /// Evaluate a call's argument node into positional values and a
    /// kwargs map. Ordering violations and duplicate keywords fail here.
    pub(super) fn reduce_arguments(
        &mut self,
        args: &Args,
    ) -> DiagResult<(Vec<Value>, HashMap<String, Value>)> {
        if args.order_error {
            return Err(Diagnostic::invalid_arguments(
                "All keyword arguments must be after positional arguments.",
            ));
        }
        let mut positional = Vec::new();
        for arg in &args.positional {
            positional.push(self.evaluate_require_value(arg)?);
        }
        let mut keyword = HashMap::new();
        for (key, node) in &args.keyword {
            let value = self.evaluate_require_value(node)?;
            if keyword.insert(key.clone(), value).is_some() {
                return Err(Diagnostic::invalid_arguments(format!(
                    "Duplicate keyword argument \"{}\".",
                    key
                )));
            }
        }
        Ok((positional, keyword))
    }
}

fn both_ints(l: &Value, r: &Value, message: &str) -> DiagResult<(i64, i64)> {
    match (l.as_int(), r.as_int()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(Diagnostic::invalid_code(message)),
    }
}

pub(crate) fn relative_build_file(subdir: &str) -> PathBuf {
    if subdir.is_empty() {
        PathBuf::from(BUILD_FILENAME)
    } else {
        Path::new(subdir).join(BUILD_FILENAME)
    }
}

/// Parse one build file, decorating syntax errors with the file name.
pub(crate) fn parse_build_file(code: &str, file: &Path) -> DiagResult<Node> {
    mason_lang::parse(code).map_err(|e| {
        let mut diag: Diagnostic = e.into();
        match diag.location.as_mut() {
            Some(loc) => loc.file = file.to_path_buf(),
            None => {
                diag = diag.or_location(file, 0, 0);
            }
        }
        diag
    })
}
