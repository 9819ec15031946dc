/*!
Method dispatch for strings, arrays and wrapped objects. The receiver's
variant picks the method table; method names stay strings all the way to
the error messages scripts see.

*/
use super::kwargs::{check_arity, no_kwargs, string_args, Kwargs};
use super::value::{values_equal, MachineScope, Object, Value};
use super::Interpreter;
use crate::build::{File, GeneratedList, Target, TargetId};
use crate::common::ConfValue;
use crate::compilers::{Compiler, Language};
use crate::diagnostics::{DiagResult, Diagnostic};
use crate::env::get_args_from_envvars;
use log::info;
use mason_lang::{Args, Node};
use std::collections::HashMap;
use std::rc::Rc;

impl<'a> Interpreter<'a> {
    pub(super) fn method_call(
        &mut self,
        _node: &Node,
        receiver: &Node,
        name: &str,
        args: &Args,
    ) -> DiagResult<Option<Value>> {
        let obj = self.evaluate_require_value(receiver)?;
        match obj {
            Value::Str(s) => self.string_method_call(&s, name, args),
            Value::List(items) => self.array_method_call(&items, name, args),
            Value::Object(object) => {
                let (posargs, kwargs) = self.reduce_arguments(args)?;
                if name == "extract_objects" {
                    let unity = self
                        .env
                        .get_option("unity")
                        .ok()
                        .and_then(|v| v.as_str().map(|s| s.to_string()));
                    if unity.as_deref() == Some("on") {
                        return Err(Diagnostic::invalid_code(
                            "Single object files can not be extracted in Unity builds.",
                        ));
                    }
                }
                self.object_method_call(&object, name, posargs, kwargs)
            }
            other => Err(Diagnostic::invalid_arguments(format!(
                "Variable of type {} is not callable.",
                other.type_name()
            ))),
        }
    }

    fn string_method_call(
        &mut self,
        receiver: &str,
        name: &str,
        args: &Args,
    ) -> DiagResult<Option<Value>> {
        match name {
            "strip" => Ok(Some(Value::Str(receiver.trim().to_string()))),
            "format" => {
                let (posargs, _) = self.reduce_arguments(args)?;
                let mut result = receiver.to_string();
                for (i, arg) in posargs.iter().enumerate() {
                    let rendered = match arg {
                        Value::Str(s) => s.clone(),
                        Value::Int(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        other => {
                            return Err(Diagnostic::invalid_arguments(format!(
                                "Format placeholder of type {} is not a basic type.",
                                other.type_name()
                            )))
                        }
                    };
                    result = result.replace(&format!("@{}@", i), &rendered);
                }
                Ok(Some(Value::Str(result)))
            }
            "split" => {
                let (posargs, _) = self.reduce_arguments(args)?;
                if posargs.len() > 1 {
                    return Err(Diagnostic::invalid_arguments(
                        "Split() must have at most one argument.",
                    ));
                }
                let parts: Vec<Value> = match posargs.first() {
                    Some(Value::Str(sep)) => receiver
                        .split(sep.as_str())
                        .map(|p| Value::Str(p.to_string()))
                        .collect(),
                    Some(_) => {
                        return Err(Diagnostic::invalid_arguments(
                            "Split() argument must be a string",
                        ))
                    }
                    None => receiver
                        .split_whitespace()
                        .map(|p| Value::Str(p.to_string()))
                        .collect(),
                };
                Ok(Some(Value::List(parts)))
            }
            other => Err(Diagnostic::invalid_code(format!(
                "Unknown method \"{}\" for a string.",
                other
            ))),
        }
    }

    fn array_method_call(
        &mut self,
        items: &[Value],
        name: &str,
        args: &Args,
    ) -> DiagResult<Option<Value>> {
        let (posargs, _) = self.reduce_arguments(args)?;
        match name {
            "contains" => {
                check_arity("contains", &posargs, 1)?;
                Ok(Some(Value::Bool(deep_contains(items, &posargs[0]))))
            }
            "length" => Ok(Some(Value::Int(items.len() as i64))),
            "get" => {
                let index = posargs
                    .first()
                    .and_then(|v| v.as_int())
                    .ok_or_else(|| {
                        Diagnostic::invalid_arguments("Array index must be a number.")
                    })?;
                let len = items.len() as i64;
                if index < -len || index >= len {
                    return Err(Diagnostic::invalid_arguments(format!(
                        "Array index {} is out of bounds for array of size {}.",
                        index, len
                    )));
                }
                let effective = if index < 0 { index + len } else { index } as usize;
                Ok(Some(items[effective].clone()))
            }
            other => Err(Diagnostic::invalid_code(format!(
                "Arrays do not have a method called \"{}\".",
                other
            ))),
        }
    }

    fn object_method_call(
        &mut self,
        object: &Object,
        name: &str,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        match object {
            Object::ConfigData(holder) => self.configdata_method(holder, name, posargs),
            Object::Target(id) => self.target_method(*id, name, posargs, &kwargs),
            Object::Generator(id) => {
                let id = *id;
                match name {
                    "process" => {
                        no_kwargs("Process", &kwargs)?;
                        let names = string_args(&posargs)?;
                        let mut list = GeneratedList::new(id);
                        for fname in names {
                            let file =
                                File::from_source_file(&self.env.source_dir, &self.subdir, &fname)
                                    .map_err(Diagnostic::invalid_code)?;
                            list.add_file(file);
                        }
                        Ok(Some(Value::Object(Object::GeneratedList(Rc::new(list)))))
                    }
                    other => Err(unknown_method(other)),
                }
            }
            Object::Dependency(dep) => match name {
                "found" => Ok(Some(Value::Bool(dep.found()))),
                other => Err(unknown_method(other)),
            },
            Object::ExternalProgram(prog) => match name {
                "found" => Ok(Some(Value::Bool(prog.found()))),
                other => Err(unknown_method(other)),
            },
            Object::ExternalLibrary(lib) => match name {
                "found" => Ok(Some(Value::Bool(lib.found()))),
                other => Err(unknown_method(other)),
            },
            Object::RunResult(result) => match name {
                "returncode" => Ok(Some(Value::Int(result.returncode))),
                "stdout" => Ok(Some(Value::Str(result.stdout.clone()))),
                "stderr" => Ok(Some(Value::Str(result.stderr.clone()))),
                other => Err(unknown_method(other)),
            },
            Object::TryRunResult(result) => match name {
                "returncode" => Ok(Some(Value::Int(result.returncode as i64))),
                "compiled" => Ok(Some(Value::Bool(result.compiled))),
                "stdout" => Ok(Some(Value::Str(result.stdout.clone()))),
                "stderr" => Ok(Some(Value::Str(result.stderr.clone()))),
                other => Err(unknown_method(other)),
            },
            Object::Compiler { language, native } => {
                self.compiler_method(*language, *native, name, posargs, kwargs)
            }
            Object::Machine(scope) => self.machine_method(*scope, name),
            Object::MesonMain => self.meson_method(name, posargs, kwargs),
            Object::Subproject(data) => match name {
                "get_variable" => {
                    if posargs.len() != 1 {
                        return Err(Diagnostic::invalid_code(
                            "Get_variable takes one argument.",
                        ));
                    }
                    let varname = posargs[0].as_str().ok_or_else(|| {
                        Diagnostic::invalid_code("Get_variable takes a string argument.")
                    })?;
                    data.variables.get(varname).cloned().map(Some).ok_or_else(|| {
                        Diagnostic::invalid_arguments(format!(
                            "Requested variable \"{}\" not found.",
                            varname
                        ))
                    })
                }
                other => Err(unknown_method(other)),
            },
            Object::Module(modname) => Err(Diagnostic::invalid_arguments(format!(
                "Module {} does not have method {}.",
                modname, name
            ))),
            Object::ExtractedObjects(_)
            | Object::GeneratedList(_)
            | Object::IncludeDirs(_)
            | Object::Installable(_) => Err(unknown_method(name)),
        }
    }

    fn configdata_method(
        &mut self,
        holder: &Rc<std::cell::RefCell<super::value::ConfDataHolder>>,
        name: &str,
        posargs: Vec<Value>,
    ) -> DiagResult<Option<Value>> {
        match name {
            "set" | "set10" => {
                if posargs.len() != 2 {
                    return Err(Diagnostic::invalid_code(
                        "Configuration set requires 2 arguments.",
                    ));
                }
                let mut holder = holder.borrow_mut();
                if holder.used {
                    return Err(Diagnostic::invalid_code(
                        "Can not set values on configuration object that has been used.",
                    ));
                }
                let key = posargs[0].as_str().ok_or_else(|| {
                    Diagnostic::invalid_code("First argument to set must be a string.")
                })?;
                let value = if name == "set10" {
                    let truthy = match &posargs[1] {
                        Value::Bool(b) => *b,
                        Value::Int(i) => *i != 0,
                        Value::Str(s) => !s.is_empty(),
                        other => {
                            return Err(Diagnostic::invalid_code(format!(
                                "Value of type {} cannot be converted to 0/1.",
                                other.type_name()
                            )))
                        }
                    };
                    ConfValue::Int(i64::from(truthy))
                } else {
                    match &posargs[1] {
                        Value::Str(s) => ConfValue::Str(s.clone()),
                        Value::Int(i) => ConfValue::Int(*i),
                        Value::Bool(b) => ConfValue::Bool(*b),
                        other => {
                            return Err(Diagnostic::invalid_code(format!(
                                "Setting a configuration value of type {} is not supported.",
                                other.type_name()
                            )))
                        }
                    }
                };
                holder.data.values.insert(key.to_string(), value);
                Ok(None)
            }
            other => Err(unknown_method(other)),
        }
    }

    fn target_method(
        &mut self,
        id: TargetId,
        name: &str,
        posargs: Vec<Value>,
        kwargs: &HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        let target = match self.build.targets.get(id) {
            Target::Build(t) => t.clone(),
            _ => return Err(unknown_method(name)),
        };
        match name {
            "extract_objects" => {
                no_kwargs("extract_objects", kwargs)?;
                self.validate_extraction(&target.subdir)?;
                let wanted = string_args(&posargs)?;
                let extracted = target
                    .extract_objects(id, &wanted)
                    .map_err(Diagnostic::invalid_arguments)?;
                Ok(Some(Value::Object(Object::ExtractedObjects(Rc::new(
                    extracted,
                )))))
            }
            "extract_all_objects" => {
                no_kwargs("extract_all_objects", kwargs)?;
                Ok(Some(Value::Object(Object::ExtractedObjects(Rc::new(
                    target.extract_all_objects(id),
                )))))
            }
            other => Err(unknown_method(other)),
        }
    }

    /// Objects may only be extracted within the same project or the same
    /// subproject.
    fn validate_extraction(&self, target_subdir: &str) -> DiagResult<()> {
        let spdir = &self.subproject_dir;
        let caller_in_subproject = self.subdir.starts_with(spdir.as_str());
        let target_in_subproject = target_subdir.starts_with(spdir.as_str());
        if !caller_in_subproject {
            if target_in_subproject {
                return Err(Diagnostic::invalid_code(
                    "Tried to extract objects from a subproject target.",
                ));
            }
        } else {
            if !target_in_subproject {
                return Err(Diagnostic::invalid_code(
                    "Tried to extract objects from the main project from a subproject.",
                ));
            }
            let caller_sp = self.subdir.split('/').nth(1);
            let target_sp = target_subdir.split('/').nth(1);
            if caller_sp != target_sp {
                return Err(Diagnostic::invalid_code(
                    "Tried to extract objects from a different subproject.",
                ));
            }
        }
        Ok(())
    }

    fn machine_method(&mut self, scope: MachineScope, name: &str) -> DiagResult<Option<Value>> {
        let info = match scope {
            MachineScope::Build => crate::env::build_machine_info(),
            MachineScope::Host => self.env.host_machine_info().map_err(Diagnostic::from)?,
            MachineScope::Target => self.env.target_machine_info().map_err(Diagnostic::from)?,
        };
        match name {
            "system" => Ok(Some(Value::Str(info.system))),
            "cpu" => Ok(Some(Value::Str(info.cpu))),
            "endian" => Ok(Some(Value::Str(info.endian))),
            other => Err(unknown_method(other)),
        }
    }

    fn meson_method(
        &mut self,
        name: &str,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        match name {
            "get_compiler" => {
                check_arity("get_compiler_method", &posargs, 1)?;
                let cname = posargs[0].as_str().ok_or_else(|| {
                    Diagnostic::invalid_arguments("Compiler language must be a string.")
                })?;
                let mut kwargs = Kwargs::permitted("get_compiler", kwargs, &["native"])?;
                let native = match kwargs.take("native") {
                    None => !self.env.is_cross_build(),
                    Some(Value::Bool(b)) => b,
                    Some(_) => {
                        return Err(Diagnostic::invalid_arguments(
                            "Type of \"native\" must be a boolean.",
                        ))
                    }
                };
                let language = Language::from_name(cname).ok_or_else(|| {
                    Diagnostic::invalid_code(format!(
                        "Tried to access compiler for unspecified language \"{}\".",
                        cname
                    ))
                })?;
                if self.build.find_compiler(language, native).is_none() {
                    return Err(Diagnostic::invalid_code(format!(
                        "Tried to access compiler for unspecified language \"{}\".",
                        cname
                    )));
                }
                Ok(Some(Value::Object(Object::Compiler { language, native })))
            }
            "is_cross_build" => Ok(Some(Value::Bool(self.env.is_cross_build()))),
            "has_exe_wrapper" => Ok(Some(Value::Bool(self.env.has_exe_wrapper()))),
            "is_unity" => {
                let unity = self
                    .env
                    .get_option("unity")
                    .map_err(Diagnostic::from)?;
                Ok(Some(Value::Bool(unity.as_str() == Some("on"))))
            }
            "is_subproject" => Ok(Some(Value::Bool(self.is_subproject()))),
            "current_source_dir" => {
                let dir = self.env.source_dir.join(&self.subdir);
                Ok(Some(Value::Str(dir.to_string_lossy().into_owned())))
            }
            "current_build_dir" => {
                let dir = self.env.build_dir.join(&self.subdir);
                Ok(Some(Value::Str(dir.to_string_lossy().into_owned())))
            }
            "source_root" => Ok(Some(Value::Str(
                self.env.source_dir.to_string_lossy().into_owned(),
            ))),
            "build_root" => Ok(Some(Value::Str(
                self.env.build_dir.to_string_lossy().into_owned(),
            ))),
            "project_version" => {
                let version = self
                    .build
                    .project_versions
                    .get(&self.active_projectname)
                    .cloned()
                    .unwrap_or_else(|| "undefined".to_string());
                Ok(Some(Value::Str(version)))
            }
            other => Err(unknown_method(other)),
        }
    }

    fn compiler_method(
        &mut self,
        language: Language,
        native: bool,
        name: &str,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        let compiler = self
            .build
            .find_compiler(language, native)
            .cloned()
            .ok_or_else(|| {
                Diagnostic::internal(format!(
                    "compiler object exists for unregistered language {}",
                    language.name()
                ))
            })?;
        let mut kwargs = Kwargs::permitted(name, kwargs, &["name", "prefix"])?;
        match name {
            "get_id" => Ok(Some(Value::Str(compiler.id.clone()))),
            "version" => Ok(Some(Value::Str(compiler.version.clone()))),
            "cmd_array" => Ok(Some(Value::List(
                compiler.exelist.iter().cloned().map(Value::Str).collect(),
            ))),
            "compiles" => {
                let code = self.single_string_arg(&posargs, "compiles")?;
                let testname = kwargs.take_str("name")?.unwrap_or_default();
                let extra = self.check_args(&compiler, false);
                let result = self.env.checks.compiles(&compiler, &code, &extra)?;
                if !testname.is_empty() {
                    info!(
                        "Checking if \"{}\" compiles : {}",
                        testname,
                        yes_no(result)
                    );
                }
                Ok(Some(Value::Bool(result)))
            }
            "run" => {
                let code = self.single_string_arg(&posargs, "run")?;
                let testname = kwargs.take_str("name")?.unwrap_or_default();
                if compiler.is_cross && compiler.exe_wrapper.is_none() {
                    return Err(Diagnostic::environment(
                        "Can not run test applications in this cross build without an exe \
                         wrapper.",
                    ));
                }
                let extra = self.check_args(&compiler, true);
                let result = self.env.checks.run(&compiler, &code, &extra)?;
                if !testname.is_empty() {
                    let verdict = if !result.compiled {
                        "DID NOT COMPILE".to_string()
                    } else if result.returncode == 0 {
                        "YES".to_string()
                    } else {
                        format!("NO ({})", result.returncode)
                    };
                    info!("Checking if \"{}\" runs : {}", testname, verdict);
                }
                Ok(Some(Value::Object(Object::TryRunResult(Rc::new(result)))))
            }
            "has_header" => {
                let header = self.single_string_arg(&posargs, "has_header")?;
                let extra = self.check_args(&compiler, false);
                let result = self.env.checks.has_header(&compiler, &header, &extra)?;
                info!("Has header \"{}\": {}", header, yes_no(result));
                Ok(Some(Value::Bool(result)))
            }
            "has_function" => {
                let funcname = self.single_string_arg(&posargs, "has_function")?;
                let prefix = self.prefix_kwarg(&mut kwargs, "has_function")?;
                let extra = self.check_args(&compiler, true);
                let result = self
                    .env
                    .checks
                    .has_function(&compiler, &funcname, &prefix, &extra)?;
                info!("Checking for function \"{}\": {}", funcname, yes_no(result));
                Ok(Some(Value::Bool(result)))
            }
            "has_member" => {
                if posargs.len() != 2 {
                    return Err(Diagnostic::invalid_arguments(
                        "Has_member takes exactly two arguments.",
                    ));
                }
                let args = string_args(&posargs)?;
                let prefix = self.prefix_kwarg(&mut kwargs, "has_member")?;
                let extra = self.check_args(&compiler, false);
                let result = self
                    .env
                    .checks
                    .has_member(&compiler, &args[0], &args[1], &prefix, &extra)?;
                info!(
                    "Checking whether type \"{}\" has member \"{}\": {}",
                    args[0],
                    args[1],
                    yes_no(result)
                );
                Ok(Some(Value::Bool(result)))
            }
            "has_type" => {
                let typename = self.single_string_arg(&posargs, "has_type")?;
                let prefix = self.prefix_kwarg(&mut kwargs, "has_type")?;
                let extra = self.check_args(&compiler, false);
                let result = self
                    .env
                    .checks
                    .has_type(&compiler, &typename, &prefix, &extra)?;
                info!("Checking for type \"{}\": {}", typename, yes_no(result));
                Ok(Some(Value::Bool(result)))
            }
            "sizeof" => {
                let typename = self.single_string_arg(&posargs, "sizeof")?;
                let prefix = self.prefix_kwarg(&mut kwargs, "sizeof")?;
                let extra = self.check_args(&compiler, true);
                let result = self
                    .env
                    .checks
                    .sizeof(&compiler, &typename, &prefix, &extra)?;
                info!("Checking for size of \"{}\": {}", typename, result);
                Ok(Some(Value::Int(result)))
            }
            "alignment" => {
                let typename = self.single_string_arg(&posargs, "alignment")?;
                let extra = self.check_args(&compiler, true);
                let result = self.env.checks.alignment(&compiler, &typename, &extra)?;
                info!("Checking for alignment of \"{}\": {}", typename, result);
                Ok(Some(Value::Int(result)))
            }
            other => Err(unknown_method(other)),
        }
    }

    fn single_string_arg(&self, posargs: &[Value], fname: &str) -> DiagResult<String> {
        if posargs.len() != 1 {
            return Err(Diagnostic::invalid_arguments(format!(
                "{} method takes exactly one positional argument.",
                fname
            )));
        }
        posargs[0]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| Diagnostic::invalid_arguments("Arguments must be strings."))
    }

    fn prefix_kwarg(&self, kwargs: &mut Kwargs, fname: &str) -> DiagResult<String> {
        kwargs.take_str("prefix").map(|v| v.unwrap_or_default()).map_err(|_| {
            Diagnostic::invalid_arguments(format!(
                "Prefix argument of {} must be a string.",
                fname
            ))
        })
    }

    /// Extra arguments for a feature check: environment flags plus the
    /// global and project argument tables for the language.
    fn check_args(&self, compiler: &Compiler, link: bool) -> Vec<String> {
        let (compile_env, link_env) = get_args_from_envvars(compiler.language);
        let mut args = compile_env;
        if let Some(global) = self.build.global_args.get(&compiler.language) {
            args.extend(global.iter().cloned());
        }
        if let Some(project) = self
            .build
            .project_args
            .get(&(self.subproject.clone(), compiler.language))
        {
            args.extend(project.iter().cloned());
        }
        if link {
            args.extend(link_env);
        }
        args
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "YES"
    } else {
        "NO"
    }
}

fn unknown_method(name: &str) -> Diagnostic {
    Diagnostic::invalid_code(format!("Unknown method \"{}\" in object.", name))
}

fn deep_contains(items: &[Value], wanted: &Value) -> bool {
    for item in items {
        if let Value::List(nested) = item {
            if deep_contains(nested, wanted) {
                return true;
            }
        }
        if values_equal(item, wanted) {
            return true;
        }
    }
    false
}
