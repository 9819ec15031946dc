/*!
The built-in functions of the build language. Dispatch is a static match
on the function name; each handler applies its argument guards before
touching the build graph, so every rejection carries the script-visible
message and source location.

*/
use super::kwargs::{check_arity, no_kwargs, no_posargs, string_args, Kwargs};
use super::value::{flatten, stringify_user, ConfDataHolder, Dep, Object, RunResultData, Value};
use super::{Interpreter, SubprojectData};
use crate::build::{
    BuildTarget, CommandItem, CustomTarget, File, Generator, GeneratorExe, Headers, IncludeDirs,
    InstallDir, Man, ObjectItem, RunTarget, SourceItem, Target, TargetId, TargetKind, Test,
    TestArg, TestExe, FORBIDDEN_TARGET_NAMES,
};
use crate::build::{Data, GettextTranslation, PkgConfigGenerator};
use crate::common::{detect_vcs, do_conf_file};
use crate::compilers::Language;
use crate::deps::{self, ExternalLibrary, ExternalProgram};
use crate::diagnostics::{DiagResult, Diagnostic};
use crate::env::BUILD_FILENAME;
use crate::interp::parse_build_file;
use crate::options::is_reserved_option_name;
use crate::options::{OptionKey, OptionValue};
use crate::warnings;
use crate::wrap::Resolver;
use duct::cmd;
use log::{debug, info};
use mason_lang::{Args, Node};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

impl<'a> Interpreter<'a> {
    pub(super) fn function_call(
        &mut self,
        node: &Node,
        name: &str,
        args: &Args,
    ) -> DiagResult<Option<Value>> {
        let (posargs, kwargs) = self.reduce_arguments(args)?;
        // Positional arguments flatten for every built-in except the
        // ones that need to see list structure.
        match name {
            "message" => return self.func_message(&posargs, &kwargs),
            "warning" => return self.func_warning(&posargs, &kwargs),
            "set_variable" => return self.func_set_variable(posargs, &kwargs),
            _ => {}
        }
        let posargs = flatten(posargs);
        match name {
            "project" => self.func_project(node, posargs, kwargs),
            "error" => self.func_error(&posargs, &kwargs),
            "executable" => self.build_target_fn(posargs, kwargs, TargetKind::Executable),
            "static_library" => self.build_target_fn(posargs, kwargs, TargetKind::StaticLibrary),
            "shared_library" => self.build_target_fn(posargs, kwargs, TargetKind::SharedLibrary),
            "jar" => self.build_target_fn(posargs, kwargs, TargetKind::Jar),
            "build_target" => self.func_build_target(posargs, kwargs),
            "custom_target" => self.func_custom_target(posargs, kwargs),
            "run_target" => self.func_run_target(posargs, &kwargs),
            "generator" => self.func_generator(posargs, kwargs),
            "test" => self.func_test(posargs, kwargs, false),
            "benchmark" => self.func_test(posargs, kwargs, true),
            "install_headers" => self.func_install_headers(posargs, kwargs),
            "install_man" => self.func_install_man(posargs, kwargs),
            "install_data" => self.func_install_data(posargs, kwargs),
            "install_subdir" => self.func_install_subdir(posargs, kwargs),
            "subdir" => self.func_subdir(posargs, &kwargs),
            "configure_file" => self.func_configure_file(posargs, kwargs),
            "include_directories" => self.func_include_directories(posargs, &kwargs),
            "add_global_arguments" => self.func_add_global_arguments(posargs, kwargs),
            "add_project_arguments" => self.func_add_project_arguments(posargs, kwargs),
            "add_languages" => self.func_add_languages(posargs, &kwargs),
            "find_program" => self.func_find_program(posargs, kwargs),
            "find_library" => self.func_find_library(posargs, kwargs),
            "dependency" => self.func_dependency(posargs, kwargs),
            "declare_dependency" => self.func_declare_dependency(posargs, kwargs),
            "configuration_data" => self.func_configuration_data(posargs, &kwargs),
            "run_command" => self.func_run_command(posargs, kwargs),
            "gettext" => self.func_gettext(posargs, kwargs),
            "option" => Err(Diagnostic::invalid_code(
                "Tried to call option() in build description file. All options must be in the option file.",
            )),
            "get_option" => self.func_get_option(posargs, &kwargs),
            "subproject" => self.func_subproject(posargs, &kwargs),
            "pkgconfig_gen" => self.func_pkgconfig_gen(posargs, kwargs),
            "vcs_tag" => self.func_vcs_tag(posargs, kwargs),
            "import" => self.func_import(posargs, &kwargs),
            "files" => self.func_files(posargs, &kwargs),
            other => Err(Diagnostic::invalid_code(format!(
                "Unknown function \"{}\".",
                other
            ))),
        }
    }

    fn func_project(
        &mut self,
        _node: &Node,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        let args = string_args(&posargs)?;
        if args.is_empty() {
            return Err(Diagnostic::invalid_arguments(
                "Not enough arguments to project(). Needs at least the project name.",
            ));
        }
        let mut kwargs = Kwargs::permitted(
            "project",
            kwargs,
            &["version", "subproject_dir", "default_options"],
        )?;
        let name = args[0].clone();
        if self.build.projects.contains_key(&self.subproject) {
            return Err(Diagnostic::invalid_code("Second call to project()."));
        }
        if !self.is_subproject() {
            self.build.project_name = name.clone();
            if let Some(dir) = kwargs.take_str("subproject_dir")? {
                self.subproject_dir = dir;
            }
        }
        self.active_projectname = name.clone();
        let version = kwargs
            .take_str("version")?
            .unwrap_or_else(|| "undefined".to_string());
        self.build.project_versions.insert(name.clone(), version);

        let defaults = kwargs.take_string_list("default_options")?;
        if !defaults.is_empty() {
            self.apply_default_options(&defaults)?;
        }

        self.build
            .projects
            .insert(self.subproject.clone(), name.clone());
        info!("Project name: {}", name);
        self.add_languages(&args[1..])?;
        let has = |lang: Language| self.env.coredata.compilers.contains_key(lang.name());
        if has(Language::Vala) && !has(Language::C) {
            return Err(Diagnostic::invalid_code(
                "Compiling Vala requires a C compiler",
            ));
        }
        Ok(None)
    }

    /// `default_options:` from the project call. Values given on the
    /// command line win over project defaults.
    fn apply_default_options(&mut self, defaults: &[String]) -> DiagResult<()> {
        if self.is_subproject() {
            self.env
                .coredata
                .options
                .add_subproject_defaults(&self.subproject, defaults)
                .map_err(Diagnostic::from)?;
            return Ok(());
        }
        for entry in defaults {
            let Some((keystr, valstr)) = entry.split_once('=') else {
                return Err(Diagnostic::invalid_arguments(format!(
                    "Option {:?} must have a value separated by equals sign.",
                    entry
                )));
            };
            let overridden = self
                .env
                .cmd_line_options
                .iter()
                .any(|o| o.split_once('=').map(|(k, _)| k) == Some(keystr));
            if overridden {
                continue;
            }
            let key = OptionKey::from_string(keystr);
            let store = &mut self.env.coredata.options;
            if store.contains(&key) {
                store
                    .set_option(&key.name, key.subproject.as_deref(), valstr)
                    .map_err(Diagnostic::from)?;
            } else {
                let project_key = key.as_root();
                if store.contains(&project_key) {
                    store
                        .set_option(&project_key.name, project_key.subproject.as_deref(), valstr)
                        .map_err(Diagnostic::from)?;
                } else {
                    store.add_pending(key, valstr.to_string());
                }
            }
        }
        Ok(())
    }

    fn func_add_languages(
        &mut self,
        posargs: Vec<Value>,
        kwargs: &HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_kwargs("add_languages", kwargs)?;
        let langs = string_args(&posargs)?;
        self.add_languages(&langs)?;
        Ok(None)
    }

    fn add_languages(&mut self, langs: &[String]) -> DiagResult<()> {
        let need_cross_compiler = self.env.is_cross_build()
            && self
                .env
                .cross_info
                .as_ref()
                .map(|i| i.need_cross_compiler())
                .unwrap_or(false);
        for lang_name in langs {
            let lower = lang_name.to_lowercase();
            let lang = Language::from_name(&lower).ok_or_else(|| {
                Diagnostic::invalid_code(format!("Tried to use unknown language \"{}\".", lower))
            })?;
            let comp = match self.env.coredata.compilers.get(lang.name()) {
                Some(comp) => comp.clone(),
                None => {
                    let comp = self
                        .env
                        .detect_compiler(lang, false)
                        .map_err(Diagnostic::from)?;
                    self.env
                        .coredata
                        .compilers
                        .insert(lang.name().to_string(), comp.clone());
                    comp
                }
            };
            let cross_comp = if need_cross_compiler {
                match self.env.coredata.cross_compilers.get(lang.name()) {
                    Some(comp) => Some(comp.clone()),
                    None => {
                        // Platform-independent languages reuse the
                        // native compiler.
                        let platform_independent = matches!(
                            lang,
                            Language::Java | Language::Cs | Language::Vala | Language::Rust
                        );
                        let cross = if platform_independent {
                            comp.clone()
                        } else {
                            self.env
                                .detect_compiler(lang, true)
                                .map_err(Diagnostic::from)?
                        };
                        self.env
                            .coredata
                            .cross_compilers
                            .insert(lang.name().to_string(), cross.clone());
                        Some(cross)
                    }
                }
            } else {
                None
            };
            info!("Native {} compiler: {}", lang.name(), comp.banner());
            let needs_static_linker = matches!(
                lang,
                Language::C
                    | Language::Cpp
                    | Language::ObjC
                    | Language::ObjCpp
                    | Language::Fortran
            );
            if needs_static_linker && self.build.static_linker.is_none() {
                let linker = self
                    .env
                    .detect_static_linker(&comp)
                    .map_err(Diagnostic::from)?;
                self.build.static_linker = Some(linker);
            }
            self.build.add_compiler(comp.clone());
            if let Some(cross) = cross_comp {
                info!("Cross {} compiler: {}", lang.name(), cross.banner());
                if needs_static_linker && self.build.static_cross_linker.is_none() {
                    let linker = self
                        .env
                        .detect_static_linker(&cross)
                        .map_err(Diagnostic::from)?;
                    self.build.static_cross_linker = Some(linker);
                }
                self.build.add_cross_compiler(cross);
            } else if self.env.is_cross_build() {
                // Building a cross compiler: the native toolchain serves
                // both machines.
                self.build.add_cross_compiler(comp);
            }
        }
        Ok(())
    }

    fn func_message(
        &mut self,
        posargs: &[Value],
        kwargs: &HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_kwargs("message", kwargs)?;
        check_arity("message", posargs, 1)?;
        let rendered = render_user_argument(&posargs[0])?;
        info!("Message: {}", rendered);
        Ok(None)
    }

    fn func_warning(
        &mut self,
        posargs: &[Value],
        kwargs: &HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_kwargs("warning", kwargs)?;
        check_arity("warning", posargs, 1)?;
        let rendered = render_user_argument(&posargs[0])?;
        warnings::warn(rendered);
        Ok(None)
    }

    fn func_error(
        &mut self,
        posargs: &[Value],
        kwargs: &HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_kwargs("error", kwargs)?;
        check_arity("error", posargs, 1)?;
        let message = posargs[0]
            .as_str()
            .ok_or_else(|| Diagnostic::invalid_arguments("Incorrect argument type."))?;
        Err(Diagnostic::invalid_code(format!(
            "Error encountered: {}",
            message
        )))
    }

    fn func_set_variable(
        &mut self,
        posargs: Vec<Value>,
        kwargs: &HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_kwargs("set_variable", kwargs)?;
        if posargs.len() != 2 {
            return Err(Diagnostic::invalid_code("Set_variable takes two arguments."));
        }
        let name = posargs[0]
            .as_str()
            .ok_or_else(|| {
                Diagnostic::invalid_code("First argument to set_variable must be a string.")
            })?
            .to_string();
        let mut values = posargs;
        let value = values.pop().expect("arity checked above");
        self.set_variable(&name, value)?;
        Ok(None)
    }

    fn func_build_target(
        &mut self,
        posargs: Vec<Value>,
        mut kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        let target_type = match kwargs.remove("target_type") {
            Some(Value::Str(s)) => s,
            Some(_) => {
                return Err(Diagnostic::invalid_arguments(
                    "target_type must be a string.",
                ))
            }
            None => {
                return Err(Diagnostic::invalid_arguments(
                    "Missing target_type keyword argument",
                ))
            }
        };
        let kind = match target_type.as_str() {
            "executable" => TargetKind::Executable,
            "shared_library" => TargetKind::SharedLibrary,
            "static_library" => TargetKind::StaticLibrary,
            "jar" => TargetKind::Jar,
            _ => return Err(Diagnostic::invalid_arguments("Unknown target_type.")),
        };
        self.build_target_fn(posargs, kwargs, kind)
    }

    fn build_target_fn(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
        kind: TargetKind,
    ) -> DiagResult<Option<Value>> {
        const LANG_ARG_KEYS: &[&str] = &[
            "c_args",
            "cpp_args",
            "objc_args",
            "objcpp_args",
            "java_args",
            "cs_args",
            "vala_args",
            "rust_args",
            "fortran_args",
        ];
        let mut permitted: Vec<&str> = vec![
            "sources",
            "objects",
            "dependencies",
            "link_with",
            "link_args",
            "include_directories",
            "install",
            "install_dir",
            "native",
            "pic",
            "gui_app",
            "build_by_default",
        ];
        permitted.extend_from_slice(LANG_ARG_KEYS);
        let mut kwargs = Kwargs::permitted(kind.describe(), kwargs, &permitted)?;

        if posargs.is_empty() {
            return Err(Diagnostic::invalid_arguments(
                "Target requires at least a name.",
            ));
        }
        let name = posargs[0]
            .as_str()
            .ok_or_else(|| Diagnostic::invalid_arguments("First argument must be a string."))?
            .to_string();
        let native = kwargs.take_bool("native", false)?;
        let is_cross = self.env.is_cross_build() && !native;
        let mut target = BuildTarget::new(kind, &name, &self.subdir, &self.subproject, is_cross);

        let mut source_values: Vec<Value> = posargs[1..].to_vec();
        source_values.extend(flatten(kwargs.take_list("sources")));
        for value in source_values {
            target.sources.push(self.value_to_source(value)?);
        }

        for value in flatten(kwargs.take_list("objects")) {
            match value {
                Value::Str(s) => {
                    let file = File::from_source_file(&self.env.source_dir, &self.subdir, &s)
                        .map_err(|_| {
                            Diagnostic::invalid_arguments(format!(
                                "Tried to add non-existing object {}.",
                                s
                            ))
                        })?;
                    target.objects.push(ObjectItem::File(file));
                }
                Value::File(f) => target.objects.push(ObjectItem::File(f)),
                Value::Object(Object::ExtractedObjects(eo)) => {
                    target.objects.push(ObjectItem::Extracted((*eo).clone()))
                }
                other => {
                    return Err(Diagnostic::invalid_arguments(format!(
                        "Bad object of type {} in target {}.",
                        other.type_name(),
                        name
                    )))
                }
            }
        }

        for value in flatten(kwargs.take_list("dependencies")) {
            let dep = match value {
                Value::Object(Object::Dependency(dep)) => dep,
                other => {
                    return Err(Diagnostic::invalid_arguments(format!(
                        "Argument of type {} is not a dependency object.",
                        other.type_name()
                    )))
                }
            };
            match &*dep {
                Dep::NotFound { name: dep_name } => {
                    return Err(Diagnostic::invalid_arguments(format!(
                        "Tried to use not-found external dependency {}.",
                        dep_name
                    )))
                }
                Dep::External(record) => target.external_deps.push(record.clone()),
                Dep::Internal {
                    include_dirs,
                    link_with,
                    sources,
                } => {
                    target.include_dirs.extend(include_dirs.iter().cloned());
                    target.link_with.extend(link_with.iter().copied());
                    for file in sources {
                        target.sources.push(SourceItem::File(file.clone()));
                    }
                }
            }
        }

        for value in flatten(kwargs.take_list("link_with")) {
            let id = match value {
                Value::Object(Object::Target(id)) => id,
                other => {
                    return Err(Diagnostic::invalid_arguments(format!(
                        "Link target of type {} is not a library.",
                        other.type_name()
                    )))
                }
            };
            match self.build.targets.get(id) {
                Target::Build(t)
                    if matches!(
                        t.kind,
                        TargetKind::StaticLibrary | TargetKind::SharedLibrary
                    ) =>
                {
                    target.link_with.push(id)
                }
                _ => {
                    return Err(Diagnostic::invalid_arguments("Link target is not library."));
                }
            }
        }

        for value in flatten(kwargs.take_list("include_directories")) {
            match value {
                Value::Object(Object::IncludeDirs(incs)) => {
                    target.include_dirs.push((*incs).clone())
                }
                other => {
                    return Err(Diagnostic::invalid_arguments(format!(
                        "Include directory to be added is not an include directory object \
                         (got {}).",
                        other.type_name()
                    )))
                }
            }
        }

        for key in LANG_ARG_KEYS {
            let args = kwargs.take_string_list(key)?;
            if !args.is_empty() {
                let lang_name = key.trim_end_matches("_args");
                let lang = Language::from_name(lang_name).expect("key list is language-derived");
                target.extra_args.entry(lang).or_default().extend(args);
            }
        }
        target.link_args = kwargs.take_string_list("link_args")?;
        target.install = kwargs.take_bool("install", false)?;
        target.install_dir = kwargs.take_str("install_dir")?;
        target.build_by_default = kwargs.take_bool("build_by_default", true)?;
        target.pic = kwargs.take_bool("pic", target.pic)?;
        target.gui_app = kwargs.take_bool("gui_app", false)?;

        target
            .classify_languages()
            .map_err(Diagnostic::invalid_arguments)?;
        for lang in target.languages.clone() {
            if self.build.find_compiler(lang, !is_cross).is_none() {
                return Err(Diagnostic::invalid_code(format!(
                    "No {} compiler available for target {}. Add the language to the \
                     project() call.",
                    lang.name(),
                    name
                )));
            }
        }

        let id = self.add_target(Target::Build(target))?;
        self.global_args_frozen = true;
        Ok(Some(Value::Object(Object::Target(id))))
    }

    fn value_to_source(&self, value: Value) -> DiagResult<SourceItem> {
        match value {
            Value::Str(s) => {
                let file = File::from_source_file(&self.env.source_dir, &self.subdir, &s)
                    .map_err(|_| {
                        Diagnostic::invalid_code(format!("Tried to add non-existing source {}.", s))
                    })?;
                Ok(SourceItem::File(file))
            }
            Value::File(f) => Ok(SourceItem::File(f)),
            Value::Object(Object::GeneratedList(gl)) => Ok(SourceItem::Generated((*gl).clone())),
            Value::Object(Object::Target(id)) => match self.build.targets.get(id) {
                Target::Custom(_) => Ok(SourceItem::Custom(id)),
                _ => Err(Diagnostic::invalid_arguments(
                    "Source item is not string or File-type object.",
                )),
            },
            _ => Err(Diagnostic::invalid_arguments(
                "Source item is not string or File-type object.",
            )),
        }
    }

    pub(super) fn add_target(&mut self, target: Target) -> DiagResult<TargetId> {
        let name = target.name().to_string();
        if FORBIDDEN_TARGET_NAMES.contains(&name.as_str()) {
            return Err(Diagnostic::invalid_arguments(format!(
                "Target name \"{}\" is reserved for internal use. Please rename.",
                name
            )));
        }
        let unique_id = target.unique_id();
        let id = self.build.targets.insert(target).map_err(|name| {
            Diagnostic::invalid_code(format!(
                "Tried to create target \"{}\", but a target of that name already exists.",
                name
            ))
        })?;
        self.env
            .coredata
            .target_guids
            .entry(unique_id)
            .or_insert_with(|| uuid::Uuid::new_v4().to_string().to_uppercase());
        Ok(id)
    }

    fn func_custom_target(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        let args = string_args(&posargs)?;
        check_arity("custom_target", &posargs, 1)?;
        let name = args[0].clone();
        let mut kwargs = Kwargs::permitted(
            "custom_target",
            kwargs,
            &[
                "command",
                "input",
                "output",
                "depfile",
                "build_always",
                "install",
                "install_dir",
                "depends",
            ],
        )?;
        let mut target = CustomTarget {
            name,
            subdir: self.subdir.clone(),
            command: Vec::new(),
            inputs: Vec::new(),
            outputs: kwargs.take_string_list("output")?,
            depfile: kwargs.take_str("depfile")?,
            build_always: kwargs.take_bool("build_always", false)?,
            install: kwargs.take_bool("install", false)?,
            install_dir: kwargs.take_str("install_dir")?,
            depends: Vec::new(),
        };
        if target.outputs.is_empty() {
            return Err(Diagnostic::invalid_arguments(
                "Missing keyword argument 'output'.",
            ));
        }
        let command = flatten(kwargs.take_list("command"));
        if command.is_empty() {
            return Err(Diagnostic::invalid_arguments(
                "Missing keyword argument 'command'.",
            ));
        }
        for item in command {
            target.command.push(self.value_to_command_item(item)?);
        }
        for item in flatten(kwargs.take_list("input")) {
            match item {
                Value::Str(s) => target.inputs.push(SourceItem::File(File {
                    is_built: false,
                    subdir: self.subdir.clone(),
                    fname: s,
                })),
                Value::File(f) => target.inputs.push(SourceItem::File(f)),
                Value::Object(Object::Target(id)) => target.inputs.push(SourceItem::Custom(id)),
                Value::Object(Object::GeneratedList(gl)) => {
                    target.inputs.push(SourceItem::Generated((*gl).clone()))
                }
                other => {
                    return Err(Diagnostic::invalid_arguments(format!(
                        "Bad input of type {} in custom target.",
                        other.type_name()
                    )))
                }
            }
        }
        for item in flatten(kwargs.take_list("depends")) {
            match item {
                Value::Object(Object::Target(id)) => target.depends.push(id),
                other => {
                    return Err(Diagnostic::invalid_arguments(format!(
                        "Dependency of type {} is not a target.",
                        other.type_name()
                    )))
                }
            }
        }
        let id = self.add_target(Target::Custom(target))?;
        Ok(Some(Value::Object(Object::Target(id))))
    }

    fn value_to_command_item(&self, value: Value) -> DiagResult<CommandItem> {
        match value {
            Value::Str(s) => Ok(CommandItem::Str(s)),
            Value::File(f) => Ok(CommandItem::File(f)),
            Value::Object(Object::Target(id)) => Ok(CommandItem::Target(id)),
            Value::Object(Object::ExternalProgram(prog)) => match &prog.command {
                Some(command) => Ok(CommandItem::Program(command.clone())),
                None => Err(Diagnostic::invalid_arguments(format!(
                    "Tried to use not-found external program {} in a command.",
                    prog.name
                ))),
            },
            other => Err(Diagnostic::invalid_arguments(format!(
                "Bad command element of type {}.",
                other.type_name()
            ))),
        }
    }

    fn func_run_target(
        &mut self,
        posargs: Vec<Value>,
        kwargs: &HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_kwargs("run_target", kwargs)?;
        let args = string_args(&posargs)?;
        if args.len() < 2 {
            return Err(Diagnostic::invalid_arguments("Incorrect number of arguments"));
        }
        let target = RunTarget {
            name: args[0].clone(),
            command: args[1].clone(),
            args: args[2..].to_vec(),
            subdir: self.subdir.clone(),
        };
        let id = self.add_target(Target::Run(target))?;
        Ok(Some(Value::Object(Object::Target(id))))
    }

    fn func_generator(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        check_arity("generator", &posargs, 1)?;
        let exe = match &posargs[0] {
            Value::Object(Object::Target(id)) => match self.build.targets.get(*id) {
                Target::Build(t) if t.kind == TargetKind::Executable => GeneratorExe::Built(*id),
                _ => {
                    return Err(Diagnostic::invalid_arguments(
                        "First generator argument must be an executable.",
                    ))
                }
            },
            Value::Object(Object::ExternalProgram(prog)) => match &prog.command {
                Some(command) => GeneratorExe::Program(command.clone()),
                None => {
                    return Err(Diagnostic::invalid_arguments(format!(
                        "Tried to use not-found external program {} in a generator.",
                        prog.name
                    )))
                }
            },
            _ => {
                return Err(Diagnostic::invalid_arguments(
                    "First generator argument must be an executable.",
                ))
            }
        };
        let mut kwargs = Kwargs::permitted("generator", kwargs, &["arguments", "output"])?;
        let arguments = kwargs.take_string_list("arguments")?;
        let outputs = kwargs.take_string_list("output")?;
        if arguments.is_empty() {
            return Err(Diagnostic::invalid_arguments(
                "Generator must have \"arguments\" keyword argument.",
            ));
        }
        if outputs.is_empty() {
            return Err(Diagnostic::invalid_arguments(
                "Generator must have \"output\" keyword argument.",
            ));
        }
        for template in &outputs {
            if !template.contains("@BASENAME@") && !template.contains("@PLAINNAME@") {
                return Err(Diagnostic::invalid_arguments(
                    "Every element of \"output\" must contain @BASENAME@ or @PLAINNAME@.",
                ));
            }
        }
        let id = self.build.add_generator(Generator {
            exe,
            arguments,
            outputs,
        });
        Ok(Some(Value::Object(Object::Generator(id))))
    }

    fn func_test(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
        is_benchmark: bool,
    ) -> DiagResult<Option<Value>> {
        let fname = if is_benchmark { "benchmark" } else { "test" };
        check_arity(fname, &posargs, 2)?;
        let name = posargs[0]
            .as_str()
            .ok_or_else(|| {
                Diagnostic::invalid_arguments("First argument of test must be a string.")
            })?
            .to_string();
        let exe = match &posargs[1] {
            Value::Object(Object::Target(id)) => match self.build.targets.get(*id) {
                Target::Build(t)
                    if matches!(t.kind, TargetKind::Executable | TargetKind::Jar) =>
                {
                    TestExe::Target(*id)
                }
                _ => {
                    return Err(Diagnostic::invalid_arguments(
                        "Second argument must be executable.",
                    ))
                }
            },
            Value::Object(Object::ExternalProgram(prog)) => match &prog.command {
                Some(command) => TestExe::Program(command.clone()),
                None => {
                    return Err(Diagnostic::invalid_arguments(
                        "Second argument must be executable.",
                    ))
                }
            },
            _ => {
                return Err(Diagnostic::invalid_arguments(
                    "Second argument must be executable.",
                ))
            }
        };
        let mut kwargs = Kwargs::permitted(
            fname,
            kwargs,
            &["is_parallel", "args", "env", "should_fail", "timeout", "valgrind_args"],
        )?;
        let is_parallel = kwargs.take_bool("is_parallel", true).map_err(|_| {
            Diagnostic::invalid_arguments("Keyword argument is_parallel must be a boolean.")
        })?;
        let mut cmd_args = Vec::new();
        for arg in flatten(kwargs.take_list("args")) {
            match arg {
                Value::Str(s) => cmd_args.push(TestArg::Str(s)),
                Value::File(f) => cmd_args.push(TestArg::File(f)),
                Value::Object(Object::Target(id)) => cmd_args.push(TestArg::Target(id)),
                _ => {
                    return Err(Diagnostic::invalid_arguments(
                        "Command line arguments must be strings",
                    ))
                }
            }
        }
        let mut env = Vec::new();
        for entry in kwargs.take_string_list("env")? {
            let Some((key, value)) = entry.split_once('=') else {
                return Err(Diagnostic::invalid_arguments(
                    "Env var definition must be of type key=val.",
                ));
            };
            let key = key.trim();
            if key.contains(' ') {
                return Err(Diagnostic::invalid_arguments(
                    "Env var key must not have spaces in it.",
                ));
            }
            env.push((key.to_string(), value.trim().to_string()));
        }
        let should_fail = kwargs.take_bool("should_fail", false).map_err(|_| {
            Diagnostic::invalid_arguments("Keyword argument should_fail must be a boolean.")
        })?;
        let timeout = kwargs.take_int("timeout", 30).map_err(|_| {
            Diagnostic::invalid_arguments("Timeout must be an integer.")
        })?;
        let valgrind_args = kwargs.take_string_list("valgrind_args")?;
        let test = Test {
            name: name.clone(),
            exe,
            is_parallel,
            cmd_args,
            env,
            should_fail,
            timeout,
            valgrind_args,
        };
        if is_benchmark {
            self.build.benchmarks.push(test);
        } else {
            self.build.tests.push(test);
        }
        debug!("Adding {} \"{}\".", fname, name);
        Ok(None)
    }

    fn func_install_headers(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        let sources = string_args(&posargs)?;
        let mut kwargs = Kwargs::permitted("install_headers", kwargs, &["subdir", "install_dir"])?;
        let headers = Headers {
            source_subdir: self.subdir.clone(),
            sources,
            install_subdir: kwargs.take_str("subdir")?.unwrap_or_default(),
            custom_install_dir: kwargs.take_str("install_dir")?,
        };
        self.build.headers.push(headers);
        Ok(Some(Value::Object(Object::Installable("headers"))))
    }

    fn func_install_man(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        let sources = string_args(&posargs)?;
        Man::validate_sources(&sources).map_err(Diagnostic::invalid_arguments)?;
        if kwargs.len() > 1 {
            return Err(Diagnostic::invalid_arguments(
                "Man function takes at most one keyword arguments.",
            ));
        }
        let mut kwargs = Kwargs::permitted("install_man", kwargs, &["install_dir"])?;
        let man = Man {
            source_subdir: self.subdir.clone(),
            sources,
            custom_install_dir: kwargs.take_str("install_dir")?,
        };
        self.build.man.push(man);
        Ok(Some(Value::Object(Object::Installable("man"))))
    }

    fn func_install_data(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        let mut sources = string_args(&posargs)?;
        let mut kwargs = Kwargs::permitted("install_data", kwargs, &["sources", "install_dir"])?;
        sources.extend(kwargs.take_string_list("sources")?);
        let install_dir = kwargs.require_str("install_dir")?;
        let data = Data {
            in_sourcetree: true,
            source_subdir: self.subdir.clone(),
            sources,
            install_dir,
        };
        self.build.data.push(data);
        Ok(Some(Value::Object(Object::Installable("data"))))
    }

    fn func_install_subdir(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        let args = string_args(&posargs)?;
        if args.len() != 1 {
            return Err(Diagnostic::invalid_arguments(
                "Install_subdir requires exactly one argument.",
            ));
        }
        let mut kwargs = Kwargs::permitted("install_subdir", kwargs, &["install_dir"])?;
        let install_dir = kwargs.require_str("install_dir")?;
        let idir = InstallDir {
            source_subdir: self.subdir.clone(),
            installable_subdir: args[0].clone(),
            install_dir,
        };
        self.build.install_dirs.push(idir);
        Ok(Some(Value::Object(Object::Installable("install_dir"))))
    }

    fn func_subdir(
        &mut self,
        posargs: Vec<Value>,
        kwargs: &HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_kwargs("subdir", kwargs)?;
        check_arity("subdir", &posargs, 1)?;
        let relpath = posargs[0]
            .as_str()
            .ok_or_else(|| Diagnostic::invalid_arguments("Incorrect argument type."))?
            .to_string();
        if relpath.contains("..") {
            return Err(Diagnostic::invalid_arguments("Subdir contains .."));
        }
        if self.subdir.is_empty() && relpath == self.subproject_dir {
            return Err(Diagnostic::invalid_arguments(
                "Must not go into subprojects dir with subdir(), use subproject() instead.",
            ));
        }
        let prev_subdir = self.subdir.clone();
        let new_subdir = if prev_subdir.is_empty() {
            relpath.clone()
        } else {
            format!("{}/{}", prev_subdir, relpath)
        };
        if !self.visited_subdirs.insert(new_subdir.clone()) {
            return Err(Diagnostic::invalid_arguments(format!(
                "Tried to enter directory \"{}\", which has already been visited.",
                new_subdir
            )));
        }
        self.subdir = new_subdir.clone();
        let build_subdir = self.env.build_dir.join(&new_subdir);
        fs::create_dir_all(&build_subdir).map_err(|e| {
            Diagnostic::environment(format!(
                "Could not create {}: {}",
                build_subdir.display(),
                e
            ))
        })?;
        let buildfilename = format!("{}/{}", new_subdir, BUILD_FILENAME);
        self.build_def_files.push(buildfilename.clone());
        let absname = self.env.source_dir.join(&buildfilename);
        if !absname.is_file() {
            return Err(Diagnostic::invalid_code(format!(
                "Nonexistant build def file {}.",
                buildfilename
            )));
        }
        let code = fs::read_to_string(&absname).map_err(|e| {
            Diagnostic::environment(format!("Could not read {}: {}", absname.display(), e))
        })?;
        let codeblock = parse_build_file(&code, Path::new(&buildfilename))?;
        self.evaluate_codeblock(&codeblock)?;
        self.subdir = prev_subdir;
        Ok(None)
    }

    fn func_configure_file(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        if !posargs.is_empty() {
            return Err(Diagnostic::invalid_arguments(
                "configure_file takes only keyword arguments.",
            ));
        }
        let mut kwargs = Kwargs::permitted(
            "configure_file",
            kwargs,
            &["input", "output", "configuration", "command", "install_dir"],
        )?;
        let input = kwargs.require_str("input")?;
        let output = kwargs.require_str("output")?;
        let configuration = kwargs.take("configuration");
        let command = kwargs.take("command");
        if configuration.is_some() && command.is_some() {
            return Err(Diagnostic::invalid_arguments(
                "Must not specify both \"configuration\" and \"command\" keyword arguments \
                 since they are mutually exclusive.",
            ));
        }
        if let Some(conf) = configuration {
            let holder = match conf {
                Value::Object(Object::ConfigData(holder)) => holder,
                _ => {
                    return Err(Diagnostic::invalid_arguments(
                        "Argument \"configuration\" is not of type configuration_data",
                    ))
                }
            };
            let conffile = format!(
                "{}{}{}",
                self.subdir,
                if self.subdir.is_empty() { "" } else { "/" },
                input
            );
            if !self.build_def_files.contains(&conffile) {
                self.build_def_files.push(conffile);
            }
            let out_dir = self.env.build_dir.join(&self.subdir);
            fs::create_dir_all(&out_dir).map_err(|e| {
                Diagnostic::environment(format!("Could not create {}: {}", out_dir.display(), e))
            })?;
            let ifile_abs = self.env.source_dir.join(&self.subdir).join(&input);
            let ofile_abs = out_dir.join(&output);
            let missing = {
                let holder_ref = holder.borrow();
                do_conf_file(&ifile_abs, &ofile_abs, &holder_ref.data)
                    .map_err(Diagnostic::invalid_arguments)?
            };
            if !missing.is_empty() {
                let rendered: Vec<String> =
                    missing.iter().map(|m| format!("'{}'", m)).collect();
                warnings::warn(format!(
                    "The variable(s) {} in the input file {} are not present in the given \
                     configuration data.",
                    rendered.join(", "),
                    input
                ));
            }
            holder.borrow_mut().used = true;
        } else if let Some(command) = command {
            let command = flatten(command.listify());
            let mut argv = Vec::new();
            for item in command {
                match item {
                    Value::Str(s) => argv.push(s),
                    Value::Object(Object::ExternalProgram(prog)) => match &prog.command {
                        Some(cmd) => argv.extend(cmd.iter().cloned()),
                        None => {
                            return Err(Diagnostic::invalid_arguments(format!(
                                "Tried to use not-found external program {} in a command.",
                                prog.name
                            )))
                        }
                    },
                    other => {
                        return Err(Diagnostic::invalid_arguments(format!(
                            "Bad command element of type {}.",
                            other.type_name()
                        )))
                    }
                }
            }
            let result = self.run_command_impl(argv, false)?;
            if result.returncode != 0 {
                return Err(Diagnostic::invalid_code(format!(
                    "Running configure command failed.\n{}\n{}",
                    result.stdout, result.stderr
                )));
            }
        } else {
            return Err(Diagnostic::invalid_arguments(
                "Configure_file must have either \"configuration\" or \"command\".",
            ));
        }
        if let Some(install_dir) = kwargs.take_str("install_dir")? {
            self.build.data.push(Data {
                in_sourcetree: false,
                source_subdir: self.subdir.clone(),
                sources: vec![output.clone()],
                install_dir,
            });
        }
        Ok(Some(Value::File(File::from_built_file(
            &self.subdir,
            &output,
        ))))
    }

    fn func_include_directories(
        &mut self,
        posargs: Vec<Value>,
        kwargs: &HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_kwargs("include_directories", kwargs)?;
        let dirs = string_args(&posargs)?;
        let absbase = self.env.source_dir.join(&self.subdir);
        for dir in &dirs {
            if !absbase.join(dir).is_dir() {
                return Err(Diagnostic::invalid_arguments(format!(
                    "Include dir {} does not exist.",
                    dir
                )));
            }
        }
        Ok(Some(Value::Object(Object::IncludeDirs(Rc::new(
            IncludeDirs {
                curdir: self.subdir.clone(),
                dirs,
            },
        )))))
    }

    fn func_add_global_arguments(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        let args = string_args(&posargs)?;
        if self.is_subproject() {
            return Err(Diagnostic::invalid_code(
                "Global arguments can not be set in subprojects because there is no way to \
                 make that reliable.",
            ));
        }
        if self.global_args_frozen {
            return Err(Diagnostic::invalid_code(
                "Tried to set global arguments after a build target has been declared.\nThis \
                 is not permitted. Please declare all global arguments before your targets.",
            ));
        }
        let lang = self.language_kwarg(kwargs, "add_global_arguments")?;
        self.build.global_args.entry(lang).or_default().extend(args);
        Ok(None)
    }

    fn func_add_project_arguments(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        let args = string_args(&posargs)?;
        if self.global_args_frozen {
            return Err(Diagnostic::invalid_code(
                "Tried to set project arguments after a build target has been declared.\nThis \
                 is not permitted. Please declare all project arguments before your targets.",
            ));
        }
        let lang = self.language_kwarg(kwargs, "add_project_arguments")?;
        self.build
            .project_args
            .entry((self.subproject.clone(), lang))
            .or_default()
            .extend(args);
        Ok(None)
    }

    fn language_kwarg(
        &mut self,
        kwargs: HashMap<String, Value>,
        fname: &str,
    ) -> DiagResult<Language> {
        let mut kwargs = Kwargs::permitted(fname, kwargs, &["language"])?;
        let lang = kwargs.take_str("language")?.ok_or_else(|| {
            Diagnostic::invalid_code(format!("Missing language definition in {}", fname))
        })?;
        Language::from_name(&lang.to_lowercase()).ok_or_else(|| {
            Diagnostic::invalid_code(format!("Tried to use unknown language \"{}\".", lang))
        })
    }

    fn func_find_program(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        check_arity("find_program", &posargs, 1)?;
        let exename = posargs[0]
            .as_str()
            .ok_or_else(|| Diagnostic::invalid_arguments("Incorrect argument type."))?
            .to_string();
        let mut kwargs = Kwargs::permitted("find_program", kwargs, &["required"])?;
        let required = kwargs.take_bool("required", true).map_err(|_| {
            Diagnostic::invalid_arguments("\"required\" argument must be a boolean.")
        })?;
        // A cached hit is reused; a cached miss is retried since the
        // tool may have been installed since.
        if let Some(Some(command)) = self.env.coredata.ext_progs.get(&exename) {
            return Ok(Some(Value::Object(Object::ExternalProgram(Rc::new(
                ExternalProgram {
                    name: exename,
                    command: Some(command.clone()),
                },
            )))));
        }
        let search_dir = self.env.source_dir.join(&self.subdir);
        let prog = ExternalProgram::find(&exename, Some(&search_dir));
        self.env
            .coredata
            .ext_progs
            .insert(exename.clone(), prog.command.clone());
        if required && !prog.found() {
            return Err(Diagnostic::invalid_arguments(format!(
                "Program \"{}\" not found.",
                exename
            )));
        }
        Ok(Some(Value::Object(Object::ExternalProgram(Rc::new(prog)))))
    }

    fn func_find_library(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        check_arity("find_library", &posargs, 1)?;
        let libname = posargs[0]
            .as_str()
            .ok_or_else(|| Diagnostic::invalid_arguments("Incorrect argument type."))?
            .to_string();
        let mut kwargs = Kwargs::permitted("find_library", kwargs, &["required", "dirs"])?;
        let required = kwargs.take_bool("required", true).map_err(|_| {
            Diagnostic::invalid_arguments("\"required\" argument must be a boolean.")
        })?;
        let dirs = kwargs.take_string_list("dirs")?;
        let search_dirs: Option<Vec<PathBuf>> = if dirs.is_empty() {
            None
        } else {
            for dir in &dirs {
                if !Path::new(dir).is_absolute() {
                    return Err(Diagnostic::invalid_code(format!(
                        "Search directory {} is not an absolute path.",
                        dir
                    )));
                }
            }
            Some(dirs.iter().map(PathBuf::from).collect())
        };
        if let Some(Some(path)) = self.env.coredata.ext_libs.get(&libname) {
            return Ok(Some(Value::Object(Object::ExternalLibrary(Rc::new(
                ExternalLibrary {
                    name: libname,
                    fullpath: Some(path.clone()),
                },
            )))));
        }
        let fullpath = self.env.find_library(&libname, search_dirs.as_deref());
        self.env
            .coredata
            .ext_libs
            .insert(libname.clone(), fullpath.clone());
        if required && fullpath.is_none() {
            return Err(Diagnostic::invalid_arguments(format!(
                "External library \"{}\" not found.",
                libname
            )));
        }
        Ok(Some(Value::Object(Object::ExternalLibrary(Rc::new(
            ExternalLibrary {
                name: libname,
                fullpath,
            },
        )))))
    }

    fn func_dependency(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        check_arity("dependency", &posargs, 1)?;
        let name = posargs[0]
            .as_str()
            .ok_or_else(|| Diagnostic::invalid_arguments("Incorrect argument type."))?
            .to_string();
        let mut kwargs =
            Kwargs::permitted("dependency", kwargs, &["required", "version", "fallback"])?;
        let required = kwargs.take_bool("required", true)?;
        let version = kwargs.take_str("version")?;
        let fallback = kwargs.take_string_list("fallback")?;
        let record = deps::find_external_dependency(self.env, &name, version.as_deref());
        if record.found {
            return Ok(Some(Value::Object(Object::Dependency(Rc::new(
                Dep::External(record),
            )))));
        }
        if !fallback.is_empty() {
            if fallback.len() != 2 {
                return Err(Diagnostic::invalid_arguments(
                    "Fallback must be a [subproject, variable] pair.",
                ));
            }
            match self.do_subproject(&fallback[0]) {
                Ok(Value::Object(Object::Subproject(data))) => {
                    let value = data.variables.get(&fallback[1]).cloned().ok_or_else(|| {
                        Diagnostic::invalid_arguments(format!(
                            "Requested variable \"{}\" not found in subproject {}.",
                            fallback[1], fallback[0]
                        ))
                    })?;
                    match value {
                        Value::Object(Object::Dependency(dep)) => {
                            return Ok(Some(Value::Object(Object::Dependency(dep))))
                        }
                        _ => {
                            return Err(Diagnostic::invalid_arguments(format!(
                                "Fallback variable \"{}\" is not a dependency object.",
                                fallback[1]
                            )))
                        }
                    }
                }
                Ok(_) => {
                    return Err(Diagnostic::internal(
                        "subproject evaluation returned a non-subproject value",
                    ))
                }
                Err(e) if !required => {
                    warnings::warn(format!(
                        "Dependency fallback for {} failed: {}",
                        name, e.message
                    ));
                }
                Err(e) => return Err(e),
            }
        }
        if required {
            return Err(Diagnostic::invalid_arguments(format!(
                "Dependency \"{}\" not found",
                name
            )));
        }
        Ok(Some(Value::Object(Object::Dependency(Rc::new(
            Dep::NotFound { name },
        )))))
    }

    fn func_declare_dependency(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_posargs("declare_dependency", &posargs)?;
        let mut kwargs = Kwargs::permitted(
            "declare_dependency",
            kwargs,
            &["include_directories", "link_with", "sources"],
        )?;
        let mut include_dirs = Vec::new();
        for value in flatten(kwargs.take_list("include_directories")) {
            match value {
                Value::Object(Object::IncludeDirs(incs)) => include_dirs.push((*incs).clone()),
                other => {
                    return Err(Diagnostic::invalid_arguments(format!(
                        "Include directory to be added is not an include directory object \
                         (got {}).",
                        other.type_name()
                    )))
                }
            }
        }
        let mut link_with = Vec::new();
        for value in flatten(kwargs.take_list("link_with")) {
            match value {
                Value::Object(Object::Target(id)) => link_with.push(id),
                other => {
                    return Err(Diagnostic::invalid_arguments(format!(
                        "Link target of type {} is not a library.",
                        other.type_name()
                    )))
                }
            }
        }
        let mut sources = Vec::new();
        for value in flatten(kwargs.take_list("sources")) {
            match value {
                Value::Str(s) => sources.push(
                    File::from_source_file(&self.env.source_dir, &self.subdir, &s)
                        .map_err(Diagnostic::invalid_code)?,
                ),
                Value::File(f) => sources.push(f),
                other => {
                    return Err(Diagnostic::invalid_arguments(format!(
                        "Source item of type {} is not a string or file.",
                        other.type_name()
                    )))
                }
            }
        }
        Ok(Some(Value::Object(Object::Dependency(Rc::new(
            Dep::Internal {
                include_dirs,
                link_with,
                sources,
            },
        )))))
    }

    fn func_configuration_data(
        &mut self,
        posargs: Vec<Value>,
        kwargs: &HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_kwargs("configuration_data", kwargs)?;
        if !posargs.is_empty() {
            return Err(Diagnostic::invalid_arguments(
                "configuration_data takes no arguments",
            ));
        }
        Ok(Some(Value::Object(Object::ConfigData(Rc::new(
            RefCell::new(ConfDataHolder::default()),
        )))))
    }

    fn func_run_command(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        if posargs.is_empty() {
            return Err(Diagnostic::invalid_arguments("Not enough arguments"));
        }
        let mut argv = Vec::new();
        match &posargs[0] {
            Value::Object(Object::ExternalProgram(prog)) => match &prog.command {
                Some(command) => argv.extend(command.iter().cloned()),
                None => {
                    return Err(Diagnostic::invalid_arguments(format!(
                        "Tried to run not-found external program {}.",
                        prog.name
                    )))
                }
            },
            Value::Str(s) => argv.push(s.clone()),
            _ => {
                return Err(Diagnostic::invalid_arguments(
                    "First argument is of incorrect type.",
                ))
            }
        }
        for arg in &posargs[1..] {
            match arg.as_str() {
                Some(s) => argv.push(s.to_string()),
                None => {
                    return Err(Diagnostic::invalid_arguments(
                        "Run_command arguments must be strings.",
                    ))
                }
            }
        }
        let mut kwargs = Kwargs::permitted("run_command", kwargs, &["in_builddir"])?;
        let in_builddir = kwargs.take_bool("in_builddir", false).map_err(|_| {
            Diagnostic::invalid_arguments("in_builddir must be boolean.")
        })?;
        let result = self.run_command_impl(argv, in_builddir)?;
        Ok(Some(Value::Object(Object::RunResult(Rc::new(result)))))
    }

    pub(super) fn run_command_impl(
        &self,
        argv: Vec<String>,
        in_builddir: bool,
    ) -> DiagResult<RunResultData> {
        let cmd_name = argv[0].clone();
        let cwd = if in_builddir {
            self.env.build_dir.join(&self.subdir)
        } else {
            self.env.source_dir.join(&self.subdir)
        };
        fs::create_dir_all(&cwd).ok();
        // Resolution order: a path that exists as given, a program on
        // the PATH, then a script in the current source directory.
        let exe = if Path::new(&cmd_name).is_absolute() || cwd.join(&cmd_name).exists() {
            cmd_name.clone()
        } else if let Ok(path) = which::which(&cmd_name) {
            path.to_string_lossy().into_owned()
        } else {
            let script = self.env.source_dir.join(&self.subdir).join(&cmd_name);
            if script.is_file() {
                script.to_string_lossy().into_owned()
            } else {
                return Err(Diagnostic::invalid_code(format!(
                    "Could not execute command \"{}\".",
                    cmd_name
                )));
            }
        };
        let output = cmd(exe, argv[1..].to_vec())
            .dir(&cwd)
            .env("MESON_SOURCE_ROOT", &self.env.source_dir)
            .env("MESON_BUILD_ROOT", &self.env.build_dir)
            .env("MESON_SUBDIR", &self.subdir)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|e| {
                Diagnostic::invalid_code(format!(
                    "Could not execute command \"{}\": {}",
                    cmd_name, e
                ))
            })?;
        Ok(RunResultData {
            returncode: output.status.code().unwrap_or(-1) as i64,
            stdout: String::from_utf8_lossy(&output.stdout).replace("\r\n", "\n"),
            stderr: String::from_utf8_lossy(&output.stderr).replace("\r\n", "\n"),
        })
    }

    fn func_gettext(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        let args = string_args(&posargs)?;
        if args.len() != 1 {
            return Err(Diagnostic::invalid_arguments(
                "Gettext requires one positional argument (package name).",
            ));
        }
        let mut kwargs = Kwargs::permitted("gettext", kwargs, &["languages"])?;
        let languages = kwargs.take_string_list("languages")?;
        if languages.is_empty() {
            return Err(Diagnostic::invalid_arguments(
                "Argument languages must be a list of strings.",
            ));
        }
        if !self.build.pot.is_empty() {
            return Err(Diagnostic::invalid_code(
                "More than one gettext definition currently not supported.",
            ));
        }
        self.build.pot.push(GettextTranslation {
            package_name: args[0].clone(),
            languages,
            subdir: self.subdir.clone(),
        });
        Ok(None)
    }

    fn func_get_option(
        &mut self,
        posargs: Vec<Value>,
        kwargs: &HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_kwargs("get_option", kwargs)?;
        check_arity("get_option", &posargs, 1)?;
        let optname = posargs[0]
            .as_str()
            .ok_or_else(|| Diagnostic::invalid_arguments("Incorrect argument type."))?;
        let scope = if is_reserved_option_name(optname) {
            None
        } else {
            Some(self.subproject.as_str())
        };
        let value = self
            .env
            .coredata
            .options
            .get_value_for(optname, scope)
            .map_err(|_| {
                Diagnostic::invalid_arguments(format!(
                    "Tried to access unknown option \"{}\".",
                    optname
                ))
            })?;
        Ok(Some(option_to_value(value)))
    }

    fn func_subproject(
        &mut self,
        posargs: Vec<Value>,
        kwargs: &HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_kwargs("subproject", kwargs)?;
        let args = string_args(&posargs)?;
        if args.len() != 1 {
            return Err(Diagnostic::invalid_arguments(
                "Subproject takes exactly one argument",
            ));
        }
        self.do_subproject(&args[0]).map(Some)
    }

    pub(super) fn do_subproject(&mut self, dirname: &str) -> DiagResult<Value> {
        if !self.subdir.is_empty() {
            let segments: Vec<&str> = self.subdir.split('/').collect();
            if segments.len() != 2 || segments[0] != self.subproject_dir {
                return Err(Diagnostic::invalid_code(
                    "Subprojects must be defined at the root directory.",
                ));
            }
        }
        if self.subproject_stack.iter().any(|s| s == dirname) {
            let mut fullstack = self.subproject_stack.clone();
            fullstack.push(dirname.to_string());
            return Err(Diagnostic::invalid_code(format!(
                "Recursive include of subprojects: {}.",
                fullstack.join(" => ")
            )));
        }
        if let Some(cached) = self.subprojects.get(dirname) {
            return Ok(cached.clone());
        }
        let resolver = Resolver::new(self.env.source_dir.join(&self.subproject_dir));
        let resolved = resolver
            .resolve(dirname)
            .map_err(Diagnostic::from)?
            .ok_or_else(|| {
                Diagnostic::wrap(
                    "Subproject directory does not exist and can not be downloaded.",
                )
            })?;
        let subdir = format!("{}/{}", self.subproject_dir, resolved);
        let build_subdir = self.env.build_dir.join(&subdir);
        fs::create_dir_all(&build_subdir).map_err(|e| {
            Diagnostic::environment(format!(
                "Could not create {}: {}",
                build_subdir.display(),
                e
            ))
        })?;
        self.global_args_frozen = true;
        info!("Executing subproject {}.", dirname);
        let subproject_dir = self.subproject_dir.clone();
        let (variables, child_build_def_files) = {
            let mut child = Interpreter::new(
                &mut *self.env,
                &mut *self.build,
                dirname,
                &subdir,
                &subproject_dir,
            )?;
            // The loaded-subproject map is shared down the recursion so
            // diamond dependencies evaluate once.
            child.subprojects = std::mem::take(&mut self.subprojects);
            child.subproject_stack = self.subproject_stack.clone();
            child.subproject_stack.push(dirname.to_string());
            let result = child.run();
            self.subprojects = std::mem::take(&mut child.subprojects);
            result?;
            (
                std::mem::take(&mut child.variables),
                std::mem::take(&mut child.build_def_files),
            )
        };
        info!("Subproject {} finished.", dirname);
        self.build.subprojects.insert(dirname.to_string());
        self.build_def_files.extend(child_build_def_files);
        let value = Value::Object(Object::Subproject(Rc::new(SubprojectData {
            name: dirname.to_string(),
            variables,
        })));
        self.subprojects.insert(dirname.to_string(), value.clone());
        Ok(value)
    }

    fn func_pkgconfig_gen(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_posargs("pkgconfig_gen", &posargs)?;
        let mut kwargs = Kwargs::permitted(
            "pkgconfig_gen",
            kwargs,
            &["libraries", "subdirs", "version", "name", "filebase", "description"],
        )?;
        let mut libraries = Vec::new();
        for value in flatten(kwargs.take_list("libraries")) {
            match value {
                Value::Object(Object::Target(id)) => match self.build.targets.get(id) {
                    Target::Build(t)
                        if matches!(
                            t.kind,
                            TargetKind::StaticLibrary | TargetKind::SharedLibrary
                        ) =>
                    {
                        libraries.push(id)
                    }
                    _ => {
                        return Err(Diagnostic::invalid_arguments(
                            "Library argument not a library object.",
                        ))
                    }
                },
                _ => {
                    return Err(Diagnostic::invalid_arguments(
                        "Library argument not a library object.",
                    ))
                }
            }
        }
        let subdirs = {
            let subdirs = kwargs.take_string_list("subdirs")?;
            if subdirs.is_empty() {
                vec![".".to_string()]
            } else {
                subdirs
            }
        };
        let version = kwargs.take_str("version")?.unwrap_or_default();
        let name = kwargs.require_str("name").map_err(|_| {
            Diagnostic::invalid_arguments("Name not specified.")
        })?;
        let filebase = kwargs.take_str("filebase")?.unwrap_or_else(|| name.clone());
        let description = kwargs.require_str("description").map_err(|_| {
            Diagnostic::invalid_arguments("Description is not a string.")
        })?;
        self.build.pkgconfig_gens.push(PkgConfigGenerator {
            libraries,
            subdirs,
            name,
            description,
            version,
            filebase,
        });
        Ok(None)
    }

    fn func_vcs_tag(
        &mut self,
        posargs: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_posargs("vcs_tag", &posargs)?;
        let mut kwargs = Kwargs::permitted(
            "vcs_tag",
            kwargs,
            &["command", "fallback", "input", "output", "replace_string", "build_always"],
        )?;
        let fallback = kwargs.require_str("fallback").map_err(|_| {
            Diagnostic::invalid_arguments("Keyword argument must exist and be a string.")
        })?;
        let replace_string = kwargs
            .take_str("replace_string")?
            .unwrap_or_else(|| "@VCS_TAG@".to_string());
        let input = kwargs.require_str("input")?;
        let output = kwargs.require_str("output")?;
        let build_always = kwargs.take_bool("build_always", true)?;
        let source_dir = self.env.source_dir.join(&self.subdir);
        // The default regex selector uses the entire command output.
        let mut regex_selector = "(.*)".to_string();
        let vcs_cmd = {
            let mut explicit = kwargs.take_string_list("command")?;
            if !explicit.is_empty() {
                explicit[0] = match which::which(&explicit[0]) {
                    Ok(path) => path.to_string_lossy().into_owned(),
                    Err(_) => source_dir.join(&explicit[0]).to_string_lossy().into_owned(),
                };
                explicit
            } else if let Some(vcs) = detect_vcs(&source_dir) {
                info!("Found {} repository at {}", vcs.name, vcs.wc_dir.display());
                regex_selector = vcs.rev_regex.to_string();
                vcs.get_rev.iter().map(|s| s.to_string()).collect()
            } else {
                // An unrunnable command forces the fallback string.
                vec![" ".to_string()]
            }
        };
        let own_exe = std::env::current_exe()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "mason".to_string());
        let mut command = vec![
            CommandItem::Program(vec![own_exe]),
            CommandItem::Str("internal".to_string()),
            CommandItem::Str("vcstagger".to_string()),
            CommandItem::Str("@INPUT0@".to_string()),
            CommandItem::Str("@OUTPUT0@".to_string()),
            CommandItem::Str(fallback),
            CommandItem::Str(source_dir.to_string_lossy().into_owned()),
            CommandItem::Str(replace_string),
            CommandItem::Str(regex_selector),
        ];
        command.extend(vcs_cmd.into_iter().map(CommandItem::Str));
        let target = CustomTarget {
            name: output.clone(),
            subdir: self.subdir.clone(),
            command,
            inputs: vec![SourceItem::File(File {
                is_built: false,
                subdir: self.subdir.clone(),
                fname: input,
            })],
            outputs: vec![output],
            depfile: None,
            build_always,
            install: false,
            install_dir: None,
            depends: Vec::new(),
        };
        let id = self.add_target(Target::Custom(target))?;
        Ok(Some(Value::Object(Object::Target(id))))
    }

    fn func_import(
        &mut self,
        posargs: Vec<Value>,
        kwargs: &HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_kwargs("import", kwargs)?;
        let args = string_args(&posargs)?;
        if args.len() != 1 {
            return Err(Diagnostic::invalid_code("Import takes one argument."));
        }
        let modname = args[0].clone();
        self.env.coredata.modules.insert(modname.clone());
        Ok(Some(Value::Object(Object::Module(modname))))
    }

    fn func_files(
        &mut self,
        posargs: Vec<Value>,
        kwargs: &HashMap<String, Value>,
    ) -> DiagResult<Option<Value>> {
        no_kwargs("files", kwargs)?;
        let names = string_args(&posargs)?;
        let mut files = Vec::new();
        for name in names {
            let file = File::from_source_file(&self.env.source_dir, &self.subdir, &name)
                .map_err(Diagnostic::invalid_code)?;
            files.push(Value::File(file));
        }
        Ok(Some(Value::List(files)))
    }
}

fn render_user_argument(value: &Value) -> DiagResult<String> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        other => stringify_user(other).ok_or_else(|| {
            Diagnostic::invalid_arguments(
                "Function accepts only strings, integers, lists and lists thereof.",
            )
        }),
    }
}

pub(super) fn option_to_value(value: OptionValue) -> Value {
    match value {
        OptionValue::Str(s) => Value::Str(s),
        OptionValue::Bool(b) => Value::Bool(b),
        OptionValue::Int(i) => Value::Int(i),
        OptionValue::Array(items) => {
            Value::List(items.into_iter().map(Value::Str).collect())
        }
    }
}

#[cfg(test)]
mod test {
    use crate::build::{SourceItem, TargetKind};
    use crate::compilers::Language;
    use crate::env::SetupRequest;
    use crate::test::{have_cc, Fixture, EMPTY_PROJECT};
    use std::fs;

    #[test]
    fn trivial_executable_declares_one_target() {
        if !have_cc() {
            return;
        }
        let fixture = Fixture::new();
        fixture.write("meson.build", "project('demo', 'c')\nexecutable('prog', 'main.c')\n");
        fixture.write("main.c", "int main(void) { return 0; }\n");
        let (_, build) = fixture.configure().unwrap();
        assert_eq!(build.targets.len(), 1);
        let id = build.targets.lookup("prog@exe").expect("prog@exe exists");
        let target = build.targets.get(id).as_build().unwrap();
        assert_eq!(target.name, "prog");
        assert_eq!(target.kind, TargetKind::Executable);
        match &target.sources[0] {
            SourceItem::File(f) => {
                assert!(!f.is_built);
                assert_eq!(f.subdir, "");
                assert_eq!(f.fname, "main.c");
            }
            other => panic!("unexpected source: {:?}", other),
        }
        let langs: Vec<Language> = target.languages.iter().copied().collect();
        assert_eq!(langs, vec![Language::C]);
    }

    #[test]
    fn option_file_and_get_option_round_trip() {
        let fixture = Fixture::new();
        fixture.write(
            "meson_options.txt",
            "option('level', type : 'combo', choices : ['a','b','c'], value : 'b')\n",
        );
        fixture.write(
            "meson.build",
            "project('test')\n\
             if get_option('level') != 'c'\n  error('wrong level')\nendif\n",
        );
        let request = SetupRequest {
            defines: vec!["level=c".to_string()],
            ..SetupRequest::default()
        };
        fixture.configure_with(request).unwrap();
    }

    #[test]
    fn bad_option_value_fails_configure() {
        let fixture = Fixture::new();
        fixture.write(
            "meson_options.txt",
            "option('level', type : 'combo', choices : ['a','b','c'], value : 'b')\n",
        );
        fixture.write("meson.build", EMPTY_PROJECT);
        let request = SetupRequest {
            defines: vec!["level=z".to_string()],
            ..SetupRequest::default()
        };
        let err = fixture.configure_with(request).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("OptionError"), "{}", msg);
        assert!(msg.contains("Value \"z\""), "{}", msg);
        assert!(msg.contains("not one of the choices"), "{}", msg);
    }

    #[test]
    fn subproject_cycle_is_fatal() {
        let fixture = Fixture::new();
        fixture.write("meson.build", "project('root')\nsubproject('a')\n");
        fixture.write("subprojects/a/meson.build", "project('a')\nsubproject('b')\n");
        fixture.write("subprojects/b/meson.build", "project('b')\nsubproject('a')\n");
        let err = fixture.configure().unwrap_err();
        assert!(
            err.to_string()
                .contains("Recursive include of subprojects: a => b => a."),
            "{}",
            err
        );
    }

    #[test]
    fn wrap_hash_mismatch_aborts_before_extraction() {
        let fixture = Fixture::new();
        fixture.write("meson.build", "project('root')\nsubproject('badpkg')\n");
        // An archive whose bytes do not match the declared hash.
        fixture.write("subprojects/packagecache/.keep", "");
        fs::write(
            fixture.source.join("subprojects/packagecache/badpkg.tar.gz"),
            b"corrupted bytes",
        )
        .unwrap();
        fixture.write(
            "subprojects/badpkg.wrap",
            "[wrap-file]\n\
             directory = badpkg-1.0\n\
             source_url = https://example.invalid/badpkg.tar.gz\n\
             source_filename = badpkg.tar.gz\n\
             source_hash = 0000000000000000000000000000000000000000000000000000000000000000\n",
        );
        let err = fixture.configure().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("WrapError"), "{}", msg);
        assert!(msg.contains("Incorrect hash for source badpkg"), "{}", msg);
        assert!(msg.contains("expected 0000"), "{}", msg);
        // The extract step never ran.
        assert!(!fixture.source.join("subprojects/badpkg-1.0").exists());
    }

    #[test]
    fn configure_file_substitutes_and_blanks_missing() {
        let fixture = Fixture::new();
        fixture.write("in.h.in", "@A@ @B@");
        fixture.write(
            "meson.build",
            "project('test')\n\
             conf = configuration_data()\n\
             conf.set('A', 1)\n\
             configure_file(input : 'in.h.in', output : 'out.h', configuration : conf)\n",
        );
        let (env, _) = fixture.configure().unwrap();
        assert_eq!(
            fs::read_to_string(env.build_dir.join("out.h")).unwrap(),
            "1 "
        );
    }

    #[test]
    fn used_configuration_data_is_immutable() {
        let fixture = Fixture::new();
        fixture.write("in.h.in", "@A@\n");
        fixture.write(
            "meson.build",
            "project('test')\n\
             conf = configuration_data()\n\
             conf.set('A', 1)\n\
             configure_file(input : 'in.h.in', output : 'out.h', configuration : conf)\n\
             conf.set('B', 2)\n",
        );
        let err = fixture.configure().unwrap_err();
        assert!(
            err.to_string()
                .contains("Can not set values on configuration object that has been used."),
            "{}",
            err
        );
    }

    #[test]
    fn mesondefine_expansion_in_configure_file() {
        let fixture = Fixture::new();
        fixture.write(
            "config.h.in",
            "#mesondefine HAVE_X\n#mesondefine NO_Y\n#mesondefine GONE\n",
        );
        fixture.write(
            "meson.build",
            "project('test')\n\
             conf = configuration_data()\n\
             conf.set('HAVE_X', true)\n\
             conf.set('NO_Y', false)\n\
             configure_file(input : 'config.h.in', output : 'config.h', configuration : conf)\n",
        );
        let (env, _) = fixture.configure().unwrap();
        assert_eq!(
            fs::read_to_string(env.build_dir.join("config.h")).unwrap(),
            "#define HAVE_X\n#undef NO_Y\n/* undef GONE */\n"
        );
    }

    #[test]
    fn global_arguments_freeze_after_first_target() {
        if !have_cc() {
            return;
        }
        let fixture = Fixture::new();
        fixture.write("main.c", "int main(void) { return 0; }\n");
        fixture.write(
            "meson.build",
            "project('demo', 'c')\n\
             executable('x', 'main.c')\n\
             add_global_arguments('-DX', language : 'c')\n",
        );
        let err = fixture.configure().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("InvalidCode"), "{}", msg);
        assert!(
            msg.contains("Tried to set global arguments after a build target has been declared."),
            "{}",
            msg
        );
    }

    #[test]
    fn duplicate_target_names_are_rejected() {
        if !have_cc() {
            return;
        }
        let fixture = Fixture::new();
        fixture.write("main.c", "int main(void) { return 0; }\n");
        fixture.write(
            "meson.build",
            "project('demo', 'c')\n\
             executable('x', 'main.c')\n\
             executable('x', 'main.c')\n",
        );
        let err = fixture.configure().unwrap_err();
        assert!(err.to_string().contains("already exists"), "{}", err);
    }

    #[test]
    fn executable_and_library_may_share_a_name() {
        if !have_cc() {
            return;
        }
        let fixture = Fixture::new();
        fixture.write("main.c", "int main(void) { return 0; }\n");
        fixture.write("lib.c", "int foo(void) { return 42; }\n");
        fixture.write(
            "meson.build",
            "project('demo', 'c')\n\
             executable('foo', 'main.c')\n\
             static_library('foo', 'lib.c')\n",
        );
        let (_, build) = fixture.configure().unwrap();
        assert!(build.targets.lookup("foo@exe").is_some());
        assert!(build.targets.lookup("foo@sta").is_some());
    }

    #[test]
    fn reserved_target_names_are_rejected() {
        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('test')\n\
             run_target('all', 'true')\n",
        );
        let err = fixture.configure().unwrap_err();
        assert!(err.to_string().contains("reserved"), "{}", err);
    }

    #[test]
    fn missing_source_is_reported() {
        if !have_cc() {
            return;
        }
        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('demo', 'c')\nexecutable('prog', 'missing.c')\n",
        );
        let err = fixture.configure().unwrap_err();
        assert!(
            err.to_string().contains("non-existing source missing.c"),
            "{}",
            err
        );
    }

    #[test]
    fn subdir_descends_once_and_restores() {
        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('test')\nsubdir('lib')\nsubdir('app')\n",
        );
        fixture.write("lib/meson.build", "libvar = 'from-lib'\n");
        fixture.write("app/meson.build", "message(libvar)\n");
        fixture.configure().unwrap();

        let fixture = Fixture::new();
        fixture.write("meson.build", "project('test')\nsubdir('x')\nsubdir('x')\n");
        fixture.write("x/meson.build", "a = 1\n");
        let err = fixture.configure().unwrap_err();
        assert!(err.to_string().contains("already been visited"), "{}", err);
    }

    #[test]
    fn subdir_rejects_parent_traversal() {
        let fixture = Fixture::new();
        fixture.write("meson.build", "project('test')\nsubdir('../escape')\n");
        let err = fixture.configure().unwrap_err();
        assert!(err.to_string().contains("Subdir contains .."), "{}", err);
    }

    #[test]
    fn subproject_variables_are_visible_through_get_variable() {
        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('root')\n\
             sp = subproject('dep')\n\
             if sp.get_variable('answer') != 42\n  error('lost variable')\nendif\n",
        );
        fixture.write("subprojects/dep/meson.build", "project('dep')\nanswer = 42\n");
        let (_, build) = fixture.configure().unwrap();
        assert!(build.subprojects.contains("dep"));
        assert_eq!(build.projects.get("dep").unwrap(), "dep");
    }

    #[test]
    fn diamond_subprojects_evaluate_once() {
        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('root')\nsubproject('a')\nsubproject('b')\n",
        );
        // Both a and b pull in common; a second evaluation would fail
        // with "Second call to project()".
        fixture.write(
            "subprojects/a/meson.build",
            "project('a')\nsubproject('common')\n",
        );
        fixture.write(
            "subprojects/b/meson.build",
            "project('b')\nsubproject('common')\n",
        );
        fixture.write("subprojects/common/meson.build", "project('common')\n");
        fixture.configure().unwrap();
    }

    #[test]
    fn subproject_must_start_from_root() {
        let fixture = Fixture::new();
        fixture.write("meson.build", "project('test')\nsubdir('inner')\n");
        fixture.write("inner/meson.build", "subproject('dep')\n");
        fixture.write("subprojects/dep/meson.build", "project('dep')\n");
        let err = fixture.configure().unwrap_err();
        assert!(
            err.to_string().contains("Subprojects must be defined at the root directory."),
            "{}",
            err
        );
    }

    #[test]
    fn string_and_array_methods_work_in_scripts() {
        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('test')\n\
             s = '  hello  '.strip()\n\
             if s != 'hello'\n  error('strip broken')\nendif\n\
             parts = 'a-b-c'.split('-')\n\
             if parts.length() != 3\n  error('split broken')\nendif\n\
             if not parts.contains('b')\n  error('contains broken')\nendif\n\
             if parts.get(-1) != 'c'\n  error('get broken')\nendif\n\
             t = 'v @0@ n @1@ b @2@'.format('x', 7, true)\n\
             if t != 'v x n 7 b true'\n  error('format broken')\nendif\n",
        );
        fixture.configure().unwrap();
    }

    #[test]
    fn machine_objects_answer_system_queries() {
        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('test')\n\
             if build_machine.endian() != 'little' and build_machine.endian() != 'big'\n\
               error('endian broken')\nendif\n\
             if host_machine.system() != build_machine.system()\n\
               error('native host must equal build machine')\nendif\n\
             if meson.is_cross_build()\n  error('not a cross build')\nendif\n\
             if meson.is_subproject()\n  error('not a subproject')\nendif\n",
        );
        fixture.configure().unwrap();
    }

    #[test]
    fn project_version_is_visible() {
        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('test', version : '1.2.3')\n\
             if meson.project_version() != '1.2.3'\n  error('version broken')\nendif\n",
        );
        let (_, build) = fixture.configure().unwrap();
        assert_eq!(build.project_versions.get("test").unwrap(), "1.2.3");
    }

    #[test]
    fn run_command_captures_output() {
        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('test')\n\
             r = run_command('echo', 'hello')\n\
             if r.returncode() != 0\n  error('echo failed')\nendif\n\
             if r.stdout().strip() != 'hello'\n  error('stdout broken')\nendif\n",
        );
        fixture.configure().unwrap();
    }

    #[test]
    fn custom_target_records_commands_and_outputs() {
        let fixture = Fixture::new();
        fixture.write("gen.sh", "#!/bin/sh\n");
        fixture.write(
            "meson.build",
            "project('test')\n\
             custom_target('gen',\n\
               input : 'gen.sh',\n\
               output : ['out.c'],\n\
               command : ['sh', '@INPUT@', '@OUTPUT@'],\n\
               build_always : true)\n",
        );
        let (_, build) = fixture.configure().unwrap();
        let id = build.targets.lookup("gen@cus").expect("custom target exists");
        let target = build.targets.get(id).as_custom().unwrap();
        assert_eq!(target.outputs, vec!["out.c"]);
        assert!(target.build_always);
    }

    #[test]
    fn vcs_tag_declares_build_always_custom_target() {
        let fixture = Fixture::new();
        fixture.write("version.c.in", "const char *v = \"@VCS_TAG@\";\n");
        fixture.write(
            "meson.build",
            "project('test')\n\
             vcs_tag(input : 'version.c.in', output : 'version.c', fallback : '1.0')\n",
        );
        let (_, build) = fixture.configure().unwrap();
        let id = build
            .targets
            .lookup("version.c@cus")
            .expect("vcs_tag target exists");
        let target = build.targets.get(id).as_custom().unwrap();
        assert!(target.build_always);
        assert_eq!(target.outputs, vec!["version.c"]);
    }

    #[test]
    fn tests_record_their_shape() {
        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('test')\n\
             runner = find_program('echo')\n\
             test('smoke', runner, args : ['--ok'], env : ['MODE=ci'], timeout : 5)\n\
             benchmark('bench', runner)\n",
        );
        let (_, build) = fixture.configure().unwrap();
        assert_eq!(build.tests.len(), 1);
        assert_eq!(build.benchmarks.len(), 1);
        let test = &build.tests[0];
        assert_eq!(test.name, "smoke");
        assert_eq!(test.timeout, 5);
        assert_eq!(test.env, vec![("MODE".to_string(), "ci".to_string())]);
    }

    #[test]
    fn bad_test_env_entries_are_rejected() {
        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('test')\n\
             runner = find_program('echo')\n\
             test('smoke', runner, env : ['NOEQUALS'])\n",
        );
        let err = fixture.configure().unwrap_err();
        assert!(
            err.to_string().contains("Env var definition must be of type key=val."),
            "{}",
            err
        );
    }

    #[test]
    fn find_program_required_fails_and_optional_continues() {
        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('test')\n\
             prog = find_program('no-such-tool-xyzzy-3981', required : false)\n\
             if prog.found()\n  error('phantom tool')\nendif\n",
        );
        fixture.configure().unwrap();

        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('test')\nfind_program('no-such-tool-xyzzy-3981')\n",
        );
        let err = fixture.configure().unwrap_err();
        assert!(err.to_string().contains("not found"), "{}", err);
    }

    #[test]
    fn dependency_not_required_reports_not_found() {
        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('test')\n\
             dep = dependency('surely-no-such-pkg-8814', required : false)\n\
             if dep.found()\n  error('phantom dependency')\nendif\n",
        );
        fixture.configure().unwrap();
    }

    #[test]
    fn unknown_function_and_kwarg_are_located() {
        let fixture = Fixture::new();
        fixture.write("meson.build", "project('test')\nfrobnicate()\n");
        let err = fixture.configure().unwrap_err();
        assert!(err.to_string().contains("Unknown function \"frobnicate\""));

        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('test')\nconfiguration_data(extra : 1)\n",
        );
        let err = fixture.configure().unwrap_err();
        assert!(
            err.to_string().contains("does not take keyword arguments"),
            "{}",
            err
        );
    }

    #[test]
    fn option_calls_in_build_files_are_rejected() {
        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('test')\noption('x', type : 'string')\n",
        );
        let err = fixture.configure().unwrap_err();
        assert!(
            err.to_string().contains("All options must be in the option file."),
            "{}",
            err
        );
    }

    #[test]
    fn files_checks_existence() {
        let fixture = Fixture::new();
        fixture.write("real.c", "int x;\n");
        fixture.write(
            "meson.build",
            "project('test')\nsrcs = files('real.c')\n",
        );
        fixture.configure().unwrap();

        let fixture = Fixture::new();
        fixture.write("meson.build", "project('test')\nfiles('ghost.c')\n");
        let err = fixture.configure().unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{}", err);
    }

    #[test]
    fn second_project_call_fails() {
        let fixture = Fixture::new();
        fixture.write("meson.build", "project('one')\nproject('two')\n");
        let err = fixture.configure().unwrap_err();
        assert!(err.to_string().contains("Second call to project()."), "{}", err);
    }

    #[test]
    fn gettext_is_single_shot() {
        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('test')\n\
             gettext('demo', languages : ['fi', 'de'])\n\
             gettext('again', languages : ['fi'])\n",
        );
        let err = fixture.configure().unwrap_err();
        assert!(
            err.to_string()
                .contains("More than one gettext definition currently not supported."),
            "{}",
            err
        );
    }

    #[test]
    fn generator_validates_templates_and_processes_files() {
        let fixture = Fixture::new();
        fixture.write("proto.idl", "interface X\n");
        fixture.write(
            "meson.build",
            "project('test')\n\
             compiler = find_program('echo')\n\
             gen = generator(compiler,\n\
               output : '@BASENAME@.c',\n\
               arguments : ['@INPUT@', '@OUTPUT@'])\n\
             generated = gen.process('proto.idl')\n",
        );
        let (_, build) = fixture.configure().unwrap();
        assert_eq!(build.generators.len(), 1);

        let fixture = Fixture::new();
        fixture.write(
            "meson.build",
            "project('test')\n\
             compiler = find_program('echo')\n\
             generator(compiler, output : 'fixed.c', arguments : ['x'])\n",
        );
        let err = fixture.configure().unwrap_err();
        assert!(
            err.to_string().contains("@BASENAME@ or @PLAINNAME@"),
            "{}",
            err
        );
    }
}
