/*!
# Back-end lowering

Turns the build graph into the manifest a concrete back-end consumes:
targets in declaration order with resolved compile and link fragments,
generator commands with their templates bound, custom-target command
lines with every `@…@` substitution applied, the install plan, test
serialisations and the regen file list.

The `none` back-end ships with the tool and persists the manifest
artifacts under `meson-private`; the ninja and IDE emitters are external
collaborators that consume the same contract.

*/
mod serialize;

pub use serialize::{read_test_file, write_test_file, TestSerialisation};

use crate::build::{
    Build, CommandItem, File, GeneratorExe, SourceItem, Target, TargetKind, TestArg, TestExe,
};
use crate::common::write_atomic;
use crate::compilers::Compiler;
use crate::diagnostics::{DiagResult, Diagnostic};
use crate::env::{Environment, COREDATA_FILE, PRIVATE_DIR};
use lazy_static::lazy_static;
use log::info;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

lazy_static! {
    static ref OUTPUT_N: Regex = Regex::new(r"@OUTPUT(\d+)@").unwrap();
    static ref INPUT_N: Regex = Regex::new(r"@INPUT(\d+)@").unwrap();
    static ref PRIVATE_OUTDIR: Regex = Regex::new(r"@PRIVATE_OUTDIR_(ABS_)?([^/\s@]*)@").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoweredKind {
    Executable,
    StaticLibrary,
    SharedLibrary,
    Jar,
    Custom,
    Run,
}

/// One bound generator invocation: a command ready to run, plus its
/// input and output names.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorCommand {
    pub command: Vec<String>,
    pub infile: String,
    pub outfiles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LoweredTarget {
    pub id: String,
    pub guid: String,
    pub name: String,
    pub kind: LoweredKind,
    pub subdir: String,
    /// The produced file, relative to the build directory. Empty for run
    /// targets.
    pub filename: String,
    pub sources: Vec<String>,
    pub compile_args: BTreeMap<String, Vec<String>>,
    pub link_args: Vec<String>,
    pub generated: Vec<GeneratorCommand>,
    /// Fully substituted command line (custom and run targets).
    pub command: Vec<String>,
    pub outputs: Vec<String>,
    pub depfile: Option<String>,
    pub build_always: bool,
    pub install: bool,
    pub install_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInstall {
    pub source: String,
    pub dest_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubdirInstall {
    pub source_dir: String,
    pub dest_dir: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallPlan {
    pub prefix: String,
    pub targets: Vec<FileInstall>,
    pub headers: Vec<FileInstall>,
    pub man: Vec<FileInstall>,
    pub data: Vec<FileInstall>,
    pub subdirs: Vec<SubdirInstall>,
}

#[derive(Debug)]
pub struct Manifest {
    pub project_name: String,
    pub targets: Vec<LoweredTarget>,
    pub install: InstallPlan,
    pub tests: Vec<TestSerialisation>,
    pub benchmarks: Vec<TestSerialisation>,
    pub regen_files: Vec<String>,
}

/// Replace the file-list templates in one command. Whole-word `@INPUT@`
/// and `@OUTPUT@` splice every element in; embedded forms require
/// exactly one file. A template with no markers passes through
/// unchanged.
pub fn substitute_values(
    command: &[String],
    inputs: &[String],
    outputs: &[String],
    outdir: &str,
) -> DiagResult<Vec<String>> {
    let mut result = Vec::new();
    for arg in command {
        if arg == "@INPUT@" {
            result.extend(inputs.iter().cloned());
            continue;
        }
        if arg == "@OUTPUT@" {
            result.extend(outputs.iter().cloned());
            continue;
        }
        let mut arg = arg.clone();
        if arg.contains("@INPUT@") {
            if inputs.len() != 1 {
                return Err(Diagnostic::invalid_arguments(format!(
                    "Command argument {} used @INPUT@ inside a string, but there are {} inputs.",
                    arg,
                    inputs.len()
                )));
            }
            arg = arg.replace("@INPUT@", &inputs[0]);
        }
        if arg.contains("@OUTPUT@") {
            if outputs.len() != 1 {
                return Err(Diagnostic::invalid_arguments(format!(
                    "Command argument {} used @OUTPUT@ inside a string, but there are {} outputs.",
                    arg,
                    outputs.len()
                )));
            }
            arg = arg.replace("@OUTPUT@", &outputs[0]);
        }
        arg = replace_indexed(&arg, &INPUT_N, inputs, "input")?;
        arg = replace_indexed(&arg, &OUTPUT_N, outputs, "output")?;
        arg = arg.replace("@OUTDIR@", outdir);
        result.push(arg);
    }
    Ok(result)
}

fn replace_indexed(
    arg: &str,
    pattern: &Regex,
    files: &[String],
    what: &str,
) -> DiagResult<String> {
    let mut out = String::new();
    let mut last = 0;
    for caps in pattern.captures_iter(arg) {
        let whole = caps.get(0).expect("capture 0 always present");
        let index: usize = caps[1].parse().map_err(|_| {
            Diagnostic::invalid_arguments(format!("Invalid {} index in {}.", what, arg))
        })?;
        let file = files.get(index).ok_or_else(|| {
            Diagnostic::invalid_arguments(format!(
                "Command argument {} references {} {} but there are only {}.",
                arg,
                what,
                index,
                files.len()
            ))
        })?;
        out.push_str(&arg[last..whole.start()]);
        out.push_str(file);
        last = whole.end();
    }
    out.push_str(&arg[last..]);
    Ok(out)
}

/// Per-buildtype base arguments in the compiler family's spelling.
fn base_compile_args(compiler: &Compiler, debug: bool, optimization: &str) -> Vec<String> {
    let mut args = Vec::new();
    if compiler.is_msvc_like() {
        if debug {
            args.push("/Zi".to_string());
        }
        if optimization != "plain" && optimization != "0" {
            args.push("/O2".to_string());
        } else if optimization == "0" {
            args.push("/Od".to_string());
        }
    } else {
        if debug {
            args.push("-g".to_string());
        }
        if optimization != "plain" {
            args.push(format!("-O{}", optimization));
        }
    }
    args
}

fn warning_args(compiler: &Compiler, level: &str, werror: bool) -> Vec<String> {
    let mut args: Vec<String> = if compiler.is_msvc_like() {
        match level {
            "0" => Vec::new(),
            "1" => vec!["/W2".to_string()],
            "2" => vec!["/W3".to_string()],
            _ => vec!["/W4".to_string()],
        }
    } else {
        match level {
            "0" => Vec::new(),
            "1" => vec!["-Wall".to_string()],
            "2" => vec!["-Wall".to_string(), "-Wextra".to_string()],
            _ => vec![
                "-Wall".to_string(),
                "-Wextra".to_string(),
                "-Wpedantic".to_string(),
            ],
        }
    };
    if werror {
        args.push(if compiler.is_msvc_like() {
            "/WX".to_string()
        } else {
            "-Werror".to_string()
        });
    }
    args
}

struct Lowerer<'a> {
    build: &'a Build,
    env: &'a Environment,
    source_root: String,
}

impl<'a> Lowerer<'a> {
    fn source_file_path(&self, file: &File) -> String {
        file.rel_to_builddir(&self.source_root)
            .to_string_lossy()
            .into_owned()
    }

    fn target_filename(&self, id: crate::build::TargetId) -> DiagResult<String> {
        match self.build.targets.get(id) {
            Target::Build(t) => {
                let dir = Path::new(&t.subdir).join(t.filename(&self.env.naming));
                Ok(dir.to_string_lossy().into_owned())
            }
            Target::Custom(t) => {
                let first = t.outputs.first().ok_or_else(|| {
                    Diagnostic::internal("custom target with no outputs survived validation")
                })?;
                Ok(Path::new(&t.subdir).join(first).to_string_lossy().into_owned())
            }
            Target::Run(t) => Ok(t.name.clone()),
        }
    }

    fn exe_command(&self, exe: &GeneratorExe) -> DiagResult<Vec<String>> {
        match exe {
            GeneratorExe::Program(argv) => Ok(argv.clone()),
            GeneratorExe::Built(id) => {
                if let Target::Build(t) = self.build.targets.get(*id) {
                    if t.is_cross && !self.env.has_exe_wrapper() {
                        return Err(Diagnostic::environment(format!(
                            "Can not use target {} as a generator because it is cross-built \
                             and no exe wrapper is defined. You might want to set it to \
                             native instead.",
                            t.name
                        )));
                    }
                }
                Ok(vec![self.target_filename(*id)?])
            }
        }
    }

    fn lower_build_target(
        &self,
        t: &crate::build::BuildTarget,
    ) -> DiagResult<LoweredTarget> {
        let debug = self
            .env
            .get_option("debug")
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let optimization = self
            .env
            .get_option("optimization")
            .ok()
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_else(|| "0".to_string());
        let warning_level = self
            .env
            .get_option("warning_level")
            .ok()
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_else(|| "1".to_string());
        let werror = self
            .env
            .get_option("werror")
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let mut sources = Vec::new();
        let mut generated = Vec::new();
        let private_dir = Path::new(&t.subdir).join(t.unique_id());
        for item in &t.sources {
            match item {
                SourceItem::File(f) => sources.push(self.source_file_path(f)),
                SourceItem::Custom(custom_id) => {
                    sources.push(self.target_filename(*custom_id)?);
                }
                SourceItem::Generated(list) => {
                    let generator = self.build.generator(list.generator);
                    let exe = self.exe_command(&generator.exe)?;
                    for infile in &list.infiles {
                        let input = self.source_file_path(infile);
                        let outfiles: Vec<String> = generator
                            .outputs_for(infile)
                            .into_iter()
                            .map(|o| private_dir.join(o).to_string_lossy().into_owned())
                            .collect();
                        let mut args: Vec<String> = Vec::new();
                        for arg in &generator.arguments {
                            if arg == "@EXTRA_ARGS@" {
                                args.extend(list.extra_args.iter().cloned());
                            } else {
                                let arg = arg
                                    .replace("@SOURCE_DIR@", &self.source_root)
                                    .replace("@BUILD_DIR@", ".");
                                args.push(arg);
                            }
                        }
                        let args = substitute_values(
                            &args,
                            std::slice::from_ref(&input),
                            &outfiles,
                            &private_dir.to_string_lossy(),
                        )?;
                        let mut command = exe.clone();
                        command.extend(args);
                        sources.extend(outfiles.iter().cloned());
                        generated.push(GeneratorCommand {
                            command,
                            infile: input,
                            outfiles,
                        });
                    }
                }
            }
        }

        let mut compile_args = BTreeMap::new();
        for lang in &t.languages {
            let compiler = self
                .build
                .find_compiler(*lang, !t.is_cross)
                .ok_or_else(|| {
                    Diagnostic::internal(format!(
                        "target {} uses unregistered language {}",
                        t.name,
                        lang.name()
                    ))
                })?;
            let mut args = base_compile_args(compiler, debug, &optimization);
            args.extend(warning_args(compiler, &warning_level, werror));
            if t.pic && !compiler.is_msvc_like() {
                args.push("-fPIC".to_string());
            }
            let (env_compile, _) = crate::env::get_args_from_envvars(*lang);
            args.extend(env_compile);
            if let Some(global) = self.build.global_args.get(lang) {
                args.extend(global.iter().cloned());
            }
            if let Some(project) = self
                .build
                .project_args
                .get(&(t.subproject.clone(), *lang))
            {
                args.extend(project.iter().cloned());
            }
            args.extend(t.extra_args.get(lang).cloned().unwrap_or_default());
            for incs in &t.include_dirs {
                for dir in &incs.dirs {
                    let source_side = Path::new(&self.source_root)
                        .join(&incs.curdir)
                        .join(dir);
                    let build_side = Path::new(&incs.curdir).join(dir);
                    args.push(format!("-I{}", source_side.to_string_lossy()));
                    args.push(format!("-I{}", build_side.to_string_lossy()));
                }
            }
            for dep in &t.external_deps {
                args.extend(dep.compile_args.iter().cloned());
            }
            compile_args.insert(lang.name().to_string(), args);
        }

        let mut link_args = t.link_args.clone();
        for linked in &t.link_with {
            link_args.push(self.target_filename(*linked)?);
        }
        for dep in &t.external_deps {
            link_args.extend(dep.link_args.iter().cloned());
        }
        let (_, env_link) = t
            .languages
            .iter()
            .next()
            .map(|lang| crate::env::get_args_from_envvars(*lang))
            .unwrap_or_default();
        link_args.extend(env_link);

        let kind = match t.kind {
            TargetKind::Executable => LoweredKind::Executable,
            TargetKind::StaticLibrary => LoweredKind::StaticLibrary,
            TargetKind::SharedLibrary => LoweredKind::SharedLibrary,
            TargetKind::Jar => LoweredKind::Jar,
        };
        Ok(LoweredTarget {
            id: t.unique_id(),
            guid: self.guid_for(&t.unique_id()),
            name: t.name.clone(),
            kind,
            subdir: t.subdir.clone(),
            filename: Path::new(&t.subdir)
                .join(t.filename(&self.env.naming))
                .to_string_lossy()
                .into_owned(),
            sources,
            compile_args,
            link_args,
            generated,
            command: Vec::new(),
            outputs: Vec::new(),
            depfile: None,
            build_always: false,
            install: t.install,
            install_dir: t.install_dir.clone(),
        })
    }

    fn lower_custom_target(
        &self,
        t: &crate::build::CustomTarget,
    ) -> DiagResult<LoweredTarget> {
        let outdir = t.subdir.clone();
        let outputs: Vec<String> = t
            .outputs
            .iter()
            .map(|o| Path::new(&outdir).join(o).to_string_lossy().into_owned())
            .collect();
        let mut inputs = Vec::new();
        for item in &t.inputs {
            match item {
                SourceItem::File(f) => inputs.push(self.source_file_path(f)),
                SourceItem::Custom(id) => inputs.push(self.target_filename(*id)?),
                SourceItem::Generated(_) => {
                    return Err(Diagnostic::invalid_arguments(format!(
                        "Custom target {} may not take generated lists as inputs; pass the \
                         generating target instead.",
                        t.name
                    )))
                }
            }
        }
        let mut command = Vec::new();
        for item in &t.command {
            match item {
                CommandItem::Program(argv) => command.extend(argv.iter().cloned()),
                CommandItem::Target(id) => command.push(self.target_filename(*id)?),
                CommandItem::File(f) => command.push(self.source_file_path(f)),
                CommandItem::Str(s) => {
                    let mut s = s.clone();
                    if s.contains("@SOURCE_ROOT@") {
                        s = s.replace("@SOURCE_ROOT@", &self.source_root);
                    }
                    if s.contains("@BUILD_ROOT@") {
                        s = s.replace("@BUILD_ROOT@", ".");
                    }
                    if s.contains("@DEPFILE@") {
                        let depfile = t.depfile.as_ref().ok_or_else(|| {
                            Diagnostic::invalid_arguments(format!(
                                "Custom target '{}' has @DEPFILE@ but no depfile keyword \
                                 argument.",
                                t.name
                            ))
                        })?;
                        let path = Path::new(&outdir).join(depfile);
                        s = s.replace("@DEPFILE@", &path.to_string_lossy());
                    }
                    if s.contains("@PRIVATE_OUTDIR_") {
                        let caps = PRIVATE_OUTDIR.captures(&s).ok_or_else(|| {
                            Diagnostic::invalid_arguments(format!(
                                "Custom target '{}' has an invalid argument '{}'.",
                                t.name, s
                            ))
                        })?;
                        let whole = caps
                            .get(0)
                            .expect("capture 0 always present")
                            .as_str()
                            .to_string();
                        let replacement = if caps.get(1).is_some() {
                            self.env
                                .build_dir
                                .join(&outdir)
                                .to_string_lossy()
                                .into_owned()
                        } else {
                            outdir.clone()
                        };
                        drop(caps);
                        s = s.replace(&whole, &replacement);
                    }
                    command.push(s);
                }
            }
        }
        let command = substitute_values(&command, &inputs, &outputs, &outdir)?;
        Ok(LoweredTarget {
            id: t.unique_id(),
            guid: self.guid_for(&t.unique_id()),
            name: t.name.clone(),
            kind: LoweredKind::Custom,
            subdir: t.subdir.clone(),
            filename: outputs.first().cloned().unwrap_or_default(),
            sources: inputs,
            compile_args: BTreeMap::new(),
            link_args: Vec::new(),
            generated: Vec::new(),
            command,
            outputs,
            depfile: t.depfile.clone(),
            build_always: t.build_always,
            install: t.install,
            install_dir: t.install_dir.clone(),
        })
    }

    fn guid_for(&self, unique_id: &str) -> String {
        self.env
            .coredata
            .target_guids
            .get(unique_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Produce the back-end manifest. Target order follows declaration
/// order, which back-ends must preserve.
pub fn lower(
    build: &Build,
    env: &Environment,
    build_def_files: &[String],
) -> DiagResult<Manifest> {
    let lowerer = Lowerer {
        build,
        env,
        source_root: env.source_dir.to_string_lossy().into_owned(),
    };
    let mut targets = Vec::new();
    for (_, target) in build.targets.iter() {
        let lowered = match target {
            Target::Build(t) => lowerer.lower_build_target(t)?,
            Target::Custom(t) => lowerer.lower_custom_target(t)?,
            Target::Run(t) => {
                let exe = match which::which(&t.command) {
                    Ok(path) => path.to_string_lossy().into_owned(),
                    Err(_) => env
                        .source_dir
                        .join(&t.subdir)
                        .join(&t.command)
                        .to_string_lossy()
                        .into_owned(),
                };
                let mut command = vec![exe];
                command.extend(t.args.iter().cloned());
                LoweredTarget {
                    id: t.unique_id(),
                    guid: lowerer.guid_for(&t.unique_id()),
                    name: t.name.clone(),
                    kind: LoweredKind::Run,
                    subdir: t.subdir.clone(),
                    filename: String::new(),
                    sources: Vec::new(),
                    compile_args: BTreeMap::new(),
                    link_args: Vec::new(),
                    generated: Vec::new(),
                    command,
                    outputs: Vec::new(),
                    depfile: None,
                    build_always: true,
                    install: false,
                    install_dir: None,
                }
            }
        };
        targets.push(lowered);
    }

    let install = lower_install(build, env, &targets)?;
    let tests = lower_tests(build, env, &build.tests)?;
    let benchmarks = lower_tests(build, env, &build.benchmarks)?;

    let mut regen_files: Vec<String> = build_def_files.to_vec();
    let options_file = env.source_dir.join(crate::env::OPTIONS_FILENAME);
    if options_file.is_file() {
        regen_files.push(crate::env::OPTIONS_FILENAME.to_string());
    }
    if let Some(cross_file) = &env.coredata.cross_file {
        regen_files.push(cross_file.to_string_lossy().into_owned());
    }
    regen_files.push(format!("{}/{}", PRIVATE_DIR, COREDATA_FILE));

    Ok(Manifest {
        project_name: build.project_name.clone(),
        targets,
        install,
        tests,
        benchmarks,
        regen_files,
    })
}

fn option_str(env: &Environment, name: &str) -> String {
    env.get_option(name)
        .ok()
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_default()
}

fn lower_install(
    build: &Build,
    env: &Environment,
    targets: &[LoweredTarget],
) -> DiagResult<InstallPlan> {
    let mut plan = InstallPlan {
        prefix: option_str(env, "prefix"),
        ..InstallPlan::default()
    };
    let bindir = option_str(env, "bindir");
    let libdir = option_str(env, "libdir");
    let includedir = option_str(env, "includedir");
    let mandir = option_str(env, "mandir");
    for target in targets {
        if !target.install {
            continue;
        }
        let default_dir = match target.kind {
            LoweredKind::Executable => bindir.clone(),
            LoweredKind::StaticLibrary | LoweredKind::SharedLibrary | LoweredKind::Jar => {
                libdir.clone()
            }
            LoweredKind::Custom => String::new(),
            LoweredKind::Run => continue,
        };
        let dest_dir = target.install_dir.clone().unwrap_or(default_dir);
        plan.targets.push(FileInstall {
            source: target.filename.clone(),
            dest_dir,
        });
    }
    for headers in &build.headers {
        let dest_dir = headers.custom_install_dir.clone().unwrap_or_else(|| {
            Path::new(&includedir)
                .join(&headers.install_subdir)
                .to_string_lossy()
                .into_owned()
        });
        for source in &headers.sources {
            plan.headers.push(FileInstall {
                source: join_subdir(&headers.source_subdir, source),
                dest_dir: dest_dir.clone(),
            });
        }
    }
    for man in &build.man {
        for source in &man.sources {
            let section = source.rsplit('.').next().unwrap_or("1");
            let dest_dir = man.custom_install_dir.clone().unwrap_or_else(|| {
                Path::new(&mandir)
                    .join(format!("man{}", section))
                    .to_string_lossy()
                    .into_owned()
            });
            plan.man.push(FileInstall {
                source: join_subdir(&man.source_subdir, source),
                dest_dir,
            });
        }
    }
    for data in &build.data {
        for source in &data.sources {
            plan.data.push(FileInstall {
                source: join_subdir(&data.source_subdir, source),
                dest_dir: data.install_dir.clone(),
            });
        }
    }
    for idir in &build.install_dirs {
        plan.subdirs.push(SubdirInstall {
            source_dir: join_subdir(&idir.source_subdir, &idir.installable_subdir),
            dest_dir: idir.install_dir.clone(),
        });
    }
    Ok(plan)
}

fn join_subdir(subdir: &str, name: &str) -> String {
    if subdir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", subdir, name)
    }
}

fn lower_tests(
    build: &Build,
    env: &Environment,
    tests: &[crate::build::Test],
) -> DiagResult<Vec<TestSerialisation>> {
    let mut out = Vec::new();
    for test in tests {
        let (command, is_cross) = match &test.exe {
            TestExe::Target(id) => match build.targets.get(*id) {
                Target::Build(t) => {
                    let path = env
                        .build_dir
                        .join(&t.subdir)
                        .join(t.filename(&env.naming));
                    (vec![path.to_string_lossy().into_owned()], t.is_cross)
                }
                _ => {
                    return Err(Diagnostic::internal(
                        "test executable is not a build target",
                    ))
                }
            },
            TestExe::Program(argv) => (argv.clone(), false),
        };
        let exe_wrapper = if is_cross {
            env.cross_info
                .as_ref()
                .and_then(|i| i.binary("exe_wrapper"))
                .and_then(|w| w.into_iter().next())
        } else {
            None
        };
        let mut cmd_args = Vec::new();
        for arg in &test.cmd_args {
            match arg {
                TestArg::Str(s) => cmd_args.push(s.clone()),
                TestArg::File(f) => cmd_args.push(
                    f.rel_to_builddir(&env.source_dir.to_string_lossy())
                        .to_string_lossy()
                        .into_owned(),
                ),
                TestArg::Target(id) => match build.targets.get(*id) {
                    Target::Build(t) => cmd_args.push(
                        env.build_dir
                            .join(&t.subdir)
                            .join(t.filename(&env.naming))
                            .to_string_lossy()
                            .into_owned(),
                    ),
                    Target::Custom(t) => {
                        for output in &t.outputs {
                            cmd_args.push(
                                env.build_dir
                                    .join(&t.subdir)
                                    .join(output)
                                    .to_string_lossy()
                                    .into_owned(),
                            );
                        }
                    }
                    Target::Run(_) => {
                        return Err(Diagnostic::invalid_arguments(
                            "Run targets can not be used as test arguments.",
                        ))
                    }
                },
            }
        }
        out.push(TestSerialisation {
            name: test.name.clone(),
            project: build.project_name.clone(),
            command,
            is_cross,
            exe_wrapper,
            is_parallel: test.is_parallel,
            cmd_args,
            env: test.env.clone(),
            should_fail: test.should_fail,
            timeout: test.timeout,
            valgrind_args: test.valgrind_args.clone(),
        });
    }
    Ok(out)
}

/// A concrete manifest consumer.
pub trait Backend {
    fn name(&self) -> &'static str;
    fn generate(&self, manifest: &Manifest, env: &Environment) -> DiagResult<()>;
}

/// The shipped back-end: persists the manifest artifacts (install plan,
/// test and benchmark serialisations, regen file list) without emitting
/// build rules.
pub struct NoneBackend {
    selected: String,
}

impl Backend for NoneBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    fn generate(&self, manifest: &Manifest, env: &Environment) -> DiagResult<()> {
        let write = |name: &str, payload: &[u8]| -> DiagResult<()> {
            let path = env.scratch_dir.join(name);
            write_atomic(&path, payload).map_err(|e| {
                Diagnostic::environment(format!("Could not write {}: {}", path.display(), e))
            })
        };
        let install = serde_json::to_vec_pretty(&manifest.install)
            .map_err(|e| Diagnostic::internal(format!("install plan serialization: {}", e)))?;
        write("install.dat", &install)?;

        let mut tests = Vec::new();
        write_test_file(&mut tests, &manifest.tests)
            .map_err(|e| Diagnostic::internal(format!("test serialization: {}", e)))?;
        write("meson_test_setup.dat", &tests)?;
        let mut benchmarks = Vec::new();
        write_test_file(&mut benchmarks, &manifest.benchmarks)
            .map_err(|e| Diagnostic::internal(format!("benchmark serialization: {}", e)))?;
        write("meson_benchmark_setup.dat", &benchmarks)?;

        let regen = serde_json::to_vec_pretty(&manifest.regen_files)
            .map_err(|e| Diagnostic::internal(format!("regen list serialization: {}", e)))?;
        write("regeninfo.dump", &regen)?;

        if self.selected != "none" {
            info!(
                "Backend '{}' is provided by an external emitter; manifest artifacts were \
                 written to {}.",
                self.selected, PRIVATE_DIR
            );
        }
        Ok(())
    }
}

/// Resolve a backend option value to its consumer. Every valid choice
/// lowers identically; the external emitters pick the manifest up from
/// `meson-private`.
pub fn backend_for(name: &str) -> DiagResult<Box<dyn Backend>> {
    match name {
        "none" | "ninja" | "vs2010" | "xcode" => Ok(Box::new(NoneBackend {
            selected: name.to_string(),
        })),
        other => Err(Diagnostic::environment(format!(
            "Unknown backend \"{}\".",
            other
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn whole_word_templates_splice_all_files() {
        let command = vec![
            "gen".to_string(),
            "@INPUT@".to_string(),
            "@OUTPUT@".to_string(),
        ];
        let inputs = vec!["a.idl".to_string(), "b.idl".to_string()];
        let outputs = vec!["a.c".to_string()];
        let result = substitute_values(&command, &inputs, &outputs, "out").unwrap();
        assert_eq!(result, vec!["gen", "a.idl", "b.idl", "a.c"]);
    }

    #[test]
    fn embedded_template_requires_single_file() {
        let command = vec!["--input=@INPUT@".to_string()];
        let one = vec!["a.idl".to_string()];
        let two = vec!["a.idl".to_string(), "b.idl".to_string()];
        assert_eq!(
            substitute_values(&command, &one, &[], "out").unwrap(),
            vec!["--input=a.idl"]
        );
        assert!(substitute_values(&command, &two, &[], "out").is_err());
    }

    #[test]
    fn indexed_templates_resolve_or_fail() {
        let command = vec!["@INPUT0@".to_string(), "@OUTPUT1@".to_string()];
        let inputs = vec!["in0".to_string()];
        let outputs = vec!["out0".to_string(), "out1".to_string()];
        assert_eq!(
            substitute_values(&command, &inputs, &outputs, ".").unwrap(),
            vec!["in0", "out1"]
        );
        let bad = vec!["@INPUT5@".to_string()];
        assert!(substitute_values(&bad, &inputs, &outputs, ".").is_err());
    }

    #[test]
    fn substitution_without_markers_is_identity() {
        let command = vec!["cp".to_string(), "-r".to_string(), "plain".to_string()];
        assert_eq!(
            substitute_values(&command, &[], &[], ".").unwrap(),
            command
        );
    }

    #[test]
    fn outdir_marker_resolves() {
        let command = vec!["--dir=@OUTDIR@".to_string()];
        assert_eq!(
            substitute_values(&command, &[], &[], "sub/private").unwrap(),
            vec!["--dir=sub/private"]
        );
    }

    #[test]
    fn backend_names_validate() {
        assert!(backend_for("none").is_ok());
        assert!(backend_for("ninja").is_ok());
        assert!(backend_for("vs2010").is_ok());
        assert!(backend_for("xcode").is_ok());
        assert!(backend_for("scons").is_err());
    }

    mod lowering {
        use super::super::*;
        use crate::test::Fixture;

        fn lower_fixture(fixture: &Fixture) -> Manifest {
            let (env, build, build_def_files) = fixture
                .configure_full(crate::env::SetupRequest::default())
                .unwrap();
            lower(&build, &env, &build_def_files).unwrap()
        }

        #[test]
        fn custom_target_commands_are_fully_substituted() {
            let fixture = Fixture::new();
            fixture.write("template.in", "data\n");
            fixture.write(
                "meson.build",
                "project('demo')\n\
                 custom_target('gen',\n\
                   input : 'template.in',\n\
                   output : ['gen.c', 'gen.h'],\n\
                   command : ['sh', '@INPUT0@', '@OUTPUT0@', '@OUTPUT1@', '--dir=@OUTDIR@'])\n",
            );
            let manifest = lower_fixture(&fixture);
            assert_eq!(manifest.targets.len(), 1);
            let target = &manifest.targets[0];
            assert_eq!(target.kind, LoweredKind::Custom);
            assert!(
                target.command.iter().all(|c| !c.contains('@')),
                "unsubstituted command: {:?}",
                target.command
            );
            assert!(target.command.iter().any(|c| c.ends_with("template.in")));
            assert!(target.command.contains(&"gen.c".to_string()));
            assert!(target.command.contains(&"gen.h".to_string()));
        }

        #[test]
        fn target_order_follows_declaration_order() {
            let fixture = Fixture::new();
            fixture.write("in.txt", "x\n");
            fixture.write(
                "meson.build",
                "project('demo')\n\
                 custom_target('zeta', input : 'in.txt', output : ['z.out'], command : ['touch', '@OUTPUT@'])\n\
                 custom_target('alpha', input : 'in.txt', output : ['a.out'], command : ['touch', '@OUTPUT@'])\n",
            );
            let manifest = lower_fixture(&fixture);
            let names: Vec<&str> = manifest.targets.iter().map(|t| t.name.as_str()).collect();
            assert_eq!(names, vec!["zeta", "alpha"]);
        }

        #[test]
        fn tests_serialise_with_resolved_commands() {
            let fixture = Fixture::new();
            fixture.write(
                "meson.build",
                "project('demo')\n\
                 runner = find_program('echo')\n\
                 test('smoke', runner, args : ['hi'], should_fail : true)\n",
            );
            let manifest = lower_fixture(&fixture);
            assert_eq!(manifest.tests.len(), 1);
            let test = &manifest.tests[0];
            assert_eq!(test.project, "demo");
            assert!(test.command[0].ends_with("echo"));
            assert_eq!(test.cmd_args, vec!["hi"]);
            assert!(test.should_fail);
        }

        #[test]
        fn install_plan_collects_declared_artifacts() {
            let fixture = Fixture::new();
            fixture.write("api.h", "int f(void);\n");
            fixture.write("tool.1", "manpage\n");
            fixture.write("extra.conf", "k=v\n");
            fixture.write(
                "meson.build",
                "project('demo')\n\
                 install_headers('api.h', subdir : 'demo')\n\
                 install_man('tool.1')\n\
                 install_data('extra.conf', install_dir : 'share/demo')\n",
            );
            let manifest = lower_fixture(&fixture);
            assert_eq!(manifest.install.headers.len(), 1);
            assert_eq!(manifest.install.headers[0].dest_dir, "include/demo");
            assert_eq!(manifest.install.man[0].dest_dir, "share/man/man1");
            assert_eq!(manifest.install.data[0].dest_dir, "share/demo");
            assert!(std::path::Path::new(&manifest.install.prefix).is_absolute());
        }

        #[test]
        fn regen_list_covers_build_definitions_and_coredata() {
            let fixture = Fixture::new();
            fixture.write("meson_options.txt", "option('x', type : 'string')\n");
            fixture.write("meson.build", "project('demo')\nsubdir('lib')\n");
            fixture.write("lib/meson.build", "v = 1\n");
            let manifest = lower_fixture(&fixture);
            assert!(manifest
                .regen_files
                .contains(&"meson.build".to_string()));
            assert!(manifest
                .regen_files
                .contains(&"lib/meson.build".to_string()));
            assert!(manifest
                .regen_files
                .contains(&"meson_options.txt".to_string()));
            assert!(manifest
                .regen_files
                .contains(&"meson-private/coredata.dat".to_string()));
        }
    }
}
