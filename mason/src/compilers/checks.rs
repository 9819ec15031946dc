/*!
The compiler check protocol: compiles/links/runs probes plus the derived
feature checks. Every check builds a deterministic snippet in its own
scratch subdirectory and is evaluated at most once per configure for a
given `(compiler id, language, code hash, flags hash)` tuple.

*/
use crate::compilers::{Compiler, Language};
use crate::diagnostics::{DiagResult, Diagnostic};
use duct::cmd;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CheckKey {
    compiler_id: String,
    language: Language,
    code_hash: String,
    flags_hash: String,
}

#[derive(Debug, Clone)]
pub struct CheckRunResult {
    pub compiled: bool,
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
enum CheckOutcome {
    Compiled(bool),
    Ran(CheckRunResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckMode {
    Compile,
    Link,
    Run,
}

impl CheckMode {
    fn tag(self) -> &'static str {
        match self {
            CheckMode::Compile => "compile",
            CheckMode::Link => "link",
            CheckMode::Run => "run",
        }
    }
}

#[derive(Debug)]
pub struct CheckRunner {
    scratch_dir: PathBuf,
    counter: u64,
    cache: HashMap<CheckKey, CheckOutcome>,
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

impl CheckRunner {
    pub fn new(scratch_dir: PathBuf) -> Self {
        CheckRunner {
            scratch_dir,
            counter: 0,
            cache: HashMap::new(),
        }
    }

    fn key(&self, compiler: &Compiler, code: &str, args: &[String], mode: CheckMode) -> CheckKey {
        let mut flags = args.join("\x1f");
        flags.push('\x1f');
        flags.push_str(mode.tag());
        CheckKey {
            compiler_id: compiler.id.clone(),
            language: compiler.language,
            code_hash: sha256_hex(code.as_bytes()),
            flags_hash: sha256_hex(flags.as_bytes()),
        }
    }

    /// Compile `code` with the given extra arguments, optionally link and
    /// run it. Results are served from the per-configure cache when the
    /// same tuple comes around again.
    fn evaluate(
        &mut self,
        compiler: &Compiler,
        code: &str,
        extra_args: &[String],
        mode: CheckMode,
    ) -> DiagResult<CheckOutcome> {
        let key = self.key(compiler, code, extra_args, mode);
        if let Some(outcome) = self.cache.get(&key) {
            return Ok(outcome.clone());
        }

        self.counter += 1;
        let check_dir = self.scratch_dir.join(format!("check-{}", self.counter));
        fs::create_dir_all(&check_dir).map_err(|e| {
            Diagnostic::environment(format!(
                "Could not create check directory {}: {}",
                check_dir.display(),
                e
            ))
        })?;
        let source = check_dir.join(format!("testfile.{}", compiler.language.snippet_suffix()));
        fs::write(&source, code).map_err(|e| {
            Diagnostic::environment(format!(
                "Could not write check source {}: {}",
                source.display(),
                e
            ))
        })?;

        // The output name carries the exe suffix on every platform for
        // simplicity; only the compiler cares about the spelling.
        let exe_name = "output.exe";
        let obj_name = "output.o";
        let mut args: Vec<String> = compiler.exelist[1..].to_vec();
        args.push(source.to_string_lossy().into_owned());
        match mode {
            CheckMode::Compile => {
                args.extend(compiler.compile_only_args());
                args.extend(compiler.object_output_args(obj_name));
            }
            CheckMode::Link | CheckMode::Run => {
                args.extend(compiler.output_args(exe_name));
            }
        }
        args.extend(extra_args.iter().cloned());

        let output = cmd(&compiler.exelist[0], &args)
            .dir(&check_dir)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|e| {
                Diagnostic::environment(format!(
                    "Could not invoke compiler {}: {}",
                    compiler.exelist.join(" "),
                    e
                ))
            })?;
        let compiled = output.status.success();

        let outcome = match mode {
            CheckMode::Compile | CheckMode::Link => CheckOutcome::Compiled(compiled),
            CheckMode::Run => {
                if !compiled {
                    CheckOutcome::Ran(CheckRunResult {
                        compiled: false,
                        returncode: -1,
                        stdout: String::new(),
                        stderr: String::new(),
                    })
                } else {
                    let exe_path = check_dir.join(exe_name);
                    let run_out = match &compiler.exe_wrapper {
                        Some(wrapper) => cmd(
                            wrapper,
                            vec![exe_path.to_string_lossy().into_owned()],
                        ),
                        None => cmd(exe_path.to_string_lossy().into_owned(), Vec::<String>::new()),
                    }
                    .dir(&check_dir)
                    .stdout_capture()
                    .stderr_capture()
                    .unchecked()
                    .run()
                    .map_err(|e| {
                        Diagnostic::environment(format!(
                            "Could not run check executable: {}",
                            e
                        ))
                    })?;
                    CheckOutcome::Ran(CheckRunResult {
                        compiled: true,
                        returncode: run_out.status.code().unwrap_or(-1),
                        stdout: String::from_utf8_lossy(&run_out.stdout)
                            .replace("\r\n", "\n"),
                        stderr: String::from_utf8_lossy(&run_out.stderr)
                            .replace("\r\n", "\n"),
                    })
                }
            }
        };
        self.cache.insert(key, outcome.clone());
        Ok(outcome)
    }

    pub fn compiles(
        &mut self,
        compiler: &Compiler,
        code: &str,
        extra_args: &[String],
    ) -> DiagResult<bool> {
        match self.evaluate(compiler, code, extra_args, CheckMode::Compile)? {
            CheckOutcome::Compiled(ok) => Ok(ok),
            CheckOutcome::Ran(_) => Err(Diagnostic::internal("compile check returned run data")),
        }
    }

    pub fn links(
        &mut self,
        compiler: &Compiler,
        code: &str,
        extra_args: &[String],
    ) -> DiagResult<bool> {
        match self.evaluate(compiler, code, extra_args, CheckMode::Link)? {
            CheckOutcome::Compiled(ok) => Ok(ok),
            CheckOutcome::Ran(_) => Err(Diagnostic::internal("link check returned run data")),
        }
    }

    pub fn run(
        &mut self,
        compiler: &Compiler,
        code: &str,
        extra_args: &[String],
    ) -> DiagResult<CheckRunResult> {
        match self.evaluate(compiler, code, extra_args, CheckMode::Run)? {
            CheckOutcome::Ran(result) => Ok(result),
            CheckOutcome::Compiled(_) => Err(Diagnostic::internal("run check returned no run data")),
        }
    }

    pub fn has_header(
        &mut self,
        compiler: &Compiler,
        hname: &str,
        extra_args: &[String],
    ) -> DiagResult<bool> {
        let code = format!("#include<{}>\nint main () {{ return 0; }}\n", hname);
        self.compiles(compiler, &code, extra_args)
    }

    pub fn has_function(
        &mut self,
        compiler: &Compiler,
        funcname: &str,
        prefix: &str,
        extra_args: &[String],
    ) -> DiagResult<bool> {
        let code = format!(
            "{}\nint main(int argc, char **argv) {{\n    {}();\n    return 0;\n}}\n",
            prefix, funcname
        );
        self.links(compiler, &code, extra_args)
    }

    pub fn has_member(
        &mut self,
        compiler: &Compiler,
        typename: &str,
        membername: &str,
        prefix: &str,
        extra_args: &[String],
    ) -> DiagResult<bool> {
        let code = format!(
            "{}\nvoid bar() {{\n    {} foo;\n    foo.{};\n}}\n",
            prefix, typename, membername
        );
        self.compiles(compiler, &code, extra_args)
    }

    pub fn has_type(
        &mut self,
        compiler: &Compiler,
        typename: &str,
        prefix: &str,
        extra_args: &[String],
    ) -> DiagResult<bool> {
        let code = format!(
            "{}\nvoid bar() {{\n    sizeof({});\n}}\n",
            prefix, typename
        );
        self.compiles(compiler, &code, extra_args)
    }

    /// Size of a type on the host machine, or -1 when the probe fails.
    pub fn sizeof(
        &mut self,
        compiler: &Compiler,
        typename: &str,
        prefix: &str,
        extra_args: &[String],
    ) -> DiagResult<i64> {
        let code = format!(
            "#include<stdio.h>\n{}\nint main(int argc, char **argv) {{\n    \
             printf(\"%ld\", (long)(sizeof({})));\n    return 0;\n}}\n",
            prefix, typename
        );
        let result = self.run(compiler, &code, extra_args)?;
        if !result.compiled || result.returncode != 0 {
            return Ok(-1);
        }
        Ok(result.stdout.trim().parse::<i64>().unwrap_or(-1))
    }

    pub fn alignment(
        &mut self,
        compiler: &Compiler,
        typename: &str,
        extra_args: &[String],
    ) -> DiagResult<i64> {
        let code = format!(
            "#include<stdio.h>\n#include<stddef.h>\nstruct tmp {{\n    char c;\n    {} target;\n}};\n\
             int main(int argc, char **argv) {{\n    \
             printf(\"%d\", (int)offsetof(struct tmp, target));\n    return 0;\n}}\n",
            typename
        );
        let result = self.run(compiler, &code, extra_args)?;
        if !result.compiled || result.returncode != 0 {
            return Ok(-1);
        }
        Ok(result.stdout.trim().parse::<i64>().unwrap_or(-1))
    }
}

impl Compiler {
    fn object_output_args(&self, outname: &str) -> Vec<String> {
        if self.is_msvc_like() {
            vec![format!("/Fo{}", outname)]
        } else {
            vec!["-o".to_string(), outname.to_string()]
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    fn runner() -> (TempDir, CheckRunner) {
        let dir = TempDir::new().unwrap();
        let runner = CheckRunner::new(dir.path().to_path_buf());
        (dir, runner)
    }

    fn fake_compiler() -> Compiler {
        Compiler::new("gcc", Language::C, "12.0", vec!["cc".to_string()], false, None)
    }

    #[test]
    fn cache_key_distinguishes_code_flags_and_mode() {
        let (_guard, runner) = runner();
        let compiler = fake_compiler();
        let a = runner.key(&compiler, "int x;", &[], CheckMode::Compile);
        let b = runner.key(&compiler, "int y;", &[], CheckMode::Compile);
        let c = runner.key(&compiler, "int x;", &["-O2".to_string()], CheckMode::Compile);
        let d = runner.key(&compiler, "int x;", &[], CheckMode::Link);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a, runner.key(&compiler, "int x;", &[], CheckMode::Compile));
    }

    #[test]
    fn snippets_are_deterministic() {
        // The check templates feed the cache key, so their exact text
        // matters.
        let code = format!(
            "{}\nvoid bar() {{\n    sizeof({});\n}}\n",
            "#include<stdint.h>", "uint32_t"
        );
        assert!(code.contains("sizeof(uint32_t)"));
        assert!(code.starts_with("#include<stdint.h>"));
    }

    #[test]
    fn msvc_object_output_spelling() {
        let msvc = Compiler::new("msvc", Language::C, "19.0", vec!["cl".to_string()], false, None);
        assert_eq!(msvc.object_output_args("x.obj"), vec!["/Fox.obj"]);
        let gcc = fake_compiler();
        assert_eq!(gcc.object_output_args("x.o"), vec!["-o", "x.o"]);
    }
}
