/*!
Compiler and static linker discovery.

Candidates come from, in order, an environment variable override, the
cross file's `[binaries]` section (for cross probes), the native file's
`[binaries]` section, and the built-in defaults. The first candidate
whose version probe matches a known signature wins.

*/
use super::error::{self, Result};
use super::Environment;
use crate::compilers::{Compiler, Language, StaticLinker};
use duct::cmd;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

lazy_static! {
    static ref VERSION: Regex = Regex::new(r"\d+(\.\d+)+(-[a-zA-Z0-9]+)?").unwrap();
}

fn search_version(text: &str) -> String {
    VERSION
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "unknown version".to_string())
}

struct ProbeOutput {
    stdout: String,
    stderr: String,
    success: bool,
    returncode: i32,
}

/// Run `argv + [arg]` and capture both streams. A missing executable
/// returns `None` so the caller can try the next candidate.
fn probe(argv: &[String], arg: &str) -> Option<ProbeOutput> {
    let exe = argv.first()?;
    let mut args: Vec<String> = argv[1..].to_vec();
    args.push(arg.to_string());
    let output = cmd(exe, args)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .ok()?;
    Some(ProbeOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
        returncode: output.status.code().unwrap_or(-1),
    })
}

fn is_cl(argv: &[String]) -> bool {
    argv.first()
        .map(|exe| {
            let base = exe.rsplit(['/', '\\']).next().unwrap_or(exe).to_lowercase();
            base == "cl" || base == "cl.exe"
        })
        .unwrap_or(false)
}

fn env_override(lang: Language) -> Option<&'static str> {
    match lang {
        Language::C => Some("CC"),
        Language::Cpp => Some("CXX"),
        Language::ObjC => Some("OBJCC"),
        Language::ObjCpp => Some("OBJCXX"),
        Language::Fortran => Some("FC"),
        _ => None,
    }
}

fn default_candidates(lang: Language) -> Vec<Vec<String>> {
    let names: &[&str] = match lang {
        Language::C => {
            if cfg!(windows) {
                &["cl", "cc", "gcc"]
            } else {
                &["cc", "gcc", "clang"]
            }
        }
        Language::Cpp => {
            if cfg!(windows) {
                &["cl", "c++"]
            } else {
                &["c++", "g++", "clang++"]
            }
        }
        Language::ObjC => &["cc"],
        Language::ObjCpp => &["c++"],
        Language::Fortran => &["gfortran", "g95", "f95", "f90", "f77"],
        Language::Java => &["javac"],
        Language::Cs => &["mcs"],
        Language::Vala => &["valac"],
        Language::Rust => &["rustc"],
    };
    names.iter().map(|n| vec![n.to_string()]).collect()
}

/// Compile and link flags harvested from the conventional environment
/// variables for a language.
pub fn get_args_from_envvars(lang: Language) -> (Vec<String>, Vec<String>) {
    let split = |var: &str| -> Vec<String> {
        std::env::var(var)
            .unwrap_or_default()
            .split_whitespace()
            .map(|s| s.to_string())
            .collect()
    };
    let (compile_vars, link_vars) = lang.flag_env_vars();
    let compile_args: Vec<String> = compile_vars.iter().flat_map(|v| split(v)).collect();
    let link_args: Vec<String> = link_vars.iter().flat_map(|v| split(v)).collect();
    (compile_args, link_args)
}

impl Environment {
    /// Prepend ccache to native compiler invocations when it is present
    /// and the candidate was not explicitly overridden.
    pub fn detect_ccache() -> Vec<String> {
        match which::which("ccache") {
            Ok(_) => vec!["ccache".to_string()],
            Err(_) => Vec::new(),
        }
    }

    pub fn detect_compiler(&self, lang: Language, want_cross: bool) -> Result<Compiler> {
        let mut ccache = Vec::new();
        let mut exe_wrap = None;
        let is_cross;
        let candidates: Vec<Vec<String>>;

        if self.is_cross_build() && want_cross {
            let info = self.cross_info.as_ref().expect("cross build has cross info");
            let binary = info.binary(lang.name()).ok_or_else(|| {
                error::UnknownCompilerSnafu {
                    tried: format!("<no {} entry in cross file binaries>", lang.name()),
                }
                .build()
            })?;
            candidates = vec![binary];
            is_cross = true;
            exe_wrap = info.binary("exe_wrapper").and_then(|w| w.into_iter().next());
        } else if let Some(var) = env_override(lang) {
            match std::env::var(var) {
                Ok(value) if !value.trim().is_empty() => {
                    candidates = vec![value.split_whitespace().map(|s| s.to_string()).collect()];
                    is_cross = false;
                }
                _ => {
                    candidates = self.native_candidates(lang);
                    ccache = Self::detect_ccache();
                    is_cross = false;
                }
            }
        } else {
            candidates = self.native_candidates(lang);
            ccache = Self::detect_ccache();
            is_cross = false;
        }

        let mut tried = Vec::new();
        for candidate in &candidates {
            tried.push(candidate.join(" "));
            if let Some(compiler) =
                classify(lang, candidate, &ccache, is_cross, exe_wrap.clone())
            {
                debug!(
                    "{} compiler probe matched: {}",
                    lang.name(),
                    compiler.banner()
                );
                return Ok(compiler);
            }
        }
        error::UnknownCompilerSnafu {
            tried: tried.join(", "),
        }
        .fail()
    }

    fn native_candidates(&self, lang: Language) -> Vec<Vec<String>> {
        if let Some(file) = &self.native_file {
            if let Some(binary) = file
                .lookup("binaries", lang.name())
                .and_then(|v| v.as_command())
            {
                return vec![binary];
            }
        }
        default_candidates(lang)
    }

    pub fn detect_static_linker(&self, compiler: &Compiler) -> Result<StaticLinker> {
        let linker: Vec<String> = if compiler.is_cross {
            match self.cross_info.as_ref().and_then(|i| i.binary("ar")) {
                Some(binary) => binary,
                None => vec!["ar".to_string()],
            }
        } else if let Ok(value) = std::env::var("AR") {
            value.split_whitespace().map(|s| s.to_string()).collect()
        } else if compiler.is_msvc_like() {
            vec!["lib".to_string()]
        } else {
            vec!["ar".to_string()]
        };
        let arg = if linker
            .first()
            .map(|exe| {
                let base = exe.rsplit(['/', '\\']).next().unwrap_or(exe).to_lowercase();
                base == "lib" || base == "lib.exe"
            })
            .unwrap_or(false)
        {
            "/?"
        } else {
            "--version"
        };
        let output = probe(&linker, arg).ok_or_else(|| {
            error::StaticLinkerExecutionSnafu {
                linker: linker.join(" "),
            }
            .build()
        })?;
        if output.stdout.contains("/OUT:") || output.stderr.contains("/OUT:") {
            return Ok(StaticLinker {
                id: "lib".to_string(),
                exelist: linker,
            });
        }
        if output.success || (output.returncode == 1 && output.stderr.starts_with("usage")) {
            return Ok(StaticLinker {
                id: "ar".to_string(),
                exelist: linker,
            });
        }
        error::UnknownStaticLinkerSnafu {
            linker: linker.join(" "),
        }
        .fail()
    }
}

fn classify(
    lang: Language,
    candidate: &[String],
    ccache: &[String],
    is_cross: bool,
    exe_wrap: Option<String>,
) -> Option<Compiler> {
    let with_ccache = |candidate: &[String]| {
        let mut exelist = ccache.to_vec();
        exelist.extend(candidate.iter().cloned());
        exelist
    };
    match lang {
        Language::C | Language::Cpp | Language::ObjC | Language::ObjCpp => {
            let arg = if is_cl(candidate) { "/?" } else { "--version" };
            let out = probe(candidate, arg)?;
            let version = search_version(&out.stdout);
            if out.stdout.contains("Free Software Foundation") {
                return Some(Compiler::new(
                    "gcc",
                    lang,
                    version,
                    with_ccache(candidate),
                    is_cross,
                    exe_wrap,
                ));
            }
            if out.stdout.contains("clang") || out.stdout.starts_with("Apple LLVM") {
                return Some(Compiler::new(
                    "clang",
                    lang,
                    version,
                    with_ccache(candidate),
                    is_cross,
                    exe_wrap,
                ));
            }
            if out.stdout.contains("Microsoft") || out.stderr.contains("Microsoft") {
                // Visual Studio prints its version to stderr.
                let version = search_version(&out.stderr);
                return Some(Compiler::new(
                    "msvc",
                    lang,
                    version,
                    candidate.to_vec(),
                    is_cross,
                    exe_wrap,
                ));
            }
            None
        }
        Language::Fortran => {
            for arg in ["--version", "-V"] {
                let Some(out) = probe(candidate, arg) else {
                    continue;
                };
                let version = search_version(&out.stdout);
                if out.stdout.contains("GNU Fortran") {
                    return Some(Compiler::new(
                        "gfortran",
                        lang,
                        version,
                        candidate.to_vec(),
                        is_cross,
                        exe_wrap,
                    ));
                }
                if out.stdout.contains("G95") {
                    return Some(Compiler::new(
                        "g95",
                        lang,
                        version,
                        candidate.to_vec(),
                        is_cross,
                        exe_wrap,
                    ));
                }
                if out.stdout.contains("ifort (IFORT)") {
                    return Some(Compiler::new(
                        "intel",
                        lang,
                        version,
                        candidate.to_vec(),
                        is_cross,
                        exe_wrap,
                    ));
                }
                if out.stderr.contains("Sun Fortran") {
                    let version = search_version(&out.stderr);
                    return Some(Compiler::new(
                        "sun",
                        lang,
                        version,
                        candidate.to_vec(),
                        is_cross,
                        exe_wrap,
                    ));
                }
            }
            None
        }
        Language::Java => {
            let out = probe(candidate, "-version")?;
            // javac prints its version to stderr.
            if out.stderr.contains("javac") || out.stdout.contains("javac") {
                let version = if out.stderr.contains("javac") {
                    search_version(&out.stderr)
                } else {
                    search_version(&out.stdout)
                };
                return Some(Compiler::new(
                    "javac",
                    lang,
                    version,
                    candidate.to_vec(),
                    is_cross,
                    exe_wrap,
                ));
            }
            None
        }
        Language::Cs => {
            let out = probe(candidate, "--version")?;
            if out.stdout.contains("Mono") {
                return Some(Compiler::new(
                    "mono",
                    lang,
                    search_version(&out.stdout),
                    candidate.to_vec(),
                    is_cross,
                    exe_wrap,
                ));
            }
            None
        }
        Language::Vala => {
            let out = probe(candidate, "--version")?;
            if out.stdout.contains("Vala") {
                return Some(Compiler::new(
                    "valac",
                    lang,
                    search_version(&out.stdout),
                    candidate.to_vec(),
                    is_cross,
                    exe_wrap,
                ));
            }
            None
        }
        Language::Rust => {
            let out = probe(candidate, "--version")?;
            if out.stdout.contains("rustc") {
                return Some(Compiler::new(
                    "rustc",
                    lang,
                    search_version(&out.stdout),
                    candidate.to_vec(),
                    is_cross,
                    exe_wrap,
                ));
            }
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn version_regex_matches_common_banners() {
        assert_eq!(search_version("cc (GCC) 12.2.0"), "12.2.0");
        assert_eq!(
            search_version("Apple LLVM version 10.0.1 (clang-1001.0.46.4)"),
            "10.0.1"
        );
        assert_eq!(search_version("rustc 1.74.0-nightly"), "1.74.0-nightly");
        assert_eq!(search_version("no digits here"), "unknown version");
    }

    #[test]
    fn cl_detection_is_basename_and_case_insensitive() {
        assert!(is_cl(&["cl".to_string()]));
        assert!(is_cl(&["C:\\tools\\CL.EXE".to_string()]));
        assert!(!is_cl(&["clang".to_string()]));
    }

    #[test]
    fn env_flags_split_on_whitespace() {
        // Serialize access to the process environment through a known
        // unique variable.
        std::env::set_var("FFLAGS", "-O2  -g");
        std::env::set_var("LDFLAGS", "-L/opt/lib");
        let (compile, link) = get_args_from_envvars(Language::Fortran);
        assert_eq!(compile, vec!["-O2", "-g"]);
        assert_eq!(link, vec!["-O2", "-g", "-L/opt/lib"]);
        std::env::remove_var("FFLAGS");
        std::env::remove_var("LDFLAGS");
    }

    #[test]
    fn default_candidates_cover_every_language() {
        for lang in [
            Language::C,
            Language::Cpp,
            Language::ObjC,
            Language::ObjCpp,
            Language::Java,
            Language::Cs,
            Language::Vala,
            Language::Rust,
            Language::Fortran,
        ] {
            assert!(!default_candidates(lang).is_empty());
        }
    }
}
