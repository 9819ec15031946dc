/*!
# The configure environment

Owns the directory layout of a build tree, the persisted coredata, the
machine (cross/native) files, platform artifact naming and toolchain
detection. Created once per configure and threaded through evaluation by
reference.

*/
pub(crate) mod error;
mod detect;
pub mod machine_file;

pub use detect::get_args_from_envvars;
pub use error::EnvError;
pub use machine_file::{CrossBuildInfo, MachineFile, MachineValue};

use crate::compilers::checks::CheckRunner;
use crate::coredata::CoreData;
use crate::diagnostics::DiagResult;
use crate::options::{register_builtin_options, OptionArg, OptionKey, OptionValue};
use error::Result;
use snafu::ResultExt;
use std::fs;
use std::path::{Path, PathBuf};

pub const BUILD_FILENAME: &str = "meson.build";
pub const OPTIONS_FILENAME: &str = "meson_options.txt";
pub const PRIVATE_DIR: &str = "meson-private";
pub const LOG_DIR: &str = "meson-logs";
pub const COREDATA_FILE: &str = "coredata.dat";

/// The command-line surface that shapes an environment.
#[derive(Debug, Default, Clone)]
pub struct SetupRequest {
    pub prefix: Option<String>,
    pub libdir: Option<String>,
    pub backend: Option<String>,
    pub buildtype: Option<String>,
    pub warnlevel: Option<String>,
    pub werror: bool,
    pub cross_file: Option<PathBuf>,
    pub native_file: Option<PathBuf>,
    pub defines: Vec<String>,
    pub augments: Vec<String>,
    pub undefines: Vec<String>,
}

/// Platform-dependent artifact naming, derived from the host machine
/// when cross building and from the build machine otherwise.
#[derive(Debug, Clone)]
pub struct ArtifactNaming {
    pub exe_suffix: &'static str,
    pub shared_lib_prefix: &'static str,
    pub shared_lib_suffix: &'static str,
    pub static_lib_prefix: &'static str,
    pub static_lib_suffix: &'static str,
    pub object_suffix: &'static str,
    pub import_lib_suffix: &'static str,
}

impl ArtifactNaming {
    fn for_system(system: &str) -> Self {
        if system == "windows" {
            ArtifactNaming {
                exe_suffix: "exe",
                shared_lib_prefix: "",
                shared_lib_suffix: "dll",
                static_lib_prefix: "",
                static_lib_suffix: "lib",
                object_suffix: "obj",
                import_lib_suffix: "lib",
            }
        } else {
            let shared_lib_suffix = if system == "darwin" { "dylib" } else { "so" };
            ArtifactNaming {
                exe_suffix: "",
                shared_lib_prefix: "lib",
                shared_lib_suffix,
                static_lib_prefix: "lib",
                static_lib_suffix: "a",
                object_suffix: "o",
                import_lib_suffix: shared_lib_suffix,
            }
        }
    }
}

/// What a machine object reports to build scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInfo {
    pub system: String,
    pub cpu: String,
    pub endian: String,
}

/// The machine the configure run itself executes on, canonicalized the
/// way scripts expect: `x86`-family cpus collapse to `x86`, arm variants
/// to `arm`.
pub fn build_machine_info() -> MachineInfo {
    let system = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let cpu = std::env::consts::ARCH;
    let cpu = if cpu == "x86" || (cpu.starts_with('i') && cpu.ends_with("86")) {
        "x86"
    } else if cpu.starts_with("arm") {
        "arm"
    } else {
        cpu
    };
    let endian = if cfg!(target_endian = "big") {
        "big"
    } else {
        "little"
    };
    MachineInfo {
        system: system.to_string(),
        cpu: cpu.to_string(),
        endian: endian.to_string(),
    }
}

#[derive(Debug)]
pub struct Environment {
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub log_dir: PathBuf,
    pub coredata: CoreData,
    pub cross_info: Option<CrossBuildInfo>,
    pub native_file: Option<MachineFile>,
    /// Raw `-Dkey=value` entries, consumed per scope by the option-file
    /// interpreters.
    pub cmd_line_options: Vec<String>,
    pub naming: ArtifactNaming,
    /// Compiler feature checks share one cache per configure.
    pub checks: CheckRunner,
}

impl Environment {
    pub fn new(
        source_dir: &Path,
        build_dir: &Path,
        request: &SetupRequest,
    ) -> DiagResult<Environment> {
        let scratch_dir = build_dir.join(PRIVATE_DIR);
        let log_dir = build_dir.join(LOG_DIR);
        for dir in [&scratch_dir, &log_dir] {
            fs::create_dir_all(dir).context(error::DirCreationSnafu { path: dir.clone() })?;
        }

        let coredata_path = scratch_dir.join(COREDATA_FILE);
        let mut coredata = if coredata_path.is_file() {
            CoreData::load(&coredata_path)?
        } else {
            CoreData::new(request.cross_file.is_some(), request.cross_file.clone())
        };
        if coredata.options.is_empty() {
            register_builtin_options(&mut coredata.options, request.prefix.as_deref())?;
        } else if let Some(prefix) = &request.prefix {
            // Reconfigure with a new prefix; directory defaults were
            // fixed at first configure.
            coredata
                .options
                .set_value(&OptionKey::new("prefix"), &OptionArg::Str(prefix.clone()))?;
        }

        // Simple command-line options map onto builtin option values.
        let direct: [(&str, Option<String>); 4] = [
            ("libdir", request.libdir.clone()),
            ("backend", request.backend.clone()),
            ("buildtype", request.buildtype.clone()),
            ("warning_level", request.warnlevel.clone()),
        ];
        for (name, value) in direct {
            if let Some(value) = value {
                coredata
                    .options
                    .set_value(&OptionKey::new(name), &OptionArg::Str(value))?;
            }
        }
        if request.werror {
            coredata
                .options
                .set_value(&OptionKey::new("werror"), &OptionArg::Bool(true))?;
        }
        coredata.options.set_from_configure_command(
            &request.defines,
            &request.augments,
            &request.undefines,
        )?;

        let cross_file = request.cross_file.clone().or(coredata.cross_file.clone());
        let cross_info = match &cross_file {
            Some(path) => Some(CrossBuildInfo::new(path)?),
            None => None,
        };
        coredata.cross_file = cross_file;
        let native_file = match &request.native_file {
            Some(path) => Some(MachineFile::parse(path)?),
            None => None,
        };

        let host_system = match &cross_info {
            Some(info) if info.has_host() => info.machine_entry("host_machine", "system")?,
            _ => build_machine_info().system,
        };
        let naming = ArtifactNaming::for_system(&host_system);

        Ok(Environment {
            source_dir: source_dir.to_path_buf(),
            build_dir: build_dir.to_path_buf(),
            checks: CheckRunner::new(scratch_dir.clone()),
            scratch_dir,
            log_dir,
            coredata,
            cross_info,
            native_file,
            cmd_line_options: request.defines.clone(),
            naming,
        })
    }

    pub fn is_cross_build(&self) -> bool {
        self.cross_info.is_some()
    }

    pub fn host_machine_info(&self) -> Result<MachineInfo> {
        match &self.cross_info {
            Some(info) if info.has_host() => Ok(MachineInfo {
                system: info.machine_entry("host_machine", "system")?,
                cpu: info.machine_entry("host_machine", "cpu")?,
                endian: info.machine_entry("host_machine", "endian")?,
            }),
            _ => Ok(build_machine_info()),
        }
    }

    pub fn target_machine_info(&self) -> Result<MachineInfo> {
        match &self.cross_info {
            Some(info) if info.has_target() => Ok(MachineInfo {
                system: info.machine_entry("target_machine", "system")?,
                cpu: info.machine_entry("target_machine", "cpu")?,
                endian: info.machine_entry("target_machine", "endian")?,
            }),
            _ => self.host_machine_info(),
        }
    }

    /// `true` when cross built targets can be executed, either natively
    /// or through a configured wrapper.
    pub fn has_exe_wrapper(&self) -> bool {
        match &self.cross_info {
            Some(info) => info.binary("exe_wrapper").is_some(),
            None => true,
        }
    }

    pub fn coredata_path(&self) -> PathBuf {
        self.scratch_dir.join(COREDATA_FILE)
    }

    pub fn save_coredata(&self) -> Result<()> {
        self.coredata.save(&self.coredata_path())
    }

    pub fn get_option(
        &self,
        name: &str,
    ) -> std::result::Result<OptionValue, crate::options::OptionError> {
        self.coredata.options.get_value_for(name, None)
    }

    /// Search the given directories (or the platform defaults) for a
    /// library, preferring the shared suffix.
    pub fn find_library(&self, libname: &str, dirs: Option<&[PathBuf]>) -> Option<PathBuf> {
        let default_dirs = default_library_dirs();
        let dirs = match dirs {
            Some(d) => d,
            None => &default_dirs,
        };
        let suffixes = [self.naming.shared_lib_suffix, self.naming.static_lib_suffix];
        for dir in dirs {
            for suffix in suffixes {
                let trial = dir.join(format!(
                    "{}{}.{}",
                    self.naming.shared_lib_prefix, libname, suffix
                ));
                if trial.is_file() {
                    return Some(trial);
                }
            }
        }
        None
    }
}

fn default_library_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/usr/local/lib"),
        PathBuf::from("/usr/lib"),
        PathBuf::from("/lib"),
    ];
    for extra in ["/usr/lib64", "/lib64"] {
        let path = PathBuf::from(extra);
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    fn setup_dirs() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        let build = dir.path().join("build");
        fs::create_dir_all(&source).unwrap();
        (dir, source, build)
    }

    #[test]
    fn creates_private_and_log_dirs() {
        let (_guard, source, build) = setup_dirs();
        let env = Environment::new(&source, &build, &SetupRequest::default()).unwrap();
        assert!(env.scratch_dir.is_dir());
        assert!(env.log_dir.is_dir());
        // Idempotent on reconfigure.
        let env = Environment::new(&source, &build, &SetupRequest::default()).unwrap();
        assert!(env.scratch_dir.ends_with(PRIVATE_DIR));
    }

    #[test]
    fn request_options_apply_to_the_store() {
        let (_guard, source, build) = setup_dirs();
        let request = SetupRequest {
            prefix: Some("/usr".to_string()),
            libdir: Some("lib64".to_string()),
            backend: Some("none".to_string()),
            werror: true,
            ..SetupRequest::default()
        };
        let env = Environment::new(&source, &build, &request).unwrap();
        assert_eq!(
            env.get_option("libdir").unwrap(),
            OptionValue::Str("lib64".to_string())
        );
        assert_eq!(
            env.get_option("backend").unwrap(),
            OptionValue::Str("none".to_string())
        );
        assert_eq!(env.get_option("werror").unwrap(), OptionValue::Bool(true));
        assert_eq!(
            env.get_option("sysconfdir").unwrap(),
            OptionValue::Str("/etc".to_string())
        );
    }

    #[test]
    fn coredata_persists_between_configures() {
        let (_guard, source, build) = setup_dirs();
        let request = SetupRequest {
            defines: vec!["buildtype=release".to_string()],
            ..SetupRequest::default()
        };
        let env = Environment::new(&source, &build, &request).unwrap();
        env.save_coredata().unwrap();
        let env = Environment::new(&source, &build, &SetupRequest::default()).unwrap();
        assert_eq!(
            env.get_option("buildtype").unwrap(),
            OptionValue::Str("release".to_string())
        );
    }

    #[test]
    fn naming_follows_host_system() {
        let windows = ArtifactNaming::for_system("windows");
        assert_eq!(windows.exe_suffix, "exe");
        assert_eq!(windows.shared_lib_suffix, "dll");
        assert_eq!(windows.static_lib_prefix, "");
        let linux = ArtifactNaming::for_system("linux");
        assert_eq!(linux.exe_suffix, "");
        assert_eq!(linux.shared_lib_suffix, "so");
        assert_eq!(linux.static_lib_prefix, "lib");
        let darwin = ArtifactNaming::for_system("darwin");
        assert_eq!(darwin.shared_lib_suffix, "dylib");
        assert_eq!(darwin.import_lib_suffix, "dylib");
    }

    #[test]
    fn build_machine_info_is_canonical() {
        let info = build_machine_info();
        assert!(!info.system.is_empty());
        assert!(info.endian == "little" || info.endian == "big");
        assert_ne!(info.system, "macos");
    }
}
