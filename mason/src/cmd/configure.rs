use crate::backend;
use crate::build::Build;
use crate::diagnostics::{DiagResult, Diagnostic};
use crate::env::{Environment, SetupRequest, BUILD_FILENAME};
use crate::interp::Interpreter;
use crate::warnings;
use clap::Parser;
use log::info;
use std::fs;
use std::path::PathBuf;

/// `configure <sourcedir> <builddir>` plus the option surface.
#[derive(Debug, Parser)]
pub struct Configure {
    /// Directory containing the top level meson.build.
    pub sourcedir: PathBuf,

    /// Directory to configure into. Created if missing.
    pub builddir: PathBuf,

    /// Installation prefix.
    #[clap(long)]
    pub prefix: Option<String>,

    /// Library directory, relative to the prefix.
    #[clap(long)]
    pub libdir: Option<String>,

    /// Backend to generate for.
    #[clap(long)]
    pub backend: Option<String>,

    /// Build type.
    #[clap(long)]
    pub buildtype: Option<String>,

    /// Compiler warning level.
    #[clap(long = "warnlevel")]
    pub warnlevel: Option<String>,

    /// Treat warnings as errors at the end of configure.
    #[clap(long)]
    pub werror: bool,

    /// Cross compilation definition file.
    #[clap(long = "cross-file")]
    pub cross_file: Option<PathBuf>,

    /// Native toolchain override file.
    #[clap(long = "native-file")]
    pub native_file: Option<PathBuf>,

    /// Set an option value.
    #[clap(short = 'D', value_name = "option=value", action = clap::ArgAction::Append)]
    pub defines: Vec<String>,

    /// Add a subproject-scoped augment on top of a base option value.
    #[clap(short = 'A', value_name = "subproject:option=value", action = clap::ArgAction::Append)]
    pub augments: Vec<String>,

    /// Remove a previously set augment.
    #[clap(short = 'U', value_name = "subproject:option", action = clap::ArgAction::Append)]
    pub undefines: Vec<String>,
}

impl Configure {
    pub fn run(&self) -> DiagResult<()> {
        warnings::reset();
        let sourcedir = self.sourcedir.canonicalize().map_err(|e| {
            Diagnostic::invalid_arguments(format!(
                "Source directory {} is not usable: {}",
                self.sourcedir.display(),
                e
            ))
        })?;
        if !sourcedir.join(BUILD_FILENAME).is_file() {
            return Err(Diagnostic::invalid_arguments(format!(
                "Source directory {} does not contain a {} file.",
                sourcedir.display(),
                BUILD_FILENAME
            )));
        }
        fs::create_dir_all(&self.builddir).map_err(|e| {
            Diagnostic::environment(format!(
                "Could not create build directory {}: {}",
                self.builddir.display(),
                e
            ))
        })?;
        let builddir = self.builddir.canonicalize().map_err(|e| {
            Diagnostic::environment(format!(
                "Build directory {} is not usable: {}",
                self.builddir.display(),
                e
            ))
        })?;
        if sourcedir == builddir {
            return Err(Diagnostic::invalid_arguments(
                "Source and build directories must not be the same.",
            ));
        }

        let request = SetupRequest {
            prefix: self.prefix.clone(),
            libdir: self.libdir.clone(),
            backend: self.backend.clone(),
            buildtype: self.buildtype.clone(),
            warnlevel: self.warnlevel.clone(),
            werror: self.werror,
            cross_file: self.cross_file.clone(),
            native_file: self.native_file.clone(),
            defines: self.defines.clone(),
            augments: self.augments.clone(),
            undefines: self.undefines.clone(),
        };
        let mut env = Environment::new(&sourcedir, &builddir, &request)?;
        let mut build = Build::new();
        let build_def_files = {
            let mut interp = Interpreter::new(&mut env, &mut build, "", "", "subprojects")?;
            interp.run()?;
            std::mem::take(&mut interp.build_def_files)
        };

        let backend_name = env
            .get_option("backend")
            .map_err(Diagnostic::from)?
            .as_str()
            .unwrap_or("none")
            .to_string();
        let manifest = backend::lower(&build, &env, &build_def_files)?;
        backend::backend_for(&backend_name)?.generate(&manifest, &env)?;

        let werror = env
            .get_option("werror")
            .map_err(Diagnostic::from)?
            .as_bool()
            .unwrap_or(false);
        if werror && warnings::count() > 0 {
            return Err(Diagnostic::option(format!(
                "Configure generated {} warning(s) and --werror is set.",
                warnings::count()
            )));
        }

        // Persisted state is written only on success so a failed run
        // never leaves a half-configured tree behind.
        env.save_coredata().map_err(Diagnostic::from)?;
        info!(
            "Project \"{}\" configured into {}",
            build.project_name,
            builddir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // The warning counter is process-global and Configure::run resets
    // it; serialize driver tests so they cannot clobber each other.
    static DRIVER_LOCK: Mutex<()> = Mutex::new(());

    fn configure_args(source: &std::path::Path, build: &std::path::Path) -> Configure {
        Configure {
            sourcedir: source.to_path_buf(),
            builddir: build.to_path_buf(),
            prefix: None,
            libdir: None,
            backend: None,
            buildtype: None,
            warnlevel: None,
            werror: false,
            cross_file: None,
            native_file: None,
            defines: Vec::new(),
            augments: Vec::new(),
            undefines: Vec::new(),
        }
    }

    fn project_tree() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        let build = dir.path().join("build");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("meson.build"), "project('demo')\n").unwrap();
        (dir, source, build)
    }

    #[test]
    fn configure_writes_manifest_artifacts_and_coredata() {
        let _guard = DRIVER_LOCK.lock().unwrap();
        let (_dir, source, build) = project_tree();
        configure_args(&source, &build).run().unwrap();
        for artifact in [
            "coredata.dat",
            "install.dat",
            "meson_test_setup.dat",
            "meson_benchmark_setup.dat",
            "regeninfo.dump",
        ] {
            assert!(
                build.join("meson-private").join(artifact).is_file(),
                "missing {}",
                artifact
            );
        }
        // Reconfiguring against the persisted state succeeds.
        configure_args(&source, &build).run().unwrap();
    }

    #[test]
    fn source_and_build_must_differ() {
        let _guard = DRIVER_LOCK.lock().unwrap();
        let (_dir, source, _) = project_tree();
        let err = configure_args(&source, &source).run().unwrap_err();
        assert!(err.to_string().contains("must not be the same"), "{}", err);
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn missing_build_description_is_a_configuration_error() {
        let _guard = DRIVER_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("empty");
        fs::create_dir_all(&source).unwrap();
        let err = configure_args(&source, &dir.path().join("build"))
            .run()
            .unwrap_err();
        assert!(err.to_string().contains("meson.build"), "{}", err);
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn werror_escalates_configure_warnings() {
        let _guard = DRIVER_LOCK.lock().unwrap();
        let (_dir, source, build) = project_tree();
        fs::write(
            source.join("meson.build"),
            "project('demo')\nwarning('this tree is haunted')\n",
        )
        .unwrap();
        let mut args = configure_args(&source, &build);
        args.werror = true;
        let err = args.run().unwrap_err();
        assert!(err.to_string().contains("warning"), "{}", err);
        // Failure means no persisted state.
        assert!(!build.join("meson-private/coredata.dat").exists());
        // Without --werror the same tree configures.
        configure_args(&source, &build).run().unwrap();
    }

    #[test]
    fn defines_flow_through_to_options() {
        let _guard = DRIVER_LOCK.lock().unwrap();
        let (_dir, source, build) = project_tree();
        let mut args = configure_args(&source, &build);
        args.defines = vec!["buildtype=release".to_string()];
        args.backend = Some("none".to_string());
        args.run().unwrap();
        let payload =
            fs::read_to_string(build.join("meson-private/coredata.dat")).unwrap();
        assert!(payload.contains("release"));
    }
}
