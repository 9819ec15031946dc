/*!
Test code that should only be compiled when running tests: a fixture
that stands up a source tree, runs a full configure against a fresh
build directory, and hands back the environment and build graph.

*/
use crate::build::Build;
use crate::diagnostics::DiagResult;
use crate::env::{Environment, SetupRequest};
use crate::interp::Interpreter;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub(crate) struct Fixture {
    _dir: TempDir,
    pub source: PathBuf,
    pub build_dir: PathBuf,
}

/// Build descriptions that avoid compiler detection configure with an
/// empty language list.
pub(crate) const EMPTY_PROJECT: &str = "project('test')\n";

impl Fixture {
    pub fn new() -> Fixture {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        let build_dir = dir.path().join("build");
        fs::create_dir_all(&source).unwrap();
        Fixture {
            _dir: dir,
            source,
            build_dir,
        }
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.source.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn configure(&self) -> DiagResult<(Environment, Build)> {
        self.configure_with(SetupRequest::default())
    }

    pub fn configure_with(&self, request: SetupRequest) -> DiagResult<(Environment, Build)> {
        let (env, build, _) = self.configure_full(request)?;
        Ok((env, build))
    }

    /// Like [`Fixture::configure_with`], but also returns the regen file
    /// list the root interpreter collected.
    pub fn configure_full(
        &self,
        request: SetupRequest,
    ) -> DiagResult<(Environment, Build, Vec<String>)> {
        let mut env = Environment::new(&self.source, &self.build_dir, &request)?;
        let mut build = Build::new();
        let build_def_files = {
            let mut interp = Interpreter::new(&mut env, &mut build, "", "", "subprojects")?;
            interp.run()?;
            std::mem::take(&mut interp.build_def_files)
        };
        Ok((env, build, build_def_files))
    }
}

/// A C compiler is needed for the scenarios that register languages;
/// skip them gracefully where the environment has none.
pub(crate) fn have_cc() -> bool {
    which::which("cc").is_ok() || which::which("gcc").is_ok()
}
