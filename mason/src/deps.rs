/*!
External collaborators of a build: programs looked up on the path or in
the source tree, libraries found on the linker search path, and
pkg-config dependencies. Lookup results are cached on coredata so a
reconfigure resolves identically without re-probing.

*/
use crate::common::version_compare;
use crate::coredata::DepRecord;
use crate::env::Environment;
use duct::cmd;
use log::{debug, info};
use std::path::{Path, PathBuf};

/// A program required by the build description, found or not.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalProgram {
    pub name: String,
    pub command: Option<Vec<String>>,
}

impl ExternalProgram {
    /// Look for `name` as an executable on the path, or as a script in
    /// `search_dir`.
    pub fn find(name: &str, search_dir: Option<&Path>) -> ExternalProgram {
        if let Ok(path) = which::which(name) {
            return ExternalProgram {
                name: name.to_string(),
                command: Some(vec![path.to_string_lossy().into_owned()]),
            };
        }
        if let Some(dir) = search_dir {
            let trial = dir.join(name);
            if trial.is_file() {
                return ExternalProgram {
                    name: name.to_string(),
                    command: Some(vec![trial.to_string_lossy().into_owned()]),
                };
            }
        }
        ExternalProgram {
            name: name.to_string(),
            command: None,
        }
    }

    pub fn found(&self) -> bool {
        self.command.is_some()
    }
}

/// A library found (or not) on the search path.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalLibrary {
    pub name: String,
    pub fullpath: Option<PathBuf>,
}

impl ExternalLibrary {
    pub fn found(&self) -> bool {
        self.fullpath.is_some()
    }

    pub fn link_args(&self) -> Vec<String> {
        match &self.fullpath {
            Some(path) => vec![path.to_string_lossy().into_owned()],
            None => Vec::new(),
        }
    }
}

/// A dependency identifier folds the name with the kwargs that change
/// resolution, so differently-constrained lookups cache separately.
pub fn dep_identifier(name: &str, version: Option<&str>) -> String {
    match version {
        Some(v) => format!("{} {}", name, v),
        None => name.to_string(),
    }
}

/// Resolve an external dependency through pkg-config. The result is
/// recorded whether or not it was found.
pub fn find_external_dependency(
    env: &mut Environment,
    name: &str,
    version: Option<&str>,
) -> DepRecord {
    let identifier = dep_identifier(name, version);
    if let Some(cached) = env.coredata.deps.get(&identifier) {
        if cached.found {
            return cached.clone();
        }
    }
    let record = pkgconfig_lookup(name, version).unwrap_or_else(|| DepRecord::not_found(name));
    if record.found {
        info!(
            "Dependency {} found: YES {}",
            name,
            record.version.as_deref().unwrap_or("")
        );
    } else {
        info!("Dependency {} found: NO", name);
    }
    env.coredata.deps.insert(identifier, record.clone());
    record
}

fn pkgconfig_run(args: &[&str]) -> Option<String> {
    let output = cmd("pkg-config", args)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn pkgconfig_lookup(name: &str, version: Option<&str>) -> Option<DepRecord> {
    let modversion = pkgconfig_run(&["--modversion", name])?;
    if let Some(constraint) = version {
        if !version_compare(&modversion, constraint) {
            debug!(
                "Dependency {} version {} does not satisfy {}",
                name, modversion, constraint
            );
            return None;
        }
    }
    let compile_args = pkgconfig_run(&["--cflags", name])?;
    let link_args = pkgconfig_run(&["--libs", name])?;
    Some(DepRecord {
        name: name.to_string(),
        found: true,
        version: Some(modversion),
        compile_args: compile_args.split_whitespace().map(|s| s.to_string()).collect(),
        link_args: link_args.split_whitespace().map(|s| s.to_string()).collect(),
    })
}
