/*!
Helper entry points baked into generated build rules. They are invoked
by the back-end's manifest, not by users, so their interfaces stay
stable across releases.

*/
use crate::common::replace_if_different;
use crate::diagnostics::{DiagResult, Diagnostic};
use clap::Parser;
use duct::cmd;
use regex::Regex;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Parser)]
pub enum InternalCommand {
    /// Substitute the current VCS revision into a template file.
    Vcstagger(VcsTagger),
}

impl InternalCommand {
    pub fn run(&self) -> DiagResult<()> {
        match self {
            InternalCommand::Vcstagger(args) => args.run(),
        }
    }
}

#[derive(Debug, Parser)]
pub struct VcsTagger {
    pub infile: PathBuf,
    pub outfile: PathBuf,
    pub fallback: String,
    pub source_dir: PathBuf,
    pub replace_string: String,
    pub regex_selector: String,
    /// The VCS command that prints the current revision.
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    pub vcs_cmd: Vec<String>,
}

impl VcsTagger {
    fn run(&self) -> DiagResult<()> {
        let revision = self.resolve_revision();
        let content = fs::read_to_string(&self.infile).map_err(|e| {
            Diagnostic::environment(format!(
                "Could not read {}: {}",
                self.infile.display(),
                e
            ))
        })?;
        let replaced = content.replace(&self.replace_string, &revision);
        replace_if_different(&self.outfile, replaced.as_bytes()).map_err(|e| {
            Diagnostic::environment(format!(
                "Could not write {}: {}",
                self.outfile.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// The trimmed, regex-selected command output, or the fallback when
    /// anything about running the command fails.
    fn resolve_revision(&self) -> String {
        let Some(exe) = self.vcs_cmd.first() else {
            return self.fallback.clone();
        };
        let output = cmd(exe, self.vcs_cmd[1..].to_vec())
            .dir(&self.source_dir)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run();
        let output = match output {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            }
            _ => return self.fallback.clone(),
        };
        match Regex::new(&self.regex_selector) {
            Ok(regex) => regex
                .captures(&output)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| self.fallback.clone()),
            Err(_) => self.fallback.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    fn tagger(dir: &TempDir, vcs_cmd: Vec<String>, selector: &str) -> VcsTagger {
        VcsTagger {
            infile: dir.path().join("version.c.in"),
            outfile: dir.path().join("version.c"),
            fallback: "1.0-fallback".to_string(),
            source_dir: dir.path().to_path_buf(),
            replace_string: "@VCS_TAG@".to_string(),
            regex_selector: selector.to_string(),
            vcs_cmd,
        }
    }

    #[test]
    fn substitutes_command_output() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("version.c.in"),
            "const char *v = \"@VCS_TAG@\";\n",
        )
        .unwrap();
        let tagger = tagger(
            &dir,
            vec!["echo".to_string(), "v1.2.3".to_string()],
            "(.*)",
        );
        tagger.run().unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("version.c")).unwrap(),
            "const char *v = \"v1.2.3\";\n"
        );
    }

    #[test]
    fn falls_back_when_command_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("version.c.in"), "@VCS_TAG@\n").unwrap();
        let tagger = tagger(
            &dir,
            vec!["definitely-not-a-vcs-tool-9131".to_string()],
            "(.*)",
        );
        tagger.run().unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("version.c")).unwrap(),
            "1.0-fallback\n"
        );
    }

    #[test]
    fn regex_selector_extracts_group() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("version.c.in"), "@VCS_TAG@\n").unwrap();
        let tagger = tagger(
            &dir,
            vec!["echo".to_string(), "Revision: 42".to_string()],
            "Revision: (.*)",
        );
        tagger.run().unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("version.c")).unwrap(),
            "42\n"
        );
    }
}
