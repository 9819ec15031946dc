/*!
Helpers shared across the configure pipeline: atomic file replacement,
configuration-file substitution, VCS detection and version comparison.

*/
use lazy_static::lazy_static;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A configuration value as stored by `configuration_data()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationData {
    pub values: BTreeMap<String, ConfValue>,
}

impl ConfigurationData {
    pub fn get(&self, name: &str) -> Option<&ConfValue> {
        self.values.get(name)
    }
}

/// Write `contents` to `<path>~` and atomically rename it over `path`.
/// All writes into the build tree go through this so aborts never leave a
/// half-written file behind.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = tilde_path(path);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

/// Like [`write_atomic`], but when the destination already holds identical
/// bytes the temporary is discarded and the destination's mtime survives,
/// so downstream tools do not rebuild needlessly.
pub fn replace_if_different(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Ok(old) = fs::read(path) {
        if old == contents {
            return Ok(());
        }
    }
    write_atomic(path, contents)
}

fn tilde_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push("~");
    path.with_file_name(name)
}

lazy_static! {
    static ref CONF_VAR: Regex = Regex::new("@([a-zA-Z_][a-zA-Z0-9_]*)@").unwrap();
}

/// Replace every `@ident@` in `line` with the configuration value. Unknown
/// variables substitute to the empty string and are reported back so the
/// caller can warn about them.
pub fn do_replacement(line: &str, conf: &ConfigurationData, missing: &mut Vec<String>) -> String {
    CONF_VAR
        .replace_all(line, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match conf.get(name) {
                Some(ConfValue::Str(s)) => s.clone(),
                Some(ConfValue::Int(i)) => i.to_string(),
                Some(ConfValue::Bool(b)) => if *b { "1" } else { "0" }.to_string(),
                None => {
                    if !missing.iter().any(|m| m == name) {
                        missing.push(name.to_string());
                    }
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Expand a `#mesondefine NAME` line against the configuration data.
pub fn do_mesondefine(line: &str, conf: &ConfigurationData) -> Result<String, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != 2 {
        return Err(format!(
            "#mesondefine does not contain exactly two tokens: {}",
            line.trim()
        ));
    }
    let varname = tokens[1];
    match conf.get(varname) {
        None => Ok(format!("/* undef {} */\n", varname)),
        Some(ConfValue::Bool(true)) => Ok(format!("#define {}\n", varname)),
        Some(ConfValue::Bool(false)) => Ok(format!("#undef {}\n", varname)),
        Some(ConfValue::Int(v)) => Ok(format!("#define {} {}\n", varname, v)),
        Some(ConfValue::Str(v)) => Ok(format!("#define {} {}\n", varname, v)),
    }
}

/// Run the `configure_file` content transformation from `src` to `dst`.
/// Returns the variables referenced by the input but absent from the
/// configuration data.
pub fn do_conf_file(
    src: &Path,
    dst: &Path,
    conf: &ConfigurationData,
) -> Result<Vec<String>, String> {
    let data = fs::read_to_string(src)
        .map_err(|e| format!("Could not read input file {}: {}", src.display(), e))?;
    let mut missing = Vec::new();
    let mut result = String::new();
    for line in split_keepends(&data) {
        if line.starts_with("#mesondefine") {
            result.push_str(&do_mesondefine(line, conf)?);
        } else {
            result.push_str(&do_replacement(line, conf, &mut missing));
        }
    }
    replace_if_different(dst, result.as_bytes())
        .map_err(|e| format!("Could not write output file {}: {}", dst.display(), e))?;
    Ok(missing)
}

fn split_keepends(data: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (idx, ch) in data.char_indices() {
        if ch == '\n' {
            out.push(&data[start..=idx]);
            start = idx + 1;
        }
    }
    if start < data.len() {
        out.push(&data[start..]);
    }
    out
}

/// A version control system that `vcs_tag()` can auto-detect.
#[derive(Debug, Clone)]
pub struct VcsInfo {
    pub name: &'static str,
    pub cmd: &'static str,
    pub repo_dir: &'static str,
    pub get_rev: &'static [&'static str],
    pub rev_regex: &'static str,
    pub wc_dir: PathBuf,
}

const VCS_SYSTEMS: &[(&str, &str, &str, &[&str], &str)] = &[
    ("git", "git", ".git", &["git", "describe", "--dirty=+"], "(.*)"),
    ("mercurial", "hg", ".hg", &["hg", "id", "-n"], "(.*)"),
    ("subversion", "svn", ".svn", &["svn", "info"], "Revision: (.*)"),
    ("bazaar", "bzr", ".bzr", &["bzr", "revno"], "(.*)"),
];

/// Walk from `source_dir` to the filesystem root looking for a working
/// copy of a known VCS whose command is installed.
pub fn detect_vcs(source_dir: &Path) -> Option<VcsInfo> {
    let mut dir = Some(source_dir);
    while let Some(cur) = dir {
        for (name, cmd, repo_dir, get_rev, rev_regex) in VCS_SYSTEMS {
            if cur.join(repo_dir).is_dir() && which::which(cmd).is_ok() {
                return Some(VcsInfo {
                    name,
                    cmd,
                    repo_dir,
                    get_rev,
                    rev_regex,
                    wc_dir: cur.to_path_buf(),
                });
            }
        }
        dir = cur.parent();
    }
    None
}

/// Compare a version string against a constraint such as `>=1.2.8`. Bare
/// versions compare for equality. Release suffixes after `-` are ignored.
pub fn version_compare(version: &str, constraint: &str) -> bool {
    let version = version.split('-').next().unwrap_or(version);
    let (op, wanted): (fn(Ordering) -> bool, &str) = if let Some(rest) = constraint.strip_prefix(">=") {
        (|o| o != Ordering::Less, rest)
    } else if let Some(rest) = constraint.strip_prefix("<=") {
        (|o| o != Ordering::Greater, rest)
    } else if let Some(rest) = constraint.strip_prefix("!=") {
        (|o| o != Ordering::Equal, rest)
    } else if let Some(rest) = constraint.strip_prefix("==") {
        (|o| o == Ordering::Equal, rest)
    } else if let Some(rest) = constraint.strip_prefix('=') {
        (|o| o == Ordering::Equal, rest)
    } else if let Some(rest) = constraint.strip_prefix('>') {
        (|o| o == Ordering::Greater, rest)
    } else if let Some(rest) = constraint.strip_prefix('<') {
        (|o| o == Ordering::Less, rest)
    } else {
        (|o| o == Ordering::Equal, constraint)
    };
    op(compare_version_parts(version, wanted))
}

fn compare_version_parts(a: &str, b: &str) -> Ordering {
    let parse = |s: &str| -> Vec<u64> {
        s.split('.')
            .map(|p| p.trim().parse::<u64>().unwrap_or(0))
            .collect()
    };
    let va = parse(a);
    let vb = parse(b);
    let len = va.len().max(vb.len());
    for i in 0..len {
        let x = va.get(i).copied().unwrap_or(0);
        let y = vb.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    fn conf(pairs: &[(&str, ConfValue)]) -> ConfigurationData {
        let mut c = ConfigurationData::default();
        for (k, v) in pairs {
            c.values.insert(k.to_string(), v.clone());
        }
        c
    }

    #[test]
    fn replacement_substitutes_known_and_blanks_unknown() {
        let c = conf(&[("A", ConfValue::Int(1))]);
        let mut missing = Vec::new();
        let line = do_replacement("@A@ @B@", &c, &mut missing);
        assert_eq!(line, "1 ");
        assert_eq!(missing, vec!["B".to_string()]);
    }

    #[test]
    fn mesondefine_expansion_rules() {
        let c = conf(&[
            ("YES", ConfValue::Bool(true)),
            ("NO", ConfValue::Bool(false)),
            ("N", ConfValue::Int(9)),
            ("S", ConfValue::Str("hello".to_string())),
        ]);
        assert_eq!(do_mesondefine("#mesondefine YES", &c).unwrap(), "#define YES\n");
        assert_eq!(do_mesondefine("#mesondefine NO", &c).unwrap(), "#undef NO\n");
        assert_eq!(do_mesondefine("#mesondefine N", &c).unwrap(), "#define N 9\n");
        assert_eq!(
            do_mesondefine("#mesondefine S", &c).unwrap(),
            "#define S hello\n"
        );
        assert_eq!(
            do_mesondefine("#mesondefine GONE", &c).unwrap(),
            "/* undef GONE */\n"
        );
    }

    #[test]
    fn mesondefine_wrong_token_count_fails() {
        let c = ConfigurationData::default();
        assert!(do_mesondefine("#mesondefine", &c).is_err());
        assert!(do_mesondefine("#mesondefine A B", &c).is_err());
    }

    #[test]
    fn conf_file_preserves_identical_output() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("in.h.in");
        let dst = dir.path().join("out.h");
        fs::write(&src, "#mesondefine A\nvalue = @A@\n").unwrap();
        let c = conf(&[("A", ConfValue::Int(5))]);
        do_conf_file(&src, &dst, &c).unwrap();
        let first = fs::metadata(&dst).unwrap().modified().unwrap();
        do_conf_file(&src, &dst, &c).unwrap();
        let second = fs::metadata(&dst).unwrap().modified().unwrap();
        assert_eq!(first, second);
        assert_eq!(
            fs::read_to_string(&dst).unwrap(),
            "#define A 5\nvalue = 5\n"
        );
    }

    #[test]
    fn atomic_write_leaves_no_temporary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("target");
        write_atomic(&path, b"data").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"data");
        assert!(!dir.path().join("target~").exists());
    }

    #[test]
    fn version_compare_operators() {
        assert!(version_compare("1.2.8", ">=1.2"));
        assert!(version_compare("1.2.8", "<2.0"));
        assert!(version_compare("1.2.8", "==1.2.8"));
        assert!(version_compare("1.2.8", "=1.2.8"));
        assert!(version_compare("1.2.8", "!=1.3"));
        assert!(!version_compare("1.2.8", ">1.2.8"));
        assert!(version_compare("2.0", ">1.9.9"));
    }

    #[test]
    fn version_compare_ignores_release_suffix() {
        assert!(version_compare("1.4.0-rc2", "==1.4.0"));
    }

    #[test]
    fn substitution_without_markers_is_identity() {
        let c = ConfigurationData::default();
        let mut missing = Vec::new();
        assert_eq!(do_replacement("plain line", &c, &mut missing), "plain line");
        assert!(missing.is_empty());
    }
}
