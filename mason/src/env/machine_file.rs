/*!
Cross and native machine files.

The format is INI-like: `[section]` headers followed by `name = value`
lines, where a value is a quoted string, an integer, a boolean, or a
bracketed list of those. Section and entry order is irrelevant.

*/
use super::error::{self, Result};
use snafu::{ensure, ResultExt};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum MachineValue {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<MachineValue>),
}

impl MachineValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MachineValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// A value usable as a command: a string becomes a one-element argv,
    /// a list of strings passes through.
    pub fn as_command(&self) -> Option<Vec<String>> {
        match self {
            MachineValue::Str(s) => Some(vec![s.clone()]),
            MachineValue::List(items) => items
                .iter()
                .map(|i| i.as_str().map(|s| s.to_string()))
                .collect(),
            _ => None,
        }
    }
}

pub type Section = BTreeMap<String, MachineValue>;

#[derive(Debug, Clone, Default)]
pub struct MachineFile {
    pub sections: BTreeMap<String, Section>,
}

impl MachineFile {
    pub fn parse(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(error::MachineFileReadSnafu { path })?;
        Self::parse_str(&content)
    }

    pub fn parse_str(content: &str) -> Result<Self> {
        let mut file = MachineFile::default();
        let mut current: Option<String> = None;
        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = section.trim().to_string();
                file.sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }
            let (name, value) = line.split_once('=').ok_or_else(|| {
                error::MachineFileLineSnafu {
                    line: lineno + 1,
                    content: line,
                }
                .build()
            })?;
            let name = name.trim().to_string();
            ensure!(
                !name.is_empty()
                    && !name.contains(char::is_whitespace)
                    && !name.contains('\'')
                    && !name.contains('"'),
                error::MachineFileNameSnafu { name }
            );
            let section = current.clone().ok_or_else(|| {
                error::MachineFileLineSnafu {
                    line: lineno + 1,
                    content: line,
                }
                .build()
            })?;
            let parsed = parse_value(value.trim())
                .ok_or_else(|| error::MachineFileValueSnafu { name: name.clone() }.build())?;
            file.sections
                .get_mut(&section)
                .expect("section created on header")
                .insert(name, parsed);
        }
        Ok(file)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn lookup(&self, section: &str, entry: &str) -> Option<&MachineValue> {
        self.sections.get(section).and_then(|s| s.get(entry))
    }
}

fn parse_value(value: &str) -> Option<MachineValue> {
    let value = value.trim();
    if value == "true" {
        return Some(MachineValue::Bool(true));
    }
    if value == "false" {
        return Some(MachineValue::Bool(false));
    }
    if let Some(inner) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
        if inner.contains('\'') {
            return None;
        }
        return Some(MachineValue::Str(inner.to_string()));
    }
    if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        let inner = inner.trim();
        if inner.is_empty() {
            return Some(MachineValue::List(Vec::new()));
        }
        let items: Option<Vec<MachineValue>> =
            split_top_level(inner).into_iter().map(|p| parse_value(p)).collect();
        return items.map(MachineValue::List);
    }
    value.parse::<i64>().ok().map(MachineValue::Int)
}

/// Split a list body on commas that are not inside quotes. Nested lists
/// are not supported, matching the scalar-or-list-of-scalars contract.
fn split_top_level(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quote = false;
    for (idx, ch) in inner.char_indices() {
        match ch {
            '\'' => in_quote = !in_quote,
            ',' if !in_quote => {
                parts.push(inner[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(inner[start..].trim());
    parts
}

/// The validated contents of a cross file.
#[derive(Debug, Clone)]
pub struct CrossBuildInfo {
    pub file: MachineFile,
}

impl CrossBuildInfo {
    pub fn new(path: &Path) -> Result<Self> {
        Self::from_file(MachineFile::parse(path)?)
    }

    pub fn from_file(file: MachineFile) -> Result<Self> {
        let has_host = file.has_section("host_machine");
        let has_target = file.has_section("target_machine");
        ensure!(
            has_host || has_target,
            error::CrossFileMissingMachineSnafu
        );
        ensure!(
            !(has_host && has_target),
            error::CrossBuildingCrossCompilerSnafu
        );
        if has_host {
            for section in ["properties", "binaries"] {
                ensure!(
                    file.has_section(section),
                    error::CrossFileMissingSectionSnafu { section }
                );
            }
        }
        Ok(CrossBuildInfo { file })
    }

    pub fn has_host(&self) -> bool {
        self.file.has_section("host_machine")
    }

    pub fn has_target(&self) -> bool {
        self.file.has_section("target_machine")
    }

    /// Building a cross compiler natively needs no cross toolchain; only
    /// a populated host machine does.
    pub fn need_cross_compiler(&self) -> bool {
        self.has_host()
    }

    pub fn binary(&self, name: &str) -> Option<Vec<String>> {
        self.file
            .lookup("binaries", name)
            .and_then(|v| v.as_command())
    }

    pub fn machine_entry(&self, section: &str, entry: &str) -> Result<String> {
        self.file
            .lookup(section, entry)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                error::MachineEntryMissingSnafu {
                    section,
                    entry,
                }
                .build()
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const CROSS_FILE: &str = "\
[binaries]
c = '/usr/bin/arm-linux-gnueabihf-gcc'
ar = '/usr/bin/arm-linux-gnueabihf-ar'
exe_wrapper = 'qemu-arm'

[properties]
sizeof_int = 4
has_function_printf = true

[host_machine]
system = 'linux'
cpu = 'arm'
endian = 'little'
";

    #[test]
    fn parses_sections_and_typed_values() {
        let info = CrossBuildInfo::from_file(MachineFile::parse_str(CROSS_FILE).unwrap()).unwrap();
        assert_eq!(
            info.binary("c").unwrap(),
            vec!["/usr/bin/arm-linux-gnueabihf-gcc".to_string()]
        );
        assert_eq!(
            info.file.lookup("properties", "sizeof_int"),
            Some(&MachineValue::Int(4))
        );
        assert_eq!(
            info.file.lookup("properties", "has_function_printf"),
            Some(&MachineValue::Bool(true))
        );
        assert_eq!(
            info.machine_entry("host_machine", "system").unwrap(),
            "linux"
        );
    }

    #[test]
    fn list_values_become_commands() {
        let file =
            MachineFile::parse_str("[binaries]\nc = ['ccache', 'arm-gcc']\n").unwrap();
        assert_eq!(
            file.lookup("binaries", "c").unwrap().as_command().unwrap(),
            vec!["ccache".to_string(), "arm-gcc".to_string()]
        );
    }

    #[test]
    fn missing_machine_section_is_rejected() {
        let file = MachineFile::parse_str("[binaries]\nc = 'gcc'\n").unwrap();
        assert!(matches!(
            CrossBuildInfo::from_file(file),
            Err(super::super::error::EnvError::CrossFileMissingMachine)
        ));
    }

    #[test]
    fn host_without_properties_is_rejected() {
        let file =
            MachineFile::parse_str("[host_machine]\nsystem = 'linux'\ncpu = 'arm'\nendian = 'little'\n")
                .unwrap();
        assert!(matches!(
            CrossBuildInfo::from_file(file),
            Err(super::super::error::EnvError::CrossFileMissingSection { .. })
        ));
    }

    #[test]
    fn host_plus_target_is_refused() {
        let content = format!("{}\n[target_machine]\nsystem = 'linux'\n", CROSS_FILE);
        let file = MachineFile::parse_str(&content).unwrap();
        assert!(matches!(
            CrossBuildInfo::from_file(file),
            Err(super::super::error::EnvError::CrossBuildingCrossCompiler)
        ));
    }

    #[test]
    fn bad_names_and_values_are_rejected() {
        assert!(MachineFile::parse_str("[s]\nbad name = 'x'\n").is_err());
        assert!(MachineFile::parse_str("[s]\nname = unquoted\n").is_err());
        assert!(MachineFile::parse_str("name = 'outside section'\n").is_err());
    }

    #[test]
    fn comments_and_blanks_are_ignored() {
        let file =
            MachineFile::parse_str("# top\n[s]\n; also a comment\n\nx = 1\n").unwrap();
        assert_eq!(file.lookup("s", "x"), Some(&MachineValue::Int(1)));
    }
}
