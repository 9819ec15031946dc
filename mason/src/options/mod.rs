/*!
# The option system

Options are identified by an [`OptionKey`] triple of name, owning
subproject and machine axis. The [`OptionStore`] layers built-in options,
per-project declarations from `meson_options.txt`, machine-file and
command-line values, and subproject augments, and resolves a key to its
effective value with yielding and fallback rules.

Value objects are type-checked on every set; a set either stores a
validated value or fails with an `OptionError`, never leaving a partial
update behind.

*/
pub(crate) mod error;
mod interpreter;
mod store;

pub use error::OptionError;
pub use interpreter::OptionInterpreter;
pub use store::OptionStore;

use error::{Result, ValidationSnafu};
use serde::{Deserialize, Serialize};
use snafu::ensure;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Which machine an option applies to: the machine the built artifacts run
/// on (host) or the machine the build itself runs on (build).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum MachineChoice {
    #[default]
    Host,
    Build,
}

/// The identity of an option. `subproject` of `None` marks a system
/// option; the empty string marks the top-level project.
///
/// String form is `[subproject:][build.]name`. Ordering is lexicographic
/// over `(subproject, machine, name)`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OptionKey {
    pub subproject: Option<String>,
    pub machine: MachineChoice,
    pub name: String,
}

impl OptionKey {
    pub fn new(name: impl Into<String>) -> Self {
        OptionKey {
            subproject: None,
            machine: MachineChoice::Host,
            name: name.into(),
        }
    }

    pub fn project(name: impl Into<String>, subproject: impl Into<String>) -> Self {
        OptionKey {
            subproject: Some(subproject.into()),
            machine: MachineChoice::Host,
            name: name.into(),
        }
    }

    pub fn as_root(&self) -> Self {
        let mut key = self.clone();
        key.subproject = Some(String::new());
        key
    }

    pub fn as_system(&self) -> Self {
        let mut key = self.clone();
        key.subproject = None;
        key
    }

    pub fn as_host(&self) -> Self {
        let mut key = self.clone();
        key.machine = MachineChoice::Host;
        key
    }

    /// Parse the command-line form `[subproject:][build.]name`.
    pub fn from_string(raw: &str) -> Self {
        let (subproject, rest) = match raw.split_once(':') {
            Some((sub, rest)) => (Some(sub.to_string()), rest),
            None => (None, raw),
        };
        let (machine, name) = match rest.strip_prefix("build.") {
            Some(name) => (MachineChoice::Build, name),
            None => (MachineChoice::Host, rest),
        };
        OptionKey {
            subproject,
            machine,
            name: name.to_string(),
        }
    }
}

impl Display for OptionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(sub) = &self.subproject {
            if !sub.is_empty() {
                write!(f, "{}:", sub)?;
            }
        }
        if self.machine == MachineChoice::Build {
            write!(f, "build.")?;
        }
        write!(f, "{}", self.name)
    }
}

/// A raw option value before validation: a command-line string, or a
/// literal reduced from an option file.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionArg {
    Str(String),
    Bool(bool),
    Int(i64),
    List(Vec<OptionArg>),
}

impl OptionArg {
    fn type_name(&self) -> &'static str {
        match self {
            OptionArg::Str(_) => "string",
            OptionArg::Bool(_) => "boolean",
            OptionArg::Int(_) => "number",
            OptionArg::List(_) => "array",
        }
    }

    fn render(&self) -> String {
        match self {
            OptionArg::Str(s) => s.clone(),
            OptionArg::Bool(b) => b.to_string(),
            OptionArg::Int(i) => i.to_string(),
            OptionArg::List(items) => {
                let rendered: Vec<String> = items.iter().map(|i| i.render()).collect();
                format!("[{}]", rendered.join(", "))
            }
        }
    }
}

/// A validated, stored option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptionValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Array(Vec<String>),
}

impl OptionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// Deprecation state of an option, driving the warning or rewrite that a
/// set triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Deprecated {
    #[default]
    No,
    Yes,
    Values(Vec<String>),
    Replacements(BTreeMap<String, String>),
    Renamed(String),
}

/// The typed shape of an option, separate from its current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptionSpec {
    Str,
    Boolean,
    Integer { min: Option<i64>, max: Option<i64> },
    Combo { choices: Vec<String> },
    Array { choices: Option<Vec<String>> },
    Feature,
}

pub const FEATURE_CHOICES: &[&str] = &["enabled", "disabled", "auto"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserOption {
    pub name: String,
    pub description: String,
    pub yielding: bool,
    pub deprecated: Deprecated,
    pub readonly: bool,
    pub spec: OptionSpec,
    pub value: OptionValue,
}

impl UserOption {
    fn build(
        name: impl Into<String>,
        description: impl Into<String>,
        spec: OptionSpec,
        default: &OptionArg,
    ) -> Result<Self> {
        let name = name.into();
        let mut description = description.into();
        if description.is_empty() {
            description = name.clone();
        }
        let mut opt = UserOption {
            name,
            description,
            yielding: false,
            deprecated: Deprecated::No,
            readonly: false,
            spec,
            // Placeholder until the default passes validation below.
            value: OptionValue::Bool(false),
        };
        opt.value = opt.validate_value(default)?;
        Ok(opt)
    }

    pub fn string(name: &str, description: &str, default: &str) -> Result<Self> {
        Self::build(
            name,
            description,
            OptionSpec::Str,
            &OptionArg::Str(default.to_string()),
        )
    }

    pub fn boolean(name: &str, description: &str, default: bool) -> Result<Self> {
        Self::build(
            name,
            description,
            OptionSpec::Boolean,
            &OptionArg::Bool(default),
        )
    }

    pub fn integer(
        name: &str,
        description: &str,
        min: Option<i64>,
        max: Option<i64>,
        default: &OptionArg,
    ) -> Result<Self> {
        Self::build(name, description, OptionSpec::Integer { min, max }, default)
    }

    pub fn combo(
        name: &str,
        description: &str,
        choices: Vec<String>,
        default: &OptionArg,
    ) -> Result<Self> {
        ensure!(!choices.is_empty(), error::EmptyChoicesSnafu);
        Self::build(name, description, OptionSpec::Combo { choices }, default)
    }

    pub fn array(
        name: &str,
        description: &str,
        choices: Option<Vec<String>>,
        default: &OptionArg,
    ) -> Result<Self> {
        Self::build(name, description, OptionSpec::Array { choices }, default)
    }

    pub fn feature(name: &str, description: &str, default: &str) -> Result<Self> {
        Self::build(
            name,
            description,
            OptionSpec::Feature,
            &OptionArg::Str(default.to_string()),
        )
    }

    pub fn yielding(mut self, yielding: bool) -> Self {
        self.yielding = yielding;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn deprecated(mut self, deprecated: Deprecated) -> Self {
        self.deprecated = deprecated;
        self
    }

    /// Two options have the same concrete type when their specs share a
    /// variant. Yielding resolution depends on this.
    pub fn same_type(&self, other: &UserOption) -> bool {
        std::mem::discriminant(&self.spec) == std::mem::discriminant(&other.spec)
    }

    /// Turn a raw value into a list for array handling and deprecation
    /// matching: comma-joined strings split, lists pass through, scalars
    /// wrap.
    pub fn listify(&self, value: &OptionArg) -> Vec<String> {
        match (&self.spec, value) {
            (OptionSpec::Array { .. }, OptionArg::Str(s)) => {
                if s.is_empty() {
                    Vec::new()
                } else {
                    s.split(',').map(|p| p.trim().to_string()).collect()
                }
            }
            (OptionSpec::Array { .. }, OptionArg::List(items)) => {
                items.iter().map(|i| i.render()).collect()
            }
            (_, v) => vec![v.render()],
        }
    }

    /// Check a raw value and return its validated form, or fail without
    /// touching the stored value.
    pub fn validate_value(&self, value: &OptionArg) -> Result<OptionValue> {
        match &self.spec {
            OptionSpec::Str => match value {
                OptionArg::Str(s) => Ok(OptionValue::Str(s.clone())),
                other => ValidationSnafu {
                    message: format!(
                        "The value of option \"{}\" is \"{}\", which is not a string.",
                        self.name,
                        other.render()
                    ),
                }
                .fail(),
            },
            OptionSpec::Boolean => match value {
                OptionArg::Bool(b) => Ok(OptionValue::Bool(*b)),
                OptionArg::Str(s) if s.eq_ignore_ascii_case("true") => Ok(OptionValue::Bool(true)),
                OptionArg::Str(s) if s.eq_ignore_ascii_case("false") => {
                    Ok(OptionValue::Bool(false))
                }
                other => ValidationSnafu {
                    message: format!(
                        "Option \"{}\" value {} is not boolean (true or false).",
                        self.name,
                        other.render()
                    ),
                }
                .fail(),
            },
            OptionSpec::Integer { min, max } => {
                let parsed = match value {
                    OptionArg::Int(i) => *i,
                    OptionArg::Str(s) => s.trim().parse::<i64>().map_err(|_| {
                        ValidationSnafu {
                            message: format!(
                                "Value string \"{}\" for option \"{}\" is not convertible to an integer.",
                                s, self.name
                            ),
                        }
                        .build()
                    })?,
                    other => {
                        return ValidationSnafu {
                            message: format!(
                                "Value {} for option \"{}\" is not an integer.",
                                other.render(),
                                self.name
                            ),
                        }
                        .fail()
                    }
                };
                if let Some(min) = min {
                    ensure!(
                        parsed >= *min,
                        ValidationSnafu {
                            message: format!(
                                "Value {} for option \"{}\" is less than minimum value {}.",
                                parsed, self.name, min
                            ),
                        }
                    );
                }
                if let Some(max) = max {
                    ensure!(
                        parsed <= *max,
                        ValidationSnafu {
                            message: format!(
                                "Value {} for option \"{}\" is more than maximum value {}.",
                                parsed, self.name, max
                            ),
                        }
                    );
                }
                Ok(OptionValue::Int(parsed))
            }
            OptionSpec::Combo { choices } => self.validate_choice(value, choices),
            OptionSpec::Feature => {
                let choices: Vec<String> =
                    FEATURE_CHOICES.iter().map(|c| c.to_string()).collect();
                self.validate_choice(value, &choices)
            }
            OptionSpec::Array { choices } => {
                let items = match value {
                    OptionArg::Str(_) | OptionArg::List(_) => self.listify(value),
                    other => {
                        return ValidationSnafu {
                            message: format!(
                                "Value {} for array option \"{}\" must be a string or an array of strings.",
                                other.render(),
                                self.name
                            ),
                        }
                        .fail()
                    }
                };
                if let OptionArg::List(raw) = value {
                    for item in raw {
                        ensure!(
                            matches!(item, OptionArg::Str(_)),
                            ValidationSnafu {
                                message: format!(
                                    "String array element \"{}\" for option \"{}\" is not a string.",
                                    item.render(),
                                    self.name
                                ),
                            }
                        );
                    }
                }
                if let Some(choices) = choices {
                    let bad: Vec<&String> =
                        items.iter().filter(|i| !choices.contains(i)).collect();
                    if !bad.is_empty() {
                        let plural = bad.len() != 1;
                        return ValidationSnafu {
                            message: format!(
                                "Value{} \"{}\" for option \"{}\" {} not in allowed choices: \"{}\"",
                                if plural { "s" } else { "" },
                                bad.iter()
                                    .map(|s| s.as_str())
                                    .collect::<Vec<_>>()
                                    .join(", "),
                                self.name,
                                if plural { "are" } else { "is" },
                                choices.join(", ")
                            ),
                        }
                        .fail();
                    }
                }
                Ok(OptionValue::Array(items))
            }
        }
    }

    fn validate_choice(&self, value: &OptionArg, choices: &[String]) -> Result<OptionValue> {
        let as_string = value.render();
        if let OptionArg::Str(s) = value {
            if choices.iter().any(|c| c == s) {
                return Ok(OptionValue::Str(s.clone()));
            }
        }
        let rendered: Vec<String> = choices.iter().map(|c| format!("\"{}\"", c)).collect();
        ValidationSnafu {
            message: format!(
                "Value \"{}\" (of type \"{}\") for option \"{}\" is not one of the choices. \
                 Possible choices are (as string): {}.",
                as_string,
                value.type_name(),
                self.name,
                rendered.join(", ")
            ),
        }
        .fail()
    }

    /// Validate and store. Returns whether the stored value changed.
    pub fn set_value(&mut self, value: &OptionArg) -> Result<bool> {
        let new_value = self.validate_value(value)?;
        let changed = new_value != self.value;
        self.value = new_value;
        Ok(changed)
    }
}

/// Bare names reserved for built-in options.
pub const BUILTIN_NAMES: &[&str] = &[
    "prefix",
    "bindir",
    "datadir",
    "includedir",
    "infodir",
    "libdir",
    "libexecdir",
    "localedir",
    "localstatedir",
    "mandir",
    "sbindir",
    "sharedstatedir",
    "sysconfdir",
    "auto_features",
    "backend",
    "buildtype",
    "debug",
    "default_library",
    "errorlogs",
    "install_umask",
    "layout",
    "optimization",
    "prefer_static",
    "stdsplit",
    "strip",
    "unity",
    "unity_size",
    "warning_level",
    "werror",
    "wrap_mode",
    "pkg_config_path",
];

/// Language prefixes whose `<lang>_` namespace belongs to compiler
/// options, plus the base and backend namespaces.
pub const RESERVED_PREFIXES: &[&str] = &[
    "c_", "cpp_", "objc_", "objcpp_", "java_", "cs_", "csharp_", "vala_", "rust_", "fortran_",
    "d_", "swift_", "b_", "backend_",
];

pub fn is_reserved_option_name(name: &str) -> bool {
    if BUILTIN_NAMES.contains(&name) {
        return true;
    }
    RESERVED_PREFIXES.iter().any(|p| name.starts_with(p))
}

#[cfg(windows)]
const DEFAULT_PREFIX: &str = "c:/";
#[cfg(not(windows))]
const DEFAULT_PREFIX: &str = "/usr/local";

/// Installation directories that live outside the prefix in common FHS
/// usage get prefix-dependent defaults.
fn dir_default<'a>(name: &str, prefix: &str, fallback: &'a str) -> &'a str {
    match (name, prefix) {
        ("sysconfdir", "/usr") => "/etc",
        ("localstatedir", "/usr") => "/var",
        ("localstatedir", "/usr/local") => "/var/local",
        ("sharedstatedir", "/usr") => "/var/lib",
        ("sharedstatedir", "/usr/local") => "/var/local/lib",
        _ => fallback,
    }
}

/// Register the built-in options, first the installation directories and
/// then the core behavior options. `prefix` is the command-line value when
/// one was given; directory defaults depend on it.
pub fn register_builtin_options(store: &mut OptionStore, prefix: Option<&str>) -> Result<()> {
    let prefix = match prefix {
        Some(p) => store.sanitize_prefix(p)?,
        None => DEFAULT_PREFIX.to_string(),
    };
    let dirs: &[(&str, &str, &str)] = &[
        ("bindir", "Executable directory", "bin"),
        ("datadir", "Data file directory", "share"),
        ("includedir", "Header file directory", "include"),
        ("infodir", "Info page directory", "share/info"),
        ("libdir", "Library directory", "lib"),
        ("libexecdir", "Library executable directory", "libexec"),
        ("localedir", "Locale data directory", "share/locale"),
        ("localstatedir", "Localstate data directory", "var"),
        ("mandir", "Manual page directory", "share/man"),
        ("sbindir", "System executable directory", "sbin"),
        (
            "sharedstatedir",
            "Architecture-independent data directory",
            "com",
        ),
        ("sysconfdir", "Sysconf data directory", "etc"),
    ];
    store.add_system_option(
        OptionKey::new("prefix"),
        UserOption::string("prefix", "Installation prefix", &prefix)?,
    )?;
    for (name, description, fallback) in dirs {
        let default = dir_default(name, &prefix, fallback);
        store.add_system_option(
            OptionKey::new(*name),
            UserOption::string(name, description, default)?,
        )?;
    }

    let combo = |name: &str, description: &str, default: &str, choices: &[&str]| {
        UserOption::combo(
            name,
            description,
            choices.iter().map(|c| c.to_string()).collect(),
            &OptionArg::Str(default.to_string()),
        )
    };
    store.add_system_option(
        OptionKey::new("auto_features"),
        UserOption::feature("auto_features", "Override value of all 'auto' features", "auto")?,
    )?;
    store.add_system_option(
        OptionKey::new("backend"),
        combo(
            "backend",
            "Backend to use",
            "ninja",
            &["ninja", "vs2010", "xcode", "none"],
        )?
        .readonly(),
    )?;
    store.add_system_option(
        OptionKey::new("buildtype"),
        combo(
            "buildtype",
            "Build type to use",
            "debug",
            &["plain", "debug", "debugoptimized", "release", "minsize", "custom"],
        )?,
    )?;
    store.add_system_option(
        OptionKey::new("debug"),
        UserOption::boolean("debug", "Enable debug symbols and other information", true)?,
    )?;
    store.add_system_option(
        OptionKey::new("default_library"),
        combo(
            "default_library",
            "Default library type",
            "shared",
            &["shared", "static", "both"],
        )?,
    )?;
    store.add_system_option(
        OptionKey::new("errorlogs"),
        UserOption::boolean(
            "errorlogs",
            "Whether to print the logs from failing tests",
            true,
        )?,
    )?;
    store.add_system_option(
        OptionKey::new("install_umask"),
        UserOption::string(
            "install_umask",
            "Default umask to apply on permissions of installed files",
            "022",
        )?,
    )?;
    store.add_system_option(
        OptionKey::new("layout"),
        combo("layout", "Build directory layout", "mirror", &["mirror", "flat"])?,
    )?;
    store.add_system_option(
        OptionKey::new("optimization"),
        combo(
            "optimization",
            "Optimization level",
            "0",
            &["plain", "0", "g", "1", "2", "3", "s"],
        )?,
    )?;
    store.add_system_option(
        OptionKey::new("prefer_static"),
        UserOption::boolean(
            "prefer_static",
            "Whether to try static linking before shared linking",
            false,
        )?,
    )?;
    store.add_system_option(
        OptionKey::new("stdsplit"),
        UserOption::boolean("stdsplit", "Split stdout and stderr in test logs", true)?,
    )?;
    store.add_system_option(
        OptionKey::new("strip"),
        UserOption::boolean("strip", "Strip targets on install", false)?,
    )?;
    store.add_system_option(
        OptionKey::new("unity"),
        combo("unity", "Unity build", "off", &["on", "off", "subprojects"])?,
    )?;
    store.add_system_option(
        OptionKey::new("unity_size"),
        UserOption::integer(
            "unity_size",
            "Unity block size",
            Some(2),
            None,
            &OptionArg::Int(4),
        )?,
    )?;
    store.add_system_option(
        OptionKey::new("warning_level"),
        combo(
            "warning_level",
            "Compiler warning level to use",
            "1",
            &["0", "1", "2", "3"],
        )?
        .yielding(false),
    )?;
    store.add_system_option(
        OptionKey::new("werror"),
        UserOption::boolean("werror", "Treat warnings as errors", false)?.yielding(false),
    )?;
    store.add_system_option(
        OptionKey::new("wrap_mode"),
        combo(
            "wrap_mode",
            "Wrap mode",
            "default",
            &["default", "nofallback", "nodownload", "forcefallback"],
        )?,
    )?;
    let pkg_path = |machine| OptionKey {
        subproject: None,
        machine,
        name: "pkg_config_path".to_string(),
    };
    store.add_system_option(
        pkg_path(MachineChoice::Host),
        UserOption::array(
            "pkg_config_path",
            "List of additional paths for pkg-config to search",
            None,
            &OptionArg::List(Vec::new()),
        )?,
    )?;
    if store.is_cross() {
        store.add_system_option(
            pkg_path(MachineChoice::Build),
            UserOption::array(
                "pkg_config_path",
                "List of additional paths for pkg-config to search",
                None,
                &OptionArg::List(Vec::new()),
            )?,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_string_round_trip() {
        for raw in ["debug", "build.debug", "sub:opt", "sub:build.opt"] {
            assert_eq!(OptionKey::from_string(raw).to_string(), raw);
        }
    }

    #[test]
    fn top_level_key_renders_without_prefix() {
        let key = OptionKey::project("opt", "");
        assert_eq!(key.to_string(), "opt");
        assert_eq!(key.subproject.as_deref(), Some(""));
    }

    #[test]
    fn key_ordering_is_lexicographic_over_triple() {
        let a = OptionKey::new("zzz");
        let b = OptionKey::project("aaa", "sub");
        // System options (subproject None) sort before project options.
        assert!(a < b);
    }

    #[test]
    fn combo_rejects_value_outside_choices() {
        let choices = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let opt = UserOption::combo("level", "", choices, &OptionArg::Str("b".to_string())).unwrap();
        let err = opt
            .validate_value(&OptionArg::Str("z".to_string()))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Value \"z\""));
        assert!(msg.contains("not one of the choices"));
        assert!(msg.contains("\"a\", \"b\", \"c\""));
    }

    #[test]
    fn combo_requires_choices() {
        assert!(matches!(
            UserOption::combo("x", "", Vec::new(), &OptionArg::Str("a".to_string())),
            Err(OptionError::EmptyChoices)
        ));
    }

    #[test]
    fn boolean_accepts_strings() {
        let mut opt = UserOption::boolean("debug", "", true).unwrap();
        assert!(opt.set_value(&OptionArg::Str("false".to_string())).unwrap());
        assert_eq!(opt.value, OptionValue::Bool(false));
        assert!(opt.set_value(&OptionArg::Str("maybe".to_string())).is_err());
        // The failed set left the previous value untouched.
        assert_eq!(opt.value, OptionValue::Bool(false));
    }

    #[test]
    fn integer_range_is_enforced() {
        let opt = UserOption::integer("n", "", Some(2), Some(8), &OptionArg::Int(4)).unwrap();
        assert!(opt.validate_value(&OptionArg::Int(1)).is_err());
        assert!(opt.validate_value(&OptionArg::Int(9)).is_err());
        assert_eq!(
            opt.validate_value(&OptionArg::Str("6".to_string())).unwrap(),
            OptionValue::Int(6)
        );
    }

    #[test]
    fn array_listifies_comma_joined_strings() {
        let opt = UserOption::array("list", "", None, &OptionArg::List(Vec::new())).unwrap();
        assert_eq!(
            opt.validate_value(&OptionArg::Str("a, b,c".to_string()))
                .unwrap(),
            OptionValue::Array(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn array_choices_filter_values() {
        let choices = Some(vec!["x".to_string(), "y".to_string()]);
        let opt = UserOption::array("list", "", choices, &OptionArg::List(Vec::new())).unwrap();
        assert!(opt
            .validate_value(&OptionArg::Str("x,z".to_string()))
            .is_err());
    }

    #[test]
    fn feature_is_a_fixed_combo() {
        let opt = UserOption::feature("f", "", "auto").unwrap();
        assert!(opt
            .validate_value(&OptionArg::Str("enabled".to_string()))
            .is_ok());
        assert!(opt.validate_value(&OptionArg::Str("on".to_string())).is_err());
    }

    #[test]
    fn reserved_names_cover_builtins_and_prefixes() {
        assert!(is_reserved_option_name("prefix"));
        assert!(is_reserved_option_name("c_args"));
        assert!(is_reserved_option_name("b_lto"));
        assert!(is_reserved_option_name("backend_max_links"));
        assert!(!is_reserved_option_name("my_option"));
    }
}
