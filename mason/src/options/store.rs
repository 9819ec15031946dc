use super::error::{self, OptionError, Result};
use super::{
    is_reserved_option_name, Deprecated, MachineChoice, OptionArg, OptionKey, OptionValue,
    UserOption,
};
use crate::warnings;
use serde::{Deserialize, Serialize};
use snafu::ensure;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

/// The layered option store. Iteration follows insertion order so that
/// repeated configures produce identical output.
#[derive(Debug, Serialize, Deserialize)]
pub struct OptionStore {
    entries: Vec<(OptionKey, UserOption)>,
    project_options: BTreeSet<OptionKey>,
    module_options: BTreeSet<OptionKey>,
    /// Subproject-scoped overrides applied on top of the base object,
    /// keyed by the stringified option key.
    augments: BTreeMap<String, String>,
    is_cross: bool,
    #[serde(skip)]
    index: HashMap<OptionKey, usize>,
    /// Command-line values for project options that have not been
    /// declared yet. Leftovers become the unknown-option warning.
    #[serde(skip)]
    pending_project_options: Vec<(OptionKey, String)>,
    #[serde(skip)]
    emitted_deprecations: HashSet<(String, String)>,
}

impl OptionStore {
    pub fn new(is_cross: bool) -> Self {
        OptionStore {
            entries: Vec::new(),
            project_options: BTreeSet::new(),
            module_options: BTreeSet::new(),
            augments: BTreeMap::new(),
            is_cross,
            index: HashMap::new(),
            pending_project_options: Vec::new(),
            emitted_deprecations: HashSet::new(),
        }
    }

    /// Rebuild the lookup index after deserialization.
    pub fn rebuild_index(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (k, _))| (k.clone(), i))
            .collect();
    }

    pub fn is_cross(&self) -> bool {
        self.is_cross
    }

    /// When not cross building, all build-machine requests fall back to
    /// the host machine.
    fn canonicalize_key(&self, key: &OptionKey) -> OptionKey {
        if !self.is_cross && key.machine == MachineChoice::Build {
            key.as_host()
        } else {
            key.clone()
        }
    }

    pub fn contains(&self, key: &OptionKey) -> bool {
        self.index.contains_key(&self.canonicalize_key(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OptionKey, &UserOption)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_project_option(&self, key: &OptionKey) -> bool {
        self.project_options.contains(key)
    }

    fn insert(&mut self, key: OptionKey, option: UserOption) {
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, option));
    }

    fn get(&self, key: &OptionKey) -> Option<&UserOption> {
        self.index.get(key).map(|i| &self.entries[*i].1)
    }

    fn get_mut(&mut self, key: &OptionKey) -> Option<&mut UserOption> {
        let position = self.index.get(key).copied()?;
        Some(&mut self.entries[position].1)
    }

    /// Register a machine-global option. Module options are the only
    /// names that may contain a period.
    pub fn add_system_option(&mut self, key: OptionKey, option: UserOption) -> Result<()> {
        ensure!(
            !key.name.contains('.'),
            error::InternalSnafu {
                message: format!(
                    "non-module option has a period in its name {}.",
                    key.name
                ),
            }
        );
        self.add_system_option_internal(key, option)
    }

    fn add_system_option_internal(&mut self, key: OptionKey, option: UserOption) -> Result<()> {
        let key = self.canonicalize_key(&key);
        if self.contains(&key) {
            return Ok(());
        }
        self.insert(key.clone(), option);
        self.apply_pending(&key)?;
        Ok(())
    }

    pub fn add_module_option(
        &mut self,
        module: &str,
        key: OptionKey,
        option: UserOption,
    ) -> Result<()> {
        ensure!(
            key.name.starts_with(&format!("{}.", module)),
            error::InternalSnafu {
                message: format!(
                    "module option name {} does not start with module prefix {}.",
                    key.name, module
                ),
            }
        );
        self.module_options.insert(key.clone());
        self.add_system_option_internal(key, option)
    }

    /// Register an option declared by a project's option file. The key
    /// must carry its owning subproject (empty string for the top level).
    pub fn add_project_option(&mut self, key: OptionKey, option: UserOption) -> Result<()> {
        ensure!(
            key.subproject.is_some(),
            error::InternalSnafu {
                message: format!("project option {} has no subproject scope.", key.name),
            }
        );
        ensure!(
            !self.contains(&key),
            error::DuplicateOptionSnafu {
                name: key.to_string(),
            }
        );
        self.insert(key.clone(), option);
        self.project_options.insert(key.clone());
        self.apply_pending(&key)?;
        Ok(())
    }

    fn apply_pending(&mut self, key: &OptionKey) -> Result<()> {
        // Command-line keys for undeclared options carry no subproject
        // scope; they match the declaration that eventually names them.
        let matches = |k: &OptionKey| {
            k.name == key.name
                && k.machine == key.machine
                && (k.subproject == key.subproject
                    || (k.subproject.is_none() && key.subproject.as_deref() == Some("")))
        };
        let mut pending = std::mem::take(&mut self.pending_project_options);
        let mut result = Ok(true);
        pending.retain(|(k, v)| {
            if matches(k) && result.is_ok() {
                result = self.set_option(&key.name, key.subproject.as_deref(), v);
                false
            } else {
                true
            }
        });
        self.pending_project_options = pending;
        result.map(|_| ())
    }

    /// Queue a command-line value for an option that has not been
    /// declared yet.
    pub fn add_pending(&mut self, key: OptionKey, value: String) {
        self.pending_project_options.push((key, value));
    }

    /// Keys that were set on the command line but never declared; used
    /// for the deferred unknown-option warning, sorted for deterministic
    /// output.
    pub fn unknown_options(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .pending_project_options
            .iter()
            .map(|(k, _)| k.to_string())
            .collect();
        names.sort();
        names
    }

    /// The prefix must be absolute; a trailing separator is dropped
    /// unless the prefix is a bare filesystem root.
    pub fn sanitize_prefix(&self, prefix: &str) -> Result<String> {
        ensure!(
            Path::new(prefix).is_absolute(),
            error::PrefixNotAbsoluteSnafu { prefix }
        );
        if (prefix.ends_with('/') || prefix.ends_with('\\')) && prefix.len() > 1 {
            // 'C:\' stays intact since 'C:' is not an absolute path.
            if !(prefix.len() == 3 && prefix.as_bytes()[1] == b':') {
                return Ok(prefix[..prefix.len() - 1].to_string());
            }
        }
        Ok(prefix.to_string())
    }

    /// Validate and store a value on an existing option.
    pub fn set_value(&mut self, key: &OptionKey, value: &OptionArg) -> Result<bool> {
        let key = self.canonicalize_key(key);
        let value = if key.name == "prefix" {
            match value {
                OptionArg::Str(s) => OptionArg::Str(self.sanitize_prefix(s)?),
                other => other.clone(),
            }
        } else {
            value.clone()
        };
        match self.get_mut(&key) {
            Some(opt) => opt.set_value(&value),
            None => error::UnknownOptionSnafu {
                name: key.to_string(),
            }
            .fail(),
        }
    }

    /// Set an option by name, applying deprecation actions. A renamed
    /// option sets both the old and the replacement key.
    pub fn set_option(
        &mut self,
        name: &str,
        subproject: Option<&str>,
        new_value: &str,
    ) -> Result<bool> {
        let key = OptionKey {
            subproject: subproject.map(|s| s.to_string()),
            machine: MachineChoice::Host,
            name: name.to_string(),
        };
        let key = self.canonicalize_key(&key);
        let opt = match self.get(&key) {
            Some(opt) => opt.clone(),
            None => {
                return error::UnknownOptionSnafu {
                    name: key.to_string(),
                }
                .fail()
            }
        };
        let mut effective = new_value.to_string();
        match &opt.deprecated {
            Deprecated::No => {}
            Deprecated::Yes => {
                self.deprecation(&key, new_value, format!("Option '{}' is deprecated", key.name));
            }
            Deprecated::Values(values) => {
                for v in opt.listify(&OptionArg::Str(new_value.to_string())) {
                    if values.contains(&v) {
                        self.deprecation(
                            &key,
                            new_value,
                            format!("Option '{}' value '{}' is deprecated", key.name, v),
                        );
                    }
                }
            }
            Deprecated::Replacements(map) => {
                let rewritten: Vec<String> = opt
                    .listify(&OptionArg::Str(new_value.to_string()))
                    .into_iter()
                    .map(|v| match map.get(&v) {
                        Some(replacement) => {
                            self.deprecation(
                                &key,
                                new_value,
                                format!(
                                    "Option '{}' value '{}' is replaced by '{}'",
                                    key.name, v, replacement
                                ),
                            );
                            replacement.clone()
                        }
                        None => v,
                    })
                    .collect();
                effective = rewritten.join(",");
            }
            Deprecated::Renamed(replacement) => {
                self.deprecation(
                    &key,
                    new_value,
                    format!("Option '{}' is replaced by '{}'", key.name, replacement),
                );
                let replacement = replacement.clone();
                let mut dirty = self.set_option(&replacement, subproject, new_value)?;
                dirty |= self.set_value(&key, &OptionArg::Str(new_value.to_string()))?;
                return Ok(dirty);
            }
        }
        self.set_value(&key, &OptionArg::Str(effective))
    }

    fn deprecation(&mut self, key: &OptionKey, value: &str, message: String) {
        // At most one warning per distinct (key, value) pair per configure.
        if self
            .emitted_deprecations
            .insert((key.to_string(), value.to_string()))
        {
            warnings::warn(message);
        }
    }

    /// Resolve a key to its effective value object, honoring yielding
    /// project options and the system-option fallback.
    pub fn get_value_object_for(&self, key: &OptionKey) -> Result<&UserOption> {
        let key = self.canonicalize_key(key);
        let potential = self.get(&key);
        if self.is_project_option(&key) {
            let opt = potential.ok_or_else(|| {
                error::UnknownOptionSnafu {
                    name: key.to_string(),
                }
                .build()
            })?;
            if opt.yielding {
                if let Some(parent) = self.get(&key.as_root()) {
                    // A parent of a different concrete type disables
                    // yielding silently.
                    if parent.same_type(opt) {
                        return Ok(parent);
                    }
                }
            }
            Ok(opt)
        } else {
            match potential {
                Some(opt) => Ok(opt),
                None => {
                    let parent = key.as_system();
                    self.get(&parent).ok_or_else(|| {
                        error::UnknownOptionSnafu {
                            name: key.to_string(),
                        }
                        .build()
                    })
                }
            }
        }
    }

    /// Resolve a key to its effective value, applying any augment on top
    /// of the base object.
    pub fn get_value_for(&self, name: &str, subproject: Option<&str>) -> Result<OptionValue> {
        let key = OptionKey {
            subproject: subproject.map(|s| s.to_string()),
            machine: MachineChoice::Host,
            name: name.to_string(),
        };
        self.get_value_for_key(&key)
    }

    pub fn get_value_for_key(&self, key: &OptionKey) -> Result<OptionValue> {
        let object = self.get_value_object_for(key)?;
        if key.subproject.is_some() {
            if let Some(augment) = self.augments.get(&key.to_string()) {
                return object.validate_value(&OptionArg::Str(augment.clone()));
            }
        }
        Ok(object.value.clone())
    }

    /// Apply the `-D`, `-A` and `-U` command-line sets in that order.
    pub fn set_from_configure_command(
        &mut self,
        defines: &[String],
        augments: &[String],
        undefines: &[String],
    ) -> Result<()> {
        for define in defines {
            let (keystr, valstr) = split_define(define)?;
            if self.augments.contains_key(keystr) {
                self.augments.insert(keystr.to_string(), valstr.to_string());
                continue;
            }
            let key = OptionKey::from_string(keystr);
            if self.contains(&key) {
                self.set_option(&key.name, key.subproject.as_deref(), valstr)?;
            } else {
                let project_key = key.as_root();
                if self.contains(&project_key) {
                    self.set_option(
                        &project_key.name,
                        project_key.subproject.as_deref(),
                        valstr,
                    )?;
                } else {
                    self.add_pending(key, valstr.to_string());
                }
            }
        }
        for augment in augments {
            let (keystr, valstr) = split_define(augment)?;
            ensure!(
                !self.augments.contains_key(keystr),
                error::DuplicateAugmentSnafu { key: keystr }
            );
            self.augments.insert(keystr.to_string(), valstr.to_string());
        }
        for undefine in undefines {
            self.augments.remove(undefine);
        }
        Ok(())
    }

    /// Record subproject default options as augments; existing augments
    /// (e.g. from the command line) win.
    pub fn add_subproject_defaults(&mut self, subproject: &str, defaults: &[String]) -> Result<()> {
        for entry in defaults {
            let (keystr, valstr) = split_define(entry)?;
            let scoped = format!("{}:{}", subproject, keystr);
            self.augments.entry(scoped).or_insert_with(|| valstr.to_string());
        }
        Ok(())
    }

    pub fn is_reserved_name(&self, key: &OptionKey) -> bool {
        is_reserved_option_name(&key.name)
    }
}

fn split_define(entry: &str) -> Result<(&str, &str)> {
    entry.split_once('=').ok_or_else(|| {
        error::MissingEqualsSnafu { option: entry }.build()
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn store_with_builtins() -> OptionStore {
        let mut store = OptionStore::new(false);
        crate::options::register_builtin_options(&mut store, None).unwrap();
        store
    }

    #[test]
    fn builtin_defaults_resolve() {
        let store = store_with_builtins();
        assert_eq!(
            store.get_value_for("libdir", None).unwrap(),
            OptionValue::Str("lib".to_string())
        );
        assert_eq!(
            store.get_value_for("buildtype", None).unwrap(),
            OptionValue::Str("debug".to_string())
        );
    }

    #[test]
    fn prefix_usr_flips_sysconfdir_default() {
        let mut store = OptionStore::new(false);
        crate::options::register_builtin_options(&mut store, Some("/usr")).unwrap();
        assert_eq!(
            store.get_value_for("sysconfdir", None).unwrap(),
            OptionValue::Str("/etc".to_string())
        );
        assert_eq!(
            store.get_value_for("localstatedir", None).unwrap(),
            OptionValue::Str("/var".to_string())
        );
    }

    #[test]
    fn prefix_is_sanitized_on_set() {
        let mut store = store_with_builtins();
        store
            .set_value(
                &OptionKey::new("prefix"),
                &OptionArg::Str("/opt/app/".to_string()),
            )
            .unwrap();
        assert_eq!(
            store.get_value_for("prefix", None).unwrap(),
            OptionValue::Str("/opt/app".to_string())
        );
        // A bare root keeps its separator.
        store
            .set_value(&OptionKey::new("prefix"), &OptionArg::Str("/".to_string()))
            .unwrap();
        assert_eq!(
            store.get_value_for("prefix", None).unwrap(),
            OptionValue::Str("/".to_string())
        );
    }

    #[test]
    fn relative_prefix_is_rejected() {
        let mut store = store_with_builtins();
        assert!(matches!(
            store.set_value(
                &OptionKey::new("prefix"),
                &OptionArg::Str("relative/path".to_string())
            ),
            Err(OptionError::PrefixNotAbsolute { .. })
        ));
    }

    #[test]
    fn build_machine_keys_fall_back_to_host_when_native() {
        let mut store = store_with_builtins();
        let mut key = OptionKey::new("debug");
        key.machine = MachineChoice::Build;
        store.set_value(&key, &OptionArg::Bool(false)).unwrap();
        assert_eq!(
            store.get_value_for("debug", None).unwrap(),
            OptionValue::Bool(false)
        );
    }

    #[test]
    fn project_option_falls_back_to_system_scope() {
        let store = store_with_builtins();
        // Requesting a builtin through a project scope finds the system
        // option.
        assert_eq!(
            store.get_value_for("werror", Some("")).unwrap(),
            OptionValue::Bool(false)
        );
    }

    #[test]
    fn yielding_project_option_delegates_to_root() {
        let mut store = store_with_builtins();
        let root = UserOption::string("shared", "", "root-value").unwrap();
        store
            .add_project_option(OptionKey::project("shared", ""), root)
            .unwrap();
        let sub = UserOption::string("shared", "", "sub-value")
            .unwrap()
            .yielding(true);
        store
            .add_project_option(OptionKey::project("shared", "mysub"), sub)
            .unwrap();
        assert_eq!(
            store.get_value_for("shared", Some("mysub")).unwrap(),
            OptionValue::Str("root-value".to_string())
        );
    }

    #[test]
    fn yielding_with_mismatched_types_stays_local() {
        let mut store = store_with_builtins();
        let root = UserOption::boolean("shared", "", true).unwrap();
        store
            .add_project_option(OptionKey::project("shared", ""), root)
            .unwrap();
        let sub = UserOption::string("shared", "", "sub-value")
            .unwrap()
            .yielding(true);
        store
            .add_project_option(OptionKey::project("shared", "mysub"), sub)
            .unwrap();
        assert_eq!(
            store.get_value_for("shared", Some("mysub")).unwrap(),
            OptionValue::Str("sub-value".to_string())
        );
    }

    #[test]
    fn augment_overrides_resolved_value() {
        let mut store = store_with_builtins();
        let opt = UserOption::string("opt", "", "base").unwrap();
        store
            .add_project_option(OptionKey::project("opt", "sub"), opt)
            .unwrap();
        store
            .set_from_configure_command(&[], &["sub:opt=augmented".to_string()], &[])
            .unwrap();
        assert_eq!(
            store.get_value_for("opt", Some("sub")).unwrap(),
            OptionValue::Str("augmented".to_string())
        );
        // -U removes the augment again.
        store
            .set_from_configure_command(&[], &[], &["sub:opt".to_string()])
            .unwrap();
        assert_eq!(
            store.get_value_for("opt", Some("sub")).unwrap(),
            OptionValue::Str("base".to_string())
        );
    }

    #[test]
    fn duplicate_augment_is_an_error() {
        let mut store = store_with_builtins();
        store
            .set_from_configure_command(&[], &["sub:opt=a".to_string()], &[])
            .unwrap();
        assert!(matches!(
            store.set_from_configure_command(&[], &["sub:opt=b".to_string()], &[]),
            Err(OptionError::DuplicateAugment { .. })
        ));
    }

    #[test]
    fn pending_option_applies_once_declared() {
        let mut store = store_with_builtins();
        store
            .set_from_configure_command(&["level=c".to_string()], &[], &[])
            .unwrap();
        assert_eq!(store.unknown_options(), vec!["level".to_string()]);
        let choices = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let opt =
            UserOption::combo("level", "", choices, &OptionArg::Str("b".to_string())).unwrap();
        store
            .add_project_option(OptionKey::project("level", ""), opt)
            .unwrap();
        assert!(store.unknown_options().is_empty());
        assert_eq!(
            store.get_value_for("level", Some("")).unwrap(),
            OptionValue::Str("c".to_string())
        );
    }

    #[test]
    fn renamed_option_sets_both_keys() {
        let mut store = store_with_builtins();
        let new_opt = UserOption::string("new_opt", "", "old").unwrap();
        store
            .add_project_option(OptionKey::project("new_opt", ""), new_opt)
            .unwrap();
        let old_opt = UserOption::string("old_opt", "", "old")
            .unwrap()
            .deprecated(Deprecated::Renamed("new_opt".to_string()));
        store
            .add_project_option(OptionKey::project("old_opt", ""), old_opt)
            .unwrap();
        store.set_option("old_opt", Some(""), "migrated").unwrap();
        assert_eq!(
            store.get_value_for("new_opt", Some("")).unwrap(),
            OptionValue::Str("migrated".to_string())
        );
        assert_eq!(
            store.get_value_for("old_opt", Some("")).unwrap(),
            OptionValue::Str("migrated".to_string())
        );
    }

    #[test]
    fn replacement_values_rewrite() {
        let mut store = store_with_builtins();
        let mut map = BTreeMap::new();
        map.insert("old".to_string(), "new".to_string());
        let choices = vec!["new".to_string(), "other".to_string()];
        let opt = UserOption::combo("mode", "", choices, &OptionArg::Str("other".to_string()))
            .unwrap()
            .deprecated(Deprecated::Replacements(map));
        store
            .add_project_option(OptionKey::project("mode", ""), opt)
            .unwrap();
        store.set_option("mode", Some(""), "old").unwrap();
        assert_eq!(
            store.get_value_for("mode", Some("")).unwrap(),
            OptionValue::Str("new".to_string())
        );
    }

    #[test]
    fn backend_sets_identically_from_flag_and_define_paths() {
        // --backend goes through set_value, -Dbackend through
        // set_option; the two must agree.
        let mut store = store_with_builtins();
        store.set_option("backend", None, "xcode").unwrap();
        assert_eq!(
            store.get_value_for("backend", None).unwrap(),
            OptionValue::Str("xcode".to_string())
        );
        store
            .set_value(
                &OptionKey::new("backend"),
                &OptionArg::Str("none".to_string()),
            )
            .unwrap();
        assert_eq!(
            store.get_value_for("backend", None).unwrap(),
            OptionValue::Str("none".to_string())
        );
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut store = OptionStore::new(false);
        for name in ["zeta", "alpha", "mid"] {
            let opt = UserOption::string(name, "", "").unwrap();
            store
                .add_system_option(OptionKey::new(name), opt)
                .unwrap();
        }
        let names: Vec<&str> = store.iter().map(|(k, _)| k.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn duplicate_project_option_is_fatal() {
        let mut store = OptionStore::new(false);
        let opt = UserOption::string("dup", "", "").unwrap();
        store
            .add_project_option(OptionKey::project("dup", ""), opt.clone())
            .unwrap();
        assert!(matches!(
            store.add_project_option(OptionKey::project("dup", ""), opt),
            Err(OptionError::DuplicateOption { .. })
        ));
    }

    #[test]
    fn store_round_trips_through_serde() {
        let mut store = store_with_builtins();
        let opt = UserOption::string("custom", "a custom option", "v").unwrap();
        store
            .add_project_option(OptionKey::project("custom", ""), opt)
            .unwrap();
        let payload = serde_json::to_string(&store).unwrap();
        let mut restored: OptionStore = serde_json::from_str(&payload).unwrap();
        restored.rebuild_index();
        assert_eq!(
            restored.get_value_for("custom", Some("")).unwrap(),
            OptionValue::Str("v".to_string())
        );
        let before: Vec<String> = store.iter().map(|(k, _)| k.to_string()).collect();
        let after: Vec<String> = restored.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(before, after);
    }
}
