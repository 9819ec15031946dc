/*!
Persisted configure state.

`meson-private/coredata.dat` records the option store, detected
compilers, external lookup caches and per-target GUIDs, so that a
reconfigure resolves identically to the run that wrote it. The file is
written only after a successful configure, through the atomic-rename
helper.

*/
use crate::common::write_atomic;
use crate::compilers::Compiler;
use crate::env::error::{self, Result};
use crate::options::OptionStore;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Format version; bumped when the payload shape changes. A mismatch is
/// treated as a corrupt file rather than guessed at.
pub const COREDATA_VERSION: u32 = 1;

/// Cached result of an external dependency lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepRecord {
    pub name: String,
    pub found: bool,
    pub version: Option<String>,
    pub compile_args: Vec<String>,
    pub link_args: Vec<String>,
}

impl DepRecord {
    pub fn not_found(name: impl Into<String>) -> Self {
        DepRecord {
            name: name.into(),
            found: false,
            version: None,
            compile_args: Vec::new(),
            link_args: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CoreData {
    pub version: u32,
    pub cross_file: Option<PathBuf>,
    pub options: OptionStore,
    /// Detected compilers keyed by language name. Each (language,
    /// is_cross) pair is probed at most once per configure.
    pub compilers: BTreeMap<String, Compiler>,
    pub cross_compilers: BTreeMap<String, Compiler>,
    /// `find_program` cache; `None` records a failed lookup.
    pub ext_progs: BTreeMap<String, Option<Vec<String>>>,
    /// `find_library` cache.
    pub ext_libs: BTreeMap<String, Option<PathBuf>>,
    /// `dependency()` cache keyed by the dependency identifier.
    pub deps: BTreeMap<String, DepRecord>,
    /// Stable per-target GUIDs for backends that need them.
    pub target_guids: BTreeMap<String, String>,
    /// Imported module names.
    pub modules: BTreeSet<String>,
}

impl CoreData {
    pub fn new(is_cross: bool, cross_file: Option<PathBuf>) -> Self {
        CoreData {
            version: COREDATA_VERSION,
            cross_file,
            options: OptionStore::new(is_cross),
            compilers: BTreeMap::new(),
            cross_compilers: BTreeMap::new(),
            ext_progs: BTreeMap::new(),
            ext_libs: BTreeMap::new(),
            deps: BTreeMap::new(),
            target_guids: BTreeMap::new(),
            modules: BTreeSet::new(),
        }
    }

    pub fn load(path: &Path) -> Result<CoreData> {
        let data = fs::read(path).map_err(|e| {
            error::CoreDataCorruptSnafu {
                path,
                message: e.to_string(),
            }
            .build()
        })?;
        let mut coredata: CoreData = serde_json::from_slice(&data).map_err(|e| {
            error::CoreDataCorruptSnafu {
                path,
                message: e.to_string(),
            }
            .build()
        })?;
        if coredata.version != COREDATA_VERSION {
            return error::CoreDataCorruptSnafu {
                path,
                message: format!(
                    "version {} is not supported by this build (expected {})",
                    coredata.version, COREDATA_VERSION
                ),
            }
            .fail();
        }
        coredata.options.rebuild_index();
        Ok(coredata)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let payload =
            serde_json::to_vec_pretty(self).expect("coredata serialization cannot fail");
        write_atomic(path, &payload).context(error::CoreDataWriteSnafu { path })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compilers::Language;
    use crate::options::{register_builtin_options, OptionValue};
    use tempfile::TempDir;

    fn sample() -> CoreData {
        let mut coredata = CoreData::new(false, None);
        register_builtin_options(&mut coredata.options, Some("/usr")).unwrap();
        coredata.compilers.insert(
            Language::C.name().to_string(),
            Compiler::new("gcc", Language::C, "12.2.0", vec!["cc".to_string()], false, None),
        );
        coredata
            .ext_progs
            .insert("sed".to_string(), Some(vec!["/usr/bin/sed".to_string()]));
        coredata.ext_progs.insert("frobnicate".to_string(), None);
        coredata
            .target_guids
            .insert("prog@exe".to_string(), "123E4567-E89B-12D3".to_string());
        coredata
    }

    #[test]
    fn save_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coredata.dat");
        let original = sample();
        original.save(&path).unwrap();
        let restored = CoreData::load(&path).unwrap();
        assert_eq!(
            restored.options.get_value_for("sysconfdir", None).unwrap(),
            OptionValue::Str("/etc".to_string())
        );
        assert_eq!(restored.compilers["c"], original.compilers["c"]);
        assert_eq!(restored.ext_progs, original.ext_progs);
        assert_eq!(restored.target_guids, original.target_guids);
        // Saving the restored store produces the identical payload.
        let a = serde_json::to_string(&original).unwrap();
        let b = serde_json::to_string(&restored).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coredata.dat");
        let mut coredata = sample();
        coredata.version = 999;
        coredata.save(&path).unwrap();
        assert!(CoreData::load(&path).is_err());
    }

    #[test]
    fn truncated_file_is_corrupt_not_a_panic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coredata.dat");
        fs::write(&path, b"{\"version\":").unwrap();
        assert!(CoreData::load(&path).is_err());
    }
}
