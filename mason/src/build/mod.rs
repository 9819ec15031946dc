/*!
# The build graph

Accumulates the typed entities a configure run declares: build targets,
custom targets, run targets, tests, install rules and the per-language
argument tables. Targets live in an arena in declaration order; every
cross-reference between entities is an index into that arena, which keeps
iteration deterministic and the graph cycle-free by construction.

*/
mod target;

pub use target::{
    BuildTarget, CommandItem, CustomTarget, ExtractedObjects, GeneratedList, Generator,
    GeneratorExe, IncludeDirs, ObjectItem, RunTarget, SourceItem, Target, TargetKind,
};

use crate::compilers::{Compiler, Language, StaticLinker};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

/// A file in the source or build tree. Equality and hashing are
/// structural over all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct File {
    pub is_built: bool,
    pub subdir: String,
    pub fname: String,
}

impl File {
    pub fn from_source_file(source_root: &Path, subdir: &str, fname: &str) -> Result<File, String> {
        if !source_root.join(subdir).join(fname).is_file() {
            return Err(format!("File {} does not exist.", fname));
        }
        Ok(File {
            is_built: false,
            subdir: subdir.to_string(),
            fname: fname.to_string(),
        })
    }

    pub fn from_built_file(subdir: &str, fname: &str) -> File {
        File {
            is_built: true,
            subdir: subdir.to_string(),
            fname: fname.to_string(),
        }
    }

    pub fn rel_to_builddir(&self, build_to_src: &str) -> PathBuf {
        if self.is_built {
            Path::new(&self.subdir).join(&self.fname)
        } else {
            Path::new(build_to_src).join(&self.subdir).join(&self.fname)
        }
    }
}

impl Display for File {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.subdir.is_empty() {
            write!(f, "{}", self.fname)
        } else {
            write!(f, "{}/{}", self.subdir, self.fname)
        }
    }
}

/// Index of a target in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u32);

/// Index of a generator in the build's generator table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeneratorId(pub u32);

/// Target names the build system needs for itself.
pub const FORBIDDEN_TARGET_NAMES: &[&str] = &[
    "clean",
    "clean-gcno",
    "clean-gcda",
    "coverage-text",
    "coverage-xml",
    "coverage-html",
    "phony",
    "PHONY",
    "all",
    "test",
    "benchmark",
    "install",
    "build.ninja",
];

#[derive(Debug, Default)]
pub struct TargetArena {
    entries: Vec<Target>,
    index: HashMap<String, u32>,
}

impl TargetArena {
    /// Insert a target, failing when its unique id is already taken.
    pub fn insert(&mut self, target: Target) -> Result<TargetId, String> {
        let unique_id = target.unique_id();
        if self.index.contains_key(&unique_id) {
            return Err(target.name().to_string());
        }
        let id = TargetId(self.entries.len() as u32);
        self.index.insert(unique_id, id.0);
        self.entries.push(target);
        Ok(id)
    }

    pub fn get(&self, id: TargetId) -> &Target {
        &self.entries[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TargetId) -> &mut Target {
        &mut self.entries[id.0 as usize]
    }

    pub fn lookup(&self, unique_id: &str) -> Option<TargetId> {
        self.index.get(unique_id).copied().map(TargetId)
    }

    /// Targets in declaration order, which back-ends must preserve.
    pub fn iter(&self) -> impl Iterator<Item = (TargetId, &Target)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, t)| (TargetId(i as u32), t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Installable header set.
#[derive(Debug, Clone)]
pub struct Headers {
    pub source_subdir: String,
    pub sources: Vec<String>,
    pub install_subdir: String,
    pub custom_install_dir: Option<String>,
}

/// Installable man pages. Sources must carry a section suffix 1-8.
#[derive(Debug, Clone)]
pub struct Man {
    pub source_subdir: String,
    pub sources: Vec<String>,
    pub custom_install_dir: Option<String>,
}

impl Man {
    pub fn validate_sources(sources: &[String]) -> Result<(), String> {
        for s in sources {
            let section = s
                .rsplit('.')
                .next()
                .and_then(|suffix| suffix.parse::<u32>().ok());
            match section {
                Some(n) if (1..=8).contains(&n) => {}
                _ => {
                    return Err(
                        "Man file must have a file extension of a number between 1 and 8"
                            .to_string(),
                    )
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Data {
    pub in_sourcetree: bool,
    pub source_subdir: String,
    pub sources: Vec<String>,
    pub install_dir: String,
}

#[derive(Debug, Clone)]
pub struct InstallDir {
    pub source_subdir: String,
    pub installable_subdir: String,
    pub install_dir: String,
}

#[derive(Debug, Clone)]
pub struct GettextTranslation {
    pub package_name: String,
    pub languages: Vec<String>,
    pub subdir: String,
}

#[derive(Debug, Clone)]
pub struct PkgConfigGenerator {
    pub libraries: Vec<TargetId>,
    pub subdirs: Vec<String>,
    pub name: String,
    pub description: String,
    pub version: String,
    pub filebase: String,
}

/// How a test invokes its executable.
#[derive(Debug, Clone)]
pub enum TestExe {
    Target(TargetId),
    Program(Vec<String>),
}

#[derive(Debug, Clone)]
pub enum TestArg {
    Str(String),
    File(File),
    Target(TargetId),
}

#[derive(Debug, Clone)]
pub struct Test {
    pub name: String,
    pub exe: TestExe,
    pub is_parallel: bool,
    pub cmd_args: Vec<TestArg>,
    pub env: Vec<(String, String)>,
    pub should_fail: bool,
    pub timeout: i64,
    pub valgrind_args: Vec<String>,
}

/// Everything a configure run accumulates for the back-end.
#[derive(Debug, Default)]
pub struct Build {
    pub project_name: String,
    /// Subproject name (empty for the root) to project name.
    pub projects: BTreeMap<String, String>,
    /// Project name to declared version.
    pub project_versions: BTreeMap<String, String>,
    pub targets: TargetArena,
    pub generators: Vec<Generator>,
    pub tests: Vec<Test>,
    pub benchmarks: Vec<Test>,
    pub headers: Vec<Headers>,
    pub man: Vec<Man>,
    pub data: Vec<Data>,
    pub install_dirs: Vec<InstallDir>,
    pub global_args: BTreeMap<Language, Vec<String>>,
    /// Per-subproject argument tables from `add_project_arguments`.
    pub project_args: BTreeMap<(String, Language), Vec<String>>,
    pub compilers: Vec<Compiler>,
    pub cross_compilers: Vec<Compiler>,
    pub static_linker: Option<StaticLinker>,
    pub static_cross_linker: Option<StaticLinker>,
    pub pot: Vec<GettextTranslation>,
    pub pkgconfig_gens: Vec<PkgConfigGenerator>,
    pub subprojects: BTreeSet<String>,
}

impl Build {
    pub fn new() -> Build {
        Build::default()
    }

    pub fn add_compiler(&mut self, compiler: Compiler) {
        if self.compilers.iter().all(|c| c.language != compiler.language) {
            self.compilers.push(compiler);
        }
    }

    pub fn add_cross_compiler(&mut self, compiler: Compiler) {
        if self
            .cross_compilers
            .iter()
            .all(|c| c.language != compiler.language)
        {
            self.cross_compilers.push(compiler);
        }
    }

    pub fn find_compiler(&self, language: Language, native: bool) -> Option<&Compiler> {
        let list = if native {
            &self.compilers
        } else {
            &self.cross_compilers
        };
        list.iter().find(|c| c.language == language)
    }

    pub fn add_generator(&mut self, generator: Generator) -> GeneratorId {
        let id = GeneratorId(self.generators.len() as u32);
        self.generators.push(generator);
        id
    }

    pub fn generator(&self, id: GeneratorId) -> &Generator {
        &self.generators[id.0 as usize]
    }

    /// Languages used across a target's sources, in stable order.
    pub fn target_languages(&self, id: TargetId) -> BTreeSet<Language> {
        match self.targets.get(id) {
            Target::Build(t) => t.languages.clone(),
            _ => BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn file_equality_is_structural() {
        let a = File::from_built_file("sub", "x.c");
        let b = File::from_built_file("sub", "x.c");
        let c = File::from_built_file("", "x.c");
        assert_eq!(a, b);
        assert_ne!(a, c);
        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn built_files_resolve_relative_to_build_dir() {
        let built = File::from_built_file("sub", "gen.c");
        assert_eq!(built.rel_to_builddir(".."), PathBuf::from("sub/gen.c"));
        let source = File {
            is_built: false,
            subdir: "sub".to_string(),
            fname: "main.c".to_string(),
        };
        assert_eq!(
            source.rel_to_builddir(".."),
            PathBuf::from("../sub/main.c")
        );
    }

    #[test]
    fn arena_preserves_declaration_order_and_rejects_duplicates() {
        let mut arena = TargetArena::default();
        let first = Target::Run(RunTarget {
            name: "first".to_string(),
            command: "true".to_string(),
            args: Vec::new(),
            subdir: String::new(),
        });
        let second = Target::Run(RunTarget {
            name: "second".to_string(),
            command: "true".to_string(),
            args: Vec::new(),
            subdir: String::new(),
        });
        let id1 = arena.insert(first.clone()).unwrap();
        let id2 = arena.insert(second).unwrap();
        assert_eq!(id1, TargetId(0));
        assert_eq!(id2, TargetId(1));
        let names: Vec<&str> = arena.iter().map(|(_, t)| t.name()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(arena.insert(first).is_err());
    }

    #[test]
    fn man_sections_validate() {
        assert!(Man::validate_sources(&["tool.1".to_string(), "conf.5".to_string()]).is_ok());
        assert!(Man::validate_sources(&["tool.9".to_string()]).is_err());
        assert!(Man::validate_sources(&["tool.txt".to_string()]).is_err());
    }

    #[test]
    fn compiler_registration_deduplicates_by_language() {
        let mut build = Build::new();
        let gcc = Compiler::new("gcc", Language::C, "12", vec!["cc".to_string()], false, None);
        let clang = Compiler::new("clang", Language::C, "15", vec!["clang".to_string()], false, None);
        build.add_compiler(gcc);
        build.add_compiler(clang);
        assert_eq!(build.compilers.len(), 1);
        assert_eq!(build.compilers[0].id, "gcc");
    }
}
