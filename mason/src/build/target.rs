use super::{File, GeneratorId, TargetId};
use crate::compilers::{self, Language};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Executable,
    StaticLibrary,
    SharedLibrary,
    Jar,
}

impl TargetKind {
    /// Short suffix folded into the unique id so an executable and a
    /// library may share a name.
    pub fn type_suffix(self) -> &'static str {
        match self {
            TargetKind::Executable => "exe",
            TargetKind::StaticLibrary => "sta",
            TargetKind::SharedLibrary => "sha",
            TargetKind::Jar => "jar",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            TargetKind::Executable => "executable",
            TargetKind::StaticLibrary => "static library",
            TargetKind::SharedLibrary => "shared library",
            TargetKind::Jar => "jar",
        }
    }
}

/// Deterministic unique id from `(name, type, subdir)`.
pub fn construct_target_id(name: &str, type_suffix: &str, subdir: &str) -> String {
    if subdir.is_empty() {
        format!("{}@{}", name, type_suffix)
    } else {
        format!("{}@@{}@{}", subdir.replace('/', "@"), name, type_suffix)
    }
}

#[derive(Debug, Clone)]
pub enum SourceItem {
    File(File),
    Generated(GeneratedList),
    Custom(TargetId),
}

#[derive(Debug, Clone)]
pub enum ObjectItem {
    File(File),
    Extracted(ExtractedObjects),
}

/// Objects lifted out of another target, either all of them or the ones
/// produced by a given source subset.
#[derive(Debug, Clone)]
pub struct ExtractedObjects {
    pub target: TargetId,
    /// Empty means every object of the target.
    pub srclist: Vec<File>,
}

#[derive(Debug, Clone)]
pub struct IncludeDirs {
    pub curdir: String,
    pub dirs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BuildTarget {
    pub kind: TargetKind,
    pub name: String,
    pub subdir: String,
    pub subproject: String,
    pub is_cross: bool,
    pub sources: Vec<SourceItem>,
    pub objects: Vec<ObjectItem>,
    /// Languages derived from the source suffix classification; drives
    /// which compilers the target records.
    pub languages: BTreeSet<Language>,
    pub extra_args: BTreeMap<Language, Vec<String>>,
    pub link_args: Vec<String>,
    pub link_with: Vec<TargetId>,
    pub include_dirs: Vec<IncludeDirs>,
    pub external_deps: Vec<crate::coredata::DepRecord>,
    pub install: bool,
    pub install_dir: Option<String>,
    pub build_by_default: bool,
    pub pic: bool,
    pub gui_app: bool,
}

impl BuildTarget {
    pub fn new(kind: TargetKind, name: &str, subdir: &str, subproject: &str, is_cross: bool) -> Self {
        BuildTarget {
            kind,
            name: name.to_string(),
            subdir: subdir.to_string(),
            subproject: subproject.to_string(),
            is_cross,
            sources: Vec::new(),
            objects: Vec::new(),
            languages: BTreeSet::new(),
            extra_args: BTreeMap::new(),
            link_args: Vec::new(),
            link_with: Vec::new(),
            include_dirs: Vec::new(),
            external_deps: Vec::new(),
            install: false,
            install_dir: None,
            build_by_default: true,
            pic: kind == TargetKind::SharedLibrary,
            gui_app: false,
        }
    }

    pub fn unique_id(&self) -> String {
        construct_target_id(&self.name, self.kind.type_suffix(), &self.subdir)
    }

    /// Classify static sources by suffix. Headers are carried without
    /// compiling; an unknown suffix is an error.
    pub fn classify_languages(&mut self) -> Result<(), String> {
        for item in &self.sources {
            if let SourceItem::File(f) = item {
                if compilers::is_header(&f.fname) || compilers::is_object(&f.fname) {
                    continue;
                }
                match compilers::language_of(&f.fname) {
                    Some(lang) => {
                        self.languages.insert(lang);
                    }
                    None => {
                        return Err(format!(
                            "No specified compiler can handle file {}.",
                            f.fname
                        ))
                    }
                }
            }
        }
        if self.kind == TargetKind::Jar && self.languages.iter().any(|l| *l != Language::Java) {
            return Err("Jar targets may only contain Java sources.".to_string());
        }
        Ok(())
    }

    /// Extract the objects produced by the given sources. Each file must
    /// be one of the target's own compiled sources.
    pub fn extract_objects(&self, id: TargetId, wanted: &[String]) -> Result<ExtractedObjects, String> {
        let mut srclist = Vec::new();
        for want in wanted {
            let found = self.sources.iter().find_map(|item| match item {
                SourceItem::File(f) if f.fname == *want => Some(f.clone()),
                _ => None,
            });
            match found {
                Some(f) => srclist.push(f),
                None => {
                    return Err(format!("Tried to extract unknown source {}.", want));
                }
            }
        }
        Ok(ExtractedObjects {
            target: id,
            srclist,
        })
    }

    pub fn extract_all_objects(&self, id: TargetId) -> ExtractedObjects {
        ExtractedObjects {
            target: id,
            srclist: Vec::new(),
        }
    }

    /// The on-disk file name, with platform prefixes and suffixes
    /// supplied by the environment's naming table.
    pub fn filename(&self, naming: &crate::env::ArtifactNaming) -> String {
        match self.kind {
            TargetKind::Executable => {
                if naming.exe_suffix.is_empty() {
                    self.name.clone()
                } else {
                    format!("{}.{}", self.name, naming.exe_suffix)
                }
            }
            TargetKind::StaticLibrary => format!(
                "{}{}.{}",
                naming.static_lib_prefix, self.name, naming.static_lib_suffix
            ),
            TargetKind::SharedLibrary => format!(
                "{}{}.{}",
                naming.shared_lib_prefix, self.name, naming.shared_lib_suffix
            ),
            TargetKind::Jar => format!("{}.jar", self.name),
        }
    }
}

/// A reusable rule binding a command template to input files.
#[derive(Debug, Clone)]
pub struct Generator {
    pub exe: GeneratorExe,
    pub arguments: Vec<String>,
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum GeneratorExe {
    Program(Vec<String>),
    Built(TargetId),
}

impl Generator {
    /// Output file names for one input, from the `@BASENAME@` and
    /// `@PLAINNAME@` sites in the output templates.
    pub fn outputs_for(&self, input: &File) -> Vec<String> {
        let plainname = input
            .fname
            .rsplit('/')
            .next()
            .unwrap_or(&input.fname)
            .to_string();
        let basename = match plainname.rsplit_once('.') {
            Some((stem, _)) => stem.to_string(),
            None => plainname.clone(),
        };
        self.outputs
            .iter()
            .map(|template| {
                template
                    .replace("@BASENAME@", &basename)
                    .replace("@PLAINNAME@", &plainname)
            })
            .collect()
    }
}

/// An ordered sequence of inputs bound to a generator.
#[derive(Debug, Clone)]
pub struct GeneratedList {
    pub generator: GeneratorId,
    pub infiles: Vec<File>,
    pub extra_args: Vec<String>,
}

impl GeneratedList {
    pub fn new(generator: GeneratorId) -> Self {
        GeneratedList {
            generator,
            infiles: Vec::new(),
            extra_args: Vec::new(),
        }
    }

    pub fn add_file(&mut self, file: File) {
        self.infiles.push(file);
    }
}

/// One element of a custom target command line.
#[derive(Debug, Clone)]
pub enum CommandItem {
    Str(String),
    File(File),
    Target(TargetId),
    Program(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct CustomTarget {
    pub name: String,
    pub subdir: String,
    pub command: Vec<CommandItem>,
    pub inputs: Vec<SourceItem>,
    pub outputs: Vec<String>,
    pub depfile: Option<String>,
    pub build_always: bool,
    pub install: bool,
    pub install_dir: Option<String>,
    pub depends: Vec<TargetId>,
}

impl CustomTarget {
    pub fn unique_id(&self) -> String {
        construct_target_id(&self.name, "cus", &self.subdir)
    }
}

#[derive(Debug, Clone)]
pub struct RunTarget {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub subdir: String,
}

impl RunTarget {
    pub fn unique_id(&self) -> String {
        construct_target_id(&self.name, "run", &self.subdir)
    }
}

#[derive(Debug, Clone)]
pub enum Target {
    Build(BuildTarget),
    Custom(CustomTarget),
    Run(RunTarget),
}

impl Target {
    pub fn unique_id(&self) -> String {
        match self {
            Target::Build(t) => t.unique_id(),
            Target::Custom(t) => t.unique_id(),
            Target::Run(t) => t.unique_id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Target::Build(t) => &t.name,
            Target::Custom(t) => &t.name,
            Target::Run(t) => &t.name,
        }
    }

    pub fn subdir(&self) -> &str {
        match self {
            Target::Build(t) => &t.subdir,
            Target::Custom(t) => &t.subdir,
            Target::Run(t) => &t.subdir,
        }
    }

    pub fn as_build(&self) -> Option<&BuildTarget> {
        match self {
            Target::Build(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_custom(&self) -> Option<&CustomTarget> {
        match self {
            Target::Custom(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn root_target_id_has_no_subdir_part() {
        assert_eq!(construct_target_id("prog", "exe", ""), "prog@exe");
        assert_eq!(
            construct_target_id("prog", "exe", "src/tools"),
            "src@tools@@prog@exe"
        );
    }

    #[test]
    fn same_name_different_kind_get_distinct_ids() {
        let exe = BuildTarget::new(TargetKind::Executable, "foo", "", "", false);
        let lib = BuildTarget::new(TargetKind::StaticLibrary, "foo", "", "", false);
        assert_ne!(exe.unique_id(), lib.unique_id());
    }

    #[test]
    fn classify_collects_languages_and_skips_headers() {
        let mut t = BuildTarget::new(TargetKind::Executable, "x", "", "", false);
        for fname in ["main.c", "util.cpp", "api.h", "blob.o"] {
            t.sources
                .push(SourceItem::File(File::from_built_file("", fname)));
        }
        t.classify_languages().unwrap();
        let langs: Vec<Language> = t.languages.iter().copied().collect();
        assert_eq!(langs, vec![Language::C, Language::Cpp]);
    }

    #[test]
    fn unknown_suffix_is_rejected() {
        let mut t = BuildTarget::new(TargetKind::Executable, "x", "", "", false);
        t.sources
            .push(SourceItem::File(File::from_built_file("", "data.blob")));
        assert!(t.classify_languages().is_err());
    }

    #[test]
    fn jar_targets_only_take_java() {
        let mut t = BuildTarget::new(TargetKind::Jar, "app", "", "", false);
        t.sources
            .push(SourceItem::File(File::from_built_file("", "Main.java")));
        t.sources
            .push(SourceItem::File(File::from_built_file("", "native.c")));
        assert!(t.classify_languages().is_err());
    }

    #[test]
    fn extract_objects_requires_known_sources() {
        let mut t = BuildTarget::new(TargetKind::StaticLibrary, "lib", "", "", false);
        t.sources
            .push(SourceItem::File(File::from_built_file("", "a.c")));
        let ok = t.extract_objects(TargetId(0), &["a.c".to_string()]).unwrap();
        assert_eq!(ok.srclist.len(), 1);
        assert!(t.extract_objects(TargetId(0), &["missing.c".to_string()]).is_err());
    }

    #[test]
    fn generator_expands_output_templates() {
        let gen = Generator {
            exe: GeneratorExe::Program(vec!["compile.py".to_string()]),
            arguments: vec!["@INPUT@".to_string(), "@OUTPUT@".to_string()],
            outputs: vec!["@BASENAME@.c".to_string(), "@BASENAME@.h".to_string()],
        };
        let input = File::from_built_file("", "proto.idl");
        assert_eq!(gen.outputs_for(&input), vec!["proto.c", "proto.h"]);
    }

    #[test]
    fn target_filenames_follow_platform_naming() {
        let naming = crate::env::ArtifactNaming {
            exe_suffix: "",
            shared_lib_prefix: "lib",
            shared_lib_suffix: "so",
            static_lib_prefix: "lib",
            static_lib_suffix: "a",
            object_suffix: "o",
            import_lib_suffix: "so",
        };
        let exe = BuildTarget::new(TargetKind::Executable, "prog", "", "", false);
        assert_eq!(exe.filename(&naming), "prog");
        let shared = BuildTarget::new(TargetKind::SharedLibrary, "util", "", "", false);
        assert_eq!(shared.filename(&naming), "libutil.so");
        let staticlib = BuildTarget::new(TargetKind::StaticLibrary, "util", "", "", false);
        assert_eq!(staticlib.filename(&naming), "libutil.a");
    }
}
