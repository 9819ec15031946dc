/*!
Compiler records and the language model.

A [`Compiler`] is the typed result of a successful version probe: the
family id, parsed version, the exact argv prefix to invoke it with, and
whether it targets the cross machine. Argument spelling differs only
between the gcc-like and msvc-like families, so the record is data plus a
small amount of per-family behavior rather than a type per vendor.

*/
pub mod checks;

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Language {
    C,
    Cpp,
    ObjC,
    ObjCpp,
    Java,
    Cs,
    Vala,
    Rust,
    Fortran,
}

impl Language {
    pub fn from_name(name: &str) -> Option<Language> {
        let lang = match name {
            "c" => Language::C,
            "cpp" => Language::Cpp,
            "objc" => Language::ObjC,
            "objcpp" => Language::ObjCpp,
            "java" => Language::Java,
            "cs" => Language::Cs,
            "vala" => Language::Vala,
            "rust" => Language::Rust,
            "fortran" => Language::Fortran,
            _ => return None,
        };
        Some(lang)
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::ObjC => "objc",
            Language::ObjCpp => "objcpp",
            Language::Java => "java",
            Language::Cs => "cs",
            Language::Vala => "vala",
            Language::Rust => "rust",
            Language::Fortran => "fortran",
        }
    }

    pub fn source_suffixes(self) -> &'static [&'static str] {
        match self {
            Language::C => &["c"],
            Language::Cpp => &["cc", "cpp", "cxx", "c++"],
            Language::ObjC => &["m"],
            Language::ObjCpp => &["mm"],
            Language::Java => &["java"],
            Language::Cs => &["cs"],
            Language::Vala => &["vala", "vapi"],
            Language::Rust => &["rs"],
            Language::Fortran => &["f", "f90", "f95"],
        }
    }

    /// The suffix used for check snippets of this language.
    pub fn snippet_suffix(self) -> &'static str {
        self.source_suffixes()[0]
    }

    /// Environment variables contributing compile and link flags.
    pub fn flag_env_vars(self) -> (&'static [&'static str], &'static [&'static str]) {
        match self {
            Language::C => (&["CFLAGS", "CPPFLAGS"], &["CFLAGS", "LDFLAGS"]),
            Language::Cpp => (&["CXXFLAGS", "CPPFLAGS"], &["CXXFLAGS", "LDFLAGS"]),
            Language::ObjC => (&["OBJCFLAGS", "CPPFLAGS"], &["OBJCFLAGS", "LDFLAGS"]),
            Language::ObjCpp => (&["OBJCXXFLAGS", "CPPFLAGS"], &["OBJCXXFLAGS", "LDFLAGS"]),
            Language::Fortran => (&["FFLAGS"], &["FFLAGS", "LDFLAGS"]),
            _ => (&[], &[]),
        }
    }
}

const HEADER_SUFFIXES: &[&str] = &["h", "hh", "hpp", "hxx"];
const OBJECT_SUFFIXES: &[&str] = &["o", "obj"];

fn suffix_of(fname: &str) -> Option<&str> {
    fname.rsplit_once('.').map(|(_, suffix)| suffix)
}

pub fn is_header(fname: &str) -> bool {
    suffix_of(fname).is_some_and(|s| HEADER_SUFFIXES.contains(&s))
}

pub fn is_object(fname: &str) -> bool {
    suffix_of(fname).is_some_and(|s| OBJECT_SUFFIXES.contains(&s))
}

/// Classify a file name by suffix. Headers and objects classify as their
/// own categories, not as compilable sources.
pub fn language_of(fname: &str) -> Option<Language> {
    let suffix = suffix_of(fname)?;
    for lang in [
        Language::C,
        Language::Cpp,
        Language::ObjC,
        Language::ObjCpp,
        Language::Java,
        Language::Cs,
        Language::Vala,
        Language::Rust,
        Language::Fortran,
    ] {
        if lang.source_suffixes().contains(&suffix) {
            return Some(lang);
        }
    }
    None
}

pub fn is_source(fname: &str) -> bool {
    language_of(fname).is_some()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compiler {
    pub id: String,
    pub language: Language,
    pub version: String,
    pub exelist: Vec<String>,
    pub is_cross: bool,
    pub exe_wrapper: Option<String>,
}

impl Compiler {
    pub fn new(
        id: impl Into<String>,
        language: Language,
        version: impl Into<String>,
        exelist: Vec<String>,
        is_cross: bool,
        exe_wrapper: Option<String>,
    ) -> Self {
        Compiler {
            id: id.into(),
            language,
            version: version.into(),
            exelist,
            is_cross,
            exe_wrapper,
        }
    }

    pub fn is_msvc_like(&self) -> bool {
        self.id == "msvc"
    }

    pub fn can_compile(&self, fname: &str) -> bool {
        language_of(fname) == Some(self.language)
    }

    pub fn compile_only_args(&self) -> Vec<String> {
        if self.is_msvc_like() {
            vec!["/c".to_string()]
        } else {
            vec!["-c".to_string()]
        }
    }

    pub fn output_args(&self, outname: &str) -> Vec<String> {
        if self.is_msvc_like() {
            vec![format!("/Fe{}", outname)]
        } else {
            vec!["-o".to_string(), outname.to_string()]
        }
    }

    /// A one-line description for the configure log.
    pub fn banner(&self) -> String {
        format!("{} ({} {})", self.exelist.join(" "), self.id, self.version)
    }
}

/// The static archiver, classified into the `ar` family or MSVC `lib`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticLinker {
    pub id: String,
    pub exelist: Vec<String>,
}
