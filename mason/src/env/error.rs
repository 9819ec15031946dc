use crate::diagnostics::Diagnostic;
use snafu::Snafu;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EnvError {
    #[snafu(display("Unknown compiler(s): \"{tried}\""))]
    UnknownCompiler { tried: String },

    #[snafu(display("Unknown static linker \"{linker}\""))]
    UnknownStaticLinker { linker: String },

    #[snafu(display("Could not execute static linker \"{linker}\"."))]
    StaticLinkerExecution { linker: String },

    #[snafu(display("Failed to read machine file '{}': {}", path.display(), source))]
    MachineFileRead { path: PathBuf, source: io::Error },

    #[snafu(display("Malformed line {line} in machine file: {content}"))]
    MachineFileLine { line: usize, content: String },

    #[snafu(display("Malformed variable name {name} in machine file."))]
    MachineFileName { name: String },

    #[snafu(display("Malformed value in machine file variable {name}."))]
    MachineFileValue { name: String },

    #[snafu(display("Cross info file must have either host or a target machine."))]
    CrossFileMissingMachine,

    #[snafu(display("Cross file is missing \"{section}\"."))]
    CrossFileMissingSection { section: String },

    #[snafu(display(
        "Cross file defines both a host and a target machine. Cross-building a cross \
         compiler is not supported."
    ))]
    CrossBuildingCrossCompiler,

    #[snafu(display("Machine section {section} is missing entry \"{entry}\"."))]
    MachineEntryMissing { section: String, entry: String },

    #[snafu(display("Failed to create directory '{}': {}", path.display(), source))]
    DirCreation { path: PathBuf, source: io::Error },

    #[snafu(display("Build data file '{}' is corrupted: {message}", path.display()))]
    CoreDataCorrupt { path: PathBuf, message: String },

    #[snafu(display("Failed to write '{}': {}", path.display(), source))]
    CoreDataWrite { path: PathBuf, source: io::Error },
}

impl From<EnvError> for Diagnostic {
    fn from(err: EnvError) -> Self {
        Diagnostic::environment(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EnvError>;
