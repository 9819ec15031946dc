use crate::diagnostics::Diagnostic;
use snafu::Snafu;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum WrapError {
    #[snafu(display("Invalid format of package file {}", path.display()))]
    InvalidFormat { path: PathBuf },

    #[snafu(display("Wrap file for {package} is missing key '{key}'"))]
    MissingKey { package: String, key: String },

    #[snafu(display("Failed to build download client: {source}"))]
    Client { source: reqwest::Error },

    #[snafu(display("Failed to download {url}: {source}"))]
    Download { url: String, source: reqwest::Error },

    #[snafu(display("Download of {url} failed with status {status}"))]
    DownloadStatus { url: String, status: u16 },

    #[snafu(display(
        "Incorrect hash for {what} {package}: expected {expected}, actual {actual}."
    ))]
    HashMismatch {
        what: String,
        package: String,
        expected: String,
        actual: String,
    },

    #[snafu(display("Unsupported archive format: {}", path.display()))]
    UnsupportedArchive { path: PathBuf },

    #[snafu(display("Failed to extract archive '{}': {message}", path.display()))]
    Extraction { path: PathBuf, message: String },

    #[snafu(display("git {action} failed for subproject {package}"))]
    Git { action: String, package: String },

    #[snafu(display("Could not execute git: {source}"))]
    GitMissing { source: io::Error },

    #[snafu(display("Wrap filesystem error on '{}': {}", path.display(), source))]
    Filesystem { path: PathBuf, source: io::Error },
}

impl From<WrapError> for Diagnostic {
    fn from(err: WrapError) -> Self {
        Diagnostic::wrap(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WrapError>;
