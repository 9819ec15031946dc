/*!
The error currency of the configure pipeline.

Every failure that can surface to the user is a [`Diagnostic`]: an error
kind from the fixed taxonomy, a message, and an optional source location.
Subsystem modules keep their own snafu error enums and convert into
`Diagnostic` at the interpreter boundary, so the driver only has to map
kinds to exit codes.

*/
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

/// Failure categories. `Internal` means an invariant was violated and maps
/// to exit code 2; everything else is a configuration error (exit code 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagKind {
    Parse,
    InvalidCode,
    InvalidArguments,
    Option,
    Environment,
    Wrap,
    Internal,
}

impl DiagKind {
    fn label(self) -> &'static str {
        match self {
            DiagKind::Parse => "ParseError",
            DiagKind::InvalidCode => "InvalidCode",
            DiagKind::InvalidArguments => "InvalidArguments",
            DiagKind::Option => "OptionError",
            DiagKind::Environment => "EnvironmentError",
            DiagKind::Wrap => "WrapError",
            DiagKind::Internal => "InternalError",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Location {
    pub file: PathBuf,
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagKind,
    pub message: String,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn new(kind: DiagKind, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            message: message.into(),
            location: None,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(DiagKind::Parse, message)
    }

    pub fn invalid_code(message: impl Into<String>) -> Self {
        Self::new(DiagKind::InvalidCode, message)
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(DiagKind::InvalidArguments, message)
    }

    pub fn option(message: impl Into<String>) -> Self {
        Self::new(DiagKind::Option, message)
    }

    pub fn environment(message: impl Into<String>) -> Self {
        Self::new(DiagKind::Environment, message)
    }

    pub fn wrap(message: impl Into<String>) -> Self {
        Self::new(DiagKind::Wrap, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(DiagKind::Internal, message)
    }

    /// Attach a source location unless one is already present. Statement
    /// evaluation uses this so the innermost location wins.
    pub fn or_location(mut self, file: impl Into<PathBuf>, line: usize, col: usize) -> Self {
        if self.location.is_none() {
            self.location = Some(Location {
                file: file.into(),
                line,
                col,
            });
        }
        self
    }

    pub fn exit_code(&self) -> i32 {
        match self.kind {
            DiagKind::Internal => 2,
            _ => 1,
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(
                f,
                "{}:{}:{}: {}: {}",
                loc.file.display(),
                loc.line,
                loc.col,
                self.kind.label(),
                self.message
            ),
            None => write!(f, "{}: {}", self.kind.label(), self.message),
        }
    }
}

impl std::error::Error for Diagnostic {}

impl From<mason_lang::ParseError> for Diagnostic {
    fn from(err: mason_lang::ParseError) -> Self {
        let position = err.position();
        let mut diag = Diagnostic::parse(err.to_string());
        if let Some((line, col)) = position {
            diag.location = Some(Location {
                file: PathBuf::new(),
                line,
                col,
            });
        }
        diag
    }
}

pub type DiagResult<T> = std::result::Result<T, Diagnostic>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn internal_errors_map_to_exit_code_two() {
        assert_eq!(Diagnostic::internal("broken").exit_code(), 2);
        assert_eq!(Diagnostic::invalid_code("bad").exit_code(), 1);
        assert_eq!(Diagnostic::wrap("bad hash").exit_code(), 1);
    }

    #[test]
    fn or_location_keeps_the_innermost() {
        let diag = Diagnostic::invalid_code("x")
            .or_location("inner.build", 3, 4)
            .or_location("outer.build", 9, 9);
        let loc = diag.location.unwrap();
        assert_eq!(loc.file, PathBuf::from("inner.build"));
        assert_eq!((loc.line, loc.col), (3, 4));
    }

    #[test]
    fn display_includes_kind_and_location() {
        let diag = Diagnostic::invalid_arguments("wrong type").or_location("meson.build", 2, 7);
        assert_eq!(
            diag.to_string(),
            "meson.build:2:7: InvalidArguments: wrong type"
        );
    }
}
