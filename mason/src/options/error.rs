use crate::diagnostics::Diagnostic;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum OptionError {
    #[snafu(display("{message}"))]
    Validation { message: String },

    #[snafu(display("Option name {name} is reserved."))]
    ReservedName { name: String },

    #[snafu(display("Option names can only contain letters, numbers or dashes."))]
    BadName,

    #[snafu(display("Combo option must have a non-empty choices list."))]
    EmptyChoices,

    #[snafu(display("Tried to access unknown option \"{name}\"."))]
    UnknownOption { name: String },

    #[snafu(display("Tried to redeclare option \"{name}\"."))]
    DuplicateOption { name: String },

    #[snafu(display("prefix value '{prefix}' must be an absolute path"))]
    PrefixNotAbsolute { prefix: String },

    #[snafu(display(
        "Tried to add augment to option {key}, which already has an augment. Set it with -D instead."
    ))]
    DuplicateAugment { key: String },

    #[snafu(display("Option '{option}' must have a value separated by equals sign."))]
    MissingEquals { option: String },

    #[snafu(display("Internal error: {message}"))]
    Internal { message: String },
}

impl From<OptionError> for Diagnostic {
    fn from(err: OptionError) -> Self {
        match err {
            OptionError::Internal { ref message } => Diagnostic::internal(message.clone()),
            other => Diagnostic::option(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, OptionError>;
