/*!
The build description language shared by `meson.build` and
`meson_options.txt`.

This crate owns the token and AST definitions plus the lexer and recursive
descent parser. It knows nothing about evaluation; both the option-file
interpreter and the main interpreter consume the same `Node` tree.

*/
mod lexer;
mod parser;

pub use lexer::{lex, Token, TokenKind};
pub use parser::{parse, Args, ArithOp, CmpOp, IfBranch, Node, NodeKind};

use snafu::Snafu;

/// Syntax errors. The parser has no error recovery; the first error aborts.
/// Callers attach the file name when reporting.
#[derive(Debug, Snafu)]
pub enum ParseError {
    #[snafu(display("lexer error at {line}:{col}: unexpected character '{ch}'"))]
    UnexpectedCharacter { ch: char, line: usize, col: usize },

    #[snafu(display("lexer error at {line}:{col}: unterminated string literal"))]
    UnterminatedString { line: usize, col: usize },

    #[snafu(display("parse error at {line}:{col}: expected {expected}, got {found}"))]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        col: usize,
    },

    #[snafu(display("parse error: premature end of file, expected {expected}"))]
    PrematureEof { expected: String },
}

impl ParseError {
    /// Source position of the error, when one is known.
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            ParseError::UnexpectedCharacter { line, col, .. }
            | ParseError::UnterminatedString { line, col }
            | ParseError::UnexpectedToken { line, col, .. } => Some((*line, *col)),
            ParseError::PrematureEof { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
