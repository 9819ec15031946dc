use crate::{ParseError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Id(String),
    Str(String),
    Num(i64),
    True,
    False,
    If,
    Elif,
    Else,
    Endif,
    Foreach,
    Endforeach,
    And,
    Or,
    Not,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,
    Assign,
    PlusAssign,
    Eq,
    Ne,
    Plus,
    Minus,
    Star,
    Slash,
    /// Statement terminator. Suppressed inside parentheses and brackets.
    Eol,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Id(name) => format!("identifier '{name}'"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Num(_) => "number".to_string(),
            TokenKind::Eol => "end of line".to_string(),
            other => format!("'{}'", other.lexeme()),
        }
    }

    fn lexeme(&self) -> &'static str {
        match self {
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::If => "if",
            TokenKind::Elif => "elif",
            TokenKind::Else => "else",
            TokenKind::Endif => "endif",
            TokenKind::Foreach => "foreach",
            TokenKind::Endforeach => "endforeach",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Not => "not",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Assign => "=",
            TokenKind::PlusAssign => "+=",
            TokenKind::Eq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            _ => "",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub col: usize,
}

fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "if" => TokenKind::If,
        "elif" => TokenKind::Elif,
        "else" => TokenKind::Else,
        "endif" => TokenKind::Endif,
        "foreach" => TokenKind::Foreach,
        "endforeach" => TokenKind::Endforeach,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        _ => return None,
    };
    Some(kind)
}

/// Tokenize one source file. Newlines terminate statements except inside
/// parentheses or brackets, where expressions may span lines.
pub fn lex(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut line = 1;
    let mut col = 1;
    let mut depth: usize = 0;

    macro_rules! push {
        ($kind:expr, $line:expr, $col:expr) => {
            tokens.push(Token {
                kind: $kind,
                line: $line,
                col: $col,
            })
        };
    }

    while pos < chars.len() {
        let c = chars[pos];
        let tline = line;
        let tcol = col;
        match c {
            '\n' => {
                if depth == 0 {
                    // Collapse runs of blank lines into a single terminator.
                    if !matches!(tokens.last().map(|t: &Token| &t.kind), Some(TokenKind::Eol) | None) {
                        push!(TokenKind::Eol, tline, tcol);
                    }
                }
                pos += 1;
                line += 1;
                col = 1;
            }
            ' ' | '\t' | '\r' => {
                pos += 1;
                col += 1;
            }
            '#' => {
                while pos < chars.len() && chars[pos] != '\n' {
                    pos += 1;
                }
            }
            '\'' => {
                pos += 1;
                col += 1;
                let mut value = String::new();
                loop {
                    if pos >= chars.len() || chars[pos] == '\n' {
                        return Err(ParseError::UnterminatedString {
                            line: tline,
                            col: tcol,
                        });
                    }
                    match chars[pos] {
                        '\'' => {
                            pos += 1;
                            col += 1;
                            break;
                        }
                        '\\' if pos + 1 < chars.len() => {
                            match chars[pos + 1] {
                                '\'' => value.push('\''),
                                '\\' => value.push('\\'),
                                'n' => value.push('\n'),
                                't' => value.push('\t'),
                                other => {
                                    value.push('\\');
                                    value.push(other);
                                }
                            }
                            pos += 2;
                            col += 2;
                        }
                        other => {
                            value.push(other);
                            pos += 1;
                            col += 1;
                        }
                    }
                }
                push!(TokenKind::Str(value), tline, tcol);
            }
            '0'..='9' => {
                let mut value: i64 = 0;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    value = value * 10 + (chars[pos] as i64 - '0' as i64);
                    pos += 1;
                    col += 1;
                }
                push!(TokenKind::Num(value), tline, tcol);
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = pos;
                while pos < chars.len()
                    && (chars[pos].is_ascii_alphanumeric() || chars[pos] == '_')
                {
                    pos += 1;
                    col += 1;
                }
                let word: String = chars[start..pos].iter().collect();
                match keyword(&word) {
                    Some(kind) => push!(kind, tline, tcol),
                    None => push!(TokenKind::Id(word), tline, tcol),
                }
            }
            '(' => {
                depth += 1;
                push!(TokenKind::LParen, tline, tcol);
                pos += 1;
                col += 1;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                push!(TokenKind::RParen, tline, tcol);
                pos += 1;
                col += 1;
            }
            '[' => {
                depth += 1;
                push!(TokenKind::LBracket, tline, tcol);
                pos += 1;
                col += 1;
            }
            ']' => {
                depth = depth.saturating_sub(1);
                push!(TokenKind::RBracket, tline, tcol);
                pos += 1;
                col += 1;
            }
            ',' => {
                push!(TokenKind::Comma, tline, tcol);
                pos += 1;
                col += 1;
            }
            ':' => {
                push!(TokenKind::Colon, tline, tcol);
                pos += 1;
                col += 1;
            }
            '.' => {
                push!(TokenKind::Dot, tline, tcol);
                pos += 1;
                col += 1;
            }
            '=' => {
                if pos + 1 < chars.len() && chars[pos + 1] == '=' {
                    push!(TokenKind::Eq, tline, tcol);
                    pos += 2;
                    col += 2;
                } else {
                    push!(TokenKind::Assign, tline, tcol);
                    pos += 1;
                    col += 1;
                }
            }
            '!' => {
                if pos + 1 < chars.len() && chars[pos + 1] == '=' {
                    push!(TokenKind::Ne, tline, tcol);
                    pos += 2;
                    col += 2;
                } else {
                    return Err(ParseError::UnexpectedCharacter {
                        ch: '!',
                        line: tline,
                        col: tcol,
                    });
                }
            }
            '+' => {
                if pos + 1 < chars.len() && chars[pos + 1] == '=' {
                    push!(TokenKind::PlusAssign, tline, tcol);
                    pos += 2;
                    col += 2;
                } else {
                    push!(TokenKind::Plus, tline, tcol);
                    pos += 1;
                    col += 1;
                }
            }
            '-' => {
                push!(TokenKind::Minus, tline, tcol);
                pos += 1;
                col += 1;
            }
            '*' => {
                push!(TokenKind::Star, tline, tcol);
                pos += 1;
                col += 1;
            }
            '/' => {
                push!(TokenKind::Slash, tline, tcol);
                pos += 1;
                col += 1;
            }
            other => {
                return Err(ParseError::UnexpectedCharacter {
                    ch: other,
                    line: tline,
                    col: tcol,
                });
            }
        }
    }
    if !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eol) | None) {
        push!(TokenKind::Eol, line, col);
    }
    Ok(tokens)
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_function_call() {
        assert_eq!(
            kinds("project('demo', 'c')"),
            vec![
                TokenKind::Id("project".to_string()),
                TokenKind::LParen,
                TokenKind::Str("demo".to_string()),
                TokenKind::Comma,
                TokenKind::Str("c".to_string()),
                TokenKind::RParen,
                TokenKind::Eol,
            ]
        );
    }

    #[test]
    fn newlines_inside_parens_do_not_terminate() {
        let toks = kinds("f(a,\n  b)\n");
        assert_eq!(toks.iter().filter(|k| **k == TokenKind::Eol).count(), 1);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r"x = 'it\'s\n'"),
            vec![
                TokenKind::Id("x".to_string()),
                TokenKind::Assign,
                TokenKind::Str("it's\n".to_string()),
                TokenKind::Eol,
            ]
        );
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let toks = kinds("a = 1 # set a\nb = 2\n");
        assert_eq!(toks.iter().filter(|k| **k == TokenKind::Num(1)).count(), 1);
        assert_eq!(toks.iter().filter(|k| **k == TokenKind::Num(2)).count(), 1);
    }

    #[test]
    fn operators_disambiguate() {
        assert_eq!(
            kinds("a += b == c != d"),
            vec![
                TokenKind::Id("a".to_string()),
                TokenKind::PlusAssign,
                TokenKind::Id("b".to_string()),
                TokenKind::Eq,
                TokenKind::Id("c".to_string()),
                TokenKind::Ne,
                TokenKind::Id("d".to_string()),
                TokenKind::Eol,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(matches!(
            lex("x = 'oops"),
            Err(ParseError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn bare_bang_is_an_error() {
        assert!(matches!(
            lex("x = !y"),
            Err(ParseError::UnexpectedCharacter { ch: '!', .. })
        ));
    }

    #[test]
    fn positions_are_tracked() {
        let toks = lex("a = 1\nbb = 2\n").unwrap();
        let bb = toks
            .iter()
            .find(|t| t.kind == TokenKind::Id("bb".to_string()))
            .unwrap();
        assert_eq!((bb.line, bb.col), (2, 1));
    }
}
