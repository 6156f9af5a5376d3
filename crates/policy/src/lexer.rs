//! Policy-language lexer.
//!
//! Turns the UTF-8 policy text into a flat token stream terminated by
//! [`TokenKind::End`]. The language has no comment syntax; whitespace only
//! separates tokens. Every token carries the 1-based line and column of its
//! first character so downstream errors can point at the source.

use thiserror::Error;

/// Terminal symbols of the policy grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    LBrace,
    RBrace,
    LParen,
    RParen,
    Plus,
    Mult,
    Colon,
    Comma,
    Equal,
    Arrow,
    Basic,
    Aware,
    Linear,
    Expr,
    Topology,
    Pg,
    PgFile,
    Ident,
    Str,
    End,
}

/// A single token with its source position.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw text. For [`TokenKind::Str`] this excludes the surrounding quotes;
    /// for [`TokenKind::End`] it is empty.
    pub text: String,
    pub line: u32,
    pub col: u32,
}

/// Lexical error: unterminated string or a character outside the language.
#[derive(Debug, Error)]
#[error("line {line}, column {col}: {reason}")]
pub struct LexError {
    pub line: u32,
    pub col: u32,
    pub reason: String,
}

/// Maps a scanned word to its keyword kind, or `Ident` if it is none.
fn keyword_kind(word: &str) -> TokenKind {
    match word {
        "topology" => TokenKind::Topology,
        "basic" => TokenKind::Basic,
        "linear" => TokenKind::Linear,
        "expr" => TokenKind::Expr,
        "aware" => TokenKind::Aware,
        "pg" => TokenKind::Pg,
        "file" => TokenKind::PgFile,
        _ => TokenKind::Ident,
    }
}

/// Lexes a complete policy source into a token vector ending in `End`.
///
/// # Errors
/// Returns [`LexError`] on an unterminated string literal or any character
/// that does not start a token.
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line: u32 = 1;
    let mut col: u32 = 1;

    while let Some(&c) = chars.peek() {
        let (tok_line, tok_col) = (line, col);
        match c {
            '\n' => {
                chars.next();
                line += 1;
                col = 1;
            }
            c if c.is_whitespace() => {
                chars.next();
                col += 1;
            }
            '{' | '}' | '(' | ')' | '+' | '*' | ':' | ',' | '=' => {
                chars.next();
                col += 1;
                let kind = match c {
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '+' => TokenKind::Plus,
                    '*' => TokenKind::Mult,
                    ':' => TokenKind::Colon,
                    ',' => TokenKind::Comma,
                    _ => TokenKind::Equal,
                };
                tokens.push(Token {
                    kind,
                    text: c.to_string(),
                    line: tok_line,
                    col: tok_col,
                });
            }
            '-' => {
                chars.next();
                col += 1;
                if chars.peek() != Some(&'>') {
                    return Err(LexError {
                        line: tok_line,
                        col: tok_col,
                        reason: "expected '>' after '-'".to_string(),
                    });
                }
                chars.next();
                col += 1;
                tokens.push(Token {
                    kind: TokenKind::Arrow,
                    text: "->".to_string(),
                    line: tok_line,
                    col: tok_col,
                });
            }
            '"' => {
                chars.next();
                col += 1;
                let mut value = String::new();
                let mut closed = false;
                for s in chars.by_ref() {
                    if s == '"' {
                        col += 1;
                        closed = true;
                        break;
                    }
                    if s == '\n' {
                        line += 1;
                        col = 1;
                    } else {
                        col += 1;
                    }
                    value.push(s);
                }
                if !closed {
                    return Err(LexError {
                        line: tok_line,
                        col: tok_col,
                        reason: "unterminated string literal".to_string(),
                    });
                }
                tokens.push(Token {
                    kind: TokenKind::Str,
                    text: value,
                    line: tok_line,
                    col: tok_col,
                });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&s) = chars.peek() {
                    if !s.is_ascii_alphanumeric() && s != '_' && s != '.' {
                        break;
                    }
                    chars.next();
                    col += 1;
                    word.push(s);
                }
                tokens.push(Token {
                    kind: keyword_kind(&word),
                    text: word,
                    line: tok_line,
                    col: tok_col,
                });
            }
            other => {
                return Err(LexError {
                    line: tok_line,
                    col: tok_col,
                    reason: format!("unrecognized character '{other}'"),
                });
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::End,
        text: String::new(),
        line,
        col,
    });
    Ok(tokens)
}
