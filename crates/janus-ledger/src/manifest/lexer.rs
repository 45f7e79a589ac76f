//! Tokens for the `janus.pkg` format

use logos::Logos;

use super::ManifestError;

/// The kind of token produced by the lexer
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"([ \t\r\f]+|//[^\n]*)")]
pub(crate) enum TokenKind {
    #[regex(r"[A-Za-z_][A-Za-z0-9_-]*")]
    Ident,

    /// Double-quoted, backslash escapes kept raw until [`unescape`].
    #[regex(r#""([^"\\]|\\.)*""#)]
    Str,

    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,

    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("=")]
    Eq,
    #[token(";")]
    Semi,

    /// Nodes end at a newline (or `;`).
    #[token("\n")]
    Newline,
}

/// A token with its source text, 1-based line and byte span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token<'src> {
    pub(crate) kind: TokenKind,
    pub(crate) text: &'src str,
    pub(crate) line: usize,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl Token<'_> {
    /// Short human description for error messages.
    pub(crate) fn describe(&self) -> String {
        match self.kind {
            TokenKind::Newline => "end of line".to_string(),
            _ => format!("'{}'", self.text),
        }
    }
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token<'_>>, ManifestError> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);
    let mut line = 1;
    let mut counted_to = 0;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        line += source[counted_to..span.start].matches('\n').count();
        counted_to = span.start;

        let text = lexer.slice();
        match result {
            Ok(kind) => tokens.push(Token {
                kind,
                text,
                line,
                start: span.start,
                end: span.end,
            }),
            Err(()) => {
                return Err(ManifestError::InvalidToken {
                    line,
                    text: text.to_string(),
                });
            }
        }
    }

    Ok(tokens)
}

/// Whether `s` lexes as a single bare identifier.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Strip the quotes from a string token and resolve its escapes.
pub(crate) fn unescape(token: &Token<'_>) -> Result<String, ManifestError> {
    let inner = &token.text[1..token.text.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(other) => {
                return Err(ManifestError::InvalidEscape {
                    line: token.line,
                    ch: other,
                });
            }
            None => {
                return Err(ManifestError::InvalidEscape {
                    line: token.line,
                    ch: '\\',
                });
            }
        }
    }

    Ok(out)
}
