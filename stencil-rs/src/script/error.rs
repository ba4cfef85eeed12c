//! Error taxonomy for the template language.
//!
//! Every stage (lexing, parsing, evaluation) reports failures as an
//! [`Error`]; the first error aborts the unit.  Callers that only care about
//! the category use [`Error::kind`].

use std::fmt;

use thiserror::Error;

use super::lexer::Pos;

/// Category of an [`Error`], independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Lex,
    Parse,
    Type,
    Name,
    Arity,
    Range,
    Key,
    Arithmetic,
    Recursion,
    Import,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Lex => "LexError",
            ErrorKind::Parse => "ParseError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Name => "NameError",
            ErrorKind::Arity => "ArityError",
            ErrorKind::Range => "RangeError",
            ErrorKind::Key => "KeyError",
            ErrorKind::Arithmetic => "ArithmeticError",
            ErrorKind::Recursion => "RecursionError",
            ErrorKind::Import => "ImportError",
        };
        f.write_str(s)
    }
}

/// A single template error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{pos}: {msg}")]
    Lex { msg: String, pos: Pos },

    #[error("{pos}: {msg}")]
    Parse { msg: String, pos: Pos },

    #[error("{0}")]
    Type(String),

    #[error("\"{0}\" is not defined")]
    Name(String),

    #[error("{what} takes {expected} argument(s) but {found} were given")]
    Arity {
        what: String,
        expected: String,
        found: usize,
    },

    #[error("index {index} out of range (length {len})")]
    Range { index: i64, len: usize },

    #[error("key \"{0}\" not found")]
    Key(String),

    #[error("{0}")]
    Arithmetic(String),

    #[error("maximum recursion depth ({0}) exceeded")]
    Recursion(usize),

    #[error("{0}")]
    Import(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Lex { .. } => ErrorKind::Lex,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::Type(_) => ErrorKind::Type,
            Error::Name(_) => ErrorKind::Name,
            Error::Arity { .. } => ErrorKind::Arity,
            Error::Range { .. } => ErrorKind::Range,
            Error::Key(_) => ErrorKind::Key,
            Error::Arithmetic(_) => ErrorKind::Arithmetic,
            Error::Recursion(_) => ErrorKind::Recursion,
            Error::Import(_) => ErrorKind::Import,
        }
    }

    /// Source position, when the error is tied to one.
    pub fn pos(&self) -> Option<Pos> {
        match self {
            Error::Lex { pos, .. } | Error::Parse { pos, .. } => Some(*pos),
            _ => None,
        }
    }

    pub(crate) fn lex(msg: impl Into<String>, pos: Pos) -> Self {
        Error::Lex { msg: msg.into(), pos }
    }

    pub(crate) fn parse(msg: impl Into<String>, pos: Pos) -> Self {
        Error::Parse { msg: msg.into(), pos }
    }

    pub(crate) fn arity(what: impl Into<String>, expected: impl ToString, found: usize) -> Self {
        Error::Arity {
            what: what.into(),
            expected: expected.to_string(),
            found,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The ordered error list handed back by the compilation façade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render_list(.0))]
pub struct Errors(pub Vec<Error>);

impl Errors {
    pub fn first(&self) -> Option<&Error> {
        self.0.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Error> for Errors {
    fn from(e: Error) -> Self {
        Errors(vec![e])
    }
}

impl IntoIterator for Errors {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn render_list(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {e}", e.kind()))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_pos() {
        let e = Error::parse("unexpected token", Pos { line: 2, col: 5 });
        assert_eq!(e.kind(), ErrorKind::Parse);
        assert_eq!(e.pos(), Some(Pos { line: 2, col: 5 }));
        assert_eq!(Error::Key("k".into()).pos(), None);
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            Error::Range { index: 10, len: 3 }.to_string(),
            "index 10 out of range (length 3)"
        );
        assert_eq!(
            Error::arity("f", 2, 1).to_string(),
            "f takes 2 argument(s) but 1 were given"
        );
    }

    #[test]
    fn error_list_renders_one_per_line() {
        let errs = Errors(vec![
            Error::Name("x".into()),
            Error::Arithmetic("division by zero".into()),
        ]);
        assert_eq!(
            errs.to_string(),
            "NameError: \"x\" is not defined\nArithmeticError: division by zero"
        );
    }
}
