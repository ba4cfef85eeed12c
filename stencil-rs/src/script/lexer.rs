//! Template tokenizer.
//!
//! The lexer runs in one of three modes:
//!
//! | Mode | Entered by | Left by | Produces |
//! |------|------------|---------|----------|
//! | text | start, `@}`, `:}` | `{@`, `{:` | one [`TokenKind::Text`] per literal run |
//! | code | `{@` | `@}` | keywords, identifiers, literals, operators |
//! | ref  | `{:` | `:}` | same as code |
//!
//! Lexing stops at the first error.

use std::fmt;

use super::error::{Error, Result};

// ── Position ──────────────────────────────────────────────────────────────────

/// 1-based line/column of a token's first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Literal text copied verbatim.
    Text(String),
    BlockOpen,  // {@
    BlockClose, // @}
    RefOpen,    // {:
    RefClose,   // :}

    Ident(String),
    Int(i64),
    Str(String),

    // Keywords
    If,
    Elif,
    Else,
    For,
    End,
    Import,
    As,
    From,
    Def,
    Return,
    Break,
    Continue,
    Nil,
    True,
    False,
    And,
    Or,
    Not,
    In,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    Assign,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // Punctuation
    Dot,
    Comma,
    Colon,
    Semicolon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Text(_) => "text",
            TokenKind::BlockOpen => "{@",
            TokenKind::BlockClose => "@}",
            TokenKind::RefOpen => "{:",
            TokenKind::RefClose => ":}",
            TokenKind::Ident(name) => return write!(f, "identifier '{name}'"),
            TokenKind::Int(n) => return write!(f, "integer {n}"),
            TokenKind::Str(_) => "string literal",
            TokenKind::If => "if",
            TokenKind::Elif => "elif",
            TokenKind::Else => "else",
            TokenKind::For => "for",
            TokenKind::End => "end",
            TokenKind::Import => "import",
            TokenKind::As => "as",
            TokenKind::From => "from",
            TokenKind::Def => "def",
            TokenKind::Return => "return",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Nil => "nil",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Not => "not",
            TokenKind::In => "in",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::PlusAssign => "+=",
            TokenKind::MinusAssign => "-=",
            TokenKind::StarAssign => "*=",
            TokenKind::SlashAssign => "/=",
            TokenKind::Assign => "=",
            TokenKind::Eq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::Le => "<=",
            TokenKind::Ge => ">=",
            TokenKind::Dot => ".",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Eof => "end of input",
        };
        write!(f, "'{s}'")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "if" => TokenKind::If,
        "elif" => TokenKind::Elif,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        "end" => TokenKind::End,
        "import" => TokenKind::Import,
        "as" => TokenKind::As,
        "from" => TokenKind::From,
        "def" => TokenKind::Def,
        "return" => TokenKind::Return,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "nil" => TokenKind::Nil,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "in" => TokenKind::In,
        _ => return None,
    })
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    Code,
    Ref,
}

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    col: usize,
    mode: Mode,
    /// Position of the delimiter that opened the current block.
    opened_at: Pos,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            pos: 0,
            line: 1,
            col: 1,
            mode: Mode::Text,
            opened_at: Pos::default(),
        }
    }

    fn here(&self) -> Pos {
        Pos {
            line: self.line,
            col: self.col,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek2(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Tokenize the whole source.  The returned stream always ends in `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let tok = match self.mode {
                Mode::Text => self.next_text(),
                Mode::Code | Mode::Ref => self.next_code()?,
            };
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    // ── Text mode ─────────────────────────────────────────────────────────────

    fn next_text(&mut self) -> Token {
        let start = self.here();
        if let Some(kind) = self.open_delimiter() {
            self.opened_at = start;
            return Token { kind, pos: start };
        }
        if self.peek().is_none() {
            return Token {
                kind: TokenKind::Eof,
                pos: start,
            };
        }

        let from = self.pos;
        while self.peek().is_some() && !self.at_open_delimiter() {
            self.advance();
        }
        Token {
            kind: TokenKind::Text(self.src[from..self.pos].to_owned()),
            pos: start,
        }
    }

    fn at_open_delimiter(&self) -> bool {
        let rest = self.rest();
        rest.starts_with("{@") || rest.starts_with("{:")
    }

    /// Consume `{@` or `{:` and switch mode.
    fn open_delimiter(&mut self) -> Option<TokenKind> {
        let rest = self.rest();
        let (kind, mode) = if rest.starts_with("{@") {
            (TokenKind::BlockOpen, Mode::Code)
        } else if rest.starts_with("{:") {
            (TokenKind::RefOpen, Mode::Ref)
        } else {
            return None;
        };
        self.advance();
        self.advance();
        self.mode = mode;
        Some(kind)
    }

    // ── Code mode ─────────────────────────────────────────────────────────────

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    fn next_code(&mut self) -> Result<Token> {
        self.skip_ws();
        let pos = self.here();
        let tok = |kind| Ok(Token { kind, pos });

        let ch = match self.peek() {
            Some(c) => c,
            None => {
                let what = if self.mode == Mode::Code { "{@" } else { "{:" };
                return Err(Error::lex(format!("unterminated '{what}' block"), self.opened_at));
            }
        };

        // Closing delimiters.
        if self.mode == Mode::Code && ch == '@' && self.peek2() == Some('}') {
            self.advance();
            self.advance();
            self.mode = Mode::Text;
            return tok(TokenKind::BlockClose);
        }
        if self.mode == Mode::Ref && ch == ':' && self.peek2() == Some('}') {
            self.advance();
            self.advance();
            self.mode = Mode::Text;
            return tok(TokenKind::RefClose);
        }

        self.advance();
        match ch {
            '0'..='9' => self.read_int(ch, pos),
            '"' => self.read_string(pos),
            'a'..='z' | 'A'..='Z' | '_' => tok(self.read_word(ch)),
            '+' => tok(if self.eat('=') { TokenKind::PlusAssign } else { TokenKind::Plus }),
            '-' => tok(if self.eat('=') { TokenKind::MinusAssign } else { TokenKind::Minus }),
            '*' => tok(if self.eat('=') { TokenKind::StarAssign } else { TokenKind::Star }),
            '/' => tok(if self.eat('=') { TokenKind::SlashAssign } else { TokenKind::Slash }),
            '=' => tok(if self.eat('=') { TokenKind::Eq } else { TokenKind::Assign }),
            '!' => {
                if self.eat('=') {
                    tok(TokenKind::Ne)
                } else {
                    Err(Error::lex("unexpected character '!'", pos))
                }
            }
            '<' => tok(if self.eat('=') { TokenKind::Le } else { TokenKind::Lt }),
            '>' => tok(if self.eat('=') { TokenKind::Ge } else { TokenKind::Gt }),
            '.' => tok(TokenKind::Dot),
            ',' => tok(TokenKind::Comma),
            ':' => tok(TokenKind::Colon),
            ';' => tok(TokenKind::Semicolon),
            '(' => tok(TokenKind::LParen),
            ')' => tok(TokenKind::RParen),
            '[' => tok(TokenKind::LBracket),
            ']' => tok(TokenKind::RBracket),
            '{' => tok(TokenKind::LBrace),
            '}' => tok(TokenKind::RBrace),
            c => Err(Error::lex(format!("unexpected character '{c}'"), pos)),
        }
    }

    fn read_int(&mut self, first: char, pos: Pos) -> Result<Token> {
        let mut s = String::new();
        s.push(first);
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            s.push(c);
            self.advance();
        }
        let n = s
            .parse::<i64>()
            .map_err(|_| Error::lex(format!("integer literal {s} is too large"), pos))?;
        Ok(Token {
            kind: TokenKind::Int(n),
            pos,
        })
    }

    fn read_string(&mut self, pos: Pos) -> Result<Token> {
        let mut s = String::new();
        loop {
            let esc_pos = self.here();
            match self.advance() {
                None => return Err(Error::lex("unterminated string literal", pos)),
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('0') => s.push('\0'),
                    Some('\\') => s.push('\\'),
                    Some('"') => s.push('"'),
                    Some('\'') => s.push('\''),
                    Some(c) => {
                        return Err(Error::lex(format!("invalid escape sequence '\\{c}'"), esc_pos))
                    }
                    None => return Err(Error::lex("unterminated string literal", pos)),
                },
                Some(c) => s.push(c),
            }
        }
        Ok(Token {
            kind: TokenKind::Str(s),
            pos,
        })
    }

    fn read_word(&mut self, first: char) -> TokenKind {
        let mut s = String::new();
        s.push(first);
        while let Some(c) = self.peek().filter(|c| c.is_ascii_alphanumeric() || *c == '_') {
            s.push(c);
            self.advance();
        }
        keyword(&s).unwrap_or(TokenKind::Ident(s))
    }
}

/// Tokenize a template source.
pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    Lexer::new(src).tokenize()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::error::ErrorKind;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src)
            .expect("tokenize failed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn plain_text_is_one_token() {
        assert_eq!(
            kinds("hello\nworld"),
            vec![TokenKind::Text("hello\nworld".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn empty_source() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn ref_block() {
        assert_eq!(
            kinds("a{: 1 + 2 :}b"),
            vec![
                TokenKind::Text("a".into()),
                TokenKind::RefOpen,
                TokenKind::Int(1),
                TokenKind::Plus,
                TokenKind::Int(2),
                TokenKind::RefClose,
                TokenKind::Text("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn code_block_keywords_and_operators() {
        assert_eq!(
            kinds("{@ if x >= 10: y += 1 end @}"),
            vec![
                TokenKind::BlockOpen,
                TokenKind::If,
                TokenKind::Ident("x".into()),
                TokenKind::Ge,
                TokenKind::Int(10),
                TokenKind::Colon,
                TokenKind::Ident("y".into()),
                TokenKind::PlusAssign,
                TokenKind::Int(1),
                TokenKind::End,
                TokenKind::BlockClose,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn colon_brace_inside_code_block_is_not_a_ref_close() {
        assert_eq!(
            kinds("{@ d = {\"a\":} @}"),
            vec![
                TokenKind::BlockOpen,
                TokenKind::Ident("d".into()),
                TokenKind::Assign,
                TokenKind::LBrace,
                TokenKind::Str("a".into()),
                TokenKind::Colon,
                TokenKind::RBrace,
                TokenKind::BlockClose,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#"{: "a\n\"b\"\\" :}"#)[1],
            TokenKind::Str("a\n\"b\"\\".into())
        );
    }

    #[test]
    fn invalid_escape_is_lex_error() {
        let err = tokenize(r#"{: "\q" :}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lex);
    }

    #[test]
    fn unterminated_block_reports_opener() {
        let err = tokenize("line1\n  {@ x = 1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lex);
        assert_eq!(err.pos(), Some(Pos { line: 2, col: 3 }));
    }

    #[test]
    fn unterminated_string() {
        assert_eq!(tokenize("{: \"abc :}").unwrap_err().kind(), ErrorKind::Lex);
    }

    #[test]
    fn invalid_character() {
        let err = tokenize("{@ x = 1 $ @}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lex);
        assert_eq!(err.pos(), Some(Pos { line: 1, col: 10 }));
    }

    #[test]
    fn integer_overflow() {
        assert_eq!(
            tokenize("{: 99999999999999999999 :}").unwrap_err().kind(),
            ErrorKind::Lex
        );
    }

    #[test]
    fn positions_track_lines() {
        let toks = tokenize("ab\n{@\n  foo @}").unwrap();
        assert_eq!(toks[1].pos, Pos { line: 2, col: 1 });
        assert_eq!(toks[2].pos, Pos { line: 3, col: 3 });
    }

    #[test]
    fn unicode_text_passes_through() {
        assert_eq!(
            kinds("héllo {: \"wörld\" :}"),
            vec![
                TokenKind::Text("héllo ".into()),
                TokenKind::RefOpen,
                TokenKind::Str("wörld".into()),
                TokenKind::RefClose,
                TokenKind::Eof,
            ]
        );
    }
}
