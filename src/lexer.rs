//! Two-level lexer.
//!
//! [`split_segments`] cuts the template into raw text and tag spans.
//! [`Tokenizer`] then turns the inside of one tag into [`Token`]s.
//!
//! Closing delimiters are only recognized outside string literals, so
//! `{{ " }} " }}` is a single output tag.

use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Text,
    /// `{{ ... }}`
    Output,
    /// `{% ... %}`
    Logic,
    /// `{# ... #}`
    Comment,
}

impl SegmentKind {
    fn close(self) -> &'static str {
        match self {
            SegmentKind::Output => "}}",
            SegmentKind::Logic => "%}",
            SegmentKind::Comment => "#}",
            SegmentKind::Text => "",
        }
    }
}

/// One slice of the template: raw text, or the inside of a tag with the
/// delimiters stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub kind: SegmentKind,
    pub source: &'a str,
    /// Byte offset of `source` within the template.
    pub position: usize,
}

/// Split `template` into text and tag segments. With `trim_blocks`, a
/// single newline directly after `%}` is dropped.
pub fn split_segments(template: &str, trim_blocks: bool) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    while cursor < template.len() {
        let rest = &template[cursor..];
        let Some((idx, kind)) = find_open(rest) else {
            segments.push(Segment {
                kind: SegmentKind::Text,
                source: rest,
                position: cursor,
            });
            break;
        };

        if idx > 0 {
            segments.push(Segment {
                kind: SegmentKind::Text,
                source: &rest[..idx],
                position: cursor,
            });
        }

        let open_at = cursor + idx;
        let inner_start = open_at + 2;
        let inner_end = find_close(template, inner_start, kind, open_at)?;
        segments.push(Segment {
            kind,
            source: &template[inner_start..inner_end],
            position: inner_start,
        });
        cursor = inner_end + 2;

        if trim_blocks && kind == SegmentKind::Logic {
            let after = &template[cursor..];
            if after.starts_with('\n') {
                cursor += 1;
            } else if after.starts_with("\r\n") {
                cursor += 2;
            }
        }
    }

    Ok(segments)
}

fn find_open(rest: &str) -> Option<(usize, SegmentKind)> {
    let bytes = rest.as_bytes();
    rest.match_indices('{').find_map(|(i, _)| {
        let kind = match bytes.get(i + 1) {
            Some(b'{') => SegmentKind::Output,
            Some(b'%') => SegmentKind::Logic,
            Some(b'#') => SegmentKind::Comment,
            _ => return None,
        };
        Some((i, kind))
    })
}

/// Scan for the closing delimiter, tracking quote state byte by byte.
/// Delimiters and quotes are ASCII, so byte scanning never splits a
/// multi-byte character that matters.
///
/// In output tags, braces of mapping literals are counted too: `}}` only
/// closes the tag at brace depth zero, so `{{ {"a": {"b": 1}}.a.b }}` and
/// `{{ {"a": 1}}}` are single tags.
fn find_close(template: &str, start: usize, kind: SegmentKind, open_at: usize) -> Result<usize> {
    let bytes = template.as_bytes();
    let close = kind.close().as_bytes();
    let mut quote: Option<(u8, usize)> = None;
    let mut braces = 0usize;
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some((q, _)) => {
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                if b == q {
                    quote = None;
                }
            }
            None => {
                if kind == SegmentKind::Output {
                    match b {
                        b'{' => {
                            braces += 1;
                            i += 1;
                            continue;
                        }
                        b'}' if braces > 0 => {
                            braces -= 1;
                            i += 1;
                            continue;
                        }
                        _ => {}
                    }
                }
                if bytes[i..].starts_with(close) {
                    return Ok(i);
                }
                // Comments are free text; apostrophes there are not quotes.
                if kind != SegmentKind::Comment && (b == b'"' || b == b'\'') {
                    quote = Some((b, i));
                }
            }
        }
        i += 1;
    }

    match quote {
        Some((_, at)) => Err(Error::lex("unterminated string literal", at)),
        None => Err(Error::lex(
            format!("unterminated tag, expected `{}`", kind.close()),
            open_at,
        )),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    True,
    False,
    Null,
    And,
    Or,
    Not,
    In,

    // Operators
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Percent,  // %
    Tilde,    // ~
    EqEq,     // ==
    NotEq,    // !=
    Lt,       // <
    LtEq,     // <=
    Gt,       // >
    GtEq,     // >=
    AndAnd,   // &&
    OrOr,     // ||
    Bang,     // !
    Assign,   // =
    Question, // ?

    // Punctuation
    Dot,      // .
    Comma,    // ,
    Colon,    // :
    Pipe,     // |
    LBracket, // [
    RBracket, // ]
    LParen,   // (
    RParen,   // )
    LBrace,   // {
    RBrace,   // }

    // Data
    Ident(String),
    Number(f64),
    /// Escape-decoded content plus the quote character it was written with.
    StringLit { value: String, quote: char },
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::And => "and",
            Token::Or => "or",
            Token::Not => "not",
            Token::In => "in",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Tilde => "~",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Bang => "!",
            Token::Assign => "=",
            Token::Question => "?",
            Token::Dot => ".",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Pipe => "|",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Ident(name) => return write!(f, "`{name}`"),
            Token::Number(n) => return write!(f, "{n}"),
            Token::StringLit { value, quote } => return write!(f, "{quote}{value}{quote}"),
        };
        write!(f, "`{symbol}`")
    }
}

/// A token and the byte offset in the template where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Tokenizer for the inside of a single tag.
#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
    /// Template offset of `input`, for error positions.
    offset: usize,
    /// Directly after `.`, numbers are integer keys: `a.0.1` is two
    /// lookups, not `a` followed by `0.1`.
    after_dot: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str, offset: usize) -> Self {
        Self {
            input,
            cursor: 0,
            offset,
            after_dot: false,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    fn position(&self) -> usize {
        self.offset + self.cursor
    }

    pub fn next_token(&mut self) -> Result<Option<Spanned>> {
        let rest = self.remaining();
        let trimmed = rest.trim_start();
        self.advance(rest.len() - trimmed.len());

        let position = self.position();
        let after_dot = std::mem::replace(&mut self.after_dot, false);
        let Some(token) = self.lex_token(after_dot)? else {
            return Ok(None);
        };
        if token == Token::Dot {
            self.after_dot = true;
        }
        Ok(Some(Spanned { token, position }))
    }

    fn lex_token(&mut self, after_dot: bool) -> Result<Option<Token>> {
        let rest = self.remaining();
        let Some(first) = rest.chars().next() else {
            return Ok(None);
        };

        const TWO_CHAR: [(&str, Token); 6] = [
            ("==", Token::EqEq),
            ("!=", Token::NotEq),
            ("<=", Token::LtEq),
            (">=", Token::GtEq),
            ("&&", Token::AndAnd),
            ("||", Token::OrOr),
        ];
        for (symbol, token) in TWO_CHAR.iter() {
            if rest.starts_with(symbol) {
                self.advance(2);
                return Ok(Some(token.clone()));
            }
        }

        let single = match first {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '~' => Some(Token::Tilde),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '!' => Some(Token::Bang),
            '=' => Some(Token::Assign),
            '?' => Some(Token::Question),
            '.' => Some(Token::Dot),
            ',' => Some(Token::Comma),
            ':' => Some(Token::Colon),
            '|' => Some(Token::Pipe),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            _ => None,
        };
        if let Some(token) = single {
            self.advance(1);
            return Ok(Some(token));
        }

        if first == '\'' || first == '"' {
            return self.lex_string(first).map(Some);
        }

        if first.is_ascii_digit() {
            return self.lex_number(after_dot).map(Some);
        }

        if first.is_alphabetic() || first == '_' {
            let len: usize = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .map(char::len_utf8)
                .sum();
            let ident = &rest[..len];
            self.advance(len);

            return Ok(Some(match ident {
                "true" => Token::True,
                "false" => Token::False,
                "null" | "none" => Token::Null,
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "in" => Token::In,
                _ => Token::Ident(ident.to_string()),
            }));
        }

        Err(Error::lex(
            format!("unexpected character `{first}`"),
            self.position(),
        ))
    }

    fn lex_string(&mut self, quote: char) -> Result<Token> {
        let start = self.position();
        let rest = self.remaining();
        let mut value = String::new();
        let mut chars = rest.char_indices().skip(1);

        while let Some((i, c)) = chars.next() {
            if c == quote {
                self.advance(i + c.len_utf8());
                return Ok(Token::StringLit { value, quote });
            }
            if c == '\\' {
                match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, esc)) => value.push(esc),
                    None => break,
                }
            } else {
                value.push(c);
            }
        }

        Err(Error::lex("unterminated string literal", start))
    }

    fn lex_number(&mut self, integer_only: bool) -> Result<Token> {
        let start = self.position();
        let bytes = self.remaining().as_bytes();
        let digits = |from: usize| {
            bytes[from..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count()
        };

        let mut len = digits(0);
        if !integer_only {
            if bytes.get(len) == Some(&b'.') && bytes.get(len + 1).is_some_and(u8::is_ascii_digit) {
                len += 1 + digits(len + 1);
            }
            if matches!(bytes.get(len), Some(b'e' | b'E')) {
                let sign = usize::from(matches!(bytes.get(len + 1), Some(b'+' | b'-')));
                let exp_digits = digits(len + 1 + sign);
                if exp_digits > 0 {
                    len += 1 + sign + exp_digits;
                }
            }
        }

        let text = &self.remaining()[..len];
        let n: f64 = text
            .parse()
            .map_err(|_| Error::lex(format!("invalid number `{text}`"), start))?;
        self.advance(len);
        Ok(Token::Number(n))
    }
}

/// Tokenize the inside of one tag.
pub fn tokenize(input: &str, offset: usize) -> Result<Vec<Spanned>> {
    let mut tokenizer = Tokenizer::new(input, offset);
    let mut tokens = Vec::new();
    while let Some(token) = tokenizer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}
