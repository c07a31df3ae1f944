//! Splits expression text into tokens.

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    /// A back-quoted column name: `` `unit price` ``.
    Quoted(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    /// Byte offset of the token in the source text.
    pub pos: usize,
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Spanned>, ExprError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            b'0'..=b'9' => {
                let (n, end) = lex_number(src, i)?;
                i = end;
                Token::Number(n)
            }
            b'.' if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                let (n, end) = lex_number(src, i)?;
                i = end;
                Token::Number(n)
            }
            b'"' | b'\'' => {
                let (s, end) = lex_string(src, i)?;
                i = end;
                Token::Str(s)
            }
            b'`' => {
                let close = src[i + 1..].find('`').ok_or_else(|| syntax(i, "unterminated back-quoted column name"))?;
                let name = &src[i + 1..i + 1 + close];
                i += close + 2;
                Token::Quoted(name.to_string())
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let end = src[i..]
                    .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                    .map_or(src.len(), |off| i + off);
                let word = &src[i..end];
                i = end;
                Token::Ident(word.to_string())
            }
            _ => {
                let next = bytes.get(i + 1).copied();
                let (tok, width) = match (c, next) {
                    (b'*', Some(b'*')) => (Token::StarStar, 2),
                    (b'=', Some(b'=')) => (Token::EqEq, 2),
                    (b'!', Some(b'=')) => (Token::NotEq, 2),
                    (b'<', Some(b'=')) => (Token::Le, 2),
                    (b'>', Some(b'=')) => (Token::Ge, 2),
                    (b'&', Some(b'&')) => (Token::And, 2),
                    (b'|', Some(b'|')) => (Token::Or, 2),
                    (b'(', _) => (Token::LParen, 1),
                    (b')', _) => (Token::RParen, 1),
                    (b'[', _) => (Token::LBracket, 1),
                    (b']', _) => (Token::RBracket, 1),
                    (b',', _) => (Token::Comma, 1),
                    (b'.', _) => (Token::Dot, 1),
                    (b'+', _) => (Token::Plus, 1),
                    (b'-', _) => (Token::Minus, 1),
                    (b'*', _) => (Token::Star, 1),
                    (b'/', _) => (Token::Slash, 1),
                    (b'%', _) => (Token::Percent, 1),
                    (b'<', _) => (Token::Lt, 1),
                    (b'>', _) => (Token::Gt, 1),
                    (b'&', _) => (Token::And, 1),
                    (b'|', _) => (Token::Or, 1),
                    (b'!', _) | (b'~', _) => (Token::Not, 1),
                    (b'=', _) => return Err(syntax(i, "assignment is not allowed, use '==' to compare")),
                    _ => {
                        let ch = src[i..].chars().next().unwrap_or('?');
                        return Err(syntax(i, format!("unexpected character '{ch}'")));
                    }
                };
                i += width;
                tok
            }
        };
        tokens.push(Spanned { token, pos: start });
    }

    Ok(tokens)
}

fn lex_number(src: &str, start: usize) -> Result<(f64, usize), ExprError> {
    let bytes = src.as_bytes();
    let mut i = start;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    let text = &src[start..i];
    text.parse::<f64>()
        .map(|n| (n, i))
        .map_err(|_| syntax(start, format!("invalid number '{text}'")))
}

fn lex_string(src: &str, start: usize) -> Result<(String, usize), ExprError> {
    let mut chars = src[start..].char_indices();
    let (_, quote) = chars.next().ok_or_else(|| syntax(start, "expected a string"))?;
    let mut out = String::new();
    while let Some((off, ch)) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, other)) => out.push(other),
                None => break,
            },
            c if c == quote => return Ok((out, start + off + c.len_utf8())),
            c => out.push(c),
        }
    }
    Err(syntax(start, "unterminated string literal"))
}

fn syntax(position: usize, message: impl Into<String>) -> ExprError {
    ExprError::Syntax { position, message: message.into() }
}
