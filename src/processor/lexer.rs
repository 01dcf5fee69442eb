//! Very small hand-written lexer for template expressions.
//!
//! At this stage we *only* break an expression string into `Token`s.
//! Keywords are not recognised yet: `and`, `not`, `None` etc. all come out
//! as `Ident(..)` and the parser interprets them later.
//
//  Lexical items:
//
//      Ident    ::= [A-Za-z_][A-Za-z0-9_]*      (Unicode letters allowed)
//      Int      ::= [0-9]+                      (fits in i64)
//      Float    ::= [0-9]+ '.' [0-9]* exp? | [0-9]+ exp
//      Str      ::= '\'' .. '\'' | '"' .. '"'   (backslash escapes)
//      Symbols  ::= ( ) [ ] { } , : . = + - * ** / // % == != < <= > >=
//      Whitespace is discarded.

use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Assign,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Eof,
}

/// A token and the char offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub offset: usize,
    pub message: String,
}

#[derive(Clone)]
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    pos: usize,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
            pos: 0,
            finished: false,
        }
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.next_char();
            true
        } else {
            false
        }
    }

    fn consume_while<F: Fn(char) -> bool>(&mut self, pred: F, buf: &mut String) {
        while let Some(c) = self.peek_char() {
            if pred(c) {
                buf.push(c);
                self.next_char();
            } else {
                break;
            }
        }
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> LexError {
        LexError {
            offset,
            message: message.into(),
        }
    }

    fn read_identifier(&mut self, first: char) -> String {
        let mut id = String::new();
        id.push(first);
        self.consume_while(|c| c.is_alphanumeric() || c == '_', &mut id);
        id
    }

    fn read_number(&mut self, first: char, start: usize) -> Result<Token, LexError> {
        let mut num = String::new();
        num.push(first);
        self.consume_while(|c| c.is_ascii_digit(), &mut num);

        let mut is_float = false;
        // `1.5` is a float, `1.real` and `x[1:2]` are not
        let mut ahead = self.chars.clone();
        if ahead.next() == Some('.') && ahead.peek().is_none_or(|c| c.is_ascii_digit()) {
            self.next_char();
            num.push('.');
            self.consume_while(|c| c.is_ascii_digit(), &mut num);
            is_float = true;
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let mut ahead = self.chars.clone();
            ahead.next();
            if matches!(ahead.peek(), Some('+' | '-')) {
                ahead.next();
            }
            if ahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                num.push('e');
                self.next_char();
                if let Some(sign @ ('+' | '-')) = self.peek_char() {
                    num.push(sign);
                    self.next_char();
                }
                self.consume_while(|c| c.is_ascii_digit(), &mut num);
                is_float = true;
            }
        }

        if is_float {
            num.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| self.error(start, format!("invalid number {num}")))
        } else {
            num.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| self.error(start, format!("integer literal too large: {num}")))
        }
    }

    fn read_string(&mut self, quote: char, start: usize) -> Result<Token, LexError> {
        let mut txt = String::new();
        while let Some(c) = self.next_char() {
            match c {
                c if c == quote => return Ok(Token::Str(txt)),
                '\\' => {
                    let escaped = self
                        .next_char()
                        .ok_or_else(|| self.error(start, "unterminated string literal"))?;
                    match escaped {
                        'n' => txt.push('\n'),
                        't' => txt.push('\t'),
                        'r' => txt.push('\r'),
                        '0' => txt.push('\0'),
                        'x' => txt.push(self.read_code_point(2, start)?),
                        'u' => txt.push(self.read_code_point(4, start)?),
                        '\\' | '\'' | '"' => txt.push(escaped),
                        other => {
                            txt.push('\\');
                            txt.push(other);
                        }
                    }
                }
                c => txt.push(c),
            }
        }
        Err(self.error(start, "unterminated string literal"))
    }

    fn read_code_point(&mut self, digits: usize, start: usize) -> Result<char, LexError> {
        let mut hex = String::new();
        for _ in 0..digits {
            match self.next_char() {
                Some(c) if c.is_ascii_hexdigit() => hex.push(c),
                _ => return Err(self.error(start, "truncated escape sequence")),
            }
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error(start, format!("invalid escape \\u{hex}")))
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Spanned, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        while self.peek_char().is_some_and(char::is_whitespace) {
            self.next_char();
        }

        let offset = self.pos;
        let ch = match self.next_char() {
            Some(c) => c,
            None => {
                self.finished = true;
                return Some(Ok(Spanned {
                    token: Token::Eof,
                    offset,
                }));
            }
        };

        let tok_res = match ch {
            '(' => Ok(Token::LParen),
            ')' => Ok(Token::RParen),
            '[' => Ok(Token::LBracket),
            ']' => Ok(Token::RBracket),
            '{' => Ok(Token::LBrace),
            '}' => Ok(Token::RBrace),
            ',' => Ok(Token::Comma),
            ':' => Ok(Token::Colon),
            '.' => Ok(Token::Dot),
            '+' => Ok(Token::Plus),
            '-' => Ok(Token::Minus),
            '%' => Ok(Token::Percent),
            '*' if self.eat('*') => Ok(Token::DoubleStar),
            '*' => Ok(Token::Star),
            '/' if self.eat('/') => Ok(Token::DoubleSlash),
            '/' => Ok(Token::Slash),
            '=' if self.eat('=') => Ok(Token::EqEq),
            '=' => Ok(Token::Assign),
            '!' if self.eat('=') => Ok(Token::NotEq),
            '<' if self.eat('=') => Ok(Token::LtE),
            '<' => Ok(Token::Lt),
            '>' if self.eat('=') => Ok(Token::GtE),
            '>' => Ok(Token::Gt),
            '\'' | '"' => self.read_string(ch, offset),
            c if c.is_ascii_digit() => self.read_number(c, offset),
            c if c.is_alphabetic() || c == '_' => Ok(Token::Ident(self.read_identifier(c))),
            e => Err(self.error(offset, format!("unexpected character {e:?}"))),
        };

        if tok_res.is_err() {
            self.finished = true;
        }
        Some(tok_res.map(|token| Spanned { token, offset }))
    }
}

#[cfg(test)]
mod tests {
    use super::{Lexer, Token};

    fn tokens(src: &str) -> Vec<Token> {
        Lexer::new(src)
            .map(|t| t.map(|s| s.token))
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_tokenisation() {
        let test_cases = vec![
            (
                "2 * 3 + 4",
                vec![
                    Token::Int(2),
                    Token::Star,
                    Token::Int(3),
                    Token::Plus,
                    Token::Int(4),
                    Token::Eof,
                ],
            ),
            (
                "a.b[0]",
                vec![
                    Token::Ident("a".into()),
                    Token::Dot,
                    Token::Ident("b".into()),
                    Token::LBracket,
                    Token::Int(0),
                    Token::RBracket,
                    Token::Eof,
                ],
            ),
            (
                "x <= 1.5e2 != 'it\\'s'",
                vec![
                    Token::Ident("x".into()),
                    Token::LtE,
                    Token::Float(150.0),
                    Token::NotEq,
                    Token::Str("it's".into()),
                    Token::Eof,
                ],
            ),
            (
                "r[1:5] // 2 ** 3",
                vec![
                    Token::Ident("r".into()),
                    Token::LBracket,
                    Token::Int(1),
                    Token::Colon,
                    Token::Int(5),
                    Token::RBracket,
                    Token::DoubleSlash,
                    Token::Int(2),
                    Token::DoubleStar,
                    Token::Int(3),
                    Token::Eof,
                ],
            ),
        ];

        for (src, expected) in test_cases {
            assert_eq!(tokens(src), expected, "{src}");
        }
    }

    #[test]
    fn test_keywords_are_identifiers() {
        assert_eq!(
            tokens("not a and None"),
            vec![
                Token::Ident("not".into()),
                Token::Ident("a".into()),
                Token::Ident("and".into()),
                Token::Ident("None".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_unicode_strings_and_names() {
        assert_eq!(
            tokens("\"\u{203d}\" + caf\u{e9}"),
            vec![
                Token::Str("\u{203d}".into()),
                Token::Plus,
                Token::Ident("caf\u{e9}".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_errors_carry_offsets() {
        let err = Lexer::new("1 + 'open").find_map(Result::err).unwrap();
        assert_eq!(err.offset, 4);

        let err = Lexer::new("a ? b").find_map(Result::err).unwrap();
        assert_eq!(err.offset, 2);
    }
}
