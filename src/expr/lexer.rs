//! Tokenizer for the built-in expression language.
//!
//! Grounded on the shape of the teacher's
//! `expression_engine::lexer::ExpressionLexer` (a hand-rolled,
//! single-pass char scanner with a one-token lookahead buffer) but
//! scaled to the smaller grammar this crate actually needs.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    String(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Dot,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    lookahead: Option<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Lexer<'a> {
        Lexer {
            chars: source.chars().peekable(),
            lookahead: None,
        }
    }

    pub fn peek(&mut self) -> Result<&Token, String> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.scan()?);
        }
        Ok(self.lookahead.as_ref().unwrap())
    }

    pub fn next(&mut self) -> Result<Token, String> {
        if let Some(t) = self.lookahead.take() {
            return Ok(t);
        }
        self.scan()
    }

    fn scan(&mut self) -> Result<Token, String> {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
        let c = match self.chars.next() {
            None => return Ok(Token::Eof),
            Some(c) => c,
        };
        match c {
            '(' => Ok(Token::LParen),
            ')' => Ok(Token::RParen),
            '[' => Ok(Token::LBracket),
            ']' => Ok(Token::RBracket),
            ',' => Ok(Token::Comma),
            '+' => Ok(Token::Plus),
            '-' => Ok(Token::Minus),
            '*' => Ok(Token::Star),
            '/' => Ok(Token::Slash),
            '%' => Ok(Token::Percent),
            '.' => Ok(Token::Dot),
            '=' => {
                self.expect_char('=')?;
                Ok(Token::Eq)
            }
            '!' => {
                if self.chars.peek() == Some(&'=') {
                    self.chars.next();
                    Ok(Token::Ne)
                } else {
                    Ok(Token::Not)
                }
            }
            '<' => {
                if self.chars.peek() == Some(&'=') {
                    self.chars.next();
                    Ok(Token::Le)
                } else {
                    Ok(Token::Lt)
                }
            }
            '>' => {
                if self.chars.peek() == Some(&'=') {
                    self.chars.next();
                    Ok(Token::Ge)
                } else {
                    Ok(Token::Gt)
                }
            }
            '&' => {
                self.expect_char('&')?;
                Ok(Token::And)
            }
            '|' => {
                self.expect_char('|')?;
                Ok(Token::Or)
            }
            '\'' | '"' => self.scan_string(c),
            c if c.is_ascii_digit() => self.scan_number(c),
            c if c.is_alphabetic() || c == '_' => Ok(self.scan_ident(c)),
            other => Err(format!("unexpected character {:?}", other)),
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), String> {
        match self.chars.next() {
            Some(c) if c == expected => Ok(()),
            other => Err(format!("expected {:?}, got {:?}", expected, other)),
        }
    }

    fn scan_string(&mut self, quote: char) -> Result<Token, String> {
        let mut s = String::new();
        loop {
            match self.chars.next() {
                None => return Err("unterminated string literal".to_string()),
                Some(c) if c == quote => break,
                Some(c) => s.push(c),
            }
        }
        Ok(Token::String(s))
    }

    fn scan_number(&mut self, first: char) -> Result<Token, String> {
        let mut s = String::new();
        s.push(first);
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit() || *c == '.') {
            s.push(self.chars.next().unwrap());
        }
        s.parse::<f64>()
            .map(Token::Number)
            .map_err(|e| format!("invalid number literal {:?}: {}", s, e))
    }

    fn scan_ident(&mut self, first: char) -> Token {
        let mut s = String::new();
        s.push(first);
        while matches!(self.chars.peek(), Some(c) if c.is_alphanumeric() || *c == '_') {
            s.push(self.chars.next().unwrap());
        }
        Token::Ident(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let t = lexer.next().unwrap();
            let done = t == Token::Eof;
            out.push(t);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn lexes_arithmetic() {
        assert_eq!(
            tokens("1 + 2 * 3"),
            vec![
                Token::Number(1.0),
                Token::Plus,
                Token::Number(2.0),
                Token::Star,
                Token::Number(3.0),
                Token::Eof
            ]
        );
    }

    #[test]
    fn lexes_in_call_with_quoted_string() {
        assert_eq!(
            tokens("In('a.b')"),
            vec![
                Token::Ident("In".into()),
                Token::LParen,
                Token::String("a.b".into()),
                Token::RParen,
                Token::Eof
            ]
        );
    }

    #[test]
    fn lexes_comparison_and_logic_operators() {
        assert_eq!(
            tokens("x >= 1 && y != 2"),
            vec![
                Token::Ident("x".into()),
                Token::Ge,
                Token::Number(1.0),
                Token::And,
                Token::Ident("y".into()),
                Token::Ne,
                Token::Number(2.0),
                Token::Eof
            ]
        );
    }
}
