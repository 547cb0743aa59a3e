//! Scans a script string into a stream of tokens.
//!
//! Supported operators:
//! - Single char: `+ - * / % ^ < > ! ? : ( ) [ ] , . ;`
//! - Multi char: `** <= >= == === != !== && ||`

use std::iter::Peekable;
use std::str::CharIndices;

/// Tokens recognized by the script lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Number(f64),
    Identifier(String),

    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Caret,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    EqualEqual,
    NotEqual,
    AndAnd,
    OrOr,
    Bang,
    Question,
    Colon,

    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Semicolon,

    Eof,
    Illegal(char),
}

/// A token together with the character offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub struct Lexer<'a> {
    input: Peekable<CharIndices<'a>>,
    len: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input: input.char_indices().peekable(),
            len: input.len(),
        }
    }

    /// Advances the lexer and returns the next token.
    pub fn next_token(&mut self) -> Spanned {
        self.skip_whitespace();

        let Some((offset, ch)) = self.input.next() else {
            return Spanned {
                token: Token::Eof,
                offset: self.len,
            };
        };

        let token = match ch {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => {
                if self.eat('*') {
                    Token::StarStar
                } else {
                    Token::Star
                }
            }
            '/' => Token::Slash,
            '%' => Token::Percent,
            '^' => Token::Caret,
            '?' => Token::Question,
            ':' => Token::Colon,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            '<' => {
                if self.eat('=') {
                    Token::LessEqual
                } else {
                    Token::Less
                }
            }
            '>' => {
                if self.eat('=') {
                    Token::GreaterEqual
                } else {
                    Token::Greater
                }
            }
            '=' => {
                if self.eat('=') {
                    self.eat('=');
                    Token::EqualEqual
                } else {
                    Token::Illegal('=')
                }
            }
            '!' => {
                if self.eat('=') {
                    self.eat('=');
                    Token::NotEqual
                } else {
                    Token::Bang
                }
            }
            '&' => {
                if self.eat('&') {
                    Token::AndAnd
                } else {
                    Token::Illegal('&')
                }
            }
            '|' => {
                if self.eat('|') {
                    Token::OrOr
                } else {
                    Token::Illegal('|')
                }
            }
            '.' if self.peek_is_digit() => self.read_number(ch),
            '.' => Token::Dot,
            c if c.is_ascii_digit() => self.read_number(c),
            c if is_identifier_start(c) => self.read_identifier(c),
            c => Token::Illegal(c),
        };

        Spanned { token, offset }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&(_, ch)) = self.input.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.input.next();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.input.peek().is_some_and(|&(_, c)| c == expected) {
            self.input.next();
            true
        } else {
            false
        }
    }

    fn peek_is_digit(&mut self) -> bool {
        self.input.peek().is_some_and(|&(_, c)| c.is_ascii_digit())
    }

    fn read_number(&mut self, first: char) -> Token {
        let mut text = String::from(first);
        let mut seen_exponent = false;
        while let Some(&(_, ch)) = self.input.peek() {
            if ch.is_ascii_digit() || ch == '.' {
                text.push(ch);
                self.input.next();
            } else if (ch == 'e' || ch == 'E') && !seen_exponent {
                seen_exponent = true;
                text.push(ch);
                self.input.next();
                if let Some(&(_, sign)) = self.input.peek() {
                    if sign == '+' || sign == '-' {
                        text.push(sign);
                        self.input.next();
                    }
                }
            } else {
                break;
            }
        }
        match text.parse::<f64>() {
            Ok(n) => Token::Number(n),
            Err(_) => Token::Illegal(first),
        }
    }

    fn read_identifier(&mut self, first: char) -> Token {
        let mut ident = String::from(first);
        while let Some(&(_, ch)) = self.input.peek() {
            if is_identifier_start(ch) || ch.is_ascii_digit() {
                ident.push(ch);
                self.input.next();
            } else {
                break;
            }
        }
        Token::Identifier(ident)
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let spanned = lexer.next_token();
            if spanned.token == Token::Eof {
                break;
            }
            out.push(spanned.token);
        }
        out
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("a ** 2 === b !== c && !d || e"),
            vec![
                Token::Identifier("a".into()),
                Token::StarStar,
                Token::Number(2.0),
                Token::EqualEqual,
                Token::Identifier("b".into()),
                Token::NotEqual,
                Token::Identifier("c".into()),
                Token::AndAnd,
                Token::Bang,
                Token::Identifier("d".into()),
                Token::OrOr,
                Token::Identifier("e".into()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("1.5 .25 1e-7 3E2"),
            vec![
                Token::Number(1.5),
                Token::Number(0.25),
                Token::Number(1e-7),
                Token::Number(300.0),
            ]
        );
    }

    #[test]
    fn test_member_path_and_offsets() {
        let mut lexer = Lexer::new("this.value_min;");
        assert_eq!(lexer.next_token().token, Token::Identifier("this".into()));
        let dot = lexer.next_token();
        assert_eq!(dot, Spanned { token: Token::Dot, offset: 4 });
        assert_eq!(lexer.next_token().token, Token::Identifier("value_min".into()));
        assert_eq!(lexer.next_token().token, Token::Semicolon);
        assert_eq!(lexer.next_token().offset, 15);
    }

    #[test]
    fn test_illegal_character() {
        assert_eq!(tokens("a = b"), vec![
            Token::Identifier("a".into()),
            Token::Illegal('='),
            Token::Identifier("b".into()),
        ]);
        assert_eq!(tokens("#"), vec![Token::Illegal('#')]);
    }
}
