//! Recursive descent parser turning script tokens into an [`Expr`] tree.
//!
//! Grammar:
//!   program        --> ["return"] expression [";"] EOF
//!   expression     --> conditional
//!   conditional    --> or ( "?" expression ":" expression )?
//!   or             --> and ( "||" and )*
//!   and            --> equality ( "&&" equality )*
//!   equality       --> comparison ( ("==" | "!=") comparison )*
//!   comparison     --> additive ( ("<" | ">" | "<=" | ">=") additive )*
//!   additive       --> multiplicative ( ("+" | "-") multiplicative )*
//!   multiplicative --> unary ( ("*" | "/" | "%") unary )*
//!   unary          --> ("-" | "+" | "!") unary | power
//!   power          --> postfix ( ("**" | "^") unary )?
//!   postfix        --> primary ( "[" expression "]" | "." "length" )*
//!   primary        --> NUMBER | path | path "(" arguments? ")" | "(" expression ")" | "[" arguments? "]"
//!   path           --> IDENTIFIER ( "." IDENTIFIER )*
//!
//! The namespace prefixes `this`, `Math` and `d3` are transparent: `this.value_min`
//! is the variable `value_min` and `d3.max(values)` calls `max`.

use crate::error::ParseError;

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::lexer::{Lexer, Spanned, Token};

pub type ParseResult<T> = Result<T, ParseError>;

const MAX_DEPTH: usize = 64;
const TRANSPARENT_NAMESPACES: [&str; 3] = ["this", "Math", "d3"];

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Spanned,
    depth: usize,
}

impl<'a> Parser<'a> {
    /// Creates a new parser and advances to the first token.
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Parser {
            lexer,
            current,
            depth: 0,
        }
    }

    /// Parses a whole program.
    pub fn parse(&mut self) -> ParseResult<Expr> {
        if matches!(&self.current.token, Token::Identifier(name) if name == "return") {
            self.advance();
        }
        if self.current.token == Token::Eof {
            return Err(self.error("Empty expression"));
        }

        let expr = self.parse_expression()?;

        while self.current.token == Token::Semicolon {
            self.advance();
        }
        if self.current.token != Token::Eof {
            return Err(self.error(format!(
                "Unexpected token after expression: {:?}",
                self.current.token
            )));
        }
        Ok(expr)
    }

    fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.current.offset)
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.current.token == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!(
                "Expected {:?}, found {:?}",
                expected, self.current.token
            )))
        }
    }

    fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("Expression nesting too deep"));
        }
        let result = self.parse_conditional();
        self.depth -= 1;
        result
    }

    fn parse_conditional(&mut self) -> ParseResult<Expr> {
        let condition = self.parse_or()?;
        if self.current.token != Token::Question {
            return Ok(condition);
        }
        self.advance();
        let then = self.parse_expression()?;
        self.expect(Token::Colon)?;
        let otherwise = self.parse_expression()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_binary_level(
        &mut self,
        next: fn(&mut Self) -> ParseResult<Expr>,
        op_for: fn(&Token) -> Option<BinaryOp>,
    ) -> ParseResult<Expr> {
        let mut left = next(self)?;
        while let Some(op) = op_for(&self.current.token) {
            self.advance();
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_and, |t| (*t == Token::OrOr).then_some(BinaryOp::Or))
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_equality, |t| {
            (*t == Token::AndAnd).then_some(BinaryOp::And)
        })
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_comparison, |t| match t {
            Token::EqualEqual => Some(BinaryOp::Equal),
            Token::NotEqual => Some(BinaryOp::NotEqual),
            _ => None,
        })
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_additive, |t| match t {
            Token::Less => Some(BinaryOp::Less),
            Token::Greater => Some(BinaryOp::Greater),
            Token::LessEqual => Some(BinaryOp::LessEqual),
            Token::GreaterEqual => Some(BinaryOp::GreaterEqual),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_multiplicative, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Subtract),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_unary, |t| match t {
            Token::Star => Some(BinaryOp::Multiply),
            Token::Slash => Some(BinaryOp::Divide),
            Token::Percent => Some(BinaryOp::Remainder),
            _ => None,
        })
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match self.current.token {
            Token::Minus => UnaryOp::Negate,
            Token::Plus => UnaryOp::Plus,
            Token::Bang => UnaryOp::Not,
            _ => return self.parse_power(),
        };
        self.advance();
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("Expression nesting too deep"));
        }
        let operand = self.parse_unary();
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn parse_power(&mut self) -> ParseResult<Expr> {
        let base = self.parse_postfix()?;
        if matches!(self.current.token, Token::StarStar | Token::Caret) {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Power,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current.token {
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Token::Dot => {
                    self.advance();
                    match &self.current.token {
                        Token::Identifier(name) if name == "length" => {
                            self.advance();
                            expr = Expr::Length(Box::new(expr));
                        }
                        other => {
                            return Err(self.error(format!("Unsupported member access: {other:?}")));
                        }
                    }
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.current.token.clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::Identifier(name) => self.parse_path(name),
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                self.advance();
                let items = self.parse_arguments(Token::RBracket)?;
                Ok(Expr::Array(items))
            }
            Token::Eof => Err(self.error("Unexpected end of expression")),
            other => Err(self.error(format!("Unexpected token: {other:?}"))),
        }
    }

    fn parse_path(&mut self, head: String) -> ParseResult<Expr> {
        self.advance();
        let mut name = head;
        while TRANSPARENT_NAMESPACES.contains(&name.as_str()) && self.current.token == Token::Dot {
            self.advance();
            match self.current.token.clone() {
                Token::Identifier(next) => {
                    self.advance();
                    name = next;
                }
                other => return Err(self.error(format!("Expected identifier, found {other:?}"))),
            }
        }

        if self.current.token == Token::LParen {
            self.advance();
            let args = self.parse_arguments(Token::RParen)?;
            return Ok(Expr::Call { name, args });
        }

        Ok(match name.as_str() {
            "true" => Expr::Number(1.0),
            "false" => Expr::Number(0.0),
            "NaN" | "undefined" | "null" => Expr::Number(f64::NAN),
            "Infinity" => Expr::Number(f64::INFINITY),
            "PI" => Expr::Number(std::f64::consts::PI),
            "E" => Expr::Number(std::f64::consts::E),
            _ => Expr::Variable(name),
        })
    }

    /// Parses a comma separated list up to and including `close`.
    fn parse_arguments(&mut self, close: Token) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.current.token == close {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if self.current.token == Token::Comma {
                self.advance();
                continue;
            }
            self.expect(close)?;
            return Ok(args);
        }
    }
}

/// Parse a complete program.
pub fn parse(input: &str) -> ParseResult<Expr> {
    Parser::new(input).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Box<Expr> {
        Box::new(Expr::Number(n))
    }

    #[test]
    fn test_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                left: num(1.0),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Multiply,
                    left: num(2.0),
                    right: num(3.0),
                }),
            }
        );
    }

    #[test]
    fn test_return_and_namespaces() {
        let expr = parse("return this.linear(value, this.value_min, this.value_max);").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                name: "linear".into(),
                args: vec![
                    Expr::Variable("value".into()),
                    Expr::Variable("value_min".into()),
                    Expr::Variable("value_max".into()),
                ],
            }
        );
        assert_eq!(
            parse("d3.max(values)").unwrap(),
            Expr::Call {
                name: "max".into(),
                args: vec![Expr::Variable("values".into())],
            }
        );
    }

    #[test]
    fn test_power_is_right_associative() {
        let expr = parse("2 ** 3 ** 2").unwrap();
        let Expr::Binary { op, right, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Power);
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Power, .. }));
    }

    #[test]
    fn test_conditional_and_postfix() {
        let expr = parse("values.length > 0 ? values[0] : 0").unwrap();
        assert!(matches!(expr, Expr::Conditional { .. }));
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse("").unwrap_err().message, "Empty expression");
        assert!(parse("1 +").is_err());
        assert!(parse("(1").is_err());
        assert!(parse("a.b").is_err());
        assert!(parse("value value").is_err());
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(parse(&deep).is_err());
    }
}
