/*
This code is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 16/05/2023
Last Modified: 03/10/2024
License: MIT
*/

//! A small expression language for filtering bluespots by their statistics,
//! e.g. `area > 20.5 and (maxdepth > 0.05 or volume > 2.5)`.
//!
//! The grammar allows the identifiers `area`, `maxdepth` and `volume`, the
//! comparison operators `< > = == != <= >=`, numeric literals, parentheses
//! and the connectives `and`/`or` (`and` binds tighter). Anything else is
//! rejected at parse time.

use std::io::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, PartialEq)]
enum Field {
    Area,
    MaxDepth,
    Volume,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum CmpOp {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Operand {
    Field(Field),
    Number(f64),
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Cmp(Operand, CmpOp, Operand),
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Field(Field),
    Number(f64),
    Op(CmpOp),
    And,
    Or,
    LeftParen,
    RightParen,
}

/// A parsed bluespot filter. The default expression accepts every bluespot.
#[derive(Clone, Debug)]
pub struct FilterExpression {
    root: Option<Expr>,
}

impl FilterExpression {
    /// A filter that keeps all bluespots.
    pub fn accept_all() -> FilterExpression {
        FilterExpression { root: None }
    }

    pub fn is_accept_all(&self) -> bool {
        self.root.is_none()
    }

    /// Parses a filter expression. The token set is validated strictly; no
    /// expression is ever evaluated through the language runtime.
    pub fn parse(text: &str) -> Result<FilterExpression, Error> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(syntax_error(text, "empty filter expression"));
        }
        let mut parser = Parser {
            tokens: tokens,
            position: 0,
        };
        let root = parser.parse_or()?;
        if parser.position != parser.tokens.len() {
            return Err(syntax_error(text, "trailing input after expression"));
        }
        Ok(FilterExpression { root: Some(root) })
    }

    /// Evaluates the filter against one bluespot's statistics. Area and
    /// volume carry world units (m2 / m3), maxdepth is in elevation units.
    pub fn evaluate(&self, area: f64, maxdepth: f64, volume: f64) -> bool {
        match &self.root {
            Some(expr) => eval_expr(expr, area, maxdepth, volume),
            None => true,
        }
    }
}

fn syntax_error(filter: &str, reason: &str) -> Error {
    Error::new(
        ErrorKind::InvalidInput,
        format!("Unsupported filter statement '{}': {}.", filter, reason),
    )
}

fn tokenize(text: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = vec![];
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_alphabetic() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_alphabetic() {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            match word.as_str() {
                "area" => tokens.push(Token::Field(Field::Area)),
                "maxdepth" => tokens.push(Token::Field(Field::MaxDepth)),
                "volume" => tokens.push(Token::Field(Field::Volume)),
                "and" => tokens.push(Token::And),
                "or" => tokens.push(Token::Or),
                _ => return Err(syntax_error(text, &format!("illegal word '{}'", word))),
            }
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let number: String = chars[start..i].iter().collect();
            match number.parse::<f64>() {
                Ok(value) => tokens.push(Token::Number(value)),
                Err(_) => {
                    return Err(syntax_error(text, &format!("bad number '{}'", number)));
                }
            }
        } else if c == '(' {
            tokens.push(Token::LeftParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RightParen);
            i += 1;
        } else if c == '<' || c == '>' || c == '=' || c == '!' {
            let has_equals = i + 1 < chars.len() && chars[i + 1] == '=';
            let op = match (c, has_equals) {
                ('<', false) => CmpOp::Lt,
                ('<', true) => CmpOp::Le,
                ('>', false) => CmpOp::Gt,
                ('>', true) => CmpOp::Ge,
                ('=', _) => CmpOp::Eq,
                ('!', true) => CmpOp::Ne,
                _ => return Err(syntax_error(text, "lone '!'")),
            };
            tokens.push(Token::Op(op));
            i += if has_equals { 2 } else { 1 };
        } else {
            return Err(syntax_error(text, &format!("illegal character '{}'", c)));
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_primary()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.parse_primary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, Error> {
        if self.peek() == Some(&Token::LeftParen) {
            self.next();
            let inner = self.parse_or()?;
            if self.next() != Some(Token::RightParen) {
                return Err(self.error("expected ')'"));
            }
            return Ok(inner);
        }
        let left = self.parse_operand()?;
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            _ => return Err(self.error("expected a comparison operator")),
        };
        let right = self.parse_operand()?;
        Ok(Expr::Cmp(left, op, right))
    }

    fn parse_operand(&mut self) -> Result<Operand, Error> {
        match self.next() {
            Some(Token::Field(field)) => Ok(Operand::Field(field)),
            Some(Token::Number(value)) => Ok(Operand::Number(value)),
            _ => Err(self.error("expected an identifier or a number")),
        }
    }

    fn error(&self, reason: &str) -> Error {
        Error::new(
            ErrorKind::InvalidInput,
            format!("Unsupported filter statement: {}.", reason),
        )
    }
}

fn eval_expr(expr: &Expr, area: f64, maxdepth: f64, volume: f64) -> bool {
    match expr {
        Expr::Or(left, right) => {
            eval_expr(left, area, maxdepth, volume) || eval_expr(right, area, maxdepth, volume)
        }
        Expr::And(left, right) => {
            eval_expr(left, area, maxdepth, volume) && eval_expr(right, area, maxdepth, volume)
        }
        Expr::Cmp(left, op, right) => {
            let l = eval_operand(left, area, maxdepth, volume);
            let r = eval_operand(right, area, maxdepth, volume);
            match op {
                CmpOp::Lt => l < r,
                CmpOp::Gt => l > r,
                CmpOp::Le => l <= r,
                CmpOp::Ge => l >= r,
                CmpOp::Eq => l == r,
                CmpOp::Ne => l != r,
            }
        }
    }
}

fn eval_operand(operand: &Operand, area: f64, maxdepth: f64, volume: f64) -> f64 {
    match operand {
        Operand::Field(Field::Area) => area,
        Operand::Field(Field::MaxDepth) => maxdepth,
        Operand::Field(Field::Volume) => volume,
        Operand::Number(value) => *value,
    }
}

#[cfg(test)]
mod test {
    use super::FilterExpression;

    #[test]
    fn test_parse_and_evaluate() {
        let filter = FilterExpression::parse("volume > 2.5").unwrap();
        assert!(filter.evaluate(0.0, 0.0, 3.0));
        assert!(!filter.evaluate(0.0, 0.0, 2.5));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let filter =
            FilterExpression::parse("area > 20.5 and maxdepth > 0.5 or volume > 2.5").unwrap();
        // Left conjunct true, volume irrelevant.
        assert!(filter.evaluate(21.0, 1.0, 0.0));
        // Left conjunct false, volume decides.
        assert!(filter.evaluate(0.0, 1.0, 3.0));
        assert!(!filter.evaluate(0.0, 1.0, 1.0));
        // With explicit parentheses the same text means something else.
        let grouped =
            FilterExpression::parse("area > 20.5 and (maxdepth > 0.5 or volume > 2.5)").unwrap();
        assert!(!grouped.evaluate(0.0, 1.0, 3.0));
        assert!(grouped.evaluate(21.0, 0.0, 3.0));
    }

    #[test]
    fn test_all_operators() {
        assert!(FilterExpression::parse("area >= 5").unwrap().evaluate(5.0, 0.0, 0.0));
        assert!(FilterExpression::parse("area <= 5").unwrap().evaluate(5.0, 0.0, 0.0));
        assert!(FilterExpression::parse("area = 5").unwrap().evaluate(5.0, 0.0, 0.0));
        assert!(FilterExpression::parse("area == 5").unwrap().evaluate(5.0, 0.0, 0.0));
        assert!(FilterExpression::parse("area != 5").unwrap().evaluate(4.0, 0.0, 0.0));
        assert!(FilterExpression::parse("area < 5").unwrap().evaluate(4.0, 0.0, 0.0));
        assert!(FilterExpression::parse("5 < area").unwrap().evaluate(6.0, 0.0, 0.0));
    }

    #[test]
    fn test_rejects_unknown_tokens() {
        assert!(FilterExpression::parse("depth > 5").is_err());
        assert!(FilterExpression::parse("area > 5; volume > 1").is_err());
        assert!(FilterExpression::parse("__import__").is_err());
        assert!(FilterExpression::parse("area > 5 and").is_err());
        assert!(FilterExpression::parse("(area > 5").is_err());
        assert!(FilterExpression::parse("area ! 5").is_err());
        assert!(FilterExpression::parse("").is_err());
    }

    #[test]
    fn test_accept_all() {
        let filter = FilterExpression::accept_all();
        assert!(filter.is_accept_all());
        assert!(filter.evaluate(0.0, 0.0, 0.0));
    }
}
