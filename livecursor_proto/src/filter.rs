//! Attribute filters understood by the bundled sources.
//!
//! Supports conjunctions of comparisons between a field and a literal:
//! - `type = 'X'`
//! - `speed >= 3.5 AND active = true`
//! - `name <> 'it''s'` (quotes are escaped by doubling)
//! - `note = null` matches missing and null fields
//!
//! The cursor never looks at filters; sources parse them when a subscription
//! is opened.

use crate::types::{Record, Value};
use livecursor_common::ErrorCode;
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub field: String,
    pub op: CompareOp,
    pub literal: Literal,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    #[error("filter syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },
}

impl FilterError {
    fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }
}

impl ErrorCode for FilterError {
    fn error_code(&self) -> &'static str {
        match self {
            FilterError::Syntax { .. } => "FilterError::Syntax",
        }
    }
}

/// A parsed filter. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeFilter {
    terms: Vec<Comparison>,
}

impl AttributeFilter {
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        Parser::new(input).parse()
    }

    /// Parse an optional filter, treating `None` as match-all.
    pub fn from_option(input: Option<&str>) -> Result<Self, FilterError> {
        input.map(Self::parse).transpose().map(Option::unwrap_or_default)
    }

    pub fn terms(&self) -> &[Comparison] {
        &self.terms
    }

    pub fn is_match_all(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.terms.iter().all(|t| t.matches(record.get(&t.field)))
    }
}

impl Comparison {
    fn matches(&self, value: Option<&Value>) -> bool {
        let value = value.unwrap_or(&Value::Null);
        if let Literal::Null = self.literal {
            return match self.op {
                CompareOp::Eq => value.is_null(),
                CompareOp::Ne => !value.is_null(),
                _ => false,
            };
        }
        let ordering = match (&self.literal, value) {
            (Literal::Text(l), Value::Text(v)) => Some(v.as_str().cmp(l.as_str())),
            (Literal::Number(l), v) => v.as_f64().and_then(|v| v.partial_cmp(l)),
            (Literal::Bool(l), Value::Bool(v)) => Some(v.cmp(l)),
            _ => None,
        };
        let Some(ordering) = ordering else {
            return false;
        };
        match self.op {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(mut self) -> Result<AttributeFilter, FilterError> {
        let mut terms = Vec::new();
        self.skip_ws();
        if self.at_end() {
            return Ok(AttributeFilter { terms });
        }
        loop {
            terms.push(self.comparison()?);
            self.skip_ws();
            if self.at_end() {
                break;
            }
            self.keyword("and")?;
        }
        Ok(AttributeFilter { terms })
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn keyword(&mut self, word: &str) -> Result<(), FilterError> {
        let rest = self.rest();
        let matched = rest
            .get(..word.len())
            .is_some_and(|w| w.eq_ignore_ascii_case(word))
            && rest[word.len()..]
                .chars()
                .next()
                .map_or(true, char::is_whitespace);
        if !matched {
            return Err(FilterError::syntax(
                self.pos,
                format!("expected `{}`", word.to_uppercase()),
            ));
        }
        self.pos += word.len();
        Ok(())
    }

    fn comparison(&mut self) -> Result<Comparison, FilterError> {
        self.skip_ws();
        let field = self.identifier()?;
        self.skip_ws();
        let op = self.operator()?;
        self.skip_ws();
        let literal = self.literal()?;
        Ok(Comparison { field, op, literal })
    }

    fn identifier(&mut self) -> Result<String, FilterError> {
        let start = self.pos;
        let len = self
            .rest()
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
            .unwrap_or(self.rest().len());
        if len == 0 || self.rest().starts_with(|c: char| c.is_ascii_digit()) {
            return Err(FilterError::syntax(start, "expected a field name"));
        }
        self.pos += len;
        Ok(self.input[start..self.pos].to_string())
    }

    fn operator(&mut self) -> Result<CompareOp, FilterError> {
        const OPS: [(&str, CompareOp); 7] = [
            ("<>", CompareOp::Ne),
            ("!=", CompareOp::Ne),
            ("<=", CompareOp::Le),
            (">=", CompareOp::Ge),
            ("=", CompareOp::Eq),
            ("<", CompareOp::Lt),
            (">", CompareOp::Gt),
        ];
        for (token, op) in OPS {
            if self.rest().starts_with(token) {
                self.pos += token.len();
                return Ok(op);
            }
        }
        Err(FilterError::syntax(self.pos, "expected a comparison operator"))
    }

    fn literal(&mut self) -> Result<Literal, FilterError> {
        let start = self.pos;
        match self.peek() {
            Some('\'') => self.text(),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '.' => {
                let len = self
                    .rest()
                    .find(|c: char| c.is_whitespace())
                    .unwrap_or(self.rest().len());
                let token = &self.rest()[..len];
                let number = token
                    .parse::<f64>()
                    .map_err(|_| FilterError::syntax(start, format!("invalid number `{token}`")))?;
                self.pos += len;
                Ok(Literal::Number(number))
            }
            Some(_) => {
                let len = self
                    .rest()
                    .find(|c: char| !c.is_alphabetic())
                    .unwrap_or(self.rest().len());
                let word = &self.rest()[..len];
                let literal = match word.to_ascii_lowercase().as_str() {
                    "true" => Literal::Bool(true),
                    "false" => Literal::Bool(false),
                    "null" => Literal::Null,
                    _ => return Err(FilterError::syntax(start, "expected a literal")),
                };
                self.pos += len;
                Ok(literal)
            }
            None => Err(FilterError::syntax(start, "expected a literal")),
        }
    }

    fn text(&mut self) -> Result<Literal, FilterError> {
        let start = self.pos;
        // opening quote
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(FilterError::syntax(start, "unterminated string"));
            };
            self.pos += c.len_utf8();
            if c == '\'' {
                if self.peek() == Some('\'') {
                    self.pos += 1;
                    out.push('\'');
                    continue;
                }
                return Ok(Literal::Text(out));
            }
            out.push(c);
        }
    }
}
