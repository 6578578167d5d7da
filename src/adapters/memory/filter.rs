//! Table 查詢 `$filter` 的 OData 子集
//!
//! 支援 `and`/`or`/`not`、括號與 `eq ne gt ge lt le`；常值可為
//! `'字串'`（`''` 為單引號）、整數（可加 `L`）、浮點數、`true`/`false`、
//! `datetime'...'` 與 `guid'...'`。型別不符的比較結果為 false。

use crate::domain::model::TableEntity;
use crate::utils::error::{ConnectorError, Result};
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "eq" => Some(CompareOp::Eq),
            "ne" => Some(CompareOp::Ne),
            "gt" => Some(CompareOp::Gt),
            "ge" => Some(CompareOp::Ge),
            "lt" => Some(CompareOp::Lt),
            "le" => Some(CompareOp::Le),
            _ => None,
        }
    }

    fn test(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(String),
    Guid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Or(Box<FilterExpr>, Box<FilterExpr>),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
    Compare {
        property: String,
        op: CompareOp,
        value: Literal,
    },
}

impl FilterExpr {
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(filter_error(format!("unexpected token {:?}", token))),
        }
    }

    pub fn matches(&self, entity: &TableEntity) -> bool {
        match self {
            FilterExpr::Or(left, right) => left.matches(entity) || right.matches(entity),
            FilterExpr::And(left, right) => left.matches(entity) && right.matches(entity),
            FilterExpr::Not(inner) => !inner.matches(entity),
            FilterExpr::Compare {
                property,
                op,
                value,
            } => entity
                .get(property)
                .and_then(|actual| compare(&actual, value))
                .is_some_and(|ordering| op.test(ordering)),
        }
    }
}

fn compare(actual: &Value, literal: &Literal) -> Option<Ordering> {
    match (actual, literal) {
        (Value::String(a), Literal::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::String(a), Literal::Guid(b)) => {
            Some(a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()))
        }
        (Value::String(a), Literal::DateTime(b)) => match (parse_datetime(a), parse_datetime(b)) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => Some(a.as_str().cmp(b.as_str())),
        },
        // Int64 可能以字串儲存
        (Value::String(a), Literal::Int(b)) => a.parse::<i64>().ok().map(|a| a.cmp(b)),
        (Value::Number(a), Literal::Int(b)) => match a.as_i64() {
            Some(a) => Some(a.cmp(b)),
            None => a.as_f64()?.partial_cmp(&(*b as f64)),
        },
        (Value::Number(a), Literal::Float(b)) => a.as_f64()?.partial_cmp(b),
        (Value::Bool(a), Literal::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

fn filter_error(message: String) -> ConnectorError {
    ConnectorError::ServiceError {
        status: 400,
        code: Some("InvalidInput".to_string()),
        message: format!("invalid query filter: {}", message),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Literal),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' => {
                let (text, next) = read_quoted(&chars, i)?;
                tokens.push(Token::Literal(Literal::String(text)));
                i = next;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let has_suffix = i < chars.len() && (chars[i] == 'L' || chars[i] == 'l');
                if has_suffix {
                    i += 1;
                }
                let literal = if text.contains('.') && !has_suffix {
                    text.parse::<f64>()
                        .map(Literal::Float)
                        .map_err(|e| filter_error(format!("bad number {}: {}", text, e)))?
                } else {
                    text.parse::<i64>()
                        .map(Literal::Int)
                        .map_err(|e| filter_error(format!("bad number {}: {}", text, e)))?
                };
                tokens.push(Token::Literal(literal));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();

                // datetime'...' / guid'...'
                if i < chars.len() && chars[i] == '\'' {
                    let (text, next) = read_quoted(&chars, i)?;
                    let literal = match word.to_ascii_lowercase().as_str() {
                        "datetime" => Literal::DateTime(text),
                        "guid" => Literal::Guid(text),
                        "x" | "binary" => {
                            return Err(filter_error("binary literals are not supported".to_string()))
                        }
                        other => return Err(filter_error(format!("unknown literal prefix {}", other))),
                    };
                    tokens.push(Token::Literal(literal));
                    i = next;
                    continue;
                }

                match word.as_str() {
                    "true" => tokens.push(Token::Literal(Literal::Bool(true))),
                    "false" => tokens.push(Token::Literal(Literal::Bool(false))),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            other => return Err(filter_error(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

/// 讀取從 `start`（開頭單引號）起的字串常值，回傳內容與下一個位置
fn read_quoted(chars: &[char], start: usize) -> Result<(String, usize)> {
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == '\'' {
            if chars.get(i + 1) == Some(&'\'') {
                text.push('\'');
                i += 2;
                continue;
            }
            return Ok((text, i + 1));
        }
        text.push(chars[i]);
        i += 1;
    }
    Err(filter_error("unterminated string literal".to_string()))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word == keyword)
    }

    fn parse_or(&mut self) -> Result<FilterExpr> {
        let mut left = self.parse_and()?;
        while self.peek_keyword("or") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = FilterExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<FilterExpr> {
        let mut left = self.parse_unary()?;
        while self.peek_keyword("and") {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = FilterExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<FilterExpr> {
        if self.peek_keyword("not") {
            self.pos += 1;
            return Ok(FilterExpr::Not(Box::new(self.parse_unary()?)));
        }

        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            return match self.next() {
                Some(Token::RParen) => Ok(inner),
                other => Err(filter_error(format!("expected ')', found {:?}", other))),
            };
        }

        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<FilterExpr> {
        let property = match self.next() {
            Some(Token::Ident(name)) => name,
            other => return Err(filter_error(format!("expected property name, found {:?}", other))),
        };
        let op = match self.next() {
            Some(Token::Ident(word)) => CompareOp::from_keyword(&word)
                .ok_or_else(|| filter_error(format!("unknown operator {}", word)))?,
            other => return Err(filter_error(format!("expected operator, found {:?}", other))),
        };
        let value = match self.next() {
            Some(Token::Literal(literal)) => literal,
            other => return Err(filter_error(format!("expected literal, found {:?}", other))),
        };

        Ok(FilterExpr::Compare {
            property,
            op,
            value,
        })
    }
}
