//! Row predicates for the filter chain and query-list grouping.
//!
//! A small expression language in the spirit of dataframe queries:
//!
//! ```text
//! `Electricity (kWh)` > 0.5 and (index.hour >= 18 or index.weekday >= 5)
//! 0 < Temperature < 30 & ~(index.month == 8)
//! index >= '2021-06-01' and index < "2021-09-01 12:00"
//! ```
//!
//! Expressions are parsed once when the pipeline file is loaded (syntax
//! errors and quoted literals that are not timestamps are configuration
//! errors) and bound to a table's columns at
//! evaluation time (unknown names are `UnknownVariable` errors). Missing
//! values evaluate as NaN, so every comparison involving one is false,
//! except `!=`.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::Deserialize;

use crate::model::{ConsoError, Result};
use crate::table::Table;
use crate::timefmt;

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexField {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Weekday,
    Quarter,
    DayOfYear,
}

impl IndexField {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "year" => IndexField::Year,
            "month" => IndexField::Month,
            "day" => IndexField::Day,
            "hour" => IndexField::Hour,
            "minute" => IndexField::Minute,
            "second" => IndexField::Second,
            "weekday" | "dayofweek" | "day_of_week" => IndexField::Weekday,
            "quarter" => IndexField::Quarter,
            "dayofyear" | "day_of_year" => IndexField::DayOfYear,
            _ => return None,
        })
    }

    fn extract(&self, ts: &NaiveDateTime) -> f64 {
        let v = match self {
            IndexField::Year => return f64::from(ts.year()),
            IndexField::Month => ts.month(),
            IndexField::Day => ts.day(),
            IndexField::Hour => ts.hour(),
            IndexField::Minute => ts.minute(),
            IndexField::Second => ts.second(),
            IndexField::Weekday => timefmt::weekday(ts),
            IndexField::Quarter => timefmt::quarter(ts),
            IndexField::DayOfYear => ts.ordinal(),
        };
        f64::from(v)
    }
}

/// Timestamps compare as seconds since the epoch.
fn epoch_seconds(ts: &NaiveDateTime) -> f64 {
    let utc = ts.and_utc();
    utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) / 1e9
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn eval(&self, a: f64, b: f64) -> bool {
        match self {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Timestamp(NaiveDateTime),
    Column(String),
    /// Bare `index`: the row timestamp itself.
    IndexTime,
    Index(IndexField),
    Neg(Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    /// `a < b <= c` is `a < b and b <= c`.
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Quoted(String),
    Str(String),
    Dot,
    LParen,
    RParen,
    Cmp(CmpOp),
    Arith(ArithOp),
    And,
    Or,
    Not,
}

fn tokenize(src: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
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
            '&' => {
                tokens.push(Token::And);
                i += if chars.get(i + 1) == Some(&'&') { 2 } else { 1 };
            }
            '|' => {
                tokens.push(Token::Or);
                i += if chars.get(i + 1) == Some(&'|') { 2 } else { 1 };
            }
            '~' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Arith(ArithOp::Add));
                i += 1;
            }
            '-' => {
                tokens.push(Token::Arith(ArithOp::Sub));
                i += 1;
            }
            '*' => {
                tokens.push(Token::Arith(ArithOp::Mul));
                i += 1;
            }
            '/' => {
                tokens.push(Token::Arith(ArithOp::Div));
                i += 1;
            }
            '%' => {
                tokens.push(Token::Arith(ArithOp::Rem));
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next_is_eq = chars.get(i + 1) == Some(&'=');
                let op = match (c, next_is_eq) {
                    ('=', true) => CmpOp::Eq,
                    ('!', true) => CmpOp::Ne,
                    ('<', true) => CmpOp::Le,
                    ('>', true) => CmpOp::Ge,
                    ('<', false) => CmpOp::Lt,
                    ('>', false) => CmpOp::Gt,
                    _ => return Err(format!("unexpected '{}' at position {}", c, i)),
                };
                tokens.push(Token::Cmp(op));
                i += if next_is_eq { 2 } else { 1 };
            }
            '`' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == '`')
                    .ok_or_else(|| format!("unterminated back-quoted name at position {}", i))?;
                tokens.push(Token::Quoted(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| format!("unterminated string at position {}", i))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '.' if !chars.get(i + 1).is_some_and(|ch| ch.is_ascii_digit()) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    i += 1;
                    if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                        i += 1;
                    }
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse()
                    .map_err(|_| format!("invalid number '{}'", text))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word),
                });
            }
            _ => return Err(format!("unexpected '{}' at position {}", c, i)),
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser (recursive descent, lowest precedence first)
// ---------------------------------------------------------------------------

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

    fn or(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            lhs = Expr::Or(Box::new(lhs), Box::new(self.and()?));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            lhs = Expr::And(Box::new(lhs), Box::new(self.not()?));
        }
        Ok(lhs)
    }

    fn not(&mut self) -> std::result::Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> std::result::Result<Expr, String> {
        let lhs = self.sum()?;
        let mut chain = Vec::new();
        while let Some(Token::Cmp(op)) = self.peek().cloned() {
            self.pos += 1;
            chain.push((op, self.sum()?));
        }
        if chain.is_empty() {
            Ok(lhs)
        } else {
            Ok(Expr::Compare(Box::new(lhs), chain))
        }
    }

    fn sum(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.product()?;
        while let Some(Token::Arith(op @ (ArithOp::Add | ArithOp::Sub))) = self.peek().cloned() {
            self.pos += 1;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(self.product()?));
        }
        Ok(lhs)
    }

    fn product(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.unary()?;
        while let Some(Token::Arith(op @ (ArithOp::Mul | ArithOp::Div | ArithOp::Rem))) =
            self.peek().cloned()
        {
            self.pos += 1;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(self.unary()?));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> std::result::Result<Expr, String> {
        if self.peek() == Some(&Token::Arith(ArithOp::Sub)) {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.atom()
    }

    fn atom(&mut self) -> std::result::Result<Expr, String> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Expr::Number(v)),
            Some(Token::Quoted(name)) => Ok(Expr::Column(name)),
            Some(Token::Str(text)) => timefmt::parse_timestamp(&text)
                .map(Expr::Timestamp)
                .ok_or_else(|| format!("'{}' is not a timestamp", text)),
            Some(Token::Ident(name)) if name == "index" => {
                if self.peek() != Some(&Token::Dot) {
                    return Ok(Expr::IndexTime);
                }
                self.pos += 1;
                match self.next() {
                    Some(Token::Ident(attr)) => IndexField::from_name(&attr)
                        .map(Expr::Index)
                        .ok_or_else(|| format!("unknown index attribute '{}'", attr)),
                    _ => Err("expected an attribute name after 'index.'".to_string()),
                }
            }
            Some(Token::Ident(name)) => Ok(Expr::Column(name)),
            Some(Token::LParen) => {
                let inner = self.or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(other) => Err(format!("unexpected token {:?}", other)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Public query type
// ---------------------------------------------------------------------------

/// A parsed row predicate. Displays as its source text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub struct Query {
    source: String,
    expr: Expr,
}

impl Query {
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = |msg: String| ConsoError::Configuration(format!("invalid query '{}': {}", source, msg));
        let tokens = tokenize(source).map_err(invalid)?;
        if tokens.is_empty() {
            return Err(invalid("empty expression".to_string()));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or().map_err(invalid)?;
        if parser.pos < parser.tokens.len() {
            return Err(invalid(format!(
                "unexpected trailing {:?}",
                parser.tokens[parser.pos]
            )));
        }
        Ok(Query {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Boolean mask over the table's rows.
    pub fn mask(&self, table: &Table) -> Result<Vec<bool>> {
        let bound = bind(&self.expr, table)?;
        Ok((0..table.len())
            .map(|row| truthy(eval(&bound, table, row)))
            .collect())
    }

    /// Rows of `table` satisfying the predicate.
    pub fn apply(&self, table: &Table) -> Result<Table> {
        let mask = self.mask(table)?;
        Ok(table.filter_rows(|i, _| mask[i]))
    }
}

impl FromStr for Query {
    type Err = ConsoError;

    fn from_str(s: &str) -> Result<Self> {
        Query::parse(s)
    }
}

impl TryFrom<String> for Query {
    type Error = ConsoError;

    fn try_from(value: String) -> Result<Self> {
        Query::parse(&value)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Expression with column names resolved to positions.
enum Bound {
    Number(f64),
    Column(usize),
    IndexTime,
    Index(IndexField),
    Neg(Box<Bound>),
    Arith(ArithOp, Box<Bound>, Box<Bound>),
    Compare(Box<Bound>, Vec<(CmpOp, Bound)>),
    Not(Box<Bound>),
    And(Box<Bound>, Box<Bound>),
    Or(Box<Bound>, Box<Bound>),
}

fn bind(expr: &Expr, table: &Table) -> Result<Bound> {
    Ok(match expr {
        Expr::Number(v) => Bound::Number(*v),
        Expr::Timestamp(ts) => Bound::Number(epoch_seconds(ts)),
        Expr::IndexTime => Bound::IndexTime,
        Expr::Column(name) => Bound::Column(
            table
                .columns()
                .iter()
                .position(|c| &c.name == name)
                .ok_or_else(|| table.unknown_variable(name))?,
        ),
        Expr::Index(field) => Bound::Index(*field),
        Expr::Neg(e) => Bound::Neg(Box::new(bind(e, table)?)),
        Expr::Arith(op, a, b) => Bound::Arith(*op, Box::new(bind(a, table)?), Box::new(bind(b, table)?)),
        Expr::Compare(first, chain) => Bound::Compare(
            Box::new(bind(first, table)?),
            chain
                .iter()
                .map(|(op, e)| -> Result<(CmpOp, Bound)> { Ok((*op, bind(e, table)?)) })
                .collect::<Result<Vec<_>>>()?,
        ),
        Expr::Not(e) => Bound::Not(Box::new(bind(e, table)?)),
        Expr::And(a, b) => Bound::And(Box::new(bind(a, table)?), Box::new(bind(b, table)?)),
        Expr::Or(a, b) => Bound::Or(Box::new(bind(a, table)?), Box::new(bind(b, table)?)),
    })
}

/// Booleans are 1.0 / 0.0, missing values NaN.
fn eval(expr: &Bound, table: &Table, row: usize) -> f64 {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    match expr {
        Bound::Number(v) => *v,
        Bound::Column(c) => table.columns()[*c].values[row].unwrap_or(f64::NAN),
        Bound::IndexTime => epoch_seconds(&table.index()[row]),
        Bound::Index(field) => field.extract(&table.index()[row]),
        Bound::Neg(e) => -eval(e, table, row),
        Bound::Arith(op, a, b) => {
            let (a, b) = (eval(a, table, row), eval(b, table, row));
            match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
                ArithOp::Rem => a.rem_euclid(b),
            }
        }
        Bound::Compare(first, chain) => {
            let mut lhs = eval(first, table, row);
            for (op, e) in chain {
                let rhs = eval(e, table, row);
                if !op.eval(lhs, rhs) {
                    return 0.0;
                }
                lhs = rhs;
            }
            1.0
        }
        Bound::Not(e) => flag(!truthy(eval(e, table, row))),
        Bound::And(a, b) => flag(truthy(eval(a, table, row)) && truthy(eval(b, table, row))),
        Bound::Or(a, b) => flag(truthy(eval(a, table, row)) || truthy(eval(b, table, row))),
    }
}

fn truthy(v: f64) -> bool {
    !v.is_nan() && v != 0.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
