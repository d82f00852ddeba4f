//! Recursive-descent / precedence-climbing parser over the token stream,
//! per §9's design note ("do not embed any host-language evaluator").
//!
//! Precedence, low to high: `||`, `&&`, comparison, unary `!`, primary.

use super::lexer::Token;
use crate::error::{Error, Result};
use crate::value::{ParamsMap, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Cmp {
    IdentEq,
    IdentNeq,
    LooseEq,
    LooseNeq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ident(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Cmp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Evaluates this node against `bindings`. Identifier paths resolve
    /// left-to-right through maps and records, short-circuiting to `Null`
    /// on any missing step, per §4.1.
    pub fn eval(&self, bindings: &ParamsMap) -> Value {
        match self {
            Expr::Null => Value::Null,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Int(i) => Value::Int(*i),
            Expr::Float(f) => Value::Float(*f),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::Ident(path) => resolve_path(path, bindings),
            Expr::Not(inner) => Value::Bool(!super::coerce_boolean(&inner.eval(bindings))),
            Expr::And(lhs, rhs) => Value::Bool(
                super::coerce_boolean(&lhs.eval(bindings))
                    && super::coerce_boolean(&rhs.eval(bindings)),
            ),
            Expr::Or(lhs, rhs) => Value::Bool(
                super::coerce_boolean(&lhs.eval(bindings))
                    || super::coerce_boolean(&rhs.eval(bindings)),
            ),
            Expr::Compare(op, lhs, rhs) => {
                let l = lhs.eval(bindings);
                let r = rhs.eval(bindings);
                Value::Bool(compare(op, &l, &r))
            }
        }
    }
}

fn resolve_path(path: &[String], bindings: &ParamsMap) -> Value {
    let Some((head, rest)) = path.split_first() else {
        return Value::Null;
    };
    let Some(mut current) = bindings.get(head).cloned() else {
        return Value::Null;
    };
    for step in rest {
        current = current.get_field(step).cloned().unwrap_or(Value::Null);
    }
    current
}

fn compare(op: &Cmp, l: &Value, r: &Value) -> bool {
    match op {
        Cmp::IdentEq => l == r,
        Cmp::IdentNeq => l != r,
        Cmp::LooseEq => l.loose_eq(r),
        Cmp::LooseNeq => !l.loose_eq(r),
        Cmp::Lt | Cmp::Lte | Cmp::Gt | Cmp::Gte => {
            let ordering = match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => match (l.as_str(), r.as_str()) {
                    (Some(a), Some(b)) => Some(a.cmp(b)),
                    _ => None,
                },
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                Cmp::Lt => ordering.is_lt(),
                Cmp::Lte => ordering.is_le(),
                Cmp::Gt => ordering.is_gt(),
                Cmp::Gte => ordering.is_ge(),
                _ => unreachable!(),
            }
        }
    }
}

pub fn parse(tokens: &[Token]) -> Result<Expr> {
    let mut pos = 0;
    let expr = parse_or(tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(Error::parsing("trailing tokens after expression"));
    }
    Ok(expr)
}

fn parse_or(tokens: &[Token], pos: &mut usize) -> Result<Expr> {
    let mut lhs = parse_and(tokens, pos)?;
    while matches!(tokens.get(*pos), Some(Token::OrOr)) {
        *pos += 1;
        let rhs = parse_and(tokens, pos)?;
        lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_and(tokens: &[Token], pos: &mut usize) -> Result<Expr> {
    let mut lhs = parse_comparison(tokens, pos)?;
    while matches!(tokens.get(*pos), Some(Token::AndAnd)) {
        *pos += 1;
        let rhs = parse_comparison(tokens, pos)?;
        lhs = Expr::And(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_comparison(tokens: &[Token], pos: &mut usize) -> Result<Expr> {
    let lhs = parse_unary(tokens, pos)?;
    let op = match tokens.get(*pos) {
        Some(Token::EqEqEq) => Some(Cmp::IdentEq),
        Some(Token::NotEqEq) => Some(Cmp::IdentNeq),
        Some(Token::EqEq) => Some(Cmp::LooseEq),
        Some(Token::NotEq) => Some(Cmp::LooseNeq),
        Some(Token::Lt) => Some(Cmp::Lt),
        Some(Token::Lte) => Some(Cmp::Lte),
        Some(Token::Gt) => Some(Cmp::Gt),
        Some(Token::Gte) => Some(Cmp::Gte),
        _ => None,
    };
    let Some(op) = op else {
        return Ok(lhs);
    };
    *pos += 1;
    let rhs = parse_unary(tokens, pos)?;
    Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
}

fn parse_unary(tokens: &[Token], pos: &mut usize) -> Result<Expr> {
    if matches!(tokens.get(*pos), Some(Token::Not)) {
        *pos += 1;
        let inner = parse_unary(tokens, pos)?;
        return Ok(Expr::Not(Box::new(inner)));
    }
    parse_primary(tokens, pos)
}

fn parse_primary(tokens: &[Token], pos: &mut usize) -> Result<Expr> {
    match tokens.get(*pos) {
        Some(Token::Null) => {
            *pos += 1;
            Ok(Expr::Null)
        }
        Some(Token::True) => {
            *pos += 1;
            Ok(Expr::Bool(true))
        }
        Some(Token::False) => {
            *pos += 1;
            Ok(Expr::Bool(false))
        }
        Some(Token::Int(i)) => {
            let i = *i;
            *pos += 1;
            Ok(Expr::Int(i))
        }
        Some(Token::Float(f)) => {
            let f = *f;
            *pos += 1;
            Ok(Expr::Float(f))
        }
        Some(Token::Str(s)) => {
            let s = s.clone();
            *pos += 1;
            Ok(Expr::Str(s))
        }
        Some(Token::Ident(name)) => {
            let mut path = vec![name.clone()];
            *pos += 1;
            while matches!(tokens.get(*pos), Some(Token::Dot)) {
                *pos += 1;
                match tokens.get(*pos) {
                    Some(Token::Ident(part)) => {
                        path.push(part.clone());
                        *pos += 1;
                    }
                    _ => return Err(Error::parsing("expected identifier after `.`")),
                }
            }
            Ok(Expr::Ident(path))
        }
        Some(Token::LParen) => {
            *pos += 1;
            let inner = parse_or(tokens, pos)?;
            match tokens.get(*pos) {
                Some(Token::RParen) => {
                    *pos += 1;
                    Ok(inner)
                }
                _ => Err(Error::parsing("unmatched parenthesis")),
            }
        }
        _ => Err(Error::parsing("unexpected end of expression")),
    }
}
