//! The sandboxed expression evaluator used by `If`/`Choose`/`When` nodes
//! (§4.1). A hand-written recursive-descent parser over a restricted,
//! familiar-looking grammar — no host-language evaluator is ever embedded,
//! per the design notes in §9.
//!
//! Scanning follows the teacher's own character-at-a-time style
//! (`src/ast/mod.rs`'s `Ast::parse`), adapted from a SQL-text scanner to a
//! small-expression tokenizer.

mod lexer;
mod parser;

use crate::error::{Error, Result};
use crate::value::{ParamsMap, Value};
pub use parser::Expr;

/// Evaluates `expr` against `bindings` and returns its raw [`Value`].
///
/// # Errors
/// Returns [`Error::ExpressionSecurity`] if `expr` matches a forbidden
/// pattern, or [`Error::Parsing`] on a malformed expression.
pub fn evaluate(expr: &str, bindings: &ParamsMap) -> Result<Value> {
    sandbox_check(expr)?;
    let tokens = lexer::tokenize(expr)?;
    let ast = parser::parse(&tokens)?;
    Ok(ast.eval(bindings))
}

/// Evaluates `expr` and coerces the result to `bool` per §4.1's coercion
/// rules (`bool`→`bool`; `null`→false; empty string/sequence→false; else
/// true).
///
/// # Errors
/// Same as [`evaluate`].
pub fn evaluate_boolean(expr: &str, bindings: &ParamsMap) -> Result<bool> {
    let value = evaluate(expr, bindings)?;
    Ok(coerce_boolean(&value))
}

#[must_use]
pub fn coerce_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Str(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        _ => true,
    }
}

/// Rejects any expression containing a pattern that could escape the
/// sandbox, before a single token is produced. Each check here corresponds
/// to one bullet of §4.1's "Sandbox" paragraph.
fn sandbox_check(expr: &str) -> Result<()> {
    let reject = |reason: &str| -> Result<()> {
        Err(Error::expression_security(expr.to_string(), reason))
    };

    if expr
        .chars()
        .any(|c| matches!(c, '`' | '$' | '@' | ';' | '\\'))
    {
        return reject("shell-quoting or sigil characters are not allowed");
    }
    if expr.contains("::") {
        return reject("static member access (`::`) is not allowed");
    }
    if expr.contains("->") {
        return reject("method/property access (`->`) is not allowed");
    }
    if expr.contains("new ") || expr.trim_start().starts_with("new") {
        return reject("object construction (`new`) is not allowed");
    }
    if expr.contains("function") || expr.contains("=>") || expr.contains("fn ") {
        return reject("anonymous functions are not allowed");
    }
    if expr.contains("++") || expr.contains("--") {
        return reject("increment/decrement is not allowed");
    }
    if expr.contains('[') || expr.contains(']') {
        return reject("array indexing is not allowed");
    }
    if has_function_call(expr) {
        return reject("function calls are not allowed");
    }
    if has_bare_assignment(expr) {
        return reject("assignment is not allowed");
    }
    Ok(())
}

/// Detects `identifier(` (a function-call shape) anywhere in the expression,
/// ignoring inside string literals.
fn has_function_call(expr: &str) -> bool {
    let chars: Vec<char> = expr.chars().collect();
    let mut in_string: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = in_string {
            if c == '\\' {
                i += 2;
                continue;
            }
            if c == q {
                in_string = None;
            }
            i += 1;
            continue;
        }
        if c == '\'' || c == '"' {
            in_string = Some(c);
            i += 1;
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            let mut j = i;
            while j < chars.len() && chars[j] == ' ' {
                j += 1;
            }
            if j < chars.len() && chars[j] == '(' && !is_keyword(&ident) {
                return true;
            }
            continue;
        }
        i += 1;
    }
    false
}

fn is_keyword(ident: &str) -> bool {
    matches!(ident, "true" | "false" | "null")
}

/// Detects a bare `=` that is not part of `==`, `!=`, `<=`, `>=`, nor a
/// compound-assignment operator — i.e. an actual assignment.
fn has_bare_assignment(expr: &str) -> bool {
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let prev = if i > 0 { Some(chars[i - 1]) } else { None };
        let next = chars.get(i + 1).copied();
        if c == '=' {
            if next == Some('=')
                || prev == Some('=')
                || prev == Some('!')
                || prev == Some('<')
                || prev == Some('>')
            {
                i += 1;
                continue;
            }
            if matches!(prev, Some('+') | Some('-') | Some('*') | Some('/')) {
                return true;
            }
            return true;
        }
        i += 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn bindings() -> ParamsMap {
        let mut user = BTreeMap::new();
        user.insert("age".to_string(), Value::Int(25));
        user.insert("status".to_string(), Value::Str("active".to_string()));
        let mut root = BTreeMap::new();
        root.insert("user".to_string(), Value::Object(user));
        root
    }

    #[test]
    fn evaluates_nested_identifier_and_and() {
        let b = bindings();
        assert!(evaluate_boolean("user.age >= 18 && user.status == 'active'", &b).unwrap());
    }

    #[test]
    fn missing_identifier_is_null() {
        let b = bindings();
        assert_eq!(evaluate("user.missing", &b).unwrap(), Value::Null);
        assert!(!evaluate_boolean("user.missing != null", &b).unwrap());
    }

    #[test]
    fn rejects_function_calls() {
        let b = bindings();
        let err = evaluate("count(items)", &b).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ExpressionSecurity);
    }

    #[test]
    fn rejects_method_calls_and_new() {
        let b = ParamsMap::new();
        assert!(evaluate("a->b", &b).is_err());
        assert!(evaluate("new Foo()", &b).is_err());
    }

    #[test]
    fn rejects_assignment() {
        let b = ParamsMap::new();
        assert!(evaluate("a = 1", &b).is_err());
        assert!(evaluate("a == 1", &b).is_ok());
        assert!(evaluate("a <= 1", &b).is_ok());
        assert!(evaluate("a >= 1", &b).is_ok());
    }

    #[test]
    fn loose_vs_strict_equality() {
        let mut b = ParamsMap::new();
        b.insert("n".to_string(), Value::Int(5));
        assert!(evaluate_boolean("n == '5'", &b).unwrap());
        assert!(!evaluate_boolean("n === '5'", &b).unwrap());
    }

    #[test]
    fn empty_sequence_is_falsy() {
        let mut b = ParamsMap::new();
        b.insert("xs".to_string(), Value::Array(vec![]));
        assert!(!evaluate_boolean("xs", &b).unwrap());
    }
}
