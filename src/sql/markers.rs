//! Scans `Text` node content for `${name}` identifier substitutions and
//! `#{name[,attr=value,...]}` value placeholders (§4.3), ignoring both forms
//! inside string literals and comments.
//!
//! The scanning discipline — character-at-a-time, an explicit mode for
//! "inside a string" with backslash-escaping, line/block comments — is
//! grounded directly on the teacher's `Ast::parse` (`src/ast/mod.rs`).

use crate::error::{Error, Result};
use crate::sql::node::ParamMode;

#[derive(Debug, Clone, PartialEq)]
pub enum TextFragment {
    Literal(String),
    /// `${name}` — identifier substitution, inlined verbatim at render time.
    Identifier(String),
    /// `#{name, attr=value, ...}` — a value placeholder.
    Placeholder(PlaceholderSpec),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaceholderSpec {
    pub name: String,
    pub declared_type: Option<String>,
    pub sql_type: Option<String>,
    pub mode: ParamMode,
    pub type_handler: Option<String>,
}

#[derive(Debug, PartialEq)]
enum Mode {
    Normal,
    InString(char),
    LineComment,
    BlockComment,
}

pub fn parse_text(input: &str) -> Result<Vec<TextFragment>> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut mode = Mode::Normal;
    let mut i = 0;

    macro_rules! flush {
        () => {
            if !buf.is_empty() {
                out.push(TextFragment::Literal(std::mem::take(&mut buf)));
            }
        };
    }

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match mode {
            Mode::Normal => {
                if c == '$' && next == Some('{') {
                    flush!();
                    i += 2;
                    let start = i;
                    while i < chars.len() && chars[i] != '}' {
                        i += 1;
                    }
                    if i >= chars.len() {
                        return Err(Error::parsing_with_input(
                            "unterminated `${...}` substitution",
                            input,
                        ));
                    }
                    let name: String = chars[start..i].iter().collect();
                    out.push(TextFragment::Identifier(name.trim().to_string()));
                    i += 1;
                    continue;
                }
                if c == '#' && next == Some('{') {
                    flush!();
                    i += 2;
                    let start = i;
                    while i < chars.len() && chars[i] != '}' {
                        i += 1;
                    }
                    if i >= chars.len() {
                        return Err(Error::parsing_with_input(
                            "unterminated `#{...}` placeholder",
                            input,
                        ));
                    }
                    let body: String = chars[start..i].iter().collect();
                    out.push(TextFragment::Placeholder(parse_placeholder_body(
                        &body, input,
                    )?));
                    i += 1;
                    continue;
                }
                if c == '\'' || c == '"' {
                    buf.push(c);
                    mode = Mode::InString(c);
                    i += 1;
                    continue;
                }
                if c == '-' && next == Some('-') {
                    buf.push('-');
                    buf.push('-');
                    mode = Mode::LineComment;
                    i += 2;
                    continue;
                }
                if c == '/' && next == Some('*') {
                    buf.push('/');
                    buf.push('*');
                    mode = Mode::BlockComment;
                    i += 2;
                    continue;
                }
                buf.push(c);
                i += 1;
            }
            Mode::InString(q) => {
                if c == '\\' && next.is_some() {
                    buf.push('\\');
                    buf.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                buf.push(c);
                i += 1;
                if c == q {
                    if next == Some(q) {
                        buf.push(q);
                        i += 1;
                    } else {
                        mode = Mode::Normal;
                    }
                }
            }
            Mode::LineComment => {
                buf.push(c);
                i += 1;
                if c == '\n' {
                    mode = Mode::Normal;
                }
            }
            Mode::BlockComment => {
                if c == '*' && next == Some('/') {
                    buf.push('*');
                    buf.push('/');
                    i += 2;
                    mode = Mode::Normal;
                } else {
                    buf.push(c);
                    i += 1;
                }
            }
        }
    }
    flush!();
    Ok(out)
}

fn parse_placeholder_body(body: &str, input: &str) -> Result<PlaceholderSpec> {
    let mut parts = body.split(',');
    let name = parts
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::parsing_with_input("empty placeholder name", input))?
        .to_string();
    let mut spec = PlaceholderSpec {
        name,
        ..Default::default()
    };
    for attr in parts {
        let attr = attr.trim();
        if attr.is_empty() {
            continue;
        }
        let Some((key, value)) = attr.split_once('=') else {
            return Err(Error::parsing_with_input(
                format!("malformed placeholder attribute `{attr}`"),
                input,
            ));
        };
        let (key, value) = (key.trim(), value.trim());
        match key {
            "phpType" | "type" => spec.declared_type = Some(value.to_string()),
            "sqlType" => spec.sql_type = Some(value.to_string()),
            "typeHandler" => spec.type_handler = Some(value.to_string()),
            "mode" => {
                spec.mode = match value.to_ascii_uppercase().as_str() {
                    "IN" => ParamMode::In,
                    "OUT" => ParamMode::Out,
                    "INOUT" => ParamMode::InOut,
                    other => {
                        return Err(Error::parsing_with_input(
                            format!("unknown parameter mode `{other}`"),
                            input,
                        ));
                    }
                };
            }
            other => {
                return Err(Error::parsing_with_input(
                    format!("unknown placeholder attribute `{other}`"),
                    input,
                ));
            }
        }
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_markers() {
        let frags = parse_text("SELECT * FROM ${table} WHERE id = #{id, sqlType=int}").unwrap();
        assert_eq!(
            frags,
            vec![
                TextFragment::Literal("SELECT * FROM ".to_string()),
                TextFragment::Identifier("table".to_string()),
                TextFragment::Literal(" WHERE id = ".to_string()),
                TextFragment::Placeholder(PlaceholderSpec {
                    name: "id".to_string(),
                    sql_type: Some("int".to_string()),
                    ..Default::default()
                }),
            ]
        );
    }

    #[test]
    fn ignores_markers_inside_string_literals() {
        let frags = parse_text("SELECT '#{not_a_placeholder}' AS lit").unwrap();
        assert_eq!(
            frags,
            vec![TextFragment::Literal(
                "SELECT '#{not_a_placeholder}' AS lit".to_string()
            )]
        );
    }

    #[test]
    fn ignores_markers_inside_comments() {
        let frags = parse_text("SELECT 1 -- #{ignored}\n, #{real}").unwrap();
        assert!(matches!(frags.last().unwrap(), TextFragment::Placeholder(p) if p.name == "real"));
    }
}
