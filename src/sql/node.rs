//! The closed `SqlNode` tree (§4.2): the parsed shape of a dynamic SQL
//! template. Each variant's `render` mirrors one bullet of §4.2 verbatim.
//!
//! Grounded on the teacher's `Ast` node walk (`src/ast/mod.rs`'s
//! `_append_ast`), generalized from the teacher's fixed `<if>`/`<foreach>`
//! tag vocabulary to this closed enum.

use crate::error::Result;
use crate::expr;
use crate::sql::context::DynamicContext;
use crate::sql::markers::{self, TextFragment};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamMode {
    #[default]
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone)]
pub struct When {
    pub test: String,
    pub child: Box<SqlNode>,
}

#[derive(Debug, Clone)]
pub enum SqlNode {
    Text(String),
    Mixed(Vec<SqlNode>),
    If {
        test: String,
        child: Box<SqlNode>,
    },
    Choose {
        whens: Vec<When>,
        otherwise: Option<Box<SqlNode>>,
    },
    ForEach {
        collection: String,
        item: String,
        index: Option<String>,
        open: String,
        close: String,
        separator: String,
        child: Box<SqlNode>,
    },
    Trim {
        child: Box<SqlNode>,
        prefix: Option<String>,
        prefix_overrides: Vec<String>,
        suffix: Option<String>,
        suffix_overrides: Vec<String>,
    },
}

impl SqlNode {
    #[must_use]
    pub fn where_(child: SqlNode) -> Self {
        SqlNode::Trim {
            child: Box::new(child),
            prefix: Some("WHERE ".to_string()),
            prefix_overrides: vec!["AND ".to_string(), "OR ".to_string()],
            suffix: None,
            suffix_overrides: Vec::new(),
        }
    }

    #[must_use]
    pub fn set(child: SqlNode) -> Self {
        SqlNode::Trim {
            child: Box::new(child),
            prefix: Some("SET ".to_string()),
            prefix_overrides: Vec::new(),
            suffix: None,
            suffix_overrides: vec![",".to_string()],
        }
    }

    /// Renders this node's SQL and bindings into `ctx`. Returns `true` iff
    /// this node produced any SQL output (§4.2's propagation rule for
    /// `Mixed`/`If`/`Choose`).
    pub fn render(&self, ctx: &mut DynamicContext) -> Result<bool> {
        match self {
            SqlNode::Text(text) => {
                render_text(text, ctx)?;
                Ok(true)
            }
            SqlNode::Mixed(children) => {
                let mut any = false;
                for child in children {
                    any |= child.render(ctx)?;
                }
                Ok(any)
            }
            SqlNode::If { test, child } => {
                if expr::evaluate_boolean(test, &ctx.bindings)? {
                    child.render(ctx)
                } else {
                    Ok(false)
                }
            }
            SqlNode::Choose { whens, otherwise } => {
                for when in whens {
                    if expr::evaluate_boolean(&when.test, &ctx.bindings)? {
                        return when.child.render(ctx);
                    }
                }
                match otherwise {
                    Some(node) => node.render(ctx),
                    None => Ok(false),
                }
            }
            SqlNode::ForEach {
                collection,
                item,
                index,
                open,
                close,
                separator,
                child,
            } => render_foreach(
                collection, item, index, open, close, separator, child, ctx,
            ),
            SqlNode::Trim {
                child,
                prefix,
                prefix_overrides,
                suffix,
                suffix_overrides,
            } => render_trim(child, prefix, prefix_overrides, suffix, suffix_overrides, ctx),
        }
    }
}

fn render_text(text: &str, ctx: &mut DynamicContext) -> Result<()> {
    for frag in markers::parse_text(text)? {
        match frag {
            TextFragment::Literal(lit) => ctx.push_sql(&lit),
            TextFragment::Identifier(name) => {
                let resolved = ctx.resolve_name(&name);
                let value = crate::value::resolve_path(&resolved, &ctx.bindings);
                ctx.push_sql(&value.to_string());
            }
            TextFragment::Placeholder(spec) => {
                let property = ctx.resolve_name(&spec.name);
                let value = crate::value::resolve_path(&property, &ctx.bindings);
                // The marker token embedded in the SQL text only needs to be
                // a unique, identifier-shaped placeholder for the dialect
                // rewriter to find and replace in source order (§4.6); it is
                // not looked up again, so a dotted `property` path (§4.3) is
                // sanitized here rather than carried verbatim into the SQL.
                let marker = format!(":{}", property.replace('.', "__"));
                ctx.push_placeholder(
                    &marker,
                    crate::sql::source::ParameterMapping {
                        property,
                        declared_type: spec.declared_type,
                        sql_type: spec.sql_type,
                        mode: spec.mode,
                        type_handler: spec.type_handler,
                        value,
                    },
                );
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn render_foreach(
    collection: &str,
    item: &str,
    index: &Option<String>,
    open: &str,
    close: &str,
    separator: &str,
    child: &SqlNode,
    ctx: &mut DynamicContext,
) -> Result<bool> {
    let items = expr::evaluate(collection, &ctx.bindings)?;
    let elements: Vec<Value> = match items {
        Value::Array(v) => v,
        Value::Object(map) => map.into_values().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };

    if elements.is_empty() {
        return Ok(false);
    }

    ctx.push_sql(open);
    for (i, element) in elements.iter().enumerate() {
        if i > 0 {
            ctx.push_sql(separator);
        }
        let unique = ctx.next_unique();
        let synthetic_item = format!("__{item}_{unique}");

        let mut child_ctx = ctx.child();
        child_ctx
            .bindings
            .insert(synthetic_item.clone(), element.clone());
        child_ctx.remap(item, &synthetic_item);
        if let Some(index_name) = index {
            let synthetic_index = format!("__{index_name}_{unique}");
            child_ctx
                .bindings
                .insert(synthetic_index.clone(), Value::Int(i as i64));
            child_ctx.remap(index_name, &synthetic_index);
        }
        child.render(&mut child_ctx)?;
        ctx.push_sql(child_ctx.sql());
        ctx.absorb(child_ctx);
    }
    ctx.push_sql(close);
    Ok(true)
}

fn render_trim(
    child: &SqlNode,
    prefix: &Option<String>,
    prefix_overrides: &[String],
    suffix: &Option<String>,
    suffix_overrides: &[String],
    ctx: &mut DynamicContext,
) -> Result<bool> {
    let mut child_ctx = ctx.child();
    let produced = child.render(&mut child_ctx)?;
    if !produced {
        ctx.absorb_counter(&child_ctx);
        return Ok(false);
    }

    let child_counter = child_ctx.counter();
    let (child_sql, child_mappings) = child_ctx.into_parts();
    let mut body = child_sql;
    let trimmed_start = body.trim_start();
    let leading_ws = &body[..body.len() - trimmed_start.len()];
    let mut rest = trimmed_start;
    for over in prefix_overrides {
        if let Some(stripped) = rest.strip_prefix(over.as_str()) {
            rest = stripped;
            break;
        }
        if let Some(stripped) = rest.strip_prefix(over.trim()) {
            rest = stripped.trim_start();
            break;
        }
    }
    body = format!("{leading_ws}{rest}");

    let trimmed_end = body.trim_end();
    let trailing_ws = &body[trimmed_end.len()..];
    let mut rest_end = trimmed_end;
    for over in suffix_overrides {
        if let Some(stripped) = rest_end.strip_suffix(over.as_str()) {
            rest_end = stripped;
            break;
        }
        if let Some(stripped) = rest_end.strip_suffix(over.trim()) {
            rest_end = stripped.trim_end();
            break;
        }
    }
    body = format!("{rest_end}{trailing_ws}");

    if let Some(prefix) = prefix {
        ctx.push_sql(prefix);
    }
    ctx.push_sql(body.trim());
    if let Some(suffix) = suffix {
        ctx.push_sql(suffix);
    }
    ctx.absorb_counter_value(child_counter);
    ctx.append_mappings(child_mappings);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ParamsMap;

    fn bindings_with_ids(ids: Vec<i64>) -> ParamsMap {
        let mut m = ParamsMap::new();
        m.insert(
            "ids".to_string(),
            Value::Array(ids.into_iter().map(Value::Int).collect()),
        );
        m
    }

    #[test]
    fn mixed_propagates_any_child_true() {
        let node = SqlNode::Mixed(vec![
            SqlNode::If {
                test: "false".to_string(),
                child: Box::new(SqlNode::Text("A".to_string())),
            },
            SqlNode::Text("B".to_string()),
        ]);
        let mut ctx = DynamicContext::new(ParamsMap::new());
        assert!(node.render(&mut ctx).unwrap());
        assert_eq!(ctx.sql(), "B");
    }

    #[test]
    fn where_strips_leading_and_or() {
        let node = SqlNode::where_(SqlNode::Mixed(vec![
            SqlNode::If {
                test: "true".to_string(),
                child: Box::new(SqlNode::Text("AND a = 1 ".to_string())),
            },
            SqlNode::If {
                test: "true".to_string(),
                child: Box::new(SqlNode::Text("AND b = 2".to_string())),
            },
        ]));
        let mut ctx = DynamicContext::new(ParamsMap::new());
        assert!(node.render(&mut ctx).unwrap());
        assert_eq!(ctx.sql(), "WHERE a = 1 AND b = 2");
    }

    #[test]
    fn where_emits_nothing_when_child_is_empty() {
        let node = SqlNode::where_(SqlNode::If {
            test: "false".to_string(),
            child: Box::new(SqlNode::Text("AND a = 1".to_string())),
        });
        let mut ctx = DynamicContext::new(ParamsMap::new());
        assert!(!node.render(&mut ctx).unwrap());
        assert_eq!(ctx.sql(), "");
    }

    #[test]
    fn foreach_joins_with_separator_and_wraps() {
        let node = SqlNode::ForEach {
            collection: "ids".to_string(),
            item: "id".to_string(),
            index: None,
            open: "(".to_string(),
            close: ")".to_string(),
            separator: ", ".to_string(),
            child: Box::new(SqlNode::Text("#{id}".to_string())),
        };
        let mut ctx = DynamicContext::new(bindings_with_ids(vec![1, 2, 3]));
        assert!(node.render(&mut ctx).unwrap());
        assert!(ctx.sql().starts_with('('));
        assert!(ctx.sql().ends_with(')'));
    }

    #[test]
    fn foreach_on_empty_collection_emits_nothing() {
        let node = SqlNode::ForEach {
            collection: "ids".to_string(),
            item: "id".to_string(),
            index: None,
            open: "(".to_string(),
            close: ")".to_string(),
            separator: ", ".to_string(),
            child: Box::new(SqlNode::Text("#{id}".to_string())),
        };
        let mut ctx = DynamicContext::new(bindings_with_ids(vec![]));
        assert!(!node.render(&mut ctx).unwrap());
        assert_eq!(ctx.sql(), "");
    }

    #[test]
    fn set_strips_trailing_comma() {
        let node = SqlNode::set(SqlNode::Mixed(vec![
            SqlNode::If {
                test: "true".to_string(),
                child: Box::new(SqlNode::Text("name = #{name},".to_string())),
            },
            SqlNode::If {
                test: "false".to_string(),
                child: Box::new(SqlNode::Text("age = #{age},".to_string())),
            },
        ]));
        let mut ctx = DynamicContext::new(ParamsMap::new());
        assert!(node.render(&mut ctx).unwrap());
        assert_eq!(ctx.sql(), "SET name = :name");
        assert_eq!(ctx.mappings().len(), 1);
        assert_eq!(ctx.mappings()[0].property, "name");
    }

    #[test]
    fn foreach_gives_each_iteration_a_unique_placeholder() {
        let node = SqlNode::ForEach {
            collection: "ids".to_string(),
            item: "id".to_string(),
            index: None,
            open: "(".to_string(),
            close: ")".to_string(),
            separator: ", ".to_string(),
            child: Box::new(SqlNode::Text("#{id}".to_string())),
        };
        let mut ctx = DynamicContext::new(bindings_with_ids(vec![1, 2, 3]));
        assert!(node.render(&mut ctx).unwrap());
        let names: Vec<&str> = ctx.mappings().iter().map(|m| m.property.as_str()).collect();
        let unique: std::collections::BTreeSet<&str> = names.iter().copied().collect();
        assert_eq!(names.len(), 3);
        assert_eq!(unique.len(), 3, "every iteration must bind a distinct name");
    }

    #[test]
    fn placeholder_resolves_dotted_property_path() {
        let mut user = crate::value::ParamsMap::new();
        user.insert("age".to_string(), Value::Int(42));
        let mut root = ParamsMap::new();
        root.insert("user".to_string(), Value::Object(user));
        let node = SqlNode::Text("age = #{user.age}".to_string());
        let mut ctx = DynamicContext::new(root);
        assert!(node.render(&mut ctx).unwrap());
        assert_eq!(ctx.mappings().len(), 1);
        assert_eq!(ctx.mappings()[0].property, "user.age");
        assert_eq!(ctx.mappings()[0].value, Value::Int(42));
        // the dot must not leak into the emitted placeholder marker
        assert!(!ctx.sql().contains("user.age"));
    }

    #[test]
    fn foreach_item_dotted_field_access() {
        let mut order1 = crate::value::ParamsMap::new();
        order1.insert("total".to_string(), Value::Int(10));
        let mut order2 = crate::value::ParamsMap::new();
        order2.insert("total".to_string(), Value::Int(20));
        let mut root = ParamsMap::new();
        root.insert(
            "orders".to_string(),
            Value::Array(vec![Value::Object(order1), Value::Object(order2)]),
        );
        let node = SqlNode::ForEach {
            collection: "orders".to_string(),
            item: "o".to_string(),
            index: None,
            open: "(".to_string(),
            close: ")".to_string(),
            separator: ", ".to_string(),
            child: Box::new(SqlNode::Text("#{o.total}".to_string())),
        };
        let mut ctx = DynamicContext::new(root);
        assert!(node.render(&mut ctx).unwrap());
        let values: Vec<&Value> = ctx.mappings().iter().map(|m| &m.value).collect();
        assert_eq!(values, vec![&Value::Int(10), &Value::Int(20)]);
    }

    #[test]
    fn choose_falls_back_to_otherwise() {
        let node = SqlNode::Choose {
            whens: vec![When {
                test: "false".to_string(),
                child: Box::new(SqlNode::Text("A".to_string())),
            }],
            otherwise: Some(Box::new(SqlNode::Text("B".to_string()))),
        };
        let mut ctx = DynamicContext::new(ParamsMap::new());
        assert!(node.render(&mut ctx).unwrap());
        assert_eq!(ctx.sql(), "B");
    }
}
