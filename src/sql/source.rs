//! `SqlSource` (§3/§4.2): the compiled shape of one mapped statement's SQL,
//! either fixed at configuration time (`StaticSqlSource`) or rebuilt per call
//! from a `SqlNode` tree (`DynamicSqlSource`). Both produce a [`BoundSql`]:
//! driver-neutral SQL text plus an ordered list of [`ParameterMapping`]s.
//!
//! Grounded on the teacher's `query_builder.rs`, which separates "build the
//! SQL text with named markers" from "bind values into the driver's
//! positional/named placeholder style" the same way.

use crate::error::Result;
use crate::sql::context::DynamicContext;
use crate::sql::node::{ParamMode, SqlNode};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterMapping {
    /// The binding name this marker was resolved from at render time — a
    /// dotted path for an ordinary property, or a `ForEach`-synthesized
    /// per-iteration name. Kept for diagnostics; `value` already holds the
    /// resolved result, so nothing needs to re-look this up later.
    pub property: String,
    pub declared_type: Option<String>,
    pub sql_type: Option<String>,
    pub mode: ParamMode,
    pub type_handler: Option<String>,
    /// The value bound to this marker at render time. Resolving eagerly,
    /// rather than deferring to a second lookup against the original
    /// parameter, is what lets `ForEach` give every iteration's placeholder
    /// a distinct, already-correct value without the caller needing to know
    /// about synthetic binding names.
    pub value: Value,
}

impl ParameterMapping {
    #[must_use]
    pub fn simple(property: impl Into<String>, value: Value) -> Self {
        Self {
            property: property.into(),
            declared_type: None,
            sql_type: None,
            mode: ParamMode::In,
            type_handler: None,
            value,
        }
    }
}

/// The final, driver-neutral product of rendering: `:name` markers in
/// `sql`, one [`ParameterMapping`] per marker in encounter order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSql {
    pub sql: String,
    pub mappings: Vec<ParameterMapping>,
}

impl BoundSql {
    /// The resolved values in marker order, ready for the type-handler/bind
    /// pipeline (§4.6).
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.mappings.iter().map(|m| m.value.clone()).collect()
    }
}

pub trait SqlSource: Send + Sync {
    /// Produces the SQL and parameter mappings for one invocation, given the
    /// call's root parameter object.
    ///
    /// # Errors
    /// Returns an error if a dynamic test expression or `ForEach` collection
    /// path fails to evaluate.
    fn get_bound_sql(&self, parameter: Value) -> Result<BoundSql>;
}

/// A statement with no dynamic content: parsed once at configuration time,
/// identical on every call.
#[derive(Debug, Clone)]
pub struct StaticSqlSource {
    root: SqlNode,
}

impl StaticSqlSource {
    #[must_use]
    pub fn new(root: SqlNode) -> Self {
        Self { root }
    }
}

impl SqlSource for StaticSqlSource {
    fn get_bound_sql(&self, parameter: Value) -> Result<BoundSql> {
        let mut ctx = DynamicContext::from_value(parameter);
        self.root.render(&mut ctx)?;
        let (sql, mappings) = ctx.into_parts();
        Ok(BoundSql { sql, mappings })
    }
}

/// A statement containing `If`/`Choose`/`ForEach`/`Trim` nodes: re-walked on
/// every call since the shape of the emitted SQL depends on the parameter.
#[derive(Debug, Clone)]
pub struct DynamicSqlSource {
    root: SqlNode,
}

impl DynamicSqlSource {
    #[must_use]
    pub fn new(root: SqlNode) -> Self {
        Self { root }
    }
}

impl SqlSource for DynamicSqlSource {
    fn get_bound_sql(&self, parameter: Value) -> Result<BoundSql> {
        let mut ctx = DynamicContext::from_value(parameter);
        self.root.render(&mut ctx)?;
        let (sql, mappings) = ctx.into_parts();
        Ok(BoundSql { sql, mappings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn static_source_binds_in_marker_order() {
        let root = SqlNode::Mixed(vec![
            SqlNode::Text("SELECT * FROM t WHERE a = ".to_string()),
            SqlNode::Text("#{a} AND b = ".to_string()),
            SqlNode::Text("#{b}".to_string()),
        ]);
        let source = StaticSqlSource::new(root);
        let mut params = BTreeMap::new();
        params.insert("a".to_string(), Value::Int(1));
        params.insert("b".to_string(), Value::Int(2));
        let bound = source.get_bound_sql(Value::Object(params)).unwrap();
        assert_eq!(bound.mappings.len(), 2);
        assert_eq!(bound.mappings[0].property, "a");
        assert_eq!(bound.mappings[1].property, "b");
        assert_eq!(bound.values(), vec![Value::Int(1), Value::Int(2)]);
    }
}
