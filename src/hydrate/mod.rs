//! Result hydration (§4.5): turning fetched rows into [`Value`] shapes
//! described by a [`ResultMap`] — scalars, flat objects, and nested
//! associations/collections keyed by identity.
//!
//! Grounded on the teacher's `Conversion` trait row fold (`conversion.rs`),
//! generalized here into a bootstrap-described `Hydrate` schema rather than
//! per-row reflection, since this crate has no runtime class registry to
//! reflect into.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::typehandler::TypeHandlerRegistry;
use crate::value::Value;

/// How a single mapped statement's rows should be assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationMode {
    /// One column's value per row.
    Scalar,
    /// A flat array of scalar rows (no grouping).
    Array,
    /// Grouped-by-identity-key objects, with nested associations/collections.
    Object,
}

#[derive(Debug, Clone)]
pub struct ColumnMapping {
    pub column: String,
    pub property: String,
    pub declared_type: Option<String>,
    pub type_handler: Option<String>,
    pub is_id: bool,
}

#[derive(Debug, Clone)]
pub struct Association {
    pub property: String,
    pub result_map: String,
    /// Column prefix applied to this association's own column mappings,
    /// since associated columns typically share the row with the parent.
    pub column_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Collection {
    pub property: String,
    pub result_map: String,
    pub column_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Discriminator {
    pub column: String,
    /// Maps a discriminator column value to the name of the `ResultMap` to
    /// apply for that row.
    pub cases: BTreeMap<String, String>,
}

/// A named, bootstrap-registered description of how to hydrate one row
/// shape. There is no per-row reflection: every `ResultMap` a `Hydrator`
/// will ever need is registered up front during configuration (§9's
/// "bootstrap schema descriptors" decision).
#[derive(Debug, Clone, Default)]
pub struct ResultMap {
    pub id: String,
    pub columns: Vec<ColumnMapping>,
    pub associations: Vec<Association>,
    pub collections: Vec<Collection>,
    pub discriminator: Option<Discriminator>,
    /// `mapUnderscoreToCamelCase` (§7's Settings): when a column has no
    /// explicit mapping, infer the property name by camel-casing it.
    pub auto_mapping: bool,
    /// The identity columns used to group repeated rows for one logical
    /// object (join results duplicate the parent row once per child).
    pub id_columns: Vec<String>,
}

pub struct Hydrator<'a> {
    result_maps: &'a BTreeMap<String, ResultMap>,
    type_handlers: &'a TypeHandlerRegistry,
}

impl<'a> Hydrator<'a> {
    #[must_use]
    pub fn new(
        result_maps: &'a BTreeMap<String, ResultMap>,
        type_handlers: &'a TypeHandlerRegistry,
    ) -> Self {
        Self {
            result_maps,
            type_handlers,
        }
    }

    /// Hydrates one column's raw value through its declared type handler (or
    /// a by-runtime-value inferred one), per §4.4/§4.5.
    fn hydrate_column(&self, mapping: &ColumnMapping, raw: &Value) -> Result<Value> {
        let handler = self.type_handlers.resolve(mapping.declared_type.as_deref(), raw);
        handler.get_result(raw)
    }

    fn resolve_map<'m>(&'m self, name: &str) -> Result<&'m ResultMap> {
        self.result_maps
            .get(name)
            .ok_or_else(|| Error::type_error(format!("no ResultMap registered under `{name}`")))
    }

    /// Hydrates a single row (a column-name → raw-value map) against a
    /// `ResultMap`, applying discriminator resolution first when present.
    pub fn hydrate_row(&self, map_name: &str, row: &BTreeMap<String, Value>) -> Result<Value> {
        let result_map = self.resolve_row_map(map_name, row)?;
        self.hydrate_flat(result_map, row, "")
    }

    fn resolve_row_map<'m>(
        &'m self,
        map_name: &str,
        row: &BTreeMap<String, Value>,
    ) -> Result<&'m ResultMap> {
        let result_map = self.resolve_map(map_name)?;
        if let Some(disc) = &result_map.discriminator {
            if let Some(raw) = row.get(&disc.column) {
                let key = raw.to_string();
                if let Some(target) = disc.cases.get(&key) {
                    return self.resolve_map(target);
                }
            }
        }
        Ok(result_map)
    }

    fn hydrate_flat(
        &self,
        result_map: &ResultMap,
        row: &BTreeMap<String, Value>,
        prefix: &str,
    ) -> Result<Value> {
        let mut object = BTreeMap::new();
        for mapping in &result_map.columns {
            let column_key = format!("{prefix}{}", mapping.column);
            let Some(raw) = row.get(&column_key) else {
                continue;
            };
            object.insert(mapping.property.clone(), self.hydrate_column(mapping, raw)?);
        }
        if result_map.auto_mapping {
            for (column, raw) in row {
                let Some(rest) = column.strip_prefix(prefix) else {
                    continue;
                };
                let property = underscore_to_camel_case(rest);
                object.entry(property).or_insert_with(|| raw.clone());
            }
        }
        for assoc in &result_map.associations {
            let assoc_prefix = assoc
                .column_prefix
                .clone()
                .unwrap_or_else(|| format!("{}_", assoc.property));
            if !row.keys().any(|k| k.starts_with(&assoc_prefix)) {
                continue;
            }
            let assoc_map = self.resolve_row_map(&assoc.result_map, row)?;
            if row_is_all_null(row, &assoc_prefix, assoc_map) {
                object.insert(assoc.property.clone(), Value::Null);
                continue;
            }
            let value = self.hydrate_flat(assoc_map, row, &assoc_prefix)?;
            object.insert(assoc.property.clone(), value);
        }
        Ok(Value::Object(object))
    }

    /// Folds a set of rows belonging to the same statement call into a
    /// vector of hydrated objects, grouping repeated rows sharing the same
    /// identity-key value into one object with its collections accumulated,
    /// preserving first-seen order (§4.5's join-result grouping rule).
    pub fn hydrate_rows(
        &self,
        map_name: &str,
        rows: &[BTreeMap<String, Value>],
    ) -> Result<Vec<Value>> {
        let mut order: Vec<String> = Vec::new();
        let mut grouped: BTreeMap<String, Value> = BTreeMap::new();
        let mut collection_seen: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();

        for row in rows {
            let result_map = self.resolve_row_map(map_name, row)?;
            let key = identity_key(row, &result_map.id_columns);
            if !grouped.contains_key(&key) {
                order.push(key.clone());
                grouped.insert(key.clone(), self.hydrate_flat(result_map, row, "")?);
            }

            for coll in &result_map.collections {
                let coll_prefix = coll
                    .column_prefix
                    .clone()
                    .unwrap_or_else(|| format!("{}_", coll.property));
                if !row.keys().any(|k| k.starts_with(&coll_prefix)) {
                    continue;
                }
                let child_map = self.resolve_row_map(&coll.result_map, row)?;
                if row_is_all_null(row, &coll_prefix, child_map) {
                    continue;
                }
                let child_key = identity_key_with_prefix(row, &child_map.id_columns, &coll_prefix);
                let seen = collection_seen
                    .entry(key.clone())
                    .or_default()
                    .entry(coll.property.clone())
                    .or_default();
                if seen.contains(&child_key) {
                    continue;
                }
                seen.push(child_key);

                let child_value = self.hydrate_flat(child_map, row, &coll_prefix)?;
                let parent = grouped.get_mut(&key).expect("just inserted above");
                if let Value::Object(obj) = parent {
                    let entry = obj
                        .entry(coll.property.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(items) = entry {
                        items.push(child_value);
                    }
                }
            }
        }

        Ok(order
            .into_iter()
            .map(|key| grouped.remove(&key).unwrap_or(Value::Null))
            .collect())
    }
}

fn row_is_all_null(row: &BTreeMap<String, Value>, prefix: &str, result_map: &ResultMap) -> bool {
    result_map.columns.iter().all(|mapping| {
        let key = format!("{prefix}{}", mapping.column);
        matches!(row.get(&key), None | Some(Value::Null))
    })
}

fn identity_key(row: &BTreeMap<String, Value>, id_columns: &[String]) -> String {
    identity_key_with_prefix(row, id_columns, "")
}

fn identity_key_with_prefix(row: &BTreeMap<String, Value>, id_columns: &[String], prefix: &str) -> String {
    if id_columns.is_empty() {
        return row
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\u{1}");
    }
    id_columns
        .iter()
        .map(|c| {
            let key = format!("{prefix}{c}");
            row.get(&key).map(ToString::to_string).unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join("\u{1}")
}

fn underscore_to_camel_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut upper_next = false;
    for c in input.chars() {
        if c == '_' {
            upper_next = true;
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn underscore_to_camel_case_converts() {
        assert_eq!(underscore_to_camel_case("first_name"), "firstName");
        assert_eq!(underscore_to_camel_case("id"), "id");
    }

    #[test]
    fn hydrates_flat_row_with_auto_mapping() {
        let mut maps = BTreeMap::new();
        maps.insert(
            "user".to_string(),
            ResultMap {
                id: "user".to_string(),
                columns: vec![ColumnMapping {
                    column: "id".to_string(),
                    property: "id".to_string(),
                    declared_type: None,
                    type_handler: None,
                    is_id: true,
                }],
                auto_mapping: true,
                id_columns: vec!["id".to_string()],
                ..Default::default()
            },
        );
        let handlers = TypeHandlerRegistry::with_defaults();
        let hydrator = Hydrator::new(&maps, &handlers);
        let r = row(&[
            ("id", Value::Int(1)),
            ("full_name", Value::Str("Ada".to_string())),
        ]);
        let hydrated = hydrator.hydrate_row("user", &r).unwrap();
        let Value::Object(obj) = hydrated else {
            panic!("expected object");
        };
        assert_eq!(obj.get("id"), Some(&Value::Int(1)));
        assert_eq!(obj.get("fullName"), Some(&Value::Str("Ada".to_string())));
    }

    #[test]
    fn groups_joined_rows_by_identity_preserving_order() {
        let mut maps = BTreeMap::new();
        maps.insert(
            "post".to_string(),
            ResultMap {
                id: "post".to_string(),
                columns: vec![ColumnMapping {
                    column: "id".to_string(),
                    property: "id".to_string(),
                    declared_type: None,
                    type_handler: None,
                    is_id: true,
                }],
                collections: vec![Collection {
                    property: "tags".to_string(),
                    result_map: "tag".to_string(),
                    column_prefix: Some("tag_".to_string()),
                }],
                id_columns: vec!["id".to_string()],
                ..Default::default()
            },
        );
        maps.insert(
            "tag".to_string(),
            ResultMap {
                id: "tag".to_string(),
                columns: vec![ColumnMapping {
                    column: "id".to_string(),
                    property: "id".to_string(),
                    declared_type: None,
                    type_handler: None,
                    is_id: true,
                }],
                id_columns: vec!["id".to_string()],
                ..Default::default()
            },
        );
        let handlers = TypeHandlerRegistry::with_defaults();
        let hydrator = Hydrator::new(&maps, &handlers);
        let rows = vec![
            row(&[("id", Value::Int(1)), ("tag_id", Value::Int(10))]),
            row(&[("id", Value::Int(1)), ("tag_id", Value::Int(11))]),
            row(&[("id", Value::Int(2)), ("tag_id", Value::Null)]),
        ];
        let out = hydrator.hydrate_rows("post", &rows).unwrap();
        assert_eq!(out.len(), 2);
        let Value::Object(first) = &out[0] else {
            panic!()
        };
        let Some(Value::Array(tags)) = first.get("tags") else {
            panic!("expected tags array")
        };
        assert_eq!(tags.len(), 2);
    }
}
