//! Type handlers (§4.4): the bridge between a [`Value`] the expression
//! evaluator and node tree traffic in, and whatever shape the underlying
//! driver binds to and returns.
//!
//! Grounded on the teacher's `conversion.rs` (`Conversion` trait, one
//! implementation per scalar kind), generalized from a PHP-zval boundary to
//! this crate's own [`Value`] boundary, plus a registry modeled on the
//! teacher's `DashMap`-backed handler tables in `driver.rs`.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::value::Value;

/// A single scalar conversion: how to turn a bound [`Value`] into the SQL
/// text/parameter form sent to the driver, and how to turn a driver-typed
/// column back into a [`Value`] after fetch.
pub trait TypeHandler: Send + Sync {
    /// Name used to look this handler up by `typeHandler=` attribute or by
    /// declared type (§4.3/§4.4).
    fn name(&self) -> &str;

    /// Validates/normalizes a value on the way into a bound parameter.
    ///
    /// # Errors
    /// Returns [`Error::Type`] if `value` cannot be represented in this
    /// handler's target type.
    fn set_parameter(&self, value: &Value) -> Result<Value>;

    /// Converts a value read back from the driver into this handler's
    /// canonical [`Value`] representation.
    ///
    /// # Errors
    /// Returns [`Error::Type`] if `raw` is not a shape this handler accepts.
    fn get_result(&self, raw: &Value) -> Result<Value>;
}

macro_rules! simple_handler {
    ($struct_name:ident, $name:literal, $check:expr) => {
        pub struct $struct_name;

        impl TypeHandler for $struct_name {
            fn name(&self) -> &str {
                $name
            }

            fn set_parameter(&self, value: &Value) -> Result<Value> {
                $check(value)
            }

            fn get_result(&self, raw: &Value) -> Result<Value> {
                $check(raw)
            }
        }
    };
}

simple_handler!(IntegerTypeHandler, "integer", |v: &Value| match v {
    Value::Int(_) | Value::Null => Ok(v.clone()),
    Value::Str(s) => s
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|_| Error::type_error(format!("`{s}` is not an integer"))),
    Value::Float(f) => Ok(Value::Int(*f as i64)),
    other => Err(Error::type_error(format!(
        "cannot coerce {other:?} to integer"
    ))),
});

simple_handler!(FloatTypeHandler, "float", |v: &Value| match v {
    Value::Float(_) | Value::Null => Ok(v.clone()),
    Value::Int(i) => Ok(Value::Float(*i as f64)),
    Value::Str(s) => s
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| Error::type_error(format!("`{s}` is not a float"))),
    other => Err(Error::type_error(format!(
        "cannot coerce {other:?} to float"
    ))),
});

simple_handler!(StringTypeHandler, "string", |v: &Value| match v {
    Value::Str(_) | Value::Null => Ok(v.clone()),
    other => Ok(Value::Str(other.to_string())),
});

pub struct BooleanTypeHandler;

impl TypeHandler for BooleanTypeHandler {
    fn name(&self) -> &str {
        "boolean"
    }

    fn set_parameter(&self, value: &Value) -> Result<Value> {
        Ok(Value::Bool(crate::expr::coerce_boolean(value)))
    }

    /// Accepts the enumerated on-wire boolean representations a driver may
    /// hand back: native bool, `0`/`1`, or any of `"0"/"1"`, `"t"/"f"`,
    /// `"true"/"false"`, `"y"/"n"`, `"yes"/"no"`, `"on"/"off"`, matched
    /// case-insensitively (§4.4).
    fn get_result(&self, raw: &Value) -> Result<Value> {
        match raw {
            Value::Bool(_) | Value::Null => Ok(raw.clone()),
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Int(1) => Ok(Value::Bool(true)),
            Value::Str(s) => match s.to_ascii_lowercase().as_str() {
                "1" | "t" | "true" | "y" | "yes" | "on" => Ok(Value::Bool(true)),
                // "0"/"f"/"false"/"n"/"no"/"off" and anything else not
                // matching a recognized true-form all map to false (§4.4).
                _ => Ok(Value::Bool(false)),
            },
            other => Err(Error::type_error(format!(
                "cannot coerce {other:?} to boolean"
            ))),
        }
    }
}

pub struct JsonTypeHandler;

impl TypeHandler for JsonTypeHandler {
    fn name(&self) -> &str {
        "json"
    }

    fn set_parameter(&self, value: &Value) -> Result<Value> {
        Ok(value.clone())
    }

    fn get_result(&self, raw: &Value) -> Result<Value> {
        match raw {
            Value::Json(_) | Value::Null => Ok(raw.clone()),
            Value::Str(s) => serde_json::from_str(s)
                .map(Value::Json)
                .map_err(Error::from),
            other => Ok(other.clone()),
        }
    }
}

/// Naive (wall-clock) date/time handling: `DATE`/`TIMESTAMP` columns with no
/// timezone, bound to `chrono::NaiveDate`/`NaiveDateTime`.
pub struct TemporalMutableTypeHandler;

impl TypeHandler for TemporalMutableTypeHandler {
    fn name(&self) -> &str {
        "temporal_mutable"
    }

    fn set_parameter(&self, value: &Value) -> Result<Value> {
        normalize_temporal(value)
    }

    fn get_result(&self, raw: &Value) -> Result<Value> {
        normalize_temporal(raw)
    }
}

/// Timezone-aware date/time handling: `TIMESTAMPTZ`-style columns, bound to
/// `chrono::DateTime<Utc>`.
pub struct TemporalImmutableTypeHandler;

impl TypeHandler for TemporalImmutableTypeHandler {
    fn name(&self) -> &str {
        "temporal_immutable"
    }

    fn set_parameter(&self, value: &Value) -> Result<Value> {
        match value {
            Value::DateTimeUtc(_) | Value::Null => Ok(value.clone()),
            Value::Str(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| Value::DateTimeUtc(dt.with_timezone(&Utc)))
                .map_err(|e| Error::type_error(format!("invalid RFC 3339 timestamp: {e}"))),
            other => Err(Error::type_error(format!(
                "cannot coerce {other:?} to a timezone-aware timestamp"
            ))),
        }
    }

    fn get_result(&self, raw: &Value) -> Result<Value> {
        self.set_parameter(raw)
    }
}

fn normalize_temporal(value: &Value) -> Result<Value> {
    match value {
        Value::Date(_) | Value::DateTime(_) | Value::Null => Ok(value.clone()),
        Value::Str(s) => {
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return Ok(Value::Date(d));
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Ok(Value::DateTime(dt));
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                return Ok(Value::DateTime(dt));
            }
            Err(Error::type_error(format!(
                "`{s}` does not match a recognized date/timestamp format"
            )))
        }
        other => Err(Error::type_error(format!(
            "cannot coerce {other:?} to a date/timestamp"
        ))),
    }
}

/// Supplements the teacher's handler set: the teacher already depends on
/// `uuid` for driver plumbing but never exposed a dedicated handler for it.
pub struct UuidTypeHandler;

impl TypeHandler for UuidTypeHandler {
    fn name(&self) -> &str {
        "uuid"
    }

    fn set_parameter(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Uuid(_) | Value::Null => Ok(value.clone()),
            Value::Str(s) => Uuid::parse_str(s)
                .map(Value::Uuid)
                .map_err(|e| Error::type_error(format!("invalid UUID `{s}`: {e}"))),
            other => Err(Error::type_error(format!(
                "cannot coerce {other:?} to a UUID"
            ))),
        }
    }

    fn get_result(&self, raw: &Value) -> Result<Value> {
        self.set_parameter(raw)
    }
}

/// An enum-backed handler that maps a Rust-side enum's string/ordinal
/// representation onto a fixed set of known values, for columns declared
/// against a closed value set (§4.4's enum-auto-handler lookup step).
pub struct EnumValuedTypeHandler {
    name: String,
    values: Vec<String>,
}

impl EnumValuedTypeHandler {
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

impl TypeHandler for EnumValuedTypeHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_parameter(&self, value: &Value) -> Result<Value> {
        self.get_result(value)
    }

    fn get_result(&self, raw: &Value) -> Result<Value> {
        match raw {
            Value::Null => Ok(Value::Null),
            Value::Str(s) if self.values.iter().any(|v| v == s) => Ok(raw.clone()),
            other => Err(Error::type_error(format!(
                "`{other:?}` is not one of the declared enum values for `{}`",
                self.name
            ))),
        }
    }
}

/// An enum-backed handler for unit-valued enums (§4.4): the column holds the
/// variant's case name itself (`"Active"`, not some mapped value), so this
/// handler only validates membership rather than translating a case name to
/// a stored value the way [`EnumValuedTypeHandler`] does. Distinguished from
/// it because the cache-key serialization rules differ (`caseName` vs
/// `value` per §3) and a unit enum has no separate on-wire representation to
/// translate through.
pub struct EnumUnitValuedTypeHandler {
    name: String,
    case_names: Vec<String>,
}

impl EnumUnitValuedTypeHandler {
    #[must_use]
    pub fn new(name: impl Into<String>, case_names: Vec<String>) -> Self {
        Self {
            name: name.into(),
            case_names,
        }
    }
}

impl TypeHandler for EnumUnitValuedTypeHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_parameter(&self, value: &Value) -> Result<Value> {
        self.get_result(value)
    }

    fn get_result(&self, raw: &Value) -> Result<Value> {
        match raw {
            Value::Null => Ok(Value::Null),
            Value::Str(s) if self.case_names.iter().any(|c| c == s) => Ok(raw.clone()),
            other => Err(Error::type_error(format!(
                "`{other:?}` is not a declared case name for unit enum `{}`",
                self.name
            ))),
        }
    }
}

/// Registry holding all known handlers plus the default fallback, with the
/// four-step lookup order from §4.4: exact name, enum auto-handler, nearest
/// registered ancestor type, then the configured unknown-type handler.
pub struct TypeHandlerRegistry {
    by_name: DashMap<String, Arc<dyn TypeHandler>>,
    unknown_handler: Arc<dyn TypeHandler>,
}

impl TypeHandlerRegistry {
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self {
            by_name: DashMap::new(),
            unknown_handler: Arc::new(StringTypeHandler),
        };
        registry.register(Arc::new(IntegerTypeHandler));
        registry.register(Arc::new(FloatTypeHandler));
        registry.register(Arc::new(BooleanTypeHandler));
        registry.register(Arc::new(StringTypeHandler));
        registry.register(Arc::new(JsonTypeHandler));
        registry.register(Arc::new(TemporalMutableTypeHandler));
        registry.register(Arc::new(TemporalImmutableTypeHandler));
        registry.register(Arc::new(UuidTypeHandler));
        registry
    }

    pub fn register(&self, handler: Arc<dyn TypeHandler>) {
        self.by_name.insert(handler.name().to_string(), handler);
    }

    /// Step 1 of §4.4's lookup: an exact name match (a `typeHandler=` or
    /// `declared_type=` attribute naming a registered handler directly).
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<Arc<dyn TypeHandler>> {
        self.by_name.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Resolves a handler for a placeholder by declared type / explicit
    /// handler name, falling back through ancestor-by-runtime-value, then
    /// the unknown-type handler, matching never failing outright.
    #[must_use]
    pub fn resolve(&self, declared_type: Option<&str>, runtime_value: &Value) -> Arc<dyn TypeHandler> {
        if let Some(name) = declared_type {
            if let Some(handler) = self.by_name(name) {
                return handler;
            }
        }
        self.by_runtime_value(runtime_value)
    }

    /// The by-runtime-value lookup form (§4.4): infers a handler purely from
    /// the shape of a value with no declared type at all.
    #[must_use]
    pub fn by_runtime_value(&self, value: &Value) -> Arc<dyn TypeHandler> {
        let name = match value {
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Json(_) => "json",
            Value::Date(_) | Value::DateTime(_) => "temporal_mutable",
            Value::DateTimeUtc(_) => "temporal_immutable",
            Value::Uuid(_) => "uuid",
            Value::Null | Value::Array(_) | Value::Object(_) => "string",
        };
        self.by_name(name).unwrap_or_else(|| Arc::clone(&self.unknown_handler))
    }
}

impl Default for TypeHandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_handler_coerces_numeric_strings() {
        let h = IntegerTypeHandler;
        assert_eq!(h.set_parameter(&Value::Str("42".to_string())).unwrap(), Value::Int(42));
        assert!(h.set_parameter(&Value::Str("nope".to_string())).is_err());
    }

    #[test]
    fn boolean_handler_accepts_enumerated_wire_forms() {
        let h = BooleanTypeHandler;
        assert_eq!(h.get_result(&Value::Int(1)).unwrap(), Value::Bool(true));
        assert_eq!(h.get_result(&Value::Str("f".to_string())).unwrap(), Value::Bool(false));
        assert_eq!(h.get_result(&Value::Str("YES".to_string())).unwrap(), Value::Bool(true));
        assert_eq!(h.get_result(&Value::Str("Off".to_string())).unwrap(), Value::Bool(false));
        assert_eq!(h.get_result(&Value::Str("n".to_string())).unwrap(), Value::Bool(false));
        assert_eq!(h.get_result(&Value::Str("maybe".to_string())).unwrap(), Value::Bool(false));
    }

    #[test]
    fn enum_unit_valued_handler_validates_case_names_only() {
        let handler = EnumUnitValuedTypeHandler::new("suit", vec!["Hearts".into(), "Spades".into()]);
        assert!(handler.get_result(&Value::Str("Hearts".to_string())).is_ok());
        assert!(handler.get_result(&Value::Str("Clubs".to_string())).is_err());
        assert_eq!(handler.get_result(&Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn registry_resolves_by_declared_type_then_falls_back() {
        let registry = TypeHandlerRegistry::with_defaults();
        let handler = registry.resolve(Some("uuid"), &Value::Str("ignored".to_string()));
        assert_eq!(handler.name(), "uuid");
        let fallback = registry.resolve(None, &Value::Int(5));
        assert_eq!(fallback.name(), "integer");
    }

    #[test]
    fn enum_valued_handler_rejects_out_of_set_values() {
        let handler = EnumValuedTypeHandler::new("status", vec!["active".into(), "closed".into()]);
        assert!(handler.get_result(&Value::Str("active".to_string())).is_ok());
        assert!(handler.get_result(&Value::Str("unknown".to_string())).is_err());
    }
}
