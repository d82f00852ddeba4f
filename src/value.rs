//! The binding/parameter value type shared by the expression evaluator,
//! the SQL node tree, and the type-handler registry.
//!
//! Generalizes the teacher's `ParameterValue`/`ast::Value` split into a
//! single enum: one value space serves as both an expression-evaluator
//! binding and a placeholder's bound value, since in this runtime both are
//! just "the named parameter the caller passed in".

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// A value bound to a placeholder or visible to the expression evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    /// A named-field record — what the evaluator's `a.b.c` identifier paths
    /// walk through, and what the hydrator's `Object` mode constructs from.
    Object(BTreeMap<String, Value>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl Value {
    /// §4.1/§4.2's notion of "empty" used by `evaluateBoolean` and by
    /// `ConditionalBlock`/`If`/`ForEach` emptiness checks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Str(s) => s.is_empty(),
            Self::Array(a) => a.is_empty(),
            Self::Bool(b) => !b,
            _ => false,
        }
    }

    /// Resolves one step of an identifier path: map key lookup, then
    /// getter/field lookup on a record, per §4.1's identifier resolution.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Object(map) => map.get(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) => Some(*f as i64),
            Self::Str(s) => s.parse().ok(),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Loose `==` comparison: numeric-string/numeric coercion, else
    /// same-typed equality, per §4.1.
    #[must_use]
    pub fn loose_eq(&self, other: &Value) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(_) | Value::Float(_), Value::Str(_))
            | (Value::Str(_), Value::Int(_) | Value::Float(_)) => {
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
                    _ => false,
                }
            }
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64 - b).abs() < f64::EPSILON
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, ""),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Object(_) => write!(f, "[object]"),
            Self::Date(d) => write!(f, "{d}"),
            Self::DateTime(d) => write!(f, "{d}"),
            Self::DateTimeUtc(d) => write!(f, "{}", d.to_rfc3339()),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Json(j) => write!(f, "{j}"),
        }
    }
}

macro_rules! impl_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v.into())
            }
        }
    };
}
impl_from!(&str, Str);
impl_from!(String, Str);
impl_from!(bool, Bool);
impl_from!(i64, Int);
impl_from!(i32, Int);
impl_from!(f64, Float);

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

/// A name → [`Value`] binding map, the root "parameter" a call is made with.
pub type ParamsMap = BTreeMap<String, Value>;

/// Resolves a dotted identifier path (`a.b.c`) against `bindings`, per
/// §4.1's identifier-resolution rule: the first segment is a binding-map
/// lookup, every subsequent segment walks `Value::get_field`, and any
/// missing step short-circuits to `Value::Null` rather than erroring. Used
/// by both `${...}`/`#{...}` text-marker resolution (§4.3) and the
/// expression evaluator's identifier primaries (§4.1).
#[must_use]
pub fn resolve_path(path: &str, bindings: &ParamsMap) -> Value {
    let mut parts = path.split('.');
    let Some(head) = parts.next() else {
        return Value::Null;
    };
    let Some(mut current) = bindings.get(head).cloned() else {
        return Value::Null;
    };
    for part in parts {
        current = current.get_field(part).cloned().unwrap_or(Value::Null);
    }
    current
}
