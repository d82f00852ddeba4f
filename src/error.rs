//! Error types for `sqlmap`.
//!
//! Mirrors the error taxonomy a mapper runtime needs to expose to callers:
//! one kind per failure domain (§7 of the design), each carrying enough
//! context to reproduce the failure, never just a bare string.

use std::fmt;

/// Coarse classification of an [`Error`], useful for callers that want to
/// branch on failure domain without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Binding,
    Parsing,
    ExpressionSecurity,
    Type,
    Sql,
    Executor,
    Transaction,
}

/// The error type for all `sqlmap` operations.
#[derive(Debug)]
pub enum Error {
    /// Invalid or missing declaration (unknown type alias, malformed settings, ...).
    Configuration { option: String, message: String },

    /// Unknown statement id, unknown result map, required parameter missing, invalid map key.
    Binding { message: String },

    /// XML/expression syntax error.
    Parsing { message: String, input: Option<String> },

    /// Expression sandbox rejected the input before evaluation.
    ExpressionSecurity { expr: String, reason: String },

    /// Unsupported type, conversion failure, invalid enum value.
    Type { message: String },

    /// Driver failure, wrapping SQLSTATE + SQL + bound parameters where available.
    Sql {
        message: String,
        sql: Option<String>,
        params: Option<String>,
        sqlstate: Option<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query/update/transaction/session-closed failures raised by the executor.
    Executor { message: String },

    /// Double-close, unknown savepoint, and other transaction usage errors.
    Transaction { message: String },
}

impl Error {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Binding { .. } => ErrorKind::Binding,
            Self::Parsing { .. } => ErrorKind::Parsing,
            Self::ExpressionSecurity { .. } => ErrorKind::ExpressionSecurity,
            Self::Type { .. } => ErrorKind::Type,
            Self::Sql { .. } => ErrorKind::Sql,
            Self::Executor { .. } => ErrorKind::Executor,
            Self::Transaction { .. } => ErrorKind::Transaction,
        }
    }

    pub fn configuration(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            option: option.into(),
            message: message.into(),
        }
    }

    pub fn binding(message: impl Into<String>) -> Self {
        Self::Binding {
            message: message.into(),
        }
    }

    pub fn parsing(message: impl Into<String>) -> Self {
        Self::Parsing {
            message: message.into(),
            input: None,
        }
    }

    pub fn parsing_with_input(message: impl Into<String>, input: impl Into<String>) -> Self {
        Self::Parsing {
            message: message.into(),
            input: Some(input.into()),
        }
    }

    pub fn expression_security(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExpressionSecurity {
            expr: expr.into(),
            reason: reason.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
        }
    }

    pub fn sql(message: impl Into<String>) -> Self {
        Self::Sql {
            message: message.into(),
            sql: None,
            params: None,
            sqlstate: None,
            source: None,
        }
    }

    pub fn sql_with_context(
        message: impl Into<String>,
        sql: impl Into<String>,
        params: impl Into<String>,
    ) -> Self {
        Self::Sql {
            message: message.into(),
            sql: Some(sql.into()),
            params: Some(params.into()),
            sqlstate: None,
            source: None,
        }
    }

    pub fn executor(message: impl Into<String>) -> Self {
        Self::Executor {
            message: message.into(),
        }
    }

    pub fn executor_closed() -> Self {
        Self::Executor {
            message: "executor is closed".to_string(),
        }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    pub fn unknown_savepoint(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::Transaction {
            message: format!("unknown savepoint `{name}`"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { option, message } => {
                write!(f, "configuration error for `{option}`: {message}")
            }
            Self::Binding { message } => write!(f, "binding error: {message}"),
            Self::Parsing { message, input } => {
                write!(f, "parse error: {message}")?;
                if let Some(input) = input {
                    write!(f, "\ninput: {input}")?;
                }
                Ok(())
            }
            Self::ExpressionSecurity { expr, reason } => {
                write!(f, "expression `{expr}` rejected by sandbox: {reason}")
            }
            Self::Type { message } => write!(f, "type error: {message}"),
            Self::Sql {
                message,
                sql,
                params,
                sqlstate,
                ..
            } => {
                write!(f, "sql error: {message}")?;
                if let Some(state) = sqlstate {
                    write!(f, " (SQLSTATE {state})")?;
                }
                if let Some(sql) = sql {
                    write!(f, "\nsql: {sql}")?;
                }
                if let Some(params) = params {
                    write!(f, "\nparams: {params}")?;
                }
                Ok(())
            }
            Self::Executor { message } => write!(f, "executor error: {message}"),
            Self::Transaction { message } => write!(f, "transaction error: {message}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sql { source, .. } => source.as_ref().map(|e| e.as_ref() as _),
            _ => None,
        }
    }
}

impl From<sqlx_oldapi::Error> for Error {
    fn from(err: sqlx_oldapi::Error) -> Self {
        let sqlstate = err
            .as_database_error()
            .and_then(|e| e.code())
            .map(|c| c.into_owned());
        Self::Sql {
            message: err.to_string(),
            sql: None,
            params: None,
            sqlstate,
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Type {
            message: format!("JSON error: {err}"),
        }
    }
}

impl From<std::fmt::Error> for Error {
    fn from(err: std::fmt::Error) -> Self {
        Self::Type {
            message: format!("format error: {err}"),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Configuration {
            option: "url".to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type alias used throughout `sqlmap`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = Error::sql_with_context("syntax error", "SELECT *", "{}");
        let s = err.to_string();
        assert!(s.contains("syntax error"));
        assert!(s.contains("SELECT *"));
    }

    #[test]
    fn kinds_map_correctly() {
        assert_eq!(Error::executor_closed().kind(), ErrorKind::Executor);
        assert_eq!(
            Error::unknown_savepoint("sp1").kind(),
            ErrorKind::Transaction
        );
        assert_eq!(
            Error::expression_security("count(x)", "function call").kind(),
            ErrorKind::ExpressionSecurity
        );
    }
}
