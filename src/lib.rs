//! `sqlmap` — a SQL-mapper runtime: dynamic SQL composition, a sandboxed
//! expression evaluator, session/executor/transaction lifecycle, type
//! handlers, row hydration, and a first/second-level cache.
//!
//! The caller writes the SQL; this crate does not generate SQL from an
//! object model. A statement-declaration surface (XML/attribute parsers,
//! mapper-interface proxies, configuration-file loading) is expected to sit
//! on top of [`config::Configuration`] and is out of this crate's scope.

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod cache;
pub mod config;
pub mod datasource;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod expr;
pub mod hydrate;
pub mod session;
pub mod sql;
pub mod transaction;
pub mod typehandler;
pub mod value;

pub use config::{Configuration, Environment, MappedStatement, Settings, StatementKind};
pub use error::{Error, ErrorKind, Result};
pub use session::{Session, SessionFactory};
pub use value::Value;
