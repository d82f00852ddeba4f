//! Dynamic SQL composition (§4.2/§4.3): the node tree, its render-time
//! scratch space, the `${}`/`#{}` text scanner, and the compiled
//! `SqlSource`s built from it.

pub mod context;
pub mod markers;
pub mod node;
pub mod source;

pub use context::DynamicContext;
pub use node::{ParamMode, SqlNode, When};
pub use source::{BoundSql, DynamicSqlSource, ParameterMapping, SqlSource, StaticSqlSource};
