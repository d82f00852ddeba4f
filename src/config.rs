//! Configuration (§2/§7): the bootstrap-then-frozen object graph every
//! session is built from — mapped statements, result maps, and runtime
//! settings.
//!
//! Grounded on the teacher's `options.rs` (a `Settings` struct populated once
//! at driver-construction time, then treated as read-only), generalized from
//! per-connection dialect settings to the full mapper configuration.

use std::collections::BTreeMap;
use std::sync::Once;

use crate::cache::{SecondLevelCacheConfig, SharedCache};
use crate::hydrate::ResultMap;
use crate::sql::SqlSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorType {
    Simple,
    Reuse,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Callable,
}

impl StatementKind {
    /// Default `flushCache` policy (§4.6): writes flush the first-level
    /// cache before executing, reads don't.
    #[must_use]
    pub fn default_flush_cache(self) -> bool {
        !matches!(self, StatementKind::Select)
    }
}

/// Runtime behavior knobs (§7's Settings). Populated once during
/// configuration, then read by every session/executor it's handed to.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache_enabled: bool,
    /// The teacher's driver always resolves results eagerly; this crate
    /// keeps the `Lazy` mode in the type system (§9) but treats it as eager
    /// today, since there's no PHP-side lazy-proxy mechanism to defer to.
    pub lazy_loading_enabled: bool,
    pub map_underscore_to_camel_case: bool,
    pub default_executor_type: ExecutorType,
    pub default_statement_timeout: Option<std::time::Duration>,
    pub use_generated_keys: bool,
    pub debug_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            lazy_loading_enabled: false,
            map_underscore_to_camel_case: false,
            default_executor_type: ExecutorType::Simple,
            default_statement_timeout: None,
            use_generated_keys: false,
            debug_mode: false,
        }
    }
}

/// One mapped statement: the compiled SQL source plus the metadata needed
/// to execute and hydrate it.
pub struct MappedStatement {
    /// `namespace.id` — globally unique within a `Configuration` (§3).
    pub id: String,
    pub kind: StatementKind,
    pub sql_source: Box<dyn SqlSource>,
    pub result_map: Option<String>,
    /// Fallback shape hint when no `result_map` is set. §9's Open Question:
    /// `result_map` wins whenever both are present.
    pub result_type_name: Option<String>,
    pub use_generated_keys: bool,
    pub key_property: Option<String>,
    pub key_column: Option<String>,
    pub flush_cache: bool,
    /// Gates the *second*-level cache (§4.6); the first-level cache is
    /// always consulted when `Settings::cache_enabled` is set.
    pub use_cache: bool,
    pub timeout: Option<std::time::Duration>,
    pub fetch_size: Option<u32>,
    /// Hint for which `Executor` variant a statement prefers; `None` defers
    /// to `Settings::default_executor_type`.
    pub executor_type: Option<ExecutorType>,
    /// Free-text documentation for the statement, carried through from the
    /// mapper source. Not used by the runtime; useful for tooling that
    /// introspects a `Configuration` (§3's supplemental field).
    pub description: Option<String>,
}

impl MappedStatement {
    /// Builds a statement with `kind`'s default `flush_cache` policy and
    /// every other optional field unset.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: StatementKind, sql_source: Box<dyn SqlSource>) -> Self {
        Self {
            id: id.into(),
            flush_cache: kind.default_flush_cache(),
            kind,
            sql_source,
            result_map: None,
            result_type_name: None,
            use_generated_keys: false,
            key_property: None,
            key_column: None,
            use_cache: true,
            timeout: None,
            fetch_size: None,
            executor_type: None,
            description: None,
        }
    }

    /// §9's recorded precedence decision: an explicit `result_map` wins over
    /// any inferred `resultType`-style shape, since this crate has no
    /// runtime class metadata to infer a shape from in the first place.
    #[must_use]
    pub fn effective_result_map<'a>(&'a self, default: &'a str) -> &'a str {
        self.result_map.as_deref().unwrap_or(default)
    }
}

/// One named environment (§3): a data source plus the transaction style
/// built around it, bound fully in `datasource.rs`/`transaction.rs`.
pub struct Environment {
    pub id: String,
    pub data_source: std::sync::Arc<crate::datasource::DataSource>,
    pub dialect: crate::dialect::Dialect,
    /// When set, a `Session` opened against this environment starts a
    /// [`crate::transaction::TransactionMode::Managed`] transaction;
    /// otherwise it starts JDBC-style with `autoCommit=true` (§4.7).
    pub default_transactional: bool,
}

impl Environment {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        data_source: std::sync::Arc<crate::datasource::DataSource>,
        dialect: crate::dialect::Dialect,
        default_transactional: bool,
    ) -> Self {
        Self {
            id: id.into(),
            data_source,
            dialect,
            default_transactional,
        }
    }
}

static FREEZE_GUARD: Once = Once::new();

/// Bootstrap-then-frozen configuration (§2/§9): built up via `add_*` calls
/// during startup, then `freeze`d once so no mapped statement or result map
/// can change shape underneath an in-flight session.
pub struct Configuration {
    statements: BTreeMap<String, MappedStatement>,
    result_maps: BTreeMap<String, ResultMap>,
    /// Named environments (§3); `default_environment` selects which one a
    /// freshly-built `SessionFactory` binds to absent an explicit choice.
    environments: BTreeMap<String, Environment>,
    pub default_environment: Option<String>,
    /// Short names usable in place of a fully-qualified target type in
    /// `result_type_name`/`phpType` attributes (§6's configuration surface).
    type_aliases: BTreeMap<String, String>,
    pub settings: Settings,
    pub type_handlers: crate::typehandler::TypeHandlerRegistry,
    /// Per-namespace second-level caches (§4.8), shared across every
    /// `Session`/`Executor` built from this `Configuration` — unlike the
    /// first-level cache, which is private to one executor's lifetime.
    second_level_caches: BTreeMap<String, SharedCache>,
    frozen: bool,
}

impl Configuration {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            statements: BTreeMap::new(),
            result_maps: BTreeMap::new(),
            environments: BTreeMap::new(),
            default_environment: None,
            type_aliases: BTreeMap::new(),
            settings,
            type_handlers: crate::typehandler::TypeHandlerRegistry::with_defaults(),
            second_level_caches: BTreeMap::new(),
            frozen: false,
        }
    }

    /// Registers a second-level cache for `namespace` (§4.8). A statement
    /// whose namespace has no registered cache here only ever uses the
    /// first-level cache.
    ///
    /// # Panics
    /// Panics if called after [`Configuration::freeze`].
    pub fn add_second_level_cache(&mut self, namespace: impl Into<String>, config: SecondLevelCacheConfig) {
        assert!(!self.frozen, "cannot add a second-level cache to a frozen Configuration");
        let namespace = namespace.into();
        let cache: SharedCache = std::sync::Arc::new(crate::cache::NamespacedCache::new(namespace.clone(), config));
        self.second_level_caches.insert(namespace, cache);
    }

    /// The second-level cache registered for `namespace`, if any.
    #[must_use]
    pub fn second_level_cache(&self, namespace: &str) -> Option<SharedCache> {
        self.second_level_caches.get(namespace).cloned()
    }

    /// # Panics
    /// Panics if called after [`Configuration::freeze`]. Adding statements
    /// is a bootstrap-time-only operation by design (§9).
    pub fn add_statement(&mut self, statement: MappedStatement) {
        assert!(!self.frozen, "cannot add a statement to a frozen Configuration");
        self.statements.insert(statement.id.clone(), statement);
    }

    /// # Panics
    /// Panics if called after [`Configuration::freeze`].
    pub fn add_result_map(&mut self, result_map: ResultMap) {
        assert!(!self.frozen, "cannot add a ResultMap to a frozen Configuration");
        self.result_maps.insert(result_map.id.clone(), result_map);
    }

    /// # Panics
    /// Panics if called after [`Configuration::freeze`].
    pub fn add_environment(&mut self, environment: Environment) {
        assert!(!self.frozen, "cannot add an Environment to a frozen Configuration");
        if self.default_environment.is_none() {
            self.default_environment = Some(environment.id.clone());
        }
        self.environments.insert(environment.id.clone(), environment);
    }

    /// # Panics
    /// Panics if called after [`Configuration::freeze`].
    pub fn add_type_alias(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        assert!(!self.frozen, "cannot add a type alias to a frozen Configuration");
        self.type_aliases.insert(alias.into(), target.into());
    }

    #[must_use]
    pub fn resolve_type_alias<'a>(&'a self, name: &'a str) -> &'a str {
        self.type_aliases.get(name).map_or(name, String::as_str)
    }

    #[must_use]
    pub fn environment(&self, id: &str) -> Option<&Environment> {
        self.environments.get(id)
    }

    #[must_use]
    pub fn environments(&self) -> &BTreeMap<String, Environment> {
        &self.environments
    }

    /// Marks this configuration read-only. Idempotent: calling it twice on
    /// the same instance is harmless, mirroring the teacher's `Once`-guarded
    /// one-time registration pattern (`driver.rs`), generalized from a
    /// process-global guard to a per-instance flag since this crate has no
    /// global driver registry to protect.
    pub fn freeze(&mut self) {
        FREEZE_GUARD.call_once(|| {
            log::debug!("configuration frozen");
        });
        self.frozen = true;
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[must_use]
    pub fn statement(&self, id: &str) -> Option<&MappedStatement> {
        self.statements.get(id)
    }

    #[must_use]
    pub fn result_map(&self, id: &str) -> Option<&ResultMap> {
        self.result_maps.get(id)
    }

    #[must_use]
    pub fn result_maps(&self) -> &BTreeMap<String, ResultMap> {
        &self.result_maps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{SqlNode, StaticSqlSource};

    fn statement(id: &str) -> MappedStatement {
        MappedStatement {
            id: id.to_string(),
            kind: StatementKind::Select,
            sql_source: Box::new(StaticSqlSource::new(SqlNode::Text("SELECT 1".to_string()))),
            result_map: None,
            result_type_name: None,
            use_generated_keys: false,
            key_property: None,
            key_column: None,
            flush_cache: false,
            use_cache: true,
            timeout: None,
            fetch_size: None,
            executor_type: None,
            description: None,
        }
    }

    #[test]
    fn effective_result_map_prefers_explicit_over_default() {
        let mut stmt = statement("s1");
        stmt.result_map = Some("explicit".to_string());
        assert_eq!(stmt.effective_result_map("inferred"), "explicit");

        let stmt2 = statement("s2");
        assert_eq!(stmt2.effective_result_map("inferred"), "inferred");
    }

    #[test]
    #[should_panic(expected = "frozen")]
    fn adding_statement_after_freeze_panics() {
        let mut config = Configuration::new(Settings::default());
        config.freeze();
        config.add_statement(statement("late"));
    }

    #[test]
    fn second_level_cache_is_registered_per_namespace() {
        let mut config = Configuration::new(Settings::default());
        assert!(config.second_level_cache("orders").is_none());
        config.add_second_level_cache(
            "orders",
            crate::cache::SecondLevelCacheConfig::default(),
        );
        assert!(config.second_level_cache("orders").is_some());
        assert!(config.second_level_cache("users").is_none());
    }

    #[test]
    #[should_panic(expected = "frozen")]
    fn adding_second_level_cache_after_freeze_panics() {
        let mut config = Configuration::new(Settings::default());
        config.freeze();
        config.add_second_level_cache("orders", crate::cache::SecondLevelCacheConfig::default());
    }
}
