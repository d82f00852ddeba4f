//! Caching (§4.8): a deterministic `CacheKey` serialization discipline
//! shared by the per-session first-level cache and the pluggable
//! second-level cache.
//!
//! Grounded on the teacher's `dashmap`-backed registries (`driver.rs`) for
//! the default concurrent backend, and `threadsafe-lru` (already a teacher
//! dependency, used there for the AST cache) for the LRU eviction policy.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use threadsafe_lru::LruCache;

use crate::value::Value;

static OPAQUE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A deterministic, collision-resistant key for one (statement id, bound
/// parameters) pair (§4.8). Built by folding a [`Value`] into a canonical
/// string, then hashing it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds a key over all four components named in §3: statement id,
    /// parameters, and the row-bounds pair `(offset, limit)` a paginated
    /// query was run with. Two keys are equal iff their string forms are
    /// equal (§4.8).
    #[must_use]
    pub fn new(
        statement_id: &str,
        parameter: &Value,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Self {
        let mut repr = String::new();
        write!(repr, "{statement_id}:").ok();
        serialize_value(parameter, &mut repr);
        let _ = write!(repr, ":o={offset:?}:l={limit:?}");
        let hash = stable_hash(&repr);
        Self(format!("ogam:{hash:016x}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Folds a [`Value`] into `out` deterministically: primitives verbatim,
/// temporal values as an ISO-tagged record, maps with sorted keys, sequences
/// in order, and anything with no stable textual form (none in this crate's
/// closed `Value` enum today, but kept as an explicit arm per §4.8's note
/// that opaque records fall back to a process-unique id).
fn serialize_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "b:{b}");
        }
        Value::Int(i) => {
            let _ = write!(out, "i:{i}");
        }
        Value::Float(f) => {
            let _ = write!(out, "f:{f}");
        }
        Value::Str(s) => {
            let _ = write!(out, "s:{}:{s}", s.len());
        }
        Value::Array(items) => {
            out.push('[');
            for item in items {
                serialize_value(item, out);
                out.push(',');
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                let _ = write!(out, "{key}=");
                serialize_value(&map[key], out);
                out.push(',');
            }
            out.push('}');
        }
        Value::Date(d) => {
            let _ = write!(out, "date:{}", d.format("%Y-%m-%d"));
        }
        Value::DateTime(dt) => {
            let _ = write!(out, "datetime:{}", dt.format("%Y-%m-%dT%H:%M:%S%.6f"));
        }
        Value::DateTimeUtc(dt) => {
            let _ = write!(out, "datetimeutc:{}", dt.format("%Y-%m-%dT%H:%M:%S%.6fZ"));
        }
        Value::Uuid(u) => {
            let _ = write!(out, "uuid:{u}");
        }
        Value::Json(j) => {
            let _ = write!(out, "json:{j}");
        }
    }
}

/// Produces a process-unique opaque token, for the (currently unreachable)
/// case of a value with no stable textual form entering the cache-key
/// pipeline.
#[must_use]
pub fn next_opaque_id() -> u64 {
    OPAQUE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

fn stable_hash(input: &str) -> u64 {
    // FNV-1a: no collision-resistance claims, just determinism across runs,
    // which is all a cache key needs.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// No eviction: entries live until explicitly removed or the cache is
    /// cleared.
    None,
    /// Bounded-size LRU.
    Lru(usize),
    /// Bounded-size FIFO. `threadsafe-lru` gives us one bounded-container
    /// primitive, not a separate FIFO queue, so this aliases onto the same
    /// `Lru` backend (§9) — a size bound is honored, eviction order is not
    /// guaranteed to be strict arrival order.
    Fifo(usize),
    /// `Soft`/`Weak` from the teacher's vocabulary, aliased onto `Lru` (§9):
    /// neither reclaim-under-memory-pressure semantic is expressible
    /// without a VM's GC hooks, so both degrade to a plain LRU bound.
    Soft(usize),
    Weak(usize),
}

/// A pluggable cache backend (§4.8). The default implementation
/// ([`ConcurrentCache`]) is `DashMap`-backed for `EvictionPolicy::None` and
/// `threadsafe-lru`-backed otherwise.
pub trait CacheInterface: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Value>;
    fn put(&self, key: CacheKey, value: Value);
    fn has(&self, key: &CacheKey) -> bool;
    fn remove(&self, key: &CacheKey);
    fn clear(&self);
    fn count(&self) -> usize;
}

enum Backend {
    Unbounded(DashMap<CacheKey, Value>),
    Lru(LruCache<CacheKey, Value>),
}

/// The default second-level cache backend, and also what the first-level
/// (per-session) cache is built from. `read_only` deep-clones on `get` so
/// callers can never mutate a value shared with other sessions in place
/// (§4.8's readOnly semantics) — in this crate a [`Value`] clone is already
/// a deep clone, so the flag only documents intent.
pub struct ConcurrentCache {
    backend: Backend,
    pub read_only: bool,
}

impl ConcurrentCache {
    #[must_use]
    pub fn new(policy: EvictionPolicy, read_only: bool) -> Self {
        let backend = match policy {
            EvictionPolicy::None => Backend::Unbounded(DashMap::new()),
            EvictionPolicy::Lru(capacity)
            | EvictionPolicy::Fifo(capacity)
            | EvictionPolicy::Soft(capacity)
            | EvictionPolicy::Weak(capacity) => Backend::Lru(LruCache::new(capacity.max(1))),
        };
        Self { backend, read_only }
    }
}

impl CacheInterface for ConcurrentCache {
    fn get(&self, key: &CacheKey) -> Option<Value> {
        match &self.backend {
            Backend::Unbounded(map) => map.get(key).map(|entry| entry.value().clone()),
            Backend::Lru(lru) => lru.get(key),
        }
    }

    fn put(&self, key: CacheKey, value: Value) {
        match &self.backend {
            Backend::Unbounded(map) => {
                map.insert(key, value);
            }
            Backend::Lru(lru) => {
                lru.insert(key, value);
            }
        }
    }

    fn has(&self, key: &CacheKey) -> bool {
        match &self.backend {
            Backend::Unbounded(map) => map.contains_key(key),
            Backend::Lru(lru) => lru.get(key).is_some(),
        }
    }

    fn remove(&self, key: &CacheKey) {
        match &self.backend {
            Backend::Unbounded(map) => {
                map.remove(key);
            }
            Backend::Lru(lru) => {
                lru.remove(key);
            }
        }
    }

    fn clear(&self) {
        match &self.backend {
            Backend::Unbounded(map) => map.clear(),
            Backend::Lru(lru) => lru.clear(),
        }
    }

    fn count(&self) -> usize {
        match &self.backend {
            Backend::Unbounded(map) => map.len(),
            Backend::Lru(lru) => lru.len(),
        }
    }
}

/// The first-level (per-session) cache: always present, always unbounded,
/// cleared wholesale on commit/rollback/close (§4.8, §6).
pub struct FirstLevelCache {
    entries: BTreeMap<CacheKey, Value>,
}

impl FirstLevelCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn put(&mut self, key: CacheKey, value: Value) {
        self.entries.insert(key, value);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for FirstLevelCache {
    fn default() -> Self {
        Self::new()
    }
}

/// A named handle to a registered second-level cache, shared across
/// sessions (§4.8).
pub type SharedCache = Arc<dyn CacheInterface>;

/// Per-namespace second-level cache configuration (§4.8): the eviction
/// policy, the declared size bound, and the read-only flag that governs
/// whether `get` must deep-clone before handing a value back to a caller.
#[derive(Debug, Clone, Copy)]
pub struct SecondLevelCacheConfig {
    pub eviction: EvictionPolicy,
    pub read_only: bool,
    pub flush_interval: Option<std::time::Duration>,
}

impl Default for SecondLevelCacheConfig {
    fn default() -> Self {
        Self {
            eviction: EvictionPolicy::None,
            read_only: false,
            flush_interval: None,
        }
    }
}

/// A namespaced second-level cache: sanitizes backend-reserved characters out
/// of keys and prepends the namespace, per §4.8's `CacheInterface` adapter
/// contract.
pub struct NamespacedCache {
    namespace: String,
    inner: ConcurrentCache,
}

impl NamespacedCache {
    #[must_use]
    pub fn new(namespace: impl Into<String>, config: SecondLevelCacheConfig) -> Self {
        Self {
            namespace: namespace.into(),
            inner: ConcurrentCache::new(config.eviction, config.read_only),
        }
    }

    fn namespaced(&self, key: &CacheKey) -> CacheKey {
        // `:` is already the field separator `CacheKey`'s own serialization
        // uses; replacing it out of the namespace keeps a caller-supplied
        // namespace from colliding with that structure.
        let sanitized = self.namespace.replace([':', '/'], "_");
        CacheKey(format!("{sanitized}::{}", key.0))
    }
}

impl CacheInterface for NamespacedCache {
    fn get(&self, key: &CacheKey) -> Option<Value> {
        self.inner.get(&self.namespaced(key))
    }

    fn put(&self, key: CacheKey, value: Value) {
        self.inner.put(self.namespaced(&key), value);
    }

    fn has(&self, key: &CacheKey) -> bool {
        self.inner.has(&self.namespaced(key))
    }

    fn remove(&self, key: &CacheKey) {
        self.inner.remove(&self.namespaced(key));
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn count(&self) -> usize {
        self.inner.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_deterministic_and_order_independent_for_maps() {
        let mut a = BTreeMap::new();
        a.insert("x".to_string(), Value::Int(1));
        a.insert("y".to_string(), Value::Int(2));
        let k1 = CacheKey::new("stmt", &Value::Object(a.clone()), None, None);
        let k2 = CacheKey::new("stmt", &Value::Object(a), None, None);
        assert_eq!(k1, k2);
    }

    #[test]
    fn cache_key_differs_on_different_parameters() {
        let k1 = CacheKey::new("stmt", &Value::Int(1), None, None);
        let k2 = CacheKey::new("stmt", &Value::Int(2), None, None);
        assert_ne!(k1, k2);
    }

    #[test]
    fn cache_key_differs_on_different_bounds() {
        let k1 = CacheKey::new("stmt", &Value::Int(1), Some(0), Some(10));
        let k2 = CacheKey::new("stmt", &Value::Int(1), Some(10), Some(10));
        assert_ne!(k1, k2);
    }

    #[test]
    fn concurrent_cache_round_trips_and_evicts_under_lru() {
        let cache = ConcurrentCache::new(EvictionPolicy::Lru(1), false);
        let k1 = CacheKey::new("s", &Value::Int(1), None, None);
        let k2 = CacheKey::new("s", &Value::Int(2), None, None);
        cache.put(k1.clone(), Value::Str("one".to_string()));
        cache.put(k2.clone(), Value::Str("two".to_string()));
        assert!(cache.get(&k2).is_some());
        assert!(cache.get(&k1).is_none());
    }

    #[test]
    fn first_level_cache_clears_on_demand() {
        let mut cache = FirstLevelCache::new();
        let key = CacheKey::new("s", &Value::Int(1), None, None);
        cache.put(key.clone(), Value::Bool(true));
        assert!(cache.get(&key).is_some());
        cache.clear();
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn namespaced_cache_isolates_identical_keys_by_namespace() {
        let orders = NamespacedCache::new("orders", SecondLevelCacheConfig::default());
        let users = NamespacedCache::new("users", SecondLevelCacheConfig::default());
        let key = CacheKey::new("findById", &Value::Int(1), None, None);
        orders.put(key.clone(), Value::Str("order-1".to_string()));
        assert!(orders.has(&key));
        assert!(!users.has(&key));
        assert_eq!(orders.count(), 1);
        orders.clear();
        assert!(!orders.has(&key));
    }
}
