//! The `DynamicContext` (§4.2): per-call scratch space threaded through a
//! `SqlNode` tree walk. Grounded on the teacher's `_append_ast`/`Ast::render`
//! walk, which threads an accumulator string, a bindings map, and a unique
//! counter through recursive calls the same way.

use crate::sql::source::ParameterMapping;
use crate::value::{ParamsMap, Value};

/// Mutable state threaded through one `SqlNode::render` call.
pub struct DynamicContext {
    /// Bindings visible to `${...}` substitution, `#{...}` placeholders, and
    /// nested `If`/`Choose`/`ForEach` test expressions. Initialized from the
    /// call's root parameter: a map copies its entries in directly; a
    /// record binds itself under `_parameter` and also exposes its own
    /// fields at the top level.
    pub bindings: ParamsMap,
    sql: String,
    unique_counter: u64,
    mappings: Vec<ParameterMapping>,
    /// Redirects a placeholder/identifier name to a different binding key
    /// without rewriting the template text. `ForEach` uses this to give each
    /// iteration's `#{item}` its own binding key while the template keeps
    /// writing plain `#{item}`.
    name_remap: std::collections::BTreeMap<String, String>,
}

impl DynamicContext {
    #[must_use]
    pub fn new(root: ParamsMap) -> Self {
        Self {
            bindings: root,
            sql: String::new(),
            unique_counter: 0,
            mappings: Vec::new(),
            name_remap: std::collections::BTreeMap::new(),
        }
    }

    /// Builds a context from an arbitrary root parameter value, per §4.2's
    /// flattening rule.
    #[must_use]
    pub fn from_value(root: Value) -> Self {
        let mut bindings = match &root {
            Value::Object(map) => map.clone(),
            _ => ParamsMap::new(),
        };
        bindings.insert("_parameter".to_string(), root);
        Self::new(bindings)
    }

    pub fn push_sql(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    /// Emits a bound-parameter marker (driver-specific quoting happens in
    /// `source.rs`'s finalization step) and records its mapping.
    pub fn push_placeholder(&mut self, marker: &str, mapping: ParameterMapping) {
        self.sql.push_str(marker);
        self.mappings.push(mapping);
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn mappings(&self) -> &[ParameterMapping] {
        &self.mappings
    }

    pub fn into_parts(self) -> (String, Vec<ParameterMapping>) {
        (self.sql, self.mappings)
    }

    pub fn into_sql(self) -> String {
        self.sql
    }

    /// Monotonically increasing id used to name synthetic per-iteration
    /// bindings created by `ForEach` (§4.2's uniqueness requirement).
    pub fn next_unique(&mut self) -> u64 {
        self.unique_counter += 1;
        self.unique_counter
    }

    /// A scoped child context for `Trim`: bindings are inherited by value,
    /// SQL output starts empty so the trim/prefix/suffix transform can be
    /// applied before splicing into the parent.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            bindings: self.bindings.clone(),
            sql: String::new(),
            unique_counter: self.unique_counter,
            mappings: Vec::new(),
            name_remap: self.name_remap.clone(),
        }
    }

    /// Registers a remap active for the rest of this context's lifetime
    /// (`ForEach` installs one per iteration on a child context).
    pub fn remap(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.name_remap.insert(from.into(), to.into());
    }

    /// Resolves a placeholder/identifier name through any active remap.
    /// `name` may be a dotted path (`a.b.c`, §4.3); only its head segment is
    /// ever remapped (`ForEach` installs remaps keyed by the bare item/index
    /// name), with the rest of the path carried through unchanged.
    #[must_use]
    pub fn resolve_name(&self, name: &str) -> String {
        match name.split_once('.') {
            Some((head, rest)) => {
                let resolved_head = self.name_remap.get(head).map_or(head, String::as_str);
                format!("{resolved_head}.{rest}")
            }
            None => self
                .name_remap
                .get(name)
                .map_or(name, String::as_str)
                .to_string(),
        }
    }

    /// Folds a rendered child's counter and parameter mappings back into the
    /// parent after its SQL has been spliced in (`Trim`/`ForEach`).
    pub fn absorb(&mut self, mut child: DynamicContext) {
        self.unique_counter = self.unique_counter.max(child.unique_counter);
        self.mappings.append(&mut child.mappings);
    }

    /// Appends mappings whose corresponding markers have already been
    /// spliced into this context's SQL by other means (`Trim`'s rewritten
    /// body text).
    pub fn append_mappings(&mut self, mut mappings: Vec<ParameterMapping>) {
        self.mappings.append(&mut mappings);
    }

    pub fn absorb_counter(&mut self, child: &DynamicContext) {
        self.unique_counter = self.unique_counter.max(child.unique_counter);
    }

    pub fn absorb_counter_value(&mut self, value: u64) {
        self.unique_counter = self.unique_counter.max(value);
    }

    #[must_use]
    pub fn counter(&self) -> u64 {
        self.unique_counter
    }
}
