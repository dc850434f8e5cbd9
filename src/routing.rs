//! Routing Table (C5): maps public tool names to backend targets.

use dashmap::DashMap;

use crate::error::{OptimizerError, OptimizerResult};

/// One public-name → backend-target mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingEntry {
    pub public_name: String,
    pub backend_id: String,
    /// Empty means "public name == original backend-internal name".
    pub original_capability_name: String,
    pub workload_name: String,
    pub base_url: String,
    pub transport_type: String,
}

impl RoutingEntry {
    pub fn new(public_name: impl Into<String>, backend_id: impl Into<String>) -> Self {
        Self {
            public_name: public_name.into(),
            backend_id: backend_id.into(),
            original_capability_name: String::new(),
            workload_name: String::new(),
            base_url: String::new(),
            transport_type: String::new(),
        }
    }

    #[must_use]
    pub fn with_rename(mut self, original_capability_name: impl Into<String>) -> Self {
        self.original_capability_name = original_capability_name.into();
        self
    }

    /// The name the backend actually knows this tool by.
    pub fn internal_name(&self) -> &str {
        if self.original_capability_name.is_empty() {
            &self.public_name
        } else {
            &self.original_capability_name
        }
    }
}

/// Resolved backend target for a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub backend_id: String,
    pub internal_name: String,
}

/// Thread-safe `public_name -> RoutingEntry` table. Effectively read-mostly
/// after the ingestion sweep populates it; any bulk replacement happens via
/// [`RoutingTable::clear`] + re-insert, never a partial in-place rewrite.
#[derive(Default)]
pub struct RoutingTable {
    by_public_name: DashMap<String, RoutingEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a routing entry, resolving a name collision by renaming the
    /// newcomer: if `public_name` is already taken by a different backend,
    /// the entry is registered under `"<backend_id>.<public_name>"` instead,
    /// retaining `original_capability_name` so the internal name is still
    /// recoverable.
    pub fn insert(&self, mut entry: RoutingEntry) -> String {
        if let Some(existing) = self.by_public_name.get(&entry.public_name) {
            if existing.backend_id != entry.backend_id {
                let renamed = format!("{}.{}", entry.backend_id, entry.public_name);
                if entry.original_capability_name.is_empty() {
                    entry.original_capability_name = entry.public_name.clone();
                }
                entry.public_name = renamed.clone();
                self.by_public_name.insert(renamed.clone(), entry);
                return renamed;
            }
        }
        let public_name = entry.public_name.clone();
        self.by_public_name.insert(public_name.clone(), entry);
        public_name
    }

    pub fn resolve(&self, public_name: &str) -> OptimizerResult<ResolvedRoute> {
        self.by_public_name
            .get(public_name)
            .map(|entry| ResolvedRoute {
                backend_id: entry.backend_id.clone(),
                internal_name: entry.internal_name().to_string(),
            })
            .ok_or_else(|| OptimizerError::RouteNotFound(public_name.to_string()))
    }

    /// Reverse lookup: find the public name a backend registered an
    /// internal name under, if any.
    pub fn lookup_by_backend(&self, backend_id: &str, original_name: &str) -> Option<String> {
        self.by_public_name.iter().find_map(|entry| {
            let route = entry.value();
            if route.backend_id == backend_id && route.internal_name() == original_name {
                Some(route.public_name.clone())
            } else {
                None
            }
        })
    }

    pub fn remove_backend(&self, backend_id: &str) {
        self.by_public_name
            .retain(|_, entry| entry.backend_id != backend_id);
    }

    pub fn len(&self) -> usize {
        self.by_public_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_public_name.is_empty()
    }
}
