//! Shared scope -> origin map guarding scope uniqueness across workers.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use parking_lot::Mutex;

use crate::manifest::Manifest;

/// Outcome of trying to claim a scope for an origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The scope was already claimed. The first registrant keeps it.
    Duplicate {
        /// Origin that claimed the scope first.
        existing: String,
    },
    /// The scope is now owned by the requesting origin.
    Installed,
}

/// Scope names claimed during a run, each mapped to the origin that produced it.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    /// Scope name to origin identifier.
    scopes: Mutex<HashMap<String, String>>,
}

impl ScopeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        return Self::default();
    }

    /// Claim `scope` for `origin`. Check and insert happen under one lock,
    /// so of two concurrent claims exactly one is `Installed`.
    pub fn register(&self, scope: &str, origin: &str) -> Registration {
        let mut scopes = self.scopes.lock();
        return match scopes.entry(scope.to_string()) {
            Entry::Occupied(existing) => Registration::Duplicate {
                existing: existing.get().clone(),
            },
            Entry::Vacant(slot) => {
                slot.insert(origin.to_string());
                Registration::Installed
            },
        };
    }

    /// Drop the claims `origin` holds on `scopes`. Scopes owned by another
    /// origin are left alone.
    pub fn release(&self, scopes: &[String], origin: &str) {
        let mut claimed = self.scopes.lock();
        for scope in scopes {
            if claimed.get(scope).is_some_and(|owner| return owner == origin) {
                claimed.remove(scope);
            }
        }
        return;
    }

    /// Pre-claim every scope already listed in a manifest, except those of
    /// `except_origin`, which is about to be re-fetched.
    pub fn seeded(manifest: &Manifest, except_origin: &str) -> Self {
        let scopes = manifest
            .sources
            .iter()
            .filter(|(origin, _)| return origin.as_str() != except_origin)
            .flat_map(|(origin, scopes)| {
                return scopes.iter().map(move |scope| return (scope.clone(), origin.clone()));
            })
            .collect();
        return Self { scopes: Mutex::new(scopes) };
    }

    /// Number of registered scopes.
    pub fn scope_count(&self) -> usize {
        return self.scopes.lock().len();
    }

    /// Copy of the current scope -> origin map.
    pub fn snapshot(&self) -> HashMap<String, String> {
        return self.scopes.lock().clone();
    }
}
