//! Session-scoped credential cache.
//!
//! Entries live in memory only and are keyed by registry host, so every
//! reference to the same host (any repository, tag, or digest) shares one
//! entry. Nothing is ever persisted.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::credential::Credential;
use crate::reference::RegistryHost;

/// In-memory credential cache shared by clones.
#[derive(Debug, Clone, Default)]
pub struct CredentialCache {
    entries: Arc<RwLock<HashMap<RegistryHost, Credential>>>,
}

impl CredentialCache {
    /// Creates an empty cache.
    ///
    /// # Examples
    ///
    /// ```
    /// use attest_registry::CredentialCache;
    ///
    /// let cache = CredentialCache::new();
    /// assert!(cache.is_empty());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached credential for a host.
    #[must_use]
    pub fn get(&self, host: &RegistryHost) -> Option<Credential> {
        self.entries.read().get(host).cloned()
    }

    /// Caches a credential for a host, replacing any previous entry.
    pub fn insert(&self, host: RegistryHost, credential: Credential) {
        self.entries.write().insert(host, credential);
    }

    /// Removes the entry for a host.
    pub fn remove(&self, host: &RegistryHost) -> Option<Credential> {
        self.entries.write().remove(host)
    }

    /// Returns the number of cached hosts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
