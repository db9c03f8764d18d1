//! Credential resolution: explicit input, then session cache, then store.

use std::sync::Arc;

use crate::cache::CredentialCache;
use crate::credential::Credential;
use crate::error::StoreError;
use crate::reference::RegistryHost;
use crate::store::CredentialStore;

/// Resolves one credential per registry host.
///
/// Precedence:
///
/// 1. explicit username and password → [`Credential::Basic`]
/// 2. explicit password alone → [`Credential::RefreshToken`]
/// 3. cached result for the host
/// 4. the session's store; a missing entry resolves to [`Credential::Empty`]
///
/// Explicit input bypasses both the cache and the store. Store results,
/// including `Empty`, are cached before they are returned.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
    cache: CredentialCache,
}

impl CredentialResolver {
    /// Creates a resolver over the session's store and cache.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, cache: CredentialCache) -> Self {
        Self { store, cache }
    }

    /// Resolves the credential for a host.
    ///
    /// Empty strings count as absent.
    ///
    /// # Errors
    ///
    /// Returns the store's error for anything other than a missing entry.
    /// Nothing is cached in that case.
    pub fn resolve(
        &self,
        host: &RegistryHost,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Credential, StoreError> {
        let username = username.filter(|u| !u.is_empty());
        let password = password.filter(|p| !p.is_empty());

        match (username, password) {
            (Some(username), Some(password)) => {
                return Ok(Credential::basic(username, password));
            }
            (None, Some(token)) => return Ok(Credential::refresh_token(token)),
            (Some(_), None) => {
                tracing::debug!(%host, "Username given without password, ignoring it");
            }
            (None, None) => {}
        }

        if let Some(credential) = self.cache.get(host) {
            tracing::trace!(%host, kind = credential.kind(), "Credential cache hit");
            return Ok(credential);
        }

        let credential = match self.store.get(host) {
            Ok(credential) => credential,
            Err(e) if e.is_not_found() => Credential::Empty,
            Err(e) => return Err(e),
        };

        tracing::debug!(
            %host,
            kind = credential.kind(),
            store = %self.store.descriptor().kind,
            "Resolved credential"
        );
        self.cache.insert(host.clone(), credential.clone());
        Ok(credential)
    }

    /// Returns the session's store.
    #[must_use]
    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    /// Returns the session cache.
    #[must_use]
    pub const fn cache(&self) -> &CredentialCache {
        &self.cache
    }
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("store", &self.store.descriptor())
            .field("cached_hosts", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CredentialStoreDescriptor, StoreKind};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryStore {
        entries: Mutex<HashMap<RegistryHost, Credential>>,
        lookups: AtomicUsize,
        fail: bool,
    }

    impl CredentialStore for MemoryStore {
        fn get(&self, host: &RegistryHost) -> Result<Credential, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::unavailable("memory", "permission denied"));
            }
            self.entries
                .lock()
                .get(host)
                .cloned()
                .ok_or_else(|| StoreError::not_found(host.as_str()))
        }

        fn put(&self, host: &RegistryHost, credential: &Credential) -> Result<(), StoreError> {
            self.entries.lock().insert(host.clone(), credential.clone());
            Ok(())
        }

        fn delete(&self, host: &RegistryHost) -> Result<(), StoreError> {
            self.entries
                .lock()
                .remove(host)
                .map(|_| ())
                .ok_or_else(|| StoreError::not_found(host.as_str()))
        }

        fn is_configured(&self) -> bool {
            true
        }

        fn descriptor(&self) -> CredentialStoreDescriptor {
            CredentialStoreDescriptor {
                kind: StoreKind::FileBacked,
                location: "memory".into(),
                allow_plaintext_write: true,
            }
        }
    }

    fn host(s: &str) -> RegistryHost {
        RegistryHost::parse(s).unwrap()
    }

    #[test]
    fn test_username_without_password_falls_through() {
        let store = Arc::new(MemoryStore::default());
        store
            .put(&host("ghcr.io"), &Credential::basic("stored", "pw"))
            .unwrap();
        let resolver = CredentialResolver::new(store, CredentialCache::new());

        let credential = resolver
            .resolve(&host("ghcr.io"), Some("u"), None)
            .unwrap();
        assert_eq!(credential, Credential::basic("stored", "pw"));
    }

    #[test]
    fn test_empty_strings_are_absent() {
        let store = Arc::new(MemoryStore::default());
        let resolver = CredentialResolver::new(store.clone(), CredentialCache::new());

        let credential = resolver
            .resolve(&host("ghcr.io"), Some(""), Some(""))
            .unwrap();
        assert_eq!(credential, Credential::Empty);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_store_failure_propagates_and_is_not_cached() {
        let store = Arc::new(MemoryStore {
            fail: true,
            ..MemoryStore::default()
        });
        let cache = CredentialCache::new();
        let resolver = CredentialResolver::new(store.clone(), cache.clone());

        let err = resolver.resolve(&host("ghcr.io"), None, None).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
        assert!(cache.is_empty());

        assert!(resolver.resolve(&host("ghcr.io"), None, None).is_err());
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_explicit_credentials_are_not_cached() {
        let store = Arc::new(MemoryStore::default());
        let cache = CredentialCache::new();
        let resolver = CredentialResolver::new(store, cache.clone());

        resolver
            .resolve(&host("ghcr.io"), Some("u"), Some("p"))
            .unwrap();
        resolver.resolve(&host("ghcr.io"), None, Some("t")).unwrap();
        assert!(cache.is_empty());
    }
}
