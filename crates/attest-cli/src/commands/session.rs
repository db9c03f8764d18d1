//! Per-invocation registry session setup.

use anyhow::{Context, Result};

use attest_registry::{
    AuthenticatedClientFactory, ClientConfig, ConfigPaths, ConnectionSecurityPolicy,
    CredentialCache, CredentialResolver, SecureOptions, SelectedStore, StoreChain, ToolConfig,
};

/// Everything a command needs to reach registries: the selected store, the
/// resolver over it, the security policy, and a client factory.
pub struct Session {
    pub selected: SelectedStore,
    pub resolver: CredentialResolver,
    pub policy: ConnectionSecurityPolicy,
    pub factory: AuthenticatedClientFactory,
    pub options: SecureOptions,
}

impl Session {
    /// Discovers configuration and selects the credential store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read or no credential
    /// store can be opened.
    pub fn open(options: SecureOptions, client: ClientConfig) -> Result<Self> {
        let paths = ConfigPaths::discover().context("Failed to locate configuration directory")?;
        Self::open_at(&paths, options, client)
    }

    /// Same as [`Self::open`] with explicit locations.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub fn open_at(
        paths: &ConfigPaths,
        options: SecureOptions,
        client: ClientConfig,
    ) -> Result<Self> {
        let config = ToolConfig::load(&paths.config_file())
            .context("Failed to load attest configuration")?;

        let selected = StoreChain::discover(paths)
            .select()
            .context("Failed to select credential store")?;
        tracing::debug!(
            store = %selected.kind(),
            fallback = selected.is_fallback(),
            "Credential store ready"
        );

        let resolver = CredentialResolver::new(selected.store(), CredentialCache::new());
        let policy = ConnectionSecurityPolicy::new(options.plain_http, config.insecure_allowlist());
        let factory = AuthenticatedClientFactory::from_options(client, &options);

        Ok(Self {
            selected,
            resolver,
            policy,
            factory,
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_registry::{RegistryHost, SecurityDecision};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_open_at_applies_insecure_registries() {
        let dir = TempDir::new().unwrap();
        let paths = ConfigPaths::new(dir.path().join("attest"), dir.path().join("docker"));
        fs::create_dir_all(&paths.config_dir).unwrap();
        fs::write(
            paths.config_file(),
            r#"{"insecureRegistries": ["registry.internal:5000"]}"#,
        )
        .unwrap();

        let session = Session::open_at(&paths, SecureOptions::new(), ClientConfig::new()).unwrap();
        let host = |s: &str| RegistryHost::parse(s).unwrap();

        assert_eq!(
            session.policy.decide(&host("registry.internal:5000")),
            SecurityDecision::PlainHttp
        );
        assert_eq!(
            session.policy.decide(&host("registry.internal")),
            SecurityDecision::Tls
        );
    }

    #[test]
    fn test_open_at_rejects_corrupt_config() {
        let dir = TempDir::new().unwrap();
        let paths = ConfigPaths::new(dir.path().join("attest"), dir.path().join("docker"));
        fs::create_dir_all(&paths.config_dir).unwrap();
        fs::write(paths.config_file(), "{not json").unwrap();

        assert!(Session::open_at(&paths, SecureOptions::new(), ClientConfig::new()).is_err());
    }
}
