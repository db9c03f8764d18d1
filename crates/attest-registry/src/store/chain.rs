//! One-time, fixed-priority selection of the session's credential store.
//!
//! ```text
//! FileProbe ──configured?──► FileStore
//!     │ no
//! DockerProbe ─configured?─► DockerStore
//!     │ no
//! NativeProbe ─available?──► NativeStore
//!     │ no
//! fallback ────────────────► FileStore (unconfigured, writable)
//! ```
//!
//! The tool's file stays writable in plaintext in later sessions as long as
//! no native helper is available, so a fallback login can be updated.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::sync::Arc;

use super::{CredentialStore, DockerStore, FileStore, NativeStore, StoreKind};
use crate::config::ConfigPaths;
use crate::error::StoreError;

/// A candidate store, opened on demand during selection.
pub trait StoreProbe: Send + Sync {
    /// Kind of store this probe opens.
    fn kind(&self) -> StoreKind;

    /// Opens the store and returns it if it is configured or available.
    ///
    /// # Errors
    ///
    /// Returns an error if the store exists but cannot be opened; selection
    /// stops there instead of silently moving on.
    fn probe(&self) -> Result<Option<Box<dyn CredentialStore>>, StoreError>;
}

/// Probes the tool's credential file.
///
/// The file accepts plaintext writes only while no native helper is
/// available, the same condition under which the fallback is chosen.
#[derive(Debug, Clone)]
pub struct FileProbe {
    path: PathBuf,
    search_path: Option<OsString>,
}

impl FileProbe {
    /// Creates a probe for the credential file at `path`, looking up helpers
    /// on the process `PATH`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            search_path: None,
        }
    }

    /// Looks up helper programs in an explicit path list.
    #[must_use]
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }
}

impl StoreProbe for FileProbe {
    fn kind(&self) -> StoreKind {
        StoreKind::FileBacked
    }

    fn probe(&self) -> Result<Option<Box<dyn CredentialStore>>, StoreError> {
        let native_available = detect_native(self.search_path.as_deref()).is_some();
        let mut store = FileStore::open(&self.path, !native_available)?;
        if !store.is_configured() {
            return Ok(None);
        }
        if let Some(search_path) = &self.search_path {
            store = store.with_helper_search_path(search_path.clone());
        }
        tracing::trace!(
            plaintext_write = !native_available,
            "Credential file write policy"
        );
        Ok(Some(Box::new(store)))
    }
}

/// Probes docker's `config.json`. Plaintext writes into it are refused.
#[derive(Debug, Clone)]
pub struct DockerProbe {
    path: PathBuf,
    search_path: Option<OsString>,
}

impl DockerProbe {
    /// Creates a probe for the docker configuration file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            search_path: None,
        }
    }

    /// Looks up helper programs in an explicit path list.
    #[must_use]
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }
}

impl StoreProbe for DockerProbe {
    fn kind(&self) -> StoreKind {
        StoreKind::DockerCompatible
    }

    fn probe(&self) -> Result<Option<Box<dyn CredentialStore>>, StoreError> {
        let mut store = DockerStore::open(&self.path, false)?;
        if !store.is_configured() {
            return Ok(None);
        }
        if let Some(search_path) = &self.search_path {
            store = store.with_helper_search_path(search_path.clone());
        }
        Ok(Some(Box::new(store)))
    }
}

fn detect_native(search_path: Option<&OsStr>) -> Option<NativeStore> {
    match search_path {
        Some(search_path) => NativeStore::detect_in(search_path),
        None => NativeStore::detect_default(),
    }
}

/// Probes for the platform's default credential helper.
#[derive(Debug, Clone, Default)]
pub struct NativeProbe {
    search_path: Option<OsString>,
}

impl NativeProbe {
    /// Creates a probe that searches the process `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a probe that searches an explicit path list.
    #[must_use]
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }
}

impl StoreProbe for NativeProbe {
    fn kind(&self) -> StoreKind {
        StoreKind::OsNative
    }

    fn probe(&self) -> Result<Option<Box<dyn CredentialStore>>, StoreError> {
        Ok(detect_native(self.search_path.as_deref())
            .map(|s| Box::new(s) as Box<dyn CredentialStore>))
    }
}

/// The store chosen for a session.
#[derive(Clone)]
pub struct SelectedStore {
    store: Arc<dyn CredentialStore>,
    fallback: bool,
}

impl SelectedStore {
    /// Returns the selected store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn CredentialStore> {
        Arc::clone(&self.store)
    }

    /// Returns the kind of the selected store.
    #[must_use]
    pub fn kind(&self) -> StoreKind {
        self.store.descriptor().kind
    }

    /// Returns true if no candidate matched and the fallback was used.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        self.fallback
    }
}

impl std::fmt::Debug for SelectedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedStore")
            .field("descriptor", &self.store.descriptor())
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// Ordered list of store probes with a guaranteed writable fallback.
pub struct StoreChain {
    probes: Vec<Box<dyn StoreProbe>>,
    fallback: PathBuf,
}

impl StoreChain {
    /// Creates an empty chain whose fallback is the credential file at
    /// `fallback`.
    #[must_use]
    pub fn new(fallback: impl Into<PathBuf>) -> Self {
        Self {
            probes: Vec::new(),
            fallback: fallback.into(),
        }
    }

    /// Creates the standard chain: tool file, docker file, native helper.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use attest_registry::{ConfigPaths, StoreChain};
    ///
    /// let paths = ConfigPaths::discover()?;
    /// let selected = StoreChain::discover(&paths).select()?;
    /// println!("using {} store", selected.kind());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    #[must_use]
    pub fn discover(paths: &ConfigPaths) -> Self {
        Self::new(paths.credentials_file())
            .with_probe(FileProbe::new(paths.credentials_file()))
            .with_probe(DockerProbe::new(&paths.docker_config))
            .with_probe(NativeProbe::new())
    }

    /// Appends a probe. Earlier probes win.
    #[must_use]
    pub fn with_probe(mut self, probe: impl StoreProbe + 'static) -> Self {
        self.probes.push(Box::new(probe));
        self
    }

    /// Selects the session's store. Consumes the chain, so selection happens
    /// once.
    ///
    /// # Errors
    ///
    /// Returns the first probe error, or an error if the fallback file cannot
    /// be opened.
    pub fn select(self) -> Result<SelectedStore, StoreError> {
        for probe in &self.probes {
            if let Some(store) = probe.probe()? {
                tracing::debug!(
                    kind = %probe.kind(),
                    location = %store.descriptor().location.display(),
                    "Selected credential store"
                );
                return Ok(SelectedStore {
                    store: Arc::from(store),
                    fallback: false,
                });
            }
            tracing::trace!(kind = %probe.kind(), "Credential store not configured");
        }

        tracing::warn!(
            path = %self.fallback.display(),
            "No credential store configured and no native helper available, \
             falling back to plaintext credential file"
        );
        let store = FileStore::open(&self.fallback, true)?;
        Ok(SelectedStore {
            store: Arc::new(store),
            fallback: true,
        })
    }
}

impl std::fmt::Debug for StoreChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreChain")
            .field(
                "probes",
                &self.probes.iter().map(|p| p.kind()).collect::<Vec<_>>(),
            )
            .field("fallback", &self.fallback)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::Credential;
    use crate::reference::RegistryHost;
    use tempfile::TempDir;

    struct FailingProbe;

    impl StoreProbe for FailingProbe {
        fn kind(&self) -> StoreKind {
            StoreKind::OsNative
        }

        fn probe(&self) -> Result<Option<Box<dyn CredentialStore>>, StoreError> {
            Err(StoreError::unavailable("keychain", "daemon unreachable"))
        }
    }

    /// Chain over files in `dir` with no native helper on the search path.
    fn chain(dir: &TempDir) -> StoreChain {
        StoreChain::new(dir.path().join("credentials.json"))
            .with_probe(FileProbe::new(dir.path().join("credentials.json")).with_search_path(""))
            .with_probe(DockerProbe::new(dir.path().join("docker.json")).with_search_path(""))
            .with_probe(NativeProbe::with_search_path(""))
    }

    #[test]
    fn test_docker_selected_when_file_unconfigured() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("docker.json"),
            r#"{"auths": {"ghcr.io": {"auth": "dXNlcm5hbWU6cGFzc3dvcmQ="}}}"#,
        )
        .unwrap();

        let selected = chain(&dir).select().unwrap();
        assert_eq!(selected.kind(), StoreKind::DockerCompatible);
        assert!(!selected.is_fallback());
    }

    #[test]
    fn test_fallback_is_writable() {
        let dir = TempDir::new().unwrap();

        let selected = chain(&dir).select().unwrap();
        assert!(selected.is_fallback());
        assert_eq!(selected.kind(), StoreKind::FileBacked);

        let host = RegistryHost::parse("registry.example.com").unwrap();
        let store = selected.store();
        assert!(store.get(&host).unwrap_err().is_not_found());
        store.put(&host, &Credential::basic("u", "p")).unwrap();
        assert_eq!(store.get(&host).unwrap(), Credential::basic("u", "p"));
    }

    #[test]
    fn test_fallback_file_stays_writable_in_later_sessions() {
        let dir = TempDir::new().unwrap();
        let registry = RegistryHost::parse("registry.example.com").unwrap();
        let ghcr = RegistryHost::parse("ghcr.io").unwrap();

        let first = chain(&dir).select().unwrap();
        assert!(first.is_fallback());
        first
            .store()
            .put(&registry, &Credential::basic("u", "p"))
            .unwrap();

        let second = chain(&dir).select().unwrap();
        assert!(!second.is_fallback());
        assert_eq!(second.kind(), StoreKind::FileBacked);
        assert!(second.store().descriptor().allow_plaintext_write);

        let store = second.store();
        store.put(&ghcr, &Credential::refresh_token("rt")).unwrap();
        store
            .put(&registry, &Credential::basic("u", "rotated"))
            .unwrap();

        let third = chain(&dir).select().unwrap();
        assert_eq!(
            third.store().get(&registry).unwrap(),
            Credential::basic("u", "rotated")
        );
        assert_eq!(
            third.store().get(&ghcr).unwrap(),
            Credential::refresh_token("rt")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_file_refuses_plaintext_when_native_helper_available() {
        let Some(default) = crate::store::native::platform_helpers().first() else {
            return;
        };
        let dir = TempDir::new().unwrap();
        let bin = TempDir::new().unwrap();
        crate::store::testing::install_helper(bin.path(), default);

        let path = dir.path().join("credentials.json");
        FileStore::open(&path, true)
            .unwrap()
            .put(
                &RegistryHost::parse("ghcr.io").unwrap(),
                &Credential::basic("u", "p"),
            )
            .unwrap();

        let selected = StoreChain::new(&path)
            .with_probe(FileProbe::new(&path).with_search_path(bin.path().as_os_str()))
            .select()
            .unwrap();
        assert_eq!(selected.kind(), StoreKind::FileBacked);

        let err = selected
            .store()
            .put(
                &RegistryHost::parse("quay.io").unwrap(),
                &Credential::basic("u", "p"),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::SecretWriteRejected { .. }));
    }

    #[test]
    fn test_store_open_error_is_not_skipped() {
        let dir = TempDir::new().unwrap();
        let err = StoreChain::new(dir.path().join("credentials.json"))
            .with_probe(FailingProbe)
            .with_probe(FileProbe::new(dir.path().join("credentials.json")))
            .select()
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[test]
    fn test_corrupt_docker_config_surfaces() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("docker.json"), "not json").unwrap();

        let err = chain(&dir).select().unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }
}
