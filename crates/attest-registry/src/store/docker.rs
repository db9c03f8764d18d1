//! Docker `config.json` credential store.
//!
//! Reads and writes the same logical host → credential mapping as
//! [`FileStore`](super::FileStore), in docker's unversioned legacy layout, so
//! that `docker login` sessions are reused and vice versa.

use std::ffi::OsString;
use std::path::Path;

use super::auths::{AuthsDocument, Format};
use super::{CredentialStore, CredentialStoreDescriptor, StoreKind};
use crate::credential::Credential;
use crate::error::StoreError;
use crate::reference::RegistryHost;

/// Docker-compatible credential store.
#[derive(Debug)]
pub struct DockerStore {
    document: AuthsDocument,
}

impl DockerStore {
    /// Opens a docker `config.json`. A missing file is an empty, unconfigured
    /// store.
    ///
    /// The location is usually [`ConfigPaths::docker_config`](crate::ConfigPaths),
    /// which honors `DOCKER_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the file exists but cannot be
    /// read or parsed.
    pub fn open(path: impl AsRef<Path>, allow_plaintext_write: bool) -> Result<Self, StoreError> {
        Ok(Self {
            document: AuthsDocument::open(path.as_ref(), Format::Docker, allow_plaintext_write)?,
        })
    }

    /// Resolves the `credsStore` and `credHelpers` programs in an explicit
    /// search path instead of the process `PATH`.
    #[must_use]
    pub fn with_helper_search_path(self, search_path: impl Into<OsString>) -> Self {
        Self {
            document: self.document.with_helper_search_path(search_path.into()),
        }
    }

    /// Returns the path of the docker configuration file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.document.path()
    }
}

impl CredentialStore for DockerStore {
    fn get(&self, host: &RegistryHost) -> Result<Credential, StoreError> {
        self.document.get(host)
    }

    fn put(&self, host: &RegistryHost, credential: &Credential) -> Result<(), StoreError> {
        self.document.put(host, credential)
    }

    fn delete(&self, host: &RegistryHost) -> Result<(), StoreError> {
        self.document.delete(host)
    }

    fn is_configured(&self) -> bool {
        self.document.is_configured()
    }

    fn descriptor(&self) -> CredentialStoreDescriptor {
        self.document.descriptor(StoreKind::DockerCompatible)
    }
}
