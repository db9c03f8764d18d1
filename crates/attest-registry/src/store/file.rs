//! The tool's own credential file.

use std::ffi::OsString;
use std::path::Path;

use super::auths::{AuthsDocument, Format};
use super::{CredentialStore, CredentialStoreDescriptor, StoreKind};
use crate::credential::Credential;
use crate::error::StoreError;
use crate::reference::RegistryHost;

/// File-backed store over the tool's versioned `credentials.json`.
#[derive(Debug)]
pub struct FileStore {
    document: AuthsDocument,
}

impl FileStore {
    /// Opens the credential file at `path`. A missing file is an empty,
    /// unconfigured store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the file exists but cannot be
    /// read, is corrupt, or carries an unsupported version.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use attest_registry::FileStore;
    ///
    /// let store = FileStore::open("/home/user/.config/attest/credentials.json", false)?;
    /// # Ok::<(), attest_registry::StoreError>(())
    /// ```
    pub fn open(path: impl AsRef<Path>, allow_plaintext_write: bool) -> Result<Self, StoreError> {
        Ok(Self {
            document: AuthsDocument::open(path.as_ref(), Format::Versioned, allow_plaintext_write)?,
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

    /// Returns the path of the credential file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.document.path()
    }
}

impl CredentialStore for FileStore {
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
        self.document.descriptor(StoreKind::FileBacked)
    }
}
