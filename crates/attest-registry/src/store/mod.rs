//! Persistent credential stores.
//!
//! Three independent implementations of [`CredentialStore`] exist:
//!
//! - [`FileStore`] - the tool's own versioned credential file
//! - [`DockerStore`] - docker's `config.json`, for interoperability
//! - [`NativeStore`] - an OS secret manager reached through a docker
//!   credential helper program
//!
//! [`StoreChain`] picks exactly one of them per session.

mod auths;
mod chain;
mod docker;
mod file;
mod native;
#[cfg(all(test, unix))]
mod testing;

use std::fmt;
use std::path::PathBuf;

use crate::credential::Credential;
use crate::error::StoreError;
use crate::reference::RegistryHost;

pub use chain::{DockerProbe, FileProbe, NativeProbe, SelectedStore, StoreChain, StoreProbe};
pub use docker::DockerStore;
pub use file::FileStore;
pub use native::NativeStore;

/// The kind of backend behind a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// The tool's own credential file.
    FileBacked,
    /// Docker's `config.json`.
    DockerCompatible,
    /// Platform secret manager.
    OsNative,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileBacked => write!(f, "file"),
            Self::DockerCompatible => write!(f, "docker"),
            Self::OsNative => write!(f, "native"),
        }
    }
}

/// Describes a store instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStoreDescriptor {
    /// Backend kind.
    pub kind: StoreKind,
    /// File path or helper program.
    pub location: PathBuf,
    /// Whether credentials may be written in plaintext.
    pub allow_plaintext_write: bool,
}

/// Uniform access to credentials keyed by registry host.
///
/// All operations are blocking.
pub trait CredentialStore: Send + Sync {
    /// Retrieves the credential for a host.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no entry exists, or another
    /// [`StoreError`] if the store cannot be read.
    fn get(&self, host: &RegistryHost) -> Result<Credential, StoreError>;

    /// Stores the credential for a host, replacing any existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SecretWriteRejected`] if plaintext writes are
    /// disallowed and no helper protects the entry; the stored state is then
    /// unchanged.
    fn put(&self, host: &RegistryHost, credential: &Credential) -> Result<(), StoreError>;

    /// Removes the credential for a host.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no entry exists.
    fn delete(&self, host: &RegistryHost) -> Result<(), StoreError>;

    /// Returns true if the store holds configuration worth selecting.
    fn is_configured(&self) -> bool;

    /// Describes this store.
    fn descriptor(&self) -> CredentialStoreDescriptor;
}

fn reject_empty(host: &RegistryHost, credential: &Credential) -> Result<(), StoreError> {
    if credential.is_empty() {
        return Err(StoreError::InvalidCredential {
            host: host.to_string(),
            reason: "an empty credential cannot be stored".to_string(),
        });
    }
    Ok(())
}
