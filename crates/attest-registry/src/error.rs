//! Error types for credential resolution and registry access.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`CredentialStore`](crate::CredentialStore).
///
/// A missing entry is reported as [`StoreError::NotFound`]; the resolver turns
/// it into an anonymous credential. Every other variant is a real failure and
/// must reach the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No credential is stored for the host.
    #[error("No credentials stored for {host}")]
    NotFound {
        /// Registry host.
        host: String,
    },

    /// The store cannot be opened, read, or written.
    #[error("Credential store at {location} is unavailable: {reason}")]
    Unavailable {
        /// File path or helper program backing the store.
        location: String,
        /// Error message.
        reason: String,
    },

    /// A plaintext write was refused and no credential helper can protect it.
    #[error("Refusing to store plaintext credentials for {host} in {location}: no credential helper is configured")]
    SecretWriteRejected {
        /// Registry host.
        host: String,
        /// File path of the store.
        location: String,
    },

    /// The credential cannot be represented by the store.
    #[error("Cannot store credential for {host}: {reason}")]
    InvalidCredential {
        /// Registry host.
        host: String,
        /// Error message.
        reason: String,
    },
}

impl StoreError {
    /// Creates a [`StoreError::NotFound`] for the host.
    #[must_use]
    pub fn not_found(host: impl Into<String>) -> Self {
        Self::NotFound { host: host.into() }
    }

    /// Creates a [`StoreError::Unavailable`] for the location.
    #[must_use]
    pub fn unavailable(location: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unavailable {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the error only means that no entry exists.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors that can occur while building or using a registry client.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Invalid reference format.
    #[error("Invalid reference '{reference}': {reason}")]
    InvalidReference {
        /// Reference string.
        reference: String,
        /// Why the reference was rejected.
        reason: String,
    },

    /// Credential store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Tool configuration could not be loaded.
    #[error("Failed to load configuration from {path}: {reason}")]
    Config {
        /// Configuration file path.
        path: PathBuf,
        /// Error message.
        reason: String,
    },

    /// Failed to connect to registry.
    #[error("Failed to connect to registry at {url}: {source}")]
    ConnectionFailed {
        /// Registry URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Authentication failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Error message.
        message: String,
    },

    /// HTTP error from registry.
    #[error("HTTP error from registry: {status} - {message}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Invalid URL.
    #[error("Invalid URL: {url}")]
    InvalidUrl {
        /// URL string.
        url: String,
    },
}

impl RegistryError {
    /// Creates an [`RegistryError::InvalidReference`].
    #[must_use]
    pub fn invalid_reference(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::ConnectionFailed {
                url: err
                    .url()
                    .map_or_else(|| "unknown".to_string(), ToString::to_string),
                source: err,
            }
        } else {
            let status = err.status().map_or(0, |s| s.as_u16());
            Self::HttpError {
                status,
                message: err.to_string(),
            }
        }
    }
}
