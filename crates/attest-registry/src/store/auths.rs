//! The `auths` document shared by the file-backed and docker-compatible
//! stores.
//!
//! ```json
//! {
//!   "version": "1",
//!   "auths": {
//!     "registry.example.com": { "auth": "dXNlcjpwYXNz" },
//!     "ghcr.io": { "identitytoken": "..." }
//!   },
//!   "credsStore": "secretservice",
//!   "credHelpers": { "123456789.dkr.ecr.us-east-1.amazonaws.com": "ecr-login" }
//! }
//! ```
//!
//! Docker's legacy format is identical minus the `version` field. Unknown
//! fields are preserved on write.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::native::NativeStore;
use super::{reject_empty, CredentialStore, CredentialStoreDescriptor, StoreKind};
use crate::credential::Credential;
use crate::error::StoreError;
use crate::reference::RegistryHost;

/// Current version of the tool's credential file.
pub(super) const FILE_FORMAT_VERSION: &str = "1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AuthsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    auths: BTreeMap<String, AuthEntry>,

    #[serde(rename = "credsStore", default, skip_serializing_if = "Option::is_none")]
    creds_store: Option<String>,

    #[serde(rename = "credHelpers", default, skip_serializing_if = "BTreeMap::is_empty")]
    cred_helpers: BTreeMap<String, String>,

    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AuthEntry {
    /// Base64-encoded `username:password`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    identitytoken: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    registrytoken: Option<String>,

    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

impl AuthEntry {
    fn to_credential(&self) -> Result<Credential, String> {
        if let Some(token) = non_empty(self.identitytoken.as_ref()) {
            return Ok(Credential::refresh_token(token));
        }
        if let Some(token) = non_empty(self.registrytoken.as_ref()) {
            return Ok(Credential::access_token(token));
        }
        if let Some(auth) = non_empty(self.auth.as_ref()) {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(auth)
                .map_err(|e| format!("invalid base64 in auth field: {e}"))?;
            let decoded = String::from_utf8(decoded)
                .map_err(|_| "auth field is not valid UTF-8".to_string())?;
            let (username, password) = decoded
                .split_once(':')
                .ok_or_else(|| "auth field is not in username:password form".to_string())?;
            return Ok(Credential::basic(username, password));
        }
        if let (Some(username), Some(password)) = (
            non_empty(self.username.as_ref()),
            non_empty(self.password.as_ref()),
        ) {
            return Ok(Credential::basic(username, password));
        }
        Ok(Credential::Empty)
    }

    fn from_credential(credential: &Credential, extra: serde_json::Map<String, serde_json::Value>) -> Self {
        let mut entry = Self {
            extra,
            ..Self::default()
        };
        match credential {
            Credential::Empty => {}
            Credential::Basic { username, password } => {
                entry.auth = Some(
                    base64::engine::general_purpose::STANDARD
                        .encode(format!("{username}:{password}")),
                );
            }
            Credential::RefreshToken(token) => entry.identitytoken = Some(token.clone()),
            Credential::AccessToken(token) => entry.registrytoken = Some(token.clone()),
        }
        entry
    }
}

/// Layout of the document on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Format {
    /// The tool's own file; carries a `version` field.
    Versioned,
    /// Docker's legacy `config.json`.
    Docker,
}

/// An `auths` document loaded from disk, with helper delegation.
#[derive(Debug)]
pub(super) struct AuthsDocument {
    path: PathBuf,
    format: Format,
    allow_plaintext_write: bool,
    helper_search_path: Option<OsString>,
    content: RwLock<AuthsFile>,
}

impl AuthsDocument {
    /// Reads the document. A missing file is an empty document.
    pub(super) fn open(
        path: &Path,
        format: Format,
        allow_plaintext_write: bool,
    ) -> Result<Self, StoreError> {
        let location = path.display().to_string();
        let content = match std::fs::read_to_string(path) {
            Ok(raw) if raw.trim().is_empty() => AuthsFile::default(),
            Ok(raw) => serde_json::from_str::<AuthsFile>(&raw).map_err(|e| {
                StoreError::unavailable(&location, format!("corrupt credential file: {e}"))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AuthsFile::default(),
            Err(e) => return Err(StoreError::unavailable(&location, e)),
        };

        if format == Format::Versioned {
            if let Some(version) = content.version.as_deref() {
                if version != FILE_FORMAT_VERSION {
                    return Err(StoreError::unavailable(
                        &location,
                        format!("unsupported credential file version '{version}'"),
                    ));
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            format,
            allow_plaintext_write,
            helper_search_path: None,
            content: RwLock::new(content),
        })
    }

    /// Resolves helper programs in `search_path` instead of the process
    /// `PATH`.
    pub(super) fn with_helper_search_path(mut self, search_path: OsString) -> Self {
        self.helper_search_path = Some(search_path);
        self
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }

    pub(super) fn descriptor(&self, kind: StoreKind) -> CredentialStoreDescriptor {
        CredentialStoreDescriptor {
            kind,
            location: self.path.clone(),
            allow_plaintext_write: self.allow_plaintext_write,
        }
    }

    /// At least one entry, a default helper, or a per-host helper exists.
    pub(super) fn is_configured(&self) -> bool {
        let content = self.content.read();
        !content.auths.is_empty()
            || content.creds_store.as_deref().is_some_and(|s| !s.is_empty())
            || !content.cred_helpers.is_empty()
    }

    /// Returns the helper responsible for a host, if any.
    ///
    /// A helper named by the document but missing from an explicit search
    /// path is unavailable.
    fn helper_for(&self, host: &RegistryHost) -> Result<Option<NativeStore>, StoreError> {
        let content = self.content.read();
        let Some(name) = content
            .cred_helpers
            .get(host.as_str())
            .or(content.creds_store.as_ref())
            .filter(|name| !name.is_empty())
        else {
            return Ok(None);
        };

        match &self.helper_search_path {
            Some(search_path) => NativeStore::find_in(name, search_path)
                .map(Some)
                .ok_or_else(|| {
                    StoreError::unavailable(
                        format!("docker-credential-{name}"),
                        "helper not found on search path",
                    )
                }),
            None => Ok(Some(NativeStore::with_helper(name))),
        }
    }

    /// Keys under which the host may be recorded.
    fn candidate_keys(&self, host: &RegistryHost) -> Vec<String> {
        let mut keys = vec![host.to_string()];
        if self.format == Format::Docker {
            keys.push(format!("https://{host}"));
            keys.push(format!("http://{host}"));
            if host.as_str() == "docker.io" {
                keys.push("https://index.docker.io/v1/".to_string());
            }
        }
        keys
    }

    pub(super) fn get(&self, host: &RegistryHost) -> Result<Credential, StoreError> {
        if let Some(helper) = self.helper_for(host)? {
            return helper.get(host);
        }

        let content = self.content.read();
        let entry = self
            .candidate_keys(host)
            .iter()
            .find_map(|key| content.auths.get(key))
            .ok_or_else(|| StoreError::not_found(host.as_str()))?;

        let credential = entry.to_credential().map_err(|reason| {
            StoreError::unavailable(self.path.display().to_string(), format!("{host}: {reason}"))
        })?;
        if credential.is_empty() {
            return Err(StoreError::not_found(host.as_str()));
        }
        Ok(credential)
    }

    pub(super) fn put(&self, host: &RegistryHost, credential: &Credential) -> Result<(), StoreError> {
        reject_empty(host, credential)?;

        if let Some(helper) = self.helper_for(host)? {
            return helper.put(host, credential);
        }

        if !self.allow_plaintext_write {
            return Err(StoreError::SecretWriteRejected {
                host: host.to_string(),
                location: self.path.display().to_string(),
            });
        }

        let mut content = self.content.write();
        let mut updated = content.clone();
        let extra = updated
            .auths
            .remove(host.as_str())
            .map(|entry| entry.extra)
            .unwrap_or_default();
        updated
            .auths
            .insert(host.to_string(), AuthEntry::from_credential(credential, extra));

        self.save(&mut updated)?;
        *content = updated;
        Ok(())
    }

    pub(super) fn delete(&self, host: &RegistryHost) -> Result<(), StoreError> {
        let helper_result = self
            .helper_for(host)
            .transpose()
            .map(|helper| helper.and_then(|helper| helper.delete(host)));

        let mut content = self.content.write();
        let mut updated = content.clone();
        let mut removed = false;
        for key in self.candidate_keys(host) {
            removed |= updated.auths.remove(&key).is_some();
        }
        if removed {
            self.save(&mut updated)?;
            *content = updated;
        }

        match helper_result {
            Some(Err(e)) if e.is_not_found() && removed => Ok(()),
            Some(result) => result,
            None if removed => Ok(()),
            None => Err(StoreError::not_found(host.as_str())),
        }
    }

    /// Writes the document atomically with owner-only permissions.
    fn save(&self, content: &mut AuthsFile) -> Result<(), StoreError> {
        let location = self.path.display().to_string();
        if self.format == Format::Versioned {
            content.version = Some(FILE_FORMAT_VERSION.to_string());
        }

        let json = serde_json::to_vec_pretty(content)
            .map_err(|e| StoreError::unavailable(&location, e))?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| StoreError::unavailable(&location, e))?;

        let file_name = self
            .path
            .file_name()
            .map_or_else(|| "credentials".into(), |n| n.to_string_lossy());
        let tmp_path = dir.join(format!(".{file_name}.{}.tmp", std::process::id()));

        let write = || -> std::io::Result<()> {
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(&tmp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, &self.path)
        };

        write().map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            StoreError::unavailable(&location, e)
        })?;

        tracing::debug!(path = %self.path.display(), "Saved credential file");
        Ok(())
    }
}
