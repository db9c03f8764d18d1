//! OS secret manager access through docker credential helpers.
//!
//! A helper is an executable named `docker-credential-<name>` speaking a
//! small stdin/stdout protocol:
//!
//! | Action  | stdin                                   | stdout                                  |
//! |---------|-----------------------------------------|-----------------------------------------|
//! | `get`   | server URL                              | `{"ServerURL","Username","Secret"}`     |
//! | `store` | `{"ServerURL","Username","Secret"}`     | -                                       |
//! | `erase` | server URL                              | -                                       |
//!
//! A `Username` of `<token>` marks the secret as an identity (refresh) token.

use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use super::{reject_empty, CredentialStore, CredentialStoreDescriptor, StoreKind};
use crate::credential::Credential;
use crate::error::StoreError;
use crate::reference::RegistryHost;

const HELPER_PREFIX: &str = "docker-credential-";
const TOKEN_USERNAME: &str = "<token>";
const NOT_FOUND_MESSAGE: &str = "credentials not found";

#[derive(Debug, Serialize, Deserialize)]
struct HelperCredential {
    #[serde(rename = "ServerURL", default)]
    server_url: String,
    #[serde(rename = "Username", default)]
    username: String,
    #[serde(rename = "Secret", default)]
    secret: String,
}

/// Credential store backed by a docker credential helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeStore {
    helper: String,
    program: PathBuf,
}

impl NativeStore {
    /// Creates a store for a named helper, resolved through `PATH` when run.
    ///
    /// # Examples
    ///
    /// ```
    /// use attest_registry::NativeStore;
    ///
    /// let store = NativeStore::with_helper("pass");
    /// assert_eq!(store.helper(), "pass");
    /// ```
    #[must_use]
    pub fn with_helper(name: impl AsRef<str>) -> Self {
        let helper = name.as_ref().to_string();
        let program = PathBuf::from(format!("{HELPER_PREFIX}{helper}"));
        Self { helper, program }
    }

    /// Creates a store for a helper at an explicit path.
    #[must_use]
    pub fn with_program(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            helper: name.into(),
            program: program.into(),
        }
    }

    /// Probes for the platform's default helper on `PATH`.
    ///
    /// Returns `None` when no default helper is installed; availability is
    /// never assumed.
    #[must_use]
    pub fn detect_default() -> Option<Self> {
        let path = std::env::var_os("PATH")?;
        Self::detect_in(&path)
    }

    /// Probes for the platform's default helper in an explicit search path.
    #[must_use]
    pub fn detect_in(search_path: &OsStr) -> Option<Self> {
        platform_helpers()
            .iter()
            .find_map(|name| Self::find_in(name, search_path))
    }

    /// Looks up the named helper's executable in an explicit search path.
    ///
    /// Returns `None` if no directory on the path holds an executable
    /// `docker-credential-<name>`.
    #[must_use]
    pub fn find_in(name: &str, search_path: &OsStr) -> Option<Self> {
        let program = format!("{HELPER_PREFIX}{name}");
        std::env::split_paths(search_path)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| dir.join(executable_name(&program)))
            .find(|candidate| is_executable(candidate))
            .map(|candidate| Self::with_program(name, candidate))
    }

    /// Returns the helper name.
    #[must_use]
    pub fn helper(&self) -> &str {
        &self.helper
    }

    /// Returns the helper program.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, action: &str, input: &[u8]) -> Result<Vec<u8>, StoreError> {
        let location = self.program.display().to_string();

        let mut child = Command::new(&self.program)
            .arg(action)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| StoreError::unavailable(&location, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(input) {
                drop(stdin);
                let _ = child.kill();
                let _ = child.wait();
                return Err(StoreError::unavailable(&location, e));
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| StoreError::unavailable(&location, e))?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let message = String::from_utf8_lossy(if output.stdout.is_empty() {
            &output.stderr
        } else {
            &output.stdout
        })
        .trim()
        .to_string();

        if message.contains(NOT_FOUND_MESSAGE) {
            return Err(StoreError::NotFound {
                host: String::from_utf8_lossy(input).trim().to_string(),
            });
        }

        Err(StoreError::unavailable(
            location,
            format!("{action} failed ({}): {message}", output.status),
        ))
    }
}

impl CredentialStore for NativeStore {
    fn get(&self, host: &RegistryHost) -> Result<Credential, StoreError> {
        let stdout = self.run("get", host.as_str().as_bytes())?;
        let response: HelperCredential = serde_json::from_slice(&stdout).map_err(|e| {
            StoreError::unavailable(
                self.program.display().to_string(),
                format!("invalid helper response: {e}"),
            )
        })?;

        match (response.username.as_str(), response.secret) {
            (_, secret) if secret.is_empty() => Err(StoreError::not_found(host.as_str())),
            (TOKEN_USERNAME, secret) => Ok(Credential::RefreshToken(secret)),
            (username, secret) => Ok(Credential::basic(username, secret)),
        }
    }

    fn put(&self, host: &RegistryHost, credential: &Credential) -> Result<(), StoreError> {
        reject_empty(host, credential)?;

        let (username, secret) = match credential {
            Credential::Basic { username, password } => (username.clone(), password.clone()),
            Credential::RefreshToken(token) => (TOKEN_USERNAME.to_string(), token.clone()),
            Credential::AccessToken(_) | Credential::Empty => {
                return Err(StoreError::InvalidCredential {
                    host: host.to_string(),
                    reason: "credential helpers only store passwords and refresh tokens"
                        .to_string(),
                })
            }
        };

        let payload = serde_json::to_vec(&HelperCredential {
            server_url: host.to_string(),
            username,
            secret,
        })
        .map_err(|e| StoreError::unavailable(self.program.display().to_string(), e))?;

        self.run("store", &payload).map(|_| ())
    }

    fn delete(&self, host: &RegistryHost) -> Result<(), StoreError> {
        self.run("erase", host.as_str().as_bytes()).map(|_| ())
    }

    /// A helper store exists only once probed or explicitly named.
    fn is_configured(&self) -> bool {
        true
    }

    fn descriptor(&self) -> CredentialStoreDescriptor {
        CredentialStoreDescriptor {
            kind: StoreKind::OsNative,
            location: self.program.clone(),
            allow_plaintext_write: false,
        }
    }
}

pub(super) const fn platform_helpers() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &["osxkeychain"]
    } else if cfg!(target_os = "windows") {
        &["wincred"]
    } else if cfg!(target_os = "linux") {
        &["secretservice", "pass"]
    } else {
        &[]
    }
}

fn executable_name(program: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{program}.exe")
    } else {
        program.to_string()
    }
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::store::testing::install_helper;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn host(s: &str) -> RegistryHost {
        RegistryHost::parse(s).unwrap()
    }

    #[test]
    fn test_helper_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = NativeStore::with_program("fake", install_helper(dir.path(), "fake"));
        let registry = host("registry.example.com");

        assert!(store.get(&registry).unwrap_err().is_not_found());

        store.put(&registry, &Credential::basic("u", "p")).unwrap();
        assert_eq!(store.get(&registry).unwrap(), Credential::basic("u", "p"));

        store.put(&registry, &Credential::refresh_token("rt")).unwrap();
        assert_eq!(store.get(&registry).unwrap(), Credential::refresh_token("rt"));

        store.delete(&registry).unwrap();
        assert!(store.delete(&registry).unwrap_err().is_not_found());
    }

    #[test]
    fn test_access_token_not_storable() {
        let dir = TempDir::new().unwrap();
        let store = NativeStore::with_program("fake", install_helper(dir.path(), "fake"));

        let err = store
            .put(&host("ghcr.io"), &Credential::access_token("short-lived"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidCredential { .. }));
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = NativeStore::with_program("gone", dir.path().join("docker-credential-gone"));

        let err = store.get(&host("ghcr.io")).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[test]
    fn test_helper_exiting_before_reading_input() {
        let dir = TempDir::new().unwrap();
        let program = dir.path().join("docker-credential-early");
        std::fs::write(&program, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
        let store = NativeStore::with_program("early", program);

        // Larger than a pipe buffer, so the write fails once the helper is gone.
        let input = vec![b'a'; 1 << 20];
        let err = store.run("store", &input).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[test]
    fn test_find_in_named_helper() {
        let empty = TempDir::new().unwrap();
        assert!(NativeStore::find_in("fake", empty.path().as_os_str()).is_none());

        let dir = TempDir::new().unwrap();
        let program = install_helper(dir.path(), "fake");
        let search = std::env::join_paths([empty.path(), dir.path()]).unwrap();

        let store = NativeStore::find_in("fake", &search).unwrap();
        assert_eq!(store.helper(), "fake");
        assert_eq!(store.program(), program);
    }

    #[test]
    fn test_detect_in_search_path() {
        let empty = TempDir::new().unwrap();
        assert!(NativeStore::detect_in(empty.path().as_os_str()).is_none());

        let Some(default) = platform_helpers().first() else {
            return;
        };
        let dir = TempDir::new().unwrap();
        let program = install_helper(dir.path(), default);

        let search = std::env::join_paths([empty.path(), dir.path()]).unwrap();
        let store = NativeStore::detect_in(&search).unwrap();
        assert_eq!(store.helper(), *default);
        assert_eq!(store.program(), program);
    }

    #[test]
    fn test_non_executable_is_ignored() {
        let Some(default) = platform_helpers().first() else {
            return;
        };
        let dir = TempDir::new().unwrap();
        let program = install_helper(dir.path(), default);
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o644)).unwrap();

        assert!(NativeStore::detect_in(dir.path().as_os_str()).is_none());
    }
}
