//! Configuration types for credential resolution and the registry client.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::security::InsecureAllowlist;

/// Environment variable overriding the tool's configuration directory.
pub const CONFIG_DIR_ENV: &str = "ATTEST_CONFIG_DIR";

/// Environment variable locating the docker configuration directory.
pub const DOCKER_CONFIG_ENV: &str = "DOCKER_CONFIG";

/// Client identifier sent with every request and token exchange.
pub const CLIENT_ID: &str = "attest";

const CONFIG_FILE: &str = "config.json";
const CREDENTIALS_FILE: &str = "credentials.json";

/// Locations of the configuration files consulted at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    /// The tool's configuration directory.
    pub config_dir: PathBuf,

    /// Docker configuration file used by the docker-compatible store.
    pub docker_config: PathBuf,
}

impl ConfigPaths {
    /// Creates paths rooted at explicit directories.
    #[must_use]
    pub fn new(config_dir: impl Into<PathBuf>, docker_config_dir: impl AsRef<Path>) -> Self {
        Self {
            config_dir: config_dir.into(),
            docker_config: docker_config_dir.as_ref().join(CONFIG_FILE),
        }
    }

    /// Discovers locations from the environment.
    ///
    /// The tool directory is `$ATTEST_CONFIG_DIR` or `<config dir>/attest`;
    /// the docker file is `$DOCKER_CONFIG/config.json` or
    /// `~/.docker/config.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither an override nor a home directory exists.
    pub fn discover() -> Result<Self, RegistryError> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::config_dir()
                .ok_or_else(|| RegistryError::Config {
                    path: PathBuf::from(CONFIG_FILE),
                    reason: "cannot determine the user configuration directory".to_string(),
                })?
                .join("attest"),
        };

        let docker_dir = match std::env::var_os(DOCKER_CONFIG_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::home_dir()
                .ok_or_else(|| RegistryError::Config {
                    path: PathBuf::from(CONFIG_FILE),
                    reason: "cannot determine the home directory".to_string(),
                })?
                .join(".docker"),
        };

        Ok(Self::new(config_dir, docker_dir))
    }

    /// Returns the path of the tool's `config.json`.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Returns the path of the tool's credential file.
    #[must_use]
    pub fn credentials_file(&self) -> PathBuf {
        self.config_dir.join(CREDENTIALS_FILE)
    }
}

/// Contents of the tool's `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    /// Registries that may be contacted over plain HTTP.
    #[serde(default)]
    pub insecure_registries: Vec<String>,
}

impl ToolConfig {
    /// Loads the configuration file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Config`] if the file exists but cannot be read
    /// or parsed.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(RegistryError::Config {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };

        serde_json::from_str(&contents).map_err(|e| RegistryError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Returns the insecure-registry allowlist.
    #[must_use]
    pub fn insecure_allowlist(&self) -> InsecureAllowlist {
        InsecureAllowlist::from_entries(&self.insecure_registries)
    }
}

/// Per-command secure options: explicit credentials and transport flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecureOptions {
    /// Explicit username.
    pub username: Option<String>,

    /// Explicit password, or a refresh token when no username is given.
    pub password: Option<String>,

    /// Force plain HTTP.
    pub plain_http: bool,

    /// Log HTTP requests and responses.
    pub debug: bool,
}

impl SecureOptions {
    /// Creates options with no explicit credentials.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets explicit credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: Option<impl Into<String>>,
        password: Option<impl Into<String>>,
    ) -> Self {
        self.username = username.map(Into::into);
        self.password = password.map(Into::into);
        self
    }

    /// Forces plain HTTP.
    #[must_use]
    pub const fn with_plain_http(mut self, plain_http: bool) -> Self {
        self.plain_http = plain_http;
        self
    }

    /// Enables HTTP diagnostics.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Configuration for the HTTP layer of the registry client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout.
    pub timeout: Duration,

    /// User agent string.
    pub user_agent: String,

    /// Maximum number of redirects followed per request.
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfig {
    /// Creates a configuration with default settings.
    ///
    /// # Examples
    ///
    /// ```
    /// use attest_registry::ClientConfig;
    ///
    /// let config = ClientConfig::new();
    /// assert!(config.user_agent.starts_with("attest/"));
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("{CLIENT_ID}/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 10,
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum number of redirects.
    #[must_use]
    pub const fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }
}
