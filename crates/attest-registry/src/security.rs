//! Plain HTTP vs. TLS decision per registry host.
//!
//! Evaluation order, earliest wins:
//!
//! 1. explicit `--plain-http` flag
//! 2. host listed in `insecureRegistries`
//! 3. host name is `localhost` (any port)
//! 4. otherwise TLS

use std::collections::HashSet;
use std::fmt;

use crate::reference::RegistryHost;

/// Transport security for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityDecision {
    /// Unencrypted HTTP.
    PlainHttp,
    /// HTTPS.
    Tls,
}

impl SecurityDecision {
    /// Returns the URL scheme for this decision.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::PlainHttp => "http",
            Self::Tls => "https",
        }
    }

    /// Returns true for plain HTTP.
    #[must_use]
    pub const fn is_plain_http(self) -> bool {
        matches!(self, Self::PlainHttp)
    }
}

impl fmt::Display for SecurityDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlainHttp => write!(f, "plain-http"),
            Self::Tls => write!(f, "tls"),
        }
    }
}

/// Registries configured as reachable over plain HTTP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsecureAllowlist {
    hosts: HashSet<RegistryHost>,
}

impl InsecureAllowlist {
    /// Creates an empty allowlist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an allowlist from configuration entries.
    ///
    /// Entries that are not valid hosts can never match and are skipped with
    /// a warning.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = entries
            .into_iter()
            .filter_map(|entry| {
                let entry = entry.as_ref();
                match RegistryHost::parse(entry) {
                    Ok(host) => Some(host),
                    Err(e) => {
                        tracing::warn!(entry, error = %e, "Ignoring invalid insecure registry");
                        None
                    }
                }
            })
            .collect();
        Self { hosts }
    }

    /// Adds a host.
    #[must_use]
    pub fn with_host(mut self, host: RegistryHost) -> Self {
        self.hosts.insert(host);
        self
    }

    /// Returns true if the host is listed.
    #[must_use]
    pub fn contains(&self, host: &RegistryHost) -> bool {
        self.hosts.contains(host)
    }

    /// Returns true if nothing is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Decides the transport security for a host.
///
/// # Examples
///
/// ```
/// use attest_registry::{decide, InsecureAllowlist, RegistryHost, SecurityDecision};
///
/// let allowlist = InsecureAllowlist::new();
/// let local = RegistryHost::parse("localhost:5000").unwrap();
/// let remote = RegistryHost::parse("registry.example.com").unwrap();
///
/// assert_eq!(decide(&local, false, &allowlist), SecurityDecision::PlainHttp);
/// assert_eq!(decide(&remote, false, &allowlist), SecurityDecision::Tls);
/// assert_eq!(decide(&remote, true, &allowlist), SecurityDecision::PlainHttp);
/// ```
#[must_use]
pub fn decide(
    host: &RegistryHost,
    explicit_plain_http: bool,
    allowlist: &InsecureAllowlist,
) -> SecurityDecision {
    if explicit_plain_http || allowlist.contains(host) || host.hostname() == "localhost" {
        SecurityDecision::PlainHttp
    } else {
        SecurityDecision::Tls
    }
}

/// Connection security policy for one command invocation.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSecurityPolicy {
    plain_http: bool,
    allowlist: InsecureAllowlist,
}

impl ConnectionSecurityPolicy {
    /// Creates a policy from the explicit flag and the configured allowlist.
    #[must_use]
    pub const fn new(plain_http: bool, allowlist: InsecureAllowlist) -> Self {
        Self {
            plain_http,
            allowlist,
        }
    }

    /// Decides the transport security for a host.
    #[must_use]
    pub fn decide(&self, host: &RegistryHost) -> SecurityDecision {
        let decision = decide(host, self.plain_http, &self.allowlist);
        tracing::debug!(%host, %decision, "Connection security decided");
        decision
    }
}
