//! Registry hosts and artifact references.
//!
//! Supported reference forms:
//! - `registry.example.com/repo` → repository without tag or digest
//! - `registry.example.com:5000/team/repo:v1` → tagged reference
//! - `localhost:5000/repo@sha256:abc...` → digest reference
//! - `[::1]:5000/repo:v1@sha256:abc...` → tag and digest (digest wins)
//!
//! The registry host is always explicit; there is no implicit default registry.

use std::fmt;
use std::str::FromStr;

use crate::error::RegistryError;

/// Stand-in registry used when checking a path against the OCI grammar.
const GRAMMAR_HOST: &str = "localhost";

/// A normalized `host[:port]` registry address.
///
/// The host name is lowercased; the port is kept verbatim. Two hosts are equal
/// only when their normalized forms are identical, so `example.com` and
/// `example.com:443` are different hosts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryHost(String);

impl RegistryHost {
    /// Parses and normalizes a registry host.
    ///
    /// # Examples
    ///
    /// ```
    /// use attest_registry::RegistryHost;
    ///
    /// let host = RegistryHost::parse("Registry.Example.com:5000").unwrap();
    /// assert_eq!(host.as_str(), "registry.example.com:5000");
    /// assert_eq!(host.hostname(), "registry.example.com");
    /// assert_eq!(host.port(), Some(5000));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] if the input is not a valid
    /// host, optionally followed by a port.
    pub fn parse(input: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: &str| RegistryError::invalid_reference(input, reason);

        if input.is_empty() {
            return Err(invalid("empty registry host"));
        }

        let (host, port) = split_host_port(input).map_err(invalid)?;

        if let Some(literal) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            let valid = literal.contains(':')
                && literal
                    .chars()
                    .all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.');
            if !valid {
                return Err(invalid("invalid IPv6 literal"));
            }
        } else if !is_valid_hostname(host) {
            return Err(invalid("invalid host name"));
        }

        if let Some(port) = port {
            let valid = !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit())
                && port.parse::<u16>().is_ok_and(|p| p != 0);
            if !valid {
                return Err(invalid("invalid port"));
            }
        }

        let mut normalized = host.to_ascii_lowercase();
        if let Some(port) = port {
            normalized.push(':');
            normalized.push_str(port);
        }
        Ok(Self(normalized))
    }

    /// Returns the normalized `host[:port]` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the address portion without the port.
    ///
    /// IPv6 literals keep their brackets.
    #[must_use]
    pub fn hostname(&self) -> &str {
        split_host_port(&self.0).map_or(self.0.as_str(), |(host, _)| host)
    }

    /// Returns true if the host cannot be mistaken for a repository path
    /// component. `localhost` and any host with a `.` or `:` qualify.
    #[must_use]
    pub fn is_explicit(&self) -> bool {
        self.0.contains(['.', ':']) || self.0 == "localhost"
    }

    /// Returns the port, if one was given.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        split_host_port(&self.0)
            .ok()
            .and_then(|(_, port)| port)
            .and_then(|p| p.parse().ok())
    }
}

impl fmt::Display for RegistryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RegistryHost {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for RegistryHost {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A parsed artifact reference: `host/repository[:tag][@digest]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    registry: RegistryHost,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl Reference {
    /// Parses an artifact reference.
    ///
    /// # Examples
    ///
    /// ```
    /// use attest_registry::Reference;
    ///
    /// let reference = Reference::parse("localhost:5000/net-monitor:v1").unwrap();
    /// assert_eq!(reference.registry().as_str(), "localhost:5000");
    /// assert_eq!(reference.repository(), "net-monitor");
    /// assert_eq!(reference.tag(), Some("v1"));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] for malformed input.
    pub fn parse(input: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: &str| RegistryError::invalid_reference(input, reason);

        let (host, path) = input
            .split_once('/')
            .ok_or_else(|| invalid("missing registry host or repository"))?;
        let registry =
            RegistryHost::parse(host).map_err(|_| invalid("invalid registry host"))?;
        if !registry.is_explicit() {
            return Err(invalid("first component is not a registry host"));
        }

        // The host is already validated and the OCI grammar has no IPv6
        // literals, so only the path is checked against it.
        let parsed = format!("{GRAMMAR_HOST}/{path}")
            .parse::<oci_client::Reference>()
            .map_err(|e| invalid(&e.to_string()))?;

        // The OCI parser may fill in a default tag.
        let name = path.split_once('@').map_or(path, |(name, _)| name);
        let tagged = name.rsplit('/').next().is_some_and(|last| last.contains(':'));

        Ok(Self {
            registry,
            repository: parsed.repository().to_string(),
            tag: parsed.tag().filter(|_| tagged).map(str::to_string),
            digest: parsed.digest().map(str::to_string),
        })
    }

    /// Returns the registry host.
    #[must_use]
    pub const fn registry(&self) -> &RegistryHost {
        &self.registry
    }

    /// Returns the repository path.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Returns the tag, if any.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Returns the digest, if any.
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Returns the digest if present, otherwise the tag.
    #[must_use]
    pub fn object(&self) -> Option<&str> {
        self.digest().or_else(|| self.tag())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl FromStr for Reference {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn split_host_port(input: &str) -> Result<(&str, Option<&str>), &'static str> {
    if input.starts_with('[') {
        let end = input.find(']').ok_or("unterminated IPv6 literal")?;
        let (host, rest) = input.split_at(end + 1);
        if rest.is_empty() {
            return Ok((host, None));
        }
        let port = rest.strip_prefix(':').ok_or("unexpected characters after IPv6 literal")?;
        return Ok((host, Some(port)));
    }

    match input.split_once(':') {
        Some((host, port)) if !port.contains(':') => Ok((host, Some(port))),
        Some(_) => Err("IPv6 addresses must be enclosed in brackets"),
        None => Ok((input, None)),
    }
}

fn is_valid_hostname(host: &str) -> bool {
    !host.is_empty()
        && host.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}
