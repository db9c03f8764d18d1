//! Credential material presented to a registry.

use std::fmt;

/// A credential for a single registry host.
///
/// Exactly one form is held at a time. [`Credential::Empty`] means anonymous
/// access and is a valid resolution result, not an error.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credential {
    /// No credential; requests are sent anonymously.
    #[default]
    Empty,

    /// Username and password (or username and personal access token).
    Basic {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },

    /// `OAuth2` refresh token, exchanged for access tokens at the registry's
    /// token endpoint.
    RefreshToken(String),

    /// Registry access token, sent as a bearer token.
    AccessToken(String),
}

impl Credential {
    /// Creates a username/password credential.
    ///
    /// # Examples
    ///
    /// ```
    /// use attest_registry::Credential;
    ///
    /// let cred = Credential::basic("u", "p");
    /// assert_eq!(cred.username(), Some("u"));
    /// ```
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates a refresh token credential.
    #[must_use]
    pub fn refresh_token(token: impl Into<String>) -> Self {
        Self::RefreshToken(token.into())
    }

    /// Creates an access token credential.
    #[must_use]
    pub fn access_token(token: impl Into<String>) -> Self {
        Self::AccessToken(token.into())
    }

    /// Returns true for the anonymous credential.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns the username, if this is a username/password credential.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Basic { username, .. } => Some(username),
            _ => None,
        }
    }

    /// Short name of the credential form, safe to print.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "anonymous",
            Self::Basic { .. } => "basic",
            Self::RefreshToken(_) => "refresh-token",
            Self::AccessToken(_) => "access-token",
        }
    }
}

// Secrets never reach logs through `{:?}`.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"*****")
                .finish(),
            Self::RefreshToken(_) => f.write_str("RefreshToken(*****)"),
            Self::AccessToken(_) => f.write_str("AccessToken(*****)"),
        }
    }
}
