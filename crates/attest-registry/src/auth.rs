//! Registry authentication: host-bound credentials and challenge handling.
//!
//! A `401` response carries a `WWW-Authenticate` challenge:
//!
//! ```text
//! WWW-Authenticate: Bearer realm="https://auth.example.com/token",service="registry.example.com",scope="repository:app:pull"
//! ```
//!
//! For `Bearer`, the bound credential is exchanged at the realm for a token.
//! For `Basic`, a username/password credential is sent directly.

use std::collections::HashMap;

use base64::Engine;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use url::Url;

use crate::config::CLIENT_ID;
use crate::credential::Credential;
use crate::error::RegistryError;
use crate::reference::RegistryHost;
use crate::trace::Transport;

/// A credential captured together with the one host it belongs to.
///
/// There is no way to ask for this credential on behalf of another host: the
/// client that owns it only ever builds requests against `host`.
#[derive(Debug, Clone)]
pub(crate) struct BoundCredential {
    host: RegistryHost,
    credential: Credential,
}

impl BoundCredential {
    pub(crate) const fn new(host: RegistryHost, credential: Credential) -> Self {
        Self { host, credential }
    }

    pub(crate) const fn host(&self) -> &RegistryHost {
        &self.host
    }

    pub(crate) const fn credential(&self) -> &Credential {
        &self.credential
    }
}

/// An authentication challenge from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Challenge {
    Basic,
    Bearer(BearerChallenge),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BearerChallenge {
    pub(crate) realm: String,
    pub(crate) service: Option<String>,
    pub(crate) scope: Option<String>,
}

/// Parses a `WWW-Authenticate` header value.
pub(crate) fn parse_challenge(header: &str) -> Option<Challenge> {
    let header = header.trim();
    let (scheme, params) = header
        .split_once(char::is_whitespace)
        .unwrap_or((header, ""));

    if scheme.eq_ignore_ascii_case("basic") {
        return Some(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut params = parse_params(params);
    let realm = params.remove("realm").filter(|r| !r.is_empty())?;
    Some(Challenge::Bearer(BearerChallenge {
        realm,
        service: params.remove("service"),
        scope: params.remove("scope"),
    }))
}

/// `key=value` or `key="quoted, value"` pairs separated by commas.
fn parse_params(mut rest: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    loop {
        rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        let Some(eq) = rest.find('=') else {
            break;
        };
        let key = rest[..eq].trim().to_ascii_lowercase();
        rest = rest[eq + 1..].trim_start();

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            let mut value = String::new();
            let mut escaped = false;
            let mut end = None;
            for (i, c) in quoted.char_indices() {
                if escaped {
                    value.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    end = Some(i);
                    break;
                } else {
                    value.push(c);
                }
            }
            let Some(end) = end else {
                break;
            };
            rest = &quoted[end + 1..];
            value
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let value = rest[..end].trim().to_string();
            rest = &rest[end..];
            value
        };

        params.insert(key, value);
    }

    params
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// `Authorization: Basic` for a username and password.
pub(crate) fn basic_header(username: &str, password: &str) -> Result<HeaderValue, RegistryError> {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    sensitive(&format!("Basic {encoded}"))
}

/// `Authorization: Bearer` for a token.
pub(crate) fn bearer_header(token: &str) -> Result<HeaderValue, RegistryError> {
    sensitive(&format!("Bearer {token}"))
}

fn sensitive(value: &str) -> Result<HeaderValue, RegistryError> {
    let mut header =
        HeaderValue::from_str(value).map_err(|_| RegistryError::AuthenticationFailed {
            message: "credential contains characters not allowed in a header".to_string(),
        })?;
    header.set_sensitive(true);
    Ok(header)
}

/// Computes the `Authorization` header answering a challenge, if the bound
/// credential can answer it.
pub(crate) async fn authorize(
    transport: &Transport,
    bound: &BoundCredential,
    challenge: &Challenge,
) -> Result<Option<HeaderValue>, RegistryError> {
    match (challenge, bound.credential()) {
        (Challenge::Basic, Credential::Basic { username, password }) => {
            basic_header(username, password).map(Some)
        }
        (Challenge::Basic, _) => Ok(None),
        (Challenge::Bearer(bearer), credential) => {
            let token = fetch_token(transport, bound.host(), bearer, credential).await?;
            bearer_header(&token).map(Some)
        }
    }
}

/// Obtains a bearer token from the realm named in the bound host's challenge.
async fn fetch_token(
    transport: &Transport,
    host: &RegistryHost,
    challenge: &BearerChallenge,
    credential: &Credential,
) -> Result<String, RegistryError> {
    if let Credential::AccessToken(token) = credential {
        return Ok(token.clone());
    }

    let realm = Url::parse(&challenge.realm).map_err(|_| RegistryError::InvalidUrl {
        url: challenge.realm.clone(),
    })?;
    if !matches!(realm.scheme(), "http" | "https") {
        return Err(RegistryError::InvalidUrl {
            url: challenge.realm.clone(),
        });
    }

    let mut params: Vec<(&str, &str)> = Vec::new();
    if let Some(service) = &challenge.service {
        params.push(("service", service));
    }
    if let Some(scope) = &challenge.scope {
        params.push(("scope", scope));
    }

    let client = transport.client();
    let request = match credential {
        Credential::RefreshToken(token) => {
            params.push(("grant_type", "refresh_token"));
            params.push(("refresh_token", token));
            params.push(("client_id", CLIENT_ID));
            client.post(realm.clone()).form(&params)
        }
        Credential::Basic { username, password } => client
            .get(realm.clone())
            .query(&params)
            .basic_auth(username, Some(password)),
        Credential::Empty | Credential::AccessToken(_) => client.get(realm.clone()).query(&params),
    }
    .build()?;

    tracing::debug!(%host, realm = %realm, kind = credential.kind(), "Requesting registry token");
    let response = transport.execute(request).await?;

    let status = response.status();
    if !status.is_success() {
        return Err(RegistryError::AuthenticationFailed {
            message: format!("token endpoint {realm} for {host} returned {status}"),
        });
    }

    let body: TokenResponse = response.json().await?;
    body.access_token
        .or(body.token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RegistryError::AuthenticationFailed {
            message: format!("token endpoint {realm} returned no token"),
        })
}
