//! Authenticated registry clients.
//!
//! [`AuthenticatedClientFactory`] turns a reference string into a
//! [`RegistryClient`] bound to the reference's registry host: the connection
//! security is decided, the credential is resolved, and both are fixed for
//! the lifetime of the client.
//!
//! Credentials are only ever attached to requests for the bound host. The
//! client does not follow redirects itself; redirect targets are fetched
//! through [`follow_redirects`], which has no access to the credential.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, COOKIE, LOCATION, PROXY_AUTHORIZATION,
    WWW_AUTHENTICATE,
};
use reqwest::{Method, Response, StatusCode};
use url::Url;

use crate::auth::{self, BoundCredential};
use crate::config::{ClientConfig, SecureOptions};
use crate::credential::Credential;
use crate::error::RegistryError;
use crate::reference::{Reference, RegistryHost};
use crate::resolver::CredentialResolver;
use crate::security::{ConnectionSecurityPolicy, SecurityDecision};
use crate::trace::Transport;

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, \
    application/vnd.oci.image.index.v1+json, \
    application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.docker.distribution.manifest.list.v2+json";

/// Builds registry clients with resolved credentials and a security decision.
#[derive(Clone, Default)]
pub struct AuthenticatedClientFactory {
    config: ClientConfig,
    username: Option<String>,
    password: Option<String>,
}

impl AuthenticatedClientFactory {
    /// Creates a factory with no explicit credentials.
    #[must_use]
    pub const fn new(config: ClientConfig) -> Self {
        Self {
            config,
            username: None,
            password: None,
        }
    }

    /// Creates a factory from command options.
    #[must_use]
    pub fn from_options(config: ClientConfig, options: &SecureOptions) -> Self {
        Self::new(config).with_credentials(options.username.clone(), options.password.clone())
    }

    /// Sets explicit credentials, which take precedence over any store.
    #[must_use]
    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    /// Returns the HTTP configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Builds a client for the registry named in `reference`.
    ///
    /// The reference is validated before any store or network access.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] for a malformed reference,
    /// [`RegistryError::Store`] if the credential store fails, or
    /// [`RegistryError::ConnectionFailed`] if the HTTP client cannot be built.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use attest_registry::{
    ///     AuthenticatedClientFactory, ClientConfig, ConnectionSecurityPolicy, CredentialCache,
    ///     CredentialResolver, FileStore, InsecureAllowlist, SecurityDecision,
    /// };
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = FileStore::open(dir.path().join("credentials.json"), true).unwrap();
    /// let resolver = CredentialResolver::new(Arc::new(store), CredentialCache::new());
    /// let policy = ConnectionSecurityPolicy::new(false, InsecureAllowlist::new());
    ///
    /// let factory = AuthenticatedClientFactory::new(ClientConfig::new());
    /// let client = factory
    ///     .build("localhost:5000/net-monitor:v1", &policy, &resolver, false)
    ///     .unwrap();
    /// assert_eq!(client.security(), SecurityDecision::PlainHttp);
    /// assert_eq!(client.base_url().as_str(), "http://localhost:5000/");
    /// ```
    pub fn build(
        &self,
        reference: &str,
        policy: &ConnectionSecurityPolicy,
        resolver: &CredentialResolver,
        diagnostics: bool,
    ) -> Result<RegistryClient, RegistryError> {
        let reference = Reference::parse(reference)?;
        let host = reference.registry().clone();
        self.build_client(host, Some(reference), policy, resolver, diagnostics)
    }

    /// Builds a client for a registry host with no repository.
    ///
    /// # Errors
    ///
    /// Same as [`Self::build`], with an invalid host reported as
    /// [`RegistryError::InvalidReference`].
    pub fn build_for_host(
        &self,
        host: &str,
        policy: &ConnectionSecurityPolicy,
        resolver: &CredentialResolver,
        diagnostics: bool,
    ) -> Result<RegistryClient, RegistryError> {
        let host = RegistryHost::parse(host)?;
        self.build_client(host, None, policy, resolver, diagnostics)
    }

    fn build_client(
        &self,
        host: RegistryHost,
        reference: Option<Reference>,
        policy: &ConnectionSecurityPolicy,
        resolver: &CredentialResolver,
        diagnostics: bool,
    ) -> Result<RegistryClient, RegistryError> {
        let security = policy.decide(&host);
        let credential = resolver.resolve(
            &host,
            self.username.as_deref(),
            self.password.as_deref(),
        )?;

        let base = format!("{}://{host}/", security.scheme());
        let base_url = Url::parse(&base).map_err(|_| RegistryError::InvalidUrl { url: base })?;

        let http = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .user_agent(&self.config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| RegistryError::ConnectionFailed {
                url: base_url.to_string(),
                source: e,
            })?;

        tracing::debug!(
            %host,
            %security,
            credential = credential.kind(),
            diagnostics,
            "Built registry client"
        );

        Ok(RegistryClient {
            reference,
            security,
            base_url,
            session: Arc::new(Session {
                bound: BoundCredential::new(host, credential),
                transport: Transport::new(http, diagnostics),
                authorization: Mutex::new(None),
                max_redirects: self.config.max_redirects,
            }),
        })
    }
}

impl fmt::Debug for AuthenticatedClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedClientFactory")
            .field("config", &self.config)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "*****"))
            .finish()
    }
}

struct Session {
    bound: BoundCredential,
    transport: Transport,
    authorization: Mutex<Option<HeaderValue>>,
    max_redirects: usize,
}

/// HTTP client for one registry host.
#[derive(Clone)]
pub struct RegistryClient {
    reference: Option<Reference>,
    security: SecurityDecision,
    base_url: Url,
    session: Arc<Session>,
}

impl RegistryClient {
    /// Returns the reference this client was built for, if any.
    #[must_use]
    pub const fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    /// Returns the bound registry host.
    #[must_use]
    pub fn host(&self) -> &RegistryHost {
        self.session.bound.host()
    }

    /// Returns the connection security decision.
    #[must_use]
    pub const fn security(&self) -> SecurityDecision {
        self.security
    }

    /// Returns the registry base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the resolved credential.
    #[must_use]
    pub fn credential(&self) -> &Credential {
        self.session.bound.credential()
    }

    /// Returns true if HTTP diagnostics are enabled.
    #[must_use]
    pub fn diagnostics(&self) -> bool {
        self.session.transport.diagnostics()
    }

    /// Builds a URL on the bound host. `path` must be absolute and may carry
    /// a query string; it can never change the host.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidUrl`] if `path` is not absolute.
    pub fn url(&self, path: &str) -> Result<Url, RegistryError> {
        if !path.starts_with('/') {
            return Err(RegistryError::InvalidUrl {
                url: path.to_string(),
            });
        }
        let (path, query) = path
            .split_once('?')
            .map_or((path, None), |(p, q)| (p, Some(q)));

        let mut url = self.base_url.clone();
        url.set_path(path);
        url.set_query(query);
        Ok(url)
    }

    /// Checks that the registry is reachable and accepts the credential.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AuthenticationFailed`] if the registry still
    /// answers `401` after authentication, or [`RegistryError::HttpError`]
    /// for any other unsuccessful status.
    pub async fn ping(&self) -> Result<(), RegistryError> {
        let response = self.get("/v2/").await?;
        let status = response.status();

        if status.is_success() {
            tracing::debug!(host = %self.host(), "Registry reachable");
            return Ok(());
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(RegistryError::AuthenticationFailed {
                message: format!(
                    "registry {} rejected the {} credential",
                    self.host(),
                    self.credential().kind()
                ),
            });
        }
        Err(RegistryError::HttpError {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }

    /// Checks whether the referenced manifest exists.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] if the client was built
    /// without a reference or the reference names no tag or digest.
    pub async fn manifest_exists(&self) -> Result<bool, RegistryError> {
        let reference = self
            .reference
            .as_ref()
            .ok_or_else(|| RegistryError::invalid_reference(self.host().as_str(), "no repository"))?;
        let object = reference
            .object()
            .ok_or_else(|| RegistryError::invalid_reference(reference.to_string(), "no tag or digest"))?;

        let path = format!("/v2/{}/manifests/{object}", reference.repository());
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(MANIFEST_ACCEPT));

        let response = self.send(Method::HEAD, &path, headers, None).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(RegistryError::HttpError {
                status: status.as_u16(),
                message: format!("HEAD {path}"),
            }),
        }
    }

    /// Sends a `GET` request.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn get(&self, path: &str) -> Result<Response, RegistryError> {
        self.send(Method::GET, path, HeaderMap::new(), None).await
    }

    /// Sends a request to the bound host.
    ///
    /// A `401` challenge is answered once with the bound credential. A
    /// redirect response is followed without any credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent, the token exchange
    /// fails, or too many redirects occur.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<Response, RegistryError> {
        let url = self.url(path)?;
        let response = self
            .send_authorized(method.clone(), url, &headers, body.clone())
            .await?;
        follow_redirects(
            &self.session.transport,
            response,
            method,
            headers,
            body,
            self.session.max_redirects,
        )
        .await
    }

    async fn send_authorized(
        &self,
        method: Method,
        url: Url,
        headers: &HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<Response, RegistryError> {
        let session = &self.session;
        let sent = session.authorization.lock().clone();

        let response = session
            .execute(method.clone(), url.clone(), headers, body.clone(), sent.clone())
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(challenge) = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(auth::parse_challenge)
        else {
            return Ok(response);
        };

        let Some(authorization) =
            auth::authorize(&session.transport, &session.bound, &challenge).await?
        else {
            return Ok(response);
        };
        if sent.as_ref() == Some(&authorization) {
            return Ok(response);
        }

        let retried = session
            .execute(method, url, headers, body, Some(authorization.clone()))
            .await?;
        if retried.status() != StatusCode::UNAUTHORIZED {
            *session.authorization.lock() = Some(authorization);
        }
        Ok(retried)
    }
}

impl Session {
    async fn execute(
        &self,
        method: Method,
        url: Url,
        headers: &HeaderMap,
        body: Option<Vec<u8>>,
        authorization: Option<HeaderValue>,
    ) -> Result<Response, RegistryError> {
        let mut builder = self
            .transport
            .client()
            .request(method, url)
            .headers(headers.clone());
        if let Some(authorization) = authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        Ok(self.transport.execute(builder.build()?).await?)
    }
}

impl fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryClient")
            .field("host", self.host())
            .field("reference", &self.reference)
            .field("security", &self.security)
            .field("credential", self.credential())
            .finish_non_exhaustive()
    }
}

/// Follows redirect responses with requests that carry no credential.
async fn follow_redirects(
    transport: &Transport,
    mut response: Response,
    mut method: Method,
    mut headers: HeaderMap,
    mut body: Option<Vec<u8>>,
    max_redirects: usize,
) -> Result<Response, RegistryError> {
    headers.remove(AUTHORIZATION);
    headers.remove(PROXY_AUTHORIZATION);
    headers.remove(COOKIE);

    for _ in 0..max_redirects {
        let status = response.status();
        if !status.is_redirection() {
            return Ok(response);
        }
        let Some(location) = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
        else {
            return Ok(response);
        };
        let target = response
            .url()
            .join(location)
            .map_err(|_| RegistryError::InvalidUrl {
                url: location.to_string(),
            })?;

        if status == StatusCode::SEE_OTHER
            || (matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND)
                && method == Method::POST)
        {
            method = Method::GET;
            body = None;
        }

        tracing::debug!(from = %response.url(), to = %target, %status, "Following redirect without credentials");

        let mut builder = transport
            .client()
            .request(method.clone(), target)
            .headers(headers.clone());
        if let Some(body) = &body {
            builder = builder.body(body.clone());
        }
        response = transport.execute(builder.build()?).await?;
    }

    if response.status().is_redirection() && response.headers().contains_key(LOCATION) {
        return Err(RegistryError::HttpError {
            status: response.status().as_u16(),
            message: format!("more than {max_redirects} redirects"),
        });
    }
    Ok(response)
}
