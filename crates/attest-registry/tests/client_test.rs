//! Integration tests for authenticated registry clients.
//!
//! Each test starts throwaway registries on `127.0.0.1:0` and talks to them
//! over plain HTTP.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use attest_registry::{
    AuthenticatedClientFactory, ClientConfig, ConnectionSecurityPolicy, CredentialCache,
    CredentialResolver, FileStore, InsecureAllowlist, RegistryClient, RegistryError,
};
use axum::extract::{Form, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tempfile::TempDir;
use tokio::net::TcpListener;

const TOKEN: &str = "good-token";
const SCOPE: &str = "repository:app:pull";
// u:p
const BASIC: &str = "Basic dTpw";

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

fn serve(listener: TcpListener, router: Router) {
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn unauthorized(challenge: String) -> Response {
    (StatusCode::UNAUTHORIZED, [(header::WWW_AUTHENTICATE, challenge)]).into_response()
}

struct BearerRegistry {
    addr: SocketAddr,
    token_requests: AtomicUsize,
}

async fn bearer_v2(State(state): State<Arc<BearerRegistry>>, headers: HeaderMap) -> Response {
    if authorization(&headers).as_deref() == Some(format!("Bearer {TOKEN}").as_str()) {
        return StatusCode::OK.into_response();
    }
    unauthorized(format!(
        r#"Bearer realm="http://{}/token",service="test-registry",scope="{SCOPE}""#,
        state.addr
    ))
}

async fn token_get(
    State(state): State<Arc<BearerRegistry>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.token_requests.fetch_add(1, Ordering::SeqCst);
    let scoped = params.get("service").map(String::as_str) == Some("test-registry")
        && params.get("scope").map(String::as_str) == Some(SCOPE);
    if scoped && authorization(&headers).as_deref() == Some(BASIC) {
        return Json(serde_json::json!({ "token": TOKEN })).into_response();
    }
    StatusCode::UNAUTHORIZED.into_response()
}

async fn token_post(
    State(state): State<Arc<BearerRegistry>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_requests.fetch_add(1, Ordering::SeqCst);
    let field = |name: &str| form.get(name).map(String::as_str);
    if field("grant_type") == Some("refresh_token")
        && field("refresh_token") == Some("refresh-me")
        && field("client_id") == Some("attest")
        && field("service") == Some("test-registry")
        && field("scope") == Some(SCOPE)
    {
        return Json(serde_json::json!({ "access_token": TOKEN })).into_response();
    }
    StatusCode::UNAUTHORIZED.into_response()
}

async fn start_bearer_registry() -> Arc<BearerRegistry> {
    let (listener, addr) = bind().await;
    let state = Arc::new(BearerRegistry {
        addr,
        token_requests: AtomicUsize::new(0),
    });
    let router = Router::new()
        .route("/v2/", get(bearer_v2))
        .route("/token", get(token_get).post(token_post))
        .with_state(state.clone());
    serve(listener, router);
    state
}

async fn basic_v2(headers: HeaderMap) -> Response {
    if authorization(&headers).as_deref() == Some(BASIC) {
        return StatusCode::OK.into_response();
    }
    unauthorized(r#"Basic realm="test""#.to_string())
}

async fn start_basic_registry() -> SocketAddr {
    let (listener, addr) = bind().await;
    serve(listener, Router::new().route("/v2/", get(basic_v2)));
    addr
}

fn client(
    reference: &str,
    username: Option<&str>,
    password: Option<&str>,
    diagnostics: bool,
) -> (TempDir, RegistryClient) {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path().join("credentials.json"), true).unwrap();
    let resolver = CredentialResolver::new(Arc::new(store), CredentialCache::new());
    let policy = ConnectionSecurityPolicy::new(true, InsecureAllowlist::new());

    let client = AuthenticatedClientFactory::new(ClientConfig::new())
        .with_credentials(username.map(Into::into), password.map(Into::into))
        .build(reference, &policy, &resolver, diagnostics)
        .unwrap();
    (dir, client)
}

#[tokio::test]
async fn test_bearer_challenge_with_basic_credential() {
    let registry = start_bearer_registry().await;
    let (_dir, client) = client(&format!("{}/app:v1", registry.addr), Some("u"), Some("p"), false);

    client.ping().await.unwrap();
    client.ping().await.unwrap();

    // The second ping reuses the token.
    assert_eq!(registry.token_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bearer_challenge_with_refresh_token() {
    let registry = start_bearer_registry().await;
    let (_dir, client) = client(&format!("{}/app:v1", registry.addr), None, Some("refresh-me"), false);

    client.ping().await.unwrap();
    assert_eq!(registry.token_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bearer_challenge_rejects_wrong_credential() {
    let registry = start_bearer_registry().await;
    let (_dir, client) = client(&format!("{}/app:v1", registry.addr), Some("u"), Some("wrong"), false);

    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, RegistryError::AuthenticationFailed { .. }));
}

#[tokio::test]
async fn test_basic_challenge() {
    let addr = start_basic_registry().await;

    let (_dir, good) = client(&format!("{addr}/app:v1"), Some("u"), Some("p"), false);
    good.ping().await.unwrap();

    let (_dir, anonymous) = client(&format!("{addr}/app:v1"), None, None, false);
    let err = anonymous.ping().await.unwrap_err();
    assert!(matches!(err, RegistryError::AuthenticationFailed { .. }));
}

#[derive(Default)]
struct Storage {
    seen: Mutex<Vec<Option<String>>>,
}

#[tokio::test]
async fn test_redirect_to_other_host_carries_no_credential() {
    let (storage_listener, storage_addr) = bind().await;
    let storage = Arc::new(Storage::default());
    serve(
        storage_listener,
        Router::new()
            .route(
                "/storage/blob",
                get(
                    |State(storage): State<Arc<Storage>>, headers: HeaderMap| async move {
                        storage.seen.lock().unwrap().push(authorization(&headers));
                        "blob-content"
                    },
                ),
            )
            .with_state(storage.clone()),
    );

    let (registry_listener, registry_addr) = bind().await;
    let location = format!("http://{storage_addr}/storage/blob");
    serve(
        registry_listener,
        Router::new().route(
            "/v2/app/blobs/download",
            get(move |headers: HeaderMap| {
                let location = location.clone();
                async move {
                    if authorization(&headers).as_deref() != Some(BASIC) {
                        return unauthorized(r#"Basic realm="test""#.to_string());
                    }
                    (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location)])
                        .into_response()
                }
            }),
        ),
    );

    let (_dir, client) = client(&format!("{registry_addr}/app:v1"), Some("u"), Some("p"), false);
    let response = client.get("/v2/app/blobs/download").await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "blob-content");
    assert_eq!(*storage.seen.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn test_redirect_loop_is_bounded() {
    let (listener, addr) = bind().await;
    serve(
        listener,
        Router::new().route(
            "/v2/loop",
            get(|| async { (StatusCode::FOUND, [(header::LOCATION, "/v2/loop")]) }),
        ),
    );

    let (_dir, client) = client(&format!("{addr}/app:v1"), None, None, false);
    let err = client.get("/v2/loop").await.unwrap_err();
    assert!(matches!(err, RegistryError::HttpError { .. }));
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn test_diagnostics_redact_authorization() {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(buffer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let registry = start_bearer_registry().await;
    let (_dir, client) = client(&format!("{}/app:v1", registry.addr), Some("u"), Some("p"), true);
    client.ping().await.unwrap();

    let logs = buffer.contents();
    assert!(logs.contains("/v2/"));
    assert!(logs.contains("authorization: *****"));
    assert!(!logs.contains("dTpw"));
    assert!(!logs.contains(TOKEN));
}

#[tokio::test]
async fn test_diagnostics_disabled_logs_no_requests() {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(buffer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let addr = start_basic_registry().await;
    let (_dir, client) = client(&format!("{addr}/app:v1"), Some("u"), Some("p"), false);
    client.ping().await.unwrap();

    assert!(!buffer.contents().contains("attest::http"));
}
