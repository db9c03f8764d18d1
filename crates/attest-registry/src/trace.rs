//! Diagnostic HTTP transport.
//!
//! With diagnostics enabled every request and response is logged at `debug`
//! under the `attest::http` target. Values of credential-bearing headers are
//! replaced before they reach the log.

use reqwest::header::{
    HeaderMap, HeaderName, AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION, SET_COOKIE,
};
use reqwest::{Request, Response};

const REDACTED: &str = "*****";

fn is_sensitive(name: &HeaderName) -> bool {
    [AUTHORIZATION, PROXY_AUTHORIZATION, COOKIE, SET_COOKIE].contains(name)
}

/// Renders headers for logging with sensitive values redacted.
pub(crate) fn format_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            if is_sensitive(name) {
                format!("{name}: {REDACTED}")
            } else {
                format!("{name}: {}", String::from_utf8_lossy(value.as_bytes()))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// HTTP transport with optional request/response logging.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    http: reqwest::Client,
    diagnostics: bool,
}

impl Transport {
    pub(crate) const fn new(http: reqwest::Client, diagnostics: bool) -> Self {
        Self { http, diagnostics }
    }

    pub(crate) const fn client(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) const fn diagnostics(&self) -> bool {
        self.diagnostics
    }

    pub(crate) async fn execute(&self, request: Request) -> reqwest::Result<Response> {
        if !self.diagnostics {
            return self.http.execute(request).await;
        }

        tracing::debug!(
            target: "attest::http",
            method = %request.method(),
            url = %request.url(),
            headers = %format_headers(request.headers()),
            "Request"
        );

        let result = self.http.execute(request).await;
        match &result {
            Ok(response) => tracing::debug!(
                target: "attest::http",
                status = %response.status(),
                url = %response.url(),
                headers = %format_headers(response.headers()),
                "Response"
            ),
            Err(e) => tracing::debug!(target: "attest::http", error = %e, "Request failed"),
        }
        result
    }
}
