//! Login command implementation.
//!
//! Verifies a credential against a registry and saves it in the session's
//! credential store.

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use super::session::Session;
use super::SecureFlags;

/// Arguments for the login command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Registry host, e.g. `registry.example.com` or `localhost:5000`
    pub server: String,

    #[command(flatten)]
    pub secure: SecureFlags,
}

/// Runs the login command.
///
/// # Errors
///
/// Returns an error if:
/// - No password or identity token was given
/// - The registry rejects the credential
/// - The credential store refuses the write
pub async fn run(args: &LoginArgs, debug: bool) -> Result<()> {
    if !matches!(args.secure.password.as_deref(), Some(p) if !p.is_empty()) {
        anyhow::bail!("A password or identity token is required (--password or ATTEST_PASSWORD)");
    }

    let session = Session::open(args.secure.options(debug), args.secure.client_config())?;
    let client = session
        .factory
        .build_for_host(&args.server, &session.policy, &session.resolver, debug)
        .context("Failed to create registry client")?;

    info!(
        host = %client.host(),
        security = %client.security(),
        credential = client.credential().kind(),
        "Logging in"
    );
    if client.security().is_plain_http() {
        warn!(host = %client.host(), "Sending credentials over an unencrypted connection");
    }
    client
        .ping()
        .await
        .with_context(|| format!("Login to {} failed", client.host()))?;

    let store = session.selected.store();
    store
        .put(client.host(), client.credential())
        .with_context(|| format!("Failed to save credentials for {}", client.host()))?;

    if session.selected.is_fallback() {
        println!(
            "Credentials stored unencrypted in {}",
            store.descriptor().location.display()
        );
    }
    println!("Login Succeeded");
    Ok(())
}
