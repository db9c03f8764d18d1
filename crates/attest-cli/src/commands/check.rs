//! Check command implementation.
//!
//! Builds an authenticated client for a reference and reports what was
//! decided: transport security, credential kind, and store.

use anyhow::{Context, Result};
use clap::Args;

use attest_registry::RegistryClient;

use super::session::Session;
use super::SecureFlags;

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Artifact reference, e.g. `registry.example.com/app:v1`
    pub reference: String,

    #[command(flatten)]
    pub secure: SecureFlags,
}

/// Runs the check command.
///
/// # Errors
///
/// Returns an error if the reference is invalid, the store fails, or the
/// registry cannot be reached with the resolved credential.
pub async fn run(args: &CheckArgs, debug: bool) -> Result<()> {
    let session = Session::open(args.secure.options(debug), args.secure.client_config())?;
    let client = session
        .factory
        .build(
            &args.reference,
            &session.policy,
            &session.resolver,
            session.options.debug,
        )
        .context("Failed to create registry client")?;

    println!("Attest Registry Check");
    println!("=====================");
    println!();
    print_summary(&client, &session);

    print!("Connecting to registry... ");
    client
        .ping()
        .await
        .with_context(|| format!("Failed to reach {}", client.host()))?;
    println!("✓");

    if client.reference().and_then(|r| r.object()).is_some() {
        print!("Checking manifest... ");
        if client.manifest_exists().await? {
            println!("✓");
        } else {
            println!("✗");
            anyhow::bail!("Manifest not found: {}", args.reference);
        }
    }

    Ok(())
}

fn print_summary(client: &RegistryClient, session: &Session) {
    let store = if session.selected.is_fallback() {
        format!("{} (fallback)", session.selected.kind())
    } else {
        session.selected.kind().to_string()
    };

    println!("  Registry:   {}", client.host());
    if client.security().is_plain_http() {
        println!("  Security:   {} (unencrypted)", client.security());
    } else {
        println!("  Security:   {}", client.security());
    }
    println!("  Credential: {}", client.credential().kind());
    println!("  Store:      {store}");
    println!();
}
