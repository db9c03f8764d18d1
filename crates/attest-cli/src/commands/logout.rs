//! Logout command implementation.

use anyhow::{Context, Result};
use clap::Args;

use attest_registry::{ClientConfig, RegistryHost, SecureOptions};

use super::session::Session;

/// Arguments for the logout command.
#[derive(Args, Debug)]
pub struct LogoutArgs {
    /// Registry host to log out from
    pub server: String,
}

/// Runs the logout command.
///
/// # Errors
///
/// Returns an error if the host is invalid or the store cannot be updated.
/// A host with no stored credential is not an error.
pub fn run(args: &LogoutArgs) -> Result<()> {
    let host = RegistryHost::parse(&args.server)?;
    let session = Session::open(SecureOptions::new(), ClientConfig::new())?;

    match session.selected.store().delete(&host) {
        Ok(()) => println!("Removed login credentials for {host}"),
        Err(e) if e.is_not_found() => println!("Not logged in to {host}"),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to remove credentials for {host}"));
        }
    }
    Ok(())
}
