//! CLI commands and argument parsing.

pub mod check;
pub mod login;
pub mod logout;
pub mod session;

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use attest_registry::{ClientConfig, SecureOptions};

/// Attest - registry credentials for artifact signing
#[derive(Parser)]
#[command(name = "attest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging, including HTTP requests and responses
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Log in to a registry and store the credential
    Login(login::LoginArgs),

    /// Remove the stored credential for a registry
    Logout(logout::LogoutArgs),

    /// Check connectivity and credentials for a reference
    Check(check::CheckArgs),

    /// Print version information
    Version,
}

/// Flags shared by every command that talks to a registry.
#[derive(Args, Debug, Clone)]
pub struct SecureFlags {
    /// Username for registry operations
    #[arg(short, long, env = "ATTEST_USERNAME")]
    pub username: Option<String>,

    /// Password or identity token for registry operations
    #[arg(short, long, env = "ATTEST_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Use plain HTTP connections instead of HTTPS
    #[arg(long)]
    pub plain_http: bool,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,
}

impl SecureFlags {
    /// Converts the flags into library options.
    pub fn options(&self, debug: bool) -> SecureOptions {
        SecureOptions::new()
            .with_credentials(self.username.clone(), self.password.clone())
            .with_plain_http(self.plain_http)
            .with_debug(debug)
    }

    /// Builds the HTTP client settings.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new().with_timeout(Duration::from_secs(self.timeout))
    }
}
