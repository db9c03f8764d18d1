//! # Attest Registry
//!
//! Credential resolution and authenticated registry clients for the `attest`
//! signing tool.
//!
//! This crate decides, for each registry a command talks to, which
//! credential to present and whether the connection uses TLS, and builds an
//! HTTP client that only ever sends that credential to that registry.
//!
//! ## Features
//!
//! - **Credential Stores**: tool-owned file, Docker `config.json`, and OS-native
//!   credential helpers behind one [`CredentialStore`] trait
//! - **Store Selection**: first configured store wins, with a writable fallback
//! - **Connection Security**: plain HTTP only when asked for, allowlisted, or `localhost`
//! - **Host-Bound Clients**: credentials never follow redirects to other hosts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use attest_registry::{
//!     AuthenticatedClientFactory, ClientConfig, ConfigPaths, ConnectionSecurityPolicy,
//!     CredentialCache, CredentialResolver, StoreChain, ToolConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let paths = ConfigPaths::discover()?;
//!     let config = ToolConfig::load(&paths.config_file())?;
//!
//!     let selected = StoreChain::discover(&paths).select()?;
//!     let resolver = CredentialResolver::new(selected.store(), CredentialCache::new());
//!     let policy = ConnectionSecurityPolicy::new(false, config.insecure_allowlist());
//!
//!     let client = AuthenticatedClientFactory::new(ClientConfig::new())
//!         .build("registry.example.com/net-monitor:v1", &policy, &resolver, false)?;
//!     client.ping().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               AuthenticatedClientFactory                    │
//! │  ┌─────────────────┐  ┌────────────────────┐  ┌──────────┐  │
//! │  │ SecurityPolicy  │  │ CredentialResolver │  │  Cache   │  │
//! │  │ (TLS / HTTP)    │  │ (explicit → store) │  │ (host)   │  │
//! │  └─────────────────┘  └────────────────────┘  └──────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!            │                       │
//!            ▼                       ▼
//! ┌──────────────────────┐  ┌───────────────────────────────────┐
//! │   RegistryClient     │  │           StoreChain              │
//! │ (bound to one host)  │  │   file → docker → native helper   │
//! └──────────────────────┘  └───────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod auth;
mod cache;
mod client;
mod config;
mod credential;
mod error;
mod reference;
mod resolver;
mod security;
mod store;
mod trace;

pub use cache::CredentialCache;
pub use client::{AuthenticatedClientFactory, RegistryClient};
pub use config::{ClientConfig, ConfigPaths, SecureOptions, ToolConfig};
pub use credential::Credential;
pub use error::{RegistryError, StoreError};
pub use reference::{Reference, RegistryHost};
pub use resolver::CredentialResolver;
pub use security::{decide, ConnectionSecurityPolicy, InsecureAllowlist, SecurityDecision};
pub use store::{
    CredentialStore, CredentialStoreDescriptor, DockerProbe, DockerStore, FileProbe, FileStore,
    NativeProbe, NativeStore, SelectedStore, StoreChain, StoreKind, StoreProbe,
};
