//! # Datafab
//!
//! Datafab provisions a cloud data-integration workspace: it creates a
//! factory resource, attaches linked-service connections (database, CRM,
//! secret vault), registers datasets against those connections, and wires a
//! copy pipeline between two datasets.
//!
//! ## Architecture
//!
//! ```text
//! CLI entry point → CredentialResolver → SecretStore (vault session)
//!                        ↓                      ↓
//!               ProvisioningOrchestrator ← BuilderRegistry
//!                        ↓
//!                  ResourceClient (management API)
//! ```
//!
//! ## Core Components
//!
//! - **CredentialResolver** ([`auth`]): selects one of two trust paths,
//!   certificate-signed client assertion or ambient managed identity, and
//!   binds it into a memoized, authenticated vault session
//! - **SecretStore** ([`secrets`]): named secret lookup, values redacted and
//!   zeroed
//! - **ProvisioningOrchestrator** ([`orchestrator`]): dependency-ordered,
//!   idempotent upserts with a bounded wait on the factory's provisioning
//!   state
//! - **ResourceClient** ([`factory`]): typed payloads and the management-API
//!   client behind a mockable trait

pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod factory;
pub mod orchestrator;
pub mod secrets;

// Re-export commonly used types
pub use config::Settings;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
