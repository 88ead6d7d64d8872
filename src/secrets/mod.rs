//! Secret access for the provisioning run.
//!
//! The orchestrator never sees raw credentials up front: linked-service
//! builders ask the [`SecretStore`] for named secrets just-in-time while the
//! payloads are assembled. The one production implementation,
//! [`KeyVaultClient`], talks to the vault's HTTPS API with a bearer token
//! obtained from the credential path resolved at startup.
//!
//! # Security Considerations
//!
//! - Secret values are [`SecretString`]s: redacted in Debug/Display and
//!   serialization, zeroed on drop
//! - Implementations MUST NOT log or persist secret values
//! - Only secret *names* appear in tracing events

pub mod keyvault;
pub mod types;

pub use keyvault::KeyVaultClient;
pub use types::SecretString;

use async_trait::async_trait;

use crate::errors::Result;

/// Named secret lookup bound to an authenticated session.
///
/// # Errors
///
/// - [`Error::SecretNotFound`](crate::Error::SecretNotFound) if the name does not exist
/// - [`Error::Authentication`](crate::Error::Authentication) if the bound credential is no longer valid
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Retrieve a secret value by name.
    async fn get_secret(&self, name: &str) -> Result<SecretString>;
}
