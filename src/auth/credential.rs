//! Credential selection and resolution.
//!
//! The resolver validates the configuration for the selected trust path,
//! performs the certificate-store scan when that path asks for one, and binds
//! the resulting token callback into an authenticated vault session. The
//! session is memoized per resolver instance: the entry point constructs one
//! resolver and hands the resolved handle to everything downstream.

use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use super::certificate::CertificateStores;
use super::token::{ClientAssertionTokenProvider, ManagedIdentityTokenProvider};
use crate::config::{Settings, VaultSettings};
use crate::errors::Result;
use crate::secrets::KeyVaultClient;

/// Which trust path a run uses, fixed at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMode {
    /// Client assertion signed by a locally-held certificate
    CertificateBased,
    /// Ambient token from the compute environment's identity provider
    ManagedIdentity,
}

impl CredentialMode {
    /// Derive the mode from the configuration flag.
    pub fn from_settings(settings: &VaultSettings) -> Self {
        if settings.use_certificate {
            Self::CertificateBased
        } else {
            Self::ManagedIdentity
        }
    }
}

impl fmt::Display for CredentialMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CertificateBased => write!(f, "certificate_based"),
            Self::ManagedIdentity => write!(f, "managed_identity"),
        }
    }
}

/// Immutable record of the credential a run resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Certificate-backed client assertion
    CertificateAssertion { client_id: String, thumbprint: String, authority: String },
    /// Ambient managed identity
    ManagedIdentity,
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CertificateAssertion { client_id, thumbprint, .. } => {
                write!(f, "certificate assertion (app {}, thumbprint {})", client_id, thumbprint)
            }
            Self::ManagedIdentity => write!(f, "managed identity"),
        }
    }
}

/// Resolves the run's credential into an authenticated vault session.
pub struct CredentialResolver {
    settings: VaultSettings,
    stores: CertificateStores,
    handle: OnceCell<Arc<KeyVaultClient>>,
}

impl CredentialResolver {
    /// Create a resolver over the default certificate-store roots.
    pub fn new(settings: VaultSettings) -> Self {
        Self { settings, stores: CertificateStores::from_env(), handle: OnceCell::new() }
    }

    /// Replace the certificate stores (tests, alternate layouts).
    pub fn with_stores(mut self, stores: CertificateStores) -> Self {
        self.stores = stores;
        self
    }

    /// The trust path this resolver will use.
    pub fn mode(&self) -> CredentialMode {
        CredentialMode::from_settings(&self.settings)
    }

    /// Resolve the credential into a vault session.
    ///
    /// Memoized: repeat calls return the identical handle without a second
    /// store scan or token exchange. Configuration is validated before
    /// anything touches the network.
    pub async fn resolve(&self) -> Result<Arc<KeyVaultClient>> {
        self.handle.get_or_try_init(|| async { self.resolve_uncached() }).await.map(Arc::clone)
    }

    fn resolve_uncached(&self) -> Result<Arc<KeyVaultClient>> {
        let settings = &self.settings;
        let mode = self.mode();

        let (credential, client) = match mode {
            CredentialMode::CertificateBased => {
                Settings::require_non_empty(&[
                    ("VaultUrl", &settings.vault_url),
                    ("ProdClientId", &settings.prod_client_id),
                    ("CertThumbprint", &settings.cert_thumbprint),
                    ("TenantId", &settings.tenant_id),
                ])?;

                let certificate = self.stores.find_by_thumbprint(&settings.cert_thumbprint)?;
                let credential = Credential::CertificateAssertion {
                    client_id: settings.prod_client_id.clone(),
                    thumbprint: certificate.thumbprint().to_string(),
                    authority: settings.authority_or_default().to_string(),
                };
                let provider = ClientAssertionTokenProvider::new(
                    settings.authority_or_default(),
                    &settings.tenant_id,
                    &settings.prod_client_id,
                    certificate,
                )?;
                (credential, KeyVaultClient::new(&settings.vault_url, Arc::new(provider))?)
            }
            CredentialMode::ManagedIdentity => {
                Settings::require_non_empty(&[("VaultUrl", &settings.vault_url)])?;

                let provider = ManagedIdentityTokenProvider::from_env()?;
                (
                    Credential::ManagedIdentity,
                    KeyVaultClient::new(&settings.vault_url, Arc::new(provider))?,
                )
            }
        };

        info!(credential = %credential, vault_url = %settings.vault_url, "Resolved credential");
        Ok(Arc::new(client))
    }
}
