//! Key-vault secrets backend.
//!
//! Fetches secrets by name over the vault's HTTPS API. The bearer token is
//! obtained from the bound [`TokenProvider`] on every request, so token
//! refresh stays the provider's concern and a long run never holds a stale
//! token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::types::SecretString;
use super::SecretStore;
use crate::auth::TokenProvider;
use crate::errors::{Error, Result};

/// Token resource identifier for the vault data plane.
pub const VAULT_RESOURCE: &str = "https://vault.azure.net";

/// Vault secrets API version.
const API_VERSION: &str = "7.4";

/// Wire form of a fetched secret. Only the value is of interest here.
#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: SecretString,
}

/// Authenticated vault session scoped to one vault address.
pub struct KeyVaultClient {
    http: Client,
    vault_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl KeyVaultClient {
    /// Create a client bound to a vault address and a token provider.
    pub fn new(vault_url: &str, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        if vault_url.is_empty() {
            return Err(Error::config("vault URL must not be empty"));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, vault_url: vault_url.trim_end_matches('/').to_string(), tokens })
    }

    /// The vault address this client is bound to.
    pub fn vault_url(&self) -> &str {
        &self.vault_url
    }

    /// The token provider backing this session.
    pub fn token_provider(&self) -> Arc<dyn TokenProvider> {
        self.tokens.clone()
    }
}

impl std::fmt::Debug for KeyVaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVaultClient").field("vault_url", &self.vault_url).finish()
    }
}

#[async_trait]
impl SecretStore for KeyVaultClient {
    async fn get_secret(&self, name: &str) -> Result<SecretString> {
        let url = format!("{}/secrets/{}?api-version={}", self.vault_url, name, API_VERSION);
        debug!(secret = name, "Fetching secret from vault");

        let token = self.tokens.access_token(VAULT_RESOURCE).await?;
        let response = self.http.get(&url).bearer_auth(token.expose_secret()).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(Error::secret_not_found(name)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::authentication(
                format!("vault rejected the request for secret '{}'", name),
            )),
            status if !status.is_success() => {
                Err(Error::remote_status(format!("vault returned {} for secret '{}'", status, name), status.as_u16()))
            }
            _ => {
                let bundle: SecretBundle = response.json().await?;
                Ok(bundle.value)
            }
        }
    }
}
