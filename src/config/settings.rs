//! # Configuration Settings
//!
//! Typed settings assembled from a [`ConfigProvider`](super::ConfigProvider).

use std::time::Duration;

use super::{ConfigKey, ConfigProvider};
use crate::errors::{Error, Result};

/// Default token authority when `Authority` is not configured.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Default management-plane endpoint.
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Name of the vault secret holding the management-plane client secret.
pub const DEFAULT_MANAGEMENT_SECRET_NAME: &str = "ClientConnector";

/// Full application configuration
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Vault access and credential selection
    pub vault: VaultSettings,

    /// Management-plane scope and external service links
    pub cloud: CloudSettings,

    /// Orchestration-boundary knobs
    pub provision: ProvisionSettings,
}

/// Vault address and credential-path configuration
#[derive(Debug, Clone, Default)]
pub struct VaultSettings {
    /// Base URL of the secret vault
    pub vault_url: String,

    /// True selects the certificate trust path, false managed identity
    pub use_certificate: bool,

    /// Application (client) id, non-production
    pub client_id: String,

    /// Application (client) id used for vault and management access
    pub prod_client_id: String,

    /// SHA-1 thumbprint of the client certificate (hex, case-insensitive)
    pub cert_thumbprint: String,

    /// Token authority base URL
    pub authority: String,

    /// Directory (tenant) id
    pub tenant_id: String,
}

impl VaultSettings {
    /// The authority to exchange tokens against, falling back to the default.
    pub fn authority_or_default(&self) -> &str {
        if self.authority.is_empty() {
            DEFAULT_AUTHORITY
        } else {
            &self.authority
        }
    }
}

/// Management-plane scope and external service links
#[derive(Debug, Clone)]
pub struct CloudSettings {
    /// Target subscription id
    pub subscription_id: String,

    /// Management API endpoint
    pub management_endpoint: String,

    /// Vault secret name holding the management-plane client secret
    pub management_secret_name: String,

    /// Service URI of the CRM deployment
    pub dynamics_url: String,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            subscription_id: String::new(),
            management_endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
            management_secret_name: DEFAULT_MANAGEMENT_SECRET_NAME.to_string(),
            dynamics_url: String::new(),
        }
    }
}

/// Knobs recognized at the orchestration boundary
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    /// Target resource-group name
    pub resource_group: String,

    /// Datacenter region for the factory
    pub region: String,

    /// Factory resource name
    pub factory_name: String,

    /// Sink write batch size for the copy pipeline
    pub batch_size: u32,

    /// Whether the copy sink drops null values
    pub ignore_null_values: bool,

    /// Interval between provisioning-state polls, in seconds
    pub poll_interval_secs: u64,

    /// Maximum number of provisioning-state polls before giving up
    pub poll_max_attempts: u32,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            resource_group: "rsd-automation".to_string(),
            region: "westus".to_string(),
            factory_name: "datafab-demo".to_string(),
            batch_size: 50,
            ignore_null_values: true,
            poll_interval_secs: 1,
            poll_max_attempts: 300,
        }
    }
}

impl ProvisionSettings {
    /// Get the poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Settings {
    /// Assemble settings from a configuration provider.
    ///
    /// String keys that are missing resolve to the empty string; whether an
    /// empty value is an error depends on the selected credential path and is
    /// checked at resolution time. The boolean key must parse as a boolean or
    /// this fails with a configuration error.
    pub fn from_provider(provider: &dyn ConfigProvider) -> Result<Self> {
        let lookup = |key: ConfigKey| provider.get(key).unwrap_or_default();

        let use_certificate = match provider.get(ConfigKey::KeyvaultUsingCertificate) {
            None => false,
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                Error::config(format!(
                    "{} must be a boolean, got '{}'",
                    ConfigKey::KeyvaultUsingCertificate,
                    raw
                ))
            })?,
        };

        Ok(Self {
            vault: VaultSettings {
                vault_url: lookup(ConfigKey::VaultUrl),
                use_certificate,
                client_id: lookup(ConfigKey::ClientId),
                prod_client_id: lookup(ConfigKey::ProdClientId),
                cert_thumbprint: lookup(ConfigKey::CertThumbprint),
                authority: lookup(ConfigKey::Authority),
                tenant_id: lookup(ConfigKey::TenantId),
            },
            cloud: CloudSettings {
                subscription_id: lookup(ConfigKey::SubscriptionId),
                dynamics_url: lookup(ConfigKey::DynamicsLink),
                ..CloudSettings::default()
            },
            provision: ProvisionSettings::default(),
        })
    }

    /// Fail with a configuration error if any of the named fields is empty.
    pub fn require_non_empty(fields: &[(&str, &str)]) -> Result<()> {
        for (name, value) in fields {
            if value.is_empty() {
                return Err(Error::config(format!("required setting '{}' is missing or empty", name)));
            }
        }
        Ok(())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfigProvider;

    #[test]
    fn test_missing_string_keys_resolve_to_empty() {
        let provider = StaticConfigProvider::new();
        let settings = Settings::from_provider(&provider).unwrap();
        assert_eq!(settings.vault.vault_url, "");
        assert_eq!(settings.cloud.subscription_id, "");
        assert!(!settings.vault.use_certificate);
    }

    #[test]
    fn test_bool_key_must_parse() {
        let provider =
            StaticConfigProvider::new().with(ConfigKey::KeyvaultUsingCertificate, "maybe");
        let err = Settings::from_provider(&provider).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("KeyvaultUsingCertificate"));
    }

    #[test]
    fn test_bool_key_accepts_common_spellings() {
        for (raw, expected) in [("true", true), ("TRUE", true), ("1", true), ("false", false), ("0", false)] {
            let provider =
                StaticConfigProvider::new().with(ConfigKey::KeyvaultUsingCertificate, raw);
            let settings = Settings::from_provider(&provider).unwrap();
            assert_eq!(settings.vault.use_certificate, expected, "raw: {}", raw);
        }
    }

    #[test]
    fn test_authority_fallback() {
        let settings = VaultSettings::default();
        assert_eq!(settings.authority_or_default(), DEFAULT_AUTHORITY);

        let settings =
            VaultSettings { authority: "https://login.example".to_string(), ..Default::default() };
        assert_eq!(settings.authority_or_default(), "https://login.example");
    }

    #[test]
    fn test_provision_defaults() {
        let provision = ProvisionSettings::default();
        assert_eq!(provision.batch_size, 50);
        assert!(provision.ignore_null_values);
        assert_eq!(provision.poll_interval(), Duration::from_secs(1));
        assert_eq!(provision.poll_max_attempts, 300);
    }

    #[test]
    fn test_require_non_empty() {
        assert!(Settings::require_non_empty(&[("VaultUrl", "https://v.example")]).is_ok());

        let err = Settings::require_non_empty(&[("CertThumbprint", "")]).unwrap_err();
        assert!(err.to_string().contains("CertThumbprint"));
    }
}
