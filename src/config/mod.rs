//! # Configuration Management
//!
//! Key-value configuration lookup and the typed settings built on top of it.
//!
//! The tool reads a small, fixed set of keys (vault address, application ids,
//! certificate thumbprint, authority/tenant, subscription, CRM link). A
//! [`ConfigProvider`] abstracts *where* the values come from: the default
//! [`EnvConfigProvider`] maps each key to a `DATAFAB_*` environment variable,
//! and [`StaticConfigProvider`] backs tests with an in-memory map.
//!
//! Missing or empty string keys resolve to the empty string; only the boolean
//! key must parse cleanly or settings loading fails.

pub mod settings;

pub use settings::{CloudSettings, ProvisionSettings, Settings, VaultSettings};

use std::collections::HashMap;

/// Recognized configuration keys.
///
/// The names mirror the settings file of the reference deployment so that
/// existing configuration carries over unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    /// Selects the certificate trust path when true, managed identity when false
    KeyvaultUsingCertificate,
    /// Base URL of the secret vault
    VaultUrl,
    /// Application (client) id for non-production use
    ClientId,
    /// Application (client) id used for vault and management access
    ProdClientId,
    /// SHA-1 thumbprint of the client certificate
    CertThumbprint,
    /// Token authority base URL
    Authority,
    /// Directory (tenant) id
    TenantId,
    /// Target subscription id
    SubscriptionId,
    /// Service URI of the CRM deployment
    DynamicsLink,
}

impl ConfigKey {
    /// All recognized keys, in declaration order.
    pub const ALL: [ConfigKey; 9] = [
        ConfigKey::KeyvaultUsingCertificate,
        ConfigKey::VaultUrl,
        ConfigKey::ClientId,
        ConfigKey::ProdClientId,
        ConfigKey::CertThumbprint,
        ConfigKey::Authority,
        ConfigKey::TenantId,
        ConfigKey::SubscriptionId,
        ConfigKey::DynamicsLink,
    ];

    /// The key name as it appears in configuration sources
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyvaultUsingCertificate => "KeyvaultUsingCertificate",
            Self::VaultUrl => "VaultUrl",
            Self::ClientId => "ClientId",
            Self::ProdClientId => "ProdClientId",
            Self::CertThumbprint => "CertThumbprint",
            Self::Authority => "Authority",
            Self::TenantId => "TenantId",
            Self::SubscriptionId => "SubscriptionId",
            Self::DynamicsLink => "DynamicsLink",
        }
    }

    /// The environment variable backing this key
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::KeyvaultUsingCertificate => "DATAFAB_KEYVAULT_USING_CERTIFICATE",
            Self::VaultUrl => "DATAFAB_VAULT_URL",
            Self::ClientId => "DATAFAB_CLIENT_ID",
            Self::ProdClientId => "DATAFAB_PROD_CLIENT_ID",
            Self::CertThumbprint => "DATAFAB_CERT_THUMBPRINT",
            Self::Authority => "DATAFAB_AUTHORITY",
            Self::TenantId => "DATAFAB_TENANT_ID",
            Self::SubscriptionId => "DATAFAB_SUBSCRIPTION_ID",
            Self::DynamicsLink => "DATAFAB_DYNAMICS_LINK",
        }
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Key-value configuration lookup.
///
/// Implementations return `None` for keys that are absent; callers treat
/// absent and empty identically for string keys.
pub trait ConfigProvider: Send + Sync {
    /// Look up the raw value for a key.
    fn get(&self, key: ConfigKey) -> Option<String>;
}

/// Configuration provider backed by `DATAFAB_*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider;

impl EnvConfigProvider {
    /// Create a new environment-backed provider.
    pub fn new() -> Self {
        Self
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get(&self, key: ConfigKey) -> Option<String> {
        std::env::var(key.env_var()).ok()
    }
}

/// In-memory configuration provider, primarily for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    values: HashMap<&'static str, String>,
}

impl StaticConfigProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, returning self for chaining.
    pub fn with(mut self, key: ConfigKey, value: impl Into<String>) -> Self {
        self.values.insert(key.as_str(), value.into());
        self
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn get(&self, key: ConfigKey) -> Option<String> {
        self.values.get(key.as_str()).cloned()
    }
}
