//! Builder registry for linked services and datasets.
//!
//! Each linked-service kind maps to a builder that turns a declaration into
//! its typed payload, fetching the declaration's referenced secret from the
//! [`SecretStore`] at build time. The orchestrator only consults the map: a
//! kind without an entry is reported as unsupported and skipped, so new kinds
//! are added here without touching orchestration control flow.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Settings;
use crate::errors::{Error, Result};
use crate::secrets::SecretStore;

use super::resources::{
    DatasetDeclaration, DatasetKind, DatasetProperties, DatasetResource, EntityProperties,
    KeyVaultLinkProperties, LinkedServiceDeclaration, LinkedServiceKind, LinkedServiceProperties,
    LinkedServiceReference, LinkedServiceResource, SecureValue, ServicePrincipalProperties,
    SqlDatabaseProperties, SqlTableProperties,
};

/// What a builder gets to work with: the secret store and the run settings.
pub struct BuildContext<'a> {
    pub secrets: &'a dyn SecretStore,
    pub settings: &'a Settings,
}

/// Turns a linked-service declaration into its upsert payload.
#[async_trait]
pub trait LinkedServiceBuilder: Send + Sync {
    async fn build(
        &self,
        ctx: &BuildContext<'_>,
        declaration: &LinkedServiceDeclaration,
    ) -> Result<LinkedServiceResource>;
}

/// Dataset payloads need no secrets; a pure function per kind suffices.
pub type DatasetBuilderFn = fn(&DatasetDeclaration) -> DatasetResource;

/// Registry of payload builders keyed by kind.
pub struct BuilderRegistry {
    linked_services: HashMap<LinkedServiceKind, Arc<dyn LinkedServiceBuilder>>,
    datasets: HashMap<DatasetKind, DatasetBuilderFn>,
}

impl std::fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuilderRegistry")
            .field("linked_services", &self.linked_services.keys().collect::<Vec<_>>())
            .field("datasets", &self.datasets.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BuilderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { linked_services: HashMap::new(), datasets: HashMap::new() }
    }

    /// Registry with builders for every kind the standard plan uses.
    ///
    /// `BlobStorage` deliberately has no entry; declarations of that kind are
    /// skipped until a builder lands.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_linked_service(LinkedServiceKind::SqlDatabase, Arc::new(SqlDatabaseBuilder));
        registry.register_linked_service(
            LinkedServiceKind::CommonDataService,
            Arc::new(ServicePrincipalBuilder { kind: LinkedServiceKind::CommonDataService }),
        );
        registry.register_linked_service(
            LinkedServiceKind::DynamicsCrm,
            Arc::new(ServicePrincipalBuilder { kind: LinkedServiceKind::DynamicsCrm }),
        );
        registry.register_linked_service(LinkedServiceKind::KeyVault, Arc::new(KeyVaultLinkBuilder));

        registry.register_dataset(DatasetKind::SqlTable, build_sql_table);
        registry.register_dataset(DatasetKind::CommonDataServiceEntity, build_cds_entity);
        registry
    }

    /// Register (or replace) a linked-service builder.
    pub fn register_linked_service(
        &mut self,
        kind: LinkedServiceKind,
        builder: Arc<dyn LinkedServiceBuilder>,
    ) {
        self.linked_services.insert(kind, builder);
    }

    /// Register (or replace) a dataset builder.
    pub fn register_dataset(&mut self, kind: DatasetKind, builder: DatasetBuilderFn) {
        self.datasets.insert(kind, builder);
    }

    /// Look up the builder for a linked-service kind.
    pub fn linked_service(&self, kind: LinkedServiceKind) -> Option<Arc<dyn LinkedServiceBuilder>> {
        self.linked_services.get(&kind).cloned()
    }

    /// Look up the builder for a dataset kind.
    pub fn dataset(&self, kind: DatasetKind) -> Option<DatasetBuilderFn> {
        self.datasets.get(&kind).copied()
    }
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// The secret name a declaration must carry for secret-bearing kinds.
fn require_secret_ref(declaration: &LinkedServiceDeclaration) -> Result<&str> {
    declaration.secret_ref.as_deref().ok_or_else(|| {
        Error::config(format!(
            "linked service '{}' of kind {} requires a secret reference",
            declaration.name, declaration.kind
        ))
    })
}

/// SQL database connection; the connection string lives in the vault.
struct SqlDatabaseBuilder;

#[async_trait]
impl LinkedServiceBuilder for SqlDatabaseBuilder {
    async fn build(
        &self,
        ctx: &BuildContext<'_>,
        declaration: &LinkedServiceDeclaration,
    ) -> Result<LinkedServiceResource> {
        let secret_ref = require_secret_ref(declaration)?;
        let connection_string = ctx.secrets.get_secret(secret_ref).await?;

        Ok(LinkedServiceResource {
            properties: LinkedServiceProperties::SqlDatabase {
                type_properties: SqlDatabaseProperties {
                    connection_string: SecureValue::new(connection_string.expose_secret()),
                },
            },
        })
    }
}

/// CDS / CRM connections share the service-principal shape; only the payload
/// tag differs.
struct ServicePrincipalBuilder {
    kind: LinkedServiceKind,
}

#[async_trait]
impl LinkedServiceBuilder for ServicePrincipalBuilder {
    async fn build(
        &self,
        ctx: &BuildContext<'_>,
        declaration: &LinkedServiceDeclaration,
    ) -> Result<LinkedServiceResource> {
        let secret_ref = require_secret_ref(declaration)?;
        let credential = ctx.secrets.get_secret(secret_ref).await?;

        let type_properties = ServicePrincipalProperties::online(
            &ctx.settings.cloud.dynamics_url,
            &ctx.settings.vault.prod_client_id,
            SecureValue::new(credential.expose_secret()),
        );

        let properties = match self.kind {
            LinkedServiceKind::DynamicsCrm => {
                LinkedServiceProperties::DynamicsCrm { type_properties }
            }
            _ => LinkedServiceProperties::CommonDataService { type_properties },
        };

        Ok(LinkedServiceResource { properties })
    }
}

/// Vault link so the factory itself can resolve secrets later. No secret of
/// its own.
struct KeyVaultLinkBuilder;

#[async_trait]
impl LinkedServiceBuilder for KeyVaultLinkBuilder {
    async fn build(
        &self,
        ctx: &BuildContext<'_>,
        _declaration: &LinkedServiceDeclaration,
    ) -> Result<LinkedServiceResource> {
        Ok(LinkedServiceResource {
            properties: LinkedServiceProperties::KeyVault {
                type_properties: KeyVaultLinkProperties {
                    base_url: ctx.settings.vault.vault_url.clone(),
                },
            },
        })
    }
}

fn build_sql_table(declaration: &DatasetDeclaration) -> DatasetResource {
    DatasetResource {
        properties: DatasetProperties::SqlTable {
            linked_service_name: LinkedServiceReference::new(&declaration.linked_service_name),
            type_properties: SqlTableProperties { table_name: declaration.target.clone() },
        },
    }
}

fn build_cds_entity(declaration: &DatasetDeclaration) -> DatasetResource {
    DatasetResource {
        properties: DatasetProperties::CommonDataServiceEntity {
            linked_service_name: LinkedServiceReference::new(&declaration.linked_service_name),
            type_properties: EntityProperties { entity_name: declaration.target.clone() },
        },
    }
}
