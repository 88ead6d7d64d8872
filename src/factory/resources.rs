//! Typed resource payloads and run declarations.
//!
//! The wire types serialize to the management API's camelCase JSON form.
//! Declarations (`*Declaration`, [`ProvisionPlan`]) are the orchestrator's
//! input: names, kinds, and secret *references*, never secret values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Provisioning state
// ============================================================================

/// Remote lifecycle status of the factory resource.
///
/// Dependents are only safe to create once the state has left `Pending`.
/// The service's legacy `PendingCreation` literal maps onto `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningState {
    #[serde(alias = "PendingCreation")]
    Pending,
    Succeeded,
    Failed,
}

impl ProvisioningState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Factory creation payload: region plus a system-assigned identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorySpec {
    pub location: String,
    pub identity: FactoryIdentity,
}

impl FactorySpec {
    pub fn new(location: impl Into<String>) -> Self {
        Self { location: location.into(), identity: FactoryIdentity::system_assigned() }
    }
}

/// Managed identity attached to the factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryIdentity {
    #[serde(rename = "type")]
    pub kind: String,
}

impl FactoryIdentity {
    pub fn system_assigned() -> Self {
        Self { kind: "SystemAssigned".to_string() }
    }
}

/// Factory as reported by the management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryResource {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: FactoryProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryProperties {
    #[serde(default)]
    pub provisioning_state: Option<ProvisioningState>,
}

// ============================================================================
// Secure wire values
// ============================================================================

/// A secret value embedded in a resource payload.
///
/// Unlike [`SecretString`](crate::secrets::SecretString) this *does* serialize
/// its value (the payload is the one place the secret must appear) but its
/// Debug form stays redacted so payload logging cannot leak it.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecureValue {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

impl SecureValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self { kind: "SecureString".to_string(), value: value.into() }
    }
}

impl fmt::Debug for SecureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureValue([REDACTED])")
    }
}

// ============================================================================
// Linked services
// ============================================================================

/// Linked-service kind identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkedServiceKind {
    /// SQL database connection (connection string from the vault)
    SqlDatabase,
    /// Common Data Service environment (service-principal credential)
    CommonDataService,
    /// Dynamics CRM deployment (service-principal credential)
    DynamicsCrm,
    /// Secret-vault connection (no secret of its own)
    KeyVault,
    /// Blob storage, declared but not yet buildable
    BlobStorage,
}

impl LinkedServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlDatabase => "sql_database",
            Self::CommonDataService => "common_data_service",
            Self::DynamicsCrm => "dynamics_crm",
            Self::KeyVault => "key_vault",
            Self::BlobStorage => "blob_storage",
        }
    }
}

impl FromStr for LinkedServiceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sql_database" => Ok(Self::SqlDatabase),
            "common_data_service" => Ok(Self::CommonDataService),
            "dynamics_crm" => Ok(Self::DynamicsCrm),
            "key_vault" => Ok(Self::KeyVault),
            "blob_storage" => Ok(Self::BlobStorage),
            _ => Err(format!("Unknown linked-service kind: {}", s)),
        }
    }
}

impl fmt::Display for LinkedServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A linked service as declared in the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedServiceDeclaration {
    pub kind: LinkedServiceKind,
    pub name: String,
    /// Name of the vault secret the builder resolves, for kinds that need one
    pub secret_ref: Option<String>,
}

impl LinkedServiceDeclaration {
    pub fn new(kind: LinkedServiceKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into(), secret_ref: None }
    }

    pub fn with_secret_ref(mut self, secret_ref: impl Into<String>) -> Self {
        self.secret_ref = Some(secret_ref.into());
        self
    }
}

/// Linked-service upsert payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedServiceResource {
    pub properties: LinkedServiceProperties,
}

/// Typed linked-service bodies, tagged the way the API expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LinkedServiceProperties {
    #[serde(rename = "AzureSqlDatabase")]
    SqlDatabase {
        #[serde(rename = "typeProperties")]
        type_properties: SqlDatabaseProperties,
    },
    #[serde(rename = "CommonDataServiceForApps")]
    CommonDataService {
        #[serde(rename = "typeProperties")]
        type_properties: ServicePrincipalProperties,
    },
    #[serde(rename = "DynamicsCrm")]
    DynamicsCrm {
        #[serde(rename = "typeProperties")]
        type_properties: ServicePrincipalProperties,
    },
    #[serde(rename = "AzureKeyVault")]
    KeyVault {
        #[serde(rename = "typeProperties")]
        type_properties: KeyVaultLinkProperties,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlDatabaseProperties {
    pub connection_string: SecureValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipalProperties {
    pub deployment_type: String,
    pub service_uri: String,
    pub authentication_type: String,
    pub service_principal_credential_type: String,
    pub service_principal_id: String,
    pub service_principal_credential: SecureValue,
}

impl ServicePrincipalProperties {
    /// Online deployment authenticated as a service principal with a key.
    pub fn online(
        service_uri: impl Into<String>,
        service_principal_id: impl Into<String>,
        credential: SecureValue,
    ) -> Self {
        Self {
            deployment_type: "Online".to_string(),
            service_uri: service_uri.into(),
            authentication_type: "AADServicePrincipal".to_string(),
            service_principal_credential_type: "ServicePrincipalKey".to_string(),
            service_principal_id: service_principal_id.into(),
            service_principal_credential: credential,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyVaultLinkProperties {
    pub base_url: String,
}

// ============================================================================
// Datasets
// ============================================================================

/// Dataset kind identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    SqlTable,
    CommonDataServiceEntity,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlTable => "sql_table",
            Self::CommonDataServiceEntity => "common_data_service_entity",
        }
    }
}

impl FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sql_table" => Ok(Self::SqlTable),
            "common_data_service_entity" => Ok(Self::CommonDataServiceEntity),
            _ => Err(format!("Unknown dataset kind: {}", s)),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dataset as declared in the plan.
///
/// `target` is the kind-specific data location: a table name for SQL, an
/// entity name for CDS. A declaration with an empty `linked_service_name` is
/// skipped at provisioning time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDeclaration {
    pub kind: DatasetKind,
    pub name: String,
    pub linked_service_name: String,
    pub target: String,
}

impl DatasetDeclaration {
    pub fn new(
        kind: DatasetKind,
        name: impl Into<String>,
        linked_service_name: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            linked_service_name: linked_service_name.into(),
            target: target.into(),
        }
    }
}

/// Reference to a linked service by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkedServiceReference {
    #[serde(rename = "referenceName")]
    pub reference_name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl LinkedServiceReference {
    pub fn new(reference_name: impl Into<String>) -> Self {
        Self { reference_name: reference_name.into(), kind: "LinkedServiceReference".to_string() }
    }
}

/// Dataset upsert payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetResource {
    pub properties: DatasetProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DatasetProperties {
    #[serde(rename = "AzureSqlTable")]
    SqlTable {
        #[serde(rename = "linkedServiceName")]
        linked_service_name: LinkedServiceReference,
        #[serde(rename = "typeProperties")]
        type_properties: SqlTableProperties,
    },
    #[serde(rename = "CommonDataServiceForAppsEntity")]
    CommonDataServiceEntity {
        #[serde(rename = "linkedServiceName")]
        linked_service_name: LinkedServiceReference,
        #[serde(rename = "typeProperties")]
        type_properties: EntityProperties,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlTableProperties {
    pub table_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityProperties {
    pub entity_name: String,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Reference to a dataset by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetReference {
    #[serde(rename = "referenceName")]
    pub reference_name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl DatasetReference {
    pub fn new(reference_name: impl Into<String>) -> Self {
        Self { reference_name: reference_name.into(), kind: "DatasetReference".to_string() }
    }
}

/// Pipeline upsert payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResource {
    pub properties: PipelineProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineProperties {
    pub activities: Vec<Activity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Activity {
    #[serde(rename = "Copy")]
    Copy(CopyActivity),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyActivity {
    pub name: String,
    pub inputs: Vec<DatasetReference>,
    pub outputs: Vec<DatasetReference>,
    pub type_properties: CopyActivityProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyActivityProperties {
    pub source: CopySource,
    pub sink: CopySink,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CopySource {
    #[serde(rename = "SqlSource")]
    Sql {},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CopySink {
    #[serde(rename = "CommonDataServiceForAppsSink")]
    CommonDataService {
        #[serde(rename = "writeBatchSize")]
        write_batch_size: u32,
        #[serde(rename = "ignoreNullValues")]
        ignore_null_values: bool,
    },
}

/// The copy pipeline as declared in the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyDeclaration {
    pub name: String,
    pub activity_name: String,
    pub input_dataset: String,
    pub output_dataset: String,
}

// ============================================================================
// Plan
// ============================================================================

/// Everything a run creates, in the order it is created.
#[derive(Debug, Clone)]
pub struct ProvisionPlan {
    pub linked_services: Vec<LinkedServiceDeclaration>,
    pub datasets: Vec<DatasetDeclaration>,
    pub pipeline: CopyDeclaration,
}

impl ProvisionPlan {
    /// The standard workspace: SQL, CDS and CRM connections plus the vault
    /// link, a table and an entity dataset, and one SQL→CDS copy pipeline.
    pub fn standard() -> Self {
        Self {
            linked_services: vec![
                LinkedServiceDeclaration::new(LinkedServiceKind::DynamicsCrm, "dynamics-crm")
                    .with_secret_ref("service-principal-key"),
                LinkedServiceDeclaration::new(LinkedServiceKind::SqlDatabase, "sql-database")
                    .with_secret_ref("sql-connection-string"),
                LinkedServiceDeclaration::new(
                    LinkedServiceKind::CommonDataService,
                    "common-data-service",
                )
                .with_secret_ref("service-principal-key"),
                LinkedServiceDeclaration::new(LinkedServiceKind::KeyVault, "key-vault"),
            ],
            datasets: vec![
                DatasetDeclaration::new(
                    DatasetKind::SqlTable,
                    "sql-user-table",
                    "sql-database",
                    "user_info",
                ),
                DatasetDeclaration::new(
                    DatasetKind::CommonDataServiceEntity,
                    "cds-contact",
                    "common-data-service",
                    "contact",
                ),
            ],
            pipeline: CopyDeclaration {
                name: "copy-sql-to-cds".to_string(),
                activity_name: "copy-user-info".to_string(),
                input_dataset: "sql-user-table".to_string(),
                output_dataset: "cds-contact".to_string(),
            },
        }
    }
}
