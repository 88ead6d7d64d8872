//! Management-plane HTTP client.
//!
//! Wraps the factory CRUD surface behind the [`ResourceClient`] trait so the
//! orchestrator can be driven against in-memory doubles. The HTTP
//! implementation authenticates every request through the shared
//! [`TokenProvider`] and treats all upserts as create-or-update.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::auth::TokenProvider;
use crate::errors::{Error, Result};

use super::resources::{
    DatasetResource, FactoryResource, FactorySpec, LinkedServiceResource, PipelineResource,
};

/// Token resource identifier for the management plane.
pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com";

/// Management API version for factory resources.
const API_VERSION: &str = "2018-06-01";

/// Factory CRUD surface the orchestrator depends on.
///
/// Every upsert has create-or-update semantics: re-running with identical
/// properties must succeed and leave equivalent remote state.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Create or update the factory; returns the resource with its current
    /// provisioning state.
    async fn upsert_factory(
        &self,
        resource_group: &str,
        factory_name: &str,
        spec: &FactorySpec,
    ) -> Result<FactoryResource>;

    /// Read the factory, including its provisioning state.
    async fn get_factory(&self, resource_group: &str, factory_name: &str)
        -> Result<FactoryResource>;

    /// Create or update a linked service under the factory.
    async fn upsert_linked_service(
        &self,
        resource_group: &str,
        factory_name: &str,
        name: &str,
        spec: &LinkedServiceResource,
    ) -> Result<()>;

    /// Create or update a dataset under the factory.
    async fn upsert_dataset(
        &self,
        resource_group: &str,
        factory_name: &str,
        name: &str,
        spec: &DatasetResource,
    ) -> Result<()>;

    /// Create or update a pipeline under the factory.
    async fn upsert_pipeline(
        &self,
        resource_group: &str,
        factory_name: &str,
        name: &str,
        spec: &PipelineResource,
    ) -> Result<()>;
}

/// HTTP implementation of [`ResourceClient`] against the management API.
pub struct HttpResourceClient {
    http: Client,
    endpoint: String,
    subscription_id: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpResourceClient {
    /// Create a client scoped to a subscription.
    pub fn new(
        endpoint: &str,
        subscription_id: &str,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        if subscription_id.is_empty() {
            return Err(Error::config("required setting 'SubscriptionId' is missing or empty"));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            subscription_id: subscription_id.to_string(),
            tokens,
        })
    }

    fn factory_url(&self, resource_group: &str, factory_name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.DataFactory/factories/{}?api-version={}",
            self.endpoint, self.subscription_id, resource_group, factory_name, API_VERSION
        )
    }

    fn child_url(
        &self,
        resource_group: &str,
        factory_name: &str,
        collection: &str,
        name: &str,
    ) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.DataFactory/factories/{}/{}/{}?api-version={}",
            self.endpoint,
            self.subscription_id,
            resource_group,
            factory_name,
            collection,
            name,
            API_VERSION
        )
    }

    async fn put<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<Response> {
        debug!("PUT {}", url);
        let token = self.tokens.access_token(MANAGEMENT_RESOURCE).await?;
        let response =
            self.http.put(url).bearer_auth(token.expose_secret()).json(body).send().await?;
        check_status(response).await
    }

    async fn get(&self, url: &str) -> Result<Response> {
        debug!("GET {}", url);
        let token = self.tokens.access_token(MANAGEMENT_RESOURCE).await?;
        let response = self.http.get(url).bearer_auth(token.expose_secret()).send().await?;
        check_status(response).await
    }
}

impl std::fmt::Debug for HttpResourceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResourceClient")
            .field("endpoint", &self.endpoint)
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}

/// Map a non-success response to the error taxonomy, reading the body for
/// context.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(Error::authentication(format!("management API rejected the request ({})", status)));
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::remote_status(
        format!("management API returned {}: {}", status, body),
        status.as_u16(),
    ))
}

#[async_trait]
impl ResourceClient for HttpResourceClient {
    async fn upsert_factory(
        &self,
        resource_group: &str,
        factory_name: &str,
        spec: &FactorySpec,
    ) -> Result<FactoryResource> {
        let url = self.factory_url(resource_group, factory_name);
        let response = self.put(&url, spec).await?;
        Ok(response.json().await?)
    }

    async fn get_factory(
        &self,
        resource_group: &str,
        factory_name: &str,
    ) -> Result<FactoryResource> {
        let url = self.factory_url(resource_group, factory_name);
        let response = self.get(&url).await?;
        Ok(response.json().await?)
    }

    async fn upsert_linked_service(
        &self,
        resource_group: &str,
        factory_name: &str,
        name: &str,
        spec: &LinkedServiceResource,
    ) -> Result<()> {
        let url = self.child_url(resource_group, factory_name, "linkedservices", name);
        self.put(&url, spec).await?;
        Ok(())
    }

    async fn upsert_dataset(
        &self,
        resource_group: &str,
        factory_name: &str,
        name: &str,
        spec: &DatasetResource,
    ) -> Result<()> {
        let url = self.child_url(resource_group, factory_name, "datasets", name);
        self.put(&url, spec).await?;
        Ok(())
    }

    async fn upsert_pipeline(
        &self,
        resource_group: &str,
        factory_name: &str,
        name: &str,
        spec: &PipelineResource,
    ) -> Result<()> {
        let url = self.child_url(resource_group, factory_name, "pipelines", name);
        self.put(&url, spec).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretString;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticTokens;

    #[async_trait]
    impl TokenProvider for StaticTokens {
        async fn access_token(&self, _resource: &str) -> Result<SecretString> {
            Ok(SecretString::new("mgmt-token"))
        }
    }

    fn client(server: &MockServer) -> HttpResourceClient {
        HttpResourceClient::new(&server.uri(), "sub1", Arc::new(StaticTokens)).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_factory_hits_expected_route() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(
                "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.DataFactory/factories/fac1",
            ))
            .and(query_param("api-version", API_VERSION))
            .and(header("authorization", "Bearer mgmt-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "fac1",
                "properties": {"provisioningState": "Succeeded"}
            })))
            .mount(&server)
            .await;

        let factory =
            client(&server).upsert_factory("rg1", "fac1", &FactorySpec::new("westus")).await.unwrap();
        assert_eq!(
            factory.properties.provisioning_state,
            Some(crate::factory::ProvisioningState::Succeeded)
        );
    }

    #[tokio::test]
    async fn test_child_routes() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(
                "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.DataFactory/factories/fac1/linkedservices/sql-database",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let spec = LinkedServiceResource {
            properties: crate::factory::resources::LinkedServiceProperties::KeyVault {
                type_properties: crate::factory::resources::KeyVaultLinkProperties {
                    base_url: "https://v.example".to_string(),
                },
            },
        };
        client(&server).upsert_linked_service("rg1", "fac1", "sql-database", &spec).await.unwrap();
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server).get_factory("rg1", "fac1").await.unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_service_error_maps_to_remote_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server).get_factory("rg1", "fac1").await.unwrap_err();
        let Error::Remote { status, message } = err else { panic!("expected Remote") };
        assert_eq!(status, Some(500));
        assert!(message.contains("boom"));
    }

    #[test]
    fn test_empty_subscription_rejected() {
        let err = HttpResourceClient::new("https://m.example", "", Arc::new(StaticTokens))
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("SubscriptionId"));
    }
}
