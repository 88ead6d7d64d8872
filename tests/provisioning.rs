//! End-to-end provisioning tests against HTTP doubles.
//!
//! Exercises the real component chain (ambient identity token, vault
//! session, client-secret exchange for the management plane, orchestrated
//! upserts) with wiremock standing in for every remote service.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use datafab::auth::{ClientSecretTokenProvider, ManagedIdentityTokenProvider, TokenProvider};
use datafab::config::{CloudSettings, ProvisionSettings, Settings, VaultSettings};
use datafab::errors::Error;
use datafab::factory::{HttpResourceClient, ProvisionPlan};
use datafab::orchestrator::{PollConfig, ProvisioningOrchestrator};
use datafab::secrets::{KeyVaultClient, SecretStore};

const FACTORY_PATH: &str =
    "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.DataFactory/factories/fac1";

/// Mock auth plane: IMDS for the vault session, token endpoint for the
/// management plane.
async fn start_auth_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/metadata/identity/oauth2/token"))
        .and(header("Metadata", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ambient-tok"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ten1/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_secret=connector-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "mgmt-tok"
        })))
        .mount(&server)
        .await;

    server
}

/// Mock vault with the secrets the standard plan resolves.
async fn start_vault_server() -> MockServer {
    let server = MockServer::start().await;

    for (name, value) in [
        ("ClientConnector", "connector-secret"),
        ("sql-connection-string", "Server=tcp:db.example;Database=app"),
        ("service-principal-key", "sp-key"),
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/secrets/{name}")))
            .and(header("authorization", "Bearer ambient-tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": value })))
            .mount(&server)
            .await;
    }

    server
}

/// Mock management plane answering every factory route.
async fn start_management_server(factory_state: &str) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(FACTORY_PATH))
        .and(header("authorization", "Bearer mgmt-tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "fac1",
            "properties": {"provisioningState": "Pending"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(FACTORY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "fac1",
            "properties": {"provisioningState": factory_state}
        })))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path_regex(r"/factories/fac1/(linkedservices|datasets|pipelines)/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    server
}

fn test_settings(vault: &MockServer, management: &MockServer) -> Settings {
    Settings {
        vault: VaultSettings {
            vault_url: vault.uri(),
            prod_client_id: "app1".to_string(),
            tenant_id: "ten1".to_string(),
            ..Default::default()
        },
        cloud: CloudSettings {
            subscription_id: "sub1".to_string(),
            management_endpoint: management.uri(),
            dynamics_url: "https://crm.example.com".to_string(),
            ..Default::default()
        },
        provision: ProvisionSettings {
            resource_group: "rg1".to_string(),
            factory_name: "fac1".to_string(),
            ..Default::default()
        },
    }
}

/// Assemble the full component chain the CLI would build.
async fn build_orchestrator(
    auth: &MockServer,
    vault: &MockServer,
    management: &MockServer,
) -> ProvisioningOrchestrator {
    let settings = test_settings(vault, management);

    let identity = ManagedIdentityTokenProvider::with_endpoint(&format!(
        "{}/metadata/identity/oauth2/token",
        auth.uri()
    ))
    .unwrap();
    let secrets = Arc::new(KeyVaultClient::new(&vault.uri(), Arc::new(identity)).unwrap());

    let management_secret = secrets.get_secret("ClientConnector").await.unwrap();
    let tokens: Arc<dyn TokenProvider> = Arc::new(
        ClientSecretTokenProvider::new(&auth.uri(), "ten1", "app1", management_secret).unwrap(),
    );
    let resources =
        Arc::new(HttpResourceClient::new(&management.uri(), "sub1", tokens).unwrap());

    ProvisioningOrchestrator::new(resources, secrets, settings)
        .with_poll_config(PollConfig { interval: Duration::from_millis(10), max_attempts: 50 })
}

fn request_paths(requests: &[Request]) -> Vec<String> {
    requests.iter().map(|r| format!("{} {}", r.method, r.url.path())).collect()
}

#[tokio::test]
async fn full_run_provisions_all_resources_in_order() {
    let auth = start_auth_server().await;
    let vault = start_vault_server().await;
    let management = start_management_server("Succeeded").await;

    let orchestrator = build_orchestrator(&auth, &vault, &management).await;
    orchestrator.run(&ProvisionPlan::standard()).await.unwrap();

    let requests = management.received_requests().await.unwrap();
    let paths = request_paths(&requests);

    // Factory upsert first, then the settle poll.
    assert_eq!(paths[0], format!("PUT {}", FACTORY_PATH));
    assert_eq!(paths[1], format!("GET {}", FACTORY_PATH));

    let first = |needle: &str| paths.iter().position(|p| p.contains(needle)).unwrap();
    let last = |needle: &str| paths.iter().rposition(|p| p.contains(needle)).unwrap();

    // Strict topological order: all linked services, then all datasets, then
    // the pipeline.
    assert!(first("/linkedservices/") > last("GET"));
    assert!(first("/datasets/") > last("/linkedservices/"));
    assert!(first("/pipelines/") > last("/datasets/"));

    // The standard plan's four linked services and two datasets all landed.
    assert_eq!(paths.iter().filter(|p| p.contains("/linkedservices/")).count(), 4);
    assert_eq!(paths.iter().filter(|p| p.contains("/datasets/")).count(), 2);
    assert_eq!(paths.iter().filter(|p| p.contains("/pipelines/")).count(), 1);
}

#[tokio::test]
async fn rerun_with_identical_plan_succeeds() {
    let auth = start_auth_server().await;
    let vault = start_vault_server().await;
    let management = start_management_server("Succeeded").await;

    let orchestrator = build_orchestrator(&auth, &vault, &management).await;
    let plan = ProvisionPlan::standard();

    orchestrator.run(&plan).await.unwrap();
    orchestrator.run(&plan).await.unwrap();

    // Create-or-update semantics: the second pass issues the same upserts and
    // nothing errors.
    let requests = management.received_requests().await.unwrap();
    let pipelines =
        request_paths(&requests).iter().filter(|p| p.contains("/pipelines/")).count();
    assert_eq!(pipelines, 2);
}

#[tokio::test]
async fn failed_factory_state_aborts_before_linked_services() {
    let auth = start_auth_server().await;
    let vault = start_vault_server().await;
    let management = start_management_server("Failed").await;

    let orchestrator = build_orchestrator(&auth, &vault, &management).await;
    let err = orchestrator.run(&ProvisionPlan::standard()).await.unwrap_err();

    let Error::StageFailed { stage, source } = err else { panic!("expected StageFailed") };
    assert_eq!(stage, "CreateFactory");
    assert!(matches!(*source, Error::ProvisioningFailed { .. }));

    let requests = management.received_requests().await.unwrap();
    assert!(!request_paths(&requests).iter().any(|p| p.contains("/linkedservices/")));
}

#[tokio::test]
async fn poll_rides_out_pending_states() {
    let auth = start_auth_server().await;
    let vault = start_vault_server().await;

    let management = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(FACTORY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "fac1",
            "properties": {"provisioningState": "PendingCreation"}
        })))
        .mount(&management)
        .await;
    // First two polls report the legacy pending literal, then it settles.
    Mock::given(method("GET"))
        .and(path(FACTORY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": {"provisioningState": "PendingCreation"}
        })))
        .up_to_n_times(2)
        .mount(&management)
        .await;
    Mock::given(method("GET"))
        .and(path(FACTORY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": {"provisioningState": "Succeeded"}
        })))
        .mount(&management)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"/factories/fac1/(linkedservices|datasets|pipelines)/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&management)
        .await;

    let orchestrator = build_orchestrator(&auth, &vault, &management).await;
    orchestrator.run(&ProvisionPlan::standard()).await.unwrap();

    let requests = management.received_requests().await.unwrap();
    let polls = request_paths(&requests)
        .iter()
        .filter(|p| p.starts_with("GET"))
        .count();
    assert_eq!(polls, 3);
}

#[tokio::test]
async fn missing_plan_secret_aborts_linked_service_stage() {
    let auth = start_auth_server().await;
    let management = start_management_server("Succeeded").await;

    // Vault knows the management secret but not the plan's secrets.
    let vault = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secrets/ClientConnector"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "connector-secret"
        })))
        .mount(&vault)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/secrets/.+$"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&vault)
        .await;

    let orchestrator = build_orchestrator(&auth, &vault, &management).await;
    let err = orchestrator.run(&ProvisionPlan::standard()).await.unwrap_err();

    let Error::StageFailed { stage, source } = err else { panic!("expected StageFailed") };
    assert_eq!(stage, "CreateLinkedServices");
    assert!(matches!(*source, Error::SecretNotFound { .. }));

    // The run never reached datasets.
    let requests = management.received_requests().await.unwrap();
    assert!(!request_paths(&requests).iter().any(|p| p.contains("/datasets/")));
}
