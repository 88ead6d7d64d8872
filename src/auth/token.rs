//! Bearer-token acquisition.
//!
//! All remote sessions authenticate through a [`TokenProvider`]: a
//! re-invocable callback that yields a fresh access token for a resource.
//! Binding a callback rather than a one-shot token lets the HTTP clients
//! re-ask on every request, which keeps refresh out of their hands entirely.
//!
//! Three providers cover the trust paths in use:
//!
//! - [`ClientAssertionTokenProvider`]: signs a JWT with a locally-held
//!   certificate key and exchanges it at the authority (certificate path)
//! - [`ManagedIdentityTokenProvider`]: asks the compute environment's
//!   ambient identity endpoint (managed-identity path)
//! - [`ClientSecretTokenProvider`]: client-credentials grant with a shared
//!   secret; used for the management plane, whose secret is itself fetched
//!   from the vault

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::certificate::ClientCertificate;
use crate::errors::{Error, Result};
use crate::secrets::SecretString;

/// OAuth2 assertion type for JWT bearer client assertions.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Instance metadata endpoint that serves ambient identity tokens.
pub const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Environment override for the ambient identity endpoint.
pub const IDENTITY_ENDPOINT_VAR: &str = "IDENTITY_ENDPOINT";

const IMDS_API_VERSION: &str = "2018-02-01";

/// Client assertions are short-lived; ten minutes covers clock skew.
const ASSERTION_LIFETIME_SECS: i64 = 600;

/// Re-invocable access-token callback.
///
/// `resource` is the audience base (e.g. the vault or management endpoint);
/// providers derive the scope from it where the grant needs one.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Obtain a bearer token for the given resource.
    async fn access_token(&self, resource: &str) -> Result<SecretString>;
}

/// Wire form of a token-endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: SecretString,
}

fn token_http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))
}

fn token_endpoint(authority: &str, tenant_id: &str) -> String {
    format!("{}/{}/oauth2/v2.0/token", authority.trim_end_matches('/'), tenant_id)
}

async fn read_token_response(response: reqwest::Response, context: &str) -> Result<SecretString> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::authentication(format!(
            "{} returned {}: {}",
            context, status, body
        )));
    }
    let token: TokenResponse = response.json().await?;
    Ok(token.access_token)
}

// ============================================================================
// Certificate assertion
// ============================================================================

/// Claims of a client-assertion JWT.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    aud: &'a str,
    iss: &'a str,
    sub: &'a str,
    jti: String,
    nbf: i64,
    exp: i64,
}

/// Token provider backed by a certificate-signed client assertion.
pub struct ClientAssertionTokenProvider {
    http: Client,
    endpoint: String,
    client_id: String,
    certificate: ClientCertificate,
}

impl ClientAssertionTokenProvider {
    /// Bind a certificate to an authority/tenant/application triple.
    pub fn new(
        authority: &str,
        tenant_id: &str,
        client_id: &str,
        certificate: ClientCertificate,
    ) -> Result<Self> {
        Ok(Self {
            http: token_http_client()?,
            endpoint: token_endpoint(authority, tenant_id),
            client_id: client_id.to_string(),
            certificate,
        })
    }

    /// Sign a fresh assertion over the certificate's private key.
    ///
    /// A new assertion is minted per exchange; nothing here is cached, which
    /// is what makes the provider safely re-invocable.
    fn build_assertion(&self) -> Result<String> {
        let (key, algorithm) = signing_key(self.certificate.private_key_pem())?;

        let mut header = Header::new(algorithm);
        header.x5t = Some(URL_SAFE_NO_PAD.encode(raw_thumbprint(&self.certificate)));

        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            aud: &self.endpoint,
            iss: &self.client_id,
            sub: &self.client_id,
            jti: uuid::Uuid::new_v4().to_string(),
            nbf: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| Error::authentication(format!("failed to sign client assertion: {}", e)))
    }
}

#[async_trait]
impl TokenProvider for ClientAssertionTokenProvider {
    async fn access_token(&self, resource: &str) -> Result<SecretString> {
        let assertion = self.build_assertion()?;
        debug!(endpoint = %self.endpoint, resource, "Exchanging client assertion for token");

        let response = self
            .http
            .post(&self.endpoint)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", &self.client_id),
                ("scope", &format!("{}/.default", resource)),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("client_assertion", &assertion),
            ])
            .send()
            .await
            .map_err(|e| Error::authentication(format!("token endpoint unreachable: {}", e)))?;

        read_token_response(response, "token endpoint").await
    }
}

/// Pick the signing algorithm from the key material.
fn signing_key(private_key_pem: &[u8]) -> Result<(EncodingKey, Algorithm)> {
    if let Ok(key) = EncodingKey::from_rsa_pem(private_key_pem) {
        return Ok((key, Algorithm::RS256));
    }
    if let Ok(key) = EncodingKey::from_ec_pem(private_key_pem) {
        return Ok((key, Algorithm::ES256));
    }
    Err(Error::authentication("certificate private key is neither RSA nor EC PEM"))
}

/// Raw SHA-1 digest of the certificate DER, for the assertion's `x5t` header.
fn raw_thumbprint(certificate: &ClientCertificate) -> Vec<u8> {
    ring::digest::digest(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY, certificate.certificate_der())
        .as_ref()
        .to_vec()
}

// ============================================================================
// Managed identity
// ============================================================================

/// Token provider backed by the compute environment's ambient identity.
pub struct ManagedIdentityTokenProvider {
    http: Client,
    endpoint: String,
}

impl ManagedIdentityTokenProvider {
    /// Use the endpoint from `IDENTITY_ENDPOINT`, falling back to IMDS.
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var(IDENTITY_ENDPOINT_VAR)
            .unwrap_or_else(|_| DEFAULT_IMDS_ENDPOINT.to_string());
        Self::with_endpoint(&endpoint)
    }

    /// Use an explicit identity endpoint.
    pub fn with_endpoint(endpoint: &str) -> Result<Self> {
        if endpoint.is_empty() {
            return Err(Error::config("identity endpoint must not be empty"));
        }
        Ok(Self { http: token_http_client()?, endpoint: endpoint.to_string() })
    }
}

#[async_trait]
impl TokenProvider for ManagedIdentityTokenProvider {
    async fn access_token(&self, resource: &str) -> Result<SecretString> {
        debug!(endpoint = %self.endpoint, resource, "Requesting ambient identity token");

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("api-version", IMDS_API_VERSION), ("resource", resource)])
            .header("Metadata", "true")
            .send()
            .await
            .map_err(|e| {
                Error::authentication(format!("no ambient identity available: {}", e))
            })?;

        read_token_response(response, "identity endpoint").await
    }
}

// ============================================================================
// Client secret
// ============================================================================

/// Token provider using the client-credentials grant with a shared secret.
pub struct ClientSecretTokenProvider {
    http: Client,
    endpoint: String,
    client_id: String,
    client_secret: SecretString,
}

impl ClientSecretTokenProvider {
    /// Bind a client secret to an authority/tenant/application triple.
    pub fn new(
        authority: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: SecretString,
    ) -> Result<Self> {
        Ok(Self {
            http: token_http_client()?,
            endpoint: token_endpoint(authority, tenant_id),
            client_id: client_id.to_string(),
            client_secret,
        })
    }
}

#[async_trait]
impl TokenProvider for ClientSecretTokenProvider {
    async fn access_token(&self, resource: &str) -> Result<SecretString> {
        debug!(endpoint = %self.endpoint, resource, "Exchanging client secret for token");

        let response = self
            .http
            .post(&self.endpoint)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", &self.client_id),
                ("client_secret", self.client_secret.expose_secret()),
                ("scope", &format!("{}/.default", resource)),
            ])
            .send()
            .await
            .map_err(|e| Error::authentication(format!("token endpoint unreachable: {}", e)))?;

        read_token_response(response, "token endpoint").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_certificate() -> ClientCertificate {
        let generated =
            rcgen::generate_simple_self_signed(vec!["datafab.test".to_string()]).unwrap();
        ClientCertificate::new(
            generated.cert.der().to_vec(),
            generated.key_pair.serialize_pem().into_bytes(),
        )
    }

    #[test]
    fn test_token_endpoint_shape() {
        assert_eq!(
            token_endpoint("https://login.example", "tenant-1"),
            "https://login.example/tenant-1/oauth2/v2.0/token"
        );
        assert_eq!(
            token_endpoint("https://login.example/", "tenant-1"),
            "https://login.example/tenant-1/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_assertion_carries_thumbprint_header() {
        let certificate = test_certificate();
        let expected_thumbprint = certificate.thumbprint().to_string();
        let provider = ClientAssertionTokenProvider::new(
            "https://login.example",
            "tenant-1",
            "app-1",
            certificate,
        )
        .unwrap();

        let assertion = provider.build_assertion().unwrap();
        let header = jsonwebtoken::decode_header(&assertion).unwrap();

        let x5t = header.x5t.expect("assertion header carries x5t");
        let digest = URL_SAFE_NO_PAD.decode(x5t).unwrap();
        assert_eq!(hex::encode(digest), expected_thumbprint);
    }

    #[test]
    fn test_assertions_are_unique_per_invocation() {
        let provider = ClientAssertionTokenProvider::new(
            "https://login.example",
            "tenant-1",
            "app-1",
            test_certificate(),
        )
        .unwrap();

        // Fresh jti every time: the callback can be re-invoked indefinitely.
        assert_ne!(provider.build_assertion().unwrap(), provider.build_assertion().unwrap());
    }

    #[test]
    fn test_garbage_key_is_rejected() {
        let err = match signing_key(b"not a key") {
            Ok(_) => panic!("expected signing_key to reject garbage input"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_assertion_exchange_against_token_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_assertion_type="))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "tok-1", "expires_in": 3599})),
            )
            .mount(&server)
            .await;

        let provider = ClientAssertionTokenProvider::new(
            &server.uri(),
            "tenant-1",
            "app-1",
            test_certificate(),
        )
        .unwrap();

        let token = provider.access_token("https://vault.example").await.unwrap();
        assert_eq!(token.expose_secret(), "tok-1");
    }

    #[tokio::test]
    async fn test_rejected_exchange_maps_to_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_client"
            })))
            .mount(&server)
            .await;

        let provider = ClientAssertionTokenProvider::new(
            &server.uri(),
            "tenant-1",
            "app-1",
            test_certificate(),
        )
        .unwrap();

        let err = provider.access_token("https://vault.example").await.unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_client_secret_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("client_secret=s3cret"))
            .and(body_string_contains("client_id=app-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-2"
            })))
            .mount(&server)
            .await;

        let provider = ClientSecretTokenProvider::new(
            &server.uri(),
            "tenant-1",
            "app-1",
            SecretString::new("s3cret"),
        )
        .unwrap();

        let token = provider.access_token("https://management.example").await.unwrap();
        assert_eq!(token.expose_secret(), "tok-2");
    }

    #[tokio::test]
    async fn test_managed_identity_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(wiremock::matchers::query_param("resource", "https://vault.example"))
            .and(wiremock::matchers::header("Metadata", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ambient-tok"
            })))
            .mount(&server)
            .await;

        let provider = ManagedIdentityTokenProvider::with_endpoint(&server.uri()).unwrap();
        let token = provider.access_token("https://vault.example").await.unwrap();
        assert_eq!(token.expose_secret(), "ambient-tok");
    }

    #[tokio::test]
    async fn test_managed_identity_unreachable_maps_to_authentication() {
        // Nothing listens on this port; the request must fail fast and map
        // to an authentication error rather than a transport error.
        let provider = ManagedIdentityTokenProvider::with_endpoint("http://127.0.0.1:1").unwrap();
        let err = provider.access_token("https://vault.example").await.unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
    }
}
