//! # Error Handling
//!
//! Error taxonomy for the provisioning tool, defined with `thiserror`.
//!
//! Every stage of the orchestration propagates errors unmodified; the
//! orchestrator only adds the stage tag via [`Error::at_stage`] so callers can
//! tell *where* a run aborted without inspecting backtraces.

/// Custom result type for datafab operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the provisioning tool
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Missing or malformed configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// No matching certificate in any local certificate store
    #[error("No certificate with thumbprint {thumbprint} and an accessible private key found in any certificate store")]
    CredentialNotFound { thumbprint: String },

    /// Token exchange or ambient-identity failure
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The secret store has no secret under this name
    #[error("Secret not found: {name}")]
    SecretNotFound { name: String },

    /// The remote service reported a failed provisioning state
    #[error("Factory '{name}' reported a failed provisioning state")]
    ProvisioningFailed { name: String },

    /// The provisioning state never left pending within the poll budget
    #[error("Factory '{name}' did not settle after {attempts} polls")]
    ProvisioningTimeout { name: String, attempts: u32 },

    /// Transport or API-level failure talking to a remote service
    #[error("Remote call failed: {message}")]
    Remote { message: String, status: Option<u16> },

    /// A run was cancelled before completing
    #[error("Provisioning cancelled")]
    Cancelled,

    /// An orchestration stage aborted; wraps the underlying failure
    #[error("{stage} stage failed")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<Error>,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new authentication error
    pub fn authentication<S: Into<String>>(message: S) -> Self {
        Self::Authentication { message: message.into() }
    }

    /// Create a new remote-call error without a status code
    pub fn remote<S: Into<String>>(message: S) -> Self {
        Self::Remote { message: message.into(), status: None }
    }

    /// Create a new remote-call error carrying the HTTP status
    pub fn remote_status<S: Into<String>>(message: S, status: u16) -> Self {
        Self::Remote { message: message.into(), status: Some(status) }
    }

    /// Create a secret-not-found error
    pub fn secret_not_found<S: Into<String>>(name: S) -> Self {
        Self::SecretNotFound { name: name.into() }
    }

    /// Tag this error with the orchestration stage it aborted
    pub fn at_stage<S: Into<String>>(self, stage: S) -> Self {
        Self::StageFailed { stage: stage.into(), source: Box::new(self) }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::Remote {
            status: error.status().map(|s| s.as_u16()),
            message: error.to_string(),
        }
    }
}
