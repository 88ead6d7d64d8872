//! Credential resolution for the provisioning run.
//!
//! One of two mutually exclusive trust paths is selected by configuration at
//! process start and never switched within a run:
//!
//! - **Certificate assertion**: a client certificate found in the local
//!   certificate stores signs a JWT assertion that is exchanged for bearer
//!   tokens at the authority ([`ClientAssertionTokenProvider`]).
//! - **Managed identity**: bearer tokens come from the compute environment's
//!   ambient identity endpoint ([`ManagedIdentityTokenProvider`]).
//!
//! Either way the result is a re-invocable [`TokenProvider`] callback (the
//! HTTP clients call back into it per request) bound into a vault session
//! by [`CredentialResolver::resolve`], which memoizes the handle for the
//! lifetime of the resolver.

pub mod certificate;
pub mod credential;
pub mod token;

pub use certificate::{
    thumbprint_hex, CertificateStores, ClientCertificate, StoreLocation, StoreName,
};
pub use credential::{Credential, CredentialMode, CredentialResolver};
pub use token::{
    ClientAssertionTokenProvider, ClientSecretTokenProvider, ManagedIdentityTokenProvider,
    TokenProvider,
};
