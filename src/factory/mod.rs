//! Factory resource model and management-plane access.
//!
//! A provisioning run is described by a [`ProvisionPlan`]: declared linked
//! services, datasets, and one copy pipeline. Declarations are inert: the
//! [`BuilderRegistry`] turns each into its typed wire payload, resolving
//! secrets just-in-time, and the [`ResourceClient`] upserts the payloads
//! against the management API with create-or-update semantics.

pub mod builders;
pub mod client;
pub mod resources;

pub use builders::{BuildContext, BuilderRegistry, LinkedServiceBuilder};
pub use client::{HttpResourceClient, ResourceClient};
pub use resources::{
    CopyDeclaration, DatasetDeclaration, DatasetKind, DatasetResource, FactoryResource,
    FactorySpec, LinkedServiceDeclaration, LinkedServiceKind, LinkedServiceResource,
    PipelineResource, ProvisionPlan, ProvisioningState,
};
