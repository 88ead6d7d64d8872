//! Dependency-ordered provisioning orchestration.
//!
//! One run walks a fixed stage order (factory, linked services, datasets,
//! pipeline) because each stage references the previous one by name. Every
//! operation is an idempotent upsert, so a run is safe to repeat after a
//! partial failure; nothing is rolled back. The first error aborts the run,
//! tagged with the stage it surfaced in.
//!
//! The factory settles asynchronously: after the upsert the orchestrator
//! polls its provisioning state on a fixed interval until it leaves
//! `Pending`, bounded by a configurable attempt budget. A cancellation token
//! is honored between operations and inside the poll sleep.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::errors::{Error, Result};
use crate::factory::builders::{BuildContext, BuilderRegistry};
use crate::factory::resources::{
    Activity, CopyActivity, CopyActivityProperties, CopySink, CopySource, DatasetReference,
    FactorySpec, PipelineProperties, PipelineResource, ProvisionPlan, ProvisioningState,
};
use crate::factory::ResourceClient;
use crate::secrets::SecretStore;

/// Orchestration stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CreateFactory,
    CreateLinkedServices,
    CreateDatasets,
    CreatePipeline,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateFactory => "CreateFactory",
            Self::CreateLinkedServices => "CreateLinkedServices",
            Self::CreateDatasets => "CreateDatasets",
            Self::CreatePipeline => "CreatePipeline",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bounds for the provisioning-state poll.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Delay between polls
    pub interval: Duration,
    /// Number of polls before the wait is abandoned
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(1), max_attempts: 300 }
    }
}

/// Executes the ordered creation workflow against injected collaborators.
pub struct ProvisioningOrchestrator {
    resources: Arc<dyn ResourceClient>,
    secrets: Arc<dyn SecretStore>,
    registry: BuilderRegistry,
    settings: Settings,
    poll: PollConfig,
    cancel: CancellationToken,
}

impl ProvisioningOrchestrator {
    /// Create an orchestrator with the default builder registry.
    pub fn new(
        resources: Arc<dyn ResourceClient>,
        secrets: Arc<dyn SecretStore>,
        settings: Settings,
    ) -> Self {
        let poll = PollConfig {
            interval: settings.provision.poll_interval(),
            max_attempts: settings.provision.poll_max_attempts,
        };
        Self {
            resources,
            secrets,
            registry: BuilderRegistry::with_defaults(),
            settings,
            poll,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the builder registry.
    pub fn with_registry(mut self, registry: BuilderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Override the poll bounds.
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Attach a cancellation token honored by every stage.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the full workflow for a plan.
    ///
    /// Aborts on the first error; the returned error is tagged with the stage
    /// that failed and wraps the underlying cause unmodified.
    pub async fn run(&self, plan: &ProvisionPlan) -> Result<()> {
        self.create_factory().await.map_err(|e| e.at_stage(Stage::CreateFactory.as_str()))?;
        self.create_linked_services(plan)
            .await
            .map_err(|e| e.at_stage(Stage::CreateLinkedServices.as_str()))?;
        self.create_datasets(plan).await.map_err(|e| e.at_stage(Stage::CreateDatasets.as_str()))?;
        self.create_pipeline(plan).await.map_err(|e| e.at_stage(Stage::CreatePipeline.as_str()))?;

        info!(
            factory = %self.settings.provision.factory_name,
            "All declared resources upserted, provisioning complete"
        );
        Ok(())
    }

    /// Upsert the factory and wait for its provisioning state to settle.
    async fn create_factory(&self) -> Result<()> {
        self.ensure_active()?;

        let provision = &self.settings.provision;
        info!(
            factory = %provision.factory_name,
            resource_group = %provision.resource_group,
            region = %provision.region,
            "Creating factory"
        );

        let spec = FactorySpec::new(&provision.region);
        self.resources
            .upsert_factory(&provision.resource_group, &provision.factory_name, &spec)
            .await?;

        for attempt in 1..=self.poll.max_attempts {
            self.ensure_active()?;
            let factory = self
                .resources
                .get_factory(&provision.resource_group, &provision.factory_name)
                .await?;

            match factory.properties.provisioning_state {
                Some(ProvisioningState::Failed) => {
                    return Err(Error::ProvisioningFailed {
                        name: provision.factory_name.clone(),
                    });
                }
                Some(ProvisioningState::Pending) => {
                    debug!(attempt, "Factory provisioning still pending");
                    self.sleep(self.poll.interval).await?;
                }
                _ => {
                    info!(factory = %provision.factory_name, "Factory provisioned");
                    return Ok(());
                }
            }
        }

        Err(Error::ProvisioningTimeout {
            name: provision.factory_name.clone(),
            attempts: self.poll.max_attempts,
        })
    }

    /// Upsert declared linked services in input order.
    ///
    /// Secrets are resolved here, just-in-time per declaration, never
    /// pre-fetched. Kinds without a registered builder are skipped.
    async fn create_linked_services(&self, plan: &ProvisionPlan) -> Result<()> {
        let provision = &self.settings.provision;
        let ctx = BuildContext { secrets: self.secrets.as_ref(), settings: &self.settings };

        for declaration in &plan.linked_services {
            self.ensure_active()?;

            let Some(builder) = self.registry.linked_service(declaration.kind) else {
                warn!(
                    kind = %declaration.kind,
                    name = %declaration.name,
                    "No builder registered for linked-service kind, skipping"
                );
                continue;
            };

            info!(name = %declaration.name, kind = %declaration.kind, "Creating linked service");
            let payload = builder.build(&ctx, declaration).await?;
            self.resources
                .upsert_linked_service(
                    &provision.resource_group,
                    &provision.factory_name,
                    &declaration.name,
                    &payload,
                )
                .await?;
            info!(name = %declaration.name, "Linked service created");
        }

        Ok(())
    }

    /// Upsert declared datasets that name a linked service.
    async fn create_datasets(&self, plan: &ProvisionPlan) -> Result<()> {
        let provision = &self.settings.provision;

        for declaration in &plan.datasets {
            self.ensure_active()?;

            if declaration.linked_service_name.is_empty() {
                debug!(name = %declaration.name, "Dataset has no linked service, skipping");
                continue;
            }
            let Some(build) = self.registry.dataset(declaration.kind) else {
                warn!(
                    kind = %declaration.kind,
                    name = %declaration.name,
                    "No builder registered for dataset kind, skipping"
                );
                continue;
            };

            info!(name = %declaration.name, kind = %declaration.kind, "Creating dataset");
            let payload = build(declaration);
            self.resources
                .upsert_dataset(
                    &provision.resource_group,
                    &provision.factory_name,
                    &declaration.name,
                    &payload,
                )
                .await?;
            info!(name = %declaration.name, "Dataset created");
        }

        Ok(())
    }

    /// Upsert the copy pipeline between two declared datasets.
    async fn create_pipeline(&self, plan: &ProvisionPlan) -> Result<()> {
        self.ensure_active()?;

        let provision = &self.settings.provision;
        let pipeline = &plan.pipeline;

        // Both endpoints must name a dataset the previous stage submitted.
        for dataset_name in [&pipeline.input_dataset, &pipeline.output_dataset] {
            let submitted = plan
                .datasets
                .iter()
                .any(|d| &d.name == dataset_name && !d.linked_service_name.is_empty());
            if !submitted {
                return Err(Error::config(format!(
                    "pipeline '{}' references dataset '{}' which was not submitted",
                    pipeline.name, dataset_name
                )));
            }
        }

        info!(name = %pipeline.name, "Creating pipeline");
        let payload = PipelineResource {
            properties: PipelineProperties {
                activities: vec![Activity::Copy(CopyActivity {
                    name: pipeline.activity_name.clone(),
                    inputs: vec![DatasetReference::new(&pipeline.input_dataset)],
                    outputs: vec![DatasetReference::new(&pipeline.output_dataset)],
                    type_properties: CopyActivityProperties {
                        source: CopySource::Sql {},
                        sink: CopySink::CommonDataService {
                            write_batch_size: provision.batch_size,
                            ignore_null_values: provision.ignore_null_values,
                        },
                    },
                })],
            },
        };
        self.resources
            .upsert_pipeline(
                &provision.resource_group,
                &provision.factory_name,
                &pipeline.name,
                &payload,
            )
            .await?;
        info!(name = %pipeline.name, "Pipeline created");

        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
