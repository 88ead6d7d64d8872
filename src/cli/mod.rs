//! # Command Line Interface
//!
//! Entry-point wiring: parse arguments, initialise logging, resolve the
//! run's credential once, and hand the assembled collaborators to the
//! orchestrator. This is the only layer that uses `anyhow`; everything below
//! returns the crate's typed errors.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::auth::{ClientSecretTokenProvider, CredentialResolver};
use crate::config::{EnvConfigProvider, Settings};
use crate::factory::{HttpResourceClient, ProvisionPlan};
use crate::orchestrator::ProvisioningOrchestrator;
use crate::secrets::SecretStore;

#[derive(Parser)]
#[command(name = "datafab")]
#[command(about = "Data-integration workspace provisioning tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision the workspace: factory, linked services, datasets, pipeline
    Provision {
        /// Target resource-group name
        #[arg(long, default_value = "rsd-automation")]
        resource_group: String,

        /// Datacenter region for the factory
        #[arg(long, default_value = "westus")]
        region: String,

        /// Factory resource name
        #[arg(long, default_value = "datafab-demo")]
        factory_name: String,

        /// Sink write batch size for the copy pipeline
        #[arg(long, default_value_t = 50)]
        batch_size: u32,

        /// Copy null values into the sink instead of dropping them
        #[arg(long)]
        keep_null_values: bool,
    },
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    initialise_logging(cli.verbose)?;

    match cli.command {
        Commands::Provision { resource_group, region, factory_name, batch_size, keep_null_values } => {
            handle_provision(resource_group, region, factory_name, batch_size, keep_null_values)
                .await?
        }
    }

    Ok(())
}

async fn handle_provision(
    resource_group: String,
    region: String,
    factory_name: String,
    batch_size: u32,
    keep_null_values: bool,
) -> anyhow::Result<()> {
    let provider = EnvConfigProvider::new();
    let mut settings = Settings::from_provider(&provider)?;
    settings.provision.resource_group = resource_group;
    settings.provision.region = region;
    settings.provision.factory_name = factory_name;
    settings.provision.batch_size = batch_size;
    settings.provision.ignore_null_values = !keep_null_values;

    // One credential per run: resolve it here and pass the handle down.
    let resolver = CredentialResolver::new(settings.vault.clone());
    info!(mode = %resolver.mode(), "Resolving credential");
    let secrets = resolver.resolve().await?;

    // The management plane authenticates with a client secret that itself
    // lives in the vault.
    Settings::require_non_empty(&[
        ("ProdClientId", &settings.vault.prod_client_id),
        ("TenantId", &settings.vault.tenant_id),
        ("SubscriptionId", &settings.cloud.subscription_id),
    ])?;
    info!(secret = %settings.cloud.management_secret_name, "Fetching management-plane credential");
    let management_secret = secrets.get_secret(&settings.cloud.management_secret_name).await?;
    let tokens = Arc::new(ClientSecretTokenProvider::new(
        settings.vault.authority_or_default(),
        &settings.vault.tenant_id,
        &settings.vault.prod_client_id,
        management_secret,
    )?);
    let resources = Arc::new(HttpResourceClient::new(
        &settings.cloud.management_endpoint,
        &settings.cloud.subscription_id,
        tokens,
    )?);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling provisioning run");
                cancel.cancel();
            }
        });
    }

    let orchestrator =
        ProvisioningOrchestrator::new(resources, secrets, settings).with_cancellation(cancel);
    orchestrator.run(&ProvisionPlan::standard()).await?;

    Ok(())
}

fn initialise_logging(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", default_level);
    }

    if tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_env_filter(EnvFilter::from_default_env()).finish(),
    )
    .is_err()
    {
        // Subscriber already set elsewhere (e.g. integration tests); ignore.
    }
    Ok(())
}
