//! One-shot deployment flow for the CLI

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info};

use crate::api::proxmox::ProxmoxClient;
use crate::app::options::AppOptions;
use crate::app::state::LabDeployer;
use crate::config::Config;
use crate::deploy::job::DeploymentRequest;
use crate::errors::DeployerError;
use crate::events::Event;

/// Parameters of one CLI invocation
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Path to the config file
    pub config_path: String,

    /// Lab template to deploy
    pub template_id: String,

    /// Application options
    pub app: AppOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            config_path: "config.json".to_string(),
            template_id: "rhcsa9-base".to_string(),
            app: AppOptions::default(),
        }
    }
}

fn request_from_config(config: &Config, template_id: &str) -> DeploymentRequest {
    DeploymentRequest {
        template_id: template_id.to_string(),
        node: config.default_node.clone().unwrap_or_default(),
        storage_pool: config.default_storage.clone().unwrap_or_default(),
        network_bridge: config.default_bridge.clone().unwrap_or_default(),
        name_prefix: config.default_prefix.clone().unwrap_or_default(),
        iso_location: config.default_iso_location.clone().unwrap_or_default(),
    }
}

/// Load config, connect, deploy the requested template and render events
/// until the job completes or the shutdown signal fires
pub async fn run(
    options: RunOptions,
    shutdown_signal: impl Future<Output = ()>,
) -> Result<(), DeployerError> {
    let config = Config::load(&options.config_path).await?;
    info!("Configuration loaded from {}", options.config_path);

    let api = Arc::new(ProxmoxClient::new(
        &config.proxmox_host,
        &config.credentials(),
    )?);
    let deployer = LabDeployer::new(api, options.app.clone());

    // Render the event log the way the browser UI did: one line per entry
    let mut events = deployer.subscribe();
    let renderer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Event::LogAppended(entry) = event {
                println!(
                    "[{}] {}: {}",
                    entry.timestamp.format("%H:%M:%S"),
                    entry.severity,
                    entry.message
                );
            }
        }
    });

    let outcome = tokio::select! {
        result = drive(&deployer, &config, &options.template_id) => result,
        _ = shutdown_signal => {
            info!("Shutdown requested, disconnecting...");
            deployer.disconnect().await;
            Ok(())
        }
    };

    renderer.abort();
    outcome
}

async fn drive(
    deployer: &LabDeployer,
    config: &Config,
    template_id: &str,
) -> Result<(), DeployerError> {
    deployer
        .connect(&config.proxmox_host, &config.credentials())
        .await?;

    let request = request_from_config(config, template_id);
    let missing = request.missing_fields();
    if !missing.is_empty() {
        error!(
            "Config is missing deployment defaults for: {}",
            missing.join(", ")
        );
        return Err(DeployerError::ValidationError(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    let job = deployer.deploy(request).await?;
    for vm in deployer.registry().list().await {
        println!(
            "VM {} {} [{:?}] console: {}",
            vm.vmid,
            vm.name,
            vm.power_state,
            vm.console_url.as_deref().unwrap_or("-")
        );
    }
    info!("Job {} finished with status {:?}", job.id, job.status);

    Ok(())
}
