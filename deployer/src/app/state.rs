//! Application state wiring

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::api::{Credentials, HypervisorApi};
use crate::app::options::AppOptions;
use crate::catalog::ResourceCatalog;
use crate::connection::ConnectionManager;
use crate::deploy::job::{DeploymentJob, DeploymentRequest, JobId};
use crate::deploy::orchestrator::DeploymentOrchestrator;
use crate::deploy::templates::TemplateCatalog;
use crate::errors::DeployerError;
use crate::eventlog::EventLog;
use crate::events::{Event, EventBus};
use crate::registry::VmRegistry;

/// The assembled deployment core
///
/// Owns the event bus, the event log and the four stateful components, and
/// exposes the operations a renderer drives.
pub struct LabDeployer {
    options: AppOptions,
    bus: Arc<EventBus>,
    event_log: Arc<EventLog>,
    connection: Arc<ConnectionManager>,
    catalog: Arc<ResourceCatalog>,
    orchestrator: Arc<DeploymentOrchestrator>,
    registry: Arc<VmRegistry>,
}

impl LabDeployer {
    /// Wire up the component graph around the given API client
    pub fn new(api: Arc<dyn HypervisorApi>, options: AppOptions) -> Self {
        Self::with_templates(api, options, TemplateCatalog::builtin())
    }

    /// Same as [`LabDeployer::new`] with a caller-supplied template table
    pub fn with_templates(
        api: Arc<dyn HypervisorApi>,
        options: AppOptions,
        templates: TemplateCatalog,
    ) -> Self {
        info!("Initializing lab deployer core...");

        let bus = Arc::new(EventBus::new(options.bus_capacity));
        let event_log = Arc::new(EventLog::new(bus.clone()));
        let connection = Arc::new(ConnectionManager::new(
            api.clone(),
            event_log.clone(),
            bus.clone(),
        ));
        let catalog = Arc::new(ResourceCatalog::new(
            api.clone(),
            connection.clone(),
            options.catalog_fetch_timeout,
            event_log.clone(),
            bus.clone(),
        ));
        let registry = Arc::new(VmRegistry::new(
            api.clone(),
            event_log.clone(),
            bus.clone(),
        ));
        let orchestrator = Arc::new(DeploymentOrchestrator::new(
            api,
            catalog.clone(),
            registry.clone(),
            templates,
            options.orchestrator.clone(),
            event_log.clone(),
            bus.clone(),
        ));

        Self {
            options,
            bus,
            event_log,
            connection,
            catalog,
            orchestrator,
            registry,
        }
    }

    /// Subscribe to core events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// The append-only event log
    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// The connection manager
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// The resource catalog
    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    /// The deployment orchestrator
    pub fn orchestrator(&self) -> &DeploymentOrchestrator {
        &self.orchestrator
    }

    /// The VM registry
    pub fn registry(&self) -> &VmRegistry {
        &self.registry
    }

    /// Connect to the hypervisor control plane
    pub async fn connect(
        &self,
        host: &str,
        credentials: &Credentials,
    ) -> Result<(), DeployerError> {
        self.connection
            .connect(host, credentials, self.options.connect_timeout)
            .await
    }

    /// Disconnect and drop the catalog cache
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
        self.catalog.invalidate().await;
    }

    /// Submit a request and run the job to completion
    pub async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentJob, DeployerError> {
        let id = self.orchestrator.submit(request).await?;
        self.orchestrator.run(id).await?;
        self.orchestrator.job(id).await
    }

    /// Submit a request without running it
    pub async fn submit(&self, request: DeploymentRequest) -> Result<JobId, DeployerError> {
        self.orchestrator.submit(request).await
    }

    /// Start a registered VM
    pub async fn start_vm(&self, vmid: u32) -> Result<(), DeployerError> {
        self.registry.start(vmid, self.options.power_timeout).await
    }

    /// Stop a registered VM
    pub async fn stop_vm(&self, vmid: u32) -> Result<(), DeployerError> {
        self.registry.stop(vmid, self.options.power_timeout).await
    }
}
