//! Hypervisor API client seam
//!
//! The core drives deployments through the [`HypervisorApi`] trait. The
//! production implementation is [`proxmox::ProxmoxClient`]; tests and
//! embedders without a cluster can use [`mock::MockHypervisor`].

pub mod mock;
pub mod models;
pub mod proxmox;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::errors::DeployerError;
use models::{NodeListItem, StorageListItem};

/// API token credentials
///
/// The secret half is held as a [`SecretString`] so it is redacted from
/// `Debug` output and never lands in a log line.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Token id (e.g., "root@pam!deployer")
    pub token_id: String,

    /// Token secret
    pub token_secret: SecretString,
}

impl Credentials {
    pub fn new(token_id: impl Into<String>, token_secret: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            token_secret: SecretString::from(token_secret.into()),
        }
    }
}

/// Everything needed to create one VM
#[derive(Debug, Clone, PartialEq)]
pub struct VmSpec {
    /// Cluster-unique VM id
    pub vmid: u32,

    /// VM name
    pub name: String,

    /// Target node
    pub node: String,

    /// Target storage pool for the system disk
    pub storage_pool: String,

    /// Network bridge for the first NIC
    pub network_bridge: String,

    /// Installer ISO volume (e.g., "local:iso/rhel9.iso")
    pub iso_location: String,

    /// CPU cores
    pub cores: u32,

    /// Memory in MB
    pub memory_mb: u64,
}

/// Asynchronous client capability surface against the hypervisor control plane
///
/// Every call may fail with `NetworkError`, `AuthError`, `TimeoutError` or
/// `ApiError`; classification is the implementation's job.
#[async_trait]
pub trait HypervisorApi: Send + Sync {
    /// Verify the credentials are accepted by the control plane at `host`
    async fn authenticate(&self, host: &str, credentials: &Credentials)
        -> Result<(), DeployerError>;

    /// List cluster nodes
    async fn list_nodes(&self) -> Result<Vec<NodeListItem>, DeployerError>;

    /// List storage pools (cluster-wide)
    async fn list_storage_pools(&self) -> Result<Vec<StorageListItem>, DeployerError>;

    /// Create a VM; returns the vmid of the created VM
    async fn create_vm(&self, spec: &VmSpec) -> Result<u32, DeployerError>;

    /// Start a VM
    async fn start_vm(&self, node: &str, vmid: u32) -> Result<(), DeployerError>;

    /// Stop a VM
    async fn stop_vm(&self, node: &str, vmid: u32) -> Result<(), DeployerError>;

    /// Resolve the noVNC console URL for a VM
    async fn console_url(&self, node: &str, vmid: u32) -> Result<String, DeployerError>;
}
