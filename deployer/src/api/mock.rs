//! In-memory hypervisor used by tests and offline demos

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use super::models::{NodeListItem, StorageListItem};
use super::{Credentials, HypervisorApi, VmSpec};
use crate::errors::DeployerError;

/// Scriptable [`HypervisorApi`] implementation
///
/// Behaves like a healthy two-node cluster by default; failure modes and
/// delays can be toggled per test.
pub struct MockHypervisor {
    nodes: RwLock<Vec<NodeListItem>>,
    storage_pools: RwLock<Vec<StorageListItem>>,
    vms: RwLock<HashMap<u32, VmSpec>>,

    reject_credentials: AtomicBool,
    unreachable: AtomicBool,
    fail_start: AtomicBool,
    auth_delay: RwLock<Duration>,
    create_delay: RwLock<Duration>,
    fail_create_matching: RwLock<Option<String>>,

    node_fetches: AtomicUsize,
    pool_fetches: AtomicUsize,
}

fn node(name: &str) -> NodeListItem {
    NodeListItem {
        node: name.to_string(),
        status: "online".to_string(),
        cpu: Some(0.05),
        maxcpu: Some(8),
        mem: Some(4 << 30),
        maxmem: Some(32 << 30),
        uptime: Some(86_400),
    }
}

fn pool(name: &str, storage_type: &str) -> StorageListItem {
    StorageListItem {
        storage: name.to_string(),
        storage_type: storage_type.to_string(),
        enabled: Some(1),
        active: Some(1),
        content: Some("images,iso".to_string()),
    }
}

impl MockHypervisor {
    /// Create a mock cluster with nodes "pve"/"pve2" and pools
    /// "local-lvm"/"local"
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(vec![node("pve"), node("pve2")]),
            storage_pools: RwLock::new(vec![pool("local-lvm", "lvmthin"), pool("local", "dir")]),
            vms: RwLock::new(HashMap::new()),
            reject_credentials: AtomicBool::new(false),
            unreachable: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            auth_delay: RwLock::new(Duration::ZERO),
            create_delay: RwLock::new(Duration::ZERO),
            fail_create_matching: RwLock::new(None),
            node_fetches: AtomicUsize::new(0),
            pool_fetches: AtomicUsize::new(0),
        }
    }

    /// Reject the next authentication attempts
    pub fn set_reject_credentials(&self, reject: bool) {
        self.reject_credentials.store(reject, Ordering::SeqCst);
    }

    /// Simulate an unreachable control plane
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Fail every `start_vm` call
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Delay authentication, keeping a connect attempt in flight
    pub fn set_auth_delay(&self, delay: Duration) {
        *self.auth_delay.write().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Delay VM creation, keeping a job in the Running state
    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.write().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Fail `create_vm` for any spec whose name contains `needle`
    pub fn set_fail_create_matching(&self, needle: Option<&str>) {
        *self
            .fail_create_matching
            .write()
            .unwrap_or_else(|e| e.into_inner()) = needle.map(str::to_string);
    }

    /// Replace the node inventory
    pub fn set_nodes(&self, names: &[&str]) {
        *self.nodes.write().unwrap_or_else(|e| e.into_inner()) =
            names.iter().map(|n| node(n)).collect();
    }

    /// Replace the storage pool inventory
    pub fn set_storage_pools(&self, names: &[&str]) {
        *self.storage_pools.write().unwrap_or_else(|e| e.into_inner()) =
            names.iter().map(|n| pool(n, "dir")).collect();
    }

    /// How many times `list_nodes` has been called
    pub fn node_fetches(&self) -> usize {
        self.node_fetches.load(Ordering::SeqCst)
    }

    /// How many times `list_storage_pools` has been called
    pub fn pool_fetches(&self) -> usize {
        self.pool_fetches.load(Ordering::SeqCst)
    }

    /// Snapshot of every VM created so far
    pub fn created_vms(&self) -> Vec<VmSpec> {
        let vms = self.vms.read().unwrap_or_else(|e| e.into_inner());
        let mut specs: Vec<VmSpec> = vms.values().cloned().collect();
        specs.sort_by_key(|s| s.vmid);
        specs
    }

    fn check_reachable(&self) -> Result<(), DeployerError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(DeployerError::NetworkError(
                "mock hypervisor is unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MockHypervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HypervisorApi for MockHypervisor {
    async fn authenticate(
        &self,
        host: &str,
        credentials: &Credentials,
    ) -> Result<(), DeployerError> {
        let delay = *self.auth_delay.read().unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_reachable()?;
        if self.reject_credentials.load(Ordering::SeqCst) {
            return Err(DeployerError::AuthError(format!(
                "credentials '{}' rejected by {}",
                credentials.token_id, host
            )));
        }
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeListItem>, DeployerError> {
        self.check_reachable()?;
        self.node_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn list_storage_pools(&self) -> Result<Vec<StorageListItem>, DeployerError> {
        self.check_reachable()?;
        self.pool_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .storage_pools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn create_vm(&self, spec: &VmSpec) -> Result<u32, DeployerError> {
        let delay = *self.create_delay.read().unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_reachable()?;

        let fail_matching = self
            .fail_create_matching
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(needle) = fail_matching {
            if spec.name.contains(&needle) {
                return Err(DeployerError::ApiError(format!(
                    "create of '{}' refused by mock",
                    spec.name
                )));
            }
        }

        let mut vms = self.vms.write().unwrap_or_else(|e| e.into_inner());
        if vms.contains_key(&spec.vmid) {
            return Err(DeployerError::ApiError(format!(
                "VM {} already exists",
                spec.vmid
            )));
        }
        vms.insert(spec.vmid, spec.clone());
        Ok(spec.vmid)
    }

    async fn start_vm(&self, _node: &str, vmid: u32) -> Result<(), DeployerError> {
        self.check_reachable()?;
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(DeployerError::ApiError(format!(
                "start of VM {} refused by mock",
                vmid
            )));
        }
        Ok(())
    }

    async fn stop_vm(&self, _node: &str, _vmid: u32) -> Result<(), DeployerError> {
        self.check_reachable()?;
        Ok(())
    }

    async fn console_url(&self, node: &str, vmid: u32) -> Result<String, DeployerError> {
        self.check_reachable()?;
        Ok(format!(
            "https://{}:8006/?console=kvm&novnc=1&vmid={}&node={}",
            node, vmid, node
        ))
    }
}
