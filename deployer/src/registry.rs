//! VM lifecycle registry
//!
//! Tracks every provisioned VM and owns its power state transitions. Start
//! and stop pass through `Transitioning` while the hypervisor acknowledges
//! the request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::api::HypervisorApi;
use crate::errors::DeployerError;
use crate::eventlog::EventLog;
use crate::events::{Event, EventBus};

/// Power state of a registered VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    Running,
    Stopped,
    Transitioning,
}

/// A provisioned VM
#[derive(Debug, Clone)]
pub struct Vm {
    /// Cluster-unique VM id
    pub vmid: u32,

    /// VM name
    pub name: String,

    /// Node hosting the VM
    pub node: String,

    /// Current power state
    pub power_state: PowerState,

    /// noVNC console URL, when resolved
    pub console_url: Option<String>,
}

/// Registry of provisioned VMs
pub struct VmRegistry {
    api: Arc<dyn HypervisorApi>,
    vms: RwLock<HashMap<u32, Vm>>,
    log: Arc<EventLog>,
    bus: Arc<EventBus>,
}

impl VmRegistry {
    pub fn new(api: Arc<dyn HypervisorApi>, log: Arc<EventLog>, bus: Arc<EventBus>) -> Self {
        Self {
            api,
            vms: RwLock::new(HashMap::new()),
            log,
            bus,
        }
    }

    /// Register a freshly provisioned VM; vmids must be unique
    pub async fn register(&self, vm: Vm) -> Result<(), DeployerError> {
        let mut vms = self.vms.write().await;
        if vms.contains_key(&vm.vmid) {
            return Err(self.log.reject(DeployerError::ValidationError(format!(
                "VM {} is already registered",
                vm.vmid
            ))));
        }

        self.log.info(format!(
            "Registered VM {} ({}) in state {:?}",
            vm.vmid, vm.name, vm.power_state
        ));
        self.bus.publish(Event::VmStateChanged {
            vmid: vm.vmid,
            power_state: vm.power_state,
        });
        vms.insert(vm.vmid, vm);
        Ok(())
    }

    /// Look up a VM by id
    pub async fn get(&self, vmid: u32) -> Result<Vm, DeployerError> {
        let vms = self.vms.read().await;
        vms.get(&vmid)
            .cloned()
            .ok_or_else(|| DeployerError::NotFoundError(format!("unknown VM {}", vmid)))
            .map_err(|e| self.log.reject(e))
    }

    /// All registered VMs, ordered by vmid
    pub async fn list(&self) -> Vec<Vm> {
        let vms = self.vms.read().await;
        let mut list: Vec<Vm> = vms.values().cloned().collect();
        list.sort_by_key(|vm| vm.vmid);
        list
    }

    /// Number of registered VMs
    pub async fn len(&self) -> usize {
        self.vms.read().await.len()
    }

    /// Check if the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Start a VM; no-op if already running
    pub async fn start(&self, vmid: u32, timeout: Duration) -> Result<(), DeployerError> {
        self.transition(vmid, PowerState::Running, timeout).await
    }

    /// Stop a VM; no-op if already stopped
    pub async fn stop(&self, vmid: u32, timeout: Duration) -> Result<(), DeployerError> {
        self.transition(vmid, PowerState::Stopped, timeout).await
    }

    /// Console URL for a VM, resolving it on demand if unknown
    pub async fn console_url(&self, vmid: u32) -> Result<String, DeployerError> {
        let vm = self.get(vmid).await?;
        if let Some(url) = vm.console_url {
            self.log
                .info(format!("Opening console for {} (ID: {})", vm.name, vmid));
            return Ok(url);
        }

        let url = match self.api.console_url(&vm.node, vmid).await {
            Ok(url) => url,
            Err(e) => return Err(self.log.reject(e)),
        };
        {
            let mut vms = self.vms.write().await;
            if let Some(vm) = vms.get_mut(&vmid) {
                vm.console_url = Some(url.clone());
            }
        }
        self.log
            .info(format!("Opening console for {} (ID: {})", vm.name, vmid));
        Ok(url)
    }

    async fn transition(
        &self,
        vmid: u32,
        target: PowerState,
        timeout: Duration,
    ) -> Result<(), DeployerError> {
        let (node, previous) = {
            let mut vms = self.vms.write().await;
            let vm = vms
                .get_mut(&vmid)
                .ok_or_else(|| DeployerError::NotFoundError(format!("unknown VM {}", vmid)))
                .map_err(|e| self.log.reject(e))?;

            if vm.power_state == target {
                debug!("VM {} already {:?}, nothing to do", vmid, target);
                return Ok(());
            }
            if vm.power_state == PowerState::Transitioning {
                return Err(self.log.reject(DeployerError::JobError(format!(
                    "VM {} has a power transition in flight",
                    vmid
                ))));
            }

            let previous = vm.power_state;
            vm.power_state = PowerState::Transitioning;
            (vm.node.clone(), previous)
        };

        let verb = match target {
            PowerState::Running => "Starting",
            _ => "Stopping",
        };
        self.log.info(format!("{} VM {}...", verb, vmid));
        self.bus.publish(Event::VmStateChanged {
            vmid,
            power_state: PowerState::Transitioning,
        });

        let call = async {
            match target {
                PowerState::Running => self.api.start_vm(&node, vmid).await,
                _ => self.api.stop_vm(&node, vmid).await,
            }
        };
        let result = tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| {
                DeployerError::TimeoutError(format!(
                    "power transition of VM {} did not complete within {:?}",
                    vmid, timeout
                ))
            })
            .and_then(|r| r);

        match result {
            Ok(()) => {
                self.settle(vmid, target).await;
                let done = match target {
                    PowerState::Running => "started",
                    _ => "stopped",
                };
                self.log
                    .success(format!("VM {} {} successfully", vmid, done));
                Ok(())
            }
            Err(e) => {
                // Settle back to where we were; the hypervisor refused
                self.settle(vmid, previous).await;
                Err(self.log.reject(e))
            }
        }
    }

    async fn settle(&self, vmid: u32, state: PowerState) {
        {
            let mut vms = self.vms.write().await;
            if let Some(vm) = vms.get_mut(&vmid) {
                vm.power_state = state;
            }
        }
        self.bus.publish(Event::VmStateChanged {
            vmid,
            power_state: state,
        });
    }
}
