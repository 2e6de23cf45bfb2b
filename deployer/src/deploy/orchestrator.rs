//! Deployment orchestrator
//!
//! Drives the fixed provisioning step sequence against the hypervisor API,
//! one state machine per submitted job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::{HypervisorApi, VmSpec};
use crate::catalog::ResourceCatalog;
use crate::deploy::job::{
    percent_complete, DeployStep, DeploymentJob, DeploymentRequest, JobEvent, JobFsm, JobId,
    JobStatus,
};
use crate::deploy::templates::{TemplateCatalog, VmRole};
use crate::errors::DeployerError;
use crate::eventlog::EventLog;
use crate::events::{Event, EventBus};
use crate::registry::{PowerState, Vm, VmRegistry};

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Timeout applied to each deployment step
    pub step_timeout: Duration,

    /// First vmid handed out to provisioned VMs
    pub vmid_base: u32,

    /// CPU cores per lab VM
    pub vm_cores: u32,

    /// Memory per lab VM in MB
    pub vm_memory_mb: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(60),
            vmid_base: 100,
            vm_cores: 2,
            vm_memory_mb: 2048,
        }
    }
}

struct JobRecord {
    request: DeploymentRequest,
    fsm: JobFsm,
    current_step_index: Option<usize>,
    produced_vmids: Vec<u32>,
    cancel_requested: bool,
}

// Scratch state carried from step to step within one run
#[derive(Default)]
struct StepContext {
    planned: Vec<(VmRole, String)>,
    specs: Vec<(VmRole, VmSpec)>,
    created: Vec<Vm>,
}

/// Drives multi-step provisioning workflows
pub struct DeploymentOrchestrator {
    api: Arc<dyn HypervisorApi>,
    catalog: Arc<ResourceCatalog>,
    registry: Arc<VmRegistry>,
    templates: TemplateCatalog,
    settings: OrchestratorSettings,
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    next_vmid: AtomicU32,
    log: Arc<EventLog>,
    bus: Arc<EventBus>,
}

impl DeploymentOrchestrator {
    pub fn new(
        api: Arc<dyn HypervisorApi>,
        catalog: Arc<ResourceCatalog>,
        registry: Arc<VmRegistry>,
        templates: TemplateCatalog,
        settings: OrchestratorSettings,
        log: Arc<EventLog>,
        bus: Arc<EventBus>,
    ) -> Self {
        let next_vmid = AtomicU32::new(settings.vmid_base);
        Self {
            api,
            catalog,
            registry,
            templates,
            settings,
            jobs: RwLock::new(HashMap::new()),
            next_vmid,
            log,
            bus,
        }
    }

    /// Validate and accept a deployment request
    ///
    /// Rejects with `ValidationError` (listing every missing field, or a
    /// target absent from the catalog) or `DuplicateJobError` when a
    /// Pending/Running job already owns the same name prefix.
    pub async fn submit(&self, request: DeploymentRequest) -> Result<JobId, DeployerError> {
        let missing = request.missing_fields();
        if !missing.is_empty() {
            return Err(self.log.reject(DeployerError::ValidationError(format!(
                "missing required fields: {}",
                missing.join(", ")
            ))));
        }

        if !self
            .catalog
            .contains_target(&request.node, &request.storage_pool)
            .await?
        {
            return Err(self.log.reject(DeployerError::ValidationError(format!(
                "node '{}' or storage pool '{}' not present in the catalog",
                request.node, request.storage_pool
            ))));
        }

        let mut jobs = self.jobs.write().await;
        let active = jobs.values().any(|record| {
            record.request.name_prefix == request.name_prefix && !record.fsm.status().is_terminal()
        });
        if active {
            return Err(self.log.reject(DeployerError::DuplicateJobError(format!(
                "a deployment for prefix '{}' is already in progress",
                request.name_prefix
            ))));
        }

        let id = Uuid::new_v4();
        self.log.info(format!(
            "Deployment job accepted for prefix '{}'",
            request.name_prefix
        ));
        jobs.insert(
            id,
            JobRecord {
                request,
                fsm: JobFsm::new(),
                current_step_index: None,
                produced_vmids: Vec::new(),
                cancel_requested: false,
            },
        );

        Ok(id)
    }

    /// Execute a pending job through every step
    ///
    /// Steps run strictly in sequence; a step failure (or cancellation
    /// between steps) leaves the job Failed and already-completed steps are
    /// not rolled back.
    pub async fn run(&self, id: JobId) -> Result<(), DeployerError> {
        let request = {
            let mut jobs = self.jobs.write().await;
            let record = jobs
                .get_mut(&id)
                .ok_or_else(|| DeployerError::NotFoundError(format!("unknown job {}", id)))
                .map_err(|e| self.log.reject(e))?;
            record
                .fsm
                .process(JobEvent::Start)
                .map_err(|e| self.log.reject(DeployerError::JobError(e)))?;
            record.current_step_index = Some(0);
            record.request.clone()
        };

        self.log
            .info(format!("Starting deployment of {}", request.template_id));
        self.log.info(format!(
            "Using node: {}, storage: {}, bridge: {}",
            request.node, request.storage_pool, request.network_bridge
        ));

        let total = DeployStep::SEQUENCE.len();
        let mut ctx = StepContext::default();

        for (index, step) in DeployStep::SEQUENCE.iter().enumerate() {
            if self.cancel_requested(id).await {
                return Err(self.finish_cancelled(id, &request).await);
            }

            {
                let mut jobs = self.jobs.write().await;
                if let Some(record) = jobs.get_mut(&id) {
                    record.current_step_index = Some(index);
                }
            }

            debug!("Job {} step {}: {}", id, index, step.label());
            let outcome = tokio::time::timeout(
                self.settings.step_timeout,
                self.execute_step(*step, &request, &mut ctx),
            )
            .await
            .map_err(|_| {
                DeployerError::TimeoutError(format!(
                    "step '{}' did not complete within {:?}",
                    step.label(),
                    self.settings.step_timeout
                ))
            })
            .and_then(|r| r);

            if let Err(e) = outcome {
                return Err(self.finish_failed(id, *step, e).await);
            }

            self.log.info(step.label());
            self.bus.publish(Event::DeploymentProgress {
                job_id: id,
                step_index: index,
                step_name: step.label().to_string(),
                percent: percent_complete(index, total),
            });
        }

        {
            let mut jobs = self.jobs.write().await;
            if let Some(record) = jobs.get_mut(&id) {
                // Succeed from Running cannot be refused
                let _ = record.fsm.process(JobEvent::Succeed);
                record.current_step_index = None;
                record.produced_vmids = ctx.created.iter().map(|vm| vm.vmid).collect();
            }
        }

        info!(
            "Deployment job {} produced {} VM(s)",
            id,
            ctx.created.len()
        );
        self.log.success("Deployment completed successfully!");
        self.bus.publish(Event::JobCompleted {
            job_id: id,
            status: JobStatus::Succeeded,
        });

        Ok(())
    }

    /// Request cancellation
    ///
    /// A Pending job is cancelled immediately; a Running job finishes its
    /// current step first. Terminal jobs cannot be cancelled.
    pub async fn cancel(&self, id: JobId) -> Result<(), DeployerError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(&id)
            .ok_or_else(|| DeployerError::NotFoundError(format!("unknown job {}", id)))
            .map_err(|e| self.log.reject(e))?;

        match record.fsm.status() {
            JobStatus::Pending => {
                // Cancel from Pending cannot be refused
                let _ = record.fsm.process(JobEvent::Cancel);
                let prefix = record.request.name_prefix.clone();
                drop(jobs);
                self.log
                    .error(format!("Deployment for '{}' cancelled", prefix));
                self.bus.publish(Event::JobCompleted {
                    job_id: id,
                    status: JobStatus::Failed,
                });
                Ok(())
            }
            JobStatus::Running => {
                record.cancel_requested = true;
                drop(jobs);
                self.log
                    .info("Cancellation requested; takes effect after the current step");
                Ok(())
            }
            status => Err(self.log.reject(DeployerError::JobError(format!(
                "job {} already finished ({:?})",
                id, status
            )))),
        }
    }

    /// Snapshot of one job
    pub async fn job(&self, id: JobId) -> Result<DeploymentJob, DeployerError> {
        let jobs = self.jobs.read().await;
        let record = jobs
            .get(&id)
            .ok_or_else(|| DeployerError::NotFoundError(format!("unknown job {}", id)))?;
        Ok(Self::snapshot(id, record))
    }

    /// Snapshots of every job
    pub async fn jobs(&self) -> Vec<DeploymentJob> {
        let jobs = self.jobs.read().await;
        jobs.iter()
            .map(|(id, record)| Self::snapshot(*id, record))
            .collect()
    }

    fn snapshot(id: JobId, record: &JobRecord) -> DeploymentJob {
        DeploymentJob {
            id,
            request: record.request.clone(),
            status: record.fsm.status(),
            current_step_index: record.current_step_index,
            produced_vmids: record.produced_vmids.clone(),
            error: record.fsm.error().map(str::to_string),
        }
    }

    async fn cancel_requested(&self, id: JobId) -> bool {
        let jobs = self.jobs.read().await;
        jobs.get(&id).is_some_and(|record| record.cancel_requested)
    }

    async fn finish_cancelled(&self, id: JobId, request: &DeploymentRequest) -> DeployerError {
        {
            let mut jobs = self.jobs.write().await;
            if let Some(record) = jobs.get_mut(&id) {
                let _ = record.fsm.process(JobEvent::Cancel);
                record.current_step_index = None;
            }
        }
        self.log.error(format!(
            "Deployment for '{}' cancelled",
            request.name_prefix
        ));
        self.bus.publish(Event::JobCompleted {
            job_id: id,
            status: JobStatus::Failed,
        });
        DeployerError::JobError("cancelled".to_string())
    }

    async fn finish_failed(&self, id: JobId, step: DeployStep, err: DeployerError) -> DeployerError {
        {
            let mut jobs = self.jobs.write().await;
            if let Some(record) = jobs.get_mut(&id) {
                let _ = record.fsm.process(JobEvent::Fail(err.to_string()));
                record.current_step_index = None;
            }
        }
        self.log.error(format!(
            "Deployment failed at '{}': {}",
            step.label(),
            err
        ));
        self.bus.publish(Event::JobCompleted {
            job_id: id,
            status: JobStatus::Failed,
        });
        err
    }

    async fn execute_step(
        &self,
        step: DeployStep,
        request: &DeploymentRequest,
        ctx: &mut StepContext,
    ) -> Result<(), DeployerError> {
        match step {
            DeployStep::TemplatePreparation => {
                ctx.planned = self
                    .templates
                    .vm_names(&request.template_id, &request.name_prefix);
                Ok(())
            }
            DeployStep::ConfigRetrieval => {
                // Fresh fetch straight from the API; the target must still
                // exist at execution time
                let nodes = self.api.list_nodes().await?;
                let pools = self.api.list_storage_pools().await?;
                let node_ok = nodes.iter().any(|n| n.node == request.node);
                let pool_ok = pools.iter().any(|p| p.storage == request.storage_pool);
                if !node_ok || !pool_ok {
                    return Err(DeployerError::ValidationError(format!(
                        "node '{}' or storage pool '{}' no longer available",
                        request.node, request.storage_pool
                    )));
                }
                Ok(())
            }
            DeployStep::NetworkSetup => {
                ctx.specs = ctx
                    .planned
                    .iter()
                    .map(|(role, name)| {
                        let spec = VmSpec {
                            vmid: self.next_vmid.fetch_add(1, Ordering::SeqCst),
                            name: name.clone(),
                            node: request.node.clone(),
                            storage_pool: request.storage_pool.clone(),
                            network_bridge: request.network_bridge.clone(),
                            iso_location: request.iso_location.clone(),
                            cores: self.settings.vm_cores,
                            memory_mb: self.settings.vm_memory_mb,
                        };
                        (*role, spec)
                    })
                    .collect();
                Ok(())
            }
            DeployStep::ServerVmCreation => self.create_vms(ctx, VmRole::Server).await,
            DeployStep::ClientVmCreation => self.create_vms(ctx, VmRole::Client).await,
            DeployStep::BootConfiguration => {
                for vm in &mut ctx.created {
                    self.api.start_vm(&vm.node, vm.vmid).await?;
                    vm.power_state = PowerState::Running;
                }
                Ok(())
            }
            DeployStep::ConsoleSetup => {
                for vm in &mut ctx.created {
                    let url = self.api.console_url(&vm.node, vm.vmid).await?;
                    vm.console_url = Some(url);
                }
                Ok(())
            }
            DeployStep::Finalization => {
                for vm in &ctx.created {
                    self.registry.register(vm.clone()).await?;
                }
                Ok(())
            }
        }
    }

    async fn create_vms(&self, ctx: &mut StepContext, role: VmRole) -> Result<(), DeployerError> {
        for (spec_role, spec) in &ctx.specs {
            if *spec_role != role {
                continue;
            }
            let vmid = self.api.create_vm(spec).await?;
            ctx.created.push(Vm {
                vmid,
                name: spec.name.clone(),
                node: spec.node.clone(),
                power_state: PowerState::Stopped,
                console_url: None,
            });
        }
        Ok(())
    }
}
