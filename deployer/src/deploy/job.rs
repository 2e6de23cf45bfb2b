//! Deployment job state machine and step sequence

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a deployment job
pub type JobId = Uuid;

/// Terminal and non-terminal job states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, not yet started
    Pending,

    /// Steps are executing
    Running,

    /// All steps completed
    Succeeded,

    /// A step failed or the job was cancelled
    Failed,
}

impl JobStatus {
    /// Whether the job can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Job event
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Begin executing steps
    Start,

    /// All steps completed
    Succeed,

    /// A step failed
    Fail(String),

    /// Cancellation requested while Pending or between steps
    Cancel,
}

/// Per-job FSM
///
/// Pending -> Running -> {Succeeded | Failed}; cancellation lands in Failed
/// with reason "cancelled".
#[derive(Debug, Clone)]
pub struct JobFsm {
    status: JobStatus,
    error: Option<String>,
}

impl JobFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            status: JobStatus::Pending,
            error: None,
        }
    }

    /// Get current status
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Get failure reason if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: JobEvent) -> Result<(), String> {
        let new_status = match (self.status, &event) {
            (JobStatus::Pending, JobEvent::Start) => JobStatus::Running,
            (JobStatus::Pending, JobEvent::Cancel) => {
                self.error = Some("cancelled".to_string());
                JobStatus::Failed
            }

            (JobStatus::Running, JobEvent::Succeed) => JobStatus::Succeeded,
            (JobStatus::Running, JobEvent::Fail(reason)) => {
                self.error = Some(reason.clone());
                JobStatus::Failed
            }
            (JobStatus::Running, JobEvent::Cancel) => {
                self.error = Some("cancelled".to_string());
                JobStatus::Failed
            }

            // Terminal states accept nothing
            (status, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", status, event));
            }
        };

        self.status = new_status;
        Ok(())
    }
}

impl Default for JobFsm {
    fn default() -> Self {
        Self::new()
    }
}

/// One step of the provisioning workflow, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStep {
    TemplatePreparation,
    ConfigRetrieval,
    NetworkSetup,
    ServerVmCreation,
    ClientVmCreation,
    BootConfiguration,
    ConsoleSetup,
    Finalization,
}

impl DeployStep {
    /// The fixed step sequence every job runs through
    pub const SEQUENCE: [DeployStep; 8] = [
        DeployStep::TemplatePreparation,
        DeployStep::ConfigRetrieval,
        DeployStep::NetworkSetup,
        DeployStep::ServerVmCreation,
        DeployStep::ClientVmCreation,
        DeployStep::BootConfiguration,
        DeployStep::ConsoleSetup,
        DeployStep::Finalization,
    ];

    /// Progress line shown while the step runs
    pub fn label(&self) -> &'static str {
        match self {
            DeployStep::TemplatePreparation => "Creating VM templates...",
            DeployStep::ConfigRetrieval => "Downloading RHCSA9 configurations...",
            DeployStep::NetworkSetup => "Setting up network configuration...",
            DeployStep::ServerVmCreation => "Creating server VM...",
            DeployStep::ClientVmCreation => "Creating client VM(s)...",
            DeployStep::BootConfiguration => "Configuring boot options...",
            DeployStep::ConsoleSetup => "Setting up console access...",
            DeployStep::Finalization => "Finalizing deployment...",
        }
    }
}

/// Percentage complete after step `index` (0-based) of `total` finishes
pub fn percent_complete(index: usize, total: usize) -> u8 {
    ((100.0 * (index + 1) as f64) / total as f64).round() as u8
}

/// A deployment request as submitted by the caller; immutable once accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Lab template identifier (e.g., "rhcsa9-base")
    pub template_id: String,

    /// Target node
    pub node: String,

    /// Target storage pool
    pub storage_pool: String,

    /// Network bridge for the lab network
    pub network_bridge: String,

    /// Prefix for generated VM names; one active job per prefix
    pub name_prefix: String,

    /// Installer ISO volume
    pub iso_location: String,
}

impl DeploymentRequest {
    /// Names of every empty field, for validation reporting
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.template_id.is_empty() {
            missing.push("template_id");
        }
        if self.node.is_empty() {
            missing.push("node");
        }
        if self.storage_pool.is_empty() {
            missing.push("storage_pool");
        }
        if self.network_bridge.is_empty() {
            missing.push("network_bridge");
        }
        if self.name_prefix.is_empty() {
            missing.push("name_prefix");
        }
        if self.iso_location.is_empty() {
            missing.push("iso_location");
        }
        missing
    }
}

/// Snapshot of a job's externally visible state
#[derive(Debug, Clone)]
pub struct DeploymentJob {
    pub id: JobId,
    pub request: DeploymentRequest,
    pub status: JobStatus,
    /// Index into [`DeployStep::SEQUENCE`] of the step in flight, if any
    pub current_step_index: Option<usize>,
    /// Vmids of the VMs this job produced
    pub produced_vmids: Vec<u32>,
    /// Failure reason for Failed jobs
    pub error: Option<String>,
}
