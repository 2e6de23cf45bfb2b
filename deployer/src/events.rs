//! Typed events published by the core components
//!
//! Any renderer (CLI, web UI, dashboard) subscribes to the bus and reacts
//! to state changes without reaching into component internals.

use tokio::sync::broadcast;

use crate::connection::ConnectionState;
use crate::deploy::job::{JobId, JobStatus};
use crate::eventlog::LogEntry;
use crate::registry::PowerState;

/// An event emitted by one of the core components
#[derive(Debug, Clone)]
pub enum Event {
    /// The connection state machine transitioned
    ConnectionStateChanged {
        host: String,
        state: ConnectionState,
    },

    /// The resource catalog was (re)fetched
    CatalogUpdated {
        nodes: usize,
        storage_pools: usize,
    },

    /// A deployment step completed
    DeploymentProgress {
        job_id: JobId,
        step_index: usize,
        step_name: String,
        percent: u8,
    },

    /// A deployment job reached a terminal state
    JobCompleted {
        job_id: JobId,
        status: JobStatus,
    },

    /// A registered VM changed power state
    VmStateChanged {
        vmid: u32,
        power_state: PowerState,
    },

    /// A line was appended to the event log
    LogAppended(LogEntry),
}

/// Broadcast bus carrying [`Event`] values to any number of subscribers
///
/// Publishing never blocks and never fails the publisher; events sent while
/// no subscriber is attached are dropped.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: Event) {
        // A send error only means nobody is listening right now
        let _ = self.tx.send(event);
    }

    /// Subscribe to events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
