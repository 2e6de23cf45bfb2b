//! Application configuration options

use std::time::Duration;

use crate::deploy::orchestrator::OrchestratorSettings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Timeout for the connect handshake
    pub connect_timeout: Duration,

    /// Timeout for a catalog fetch
    pub catalog_fetch_timeout: Duration,

    /// Timeout for VM power transitions
    pub power_timeout: Duration,

    /// Event bus channel capacity
    pub bus_capacity: usize,

    /// Orchestrator settings
    pub orchestrator: OrchestratorSettings,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            catalog_fetch_timeout: Duration::from_secs(15),
            power_timeout: Duration::from_secs(30),
            bus_capacity: 256,
            orchestrator: OrchestratorSettings::default(),
        }
    }
}
