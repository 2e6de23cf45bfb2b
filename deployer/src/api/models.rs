//! Wire models for the Proxmox VE API
//!
//! Shapes follow the `/api2/json` endpoints; every response body is wrapped
//! in a `{"data": ...}` envelope.

use serde::{Deserialize, Serialize};

/// Response envelope used by every Proxmox endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// A cluster node as returned by `/nodes`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NodeListItem {
    /// Node name (e.g., "pve")
    pub node: String,

    /// Current status (e.g., "online", "offline")
    pub status: String,

    /// CPU usage fraction (0.0 to 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,

    /// Maximum CPU count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxcpu: Option<u32>,

    /// Memory usage in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem: Option<u64>,

    /// Maximum memory in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxmem: Option<u64>,

    /// Uptime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
}

/// A storage pool as returned by `/storage`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageListItem {
    /// Storage identifier (e.g., "local-lvm")
    pub storage: String,

    /// Storage backend type (e.g., "lvmthin", "dir")
    #[serde(rename = "type")]
    pub storage_type: String,

    /// Whether the storage is enabled (0/1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<u8>,

    /// Whether the storage is active (0/1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<u8>,

    /// Allowed content types (e.g., "images,iso")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Version info from `/version`, used as the authentication probe
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VersionInfo {
    /// Full version string (e.g., "8.2.4")
    pub version: String,

    /// Release series (e.g., "8.2")
    pub release: String,

    /// Repository build id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repoid: Option<String>,
}
