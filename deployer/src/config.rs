//! Deployment configuration file
//!
//! Reads the flat `config.json` record: connection parameters plus optional
//! defaults for the deployment form. Missing optional defaults stay unset.

use std::path::Path;

use secrecy::SecretString;
use serde::Deserialize;

use crate::api::Credentials;
use crate::errors::DeployerError;

/// Contents of `config.json`
///
/// The token secret is deserialized straight into a [`SecretString`] so it
/// never shows up in `Debug` output.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Proxmox host (address or full URL)
    pub proxmox_host: String,

    /// API token id
    pub token_id: String,

    /// API token secret
    pub token_secret: SecretString,

    /// Default target node
    #[serde(default)]
    pub default_node: Option<String>,

    /// Default storage pool
    #[serde(default)]
    pub default_storage: Option<String>,

    /// Default network bridge
    #[serde(default)]
    pub default_bridge: Option<String>,

    /// Default VM name prefix
    #[serde(default)]
    pub default_prefix: Option<String>,

    /// Default installer ISO volume
    #[serde(default)]
    pub default_iso_location: Option<String>,
}

impl Config {
    /// Load configuration from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DeployerError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            DeployerError::ConfigError(format!("Unable to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|e| DeployerError::ConfigError(format!("Invalid config file: {}", e)))?;

        if config.proxmox_host.is_empty() || config.token_id.is_empty() {
            return Err(DeployerError::ConfigError(
                "proxmoxHost and tokenId must be set".to_string(),
            ));
        }

        Ok(config)
    }

    /// Credentials for the hypervisor API
    pub fn credentials(&self) -> Credentials {
        Credentials {
            token_id: self.token_id.clone(),
            token_secret: self.token_secret.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_full_config_parses() {
        let raw = r#"{
            "proxmoxHost": "10.0.0.5",
            "tokenId": "root@pam!deployer",
            "tokenSecret": "abc-123",
            "defaultNode": "pve",
            "defaultStorage": "local-lvm",
            "defaultBridge": "vmbr0",
            "defaultPrefix": "lab",
            "defaultIsoLocation": "local:iso/rhel9.iso"
        }"#;

        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.proxmox_host, "10.0.0.5");
        assert_eq!(config.token_id, "root@pam!deployer");
        assert_eq!(config.token_secret.expose_secret(), "abc-123");
        assert_eq!(config.default_node.as_deref(), Some("pve"));
        assert_eq!(config.default_prefix.as_deref(), Some("lab"));
    }

    #[test]
    fn test_optional_defaults_stay_unset() {
        let raw = r#"{
            "proxmoxHost": "10.0.0.5",
            "tokenId": "root@pam!deployer",
            "tokenSecret": "abc-123"
        }"#;

        let config: Config = serde_json::from_str(raw).unwrap();
        assert!(config.default_node.is_none());
        assert!(config.default_storage.is_none());
        assert!(config.default_bridge.is_none());
        assert!(config.default_prefix.is_none());
        assert!(config.default_iso_location.is_none());
    }

    #[test]
    fn test_secret_redacted_in_debug() {
        let raw = r#"{
            "proxmoxHost": "10.0.0.5",
            "tokenId": "root@pam!deployer",
            "tokenSecret": "super-secret"
        }"#;

        let config: Config = serde_json::from_str(raw).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
    }
}
