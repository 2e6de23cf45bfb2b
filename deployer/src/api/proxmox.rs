//! Proxmox VE API client

use reqwest::{header, Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};
use url::Url;

use super::models::{ApiResponse, NodeListItem, StorageListItem, VersionInfo};
use super::{Credentials, HypervisorApi, VmSpec};
use crate::errors::DeployerError;

/// HTTP client for a Proxmox VE control plane
pub struct ProxmoxClient {
    client: Client,
    base_url: String,
    auth_header: String,
}

impl ProxmoxClient {
    /// Create a new client for `host` using API token authentication
    ///
    /// `host` may be a bare address ("10.0.0.5"), in which case the default
    /// Proxmox port and https scheme are assumed.
    pub fn new(host: &str, credentials: &Credentials) -> Result<Self, DeployerError> {
        let base = if host.contains("://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}:8006", host)
        };
        Url::parse(&base)
            .map_err(|e| DeployerError::ConfigError(format!("Invalid host '{}': {}", host, e)))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let auth_header = format!(
            "PVEAPIToken={}={}",
            credentials.token_id,
            credentials.token_secret.expose_secret()
        );

        Ok(Self {
            client,
            base_url: format!("{}/api2/json", base),
            auth_header,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn classify(err: reqwest::Error) -> DeployerError {
        if err.is_timeout() {
            DeployerError::TimeoutError(err.to_string())
        } else if err.is_connect() {
            DeployerError::NetworkError(err.to_string())
        } else {
            DeployerError::ApiError(err.to_string())
        }
    }

    fn status_error(status: StatusCode, body: String) -> DeployerError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            DeployerError::AuthError(format!("{}: {}", status, body))
        } else {
            DeployerError::ApiError(format!("{}: {}", status, body))
        }
    }

    /// Make a GET request
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, DeployerError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, &self.auth_header)
            .send()
            .await
            .map_err(Self::classify)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP GET failed: {} - {}", status, body);
            return Err(Self::status_error(status, body));
        }

        let body: ApiResponse<T> = response.json().await.map_err(Self::classify)?;
        Ok(body.data)
    }

    /// Make a POST request
    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, DeployerError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, &self.auth_header)
            .json(body)
            .send()
            .await
            .map_err(Self::classify)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP POST failed: {} - {}", status, body);
            return Err(Self::status_error(status, body));
        }

        let body: ApiResponse<T> = response.json().await.map_err(Self::classify)?;
        Ok(body.data)
    }
}

#[async_trait::async_trait]
impl HypervisorApi for ProxmoxClient {
    async fn authenticate(
        &self,
        _host: &str,
        _credentials: &Credentials,
    ) -> Result<(), DeployerError> {
        // /version requires a valid token, so it doubles as the auth probe
        let version: VersionInfo = self.get("/version").await?;
        debug!("Authenticated against Proxmox VE {}", version.version);
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeListItem>, DeployerError> {
        self.get("/nodes").await
    }

    async fn list_storage_pools(&self) -> Result<Vec<StorageListItem>, DeployerError> {
        self.get("/storage").await
    }

    async fn create_vm(&self, spec: &VmSpec) -> Result<u32, DeployerError> {
        let path = format!("/nodes/{}/qemu", spec.node);
        let body = serde_json::json!({
            "vmid": spec.vmid,
            "name": spec.name,
            "cores": spec.cores,
            "memory": spec.memory_mb,
            "net0": format!("virtio,bridge={}", spec.network_bridge),
            "ide2": format!("{},media=cdrom", spec.iso_location),
            "scsi0": format!("{}:32", spec.storage_pool),
            "scsihw": "virtio-scsi-pci",
            "boot": "order=scsi0;ide2",
        });

        // The response payload is the task UPID; the vmid is caller-assigned
        let _upid: String = self.post(&path, &body).await?;
        Ok(spec.vmid)
    }

    async fn start_vm(&self, node: &str, vmid: u32) -> Result<(), DeployerError> {
        let path = format!("/nodes/{}/qemu/{}/status/start", node, vmid);
        let _upid: String = self.post(&path, &serde_json::json!({})).await?;
        Ok(())
    }

    async fn stop_vm(&self, node: &str, vmid: u32) -> Result<(), DeployerError> {
        let path = format!("/nodes/{}/qemu/{}/status/stop", node, vmid);
        let _upid: String = self.post(&path, &serde_json::json!({})).await?;
        Ok(())
    }

    async fn console_url(&self, node: &str, vmid: u32) -> Result<String, DeployerError> {
        let base = self.base_url.trim_end_matches("/api2/json");
        Ok(format!(
            "{}/?console=kvm&novnc=1&vmid={}&node={}",
            base, vmid, node
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_gets_scheme_and_port() {
        let creds = Credentials::new("root@pam!deployer", "secret");
        let client = ProxmoxClient::new("10.0.0.5", &creds).unwrap();
        assert_eq!(client.base_url(), "https://10.0.0.5:8006/api2/json");
    }

    #[test]
    fn test_full_url_host_kept() {
        let creds = Credentials::new("root@pam!deployer", "secret");
        let client = ProxmoxClient::new("https://pve.lab.local:8006/", &creds).unwrap();
        assert_eq!(client.base_url(), "https://pve.lab.local:8006/api2/json");
    }

    #[test]
    fn test_invalid_host_rejected() {
        let creds = Credentials::new("root@pam!deployer", "secret");
        let result = ProxmoxClient::new("http://[bad", &creds);
        assert!(matches!(result, Err(DeployerError::ConfigError(_))));
    }
}
