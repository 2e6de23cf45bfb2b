//! Connection lifecycle against the hypervisor control plane

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::api::{Credentials, HypervisorApi};
use crate::errors::DeployerError;
use crate::eventlog::EventLog;
use crate::events::{Event, EventBus};

/// State of the authenticated session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[derive(Debug, Clone)]
struct ConnectionInner {
    state: ConnectionState,
    host: Option<String>,
    token_id: Option<String>,
    // Bumped on every successful connect; stale-epoch caches refetch
    session_epoch: u64,
}

/// Owns the authenticated session to the hypervisor control plane
///
/// At most one connect attempt is in flight at a time; a second call while
/// `Connecting` is rejected with `AlreadyConnectingError`.
pub struct ConnectionManager {
    api: Arc<dyn HypervisorApi>,
    inner: RwLock<ConnectionInner>,
    log: Arc<EventLog>,
    bus: Arc<EventBus>,
}

impl ConnectionManager {
    pub fn new(api: Arc<dyn HypervisorApi>, log: Arc<EventLog>, bus: Arc<EventBus>) -> Self {
        Self {
            api,
            inner: RwLock::new(ConnectionInner {
                state: ConnectionState::Disconnected,
                host: None,
                token_id: None,
                session_epoch: 0,
            }),
            log,
            bus,
        }
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        self.inner.read().await.state
    }

    /// Whether the session is established
    pub async fn is_connected(&self) -> bool {
        self.inner.read().await.state == ConnectionState::Connected
    }

    /// Host of the current or last session
    pub async fn host(&self) -> Option<String> {
        self.inner.read().await.host.clone()
    }

    /// Epoch of the current session; changes on every successful connect
    pub async fn session_epoch(&self) -> u64 {
        self.inner.read().await.session_epoch
    }

    /// Establish a session, authenticating against the control plane
    ///
    /// Fails with `AuthError` if the credentials are rejected,
    /// `NetworkError` if the host is unreachable and `TimeoutError` when
    /// `timeout` expires. The token secret is never logged.
    pub async fn connect(
        &self,
        host: &str,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<(), DeployerError> {
        {
            let mut inner = self.inner.write().await;
            if inner.state == ConnectionState::Connecting {
                return Err(self.log.reject(DeployerError::AlreadyConnectingError(
                    format!("a connect attempt to {} is already in flight", host),
                )));
            }
            inner.state = ConnectionState::Connecting;
            inner.host = Some(host.to_string());
            inner.token_id = Some(credentials.token_id.clone());
        }
        self.publish_state(host, ConnectionState::Connecting);

        info!("Connecting to Proxmox API at {}", host);
        let result = tokio::time::timeout(timeout, self.api.authenticate(host, credentials))
            .await
            .map_err(|_| {
                DeployerError::TimeoutError(format!(
                    "connect to {} did not complete within {:?}",
                    host, timeout
                ))
            })
            .and_then(|r| r);

        match result {
            Ok(()) => {
                {
                    let mut inner = self.inner.write().await;
                    inner.state = ConnectionState::Connected;
                    inner.session_epoch += 1;
                }
                self.publish_state(host, ConnectionState::Connected);
                self.log.info(format!(
                    "Successfully connected to Proxmox API at {} using token {}",
                    host, credentials.token_id
                ));
                Ok(())
            }
            Err(e) => {
                {
                    let mut inner = self.inner.write().await;
                    inner.state = ConnectionState::Failed;
                }
                self.publish_state(host, ConnectionState::Failed);
                warn!("Connection to {} failed: {}", host, e);
                Err(self.log.reject(e))
            }
        }
    }

    /// Tear down the session; idempotent, always succeeds
    pub async fn disconnect(&self) {
        let previous_host = {
            let mut inner = self.inner.write().await;
            if inner.state == ConnectionState::Disconnected {
                return;
            }
            inner.state = ConnectionState::Disconnected;
            inner.token_id = None;
            inner.host.take()
        };

        let host = previous_host.unwrap_or_default();
        self.publish_state(&host, ConnectionState::Disconnected);
        self.log.info("Disconnected from Proxmox API");
    }

    fn publish_state(&self, host: &str, state: ConnectionState) {
        self.bus.publish(Event::ConnectionStateChanged {
            host: host.to_string(),
            state,
        });
    }
}
