//! Deployment target catalog
//!
//! Caches the node and storage pool inventory for the current connection
//! session. Disconnecting (or reconnecting) invalidates the cache; a fresh
//! session always refetches.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::debug;

use crate::connection::ConnectionManager;
use crate::api::HypervisorApi;
use crate::errors::DeployerError;
use crate::eventlog::EventLog;
use crate::events::{Event, EventBus};

#[derive(Debug, Clone)]
struct CatalogSnapshot {
    session_epoch: u64,
    nodes: Vec<String>,
    storage_pools: Vec<String>,
}

/// Cached view of available deployment targets
pub struct ResourceCatalog {
    api: Arc<dyn HypervisorApi>,
    connection: Arc<ConnectionManager>,
    cache: RwLock<Option<CatalogSnapshot>>,
    fetch_timeout: Duration,
    log: Arc<EventLog>,
    bus: Arc<EventBus>,
}

impl ResourceCatalog {
    pub fn new(
        api: Arc<dyn HypervisorApi>,
        connection: Arc<ConnectionManager>,
        fetch_timeout: Duration,
        log: Arc<EventLog>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            api,
            connection,
            cache: RwLock::new(None),
            fetch_timeout,
            log,
            bus,
        }
    }

    /// Names of available cluster nodes
    ///
    /// An empty list is a valid result; a fetch failure is an error.
    pub async fn list_nodes(&self) -> Result<Vec<String>, DeployerError> {
        Ok(self.snapshot().await?.nodes)
    }

    /// Names of available storage pools
    pub async fn list_storage_pools(&self) -> Result<Vec<String>, DeployerError> {
        Ok(self.snapshot().await?.storage_pools)
    }

    /// Whether `node` and `storage_pool` are both present in the catalog
    pub async fn contains_target(
        &self,
        node: &str,
        storage_pool: &str,
    ) -> Result<bool, DeployerError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.nodes.iter().any(|n| n == node)
            && snapshot.storage_pools.iter().any(|p| p == storage_pool))
    }

    /// Drop the cached inventory; the next query refetches
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
        debug!("Resource catalog invalidated");
    }

    async fn snapshot(&self) -> Result<CatalogSnapshot, DeployerError> {
        if !self.connection.is_connected().await {
            return Err(self.log.reject(DeployerError::NotConnectedError(
                "connect to the Proxmox server before querying the catalog".to_string(),
            )));
        }

        let epoch = self.connection.session_epoch().await;
        {
            let cache = self.cache.read().await;
            if let Some(snapshot) = cache.as_ref() {
                if snapshot.session_epoch == epoch {
                    return Ok(snapshot.clone());
                }
            }
        }

        self.refetch(epoch).await
    }

    async fn refetch(&self, epoch: u64) -> Result<CatalogSnapshot, DeployerError> {
        let fetched = tokio::time::timeout(self.fetch_timeout, async {
            let nodes = self.api.list_nodes().await?;
            let pools = self.api.list_storage_pools().await?;
            Ok::<_, DeployerError>((nodes, pools))
        })
        .await
        .map_err(|_| {
            DeployerError::TimeoutError(format!(
                "catalog fetch did not complete within {:?}",
                self.fetch_timeout
            ))
        })
        .and_then(|r| r);

        let (nodes, pools) = match fetched {
            Ok(value) => value,
            Err(e) => return Err(self.log.reject(e)),
        };

        let snapshot = CatalogSnapshot {
            session_epoch: epoch,
            nodes: nodes.into_iter().map(|n| n.node).collect(),
            storage_pools: pools.into_iter().map(|p| p.storage).collect(),
        };

        {
            let mut cache = self.cache.write().await;
            *cache = Some(snapshot.clone());
        }

        self.bus.publish(Event::CatalogUpdated {
            nodes: snapshot.nodes.len(),
            storage_pools: snapshot.storage_pools.len(),
        });
        if snapshot.nodes.is_empty() && snapshot.storage_pools.is_empty() {
            self.log
                .info("Catalog loaded: no nodes or storage pools reported");
        } else {
            self.log.info(format!(
                "Catalog loaded: {} node(s), {} storage pool(s)",
                snapshot.nodes.len(),
                snapshot.storage_pools.len()
            ));
        }

        Ok(snapshot)
    }
}
