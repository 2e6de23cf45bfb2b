//! Resource catalog caching tests

use std::sync::Arc;

use labdeployer::api::mock::MockHypervisor;
use labdeployer::api::Credentials;
use labdeployer::app::options::AppOptions;
use labdeployer::app::state::LabDeployer;
use labdeployer::errors::DeployerError;

fn credentials() -> Credentials {
    Credentials::new("root@pam!deployer", "valid-token-secret")
}

fn setup() -> (Arc<MockHypervisor>, LabDeployer) {
    let api = Arc::new(MockHypervisor::new());
    let deployer = LabDeployer::new(api.clone(), AppOptions::default());
    (api, deployer)
}

#[tokio::test]
async fn test_queries_require_connection() {
    let (_api, deployer) = setup();

    let nodes = deployer.catalog().list_nodes().await;
    assert!(matches!(nodes, Err(DeployerError::NotConnectedError(_))));
    let pools = deployer.catalog().list_storage_pools().await;
    assert!(matches!(pools, Err(DeployerError::NotConnectedError(_))));
}

#[tokio::test]
async fn test_inventory_cached_per_session() {
    let (api, deployer) = setup();
    deployer.connect("10.0.0.5", &credentials()).await.unwrap();

    let nodes = deployer.catalog().list_nodes().await.unwrap();
    assert_eq!(nodes, vec!["pve".to_string(), "pve2".to_string()]);
    let pools = deployer.catalog().list_storage_pools().await.unwrap();
    assert_eq!(pools, vec!["local-lvm".to_string(), "local".to_string()]);

    // Repeat queries serve the session cache
    deployer.catalog().list_nodes().await.unwrap();
    deployer.catalog().list_storage_pools().await.unwrap();
    assert_eq!(api.node_fetches(), 1);
    assert_eq!(api.pool_fetches(), 1);
}

#[tokio::test]
async fn test_reconnect_invalidates_cache() {
    let (api, deployer) = setup();

    deployer.connect("10.0.0.5", &credentials()).await.unwrap();
    deployer.catalog().list_nodes().await.unwrap();
    assert_eq!(api.node_fetches(), 1);

    deployer.disconnect().await;
    assert!(matches!(
        deployer.catalog().list_nodes().await,
        Err(DeployerError::NotConnectedError(_))
    ));

    // The inventory changed while we were away; a fresh session must see it
    api.set_nodes(&["pve3"]);
    deployer.connect("10.0.0.5", &credentials()).await.unwrap();
    let nodes = deployer.catalog().list_nodes().await.unwrap();
    assert_eq!(nodes, vec!["pve3".to_string()]);
    assert_eq!(api.node_fetches(), 2);
}

#[tokio::test]
async fn test_empty_inventory_is_valid() {
    let (api, deployer) = setup();
    api.set_nodes(&[]);
    api.set_storage_pools(&[]);

    deployer.connect("10.0.0.5", &credentials()).await.unwrap();
    assert!(deployer.catalog().list_nodes().await.unwrap().is_empty());
    assert!(deployer
        .catalog()
        .list_storage_pools()
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_fetch_failure_is_an_error_not_empty() {
    let (api, deployer) = setup();
    deployer.connect("10.0.0.5", &credentials()).await.unwrap();

    api.set_unreachable(true);
    let result = deployer.catalog().list_nodes().await;
    assert!(matches!(result, Err(DeployerError::NetworkError(_))));
}
