//! Connection lifecycle tests

use std::sync::Arc;
use std::time::Duration;

use labdeployer::api::mock::MockHypervisor;
use labdeployer::api::Credentials;
use labdeployer::app::options::AppOptions;
use labdeployer::app::state::LabDeployer;
use labdeployer::connection::ConnectionState;
use labdeployer::errors::DeployerError;
use labdeployer::events::Event;

fn credentials() -> Credentials {
    Credentials::new("root@pam!deployer", "valid-token-secret")
}

fn setup() -> (Arc<MockHypervisor>, Arc<LabDeployer>) {
    let api = Arc::new(MockHypervisor::new());
    let deployer = Arc::new(LabDeployer::new(api.clone(), AppOptions::default()));
    (api, deployer)
}

#[tokio::test]
async fn test_connect_success() {
    let (_api, deployer) = setup();
    let mut events = deployer.subscribe();

    deployer.connect("10.0.0.5", &credentials()).await.unwrap();
    assert_eq!(
        deployer.connection().state().await,
        ConnectionState::Connected
    );

    // Connecting then Connected must both have been published
    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Event::ConnectionStateChanged { state, host } = event {
            assert_eq!(host, "10.0.0.5");
            states.push(state);
        }
    }
    assert_eq!(
        states,
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
}

#[tokio::test]
async fn test_connect_rejected_credentials() {
    let (api, deployer) = setup();
    api.set_reject_credentials(true);

    let result = deployer.connect("10.0.0.5", &credentials()).await;
    assert!(matches!(result, Err(DeployerError::AuthError(_))));
    assert_eq!(deployer.connection().state().await, ConnectionState::Failed);
}

#[tokio::test]
async fn test_connect_unreachable() {
    let (api, deployer) = setup();
    api.set_unreachable(true);

    let result = deployer.connect("10.0.0.5", &credentials()).await;
    assert!(matches!(result, Err(DeployerError::NetworkError(_))));
    assert_eq!(deployer.connection().state().await, ConnectionState::Failed);
}

#[tokio::test]
async fn test_connect_timeout() {
    let api = Arc::new(MockHypervisor::new());
    api.set_auth_delay(Duration::from_secs(2));
    let options = AppOptions {
        connect_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let deployer = LabDeployer::new(api, options);

    let result = deployer.connect("10.0.0.5", &credentials()).await;
    assert!(matches!(result, Err(DeployerError::TimeoutError(_))));
    assert_eq!(deployer.connection().state().await, ConnectionState::Failed);
}

#[tokio::test]
async fn test_second_connect_while_connecting_rejected() {
    let (api, deployer) = setup();
    api.set_auth_delay(Duration::from_millis(200));

    let first = {
        let deployer = deployer.clone();
        tokio::spawn(async move { deployer.connect("10.0.0.5", &credentials()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = deployer.connect("10.0.0.5", &credentials()).await;
    assert!(matches!(
        second,
        Err(DeployerError::AlreadyConnectingError(_))
    ));

    // The in-flight attempt is unaffected
    first.await.unwrap().unwrap();
    assert_eq!(
        deployer.connection().state().await,
        ConnectionState::Connected
    );
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (_api, deployer) = setup();

    deployer.connect("10.0.0.5", &credentials()).await.unwrap();
    deployer.disconnect().await;
    assert_eq!(
        deployer.connection().state().await,
        ConnectionState::Disconnected
    );

    // A second disconnect is a no-op
    deployer.disconnect().await;
    assert_eq!(
        deployer.connection().state().await,
        ConnectionState::Disconnected
    );
}

#[tokio::test]
async fn test_token_secret_never_logged() {
    let (api, deployer) = setup();

    deployer.connect("10.0.0.5", &credentials()).await.unwrap();
    api.set_reject_credentials(true);
    deployer.disconnect().await;
    let _ = deployer.connect("10.0.0.5", &credentials()).await;

    for entry in deployer.event_log().tail(100) {
        assert!(
            !entry.message.contains("valid-token-secret"),
            "secret leaked into log entry: {}",
            entry.message
        );
    }
}
