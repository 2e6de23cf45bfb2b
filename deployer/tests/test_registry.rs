//! VM registry lifecycle tests

use std::sync::Arc;

use labdeployer::api::mock::MockHypervisor;
use labdeployer::app::options::AppOptions;
use labdeployer::app::state::LabDeployer;
use labdeployer::errors::DeployerError;
use labdeployer::events::Event;
use labdeployer::registry::{PowerState, Vm};

fn vm(vmid: u32, name: &str, power_state: PowerState) -> Vm {
    Vm {
        vmid,
        name: name.to_string(),
        node: "pve".to_string(),
        power_state,
        console_url: None,
    }
}

fn setup() -> (Arc<MockHypervisor>, LabDeployer) {
    let api = Arc::new(MockHypervisor::new());
    let deployer = LabDeployer::new(api.clone(), AppOptions::default());
    (api, deployer)
}

fn drain_vm_events(events: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<(u32, PowerState)> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Event::VmStateChanged { vmid, power_state } = event {
            seen.push((vmid, power_state));
        }
    }
    seen
}

#[tokio::test]
async fn test_register_and_get() {
    let (_api, deployer) = setup();

    deployer
        .registry()
        .register(vm(100, "lab-server", PowerState::Running))
        .await
        .unwrap();

    let fetched = deployer.registry().get(100).await.unwrap();
    assert_eq!(fetched.name, "lab-server");
    assert_eq!(fetched.power_state, PowerState::Running);
}

#[tokio::test]
async fn test_register_rejects_duplicate_vmid() {
    let (_api, deployer) = setup();

    deployer
        .registry()
        .register(vm(100, "lab-server", PowerState::Running))
        .await
        .unwrap();
    let result = deployer
        .registry()
        .register(vm(100, "other", PowerState::Stopped))
        .await;
    assert!(matches!(result, Err(DeployerError::ValidationError(_))));
}

#[tokio::test]
async fn test_get_unknown_vm() {
    let (_api, deployer) = setup();
    let result = deployer.registry().get(999).await;
    assert!(matches!(result, Err(DeployerError::NotFoundError(_))));
}

#[tokio::test]
async fn test_start_unknown_vm_emits_no_state_event() {
    let (_api, deployer) = setup();
    let mut events = deployer.subscribe();

    let result = deployer.start_vm(999).await;
    assert!(matches!(result, Err(DeployerError::NotFoundError(_))));

    // The failure is logged, but no VM state change is published
    assert!(drain_vm_events(&mut events).is_empty());
    assert!(deployer.registry().list().await.is_empty());
}

#[tokio::test]
async fn test_start_running_vm_is_noop() {
    let (_api, deployer) = setup();
    deployer
        .registry()
        .register(vm(100, "lab-server", PowerState::Running))
        .await
        .unwrap();

    let mut events = deployer.subscribe();
    deployer.start_vm(100).await.unwrap();

    let fetched = deployer.registry().get(100).await.unwrap();
    assert_eq!(fetched.power_state, PowerState::Running);
    assert!(drain_vm_events(&mut events).is_empty());
}

#[tokio::test]
async fn test_stop_transitions_through_transitioning() {
    let (_api, deployer) = setup();
    deployer
        .registry()
        .register(vm(100, "lab-server", PowerState::Running))
        .await
        .unwrap();

    let mut events = deployer.subscribe();
    deployer.stop_vm(100).await.unwrap();

    let fetched = deployer.registry().get(100).await.unwrap();
    assert_eq!(fetched.power_state, PowerState::Stopped);
    assert_eq!(
        drain_vm_events(&mut events),
        vec![
            (100, PowerState::Transitioning),
            (100, PowerState::Stopped)
        ]
    );
}

#[tokio::test]
async fn test_failed_start_settles_back() {
    let (api, deployer) = setup();
    deployer
        .registry()
        .register(vm(101, "lab-client", PowerState::Stopped))
        .await
        .unwrap();
    api.set_fail_start(true);

    let result = deployer.start_vm(101).await;
    assert!(matches!(result, Err(DeployerError::ApiError(_))));

    let fetched = deployer.registry().get(101).await.unwrap();
    assert_eq!(fetched.power_state, PowerState::Stopped);
}

#[tokio::test]
async fn test_console_url_resolved_on_demand() {
    let (_api, deployer) = setup();
    deployer
        .registry()
        .register(vm(100, "lab-server", PowerState::Running))
        .await
        .unwrap();

    let url = deployer.registry().console_url(100).await.unwrap();
    assert!(url.contains("vmid=100"));
    assert!(url.contains("novnc=1"));

    // The resolved URL is remembered on the record
    let fetched = deployer.registry().get(100).await.unwrap();
    assert_eq!(fetched.console_url.as_deref(), Some(url.as_str()));
}

#[tokio::test]
async fn test_errors_land_in_event_log() {
    let (_api, deployer) = setup();

    let _ = deployer.start_vm(999).await;
    let entries = deployer.event_log().tail(10);
    assert!(entries
        .iter()
        .any(|e| e.severity == labdeployer::eventlog::Severity::Error
            && e.message.contains("999")));
}
