use std::sync::Arc;

use flintrock::core::cluster::{NodeRole, ROLE_TAG};
use flintrock::core::orchestrator::{LaunchOptions, Orchestrator};
use flintrock::core::provider::memory::MemoryProvider;
use flintrock::core::provider::{ComputeProvider, NodeState};
use flintrock::core::errors::FlintrockError;

fn launch_options(cluster_name: &str, num_slaves: u32) -> LaunchOptions {
    LaunchOptions {
        cluster_name: cluster_name.to_string(),
        num_slaves,
        image: "ami-test".to_string(),
        instance_type: "m3.medium".to_string(),
        key_name: Some("lab".to_string()),
        availability_zone: None,
        vpc_id: None,
        subnet_id: None,
        placement_group: None,
        tenancy: "default".to_string(),
        ebs_optimized: false,
        shutdown_behavior: "stop".to_string(),
        terminate_on_failure: false,
    }
}

fn fixture() -> (Arc<MemoryProvider>, Orchestrator) {
    let provider = Arc::new(MemoryProvider::default());
    let orchestrator = Orchestrator::new(provider.clone());
    (provider, orchestrator)
}

#[tokio::test(start_paused = true)]
async fn test_allocate_creates_running_tagged_nodes() {
    let (provider, orchestrator) = fixture();

    let nodes = orchestrator
        .allocate_cluster(&launch_options("myspark", 2))
        .await
        .unwrap();

    assert_eq!(nodes.len(), 3);
    assert!(nodes.iter().all(|n| n.state == NodeState::Running));

    let masters: Vec<_> = nodes
        .iter()
        .filter(|n| n.role() == Some(NodeRole::Master))
        .collect();
    assert_eq!(masters.len(), 1);
    assert_eq!(
        masters[0].tags.get("Name").map(String::as_str),
        Some("myspark-master")
    );
    assert!(
        nodes
            .iter()
            .filter(|n| n.id != masters[0].id)
            .all(|n| n.role() == Some(NodeRole::Slave))
    );

    // Every member carries the cluster group and the role tag.
    let listed = provider.list_cluster("myspark").await.unwrap();
    assert_eq!(listed.len(), 3);
    assert!(listed.iter().all(|n| n.tags.contains_key(ROLE_TAG)));
}

#[tokio::test(start_paused = true)]
async fn test_launch_refuses_existing_cluster() {
    let (_provider, orchestrator) = fixture();
    let options = launch_options("myspark", 2);

    orchestrator.allocate_cluster(&options).await.unwrap();
    let second = orchestrator.allocate_cluster(&options).await;

    assert!(matches!(
        second,
        Err(FlintrockError::ClusterAlreadyExists(name)) if name == "myspark"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_zero_slaves_launches_a_single_master() {
    let (_provider, orchestrator) = fixture();

    let nodes = orchestrator
        .allocate_cluster(&launch_options("tiny", 0))
        .await
        .unwrap();

    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].role(), Some(NodeRole::Master));

    let descriptions = orchestrator.describe(Some("tiny")).await.unwrap();
    assert_eq!(descriptions.len(), 1);
    assert_eq!(descriptions[0].nodes.len(), 1);
    assert_eq!(descriptions[0].state, "running");
}

#[tokio::test(start_paused = true)]
async fn test_stop_start_round_trip_preserves_the_cluster() {
    let (_provider, orchestrator) = fixture();
    orchestrator
        .allocate_cluster(&launch_options("myspark", 2))
        .await
        .unwrap();

    orchestrator.stop("myspark", true).await.unwrap();
    let stopped = orchestrator.describe(Some("myspark")).await.unwrap();
    assert_eq!(stopped[0].state, "stopped");
    assert_eq!(stopped[0].nodes.len(), 3);

    let nodes = orchestrator.start_and_wait("myspark").await.unwrap();
    assert_eq!(nodes.len(), 3);
    assert!(nodes.iter().all(|n| n.state == NodeState::Running));

    let running = orchestrator.describe(Some("myspark")).await.unwrap();
    assert_eq!(running[0].state, "running");
    assert_eq!(running[0].nodes.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_stop_on_stopped_cluster_is_a_noop() {
    let (_provider, orchestrator) = fixture();
    orchestrator
        .allocate_cluster(&launch_options("myspark", 1))
        .await
        .unwrap();

    orchestrator.stop("myspark", true).await.unwrap();
    orchestrator.stop("myspark", true).await.unwrap();

    let descriptions = orchestrator.describe(Some("myspark")).await.unwrap();
    assert_eq!(descriptions[0].state, "stopped");
}

#[tokio::test(start_paused = true)]
async fn test_destroy_terminates_every_node() {
    let (provider, orchestrator) = fixture();
    orchestrator
        .allocate_cluster(&launch_options("myspark", 2))
        .await
        .unwrap();

    orchestrator.destroy("myspark", true).await.unwrap();

    // Termination completes asynchronously; a refresh pass observes it.
    let nodes = provider.list_cluster("myspark").await.unwrap();
    for node in &nodes {
        let refreshed = provider.refresh(node).await.unwrap();
        assert_eq!(refreshed.state, NodeState::Terminated);
    }

    let descriptions = orchestrator.describe(Some("myspark")).await.unwrap();
    assert!(descriptions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_commands_on_missing_cluster_fail_with_cluster_not_found() {
    let (_provider, orchestrator) = fixture();

    for result in [
        orchestrator.stop("ghost", true).await,
        orchestrator.destroy("ghost", true).await,
        orchestrator.start_and_wait("ghost").await.map(|_| ()),
    ] {
        assert!(matches!(
            result,
            Err(FlintrockError::ClusterNotFound(name)) if name == "ghost"
        ));
    }
}

#[tokio::test(start_paused = true)]
async fn test_describe_without_a_name_lists_every_cluster() {
    let (_provider, orchestrator) = fixture();
    orchestrator
        .allocate_cluster(&launch_options("alpha", 1))
        .await
        .unwrap();
    orchestrator
        .allocate_cluster(&launch_options("beta", 0))
        .await
        .unwrap();

    let descriptions = orchestrator.describe(None).await.unwrap();
    let names: Vec<&str> = descriptions.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    assert_eq!(descriptions[0].nodes.len(), 2);
    assert_eq!(descriptions[1].nodes.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_describe_reports_mixed_states_as_inconsistent() {
    let (provider, orchestrator) = fixture();
    let nodes = orchestrator
        .allocate_cluster(&launch_options("myspark", 1))
        .await
        .unwrap();

    // Stop just one member behind the orchestrator's back.
    provider.stop_nodes(&[nodes[1].id.clone()]).await.unwrap();
    let _ = provider.refresh(&nodes[1]).await.unwrap();

    let descriptions = orchestrator.describe(Some("myspark")).await.unwrap();
    assert_eq!(descriptions[0].state, "inconsistent");
}
