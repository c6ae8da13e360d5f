use std::collections::HashMap;
use std::str::FromStr;

use flintrock::core::cluster::{
    ClusterInfo, KeyPair, NodeRole, aggregate_state, cluster_group_name, cluster_name_from_group,
};
use flintrock::core::provider::{NodeHandle, NodeState};

fn key_pair() -> KeyPair {
    KeyPair {
        public: "pub".to_string(),
        private: "priv".to_string(),
    }
}

fn node(id: &str, state: NodeState) -> NodeHandle {
    NodeHandle {
        id: id.to_string(),
        state,
        public_hostname: format!("{id}.example.com"),
        address: "192.0.2.1".to_string(),
        tags: HashMap::new(),
        security_groups: vec![],
    }
}

#[test]
fn test_cluster_info_rejects_master_in_slave_list() {
    let result = ClusterInfo::new(
        "myspark",
        key_pair(),
        "host-a",
        vec!["host-a".to_string(), "host-b".to_string()],
    );
    assert!(result.is_err());
}

#[test]
fn test_cluster_info_slave_count_matches_input() {
    let info = ClusterInfo::new(
        "myspark",
        key_pair(),
        "master",
        vec!["s1".to_string(), "s2".to_string()],
    )
    .unwrap();
    assert_eq!(info.slave_hosts.len(), 2);
    assert!(!info.slave_hosts.contains(&info.master_host));
}

#[test]
fn test_all_hosts_lists_master_first() {
    let info =
        ClusterInfo::new("myspark", key_pair(), "master", vec!["s1".to_string()]).unwrap();
    assert_eq!(info.all_hosts(), vec!["master", "s1"]);
}

#[test]
fn test_aggregate_state_common() {
    let nodes = vec![
        node("a", NodeState::Running),
        node("b", NodeState::Running),
    ];
    assert_eq!(aggregate_state(&nodes), "running");
}

#[test]
fn test_aggregate_state_mixed_is_inconsistent() {
    let nodes = vec![
        node("a", NodeState::Running),
        node("b", NodeState::Stopped),
    ];
    assert_eq!(aggregate_state(&nodes), "inconsistent");
}

#[test]
fn test_node_role_round_trips_through_tag_text() {
    assert_eq!(NodeRole::Master.to_string(), "master");
    assert_eq!(NodeRole::from_str("slave").unwrap(), NodeRole::Slave);
    assert!(NodeRole::from_str("admin").is_err());
}

#[test]
fn test_group_naming() {
    assert_eq!(cluster_group_name("myspark"), "flintrock-myspark");
    assert_eq!(
        cluster_name_from_group("flintrock-myspark"),
        Some("myspark")
    );
    assert_eq!(cluster_name_from_group("flintrock"), None);
}
