// src/core/cluster.rs

//! Core cluster data structures shared by the orchestrator and modules.

use std::collections::HashMap;

use crate::core::errors::FlintrockError;
use crate::core::provider::{NodeHandle, NodeState};

/// Prefix for all security groups managed by this tool. A VM belongs to
/// cluster `X` iff it is a member of the group `flintrock-X`.
pub const GROUP_PREFIX: &str = "flintrock";

/// Tag key carrying a node's role within its cluster.
pub const ROLE_TAG: &str = "flintrock-role";

/// Returns the name of the per-cluster security group.
pub fn cluster_group_name(cluster_name: &str) -> String {
    format!("{GROUP_PREFIX}-{cluster_name}")
}

/// Extracts the cluster name back out of a cluster group name.
pub fn cluster_name_from_group(group_name: &str) -> Option<&str> {
    group_name
        .strip_prefix(GROUP_PREFIX)
        .and_then(|rest| rest.strip_prefix('-'))
}

/// An in-memory SSH key pair used for intra-cluster communication. Pushed to
/// every node during provisioning; never persisted to the local filesystem.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public: String,
    pub private: String,
}

/// A node's role within a cluster, as recorded in the `flintrock-role` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum NodeRole {
    Master,
    Slave,
}

/// The immutable record shared by every per-node task during a single
/// orchestration. Built once all VMs reach the running state, then only read.
#[derive(Debug, Clone)]
pub struct ClusterInfo {
    pub name: String,
    pub ssh_key_pair: KeyPair,
    pub master_host: String,
    pub slave_hosts: Vec<String>,
    pub spark_scratch_dir: String,
    pub spark_master_opts: String,
}

impl ClusterInfo {
    pub fn new(
        name: impl Into<String>,
        ssh_key_pair: KeyPair,
        master_host: impl Into<String>,
        slave_hosts: Vec<String>,
    ) -> Result<Self, FlintrockError> {
        let master_host = master_host.into();
        if slave_hosts.contains(&master_host) {
            return Err(FlintrockError::Config(format!(
                "master host {master_host} also appears in the slave host list"
            )));
        }
        Ok(Self {
            name: name.into(),
            ssh_key_pair,
            master_host,
            slave_hosts,
            spark_scratch_dir: "/mnt/spark".to_string(),
            spark_master_opts: String::new(),
        })
    }

    /// Scalar bindings for template rendering. Sequence fields are joined to
    /// newline-separated strings here, before rendering.
    pub fn template_bindings(&self) -> HashMap<String, String> {
        HashMap::from([
            ("name".to_string(), self.name.clone()),
            ("master_host".to_string(), self.master_host.clone()),
            ("slave_hosts".to_string(), self.slave_hosts.join("\n")),
            (
                "spark_scratch_dir".to_string(),
                self.spark_scratch_dir.clone(),
            ),
            (
                "spark_master_opts".to_string(),
                self.spark_master_opts.clone(),
            ),
        ])
    }

    /// Every host in the cluster, master first.
    pub fn all_hosts(&self) -> Vec<String> {
        let mut hosts = Vec::with_capacity(self.slave_hosts.len() + 1);
        hosts.push(self.master_host.clone());
        hosts.extend(self.slave_hosts.iter().cloned());
        hosts
    }
}

/// Aggregates the states of a cluster's member nodes into a single
/// user-facing state. Mixed member states report as `inconsistent`.
pub fn aggregate_state(nodes: &[NodeHandle]) -> String {
    let mut states: Vec<NodeState> = nodes.iter().map(|n| n.state).collect();
    states.sort();
    states.dedup();
    match states.as_slice() {
        [single] => single.to_string(),
        _ => "inconsistent".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_group_name_round_trips() {
        let group = cluster_group_name("myspark");
        assert_eq!(group, "flintrock-myspark");
        assert_eq!(cluster_name_from_group(&group), Some("myspark"));
    }

    #[test]
    fn bare_prefix_is_not_a_cluster_group() {
        assert_eq!(cluster_name_from_group("flintrock"), None);
        assert_eq!(cluster_name_from_group("unrelated"), None);
    }
}
