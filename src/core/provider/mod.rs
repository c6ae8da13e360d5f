// src/core/provider/mod.rs

//! The compute provider seam: a narrow, provider-agnostic surface over cloud
//! VMs and their network perimeter. The orchestrator only ever talks to this
//! trait, so it can be exercised against the in-memory provider in tests.

pub mod ec2;
pub mod memory;

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;

use crate::core::cluster::{NodeRole, ROLE_TAG, cluster_group_name};
use crate::core::errors::FlintrockError;

/// Echo service used to discover the caller's public IPv4 address for the
/// client-ingress rules.
const CHECK_IP_URL: &str = "http://checkip.amazonaws.com/";

/// Observable lifecycle state of a VM. `Terminated` is terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum NodeState {
    Pending,
    Running,
    Stopping,
    Stopped,
    Terminated,
}

/// A provider-supplied handle to one VM: an opaque identifier plus the
/// attributes the orchestrator observes. Only the provider mutates these.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    pub id: String,
    pub state: NodeState,
    /// Public DNS name; empty while the node has no public endpoint.
    pub public_hostname: String,
    /// Public IP address; empty while the node has no public endpoint.
    pub address: String,
    pub tags: HashMap<String, String>,
    /// Names of the security groups this node is a member of. Cluster
    /// identity is encoded entirely here and in the tags.
    pub security_groups: Vec<String>,
}

impl NodeHandle {
    /// The node's role within its cluster, parsed from the role tag.
    pub fn role(&self) -> Option<NodeRole> {
        self.tags
            .get(ROLE_TAG)
            .and_then(|v| NodeRole::from_str(v).ok())
    }

    pub fn is_member_of(&self, cluster_name: &str) -> bool {
        let group = cluster_group_name(cluster_name);
        self.security_groups.iter().any(|g| *g == group)
    }
}

/// IP protocol of a security group rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

/// The traffic source a rule admits: a CIDR block, or the members of another
/// security group (by provider group id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleSource {
    Cidr(String),
    Group(String),
}

/// One ingress rule. Port `-1` means "any" and is only used with ICMP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecurityGroupRule {
    pub protocol: Protocol,
    pub from_port: i32,
    pub to_port: i32,
    pub source: RuleSource,
}

/// The client-ingress rule set carried by the shared base group: SSH plus
/// the Spark master/worker UIs and the application UI, all restricted to the
/// caller's address.
pub fn client_ingress_rules(client_cidr: &str) -> Vec<SecurityGroupRule> {
    let cidr = |from_port, to_port| SecurityGroupRule {
        protocol: Protocol::Tcp,
        from_port,
        to_port,
        source: RuleSource::Cidr(client_cidr.to_string()),
    };
    vec![cidr(22, 22), cidr(8080, 8081), cidr(4040, 4040)]
}

/// The intra-cluster rule set carried by the per-cluster group: the group
/// references itself as the source, admitting all traffic between members.
pub fn intra_cluster_rules(cluster_group_id: &str) -> Vec<SecurityGroupRule> {
    let group = |protocol, from_port, to_port| SecurityGroupRule {
        protocol,
        from_port,
        to_port,
        source: RuleSource::Group(cluster_group_id.to_string()),
    };
    vec![
        group(Protocol::Icmp, -1, -1),
        group(Protocol::Tcp, 0, 65535),
        group(Protocol::Udp, 0, 65535),
    ]
}

/// Discovers the caller's public IPv4 address and returns it as a /32 CIDR.
pub async fn discover_client_cidr() -> Result<String, FlintrockError> {
    let ip = reqwest::get(CHECK_IP_URL)
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(format!("{}/32", ip.trim()))
}

/// Everything needed to launch the VM set for one cluster in one request.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub count: u32,
    pub image: String,
    pub instance_type: String,
    pub key_name: Option<String>,
    pub availability_zone: Option<String>,
    pub security_group_ids: Vec<String>,
    pub subnet_id: Option<String>,
    pub placement_group: Option<String>,
    pub tenancy: String,
    pub ebs_optimized: bool,
    pub shutdown_behavior: String,
}

/// Abstract operations over cloud VMs. Calls are synchronous from the
/// caller's view but may block on the underlying API; lifecycle transitions
/// (`start`/`stop`/`terminate`) return immediately and complete
/// asynchronously, observable through `refresh`.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Idempotently creates the base and cluster security groups and
    /// authorizes their rule sets. Duplicate-rule errors from re-authorizing
    /// an existing rule are swallowed; any other authorization error
    /// propagates. Returns the two group ids, base group first.
    async fn ensure_security_groups(
        &self,
        cluster_name: &str,
        vpc_id: Option<&str>,
    ) -> Result<Vec<String>, FlintrockError>;

    /// Launches exactly `request.count` VMs in one request. The returned
    /// handles may still be pending.
    async fn launch_nodes(&self, request: &LaunchRequest)
    -> Result<Vec<NodeHandle>, FlintrockError>;

    /// Sets (overwriting) the given tags on each listed node.
    async fn tag_nodes(
        &self,
        node_ids: &[String],
        tags: &[(String, String)],
    ) -> Result<(), FlintrockError>;

    /// All VMs that are members of the named cluster's group.
    async fn list_cluster(&self, cluster_name: &str) -> Result<Vec<NodeHandle>, FlintrockError>;

    /// All VMs that are members of any group managed by this tool.
    async fn list_all_clusters(&self) -> Result<Vec<NodeHandle>, FlintrockError>;

    async fn start_nodes(&self, node_ids: &[String]) -> Result<(), FlintrockError>;

    async fn stop_nodes(&self, node_ids: &[String]) -> Result<(), FlintrockError>;

    async fn terminate_nodes(&self, node_ids: &[String]) -> Result<(), FlintrockError>;

    /// Re-reads a node's current state.
    async fn refresh(&self, node: &NodeHandle) -> Result<NodeHandle, FlintrockError>;
}
