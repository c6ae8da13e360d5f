// src/core/orchestrator/mod.rs

//! The cluster lifecycle orchestrator. This is the only component that
//! coordinates the others: it drives the provider, the SSH transport, and
//! the service modules through the launch/start/stop/destroy/describe/login
//! command procedures.

mod launch;
mod provision;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

use crate::core::cluster::{ClusterInfo, NodeRole, aggregate_state, cluster_name_from_group};
use crate::core::errors::FlintrockError;
use crate::core::keys::generate_key_pair;
use crate::core::modules::Module;
use crate::core::provider::{ComputeProvider, NodeHandle, NodeState};
use crate::core::ssh::SshSession;

pub use launch::LaunchOptions;
pub use provision::ProvisionMode;

/// Refresh granularity of the VM state poll loop.
const STATE_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Upper bound on any single wait-for-state loop.
const STATE_POLL_DEADLINE: Duration = Duration::from_secs(10 * 60);

/// Grace period after `configure_master` for workers to register with the
/// master before the health check runs.
const WORKER_REGISTRATION_SLEEP: Duration = Duration::from_secs(30);

/// How long each node gets for SSH to come up after boot.
pub(crate) const PROVISION_DEADLINE: Duration = Duration::from_secs(10 * 60);

/// Credentials for reaching cluster nodes over SSH.
#[derive(Debug, Clone)]
pub struct SshAccess {
    pub user: String,
    pub identity_file: PathBuf,
}

/// One cluster as seen by `describe`: its name, aggregated state, and
/// member nodes.
#[derive(Debug)]
pub struct ClusterDescription {
    pub name: String,
    pub state: String,
    pub nodes: Vec<NodeHandle>,
}

pub struct Orchestrator {
    provider: Arc<dyn ComputeProvider>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn ComputeProvider>) -> Self {
        Self { provider }
    }

    pub(crate) fn provider(&self) -> &Arc<dyn ComputeProvider> {
        &self.provider
    }

    /// The named cluster's nodes, with reaped-but-still-listed terminated
    /// nodes filtered out. An empty result means the cluster does not exist.
    async fn live_cluster_nodes(
        &self,
        cluster_name: &str,
    ) -> Result<Vec<NodeHandle>, FlintrockError> {
        Ok(self
            .provider
            .list_cluster(cluster_name)
            .await?
            .into_iter()
            .filter(|n| n.state != NodeState::Terminated)
            .collect())
    }

    async fn require_cluster(&self, cluster_name: &str) -> Result<Vec<NodeHandle>, FlintrockError> {
        let nodes = self.live_cluster_nodes(cluster_name).await?;
        if nodes.is_empty() {
            return Err(FlintrockError::ClusterNotFound(cluster_name.to_string()));
        }
        Ok(nodes)
    }

    /// Polls until every node reaches `target`. The scan is serial: the
    /// first node not yet in the target state is refreshed after a fixed
    /// sleep, then the scan restarts.
    pub async fn wait_for_state(
        &self,
        nodes: &mut [NodeHandle],
        target: NodeState,
    ) -> Result<(), FlintrockError> {
        let started = Instant::now();
        'scan: loop {
            for i in 0..nodes.len() {
                if nodes[i].state == target {
                    continue;
                }
                if started.elapsed() >= STATE_POLL_DEADLINE {
                    return Err(FlintrockError::Timeout {
                        operation: format!("cluster nodes to become {target}"),
                        secs: STATE_POLL_DEADLINE.as_secs(),
                    });
                }
                sleep(STATE_POLL_INTERVAL).await;
                nodes[i] = self.provider.refresh(&nodes[i]).await?;
                continue 'scan;
            }
            return Ok(());
        }
    }

    /// Re-reads every handle, concurrently; used after a wait loop so the
    /// handles carry post-transition hostnames and tags.
    async fn refresh_all(&self, nodes: &mut [NodeHandle]) -> Result<(), FlintrockError> {
        let refreshed =
            future::try_join_all(nodes.iter().map(|n| self.provider.refresh(n))).await?;
        for (node, fresh) in nodes.iter_mut().zip(refreshed) {
            *node = fresh;
        }
        Ok(())
    }

    /// Starts a stopped cluster's VMs and waits until all are running.
    /// This is the provider-facing half of `start`; the SSH reconfiguration
    /// happens afterwards in `start`.
    pub async fn start_and_wait(
        &self,
        cluster_name: &str,
    ) -> Result<Vec<NodeHandle>, FlintrockError> {
        let mut nodes = self.require_cluster(cluster_name).await?;
        info!("Starting {} instances...", nodes.len());

        let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        self.provider.start_nodes(&ids).await?;
        self.wait_for_state(&mut nodes, NodeState::Running).await?;
        self.refresh_all(&mut nodes).await?;
        Ok(nodes)
    }

    /// Starts an existing, stopped cluster and brings its services back up.
    ///
    /// The intra-cluster key pair generated at launch does not survive a
    /// stop/start cycle on our side, so a fresh one is generated and
    /// redistributed during reconfiguration.
    pub async fn start(
        &self,
        cluster_name: &str,
        ssh: &SshAccess,
        modules: Vec<Box<dyn Module>>,
    ) -> Result<(), FlintrockError> {
        let nodes = self.start_and_wait(cluster_name).await?;

        let key_pair = generate_key_pair().await?;
        let cluster_info = Arc::new(cluster_info_from_nodes(cluster_name, key_pair, &nodes)?);
        let modules = Arc::new(modules);

        provision::provision_all(
            ProvisionMode::Reconfigure,
            &nodes,
            ssh,
            &modules,
            &cluster_info,
        )
        .await?;

        self.bring_up_master(&nodes, ssh, &modules, &cluster_info)
            .await
    }

    /// Serial master-side bring-up: `configure_master` for each module, a
    /// registration grace period, then the module's health check.
    pub(crate) async fn bring_up_master(
        &self,
        nodes: &[NodeHandle],
        ssh: &SshAccess,
        modules: &Arc<Vec<Box<dyn Module>>>,
        cluster_info: &Arc<ClusterInfo>,
    ) -> Result<(), FlintrockError> {
        let master = master_node(nodes)?;
        let mut session = SshSession::connect(
            &ssh.user,
            &master.address,
            &ssh.identity_file,
            PROVISION_DEADLINE,
        )
        .await?;

        for module in modules.iter() {
            module.configure_master(&mut session, cluster_info).await?;
            sleep(WORKER_REGISTRATION_SLEEP).await;
            module.health_check(&cluster_info.master_host).await?;
        }
        session.close().await
    }

    /// Stops a running cluster. A cluster that is already stopped is a
    /// no-op; the aggregated state is reported either way.
    pub async fn stop(&self, cluster_name: &str, assume_yes: bool) -> Result<(), FlintrockError> {
        let mut nodes = self.require_cluster(cluster_name).await?;

        if !assume_yes {
            print_cluster(cluster_name, &nodes);
            println!("---");
            confirm("Are you sure you want to stop this cluster?")?;
        }

        info!("Stopping {} instances...", nodes.len());
        let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        self.provider.stop_nodes(&ids).await?;
        self.wait_for_state(&mut nodes, NodeState::Stopped).await?;

        println!(
            "{cluster_name} is now {state}.",
            state = aggregate_state(&nodes)
        );
        Ok(())
    }

    /// Terminates every VM in the cluster. The cluster security group is
    /// left in place.
    pub async fn destroy(
        &self,
        cluster_name: &str,
        assume_yes: bool,
    ) -> Result<(), FlintrockError> {
        let nodes = self.require_cluster(cluster_name).await?;

        if !assume_yes {
            print_cluster(cluster_name, &nodes);
            println!("---");
            confirm("Are you sure you want to destroy this cluster?")?;
        }

        info!("Terminating {} instances...", nodes.len());
        let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        self.provider.terminate_nodes(&ids).await
    }

    /// Groups the region's nodes by their cluster-group membership. A node
    /// that belongs to more than one cluster group is attributed to none of
    /// them; that configuration is outside what this tool produces.
    pub async fn describe(
        &self,
        cluster_name: Option<&str>,
    ) -> Result<Vec<ClusterDescription>, FlintrockError> {
        let nodes = match cluster_name {
            Some(name) => self.provider.list_cluster(name).await?,
            None => self.provider.list_all_clusters().await?,
        };

        let mut by_cluster: BTreeMap<String, Vec<NodeHandle>> = BTreeMap::new();
        for node in nodes {
            if node.state == NodeState::Terminated {
                continue;
            }
            let clusters: Vec<String> = node
                .security_groups
                .iter()
                .filter_map(|g| cluster_name_from_group(g))
                .map(str::to_string)
                .collect();
            match clusters.as_slice() {
                [single] => by_cluster.entry(single.clone()).or_default().push(node),
                [] => {}
                many => warn!(
                    "Node {} belongs to multiple cluster groups ({:?}); skipping it.",
                    node.id, many
                ),
            }
        }

        Ok(by_cluster
            .into_iter()
            .map(|(name, nodes)| ClusterDescription {
                state: aggregate_state(&nodes),
                name,
                nodes,
            })
            .collect())
    }

    /// Runs a local `ssh` to the cluster's master for interactive use and
    /// waits for it to finish.
    pub async fn login(&self, cluster_name: &str, ssh: &SshAccess) -> Result<(), FlintrockError> {
        let nodes = self.require_cluster(cluster_name).await?;
        let master = master_node(&nodes)?;

        tokio::process::Command::new("ssh")
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-i")
            .arg(&ssh.identity_file)
            .arg(format!("{}@{}", ssh.user, master.public_hostname))
            .status()
            .await?;
        Ok(())
    }
}

/// Finds the master node by its role tag.
pub(crate) fn master_node(nodes: &[NodeHandle]) -> Result<&NodeHandle, FlintrockError> {
    nodes
        .iter()
        .find(|n| n.role() == Some(NodeRole::Master))
        .ok_or_else(|| FlintrockError::Provider("cluster has no master-tagged node".to_string()))
}

/// Rebuilds the shared cluster record from live node handles, master first.
pub(crate) fn cluster_info_from_nodes(
    cluster_name: &str,
    key_pair: crate::core::cluster::KeyPair,
    nodes: &[NodeHandle],
) -> Result<ClusterInfo, FlintrockError> {
    let master = master_node(nodes)?;
    let slave_hosts = nodes
        .iter()
        .filter(|n| n.id != master.id)
        .map(|n| n.public_hostname.clone())
        .collect();
    ClusterInfo::new(
        cluster_name,
        key_pair,
        master.public_hostname.clone(),
        slave_hosts,
    )
}

fn confirm(prompt: &str) -> Result<(), FlintrockError> {
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| FlintrockError::Config(format!("confirmation prompt failed: {e}")))?;
    if confirmed {
        Ok(())
    } else {
        Err(FlintrockError::UserAbort)
    }
}

fn print_cluster(name: &str, nodes: &[NodeHandle]) {
    let state = aggregate_state(nodes);
    println!("{name}:");
    println!("  state: {state}");
    println!("  node-count: {}", nodes.len());
    if state == "running" {
        println!("  nodes:");
        for node in nodes {
            println!("    - {}", node.public_hostname);
        }
    }
}

/// Prints `describe` output in the same YAML-ish shape as the confirmation
/// listings.
pub fn print_descriptions(descriptions: &[ClusterDescription], master_hostname_only: bool) {
    if master_hostname_only {
        for description in descriptions {
            match master_node(&description.nodes) {
                Ok(master) => println!("{}: {}", description.name, master.public_hostname),
                Err(_) => println!("{}: (no master)", description.name),
            }
        }
        return;
    }

    println!(
        "{n} cluster{s} found.",
        n = descriptions.len(),
        s = if descriptions.len() == 1 { "" } else { "s" }
    );
    if !descriptions.is_empty() {
        println!("---");
        for description in descriptions {
            print_cluster(&description.name, &description.nodes);
        }
    }
}
