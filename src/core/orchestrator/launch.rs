// src/core/orchestrator/launch.rs

//! The `launch` command procedure: allocate the VM set, then drive the
//! parallel provisioning pipeline and the master-side bring-up.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use super::{Orchestrator, SshAccess, cluster_info_from_nodes, provision};
use crate::core::cluster::{NodeRole, ROLE_TAG};
use crate::core::errors::FlintrockError;
use crate::core::keys::generate_key_pair;
use crate::core::modules::Module;
use crate::core::provider::{LaunchRequest, NodeHandle, NodeState};

/// Settle time after VM creation before the first state poll; provider
/// metadata lags the launch call.
const METADATA_SETTLE: Duration = Duration::from_secs(10);

/// Everything `launch` needs beyond the modules and SSH credentials.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub cluster_name: String,
    pub num_slaves: u32,
    pub image: String,
    pub instance_type: String,
    pub key_name: Option<String>,
    pub availability_zone: Option<String>,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
    pub placement_group: Option<String>,
    pub tenancy: String,
    pub ebs_optimized: bool,
    pub shutdown_behavior: String,
    /// Terminate the just-launched VMs if a later phase fails. Off by
    /// default so a broken launch can be inspected.
    pub terminate_on_failure: bool,
}

impl Orchestrator {
    /// Launches a fully functional cluster with the given modules installed.
    pub async fn launch(
        &self,
        options: &LaunchOptions,
        ssh: &SshAccess,
        modules: Vec<Box<dyn Module>>,
    ) -> Result<(), FlintrockError> {
        let nodes = self.allocate_cluster(options).await?;

        match self.deploy(options, ssh, modules, &nodes).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if options.terminate_on_failure {
                    warn!(
                        "Launch of {} failed; terminating its {} instances.",
                        options.cluster_name,
                        nodes.len()
                    );
                    let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
                    self.provider().terminate_nodes(&ids).await?;
                } else {
                    warn!(
                        "Launch of {} failed; its instances are left running for inspection.",
                        options.cluster_name
                    );
                }
                Err(e)
            }
        }
    }

    /// The provider-facing launch phase: precondition check, security
    /// groups, VM creation, the wait-until-running poll, and role tagging.
    /// Returns the running, tagged node handles, master first.
    pub async fn allocate_cluster(
        &self,
        options: &LaunchOptions,
    ) -> Result<Vec<NodeHandle>, FlintrockError> {
        if !self
            .live_cluster_nodes(&options.cluster_name)
            .await?
            .is_empty()
        {
            return Err(FlintrockError::ClusterAlreadyExists(
                options.cluster_name.clone(),
            ));
        }

        let security_group_ids = self
            .provider()
            .ensure_security_groups(&options.cluster_name, options.vpc_id.as_deref())
            .await?;

        let count = options.num_slaves + 1;
        info!("Launching {count} instances...");
        let mut nodes = self
            .provider()
            .launch_nodes(&LaunchRequest {
                count,
                image: options.image.clone(),
                instance_type: options.instance_type.clone(),
                key_name: options.key_name.clone(),
                availability_zone: options.availability_zone.clone(),
                security_group_ids,
                subnet_id: options.subnet_id.clone(),
                placement_group: options.placement_group.clone(),
                tenancy: options.tenancy.clone(),
                ebs_optimized: options.ebs_optimized,
                shutdown_behavior: options.shutdown_behavior.clone(),
            })
            .await?;

        sleep(METADATA_SETTLE).await;
        self.wait_for_state(&mut nodes, NodeState::Running).await?;
        self.refresh_all(&mut nodes).await?;

        // The master is by convention the first-returned handle.
        let (master, slaves) = nodes.split_first().ok_or_else(|| {
            FlintrockError::Provider("provider returned no instances".to_string())
        })?;
        self.provider()
            .tag_nodes(
                &[master.id.clone()],
                &[
                    (ROLE_TAG.to_string(), NodeRole::Master.to_string()),
                    (
                        "Name".to_string(),
                        format!("{}-master", options.cluster_name),
                    ),
                ],
            )
            .await?;
        if !slaves.is_empty() {
            let slave_ids: Vec<String> = slaves.iter().map(|n| n.id.clone()).collect();
            self.provider()
                .tag_nodes(
                    &slave_ids,
                    &[
                        (ROLE_TAG.to_string(), NodeRole::Slave.to_string()),
                        (
                            "Name".to_string(),
                            format!("{}-slave", options.cluster_name),
                        ),
                    ],
                )
                .await?;
        }
        self.refresh_all(&mut nodes).await?;
        Ok(nodes)
    }

    /// The SSH-facing launch phase: build the shared cluster record, fan
    /// provisioning out across every node, then bring the services up from
    /// the master.
    async fn deploy(
        &self,
        options: &LaunchOptions,
        ssh: &SshAccess,
        modules: Vec<Box<dyn Module>>,
        nodes: &[NodeHandle],
    ) -> Result<(), FlintrockError> {
        let key_pair = generate_key_pair().await?;
        let cluster_info = Arc::new(cluster_info_from_nodes(
            &options.cluster_name,
            key_pair,
            nodes,
        )?);
        let modules = Arc::new(modules);

        provision::provision_all(
            provision::ProvisionMode::Full,
            nodes,
            ssh,
            &modules,
            &cluster_info,
        )
        .await?;
        info!("All {} instances provisioned.", nodes.len());

        self.bring_up_master(nodes, ssh, &modules, &cluster_info)
            .await
    }
}
