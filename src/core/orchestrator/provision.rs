// src/core/orchestrator/provision.rs

//! The parallel per-node provisioning primitive. One task per node on the
//! shared runtime; within a task the steps are strictly sequential.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::info;

use super::{PROVISION_DEADLINE, SshAccess};
use crate::core::cluster::ClusterInfo;
use crate::core::errors::FlintrockError;
use crate::core::modules::Module;
use crate::core::provider::NodeHandle;
use crate::core::ssh::{SshSession, sh_quote};

/// What a provisioning pass does on each node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionMode {
    /// Fresh node: intra-cluster keys, Java, then module install+configure.
    Full,
    /// Restarted node: redistribute keys and re-run module configuration.
    Reconfigure,
}

/// Fans `provision_node` out over every node and joins the whole set.
/// All tasks run to completion; the first failure observed is re-raised so
/// the phase fails as a unit.
pub(crate) async fn provision_all(
    mode: ProvisionMode,
    nodes: &[NodeHandle],
    ssh: &SshAccess,
    modules: &Arc<Vec<Box<dyn Module>>>,
    cluster_info: &Arc<ClusterInfo>,
) -> Result<(), FlintrockError> {
    let mut tasks = JoinSet::new();
    for node in nodes {
        let host = node.address.clone();
        let ssh = ssh.clone();
        let modules = modules.clone();
        let cluster_info = cluster_info.clone();
        tasks.spawn(async move {
            provision_node(mode, &ssh, &host, &modules, &cluster_info).await
        });
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(FlintrockError::Provider(format!(
                "provisioning task aborted: {e}"
            ))),
        };
        if let Err(e) = result {
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Prepares a single node: SSH access for the whole cluster, a working Java
/// runtime, and each module installed and configured. Contains no master- or
/// slave-specific logic.
pub(crate) async fn provision_node(
    mode: ProvisionMode,
    ssh: &SshAccess,
    host: &str,
    modules: &[Box<dyn Module>],
    cluster_info: &ClusterInfo,
) -> Result<(), FlintrockError> {
    let mut session =
        SshSession::connect(&ssh.user, host, &ssh.identity_file, PROVISION_DEADLINE).await?;

    install_cluster_keys(&mut session, cluster_info).await?;

    if mode == ProvisionMode::Full {
        ensure_java(&mut session, host).await?;
    }

    for module in modules {
        if mode == ProvisionMode::Full {
            module.install(&mut session, cluster_info).await?;
        }
        module.configure(&mut session, cluster_info).await?;
    }

    session.close().await
}

/// Installs the generated key pair so every node can SSH to every other
/// node as the same user.
async fn install_cluster_keys(
    session: &mut SshSession,
    cluster_info: &ClusterInfo,
) -> Result<(), FlintrockError> {
    session
        .run(&format!(
            "set -e\n\
             echo {private_key} > ~/.ssh/id_rsa\n\
             echo {public_key} >> ~/.ssh/authorized_keys\n\
             chmod 400 ~/.ssh/id_rsa\n",
            private_key = sh_quote(&cluster_info.ssh_key_pair.private),
            public_key = sh_quote(&cluster_info.ssh_key_pair.public),
        ))
        .await?;
    Ok(())
}

/// Default CentOS images ship without Java; install OpenJDK and persist
/// JAVA_HOME if the environment doesn't already provide one.
async fn ensure_java(session: &mut SshSession, host: &str) -> Result<(), FlintrockError> {
    let java_home = session.run("echo \"$JAVA_HOME\"").await?;
    if !java_home.stdout.trim().is_empty() {
        return Ok(());
    }

    info!("[{host}] Installing Java...");
    session
        .run(
            "set -e\n\
             sudo yum install -y java-1.7.0-openjdk\n\
             sudo sh -c \"echo export JAVA_HOME=/usr/lib/jvm/jre >> /etc/environment\"\n\
             source /etc/environment\n",
        )
        .await?;
    Ok(())
}
