// src/core/modules/mod.rs

//! Pluggable per-service lifecycle modules. A module knows how to install,
//! configure, start, and health-check one service on top of a provisioned
//! node; the orchestrator iterates over a sequence of them.

pub mod spark;

use async_trait::async_trait;

use crate::core::cluster::ClusterInfo;
use crate::core::errors::FlintrockError;
use crate::core::ssh::SshSession;

pub use spark::Spark;

/// The capability set every service module implements. All operations are
/// idempotent except `configure_master`, which transitions the cluster's
/// services from stopped to running.
#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &'static str;

    /// Downloads and installs the service on one node.
    async fn install(
        &self,
        session: &mut SshSession,
        cluster_info: &ClusterInfo,
    ) -> Result<(), FlintrockError>;

    /// Configures the service on one node. Master/slave-agnostic.
    async fn configure(
        &self,
        session: &mut SshSession,
        cluster_info: &ClusterInfo,
    ) -> Result<(), FlintrockError>;

    /// Runs on the master only, after every node has been provisioned.
    /// Starts the service across the cluster.
    async fn configure_master(
        &self,
        session: &mut SshSession,
        cluster_info: &ClusterInfo,
    ) -> Result<(), FlintrockError>;

    /// Reserved for slave-specific configuration.
    async fn configure_slave(
        &self,
        _session: &mut SshSession,
        _cluster_info: &ClusterInfo,
    ) -> Result<(), FlintrockError> {
        Ok(())
    }

    /// Verifies the running service from the outside, via the master.
    async fn health_check(&self, master_host: &str) -> Result<(), FlintrockError>;
}
