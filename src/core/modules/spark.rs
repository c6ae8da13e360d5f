// src/core/modules/spark.rs

//! The Spark service module: installation, configuration, cluster-wide
//! startup, and health checking.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::{Instant, sleep};
use tracing::{error, info};

use super::Module;
use crate::core::cluster::ClusterInfo;
use crate::core::errors::FlintrockError;
use crate::core::ssh::{SshSession, sh_quote};
use crate::core::template::render;

/// Installer payload pushed to each node and executed with the requested
/// version and distribution.
const INSTALL_SCRIPT: &str = include_str!("../../../templates/install-spark.sh");

/// Environment file written to `spark/conf/spark-env.sh` on every node.
const SPARK_ENV_TEMPLATE: &str = include_str!("../../../templates/spark/conf/spark-env.sh");

/// How long to wait for the master web UI to start answering before giving
/// up on the launch.
const MASTER_UI_DEADLINE: Duration = Duration::from_secs(5 * 60);

const MASTER_UI_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The only Spark distribution currently installable.
const DISTRIBUTION: &str = "hadoop1";

pub struct Spark {
    version: String,
}

impl Spark {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    fn master_ui_url(master_host: &str) -> String {
        format!("http://{master_host}:8080/")
    }

    /// Polls the master UI until it answers 200, with a bounded deadline.
    async fn wait_for_master_ui(&self, master_host: &str) -> Result<(), FlintrockError> {
        let url = Self::master_ui_url(master_host);
        let client = reqwest::Client::new();
        let started = Instant::now();

        loop {
            let response = client
                .get(&url)
                .timeout(Duration::from_secs(5))
                .send()
                .await;
            if let Ok(r) = response {
                if r.status().is_success() {
                    return Ok(());
                }
            }
            if started.elapsed() >= MASTER_UI_DEADLINE {
                return Err(FlintrockError::Timeout {
                    operation: format!("Spark master UI at {url}"),
                    secs: MASTER_UI_DEADLINE.as_secs(),
                });
            }
            sleep(MASTER_UI_POLL_INTERVAL).await;
        }
    }
}

/// The JSON envelope served by the Spark master UI at `/json/`.
#[derive(Debug, Deserialize)]
pub struct SparkMasterState {
    pub status: String,
    pub workers: Vec<serde_json::Value>,
    pub cores: u64,
    /// Total cluster memory in MiB.
    pub memory: u64,
}

#[async_trait]
impl Module for Spark {
    fn name(&self) -> &'static str {
        "spark"
    }

    async fn install(
        &self,
        session: &mut SshSession,
        cluster_info: &ClusterInfo,
    ) -> Result<(), FlintrockError> {
        info!("[{}] Installing Spark...", session.host());

        let installer = render(INSTALL_SCRIPT, &cluster_info.template_bindings());
        let command = format!(
            "set -e\n\
             echo {installer} > /tmp/install-spark.sh\n\
             chmod 755 /tmp/install-spark.sh\n\
             /tmp/install-spark.sh {version} {distribution}\n",
            installer = sh_quote(&installer),
            version = sh_quote(&self.version),
            distribution = sh_quote(DISTRIBUTION),
        );

        if let Err(e) = session.run(&command).await {
            error!("[{}] Spark install failed: {e}", session.host());
            return Err(FlintrockError::ModuleInstallFailed {
                module: self.name().to_string(),
                version: self.version.clone(),
                distribution: DISTRIBUTION.to_string(),
            });
        }
        Ok(())
    }

    async fn configure(
        &self,
        session: &mut SshSession,
        cluster_info: &ClusterInfo,
    ) -> Result<(), FlintrockError> {
        let env_file = render(SPARK_ENV_TEMPLATE, &cluster_info.template_bindings());
        session
            .run(&format!(
                "echo {} > spark/conf/spark-env.sh",
                sh_quote(&env_file)
            ))
            .await?;
        Ok(())
    }

    async fn configure_master(
        &self,
        session: &mut SshSession,
        cluster_info: &ClusterInfo,
    ) -> Result<(), FlintrockError> {
        info!("[{}] Configuring Spark master...", session.host());

        session
            .run(&format!(
                "set -e\n\
                 echo {slaves} > spark/conf/slaves\n\
                 spark/sbin/start-master.sh\n",
                slaves = sh_quote(&cluster_info.slave_hosts.join("\n")),
            ))
            .await?;

        self.wait_for_master_ui(&cluster_info.master_host).await?;

        session.run("spark/sbin/start-slaves.sh").await?;
        Ok(())
    }

    async fn health_check(&self, master_host: &str) -> Result<(), FlintrockError> {
        let url = format!("http://{master_host}:8080/json/");
        let failed = |reason: String| FlintrockError::HealthCheckFailed {
            module: "spark".to_string(),
            host: master_host.to_string(),
            reason,
        };

        let state: SparkMasterState = reqwest::Client::new()
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?
            .error_for_status()
            .map_err(|e| failed(e.to_string()))?
            .json()
            .await
            .map_err(|e| failed(e.to_string()))?;

        println!("Spark Health Report:");
        println!("  * Master: {}", state.status);
        println!("  * Workers: {}", state.workers.len());
        println!("  * Cores: {}", state.cores);
        println!("  * Memory: {:.1} GB", state.memory as f64 / 1024.0);
        Ok(())
    }
}
