// src/cli.rs

//! The command-line surface. Parsing is clap's job; the `resolve` methods
//! fold config-file defaults into unset flags and hand the orchestrator
//! fully resolved inputs.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::FileConfig;
use crate::core::errors::FlintrockError;
use crate::core::modules::{Module, Spark};
use crate::core::orchestrator::{LaunchOptions, SshAccess};

const DEFAULT_INSTANCE_TYPE: &str = "m3.medium";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_TENANCY: &str = "default";
const DEFAULT_SHUTDOWN_BEHAVIOR: &str = "stop";

/// A command-line tool for launching Apache Spark clusters.
#[derive(Debug, Parser)]
#[command(name = "flintrock", version, about)]
pub struct Cli {
    /// Path to the config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Cloud provider to operate against.
    #[arg(long, global = true, default_value = "ec2", value_parser = ["ec2"])]
    pub provider: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Launch a new cluster.
    Launch(LaunchArgs),
    /// Destroy a cluster.
    Destroy(DestroyArgs),
    /// Start an existing, stopped cluster.
    Start(StartArgs),
    /// Stop an existing, running cluster.
    Stop(StopArgs),
    /// Describe an existing cluster, or all clusters in the region.
    Describe(DescribeArgs),
    /// Login to the master of an existing cluster.
    Login(LoginArgs),
}

#[derive(Debug, Args)]
pub struct LaunchArgs {
    pub cluster_name: String,

    #[arg(long)]
    pub num_slaves: Option<u32>,

    #[arg(long, action = ArgAction::SetTrue, overrides_with = "no_install_spark")]
    pub install_spark: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_install_spark: bool,

    #[arg(long)]
    pub spark_version: Option<String>,

    #[arg(long)]
    pub ec2_key_name: Option<String>,

    /// Path to SSH .pem file for accessing nodes.
    #[arg(long)]
    pub ec2_identity_file: Option<PathBuf>,

    #[arg(long)]
    pub ec2_instance_type: Option<String>,

    #[arg(long)]
    pub ec2_region: Option<String>,

    #[arg(long)]
    pub ec2_availability_zone: Option<String>,

    #[arg(long)]
    pub ec2_ami: Option<String>,

    #[arg(long)]
    pub ec2_user: Option<String>,

    #[arg(long)]
    pub ec2_spot_price: Option<f64>,

    #[arg(long)]
    pub ec2_vpc_id: Option<String>,

    #[arg(long)]
    pub ec2_subnet_id: Option<String>,

    #[arg(long)]
    pub ec2_placement_group: Option<String>,

    #[arg(long)]
    pub ec2_tenancy: Option<String>,

    #[arg(long, action = ArgAction::SetTrue, overrides_with = "no_ec2_ebs_optimized")]
    pub ec2_ebs_optimized: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_ec2_ebs_optimized: bool,

    #[arg(long, value_parser = ["stop", "terminate"])]
    pub ec2_instance_initiated_shutdown_behavior: Option<String>,

    /// Terminate the launched instances if a provisioning phase fails,
    /// instead of leaving them running for inspection.
    #[arg(long, action = ArgAction::SetTrue)]
    pub terminate_on_failure: bool,
}

#[derive(Debug, Args)]
pub struct DestroyArgs {
    pub cluster_name: String,

    #[arg(long, action = ArgAction::SetTrue)]
    pub assume_yes: bool,

    #[arg(long)]
    pub ec2_region: Option<String>,
}

#[derive(Debug, Args)]
pub struct StartArgs {
    pub cluster_name: String,

    #[arg(long)]
    pub ec2_region: Option<String>,

    #[arg(long)]
    pub ec2_identity_file: Option<PathBuf>,

    #[arg(long)]
    pub ec2_user: Option<String>,
}

#[derive(Debug, Args)]
pub struct StopArgs {
    pub cluster_name: String,

    #[arg(long, action = ArgAction::SetTrue)]
    pub assume_yes: bool,

    #[arg(long)]
    pub ec2_region: Option<String>,
}

#[derive(Debug, Args)]
pub struct DescribeArgs {
    pub cluster_name: Option<String>,

    #[arg(long, action = ArgAction::SetTrue)]
    pub master_hostname_only: bool,

    #[arg(long)]
    pub ec2_region: Option<String>,
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    pub cluster_name: String,

    #[arg(long)]
    pub ec2_region: Option<String>,

    #[arg(long)]
    pub ec2_identity_file: Option<PathBuf>,

    #[arg(long)]
    pub ec2_user: Option<String>,
}

fn require<T>(value: Option<T>, flag: &str) -> Result<T, FlintrockError> {
    value.ok_or_else(|| {
        FlintrockError::Config(format!(
            "missing required option --{flag} (set it on the command line or in the config file)"
        ))
    })
}

fn resolve_region(flag: &Option<String>, config: &FileConfig) -> String {
    flag.clone()
        .or_else(|| config.providers.ec2.region.clone())
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

fn resolve_ssh_access(
    user: &Option<String>,
    identity_file: &Option<PathBuf>,
    config: &FileConfig,
) -> Result<SshAccess, FlintrockError> {
    Ok(SshAccess {
        user: require(
            user.clone().or_else(|| config.providers.ec2.user.clone()),
            "ec2-user",
        )?,
        identity_file: require(
            identity_file
                .clone()
                .or_else(|| config.providers.ec2.identity_file.clone()),
            "ec2-identity-file",
        )?,
    })
}

impl LaunchArgs {
    pub fn region(&self, config: &FileConfig) -> String {
        resolve_region(&self.ec2_region, config)
    }

    pub fn ssh_access(&self, config: &FileConfig) -> Result<SshAccess, FlintrockError> {
        resolve_ssh_access(&self.ec2_user, &self.ec2_identity_file, config)
    }

    /// The modules to install, per the `--install-spark` pair and the
    /// config file.
    pub fn modules(&self, config: &FileConfig) -> Result<Vec<Box<dyn Module>>, FlintrockError> {
        let install_spark = if self.no_install_spark {
            false
        } else if self.install_spark {
            true
        } else {
            config.launch.install_spark.unwrap_or(true)
        };
        if !install_spark {
            return Ok(Vec::new());
        }

        let version = require(
            self.spark_version
                .clone()
                .or_else(|| config.launch.spark_version.clone())
                .or_else(|| config.modules.spark.version.clone()),
            "spark-version",
        )?;
        Ok(vec![Box::new(Spark::new(version))])
    }

    pub fn options(&self, config: &FileConfig) -> Result<LaunchOptions, FlintrockError> {
        if self.ec2_spot_price.is_some() {
            return Err(FlintrockError::Config(
                "spot instances are not supported yet; drop --ec2-spot-price".to_string(),
            ));
        }

        let ec2 = &config.providers.ec2;
        let ebs_optimized = if self.no_ec2_ebs_optimized {
            false
        } else if self.ec2_ebs_optimized {
            true
        } else {
            ec2.ebs_optimized.unwrap_or(false)
        };

        Ok(LaunchOptions {
            cluster_name: self.cluster_name.clone(),
            num_slaves: require(
                self.num_slaves.or(config.launch.num_slaves),
                "num-slaves",
            )?,
            image: require(
                self.ec2_ami.clone().or_else(|| ec2.ami.clone()),
                "ec2-ami",
            )?,
            instance_type: self
                .ec2_instance_type
                .clone()
                .or_else(|| ec2.instance_type.clone())
                .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_string()),
            key_name: self.ec2_key_name.clone().or_else(|| ec2.key_name.clone()),
            availability_zone: self
                .ec2_availability_zone
                .clone()
                .or_else(|| ec2.availability_zone.clone()),
            vpc_id: self.ec2_vpc_id.clone().or_else(|| ec2.vpc_id.clone()),
            subnet_id: self.ec2_subnet_id.clone().or_else(|| ec2.subnet_id.clone()),
            placement_group: self
                .ec2_placement_group
                .clone()
                .or_else(|| ec2.placement_group.clone()),
            tenancy: self
                .ec2_tenancy
                .clone()
                .or_else(|| ec2.tenancy.clone())
                .unwrap_or_else(|| DEFAULT_TENANCY.to_string()),
            ebs_optimized,
            shutdown_behavior: self
                .ec2_instance_initiated_shutdown_behavior
                .clone()
                .or_else(|| ec2.instance_initiated_shutdown_behavior.clone())
                .unwrap_or_else(|| DEFAULT_SHUTDOWN_BEHAVIOR.to_string()),
            terminate_on_failure: self.terminate_on_failure,
        })
    }
}

impl StartArgs {
    pub fn region(&self, config: &FileConfig) -> String {
        resolve_region(&self.ec2_region, config)
    }

    pub fn ssh_access(&self, config: &FileConfig) -> Result<SshAccess, FlintrockError> {
        resolve_ssh_access(&self.ec2_user, &self.ec2_identity_file, config)
    }
}

impl LoginArgs {
    pub fn region(&self, config: &FileConfig) -> String {
        resolve_region(&self.ec2_region, config)
    }

    pub fn ssh_access(&self, config: &FileConfig) -> Result<SshAccess, FlintrockError> {
        resolve_ssh_access(&self.ec2_user, &self.ec2_identity_file, config)
    }
}

impl DestroyArgs {
    pub fn region(&self, config: &FileConfig) -> String {
        resolve_region(&self.ec2_region, config)
    }
}

impl StopArgs {
    pub fn region(&self, config: &FileConfig) -> String {
        resolve_region(&self.ec2_region, config)
    }
}

impl DescribeArgs {
    pub fn region(&self, config: &FileConfig) -> String {
        resolve_region(&self.ec2_region, config)
    }
}
