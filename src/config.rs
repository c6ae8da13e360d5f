// src/config.rs

//! Config-file defaults. The file is YAML with per-command, per-module, and
//! per-provider blocks; values only apply where the matching CLI flag was
//! left unset.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::errors::FlintrockError;

/// The parsed config file. Every field is optional; an absent file behaves
/// like an empty one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FileConfig {
    pub launch: LaunchDefaults,
    pub modules: ModuleDefaults,
    pub providers: ProviderDefaults,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LaunchDefaults {
    pub num_slaves: Option<u32>,
    pub install_spark: Option<bool>,
    pub spark_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModuleDefaults {
    pub spark: SparkDefaults,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SparkDefaults {
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderDefaults {
    pub ec2: Ec2Defaults,
}

/// Defaults for the `ec2`-prefixed flags shared by every command.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Ec2Defaults {
    pub key_name: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub instance_type: Option<String>,
    pub region: Option<String>,
    pub availability_zone: Option<String>,
    pub ami: Option<String>,
    pub user: Option<String>,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
    pub placement_group: Option<String>,
    pub tenancy: Option<String>,
    pub ebs_optimized: Option<bool>,
    pub instance_initiated_shutdown_behavior: Option<String>,
}

impl FileConfig {
    /// Loads the config file. A missing file at the default path is
    /// tolerated silently; a missing file at a user-specified path is an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self, FlintrockError> {
        let (path, user_specified) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_path(), false),
        };

        if !path.exists() {
            if user_specified {
                return Err(FlintrockError::Config(format!(
                    "no such config file: {}",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }

        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, FlintrockError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml))
            .build()
            .map_err(|e| FlintrockError::Config(format!("{}: {e}", path.display())))?;
        settings
            .try_deserialize()
            .map_err(|e| FlintrockError::Config(format!("{}: {e}", path.display())))
    }
}

/// `config.yaml` next to the executable, mirroring where the tool is
/// installed rather than where it is run from.
fn default_config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("config.yaml")))
        .unwrap_or_else(|| PathBuf::from("config.yaml"))
}
