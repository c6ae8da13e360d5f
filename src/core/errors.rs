// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the tool.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum FlintrockError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("No such cluster: {0}")]
    ClusterNotFound(String),

    #[error("Cluster already exists: {0}")]
    ClusterAlreadyExists(String),

    #[error("SSH unreachable: {host} (gave up after {elapsed_secs}s)")]
    SshUnreachable { host: String, elapsed_secs: u64 },

    #[error("SSH Error: {0}")]
    Ssh(russh::Error),

    #[error("Key load Error: {0}")]
    KeyLoad(russh_keys::Error),

    /// A remote shell program exited non-zero. Both captured streams are
    /// carried so the caller can surface them to the user.
    #[error("[{host}] remote command failed with exit code {exit}:\n{stdout}{stderr}")]
    RemoteCommandFailed {
        host: String,
        exit: u32,
        stdout: String,
        stderr: String,
    },

    #[error("Provider Error: {0}")]
    Provider(String),

    #[error("Could not find package for {module} {version} / {distribution}")]
    ModuleInstallFailed {
        module: String,
        version: String,
        distribution: String,
    },

    #[error("{module} health check failed for master {host}: {reason}")]
    HealthCheckFailed {
        module: String,
        host: String,
        reason: String,
    },

    #[error("Timed out after {secs}s waiting for {operation}")]
    Timeout { operation: String, secs: u64 },

    #[error("Aborted by user")]
    UserAbort,

    #[error("Key generation Error: {0}")]
    KeyGeneration(String),

    #[error("HTTP client Error: {0}")]
    Http(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl FlintrockError {
    /// Whether this error is a guarded precondition failure rather than an
    /// unexpected fault. These map to exit code 1 with a plain message
    /// instead of an error trace.
    pub fn is_precondition_failure(&self) -> bool {
        matches!(
            self,
            FlintrockError::ClusterNotFound(_)
                | FlintrockError::ClusterAlreadyExists(_)
                | FlintrockError::UserAbort
        )
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for FlintrockError {
    fn from(e: std::io::Error) -> Self {
        FlintrockError::Io(Arc::new(e))
    }
}

impl From<russh::Error> for FlintrockError {
    fn from(e: russh::Error) -> Self {
        FlintrockError::Ssh(e)
    }
}

impl From<russh_keys::Error> for FlintrockError {
    fn from(e: russh_keys::Error) -> Self {
        FlintrockError::KeyLoad(e)
    }
}

impl From<reqwest::Error> for FlintrockError {
    fn from(e: reqwest::Error) -> Self {
        FlintrockError::Http(e.to_string())
    }
}
