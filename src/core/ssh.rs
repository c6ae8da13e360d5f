// src/core/ssh.rs

//! SSH transport: authenticated sessions with bounded retry, and remote
//! command execution with captured output.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh::{ChannelMsg, Disconnect};
use russh_keys::key;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info};

use crate::core::errors::FlintrockError;

/// Back-off between connection attempts while a node is still booting.
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Per-attempt cap on TCP connect + handshake.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Captured result of a completed remote command.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit: u32,
}

/// Host keys are auto-accepted: every node we talk to was allocated moments
/// ago and has no prior known-hosts entry.
struct PermissiveHandler;

#[async_trait]
impl client::Handler for PermissiveHandler {
    type Error = russh::Error;

    async fn check_server_key(
        self,
        _server_public_key: &key::PublicKey,
    ) -> Result<(Self, bool), Self::Error> {
        Ok((self, true))
    }
}

/// An authenticated SSH session to a single node. Each session is owned by
/// exactly one provisioning task.
pub struct SshSession {
    handle: client::Handle<PermissiveHandler>,
    host: String,
}

impl SshSession {
    /// Opens an authenticated session to `host`, retrying with a fixed
    /// back-off until `deadline` elapses. Freshly launched nodes refuse
    /// connections, time out, or reject authentication while they boot, so
    /// every connect-phase failure is treated as retriable.
    pub async fn connect(
        user: &str,
        host: &str,
        identity_file: &Path,
        deadline: Duration,
    ) -> Result<Self, FlintrockError> {
        let identity = Arc::new(russh_keys::load_secret_key(identity_file, None)?);
        let config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let started = Instant::now();
        loop {
            match Self::attempt(config.clone(), user, host, identity.clone()).await {
                Ok(session) => {
                    info!("[{host}] SSH online.");
                    return Ok(session);
                }
                Err(e) => {
                    if started.elapsed() >= deadline {
                        return Err(FlintrockError::SshUnreachable {
                            host: host.to_string(),
                            elapsed_secs: started.elapsed().as_secs(),
                        });
                    }
                    debug!("[{host}] SSH not ready yet ({e}); retrying.");
                    sleep(RETRY_INTERVAL).await;
                }
            }
        }
    }

    async fn attempt(
        config: Arc<client::Config>,
        user: &str,
        host: &str,
        identity: Arc<key::KeyPair>,
    ) -> Result<Self, FlintrockError> {
        let connect = client::connect(config, (host, 22), PermissiveHandler);
        let mut handle = timeout(ATTEMPT_TIMEOUT, connect)
            .await
            .map_err(|_| FlintrockError::Timeout {
                operation: format!("SSH handshake with {host}"),
                secs: ATTEMPT_TIMEOUT.as_secs(),
            })??;

        let authenticated = handle.authenticate_publickey(user, identity).await?;
        if !authenticated {
            return Err(FlintrockError::SshUnreachable {
                host: host.to_string(),
                elapsed_secs: 0,
            });
        }

        Ok(Self {
            handle,
            host: host.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Executes a shell program to completion, capturing both output streams
    /// and the exit code. A non-zero exit fails with both streams attached.
    pub async fn run(&mut self, script: &str) -> Result<CommandOutput, FlintrockError> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, script).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => exit = Some(exit_status),
                _ => {}
            }
        }

        let output = CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit: exit.unwrap_or(0),
        };

        if output.exit != 0 {
            return Err(FlintrockError::RemoteCommandFailed {
                host: self.host.clone(),
                exit: output.exit,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// Closes the session. Dropping the session also tears down the
    /// connection; this just makes the disconnect explicit and awaitable.
    pub async fn close(self) -> Result<(), FlintrockError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

/// Quotes `s` for safe inclusion in a POSIX shell command line. Script
/// payloads are shipped inline as single shell-quoted literals.
pub fn sh_quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for c in s.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_wraps_in_single_quotes() {
        assert_eq!(sh_quote("plain"), "'plain'");
    }

    #[test]
    fn quoting_escapes_embedded_single_quotes() {
        assert_eq!(sh_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn quoting_preserves_dollar_expansion_literally() {
        assert_eq!(sh_quote("$HOME"), "'$HOME'");
    }
}
