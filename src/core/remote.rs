//! Remote execution - connecting to hosts and running launch commands
//!
//! The supervisors only see the [`Connector`] / [`Connection`] /
//! [`RemoteSession`] traits. [`SshConnector`] implements them on top of the
//! OpenSSH client so key handling and host verification stay with the user's
//! ssh setup.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("couldn't connect to host: '{host}' port: {port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("couldn't open a session on host: '{host}': {reason}")]
    Session { host: String, reason: String },

    #[error("{0}")]
    Command(String),
}

/// Opens connections to hosts
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Connection>, RemoteError>;
}

/// An established connection to one host, able to open sessions
#[async_trait]
pub trait Connection: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn RemoteSession>, RemoteError>;
}

/// One remote execution session
#[async_trait]
pub trait RemoteSession: Send {
    /// Run a command that detaches itself; returns once it has been started
    async fn run(&mut self, command: &str) -> Result<(), RemoteError>;
}

/// Connector backed by the `ssh` command line client
#[derive(Debug, Clone)]
pub struct SshConnector {
    pub program: String,
    pub user: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            user: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SshConnector {
    pub fn new(user: Option<String>, connect_timeout: Duration) -> Self {
        Self {
            user,
            connect_timeout,
            ..Self::default()
        }
    }

    /// The ssh arguments up to and including the destination
    fn destination_args(&self, host: &str, port: u16) -> Vec<String> {
        let mut args = vec![
            "-n".to_string(),
            "-p".to_string(),
            port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ];
        if let Some(user) = &self.user {
            args.push("-l".to_string());
            args.push(user.clone());
        }
        args.push(host.to_string());
        args
    }
}

/// Run ssh with the given arguments and turn a non-zero exit into an error
/// message built from its stderr
async fn run_ssh(program: &str, args: &[String]) -> Result<(), String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("couldn't run {}: {}", program, e))?;

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    match output.status.code() {
        Some(code) if stderr.is_empty() => Err(format!("exited with code {}", code)),
        Some(code) => Err(format!("exited with code {}: {}", code, stderr)),
        None => Err(format!("killed by a signal: {}", stderr)),
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Connection>, RemoteError> {
        log::info!("Open ssh connection to: {} port: {}", host, port);
        let base = self.destination_args(host, port);

        let mut probe = base.clone();
        probe.push("true".to_string());
        run_ssh(&self.program, &probe)
            .await
            .map_err(|reason| RemoteError::Connect {
                host: host.to_string(),
                port,
                reason,
            })?;

        Ok(Box::new(SshConnection {
            program: self.program.clone(),
            host: host.to_string(),
            base,
        }))
    }
}

struct SshConnection {
    program: String,
    host: String,
    base: Vec<String>,
}

#[async_trait]
impl Connection for SshConnection {
    async fn open_session(&self) -> Result<Box<dyn RemoteSession>, RemoteError> {
        if self.base.is_empty() {
            return Err(RemoteError::Session {
                host: self.host.clone(),
                reason: "no destination".to_string(),
            });
        }
        Ok(Box::new(SshSession {
            program: self.program.clone(),
            base: self.base.clone(),
        }))
    }
}

struct SshSession {
    program: String,
    base: Vec<String>,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&mut self, command: &str) -> Result<(), RemoteError> {
        let mut args = self.base.clone();
        args.push(background(command));
        run_ssh(&self.program, &args).await.map_err(RemoteError::Command)
    }
}

/// Commands are started in the background on the remote side
pub fn background(command: &str) -> String {
    format!("{} &", command.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_args() {
        let ssh = SshConnector::new(Some("ops".into()), Duration::from_secs(5));
        let args = ssh.destination_args("h1", 2222);
        assert_eq!(
            args,
            vec![
                "-n",
                "-p",
                "2222",
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=5",
                "-l",
                "ops",
                "h1"
            ]
        );
    }

    #[test]
    fn test_background() {
        assert_eq!(background("start-db --port 5432 "), "start-db --port 5432 &");
    }

    #[tokio::test]
    async fn test_missing_ssh_program_is_a_connect_error() {
        let ssh = SshConnector {
            program: "/nonexistent/ssh-binary".to_string(),
            ..SshConnector::default()
        };
        match ssh.connect("h1", 22).await {
            Err(RemoteError::Connect { host, port, .. }) => {
                assert_eq!(host, "h1");
                assert_eq!(port, 22);
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("connect should fail"),
        }
    }
}
