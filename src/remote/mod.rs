//! Running commands on deployment targets.
//!
//! The deploy layer only talks to [`Remote`]: run a command in a
//! [`Connection`] context, or copy a file to the target. [`SshRemote`] is the
//! implementation used by the CLI.

mod shell;
mod ssh;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

pub use shell::quote;
pub use ssh::SshRemote;

/// Host name that means "run on this machine, no ssh".
pub const LOCALHOST: &str = "localhost";

/// Where and as whom a command runs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Connection {
    pub host: String,
    /// Login user for ssh; `None` leaves it to the ssh configuration.
    pub ssh_user: Option<String>,
    /// Run the command through sudo as this user.
    pub sudo_user: Option<String>,
    /// Extra environment for the command.
    pub env: Vec<(String, String)>,
}

impl Connection {
    pub fn new(host: impl Into<String>, ssh_user: Option<String>) -> Self {
        Self {
            host: host.into(),
            ssh_user,
            ..Default::default()
        }
    }

    pub fn is_local(&self) -> bool {
        self.host == LOCALHOST
    }

    /// Switch to `user` unless that is who the command would run as anyway.
    pub fn run_as(mut self, user: Option<&str>) -> Self {
        if let Some(user) = user {
            let current = self.sudo_user.as_deref().or(self.ssh_user.as_deref());
            if current != Some(user) {
                self.sudo_user = Some(user.to_string());
            }
        }
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// `user@host` or plain `host` for ssh/scp.
    pub fn destination(&self) -> String {
        match &self.ssh_user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

/// Captured result of a command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl ExecOutput {
    /// Short description of a failure for logs and the release log.
    pub fn failure_summary(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().lines().last().unwrap_or("").to_string()
        } else {
            stderr.lines().last().unwrap_or("").to_string()
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Remote: Send + Sync {
    /// Run `command` through a shell in the given context. An `Err` means
    /// the command could not be started at all; a command that ran and
    /// failed is reported through [`ExecOutput::success`].
    async fn exec(&self, conn: &Connection, command: &str) -> Result<ExecOutput>;

    /// Copy a local file to `remote` on the target, writing it as the
    /// connection's sudo user when one is set.
    async fn transfer(&self, conn: &Connection, local: &Path, remote: &Path) -> Result<ExecOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_as_same_user_is_noop() {
        let conn = Connection::new("web1", Some("yoda".into())).run_as(Some("yoda"));
        assert_eq!(conn.sudo_user, None);
    }

    #[test]
    fn test_run_as_other_user() {
        let conn = Connection::new("web1", Some("admin".into())).run_as(Some("yoda"));
        assert_eq!(conn.sudo_user.as_deref(), Some("yoda"));

        // Project user on top of a target owner
        let conn = conn.run_as(Some("wwwyoda"));
        assert_eq!(conn.sudo_user.as_deref(), Some("wwwyoda"));
    }

    #[test]
    fn test_run_as_none_keeps_current() {
        let conn = Connection::new("web1", Some("admin".into()))
            .run_as(Some("yoda"))
            .run_as(None);
        assert_eq!(conn.sudo_user.as_deref(), Some("yoda"));
    }

    #[test]
    fn test_destination() {
        assert_eq!(Connection::new("web1", Some("admin".into())).destination(), "admin@web1");
        assert_eq!(Connection::new("web1", None).destination(), "web1");
        assert!(Connection::new(LOCALHOST, None).is_local());
    }

    #[test]
    fn test_failure_summary() {
        let output = ExecOutput {
            stdout: "Processing x.whl\n".into(),
            stderr: "WARNING: foo\nERROR: No matching distribution\n".into(),
            success: false,
        };
        assert_eq!(output.failure_summary(), "ERROR: No matching distribution");

        let output = ExecOutput {
            stdout: "step 1\nstep 2 failed\n".into(),
            ..Default::default()
        };
        assert_eq!(output.failure_summary(), "step 2 failed");
    }
}
