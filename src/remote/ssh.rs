//! [`Remote`] over the system `ssh`/`scp` binaries.
//!
//! Commands for [`LOCALHOST`](super::LOCALHOST) run through a local `bash`
//! instead. Remote commands are wrapped in `bash -c` so targets whose login
//! shell is not POSIX still see the same quoting.

use std::path::Path;
use std::process::Output;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use super::shell::{quote, wrap};
use super::{Connection, ExecOutput, Remote};

/// Directory on the target where wheels are staged before sudo moves them.
const UPLOAD_DIR: &str = "/tmp";

pub struct SshRemote {
    connection_attempts: u32,
}

impl SshRemote {
    pub fn new() -> Self {
        Self {
            connection_attempts: 3,
        }
    }

    fn ssh_options(&self) -> Vec<String> {
        vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectionAttempts={}", self.connection_attempts),
        ]
    }

    async fn run(mut command: Command) -> Result<ExecOutput> {
        let program = command.as_std().get_program().to_string_lossy().into_owned();
        let output: Output = command
            .output()
            .await
            .with_context(|| format!("Failed to start {}", program))?;
        let result = ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        };
        debug!("exit status {} ({} bytes of output)", output.status, output.stdout.len());
        Ok(result)
    }
}

impl Default for SshRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Remote for SshRemote {
    #[tracing::instrument(skip(self))]
    async fn exec(&self, conn: &Connection, command: &str) -> Result<ExecOutput> {
        let line = wrap(conn, command);
        debug!("[{}] {}", conn.destination(), line);

        let command = if conn.is_local() {
            let mut local = Command::new("bash");
            local.arg("-c").arg(&line);
            local
        } else {
            let mut ssh = Command::new("ssh");
            ssh.args(self.ssh_options())
                .arg(conn.destination())
                .arg(format!("bash -c {}", quote(&line)));
            ssh
        };
        Self::run(command).await
    }

    #[tracing::instrument(skip(self))]
    async fn transfer(&self, conn: &Connection, local: &Path, remote: &Path) -> Result<ExecOutput> {
        if conn.is_local() {
            let copy = format!(
                "cp {} {}",
                quote(&local.to_string_lossy()),
                quote(&remote.to_string_lossy())
            );
            return self.exec(conn, &copy).await;
        }

        // Without sudo scp can write straight to the destination.
        if conn.sudo_user.is_none() {
            let mut scp = Command::new("scp");
            scp.args(self.ssh_options())
                .arg(local)
                .arg(format!("{}:{}", conn.destination(), remote.display()));
            return Self::run(scp).await;
        }

        let file_name = remote
            .file_name()
            .context("Transfer destination has no file name")?
            .to_string_lossy();
        let upload = format!("{}/{}", UPLOAD_DIR, file_name);

        let mut scp = Command::new("scp");
        scp.args(self.ssh_options())
            .arg(local)
            .arg(format!("{}:{}", conn.destination(), upload));
        let uploaded = Self::run(scp).await?;
        if !uploaded.success {
            return Ok(uploaded);
        }

        let settle = format!(
            "cp {} {}",
            quote(&upload),
            quote(&remote.to_string_lossy())
        );
        let moved = self.exec(conn, &settle).await?;

        let cleanup = Connection {
            sudo_user: None,
            env: Vec::new(),
            ..conn.clone()
        };
        if let Err(e) = self.exec(&cleanup, &format!("rm -f {}", quote(&upload))).await {
            debug!("Failed to remove uploaded copy {}: {}", upload, e);
        }
        Ok(moved)
    }
}
