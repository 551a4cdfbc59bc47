//! Process-backed daemon manager

use crate::common::{Error, Result};
use crate::daemon::{DaemonHandle, DaemonManager};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// `EADDRINUSE` on Linux; daemons exit with it when their port is taken.
const EADDRINUSE: i32 = 98;

pub struct ProcessDaemonManager {
    ready_timeout: Duration,
}

impl ProcessDaemonManager {
    pub fn new(ready_timeout: Duration) -> Self {
        Self { ready_timeout }
    }
}

async fn read_pid(pidfile: &Path) -> Result<Option<u32>> {
    match tokio::fs::read_to_string(pidfile).await {
        Ok(s) => Ok(s.trim().parse().ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn is_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

async fn write_pid_if_missing(pidfile: &Path, pid: Option<u32>) -> Result<()> {
    if let Some(pid) = pid {
        if read_pid(pidfile).await?.is_none() {
            if let Some(dir) = pidfile.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            tokio::fs::write(pidfile, pid.to_string()).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl DaemonManager for ProcessDaemonManager {
    async fn start(&self, daemon: &DaemonHandle, wait_for_ready: bool) -> Result<()> {
        if let Some(pid) = read_pid(&daemon.pidfile).await? {
            if is_running(pid) {
                tracing::debug!(daemon = %daemon.name, pid, "daemon already running");
                return Ok(());
            }
        }

        tracing::info!(daemon = %daemon.name, binary = %daemon.binary.display(), "starting daemon");
        let mut child = Command::new(&daemon.binary)
            .args(&daemon.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Daemon {
                name: daemon.name.clone(),
                reason: e.to_string(),
            })?;

        if !wait_for_ready {
            return write_pid_if_missing(&daemon.pidfile, child.id()).await;
        }

        // A daemonizing server exits once its child is serving
        match tokio::time::timeout(self.ready_timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) if status.code() == Some(EADDRINUSE) => {
                Err(Error::AddressInUse(daemon.name.clone()))
            }
            Ok(Ok(status)) => Err(Error::Daemon {
                name: daemon.name.clone(),
                reason: format!("exited with {}", status),
            }),
            Ok(Err(e)) => Err(e.into()),
            // Still in the foreground: running
            Err(_) => write_pid_if_missing(&daemon.pidfile, child.id()).await,
        }
    }

    async fn stop(&self, daemon: &DaemonHandle, force: bool) -> Result<()> {
        let Some(pid) = read_pid(&daemon.pidfile).await? else {
            tracing::debug!(daemon = %daemon.name, "no pidfile, daemon not running");
            return Ok(());
        };

        if is_running(pid) {
            let signal = if force { "-KILL" } else { "-TERM" };
            tracing::info!(daemon = %daemon.name, pid, signal, "stopping daemon");
            let status = Command::new("kill")
                .arg(signal)
                .arg(pid.to_string())
                .status()
                .await?;
            if !status.success() && is_running(pid) {
                return Err(Error::Daemon {
                    name: daemon.name.clone(),
                    reason: format!("kill {} {} failed", signal, pid),
                });
            }
        }

        match tokio::fs::remove_file(&daemon.pidfile).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
