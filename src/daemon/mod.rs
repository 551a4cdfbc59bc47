//! Daemon lifecycle management
//!
//! Brick servers (and the local membership store) run as OS processes that
//! daemonize and write a pidfile. `DaemonManager` starts and stops them.

pub mod brick;
pub mod process;

pub use brick::brick_daemon;
pub use process::ProcessDaemonManager;

use crate::common::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Everything needed to start or stop one daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonHandle {
    /// Human-readable name for logs and errors
    pub name: String,
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub pidfile: PathBuf,
}

#[async_trait]
pub trait DaemonManager: Send + Sync {
    /// Start the daemon. With `wait_for_ready`, return only once it has
    /// reported readiness or failed; a busy port yields `Error::AddressInUse`.
    async fn start(&self, daemon: &DaemonHandle, wait_for_ready: bool) -> Result<()>;

    /// Stop the daemon; stopping one that is not running succeeds.
    async fn stop(&self, daemon: &DaemonHandle, force: bool) -> Result<()>;
}
