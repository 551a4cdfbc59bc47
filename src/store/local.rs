//! This node's own membership store daemon

use crate::common::Result;
use crate::daemon::{DaemonHandle, DaemonManager};
use crate::store::StoreReconfigure;
use std::path::PathBuf;
use std::sync::Arc;

/// Applies reconfiguration requests sent by the node removing us.
pub struct LocalStoreControl {
    data_dir: Option<PathBuf>,
    daemon: Option<DaemonHandle>,
    manager: Arc<dyn DaemonManager>,
}

impl LocalStoreControl {
    pub fn new(
        data_dir: Option<PathBuf>,
        daemon: Option<DaemonHandle>,
        manager: Arc<dyn DaemonManager>,
    ) -> Self {
        Self {
            data_dir,
            daemon,
            manager,
        }
    }

    /// With `delete_peer`: stop the store, wipe its data and restart it
    /// as a standalone single-member cluster.
    pub async fn apply(&self, options: &StoreReconfigure) -> Result<()> {
        if !options.delete_peer {
            return Ok(());
        }
        tracing::info!("reconfiguring membership store as standalone");

        if let Some(daemon) = &self.daemon {
            self.manager.stop(daemon, true).await?;
        }
        if let Some(dir) = &self.data_dir {
            match tokio::fs::remove_dir_all(dir).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
            tokio::fs::create_dir_all(dir).await?;
        }
        if let Some(daemon) = &self.daemon {
            self.manager.start(daemon, false).await?;
        }
        Ok(())
    }
}
