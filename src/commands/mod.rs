//! Administrative operations
//!
//! Each feature module owns its step functions and registers them into the
//! node's [`StepRegistry`] at start-up; the same registry is used whether a
//! function runs for a local transaction or for one relayed from a peer.

pub mod peers;
pub mod volumes;

pub use peers::delete_peer;
pub use volumes::{
    create_volume, start_volume, stop_volume, volume_info, BrickRequest, CreateVolumeRequest,
};

use crate::common::{BrickConfig, Result};
use crate::daemon::DaemonManager;
use crate::store::{MembershipBackend, PeerDirectory, VolumeRepository};
use crate::txn::{NodeId, StepRegistry, Transaction};
use std::sync::Arc;

/// Collaborators the step functions of this node need.
#[derive(Clone)]
pub struct StepDeps {
    pub node_id: NodeId,
    pub peers: Arc<dyn PeerDirectory>,
    pub volumes: Arc<dyn VolumeRepository>,
    pub membership: Arc<dyn MembershipBackend>,
    pub daemons: Arc<dyn DaemonManager>,
    pub bricks: BrickConfig,
}

/// Register every step function this crate provides.
pub fn register_step_funcs(registry: &mut StepRegistry, deps: &StepDeps) -> Result<()> {
    volumes::register_step_funcs(registry, deps)?;
    peers::register_step_funcs(registry, deps)?;
    Ok(())
}

/// Build and execute `txn`, cleaning it up on every path.
pub(crate) async fn run_transaction(
    mut txn: Transaction,
    build: impl FnOnce(&mut Transaction) -> Result<()>,
) -> Result<()> {
    let result = match build(&mut txn) {
        Ok(()) => txn.execute().await,
        Err(e) => Err(e),
    };
    txn.cleanup().await;
    result
}
