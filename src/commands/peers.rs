//! Peer deletion
//!
//! Runs as a transaction on the orchestrator and the departing peer:
//!
//! ```text
//! lock(peer id)
//! peer-delete.Validate            both nodes: no bricks on the peer
//! peer-delete.RemoveMember        orchestrator: membership store removal
//! peer-delete.ReconfigureStore    orchestrator: peer wipes and restarts its store
//! peer-delete.RemoveFromDirectory orchestrator: drop the peer record
//! unlock(peer id)
//! ```
//!
//! The directory record goes last, so a deletion that fails half-way can be
//! retried with the same id.

use crate::commands::{run_transaction, StepDeps};
use crate::common::{Error, Result};
use crate::store::{MembershipBackend, Peer, PeerDirectory, StoreReconfigure, VolumeRepository};
use crate::txn::{Step, StepFunc, StepRegistry, TxnCtx, TxnEngine};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub const DELETE_VALIDATE: &str = "peer-delete.Validate";
pub const DELETE_REMOVE_MEMBER: &str = "peer-delete.RemoveMember";
pub const DELETE_RECONFIGURE: &str = "peer-delete.ReconfigureStore";
pub const DELETE_REMOVE_PEER: &str = "peer-delete.RemoveFromDirectory";

const CTX_PEER: &str = "peer";

struct ValidateDelete {
    volumes: Arc<dyn VolumeRepository>,
}

#[async_trait]
impl StepFunc for ValidateDelete {
    async fn call(&self, ctx: &TxnCtx) -> Result<()> {
        let peer: Peer = ctx.get(CTX_PEER)?;
        for vol in self.volumes.list()? {
            if vol.bricks_on(peer.id).next().is_some() {
                return Err(Error::InvalidRequest(format!(
                    "peer {} hosts bricks of volume {}",
                    peer.id, vol.name
                )));
            }
        }
        Ok(())
    }
}

struct RemoveMember {
    membership: Arc<dyn MembershipBackend>,
}

#[async_trait]
impl StepFunc for RemoveMember {
    async fn call(&self, ctx: &TxnCtx) -> Result<()> {
        let peer: Peer = ctx.get(CTX_PEER)?;
        self.membership.remove_member(peer.member_id).await?;
        tracing::info!(parent: ctx.logger(), peer = %peer.id, member_id = peer.member_id, "removed member from membership store");
        Ok(())
    }
}

struct ReconfigureStore {
    membership: Arc<dyn MembershipBackend>,
}

#[async_trait]
impl StepFunc for ReconfigureStore {
    async fn call(&self, ctx: &TxnCtx) -> Result<()> {
        let peer: Peer = ctx.get(CTX_PEER)?;
        let address = peer
            .list_addresses()
            .first()
            .ok_or_else(|| Error::InvalidRequest(format!("peer {} has no address", peer.id)))?;
        let options = StoreReconfigure { delete_peer: true };
        if let Err(e) = self.membership.reconfigure_remote(address, &options).await {
            tracing::error!(parent: ctx.logger(), peer = %peer.id, error = %e, "failed to reconfigure remote membership store");
            return Err(e);
        }
        Ok(())
    }
}

struct RemoveFromDirectory {
    peers: Arc<dyn PeerDirectory>,
}

#[async_trait]
impl StepFunc for RemoveFromDirectory {
    async fn call(&self, ctx: &TxnCtx) -> Result<()> {
        let peer: Peer = ctx.get(CTX_PEER)?;
        self.peers.delete(peer.id)?;
        tracing::info!(parent: ctx.logger(), peer = %peer.id, "peer removed from directory");
        Ok(())
    }
}

pub(crate) fn register_step_funcs(registry: &mut StepRegistry, deps: &StepDeps) -> Result<()> {
    registry.register(
        DELETE_VALIDATE,
        Arc::new(ValidateDelete {
            volumes: deps.volumes.clone(),
        }),
    )?;
    registry.register(
        DELETE_REMOVE_MEMBER,
        Arc::new(RemoveMember {
            membership: deps.membership.clone(),
        }),
    )?;
    registry.register(
        DELETE_RECONFIGURE,
        Arc::new(ReconfigureStore {
            membership: deps.membership.clone(),
        }),
    )?;
    registry.register(
        DELETE_REMOVE_PEER,
        Arc::new(RemoveFromDirectory {
            peers: deps.peers.clone(),
        }),
    )?;
    Ok(())
}

/// Remove a peer from the cluster.
pub async fn delete_peer(
    engine: &Arc<TxnEngine>,
    peers: &dyn PeerDirectory,
    id: &str,
) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidRequest("peerid not present in the request".into()));
    }
    let peer_id = Uuid::parse_str(id)
        .map_err(|_| Error::InvalidRequest(format!("invalid peer id {}", id)))?;
    if peer_id == engine.node_id() {
        return Err(Error::InvalidRequest("removing self is disallowed".into()));
    }

    let peer = peers
        .lookup(peer_id)?
        .ok_or_else(|| Error::NotFound(format!("peer {} not found in cluster", peer_id)))?;
    if peer.list_addresses().is_empty() {
        return Err(Error::InvalidRequest(format!("peer {} has no address", peer_id)));
    }

    let local = engine.node_id();
    let result = run_transaction(engine.new_txn(), |txn| {
        txn.set_nodes(vec![local, peer.id]);
        let (lock, unlock) = txn.create_lock_steps(&peer.id.to_string());
        txn.add_step(lock)?;
        txn.add_step(Step::new(DELETE_VALIDATE, vec![]))?;
        txn.add_step(Step::new(DELETE_REMOVE_MEMBER, vec![local]))?;
        txn.add_step(Step::new(DELETE_RECONFIGURE, vec![local]))?;
        txn.add_step(Step::new(DELETE_REMOVE_PEER, vec![local]))?;
        txn.add_step(unlock)?;
        txn.ctx().set(CTX_PEER, &peer)?;
        Ok(())
    })
    .await;

    match &result {
        Ok(()) => tracing::info!(peer = %peer_id, "peer deleted"),
        Err(e) => tracing::error!(peer = %peer_id, error = %e, "failed to delete peer"),
    }
    result
}
