//! Lock coordinator
//!
//! A transaction touching a shared resource starts with a lock step and ends
//! with the paired unlock step. The lock step's Undo is the unlock function,
//! so the token is released on rollback too. Tokens are owned by the
//! transaction id; releasing a token held by someone else is a no-op.
//!
//! Locking is advisory: it serializes administrative operations on the same
//! resource name and nothing else.

use crate::common::{Error, Result};
use crate::store::PeerDirectory;
use crate::txn::context::TxnCtx;
use crate::txn::step::{NodeId, ResolvedFn, Step, StepFn, StepFunc, LOCK_FUNC, UNLOCK_FUNC};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Storage for lock tokens.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Claim `resource` for `owner`; `Error::ResourceBusy` if another owner holds it.
    async fn try_acquire(&self, resource: &str, owner: Uuid) -> Result<()>;

    /// Drop the claim if `owner` holds it.
    async fn release(&self, resource: &str, owner: Uuid) -> Result<()>;
}

/// Process-local tokens, for single-node deployments and tests.
#[derive(Default)]
pub struct LocalLocks {
    held: Mutex<HashMap<String, Uuid>>,
}

impl LocalLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(&self, resource: &str) -> Option<Uuid> {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource)
            .copied()
    }
}

#[async_trait]
impl LockBackend for LocalLocks {
    async fn try_acquire(&self, resource: &str, owner: Uuid) -> Result<()> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        match held.get(resource) {
            Some(holder) if *holder != owner => Err(Error::ResourceBusy(resource.to_string())),
            _ => {
                held.insert(resource.to_string(), owner);
                Ok(())
            }
        }
    }

    async fn release(&self, resource: &str, owner: Uuid) -> Result<()> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if held.get(resource) == Some(&owner) {
            held.remove(resource);
        }
        Ok(())
    }
}

/// Process-local tokens for a node without a membership store. They cannot
/// serialize operations across nodes, so acquisition fails once the peer
/// directory lists any peer.
pub struct StandaloneLocks {
    local: LocalLocks,
    peers: Arc<dyn PeerDirectory>,
}

impl StandaloneLocks {
    pub fn new(peers: Arc<dyn PeerDirectory>) -> Self {
        Self {
            local: LocalLocks::new(),
            peers,
        }
    }
}

#[async_trait]
impl LockBackend for StandaloneLocks {
    async fn try_acquire(&self, resource: &str, owner: Uuid) -> Result<()> {
        let peers = self.peers.list()?.len();
        if peers > 0 {
            return Err(Error::InvalidConfig(format!(
                "cannot lock {} across {} peer(s) without a membership store endpoint",
                resource, peers
            )));
        }
        self.local.try_acquire(resource, owner).await
    }

    async fn release(&self, resource: &str, owner: Uuid) -> Result<()> {
        self.local.release(resource, owner).await
    }
}

/// Build the (lock, unlock) step pair for `resource`, run on `orchestrator`.
pub fn create_lock_steps(resource: &str, orchestrator: NodeId) -> (Step, Step) {
    let lock = Step {
        do_fn: StepFn::Lock(resource.to_string()),
        undo_fn: Some(StepFn::Unlock(resource.to_string())),
        nodes: vec![orchestrator],
    };
    let unlock = Step {
        do_fn: StepFn::Unlock(resource.to_string()),
        undo_fn: None,
        nodes: vec![orchestrator],
    };
    (lock, unlock)
}

struct LockFunc {
    backend: Arc<dyn LockBackend>,
    resource: String,
    owner: Uuid,
}

#[async_trait]
impl StepFunc for LockFunc {
    async fn call(&self, _ctx: &TxnCtx) -> Result<()> {
        self.backend.try_acquire(&self.resource, self.owner).await?;
        tracing::debug!(resource = %self.resource, "lock obtained");
        Ok(())
    }
}

struct UnlockFunc {
    backend: Arc<dyn LockBackend>,
    resource: String,
    owner: Uuid,
}

#[async_trait]
impl StepFunc for UnlockFunc {
    async fn call(&self, _ctx: &TxnCtx) -> Result<()> {
        self.backend.release(&self.resource, self.owner).await?;
        tracing::debug!(resource = %self.resource, "lock released");
        Ok(())
    }
}

/// Resolve a built-in lock function for the transaction `owner`.
pub(crate) fn resolve_builtin(
    f: &StepFn,
    backend: &Arc<dyn LockBackend>,
    owner: Uuid,
) -> Option<ResolvedFn> {
    let (name, func): (&str, Arc<dyn StepFunc>) = match f {
        StepFn::Lock(resource) => (
            LOCK_FUNC,
            Arc::new(LockFunc {
                backend: backend.clone(),
                resource: resource.clone(),
                owner,
            }),
        ),
        StepFn::Unlock(resource) => (
            UNLOCK_FUNC,
            Arc::new(UnlockFunc {
                backend: backend.clone(),
                resource: resource.clone(),
                owner,
            }),
        ),
        StepFn::Named(_) => return None,
    };
    Some(ResolvedFn {
        name: name.to_string(),
        func,
        local_only: true,
    })
}
