//! Steps and step functions

use crate::common::Result;
use crate::txn::context::TxnCtx;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of a cluster node (peer UUID).
pub type NodeId = Uuid;

/// A registered step function.
///
/// Do functions should leave no persistent side effect unless they return
/// success: the engine rolls back at step granularity and never calls the
/// Undo function of the step that failed. Undo functions must tolerate a
/// partially applied Do.
#[async_trait]
pub trait StepFunc: Send + Sync {
    async fn call(&self, ctx: &TxnCtx) -> Result<()>;
}

/// Function reference carried by a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepFn {
    /// Looked up by name in the step registry, on every node it runs on.
    Named(String),
    /// Built-in: acquire the lock token for a resource.
    Lock(String),
    /// Built-in: release the lock token for a resource.
    Unlock(String),
}

pub const LOCK_FUNC: &str = "txn.Lock";
pub const UNLOCK_FUNC: &str = "txn.Unlock";

impl StepFn {
    pub fn name(&self) -> &str {
        match self {
            StepFn::Named(name) => name,
            StepFn::Lock(_) => LOCK_FUNC,
            StepFn::Unlock(_) => UNLOCK_FUNC,
        }
    }

    /// Built-ins run on the orchestrating node only.
    pub fn is_builtin(&self) -> bool {
        !matches!(self, StepFn::Named(_))
    }
}

impl fmt::Display for StepFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepFn::Named(name) => write!(f, "{}", name),
            StepFn::Lock(resource) | StepFn::Unlock(resource) => {
                write!(f, "{}({})", self.name(), resource)
            }
        }
    }
}

/// One unit of a transaction.
#[derive(Debug, Clone)]
pub struct Step {
    pub do_fn: StepFn,
    pub undo_fn: Option<StepFn>,
    /// Nodes this step runs on; empty means every node of the transaction.
    pub nodes: Vec<NodeId>,
}

impl Step {
    pub fn new(do_fn: impl Into<String>, nodes: Vec<NodeId>) -> Self {
        Self {
            do_fn: StepFn::Named(do_fn.into()),
            undo_fn: None,
            nodes,
        }
    }

    pub fn with_undo(mut self, undo_fn: impl Into<String>) -> Self {
        self.undo_fn = Some(StepFn::Named(undo_fn.into()));
        self
    }

    /// Registry names this step needs.
    pub fn named_functions(&self) -> impl Iterator<Item = &str> {
        std::iter::once(&self.do_fn)
            .chain(self.undo_fn.as_ref())
            .filter_map(|f| match f {
                StepFn::Named(name) => Some(name.as_str()),
                _ => None,
            })
    }
}

/// A step function resolved for execution, keeping the name it is relayed under.
#[derive(Clone)]
pub struct ResolvedFn {
    pub name: String,
    pub func: Arc<dyn StepFunc>,
    /// Only valid on the orchestrating node.
    pub local_only: bool,
}

impl fmt::Debug for ResolvedFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedFn")
            .field("name", &self.name)
            .field("local_only", &self.local_only)
            .finish()
    }
}
