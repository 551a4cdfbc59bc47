//! Step dispatcher
//!
//! Fans one step out to every node in its node set and waits for all of them.
//! The local node runs the resolved function in-process; every other node is
//! reached through the relay executor. Both paths sit behind [`StepExecutor`].

use crate::common::{Error, Result};
use crate::txn::context::TxnCtx;
use crate::txn::step::{NodeId, ResolvedFn};
use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Runs a resolved step function for one node.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, node: NodeId, func: &ResolvedFn, ctx: &TxnCtx) -> Result<()>;
}

/// In-process invocation.
pub struct LocalExecutor;

#[async_trait]
impl StepExecutor for LocalExecutor {
    async fn execute(&self, _node: NodeId, func: &ResolvedFn, ctx: &TxnCtx) -> Result<()> {
        func.func.call(ctx).await
    }
}

/// Result of one per-node invocation.
#[derive(Debug)]
pub struct NodeOutcome {
    pub node: NodeId,
    pub result: Result<()>,
}

pub struct Dispatcher {
    local_node: NodeId,
    local: Arc<dyn StepExecutor>,
    remote: Arc<dyn StepExecutor>,
}

impl Dispatcher {
    pub fn new(local_node: NodeId, remote: Arc<dyn StepExecutor>) -> Self {
        Self::with_executors(local_node, Arc::new(LocalExecutor), remote)
    }

    pub fn with_executors(
        local_node: NodeId,
        local: Arc<dyn StepExecutor>,
        remote: Arc<dyn StepExecutor>,
    ) -> Self {
        Self {
            local_node,
            local,
            remote,
        }
    }

    pub fn local_node(&self) -> NodeId {
        self.local_node
    }

    fn executor_for(&self, node: NodeId) -> Arc<dyn StepExecutor> {
        if node == self.local_node {
            self.local.clone()
        } else {
            self.remote.clone()
        }
    }

    /// Invoke `func` on every node concurrently.
    ///
    /// Always waits for every invocation, even after one has failed. If the
    /// returned future is dropped, in-flight invocations are aborted; remote
    /// ones lose their connection but may still complete on the peer.
    pub async fn dispatch(
        &self,
        func: &ResolvedFn,
        nodes: &[NodeId],
        ctx: &TxnCtx,
    ) -> Vec<NodeOutcome> {
        let mut tasks = JoinSet::new();

        for &node in nodes {
            if func.local_only && node != self.local_node {
                tracing::error!(parent: ctx.logger(), step = %func.name, node = %node, "step is only valid on the orchestrating node");
                continue;
            }
            let executor = self.executor_for(node);
            let func = func.clone();
            let ctx = ctx.clone();
            let span =
                tracing::info_span!(parent: ctx.logger(), "step", step = %func.name, node = %node);

            tasks.spawn(
                async move {
                    let result = AssertUnwindSafe(executor.execute(node, &func, &ctx))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            Err(Error::Internal(format!(
                                "step function {} panicked",
                                func.name
                            )))
                        });
                    if let Err(e) = &result {
                        tracing::error!(error = %e, "step function failed");
                    }
                    NodeOutcome { node, result }
                }
                .instrument(span),
            );
        }

        let mut outcomes = Vec::with_capacity(nodes.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!(parent: ctx.logger(), error = %e, "step invocation task lost"),
            }
        }

        // Nodes that never reported: refused local-only targets or lost tasks
        for &node in nodes {
            if !outcomes.iter().any(|o| o.node == node) {
                outcomes.push(NodeOutcome {
                    node,
                    result: Err(Error::Internal(format!(
                        "step function {} did not run on node {}",
                        func.name, node
                    ))),
                });
            }
        }
        outcomes.sort_by_key(|o| nodes.iter().position(|n| *n == o.node));
        outcomes
    }
}

/// First failure among the outcomes, wrapped with the step and node it came from.
pub fn first_failure(step: &str, outcomes: Vec<NodeOutcome>) -> Result<()> {
    match outcomes.into_iter().find(|o| o.result.is_err()) {
        Some(NodeOutcome {
            node,
            result: Err(source),
        }) => Err(Error::StepFailed {
            step: step.to_string(),
            node,
            source: Box::new(source),
        }),
        _ => Ok(()),
    }
}
