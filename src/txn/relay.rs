//! Operation relay channel
//!
//! Carries a (step function name, context snapshot) pair to another node's
//! engine and brings back the outcome. [`HttpRelay`] talks to the peer's
//! internal API; [`LoopbackRelay`] routes to engines living in the same
//! process and is used for single-process clusters.

use crate::common::{form_remote_peer_address, Error, Result};
use crate::store::PeerDirectory;
use crate::txn::context::{CtxSnapshot, TxnCtx};
use crate::txn::dispatch::StepExecutor;
use crate::txn::step::{NodeId, ResolvedFn};
use crate::txn::transaction::TxnEngine;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use uuid::Uuid;

/// Internal endpoint that runs a relayed step.
pub const RELAY_PATH: &str = "/internal/v1/txn/step";

/// Relayed step invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRequest {
    pub txn_id: Uuid,
    /// Registry name of the step function
    pub step: String,
    pub context: CtxSnapshot,
}

/// Error body returned by a failed relayed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayError {
    pub error: String,
}

impl RelayRequest {
    pub fn new(func: &ResolvedFn, ctx: &TxnCtx) -> Self {
        Self {
            txn_id: ctx.txn_id(),
            step: func.name.clone(),
            context: ctx.snapshot(),
        }
    }
}

/// Relay over the peers' internal HTTP API.
pub struct HttpRelay {
    client: reqwest::Client,
    peers: Arc<dyn PeerDirectory>,
    peer_port: u16,
    timeout: Duration,
}

impl HttpRelay {
    pub fn new(peers: Arc<dyn PeerDirectory>, peer_port: u16, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            peers,
            peer_port,
            timeout,
        }
    }

    fn peer_url(&self, node: NodeId) -> Result<String> {
        let peer = self.peers.lookup(node)?.ok_or_else(|| Error::Remote {
            node,
            reason: "peer not found in cluster".into(),
        })?;
        if !peer.state.is_healthy() {
            return Err(Error::Remote {
                node,
                reason: format!("peer {} is marked {:?}", peer.name, peer.state),
            });
        }
        let address = peer.list_addresses().first().ok_or_else(|| Error::Remote {
            node,
            reason: "peer has no addresses".into(),
        })?;
        let address = form_remote_peer_address(address, self.peer_port)?;
        Ok(format!("http://{}{}", address, RELAY_PATH))
    }
}

#[async_trait]
impl StepExecutor for HttpRelay {
    async fn execute(&self, node: NodeId, func: &ResolvedFn, ctx: &TxnCtx) -> Result<()> {
        let url = self.peer_url(node)?;
        let request = RelayRequest::new(func, ctx);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("step {} on node {}", func.name, node))
                } else {
                    Error::Remote {
                        node,
                        reason: e.to_string(),
                    }
                }
            })?;

        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let reason = match response.json::<RelayError>().await {
            Ok(body) => body.error,
            Err(_) => format!("relay returned {}", status),
        };
        Err(Error::Remote { node, reason })
    }
}

/// Relay to engines registered in this process.
///
/// Requests still go through JSON so step functions see exactly what a
/// remote node would.
#[derive(Default)]
pub struct LoopbackRelay {
    engines: RwLock<HashMap<NodeId, Weak<TxnEngine>>>,
}

impl LoopbackRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, engine: &Arc<TxnEngine>) {
        self.engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(engine.node_id(), Arc::downgrade(engine));
    }

    /// Take a node off the loopback, as if it went unreachable.
    pub fn unregister(&self, node: NodeId) {
        self.engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&node);
    }

    fn engine(&self, node: NodeId) -> Option<Arc<TxnEngine>> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&node)
            .and_then(Weak::upgrade)
    }
}

#[async_trait]
impl StepExecutor for LoopbackRelay {
    async fn execute(&self, node: NodeId, func: &ResolvedFn, ctx: &TxnCtx) -> Result<()> {
        let engine = self.engine(node).ok_or_else(|| Error::Remote {
            node,
            reason: "node unreachable".into(),
        })?;
        let wire = serde_json::to_vec(&RelayRequest::new(func, ctx))?;
        let request: RelayRequest = serde_json::from_slice(&wire)?;
        engine
            .run_relayed(request)
            .await
            .map_err(|e| Error::Remote {
                node,
                reason: e.to_string(),
            })
    }
}
