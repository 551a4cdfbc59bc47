//! Context Store: typed key/value state shared by every step of one transaction
//!
//! Values are held as JSON so the whole store can be shipped to a remote node
//! with the relayed step and rebuilt there unchanged.

use crate::common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

/// Serialized form of a context store, as carried by the relay channel.
pub type CtxSnapshot = HashMap<String, serde_json::Value>;

/// Handle to a transaction's context store. Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct TxnCtx {
    inner: Arc<CtxInner>,
}

struct CtxInner {
    txn_id: Uuid,
    node_id: Uuid,
    values: RwLock<CtxSnapshot>,
    span: tracing::Span,
}

impl TxnCtx {
    /// Fresh, empty store for a transaction orchestrated on `node_id`.
    pub fn new(txn_id: Uuid, node_id: Uuid) -> Self {
        Self::from_snapshot(txn_id, node_id, CtxSnapshot::new())
    }

    /// Rebuild a store received from the orchestrator.
    pub fn from_snapshot(txn_id: Uuid, node_id: Uuid, values: CtxSnapshot) -> Self {
        let span = tracing::info_span!("txn", txn_id = %txn_id, node = %node_id);
        Self {
            inner: Arc::new(CtxInner {
                txn_id,
                node_id,
                values: RwLock::new(values),
                span,
            }),
        }
    }

    pub fn txn_id(&self) -> Uuid {
        self.inner.txn_id
    }

    /// Node this copy of the store lives on.
    pub fn node_id(&self) -> Uuid {
        self.inner.node_id
    }

    /// Logger handle: the transaction's span. Step invocations run inside it.
    pub fn logger(&self) -> &tracing::Span {
        &self.inner.span
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.inner
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    /// Read the value under `key`; a missing key is an error.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.try_get(key)?.ok_or_else(|| {
            tracing::error!(parent: self.logger(), key, "failed to get value for key from context");
            Error::Internal(format!("missing transaction context key: {}", key))
        })
    }

    /// Read the value under `key`, if present.
    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let values = self
            .inner
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match values.get(key) {
            Some(v) => Ok(Some(T::deserialize(v)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Remove `key`, returning whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.inner
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Copy of every entry, for shipping to another node.
    pub fn snapshot(&self) -> CtxSnapshot {
        self.inner
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn clear(&self) {
        self.inner
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl std::fmt::Debug for TxnCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxnCtx")
            .field("txn_id", &self.inner.txn_id)
            .field("node_id", &self.inner.node_id)
            .field("keys", &self.len())
            .finish()
    }
}
