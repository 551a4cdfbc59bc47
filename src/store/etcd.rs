//! Membership store access through its JSON gateway
//!
//! Used for two things:
//! - cluster-wide lock tokens (`/v3/kv/txn` compare-and-put on a lock key)
//! - membership bookkeeping (`/v3/cluster/member/remove`)
//!
//! Remote reconfiguration goes to the peer's own internal API, which owns
//! its local store daemon.

use crate::common::{form_remote_peer_address, Error, Result};
use crate::store::{MembershipBackend, StoreReconfigure};
use crate::txn::LockBackend;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

/// Internal endpoint that reconfigures a node's membership store.
pub const RECONFIGURE_PATH: &str = "/internal/v1/store/reconfigure";

const LOCK_PREFIX: &str = "brickmgr/locks/";

pub struct EtcdGateway {
    client: reqwest::Client,
    endpoint: Option<String>,
    peer_port: u16,
    timeout: Duration,
}

impl EtcdGateway {
    pub fn new(endpoint: Option<String>, peer_port: u16, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            peer_port,
            timeout,
        }
    }

    fn endpoint(&self, stage: &str) -> Result<&str> {
        self.endpoint.as_deref().ok_or_else(|| Error::Membership {
            stage: stage.to_string(),
            reason: "no membership store endpoint configured".into(),
        })
    }

    async fn post(&self, stage: &str, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.endpoint(stage)?, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Membership {
                stage: stage.to_string(),
                reason: e.to_string(),
            })?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let reason = body
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("gateway returned {}", status));
            return Err(Error::Membership {
                stage: stage.to_string(),
                reason,
            });
        }
        Ok(body)
    }
}

fn lock_key(resource: &str) -> String {
    STANDARD.encode(format!("{}{}", LOCK_PREFIX, resource))
}

#[async_trait]
impl LockBackend for EtcdGateway {
    async fn try_acquire(&self, resource: &str, owner: Uuid) -> Result<()> {
        let key = lock_key(resource);
        let value = STANDARD.encode(owner.to_string());
        let body = json!({
            "compare": [{ "result": "EQUAL", "target": "CREATE", "key": key, "create_revision": "0" }],
            "success": [{ "request_put": { "key": key, "value": value } }],
            "failure": [{ "request_range": { "key": key } }],
        });
        let reply = self.post("lock acquire", "/v3/kv/txn", &body).await?;
        if reply.get("succeeded").and_then(Value::as_bool) == Some(true) {
            return Ok(());
        }
        // Already ours counts as acquired
        let holder = reply
            .pointer("/responses/0/response_range/kvs/0/value")
            .and_then(Value::as_str);
        if holder == Some(value.as_str()) {
            return Ok(());
        }
        Err(Error::ResourceBusy(resource.to_string()))
    }

    async fn release(&self, resource: &str, owner: Uuid) -> Result<()> {
        let key = lock_key(resource);
        let body = json!({
            "compare": [{
                "result": "EQUAL",
                "target": "VALUE",
                "key": key,
                "value": STANDARD.encode(owner.to_string()),
            }],
            "success": [{ "request_delete_range": { "key": key } }],
        });
        self.post("lock release", "/v3/kv/txn", &body).await?;
        Ok(())
    }
}

#[async_trait]
impl MembershipBackend for EtcdGateway {
    async fn remove_member(&self, member_id: u64) -> Result<()> {
        let body = json!({ "ID": member_id.to_string() });
        match self
            .post("member remove", "/v3/cluster/member/remove", &body)
            .await
        {
            // A retried removal finds the member already gone
            Err(Error::Membership { reason, .. }) if reason.contains("member not found") => {
                tracing::info!(member_id, "member already removed from membership store");
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    async fn reconfigure_remote(
        &self,
        peer_address: &str,
        options: &StoreReconfigure,
    ) -> Result<()> {
        let address = form_remote_peer_address(peer_address, self.peer_port)?;
        let url = format!("http://{}{}", address, RECONFIGURE_PATH);
        let response = self
            .client
            .post(&url)
            .json(options)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Membership {
                stage: "remote reconfigure".into(),
                reason: e.to_string(),
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let reason = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|b| b.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| format!("peer returned {}", status));
            Err(Error::Membership {
                stage: "remote reconfigure".into(),
                reason,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_encoding() {
        assert_eq!(
            STANDARD.decode(lock_key("vol1")).unwrap(),
            b"brickmgr/locks/vol1".to_vec()
        );
    }

    #[tokio::test]
    async fn test_unconfigured_endpoint_fails_per_stage() {
        let gateway = EtcdGateway::new(None, 24008, Duration::from_secs(1));
        let err = gateway.remove_member(7).await.unwrap_err();
        assert!(matches!(err, Error::Membership { ref stage, .. } if stage == "member remove"));
        assert!(gateway.try_acquire("vol1", Uuid::new_v4()).await.is_err());
    }
}
