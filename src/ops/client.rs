//! HTTP client for a node's admin API

use crate::commands::CreateVolumeRequest;
use crate::common::{Error, Result};
use crate::store::{Peer, Volume};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub struct AdminClient {
    base: String,
    http: reqwest::Client,
}

impl AdminClient {
    pub fn new(node_url: &str) -> Self {
        Self {
            base: node_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<reqwest::Response> {
        let mut request = self.http.request(method, format!("{}{}", self.base, path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|b| b.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| status.to_string());
        Err(match status {
            StatusCode::NOT_FOUND => Error::NotFound(message),
            StatusCode::BAD_REQUEST => Error::InvalidRequest(message),
            StatusCode::CONFLICT => Error::ResourceBusy(message),
            StatusCode::GATEWAY_TIMEOUT => Error::Timeout(message),
            _ => Error::Internal(message),
        })
    }

    async fn json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        Ok(self.send(method, path, body).await?.json().await?)
    }

    pub async fn list_peers(&self) -> Result<Vec<Peer>> {
        self.json(Method::GET, "/v1/peers", None).await
    }

    pub async fn add_peer(&self, peer: &Peer) -> Result<Peer> {
        self.json(Method::POST, "/v1/peers", Some(serde_json::to_value(peer)?))
            .await
    }

    pub async fn delete_peer(&self, peer_id: &str) -> Result<()> {
        self.send(Method::DELETE, &format!("/v1/peers/{}", peer_id), None)
            .await?;
        Ok(())
    }

    pub async fn create_volume(&self, req: &CreateVolumeRequest) -> Result<Volume> {
        self.json(Method::POST, "/v1/volumes", Some(serde_json::to_value(req)?))
            .await
    }

    pub async fn list_volumes(&self) -> Result<Vec<Volume>> {
        self.json(Method::GET, "/v1/volumes", None).await
    }

    pub async fn volume_info(&self, name: &str) -> Result<Volume> {
        self.json(Method::GET, &format!("/v1/volumes/{}", name), None)
            .await
    }

    pub async fn start_volume(&self, name: &str) -> Result<Volume> {
        self.json(Method::POST, &format!("/v1/volumes/{}/start", name), None)
            .await
    }

    pub async fn stop_volume(&self, name: &str) -> Result<Volume> {
        self.json(Method::POST, &format!("/v1/volumes/{}/stop", name), None)
            .await
    }
}
