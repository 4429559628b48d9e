//! HTTP client for a real agent gateway.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::Url;

use super::{Gateway, GatewayError};
use crate::store::ExternalAgent;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpGateway {
    base_url: String,
    client: reqwest::Client,
    rpc_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl HttpGateway {
    pub fn new(base_url: &Url) -> Self {
        let mut base_url = base_url.as_str().to_string();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client: reqwest::Client::new(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    /// Upper bound for a single JSON-RPC round trip.
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call a JSON-RPC method on `/rpc` and return its `result`.
    pub async fn rpc(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let url = format!("{}/rpc", self.base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(self.rpc_timeout)
            .json(&json!({ "method": method, "params": params }))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: RpcResponse = serde_json::from_str(&text)
            .map_err(|e| GatewayError::Decode(format!("{}: {}", e, text)))?;
        if let Some(error) = parsed.error.filter(|e| !e.is_null()) {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(GatewayError::Rpc {
                method: method.to_string(),
                message,
            });
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }
}

/// Pull `agents` out of a `config.get` result. A missing list is empty.
fn agents_from_config(config: Value) -> Result<Vec<ExternalAgent>, GatewayError> {
    match config.get("agents") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(agents) => serde_json::from_value(agents.clone())
            .map_err(|e| GatewayError::Decode(format!("agents: {}", e))),
    }
}

fn request_body(agent_id: &str, payload: Value) -> Value {
    let mut body = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("payload".to_string(), other);
            map
        }
    };
    body.insert("agentId".to_string(), json!(agent_id));
    Value::Object(body)
}

#[async_trait]
impl Gateway for HttpGateway {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_agents(&self) -> Result<Vec<ExternalAgent>, GatewayError> {
        let config = self.rpc("config.get", json!({})).await?;
        agents_from_config(config)
    }

    async fn perform_request(&self, agent_id: &str, payload: Value) -> Result<Value, GatewayError> {
        let url = format!("{}/api/request", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&request_body(agent_id, payload))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            tracing::warn!(agent_id = %agent_id, status = status.as_u16(), "Gateway request rejected");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| GatewayError::Decode(format!("{}: {}", e, text)))
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::debug!("Gateway health check failed: {}", e);
                false
            }
        }
    }
}
