//! Upstream agent gateway.
//!
//! The gateway is the system of record for which agents exist and the place
//! requests are actually executed. [`HttpGateway`] talks to a real gateway;
//! [`SimulatedGateway`] stands in when none is configured.

mod http;
mod simulated;

pub use http::HttpGateway;
pub use simulated::SimulatedGateway;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::store::ExternalAgent;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Gateway RPC {method} failed: {message}")]
    Rpc { method: String, message: String },

    #[error("Failed to decode gateway response: {0}")]
    Decode(String),

    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Current agent set as the gateway knows it.
    async fn fetch_agents(&self) -> Result<Vec<ExternalAgent>, GatewayError>;

    /// Execute `payload` on `agent_id` and return the gateway's result.
    async fn perform_request(&self, agent_id: &str, payload: Value) -> Result<Value, GatewayError>;

    async fn health_check(&self) -> bool;
}
