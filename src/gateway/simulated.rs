//! In-process stand-in used when no gateway URL is configured.

use std::ops::RangeInclusive;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::{Gateway, GatewayError};
use crate::store::ExternalAgent;

/// Answers every request after a random 1-3 s processing delay.
pub struct SimulatedGateway {
    latency_ms: RangeInclusive<u64>,
    agents: RwLock<Vec<ExternalAgent>>,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(1000..=3000)
    }
}

impl SimulatedGateway {
    pub fn new(latency_ms: RangeInclusive<u64>) -> Self {
        Self {
            latency_ms,
            agents: RwLock::new(Vec::new()),
        }
    }

    /// No processing delay.
    pub fn instant() -> Self {
        Self::new(0..=0)
    }

    /// Replace the agent set reported by [`Gateway::fetch_agents`].
    pub async fn set_agents(&self, agents: Vec<ExternalAgent>) {
        *self.agents.write().await = agents;
    }

    fn latency(&self) -> Duration {
        let ms = rand::thread_rng().gen_range(self.latency_ms.clone());
        Duration::from_millis(ms)
    }
}

#[async_trait]
impl Gateway for SimulatedGateway {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn fetch_agents(&self) -> Result<Vec<ExternalAgent>, GatewayError> {
        Ok(self.agents.read().await.clone())
    }

    async fn perform_request(&self, agent_id: &str, _payload: Value) -> Result<Value, GatewayError> {
        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(json!({
            "agentId": agent_id,
            "result": "Processed successfully",
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }

    async fn health_check(&self) -> bool {
        true
    }
}
