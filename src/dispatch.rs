//! Routing a request through the gateway while recording it as a trace.
//!
//! The gateway call runs outside the store lock. The agent is marked
//! `active` for the duration and the `gateway_request` trace captures the
//! payload, the result (or error) and the elapsed time.

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

use crate::control::MissionControl;
use crate::gateway::{Gateway, GatewayError};
use crate::store::{AgentStatus, JsonMap, NewTrace, StoreError};

pub const GATEWAY_REQUEST_ACTION: &str = "gateway_request";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Upstream(#[from] GatewayError),

    #[error("Gateway did not answer within {0:?}")]
    Timeout(Duration),
}

fn pending_metadata() -> JsonMap {
    let mut metadata = JsonMap::new();
    metadata.insert("status".to_string(), json!("pending"));
    metadata
}

/// Send `payload` to `agent_id` through `gateway`.
pub async fn dispatch_request(
    control: &MissionControl,
    gateway: &dyn Gateway,
    agent_id: &str,
    payload: Value,
    timeout: Duration,
) -> Result<Value, DispatchError> {
    control
        .agent(agent_id)
        .await
        .ok_or_else(|| StoreError::agent_not_found(agent_id))?;

    control
        .update_agent_status(agent_id, AgentStatus::Active)
        .await?;

    let trace = control
        .create_trace(NewTrace {
            agent_id: agent_id.to_string(),
            action: GATEWAY_REQUEST_ACTION.to_string(),
            input: Some(payload.clone()),
            output: None,
            metadata: Some(pending_metadata()),
        })
        .await
        .into_value();

    tracing::info!(
        agent_id = %agent_id,
        trace_id = %trace.id,
        gateway = gateway.name(),
        "Dispatching gateway request"
    );

    let outcome = match tokio::time::timeout(timeout, gateway.perform_request(agent_id, payload)).await
    {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(DispatchError::Upstream(e)),
        Err(_) => Err(DispatchError::Timeout(timeout)),
    };

    // The agent may have been deleted while the request was in flight.
    match outcome {
        Ok(result) => {
            let mut metadata = JsonMap::new();
            metadata.insert("status".to_string(), json!("completed"));
            control
                .complete_trace(&trace.id, result.clone(), Some(metadata))
                .await;
            if let Err(e) = control.update_agent_status(agent_id, AgentStatus::Idle).await {
                tracing::debug!(agent_id = %agent_id, "Skipping idle transition: {}", e);
            }
            Ok(result)
        }
        Err(e) => {
            tracing::warn!(agent_id = %agent_id, trace_id = %trace.id, "Gateway request failed: {}", e);
            let mut metadata = JsonMap::new();
            metadata.insert("status".to_string(), json!("failed"));
            control
                .fail_trace(&trace.id, &e.to_string(), Some(metadata))
                .await;
            if let Err(err) = control.update_agent_status(agent_id, AgentStatus::Error).await {
                tracing::debug!(agent_id = %agent_id, "Skipping error transition: {}", err);
            }
            Err(e)
        }
    }
}
