//! Gateway endpoints.
//!
//! - `POST /api/gateway/request` - Run a payload on an agent, recorded as a trace
//! - `GET /api/gateway/health` - Whether the upstream gateway answers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::agents::json_body;
use super::error::{bad_request, dispatch_error, ApiError};
use super::routes::AppState;
use crate::dispatch::dispatch_request;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/request", post(gateway_request))
        .route("/health", get(gateway_health))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Serialize)]
pub struct GatewayHealth {
    pub gateway: String,
    pub reachable: bool,
}

async fn gateway_request(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GatewayRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let req = json_body(body)?;
    if req.agent_id.trim().is_empty() {
        return Err(bad_request("agentId is required"));
    }
    dispatch_request(
        &state.control,
        state.gateway.as_ref(),
        &req.agent_id,
        req.payload,
        state.config.gateway.request_timeout,
    )
    .await
    .map(Json)
    .map_err(dispatch_error)
}

async fn gateway_health(State(state): State<Arc<AppState>>) -> Json<GatewayHealth> {
    Json(GatewayHealth {
        gateway: state.gateway.name().to_string(),
        reachable: state.gateway.health_check().await,
    })
}
