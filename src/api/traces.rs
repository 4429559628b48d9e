//! Trace endpoints.
//!
//! - `GET /api/traces` - Newest first (`?agentId=`, `?status=`, `?limit=`)
//! - `POST /api/traces` - Record a trace
//! - `DELETE /api/traces` - Drop every trace
//! - `GET /api/traces/recent` - Traces of the last `?minutes=` (default 5)
//! - `GET /api/traces/stats` - Counters and mean duration (`?agentId=`)
//! - `GET /api/traces/:id` - Fetch one trace
//! - `PATCH /api/traces/:id` - Attach output, metadata or a final status
//! - `DELETE /api/traces/:id` - Delete one trace

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use super::agents::json_body;
use super::error::{bad_request, not_found, ApiError};
use super::routes::AppState;
use crate::store::{
    JsonMap, NewTrace, Trace, TracePatch, TraceStats, TraceStatus, DEFAULT_AGENT_TRACE_LIMIT,
    DEFAULT_TRACE_LIMIT,
};

const DEFAULT_RECENT_MINUTES: i64 = 5;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(list_traces).post(create_trace).delete(clear_traces),
        )
        .route("/recent", get(recent_traces))
        .route("/stats", get(trace_stats))
        .route(
            "/:id",
            get(get_trace).patch(update_trace).delete(delete_trace),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTracesQuery {
    pub agent_id: Option<String>,
    pub status: Option<TraceStatus>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentTracesQuery {
    pub minutes: Option<i64>,
    pub agent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub agent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTraceRequest {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub metadata: Option<JsonMap>,
}

async fn list_traces(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTracesQuery>,
) -> Json<Vec<Trace>> {
    let limit = query.limit.unwrap_or(match query.agent_id {
        Some(_) => DEFAULT_AGENT_TRACE_LIMIT,
        None => DEFAULT_TRACE_LIMIT,
    });
    let traces = match (query.agent_id, query.status) {
        (agent_id, Some(status)) => {
            let mut traces = state.control.traces_by_status(status).await;
            if let Some(agent_id) = agent_id {
                traces.retain(|trace| trace.agent_id == agent_id);
            }
            traces.truncate(limit);
            traces
        }
        (Some(agent_id), None) => state.control.traces_by_agent(&agent_id, Some(limit)).await,
        (None, None) => state.control.traces(Some(limit)).await,
    };
    Json(traces)
}

async fn recent_traces(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentTracesQuery>,
) -> Json<Vec<Trace>> {
    let minutes = query.minutes.unwrap_or(DEFAULT_RECENT_MINUTES);
    Json(
        state
            .control
            .recent_traces(minutes, query.agent_id.as_deref())
            .await,
    )
}

async fn trace_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Json<TraceStats> {
    Json(state.control.trace_stats(query.agent_id.as_deref()).await)
}

async fn get_trace(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Trace>, ApiError> {
    state
        .control
        .trace(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found("Trace"))
}

async fn create_trace(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateTraceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Trace>), ApiError> {
    let req = json_body(body)?;
    if req.agent_id.trim().is_empty() || req.action.trim().is_empty() {
        return Err(bad_request("agentId and action are required"));
    }
    let trace = state
        .control
        .create_trace(NewTrace {
            agent_id: req.agent_id,
            action: req.action,
            input: req.input,
            output: req.output,
            metadata: req.metadata,
        })
        .await
        .into_value();
    Ok((StatusCode::CREATED, Json(trace)))
}

async fn update_trace(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<TracePatch>, JsonRejection>,
) -> Result<Json<Trace>, ApiError> {
    let patch = json_body(body)?;
    state
        .control
        .update_trace(&id, patch)
        .await
        .map(|applied| Json(applied.into_value()))
        .ok_or_else(|| not_found("Trace"))
}

async fn delete_trace(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.control.delete_trace(&id).await {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(not_found("Trace")),
    }
}

async fn clear_traces(State(state): State<Arc<AppState>>) -> StatusCode {
    state.control.clear_traces().await;
    StatusCode::NO_CONTENT
}
