//! Agent endpoints.
//!
//! - `GET /api/agents` - List agents (`?status=`, `?type=` filters)
//! - `POST /api/agents` - Create an agent
//! - `GET /api/agents/tree` - Nested hierarchy (`?rootId=` for one subtree)
//! - `GET /api/agents/:id` - Fetch one agent
//! - `PATCH /api/agents/:id` - Rename, retype, reconfigure or move an agent
//! - `DELETE /api/agents/:id` - Delete an agent and its subtree
//! - `GET /api/agents/:id/children` - Direct children
//! - `PATCH /api/agents/:id/status` - Set runtime status

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;

use super::error::{bad_request, not_found, store_error, ApiError};
use super::routes::AppState;
use crate::store::{Agent, AgentPatch, AgentStatus, AgentType, JsonMap, NewAgent};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_agents).post(create_agent))
        .route("/tree", get(agent_tree))
        .route(
            "/:id",
            get(get_agent).patch(update_agent).delete(delete_agent),
        )
        .route("/:id/children", get(child_agents))
        .route("/:id/status", patch(update_status))
}

#[derive(Debug, Deserialize)]
pub struct ListAgentsQuery {
    pub status: Option<AgentStatus>,
    #[serde(rename = "type")]
    pub agent_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeQuery {
    pub root_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub agent_type: Option<AgentType>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub config: Option<JsonMap>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AgentStatus,
}

/// Map a JSON body rejection to a 400 with the usual error body.
pub(super) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

async fn list_agents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAgentsQuery>,
) -> Json<Vec<Agent>> {
    let control = &state.control;
    let agent_type = query
        .agent_type
        .map(|agent_type| AgentType::from(agent_type.as_str()));
    let agents = match (query.status, agent_type) {
        (Some(status), agent_type) => {
            let mut agents = control.agents_by_status(status).await;
            if let Some(agent_type) = agent_type {
                agents.retain(|agent| agent.agent_type == agent_type);
            }
            agents
        }
        (None, Some(agent_type)) => control.agents_by_type(&agent_type).await,
        (None, None) => control.agents().await,
    };
    Json(agents)
}

async fn agent_tree(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TreeQuery>,
) -> Result<Response, ApiError> {
    match query.root_id {
        Some(root_id) => state
            .control
            .agent_subtree(&root_id)
            .await
            .map(|node| Json(node).into_response())
            .ok_or_else(|| not_found("Agent")),
        None => Ok(Json(state.control.agent_tree().await).into_response()),
    }
}

async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Agent>, ApiError> {
    state
        .control
        .agent(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found("Agent"))
}

async fn child_agents(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<Vec<Agent>> {
    Json(state.control.child_agents(&id).await)
}

async fn create_agent(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateAgentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Agent>), ApiError> {
    let req = json_body(body)?;
    let agent = state
        .control
        .create_agent(NewAgent {
            name: req.name,
            agent_type: req.agent_type.unwrap_or_default(),
            parent_id: req.parent_id,
            config: req.config,
        })
        .await
        .map_err(store_error)?
        .into_value();
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<Agent>, ApiError> {
    let req = json_body(body)?;
    state
        .control
        .update_agent_status(&id, req.status)
        .await
        .map(|applied| Json(applied.into_value()))
        .map_err(store_error)
}

async fn update_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<AgentPatch>, JsonRejection>,
) -> Result<Json<Agent>, ApiError> {
    let patch = json_body(body)?;
    state
        .control
        .update_agent(&id, patch)
        .await
        .map(|applied| Json(applied.into_value()))
        .map_err(store_error)
}

async fn delete_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.control.delete_agent(&id).await {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(not_found("Agent")),
    }
}
