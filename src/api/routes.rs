//! Router assembly and server lifecycle.

use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::control::{MissionControl, SharedControl};
use crate::gateway::{Gateway, HttpGateway, SimulatedGateway};
use crate::notifier::Notifier;
use crate::sync::spawn_agent_sync;

use super::agents;
use super::gateway as gateway_api;
use super::stream;
use super::traces;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub control: SharedControl,
    /// Where gateway requests are executed
    pub gateway: Arc<dyn Gateway>,
    /// Cancelled on shutdown; background tasks watch it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, control: SharedControl, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            config,
            control,
            gateway,
            shutdown: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub observers: usize,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/ws", get(stream::stream_ws))
        .route("/api/ws", get(stream::stream_ws))
        .nest("/api/agents", agents::routes())
        .nest("/api/traces", traces::routes())
        .nest("/api/gateway", gateway_api::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let control = MissionControl::shared(
        Notifier::new(config.broadcast_capacity),
        Some(config.snapshot_trace_limit),
    );

    let gateway: Arc<dyn Gateway> = match &config.gateway.url {
        Some(url) => {
            tracing::info!("Using agent gateway at {}", url);
            Arc::new(HttpGateway::new(url).with_rpc_timeout(config.gateway.request_timeout))
        }
        None => {
            tracing::info!("No GATEWAY_URL set, using simulated gateway");
            Arc::new(SimulatedGateway::default())
        }
    };

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&control),
        Arc::clone(&gateway),
    ));

    let sync_task = if config.gateway.sync_active() {
        Some(spawn_agent_sync(
            Arc::clone(&control),
            gateway,
            config.gateway.sync_interval,
            state.shutdown.clone(),
        ))
    } else {
        None
    };

    let app = router(Arc::clone(&state));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    let shutdown_state = Arc::clone(&state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal(shutdown_state).await;
        })
        .await?;

    if let Some(task) = sync_task {
        if let Err(e) = task.await {
            tracing::warn!("Agent sync task ended abnormally: {}", e);
        }
    }

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!(
        observers = state.control.observer_count(),
        "Shutdown signal received, stopping background tasks"
    );
    state.shutdown.cancel();
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        observers: state.control.observer_count(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    pub(crate) fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(
            Config::default(),
            Arc::new(MissionControl::default()),
            Arc::new(SimulatedGateway::instant()),
        ))
    }

    /// Issue one request against a fresh router over `state`.
    pub(crate) async fn send(
        state: &Arc<AppState>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router(Arc::clone(state))
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let state = test_state();
        let (status, body) = send(&state, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let state = test_state();
        let (status, _) = send(&state, Method::GET, "/api/nothing-here", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
