//! Check connectivity to the upstream agent gateway.
//!
//! Reads `GATEWAY_URL` (default `http://localhost:18789`), checks `/health`
//! and the `config.get` / `config.schema` RPC methods, and exits non-zero
//! when the gateway cannot serve an agent list.

use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use mission_control::gateway::{Gateway, HttpGateway};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

const DEFAULT_GATEWAY_URL: &str = "http://localhost:18789";
const RPC_TIMEOUT: Duration = Duration::from_secs(5);
const PREVIEW_CHARS: usize = 500;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "diagnose=info,mission_control=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let raw = std::env::var("GATEWAY_URL").unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string());
    let url = Url::parse(&raw).with_context(|| format!("Invalid GATEWAY_URL: {}", raw))?;
    let gateway = HttpGateway::new(&url).with_rpc_timeout(RPC_TIMEOUT);
    info!("Gateway URL: {}", gateway.base_url());

    let mut issues = Vec::new();

    let started = Instant::now();
    if gateway.health_check().await {
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Health endpoint reachable");
    } else {
        error!("Health endpoint not reachable at {}/health", gateway.base_url());
        issues.push("health endpoint unreachable");
    }

    let started = Instant::now();
    match gateway.rpc("config.get", json!({})).await {
        Ok(config) => {
            info!(elapsed_ms = started.elapsed().as_millis() as u64, "config.get answered");
            report_agents(&config);
            if config.get("agents").and_then(Value::as_array).is_none() {
                issues.push("config.get has no agents list");
            }
            let preview: String = config.to_string().chars().take(PREVIEW_CHARS).collect();
            info!("Config preview: {}", preview);
        }
        Err(e) => {
            error!("config.get failed: {}", e);
            issues.push("config.get failed");
        }
    }

    match gateway.rpc("config.schema", json!({})).await {
        Ok(_) => info!("config.schema answered"),
        Err(e) => warn!("config.schema not available: {}", e),
    }

    if issues.is_empty() {
        info!("All checks passed");
        return Ok(());
    }
    for issue in &issues {
        warn!("Issue: {}", issue);
    }
    bail!("{} gateway check(s) failed", issues.len())
}

fn report_agents(config: &Value) {
    let Some(agents) = config.get("agents").and_then(Value::as_array) else {
        warn!("No agents array in gateway config");
        return;
    };
    info!(count = agents.len(), "Gateway agents found");
    if let Some(first) = agents.first() {
        info!(
            id = field(first, "id"),
            name = field(first, "name"),
            agent_type = field(first, "type"),
            "First agent"
        );
    }
}

fn field<'a>(agent: &'a Value, key: &str) -> &'a str {
    agent.get(key).and_then(Value::as_str).unwrap_or("not set")
}
