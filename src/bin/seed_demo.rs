//! Seed a running server with the demo agent hierarchy and a few gateway
//! requests.
//!
//! Reads `MISSION_CONTROL_URL` (default `http://localhost:4000`).

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Utc;
use mission_control::store::{Agent, AgentType};
use rand::seq::SliceRandom;
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// (name, type, parent name) in creation order.
const DEMO_AGENTS: &[(&str, &str, Option<&str>)] = &[
    ("Master Orchestrator", "master", None),
    ("Data Supervisor", "supervisor", Some("Master Orchestrator")),
    ("Analytics Supervisor", "supervisor", Some("Master Orchestrator")),
    ("Data Ingestion Worker", "worker", Some("Data Supervisor")),
    ("Data Validation Worker", "worker", Some("Data Supervisor")),
    ("Data Transform Worker", "worker", Some("Data Supervisor")),
    ("Pattern Analyzer", "analyzer", Some("Analytics Supervisor")),
    ("Trend Analyzer", "analyzer", Some("Analytics Supervisor")),
    ("CSV Parser", "worker", Some("Data Ingestion Worker")),
    ("JSON Parser", "worker", Some("Data Ingestion Worker")),
];

const DEMO_REQUESTS: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seed_demo=info,mission_control=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut base = std::env::var("MISSION_CONTROL_URL")
        .unwrap_or_else(|_| "http://localhost:4000".to_string());
    while base.ends_with('/') {
        base.pop();
    }
    let api = format!("{}/api", base);
    let client = reqwest::Client::new();

    let health = client
        .get(format!("{}/health", api))
        .send()
        .await
        .with_context(|| format!("Server is not reachable at {}", base))?;
    if !health.status().is_success() {
        bail!("Server health check failed: {}", health.status());
    }
    info!("Server is running at {}", base);

    let mut created: HashMap<&str, Agent> = HashMap::new();
    for &(name, agent_type, parent) in DEMO_AGENTS {
        let parent_id = parent.and_then(|p| created.get(p)).map(|a| a.id.clone());
        let resp = client
            .post(format!("{}/agents", api))
            .json(&json!({ "name": name, "type": agent_type, "parentId": parent_id }))
            .send()
            .await;
        match resp {
            Ok(resp) if resp.status().is_success() => {
                let agent: Agent = resp.json().await.context("Invalid agent response")?;
                info!("Created {} ({})", agent.name, agent.agent_type);
                created.insert(name, agent);
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                error!("Failed to create {}: {} - {}", name, status, body);
            }
            Err(e) => error!("Failed to create {}: {}", name, e),
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!(count = created.len(), "Demo hierarchy created");

    let targets: Vec<&Agent> = created
        .values()
        .filter(|a| matches!(a.agent_type, AgentType::Worker | AgentType::Analyzer))
        .collect();
    if targets.is_empty() {
        warn!("No workers were created, skipping sample requests");
        return Ok(());
    }

    for i in 1..=DEMO_REQUESTS {
        let Some(agent) = targets.choose(&mut rand::thread_rng()).copied() else {
            break;
        };
        info!("Sending request {} to {}", i, agent.name);
        let resp = client
            .post(format!("{}/gateway/request", api))
            .json(&json!({
                "agentId": agent.id,
                "payload": {
                    "action": "process_data",
                    "data": {
                        "requestId": format!("demo-{}", i),
                        "timestamp": Utc::now().to_rfc3339(),
                        "message": format!("Demo request {}", i),
                    },
                },
            }))
            .send()
            .await;
        match resp {
            Ok(resp) if resp.status().is_success() => info!("Request {} completed", i),
            Ok(resp) => warn!("Request {} failed: {}", i, resp.status()),
            Err(e) => warn!("Request {} failed: {}", i, e),
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    info!("Sample requests completed");
    Ok(())
}
