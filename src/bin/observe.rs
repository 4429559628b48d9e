//! Attach an observer session to a running server and log what it sees.
//!
//! Reads `MISSION_CONTROL_URL` (default `http://localhost:4000`),
//! `RECONNECT_BASE_DELAY_MS` and `RECONNECT_MAX_ATTEMPTS`.

use std::time::Duration;

use anyhow::Context;
use mission_control::session::{ObserverClient, ReconnectConfig, SessionState};
use mission_control::util::websocket_url;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

fn env_parse<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        Err(_) => Ok(None),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "observe=info,mission_control=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let base = std::env::var("MISSION_CONTROL_URL")
        .unwrap_or_else(|_| "http://localhost:4000".to_string());
    let base = Url::parse(&base).context("Invalid MISSION_CONTROL_URL")?;
    let url = websocket_url(&base, "/ws").context("Invalid stream URL")?;

    let mut config = ReconnectConfig::default();
    if let Some(ms) = env_parse::<u64>("RECONNECT_BASE_DELAY_MS")? {
        config.base_delay = Duration::from_millis(ms);
    }
    if let Some(attempts) = env_parse::<u32>("RECONNECT_MAX_ATTEMPTS")? {
        config.max_attempts = attempts;
    }

    info!("Observing {}", url);
    let handle = ObserverClient::new(url, config).spawn();
    let mut replica = handle.watch_replica();
    let mut state = handle.watch_state();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing session");
                break;
            }
            changed = replica.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = replica.borrow_and_update().clone();
                let active = snapshot
                    .agents()
                    .iter()
                    .filter(|a| a.status == mission_control::AgentStatus::Active)
                    .count();
                info!(
                    agents = snapshot.agents().len(),
                    active,
                    traces = snapshot.traces().len(),
                    "Replica updated"
                );
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                match current {
                    SessionState::GaveUp => {
                        warn!("Server unreachable, giving up");
                        break;
                    }
                    other => info!(state = ?other, "Session state changed"),
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
