//! Periodic reconciliation of the agent set with the upstream gateway.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::control::MissionControl;
use crate::gateway::{Gateway, GatewayError};
use crate::store::ExternalAgent;

pub struct AgentSync {
    control: Arc<MissionControl>,
    gateway: Arc<dyn Gateway>,
    last_seen: Option<Vec<ExternalAgent>>,
}

impl AgentSync {
    pub fn new(control: Arc<MissionControl>, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            control,
            gateway,
            last_seen: None,
        }
    }

    /// Fetch once and ingest if the upstream set differs from the last one
    /// seen. The first successful fetch is always ingested.
    pub async fn poll_once(&mut self) -> Result<bool, GatewayError> {
        let agents = self.gateway.fetch_agents().await?;
        if self.last_seen.as_ref() == Some(&agents) {
            return Ok(false);
        }
        self.control.ingest_external_agent_set(agents.clone()).await;
        self.last_seen = Some(agents);
        Ok(true)
    }

    pub async fn run(mut self, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(gateway = self.gateway.name(), ?period, "Upstream agent sync started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.poll_once() => outcome,
            };
            match outcome {
                Ok(true) => tracing::debug!("Upstream agent set changed"),
                Ok(false) => {}
                Err(e) => tracing::warn!("Upstream agent sync failed: {}", e),
            }
        }
        tracing::info!("Upstream agent sync stopped");
    }
}

pub fn spawn_agent_sync(
    control: Arc<MissionControl>,
    gateway: Arc<dyn Gateway>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(AgentSync::new(control, gateway).run(period, cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeEvent;
    use crate::gateway::SimulatedGateway;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    /// Upstream whose agent listing never answers.
    struct StalledGateway;

    #[async_trait]
    impl Gateway for StalledGateway {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn fetch_agents(&self) -> Result<Vec<ExternalAgent>, GatewayError> {
            std::future::pending().await
        }

        async fn perform_request(&self, _: &str, _: Value) -> Result<Value, GatewayError> {
            std::future::pending().await
        }

        async fn health_check(&self) -> bool {
            false
        }
    }

    fn upstream(names: &[&str]) -> Vec<ExternalAgent> {
        let agents: Vec<_> = names.iter().map(|name| json!({ "name": name })).collect();
        serde_json::from_value(json!(agents)).unwrap()
    }

    #[tokio::test]
    async fn ingests_only_on_change() {
        let control = Arc::new(MissionControl::default());
        let gateway = Arc::new(SimulatedGateway::instant());
        gateway.set_agents(upstream(&["Alpha"])).await;
        let mut sync = AgentSync::new(Arc::clone(&control), gateway.clone());
        let mut events = control.attach().await.events;

        assert!(sync.poll_once().await.unwrap());
        assert!(!sync.poll_once().await.unwrap());
        assert_eq!(control.agents().await.len(), 1);

        gateway.set_agents(upstream(&["Alpha", "Beta"])).await;
        assert!(sync.poll_once().await.unwrap());
        assert!(control.agent("beta").await.is_some());

        let mut synced = 0;
        while let Ok(event) = events.try_recv() {
            assert!(matches!(event, ChangeEvent::AgentsSynced(_)));
            synced += 1;
        }
        assert_eq!(synced, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_loop() {
        let control = Arc::new(MissionControl::default());
        let gateway: Arc<dyn Gateway> = Arc::new(SimulatedGateway::instant());
        let cancel = CancellationToken::new();
        let handle = spawn_agent_sync(control, gateway, Duration::from_secs(5), cancel.clone());

        tokio::time::sleep(Duration::from_secs(12)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sync loop ignored cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_stalled_fetch() {
        let control = Arc::new(MissionControl::default());
        let cancel = CancellationToken::new();
        let handle = spawn_agent_sync(
            control,
            Arc::new(StalledGateway),
            Duration::from_secs(5),
            cancel.clone(),
        );

        // The first tick fires immediately, so the fetch is already in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sync loop stuck on a stalled fetch")
            .unwrap();
    }
}
