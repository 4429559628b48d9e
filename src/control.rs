//! Mutation API: the only sanctioned way to change the entity store.
//!
//! `MissionControl` owns the [`EntityStore`] behind a single lock together
//! with the [`Notifier`]. Each mutation applies its change and publishes the
//! resulting events while still holding the write guard, so
//!
//! - observers receive events in the order the store applied them, and
//! - [`MissionControl::attach`] (snapshot + subscribe under the read guard)
//!   can never miss or double-apply an event relative to its snapshot.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use crate::events::ChangeEvent;
use crate::notifier::Notifier;
use crate::store::{
    Agent, AgentNode, AgentPatch, AgentStatus, AgentType, EntityStore, ExternalAgent, JsonMap,
    NewAgent, NewTrace, Snapshot, StoreError, Trace, TracePatch, TraceStats, TraceStatus,
};

pub type SharedControl = Arc<MissionControl>;

/// Result of a mutation together with the events it broadcast.
#[derive(Debug, Clone)]
pub struct Applied<T> {
    pub value: T,
    pub events: Vec<ChangeEvent>,
}

impl<T> Applied<T> {
    pub fn into_value(self) -> T {
        self.value
    }
}

/// A freshly attached observer: the baseline plus the feed that follows it.
pub struct Attachment {
    pub snapshot: Snapshot,
    pub events: broadcast::Receiver<ChangeEvent>,
}

pub struct MissionControl {
    store: RwLock<EntityStore>,
    notifier: Notifier,
    snapshot_trace_limit: Option<usize>,
}

impl MissionControl {
    pub fn new(notifier: Notifier, snapshot_trace_limit: Option<usize>) -> Self {
        Self {
            store: RwLock::new(EntityStore::new()),
            notifier,
            snapshot_trace_limit,
        }
    }

    pub fn shared(notifier: Notifier, snapshot_trace_limit: Option<usize>) -> SharedControl {
        Arc::new(Self::new(notifier, snapshot_trace_limit))
    }

    fn publish_all(&self, events: &[ChangeEvent]) {
        for event in events {
            self.notifier.publish(event.clone());
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Observer attachment
    // ─────────────────────────────────────────────────────────────────────

    /// Capture a snapshot and subscribe in one critical section.
    pub async fn attach(&self) -> Attachment {
        let store = self.store.read().await;
        let events = self.notifier.subscribe();
        let snapshot = store.snapshot(self.snapshot_trace_limit);
        Attachment { snapshot, events }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.store.read().await.snapshot(self.snapshot_trace_limit)
    }

    pub fn observer_count(&self) -> usize {
        self.notifier.observer_count()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Agent mutations
    // ─────────────────────────────────────────────────────────────────────

    pub async fn create_agent(&self, new: NewAgent) -> Result<Applied<Agent>, StoreError> {
        let mut store = self.store.write().await;
        let agent = store.create_agent(new)?;

        let mut events = vec![ChangeEvent::AgentCreated(agent.clone())];
        if let Some(parent) = agent.parent_id.as_deref().and_then(|id| store.agent(id)) {
            events.push(ChangeEvent::AgentUpdated(parent));
        }
        self.publish_all(&events);
        tracing::info!(agent_id = %agent.id, name = %agent.name, "Agent created");
        Ok(Applied {
            value: agent,
            events,
        })
    }

    pub async fn update_agent_status(
        &self,
        id: &str,
        status: AgentStatus,
    ) -> Result<Applied<Agent>, StoreError> {
        let mut store = self.store.write().await;
        let agent = store.update_agent_status(id, status)?;
        let events = vec![ChangeEvent::AgentStatusUpdated(agent.clone())];
        self.publish_all(&events);
        tracing::debug!(agent_id = %id, ?status, "Agent status updated");
        Ok(Applied {
            value: agent,
            events,
        })
    }

    /// Apply a patch; when the parent changes, both parents are re-published.
    pub async fn update_agent(
        &self,
        id: &str,
        patch: AgentPatch,
    ) -> Result<Applied<Agent>, StoreError> {
        let mut store = self.store.write().await;
        let old_parent = store.agent(id).and_then(|agent| agent.parent_id);
        let agent = store.update_agent(id, patch)?;

        let mut events = vec![ChangeEvent::AgentUpdated(agent.clone())];
        if agent.parent_id != old_parent {
            for parent in [old_parent.as_deref(), agent.parent_id.as_deref()]
                .into_iter()
                .flatten()
            {
                if let Some(parent) = store.agent(parent) {
                    events.push(ChangeEvent::AgentUpdated(parent));
                }
            }
        }
        self.publish_all(&events);
        Ok(Applied {
            value: agent,
            events,
        })
    }

    /// Delete an agent and its subtree. `None` when the id is unknown.
    ///
    /// The value lists every removed id, root first.
    pub async fn delete_agent(&self, id: &str) -> Option<Applied<Vec<String>>> {
        let mut store = self.store.write().await;
        let parent = store.agent(id)?.parent_id;
        let removed = store.remove_subtree(id);
        if removed.is_empty() {
            return None;
        }

        let mut events = Vec::with_capacity(removed.len() + 1);
        if let Some(parent) = parent.and_then(|p| store.agent(&p)) {
            events.push(ChangeEvent::AgentUpdated(parent));
        }
        events.extend(
            removed
                .iter()
                .map(|id| ChangeEvent::AgentDeleted { id: id.clone() }),
        );
        self.publish_all(&events);
        tracing::info!(agent_id = %id, removed = removed.len(), "Agent subtree deleted");
        Some(Applied {
            value: removed,
            events,
        })
    }

    /// Replace the agent set with the one an upstream source of truth holds.
    pub async fn ingest_external_agent_set(
        &self,
        agents: Vec<ExternalAgent>,
    ) -> Applied<Vec<Agent>> {
        let mut store = self.store.write().await;
        let agents = store.replace_agents(agents);
        let events = vec![ChangeEvent::AgentsSynced(agents.clone())];
        self.publish_all(&events);
        tracing::info!(count = agents.len(), "Agent set synced from upstream");
        Applied {
            value: agents,
            events,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Trace mutations
    // ─────────────────────────────────────────────────────────────────────

    pub async fn create_trace(&self, new: NewTrace) -> Applied<Trace> {
        let mut store = self.store.write().await;
        let trace = store.create_trace(new);
        let events = vec![ChangeEvent::TraceCreated(trace.clone())];
        self.publish_all(&events);
        Applied {
            value: trace,
            events,
        }
    }

    pub async fn update_trace(&self, id: &str, patch: TracePatch) -> Option<Applied<Trace>> {
        let mut store = self.store.write().await;
        let trace = store.update_trace(id, patch)?;
        Some(self.trace_updated(trace))
    }

    pub async fn complete_trace(
        &self,
        id: &str,
        output: Value,
        metadata: Option<JsonMap>,
    ) -> Option<Applied<Trace>> {
        let mut store = self.store.write().await;
        let trace = store.complete_trace(id, output, metadata)?;
        Some(self.trace_updated(trace))
    }

    pub async fn fail_trace(
        &self,
        id: &str,
        error: &str,
        metadata: Option<JsonMap>,
    ) -> Option<Applied<Trace>> {
        let mut store = self.store.write().await;
        let trace = store.fail_trace(id, error, metadata)?;
        Some(self.trace_updated(trace))
    }

    fn trace_updated(&self, trace: Trace) -> Applied<Trace> {
        let events = vec![ChangeEvent::TraceUpdated(trace.clone())];
        self.publish_all(&events);
        Applied {
            value: trace,
            events,
        }
    }

    pub async fn delete_trace(&self, id: &str) -> Option<Applied<()>> {
        let mut store = self.store.write().await;
        if !store.delete_trace(id) {
            return None;
        }
        let events = vec![ChangeEvent::TraceDeleted { id: id.to_string() }];
        self.publish_all(&events);
        Some(Applied { value: (), events })
    }

    pub async fn clear_traces(&self) -> Applied<()> {
        let mut store = self.store.write().await;
        store.clear_traces();
        let events = vec![ChangeEvent::TracesCleared];
        self.publish_all(&events);
        tracing::info!("Traces cleared");
        Applied { value: (), events }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    pub async fn agent(&self, id: &str) -> Option<Agent> {
        self.store.read().await.agent(id)
    }

    pub async fn agents(&self) -> Vec<Agent> {
        self.store.read().await.agents()
    }

    pub async fn agents_by_status(&self, status: AgentStatus) -> Vec<Agent> {
        self.store.read().await.agents_by_status(status)
    }

    pub async fn agents_by_type(&self, agent_type: &AgentType) -> Vec<Agent> {
        self.store.read().await.agents_by_type(agent_type)
    }

    pub async fn child_agents(&self, parent_id: &str) -> Vec<Agent> {
        self.store.read().await.child_agents(parent_id)
    }

    pub async fn agent_tree(&self) -> Vec<AgentNode> {
        self.store.read().await.agent_tree()
    }

    pub async fn agent_subtree(&self, root_id: &str) -> Option<AgentNode> {
        self.store.read().await.agent_subtree(root_id)
    }

    pub async fn trace(&self, id: &str) -> Option<Trace> {
        self.store.read().await.trace(id)
    }

    pub async fn traces(&self, limit: Option<usize>) -> Vec<Trace> {
        self.store.read().await.traces(limit)
    }

    pub async fn traces_by_agent(&self, agent_id: &str, limit: Option<usize>) -> Vec<Trace> {
        self.store.read().await.traces_by_agent(agent_id, limit)
    }

    pub async fn traces_by_status(&self, status: TraceStatus) -> Vec<Trace> {
        self.store.read().await.traces_by_status(status)
    }

    pub async fn recent_traces(&self, minutes: i64, agent_id: Option<&str>) -> Vec<Trace> {
        self.store.read().await.recent_traces(minutes, agent_id)
    }

    pub async fn trace_stats(&self, agent_id: Option<&str>) -> TraceStats {
        self.store.read().await.trace_stats(agent_id)
    }
}

impl Default for MissionControl {
    fn default() -> Self {
        Self::new(Notifier::default(), None)
    }
}
