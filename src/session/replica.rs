//! Observer-side copy of the server state.

use crate::events::ChangeEvent;
use crate::store::{Agent, Trace};

/// What a single event did to the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaUpdate {
    /// An `INIT` snapshot replaced the whole state.
    Initialized,
    Applied,
    /// The event referenced nothing the replica holds (or was a duplicate).
    NoOp,
    /// An incremental event arrived before the connection's `INIT`.
    DroppedBeforeInit,
}

impl ReplicaUpdate {
    pub fn changed(self) -> bool {
        matches!(self, ReplicaUpdate::Initialized | ReplicaUpdate::Applied)
    }
}

/// Eventually-consistent projection of the server's agents and traces.
///
/// Agents keep server (creation) order, traces keep newest-first order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Replica {
    agents: Vec<Agent>,
    traces: Vec<Trace>,
    selected: Option<String>,
    initialized: bool,
}

impl Replica {
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|agent| agent.id == id)
    }

    pub fn trace(&self, id: &str) -> Option<&Trace> {
        self.traces.iter().find(|trace| trace.id == id)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Point the selection at an agent the replica knows about.
    pub fn select(&mut self, id: &str) -> bool {
        if self.agent(id).is_some() {
            self.selected = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Forget the committed baseline; incremental events are dropped until
    /// the next `INIT`. Data already held stays readable.
    pub fn await_snapshot(&mut self) {
        self.initialized = false;
    }

    pub fn apply(&mut self, event: ChangeEvent) -> ReplicaUpdate {
        match event {
            ChangeEvent::Init(snapshot) => {
                self.agents = snapshot.agents;
                self.traces = snapshot.traces;
                self.initialized = true;
                self.prune_selection();
                ReplicaUpdate::Initialized
            }
            _ if !self.initialized => ReplicaUpdate::DroppedBeforeInit,
            ChangeEvent::AgentCreated(agent) => {
                if self.agent(&agent.id).is_some() {
                    return ReplicaUpdate::NoOp;
                }
                self.agents.push(agent);
                ReplicaUpdate::Applied
            }
            ChangeEvent::AgentStatusUpdated(agent) | ChangeEvent::AgentUpdated(agent) => {
                match self.agents.iter_mut().find(|a| a.id == agent.id) {
                    Some(slot) => {
                        *slot = agent;
                        ReplicaUpdate::Applied
                    }
                    None => ReplicaUpdate::NoOp,
                }
            }
            ChangeEvent::AgentDeleted { id } => {
                if self.selected.as_deref() == Some(id.as_str()) {
                    self.selected = None;
                }
                let before = self.agents.len();
                self.agents.retain(|agent| agent.id != id);
                if self.agents.len() == before {
                    ReplicaUpdate::NoOp
                } else {
                    ReplicaUpdate::Applied
                }
            }
            ChangeEvent::AgentsSynced(agents) => {
                self.agents = agents;
                self.prune_selection();
                ReplicaUpdate::Applied
            }
            ChangeEvent::TraceCreated(trace) => {
                if self.trace(&trace.id).is_some() {
                    return ReplicaUpdate::NoOp;
                }
                self.traces.insert(0, trace);
                ReplicaUpdate::Applied
            }
            ChangeEvent::TraceUpdated(trace) => {
                match self.traces.iter_mut().find(|t| t.id == trace.id) {
                    Some(slot) => {
                        *slot = trace;
                        ReplicaUpdate::Applied
                    }
                    None => ReplicaUpdate::NoOp,
                }
            }
            ChangeEvent::TraceDeleted { id } => {
                let before = self.traces.len();
                self.traces.retain(|trace| trace.id != id);
                if self.traces.len() == before {
                    ReplicaUpdate::NoOp
                } else {
                    ReplicaUpdate::Applied
                }
            }
            ChangeEvent::TracesCleared => {
                self.traces.clear();
                ReplicaUpdate::Applied
            }
        }
    }

    fn prune_selection(&mut self) {
        if let Some(selected) = self.selected.clone() {
            if self.agent(&selected).is_none() {
                self.selected = None;
            }
        }
    }
}
