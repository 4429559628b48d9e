//! Change events pushed to observers.
//!
//! Every message on the real-time channel is an envelope
//! `{ "type": "<EVENT>", "data": <payload> }`. The first message of each
//! connection is always `INIT` carrying a full [`Snapshot`].

use serde::{Deserialize, Serialize};

use crate::store::{Agent, Snapshot, Trace};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeEvent {
    /// Full baseline sent when an observer attaches (or resyncs).
    Init(Snapshot),

    AgentCreated(Agent),

    /// Status and `lastActive` changed.
    AgentStatusUpdated(Agent),

    /// Structural or configuration fields changed, including `children`.
    AgentUpdated(Agent),

    AgentDeleted { id: String },

    /// The agent set was replaced wholesale from an upstream source.
    AgentsSynced(Vec<Agent>),

    TraceCreated(Trace),

    TraceUpdated(Trace),

    TraceDeleted { id: String },

    TracesCleared,
}

impl ChangeEvent {
    /// Wire name of the event, for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            ChangeEvent::Init(_) => "INIT",
            ChangeEvent::AgentCreated(_) => "AGENT_CREATED",
            ChangeEvent::AgentStatusUpdated(_) => "AGENT_STATUS_UPDATED",
            ChangeEvent::AgentUpdated(_) => "AGENT_UPDATED",
            ChangeEvent::AgentDeleted { .. } => "AGENT_DELETED",
            ChangeEvent::AgentsSynced(_) => "AGENTS_SYNCED",
            ChangeEvent::TraceCreated(_) => "TRACE_CREATED",
            ChangeEvent::TraceUpdated(_) => "TRACE_UPDATED",
            ChangeEvent::TraceDeleted { .. } => "TRACE_DELETED",
            ChangeEvent::TracesCleared => "TRACES_CLEARED",
        }
    }

    /// Id of the single entity this event touches, if any.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            ChangeEvent::AgentCreated(agent)
            | ChangeEvent::AgentStatusUpdated(agent)
            | ChangeEvent::AgentUpdated(agent) => Some(&agent.id),
            ChangeEvent::TraceCreated(trace) | ChangeEvent::TraceUpdated(trace) => Some(&trace.id),
            ChangeEvent::AgentDeleted { id } | ChangeEvent::TraceDeleted { id } => Some(id),
            ChangeEvent::Init(_) | ChangeEvent::AgentsSynced(_) | ChangeEvent::TracesCleared => {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_shape_matches_wire_protocol() {
        let value = serde_json::to_value(ChangeEvent::AgentDeleted {
            id: "a1".to_string(),
        })
        .unwrap();
        assert_eq!(value, json!({ "type": "AGENT_DELETED", "data": { "id": "a1" } }));

        let cleared = serde_json::to_value(ChangeEvent::TracesCleared).unwrap();
        assert_eq!(cleared, json!({ "type": "TRACES_CLEARED" }));

        let init = serde_json::to_value(ChangeEvent::Init(Snapshot::default())).unwrap();
        assert_eq!(init, json!({ "type": "INIT", "data": { "agents": [], "traces": [] } }));
    }

    #[test]
    fn parses_messages_without_data() {
        let event: ChangeEvent = serde_json::from_str(r#"{"type":"TRACES_CLEARED"}"#).unwrap();
        assert_eq!(event, ChangeEvent::TracesCleared);
        assert_eq!(event.event_type(), "TRACES_CLEARED");
        assert_eq!(event.entity_id(), None);
    }
}
