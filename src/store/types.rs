//! Agent and trace records shared by the store, the event feed and observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Opaque key-value bag attached to agents and traces.
pub type JsonMap = Map<String, Value>;

/// Role of an agent in the hierarchy.
///
/// The well-known roles get their own variants; anything else the upstream
/// system invents is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentType {
    Master,
    Supervisor,
    Worker,
    Coordinator,
    Analyzer,
    Other(String),
}

impl AgentType {
    pub fn as_str(&self) -> &str {
        match self {
            AgentType::Master => "master",
            AgentType::Supervisor => "supervisor",
            AgentType::Worker => "worker",
            AgentType::Coordinator => "coordinator",
            AgentType::Analyzer => "analyzer",
            AgentType::Other(other) => other,
        }
    }
}

impl Default for AgentType {
    fn default() -> Self {
        AgentType::Worker
    }
}

impl From<String> for AgentType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "master" => AgentType::Master,
            "supervisor" => AgentType::Supervisor,
            "worker" => AgentType::Worker,
            "coordinator" => AgentType::Coordinator,
            "analyzer" => AgentType::Analyzer,
            _ => AgentType::Other(value),
        }
    }
}

impl From<&str> for AgentType {
    fn from(value: &str) -> Self {
        AgentType::from(value.to_string())
    }
}

impl From<AgentType> for String {
    fn from(value: AgentType) -> Self {
        match value {
            AgentType::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Active,
    Error,
    Offline,
}

/// A node of the monitored hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub parent_id: Option<String>,
    /// Ids of agents whose `parent_id` is this agent, in insertion order.
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub status: AgentStatus,
    pub last_active: Option<DateTime<Utc>>,
    #[serde(default)]
    pub config: JsonMap,
    pub created_at: DateTime<Utc>,
}

/// Agent as described by an upstream source of truth.
///
/// Only configuration fields are carried: runtime status lives in this
/// service. A missing `id` is derived from the name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAgent {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type", default)]
    pub agent_type: Option<AgentType>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub config: JsonMap,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ExternalAgent {
    /// Id of the agent, falling back to the slugified name.
    pub fn resolved_id(&self) -> String {
        match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => crate::util::slugify(&self.name),
        }
    }
}

/// Fields of an agent that may be changed after creation.
///
/// `parent_id` is tri-state: absent leaves the parent alone, `null` detaches
/// the agent to a root, a value moves it under another agent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub agent_type: Option<AgentType>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<String>>,
    #[serde(default)]
    pub config: Option<JsonMap>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Nested view of an agent and its resolved descendants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub parent_id: Option<String>,
    pub status: AgentStatus,
    pub last_active: Option<DateTime<Utc>>,
    pub config: JsonMap,
    pub created_at: DateTime<Utc>,
    pub children: Vec<AgentNode>,
}

impl AgentNode {
    pub fn new(agent: &Agent, children: Vec<AgentNode>) -> Self {
        Self {
            id: agent.id.clone(),
            name: agent.name.clone(),
            agent_type: agent.agent_type.clone(),
            parent_id: agent.parent_id.clone(),
            status: agent.status,
            last_active: agent.last_active,
            config: agent.config.clone(),
            created_at: agent.created_at,
            children,
        }
    }
}

/// Outcome of a request processed by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl TraceStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TraceStatus::Pending)
    }
}

/// One request processed by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub id: String,
    /// May reference an agent that was deleted or never existed.
    pub agent_id: String,
    pub action: String,
    pub input: Option<Value>,
    pub output: Option<Value>,
    #[serde(default)]
    pub metadata: JsonMap,
    pub timestamp: DateTime<Utc>,
    /// Milliseconds between creation and the first output.
    pub duration: Option<i64>,
    pub status: TraceStatus,
}

/// Partial update of a trace.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracePatch {
    #[serde(default)]
    pub output: Option<Value>,
    /// Merged key by key into the existing metadata.
    #[serde(default)]
    pub metadata: Option<JsonMap>,
    #[serde(default)]
    pub status: Option<TraceStatus>,
}

/// Aggregate counters over a set of traces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStats {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    /// Mean of `duration` over traces that have one, 0 when none do.
    pub avg_duration: f64,
}

/// Full point-in-time copy of the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub agents: Vec<Agent>,
    pub traces: Vec<Trace>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_type_round_trips_unknown_roles() {
        let parsed: AgentType = serde_json::from_value(json!("planner")).unwrap();
        assert_eq!(parsed, AgentType::Other("planner".to_string()));
        assert_eq!(serde_json::to_value(&parsed).unwrap(), json!("planner"));

        let known: AgentType = serde_json::from_value(json!("supervisor")).unwrap();
        assert_eq!(known, AgentType::Supervisor);
    }

    #[test]
    fn agent_patch_distinguishes_null_parent_from_absent() {
        let absent: AgentPatch = serde_json::from_value(json!({ "name": "x" })).unwrap();
        assert_eq!(absent.parent_id, None);

        let detach: AgentPatch = serde_json::from_value(json!({ "parentId": null })).unwrap();
        assert_eq!(detach.parent_id, Some(None));

        let reparent: AgentPatch = serde_json::from_value(json!({ "parentId": "p1" })).unwrap();
        assert_eq!(reparent.parent_id, Some(Some("p1".to_string())));
    }

    #[test]
    fn external_agent_id_falls_back_to_slug() {
        let agent: ExternalAgent =
            serde_json::from_value(json!({ "name": "Data  Supervisor" })).unwrap();
        assert_eq!(agent.resolved_id(), "data-supervisor");
    }

    #[test]
    fn agent_serializes_camel_case() {
        let agent = Agent {
            id: "a1".into(),
            name: "A".into(),
            agent_type: AgentType::Master,
            parent_id: None,
            children: vec![],
            status: AgentStatus::Idle,
            last_active: None,
            config: JsonMap::new(),
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&agent).unwrap();
        assert_eq!(value["type"], json!("master"));
        assert_eq!(value["status"], json!("idle"));
        assert!(value.get("parentId").is_some());
        assert!(value.get("lastActive").is_some());
    }
}
