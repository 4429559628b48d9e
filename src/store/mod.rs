//! Authoritative in-memory model of agents and traces.
//!
//! `EntityStore` is a plain synchronous data structure; it enforces the tree
//! invariants (the `children` list of every agent mirrors the `parent_id` of
//! its children, and the hierarchy stays acyclic) and the trace lifecycle.
//! Locking and change notification live one level up in
//! [`crate::control::MissionControl`].

pub mod types;

use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

pub use types::*;

/// Default number of traces returned by a global listing.
pub const DEFAULT_TRACE_LIMIT: usize = 1000;

/// Default number of traces returned for a single agent.
pub const DEFAULT_AGENT_TRACE_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
}

impl StoreError {
    pub(crate) fn agent_not_found(id: &str) -> Self {
        StoreError::NotFound {
            kind: "Agent",
            id: id.to_string(),
        }
    }
}

/// Parameters for [`EntityStore::create_agent`].
#[derive(Debug, Clone, Default)]
pub struct NewAgent {
    pub name: String,
    pub agent_type: AgentType,
    pub parent_id: Option<String>,
    pub config: Option<JsonMap>,
}

/// Parameters for [`EntityStore::create_trace`].
#[derive(Debug, Clone, Default)]
pub struct NewTrace {
    pub agent_id: String,
    pub action: String,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub metadata: Option<JsonMap>,
}

#[derive(Debug, Default)]
pub struct EntityStore {
    agents: HashMap<String, Agent>,
    /// Agent ids in creation order.
    agent_order: Vec<String>,
    traces: HashMap<String, Trace>,
    /// Trace ids in creation order.
    trace_order: Vec<String>,
    agent_traces: HashMap<String, Vec<String>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Agents
    // ─────────────────────────────────────────────────────────────────────

    /// Create an agent and link it under its parent.
    ///
    /// A `parent_id` that does not resolve is dropped and the agent becomes
    /// a root.
    pub fn create_agent(&mut self, new: NewAgent) -> Result<Agent, StoreError> {
        if new.name.trim().is_empty() {
            return Err(StoreError::Validation(
                "agent name must not be empty".to_string(),
            ));
        }

        let parent_id = new
            .parent_id
            .filter(|parent| self.agents.contains_key(parent));

        let agent = Agent {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            agent_type: new.agent_type,
            parent_id: parent_id.clone(),
            children: Vec::new(),
            status: AgentStatus::Idle,
            last_active: None,
            config: new.config.unwrap_or_default(),
            created_at: Utc::now(),
        };

        if let Some(parent) = parent_id.and_then(|id| self.agents.get_mut(&id)) {
            parent.children.push(agent.id.clone());
        }
        self.agent_order.push(agent.id.clone());
        self.agents.insert(agent.id.clone(), agent.clone());
        Ok(agent)
    }

    /// Set the live status of an agent and stamp `last_active`.
    pub fn update_agent_status(
        &mut self,
        id: &str,
        status: AgentStatus,
    ) -> Result<Agent, StoreError> {
        let agent = self
            .agents
            .get_mut(id)
            .ok_or_else(|| StoreError::agent_not_found(id))?;
        agent.status = status;
        agent.last_active = Some(Utc::now());
        Ok(agent.clone())
    }

    /// Apply a structural/config patch.
    ///
    /// A parent change re-links both the old and the new parent's `children`.
    /// All checks run before anything is written, so a rejected patch leaves
    /// the store untouched.
    pub fn update_agent(&mut self, id: &str, patch: AgentPatch) -> Result<Agent, StoreError> {
        let current_parent = self
            .agents
            .get(id)
            .ok_or_else(|| StoreError::agent_not_found(id))?
            .parent_id
            .clone();

        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(StoreError::Validation(
                    "agent name must not be empty".to_string(),
                ));
            }
        }

        let new_parent = match patch.parent_id {
            Some(Some(parent)) => {
                if parent == id {
                    return Err(StoreError::Validation(format!(
                        "agent {} cannot be its own parent",
                        id
                    )));
                }
                if !self.agents.contains_key(&parent) {
                    return Err(StoreError::Validation(format!(
                        "parent agent {} does not exist",
                        parent
                    )));
                }
                if self.is_ancestor(id, &parent) {
                    return Err(StoreError::Validation(format!(
                        "moving {} under {} would create a cycle",
                        id, parent
                    )));
                }
                Some(Some(parent))
            }
            other => other,
        };

        if let Some(new_parent) = new_parent {
            if new_parent != current_parent {
                if let Some(old) = current_parent.as_ref().and_then(|p| self.agents.get_mut(p)) {
                    old.children.retain(|child| child != id);
                }
                if let Some(new) = new_parent.as_ref().and_then(|p| self.agents.get_mut(p)) {
                    new.children.push(id.to_string());
                }
            }
            if let Some(agent) = self.agents.get_mut(id) {
                agent.parent_id = new_parent;
            }
        }

        let agent = self
            .agents
            .get_mut(id)
            .ok_or_else(|| StoreError::agent_not_found(id))?;
        if let Some(name) = patch.name {
            agent.name = name;
        }
        if let Some(agent_type) = patch.agent_type {
            agent.agent_type = agent_type;
        }
        if let Some(config) = patch.config {
            agent.config = config;
        }
        Ok(agent.clone())
    }

    /// Delete an agent and its entire subtree. Returns false for unknown ids.
    pub fn delete_agent(&mut self, id: &str) -> bool {
        !self.remove_subtree(id).is_empty()
    }

    /// Delete an agent and its subtree, returning every removed id
    /// (root first). Empty when `id` is unknown.
    pub fn remove_subtree(&mut self, id: &str) -> Vec<String> {
        let Some(root) = self.agents.get(id) else {
            return Vec::new();
        };

        if let Some(parent) = root.parent_id.clone().and_then(|p| self.agents.get_mut(&p)) {
            parent.children.retain(|child| child != id);
        }

        let mut removed = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(agent) = self.agents.remove(&current) else {
                continue;
            };
            // Only follow children that really point back here.
            for child in agent.children.iter().rev() {
                let owned = self
                    .agents
                    .get(child)
                    .is_some_and(|c| c.parent_id.as_deref() == Some(current.as_str()));
                if owned {
                    stack.push(child.clone());
                }
            }
            removed.push(current);
        }

        let removed_set: HashSet<&String> = removed.iter().collect();
        self.agent_order.retain(|agent_id| !removed_set.contains(agent_id));
        removed
    }

    /// Replace the agent set wholesale with the one an upstream source holds.
    ///
    /// Runtime fields (`status`, `last_active`) and `created_at` survive for
    /// ids present on both sides. `children` is rebuilt from `parent_id`;
    /// parent links that do not resolve, or that would close a cycle, are
    /// dropped.
    pub fn replace_agents(&mut self, external: Vec<ExternalAgent>) -> Vec<Agent> {
        let now = Utc::now();
        let mut order = Vec::with_capacity(external.len());
        let mut incoming: HashMap<String, (Agent, Vec<String>)> = HashMap::new();

        for ext in external {
            let id = ext.resolved_id();
            if id.is_empty() || incoming.contains_key(&id) {
                continue;
            }
            let previous = self.agents.get(&id);
            let agent = Agent {
                id: id.clone(),
                name: ext.name,
                agent_type: ext.agent_type.unwrap_or_default(),
                parent_id: ext.parent_id.filter(|p| !p.is_empty() && p != &id),
                children: Vec::new(),
                status: previous.map(|p| p.status).unwrap_or_default(),
                last_active: previous.and_then(|p| p.last_active),
                config: ext.config,
                created_at: ext
                    .created_at
                    .or_else(|| previous.map(|p| p.created_at))
                    .unwrap_or(now),
            };
            order.push(id.clone());
            incoming.insert(id, (agent, ext.children));
        }

        // Drop dangling parents, then cut one link per cycle.
        let mut parents: HashMap<String, String> = HashMap::new();
        for id in &order {
            if let Some(parent) = incoming[id].0.parent_id.clone() {
                if incoming.contains_key(&parent) {
                    parents.insert(id.clone(), parent);
                }
            }
        }
        for id in &order {
            let mut visited = HashSet::new();
            let mut cursor = parents.get(id).cloned();
            while let Some(current) = cursor {
                if &current == id {
                    tracing::warn!(agent_id = %id, "Dropping parent link that closes a cycle");
                    parents.remove(id);
                    break;
                }
                if !visited.insert(current.clone()) {
                    break;
                }
                cursor = parents.get(&current).cloned();
            }
        }

        // Children keep the upstream order where it agrees with parent links.
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for id in &order {
            let declared = &incoming[id].1;
            let list = children.entry(id.clone()).or_default();
            for child in declared {
                if parents.get(child) == Some(id) && !list.contains(child) {
                    list.push(child.clone());
                }
            }
        }
        for id in &order {
            if let Some(parent) = parents.get(id) {
                let list = children.entry(parent.clone()).or_default();
                if !list.contains(id) {
                    list.push(id.clone());
                }
            }
        }

        let mut agents = HashMap::with_capacity(order.len());
        for id in &order {
            if let Some((mut agent, _)) = incoming.remove(id) {
                agent.parent_id = parents.get(id).cloned();
                agent.children = children.remove(id).unwrap_or_default();
                agents.insert(id.clone(), agent);
            }
        }

        self.agents = agents;
        self.agent_order = order;
        self.agents()
    }

    /// True when `ancestor` appears on the parent chain of `id`.
    fn is_ancestor(&self, ancestor: &str, id: &str) -> bool {
        let mut visited = HashSet::new();
        let mut cursor = self.agents.get(id).and_then(|a| a.parent_id.as_deref());
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            if !visited.insert(current) {
                return false;
            }
            cursor = self.agents.get(current).and_then(|a| a.parent_id.as_deref());
        }
        false
    }

    pub fn agent(&self, id: &str) -> Option<Agent> {
        self.agents.get(id).cloned()
    }

    /// All agents in creation order.
    pub fn agents(&self) -> Vec<Agent> {
        self.agent_order
            .iter()
            .filter_map(|id| self.agents.get(id))
            .cloned()
            .collect()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn agents_by_status(&self, status: AgentStatus) -> Vec<Agent> {
        self.agents()
            .into_iter()
            .filter(|agent| agent.status == status)
            .collect()
    }

    pub fn agents_by_type(&self, agent_type: &AgentType) -> Vec<Agent> {
        self.agents()
            .into_iter()
            .filter(|agent| &agent.agent_type == agent_type)
            .collect()
    }

    pub fn child_agents(&self, parent_id: &str) -> Vec<Agent> {
        self.agents()
            .into_iter()
            .filter(|agent| agent.parent_id.as_deref() == Some(parent_id))
            .collect()
    }

    /// Every root agent, expanded recursively.
    pub fn agent_tree(&self) -> Vec<AgentNode> {
        let mut visited = HashSet::new();
        self.agent_order
            .iter()
            .filter_map(|id| self.agents.get(id))
            .filter(|agent| agent.parent_id.is_none())
            .filter_map(|agent| self.build_node(&agent.id, &mut visited))
            .collect()
    }

    /// The subtree rooted at `root_id`, or `None` if it does not exist.
    pub fn agent_subtree(&self, root_id: &str) -> Option<AgentNode> {
        let mut visited = HashSet::new();
        self.build_node(root_id, &mut visited)
    }

    fn build_node<'a>(&'a self, id: &'a str, visited: &mut HashSet<&'a str>) -> Option<AgentNode> {
        let agent = self.agents.get(id)?;
        if !visited.insert(id) {
            tracing::warn!(agent_id = %id, "Agent reached twice while building tree");
            return None;
        }
        let children = agent
            .children
            .iter()
            .filter_map(|child| self.build_node(child, visited))
            .collect();
        Some(AgentNode::new(agent, children))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Traces
    // ─────────────────────────────────────────────────────────────────────

    /// Record a request dispatched to an agent. The agent does not need to
    /// exist.
    ///
    /// A trace created with an output already present is complete on
    /// arrival, with a zero duration.
    pub fn create_trace(&mut self, new: NewTrace) -> Trace {
        let output = new.output.filter(|value| !value.is_null());
        let (status, duration) = if output.is_some() {
            (TraceStatus::Completed, Some(0))
        } else {
            (TraceStatus::Pending, None)
        };

        let trace = Trace {
            id: Uuid::new_v4().to_string(),
            agent_id: new.agent_id,
            action: new.action,
            input: new.input.filter(|value| !value.is_null()),
            output,
            metadata: new.metadata.unwrap_or_default(),
            timestamp: Utc::now(),
            duration,
            status,
        };

        self.trace_order.push(trace.id.clone());
        self.agent_traces
            .entry(trace.agent_id.clone())
            .or_default()
            .push(trace.id.clone());
        self.traces.insert(trace.id.clone(), trace.clone());
        trace
    }

    /// Patch a trace. Returns `None` for unknown ids.
    ///
    /// The first output stamps `duration` and moves a pending trace to the
    /// requested terminal status (completed unless told otherwise). Terminal
    /// statuses and durations are never overwritten.
    pub fn update_trace(&mut self, id: &str, patch: TracePatch) -> Option<Trace> {
        let trace = self.traces.get_mut(id)?;
        let requested = patch.status.filter(|status| status.is_terminal());

        match patch.output.filter(|value| !value.is_null()) {
            Some(output) => {
                if trace.output.is_none() && trace.duration.is_none() {
                    let elapsed = Utc::now() - trace.timestamp;
                    trace.duration = Some(elapsed.num_milliseconds().max(0));
                }
                if trace.status == TraceStatus::Pending {
                    trace.status = requested.unwrap_or(TraceStatus::Completed);
                }
                trace.output = Some(output);
            }
            None => {
                if let (TraceStatus::Pending, Some(status)) = (trace.status, requested) {
                    trace.status = status;
                }
            }
        }

        if let Some(metadata) = patch.metadata {
            trace.metadata.extend(metadata);
        }

        Some(trace.clone())
    }

    pub fn complete_trace(
        &mut self,
        id: &str,
        output: Value,
        metadata: Option<JsonMap>,
    ) -> Option<Trace> {
        self.update_trace(
            id,
            TracePatch {
                output: Some(output),
                metadata,
                status: Some(TraceStatus::Completed),
            },
        )
    }

    pub fn fail_trace(&mut self, id: &str, error: &str, metadata: Option<JsonMap>) -> Option<Trace> {
        self.update_trace(
            id,
            TracePatch {
                output: Some(json!({ "error": error })),
                metadata,
                status: Some(TraceStatus::Failed),
            },
        )
    }

    pub fn delete_trace(&mut self, id: &str) -> bool {
        let Some(trace) = self.traces.remove(id) else {
            return false;
        };
        if let Some(list) = self.agent_traces.get_mut(&trace.agent_id) {
            list.retain(|trace_id| trace_id != id);
        }
        self.trace_order.retain(|trace_id| trace_id != id);
        true
    }

    pub fn clear_traces(&mut self) {
        self.traces.clear();
        self.trace_order.clear();
        self.agent_traces.clear();
    }

    pub fn trace(&self, id: &str) -> Option<Trace> {
        self.traces.get(id).cloned()
    }

    pub fn trace_count(&self) -> usize {
        self.traces.len()
    }

    /// Traces newest first; `None` means no limit.
    pub fn traces(&self, limit: Option<usize>) -> Vec<Trace> {
        let ids = self.trace_order.iter();
        Self::newest_first(ids.filter_map(|id| self.traces.get(id)), limit)
    }

    /// Traces of one agent, newest first.
    pub fn traces_by_agent(&self, agent_id: &str, limit: Option<usize>) -> Vec<Trace> {
        let ids = self.agent_traces.get(agent_id).into_iter().flatten();
        Self::newest_first(ids.filter_map(|id| self.traces.get(id)), limit)
    }

    pub fn traces_by_status(&self, status: TraceStatus) -> Vec<Trace> {
        self.traces(None)
            .into_iter()
            .filter(|trace| trace.status == status)
            .collect()
    }

    /// Traces created within the last `minutes`, optionally for one agent.
    /// A window too large to represent has no cutoff.
    pub fn recent_traces(&self, minutes: i64, agent_id: Option<&str>) -> Vec<Trace> {
        let cutoff =
            Duration::try_minutes(minutes).and_then(|window| Utc::now().checked_sub_signed(window));
        let traces = match agent_id {
            Some(agent_id) => self.traces_by_agent(agent_id, None),
            None => self.traces(None),
        };
        traces
            .into_iter()
            .filter(|trace| cutoff.map_or(true, |cutoff| trace.timestamp > cutoff))
            .collect()
    }

    pub fn trace_stats(&self, agent_id: Option<&str>) -> TraceStats {
        let traces = match agent_id {
            Some(agent_id) => self.traces_by_agent(agent_id, None),
            None => self.traces(None),
        };

        let mut stats = TraceStats {
            total: traces.len(),
            ..TraceStats::default()
        };
        let mut total_duration = 0i64;
        let mut timed = 0usize;
        for trace in &traces {
            match trace.status {
                TraceStatus::Pending => stats.pending += 1,
                TraceStatus::Completed => stats.completed += 1,
                TraceStatus::Failed => stats.failed += 1,
            }
            if let Some(duration) = trace.duration {
                total_duration += duration;
                timed += 1;
            }
        }
        if timed > 0 {
            stats.avg_duration = total_duration as f64 / timed as f64;
        }
        stats
    }

    pub fn snapshot(&self, trace_limit: Option<usize>) -> Snapshot {
        Snapshot {
            agents: self.agents(),
            traces: self.traces(trace_limit),
        }
    }

    fn newest_first<'a>(traces: impl Iterator<Item = &'a Trace>, limit: Option<usize>) -> Vec<Trace> {
        // Reverse creation order first so equal timestamps keep newest-first.
        let mut list: Vec<Trace> = traces.cloned().collect();
        list.reverse();
        list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = limit {
            list.truncate(limit);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use serde_json::json;

    fn agent(store: &mut EntityStore, name: &str, parent: Option<&str>) -> Agent {
        store
            .create_agent(NewAgent {
                name: name.to_string(),
                agent_type: AgentType::Worker,
                parent_id: parent.map(str::to_string),
                config: None,
            })
            .unwrap()
    }

    /// `children` of every agent equals exactly the set of agents pointing to it.
    fn assert_tree_consistent(store: &EntityStore) {
        let agents = store.agents();
        for parent in &agents {
            let mut expected: Vec<&str> = agents
                .iter()
                .filter(|a| a.parent_id.as_deref() == Some(parent.id.as_str()))
                .map(|a| a.id.as_str())
                .collect();
            let mut actual: Vec<&str> = parent.children.iter().map(String::as_str).collect();
            expected.sort_unstable();
            actual.sort_unstable();
            assert_eq!(actual, expected, "children of {} out of sync", parent.name);
        }
        for agent in &agents {
            if let Some(parent) = &agent.parent_id {
                assert!(store.agent(parent).is_some(), "dangling parent on {}", agent.name);
            }
        }
    }

    #[test]
    fn create_agent_rejects_empty_name() {
        let mut store = EntityStore::new();
        let err = store
            .create_agent(NewAgent {
                name: "   ".to_string(),
                ..NewAgent::default()
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(store.agent_count(), 0);
    }

    #[test]
    fn unresolved_parent_becomes_root() {
        let mut store = EntityStore::new();
        let orphan = agent(&mut store, "orphan", Some("missing"));
        assert_eq!(orphan.parent_id, None);
        assert_eq!(store.agent_tree().len(), 1);
    }

    #[test]
    fn master_worker_tree_scenario() {
        let mut store = EntityStore::new();
        let master = store
            .create_agent(NewAgent {
                name: "M".to_string(),
                agent_type: AgentType::Master,
                parent_id: None,
                config: None,
            })
            .unwrap();
        let worker = agent(&mut store, "W", Some(&master.id));

        let tree = store.agent_tree();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].name, "M");
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].id, worker.id);

        assert!(store.delete_agent(&master.id));
        assert!(store.agent_tree().is_empty());
        assert!(store.agent(&worker.id).is_none());
    }

    #[test]
    fn delete_removes_whole_subtree_and_detaches() {
        let mut store = EntityStore::new();
        let root = agent(&mut store, "root", None);
        let a = agent(&mut store, "a", Some(&root.id));
        let b = agent(&mut store, "b", Some(&a.id));
        let c = agent(&mut store, "c", Some(&b.id));
        let sibling = agent(&mut store, "sibling", Some(&root.id));

        let removed = store.remove_subtree(&a.id);
        assert_eq!(removed[0], a.id);
        assert_eq!(removed.len(), 3);
        for gone in [&a.id, &b.id, &c.id] {
            assert!(store.agent(gone).is_none());
        }
        assert_eq!(store.agent(&root.id).unwrap().children, vec![sibling.id]);
        assert_tree_consistent(&store);
    }

    #[test]
    fn delete_unknown_is_not_an_error() {
        let mut store = EntityStore::new();
        assert!(!store.delete_agent("nope"));
    }

    #[test]
    fn status_update_always_stamps_last_active() {
        let mut store = EntityStore::new();
        let a = agent(&mut store, "a", None);
        let first = store.update_agent_status(&a.id, AgentStatus::Idle).unwrap();
        assert!(first.last_active.is_some());
        assert_eq!(first.status, AgentStatus::Idle);

        let err = store.update_agent_status("ghost", AgentStatus::Active).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn reparent_relinks_old_and_new_parent() {
        let mut store = EntityStore::new();
        let p1 = agent(&mut store, "p1", None);
        let p2 = agent(&mut store, "p2", None);
        let child = agent(&mut store, "child", Some(&p1.id));

        let moved = store
            .update_agent(
                &child.id,
                AgentPatch {
                    parent_id: Some(Some(p2.id.clone())),
                    ..AgentPatch::default()
                },
            )
            .unwrap();
        assert_eq!(moved.parent_id.as_deref(), Some(p2.id.as_str()));
        assert!(store.agent(&p1.id).unwrap().children.is_empty());
        assert_eq!(store.agent(&p2.id).unwrap().children, vec![child.id.clone()]);
        assert_tree_consistent(&store);

        let detached = store
            .update_agent(
                &child.id,
                AgentPatch {
                    parent_id: Some(None),
                    ..AgentPatch::default()
                },
            )
            .unwrap();
        assert_eq!(detached.parent_id, None);
        assert!(store.agent(&p2.id).unwrap().children.is_empty());
        assert_tree_consistent(&store);
    }

    #[test]
    fn reparent_under_descendant_is_rejected_without_changes() {
        let mut store = EntityStore::new();
        let root = agent(&mut store, "root", None);
        let mid = agent(&mut store, "mid", Some(&root.id));
        let leaf = agent(&mut store, "leaf", Some(&mid.id));

        let err = store
            .update_agent(
                &root.id,
                AgentPatch {
                    name: Some("renamed".to_string()),
                    parent_id: Some(Some(leaf.id.clone())),
                    ..AgentPatch::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        let root_after = store.agent(&root.id).unwrap();
        assert_eq!(root_after.name, "root");
        assert_eq!(root_after.parent_id, None);
        assert_tree_consistent(&store);

        let self_parent = AgentPatch {
            parent_id: Some(Some(mid.id.clone())),
            ..AgentPatch::default()
        };
        assert!(store.update_agent(&mid.id, self_parent).is_err());
    }

    #[test]
    fn random_create_delete_sequences_keep_tree_consistent() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut store = EntityStore::new();
        for _ in 0..500 {
            let ids: Vec<String> = store.agents().into_iter().map(|a| a.id).collect();
            match rng.gen_range(0..10) {
                0..=5 => {
                    let parent = if ids.is_empty() || rng.gen_bool(0.2) {
                        None
                    } else {
                        Some(ids[rng.gen_range(0..ids.len())].clone())
                    };
                    agent(&mut store, "n", parent.as_deref());
                }
                6..=7 if !ids.is_empty() => {
                    let victim = &ids[rng.gen_range(0..ids.len())];
                    let descendants: Vec<String> = store
                        .agent_subtree(victim)
                        .map(|node| collect_ids(&node))
                        .unwrap_or_default();
                    assert!(store.delete_agent(victim));
                    for id in descendants {
                        assert!(store.agent(&id).is_none());
                    }
                }
                _ if !ids.is_empty() => {
                    let target = &ids[rng.gen_range(0..ids.len())];
                    let parent = ids[rng.gen_range(0..ids.len())].clone();
                    let _ = store.update_agent(
                        target,
                        AgentPatch {
                            parent_id: Some(Some(parent)),
                            ..AgentPatch::default()
                        },
                    );
                }
                _ => {}
            }
            assert_tree_consistent(&store);
        }
    }

    fn collect_ids(node: &AgentNode) -> Vec<String> {
        let mut out = vec![node.id.clone()];
        for child in &node.children {
            out.extend(collect_ids(child));
        }
        out
    }

    #[test]
    fn tree_skips_dangling_children() {
        let mut store = EntityStore::new();
        let root = agent(&mut store, "root", None);
        store
            .agents
            .get_mut(&root.id)
            .unwrap()
            .children
            .push("dangling".to_string());
        let node = store.agent_subtree(&root.id).unwrap();
        assert!(node.children.is_empty());
        assert!(store.agent_subtree("missing").is_none());
    }

    #[test]
    fn tree_terminates_on_corrupted_cycle() {
        let mut store = EntityStore::new();
        let a = agent(&mut store, "a", None);
        let b = agent(&mut store, "b", Some(&a.id));
        store.agents.get_mut(&b.id).unwrap().children.push(a.id.clone());
        let node = store.agent_subtree(&a.id).unwrap();
        assert_eq!(node.children.len(), 1);
        assert!(node.children[0].children.is_empty());
    }

    #[test]
    fn ghost_trace_scenario() {
        let mut store = EntityStore::new();
        let trace = store.create_trace(NewTrace {
            agent_id: "ghost-1".to_string(),
            action: "ping".to_string(),
            ..NewTrace::default()
        });
        assert_eq!(trace.status, TraceStatus::Pending);
        assert_eq!(trace.duration, None);

        let updated = store
            .update_trace(
                &trace.id,
                TracePatch {
                    output: Some(json!({ "ok": true })),
                    ..TracePatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, TraceStatus::Completed);
        assert!(updated.duration.unwrap() >= 0);
    }

    #[test]
    fn duration_is_stamped_once() {
        let mut store = EntityStore::new();
        let trace = store.create_trace(NewTrace {
            agent_id: "a".to_string(),
            action: "run".to_string(),
            ..NewTrace::default()
        });
        let first = store
            .complete_trace(&trace.id, json!("first"), None)
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store
            .update_trace(
                &trace.id,
                TracePatch {
                    output: Some(json!("second")),
                    status: Some(TraceStatus::Failed),
                    ..TracePatch::default()
                },
            )
            .unwrap();
        assert_eq!(second.duration, first.duration);
        assert_eq!(second.status, TraceStatus::Completed);
    }

    #[test]
    fn fail_trace_records_error_and_merges_metadata() {
        let mut store = EntityStore::new();
        let mut metadata = JsonMap::new();
        metadata.insert("origin".to_string(), json!("test"));
        let trace = store.create_trace(NewTrace {
            agent_id: "a".to_string(),
            action: "run".to_string(),
            metadata: Some(metadata),
            ..NewTrace::default()
        });

        let mut extra = JsonMap::new();
        extra.insert("status".to_string(), json!("failed"));
        let failed = store.fail_trace(&trace.id, "boom", Some(extra)).unwrap();
        assert_eq!(failed.status, TraceStatus::Failed);
        assert_eq!(failed.output, Some(json!({ "error": "boom" })));
        assert_eq!(failed.metadata["origin"], json!("test"));
        assert_eq!(failed.metadata["status"], json!("failed"));
        assert!(failed.duration.is_some());
    }

    #[test]
    fn update_unknown_trace_is_none() {
        let mut store = EntityStore::new();
        assert!(store.update_trace("nope", TracePatch::default()).is_none());
    }

    #[test]
    fn trace_listing_limits_and_stats() {
        let mut store = EntityStore::new();
        for i in 0..5 {
            let trace = store.create_trace(NewTrace {
                agent_id: if i % 2 == 0 { "even" } else { "odd" }.to_string(),
                action: format!("step-{}", i),
                ..NewTrace::default()
            });
            if i < 3 {
                store.complete_trace(&trace.id, json!(i), None);
            }
        }

        let all = store.traces(Some(DEFAULT_TRACE_LIMIT));
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].action, "step-4");
        assert_eq!(store.traces(Some(2)).len(), 2);
        assert_eq!(store.traces_by_agent("even", None).len(), 3);
        assert_eq!(store.recent_traces(5, Some("odd")).len(), 2);
        assert_eq!(store.traces_by_status(TraceStatus::Pending).len(), 2);

        let stats = store.trace_stats(None);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.pending, 2);
        assert!(stats.avg_duration >= 0.0);

        store.clear_traces();
        assert_eq!(store.trace_count(), 0);
        assert!(store.traces_by_agent("even", None).is_empty());
    }

    #[test]
    fn huge_recent_window_returns_everything() {
        let mut store = EntityStore::new();
        for action in ["a", "b"] {
            store.create_trace(NewTrace {
                agent_id: "x".to_string(),
                action: action.to_string(),
                ..NewTrace::default()
            });
        }
        assert_eq!(store.recent_traces(1_000_000_000_000, None).len(), 2);
        assert_eq!(store.recent_traces(i64::MAX, Some("x")).len(), 2);
        assert!(store.recent_traces(-5, None).is_empty());
    }

    #[test]
    fn update_unknown_agent_is_not_found() {
        let mut store = EntityStore::new();
        let err = store
            .update_agent(
                "ghost",
                AgentPatch {
                    name: Some("Renamed".to_string()),
                    ..AgentPatch::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(store.agent_count(), 0);
    }

    #[test]
    fn replace_agents_keeps_status_and_rebuilds_children() {
        let mut store = EntityStore::new();
        let existing = agent(&mut store, "keep", None);
        store
            .update_agent_status(&existing.id, AgentStatus::Active)
            .unwrap();

        let external = vec![
            ExternalAgent {
                id: Some(existing.id.clone()),
                name: "keep".to_string(),
                agent_type: Some(AgentType::Master),
                parent_id: None,
                children: vec!["stale".to_string()],
                config: JsonMap::new(),
                created_at: None,
            },
            ExternalAgent {
                id: None,
                name: "Child One".to_string(),
                agent_type: None,
                parent_id: Some(existing.id.clone()),
                children: vec![],
                config: JsonMap::new(),
                created_at: None,
            },
            ExternalAgent {
                id: Some("x".to_string()),
                name: "x".to_string(),
                agent_type: None,
                parent_id: Some("y".to_string()),
                children: vec![],
                config: JsonMap::new(),
                created_at: None,
            },
            ExternalAgent {
                id: Some("y".to_string()),
                name: "y".to_string(),
                agent_type: None,
                parent_id: Some("x".to_string()),
                children: vec![],
                config: JsonMap::new(),
                created_at: None,
            },
        ];

        let agents = store.replace_agents(external);
        assert_eq!(agents.len(), 4);
        let kept = store.agent(&existing.id).unwrap();
        assert_eq!(kept.status, AgentStatus::Active);
        assert_eq!(kept.created_at, existing.created_at);
        assert_eq!(kept.children, vec!["child-one".to_string()]);
        assert_eq!(store.agent("child-one").unwrap().agent_type, AgentType::Worker);
        // The x <-> y cycle is cut at the first agent in upstream order.
        assert_eq!(store.agent("x").unwrap().parent_id, None);
        assert_eq!(store.agent("y").unwrap().parent_id.as_deref(), Some("x"));
        assert_tree_consistent(&store);
    }
}
