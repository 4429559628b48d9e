//! # Mission Control
//!
//! Live state mirror for a hierarchical multi-agent system.
//!
//! This library provides:
//! - An in-memory model of agents (a forest) and the traces of requests they processed
//! - A mutation API that applies changes and broadcasts them as change events
//! - A WebSocket change stream that opens every connection with an `INIT` snapshot
//! - Observer sessions that keep a local replica in sync and reconnect with backoff
//! - Gateway dispatch and periodic agent sync with an upstream gateway
//!
//! ## Architecture
//!
//! ```text
//!   REST / gateway dispatch / upstream sync
//!                   │
//!                   ▼
//!          ┌─────────────────┐      ┌──────────┐
//!          │ MissionControl  │─────▶│ Notifier │──▶ /ws observers ──▶ Replica
//!          │  (EntityStore)  │      └──────────┘
//!          └─────────────────┘
//! ```
//!
//! ## Modules
//! - `store`: entity store and record types
//! - `control`: mutations, queries and observer attachment
//! - `session`: observer replica, reconnect policy and WebSocket client
//! - `gateway`, `dispatch`, `sync`: upstream integration

pub mod api;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod events;
pub mod gateway;
pub mod notifier;
pub mod session;
pub mod store;
pub mod sync;
pub mod util;

pub use config::Config;
pub use control::{MissionControl, SharedControl};
pub use events::ChangeEvent;
pub use store::{Agent, AgentStatus, AgentType, Trace, TraceStatus};
