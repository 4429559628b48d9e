//! Observer sessions: a local replica kept in sync over the change stream.

pub mod backoff;
pub mod client;
pub mod machine;
pub mod replica;

pub use backoff::{Backoff, ReconnectConfig};
pub use client::{ObserverClient, SessionHandle};
pub use machine::{NextStep, ObserverSession, SessionState};
pub use replica::{Replica, ReplicaUpdate};
