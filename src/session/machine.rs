//! Transport-free observer session state machine.
//!
//! ```text
//!  Connecting ──opened──▶ Open ──closed──▶ Closed ──timer──▶ Connecting
//!      │                                      │
//!      └──────────closed─────────────────────▶│── budget spent ──▶ GaveUp
//!  any ──cancel──▶ Cancelled
//! ```
//!
//! The driver in [`super::client`] owns the socket and the timer; this type
//! only decides what happens next, which keeps reconnect behaviour testable
//! without a network.

use std::time::Duration;

use crate::events::ChangeEvent;

use super::backoff::{Backoff, ReconnectConfig};
use super::replica::{Replica, ReplicaUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
    /// Reconnect budget exhausted; nothing further happens automatically.
    GaveUp,
    /// Torn down by the owner.
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::GaveUp | SessionState::Cancelled)
    }
}

/// What the driver should do after a connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    ReconnectAfter(Duration),
    GiveUp,
    Stop,
}

#[derive(Debug, Clone)]
pub struct ObserverSession {
    state: SessionState,
    backoff: Backoff,
    replica: Replica,
}

impl ObserverSession {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            state: SessionState::Connecting,
            backoff: Backoff::new(config),
            replica: Replica::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    pub fn replica_mut(&mut self) -> &mut Replica {
        &mut self.replica
    }

    pub fn attempt(&self) -> u32 {
        self.backoff.attempt()
    }

    /// The connection is up: reset the backoff and wait for `INIT`.
    pub fn opened(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = SessionState::Open;
        self.backoff.reset();
        self.replica.await_snapshot();
    }

    /// Apply an event received on the open connection.
    pub fn event(&mut self, event: ChangeEvent) -> ReplicaUpdate {
        if self.state != SessionState::Open {
            return ReplicaUpdate::DroppedBeforeInit;
        }
        self.replica.apply(event)
    }

    /// Decode and apply a text frame.
    pub fn message(&mut self, text: &str) -> Result<ReplicaUpdate, serde_json::Error> {
        let event: ChangeEvent = serde_json::from_str(text)?;
        Ok(self.event(event))
    }

    /// The connection closed (or never opened). Schedules the next attempt.
    pub fn closed(&mut self) -> NextStep {
        if self.state == SessionState::Cancelled {
            return NextStep::Stop;
        }
        if self.state == SessionState::GaveUp {
            return NextStep::GiveUp;
        }
        match self.backoff.next_delay() {
            Some(delay) => {
                self.state = SessionState::Closed;
                NextStep::ReconnectAfter(delay)
            }
            None => {
                self.state = SessionState::GaveUp;
                NextStep::GiveUp
            }
        }
    }

    /// The reconnect timer fired.
    pub fn reconnecting(&mut self) {
        if self.state == SessionState::Closed {
            self.state = SessionState::Connecting;
        }
    }

    pub fn cancel(&mut self) {
        self.state = SessionState::Cancelled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Snapshot;

    fn config(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            base_delay: Duration::from_millis(50),
            max_attempts,
        }
    }

    #[test]
    fn failed_connects_back_off_then_give_up() {
        let mut session = ObserverSession::new(config(3));
        let mut delays = Vec::new();
        loop {
            match session.closed() {
                NextStep::ReconnectAfter(delay) => {
                    assert_eq!(session.state(), SessionState::Closed);
                    delays.push(delay.as_millis());
                    session.reconnecting();
                    assert_eq!(session.state(), SessionState::Connecting);
                }
                NextStep::GiveUp => break,
                NextStep::Stop => panic!("not cancelled"),
            }
        }
        assert_eq!(delays, vec![50, 100, 200]);
        assert_eq!(session.state(), SessionState::GaveUp);
        assert_eq!(session.closed(), NextStep::GiveUp);
    }

    #[test]
    fn successful_open_resets_attempts() {
        let mut session = ObserverSession::new(config(5));
        session.closed();
        session.reconnecting();
        session.closed();
        assert_eq!(session.attempt(), 2);

        session.reconnecting();
        session.opened();
        assert_eq!(session.attempt(), 0);
        assert_eq!(
            session.closed(),
            NextStep::ReconnectAfter(Duration::from_millis(50))
        );
    }

    #[test]
    fn events_need_open_connection_and_init() {
        let mut session = ObserverSession::new(config(1));
        assert_eq!(
            session.event(ChangeEvent::TracesCleared),
            ReplicaUpdate::DroppedBeforeInit
        );

        session.opened();
        assert_eq!(
            session.message(r#"{"type":"TRACES_CLEARED"}"#).unwrap(),
            ReplicaUpdate::DroppedBeforeInit
        );
        assert_eq!(
            session.event(ChangeEvent::Init(Snapshot::default())),
            ReplicaUpdate::Initialized
        );
        assert!(session.message("not json").is_err());
    }

    #[test]
    fn cancel_is_final() {
        let mut session = ObserverSession::new(config(5));
        session.cancel();
        assert_eq!(session.closed(), NextStep::Stop);
        session.opened();
        assert_eq!(session.state(), SessionState::Cancelled);
    }
}
