//! Fan-out of change events to every attached observer.
//!
//! Backed by a tokio broadcast channel: sending never blocks on a slow
//! receiver. A receiver that falls further behind than the channel capacity
//! observes `RecvError::Lagged` and is expected to resynchronize from a fresh
//! snapshot (see [`crate::api`]'s stream handler).

use tokio::sync::broadcast;

use crate::events::ChangeEvent;

/// Default number of events buffered per observer before it lags.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Deliver an event to every live observer. Returns how many received it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(event_type, receivers, "Broadcast event");
                receivers
            }
            Err(_) => {
                tracing::debug!(event_type, "No observers for event");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[test]
    fn publish_without_observers_is_not_an_error() {
        let notifier = Notifier::new(4);
        assert_eq!(notifier.publish(ChangeEvent::TracesCleared), 0);
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();
        notifier.publish(ChangeEvent::AgentDeleted { id: "1".into() });
        notifier.publish(ChangeEvent::AgentDeleted { id: "2".into() });
        assert_eq!(rx.recv().await.unwrap().entity_id(), Some("1"));
        assert_eq!(rx.recv().await.unwrap().entity_id(), Some("2"));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn slow_observer_lags_instead_of_blocking() {
        let notifier = Notifier::new(2);
        let mut slow = notifier.subscribe();
        for i in 0..5 {
            notifier.publish(ChangeEvent::TraceDeleted { id: i.to_string() });
        }
        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(_))));
    }
}
