//! WebSocket driver for [`ObserverSession`].
//!
//! One task per session owns the socket and the reconnect timer. The timer
//! is a `sleep` raced against the session's cancellation token, so
//! [`SessionHandle::shutdown`] never leaves a pending reconnect behind.

use futures::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::backoff::ReconnectConfig;
use super::machine::{NextStep, ObserverSession, SessionState};
use super::replica::Replica;

/// Connects to a mission control stream and keeps a live [`Replica`].
#[derive(Debug, Clone)]
pub struct ObserverClient {
    url: Url,
    config: ReconnectConfig,
}

/// Owner's side of a running session.
pub struct SessionHandle {
    cancel: CancellationToken,
    replica: watch::Receiver<Replica>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Latest replica.
    pub fn replica(&self) -> Replica {
        self.replica.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver notified after each replica change.
    pub fn watch_replica(&self) -> watch::Receiver<Replica> {
        self.replica.clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Cancel any pending reconnect, close the socket and wait for the task.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("Observer session task ended abnormally: {}", e);
        }
    }
}

impl ObserverClient {
    pub fn new(url: Url, config: ReconnectConfig) -> Self {
        Self { url, config }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn spawn(self) -> SessionHandle {
        let cancel = CancellationToken::new();
        let (replica_tx, replica_rx) = watch::channel(Replica::default());
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let session = ObserverSession::new(self.config);

        let task = tokio::spawn(run(
            self.url,
            session,
            cancel.clone(),
            replica_tx,
            state_tx,
        ));

        SessionHandle {
            cancel,
            replica: replica_rx,
            state: state_rx,
            task,
        }
    }
}

async fn run(
    url: Url,
    mut session: ObserverSession,
    cancel: CancellationToken,
    replica_tx: watch::Sender<Replica>,
    state_tx: watch::Sender<SessionState>,
) {
    loop {
        state_tx.send_replace(session.state());
        tracing::debug!(url = %url, attempt = session.attempt(), "Connecting observer session");

        let connected = tokio::select! {
            _ = cancel.cancelled() => {
                session.cancel();
                state_tx.send_replace(session.state());
                return;
            }
            result = tokio_tungstenite::connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((mut stream, _response)) => {
                session.opened();
                state_tx.send_replace(session.state());
                tracing::info!(url = %url, "Observer session connected");

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            let _ = stream.close(None).await;
                            session.cancel();
                            state_tx.send_replace(session.state());
                            return;
                        }
                        frame = stream.next() => match frame {
                            Some(Ok(Message::Text(text))) => match session.message(&text) {
                                Ok(update) if update.changed() => {
                                    replica_tx.send_replace(session.replica().clone());
                                }
                                Ok(update) => {
                                    tracing::trace!(?update, "Event left replica unchanged");
                                }
                                Err(e) => {
                                    tracing::warn!("Failed to decode stream message: {}", e);
                                }
                            },
                            Some(Ok(Message::Ping(payload))) => {
                                let _ = stream.send(Message::Pong(payload)).await;
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!("Observer stream error: {}", e);
                                break;
                            }
                        }
                    }
                }
                tracing::info!(url = %url, "Observer session disconnected");
            }
            Err(e) => {
                tracing::warn!(url = %url, "Observer connect failed: {}", e);
            }
        }

        match session.closed() {
            NextStep::ReconnectAfter(delay) => {
                state_tx.send_replace(session.state());
                tracing::debug!(?delay, "Reconnecting observer session");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        session.cancel();
                        state_tx.send_replace(session.state());
                        return;
                    }
                    _ = tokio::time::sleep(delay) => session.reconnecting(),
                }
            }
            NextStep::GiveUp => {
                state_tx.send_replace(session.state());
                tracing::error!(url = %url, "Max reconnection attempts reached");
                return;
            }
            NextStep::Stop => {
                state_tx.send_replace(session.state());
                return;
            }
        }
    }
}
