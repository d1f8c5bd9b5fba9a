//! Connection dispatcher for the bridge socket.
//!
//! The listener accepts connections until shutdown and runs each one in its
//! own task. A connection reads one request line at a time, hands it to the
//! [`RequestRouter`] and writes the response back before reading the next.
//!
//! On shutdown the listener stops accepting and idle connections close at
//! once. Connections in the middle of a request get the configured grace
//! period to finish; whatever is left after that is aborted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use protocol::BridgeResponse;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::ipc::{IpcConnection, IpcError, IpcServer};
use crate::orchestrator::OrchestratorEvent;
use crate::router::{RequestRouter, RouterError};

/// Accepts connections on an [`IpcServer`] and serves them.
pub struct Dispatcher {
    server: IpcServer,
    router: Arc<RequestRouter>,
    shutdown_grace: Duration,
    active: Arc<AtomicUsize>,
    event_tx: Option<broadcast::Sender<OrchestratorEvent>>,
}

impl Dispatcher {
    /// Create a dispatcher serving `router` on `server`.
    pub fn new(server: IpcServer, router: Arc<RequestRouter>, shutdown_grace: Duration) -> Self {
        Self {
            server,
            router,
            shutdown_grace,
            active: Arc::new(AtomicUsize::new(0)),
            event_tx: None,
        }
    }

    /// Publish connect and disconnect events on `event_tx`.
    pub fn with_events(mut self, event_tx: broadcast::Sender<OrchestratorEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Count open connections in `active` instead of a private counter.
    pub fn with_connection_counter(mut self, active: Arc<AtomicUsize>) -> Self {
        self.active = active;
        self
    }

    /// Run the accept loop until `cancel` fires, then drain connections.
    pub async fn run(self, cancel: CancellationToken) {
        let Dispatcher {
            server,
            router,
            shutdown_grace,
            active,
            event_tx,
        } = self;

        info!(path = ?server.path(), "Listening for connections");
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Listener received shutdown signal");
                    break;
                }
                Some(result) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = result {
                        if e.is_panic() {
                            error!(error = %e, "Connection handler panicked");
                        }
                    }
                }
                accepted = server.accept() => {
                    match accepted {
                        Ok(conn) => {
                            let connection_id = Uuid::new_v4();
                            let span = tracing::info_span!("connection", %connection_id);
                            let handler = ConnectionHandler {
                                conn,
                                router: Arc::clone(&router),
                                cancel: cancel.clone(),
                                active: Arc::clone(&active),
                                event_tx: event_tx.clone(),
                                connection_id,
                            };
                            connections.spawn(handler.run().instrument(span));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        // Stop accepting and remove the socket file before draining.
        drop(server);

        if connections.is_empty() {
            return;
        }

        info!(
            remaining = connections.len(),
            grace_secs = shutdown_grace.as_secs(),
            "Waiting for open connections"
        );
        let drained = tokio::time::timeout(shutdown_grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = connections.len(),
                "Grace period elapsed, aborting connections"
            );
            connections.shutdown().await;
        }
    }
}

/// State of one accepted connection.
struct ConnectionHandler {
    conn: IpcConnection,
    router: Arc<RequestRouter>,
    cancel: CancellationToken,
    active: Arc<AtomicUsize>,
    event_tx: Option<broadcast::Sender<OrchestratorEvent>>,
    connection_id: Uuid,
}

impl ConnectionHandler {
    async fn run(mut self) {
        let _tracker = ConnectionTracker::new(
            Arc::clone(&self.active),
            self.event_tx.clone(),
            self.connection_id,
        );
        info!("Client connected");

        let reason = self.serve().await;
        info!(reason, "Client disconnected");
    }

    /// Serve requests until the connection ends. Returns why it ended.
    async fn serve(&mut self) -> &'static str {
        loop {
            let read = tokio::select! {
                _ = self.cancel.cancelled() => return "shutdown",
                read = self.conn.read_line() => read,
            };

            let line = match read {
                Ok(Some(line)) => line,
                Ok(None) => return "closed by peer",
                Err(e @ IpcError::FrameTooLong { .. }) => {
                    warn!(error = %e, "Rejected oversized request");
                    let response: BridgeResponse =
                        RouterError::InvalidRequest(e.to_string()).into();
                    if let Err(e) = self.conn.send_response(&response).await {
                        debug!(error = %e, "Failed to send rejection");
                    }
                    return "request too large";
                }
                Err(e @ IpcError::InvalidUtf8) => {
                    warn!(error = %e, "Rejected malformed request");
                    let response: BridgeResponse =
                        RouterError::InvalidRequest(e.to_string()).into();
                    if let Err(e) = self.conn.send_response(&response).await {
                        warn!(error = %e, "Failed to send response");
                        return "write error";
                    }
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read request");
                    return "read error";
                }
            };

            debug!(bytes = line.len(), "Received request");
            let response = self.router.handle_line(&line).await;

            if let Err(e) = self.conn.send_response(&response).await {
                warn!(error = %e, "Failed to send response");
                return "write error";
            }
            debug!(success = response.success, "Sent response");
        }
    }

}

/// Counts a connection as open and announces it until dropped.
///
/// Dropping also runs when the handler task is aborted after the grace
/// period, so the counter and the disconnect event stay accurate.
struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    event_tx: Option<broadcast::Sender<OrchestratorEvent>>,
    connection_id: Uuid,
}

impl ConnectionTracker {
    fn new(
        active: Arc<AtomicUsize>,
        event_tx: Option<broadcast::Sender<OrchestratorEvent>>,
        connection_id: Uuid,
    ) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        let tracker = Self {
            active,
            event_tx,
            connection_id,
        };
        tracker.emit(OrchestratorEvent::ClientConnected { connection_id });
        tracker
    }

    fn emit(&self, event: OrchestratorEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

impl Drop for ConnectionTracker {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.emit(OrchestratorEvent::ClientDisconnected {
            connection_id: self.connection_id,
        });
    }
}
