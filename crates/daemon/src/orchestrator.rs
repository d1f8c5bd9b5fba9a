//! Bridge orchestrator for wiring together all components.
//!
//! This module provides the `BridgeOrchestrator` that builds the token store,
//! file service and request router from the configuration, and runs the
//! socket listener and the token sweeper between `start` and `stop`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::files::FileService;
use crate::ipc::IpcServer;
use crate::router::RequestRouter;
use crate::tokens::TokenStore;

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Initial state, not started.
    Stopped,
    /// Starting up, binding the socket.
    Starting,
    /// Running and accepting connections.
    Running,
    /// Shutting down gracefully.
    ShuttingDown,
}

/// Events emitted by the orchestrator.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// Orchestrator state changed.
    StateChanged(OrchestratorState),
    /// A client connected.
    ClientConnected { connection_id: Uuid },
    /// A client disconnected.
    ClientDisconnected { connection_id: Uuid },
}

/// Orchestrator that owns the bridge components and their background tasks.
pub struct BridgeOrchestrator {
    /// Configuration.
    config: Config,
    /// Current state.
    state: Arc<RwLock<OrchestratorState>>,
    /// Issued tokens.
    tokens: Arc<TokenStore>,
    /// File operations below the root.
    files: Arc<FileService>,
    /// Request router shared by all connections.
    router: Arc<RequestRouter>,
    /// Number of open client connections.
    active_connections: Arc<AtomicUsize>,
    /// Cancellation token of the current run.
    shutdown_token: Option<CancellationToken>,
    /// Listener and sweeper tasks of the current run.
    tasks: Vec<JoinHandle<()>>,
    /// Event sender.
    event_tx: broadcast::Sender<OrchestratorEvent>,
}

impl BridgeOrchestrator {
    /// Creates a new orchestrator.
    ///
    /// Fails if the configuration is invalid or the root folder cannot be
    /// created.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let files = Arc::new(
            FileService::from_config(&config.service).context("Failed to initialize file service")?,
        );
        let tokens = Arc::new(TokenStore::new(config.security.token_validity()));
        let router = Arc::new(RequestRouter::new(
            Arc::clone(&tokens),
            Arc::clone(&files),
            config.security.require_authentication,
        ));

        if !config.security.require_authentication {
            warn!("Authentication is disabled; any local process can access the root folder");
        }

        let (event_tx, _) = broadcast::channel(256);

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(OrchestratorState::Stopped)),
            tokens,
            files,
            router,
            active_connections: Arc::new(AtomicUsize::new(0)),
            shutdown_token: None,
            tasks: Vec::new(),
            event_tx,
        })
    }

    /// Returns the current state.
    pub async fn state(&self) -> OrchestratorState {
        *self.state.read().await
    }

    /// Returns a receiver for orchestrator events.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.event_tx.subscribe()
    }

    /// Returns the socket path the bridge listens on.
    pub fn socket_path(&self) -> PathBuf {
        self.config.socket_path()
    }

    /// Starts the bridge.
    ///
    /// Binds the socket and spawns the listener and the token sweeper. Both
    /// stop when `cancel` fires or [`stop`](Self::stop) is called. Failing to
    /// bind the socket is returned as an error and leaves the orchestrator
    /// stopped.
    pub async fn start(&mut self, cancel: CancellationToken) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != OrchestratorState::Stopped {
                anyhow::bail!("Orchestrator is already running");
            }
            *state = OrchestratorState::Starting;
        }
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Starting));

        info!("Starting bridge orchestrator...");

        let socket_path = self.socket_path();
        let server = match IpcServer::bind(&socket_path, self.config.max_request_len()).await {
            Ok(server) => server,
            Err(e) => {
                self.set_state(OrchestratorState::Stopped).await;
                return Err(e).with_context(|| {
                    format!("Failed to bind socket: {}", socket_path.display())
                });
            }
        };
        info!(path = %socket_path.display(), "Socket bound");

        let sweeper = self
            .tokens
            .start_sweep_task(self.config.ipc.token_sweep_interval(), cancel.clone());
        debug!("Started token sweep task");

        let dispatcher = Dispatcher::new(
            server,
            Arc::clone(&self.router),
            self.config.ipc.shutdown_grace(),
        )
        .with_events(self.event_tx.clone())
        .with_connection_counter(Arc::clone(&self.active_connections));
        let listener = tokio::spawn(dispatcher.run(cancel.clone()));

        self.tasks = vec![listener, sweeper];
        self.shutdown_token = Some(cancel);

        self.set_state(OrchestratorState::Running).await;
        info!(
            root = %self.files.root().display(),
            "Bridge orchestrator started successfully"
        );
        Ok(())
    }

    /// Stops the bridge gracefully.
    ///
    /// Returns once the listener has drained or aborted its connections.
    pub async fn stop(&mut self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state == OrchestratorState::Stopped {
                return Ok(());
            }
            if *state == OrchestratorState::ShuttingDown {
                anyhow::bail!("Orchestrator is already shutting down");
            }
            *state = OrchestratorState::ShuttingDown;
        }
        self.emit_event(OrchestratorEvent::StateChanged(
            OrchestratorState::ShuttingDown,
        ));

        info!("Stopping bridge orchestrator...");

        if let Some(token) = self.shutdown_token.take() {
            token.cancel();
        }

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Background task failed during shutdown: {}", e);
            }
        }

        self.set_state(OrchestratorState::Stopped).await;
        info!(remaining_tokens = self.tokens.len(), "Bridge orchestrator stopped");
        Ok(())
    }

    async fn set_state(&self, new_state: OrchestratorState) {
        *self.state.write().await = new_state;
        self.emit_event(OrchestratorEvent::StateChanged(new_state));
    }

    /// Emits an orchestrator event.
    fn emit_event(&self, event: OrchestratorEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Returns the token store.
    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Returns the file service.
    pub fn file_service(&self) -> &Arc<FileService> {
        &self.files
    }

    /// Returns the request router.
    pub fn router(&self) -> &Arc<RequestRouter> {
        &self.router
    }

    /// Returns the number of open client connections.
    pub fn connection_count(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }
}
