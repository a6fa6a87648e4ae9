//! Session Server
//!
//! Runs the two listeners: axum for session creation and health, and a
//! tokio-tungstenite WebSocket listener at
//! `/api/huruf/session/{id}/ws`. Each socket gets a reader loop that
//! forwards frames to the session actor and a writer task draining its
//! outbound queue.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tracing::{debug, error, info, instrument, warn};

use crate::game::questions::{BankError, QuestionBank};
use crate::network::auth::{guard_for, AuthConfig, AuthError, CreationGuard};
use crate::network::http::{self, HttpState};
use crate::network::protocol::ServerMessage;
use crate::network::registry::Outbound;
use crate::network::session::{SessionConfig, SessionError, SessionManager};
use crate::store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, StoreError};

/// WebSocket route prefix; the session id and `/ws` follow.
pub const WS_PATH_PREFIX: &str = "/api/huruf/session/";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP (creation, health) bind address.
    pub http_addr: SocketAddr,
    /// WebSocket bind address.
    pub ws_addr: SocketAddr,
    /// Snapshot directory. `None` keeps snapshots in memory.
    pub data_dir: Option<PathBuf>,
    /// Question bank file. `None` uses the embedded bank.
    pub questions_path: Option<PathBuf>,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// How often stopped session handles are pruned.
    pub cleanup_interval: Duration,
    /// Per-session settings.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ws_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            data_dir: None,
            questions_path: None,
            max_connections: 1000,
            cleanup_interval: Duration::from_secs(60),
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `HURUF_*` environment variables.
    pub fn from_env() -> Result<Self, GameServerError> {
        let mut config = Self::default();

        if let Some(addr) = env_var("HURUF_HTTP_ADDR") {
            config.http_addr = parse_env("HURUF_HTTP_ADDR", &addr)?;
        }
        if let Some(addr) = env_var("HURUF_WS_ADDR") {
            config.ws_addr = parse_env("HURUF_WS_ADDR", &addr)?;
        }
        if let Some(max) = env_var("HURUF_MAX_CONNECTIONS") {
            config.max_connections = parse_env("HURUF_MAX_CONNECTIONS", &max)?;
        }
        config.data_dir = env_var("HURUF_DATA_DIR").map(PathBuf::from);
        config.questions_path = env_var("HURUF_QUESTIONS_PATH").map(PathBuf::from);

        Ok(config)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, GameServerError> {
    value
        .parse()
        .map_err(|_| GameServerError::Config(format!("invalid {name}: {value:?}")))
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Snapshot store could not be opened.
    #[error("Snapshot store error: {0}")]
    Store(#[from] StoreError),

    /// Question bank could not be loaded.
    #[error("Question bank error: {0}")]
    Bank(#[from] BankError),

    /// Creation guard could not be built.
    #[error("Auth configuration error: {0}")]
    Auth(#[from] AuthError),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Extract `{id}` from `/api/huruf/session/{id}/ws`.
pub fn session_id_from_path(path: &str) -> Option<&str> {
    let id = path.strip_prefix(WS_PATH_PREFIX)?.strip_suffix("/ws")?;
    if id.is_empty() || id.contains('/') {
        None
    } else {
        Some(id)
    }
}

/// Load the configured question bank.
pub fn load_bank(config: &ServerConfig) -> Result<QuestionBank, GameServerError> {
    let bank = match &config.questions_path {
        Some(path) => {
            info!(path = %path.display(), "loading question bank");
            QuestionBank::from_path(path)?
        }
        None => QuestionBank::embedded(),
    };
    if bank.is_empty() {
        return Err(BankError::Empty.into());
    }
    Ok(bank)
}

/// Open the configured snapshot store.
pub fn open_store(config: &ServerConfig) -> Result<Arc<dyn SnapshotStore>, GameServerError> {
    match &config.data_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "persisting snapshots to disk");
            Ok(Arc::new(FileSnapshotStore::open(dir)?))
        }
        None => {
            warn!("HURUF_DATA_DIR not set, snapshots are kept in memory only");
            Ok(Arc::new(MemorySnapshotStore::new()))
        }
    }
}

/// The session server.
pub struct GameServer {
    config: ServerConfig,
    sessions: Arc<SessionManager>,
    guard: Arc<dyn CreationGuard>,
    connections: Arc<AtomicUsize>,
    next_conn_id: Arc<AtomicU64>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Build a server from configuration: store, question bank and guard.
    pub fn new(config: ServerConfig, auth: AuthConfig) -> Result<Self, GameServerError> {
        let store = open_store(&config)?;
        let bank = Arc::new(load_bank(&config)?);
        info!(letters = bank.letters().len(), questions = bank.len(), "question bank ready");

        let sessions = Arc::new(SessionManager::new(store, bank, config.session.clone()));
        let guard = guard_for(auth)?;
        Ok(Self::with_parts(config, sessions, guard))
    }

    /// Build a server around an existing session manager and guard.
    pub fn with_parts(
        config: ServerConfig,
        sessions: Arc<SessionManager>,
        guard: Arc<dyn CreationGuard>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            sessions,
            guard,
            connections: Arc::new(AtomicUsize::new(0)),
            next_conn_id: Arc::new(AtomicU64::new(1)),
            shutdown_tx,
        }
    }

    /// Stop both listeners and close sockets.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run until [`shutdown`](Self::shutdown) is called.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let http_listener = TcpListener::bind(&self.config.http_addr).await?;
        let ws_listener = TcpListener::bind(&self.config.ws_addr).await?;
        info!(http = %self.config.http_addr, ws = %self.config.ws_addr, "huruf server listening");

        let app = http::router(HttpState {
            sessions: self.sessions.clone(),
            guard: self.guard.clone(),
        });
        let mut http_shutdown = self.shutdown_tx.subscribe();
        let http_handle = tokio::spawn(async move {
            let served = axum::serve(http_listener, app)
                .with_graceful_shutdown(async move {
                    let _ = http_shutdown.recv().await;
                })
                .await;
            if let Err(e) = served {
                error!("HTTP server failed: {}", e);
            }
        });

        let cleanup_sessions = self.sessions.clone();
        let cleanup_every = self.config.cleanup_interval;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_sessions, cleanup_every).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = ws_listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.load(Ordering::SeqCst) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        let _ = http_handle.await;

        Ok(())
    }

    async fn run_cleanup_loop(sessions: Arc<SessionManager>, every: Duration) {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            sessions.cleanup().await;
        }
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let sessions = self.sessions.clone();
        let connections = self.connections.clone();
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
        let outbound_queue = self.config.session.outbound_queue;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        connections.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let _slot = ConnectionSlot(connections);

            let mut path = None;
            let ws_stream = match accept_hdr_async(
                stream,
                |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    path = Some(req.uri().path().to_string());
                    Ok(resp)
                },
            )
            .await
            {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let Some(session_id) = path.as_deref().and_then(session_id_from_path).map(str::to_string) else {
                debug!(%addr, ?path, "unknown WebSocket path");
                reject(ws_stream, "Unknown session path").await;
                return;
            };

            let (msg_tx, mut msg_rx) = mpsc::channel::<Outbound>(outbound_queue);
            let handle = match sessions.connect(&session_id, conn_id, msg_tx).await {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(session = %session_id, error = %e, "WebSocket for unavailable session");
                    reject(ws_stream, "Session not found").await;
                    return;
                }
            };
            info!(session = %session_id, connection = conn_id, %addr, "socket connected");

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(frame) = msg_rx.recv().await {
                    match frame {
                        Outbound::Message(msg) => {
                            let text = match msg.to_json() {
                                Ok(t) => t,
                                Err(e) => {
                                    error!("Failed to serialize message: {}", e);
                                    continue;
                                }
                            };
                            if ws_sender.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Outbound::Close { code, reason } => {
                            let _ = ws_sender
                                .send(Message::Close(Some(CloseFrame {
                                    code: CloseCode::from(code),
                                    reason: reason.into(),
                                })))
                                .await;
                            break;
                        }
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if handle.inbound(conn_id, text).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                debug!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            handle.disconnect(conn_id).await;
            sender_task.abort();
            info!(session = %session_id, connection = conn_id, "socket closed");
        });
    }
}

/// Send an ERROR and close a socket that cannot join a session.
async fn reject(mut ws: WebSocketStream<TcpStream>, message: &str) {
    if let Ok(text) = ServerMessage::error(message).to_json() {
        let _ = ws.send(Message::Text(text)).await;
    }
    let _ = ws
        .close(Some(CloseFrame {
            code: CloseCode::Policy,
            reason: message.to_string().into(),
        }))
        .await;
}

/// Decrements the live connection count when the socket task ends.
struct ConnectionSlot(Arc<AtomicUsize>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// TESTS
// =============================================================================
