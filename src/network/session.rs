//! Session Actors
//!
//! One tokio task per live session owns its [`Game`] and
//! [`ConnectionRegistry`] and consumes a single command queue. Socket
//! tasks and answer timers only enqueue commands, so every mutation of a
//! session is serialized through its actor.
//!
//! After each mutation the actor writes a snapshot, then broadcasts the
//! discrete events followed by the full state. Illegal commands are
//! dropped without persisting or broadcasting.
//!
//! The [`SessionManager`] is the directory of live actors. Sessions with no
//! sockets for `idle_timeout` shut down and are restored from their latest
//! snapshot on the next connection.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::SendError};
use tokio::sync::oneshot;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::clock;
use crate::core::rng::GameRng;
use crate::game::events::Transition;
use crate::game::questions::QuestionBank;
use crate::game::rules::{Game, GameConfig};
use crate::game::state::{MatchWins, Team};
use crate::network::protocol::{ClientMessage, ServerMessage, MALFORMED_MESSAGE};
use crate::network::registry::{ConnectionId, ConnectionRegistry, OutboundSender};
use crate::store::{SnapshotStore, StoreError};

/// Session identifier (UUID v4 string).
pub type SessionId = String;

/// Per-session runtime settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Depth of each actor's command queue.
    pub command_queue: usize,
    /// Depth of each socket's outbound queue.
    pub outbound_queue: usize,
    /// How long an actor with no sockets stays alive.
    pub idle_timeout: Duration,
    /// Rules settings.
    pub game: GameConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_queue: 256,
            outbound_queue: 64,
            idle_timeout: Duration::from_secs(10 * 60),
            game: GameConfig::default(),
        }
    }
}

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No live session and no snapshot for this id.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Snapshot could not be written or read.
    #[error("Snapshot store error: {0}")]
    Store(#[from] StoreError),

    /// The actor stopped before accepting the command.
    #[error("Session actor stopped")]
    ActorGone,
}

/// Work items for a session actor.
#[derive(Debug)]
pub enum SessionCommand {
    /// A socket attached.
    Connect {
        /// Connection id.
        conn_id: ConnectionId,
        /// Outbound queue of the socket.
        sender: OutboundSender,
        /// Answered once the socket is registered and has its state.
        ack: oneshot::Sender<()>,
    },
    /// A socket's transport closed.
    Disconnect {
        /// Connection id.
        conn_id: ConnectionId,
    },
    /// Text frame received from a socket.
    Inbound {
        /// Connection id.
        conn_id: ConnectionId,
        /// Raw frame.
        text: String,
    },
    /// Server answer timer elapsed.
    TimerFired {
        /// Team the timer was armed for.
        team: Team,
        /// Lock token at arming time.
        token: u64,
    },
}

/// Cloneable address of a session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Enqueue a command.
    pub async fn send(&self, command: SessionCommand) -> Result<(), SendError<SessionCommand>> {
        self.tx.send(command).await
    }

    /// Forward a text frame from a socket.
    pub async fn inbound(&self, conn_id: ConnectionId, text: String) -> Result<(), SessionError> {
        self.send(SessionCommand::Inbound { conn_id, text })
            .await
            .map_err(|_| SessionError::ActorGone)
    }

    /// Report a closed socket. Ignored if the actor already stopped.
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        let _ = self.send(SessionCommand::Disconnect { conn_id }).await;
    }
}

// =============================================================================
// ACTOR
// =============================================================================

/// Owner of one session's state and sockets.
pub struct SessionActor {
    game: Game,
    registry: ConnectionRegistry,
    store: Arc<dyn SnapshotStore>,
    commands: mpsc::Receiver<SessionCommand>,
    /// Weak so that pending timers do not keep the actor alive.
    timer_tx: mpsc::WeakSender<SessionCommand>,
    timer: Option<JoinHandle<()>>,
    idle_timeout: Duration,
    /// Last snapshot write failed.
    dirty: bool,
}

impl SessionActor {
    /// Start an actor task for `game` and return its handle.
    pub fn spawn(game: Game, store: Arc<dyn SnapshotStore>, config: &SessionConfig) -> SessionHandle {
        let (tx, rx) = mpsc::channel(config.command_queue);
        let id = game.state().session_id.clone();

        let mut actor = SessionActor {
            game,
            registry: ConnectionRegistry::new(),
            store,
            commands: rx,
            timer_tx: tx.downgrade(),
            timer: None,
            idle_timeout: config.idle_timeout,
            dirty: false,
        };
        if let Some((team, remaining_ms)) = actor.game.resume_lock(clock::now_ms()) {
            info!(session = %id, %team, remaining_ms, "resuming buzzer timer from snapshot");
            actor.arm_timer(team, Duration::from_millis(remaining_ms));
        }
        tokio::spawn(actor.run());

        SessionHandle { id, tx }
    }

    async fn run(mut self) {
        let session = self.game.state().session_id.clone();
        debug!(%session, "session actor started");

        loop {
            let next = if self.registry.is_empty() {
                match tokio::time::timeout(self.idle_timeout, self.commands.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        info!(%session, "session idle, evicting");
                        break;
                    }
                }
            } else {
                self.commands.recv().await
            };

            match next {
                Some(command) => self.handle(command),
                None => break,
            }
        }

        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if self.dirty {
            self.persist();
        }

        // Connects still queued lose their ack and retry against a restored actor
        self.commands.close();
        let mut dropped = 0usize;
        while self.commands.try_recv().is_ok() {
            dropped += 1;
        }
        debug!(%session, dropped, "session actor stopped");
    }

    /// Single entry point for every command.
    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect { conn_id, sender, ack } => {
                self.registry.register(conn_id, sender);
                self.registry.send_to(conn_id, ServerMessage::state(self.game.state()));
                let _ = ack.send(());
                debug!(connection = conn_id, sockets = self.registry.len(), "socket attached");
            }
            SessionCommand::Disconnect { conn_id } => {
                if self.registry.remove(conn_id) {
                    debug!(connection = conn_id, sockets = self.registry.len(), "socket detached");
                }
            }
            SessionCommand::Inbound { conn_id, .. } if !self.registry.contains(conn_id) => {
                debug!(connection = conn_id, "frame from detached socket dropped");
            }
            SessionCommand::Inbound { conn_id, text } => match ClientMessage::parse(&text) {
                Ok(Some(message)) => self.dispatch(conn_id, message),
                Ok(None) => debug!(connection = conn_id, "unknown message type ignored"),
                Err(e) => {
                    debug!(connection = conn_id, error = %e, "malformed message");
                    self.registry.send_to(conn_id, ServerMessage::error(MALFORMED_MESSAGE));
                }
            },
            SessionCommand::TimerFired { team, token } => {
                let transition = self.game.expire_timer(team, token, clock::now_ms());
                self.apply(transition);
            }
        }
    }

    fn dispatch(&mut self, conn_id: ConnectionId, message: ClientMessage) {
        let now = clock::now_ms();
        let transition = match message {
            ClientMessage::Join { role, team } => {
                self.registry.join(conn_id, role, team);
                self.registry.send_to(conn_id, ServerMessage::state(self.game.state()));
                return;
            }
            ClientMessage::Ping => {
                self.registry.send_to(conn_id, ServerMessage::state(self.game.state()));
                return;
            }
            ClientMessage::BuzzRequest { team } => self.game.buzz(team, now),
            ClientMessage::SubmitAnswer { team, answer } => self.game.submit_answer(team, &answer, now),
            ClientMessage::StartGame => self.game.start_game(now),
            ClientMessage::SelectCell { cell_id } => self.game.select_cell(&cell_id, now),
            ClientMessage::MarkCorrect => self.game.mark_correct(now),
            ClientMessage::MarkWrong => self.game.mark_wrong(now),
            ClientMessage::NewQuestion => self.game.new_question(now),
            ClientMessage::ResetBuzzer => self.game.reset_buzzer(now),
            ClientMessage::ToggleAutoJudge => self.game.toggle_auto_judge(now),
            ClientMessage::TimerExpired { team } => self.game.expire(team, now),
        };

        if !transition.changed && transition.events.is_empty() {
            debug!(connection = conn_id, "command ignored");
        }
        self.apply(transition);
    }

    /// Persist, then broadcast events and the new state.
    fn apply(&mut self, transition: Transition) {
        if transition.changed {
            self.persist();
        }

        for event in transition.events {
            self.registry.broadcast(&ServerMessage::from(event));
        }

        if transition.changed {
            self.registry.broadcast(&ServerMessage::state(self.game.state()));
        }

        if let Some(team) = transition.arm_timer {
            let delay = Duration::from_millis(self.game.config().timer_deadline_ms());
            self.arm_timer(team, delay);
        }
    }

    fn persist(&mut self) {
        match self.store.save(self.game.state()) {
            Ok(()) => self.dirty = false,
            Err(e) => {
                error!(session = %self.game.state().session_id, error = %e, "failed to persist snapshot");
                self.dirty = true;
            }
        }
    }

    fn arm_timer(&mut self, team: Team, delay: Duration) {
        if let Some(previous) = self.timer.take() {
            previous.abort();
        }

        let token = self.game.lock_token();
        let tx = self.timer_tx.clone();

        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(SessionCommand::TimerFired { team, token }).await;
            }
        }));
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Directory of live session actors.
pub struct SessionManager {
    /// Live actors by id.
    sessions: RwLock<BTreeMap<SessionId, SessionHandle>>,
    store: Arc<dyn SnapshotStore>,
    bank: Arc<QuestionBank>,
    config: SessionConfig,
}

impl SessionManager {
    /// Create a manager persisting through `store`.
    pub fn new(store: Arc<dyn SnapshotStore>, bank: Arc<QuestionBank>, config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            store,
            bank,
            config,
        }
    }

    /// Create a lobby session, persist it and start its actor.
    ///
    /// Fails without registering anything if the first snapshot cannot be
    /// written.
    pub async fn create_session(&self, match_wins: Option<MatchWins>) -> Result<SessionId, SessionError> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut game = Game::new(
            id.clone(),
            self.config.game.clone(),
            self.bank.clone(),
            GameRng::from_entropy(),
            clock::now_ms(),
        );
        if let Some(wins) = match_wins {
            game.seed_match_wins(wins);
        }

        self.store.save(game.state())?;

        let handle = SessionActor::spawn(game, self.store.clone(), &self.config);
        self.sessions.write().await.insert(id.clone(), handle);

        info!(session = %id, ?match_wins, "session created");
        Ok(id)
    }

    /// Live handle for `id`, restoring the session from its snapshot if
    /// its actor is not running.
    pub async fn get_or_restore(&self, id: &str) -> Result<SessionHandle, SessionError> {
        if let Some(handle) = self.live(id).await {
            return Ok(handle);
        }

        let state = match self.store.load(id) {
            Ok(Some(state)) => state,
            Ok(None) | Err(StoreError::InvalidId(_)) => return Err(SessionError::NotFound(id.to_string())),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = self.sessions.write().await;
        // Another connection may have restored it meanwhile
        if let Some(handle) = sessions.get(id).filter(|h| !h.is_closed()) {
            return Ok(handle.clone());
        }

        let game = Game::restore(state, self.config.game.clone(), self.bank.clone(), GameRng::from_entropy());
        let handle = SessionActor::spawn(game, self.store.clone(), &self.config);
        sessions.insert(id.to_string(), handle.clone());

        info!(session = %id, "session restored from snapshot");
        Ok(handle)
    }

    /// Attach a socket to session `id`.
    ///
    /// Returns once the actor has registered the socket and queued its
    /// state. Retries once if the actor stopped before doing so.
    pub async fn connect(
        &self,
        id: &str,
        conn_id: ConnectionId,
        sender: OutboundSender,
    ) -> Result<SessionHandle, SessionError> {
        for _ in 0..2 {
            let handle = self.get_or_restore(id).await?;
            let (ack, registered) = oneshot::channel();
            let command = SessionCommand::Connect {
                conn_id,
                sender: sender.clone(),
                ack,
            };
            if handle.send(command).await.is_ok() && registered.await.is_ok() {
                return Ok(handle);
            }
            warn!(session = %id, "actor stopped during connect, retrying");
        }

        Err(SessionError::ActorGone)
    }

    async fn live(&self, id: &str) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions.get(id).filter(|h| !h.is_closed()).cloned()
    }

    /// Number of running actors.
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.values().filter(|h| !h.is_closed()).count()
    }

    /// Drop handles of stopped actors. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| !handle.is_closed());
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "stopped sessions cleaned up");
        }
        removed
    }
}

// =============================================================================
// TESTS
// =============================================================================
