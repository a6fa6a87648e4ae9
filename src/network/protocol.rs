//! Protocol Messages
//!
//! JSON wire format for the WebSocket channel. Every message is an object
//! with a `type` tag in SCREAMING_SNAKE_CASE and camelCase fields.
//!
//! Older host displays prefix host commands with `MAIN_` and identify as
//! `main`/`mobile`; both spellings are accepted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::game::events::GameEvent;
use crate::game::state::{Question, SessionState, Team};

/// Text sent to a client whose message could not be parsed.
pub const MALFORMED_MESSAGE: &str = "Malformed event payload";

/// Text sent to a buzzer device that was replaced by a newer one.
pub const REPLACED_NOTICE: &str = "تم استبدال هذا الجهاز بجهاز آخر لنفس الفريق.";

/// Close code for a replaced buzzer device.
pub const REPLACED_CLOSE_CODE: u16 = 4001;

/// Close reason for a replaced buzzer device.
pub const REPLACED_CLOSE_REASON: &str = "Replaced by newer device";

/// Tags this server understands. Anything else is ignored.
const KNOWN_TAGS: &[&str] = &[
    "JOIN",
    "BUZZ_REQUEST",
    "SUBMIT_ANSWER",
    "START_GAME",
    "SELECT_CELL",
    "MARK_CORRECT",
    "MARK_WRONG",
    "NEW_QUESTION",
    "RESET_BUZZER",
    "TOGGLE_AUTO_JUDGE",
    "TIMER_EXPIRED",
    "PING",
    "MAIN_START_GAME",
    "MAIN_SELECT_CELL",
    "MAIN_MARK_CORRECT",
    "MAIN_MARK_WRONG",
    "MAIN_NEW_QUESTION",
    "MAIN_RESET_BUZZER",
    "MAIN_TOGGLE_AUTO_JUDGE",
];

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// What a connection is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The shared display that runs the game.
    #[serde(alias = "main")]
    Host,
    /// A team's buzzer device.
    #[serde(alias = "mobile")]
    Buzzer,
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Declare this connection's role (and team for buzzers).
    Join {
        /// Connection role.
        role: Role,
        /// Team, required for buzzers to be distinguishable.
        #[serde(default)]
        team: Option<Team>,
    },

    /// A team pressed its buzzer.
    BuzzRequest {
        /// Buzzing team.
        team: Team,
    },

    /// The locked team typed an answer.
    SubmitAnswer {
        /// Answering team.
        team: Team,
        /// Raw answer text.
        answer: String,
    },

    /// Start or restart a round.
    #[serde(alias = "MAIN_START_GAME")]
    StartGame,

    /// Play a cell.
    #[serde(alias = "MAIN_SELECT_CELL", rename_all = "camelCase")]
    SelectCell {
        /// Target cell.
        cell_id: String,
    },

    /// Host accepts the answer.
    #[serde(alias = "MAIN_MARK_CORRECT")]
    MarkCorrect,

    /// Host rejects the answer.
    #[serde(alias = "MAIN_MARK_WRONG")]
    MarkWrong,

    /// Draw another question for the active cell.
    #[serde(alias = "MAIN_NEW_QUESTION")]
    NewQuestion,

    /// Release the buzzer.
    #[serde(alias = "MAIN_RESET_BUZZER")]
    ResetBuzzer,

    /// Flip auto-judge mode.
    #[serde(alias = "MAIN_TOGGLE_AUTO_JUDGE")]
    ToggleAutoJudge,

    /// Client-side countdown for `team` ran out.
    TimerExpired {
        /// Team whose time ran out.
        team: Team,
    },

    /// Request a fresh state snapshot.
    Ping,
}

/// Inbound parse failures. The sender gets an `ERROR` reply.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Payload is not JSON.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    /// JSON object without a string `type`.
    #[error("message has no type tag")]
    MissingType,

    /// Known tag with fields of the wrong shape.
    #[error("invalid {tag} payload: {source}")]
    InvalidPayload {
        /// Message tag.
        tag: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

impl ClientMessage {
    /// Parse one inbound text frame.
    ///
    /// Returns `Ok(None)` for well-formed messages with an unknown tag.
    pub fn parse(text: &str) -> Result<Option<Self>, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        if !KNOWN_TAGS.contains(&tag.as_str()) {
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|source| ProtocolError::InvalidPayload { tag, source })
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Full state snapshot.
    SessionState {
        /// Current state.
        state: Box<SessionState>,
    },

    /// A team took the buzzer.
    BuzzLocked {
        /// Locking team.
        team: Team,
    },

    /// Buzzer released by the host.
    BuzzReset,

    /// New question for a cell.
    #[serde(rename_all = "camelCase")]
    QuestionChanged {
        /// Cell being played.
        cell_id: String,
        /// Issued question.
        question: Question,
    },

    /// Cell won by a team.
    #[serde(rename_all = "camelCase")]
    CellOwned {
        /// Cell id.
        cell_id: String,
        /// New owner.
        team: Team,
    },

    /// Round over.
    GameEnded {
        /// Winning team.
        winner: Team,
    },

    /// Answer countdown started.
    #[serde(rename_all = "camelCase")]
    TimerStart {
        /// Answering team.
        team: Team,
        /// Countdown length.
        duration_ms: u64,
    },

    /// Answer attempt failed.
    #[serde(rename_all = "camelCase")]
    TimerExpiredServer {
        /// Team that may buzz next, `null` once the question closed.
        next_team: Option<Team>,
    },

    /// Verdict on a submitted answer.
    #[serde(rename_all = "camelCase")]
    AnswerResult {
        /// Submitting team.
        team: Team,
        /// Submitted text.
        answer: String,
        /// Whether it was accepted.
        correct: bool,
        /// Canonical answer.
        correct_answer: String,
    },

    /// Something went wrong for this connection.
    Error {
        /// Human-readable message.
        message: String,
    },
}

impl ServerMessage {
    /// Snapshot message for a state.
    pub fn state(state: &SessionState) -> Self {
        ServerMessage::SessionState {
            state: Box::new(state.clone()),
        }
    }

    /// Error message.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl From<GameEvent> for ServerMessage {
    fn from(event: GameEvent) -> Self {
        match event {
            GameEvent::BuzzLocked { team } => ServerMessage::BuzzLocked { team },
            GameEvent::BuzzReset => ServerMessage::BuzzReset,
            GameEvent::QuestionChanged { cell_id, question } => {
                ServerMessage::QuestionChanged { cell_id, question }
            }
            GameEvent::CellOwned { cell_id, team } => ServerMessage::CellOwned { cell_id, team },
            GameEvent::GameEnded { winner } => ServerMessage::GameEnded { winner },
            GameEvent::TimerStarted { team, duration_ms } => ServerMessage::TimerStart { team, duration_ms },
            GameEvent::TimerExpired { next_team } => ServerMessage::TimerExpiredServer { next_team },
            GameEvent::AnswerJudged {
                team,
                answer,
                correct,
                correct_answer,
            } => ServerMessage::AnswerResult {
                team,
                answer,
                correct,
                correct_answer,
            },
        }
    }
}
