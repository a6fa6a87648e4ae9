//! Game Logic Module
//!
//! Everything about a Huruf round that does not touch the network.
//!
//! ## Module Structure
//!
//! - `state`: Session state, cells, buzzer and tallies (wire/snapshot shape)
//! - `board`: Board generation and hex adjacency
//! - `win`: Edge-to-edge connection check
//! - `judge`: Tolerant answer matching
//! - `questions`: Question bank and per-cell history
//! - `rules`: The session state machine
//! - `events`: Discrete events emitted by transitions

pub mod board;
pub mod events;
pub mod judge;
pub mod questions;
pub mod rules;
pub mod state;
pub mod win;

// Re-export key types
pub use events::{GameEvent, Transition};
pub use questions::{QuestionBank, QuestionHistory};
pub use rules::{Game, GameConfig};
pub use state::{Cell, MatchWins, Question, SessionState, SessionStatus, Stage, Team};
