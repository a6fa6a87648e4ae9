//! Game Events
//!
//! Discrete happenings emitted by the rules engine alongside each state
//! change. The network layer forwards them to clients before the full
//! state snapshot.

use serde::{Deserialize, Serialize};

use crate::game::state::{Question, Team};

/// Event produced by a successful transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    /// A team took the buzzer.
    BuzzLocked {
        /// Team holding the buzzer.
        team: Team,
    },

    /// Buzzer was manually released.
    BuzzReset,

    /// A new question is live for a cell.
    QuestionChanged {
        /// Cell being played.
        cell_id: String,
        /// The question.
        question: Question,
    },

    /// A cell was won.
    CellOwned {
        /// Cell id.
        cell_id: String,
        /// New owner.
        team: Team,
    },

    /// A team completed its connection.
    GameEnded {
        /// Round winner.
        winner: Team,
    },

    /// Answer countdown started for a team.
    TimerStarted {
        /// Team answering.
        team: Team,
        /// Nominal countdown length.
        duration_ms: u64,
    },

    /// Answer time ran out, or the host marked the answer wrong.
    TimerExpired {
        /// Team that now gets a chance, `None` when the question closed.
        next_team: Option<Team>,
    },

    /// A submitted answer was judged.
    AnswerJudged {
        /// Submitting team.
        team: Team,
        /// Submitted text.
        answer: String,
        /// Judge verdict.
        correct: bool,
        /// Canonical answer.
        correct_answer: String,
    },
}

/// Outcome of handling one command.
///
/// `changed` is false for ignored commands: nothing is persisted or
/// broadcast in that case.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transition {
    /// Whether the session state was mutated.
    pub changed: bool,
    /// Events to broadcast, in order.
    pub events: Vec<GameEvent>,
    /// Team whose answer timer must be (re)armed.
    pub arm_timer: Option<Team>,
}

impl Transition {
    /// Command was ignored.
    pub fn ignored() -> Self {
        Self::default()
    }

    /// State changed with no discrete events.
    pub fn changed() -> Self {
        Self {
            changed: true,
            ..Self::default()
        }
    }

    /// State changed with the given events.
    pub fn with_events(events: Vec<GameEvent>) -> Self {
        Self {
            changed: true,
            events,
            arm_timer: None,
        }
    }

    /// Append another transition's effects.
    pub fn merge(&mut self, other: Transition) {
        self.changed |= other.changed;
        self.events.extend(other.events);
        if other.arm_timer.is_some() {
            self.arm_timer = other.arm_timer;
        }
    }
}
