//! Round Rules
//!
//! The session state machine with everything except I/O: board setup,
//! cell selection, buzzer arbitration, answer adjudication and win checks.
//! Every command returns a [`Transition`]; an ignored command leaves the
//! state untouched.
//!
//! ## Buzzer stages
//!
//! ```text
//!   unlocked/first ──buzz(A)──▶ locked(A)/first
//!   locked(A)/first ──fail──▶ unlocked/other   (only B may buzz)
//!   unlocked/other ──buzz(B)──▶ locked(B)/other
//!   locked(B)/other ──fail──▶ question closed, turn → A
//!   locked(X)/*     ──correct──▶ cell owned by X, turn → X
//! ```
//!
//! A failure is either an expired timer or the host marking the answer
//! wrong; both run the same transition.

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::clock;
use crate::core::rng::GameRng;
use crate::game::board::{generate_board, DEFAULT_GRID_SIZE};
use crate::game::events::{GameEvent, Transition};
use crate::game::judge;
use crate::game::questions::{QuestionBank, QuestionHistory};
use crate::game::state::{BuzzerState, MatchWins, SessionState, SessionStatus, Stage, Team};
use crate::game::win::check_win;

/// Nominal answer countdown.
pub const DEFAULT_TIMER_MS: u64 = 10_000;

/// Extra time before the server timer fires, so a last-moment answer wins.
pub const DEFAULT_TIMER_GRACE_MS: u64 = 500;

/// Tunables for one session's rules.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Board edge length.
    pub grid_size: usize,
    /// Answer countdown announced to clients.
    pub timer_ms: u64,
    /// Server-side slack added to the countdown.
    pub timer_grace_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            timer_ms: DEFAULT_TIMER_MS,
            timer_grace_ms: DEFAULT_TIMER_GRACE_MS,
        }
    }
}

impl GameConfig {
    /// Delay after which the server timer expires a buzzer lock.
    pub fn timer_deadline_ms(&self) -> u64 {
        self.timer_ms + self.timer_grace_ms
    }
}

/// One session's game: state plus the resources the rules need.
pub struct Game {
    state: SessionState,
    config: GameConfig,
    bank: Arc<QuestionBank>,
    history: QuestionHistory,
    rng: GameRng,
    /// Bumped on every buzzer lock change; timers carry the value they
    /// were armed with.
    lock_token: u64,
}

impl Game {
    /// New lobby-state game with a freshly generated board.
    pub fn new(
        session_id: impl Into<String>,
        config: GameConfig,
        bank: Arc<QuestionBank>,
        mut rng: GameRng,
        now_ms: i64,
    ) -> Self {
        let board = generate_board(config.grid_size, &bank.letters(), &mut rng);
        let state = SessionState::new(session_id, board, now_ms);
        Self::restore(state, config, bank, rng)
    }

    /// Wrap a previously persisted state.
    ///
    /// Question history is not persisted, so a restored game may repeat
    /// questions already seen on a cell.
    pub fn restore(state: SessionState, config: GameConfig, bank: Arc<QuestionBank>, rng: GameRng) -> Self {
        Self {
            state,
            config,
            bank,
            history: QuestionHistory::default(),
            rng,
            lock_token: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Rules configuration.
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Token identifying the current buzzer lock.
    pub fn lock_token(&self) -> u64 {
        self.lock_token
    }

    /// Whether a timer armed for `team` with `token` still guards the live lock.
    pub fn is_current_lock(&self, team: Team, token: u64) -> bool {
        token == self.lock_token && self.state.buzzer.locked && self.state.buzzer.locked_by == Some(team)
    }

    /// Take over a buzzer lock carried in a restored snapshot.
    ///
    /// Issues a fresh lock token and returns the locked team with the
    /// milliseconds left on its server timer, or `None` if the buzzer is
    /// free. A snapshot without `timerStart` gets the full deadline.
    pub fn resume_lock(&mut self, now_ms: i64) -> Option<(Team, u64)> {
        if !self.state.buzzer.locked {
            return None;
        }
        let team = self.state.buzzer.locked_by?;
        let started = self.state.buzzer.timer_start.unwrap_or(now_ms);
        let deadline = started.saturating_add(self.config.timer_deadline_ms() as i64);
        let remaining = deadline.saturating_sub(now_ms).max(0) as u64;

        self.lock_token += 1;
        Some((team, remaining))
    }

    /// Seed the session-wide win tally (creation with carried-over wins).
    pub fn seed_match_wins(&mut self, wins: MatchWins) {
        self.state.match_wins = wins;
    }

    // =========================================================================
    // HOST COMMANDS
    // =========================================================================

    /// Start (or restart) a round.
    ///
    /// Builds a new board, keeps the win tally and auto-judge mode, and
    /// opens a random cell with its first question.
    pub fn start_game(&mut self, now_ms: i64) -> Transition {
        self.history.clear();

        let board = generate_board(self.config.grid_size, &self.bank.letters(), &mut self.rng);
        let mut fresh = SessionState::new(self.state.session_id.clone(), board, now_ms);
        fresh.match_wins = self.state.match_wins;
        fresh.auto_judge = self.state.auto_judge;
        fresh.status = SessionStatus::Playing;
        fresh.updated_at = clock::bump(self.state.updated_at, now_ms);
        self.state = fresh;
        self.release_lock();

        let mut events = Vec::new();
        if let Some(cell) = self.rng.choose(&self.state.board).cloned() {
            if let Some(question) = self.history.pick(&self.bank, &cell.id, &cell.letter, &mut self.rng) {
                self.state.active_cell_id = Some(cell.id.clone());
                self.state.active_question = Some(question.clone());
                events.push(GameEvent::QuestionChanged {
                    cell_id: cell.id,
                    question,
                });
            }
        }

        info!(
            session = %self.state.session_id,
            active = ?self.state.active_cell_id,
            "round started"
        );
        Transition::with_events(events)
    }

    /// Make `cell_id` the active cell and issue a question for it.
    ///
    /// Ignored unless playing, the cell is open, and no other cell is
    /// already active. Re-selecting the active cell draws a new question.
    pub fn select_cell(&mut self, cell_id: &str, now_ms: i64) -> Transition {
        if self.state.status != SessionStatus::Playing {
            return Transition::ignored();
        }
        let letter = match self.state.cell(cell_id) {
            Some(cell) if cell.is_open() => cell.letter.clone(),
            _ => return Transition::ignored(),
        };
        if matches!(&self.state.active_cell_id, Some(active) if active != cell_id) {
            return Transition::ignored();
        }
        let Some(question) = self.history.pick(&self.bank, cell_id, &letter, &mut self.rng) else {
            debug!(cell_id, letter, "no question for letter");
            return Transition::ignored();
        };

        self.state.active_cell_id = Some(cell_id.to_string());
        self.state.active_question = Some(question.clone());
        self.state.reset_attempts();
        self.release_lock();
        self.touch(now_ms);

        Transition::with_events(vec![GameEvent::QuestionChanged {
            cell_id: cell_id.to_string(),
            question,
        }])
    }

    /// Replace the active cell's question. Ownership is untouched.
    pub fn new_question(&mut self, now_ms: i64) -> Transition {
        let Some(cell_id) = self.state.active_cell_id.clone() else {
            return Transition::ignored();
        };
        let Some(letter) = self.state.cell(&cell_id).map(|c| c.letter.clone()) else {
            return Transition::ignored();
        };
        let Some(question) = self.history.pick(&self.bank, &cell_id, &letter, &mut self.rng) else {
            return Transition::ignored();
        };

        self.state.active_question = Some(question.clone());
        self.state.buzzer = BuzzerState::unlocked();
        self.release_lock();
        self.touch(now_ms);

        Transition::with_events(vec![GameEvent::QuestionChanged { cell_id, question }])
    }

    /// Release the buzzer and let both teams buzz again.
    pub fn reset_buzzer(&mut self, now_ms: i64) -> Transition {
        self.state.buzzer = BuzzerState::unlocked();
        self.state.allowed_buzz_teams = Team::ALL.to_vec();
        self.release_lock();
        self.touch(now_ms);
        Transition::with_events(vec![GameEvent::BuzzReset])
    }

    /// Flip auto-judge mode.
    pub fn toggle_auto_judge(&mut self, now_ms: i64) -> Transition {
        self.state.auto_judge = !self.state.auto_judge;
        self.touch(now_ms);
        Transition::changed()
    }

    /// Host accepts the locked team's answer.
    pub fn mark_correct(&mut self, now_ms: i64) -> Transition {
        let Some(team) = self.state.buzzer.locked_by else {
            return Transition::ignored();
        };
        self.award_active_cell(team, now_ms)
    }

    /// Host rejects the current answer. Same transition as a timeout.
    ///
    /// The failing team is the one holding the buzzer, or the team whose
    /// turn it is when nobody buzzed.
    pub fn mark_wrong(&mut self, now_ms: i64) -> Transition {
        if self.state.active_cell_id.is_none() {
            return Transition::ignored();
        }
        let failing = self.state.buzzer.locked_by.unwrap_or(self.state.current_team_turn);
        self.fail_attempt(failing, now_ms)
    }

    // =========================================================================
    // BUZZER COMMANDS
    // =========================================================================

    /// A team presses its buzzer.
    pub fn buzz(&mut self, team: Team, now_ms: i64) -> Transition {
        if self.state.status != SessionStatus::Playing
            || self.state.active_cell_id.is_none()
            || self.state.buzzer.locked
            || !self.state.may_buzz(team)
        {
            return Transition::ignored();
        }

        self.state.buzzer = BuzzerState::lock(team, now_ms);
        self.lock_token += 1;
        self.touch(now_ms);

        Transition {
            changed: true,
            events: vec![
                GameEvent::BuzzLocked { team },
                GameEvent::TimerStarted {
                    team,
                    duration_ms: self.config.timer_ms,
                },
            ],
            arm_timer: Some(team),
        }
    }

    /// Answer time for `team` ran out (client report or server timer).
    ///
    /// Ignored unless `team` still holds the buzzer.
    pub fn expire(&mut self, team: Team, now_ms: i64) -> Transition {
        if !self.state.buzzer.locked || self.state.buzzer.locked_by != Some(team) {
            return Transition::ignored();
        }
        self.fail_attempt(team, now_ms)
    }

    /// Server timer fired for a lock identified by `token`.
    pub fn expire_timer(&mut self, team: Team, token: u64, now_ms: i64) -> Transition {
        if !self.is_current_lock(team, token) {
            debug!(%team, token, current = self.lock_token, "stale timer ignored");
            return Transition::ignored();
        }
        self.fail_attempt(team, now_ms)
    }

    /// The locked team submits an answer.
    ///
    /// Always reports the verdict. With auto-judge on, a correct answer
    /// wins the cell and a wrong one counts as a failed attempt.
    pub fn submit_answer(&mut self, team: Team, answer: &str, now_ms: i64) -> Transition {
        if self.state.status != SessionStatus::Playing || self.state.buzzer.locked_by != Some(team) {
            return Transition::ignored();
        }
        let Some(question) = self.state.active_question.as_ref() else {
            return Transition::ignored();
        };

        let correct = judge::is_correct(answer, &question.answer);
        let mut transition = Transition {
            changed: false,
            events: vec![GameEvent::AnswerJudged {
                team,
                answer: answer.to_string(),
                correct,
                correct_answer: question.answer.clone(),
            }],
            arm_timer: None,
        };

        if self.state.auto_judge {
            let outcome = if correct {
                self.award_active_cell(team, now_ms)
            } else {
                self.fail_attempt(team, now_ms)
            };
            transition.merge(outcome);
        }

        transition
    }

    // =========================================================================
    // SHARED TRANSITIONS
    // =========================================================================

    /// Give the active cell to `team`, then check for a win.
    fn award_active_cell(&mut self, team: Team, now_ms: i64) -> Transition {
        let Some(cell_id) = self.state.active_cell_id.clone() else {
            return Transition::ignored();
        };
        let Some(cell) = self.state.cell_mut(&cell_id) else {
            return Transition::ignored();
        };
        if cell.closed {
            return Transition::ignored();
        }
        cell.owner = Some(team);
        cell.closed = true;

        let mut events = vec![GameEvent::CellOwned {
            cell_id: cell_id.clone(),
            team,
        }];

        if check_win(&self.state.board, self.config.grid_size, team) {
            self.state.status = SessionStatus::Ended;
            self.state.winner = Some(team);
            self.state.match_wins.record(team);
            events.push(GameEvent::GameEnded { winner: team });
            info!(
                session = %self.state.session_id,
                winner = %team,
                tally = ?self.state.match_wins,
                "round won"
            );
        }

        self.state.current_team_turn = team;
        self.state.clear_question();
        self.release_lock();
        self.touch(now_ms);

        Transition::with_events(events)
    }

    /// `failing` missed the question.
    fn fail_attempt(&mut self, failing: Team, now_ms: i64) -> Transition {
        let next_team = match self.state.stage {
            Stage::First => {
                let other = failing.other();
                self.state.stage = Stage::Other;
                self.state.attempt_no = 2;
                self.state.buzzer = BuzzerState::unlocked();
                self.state.allowed_buzz_teams = vec![other];
                Some(other)
            }
            Stage::Other => {
                self.state.clear_question();
                self.state.current_team_turn = failing.other();
                None
            }
        };
        self.release_lock();
        self.touch(now_ms);

        Transition::with_events(vec![GameEvent::TimerExpired { next_team }])
    }

    /// Invalidate any timer armed for the previous lock.
    fn release_lock(&mut self) {
        self.lock_token += 1;
    }

    fn touch(&mut self, now_ms: i64) {
        self.state.updated_at = clock::bump(self.state.updated_at, now_ms);
    }
}

// =============================================================================
// TESTS
// =============================================================================
