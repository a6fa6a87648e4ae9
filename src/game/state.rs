//! Session State Definitions
//!
//! The authoritative, fully serializable state of one Huruf session.
//! The same shape is broadcast in `SESSION_STATE` and written to the
//! snapshot store, so every field uses the camelCase wire names.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// TEAM
// =============================================================================

/// One of the two competing teams.
///
/// Green connects the top row to the bottom row; red connects the left
/// column to the right column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    /// Top-to-bottom team. Always opens a round.
    Green,
    /// Left-to-right team.
    Red,
}

impl Team {
    /// Both teams, in turn order.
    pub const ALL: [Team; 2] = [Team::Green, Team::Red];

    /// The opposing team.
    #[inline]
    pub fn other(self) -> Team {
        match self {
            Team::Green => Team::Red,
            Team::Red => Team::Green,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Team::Green => "green",
            Team::Red => "red",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// PHASES
// =============================================================================

/// Session lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, no round started yet.
    #[default]
    Lobby,
    /// A round is in progress.
    Playing,
    /// A team completed its connection.
    Ended,
}

/// How many teams have already failed the current question.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Nobody has failed yet.
    #[default]
    First,
    /// One team failed; the other gets its chance.
    #[serde(alias = "final")]
    Other,
}

// =============================================================================
// BOARD
// =============================================================================

/// One hex on the board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Grid coordinate, `"{row}-{col}"`.
    pub id: String,
    /// Letter whose questions this cell draws from.
    pub letter: String,
    /// Team that won the cell.
    pub owner: Option<Team>,
    /// Closed cells can no longer be selected.
    pub closed: bool,
    /// Ids of adjacent cells.
    pub neighbors: Vec<String>,
}

impl Cell {
    /// Create an open, unowned cell with no neighbours yet.
    pub fn new(row: usize, col: usize, letter: impl Into<String>) -> Self {
        Self {
            id: cell_id(row, col),
            letter: letter.into(),
            owner: None,
            closed: false,
            neighbors: Vec::new(),
        }
    }

    /// Parse `(row, col)` back out of the id.
    pub fn coords(&self) -> Option<(usize, usize)> {
        parse_cell_id(&self.id)
    }

    /// Whether the cell can still be played.
    #[inline]
    pub fn is_open(&self) -> bool {
        !self.closed
    }
}

/// Format a grid coordinate as a cell id.
pub fn cell_id(row: usize, col: usize) -> String {
    format!("{}-{}", row, col)
}

/// Parse a `"{row}-{col}"` cell id.
pub fn parse_cell_id(id: &str) -> Option<(usize, usize)> {
    let (row, col) = id.split_once('-')?;
    Some((row.parse().ok()?, col.parse().ok()?))
}

/// Index of cell `id` in a row-major board of edge `size`.
pub fn board_index(size: usize, id: &str) -> Option<usize> {
    let (row, col) = parse_cell_id(id)?;
    (row < size && col < size).then_some(row * size + col)
}

/// Edge length of a square board with `cells` cells.
pub fn board_edge(cells: usize) -> usize {
    (0..=cells).take_while(|n| n * n <= cells).last().unwrap_or(0)
}

/// Cell `id` of a row-major board, looked up by index.
pub fn find_cell<'a>(board: &'a [Cell], size: usize, id: &str) -> Option<&'a Cell> {
    board_index(size, id)
        .and_then(|i| board.get(i))
        .filter(|cell| cell.id == id)
}

/// A question drawn from the bank for a specific letter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Bank identifier.
    pub id: String,
    /// Letter the answer starts with.
    pub letter: String,
    /// Text shown to players.
    pub prompt: String,
    /// Canonical answer.
    pub answer: String,
}

// =============================================================================
// BUZZER
// =============================================================================

/// Buzzer lock.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuzzerState {
    /// Whether a team currently holds the buzzer.
    pub locked: bool,
    /// Team holding the buzzer.
    pub locked_by: Option<Team>,
    /// Unix ms when the lock was taken.
    #[serde(default)]
    pub timer_start: Option<i64>,
}

impl BuzzerState {
    /// Lock the buzzer for `team`.
    pub fn lock(team: Team, now_ms: i64) -> Self {
        Self {
            locked: true,
            locked_by: Some(team),
            timer_start: Some(now_ms),
        }
    }

    /// Unlocked buzzer.
    pub fn unlocked() -> Self {
        Self::default()
    }
}

/// Rounds won per team across the whole session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchWins {
    /// Green's round wins.
    #[serde(default)]
    pub green: u32,
    /// Red's round wins.
    #[serde(default)]
    pub red: u32,
}

impl MatchWins {
    /// Tally for a team.
    pub fn get(&self, team: Team) -> u32 {
        match team {
            Team::Green => self.green,
            Team::Red => self.red,
        }
    }

    /// Record a round win.
    pub fn record(&mut self, team: Team) {
        match team {
            Team::Green => self.green += 1,
            Team::Red => self.red += 1,
        }
    }
}

// =============================================================================
// SESSION STATE
// =============================================================================

fn default_auto_judge() -> bool {
    true
}

fn default_attempt_no() -> u8 {
    1
}

fn default_allowed_buzz_teams() -> Vec<Team> {
    Team::ALL.to_vec()
}

/// Complete state of a session.
///
/// Fields added after the first snapshot format carry serde defaults so
/// older snapshots still load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Opaque session identifier.
    pub session_id: String,
    /// Lifecycle phase.
    pub status: SessionStatus,
    /// Cells in row-major order.
    pub board: Vec<Cell>,
    /// Team whose turn it is to pick.
    pub current_team_turn: Team,
    /// Cell being played.
    pub active_cell_id: Option<String>,
    /// Question for the active cell.
    pub active_question: Option<Question>,
    /// Buzzer lock.
    pub buzzer: BuzzerState,
    /// 1 before any failure on the current question, 2 after.
    #[serde(default = "default_attempt_no")]
    pub attempt_no: u8,
    /// Failure stage of the current question.
    #[serde(default)]
    pub stage: Stage,
    /// Teams still allowed to buzz on the current question.
    #[serde(default = "default_allowed_buzz_teams")]
    pub allowed_buzz_teams: Vec<Team>,
    /// Round winner, set once the round ended.
    pub winner: Option<Team>,
    /// Session-wide round tally.
    #[serde(default)]
    pub match_wins: MatchWins,
    /// Whether submitted answers resolve the question automatically.
    #[serde(default = "default_auto_judge")]
    pub auto_judge: bool,
    /// Unix ms of the last mutation.
    pub updated_at: i64,
}

impl SessionState {
    /// Fresh lobby state around an already generated board.
    pub fn new(session_id: impl Into<String>, board: Vec<Cell>, now_ms: i64) -> Self {
        Self {
            session_id: session_id.into(),
            status: SessionStatus::Lobby,
            board,
            current_team_turn: Team::Green,
            active_cell_id: None,
            active_question: None,
            buzzer: BuzzerState::unlocked(),
            attempt_no: 1,
            stage: Stage::First,
            allowed_buzz_teams: default_allowed_buzz_teams(),
            winner: None,
            match_wins: MatchWins::default(),
            auto_judge: true,
            updated_at: now_ms,
        }
    }

    /// Look up a cell by id.
    pub fn cell(&self, id: &str) -> Option<&Cell> {
        self.position(id).map(|i| &self.board[i])
    }

    /// Mutable lookup by id.
    pub fn cell_mut(&mut self, id: &str) -> Option<&mut Cell> {
        self.position(id).map(|i| &mut self.board[i])
    }

    /// Board index of `id`. Snapshots whose board is not in row-major
    /// order fall back to a scan.
    fn position(&self, id: &str) -> Option<usize> {
        board_index(board_edge(self.board.len()), id)
            .filter(|&i| self.board.get(i).is_some_and(|c| c.id == id))
            .or_else(|| self.board.iter().position(|c| c.id == id))
    }

    /// Whether `team` may take the buzzer on the current question.
    pub fn may_buzz(&self, team: Team) -> bool {
        self.allowed_buzz_teams.contains(&team)
    }

    /// Reset everything tied to the current question.
    pub fn clear_question(&mut self) {
        self.active_cell_id = None;
        self.active_question = None;
        self.reset_attempts();
    }

    /// Back to first attempt with both teams allowed to buzz.
    pub fn reset_attempts(&mut self) {
        self.buzzer = BuzzerState::unlocked();
        self.attempt_no = 1;
        self.stage = Stage::First;
        self.allowed_buzz_teams = default_allowed_buzz_teams();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_other() {
        assert_eq!(Team::Green.other(), Team::Red);
        assert_eq!(Team::Red.other(), Team::Green);
    }

    #[test]
    fn test_cell_id_roundtrip() {
        let cell = Cell::new(3, 5, "ب");
        assert_eq!(cell.id, "3-5");
        assert_eq!(cell.coords(), Some((3, 5)));
        assert_eq!(parse_cell_id("x-1"), None);
        assert_eq!(parse_cell_id("12"), None);
    }

    #[test]
    fn test_board_index_lookup() {
        let board: Vec<Cell> = (0..3)
            .flat_map(|row| (0..3).map(move |col| Cell::new(row, col, "ا")))
            .collect();

        assert_eq!(board_edge(board.len()), 3);
        assert_eq!(board_edge(0), 0);
        assert_eq!(board_index(3, "2-1"), Some(7));
        assert_eq!(board_index(3, "3-0"), None);
        assert_eq!(find_cell(&board, 3, "1-2").map(|c| c.id.as_str()), Some("1-2"));

        let mut state = SessionState::new("s", board, 0);
        state.cell_mut("2-2").unwrap().closed = true;
        assert!(state.cell("2-2").unwrap().closed);
        assert!(state.cell("9-9").is_none());

        // Out-of-order boards still resolve
        state.board.reverse();
        assert_eq!(state.cell("0-1").unwrap().id, "0-1");
    }

    #[test]
    fn test_wire_names() {
        let state = SessionState::new("abc", vec![Cell::new(0, 0, "ا")], 10);
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["sessionId"], "abc");
        assert_eq!(json["status"], "lobby");
        assert_eq!(json["currentTeamTurn"], "green");
        assert_eq!(json["buzzer"]["lockedBy"], serde_json::Value::Null);
        assert_eq!(json["matchWins"]["green"], 0);
        assert_eq!(json["autoJudge"], true);
        assert_eq!(json["stage"], "first");
    }

    #[test]
    fn test_legacy_stage_final_reads_as_other() {
        let stage: Stage = serde_json::from_str("\"final\"").unwrap();
        assert_eq!(stage, Stage::Other);
    }

    #[test]
    fn test_match_wins_record() {
        let mut wins = MatchWins::default();
        wins.record(Team::Red);
        wins.record(Team::Red);
        assert_eq!(wins.get(Team::Red), 2);
        assert_eq!(wins.get(Team::Green), 0);
    }

    #[test]
    fn test_buzz_permissions_reset() {
        let mut state = SessionState::new("s", Vec::new(), 0);
        state.allowed_buzz_teams = vec![Team::Red];
        state.stage = Stage::Other;
        assert!(!state.may_buzz(Team::Green));

        state.reset_attempts();
        assert!(state.may_buzz(Team::Green));
        assert_eq!(state.stage, Stage::First);
    }
}
