//! Question Bank
//!
//! Static, read-only questions keyed by letter, plus the per-cell history
//! that keeps a cell from repeating a question until its letter's pool is
//! exhausted.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::rng::GameRng;
use crate::game::state::Question;

/// Bank shipped with the binary.
const EMBEDDED_BANK: &str = include_str!("../../data/questions.ar.json");

/// One bank entry. The letter comes from the map key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankEntry {
    /// Stable identifier, unique within a letter.
    pub id: String,
    /// Question text.
    pub prompt: String,
    /// Canonical answer.
    pub answer: String,
}

/// Errors loading a question bank.
#[derive(Debug, thiserror::Error)]
pub enum BankError {
    /// Bank file could not be read.
    #[error("failed to read question bank: {0}")]
    Io(#[from] std::io::Error),

    /// Bank JSON is invalid.
    #[error("invalid question bank: {0}")]
    Parse(#[from] serde_json::Error),

    /// Bank has no usable questions.
    #[error("question bank is empty")]
    Empty,
}

/// Questions grouped by letter.
#[derive(Clone, Debug, Default)]
pub struct QuestionBank {
    by_letter: BTreeMap<String, Vec<BankEntry>>,
}

impl QuestionBank {
    /// Parse a bank from JSON (`{"letter": [{id, prompt, answer}, ...]}`).
    ///
    /// Letters with no questions are dropped.
    pub fn from_json(json: &str) -> Result<Self, BankError> {
        let mut by_letter: BTreeMap<String, Vec<BankEntry>> = serde_json::from_str(json)?;
        by_letter.retain(|_, entries| !entries.is_empty());
        if by_letter.is_empty() {
            return Err(BankError::Empty);
        }
        Ok(Self { by_letter })
    }

    /// Load a bank from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BankError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// The bank compiled into the binary.
    pub fn embedded() -> Self {
        Self::from_json(EMBEDDED_BANK).unwrap_or_default()
    }

    /// Letters that have at least one question, used as the board pool.
    pub fn letters(&self) -> Vec<String> {
        self.by_letter.keys().cloned().collect()
    }

    /// Questions for a letter.
    pub fn entries(&self, letter: &str) -> &[BankEntry] {
        self.by_letter.get(letter).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total question count.
    pub fn len(&self) -> usize {
        self.by_letter.values().map(Vec::len).sum()
    }

    /// Whether the bank has no questions.
    pub fn is_empty(&self) -> bool {
        self.by_letter.is_empty()
    }
}

/// Question ids already shown per cell during the current round.
#[derive(Clone, Debug, Default)]
pub struct QuestionHistory {
    used: BTreeMap<String, Vec<String>>,
}

impl QuestionHistory {
    /// Forget everything (new round).
    pub fn clear(&mut self) {
        self.used.clear();
    }

    /// Pick a question for `cell_id` from its letter's pool.
    ///
    /// Unused questions are preferred; once all were shown the cell's
    /// history starts over. `None` if the letter has no questions.
    pub fn pick(
        &mut self,
        bank: &QuestionBank,
        cell_id: &str,
        letter: &str,
        rng: &mut GameRng,
    ) -> Option<Question> {
        let all = bank.entries(letter);
        if all.is_empty() {
            return None;
        }

        let used = self.used.entry(cell_id.to_string()).or_default();
        let mut candidates: Vec<&BankEntry> = all.iter().filter(|q| !used.contains(&q.id)).collect();
        if candidates.is_empty() {
            used.clear();
            candidates = all.iter().collect();
        }

        let next = *rng.choose(&candidates)?;
        used.push(next.id.clone());

        Some(Question {
            id: next.id.clone(),
            letter: letter.to_string(),
            prompt: next.prompt.clone(),
            answer: next.answer.clone(),
        })
    }

    /// Ids shown for a cell so far.
    pub fn used_for(&self, cell_id: &str) -> &[String] {
        self.used.get(cell_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

// =============================================================================
// TESTS
// =============================================================================
