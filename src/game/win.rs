//! Win Detection
//!
//! Breadth-first search over team-owned cells. Green wins by linking the
//! top row to the bottom row, red by linking the left column to the right
//! column. The search is rerun from scratch after every ownership change;
//! boards are small enough that this never matters.

use std::collections::{BTreeSet, VecDeque};

use crate::game::state::{find_cell, parse_cell_id, Cell, Team};

/// Whether `team` owns a connected chain between its two edges.
pub fn check_win(board: &[Cell], size: usize, team: Team) -> bool {
    if size == 0 {
        return false;
    }

    let owned_by_team = |cell: &Cell| cell.owner == Some(team);

    let mut visited: BTreeSet<&str> = BTreeSet::new();
    let mut queue: VecDeque<&Cell> = VecDeque::new();

    // Seed from every owned cell on the starting edge
    for cell in board.iter().filter(|c| owned_by_team(c)) {
        if let Some((row, col)) = parse_cell_id(&cell.id) {
            if on_start_edge(team, row, col) {
                visited.insert(cell.id.as_str());
                queue.push_back(cell);
            }
        }
    }

    while let Some(cell) = queue.pop_front() {
        if let Some((row, col)) = parse_cell_id(&cell.id) {
            if on_goal_edge(team, size, row, col) {
                return true;
            }
        }

        for neighbor_id in &cell.neighbors {
            let Some(neighbor) = find_cell(board, size, neighbor_id) else {
                continue;
            };
            if owned_by_team(neighbor) && visited.insert(neighbor.id.as_str()) {
                queue.push_back(neighbor);
            }
        }
    }

    false
}

#[inline]
fn on_start_edge(team: Team, row: usize, col: usize) -> bool {
    match team {
        Team::Green => row == 0,
        Team::Red => col == 0,
    }
}

#[inline]
fn on_goal_edge(team: Team, size: usize, row: usize, col: usize) -> bool {
    match team {
        Team::Green => row == size - 1,
        Team::Red => col == size - 1,
    }
}

// =============================================================================
// TESTS
// =============================================================================
