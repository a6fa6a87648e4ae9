//! Board Generation
//!
//! Builds the hex grid: letter distribution, placement and adjacency.
//!
//! The layout is pointy-top with odd rows shifted right, so the relative
//! neighbour offsets depend on row parity. Adjacency is stored as cell ids
//! rather than references; lookups go through the flat board.

use crate::core::rng::GameRng;
use crate::game::state::{cell_id, Cell};

/// Default board edge length.
pub const DEFAULT_GRID_SIZE: usize = 6;

/// How many times placement is reshuffled to break up same-row duplicates.
pub const MAX_RESHUFFLES: usize = 10;

/// Neighbour offsets `(d_row, d_col)` for even rows.
const EVEN_ROW_OFFSETS: [(isize, isize); 6] = [(-1, -1), (-1, 0), (0, -1), (0, 1), (1, -1), (1, 0)];

/// Neighbour offsets `(d_row, d_col)` for odd rows.
const ODD_ROW_OFFSETS: [(isize, isize); 6] = [(-1, 0), (-1, 1), (0, -1), (0, 1), (1, 0), (1, 1)];

/// Generate a `size × size` board.
///
/// Every letter in `letters` is used either `n` or `n + 1` times, where
/// `n = size² / letters.len()`; which letters get the extra copy is random.
/// Placement is a uniform shuffle, retried up to [`MAX_RESHUFFLES`] times
/// while two equal letters sit side by side in a row. The layout with the
/// fewest such pairs wins; zero is not guaranteed.
pub fn generate_board(size: usize, letters: &[String], rng: &mut GameRng) -> Vec<Cell> {
    let pool = letter_pool(size * size, letters, rng);
    let placement = place_letters(size, pool, rng);

    let mut cells: Vec<Cell> = placement
        .into_iter()
        .enumerate()
        .map(|(i, letter)| Cell::new(i / size, i % size, letter))
        .collect();

    for cell in &mut cells {
        if let Some((row, col)) = cell.coords() {
            cell.neighbors = neighbor_ids(size, row, col);
        }
    }

    cells
}

/// Multiset of letters for `total` cells, as even as possible.
fn letter_pool(total: usize, letters: &[String], rng: &mut GameRng) -> Vec<String> {
    if letters.is_empty() {
        return vec![String::new(); total];
    }

    let base = total / letters.len();
    let remainder = total % letters.len();

    let mut order: Vec<&String> = letters.iter().collect();
    rng.shuffle(&mut order);

    let mut pool = Vec::with_capacity(total);
    for (index, letter) in order.into_iter().enumerate() {
        let count = base + usize::from(index < remainder);
        pool.extend(std::iter::repeat(letter.clone()).take(count));
    }
    pool
}

/// Shuffle the pool into grid order, keeping the best of several tries.
fn place_letters(size: usize, mut pool: Vec<String>, rng: &mut GameRng) -> Vec<String> {
    rng.shuffle(&mut pool);
    let mut best_score = row_duplicates(size, &pool);
    let mut best = pool.clone();

    for _ in 0..MAX_RESHUFFLES {
        if best_score == 0 {
            break;
        }
        rng.shuffle(&mut pool);
        let score = row_duplicates(size, &pool);
        if score < best_score {
            best_score = score;
            best = pool.clone();
        }
    }

    best
}

/// Count horizontally adjacent equal letters in row-major order.
pub fn row_duplicates(size: usize, letters: &[String]) -> usize {
    if size == 0 {
        return 0;
    }
    (1..letters.len())
        .filter(|&i| i % size != 0 && letters[i] == letters[i - 1])
        .count()
}

/// In-bounds neighbour ids of `(row, col)`.
pub fn neighbor_ids(size: usize, row: usize, col: usize) -> Vec<String> {
    let offsets = if row % 2 == 0 { &EVEN_ROW_OFFSETS } else { &ODD_ROW_OFFSETS };

    offsets
        .iter()
        .filter_map(|&(dr, dc)| {
            let r = row.checked_add_signed(dr)?;
            let c = col.checked_add_signed(dc)?;
            (r < size && c < size).then(|| cell_id(r, c))
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
