//! # Huruf Session Server
//!
//! Authoritative real-time server for Huruf, a two-team letter-grid quiz
//! played on a hex board.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    HURUF SESSION SERVER                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── rng.rs      - Seedable Xorshift128+ PRNG                │
//! │  └── clock.rs    - Monotonic millisecond timestamps          │
//! │                                                              │
//! │  game/           - Game rules (no I/O)                       │
//! │  ├── state.rs    - Session state and wire shape              │
//! │  ├── board.rs    - Board generation, hex adjacency           │
//! │  ├── win.rs      - Edge-to-edge connection check             │
//! │  ├── judge.rs    - Tolerant answer matching                  │
//! │  ├── questions.rs- Question bank and history                 │
//! │  ├── events.rs   - Transition events                         │
//! │  └── rules.rs    - Session state machine                     │
//! │                                                              │
//! │  store/          - Snapshot persistence                      │
//! │  ├── file.rs     - One JSON file per session                 │
//! │  └── memory.rs   - In-process store                          │
//! │                                                              │
//! │  network/        - Transport                                 │
//! │  ├── protocol.rs - Client/server messages                    │
//! │  ├── registry.rs - Per-session connections, broadcast        │
//! │  ├── session.rs  - Session actors and manager                │
//! │  ├── auth.rs     - Creation guard (JWT)                      │
//! │  ├── http.rs     - Session creation endpoint                 │
//! │  └── server.rs   - Listeners and socket lifecycle            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering Guarantee
//!
//! Each session is owned by a single actor task. Commands for a session
//! are applied one at a time, every mutation is snapshotted before it is
//! broadcast, and timers carry a lock token so a stale expiry can never
//! touch a newer buzz.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use core::rng::GameRng;
pub use game::rules::{Game, GameConfig};
pub use game::state::{MatchWins, SessionState, Team};
pub use network::server::{GameServer, ServerConfig};
pub use network::session::SessionManager;
pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
