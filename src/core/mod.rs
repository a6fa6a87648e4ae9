//! Core primitives shared by the game and network layers.

pub mod clock;
pub mod rng;

// Re-export core types
pub use clock::now_ms;
pub use rng::GameRng;
