//! Network Layer
//!
//! HTTP creation endpoint, WebSocket transport and per-session actors.
//! All game rules run through `game/`; this layer only routes and persists.

pub mod auth;
pub mod http;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use auth::{AuthConfig, AuthError, CreationGuard, JwtGuard, OpenGuard};
pub use protocol::{ClientMessage, ProtocolError, Role, ServerMessage};
pub use registry::{ConnectionId, ConnectionRegistry, Outbound};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use session::{SessionConfig, SessionError, SessionHandle, SessionId, SessionManager};
