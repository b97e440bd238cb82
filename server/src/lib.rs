//! # Race Lobby Server Library
//!
//! This library coordinates one shared race for a small group of players. It
//! owns who is connected, which colour each player drives, the ready check,
//! the countdown, and the final standings. The race itself is simulated by
//! the clients; the server only decides when it starts and in which order
//! players finished, and relays positions between them.
//!
//! ## Session Phases
//!
//! The session cycles `LOBBY -> COUNTDOWN -> RACING -> LOBBY`:
//! - In the lobby, players mark themselves ready. Once every player is
//!   ready, a three-tick countdown starts.
//! - After the last tick the race starts and the start instant is recorded.
//! - Each `finish` is timed against the start. When every racer has finished
//!   the ranked results are broadcast and everyone returns to the lobby.
//! - When the last player leaves, the session resets to an empty lobby,
//!   cancelling any countdown in flight.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Event Loop
//! Connections never touch session state directly. They push
//! [`session::SessionEvent`]s onto one queue which the coordinator drains
//! one at a time, so all invariants hold without locks.
//!
//! ### Best-Effort Broadcast
//! Outbound messages go into per-connection bounded queues without blocking.
//! A slow or dead connection loses messages; nobody else waits for it.
//!
//! ## Module Organization
//!
//! - `color`: palette assignment with a random fallback
//! - `registry`: connected players and their per-race state
//! - `broadcast`: fan-out with per-recipient failure isolation
//! - `session`: the lobby state machine and its event loop
//! - `network`: WebSocket and HTTP transport
//! - `config`: command-line configuration
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod color;
pub mod config;
pub mod error;
pub mod network;
pub mod registry;
pub mod session;
