//! # Snake Arena Server Library
//!
//! Authoritative server for a multiplayer snake game played on a grid. Humans
//! connect over TCP, steer their snake with newline-delimited JSON commands and
//! receive a full world snapshot after every tick. Computer-controlled snakes
//! share the board with them.
//!
//! ## Architecture
//!
//! A single tick task owns the whole game state. Connection tasks never touch
//! it directly: they send [`scheduler::GameCommand`]s over a bounded channel
//! and read the latest serialized snapshot from a watch channel. Each tick
//! therefore sees a consistent world, and a slow client can only fall behind
//! on its own connection.
//!
//! ```text
//!  client ──TCP──> receive loop ──GameCommand──> tick scheduler ──> Game
//!  client <──TCP── send loop <──── snapshot (watch) ────┘
//! ```
//!
//! ## Modules
//!
//! - [`grid`]: movement and collision rules for one tick
//! - [`entity`]: snakes, food and the [`entity::World`] that holds them
//! - [`bot`]: direction choice for computer-controlled snakes
//! - [`session_manager`]: letters, joins, leaves and restarts
//! - [`game`]: world plus sessions plus the running/game-over phase
//! - [`scheduler`]: the fixed-rate tick loop
//! - [`network`]: TCP listener and per-connection routines
//! - [`discovery`]: UDP responder so clients can find the server on a LAN
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::GameConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GameConfig {
//!         bots: 3,
//!         ..GameConfig::default()
//!     };
//!     let server = Server::bind(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod discovery;
pub mod entity;
pub mod error;
pub mod game;
pub mod grid;
pub mod network;
pub mod rng;
pub mod scheduler;
pub mod session_manager;
