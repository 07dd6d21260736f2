//! # Snake Arena Client Library
//!
//! Headless terminal client for the snake arena server. It finds a server on
//! the local network through UDP discovery (or dials a given address), joins
//! with an optional letter, forwards typed commands and reports changes in the
//! player's situation as snapshots arrive.
//!
//! ## Modules
//!
//! - [`network`]: discovery plus the JSON line connection, split into a
//!   reader and a writer so both can be driven from one `select!` loop
//! - [`input`]: maps terminal lines to protocol messages
//! - [`game`]: keeps the latest snapshot and summarises what changed
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{discover, Connection};
//! use shared::{ClientMessage, Direction, DISCOVERY_PORT};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let addr = discover(DISCOVERY_PORT).await?;
//!     let mut connection = Connection::join(addr, Some('A')).await?;
//!     connection
//!         .writer
//!         .send(&ClientMessage::Move { dir: Direction::Up })
//!         .await?;
//!     while let Some(message) = connection.reader.recv().await? {
//!         println!("{:?}", message);
//!     }
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
