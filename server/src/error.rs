//! Error taxonomy for the game server
//!
//! Errors are grouped by how the server reacts to them:
//! - [`ProtocolError`] drops the offending connection
//! - [`CapacityError`] rejects a join but keeps the connection open
//! - [`TransportError`] is treated as an implicit quit
//! - [`ConfigError`] and [`ServerError`] are fatal at startup
//!
//! The simulation itself has no recoverable error path; broken invariants panic.

use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unexpected message: {0}")]
    Unexpected(&'static str),
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("server full")]
    ServerFull,
    #[error("no free letter")]
    NoFreeLetter,
    #[error("no free cell")]
    NoFreeCell,
    #[error("no free bot id")]
    NoFreeBotId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    #[error("restart not allowed while other players are alive")]
    RestartNotAllowed,
    #[error("unknown session {0}")]
    UnknownSession(char),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("send timed out")]
    SendTimeout,
    #[error("game loop is no longer running")]
    ServerGone,
}

/// Anything that ends a single client connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<std::io::Error> for ConnectionError {
    fn from(e: std::io::Error) -> Self {
        ConnectionError::Transport(TransportError::Io(e))
    }
}

impl From<serde_json::Error> for ConnectionError {
    fn from(e: serde_json::Error) -> Self {
        ConnectionError::Protocol(ProtocolError::Malformed(e))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("game speed must be a positive finite number, got {0}")]
    GameSpeed(f64),
    #[error("game speed {speed} puts the tick interval outside {min:?} to {max:?}")]
    TickInterval {
        speed: f64,
        min: std::time::Duration,
        max: std::time::Duration,
    },
    #[error("at most {max} bots are supported, got {bots}")]
    TooManyBots { bots: usize, max: usize },
    #[error("bot level must be within 0-9, got {0}")]
    BotLevel(u8),
    #[error("board {axis} must be within {min}-{max}, got {value}")]
    BoardDimension {
        axis: &'static str,
        min: i32,
        max: i32,
        value: i32,
    },
    #[error("food count must be at least 1")]
    NoFood,
    #[error("{bots} bots and {food} food do not fit on a {cells}-cell board")]
    Overcrowded { bots: usize, food: usize, cells: usize },
    #[error("invalid host address '{0}'")]
    Host(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("game loop stopped: {0}")]
    GameLoop(#[from] tokio::task::JoinError),
}
