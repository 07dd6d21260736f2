//! Fixed-rate tick loop
//!
//! The scheduler owns the [`Game`] outright. Connections talk to it through a
//! bounded command channel and read the latest serialized snapshot from a watch
//! channel, so a slow client only ever skips snapshots and never stalls a tick.

use crate::error::SessionError;
use crate::game::Game;
use crate::grid::TickEvent;
use crate::session_manager::Assignment;
use log::{debug, error, info};
use shared::{encode_line, Direction, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};

/// Ticks between periodic status lines
const STATUS_EVERY: u64 = 60;

/// Requests from connection tasks to the game loop
#[derive(Debug)]
pub enum GameCommand {
    Join {
        letter: Option<char>,
        peer: SocketAddr,
        reply: oneshot::Sender<Result<Assignment, SessionError>>,
    },
    Move {
        letter: char,
        direction: Direction,
    },
    Restart {
        letter: char,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Leave {
        letter: char,
    },
}

/// Latest `state` line, newline included
pub type SnapshotLine = Arc<str>;

pub struct TickScheduler {
    game: Game,
    period: Duration,
    commands: mpsc::Receiver<GameCommand>,
    snapshots: watch::Sender<SnapshotLine>,
}

impl TickScheduler {
    pub fn new(game: Game, period: Duration, commands: mpsc::Receiver<GameCommand>) -> Self {
        let (snapshots, _) = watch::channel(render(&game));
        Self {
            game,
            period,
            commands,
            snapshots,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SnapshotLine> {
        self.snapshots.subscribe()
    }

    /// Runs until every command sender is gone
    pub async fn run(mut self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        ticker.tick().await;
        info!("Tick loop running every {:?}", self.period);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if process_game_command(&mut self.game, command) {
                            self.publish();
                        }
                    }
                    None => {
                        info!("Command channel closed, stopping tick loop");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    let events = self.game.step();
                    self.publish();
                    self.log_tick(&events);
                }
            }
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(render(&self.game));
    }

    fn log_tick(&self, events: &[TickEvent]) {
        let tick = self.game.tick();
        if !events.is_empty() {
            debug!("Tick {}: {} events", tick, events.len());
        }
        if tick % STATUS_EVERY == 0 {
            let world = self.game.world();
            debug!(
                "Tick {}: {:?}, {} sessions, {} snakes alive",
                tick,
                self.game.phase(),
                self.game.sessions().len(),
                world.snakes().filter(|s| s.alive).count()
            );
        }
    }
}

/// Applies a command to the game. Returns true when the change should be
/// broadcast right away instead of waiting for the next tick.
pub fn process_game_command(game: &mut Game, command: GameCommand) -> bool {
    match command {
        GameCommand::Join {
            letter,
            peer,
            reply,
        } => {
            let result = game.join(letter, peer);
            // The connection may already be gone; its leave follows shortly
            let _ = reply.send(result);
            false
        }
        GameCommand::Move { letter, direction } => {
            game.submit_direction(letter, direction);
            false
        }
        GameCommand::Restart { letter, reply } => {
            let result = game.restart(letter);
            let restarted = result.is_ok();
            let _ = reply.send(result);
            restarted
        }
        GameCommand::Leave { letter } => {
            game.leave(letter);
            false
        }
    }
}

fn render(game: &Game) -> SnapshotLine {
    match encode_line(&ServerMessage::State(game.snapshot())) {
        Ok(line) => Arc::from(line),
        Err(e) => {
            error!("Failed to encode snapshot: {}", e);
            Arc::from("")
        }
    }
}
