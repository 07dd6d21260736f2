//! Authoritative game state: world, sessions, phase and tick counter
//!
//! [`Game`] is plain synchronous state. The tick scheduler owns it exclusively
//! and is the only caller of its mutating methods.

use crate::bot;
use crate::config::GameConfig;
use crate::entity::{Controller, SnakeId, World};
use crate::error::SessionError;
use crate::grid::{self, TickEvent};
use crate::rng::GameRng;
use crate::session_manager::{Assignment, SessionManager};
use log::info;
use shared::{Direction, WorldSnapshot};
use std::collections::BTreeMap;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    GameOver,
}

#[derive(Debug)]
pub struct Game {
    world: World,
    sessions: SessionManager,
    rng: GameRng,
    phase: Phase,
    tick: u64,
}

impl Game {
    /// Builds the opening world: bots and food placed, no humans yet
    pub fn new(config: &GameConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => GameRng::new(seed),
            None => GameRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    pub fn with_rng(config: &GameConfig, mut rng: GameRng) -> Self {
        let mut world = World::new(config.board, config.food);
        let sessions = SessionManager::new(config.bots, config.bot_level);
        sessions.spawn_bots(&mut world, &mut rng);
        world.replenish_food(&mut rng);
        info!(
            "World {}x{} ready with {} bots and {} food (seed {})",
            config.board.width,
            config.board.height,
            config.bots,
            world.food().len(),
            rng.seed()
        );

        let mut game = Self {
            world,
            sessions,
            rng,
            phase: Phase::GameOver,
            tick: 0,
        };
        game.update_phase();
        game
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn join(
        &mut self,
        preferred: Option<char>,
        peer: SocketAddr,
    ) -> Result<Assignment, SessionError> {
        self.sessions
            .join(&mut self.world, &mut self.rng, preferred, peer)
    }

    pub fn leave(&mut self, letter: char) {
        self.sessions.leave(&mut self.world, letter);
    }

    pub fn submit_direction(&mut self, letter: char, direction: Direction) {
        self.sessions
            .submit_direction(&mut self.world, letter, direction);
    }

    /// Resets the round. The phase is Running again immediately.
    pub fn restart(&mut self, letter: char) -> Result<(), SessionError> {
        self.sessions
            .restart(&mut self.world, &mut self.rng, letter)?;
        self.update_phase();
        Ok(())
    }

    /// Runs one tick. Nothing moves while the game is over.
    pub fn step(&mut self) -> Vec<TickEvent> {
        self.tick += 1;
        // Joins and leaves since the last tick take effect at this boundary
        self.update_phase();

        let events = match self.phase {
            Phase::Running => {
                let moves = self.collect_moves();
                let events = grid::advance(&mut self.world, &moves, &mut self.rng);
                self.world.assert_invariants();
                events
            }
            Phase::GameOver => Vec::new(),
        };

        self.update_phase();
        events
    }

    /// Pending human input plus a fresh decision for every alive bot
    fn collect_moves(&mut self) -> BTreeMap<SnakeId, Direction> {
        let mut moves = BTreeMap::new();
        for snake in self.world.snakes_mut() {
            if let Some(dir) = snake.pending.take() {
                moves.insert(snake.id, dir);
            }
        }

        for snake in self.world.snakes().filter(|s| s.alive) {
            if let Controller::Bot { level } = snake.controller {
                let dir = bot::decide(snake, &self.world, level, &mut self.rng);
                moves.insert(snake.id, dir);
            }
        }
        moves
    }

    fn update_phase(&mut self) {
        let next = if self.world.is_game_over() {
            Phase::GameOver
        } else {
            Phase::Running
        };
        if next != self.phase {
            info!("Tick {}: {:?} -> {:?}", self.tick, self.phase, next);
            self.phase = next;
        }
    }

    /// Highest-scoring human, lowest letter on ties
    fn winner(&self) -> Option<char> {
        self.world
            .snakes()
            .filter_map(|s| Some((s.letter()?, s.score)))
            .fold(None, |best, (letter, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((letter, score)),
            })
            .map(|(letter, _)| letter)
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        let game_over = self.phase == Phase::GameOver;
        WorldSnapshot {
            tick: self.tick,
            board: self.world.board(),
            snakes: self.world.snakes().map(|s| s.view()).collect(),
            food: self.world.food().to_vec(),
            game_over,
            winner: if game_over { self.winner() } else { None },
        }
    }
}
