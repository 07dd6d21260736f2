//! Player sessions and the letter pool
//!
//! Every connected human owns exactly one session, keyed by its letter. The
//! session outlives its snake: a dead snake keeps the letter until the player
//! leaves or the game restarts. Bots have no session and are spawned from the
//! configured roster.

use crate::entity::{letter_color, Controller, SnakeId, World};
use crate::error::{CapacityError, SessionError};
use crate::rng::GameRng;
use log::{info, warn};
use shared::{Direction, Rgb};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;

/// One session per letter A-Z
pub const MAX_SESSIONS: usize = 26;

/// Letter and color handed to a newly joined player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub letter: char,
    pub color: Rgb,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub letter: char,
    pub peer: SocketAddr,
    pub joined_at: Instant,
}

/// Accepts a single ASCII letter in either case
pub fn normalize_letter(proposed: &str) -> Option<char> {
    let mut chars = proposed.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Some(c.to_ascii_uppercase()),
        _ => None,
    }
}

#[derive(Debug)]
pub struct SessionManager {
    sessions: BTreeMap<char, Session>,
    bots: usize,
    bot_level: u8,
}

impl SessionManager {
    pub fn new(bots: usize, bot_level: u8) -> Self {
        Self {
            sessions: BTreeMap::new(),
            bots,
            bot_level,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, letter: char) -> bool {
        self.sessions.contains_key(&letter)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Opens a session and spawns its snake.
    ///
    /// `preferred` is honoured when free, otherwise the lowest free letter is used.
    pub fn join(
        &mut self,
        world: &mut World,
        rng: &mut GameRng,
        preferred: Option<char>,
        peer: SocketAddr,
    ) -> Result<Assignment, SessionError> {
        let letter = self.free_letter(preferred)?;
        let id = world.spawn(Controller::Human, Some(letter), rng)?;
        // Every human snake belongs to a session, so a free session letter is free in the world
        debug_assert_eq!(id, SnakeId::Player(letter));

        self.sessions.insert(
            letter,
            Session {
                letter,
                peer,
                joined_at: Instant::now(),
            },
        );
        info!("Player {} joined from {} ({} sessions)", letter, peer, self.len());

        Ok(Assignment {
            letter,
            color: letter_color(letter),
        })
    }

    /// Closes a session and removes its snake. Returns false for unknown letters.
    pub fn leave(&mut self, world: &mut World, letter: char) -> bool {
        let Some(session) = self.sessions.remove(&letter) else {
            return false;
        };
        world.remove(SnakeId::Player(letter));
        info!(
            "Player {} left after {:.1}s ({} sessions)",
            letter,
            session.joined_at.elapsed().as_secs_f32(),
            self.len()
        );
        true
    }

    /// Queues a direction for the player's snake; applied at the next tick
    pub fn submit_direction(&self, world: &mut World, letter: char, direction: Direction) {
        if self.contains(letter) {
            world.set_direction(SnakeId::Player(letter), direction);
        }
    }

    /// Allowed for any session while no other human snake is alive
    pub fn can_restart(&self, world: &World, letter: char) -> Result<(), SessionError> {
        if !self.contains(letter) {
            return Err(SessionError::UnknownSession(letter));
        }
        let others_alive = world
            .snakes()
            .any(|s| s.alive && s.is_human() && s.letter() != Some(letter));
        if others_alive {
            return Err(SessionError::RestartNotAllowed);
        }
        Ok(())
    }

    /// Replaces the board with a fresh snake for every session plus the bot roster.
    /// On error the current world is left as it was.
    pub fn restart(
        &self,
        world: &mut World,
        rng: &mut GameRng,
        letter: char,
    ) -> Result<(), SessionError> {
        self.can_restart(world, letter)?;

        let mut fresh = World::new(world.board(), world.food_target());
        for &letter in self.sessions.keys() {
            fresh.spawn(Controller::Human, Some(letter), rng)?;
        }
        self.spawn_bots(&mut fresh, rng);
        fresh.replenish_food(rng);
        *world = fresh;

        info!("Player {} restarted the game", letter);
        Ok(())
    }

    /// Fills the board with the configured bots
    pub fn spawn_bots(&self, world: &mut World, rng: &mut GameRng) {
        let controller = Controller::Bot {
            level: self.bot_level,
        };
        for _ in 0..self.bots {
            if let Err(e) = world.spawn(controller, None, rng) {
                warn!("Could not spawn bot: {}", e);
                break;
            }
        }
    }

    fn free_letter(&self, preferred: Option<char>) -> Result<char, CapacityError> {
        if self.sessions.len() >= MAX_SESSIONS {
            return Err(CapacityError::ServerFull);
        }
        if let Some(letter) = preferred.filter(|l| l.is_ascii_uppercase()) {
            if !self.contains(letter) {
                return Ok(letter);
            }
        }
        ('A'..='Z')
            .find(|l| !self.contains(*l))
            .ok_or(CapacityError::ServerFull)
    }
}
