//! Client-side view of the latest snapshot

use shared::WorldSnapshot;

/// What the player cares about between snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
struct Status {
    alive: bool,
    score: u32,
    game_over: bool,
    winner: Option<char>,
}

/// Tracks the latest snapshot for one player and reports changes worth printing
#[derive(Debug)]
pub struct ClientGameState {
    letter: char,
    latest: Option<WorldSnapshot>,
    status: Option<Status>,
}

impl ClientGameState {
    pub fn new(letter: char) -> Self {
        Self {
            letter,
            latest: None,
            status: None,
        }
    }

    pub fn latest(&self) -> Option<&WorldSnapshot> {
        self.latest.as_ref()
    }

    /// Stores a snapshot. Returns a status line when the player's situation changed.
    pub fn apply(&mut self, snapshot: WorldSnapshot) -> Option<String> {
        let id = self.letter.to_string();
        let me = snapshot.snake(&id);
        let status = Status {
            alive: me.map_or(false, |s| s.alive),
            score: me.map_or(0, |s| s.score),
            game_over: snapshot.game_over,
            winner: snapshot.winner,
        };

        let line = (self.status.as_ref() != Some(&status)).then(|| self.describe(&snapshot, &status));
        self.status = Some(status);
        self.latest = Some(snapshot);
        line
    }

    fn describe(&self, snapshot: &WorldSnapshot, status: &Status) -> String {
        let alive = snapshot.snakes.iter().filter(|s| s.alive).count();
        let mut line = format!(
            "tick {} | {} {} | score {} | {} snakes alive",
            snapshot.tick,
            self.letter,
            if status.alive { "alive" } else { "dead" },
            status.score,
            alive
        );
        if status.game_over {
            match status.winner {
                Some(winner) => line.push_str(&format!(" | game over, winner {}", winner)),
                None => line.push_str(" | game over"),
            }
        }
        line
    }
}
