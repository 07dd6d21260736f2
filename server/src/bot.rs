//! Direction choice for bot snakes
//!
//! A bot at level `L` moves greedily toward the nearest food with probability
//! `L / 9` and otherwise picks uniformly among moves that do not hit a wall or
//! a body on the very next step.

use crate::entity::{Snake, World};
use crate::rng::GameRng;
use shared::{Cell, Direction};
use std::collections::HashSet;

pub const MAX_LEVEL: u8 = 9;

/// Chooses the next direction for `snake`
pub fn decide(snake: &Snake, world: &World, level: u8, rng: &mut GameRng) -> Direction {
    let Some(head) = snake.head() else {
        return snake.direction;
    };

    let turns = legal_turns(snake.direction);
    let safe = safe_turns(snake, head, world, &turns);
    // Nothing is safe: any move will do, the rules engine settles the outcome
    let options = if safe.is_empty() { turns } else { safe };

    let greed = f64::from(level.min(MAX_LEVEL)) / f64::from(MAX_LEVEL);
    if rng.chance(greed) {
        if let Some(dir) = greedy_turn(head, &options, world.food()) {
            return dir;
        }
    }

    rng.pick(&options).unwrap_or(snake.direction)
}

/// Every direction except straight back, in horizontal-first order
fn legal_turns(current: Direction) -> Vec<Direction> {
    Direction::ALL
        .into_iter()
        .filter(|dir| !dir.is_opposite(current))
        .collect()
}

fn safe_turns(snake: &Snake, head: Cell, world: &World, turns: &[Direction]) -> Vec<Direction> {
    let board = world.board();
    let bodies: HashSet<Cell> = world
        .snakes()
        .filter(|s| s.alive)
        .flat_map(|s| {
            // Another snake's tail moves away unless it may eat this tick
            let vacating = s.id != snake.id && s.len() > 1 && !may_eat(s, world.food());
            s.body.iter().skip(usize::from(vacating)).copied()
        })
        .collect();

    turns
        .iter()
        .copied()
        .filter(|&dir| {
            let next = head.step(dir);
            if !board.contains(next) {
                return false;
            }
            // Our own tail moves away unless we eat this step
            let vacating_tail = snake.len() > 1
                && snake.tail() == Some(next)
                && !world.food().contains(&next);
            vacating_tail || !bodies.contains(&next)
        })
        .collect()
}

fn may_eat(snake: &Snake, food: &[Cell]) -> bool {
    snake
        .head()
        .map_or(false, |head| food.iter().any(|f| head.manhattan(*f) == 1))
}

/// Direction among `options` that ends closest to the nearest food.
/// Ties resolve in the order of `options`, horizontal first.
fn greedy_turn(head: Cell, options: &[Direction], food: &[Cell]) -> Option<Direction> {
    let target = food.iter().copied().min_by_key(|f| head.manhattan(*f))?;
    options
        .iter()
        .copied()
        .min_by_key(|dir| head.step(*dir).manhattan(target))
}
