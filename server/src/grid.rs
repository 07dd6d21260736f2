//! Movement and collision rules
//!
//! [`advance`] moves every alive snake one cell at the same time. Collisions
//! are judged against where everything ends up after the move, so a tail that
//! moves away this tick is free to enter, while any cell reached by two or
//! more heads kills all of them.

use crate::entity::{SnakeId, World};
use crate::rng::GameRng;
use log::{debug, info};
use shared::{Cell, Direction};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathCause {
    Wall,
    Body,
    HeadOn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEvent {
    Died { id: SnakeId, cause: DeathCause },
    AteFood { id: SnakeId, at: Cell },
    RespawnedFood { at: Cell },
}

#[derive(Debug)]
struct Step {
    id: SnakeId,
    head: Cell,
    direction: Direction,
    next: Cell,
    grows: bool,
}

/// Keeps the current direction when the request would turn the snake back on itself
pub fn resolve_direction(current: Direction, requested: Option<Direction>) -> Direction {
    match requested {
        Some(dir) if !dir.is_opposite(current) => dir,
        _ => current,
    }
}

/// Advances the world by one tick using the given direction requests.
///
/// Snakes are processed in ascending id order so the event list is deterministic.
pub fn advance(
    world: &mut World,
    moves: &BTreeMap<SnakeId, Direction>,
    rng: &mut GameRng,
) -> Vec<TickEvent> {
    let board = world.board();

    let mut steps = Vec::new();
    let mut blocked = HashSet::new();
    for snake in world.snakes().filter(|s| s.alive) {
        let Some(head) = snake.head() else {
            continue;
        };
        let direction = resolve_direction(snake.direction, moves.get(&snake.id).copied());
        let next = head.step(direction);
        let grows = board.contains(next) && world.food().contains(&next);

        // The tail cell frees up unless the snake is growing
        let skip = usize::from(!grows);
        blocked.extend(snake.body.iter().skip(skip).copied());

        steps.push(Step {
            id: snake.id,
            head,
            direction,
            next,
            grows,
        });
    }

    let mut arrivals: HashMap<Cell, usize> = HashMap::new();
    for step in &steps {
        *arrivals.entry(step.next).or_default() += 1;
    }

    let causes: Vec<Option<DeathCause>> = steps
        .iter()
        .map(|step| {
            if !board.contains(step.next) {
                Some(DeathCause::Wall)
            } else if blocked.contains(&step.next) {
                Some(DeathCause::Body)
            } else if arrivals[&step.next] > 1 || swaps_heads(step, &steps) {
                Some(DeathCause::HeadOn)
            } else {
                None
            }
        })
        .collect();

    let mut events = Vec::new();
    let mut eaten = Vec::new();
    for (step, cause) in steps.iter().zip(causes) {
        let Some(snake) = world.snake_mut(step.id) else {
            continue;
        };
        match cause {
            Some(cause) => {
                snake.kill();
                info!("{} died ({:?}) with score {}", step.id, cause, snake.score);
                events.push(TickEvent::Died { id: step.id, cause });
            }
            None => {
                snake.direction = step.direction;
                snake.body.push_back(step.next);
                snake.alive_ticks += 1;
                if step.grows {
                    snake.score += 1;
                    snake.ticks_since_food = 0;
                    debug!(
                        "{} ate food at ({}, {}), score {}",
                        step.id, step.next.x, step.next.y, snake.score
                    );
                    eaten.push(step.next);
                    events.push(TickEvent::AteFood {
                        id: step.id,
                        at: step.next,
                    });
                } else {
                    snake.ticks_since_food += 1;
                    snake.body.pop_front();
                }
            }
        }
    }

    for cell in eaten {
        world.remove_food(cell);
    }
    for at in world.replenish_food(rng) {
        events.push(TickEvent::RespawnedFood { at });
    }

    events
}

/// Two snakes trading head cells pass through each other unless caught here
fn swaps_heads(step: &Step, steps: &[Step]) -> bool {
    steps
        .iter()
        .any(|other| other.id != step.id && other.next == step.head && other.head == step.next)
}
