//! Snakes, food and the world that holds them
//!
//! The [`World`] is the single mutable game state. It is owned by the tick
//! scheduler; everything else reaches it through commands or snapshots.

use crate::error::CapacityError;
use crate::rng::GameRng;
use log::{info, warn};
use shared::{BoardSize, Cell, Direction, Rgb, SnakeKind, SnakeView};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;

pub const PALETTE: [Rgb; 8] = [
    [0, 255, 0],
    [0, 0, 255],
    [255, 165, 0],
    [255, 0, 255],
    [0, 255, 255],
    [255, 255, 0],
    [255, 192, 203],
    [128, 0, 128],
];

pub fn letter_color(letter: char) -> Rgb {
    let index = (letter as u32).saturating_sub('A' as u32) as usize;
    PALETTE[index % PALETTE.len()]
}

/// Bot numbers run from 1 to this value
pub const MAX_BOTS: usize = u16::MAX as usize;

/// Bots reuse the palette at half intensity
pub fn bot_color(index: u16) -> Rgb {
    PALETTE[index as usize % PALETTE.len()].map(|c| c / 2)
}

/// Identity of a snake. Humans are named by a letter, bots by a number, so the
/// two never compete for identifiers. Ordering puts every human before every bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SnakeId {
    Player(char),
    Bot(u16),
}

impl fmt::Display for SnakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnakeId::Player(letter) => write!(f, "{}", letter),
            SnakeId::Bot(index) => write!(f, "bot-{}", index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    Human,
    Bot { level: u8 },
}

#[derive(Debug, Clone)]
pub struct Snake {
    pub id: SnakeId,
    pub controller: Controller,
    pub color: Rgb,
    /// Front is the tail, back is the head
    pub body: VecDeque<Cell>,
    pub direction: Direction,
    /// Latest requested direction, consumed at the next tick
    pub pending: Option<Direction>,
    pub alive: bool,
    pub score: u32,
    /// Ticks survived since spawning
    pub alive_ticks: u64,
    pub ticks_since_food: u64,
}

impl Snake {
    pub fn new(id: SnakeId, controller: Controller, color: Rgb, at: Cell, direction: Direction) -> Self {
        Self {
            id,
            controller,
            color,
            body: VecDeque::from([at]),
            direction,
            pending: None,
            alive: true,
            score: 0,
            alive_ticks: 0,
            ticks_since_food: 0,
        }
    }

    pub fn head(&self) -> Option<Cell> {
        self.body.back().copied()
    }

    pub fn tail(&self) -> Option<Cell> {
        self.body.front().copied()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn is_human(&self) -> bool {
        self.controller == Controller::Human
    }

    pub fn letter(&self) -> Option<char> {
        match self.id {
            SnakeId::Player(letter) => Some(letter),
            SnakeId::Bot(_) => None,
        }
    }

    pub fn kill(&mut self) {
        self.alive = false;
        self.pending = None;
        self.body.clear();
    }

    pub fn view(&self) -> SnakeView {
        let (kind, level) = match self.controller {
            Controller::Human => (SnakeKind::Human, None),
            Controller::Bot { level } => (SnakeKind::Bot, Some(level)),
        };
        SnakeView {
            id: self.id.to_string(),
            letter: self.letter(),
            kind,
            level,
            color: self.color,
            alive: self.alive,
            score: self.score,
            direction: self.direction,
            body: self.body.iter().copied().collect(),
            alive_ticks: self.alive_ticks,
            ticks_since_food: self.ticks_since_food,
        }
    }
}

/// Board, snakes and food
#[derive(Debug, Clone)]
pub struct World {
    board: BoardSize,
    snakes: BTreeMap<SnakeId, Snake>,
    food: Vec<Cell>,
    food_target: usize,
}

impl World {
    pub fn new(board: BoardSize, food_target: usize) -> Self {
        Self {
            board,
            snakes: BTreeMap::new(),
            food: Vec::new(),
            food_target,
        }
    }

    pub fn board(&self) -> BoardSize {
        self.board
    }

    pub fn snakes(&self) -> impl Iterator<Item = &Snake> {
        self.snakes.values()
    }

    pub fn snake(&self, id: SnakeId) -> Option<&Snake> {
        self.snakes.get(&id)
    }

    pub(crate) fn snakes_mut(&mut self) -> impl Iterator<Item = &mut Snake> {
        self.snakes.values_mut()
    }

    pub(crate) fn snake_mut(&mut self, id: SnakeId) -> Option<&mut Snake> {
        self.snakes.get_mut(&id)
    }

    pub fn food(&self) -> &[Cell] {
        &self.food
    }

    pub fn food_target(&self) -> usize {
        self.food_target
    }

    /// Creates a snake of length one on a random free cell.
    ///
    /// Humans take `preferred` when it is a free letter, otherwise the lowest
    /// free letter. Bots take the lowest unused bot number.
    pub fn spawn(
        &mut self,
        controller: Controller,
        preferred: Option<char>,
        rng: &mut GameRng,
    ) -> Result<SnakeId, CapacityError> {
        let id = match controller {
            Controller::Human => SnakeId::Player(self.free_letter(preferred)?),
            Controller::Bot { .. } => SnakeId::Bot(self.free_bot_index()?),
        };
        let at = self.random_free_cell(rng).ok_or(CapacityError::NoFreeCell)?;

        let direction = if at.x < self.board.width / 2 {
            Direction::Right
        } else {
            Direction::Left
        };
        let color = match id {
            SnakeId::Player(letter) => letter_color(letter),
            SnakeId::Bot(index) => bot_color(index),
        };

        info!("Spawned {} at ({}, {}) heading {:?}", id, at.x, at.y, direction);
        self.snakes
            .insert(id, Snake::new(id, controller, color, at, direction));
        Ok(id)
    }

    /// Places a prebuilt snake, replacing any snake with the same id
    pub fn insert(&mut self, snake: Snake) {
        self.snakes.insert(snake.id, snake);
    }

    pub fn remove(&mut self, id: SnakeId) -> Option<Snake> {
        self.snakes.remove(&id)
    }

    /// Records a direction request. Unknown or dead snakes are ignored since late
    /// commands after a death are routine.
    pub fn set_direction(&mut self, id: SnakeId, direction: Direction) {
        if let Some(snake) = self.snakes.get_mut(&id) {
            if snake.alive {
                snake.pending = Some(direction);
            }
        }
    }

    pub fn alive_human_count(&self) -> usize {
        self.snakes
            .values()
            .filter(|s| s.alive && s.is_human())
            .count()
    }

    pub fn is_game_over(&self) -> bool {
        self.alive_human_count() == 0
    }

    /// Replaces the food list. Intended for setting up exact layouts.
    pub fn set_food(&mut self, food: Vec<Cell>) {
        self.food = food;
    }

    pub(crate) fn remove_food(&mut self, cell: Cell) -> bool {
        match self.food.iter().position(|&f| f == cell) {
            Some(index) => {
                self.food.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Tops food back up to the target count and returns the new cells
    pub fn replenish_food(&mut self, rng: &mut GameRng) -> Vec<Cell> {
        let mut placed = Vec::new();
        while self.food.len() < self.food_target {
            match self.random_free_cell(rng) {
                Some(cell) => {
                    self.food.push(cell);
                    placed.push(cell);
                }
                None => {
                    warn!(
                        "Board is full, food is {} short",
                        self.food_target - self.food.len()
                    );
                    break;
                }
            }
        }
        placed
    }

    /// Cells covered by a snake segment or food
    pub fn occupied_cells(&self) -> HashSet<Cell> {
        self.snakes
            .values()
            .flat_map(|s| s.body.iter().copied())
            .chain(self.food.iter().copied())
            .collect()
    }

    pub fn random_free_cell(&self, rng: &mut GameRng) -> Option<Cell> {
        let occupied = self.occupied_cells();
        let free: Vec<Cell> = self
            .board
            .cells()
            .filter(|cell| !occupied.contains(cell))
            .collect();
        rng.pick(&free)
    }

    /// Panics when the world is in a state the rules can never produce
    pub fn assert_invariants(&self) {
        let mut seen = HashSet::new();
        for snake in self.snakes.values() {
            if snake.alive {
                assert!(!snake.is_empty(), "{} is alive without a body", snake.id);
                assert_eq!(
                    snake.len(),
                    1 + snake.score as usize,
                    "{} length does not match its score",
                    snake.id
                );
            } else {
                assert!(snake.is_empty(), "dead {} still has segments", snake.id);
            }
            for &cell in &snake.body {
                assert!(self.board.contains(cell), "{} is outside the board", snake.id);
                assert!(seen.insert(cell), "cell ({}, {}) is shared", cell.x, cell.y);
            }
        }
        assert!(self.food.len() <= self.food_target, "too much food");
        for &cell in &self.food {
            assert!(self.board.contains(cell), "food is outside the board");
            assert!(seen.insert(cell), "food at ({}, {}) overlaps", cell.x, cell.y);
        }
    }

    fn free_letter(&self, preferred: Option<char>) -> Result<char, CapacityError> {
        let taken = |letter: char| self.snakes.contains_key(&SnakeId::Player(letter));
        if let Some(letter) = preferred.filter(|l| l.is_ascii_uppercase()) {
            if !taken(letter) {
                return Ok(letter);
            }
        }
        ('A'..='Z')
            .find(|&l| !taken(l))
            .ok_or(CapacityError::NoFreeLetter)
    }

    fn free_bot_index(&self) -> Result<u16, CapacityError> {
        (1..=u16::MAX)
            .find(|&i| !self.snakes.contains_key(&SnakeId::Bot(i)))
            .ok_or(CapacityError::NoFreeBotId)
    }
}
