//! Startup configuration shared read-only by every server component

use crate::entity::MAX_BOTS;
use crate::error::ConfigError;
use shared::{BoardSize, DEFAULT_PORT, DISCOVERY_PORT};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Tick interval at a game speed of 1.0
pub const BASE_TICK_INTERVAL: Duration = Duration::from_millis(150);
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);
pub const MAX_TICK_INTERVAL: Duration = Duration::from_secs(60);
pub const MAX_BOT_LEVEL: u8 = 9;
pub const MIN_BOARD_DIMENSION: i32 = 5;
pub const MAX_BOARD_DIMENSION: i32 = 200;
pub const DEFAULT_BOARD: BoardSize = BoardSize {
    width: 40,
    height: 30,
};

#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub host: IpAddr,
    pub port: u16,
    /// `None` disables the discovery responder
    pub discovery_port: Option<u16>,
    pub bots: usize,
    pub bot_level: u8,
    /// Multiplier applied to [`BASE_TICK_INTERVAL`]
    pub game_speed: f64,
    pub board: BoardSize,
    /// Number of food items kept on the board
    pub food: usize,
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            discovery_port: Some(DISCOVERY_PORT),
            bots: 0,
            bot_level: 5,
            game_speed: 1.0,
            board: DEFAULT_BOARD,
            food: 1,
            seed: None,
        }
    }
}

impl GameConfig {
    /// Checks every value and returns the config unchanged when it is usable
    pub fn validate(self) -> Result<Self, ConfigError> {
        if !self.game_speed.is_finite() || self.game_speed <= 0.0 {
            return Err(ConfigError::GameSpeed(self.game_speed));
        }
        let interval_ok = scaled_interval(self.game_speed)
            .map_or(false, |i| (MIN_TICK_INTERVAL..=MAX_TICK_INTERVAL).contains(&i));
        if !interval_ok {
            return Err(ConfigError::TickInterval {
                speed: self.game_speed,
                min: MIN_TICK_INTERVAL,
                max: MAX_TICK_INTERVAL,
            });
        }
        if self.bot_level > MAX_BOT_LEVEL {
            return Err(ConfigError::BotLevel(self.bot_level));
        }
        for (axis, value) in [("width", self.board.width), ("height", self.board.height)] {
            if !(MIN_BOARD_DIMENSION..=MAX_BOARD_DIMENSION).contains(&value) {
                return Err(ConfigError::BoardDimension {
                    axis,
                    min: MIN_BOARD_DIMENSION,
                    max: MAX_BOARD_DIMENSION,
                    value,
                });
            }
        }
        if self.food == 0 {
            return Err(ConfigError::NoFood);
        }
        if self.bots > MAX_BOTS {
            return Err(ConfigError::TooManyBots {
                bots: self.bots,
                max: MAX_BOTS,
            });
        }

        // Leave room for at least one human snake
        let cells = self.board.cell_count();
        if self.bots + self.food + 1 > cells {
            return Err(ConfigError::Overcrowded {
                bots: self.bots,
                food: self.food,
                cells,
            });
        }

        Ok(self)
    }

    /// Clamped to the accepted range, so it never panics even before validation
    pub fn tick_interval(&self) -> Duration {
        scaled_interval(self.game_speed)
            .map_or(MAX_TICK_INTERVAL, |interval| {
                interval.clamp(MIN_TICK_INTERVAL, MAX_TICK_INTERVAL)
            })
    }

    pub fn game_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Broadcasts only reach sockets bound to the unspecified address, so a
    /// wildcard host binds discovery the same way.
    pub fn discovery_addr(&self) -> Option<SocketAddr> {
        self.discovery_port
            .map(|port| SocketAddr::new(self.host, port))
    }
}

fn scaled_interval(game_speed: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(BASE_TICK_INTERVAL.as_secs_f64() * game_speed).ok()
}
