use clap::Parser;
use env_logger::Env;
use log::info;
use server::config::{GameConfig, MAX_BOT_LEVEL};
use server::error::ConfigError;
use server::network::Server;
use shared::{BoardSize, DEFAULT_PORT, DISCOVERY_PORT};
use std::net::{IpAddr, Ipv4Addr};

/// Multiplayer snake server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Number of computer-controlled snakes
    #[clap(short, long, default_value_t = 0)]
    bots: usize,
    /// Bot skill from 0 (random) to 9 (always chases food)
    #[clap(long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(0..=MAX_BOT_LEVEL as i64))]
    bot_level: u8,
    /// Address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// TCP port for game connections
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Tick interval multiplier; 2.0 ticks half as often
    #[clap(short = 's', long, default_value_t = 1.0)]
    game_speed: f64,
    #[clap(long, default_value_t = 40)]
    width: i32,
    #[clap(long, default_value_t = 30)]
    height: i32,
    /// Food items kept on the board
    #[clap(long, default_value_t = 1)]
    food: usize,
    /// UDP port answering discovery requests
    #[clap(long, default_value_t = DISCOVERY_PORT)]
    discovery_port: u16,
    #[clap(long)]
    no_discovery: bool,
    /// Seed for a reproducible game
    #[clap(long)]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<GameConfig, ConfigError> {
        let host = match self.host.as_str() {
            "localhost" => IpAddr::V4(Ipv4Addr::LOCALHOST),
            other => other.parse().map_err(|_| ConfigError::Host(self.host.clone()))?,
        };
        GameConfig {
            host,
            port: self.port,
            discovery_port: (!self.no_discovery).then_some(self.discovery_port),
            bots: self.bots,
            bot_level: self.bot_level,
            game_speed: self.game_speed,
            board: BoardSize {
                width: self.width,
                height: self.height,
            },
            food: self.food,
            seed: self.seed,
        }
        .validate()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;
    info!(
        "Starting with {} bots at level {}, tick {:?}",
        config.bots,
        config.bot_level,
        config.tick_interval()
    );
    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
