use clap::Parser;
use client::game::ClientGameState;
use client::input::{parse_command, HELP};
use client::network::{discover, ClientError, Connection};
use env_logger::Env;
use log::{info, warn};
use shared::{ClientMessage, ServerMessage, DISCOVERY_PORT};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::lookup_host;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host; without it the server is found by discovery
    #[arg(short = 'H', long, requires = "port")]
    host: Option<String>,

    /// Server port, required together with --host
    #[arg(short, long, requires = "host")]
    port: Option<u16>,

    /// UDP port servers answer discovery on
    #[arg(long, default_value_t = DISCOVERY_PORT)]
    discovery_port: u16,

    /// Preferred letter A-Z
    #[arg(short, long)]
    letter: Option<char>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let addr = match (args.host, args.port) {
        (Some(host), Some(port)) => lookup_host((host.as_str(), port))
            .await?
            .next()
            .ok_or_else(|| format!("could not resolve {}", host))?,
        _ => {
            info!("Looking for a server on port {}", args.discovery_port);
            discover(args.discovery_port).await?
        }
    };

    let Connection {
        letter,
        color,
        mut reader,
        mut writer,
    } = Connection::join(addr, args.letter).await?;
    info!("Playing as {} with color {:?}", letter, color);
    info!("Controls: {}", HELP);

    let mut state = ClientGameState::new(letter);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            message = reader.recv() => match message? {
                Some(ServerMessage::State(snapshot)) => {
                    if let Some(status) = state.apply(snapshot) {
                        info!("{}", status);
                    }
                }
                Some(ServerMessage::Error { reason }) => warn!("Server: {}", reason),
                Some(ServerMessage::Assigned { .. }) => {}
                None => return Err(ClientError::Closed.into()),
            },
            line = stdin.next_line() => match line? {
                Some(line) => match parse_command(&line) {
                    Some(ClientMessage::Quit) => break,
                    Some(message) => writer.send(&message).await?,
                    None => warn!("Unknown command '{}'. {}", line.trim(), HELP),
                },
                None => break,
            },
        }
    }

    writer.send(&ClientMessage::Quit).await?;
    info!("Bye");
    Ok(())
}
