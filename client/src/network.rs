//! Server discovery and the line-based game connection

use log::{debug, info, warn};
use shared::{decode_line, encode_line, ClientMessage, DiscoveryMessage, Rgb, ServerMessage};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

pub const DISCOVERY_ATTEMPTS: u32 = 5;
pub const DISCOVERY_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("bad message from server: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no server answered discovery")]
    NoServerFound,
    #[error("server rejected join: {0}")]
    Rejected(String),
    #[error("server closed the connection")]
    Closed,
}

/// Broadcasts discovery requests on the local network until a server answers
pub async fn discover(discovery_port: u16) -> Result<SocketAddr, ClientError> {
    let target = SocketAddr::from((Ipv4Addr::BROADCAST, discovery_port));
    discover_at(target, DISCOVERY_ATTEMPTS, DISCOVERY_WAIT).await
}

/// Sends up to `attempts` discovery requests to `target`, waiting `wait` for each reply
pub async fn discover_at(
    target: SocketAddr,
    attempts: u32,
    wait: Duration,
) -> Result<SocketAddr, ClientError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;
    let request = serde_json::to_vec(&DiscoveryMessage::Discover)?;
    let mut buffer = [0u8; 512];

    for attempt in 1..=attempts {
        debug!("Discovery attempt {}/{} to {}", attempt, attempts, target);
        socket.send_to(&request, target).await?;

        let Ok(received) = timeout(wait, socket.recv_from(&mut buffer)).await else {
            continue;
        };
        let (len, from) = received?;
        match serde_json::from_slice::<DiscoveryMessage>(&buffer[..len]) {
            Ok(DiscoveryMessage::Server { host, port }) => {
                let ip: IpAddr = host.parse().unwrap_or_else(|_| from.ip());
                let addr = SocketAddr::new(ip, port);
                info!("Found server at {} (answered from {})", addr, from);
                return Ok(addr);
            }
            Ok(other) => warn!("Unexpected discovery reply from {}: {:?}", from, other),
            Err(e) => warn!("Malformed discovery reply from {}: {}", from, e),
        }
    }

    Err(ClientError::NoServerFound)
}

/// Incoming half of a game connection
#[derive(Debug)]
pub struct MessageReader {
    lines: Lines<BufReader<OwnedReadHalf>>,
}

impl MessageReader {
    /// Next server message, or `None` once the server hangs up
    pub async fn recv(&mut self) -> Result<Option<ServerMessage>, ClientError> {
        match self.lines.next_line().await? {
            Some(line) => Ok(Some(decode_line(&line)?)),
            None => Ok(None),
        }
    }
}

/// Outgoing half of a game connection
#[derive(Debug)]
pub struct MessageWriter {
    writer: OwnedWriteHalf,
}

impl MessageWriter {
    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        let line = encode_line(message)?;
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

/// A joined player
#[derive(Debug)]
pub struct Connection {
    pub letter: char,
    pub color: Rgb,
    pub reader: MessageReader,
    pub writer: MessageWriter,
}

impl Connection {
    /// Connects and joins, asking for `letter` if given
    pub async fn join(addr: SocketAddr, letter: Option<char>) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();
        let mut reader = MessageReader {
            lines: BufReader::new(read).lines(),
        };
        let mut writer = MessageWriter { writer: write };

        writer
            .send(&ClientMessage::Join {
                letter: letter.map(String::from),
            })
            .await?;

        loop {
            match reader.recv().await? {
                Some(ServerMessage::Assigned { letter, color }) => {
                    info!("Joined {} as {}", addr, letter);
                    return Ok(Self {
                        letter,
                        color,
                        reader,
                        writer,
                    });
                }
                Some(ServerMessage::Error { reason }) => {
                    return Err(ClientError::Rejected(reason));
                }
                Some(ServerMessage::State(_)) => continue,
                None => return Err(ClientError::Closed),
            }
        }
    }
}
