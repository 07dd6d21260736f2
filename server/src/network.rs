//! TCP transport: accept loop and per-connection receive/send routines
//!
//! Each connection starts with a join handshake. Once a letter is assigned the
//! connection runs two routines side by side: one reads client lines and turns
//! them into [`GameCommand`]s, the other writes direct replies and the latest
//! snapshot. When either routine stops, the other is dropped with it and the
//! session is closed.

use crate::config::GameConfig;
use crate::discovery::DiscoveryResponder;
use crate::error::{ConnectionError, ProtocolError, ServerError, TransportError};
use crate::game::Game;
use crate::scheduler::{GameCommand, SnapshotLine, TickScheduler};
use crate::session_manager::{normalize_letter, Assignment};
use log::{debug, error, info, warn};
use shared::{decode_line, encode_line, ClientMessage, ServerMessage, MAX_LINE_LEN};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};

pub const COMMAND_CHANNEL_CAPACITY: usize = 1000;
/// Longest a single write may block before the client is dropped
pub const SEND_TIMEOUT: Duration = Duration::from_secs(2);
const OUTBOX_CAPACITY: usize = 16;

/// Game server: TCP listener, tick loop and optional discovery responder
pub struct Server {
    config: GameConfig,
    listener: TcpListener,
    discovery: Option<DiscoveryResponder>,
}

impl Server {
    /// Validates the config and binds every socket
    pub async fn bind(config: GameConfig) -> Result<Self, ServerError> {
        let config = config.validate()?;

        let addr = config.game_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local = listener.local_addr()?;
        info!("Game server listening on {}", local);

        let discovery = match config.discovery_addr() {
            Some(addr) => Some(DiscoveryResponder::bind(addr, local).await?),
            None => None,
        };

        Ok(Self {
            config,
            listener,
            discovery,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn discovery_addr(&self) -> Option<SocketAddr> {
        self.discovery.as_ref().and_then(|d| d.local_addr().ok())
    }

    /// Runs until the tick loop dies
    pub async fn run(self) -> Result<(), ServerError> {
        let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let scheduler = TickScheduler::new(
            Game::new(&self.config),
            self.config.tick_interval(),
            command_rx,
        );
        let snapshots = scheduler.subscribe();
        let mut game_loop = tokio::spawn(scheduler.run());

        if let Some(discovery) = self.discovery {
            tokio::spawn(discovery.run());
        }

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Could not disable Nagle for {}: {}", peer, e);
                        }
                        info!("Connection from {}", peer);
                        tokio::spawn(handle_connection(
                            stream,
                            peer,
                            commands.clone(),
                            snapshots.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                result = &mut game_loop => {
                    error!("Tick loop stopped");
                    return result.map_err(ServerError::from);
                }
            }
        }
    }
}

/// Serves one client until it quits, misbehaves or its socket fails
pub async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    commands: mpsc::Sender<GameCommand>,
    snapshots: watch::Receiver<SnapshotLine>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    match serve(reader, writer, peer, commands, snapshots).await {
        Ok(()) => info!("{} disconnected", peer),
        Err(e) => warn!("Dropping {}: {}", peer, e),
    }
}

async fn serve<R, W>(
    reader: R,
    mut writer: W,
    peer: SocketAddr,
    commands: mpsc::Sender<GameCommand>,
    snapshots: watch::Receiver<SnapshotLine>,
) -> Result<(), ConnectionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = LineReader::new(reader);

    let letter = loop {
        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        match decode_line::<ClientMessage>(&line)? {
            ClientMessage::Join { letter } => {
                let (reply, response) = oneshot::channel();
                let letter = letter.as_deref().and_then(normalize_letter);
                send_command(&commands, GameCommand::Join { letter, peer, reply }).await?;
                match response.await.map_err(|_| TransportError::ServerGone)? {
                    Ok(assignment) => {
                        // The session is open from here on, so every exit must close it
                        if let Err(e) = announce(&mut writer, &assignment).await {
                            leave(&commands, assignment.letter).await;
                            return Err(e);
                        }
                        break assignment.letter;
                    }
                    Err(e) => {
                        info!("Rejected join from {}: {}", peer, e);
                        let message = ServerMessage::Error {
                            reason: e.to_string(),
                        };
                        write_line(&mut writer, &encode_line(&message)?).await?;
                    }
                }
            }
            ClientMessage::Quit => return Ok(()),
            ClientMessage::Move { .. } | ClientMessage::Restart => {
                return Err(ProtocolError::Unexpected("command before join").into());
            }
        }
    };

    let (outbox, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
    let result = tokio::select! {
        result = receive_loop(&mut lines, letter, &commands, &outbox) => result,
        result = send_loop(writer, outbox_rx, snapshots) => result,
    };

    leave(&commands, letter).await;
    result
}

async fn announce<W>(writer: &mut W, assignment: &Assignment) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    let message = ServerMessage::Assigned {
        letter: assignment.letter,
        color: assignment.color,
    };
    write_line(writer, &encode_line(&message)?).await?;
    Ok(())
}

/// Closes the session. The tick loop may already be gone, which is fine.
async fn leave(commands: &mpsc::Sender<GameCommand>, letter: char) {
    let _ = commands.send(GameCommand::Leave { letter }).await;
}

/// Reads client lines after the handshake
async fn receive_loop<R>(
    lines: &mut LineReader<R>,
    letter: char,
    commands: &mpsc::Sender<GameCommand>,
    outbox: &mpsc::Sender<String>,
) -> Result<(), ConnectionError>
where
    R: AsyncRead + Unpin,
{
    while let Some(line) = lines.next_line().await? {
        match decode_line::<ClientMessage>(&line)? {
            ClientMessage::Move { dir } => {
                send_command(
                    commands,
                    GameCommand::Move {
                        letter,
                        direction: dir,
                    },
                )
                .await?;
            }
            ClientMessage::Restart => {
                let (reply, response) = oneshot::channel();
                send_command(commands, GameCommand::Restart { letter, reply }).await?;
                if let Err(e) = response.await.map_err(|_| TransportError::ServerGone)? {
                    debug!("Restart from {} refused: {}", letter, e);
                    let message = ServerMessage::Error {
                        reason: e.to_string(),
                    };
                    queue(outbox, encode_line(&message)?).await?;
                }
            }
            ClientMessage::Join { .. } => {
                let message = ServerMessage::Error {
                    reason: format!("already joined as {}", letter),
                };
                queue(outbox, encode_line(&message)?).await?;
            }
            ClientMessage::Quit => return Ok(()),
        }
    }
    Ok(())
}

/// Writes direct replies and every new snapshot
async fn send_loop<W>(
    mut writer: W,
    mut outbox: mpsc::Receiver<String>,
    mut snapshots: watch::Receiver<SnapshotLine>,
) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    // Start from the next tick; the current snapshot predates this player
    snapshots.borrow_and_update();

    loop {
        tokio::select! {
            message = outbox.recv() => match message {
                Some(line) => write_line(&mut writer, &line).await?,
                None => return Ok(()),
            },
            changed = snapshots.changed() => {
                changed.map_err(|_| TransportError::ServerGone)?;
                let line = snapshots.borrow_and_update().clone();
                if !line.is_empty() {
                    write_line(&mut writer, &line).await?;
                }
            }
        }
    }
}

async fn send_command(
    commands: &mpsc::Sender<GameCommand>,
    command: GameCommand,
) -> Result<(), TransportError> {
    commands
        .send(command)
        .await
        .map_err(|_| TransportError::ServerGone)
}

async fn queue(outbox: &mpsc::Sender<String>, line: String) -> Result<(), TransportError> {
    outbox.send(line).await.map_err(|_| TransportError::ServerGone)
}

async fn write_line<W>(writer: &mut W, line: &str) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let write = async {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    };
    tokio::time::timeout(SEND_TIMEOUT, write)
        .await
        .map_err(|_| TransportError::SendTimeout)??;
    Ok(())
}

/// Newline-delimited reader that refuses lines longer than [`MAX_LINE_LEN`]
struct LineReader<R> {
    inner: BufReader<R>,
    buffer: String,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            buffer: String::new(),
        }
    }

    /// Next non-blank line without its terminator, or `None` at end of stream
    async fn next_line(&mut self) -> Result<Option<String>, ConnectionError> {
        loop {
            self.buffer.clear();
            let limit = MAX_LINE_LEN as u64 + 1;
            let read = (&mut self.inner)
                .take(limit)
                .read_line(&mut self.buffer)
                .await?;
            if read == 0 {
                return Ok(None);
            }
            if !self.buffer.ends_with('\n') && read as u64 == limit {
                return Err(ProtocolError::LineTooLong(MAX_LINE_LEN).into());
            }

            let line = self.buffer.trim_end_matches(['\r', '\n']);
            if !line.trim().is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Direction, WorldSnapshot};
    use std::sync::Arc;
    use tokio::io::{duplex, DuplexStream, Lines};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    struct Harness {
        client: Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
        writer: tokio::io::WriteHalf<DuplexStream>,
        commands: mpsc::Receiver<GameCommand>,
        snapshots: watch::Sender<SnapshotLine>,
        task: JoinHandle<()>,
    }

    fn harness() -> Harness {
        let (client, server) = duplex(64 * 1024);
        let (command_tx, commands) = mpsc::channel(16);
        let (snapshots, snapshot_rx) = watch::channel(Arc::from(""));
        let peer = "127.0.0.1:6000".parse().unwrap();
        let task = tokio::spawn(handle_connection(server, peer, command_tx, snapshot_rx));
        let (read, writer) = tokio::io::split(client);
        Harness {
            client: BufReader::new(read).lines(),
            writer,
            commands,
            snapshots,
            task,
        }
    }

    impl Harness {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Option<ServerMessage> {
            let line = timeout(Duration::from_secs(2), self.client.next_line())
                .await
                .unwrap()
                .unwrap()?;
            Some(decode_line(&line).unwrap())
        }

        async fn command(&mut self) -> GameCommand {
            timeout(Duration::from_secs(2), self.commands.recv())
                .await
                .unwrap()
                .unwrap()
        }

        async fn accept_join(&mut self, letter: char) {
            match self.command().await {
                GameCommand::Join { reply, .. } => {
                    reply
                        .send(Ok(Assignment {
                            letter,
                            color: [1, 2, 3],
                        }))
                        .unwrap();
                }
                other => panic!("expected join, got {:?}", other),
            }
        }
    }

    fn snapshot_line(tick: u64) -> SnapshotLine {
        let snapshot = WorldSnapshot {
            tick,
            board: shared::BoardSize {
                width: 5,
                height: 5,
            },
            snakes: Vec::new(),
            food: Vec::new(),
            game_over: false,
            winner: None,
        };
        Arc::from(encode_line(&ServerMessage::State(snapshot)).unwrap())
    }

    #[tokio::test]
    async fn test_join_then_play() {
        let mut h = harness();
        h.send(r#"{"type":"join","letter":"c"}"#).await;
        match h.command().await {
            GameCommand::Join { letter, reply, .. } => {
                assert_eq!(letter, Some('C'));
                reply
                    .send(Ok(Assignment {
                        letter: 'C',
                        color: [9, 9, 9],
                    }))
                    .unwrap();
            }
            other => panic!("expected join, got {:?}", other),
        }
        assert_eq!(
            h.recv().await,
            Some(ServerMessage::Assigned {
                letter: 'C',
                color: [9, 9, 9]
            })
        );

        h.send(r#"{"type":"move","dir":"UP"}"#).await;
        assert!(matches!(
            h.command().await,
            GameCommand::Move {
                letter: 'C',
                direction: Direction::Up
            }
        ));

        h.snapshots.send_replace(snapshot_line(7));
        match h.recv().await {
            Some(ServerMessage::State(snapshot)) => assert_eq!(snapshot.tick, 7),
            other => panic!("expected state, got {:?}", other),
        }

        h.send(r#"{"type":"quit"}"#).await;
        assert!(matches!(h.command().await, GameCommand::Leave { letter: 'C' }));
        assert_eq!(h.recv().await, None);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_join_keeps_connection() {
        let mut h = harness();
        h.send(r#"{"type":"join"}"#).await;
        match h.command().await {
            GameCommand::Join { reply, .. } => {
                reply
                    .send(Err(crate::error::CapacityError::ServerFull.into()))
                    .unwrap();
            }
            other => panic!("expected join, got {:?}", other),
        }
        assert_eq!(
            h.recv().await,
            Some(ServerMessage::Error {
                reason: "server full".to_string()
            })
        );

        h.send(r#"{"type":"join","letter":"??"}"#).await;
        match h.command().await {
            GameCommand::Join { letter, reply, .. } => {
                assert_eq!(letter, None);
                reply
                    .send(Ok(Assignment {
                        letter: 'A',
                        color: [0, 255, 0],
                    }))
                    .unwrap();
            }
            other => panic!("expected join, got {:?}", other),
        }
        assert!(matches!(
            h.recv().await,
            Some(ServerMessage::Assigned { letter: 'A', .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_line_drops_connection() {
        let mut h = harness();
        h.send(r#"{"type":"join"}"#).await;
        h.accept_join('B').await;
        assert!(h.recv().await.is_some());

        h.send("not json").await;
        assert!(matches!(h.command().await, GameCommand::Leave { letter: 'B' }));
        assert_eq!(h.recv().await, None);
    }

    #[tokio::test]
    async fn test_move_before_join_drops_connection() {
        let mut h = harness();
        h.send(r#"{"type":"move","dir":"LEFT"}"#).await;
        assert_eq!(h.recv().await, None);
        h.task.await.unwrap();
        // No session was opened so there is nothing to leave
        assert!(h.commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_overlong_line_drops_connection() {
        let mut h = harness();
        h.send(r#"{"type":"join"}"#).await;
        h.accept_join('D').await;
        assert!(h.recv().await.is_some());

        let long = "x".repeat(MAX_LINE_LEN + 10);
        h.send(&long).await;
        assert!(matches!(h.command().await, GameCommand::Leave { letter: 'D' }));
    }

    #[tokio::test]
    async fn test_refused_restart_reports_error() {
        let mut h = harness();
        h.send(r#"{"type":"join"}"#).await;
        h.accept_join('A').await;
        assert!(h.recv().await.is_some());

        h.send(r#"{"type":"restart"}"#).await;
        match h.command().await {
            GameCommand::Restart { letter, reply } => {
                assert_eq!(letter, 'A');
                reply
                    .send(Err(crate::error::SessionError::RestartNotAllowed))
                    .unwrap();
            }
            other => panic!("expected restart, got {:?}", other),
        }
        match h.recv().await {
            Some(ServerMessage::Error { reason }) => assert!(reason.contains("restart")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hangup_before_assignment_sends_leave() {
        let mut h = harness();
        h.send(r#"{"type":"join"}"#).await;
        let reply = match h.command().await {
            GameCommand::Join { reply, .. } => reply,
            other => panic!("expected join, got {:?}", other),
        };

        let Harness {
            client,
            writer,
            mut commands,
            task,
            ..
        } = h;
        drop(writer);
        drop(client);
        // The join succeeds after the client is already gone
        reply
            .send(Ok(Assignment {
                letter: 'E',
                color: [1, 2, 3],
            }))
            .unwrap();

        let leave = timeout(Duration::from_secs(2), commands.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(leave, GameCommand::Leave { letter: 'E' }));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_disconnect_sends_leave() {
        let mut h = harness();
        h.send(r#"{"type":"join"}"#).await;
        h.accept_join('F').await;
        assert!(h.recv().await.is_some());

        let Harness {
            client,
            writer,
            mut commands,
            task,
            ..
        } = h;
        drop(writer);
        drop(client);
        let leave = timeout(Duration::from_secs(2), commands.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(leave, GameCommand::Leave { letter: 'F' }));
        task.await.unwrap();
    }
}
