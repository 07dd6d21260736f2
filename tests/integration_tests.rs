//! Integration tests for the networked snake arena
//!
//! Each test starts a real server on ephemeral loopback ports and talks to it
//! over TCP and UDP.

use client::network::{discover_at, ClientError, Connection};
use server::config::GameConfig;
use server::entity::letter_color;
use server::network::Server;
use shared::{ClientMessage, Direction, DiscoveryMessage, ServerMessage, SnakeView, WorldSnapshot};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

const WAIT: Duration = Duration::from_secs(3);

fn test_config() -> GameConfig {
    GameConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        discovery_port: Some(0),
        // 30 ms ticks
        game_speed: 0.2,
        seed: Some(1234),
        ..GameConfig::default()
    }
}

async fn start_server(config: GameConfig) -> (SocketAddr, SocketAddr) {
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let discovery = server.discovery_addr().unwrap();
    tokio::spawn(server.run());
    (addr, discovery)
}

/// Reads messages until a snapshot satisfies `predicate`
async fn wait_for_state<F>(connection: &mut Connection, mut predicate: F) -> WorldSnapshot
where
    F: FnMut(&WorldSnapshot) -> bool,
{
    timeout(WAIT, async {
        loop {
            match connection.reader.recv().await.unwrap() {
                Some(ServerMessage::State(snapshot)) if predicate(&snapshot) => return snapshot,
                Some(_) => continue,
                None => panic!("server closed the connection"),
            }
        }
    })
    .await
    .expect("timed out waiting for a snapshot")
}

fn own_snake<'a>(snapshot: &'a WorldSnapshot, letter: char) -> Option<&'a SnakeView> {
    snapshot.snake(&letter.to_string())
}

/// SESSION LIFECYCLE TESTS
mod session_tests {
    use super::*;

    /// Tests join handshake, assignment and the first snapshots
    #[tokio::test]
    async fn join_receives_assignment_and_state() {
        let (addr, _) = start_server(test_config()).await;

        let mut player = Connection::join(addr, Some('K')).await.unwrap();
        assert_eq!(player.letter, 'K');
        assert_eq!(player.color, letter_color('K'));

        let snapshot = wait_for_state(&mut player, |s| own_snake(s, 'K').is_some()).await;
        let snake = own_snake(&snapshot, 'K').unwrap();
        assert_eq!(snake.letter, Some('K'));
        assert!(snake.alive);
        assert_eq!(snapshot.board.width, 40);
        assert_eq!(snapshot.board.height, 30);
        assert_eq!(snapshot.food.len(), 1);
    }

    /// Tests that a taken letter falls back to the lowest free one
    #[tokio::test]
    async fn taken_letter_falls_back() {
        let (addr, _) = start_server(test_config()).await;

        let first = Connection::join(addr, Some('C')).await.unwrap();
        let second = Connection::join(addr, Some('C')).await.unwrap();
        let third = Connection::join(addr, None).await.unwrap();
        assert_eq!(first.letter, 'C');
        assert_eq!(second.letter, 'A');
        assert_eq!(third.letter, 'B');
    }

    /// Tests capacity: 26 players fit, the 27th is rejected, a leave frees a slot
    #[tokio::test]
    async fn server_full_then_slot_reused() {
        let (addr, _) = start_server(test_config()).await;

        let mut players = Vec::new();
        for _ in 0..26 {
            players.push(Connection::join(addr, None).await.unwrap());
        }
        match Connection::join(addr, None).await {
            Err(ClientError::Rejected(reason)) => assert_eq!(reason, "server full"),
            Err(e) => panic!("unexpected error {}", e),
            Ok(c) => panic!("27th join got letter {}", c.letter),
        }

        let gone = players.remove(5);
        let freed = gone.letter;
        drop(gone);

        // The leave is processed asynchronously, so retry briefly
        let rejoined = timeout(WAIT, async {
            loop {
                match Connection::join(addr, None).await {
                    Ok(connection) => return connection,
                    Err(ClientError::Rejected(_)) => {
                        tokio::time::sleep(Duration::from_millis(20)).await
                    }
                    Err(e) => panic!("unexpected error {}", e),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(rejoined.letter, freed);
    }

    /// Tests that a quit removes the snake from later snapshots
    #[tokio::test]
    async fn quit_removes_snake() {
        let (addr, _) = start_server(test_config()).await;

        let mut watcher = Connection::join(addr, Some('W')).await.unwrap();
        let mut leaver = Connection::join(addr, Some('L')).await.unwrap();
        wait_for_state(&mut watcher, |s| own_snake(s, 'L').is_some()).await;

        assert_ok!(leaver.writer.send(&ClientMessage::Quit).await);

        wait_for_state(&mut watcher, |s| own_snake(s, 'L').is_none()).await;
    }
}

/// GAMEPLAY TESTS
mod gameplay_tests {
    use super::*;

    /// Tests that a move command changes the snake's heading
    #[tokio::test]
    async fn move_changes_direction() {
        let (addr, _) = start_server(test_config()).await;
        let mut player = Connection::join(addr, Some('M')).await.unwrap();

        let snapshot = wait_for_state(&mut player, |s| own_snake(s, 'M').is_some()).await;
        let head = own_snake(&snapshot, 'M').and_then(|s| s.head()).unwrap();
        // Turn towards the larger half so the wall is far away
        let dir = if head.y < 15 {
            Direction::Down
        } else {
            Direction::Up
        };

        player.writer.send(&ClientMessage::Move { dir }).await.unwrap();
        let snapshot = wait_for_state(&mut player, |s| {
            own_snake(s, 'M').map_or(false, |snake| snake.direction == dir)
        })
        .await;
        assert!(own_snake(&snapshot, 'M').unwrap().alive);
    }

    /// Tests restart refusal while another player is alive
    #[tokio::test]
    async fn restart_refused_while_others_alive() {
        let config = GameConfig {
            // Slow ticks keep both snakes well away from the walls
            game_speed: 4.0,
            ..test_config()
        };
        let (addr, _) = start_server(config).await;
        let mut first = Connection::join(addr, Some('A')).await.unwrap();
        let _second = Connection::join(addr, Some('B')).await.unwrap();

        first.writer.send(&ClientMessage::Restart).await.unwrap();
        let reason = timeout(WAIT, async {
            loop {
                match first.reader.recv().await.unwrap() {
                    Some(ServerMessage::Error { reason }) => return reason,
                    Some(_) => continue,
                    None => panic!("server closed the connection"),
                }
            }
        })
        .await
        .unwrap();
        assert!(reason.contains("restart"), "{}", reason);
    }

    /// Tests that bots keep moving while a human plays
    #[tokio::test]
    async fn bots_share_the_board() {
        let config = GameConfig {
            bots: 3,
            bot_level: 9,
            ..test_config()
        };
        let (addr, _) = start_server(config).await;
        let mut player = Connection::join(addr, Some('H')).await.unwrap();

        let snapshot = wait_for_state(&mut player, |s| own_snake(s, 'H').is_some()).await;
        let ids: Vec<&str> = snapshot.snakes.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["H", "bot-1", "bot-2", "bot-3"]);
        for bot in &snapshot.snakes[1..] {
            assert_eq!(bot.level, Some(9));
            assert_eq!(bot.letter, None);
        }
    }
}

/// ROBUSTNESS TESTS
mod robustness_tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    /// Tests that garbage input drops only the offending connection
    #[tokio::test]
    async fn malformed_message_drops_connection() {
        let (addr, _) = start_server(test_config()).await;
        let mut healthy = Connection::join(addr, Some('G')).await.unwrap();

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        write.write_all(b"{\"type\":\"join\"}\n").await.unwrap();
        let assigned = timeout(WAIT, lines.next_line()).await.unwrap().unwrap().unwrap();
        assert!(assigned.contains("assigned"), "{}", assigned);

        write.write_all(b"this is not json\n").await.unwrap();
        let closed = timeout(WAIT, async {
            while let Ok(Some(_)) = lines.next_line().await {}
        })
        .await;
        assert!(closed.is_ok(), "connection stayed open");

        // The other player keeps receiving snapshots
        let tick = wait_for_state(&mut healthy, |_| true).await.tick;
        wait_for_state(&mut healthy, |s| s.tick > tick).await;
    }
}

/// DISCOVERY TESTS
mod discovery_tests {
    use super::*;
    use tokio::net::UdpSocket;

    /// Tests that discovery resolves to the game address
    #[tokio::test]
    async fn discovery_finds_server() {
        let (addr, discovery) = start_server(test_config()).await;
        let found = assert_ok!(discover_at(discovery, 3, Duration::from_millis(500)).await);
        assert_eq!(found, addr);

        let player = Connection::join(found, None).await.unwrap();
        assert_eq!(player.letter, 'A');
    }

    /// Tests exactly one reply per request
    #[tokio::test]
    async fn discovery_replies_once() {
        let (addr, discovery) = start_server(test_config()).await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket
            .send_to(br#"{"type":"discover"}"#, discovery)
            .await
            .unwrap();

        let mut buffer = [0u8; 512];
        let (len, _) = timeout(WAIT, socket.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        let reply: DiscoveryMessage = serde_json::from_slice(&buffer[..len]).unwrap();
        assert_eq!(
            reply,
            DiscoveryMessage::Server {
                host: "127.0.0.1".to_string(),
                port: addr.port()
            }
        );

        let extra = timeout(Duration::from_millis(300), socket.recv_from(&mut buffer)).await;
        assert!(extra.is_err(), "got a second reply");
    }

    /// Tests that discovery gives up when nobody answers
    #[tokio::test]
    async fn discovery_without_server() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = silent.local_addr().unwrap();
        let error = assert_err!(discover_at(target, 2, Duration::from_millis(100)).await);
        assert!(matches!(error, ClientError::NoServerFound));
    }
}
