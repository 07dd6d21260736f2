//! Typed terminal commands

use shared::{ClientMessage, Direction};

pub const HELP: &str = "w/a/s/d or up/left/down/right to steer, r to restart, q to quit";

/// Maps one line of terminal input to a protocol message
pub fn parse_command(line: &str) -> Option<ClientMessage> {
    let dir = match line.trim().to_ascii_lowercase().as_str() {
        "w" | "k" | "up" => Direction::Up,
        "s" | "j" | "down" => Direction::Down,
        "a" | "h" | "left" => Direction::Left,
        "d" | "l" | "right" => Direction::Right,
        "r" | "restart" => return Some(ClientMessage::Restart),
        "q" | "quit" | "exit" => return Some(ClientMessage::Quit),
        _ => return None,
    };
    Some(ClientMessage::Move { dir })
}
