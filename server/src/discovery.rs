//! LAN discovery responder
//!
//! Answers every `discover` datagram with exactly one `server` datagram naming
//! the game address. Anything else is ignored.

use crate::error::ServerError;
use log::{debug, error, info, warn};
use shared::DiscoveryMessage;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;

pub struct DiscoveryResponder {
    socket: UdpSocket,
    game_addr: SocketAddr,
}

impl DiscoveryResponder {
    pub async fn bind(addr: SocketAddr, game_addr: SocketAddr) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!("Discovery listening on {}", socket.local_addr()?);
        Ok(Self { socket, game_addr })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn run(self) {
        let mut buffer = [0u8; 512];
        loop {
            match self.socket.recv_from(&mut buffer).await {
                Ok((len, peer)) => {
                    if let Err(e) = self.respond(&buffer[..len], peer).await {
                        warn!("Failed to answer discovery from {}: {}", peer, e);
                    }
                }
                Err(e) => {
                    error!("Error receiving discovery datagram: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    async fn respond(&self, datagram: &[u8], peer: SocketAddr) -> io::Result<()> {
        match serde_json::from_slice::<DiscoveryMessage>(datagram) {
            Ok(DiscoveryMessage::Discover) => {
                let host = advertised_host(self.game_addr.ip(), peer).await;
                let reply = DiscoveryMessage::Server {
                    host: host.to_string(),
                    port: self.game_addr.port(),
                };
                let data = serde_json::to_vec(&reply)?;
                self.socket.send_to(&data, peer).await?;
                debug!("Told {} about {}:{}", peer, host, self.game_addr.port());
            }
            Ok(other) => debug!("Ignoring {:?} from {}", other, peer),
            Err(e) => debug!("Ignoring malformed datagram from {}: {}", peer, e),
        }
        Ok(())
    }
}

/// Address a requester should dial. A wildcard bind is replaced by the local
/// interface the routing table picks for `peer`.
pub async fn advertised_host(bound: IpAddr, peer: SocketAddr) -> IpAddr {
    if !bound.is_unspecified() {
        return bound;
    }
    match route_to(peer).await {
        Ok(ip) => ip,
        Err(e) => {
            warn!("No route back to {}: {}", peer, e);
            bound
        }
    }
}

async fn route_to(peer: SocketAddr) -> io::Result<IpAddr> {
    let any: IpAddr = match peer {
        SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };
    // Connecting a UDP socket sends nothing, it only selects a route
    let route = UdpSocket::bind(SocketAddr::new(any, 0)).await?;
    route.connect(peer).await?;
    Ok(route.local_addr()?.ip())
}
