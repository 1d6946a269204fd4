//! Roaming UDP endpoint.
//!
//! Wraps a single `tokio::net::UdpSocket` bound to whatever peer address is
//! currently believed correct. A better-path discovery (a datagram
//! authenticating from a new source address) swaps the remembered peer
//! address in place — the SSP sequence state above this layer never resets,
//! since roaming is purely an address change, not a new session.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;

/// Maximum UDP datagram this endpoint will accept; larger reads are
/// truncated by the kernel before we ever see them, so this only bounds our
/// own read buffer.
const MAX_DATAGRAM_SIZE: usize = 2048;

/// A UDP endpoint that can roam to a new peer address without losing its
/// socket or requiring the caller to rebind.
pub struct Endpoint {
    socket: UdpSocket,
    peer: RwLock<SocketAddr>,
}

impl Endpoint {
    /// Bind a socket to `local_addr` with an initially assumed `peer_addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be bound.
    pub async fn bind(local_addr: SocketAddr, peer_addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local_addr)
            .await
            .with_context(|| format!("failed to bind UDP endpoint on {local_addr}"))?;
        Ok(Self {
            socket,
            peer: RwLock::new(peer_addr),
        })
    }

    /// The peer address currently believed correct.
    pub async fn peer_addr(&self) -> SocketAddr {
        *self.peer.read().await
    }

    /// Send `datagram` to the currently remembered peer.
    ///
    /// # Errors
    ///
    /// Returns an error on an OS-level send failure.
    pub async fn send(&self, datagram: &[u8]) -> Result<()> {
        let peer = self.peer_addr().await;
        self.socket
            .send_to(datagram, peer)
            .await
            .with_context(|| format!("failed to send datagram to {peer}"))?;
        Ok(())
    }

    /// Receive one datagram, reporting which address it arrived from.
    ///
    /// The caller decides whether the new address indicates a roam (it
    /// authenticated under the session key) before calling
    /// [`Endpoint::note_viable_peer`].
    ///
    /// # Errors
    ///
    /// Returns an error on an OS-level receive failure.
    pub async fn recv(&self) -> Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, from) = self
            .socket
            .recv_from(&mut buf)
            .await
            .context("failed to receive datagram")?;
        buf.truncate(len);
        Ok((buf, from))
    }

    /// Record a new, authenticated peer address as viable.
    ///
    /// Call this only after a datagram from `addr` has passed OCB3
    /// authentication — an unauthenticated source must never move the peer,
    /// or any off-path attacker could redirect the session.
    pub async fn note_viable_peer(&self, addr: SocketAddr) {
        let mut peer = self.peer.write().await;
        if *peer != addr {
            log::info!("peer roamed from {} to {}", *peer, addr);
            *peer = addr;
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("local_addr", &self.socket.local_addr().ok())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_recv_round_trip() {
        let a_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let b_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

        let a_socket = UdpSocket::bind(a_addr).await.unwrap();
        let b_socket = UdpSocket::bind(b_addr).await.unwrap();
        let a_local = a_socket.local_addr().unwrap();
        let b_local = b_socket.local_addr().unwrap();
        drop(a_socket);
        drop(b_socket);

        let a = Endpoint::bind(a_local, b_local).await.unwrap();
        let b = Endpoint::bind(b_local, a_local).await.unwrap();

        a.send(b"hello").await.unwrap();
        let (data, from) = b.recv().await.unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(from, a_local);
    }

    #[tokio::test]
    async fn note_viable_peer_updates_destination() {
        let local: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let initial_peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let endpoint = Endpoint::bind(local, initial_peer).await.unwrap();
        assert_eq!(endpoint.peer_addr().await, initial_peer);

        let new_peer: SocketAddr = "127.0.0.1:2".parse().unwrap();
        endpoint.note_viable_peer(new_peer).await;
        assert_eq!(endpoint.peer_addr().await, new_peer);
    }
}
