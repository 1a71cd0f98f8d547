//! Datagram transport abstraction.
//!
//! [`Transport`] is the seam between the protocol engines and the network:
//! it moves whole [`Packet`]s to and from peer addresses. [`Socket`] is the
//! production implementation over `tokio::net::UdpSocket`; the fault
//! injector in [`crate::simulator`] wraps any other transport.
//!
//! All methods take `&self` so one transport can be shared between the
//! sender engine and the acknowledgment task.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::packet::{Packet, PacketError, MSS_SIZE};

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS. Fatal for the transfer.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A datagram could not be encoded or decoded as a packet.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
}

/// A packet-oriented, unreliable datagram channel.
pub trait Transport: Send + Sync + 'static {
    /// Encode `packet` and send it as one datagram to `dest`.
    fn send_to(
        &self,
        packet: &Packet,
        dest: SocketAddr,
    ) -> impl Future<Output = Result<(), SocketError>> + Send;

    /// Receive the next datagram and decode it.
    ///
    /// Datagrams that fail to decode come back as
    /// [`SocketError::Packet`]; the caller decides whether to carry on.
    fn recv_from(&self) -> impl Future<Output = Result<(Packet, SocketAddr), SocketError>> + Send;

    fn local_addr(&self) -> SocketAddr;
}

/// An async, packet-oriented UDP socket.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after the OS assigns a port).
    local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing port 0 lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Bind an ephemeral port on the unspecified address of `peer`'s family,
    /// so an IPv6 peer is reachable as well as an IPv4 one.
    pub async fn bind_for(peer: SocketAddr) -> Result<Self, SocketError> {
        Self::bind(unspecified_for(peer)).await
    }
}

fn unspecified_for(peer: SocketAddr) -> SocketAddr {
    let ip = match peer {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}

impl Transport for Socket {
    async fn send_to(&self, packet: &Packet, dest: SocketAddr) -> Result<(), SocketError> {
        let bytes = packet.encode()?;
        self.inner.send_to(&bytes, dest).await?;
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Packet, SocketAddr), SocketError> {
        let mut buf = vec![0u8; MSS_SIZE];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        let packet = Packet::decode(&buf[..n])?;
        Ok((packet, addr))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
