//! Socket abstraction layer
//!
//! The engine talks to the network only through [`Transport`]. A receive
//! takes an absolute deadline, so a timeout is an ordinary return value
//! and each session's timer is independent of every other session.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Instant;

/// Receive buffer size; larger than any valid packet so oversized DATA is detected.
pub const RECV_BUFFER: usize = 2048;

/// Result of waiting for a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    Datagram { len: usize, from: SocketAddr },
    TimedOut,
}

/// Datagram transport used by a session.
pub trait Transport {
    fn send_to(&mut self, buf: &[u8], peer: SocketAddr) -> io::Result<()>;

    /// Waits for one datagram until `deadline`.
    fn recv_until(&mut self, buf: &mut [u8], deadline: Instant) -> io::Result<Received>;
}

/// Blocking UDP socket with per-call deadlines.
#[derive(Debug)]
pub struct Socket {
    inner: UdpSocket,
}

impl Socket {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        Ok(Self {
            inner: UdpSocket::bind(addr)?,
        })
    }

    /// Binds an ephemeral port of the same address family as `peer`.
    pub fn ephemeral_for(peer: SocketAddr) -> io::Result<Self> {
        let ip = match peer.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        Self::bind(SocketAddr::new(ip, 0))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

impl Transport for Socket {
    fn send_to(&mut self, buf: &[u8], peer: SocketAddr) -> io::Result<()> {
        let sent = self.inner.send_to(buf, peer)?;
        if sent != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short send: {sent} of {} bytes", buf.len()),
            ));
        }
        Ok(())
    }

    fn recv_until(&mut self, buf: &mut [u8], deadline: Instant) -> io::Result<Received> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Received::TimedOut);
            }
            self.inner.set_read_timeout(Some(remaining))?;

            match self.inner.recv_from(buf) {
                Ok((len, from)) => return Ok(Received::Datagram { len, from }),
                Err(e) => match e.kind() {
                    // The deadline is re-checked at the top of the loop.
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => {}
                    // ICMP unreachable from an earlier send, reported on some platforms
                    io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused => {
                        log::debug!("ignoring {e} on receive");
                    }
                    _ => return Err(e),
                },
            }
        }
    }
}
