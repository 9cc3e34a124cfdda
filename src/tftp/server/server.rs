use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::UdpSocket;

use super::config::Config;
use super::store::DirectoryStore;
use super::worker::{InFlight, Worker};
use crate::tftp::core::{FileStore, RECV_BUFFER};

/// TFTP server
///
/// Listens for requests on the configured port and hands each one to a
/// [`Worker`] running on tokio's blocking pool. Transfers never touch the
/// listening socket.
///
/// A client gets at most one transfer at a time: while its worker runs,
/// further requests from the same address (usually a resent RRQ/WRQ) are
/// dropped.
pub struct Server {
    socket: UdpSocket,
    store: Arc<dyn FileStore>,
    in_flight: InFlight,
    config: Config,
}

impl Server {
    /// Bind the request socket
    pub async fn bind(config: &Config) -> anyhow::Result<Self> {
        let addr = SocketAddr::new(config.ip_address, config.port);
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        Ok(Self {
            socket,
            store: Arc::new(DirectoryStore::new(config)),
            in_flight: InFlight::default(),
            config: config.clone(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serve requests until the task is cancelled
    pub async fn listen(&self) -> anyhow::Result<()> {
        let mut buf = vec![0u8; RECV_BUFFER];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, from)) => {
                    log::debug!("Request of {} bytes from {}", len, from);
                    self.spawn(buf[..len].to_vec(), from);
                }
                Err(e) => {
                    log::error!("Failed to receive request: {}", e);
                }
            }
        }
    }

    /// Start a worker; its outcome is logged by the worker itself.
    fn spawn(&self, request: Vec<u8>, from: SocketAddr) {
        let Some(claim) = self.in_flight.claim(from) else {
            log::debug!("Dropping request from {}, transfer already in progress", from);
            return;
        };
        let worker = Worker::new(
            Arc::clone(&self.store),
            self.config.rtt,
            self.config.ip_address,
            request,
            claim,
        );
        tokio::task::spawn_blocking(move || worker.run());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tftp::core::{ErrorCode, Packet};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn garbage_request_is_answered_from_new_port() {
        let config = Config::new("127.0.0.1".parse().unwrap(), 0, std::env::temp_dir(), true);
        let server = Server::bind(&config).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let listener = tokio::spawn(async move { server.listen().await });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(&Packet::Ack(7).serialize().unwrap(), server_addr)
            .await
            .unwrap();

        let mut buf = [0u8; RECV_BUFFER];
        let (len, from) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(from, server_addr);
        match Packet::deserialize(&buf[..len]).unwrap() {
            Packet::Error { code, .. } => assert_eq!(code, ErrorCode::IllegalOperation),
            other => panic!("expected ERROR, got {other:?}"),
        }

        listener.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_request_gets_one_session() {
        let dir = std::env::temp_dir().join(format!("tftpx-repeat-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("big.bin"), vec![0x5a; 1000]).unwrap();

        let config = Config::new("127.0.0.1".parse().unwrap(), 0, dir.clone(), true);
        let server = Server::bind(&config).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let listener = tokio::spawn(async move { server.listen().await });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let rrq = Packet::Rrq {
            filename: "big.bin".to_string(),
            mode: crate::tftp::core::Mode::Octet,
        }
        .serialize()
        .unwrap();
        client.send_to(&rrq, server_addr).await.unwrap();
        client.send_to(&rrq, server_addr).await.unwrap();

        // DATA 1 is never acknowledged, so the session stays in progress.
        let mut sources = std::collections::HashSet::new();
        let mut buf = [0u8; RECV_BUFFER];
        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        while let Ok(received) =
            tokio::time::timeout_at(deadline, client.recv_from(&mut buf)).await
        {
            let (len, from) = received.unwrap();
            assert!(matches!(
                Packet::deserialize(&buf[..len]).unwrap(),
                Packet::Data { block_num: 1, .. }
            ));
            sources.insert(from);
        }
        assert_eq!(sources.len(), 1);

        listener.abort();
        let _ = std::fs::remove_dir_all(&dir);
    }
}
