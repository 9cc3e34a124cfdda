use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::tftp::core::{
    FileStore, RttConfig, Session, Socket, TransferError, TransferSummary, retransmit,
};

/// Client addresses with a transfer in progress.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<Mutex<HashSet<SocketAddr>>>);

impl InFlight {
    /// Registers `client`; `None` while it already has a transfer running.
    pub fn claim(&self, client: SocketAddr) -> Option<Claim> {
        self.lock().insert(client).then(|| Claim {
            in_flight: self.clone(),
            client,
        })
    }

    pub fn contains(&self, client: SocketAddr) -> bool {
        self.lock().contains(&client)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<SocketAddr>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Entry in [`InFlight`], removed when dropped.
#[derive(Debug)]
pub struct Claim {
    in_flight: InFlight,
    client: SocketAddr,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.client);
    }
}

/// Serves one RRQ/WRQ from start to finish.
///
/// Every worker owns a socket on a fresh ephemeral port, so the request port
/// stays free for new requests. [`Worker::run`] blocks; the server calls it on
/// tokio's blocking pool.
pub struct Worker {
    store: Arc<dyn FileStore>,
    rtt: RttConfig,
    local_ip: IpAddr,
    client: SocketAddr,
    request: Vec<u8>,
    claim: Claim,
}

impl Worker {
    /// Create a worker for the request datagram `request` received from the
    /// client held by `claim`
    pub fn new(
        store: Arc<dyn FileStore>,
        rtt: RttConfig,
        local_ip: IpAddr,
        request: Vec<u8>,
        claim: Claim,
    ) -> Self {
        Self {
            store,
            rtt,
            local_ip,
            client: claim.client,
            request,
            claim,
        }
    }

    pub fn client(&self) -> SocketAddr {
        self.client
    }

    /// Run the transfer; returns once the session has ended and the client
    /// may start another.
    pub fn run(self) -> Result<TransferSummary, TransferError> {
        let _claim = self.claim;
        let mut socket =
            Socket::bind(SocketAddr::new(self.local_ip, 0)).map_err(TransferError::Transport)?;
        if let Ok(local) = socket.local_addr() {
            log::debug!("Serving {} from {}", self.client, local);
        }

        let mut session = Session::responder(self.store, self.rtt);
        let result = retransmit::serve(&mut session, &mut socket, &self.request, self.client);
        let filename = session.filename().unwrap_or("<none>");

        match &result {
            Ok(summary) => log::info!(
                "{} {} {}: {} bytes in {:.1} seconds, {} retransmissions",
                self.client,
                session.mode(),
                filename,
                summary.bytes,
                summary.elapsed.as_secs_f64(),
                summary.retransmits
            ),
            Err(e) => log::error!("{} {}: {}", self.client, filename, e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tftp::core::{ErrorCode, Packet, RECV_BUFFER};
    use crate::tftp::server::{Config, DirectoryStore};
    use std::time::Duration;

    #[test]
    fn refused_request_gets_error_packet() {
        let config = Config::new("127.0.0.1".parse().unwrap(), 0, std::env::temp_dir(), true);
        let store: Arc<dyn FileStore> = Arc::new(DirectoryStore::new(&config));

        let client = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let request = Packet::Wrq {
            filename: "upload.bin".to_string(),
            mode: crate::tftp::core::Mode::Octet,
        }
        .serialize()
        .unwrap();

        let in_flight = InFlight::default();
        let client_addr = client.local_addr().unwrap();
        let claim = in_flight.claim(client_addr).unwrap();
        let worker = Worker::new(store, RttConfig::default(), config.ip_address, request, claim);
        let err = worker.run().unwrap_err();
        assert!(!in_flight.contains(client_addr));
        assert!(matches!(
            err,
            TransferError::LocalIo {
                code: ErrorCode::AccessDenied,
                ..
            }
        ));

        let mut buf = [0u8; RECV_BUFFER];
        let (len, _) = client.recv_from(&mut buf).unwrap();
        match Packet::deserialize(&buf[..len]).unwrap() {
            Packet::Error { code, .. } => assert_eq!(code, ErrorCode::AccessDenied),
            other => panic!("expected ERROR, got {other:?}"),
        }
    }

    #[test]
    fn one_claim_per_client() {
        let in_flight = InFlight::default();
        let a: SocketAddr = "10.0.0.2:5000".parse().unwrap();
        let b: SocketAddr = "10.0.0.2:5001".parse().unwrap();

        let first = in_flight.claim(a).unwrap();
        assert!(in_flight.claim(a).is_none());
        let other = in_flight.claim(b).unwrap();

        drop(first);
        assert!(!in_flight.contains(a));
        assert!(in_flight.claim(a).is_some());
        assert!(in_flight.contains(b));
        drop(other);
        assert!(!in_flight.contains(b));
    }
}
