//! State of a single transfer
//!
//! A [`Session`] is owned by exactly one thread for its whole life. The
//! retransmission controller and the transfer state machine both operate on
//! it through `&mut`, so nothing here is shared or locked.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::file::{FileSink, FileSource, FileStore};
use super::packet::{BLOCK_SIZE, Mode, Opcode, Packet};
use super::rtt::{RttConfig, RttEstimator};

/// Which side of the transfer this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sent the RRQ/WRQ (client)
    Requester,
    /// Services a received RRQ/WRQ (server)
    Responder,
}

/// The local end of the data stream.
pub(crate) enum Local {
    Source(Box<dyn FileSource>),
    Sink(Box<dyn FileSink>),
}

/// Statistics for a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSummary {
    /// Payload bytes sent or received, as carried on the wire
    pub bytes: u64,
    /// DATA blocks sent or accepted
    pub blocks: u64,
    pub retransmits: u32,
    pub elapsed: Duration,
}

pub struct Session {
    pub(crate) role: Role,
    pub(crate) mode: Mode,
    peer: Option<SocketAddr>,
    peer_latched: bool,
    filename: Option<String>,
    /// Next DATA block to accept, or the DATA block awaiting its ACK
    pub(crate) expected_block: u16,
    /// Payload length of the DATA block most recently sent
    pub(crate) last_data_len: usize,
    last_sent: Vec<u8>,
    last_sent_opcode: Option<Opcode>,
    pending_request: Option<Packet>,
    pub(crate) bytes_transferred: u64,
    pub(crate) blocks: u64,
    pub(crate) finished: bool,
    pub(crate) local: Option<Local>,
    pub(crate) store: Option<Arc<dyn FileStore>>,
    pub(crate) rtt: RttEstimator,
    started: Instant,
}

impl Session {
    fn new(role: Role, mode: Mode, peer: Option<SocketAddr>, config: RttConfig) -> Self {
        Self {
            role,
            mode,
            peer,
            peer_latched: false,
            filename: None,
            expected_block: 0,
            last_data_len: BLOCK_SIZE,
            last_sent: Vec::new(),
            last_sent_opcode: None,
            pending_request: None,
            bytes_transferred: 0,
            blocks: 0,
            finished: false,
            local: None,
            store: None,
            rtt: RttEstimator::new(config),
            started: Instant::now(),
        }
    }

    /// Requester session that reads `filename` from `server` into `sink`.
    pub fn read(
        server: SocketAddr,
        filename: &str,
        mode: Mode,
        sink: Box<dyn FileSink>,
        config: RttConfig,
    ) -> Self {
        let mut session = Self::new(Role::Requester, mode, Some(server), config);
        session.filename = Some(filename.to_string());
        session.expected_block = 1;
        session.local = Some(Local::Sink(sink));
        session.pending_request = Some(Packet::Rrq {
            filename: filename.to_string(),
            mode,
        });
        session
    }

    /// Requester session that writes `source` to `filename` on `server`.
    pub fn write(
        server: SocketAddr,
        filename: &str,
        mode: Mode,
        source: Box<dyn FileSource>,
        config: RttConfig,
    ) -> Self {
        let mut session = Self::new(Role::Requester, mode, Some(server), config);
        session.filename = Some(filename.to_string());
        // The WRQ is answered by ACK 0.
        session.expected_block = 0;
        session.local = Some(Local::Source(source));
        session.pending_request = Some(Packet::Wrq {
            filename: filename.to_string(),
            mode,
        });
        session
    }

    /// Responder session; the peer and the file are fixed by the first request.
    pub fn responder(store: Arc<dyn FileStore>, config: RttConfig) -> Self {
        let mut session = Self::new(Role::Responder, Mode::default(), None, config);
        session.store = Some(store);
        session
    }

    /// Checks a datagram's source, latching the peer on first contact.
    ///
    /// A requester's server may answer from a new port, so only the IP is
    /// checked until the first reply arrives. After that every datagram must
    /// match the latched address exactly.
    pub fn accepts(&mut self, from: SocketAddr) -> bool {
        if self.peer_latched {
            return self.peer == Some(from);
        }
        match self.peer {
            Some(peer) if peer.ip() != from.ip() => false,
            _ => {
                self.peer = Some(from);
                self.peer_latched = true;
                true
            }
        }
    }

    pub(crate) fn take_request(&mut self) -> Option<Packet> {
        self.pending_request.take()
    }

    pub(crate) fn record_sent(&mut self, opcode: Opcode, bytes: Vec<u8>) {
        self.last_sent_opcode = Some(opcode);
        self.last_sent = bytes;
    }

    pub(crate) fn set_filename(&mut self, filename: &str) {
        self.filename = Some(filename.to_string());
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn expected_block(&self) -> u16 {
        self.expected_block
    }

    pub fn last_sent(&self) -> &[u8] {
        &self.last_sent
    }

    pub fn last_sent_opcode(&self) -> Option<Opcode> {
        self.last_sent_opcode
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    pub fn summary(&self) -> TransferSummary {
        TransferSummary {
            bytes: self.bytes_transferred,
            blocks: self.blocks,
            retransmits: self.rtt.total_retransmits(),
            elapsed: self.started.elapsed(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("mode", &self.mode)
            .field("peer", &self.peer)
            .field("filename", &self.filename)
            .field("expected_block", &self.expected_block)
            .field("last_sent_opcode", &self.last_sent_opcode)
            .field("bytes_transferred", &self.bytes_transferred)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
