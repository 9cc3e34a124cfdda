//! Retransmission controller
//!
//! Drives a [`Session`] to completion with exactly one unacknowledged packet
//! outstanding:
//!
//! ```text
//! arm timeout (rtt start) -> wait for datagram or deadline
//!   deadline: on_timeout -> retransmit last packet | give up
//!   datagram: check source -> decode -> dispatch
//!             duplicate: keep waiting, same deadline
//!             otherwise: rtt stop -> send next packet | done
//! ```

use std::net::SocketAddr;
use std::time::Instant;

use super::error::TransferError;
use super::machine::{self, Step};
use super::packet::{ErrorCode, Opcode, Packet};
use super::rtt::Verdict;
use super::session::{Role, Session, TransferSummary};
use super::socket::{RECV_BUFFER, Received, Transport};

/// Runs a requester session: sends the RRQ/WRQ, then drives the transfer.
pub fn transfer<T: Transport>(
    session: &mut Session,
    transport: &mut T,
) -> Result<TransferSummary, TransferError> {
    let request = session.take_request().ok_or_else(|| {
        TransferError::Transport(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "session has no pending request",
        ))
    })?;

    let mut controller = Controller { session, transport };
    controller.send_new(request)?;
    controller.drive()?;
    Ok(controller.session.summary())
}

/// Runs a responder session, starting from the request datagram `first`
/// received from `from`.
///
/// On failure the peer gets one best-effort ERROR packet when
/// [`TransferError::reply`] provides one.
pub fn serve<T: Transport>(
    session: &mut Session,
    transport: &mut T,
    first: &[u8],
    from: SocketAddr,
) -> Result<TransferSummary, TransferError> {
    let mut controller = Controller { session, transport };
    match controller.serve(first, from) {
        Ok(()) => Ok(controller.session.summary()),
        Err(err) => {
            controller.report(&err);
            Err(err)
        }
    }
}

struct Controller<'a, T> {
    session: &'a mut Session,
    transport: &'a mut T,
}

impl<T: Transport> Controller<'_, T> {
    fn serve(&mut self, first: &[u8], from: SocketAddr) -> Result<(), TransferError> {
        if !self.session.accepts(from) {
            return Err(TransferError::Transport(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("request from {from} does not match session peer"),
            )));
        }

        let request = decode(first)?;
        if !self.handle(request)? {
            return Ok(());
        }
        self.drive()
    }

    /// Waits for and handles answers until the session terminates.
    fn drive(&mut self) -> Result<(), TransferError> {
        let mut buf = [0u8; RECV_BUFFER];

        loop {
            let timeout = self.session.rtt.start();
            let deadline = Instant::now() + timeout;

            let Some(step) = self.answer(&mut buf, deadline)? else {
                match self.session.rtt.on_timeout() {
                    Verdict::GiveUp => {
                        return Err(TransferError::Timeout {
                            retransmits: self.session.rtt.retransmits().saturating_sub(1),
                        });
                    }
                    Verdict::Retry => {
                        log::warn!(
                            "timeout after {:?}, retransmitting {} (attempt {})",
                            timeout,
                            describe_last(self.session),
                            self.session.rtt.retransmits()
                        );
                        self.retransmit()?;
                        continue;
                    }
                }
            };

            if !self.apply(step)? {
                return Ok(());
            }
        }
    }

    /// Waits for the answer to the packet in flight; `None` on timeout.
    ///
    /// A duplicate ACK is dropped here: the deadline stays armed and the
    /// estimators only see the response to the packet in flight.
    fn answer(&mut self, buf: &mut [u8], deadline: Instant) -> Result<Option<Step>, TransferError> {
        loop {
            let Some(len) = self.wait(buf, deadline)? else {
                return Ok(None);
            };
            let arrived = Instant::now();
            let packet = decode(&buf[..len])?;

            match machine::dispatch(self.session, packet)? {
                Step::Ignore => continue,
                step => {
                    self.session.rtt.stop_at(arrived);
                    return Ok(Some(step));
                }
            }
        }
    }

    fn handle(&mut self, packet: Packet) -> Result<bool, TransferError> {
        let step = machine::dispatch(self.session, packet)?;
        self.apply(step)
    }

    /// Acts on one dispatch result; returns `false` once the session is complete.
    fn apply(&mut self, step: Step) -> Result<bool, TransferError> {
        match step {
            Step::Send(next) => {
                self.send_new(next)?;
                Ok(true)
            }
            Step::Ignore => Ok(true),
            Step::Done(last) => {
                if let Some(last) = last {
                    self.send_new(last)?;
                }
                log::debug!("transfer complete, {} bytes", self.session.bytes_transferred());
                Ok(false)
            }
        }
    }

    /// Waits for a datagram from the session's peer; `None` on timeout.
    ///
    /// Datagrams from anyone else are dropped without touching the timer.
    fn wait(&mut self, buf: &mut [u8], deadline: Instant) -> Result<Option<usize>, TransferError> {
        loop {
            match self
                .transport
                .recv_until(buf, deadline)
                .map_err(TransferError::Transport)?
            {
                Received::TimedOut => return Ok(None),
                Received::Datagram { len, from } => {
                    if self.session.accepts(from) {
                        return Ok(Some(len));
                    }
                    log::warn!(
                        "ignoring {len} byte datagram from {from}, expected {:?}",
                        self.session.peer()
                    );
                }
            }
        }
    }

    fn peer(&self) -> Result<SocketAddr, TransferError> {
        self.session.peer().ok_or_else(|| {
            TransferError::Transport(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "session has no peer address",
            ))
        })
    }

    /// Sends a packet that has not been sent before.
    fn send_new(&mut self, packet: Packet) -> Result<(), TransferError> {
        let bytes = packet.serialize()?;
        let peer = self.peer()?;
        log::debug!("sending {} ({} bytes) to {}", describe(&packet), bytes.len(), peer);

        self.transport
            .send_to(&bytes, peer)
            .map_err(TransferError::Transport)?;
        self.session.record_sent(packet.opcode(), bytes);
        self.session.rtt.new_packet();
        Ok(())
    }

    fn retransmit(&mut self) -> Result<(), TransferError> {
        let peer = self.peer()?;
        self.transport
            .send_to(self.session.last_sent(), peer)
            .map_err(TransferError::Transport)
    }

    /// Best-effort ERROR packet to the peer of a failed responder session.
    fn report(&mut self, err: &TransferError) {
        if self.session.role() != Role::Responder {
            return;
        }
        let (Some(reply), Some(peer)) = (err.reply(), self.session.peer()) else {
            return;
        };
        let Ok(bytes) = reply.serialize() else {
            return;
        };
        if let Err(e) = self.transport.send_to(&bytes, peer) {
            log::debug!("could not send ERROR to {peer}: {e}");
        }
    }
}

/// Decodes a datagram from the peer.
///
/// An ERROR that cannot be decoded still ends the transfer as a peer error,
/// so it is never answered.
fn decode(buf: &[u8]) -> Result<Packet, TransferError> {
    Packet::deserialize(buf).map_err(|err| {
        if buf.len() >= 2 && u16::from_be_bytes([buf[0], buf[1]]) == Opcode::Error as u16 {
            TransferError::Peer {
                code: ErrorCode::Undefined,
                message: format!("malformed ERROR packet: {err}"),
            }
        } else {
            err.into()
        }
    })
}

fn describe(packet: &Packet) -> String {
    match packet {
        Packet::Rrq { filename, mode } => format!("RRQ {filename} ({mode})"),
        Packet::Wrq { filename, mode } => format!("WRQ {filename} ({mode})"),
        Packet::Data { block_num, data } => format!("DATA block {block_num}, {} bytes", data.len()),
        Packet::Ack(block_num) => format!("ACK block {block_num}"),
        Packet::Error { code, msg } => format!("ERROR {code}: {msg}"),
    }
}

fn describe_last(session: &Session) -> String {
    match session.last_sent_opcode() {
        Some(opcode) => format!("{opcode}"),
        None => "nothing".to_string(),
    }
}
