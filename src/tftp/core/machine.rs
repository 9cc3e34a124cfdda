//! Transfer state machine
//!
//! The next action depends on the opcode we last sent and the packet that
//! just arrived:
//!
//! | sent        | received   | action                          |
//! |-------------|------------|---------------------------------|
//! | nothing     | RRQ / WRQ  | open the file, send DATA 1 / ACK 0 |
//! | RRQ / ACK   | DATA       | accept block, send ACK          |
//! | WRQ / DATA  | ACK        | send next DATA or finish        |
//! | DATA / ACK  | ERROR      | peer aborted                    |
//! | RRQ / WRQ   | ERROR      | request refused                 |
//!
//! Every other pair is a protocol botch and aborts the session.

use super::error::{TransferError, Violation};
use super::file::FileSink;
use super::packet::{BLOCK_SIZE, Mode, Opcode, Packet, is_final_block};
use super::session::{Local, Role, Session};

/// What the controller does after a packet was handled.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// Send this packet and wait for the answer
    Send(Packet),
    /// Nothing to send; keep waiting for the answer to the last packet
    Ignore,
    /// The transfer is complete once the optional final packet is sent
    Done(Option<Packet>),
}

/// Handles one decoded packet from the peer.
pub fn dispatch(session: &mut Session, packet: Packet) -> Result<Step, TransferError> {
    use Opcode::*;

    let sent = session.last_sent_opcode();
    match (sent, packet) {
        (None, Packet::Rrq { filename, mode }) if session.role == Role::Responder => {
            accept_read(session, &filename, mode)
        }
        (None, Packet::Wrq { filename, mode }) if session.role == Role::Responder => {
            accept_write(session, &filename, mode)
        }
        (Some(Rrq | Ack), Packet::Data { block_num, data }) => on_data(session, block_num, &data),
        (Some(Wrq | Data), Packet::Ack(block_num)) => on_ack(session, block_num),
        (Some(Rrq | Wrq | Data | Ack), Packet::Error { code, msg }) => {
            Err(TransferError::Peer { code, message: msg })
        }
        (sent, packet) => Err(Violation::UnexpectedOpcode {
            sent,
            received: packet.opcode(),
        }
        .into()),
    }
}

fn accept_read(session: &mut Session, filename: &str, mode: Mode) -> Result<Step, TransferError> {
    log::info!("RRQ for {filename} ({mode})");
    session.set_filename(filename);
    session.mode = mode;

    let store = session.store.clone().ok_or(Violation::UnexpectedOpcode {
        sent: None,
        received: Opcode::Rrq,
    })?;
    let source = store.open_read(filename).map_err(TransferError::local)?;
    session.local = Some(Local::Source(source));

    // Behave as if ACK 0 arrived; that sends DATA 1.
    session.expected_block = 0;
    session.last_data_len = BLOCK_SIZE;
    on_ack(session, 0)
}

fn accept_write(session: &mut Session, filename: &str, mode: Mode) -> Result<Step, TransferError> {
    log::info!("WRQ for {filename} ({mode})");
    session.set_filename(filename);
    session.mode = mode;

    let store = session.store.clone().ok_or(Violation::UnexpectedOpcode {
        sent: None,
        received: Opcode::Wrq,
    })?;
    let sink = store.open_write(filename).map_err(TransferError::local)?;
    session.local = Some(Local::Sink(sink));

    session.expected_block = 1;
    Ok(Step::Send(Packet::Ack(0)))
}

fn on_data(session: &mut Session, block_num: u16, data: &[u8]) -> Result<Step, TransferError> {
    let expected = session.expected_block;
    log::debug!("DATA block {block_num}, {} bytes", data.len());

    if block_num == expected {
        let mode = session.mode;
        if !data.is_empty() {
            sink(session)?.write_block(data, mode).map_err(TransferError::local)?;
        }

        session.expected_block = expected.wrapping_add(1);
        session.bytes_transferred += data.len() as u64;
        session.blocks += 1;

        if is_final_block(data.len()) {
            sink(session)?.finish().map_err(TransferError::local)?;
            session.finished = true;
            return Ok(Step::Done(Some(Packet::Ack(block_num))));
        }
        Ok(Step::Send(Packet::Ack(block_num)))
    } else if block_num == expected.wrapping_sub(1) {
        // Our ACK was lost and the peer resent the block.
        log::warn!("duplicate DATA block {block_num}, re-acknowledging");
        Ok(Step::Send(Packet::Ack(block_num)))
    } else {
        Err(Violation::BlockOutOfWindow {
            opcode: Opcode::Data,
            expected,
            received: block_num,
        }
        .into())
    }
}

fn on_ack(session: &mut Session, block_num: u16) -> Result<Step, TransferError> {
    let expected = session.expected_block;
    log::debug!("ACK block {block_num}");

    if block_num == expected {
        let mode = session.mode;
        let sent = session.last_sent_opcode();
        let Some(Local::Source(source)) = session.local.as_mut() else {
            return Err(Violation::UnexpectedOpcode {
                sent,
                received: Opcode::Ack,
            }
            .into());
        };

        let mut data = vec![0u8; BLOCK_SIZE];
        let n = source.read_block(&mut data, mode).map_err(TransferError::local)?;
        if n == 0 && is_final_block(session.last_data_len) {
            session.finished = true;
            return Ok(Step::Done(None));
        }
        data.truncate(n);

        // A zero-length DATA follows a final block of exactly BLOCK_SIZE.
        let next = expected.wrapping_add(1);
        session.expected_block = next;
        session.last_data_len = n;
        session.bytes_transferred += n as u64;
        session.blocks += 1;
        Ok(Step::Send(Packet::Data {
            block_num: next,
            data,
        }))
    } else if block_num == expected.wrapping_sub(1) {
        // Resending DATA here would start the Sorcerer's Apprentice
        // duplication, so the stale ACK is dropped.
        log::warn!("duplicate ACK for block {block_num}, ignored");
        Ok(Step::Ignore)
    } else {
        Err(Violation::BlockOutOfWindow {
            opcode: Opcode::Ack,
            expected,
            received: block_num,
        }
        .into())
    }
}

fn sink(session: &mut Session) -> Result<&mut dyn FileSink, TransferError> {
    let sent = session.last_sent_opcode();
    match session.local.as_mut() {
        Some(Local::Sink(sink)) => Ok(sink.as_mut()),
        _ => Err(Violation::UnexpectedOpcode {
            sent,
            received: Opcode::Data,
        }
        .into()),
    }
}
