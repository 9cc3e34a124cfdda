use std::fmt;
use std::io;

use super::packet::{ErrorCode, Opcode, Packet, PacketError};

/// Ways the peer can depart from the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The datagram could not be decoded
    Malformed(PacketError),
    /// No transition exists for this (sent, received) pair
    UnexpectedOpcode {
        sent: Option<Opcode>,
        received: Opcode,
    },
    /// Block number is neither the expected one nor its predecessor
    BlockOutOfWindow {
        opcode: Opcode,
        expected: u16,
        received: u16,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed packet: {e}"),
            Self::UnexpectedOpcode { sent: Some(sent), received } => {
                write!(f, "protocol botch: received {received} after sending {sent}")
            }
            Self::UnexpectedOpcode { sent: None, received } => {
                write!(f, "protocol botch: received {received} before any request")
            }
            Self::BlockOutOfWindow {
                opcode,
                expected,
                received,
            } => write!(f, "{opcode} for block {received}, expected block {expected}"),
        }
    }
}

/// Why a transfer was aborted.
#[derive(Debug)]
pub enum TransferError {
    /// The peer sent an ERROR packet
    Peer { code: ErrorCode, message: String },
    Protocol(Violation),
    /// No response after the last allowed retransmission
    Timeout { retransmits: u8 },
    /// Reading or writing the local file failed
    LocalIo { code: ErrorCode, source: io::Error },
    /// The socket itself failed
    Transport(io::Error),
}

impl TransferError {
    pub(crate) fn local(source: io::Error) -> Self {
        Self::LocalIo {
            code: ErrorCode::from_io(&source),
            source,
        }
    }

    /// ERROR packet a responder sends before giving up, if any.
    ///
    /// ERROR packets are never answered, and timeouts end silently.
    pub fn reply(&self) -> Option<Packet> {
        match self {
            Self::LocalIo { code, source } => Some(Packet::Error {
                code: *code,
                msg: source.to_string(),
            }),
            Self::Protocol(Violation::Malformed(PacketError::BadMode(_))) => Some(Packet::Error {
                code: ErrorCode::IllegalOperation,
                msg: "Mode isn't netascii or octet".to_string(),
            }),
            Self::Protocol(Violation::UnexpectedOpcode {
                received: Opcode::Error,
                ..
            }) => None,
            Self::Protocol(violation) => Some(Packet::Error {
                code: ErrorCode::IllegalOperation,
                msg: violation.to_string(),
            }),
            Self::Peer { .. } | Self::Timeout { .. } | Self::Transport(_) => None,
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Peer { code, message } => write!(f, "peer error {code}: {message}"),
            Self::Protocol(v) => write!(f, "{v}"),
            Self::Timeout { retransmits } => {
                write!(f, "transfer timed out after {retransmits} retransmissions")
            }
            Self::LocalIo { source, .. } => write!(f, "local file error: {source}"),
            Self::Transport(e) => write!(f, "socket error: {e}"),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::LocalIo { source, .. } => Some(source),
            Self::Transport(e) => Some(e),
            Self::Protocol(Violation::Malformed(e)) => Some(e),
            _ => None,
        }
    }
}

impl From<PacketError> for TransferError {
    fn from(e: PacketError) -> Self {
        Self::Protocol(Violation::Malformed(e))
    }
}

impl From<Violation> for TransferError {
    fn from(v: Violation) -> Self {
        Self::Protocol(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_failure_maps_error_code() {
        let err = TransferError::local(io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert_eq!(
            err.reply(),
            Some(Packet::Error {
                code: ErrorCode::FileNotFound,
                msg: "missing".to_string()
            })
        );
    }

    #[test]
    fn errors_and_timeouts_get_no_reply() {
        let peer = TransferError::Peer {
            code: ErrorCode::DiskFull,
            message: "full".to_string(),
        };
        assert_eq!(peer.reply(), None);
        assert_eq!(TransferError::Timeout { retransmits: 4 }.reply(), None);

        let stray_error = TransferError::Protocol(Violation::UnexpectedOpcode {
            sent: None,
            received: Opcode::Error,
        });
        assert_eq!(stray_error.reply(), None);
    }

    #[test]
    fn bad_mode_is_illegal_operation() {
        let err = TransferError::from(PacketError::BadMode("mail".to_string()));
        match err.reply() {
            Some(Packet::Error { code, .. }) => assert_eq!(code, ErrorCode::IllegalOperation),
            other => panic!("unexpected reply {other:?}"),
        }
    }
}
