//! Packet serialization and deserialization
//!
//! Every TFTP datagram starts with a 2-byte big-endian opcode:
//!
//! ```text
//!  RRQ/WRQ   | 01/02 | filename | 0 | mode | 0 |
//!  DATA      | 03    | block#   | data (0..512) |
//!  ACK       | 04    | block#   |
//!  ERROR     | 05    | errcode  | message | 0 |
//! ```
//!
//! Deserialization never panics on truncated input, it returns a
//! [`PacketError`] instead.

use std::fmt;

/// Largest payload carried by one DATA packet.
pub const BLOCK_SIZE: usize = 512;

/// Opcode plus block number.
pub const HEADER_LEN: usize = 4;

/// Largest datagram the protocol produces (a full DATA packet).
pub const MAX_PACKET: usize = HEADER_LEN + BLOCK_SIZE;

/// Returns `true` if a DATA payload of `len` bytes ends the transfer.
///
/// Both the receiving and the sending side use this to decide termination.
pub fn is_final_block(len: usize) -> bool {
    len < BLOCK_SIZE
}

/// Packet kind as carried in the first two bytes of a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Rrq = 1,
    Wrq = 2,
    Data = 3,
    Ack = 4,
    Error = 5,
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Rrq),
            2 => Some(Self::Wrq),
            3 => Some(Self::Data),
            4 => Some(Self::Ack),
            5 => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rrq => "RRQ",
            Self::Wrq => "WRQ",
            Self::Data => "DATA",
            Self::Ack => "ACK",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Transfer encoding requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Text with CR LF line endings on the wire
    Netascii,
    /// Raw bytes
    #[default]
    Octet,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Netascii => "netascii",
            Self::Octet => "octet",
        }
    }

    /// Parses a mode string, ignoring ASCII case.
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("netascii") {
            Some(Self::Netascii)
        } else if value.eq_ignore_ascii_case("octet") {
            Some(Self::Octet)
        } else {
            None
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown transfer mode '{s}'"))
    }
}

/// Error codes from RFC 1350.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Undefined = 0,
    FileNotFound = 1,
    AccessDenied = 2,
    DiskFull = 3,
    IllegalOperation = 4,
    UnknownTransferId = 5,
    FileAlreadyExists = 6,
    NoSuchUser = 7,
}

impl ErrorCode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Undefined),
            1 => Some(Self::FileNotFound),
            2 => Some(Self::AccessDenied),
            3 => Some(Self::DiskFull),
            4 => Some(Self::IllegalOperation),
            5 => Some(Self::UnknownTransferId),
            6 => Some(Self::FileAlreadyExists),
            7 => Some(Self::NoSuchUser),
            _ => None,
        }
    }

    /// Picks the code reported to a peer for a local I/O failure.
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound => Self::FileNotFound,
            ErrorKind::PermissionDenied => Self::AccessDenied,
            ErrorKind::AlreadyExists => Self::FileAlreadyExists,
            ErrorKind::StorageFull => Self::DiskFull,
            _ => Self::Undefined,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Undefined => "not defined",
            Self::FileNotFound => "file not found",
            Self::AccessDenied => "access violation",
            Self::DiskFull => "disk full or allocation exceeded",
            Self::IllegalOperation => "illegal TFTP operation",
            Self::UnknownTransferId => "unknown transfer ID",
            Self::FileAlreadyExists => "file already exists",
            Self::NoSuchUser => "no such user",
        };
        write!(f, "{} ({})", text, *self as u16)
    }
}

/// A decoded TFTP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Rrq { filename: String, mode: Mode },
    Wrq { filename: String, mode: Mode },
    Data { block_num: u16, data: Vec<u8> },
    Ack(u16),
    Error { code: ErrorCode, msg: String },
}

/// Reasons a datagram cannot be decoded (or a packet cannot be encoded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Fewer than four bytes
    TooShort(usize),
    UnknownOpcode(u16),
    /// A request field is not NUL-terminated inside the datagram
    MissingTerminator(&'static str),
    /// A string field contains an embedded NUL (encode only)
    EmbeddedNul(&'static str),
    BadMode(String),
    /// ACK longer than four bytes
    TrailingBytes(usize),
    PayloadTooLarge(usize),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort(len) => write!(f, "datagram too short ({len} bytes)"),
            Self::UnknownOpcode(op) => write!(f, "unknown opcode {op}"),
            Self::MissingTerminator(field) => write!(f, "{field} is not NUL-terminated"),
            Self::EmbeddedNul(field) => write!(f, "{field} contains a NUL byte"),
            Self::BadMode(mode) => write!(f, "mode '{mode}' isn't netascii or octet"),
            Self::TrailingBytes(len) => write!(f, "ACK packet has length {len}, expected 4"),
            Self::PayloadTooLarge(len) => {
                write!(f, "DATA payload of {len} bytes exceeds {BLOCK_SIZE}")
            }
        }
    }
}

impl std::error::Error for PacketError {}

impl Packet {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Rrq { .. } => Opcode::Rrq,
            Self::Wrq { .. } => Opcode::Wrq,
            Self::Data { .. } => Opcode::Data,
            Self::Ack(_) => Opcode::Ack,
            Self::Error { .. } => Opcode::Error,
        }
    }

    /// Encodes the packet into a fresh buffer.
    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        let mut buf = Vec::with_capacity(MAX_PACKET);
        buf.extend_from_slice(&(self.opcode() as u16).to_be_bytes());

        match self {
            Self::Rrq { filename, mode } | Self::Wrq { filename, mode } => {
                push_cstr(&mut buf, filename, "filename")?;
                push_cstr(&mut buf, mode.as_str(), "mode")?;
            }
            Self::Data { block_num, data } => {
                if data.len() > BLOCK_SIZE {
                    return Err(PacketError::PayloadTooLarge(data.len()));
                }
                buf.extend_from_slice(&block_num.to_be_bytes());
                buf.extend_from_slice(data);
            }
            Self::Ack(block_num) => buf.extend_from_slice(&block_num.to_be_bytes()),
            Self::Error { code, msg } => {
                buf.extend_from_slice(&(*code as u16).to_be_bytes());
                push_cstr(&mut buf, msg, "message")?;
            }
        }

        Ok(buf)
    }

    /// Decodes one datagram.
    pub fn deserialize(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::TooShort(buf.len()));
        }

        let raw = u16::from_be_bytes([buf[0], buf[1]]);
        let opcode = Opcode::from_u16(raw).ok_or(PacketError::UnknownOpcode(raw))?;
        let body = &buf[2..];

        match opcode {
            Opcode::Rrq | Opcode::Wrq => {
                let (filename, rest) = take_cstr(body, "filename")?;
                let (mode, _options) = take_cstr(rest, "mode")?;
                let mode = std::str::from_utf8(mode)
                    .ok()
                    .and_then(Mode::parse)
                    .ok_or_else(|| PacketError::BadMode(String::from_utf8_lossy(mode).into_owned()))?;
                // Filenames are opaque bytes on the wire.
                let filename = String::from_utf8_lossy(filename).into_owned();

                Ok(if opcode == Opcode::Rrq {
                    Self::Rrq { filename, mode }
                } else {
                    Self::Wrq { filename, mode }
                })
            }
            Opcode::Data => {
                let data = &body[2..];
                if data.len() > BLOCK_SIZE {
                    return Err(PacketError::PayloadTooLarge(data.len()));
                }
                Ok(Self::Data {
                    block_num: u16::from_be_bytes([body[0], body[1]]),
                    data: data.to_vec(),
                })
            }
            Opcode::Ack => {
                if buf.len() != HEADER_LEN {
                    return Err(PacketError::TrailingBytes(buf.len()));
                }
                Ok(Self::Ack(u16::from_be_bytes([body[0], body[1]])))
            }
            Opcode::Error => {
                let raw = u16::from_be_bytes([body[0], body[1]]);
                // Codes past 7 (e.g. 8 from option-aware peers) are still errors.
                let code = ErrorCode::from_u16(raw).unwrap_or(ErrorCode::Undefined);
                // Some peers omit the final NUL; take what is there.
                let text = &body[2..];
                let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
                Ok(Self::Error {
                    code,
                    msg: String::from_utf8_lossy(&text[..end]).into_owned(),
                })
            }
        }
    }
}

fn push_cstr(buf: &mut Vec<u8>, value: &str, field: &'static str) -> Result<(), PacketError> {
    if value.as_bytes().contains(&0) {
        return Err(PacketError::EmbeddedNul(field));
    }
    buf.extend_from_slice(value.as_bytes());
    buf.push(0);
    Ok(())
}

fn take_cstr<'a>(buf: &'a [u8], field: &'static str) -> Result<(&'a [u8], &'a [u8]), PacketError> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(PacketError::MissingTerminator(field))?;
    Ok((&buf[..end], &buf[end + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rrq_layout() {
        let bytes = Packet::Rrq {
            filename: "foo.txt".to_string(),
            mode: Mode::Octet,
        }
        .serialize()
        .unwrap();
        assert_eq!(bytes, b"\x00\x01foo.txt\x00octet\x00");
    }

    #[test]
    fn mode_is_case_insensitive() {
        let packet = Packet::deserialize(b"\x00\x02a.bin\x00NetASCII\x00").unwrap();
        assert_eq!(
            packet,
            Packet::Wrq {
                filename: "a.bin".to_string(),
                mode: Mode::Netascii
            }
        );
    }

    #[test]
    fn request_options_are_ignored() {
        let packet = Packet::deserialize(b"\x00\x01f\x00octet\x00blksize\x001024\x00").unwrap();
        assert_eq!(packet.opcode(), Opcode::Rrq);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert_eq!(
            Packet::deserialize(b"\x00\x01f\x00mail\x00"),
            Err(PacketError::BadMode("mail".to_string()))
        );
    }

    #[test]
    fn request_without_terminator() {
        assert_eq!(
            Packet::deserialize(b"\x00\x01foo"),
            Err(PacketError::MissingTerminator("filename"))
        );
        assert_eq!(
            Packet::deserialize(b"\x00\x01foo\x00octet"),
            Err(PacketError::MissingTerminator("mode"))
        );
    }

    #[test]
    fn short_and_unknown() {
        assert_eq!(Packet::deserialize(b""), Err(PacketError::TooShort(0)));
        assert_eq!(Packet::deserialize(b"\x00\x04\x00"), Err(PacketError::TooShort(3)));
        assert_eq!(
            Packet::deserialize(b"\x00\x06\x00\x01"),
            Err(PacketError::UnknownOpcode(6))
        );
        assert_eq!(
            Packet::deserialize(b"\x00\x00\x00\x01"),
            Err(PacketError::UnknownOpcode(0))
        );
    }

    #[test]
    fn ack_with_trailing_bytes() {
        assert_eq!(
            Packet::deserialize(b"\x00\x04\x00\x01\x00"),
            Err(PacketError::TrailingBytes(5))
        );
        assert_eq!(Packet::deserialize(b"\x00\x04\x01\x02"), Ok(Packet::Ack(0x0102)));
    }

    #[test]
    fn data_bounds() {
        assert_eq!(
            Packet::deserialize(b"\x00\x03\x00\x07"),
            Ok(Packet::Data {
                block_num: 7,
                data: Vec::new()
            })
        );

        let mut oversized = vec![0, 3, 0, 1];
        oversized.resize(HEADER_LEN + BLOCK_SIZE + 1, 0xaa);
        assert_eq!(
            Packet::deserialize(&oversized),
            Err(PacketError::PayloadTooLarge(BLOCK_SIZE + 1))
        );

        let full = Packet::Data {
            block_num: 65535,
            data: vec![0x55; BLOCK_SIZE],
        };
        assert_eq!(Packet::deserialize(&full.serialize().unwrap()), Ok(full));
    }

    #[test]
    fn error_packet() {
        let packet = Packet::Error {
            code: ErrorCode::FileNotFound,
            msg: "no such file".to_string(),
        };
        let bytes = packet.serialize().unwrap();
        assert_eq!(bytes, b"\x00\x05\x00\x01no such file\x00");
        assert_eq!(Packet::deserialize(&bytes), Ok(packet));

        // Missing final NUL is tolerated.
        assert_eq!(
            Packet::deserialize(b"\x00\x05\x00\x02denied"),
            Ok(Packet::Error {
                code: ErrorCode::AccessDenied,
                msg: "denied".to_string()
            })
        );
        assert_eq!(
            Packet::deserialize(b"\x00\x05\x00\x08option refused\x00"),
            Ok(Packet::Error {
                code: ErrorCode::Undefined,
                msg: "option refused".to_string()
            })
        );
    }

    #[test]
    fn non_utf8_filename_is_accepted() {
        let packet = Packet::deserialize(b"\x00\x01caf\xe9.txt\x00octet\x00").unwrap();
        assert_eq!(
            packet,
            Packet::Rrq {
                filename: "caf\u{fffd}.txt".to_string(),
                mode: Mode::Octet
            }
        );
        assert_eq!(
            Packet::deserialize(b"\x00\x01f\x00oct\xffet\x00"),
            Err(PacketError::BadMode("oct\u{fffd}et".to_string()))
        );
    }

    #[test]
    fn serialize_rejects_embedded_nul() {
        let packet = Packet::Wrq {
            filename: "a\0b".to_string(),
            mode: Mode::Octet,
        };
        assert_eq!(packet.serialize(), Err(PacketError::EmbeddedNul("filename")));
    }

    #[test]
    fn final_block_predicate() {
        assert!(is_final_block(0));
        assert!(is_final_block(511));
        assert!(!is_final_block(512));
    }
}
