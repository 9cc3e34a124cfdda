//! TFTP core protocol implementation
//!
//! This module contains the core components of the TFTP protocol:
//! - `packet`: Packet serialization and deserialization
//! - `rtt`: Round-trip estimation and retransmit timeouts
//! - `session`: Per-transfer state
//! - `machine`: Reaction of a session to each received packet
//! - `retransmit`: Stop-and-wait send/receive loop
//! - `socket`: Socket abstraction layer
//! - `file`: Local file sources and sinks
//! - `convert`: netascii conversion
//! - `error`: Transfer failures

mod convert;
mod error;
mod file;
pub mod machine;
mod packet;
pub mod retransmit;
mod rtt;
mod session;
mod socket;

// Public core types
pub use convert::{Decoder, Encoder};
pub use error::{TransferError, Violation};
pub use file::{FileSink, FileSource, FileStore, Sink, Source};
pub use packet::{
    BLOCK_SIZE, ErrorCode, MAX_PACKET, Mode, Opcode, Packet, PacketError, is_final_block,
};
pub use rtt::{MAX_RETRANSMITS, RttConfig, RttEstimator, Verdict};
pub use session::{Role, Session, TransferSummary};
pub use socket::{RECV_BUFFER, Received, Socket, Transport};
