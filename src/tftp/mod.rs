//! TFTP (Trivial File Transfer Protocol) implementation
//!
//! Stop-and-wait transfers as described by
//! [RFC 1350](https://www.rfc-editor.org/rfc/rfc1350) TFTP Protocol version 2,
//! in `octet` and `netascii` modes, with an adaptive retransmit timer.
//! Option negotiation (RFC 2347 and later) is not supported.
//!
//! ## Module Structure
//!
//! ```text
//! tftp/
//! ├── core/           # Core protocol implementation
//! │   ├── packet      # Packet serialization/deserialization
//! │   ├── rtt         # Round-trip estimator and backoff
//! │   ├── session     # Per-transfer state
//! │   ├── machine     # Transfer state machine
//! │   ├── retransmit  # Stop-and-wait controller
//! │   ├── socket      # Socket abstraction layer
//! │   ├── file        # File sources and sinks
//! │   ├── convert     # netascii conversion
//! │   └── error       # Transfer errors
//! │
//! ├── server/         # TFTP server
//! │   ├── server      # Request listener
//! │   ├── worker      # One transfer per request
//! │   ├── store       # Filename validation
//! │   └── config      # Server configuration
//! │
//! ├── client/         # TFTP client
//! │   ├── client      # get / put
//! │   └── config      # Client configuration
//! │
//! └── tftpd           # Server entry point with Ctrl+C handling
//! ```
//!
//! ## Usage Examples
//!
//! ### Start TFTP Server
//!
//! ```rust,no_run
//! use tftpx::tftp::server::{Config, Server};
//! use std::path::PathBuf;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::new("0.0.0.0".parse()?, 69, PathBuf::from("/var/tftp"), false);
//!
//! let server = Server::bind(&config).await?;
//! server.listen().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Download a file
//!
//! ```rust,no_run
//! use tftpx::tftp::client::{Client, ClientConfig};
//! use std::path::Path;
//!
//! let client = Client::new(ClientConfig::new("192.168.1.100".parse().unwrap(), 69)).unwrap();
//! let summary = client.get("pxelinux.0", Path::new("pxelinux.0")).unwrap();
//! println!("{} bytes", summary.bytes);
//! ```

// Submodules
pub mod client;
pub mod core;
pub mod server;
pub mod tftpd;

// Re-export commonly used types for convenience
pub use client::{Client, ClientConfig};
pub use core::{Mode, TransferError, TransferSummary};
