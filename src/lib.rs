//! Stop-and-wait TFTP client and server with an adaptive retransmit timer.
//!
//! See [`tftp`] for the protocol engine and [`config`] for the optional
//! configuration file used by the `tftpx` binary.

pub mod config;
pub mod tftp;
