//! TFTP client implementation
//!
//! - `client`: Download (RRQ) and upload (WRQ)
//! - `config`: Client configuration

#[allow(clippy::module_inception)]
mod client;
mod config;

pub use client::Client;
pub use config::ClientConfig;
