//! TFTP server implementation
//!
//! This module provides complete TFTP server functionality:
//! - `server`: Main server logic, receives client requests
//! - `worker`: Runs one transfer per request on its own port
//! - `store`: Maps request filenames onto the served directories
//! - `config`: Server configuration

mod config;
#[allow(clippy::module_inception)]
mod server;
mod store;
mod worker;

// Public server types
pub use config::Config;
pub use server::Server;
pub use store::DirectoryStore;
pub use worker::{Claim, InFlight, Worker};
