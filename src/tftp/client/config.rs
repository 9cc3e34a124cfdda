use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::tftp::core::{Mode, RttConfig};

/// TFTP client configuration
///
/// # Example
///
/// ```rust
/// use tftpx::tftp::client::ClientConfig;
/// use tftpx::tftp::core::Mode;
///
/// let config = ClientConfig::new("192.168.1.100".parse().unwrap(), 69).with_mode(Mode::Netascii);
/// assert_eq!(config.mode, Mode::Netascii);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server IP address
    pub server_ip: IpAddr,
    /// Server port number
    pub server_port: u16,
    /// Transfer mode
    pub mode: Mode,
    /// Retransmit timer settings
    pub rtt: RttConfig,
}

impl ClientConfig {
    /// Create new client configuration
    ///
    /// # Arguments
    ///
    /// * `server_ip` - Server IP address
    /// * `server_port` - Server port number (usually 69)
    pub fn new(server_ip: IpAddr, server_port: u16) -> Self {
        Self {
            server_ip,
            server_port,
            mode: Mode::Octet,
            rtt: RttConfig::default(),
        }
    }

    /// Set transfer mode
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set retransmit timer settings
    pub fn with_rtt(mut self, rtt: RttConfig) -> Self {
        self.rtt = rtt;
        self
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_ip, self.server_port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 69)
    }
}
