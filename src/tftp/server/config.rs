use std::net::IpAddr;
use std::path::PathBuf;

use crate::tftp::core::RttConfig;

/// TFTP server configuration
///
/// # Example
///
/// ```rust
/// use tftpx::tftp::server::Config;
/// use std::path::PathBuf;
///
/// let config = Config::new(
///     "127.0.0.1".parse().unwrap(),
///     69,
///     PathBuf::from("/tmp/tftp"),
///     false,
/// );
/// assert!(config.overwrite);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address to listen on
    pub ip_address: IpAddr,
    /// Port number to listen on
    pub port: u16,
    /// Directory for uploaded files (defaults to same as directory)
    pub receive_directory: PathBuf,
    /// Directory for downloaded files (defaults to same as directory)
    pub send_directory: PathBuf,
    /// Whether to use read-only mode (reject all write requests)
    pub read_only: bool,
    /// Whether to overwrite existing files
    pub overwrite: bool,
    /// Retransmit timer settings for every session
    pub rtt: RttConfig,
}

impl Config {
    /// Create a new configuration
    ///
    /// # Arguments
    ///
    /// * `ip_address` - IP address to listen on
    /// * `port` - Port number to listen on
    /// * `directory` - Root directory for files
    /// * `read_only` - Whether to use read-only mode
    pub fn new(ip_address: IpAddr, port: u16, directory: PathBuf, read_only: bool) -> Self {
        let receive_directory = directory.clone();
        let send_directory = directory;

        Self {
            ip_address,
            port,
            receive_directory,
            send_directory,
            read_only,
            overwrite: true, // Allow overwrite by default
            rtt: RttConfig::default(),
        }
    }

    /// Set whether existing files may be replaced by uploads
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_rtt(mut self, rtt: RttConfig) -> Self {
        self.rtt = rtt;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        use std::net::Ipv4Addr;

        Self::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            69,
            std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir()),
            false,
        )
    }
}
