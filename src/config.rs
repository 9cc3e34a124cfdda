//! Optional TOML configuration file
//!
//! ```toml
//! [client]
//! port = 69
//! mode = "netascii"
//!
//! [client.rtt]
//! min_timeout = "1s"
//! max_retransmits = 6
//!
//! [server]
//! ip = "0.0.0.0"
//! port = 69
//! directory = "/srv/tftp"
//! read_only = true
//! ```
//!
//! Command line flags take precedence over the file, and the file over the
//! built-in defaults.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::tftp::client::ClientConfig;
use crate::tftp::core::{Mode, RttConfig};
use crate::tftp::server::Config as ServerConfig;

/// Well-known TFTP port
pub const DEFAULT_PORT: u16 = 69;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub client: ClientSection,
    pub server: ServerSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSection {
    pub port: Option<u16>,
    pub mode: Option<String>,
    pub rtt: Option<RttConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
    /// Serves and receives files here unless overridden below
    pub directory: Option<PathBuf>,
    pub send_directory: Option<PathBuf>,
    pub receive_directory: Option<PathBuf>,
    pub read_only: Option<bool>,
    pub overwrite: Option<bool>,
    pub rtt: Option<RttConfig>,
}

impl FileConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Client settings for `server_ip`, with command line overrides applied.
    pub fn client_config(
        &self,
        server_ip: IpAddr,
        port: Option<u16>,
        mode: Option<Mode>,
    ) -> anyhow::Result<ClientConfig> {
        let file_mode = match &self.client.mode {
            Some(name) => Some(
                Mode::parse(name)
                    .with_context(|| format!("Invalid mode '{}' in config file", name))?,
            ),
            None => None,
        };

        let final_port = port.or(self.client.port).unwrap_or(DEFAULT_PORT);
        let final_mode = mode.or(file_mode).unwrap_or_default();

        Ok(ClientConfig::new(server_ip, final_port)
            .with_mode(final_mode)
            .with_rtt(self.client.rtt.unwrap_or_default()))
    }

    /// Server settings with command line overrides applied.
    ///
    /// The boolean flags can only switch a setting on (`read_only`) or off
    /// (`no_overwrite`); otherwise the file decides.
    pub fn server_config(
        &self,
        ip: Option<IpAddr>,
        port: Option<u16>,
        directory: Option<PathBuf>,
        read_only: bool,
        no_overwrite: bool,
    ) -> ServerConfig {
        let server = &self.server;
        let final_ip = ip
            .or(server.ip)
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let final_port = port.or(server.port).unwrap_or(DEFAULT_PORT);
        let final_dir = directory
            .clone()
            .or_else(|| server.directory.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        let final_read_only = read_only || server.read_only.unwrap_or(false);
        let final_overwrite = !no_overwrite && server.overwrite.unwrap_or(true);

        let mut config = ServerConfig::new(final_ip, final_port, final_dir, final_read_only)
            .with_overwrite(final_overwrite)
            .with_rtt(server.rtt.unwrap_or_default());

        // An explicit --dir replaces both directories from the file.
        if directory.is_none() {
            if let Some(send) = &server.send_directory {
                config.send_directory = send.clone();
            }
            if let Some(receive) = &server.receive_directory {
                config.receive_directory = receive.clone();
            }
        }
        config
    }
}
