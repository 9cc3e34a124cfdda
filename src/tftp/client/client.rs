use std::fs;
use std::io;
use std::path::Path;

use anyhow::Context;

use super::config::ClientConfig;
use crate::tftp::core::{
    FileSink, FileSource, Session, Sink, Socket, Source, TransferSummary, retransmit,
};

/// TFTP client
///
/// Supports file upload (PUT) and download (GET) operations. A local path of
/// `-` stands for standard output on download and standard input on upload.
///
/// # Example
///
/// ```rust,no_run
/// use tftpx::tftp::client::{Client, ClientConfig};
/// use std::path::Path;
///
/// let config = ClientConfig::new("192.168.1.100".parse().unwrap(), 69);
/// let client = Client::new(config).unwrap();
///
/// // Download file
/// client.get("remote.txt", Path::new("local.txt")).unwrap();
///
/// // Upload file
/// client.put(Path::new("local.txt"), "remote.txt").unwrap();
/// ```
pub struct Client {
    config: ClientConfig,
}

impl Client {
    /// Create a new TFTP client
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Download a file from the server (RRQ - Read Request)
    ///
    /// A partially written local file is removed if the transfer fails.
    ///
    /// # Arguments
    ///
    /// * `remote_file` - File name on the server
    /// * `local_file` - Local save path
    pub fn get(&self, remote_file: &str, local_file: &Path) -> anyhow::Result<TransferSummary> {
        log::info!(
            "Downloading {} from {} to {} ({})",
            remote_file,
            self.config.server_addr(),
            local_file.display(),
            self.config.mode
        );

        let to_stdout = is_stdio(local_file);
        let sink: Box<dyn FileSink> = if to_stdout {
            Box::new(Sink::new(io::stdout()))
        } else {
            Box::new(
                Sink::create(local_file)
                    .with_context(|| format!("Failed to create {}", local_file.display()))?,
            )
        };

        let mut session = Session::read(
            self.config.server_addr(),
            remote_file,
            self.config.mode,
            sink,
            self.config.rtt,
        );
        let result = self.run(&mut session);
        // Closes the local file before it is removed.
        drop(session);

        match result {
            Ok(summary) => {
                log::info!(
                    "Received {} bytes in {:.1} seconds",
                    summary.bytes,
                    summary.elapsed.as_secs_f64()
                );
                log_retransmits(&summary);
                Ok(summary)
            }
            Err(e) => {
                if !to_stdout {
                    if let Err(rm) = fs::remove_file(local_file) {
                        log::warn!("Failed to remove {}: {}", local_file.display(), rm);
                    }
                }
                Err(e)
            }
        }
    }

    /// Upload a file to the server (WRQ - Write Request)
    ///
    /// # Arguments
    ///
    /// * `local_file` - Local file path
    /// * `remote_file` - File name on the server
    pub fn put(&self, local_file: &Path, remote_file: &str) -> anyhow::Result<TransferSummary> {
        log::info!(
            "Uploading {} to {} as {} ({})",
            local_file.display(),
            self.config.server_addr(),
            remote_file,
            self.config.mode
        );

        let source: Box<dyn FileSource> = if is_stdio(local_file) {
            Box::new(Source::new(io::stdin()))
        } else {
            if !local_file.is_file() {
                anyhow::bail!("Local file does not exist: {}", local_file.display());
            }
            Box::new(
                Source::open(local_file)
                    .with_context(|| format!("Failed to open {}", local_file.display()))?,
            )
        };

        let mut session = Session::write(
            self.config.server_addr(),
            remote_file,
            self.config.mode,
            source,
            self.config.rtt,
        );
        let summary = self.run(&mut session)?;

        log::info!(
            "Sent {} bytes in {:.1} seconds",
            summary.bytes,
            summary.elapsed.as_secs_f64()
        );
        log_retransmits(&summary);
        Ok(summary)
    }

    fn run(&self, session: &mut Session) -> anyhow::Result<TransferSummary> {
        let server_addr = self.config.server_addr();
        let mut socket =
            Socket::ephemeral_for(server_addr).context("Failed to bind local UDP socket")?;
        log::debug!("Local address {}", socket.local_addr()?);

        retransmit::transfer(session, &mut socket)
            .with_context(|| format!("Transfer with {} failed", server_addr))
    }
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn log_retransmits(summary: &TransferSummary) {
    if summary.retransmits > 0 {
        log::info!(
            "{} blocks, {} retransmissions",
            summary.blocks,
            summary.retransmits
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tftp::core::TransferError;
    use std::time::Duration;

    #[test]
    fn dash_means_stdio() {
        assert!(is_stdio(Path::new("-")));
        assert!(!is_stdio(Path::new("./-")));
        assert!(!is_stdio(Path::new("file.bin")));
    }

    #[test]
    fn put_requires_existing_file() {
        let client = Client::new(ClientConfig::default()).unwrap();
        let missing = std::env::temp_dir().join("tftpx-client-missing.bin");
        let err = client.put(&missing, "x").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn get_removes_partial_file_on_timeout() {
        // Nothing answers on this port, so the transfer gives up.
        let silent = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = silent.local_addr().unwrap().port();

        let rtt = crate::tftp::core::RttConfig {
            min_timeout: Duration::from_millis(10),
            max_timeout: Duration::from_millis(20),
            initial_deviation: Duration::from_millis(5),
            max_retransmits: 1,
        };
        let config = ClientConfig::new("127.0.0.1".parse().unwrap(), port).with_rtt(rtt);
        let client = Client::new(config).unwrap();

        let local = std::env::temp_dir().join(format!("tftpx-partial-{}.bin", std::process::id()));
        let err = client.get("anything", &local).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TransferError>(),
            Some(TransferError::Timeout { .. })
        ));
        assert!(!local.exists());
    }
}
