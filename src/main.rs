use std::io::Write;
use std::net::{IpAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use tftpx::config::FileConfig;
use tftpx::tftp::client::Client;
use tftpx::tftp::core::Mode;
use tftpx::tftp::tftpd;

#[derive(Parser)]
#[command(name = "tftpx", version, about = "TFTP client and server")]
struct Cli {
    /// Print per-packet debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a file from a TFTP server
    Get {
        /// Server host name or address
        host: String,
        /// File name on the server
        remote: String,
        /// Local path, `-` for stdout (defaults to the remote file name)
        local: Option<PathBuf>,
        /// Server port
        #[arg(short, long)]
        port: Option<u16>,
        /// Transfer mode: octet or netascii
        #[arg(short, long)]
        mode: Option<Mode>,
    },
    /// Upload a file to a TFTP server
    Put {
        /// Server host name or address
        host: String,
        /// Local path, `-` for stdin
        local: PathBuf,
        /// File name on the server (defaults to the local file name)
        remote: Option<String>,
        /// Server port
        #[arg(short, long)]
        port: Option<u16>,
        /// Transfer mode: octet or netascii
        #[arg(short, long)]
        mode: Option<Mode>,
    },
    /// Run a TFTP server
    Serve {
        /// Address to listen on
        #[arg(short, long)]
        ip: Option<IpAddr>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory to serve
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Refuse all write requests
        #[arg(long)]
        read_only: bool,
        /// Refuse uploads that would replace an existing file
        #[arg(long)]
        no_overwrite: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let file_config = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };

    match cli.command {
        Commands::Get {
            host,
            remote,
            local,
            port,
            mode,
        } => {
            let local = local.unwrap_or_else(|| default_local_name(&remote));
            let config = file_config.client_config(resolve(&host)?, port, mode)?;
            let client = Client::new(config)?;
            tokio::task::spawn_blocking(move || client.get(&remote, &local)).await??;
        }
        Commands::Put {
            host,
            local,
            remote,
            port,
            mode,
        } => {
            let remote = match remote {
                Some(remote) => remote,
                None => default_remote_name(&local)?,
            };
            let config = file_config.client_config(resolve(&host)?, port, mode)?;
            let client = Client::new(config)?;
            tokio::task::spawn_blocking(move || client.put(&local, &remote)).await??;
        }
        Commands::Serve {
            ip,
            port,
            dir,
            read_only,
            no_overwrite,
        } => {
            let config = file_config.server_config(ip, port, dir, read_only, no_overwrite);
            tftpd::run(config).await?;
        }
    }

    Ok(())
}

fn init_logger(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_env("RUST_LOG")
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .init();
}

/// Resolve a host name to the first address it maps to.
fn resolve(host: &str) -> Result<IpAddr> {
    let addr = (host, 0)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve host '{}'", host))?
        .next()
        .with_context(|| format!("No address found for host '{}'", host))?;
    Ok(addr.ip())
}

fn default_local_name(remote: &str) -> PathBuf {
    Path::new(remote)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(remote))
}

fn default_remote_name(local: &Path) -> Result<String> {
    if local.as_os_str() == "-" {
        anyhow::bail!("A remote file name is required when uploading from stdin");
    }
    local
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("Cannot derive a remote name from {}", local.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_get_with_mode() {
        let cli = Cli::parse_from(["tftpx", "-v", "get", "host", "a/b.txt", "-m", "netascii"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Get { remote, mode, .. } => {
                assert_eq!(remote, "a/b.txt");
                assert_eq!(mode, Some(Mode::Netascii));
            }
            _ => panic!("expected get"),
        }
    }

    #[test]
    fn default_names() {
        assert_eq!(default_local_name("boot/pxelinux.0"), PathBuf::from("pxelinux.0"));
        assert_eq!(default_remote_name(Path::new("/tmp/x.bin")).unwrap(), "x.bin");
        assert!(default_remote_name(Path::new("-")).is_err());
    }
}
