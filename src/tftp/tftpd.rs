use anyhow::{Context, Result};
use log::info;
use std::path::Path;

use super::server::{Config, Server};

/// Run the TFTP server until Ctrl+C
pub async fn run(mut config: Config) -> Result<()> {
    // 将路径转换为绝对路径
    config.send_directory = check_directory(&config.send_directory)?;
    config.receive_directory = check_directory(&config.receive_directory)?;

    let server = Server::bind(&config).await?;

    info!("TFTP server starting on {}", server.local_addr()?);
    info!("Serving files from: {}", config.send_directory.display());
    if config.receive_directory != config.send_directory {
        info!("Receiving files into: {}", config.receive_directory.display());
    }
    info!("Read-only mode: {}", config.read_only);
    info!("Overwrite existing files: {}", config.overwrite);
    info!("TFTP server listening, press Ctrl+C to stop");

    // 传输在阻塞线程中进行, 退出时不等待它们结束
    tokio::select! {
        result = server.listen() => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Shutting down TFTP server");
            Ok(())
        }
    }
}

fn check_directory(path: &Path) -> Result<std::path::PathBuf> {
    let absolute_path = path
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", path.display()))?;

    if !absolute_path.is_dir() {
        anyhow::bail!("Path is not a directory: {}", absolute_path.display());
    }
    Ok(absolute_path)
}
