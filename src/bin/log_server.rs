//! log_server - HTTP sink for detection logs
//!
//! Serves `GET /` and `POST /log`, writing each posted log to the log
//! directory. Does NOT run any detection.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use ar_detect::{AppConfig, LogServer, LogServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Listen address (defaults to the configured log server address).
    #[arg(long)]
    addr: Option<String>,
    /// Directory for log files (defaults to the configured log directory).
    #[arg(long)]
    dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = AppConfig::load()?;
    let server_config = LogServerConfig {
        addr: args.addr.unwrap_or(config.log_server.addr),
        log_dir: args.dir.unwrap_or(config.log_server.dir),
    };

    let handle = LogServer::new(server_config).spawn()?;
    log::info!(
        "log_server running. writing to {}",
        handle.log_dir.display()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("log_server waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping log server...");
    handle.stop()?;

    Ok(())
}
