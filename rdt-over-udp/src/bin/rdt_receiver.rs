//! Entry point for `rdt-receiver`.
//!
//! Listens on a UDP port and writes one incoming stream to a file.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rdt_over_udp::{receive, Socket};

/// Receive a file reliably over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// UDP port to listen on.
    port: u16,
    /// Where to write the received bytes.
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    let socket = Socket::bind(SocketAddr::from(([0, 0, 0, 0], cli.port)))
        .await
        .with_context(|| format!("binding UDP port {}", cli.port))?;
    let mut output = tokio::fs::File::create(&cli.output)
        .await
        .with_context(|| format!("creating {}", cli.output.display()))?;

    let report = receive(&socket, &mut output)
        .await
        .context("transfer failed")?;
    output.sync_all().await.context("syncing output file")?;

    println!(
        "received {} bytes ({} duplicate segments)",
        report.bytes_written, report.duplicates
    );
    Ok(())
}
