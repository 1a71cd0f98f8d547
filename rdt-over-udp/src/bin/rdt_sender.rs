//! Entry point for `rdt-sender`.
//!
//! Reads a file and transfers it to a running `rdt-receiver`. Protocol work
//! is delegated to the library; this binary owns only process setup
//! (logging, argument parsing, opening the file).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rdt_over_udp::{RtoConfig, SenderConfig, SenderEngine, Socket};

/// Send a file reliably over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Receiver host name or address.
    host: String,
    /// Receiver UDP port.
    port: u16,
    /// File to send.
    input: PathBuf,

    /// Congestion window CSV log.
    #[arg(long, default_value = "CWND.csv")]
    cwnd_log: PathBuf,
    /// Retransmission timeout before the first RTT sample.
    #[arg(long, default_value_t = 3000)]
    initial_rto_ms: u64,
    #[arg(long, default_value_t = 10)]
    min_rto_ms: u64,
    #[arg(long, default_value_t = 240_000)]
    max_rto_ms: u64,
    /// Initial slow-start threshold, in segments.
    #[arg(long, default_value_t = 64)]
    ssthresh: u32,
    /// Times the end-of-stream marker is sent.
    #[arg(long, default_value_t = 10)]
    eos_repeats: u32,
}

impl Cli {
    fn config(&self) -> SenderConfig {
        SenderConfig {
            rto: RtoConfig {
                initial: Duration::from_millis(self.initial_rto_ms),
                min: Duration::from_millis(self.min_rto_ms),
                max: Duration::from_millis(self.max_rto_ms),
            },
            initial_ssthresh: self.ssthresh,
            eos_repeats: self.eos_repeats,
            cwnd_log: Some(self.cwnd_log.clone()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    anyhow::ensure!(
        cli.min_rto_ms <= cli.max_rto_ms,
        "--min-rto-ms must not exceed --max-rto-ms"
    );

    let peer: SocketAddr = tokio::net::lookup_host((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("resolving {}:{}", cli.host, cli.port))?
        .next()
        .with_context(|| format!("no address found for {}", cli.host))?;

    let input = tokio::fs::File::open(&cli.input)
        .await
        .with_context(|| format!("opening {}", cli.input.display()))?;

    let socket = Socket::bind_for(peer)
        .await
        .context("binding UDP socket")?;
    log::info!("Sending {} to {peer}", cli.input.display());

    let engine = SenderEngine::new(Arc::new(socket), peer, &cli.config())
        .with_context(|| format!("creating {}", cli.cwnd_log.display()))?;
    let stats = engine.run(input).await.context("transfer failed")?;

    println!(
        "sent {} bytes in {} segments ({} retransmitted)",
        stats.bytes_acked, stats.segments_sent, stats.retransmissions
    );
    Ok(())
}
