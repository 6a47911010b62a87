//! Clonefinder: detects duplicate running copies of itself on the local
//! network segment.
//!
//! Each instance announces its presence to a multicast group once per second
//! and listens for the announcements of others. A newly heard endpoint is
//! reported as a detected copy; an endpoint whose heartbeats stop is
//! reported as offline.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::Layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clonefinder_multicast::{CloneFinder, HeartbeatConfig, MulticastGroup, PeerEvent};

use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing. The console filter respects RUST_LOG, with the
    // CLI flag as fallback.
    let console_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.to_string()));
    let console_layer = tracing_subscriber::fmt::layer().with_filter(console_filter);

    // Optionally create a file layer with a trace-level filter.
    if let Some(log_file) = &cli.log_file {
        let file_dir = log_file
            .parent()
            .unwrap_or_else(|| std::path::Path::new("logs"));
        let file_name = log_file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("clonefinder.log");

        let file_appender = tracing_appender::rolling::never(file_dir, file_name);

        let file_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trace"));

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_filter(file_filter);

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry().with(console_layer).init();
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    // Validate the group address up front so a bad argument fails before
    // anything is started, and report which family was picked.
    let group = MulticastGroup::parse(&cli.group)
        .context("invalid multicast ip address, supported protocols are IPv4 and IPv6")?;
    println!("{} selected", group.family());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_finder(cli))
}

async fn run_finder(cli: Cli) -> Result<()> {
    let config = HeartbeatConfig::new(cli.group).with_port(cli.port);
    let (finder, mut events) = CloneFinder::new(config);
    let finder = Arc::new(finder);

    finder
        .clone()
        .start()
        .await
        .context("failed to start clone detection")?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(PeerEvent::Joined(peer)) => println!("new copy detected at {}", peer),
                Some(PeerEvent::Left(peer)) => println!("copy {} went offline", peer),
                None => break,
            },
            _ = &mut ctrl_c => {
                tracing::info!("interrupt received, shutting down");
                finder.stop();
                break;
            }
        }
    }

    Ok(())
}
