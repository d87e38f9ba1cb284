use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use webtransport_echo::{CongestionControl, Config, Server, DEFAULT_BIND};

/// WebTransport echo server for audio and video streams and datagrams.
#[derive(Parser, Debug)]
#[command(name = "webtransport-echo", version, about)]
struct Cli {
    /// TLS certificate chain (PEM)
    certificate: PathBuf,

    /// TLS private key (PEM)
    key: PathBuf,

    /// Listen address
    #[arg(long, default_value_t = DEFAULT_BIND)]
    bind: SocketAddr,

    /// Idle timeout in seconds
    #[arg(long, default_value_t = 30)]
    idle_timeout: u64,

    /// Congestion controller
    #[arg(long, value_enum, default_value_t = CongestionControl::Default)]
    congestion: CongestionControl,

    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config = Config {
        bind: cli.bind,
        idle_timeout: Duration::from_secs(cli.idle_timeout),
        congestion: cli.congestion,
        ..Config::new(cli.certificate, cli.key)
    };

    tracing::info!(version = env!("CARGO_PKG_VERSION"), bind = %config.bind, "starting");

    let mut server = Server::bind(&config).context("failed to start server")?;

    tokio::select! {
        _ = server.run() => {}
        _ = shutdown_signal() => {
            tracing::info!("received shutdown signal");
        }
    }

    server.close();
    server.wait_idle().await;
    tracing::info!("stopped");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    tracing::warn!("failed to install SIGTERM handler: {err}");
                    ctrl_c.await.ok();
                    return;
                }
            };

        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
