//! WebSocket echo server
//!
//! Accepts upgrade requests on `/api/v1/ws` and writes every text or binary
//! message straight back to the connection it arrived on.

mod config;
mod server;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{EchoConfig, UpgradePolicy};
use server::{EchoServer, ServerConfig};

/// WebSocket echo server
///
/// Echoes every message received on /api/v1/ws back to its sender
#[derive(Parser, Debug)]
#[command(name = "ws-echo")]
#[command(version, about, long_about = None)]
struct Args {
    /// Port to listen on [default: 5000]
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long)]
    bind: Option<String>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only upgrade requests from this origin (repeatable)
    #[arg(long = "allowed-origin", value_name = "ORIGIN")]
    allowed_origins: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));

    FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();

    info!("ws-echo v{}", env!("CARGO_PKG_VERSION"));

    let mut echo_config = match &args.config {
        Some(path) => EchoConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EchoConfig::default(),
    };
    echo_config.apply_overrides(args.bind, args.port, args.allowed_origins);

    let server_config = echo_config.server_config();
    let policy = echo_config.upgrade_policy();

    if policy.origins.is_permissive() {
        warn!("Origin check disabled: upgrades are accepted from any origin");
    }

    let server = bind_server(&server_config, policy).await?;
    server.run_until(shutdown_signal()).await;

    info!("Server shutdown complete");
    Ok(())
}

/// Bind the listener; failure is fatal and logged before it is returned
async fn bind_server(config: &ServerConfig, policy: UpgradePolicy) -> anyhow::Result<EchoServer> {
    match EchoServer::bind(config, policy).await {
        Ok(server) => Ok(server),
        Err(e) => {
            error!("Fatal: {}", e);
            Err(anyhow::Error::new(e).context("Failed to start echo server"))
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["ws-echo"]).unwrap();
        assert!(args.port.is_none());
        assert!(args.bind.is_none());
        assert!(args.config.is_none());
        assert!(args.allowed_origins.is_empty());
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_repeatable_origins() {
        let args = Args::try_parse_from([
            "ws-echo",
            "-p",
            "6000",
            "--allowed-origin",
            "https://a.example",
            "--allowed-origin",
            "https://b.example",
        ])
        .unwrap();

        assert_eq!(args.port, Some(6000));
        assert_eq!(
            args.allowed_origins,
            ["https://a.example", "https://b.example"]
        );
    }

    #[tokio::test]
    async fn test_bind_server_fails_when_port_in_use() {
        let held = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = held.local_addr().unwrap().port();

        let config = ServerConfig::new("127.0.0.1".to_string(), port);
        let err = match bind_server(&config, UpgradePolicy::default()).await {
            Err(e) => e,
            Ok(_) => panic!("Bind should fail while the port is held"),
        };

        assert_eq!(err.to_string(), "Failed to start echo server");
        let full = format!("{:#}", err);
        let expected = format!("Failed to bind 127.0.0.1:{}", port);
        assert!(full.contains(&expected), "{}", full);
    }

    #[tokio::test]
    async fn test_bind_server_succeeds_on_free_port() {
        let config = ServerConfig::new("127.0.0.1".to_string(), 0);
        let policy = UpgradePolicy::default();
        let server = bind_server(&config, policy).await.unwrap();
        assert!(server.local_addr().unwrap().port() > 0);
    }
}
