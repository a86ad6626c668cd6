use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gerrit_bridge::broker::{AmqpBroker, Connector, ReconnectBackoff, Topology};
use gerrit_bridge::config::Config;
use gerrit_bridge::gerrit::GerritClient;
use gerrit_bridge::github::OctocrabClient;
use gerrit_bridge::server::{self, AppState};
use gerrit_bridge::types::RepoId;
use gerrit_bridge::worker::Dispatcher;
use gerrit_bridge::workflow::Workflow;

/// Mirrors Gerrit patchsets to GitHub pull requests and reports CI back as votes.
#[derive(Debug, Parser)]
#[command(name = "gerrit-bridge", version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, env = "GERRIT_BRIDGE_CONFIG")]
    config: PathBuf,

    /// Write the process ID into this file while running.
    #[arg(long)]
    pidfile: Option<PathBuf>,

    /// Serve `GET /health` on this address, e.g. `127.0.0.1:8080`.
    #[arg(long)]
    health_addr: Option<SocketAddr>,
}

/// Removes the PID file when dropped.
struct PidFile(PathBuf);

impl PidFile {
    fn create(path: &Path) -> anyhow::Result<Self> {
        std::fs::write(path, std::process::id().to_string())
            .with_context(|| format!("failed to write PID file {}", path.display()))?;
        Ok(PidFile(path.to_path_buf()))
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            warn!(path = %self.0.display(), error = %e, "Failed to remove PID file");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gerrit_bridge=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    let _pidfile = cli.pidfile.as_deref().map(PidFile::create).transpose()?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting gerrit-bridge");
    run(config, cli.health_addr).await?;
    info!("Shut down cleanly");
    Ok(())
}

async fn run(config: Config, health_addr: Option<SocketAddr>) -> anyhow::Result<()> {
    let repo = RepoId::new(&config.github.organisation, &config.github.repository);
    let github = OctocrabClient::from_token(config.github.api_token.clone(), repo)
        .context("failed to build GitHub client")?;
    let gerrit = GerritClient::from_config(&config.gerrit).context("failed to build Gerrit client")?;
    let workflow = Workflow::new(github, gerrit, &config);

    let shutdown = CancellationToken::new();
    let dispatcher = Arc::new(Dispatcher::new(
        workflow,
        config.bridge.concurrent,
        config.bridge.ack_policy,
        shutdown.clone(),
    ));
    let connector = Connector::new(
        AmqpBroker::new(config.amqp.uri()),
        Topology::from_config(&config.amqp, dispatcher.capacity()),
        dispatcher.clone(),
        ReconnectBackoff::from_config(&config.bridge.reconnect),
    );

    let health = match health_addr {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind health endpoint on {addr}"))?;
            info!(%addr, "Health endpoint listening");
            let state = AppState::new(connector.state(), dispatcher.gauge());
            Some(tokio::spawn(server::serve(listener, state, shutdown.clone())))
        }
        None => None,
    };

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    connector.run(shutdown.clone()).await;

    if let Some(health) = health {
        health
            .await
            .context("health endpoint task panicked")?
            .context("health endpoint failed")?;
    }
    Ok(())
}

/// Completes on Ctrl-C or, on Unix, SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
