//! `susen` binary: load configuration, build the catalog, serve HTTP.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use susen_puzzle::{Catalog, Sudoku};
use susen_server::config::ServerConfig;
use susen_server::logging::init_logging;
use susen_server::store::spawn_idle_sweeper;
use susen_server::{AppState, router};
use tracing::info;

#[derive(Parser)]
#[command(name = "susen", version, about = "Multi-user sudoku solver service")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "SUSEN_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding the config file.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Listen port, keeping the configured interface.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Log filter directive, overriding the config file.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ServerConfig::default(),
        };
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(port) = self.port {
            let ip: IpAddr = config.listen.ip();
            config.listen = SocketAddr::new(ip, port);
        }
        if let Some(level) = self.log_level {
            config.log.level = level;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn build_catalog(config: &ServerConfig) -> anyhow::Result<Catalog> {
    let mut catalog = Catalog::with_builtins().context("built-in puzzle catalog")?;
    if let Some(path) = &config.puzzles_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading puzzles from {}", path.display()))?;
        let added = catalog
            .load_toml(&text)
            .with_context(|| format!("loading puzzles from {}", path.display()))?;
        info!(path = %path.display(), added, "loaded puzzles");
    }
    Ok(catalog)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;
    init_logging(&config.log).context("initializing logging")?;

    let catalog = build_catalog(&config)?;
    info!(puzzles = catalog.len(), default_puzzle = %config.default_puzzle, "catalog ready");
    let state = AppState::new(&config, Arc::new(Sudoku::new(catalog)))?;

    let sweeper = spawn_idle_sweeper(state.store.clone(), config.session.sweep_interval());

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!(
        addr = %listener.local_addr()?,
        idle_timeout_secs = config.session.idle_timeout_secs,
        "listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
        })
        .await
        .context("serving HTTP")?;

    sweeper.abort();
    info!("stopped");
    Ok(())
}
