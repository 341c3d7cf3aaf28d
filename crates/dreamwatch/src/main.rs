mod challenges;
mod config;
mod datetime;
mod dreamhack;
mod notify;
mod stats;
mod store;
#[cfg(test)]
mod test_server;
mod version;
mod watcher;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use crate::{
    config::{load_config, write_default_config},
    dreamhack::DreamhackClient,
    notify::DiscordWebhook,
    store::JsonFileStore,
    version::short_version,
    watcher::Watcher,
};

#[derive(Parser)]
#[command(version = short_version())]
struct Args {
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// デフォルトの設定ファイルを書き出して終了する
    #[arg(long)]
    init: bool,

    /// 1 回だけチェックして終了する
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.init {
        write_default_config(&args.config)?;
        info!(path = ?args.config, "Created default configuration");
        return Ok(());
    }

    info!(version = short_version(), "dreamwatch version");

    let config = load_config(&args.config, |key| std::env::var(key).ok())
        .context("Failed to load configuration")?;
    info!(
        user_id = %config.dreamhack.user_id,
        state_dir = ?config.watch.state_dir,
        "Configuration loaded"
    );

    let timeout = config.watch.request_timeout;
    let api = DreamhackClient::new(&config.dreamhack.api_base, timeout)?;
    let notifier = DiscordWebhook::new(&config.discord.webhook_url, timeout)?;
    let store = JsonFileStore::open(&config.watch.state_dir)?;

    let watcher = Watcher::new(config, api, notifier, store);

    if args.once {
        watcher.tick(Utc::now()).await;
        return Ok(());
    }

    watcher.run(shutdown_signal()).await;
    info!("Stopped");
    Ok(())
}

/// Ctrl-C または SIGTERM を受け取るまで待つ。
async fn shutdown_signal() {
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
            Ok(mut term) => {
                term.recv().await;
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
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
