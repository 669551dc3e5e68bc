/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Running live user data stream with graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use exdash_adapter::{DashboardClient, StreamBackend, StreamEnvironment, StreamTransport};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use exdash_live::{
    ActivityLog, Collaborators, HttpBalanceRefresher, LiveConfig, LiveStreamManager, StartOutcome,
};

#[derive(Parser, Debug)]
#[command(name = "exdash-live", version, about = "Exchange dashboard live user data stream")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    /// Start this environment immediately instead of asking the backend
    #[arg(long = "env", value_name = "ENV")]
    env: Option<String>,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let config = load_config(args.config_path.as_deref())?;
    let _guard = init_tracing(&args.log_level, config.log.file.as_deref())?;

    info!(
        api = %config.backend.api_base_url,
        stream = %config.backend.stream_url,
        dry_run = args.dry_run,
        "starting exdash-live"
    );

    let client = DashboardClient::with_config_and_urls(
        config.client_config(),
        &config.backend.api_base_url,
        &config.backend.stream_url,
    )
    .context("build dashboard client")?;

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let env = match args.env {
        Some(env) => Some(StreamEnvironment::new(env)),
        None => auto_start_env(&client, &config).await,
    };
    let Some(env) = env else {
        info!(
            wanted = %config.stream.auto_start_exchange,
            "active exchange does not use the live stream; nothing to do"
        );
        return Ok(());
    };

    let log = ActivityLog::new(config.log.capacity);
    let balances = HttpBalanceRefresher::new(
        client.clone(),
        env.clone(),
        config.stream.min_free_balance,
        log.clone(),
    );
    spawn_balance_watcher(&balances);

    let backend: Arc<dyn StreamBackend> = Arc::new(client.clone());
    let transport: Arc<dyn StreamTransport> = Arc::new(config.transport());
    let manager = LiveStreamManager::new(
        Collaborators {
            backend,
            transport,
            balances: Arc::new(balances),
            log,
        },
        client.stream_base_url().clone(),
        config.manager_settings(),
    );
    spawn_indicator_watcher(&manager);

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    match manager.start_live(env.clone()).await? {
        StartOutcome::Connecting => info!(%env, "live stream starting"),
        StartOutcome::Rejected => warn!(%env, "backend refused to start the user stream"),
    }

    shutdown.cancelled().await;
    info!("shutdown signal received");

    manager.stop().await.context("stop live stream")?;
    manager
        .shutdown_and_wait()
        .await
        .context("shutdown live stream worker")?;
    info!("live stream shutdown complete");

    Ok(())
}

/// The default environment, when the backend reports the auto-start exchange as active.
async fn auto_start_env(client: &DashboardClient, config: &LiveConfig) -> Option<StreamEnvironment> {
    match client.active_exchange().await {
        Ok(active) if active.active == config.stream.auto_start_exchange => {
            Some(config.default_env())
        }
        Ok(active) => {
            info!(active = %active.active, "active exchange reported");
            None
        }
        Err(err) => {
            warn!(error = %err, "failed to query active exchange");
            None
        }
    }
}

fn spawn_balance_watcher(balances: &HttpBalanceRefresher) {
    let mut table = balances.subscribe();
    tokio::spawn(async move {
        while table.changed().await.is_ok() {
            let rows = table.borrow_and_update().clone();
            for row in &rows {
                info!(asset = %row.asset, free = %row.free, locked = %row.locked, "balance");
            }
        }
    });
}

fn spawn_indicator_watcher(manager: &LiveStreamManager) {
    let mut indicator = manager.subscribe_indicator();
    tokio::spawn(async move {
        while indicator.changed().await.is_ok() {
            let state = *indicator.borrow_and_update();
            info!(%state, "stream indicator");
        }
    });
}

fn init_tracing(log_level: &str, file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;

    let (file_layer, guard) = match file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .context("log.file must name a file")?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(guard)
}

fn load_config(path: Option<&Path>) -> Result<LiveConfig> {
    let Some(path) = path else {
        return Ok(LiveConfig::default());
    };
    let path_str = path.to_str().context("config path must be valid utf-8")?;
    LiveConfig::from_file(path_str).context("load config")
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
