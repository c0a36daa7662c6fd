use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use showsync::api::{build_router, AppState};
use showsync::cache::Cache;
use showsync::config::{cache_path, state_path, Config, ConfigLoaderOptions};
use showsync::downstream::{DownstreamLibrary, SonarrClient};
use showsync::duration::parse_duration;
use showsync::orchestrator::Orchestrator;
use showsync::scheduler::Scheduler;
use showsync::state::SyncState;
use showsync::stats::Stats;
use showsync::upstream::{TvMazeClient, UpstreamCatalog};

const SCHEDULER_STOP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "showsync")]
#[command(about = "Mirrors a public TV show catalog into a library manager's watchlist")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Force dry-run mode regardless of configuration.
    #[arg(long)]
    dry_run: bool,

    /// Force dry-run off regardless of configuration.
    #[arg(long, conflicts_with = "dry_run")]
    no_dry_run: bool,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(config: &Config, verbosity: u8) {
    let default_level = match verbosity {
        0 => config.logging.level.clone(),
        1 => "DEBUG".to_string(),
        _ => "TRACE".to_string(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("showsync={}", default_level.to_lowercase())));

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let options = ConfigLoaderOptions::from_env_or(args.config.clone());
    let mut config = showsync::config::load_config(&options)?;

    if args.dry_run {
        config.dry_run = true;
    }
    if args.no_dry_run {
        config.dry_run = false;
    }

    init_tracing(&config, args.verbose);

    info!(dry_run = config.dry_run, "configuration loaded");
    if config.dry_run {
        warn!("running in dry-run mode: no shows will be added downstream");
    }

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prometheus recorder installs exactly once per process");

    let cache_path = cache_path(&config);
    std::fs::create_dir_all(cache_path.parent().unwrap_or(&cache_path))?;
    let cache = Cache::connect(
        cache_path
            .to_str()
            .expect("storage.path must be valid UTF-8"),
    )
    .await?;

    let upstream: Arc<dyn UpstreamCatalog> = Arc::new(TvMazeClient::new(
        config.upstream.api_key.clone(),
        config.upstream.rate_limit,
    ));

    let downstream_client = SonarrClient::new(config.downstream.clone());
    info!("validating downstream configuration");
    let validated = downstream_client.validate_config().await?;
    let downstream: Arc<dyn DownstreamLibrary> = Arc::new(downstream_client);

    let state_path = state_path(&config);
    let sync_state = SyncState::load(&state_path).await;
    let state = Arc::new(tokio::sync::RwLock::new(sync_state));
    let stats = Arc::new(Stats::new());

    let orchestrator = Arc::new(Orchestrator::new(
        cache.clone(),
        upstream,
        downstream.clone(),
        config.clone(),
        validated,
        state,
        stats,
        state_path,
    ));

    if let Err(e) = orchestrator.run_selection_reconciliation().await {
        warn!(error = %e, "selection reconciliation pass failed, continuing with scheduled sync");
    }

    let needs_initial_sync = orchestrator.state().read().await.last_full_sync.is_none();

    let poll_interval = parse_duration(&config.sync.poll_interval)?;
    let scheduler = Arc::new(Scheduler::new(poll_interval, orchestrator.clone()));
    scheduler.start().await;

    if needs_initial_sync {
        info!("no prior full sync recorded, triggering initial sync immediately");
        scheduler.trigger_now();
    }

    let server_handle = if config.server.enabled {
        let app_state = AppState {
            cache,
            downstream,
            orchestrator: orchestrator.clone(),
            scheduler: scheduler.clone(),
            metrics_handle,
        };
        let router = build_router(app_state);
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "HTTP surface listening");

        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router.into_make_service()).await {
                error!(error = %e, "HTTP server exited with an error");
            }
        }))
    } else {
        info!("HTTP surface disabled by configuration");
        None
    };

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping scheduler");

    scheduler.stop(SCHEDULER_STOP_TIMEOUT).await;
    if let Some(handle) = server_handle {
        handle.abort();
    }

    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
