//! Bio Collector - Entry Point
//!
//! Usage: `bio-collector <protonvpn|nordvpn>`. Everything else comes from the
//! environment, optionally seeded from a `.env` file.

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, info_span, warn, Instrument};

use bio_collector::api::ApiClient;
use bio_collector::collector::{CollectionLoop, RunStats};
use bio_collector::database::Database;
use bio_collector::repository::ProfileRepository;
use bio_collector::scraper::InstagramScraper;
use bio_collector::vpn::VpnHandler;
use bio_collector::{config, logging, Config};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Variables already set in the process take precedence over the file
    let env_file = config::load_env_file(None);

    let config = Config::from_env_and_args(std::env::args().skip(1))
        .context("Failed to load configuration")?;
    let _log_guard = logging::init(&config.log).context("Failed to initialize logging")?;

    if let Some(path) = &env_file {
        info!(path = %path.display(), "Loaded environment file");
    }

    let span = info_span!("collector", service = %config.service);
    let result = run(config).instrument(span).await;

    if let Err(e) = &result {
        error!("Bio Collector stopped with an error: {:#}", e);
    }
    result
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!("Starting Bio Collector");

    // Startup checks; any failure here aborts before scraping begins
    let mut vpn = VpnHandler::new(&config.vpn)?;
    let servers = vpn
        .load_server_list()
        .with_context(|| format!("Failed to load servers from {}", config.vpn.config_dir.display()))?;
    info!(servers, "VPN server list loaded");

    let db = Database::new(&config.database).await?;
    let latency = db.health_check().await?;
    info!(latency_ms = latency.as_millis() as u64, "Connected to database");

    db.run_migrations(&config.database.table).await?;

    let store = ProfileRepository::new(db, config.database.table.clone());
    let scraper = InstagramScraper::new()?;
    let api = ApiClient::new(&config.api)?;

    let mut collector = CollectionLoop::new(
        config.collector.clone(),
        config.vpn.max_connect_attempts,
        Box::new(vpn),
        Box::new(store),
        Box::new(scraper),
        Box::new(api),
    );

    let outcome = tokio::select! {
        result = collector.run() => Some(result),
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            None
        }
    };

    collector.shutdown().await;

    match outcome {
        Some(Ok(stats)) => {
            report(&stats, "Collection finished");
            Ok(())
        }
        Some(Err(e)) => {
            report(&collector.stats(), "Collection aborted");
            Err(e.into())
        }
        None => {
            report(&collector.stats(), "Collection interrupted");
            Ok(())
        }
    }
}

fn report(stats: &RunStats, message: &str) {
    info!(
        processed = stats.processed,
        collected = stats.collected,
        failed = stats.failed,
        rate_limited = stats.rate_limited,
        rotations = stats.rotations,
        "{}",
        message
    );
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
