//! NFT Lending Core - Entry Point
//!
//! Initializes configuration, logging, chain clients, marketplace
//! sources and the live feed, then serves the lending API until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Restore the store snapshot and seed currencies
//! 4. Connect one chain client per configured network
//! 5. Build marketplace sources (pull over HTTP, Solsea over the feed)
//! 6. Build the use cases (ingestion, crawl, history, loans, hooks)
//! 7. Spawn the live feed supervisor, HTTP server and snapshot loop
//! 8. Wait for SIGINT -> graceful shutdown (not ready -> stop -> save)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use nftlend_core::adapters::api::{
    HttpMetadataFetcher, MagicEdenAdapter, MarketHttpClient, MarketHttpConfig, OpenSeaAdapter,
    SolanartAdapter, SolseaAdapter,
};
use nftlend_core::adapters::chain::connect_chains;
use nftlend_core::adapters::feeds::{
    FeedSupervisor, SessionSettings, SolseaTradeHandler, WsConnector, outbound_queue,
};
use nftlend_core::adapters::http::{HttpServer, ServerState};
use nftlend_core::adapters::metrics::MetricsRegistry;
use nftlend_core::adapters::persistence::{MemoryStore, SnapshotFile};
use nftlend_core::config;
use nftlend_core::ports::marketplace::{MarketplaceAdapter, MetadataFetcher};
use nftlend_core::usecases::{
    AssetHistory, ChainEventHooks, CrawlScheduler, IngestionSink, LoanOfferWorkflow,
    SettlementApplier,
};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config_path = std::env::var("NFTLEND_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        networks = config.networks.len(),
        "Starting NFT lending core"
    );

    // ── 3. Shutdown signal channels ─────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
    let (ready_tx, ready_rx) = watch::channel(true);

    // ── 4. Restore store snapshot ───────────────────────────
    let snapshots = Arc::new(
        SnapshotFile::new(&config.persistence.data_dir)
            .await
            .context("Failed to open snapshot directory")?,
    );
    let store = Arc::new(match snapshots.load().await? {
        Some(snapshot) => MemoryStore::from_snapshot(snapshot),
        None => MemoryStore::new(),
    });
    for currency in &config.currencies {
        store.seed_currency(currency.clone()).await;
    }

    // ── 5. Chain clients ────────────────────────────────────
    let chains = connect_chains(&config.networks).await;
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);

    // ── 6. Live feed queue + marketplace sources ────────────
    let (publisher, queue) = outbound_queue();
    let market = &config.marketplaces;
    let http = Arc::new(
        MarketHttpClient::new(&MarketHttpConfig {
            max_concurrent: market.max_concurrent,
            requests_per_second: market.requests_per_second,
            ..MarketHttpConfig::default()
        })
        .context("Failed to create marketplace HTTP client")?,
    );
    let sources: Vec<Arc<dyn MarketplaceAdapter>> = vec![
        Arc::new(MagicEdenAdapter::new(Arc::clone(&http), &market.magiceden_url)),
        Arc::new(SolanartAdapter::new(Arc::clone(&http), &market.solanart_url)),
        Arc::new(OpenSeaAdapter::new(Arc::clone(&http), &market.opensea_url)),
        Arc::new(SolseaAdapter::new(publisher.clone())),
    ];
    let metadata: Arc<dyn MetadataFetcher> = Arc::new(
        HttpMetadataFetcher::new(
            &market.ipfs_gateway,
            Duration::from_secs(market.metadata_timeout_seconds),
        )
        .context("Failed to create metadata fetcher")?,
    );

    // ── 7. Use cases ────────────────────────────────────────
    let sink = Arc::new(IngestionSink::new(Arc::clone(&store)).with_metrics(Arc::clone(&metrics)));
    let crawler = Arc::new(
        CrawlScheduler::new(Arc::clone(&store), sources, Arc::clone(&sink))
            .with_cooldown(chrono::Duration::hours(market.crawl_cooldown_hours))
            .with_metrics(Arc::clone(&metrics)),
    );
    let history = Arc::new(AssetHistory::new(Arc::clone(&store), crawler));

    let mut loans = LoanOfferWorkflow::new(Arc::clone(&store), metadata, chains.clone())
        .with_metrics(Arc::clone(&metrics));
    let settlements = Arc::new(
        SettlementApplier::new(Arc::clone(&store)).with_metrics(Arc::clone(&metrics)),
    );
    let mut hooks = ChainEventHooks::new(Arc::clone(&store), chains, settlements);
    for net in &config.networks {
        loans = loans.with_admin_fee(net.network, net.admin_fee);
        if net.start_block > 0 {
            hooks = hooks.with_start_block(net.network, net.start_block);
        }
    }

    // ── 8. Spawn live feed supervisor ───────────────────────
    let handler = SolseaTradeHandler::new(Arc::clone(&sink)).with_metrics(Arc::clone(&metrics));
    let settings = SessionSettings {
        heartbeat: Duration::from_secs(market.heartbeat_seconds),
        ..SessionSettings::default()
    };
    let supervisor = FeedSupervisor::new(
        Arc::new(WsConnector::new(&market.solsea_ws_url)),
        Arc::new(handler),
        settings,
    )
    .with_reconnect_delay(Duration::from_secs(market.reconnect_seconds))
    .with_metrics(Arc::clone(&metrics));
    let feed_shutdown = shutdown_tx.subscribe();
    let feed_handle = tokio::spawn(async move {
        let pending = supervisor.run(publisher, queue, feed_shutdown).await;
        if let Some(queue) = pending {
            info!(pending = queue.len(), "Live feed stopped");
        }
    });

    // ── 9. Spawn HTTP server ────────────────────────────────
    let server = HttpServer::new(
        ServerState {
            loans: Arc::new(loans),
            history,
            hooks: Arc::new(hooks),
            metrics,
            ready: ready_rx,
        },
        config.server.bind.clone(),
    );
    let server_shutdown = shutdown_tx.subscribe();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(server_shutdown).await {
            error!(error = %e, "HTTP server failed");
        }
    });

    // ── 10. Spawn periodic snapshot loop ────────────────────
    let snapshot_handle = tokio::spawn(snapshot_loop(
        Arc::clone(&store),
        Arc::clone(&snapshots),
        Duration::from_secs(config.persistence.snapshot_interval_seconds),
        shutdown_tx.subscribe(),
    ));

    info!("All tasks spawned, service is running");

    // ── 11. Wait for SIGINT ─────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for SIGINT");
    }
    info!("SIGINT received, initiating graceful shutdown");

    // 1. Readiness probe -> 503
    let _ = ready_tx.send(false);

    // 2. Signal all tasks to stop
    let _ = shutdown_tx.send(());

    // 3. Wait for tasks (bounded)
    for (name, handle) in [
        ("feed", feed_handle),
        ("server", server_handle),
        ("snapshot", snapshot_handle),
    ] {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            warn!(task = name, "Task did not stop in time");
        }
    }

    // 4. Final snapshot
    snapshots
        .save(&store.snapshot().await)
        .await
        .context("Failed to save final snapshot")?;

    info!("Shutdown complete");
    Ok(())
}

/// Save the store every `interval` until shutdown.
async fn snapshot_loop(
    store: Arc<MemoryStore>,
    snapshots: Arc<SnapshotFile>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                if let Err(e) = snapshots.save(&store.snapshot().await).await {
                    warn!(error = %e, "Periodic snapshot failed");
                }
            }
        }
    }
}
