//! Prometheus Metrics Registry - Lending Observability
//!
//! Registers the `nftlend_*` metrics and renders them in the text
//! exposition format for the `/metrics` route of the HTTP server.
//! Covers signed listings and offers, signature rejections, crawl
//! runs, ingested trades, live-feed frames and applied settlements.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Centralized Prometheus metrics for the lending service.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Loans created through the signed-listing workflow.
    pub loans_created: IntCounterVec,
    /// Offers created through the signed-offer workflow.
    pub offers_created: IntCounterVec,
    /// Listings and offers rejected by signature verification.
    pub signature_rejections: IntCounterVec,
    /// Crawl runs per source and outcome (`ok`, `failed`, `skipped`).
    pub crawl_runs: IntCounterVec,
    /// Trades appended to the asset ledger per source.
    pub trades_ingested: IntCounterVec,
    /// Live-feed frames per kind (`trade`, `other`, `unparsed`).
    pub feed_frames: IntCounterVec,
    /// Live-feed reconnects.
    pub feed_reconnects: IntCounter,
    /// Live-feed connection status (1 = connected).
    pub feed_connected: IntGauge,
    /// Settlement events applied per kind.
    pub settlements: IntCounterVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let loans_created = IntCounterVec::new(
            Opts::new("nftlend_loans_created_total", "Loans listed with a verified signature"),
            &["network"],
        )?;

        let offers_created = IntCounterVec::new(
            Opts::new("nftlend_offers_created_total", "Offers created with a verified signature"),
            &["network"],
        )?;

        let signature_rejections = IntCounterVec::new(
            Opts::new(
                "nftlend_signature_rejections_total",
                "Listings and offers whose signer did not match",
            ),
            &["network", "kind"],
        )?;

        let crawl_runs = IntCounterVec::new(
            Opts::new("nftlend_crawl_runs_total", "Marketplace crawl runs"),
            &["source", "outcome"],
        )?;

        let trades_ingested = IntCounterVec::new(
            Opts::new("nftlend_trades_ingested_total", "External trades recorded"),
            &["source"],
        )?;

        let feed_frames = IntCounterVec::new(
            Opts::new("nftlend_feed_frames_total", "Inbound live-feed frames"),
            &["kind"],
        )?;

        let feed_reconnects = IntCounter::new(
            "nftlend_feed_reconnects_total",
            "Live-feed sessions restarted after ending",
        )?;

        let feed_connected = IntGauge::new(
            "nftlend_feed_connected",
            "Live-feed connection status (1=connected, 0=disconnected)",
        )?;

        let settlements = IntCounterVec::new(
            Opts::new("nftlend_settlements_total", "Settlement events applied"),
            &["network", "kind"],
        )?;

        registry.register(Box::new(loans_created.clone()))?;
        registry.register(Box::new(offers_created.clone()))?;
        registry.register(Box::new(signature_rejections.clone()))?;
        registry.register(Box::new(crawl_runs.clone()))?;
        registry.register(Box::new(trades_ingested.clone()))?;
        registry.register(Box::new(feed_frames.clone()))?;
        registry.register(Box::new(feed_reconnects.clone()))?;
        registry.register(Box::new(feed_connected.clone()))?;
        registry.register(Box::new(settlements.clone()))?;

        Ok(Self {
            registry,
            loans_created,
            offers_created,
            signature_rejections,
            crawl_runs,
            trades_ingested,
            feed_frames,
            feed_reconnects,
            feed_connected,
            settlements,
        })
    }

    /// Render every metric in the Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_counters() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.loans_created.with_label_values(&["MATIC"]).inc();
        metrics
            .crawl_runs
            .with_label_values(&["magiceden.io", "ok"])
            .inc_by(2);

        let text = metrics.render();
        assert!(text.contains("nftlend_loans_created_total{network=\"MATIC\"} 1"));
        assert!(text.contains("nftlend_crawl_runs_total{outcome=\"ok\",source=\"magiceden.io\"} 2"));
    }
}
