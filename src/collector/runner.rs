//! The collection loop: sample, pace, rotate, scrape, deliver, record

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use super::budget::RequestBudget;
use super::pending::PendingUpdates;
use crate::api::ProfileSink;
use crate::config::CollectorConfig;
use crate::error::{CollectorError, Result};
use crate::models::{ProfilePayload, ProfileStatus};
use crate::repository::ProfileStore;
use crate::scraper::{classify_scrape_error, ProfileScraper, ScrapeFailureKind};
use crate::vpn::Tunnel;

const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(600);
const MAX_BACKOFF_DOUBLINGS: u32 = 6;

/// Counters reported when a run ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub processed: u64,
    pub collected: u64,
    pub failed: u64,
    pub rate_limited: u64,
    pub rotations: u64,
}

pub struct CollectionLoop {
    config: CollectorConfig,
    max_connect_attempts: u32,
    tunnel: Box<dyn Tunnel>,
    store: Box<dyn ProfileStore>,
    scraper: Box<dyn ProfileScraper>,
    sink: Box<dyn ProfileSink>,
    budget: RequestBudget,
    pending: PendingUpdates,
    stats: RunStats,
    /// Set once the first tunnel of the run is up
    tunnel_established: bool,
}

impl CollectionLoop {
    pub fn new(
        config: CollectorConfig,
        max_connect_attempts: u32,
        tunnel: Box<dyn Tunnel>,
        store: Box<dyn ProfileStore>,
        scraper: Box<dyn ProfileScraper>,
        sink: Box<dyn ProfileSink>,
    ) -> Self {
        let budget = RequestBudget::new(config.request_threshold, config.rate_limit_penalty);
        Self {
            config,
            max_connect_attempts,
            tunnel,
            store,
            scraper,
            sink,
            budget,
            pending: PendingUpdates::new(),
            stats: RunStats::default(),
            tunnel_established: false,
        }
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn pending(&self) -> &PendingUpdates {
        &self.pending
    }

    /// Process batches until the store has no pending profiles left
    ///
    /// Per-profile failures are recorded as statuses and connection failures
    /// are retried. Only a failed sample ends the run early; call
    /// [`shutdown`](Self::shutdown) afterwards in either case.
    pub async fn run(&mut self) -> Result<RunStats> {
        info!(
            servers = self.tunnel.pool_size(),
            batch_size = self.config.batch_size,
            threshold = self.budget.threshold(),
            "Starting collection"
        );

        loop {
            let batch = match self.store.sample_pending(self.config.batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(phase = "sample", "Failed to fetch pending profiles: {}", e);
                    return Err(e);
                }
            };

            if batch.is_empty() {
                info!("No more profiles to process");
                break;
            }
            debug!(phase = "sample", count = batch.len(), "Fetched pending profiles");

            if !self.tunnel.is_connected() {
                if self.tunnel_established {
                    warn!("VPN tunnel dropped between batches, rotating VPN server");
                    self.rotate().await;
                } else {
                    self.bring_up().await;
                }
            }

            for profile in &batch {
                self.pace().await;

                if self.budget.is_exhausted() {
                    info!(
                        spent = self.budget.spent(),
                        threshold = self.budget.threshold(),
                        "Request budget reached, rotating VPN server"
                    );
                    self.rotate().await;
                } else if !self.tunnel.is_connected() {
                    warn!("VPN tunnel dropped, rotating VPN server");
                    self.rotate().await;
                }

                self.process(profile).await;
            }

            self.pending.flush(self.store.as_ref()).await;
        }

        Ok(self.stats)
    }

    /// Scrape one profile, deliver it and queue its status
    async fn process(&mut self, profile: &str) {
        let username = profile.trim();
        self.stats.processed += 1;

        if username.is_empty() {
            warn!(profile = %profile, "Skipping blank profile identifier");
            self.stats.failed += 1;
            self.pending.push(profile, ProfileStatus::Error);
            return;
        }

        info!(profile = %username, "Collecting profile");
        self.budget.record_attempt();

        let record = match self.scraper.fetch(username).await {
            Ok(record) => record,
            Err(e) => {
                let message = e.to_string();
                match classify_scrape_error(&message) {
                    ScrapeFailureKind::RateLimited => {
                        warn!(
                            profile = %username,
                            phase = "scrape",
                            penalty = self.config.rate_limit_penalty,
                            "Rate limited: {}",
                            message
                        );
                        self.budget.record_rate_limit();
                        self.stats.rate_limited += 1;
                        self.pending.push(profile, ProfileStatus::NotCollected);
                    }
                    ScrapeFailureKind::Other => {
                        error!(
                            profile = %username,
                            phase = "scrape",
                            category = %e.category(),
                            "Failed to collect profile: {}",
                            message
                        );
                        self.stats.failed += 1;
                        self.pending.push(profile, ProfileStatus::Error);
                    }
                }
                return;
            }
        };

        let payload = ProfilePayload::from(record);
        match self.sink.deliver(&payload).await {
            Ok(()) => {
                info!(profile = %username, "Profile delivered");
                self.stats.collected += 1;
                self.pending.push(profile, ProfileStatus::Collected);
            }
            Err(e) => {
                error!(
                    profile = %username,
                    phase = "deliver",
                    category = %e.category(),
                    "Failed to deliver profile: {}",
                    e
                );
                self.stats.failed += 1;
                self.pending.push(profile, ProfileStatus::Error);
            }
        }
    }

    /// Random delay between requests
    async fn pace(&self) {
        let delay = jitter(
            self.config.pacing_min,
            self.config.pacing_max,
            rand::thread_rng().gen::<f64>(),
        );
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    /// Disconnect, settle, flush, connect to the next server, reset the budget
    #[instrument(skip(self), fields(rotation = self.stats.rotations + 1))]
    async fn rotate(&mut self) {
        if self.tunnel.is_connected() {
            self.tunnel.disconnect().await;
        }

        if !self.config.settle_delay.is_zero() {
            debug!(
                seconds = self.config.settle_delay.as_secs_f64(),
                "Waiting before reconnecting"
            );
            sleep(self.config.settle_delay).await;
        }

        self.pending.flush(self.store.as_ref()).await;
        self.bring_up().await;

        self.budget.reset();
        self.stats.rotations += 1;
    }

    /// Try successive servers until one connects
    ///
    /// Never gives up: after every round of `max_connect_attempts` failures it
    /// waits with a growing backoff and starts another round. Nothing is
    /// scraped until a tunnel is up.
    async fn bring_up(&mut self) {
        let mut round: u32 = 0;
        loop {
            for attempt in 1..=self.max_connect_attempts {
                if self.tunnel.connect_next().await {
                    info!(
                        attempt,
                        round = round + 1,
                        endpoint = %self.tunnel.describe().unwrap_or_default(),
                        "VPN tunnel ready"
                    );
                    self.tunnel_established = true;
                    return;
                }
                warn!(
                    attempt,
                    max_attempts = self.max_connect_attempts,
                    "VPN connection attempt failed, trying next server"
                );
            }

            round = round.saturating_add(1);
            let backoff = reconnect_backoff(self.config.reconnect_backoff, round);
            let err = CollectorError::TunnelUnavailable {
                attempts: self.max_connect_attempts,
            };
            error!(
                phase = "connect",
                round,
                category = %err.category(),
                backoff_secs = backoff.as_secs_f64(),
                "{}, retrying",
                err
            );
            if !backoff.is_zero() {
                sleep(backoff).await;
            }
        }
    }

    /// Cleanup phase: disconnect, flush, close the store
    ///
    /// Each step runs regardless of how the previous one went.
    pub async fn shutdown(&mut self) {
        info!("Shutting down collector");

        if self.tunnel.is_connected() {
            self.tunnel.disconnect().await;
            info!("VPN disconnected");
        }

        if !self.pending.flush(self.store.as_ref()).await {
            warn!("Final status updates were not written");
        }

        self.store.close().await;
        info!("Database connection closed");
    }
}

/// Pause after `round` consecutive failed rounds: doubles each round, capped
pub fn reconnect_backoff(base: Duration, round: u32) -> Duration {
    let doublings = round.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
    base.saturating_mul(1 << doublings).min(MAX_RECONNECT_BACKOFF)
}

/// `min + (max - min) * fraction`, with `fraction` in `[0, 1)`
fn jitter(min: Duration, max: Duration, fraction: f64) -> Duration {
    match max.checked_sub(min) {
        Some(span) if !span.is_zero() => min + span.mul_f64(fraction.clamp(0.0, 1.0)),
        _ => min,
    }
}
