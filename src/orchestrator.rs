//! Crawl orchestration
//!
//! Drives the run-level state machine: `Idle -> Discovering -> Processing ->
//! (Completed | Failed)`, with a cooperative `Cancelled` exit between pairs.
//! Discovery failures retry whole-run under the `RetryPolicy`; per-pair fetch
//! failures are isolated and contribute zero addresses. Validated, novel
//! addresses are appended to the sink as they are found, so a crash mid-run
//! never loses already-emitted records. The fetcher's scoped session resource
//! is released on every exit path.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::dedupe::DedupeStore;
use crate::discovery::{DiscoveryError, Pair, PairSource};
use crate::fetcher::{Fetcher, Provenance};
use crate::retry::{Pacing, RetryPolicy, RetrySchedule};
use crate::sink::{RecordSink, SinkError, TraderRecord};
use crate::validator;

/// Ephemeral per-run bookkeeping, reported through the summary
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub pairs_total: usize,
    pub pairs_processed: usize,
    pub addresses_emitted: usize,
    /// Failed discovery attempts
    pub retry_count: u32,
}

#[derive(Debug)]
pub enum RunFailure {
    Discovery(DiscoveryError),
    Sink(SinkError),
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunFailure::Discovery(e) => write!(f, "Discovery failed: {}", e),
            RunFailure::Sink(e) => write!(f, "Sink write failed: {}", e),
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    /// Cooperative cancellation between pairs; emitted records are durable
    Cancelled,
    Failed(RunFailure),
}

#[derive(Debug)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub pairs_total: usize,
    pub pairs_processed: usize,
    pub addresses_emitted: usize,
    pub retry_count: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub query: String,
    pub limit: usize,
    pub pacing: Pacing,
    pub retry_policy: RetryPolicy,
    pub discovery_timeout: Duration,
    pub fetch_timeout: Duration,
    /// Keep provenance-tagged synthesized placeholders instead of dropping
    /// them before validation. Kept rows are labeled distinctly.
    pub emit_synthesized: bool,
}

pub struct CrawlOrchestrator {
    source: Box<dyn PairSource>,
    fetcher: Box<dyn Fetcher>,
    sink: Box<dyn RecordSink>,
    dedupe: DedupeStore,
    options: CrawlOptions,
    cancel: Arc<AtomicBool>,
}

impl CrawlOrchestrator {
    pub fn new(
        source: Box<dyn PairSource>,
        fetcher: Box<dyn Fetcher>,
        sink: Box<dyn RecordSink>,
        options: CrawlOptions,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            fetcher,
            sink,
            dedupe: DedupeStore::new(),
            options,
            cancel,
        }
    }

    /// Pre-load the dedupe store with previously emitted addresses
    pub fn seed_dedupe<I>(&mut self, addresses: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        self.dedupe.seed(addresses)
    }

    /// Run one full crawl to completion, exhausted retries, sink failure or
    /// cancellation. The fetcher session is always released before returning.
    pub async fn run(&mut self) -> RunSummary {
        let started_at = Utc::now();
        let mut state = RunState::default();

        let outcome = self.run_inner(&mut state).await;

        // Scoped session release on every exit path
        self.fetcher.shutdown().await;
        if let Err(e) = self.sink.flush().await {
            log::warn!("⚠️  Final sink flush failed: {}", e);
        }

        RunSummary {
            outcome,
            pairs_total: state.pairs_total,
            pairs_processed: state.pairs_processed,
            addresses_emitted: state.addresses_emitted,
            retry_count: state.retry_count,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn run_inner(&mut self, state: &mut RunState) -> RunOutcome {
        let pairs = match self.discover_with_retry(state).await {
            Ok(pairs) => pairs,
            Err(e) => {
                log::error!("❌ Discovery retries exhausted: {}", e);
                return RunOutcome::Failed(RunFailure::Discovery(e));
            }
        };

        state.pairs_total = pairs.len();
        log::info!("📊 Discovered {} pairs:", pairs.len());
        for (i, pair) in pairs.iter().enumerate() {
            log::info!("   {}. {} ({})", i + 1, pair.label, pair.identifier);
        }

        for (i, pair) in pairs.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                log::warn!(
                    "⚠️  Cancelled after {}/{} pairs",
                    state.pairs_processed,
                    state.pairs_total
                );
                return RunOutcome::Cancelled;
            }

            log::info!(
                "Processing {}/{}: {} ({})",
                i + 1,
                state.pairs_total,
                pair.label,
                pair.identifier
            );

            match self.process_pair(pair, state).await {
                Ok(added) => {
                    log::info!(
                        "   {} new addresses for {} (total unique: {})",
                        added,
                        pair.label,
                        self.dedupe.len()
                    );
                }
                Err(e) => {
                    log::error!("❌ Sink write failed for pair {}: {}", pair.identifier, e);
                    return RunOutcome::Failed(RunFailure::Sink(e));
                }
            }

            state.pairs_processed += 1;

            // Mandatory delay after each pair regardless of outcome
            self.options.pacing.pause().await;
        }

        RunOutcome::Completed
    }

    async fn discover_with_retry(
        &mut self,
        state: &mut RunState,
    ) -> Result<Vec<Pair>, DiscoveryError> {
        let mut schedule = RetrySchedule::new(self.options.retry_policy.clone());

        loop {
            log::info!(
                "🔍 Discovering top {} pairs for query '{}'",
                self.options.limit,
                self.options.query
            );

            let attempt = timeout(
                self.options.discovery_timeout,
                self.source.discover(&self.options.query, self.options.limit),
            )
            .await;

            let err = match attempt {
                Ok(Ok(pairs)) => return Ok(pairs),
                Ok(Err(e)) => e,
                Err(_) => DiscoveryError::TransportFailure("discovery timed out".to_string()),
            };

            state.retry_count += 1;
            log::warn!("⚠️  Discovery attempt {} failed: {}", state.retry_count, err);

            if schedule.sleep().await.is_err() {
                return Err(err);
            }
        }
    }

    /// Process one pair: fetch, filter by provenance, validate, dedupe and
    /// emit. Fetch failures are absorbed as zero addresses; only sink
    /// failures propagate.
    async fn process_pair(
        &mut self,
        pair: &Pair,
        state: &mut RunState,
    ) -> Result<usize, SinkError> {
        let fetched = timeout(
            self.options.fetch_timeout,
            self.fetcher.fetch_trader_addresses(pair),
        )
        .await;

        let candidates = match fetched {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => {
                log::warn!("⚠️  Fetch failed for pair {}: {}", pair.identifier, e);
                return Ok(0);
            }
            Err(_) => {
                log::warn!("⚠️  Fetch timed out for pair {}", pair.identifier);
                return Ok(0);
            }
        };

        let mut added = 0usize;
        let mut dropped_synthesized = 0usize;
        let mut rejected = 0usize;

        for candidate in candidates {
            let (address, coin) = match candidate.provenance {
                Provenance::Synthesized if !self.options.emit_synthesized => {
                    dropped_synthesized += 1;
                    continue;
                }
                // Placeholders are labeled distinctly and skip structural
                // validation: they are count-derived, not addresses
                Provenance::Synthesized => {
                    (candidate.value, format!("{} (synthesized)", pair.label))
                }
                Provenance::Observed => {
                    if !validator::is_valid_address(&candidate.value) {
                        rejected += 1;
                        continue;
                    }
                    (candidate.value, pair.label.clone())
                }
            };

            if self.dedupe.try_add(&address) {
                let record = TraderRecord {
                    coin,
                    address,
                };
                self.sink.append(&record).await?;
                added += 1;
                state.addresses_emitted += 1;
            }
        }

        // Batch boundary: everything from this pair is durable before the
        // next pair starts
        self.sink.flush().await?;

        if dropped_synthesized > 0 {
            log::debug!(
                "Dropped {} synthesized placeholders for pair {}",
                dropped_synthesized,
                pair.identifier
            );
        }
        if rejected > 0 {
            log::debug!(
                "Rejected {} structurally invalid candidates for pair {}",
                rejected,
                pair.identifier
            );
        }

        Ok(added)
    }
}
