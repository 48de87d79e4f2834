//! End-to-end orchestrator tests over scripted collaborators
//!
//! The crawl loop is exercised with mock PairSource / Fetcher / RecordSink
//! implementations so every run-level contract is observable: global dedupe
//! across pairs, per-pair failure isolation, whole-run discovery retry,
//! incremental durability at pair boundaries, fatal sink failures, and
//! guaranteed fetcher shutdown.

use async_trait::async_trait;
use indexmap::IndexSet;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use solharvest::dedupe::DedupeStore;
use solharvest::discovery::{DiscoveryError, Pair, PairSource};
use solharvest::fetcher::{CandidateAddress, FetchError, Fetcher};
use solharvest::orchestrator::{CrawlOptions, CrawlOrchestrator, RunFailure, RunOutcome};
use solharvest::retry::{Pacing, RetryPolicy};
use solharvest::sink::{CsvSink, RecordSink, SinkError, TraderRecord};

fn pair(label: &str, identifier: &str) -> Pair {
    Pair {
        label: label.to_string(),
        identifier: identifier.to_string(),
        source_url: None,
    }
}

/// A structurally valid base58 address built from one repeated character
fn addr(c: char) -> String {
    c.to_string().repeat(40)
}

fn fast_options() -> CrawlOptions {
    CrawlOptions {
        query: "meme".to_string(),
        limit: 20,
        pacing: Pacing {
            min: Duration::ZERO,
            max: Duration::ZERO,
        },
        retry_policy: RetryPolicy {
            max_attempts: 3,
            backoff_min: Duration::ZERO,
            backoff_max: Duration::ZERO,
            backoff_spread: Duration::ZERO,
        },
        discovery_timeout: Duration::from_secs(5),
        fetch_timeout: Duration::from_millis(200),
        emit_synthesized: false,
    }
}

struct ScriptedSource {
    responses: Mutex<VecDeque<Result<Vec<Pair>, DiscoveryError>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn new(responses: Vec<Result<Vec<Pair>, DiscoveryError>>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                responses: Mutex::new(responses.into()),
                calls: calls.clone(),
            },
            calls,
        )
    }

    fn of_pairs(pairs: Vec<Pair>) -> Self {
        Self::new(vec![Ok(pairs)]).0
    }
}

#[async_trait]
impl PairSource for ScriptedSource {
    async fn discover(&self, _query: &str, _limit: usize) -> Result<Vec<Pair>, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(DiscoveryError::Empty))
    }
}

#[derive(Default)]
struct ScriptedFetcher {
    responses: VecDeque<Result<Vec<CandidateAddress>, FetchError>>,
    /// Sleep before answering the first fetch (timeout tests)
    delay_first: Option<Duration>,
    /// Flip this flag after the first fetch completes (cancellation tests)
    cancel_after_first: Option<Arc<AtomicBool>>,
    shutdown_called: Arc<AtomicBool>,
    calls: usize,
}

impl ScriptedFetcher {
    fn new(responses: Vec<Result<Vec<CandidateAddress>, FetchError>>) -> Self {
        Self {
            responses: responses.into(),
            ..Default::default()
        }
    }

    fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown_called.clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch_trader_addresses(
        &mut self,
        _pair: &Pair,
    ) -> Result<IndexSet<CandidateAddress>, FetchError> {
        self.calls += 1;
        // Pop before any await so a fetch cancelled by the orchestrator's
        // timeout still consumes its scripted response
        let response = self.responses.pop_front().unwrap_or(Ok(Vec::new()));

        if self.calls == 1 {
            if let Some(delay) = self.delay_first {
                tokio::time::sleep(delay).await;
            }
        }

        if self.calls == 1 {
            if let Some(flag) = &self.cancel_after_first {
                flag.store(true, Ordering::Relaxed);
            }
        }

        response.map(|candidates| candidates.into_iter().collect())
    }

    fn backend_type(&self) -> &'static str {
        "Scripted"
    }

    async fn shutdown(&mut self) {
        self.shutdown_called.store(true, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct MemorySink {
    records: Arc<Mutex<Vec<TraderRecord>>>,
    fail_appends: bool,
}

impl MemorySink {
    fn new() -> (Self, Arc<Mutex<Vec<TraderRecord>>>) {
        let sink = Self::default();
        let records = sink.records.clone();
        (sink, records)
    }

    fn failing() -> Self {
        Self {
            fail_appends: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn append(&mut self, record: &TraderRecord) -> Result<(), SinkError> {
        if self.fail_appends {
            return Err(SinkError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "Memory"
    }
}

fn orchestrator(
    source: ScriptedSource,
    fetcher: ScriptedFetcher,
    sink: impl RecordSink + 'static,
    options: CrawlOptions,
) -> (CrawlOrchestrator, Arc<AtomicBool>) {
    let cancel = Arc::new(AtomicBool::new(false));
    (
        CrawlOrchestrator::new(
            Box::new(source),
            Box::new(fetcher),
            Box::new(sink),
            options,
            cancel.clone(),
        ),
        cancel,
    )
}

#[tokio::test]
async fn test_global_dedupe_across_pairs_first_seen_order() {
    // Candidates [A,B], [A,C], [B] across three pairs must emit exactly
    // {A,B,C}, once each, labeled with the pair that saw them first.
    let (a, b, c) = (addr('A'), addr('B'), addr('C'));
    let source = ScriptedSource::of_pairs(vec![
        pair("WIF", "pair_1"),
        pair("BONK", "pair_2"),
        pair("POPCAT", "pair_3"),
    ]);
    let fetcher = ScriptedFetcher::new(vec![
        Ok(vec![
            CandidateAddress::observed(&a),
            CandidateAddress::observed(&b),
        ]),
        Ok(vec![
            CandidateAddress::observed(&a),
            CandidateAddress::observed(&c),
        ]),
        Ok(vec![CandidateAddress::observed(&b)]),
    ]);
    let shutdown = fetcher.shutdown_flag();
    let (sink, records) = MemorySink::new();

    let (mut orch, _) = orchestrator(source, fetcher, sink, fast_options());
    let summary = orch.run().await;

    assert!(matches!(summary.outcome, RunOutcome::Completed));
    assert_eq!(summary.pairs_processed, 3);
    assert_eq!(summary.addresses_emitted, 3);

    let records = records.lock().unwrap();
    let emitted: Vec<(String, String)> = records
        .iter()
        .map(|r| (r.coin.clone(), r.address.clone()))
        .collect();
    assert_eq!(
        emitted,
        vec![
            ("WIF".to_string(), a),
            ("WIF".to_string(), b),
            ("BONK".to_string(), c),
        ]
    );

    assert!(shutdown.load(Ordering::Relaxed));
}

#[tokio::test]
async fn test_pair_failure_is_isolated() {
    // Fetch failing for pair 2 of 3 leaves pairs 1 and 3 intact and the run
    // still completes.
    let (a, c) = (addr('A'), addr('C'));
    let source = ScriptedSource::of_pairs(vec![
        pair("WIF", "pair_1"),
        pair("BONK", "pair_2"),
        pair("POPCAT", "pair_3"),
    ]);
    let fetcher = ScriptedFetcher::new(vec![
        Ok(vec![CandidateAddress::observed(&a)]),
        Err(FetchError::SelectorMissing("a[href]".to_string())),
        Ok(vec![CandidateAddress::observed(&c)]),
    ]);
    let (sink, records) = MemorySink::new();

    let (mut orch, _) = orchestrator(source, fetcher, sink, fast_options());
    let summary = orch.run().await;

    assert!(matches!(summary.outcome, RunOutcome::Completed));
    assert_eq!(summary.pairs_processed, 3);
    assert_eq!(summary.addresses_emitted, 2);

    let records = records.lock().unwrap();
    let addresses: Vec<&str> = records.iter().map(|r| r.address.as_str()).collect();
    assert_eq!(addresses, vec![a.as_str(), c.as_str()]);
}

#[tokio::test]
async fn test_fetch_timeout_is_isolated() {
    let b = addr('B');
    let source = ScriptedSource::of_pairs(vec![pair("WIF", "pair_1"), pair("BONK", "pair_2")]);
    let mut fetcher = ScriptedFetcher::new(vec![
        Ok(vec![CandidateAddress::observed(addr('A'))]),
        Ok(vec![CandidateAddress::observed(&b)]),
    ]);
    // First fetch sleeps past the 50ms budget and is absorbed as zero
    fetcher.delay_first = Some(Duration::from_millis(500));
    let (sink, records) = MemorySink::new();

    let mut options = fast_options();
    options.fetch_timeout = Duration::from_millis(50);

    let (mut orch, _) = orchestrator(source, fetcher, sink, options);
    let summary = orch.run().await;

    assert!(matches!(summary.outcome, RunOutcome::Completed));
    assert_eq!(summary.addresses_emitted, 1);
    assert_eq!(records.lock().unwrap()[0].address, b);
}

#[tokio::test]
async fn test_empty_discovery_retries_then_fails() {
    // Empty on all attempts: discovery is invoked exactly max_attempts
    // times, then the run fails carrying the last error.
    let (source, calls) = ScriptedSource::new(vec![
        Err(DiscoveryError::Empty),
        Err(DiscoveryError::Empty),
        Err(DiscoveryError::Empty),
    ]);
    let fetcher = ScriptedFetcher::new(Vec::new());
    let shutdown = fetcher.shutdown_flag();
    let (sink, records) = MemorySink::new();

    let (mut orch, _) = orchestrator(source, fetcher, sink, fast_options());
    let summary = orch.run().await;

    assert!(matches!(
        summary.outcome,
        RunOutcome::Failed(RunFailure::Discovery(DiscoveryError::Empty))
    ));
    assert_eq!(calls.load(Ordering::Relaxed), 3);
    assert_eq!(summary.retry_count, 3);
    assert!(records.lock().unwrap().is_empty());

    // Session resources are released even on the failure path
    assert!(shutdown.load(Ordering::Relaxed));
}

#[tokio::test]
async fn test_discovery_recovers_within_retry_budget() {
    let a = addr('A');
    let (source, calls) = ScriptedSource::new(vec![
        Err(DiscoveryError::TransportFailure("connection reset".to_string())),
        Ok(vec![pair("WIF", "pair_1")]),
    ]);
    let fetcher = ScriptedFetcher::new(vec![Ok(vec![CandidateAddress::observed(&a)])]);
    let (sink, records) = MemorySink::new();

    let (mut orch, _) = orchestrator(source, fetcher, sink, fast_options());
    let summary = orch.run().await;

    assert!(matches!(summary.outcome, RunOutcome::Completed));
    assert_eq!(calls.load(Ordering::Relaxed), 2);
    assert_eq!(summary.retry_count, 1);
    assert_eq!(records.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_records_durable_at_pair_boundary() {
    // Cancel flips while pair 1 is being fetched; the run stops before
    // pair 2 and everything from pair 1 is already on disk.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");

    let (a, b) = (addr('A'), addr('B'));
    let source = ScriptedSource::of_pairs(vec![pair("WIF", "pair_1"), pair("BONK", "pair_2")]);
    let cancel = Arc::new(AtomicBool::new(false));
    let mut fetcher = ScriptedFetcher::new(vec![
        Ok(vec![
            CandidateAddress::observed(&a),
            CandidateAddress::observed(&b),
        ]),
        Ok(vec![CandidateAddress::observed(addr('C'))]),
    ]);
    fetcher.cancel_after_first = Some(cancel.clone());

    let sink = CsvSink::new(&path).unwrap();
    let mut orch = CrawlOrchestrator::new(
        Box::new(source),
        Box::new(fetcher),
        Box::new(sink),
        fast_options(),
        cancel,
    );
    let summary = orch.run().await;

    assert!(matches!(summary.outcome, RunOutcome::Cancelled));
    assert_eq!(summary.pairs_processed, 1);

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains(&format!("WIF,{}", a)));
    assert!(content.contains(&format!("WIF,{}", b)));
    assert!(!content.contains(&addr('C')));
}

#[tokio::test]
async fn test_sink_failure_is_fatal() {
    let source = ScriptedSource::of_pairs(vec![pair("WIF", "pair_1"), pair("BONK", "pair_2")]);
    let fetcher =
        ScriptedFetcher::new(vec![Ok(vec![CandidateAddress::observed(addr('A'))])]);
    let shutdown = fetcher.shutdown_flag();

    let (mut orch, _) = orchestrator(source, fetcher, MemorySink::failing(), fast_options());
    let summary = orch.run().await;

    assert!(matches!(
        summary.outcome,
        RunOutcome::Failed(RunFailure::Sink(_))
    ));
    // The failing pair was never counted as processed
    assert_eq!(summary.pairs_processed, 0);
    assert!(shutdown.load(Ordering::Relaxed));
}

#[tokio::test]
async fn test_invalid_candidates_are_excluded() {
    let a = addr('A');
    let source = ScriptedSource::of_pairs(vec![pair("WIF", "pair_1")]);
    let fetcher = ScriptedFetcher::new(vec![Ok(vec![
        CandidateAddress::observed("too_short"),
        CandidateAddress::observed(addr('0')), // not base58
        CandidateAddress::observed(&a),
    ])]);
    let (sink, records) = MemorySink::new();

    let (mut orch, _) = orchestrator(source, fetcher, sink, fast_options());
    let summary = orch.run().await;

    assert!(matches!(summary.outcome, RunOutcome::Completed));
    assert_eq!(summary.addresses_emitted, 1);
    assert_eq!(records.lock().unwrap()[0].address, a);
}

#[tokio::test]
async fn test_synthesized_dropped_by_default() {
    let a = addr('A');
    let source = ScriptedSource::of_pairs(vec![pair("WIF", "pair_1")]);
    let fetcher = ScriptedFetcher::new(vec![Ok(vec![
        CandidateAddress::synthesized("pair_1_buy_m5_0"),
        CandidateAddress::observed(&a),
    ])]);
    let (sink, records) = MemorySink::new();

    let (mut orch, _) = orchestrator(source, fetcher, sink, fast_options());
    let summary = orch.run().await;

    assert!(matches!(summary.outcome, RunOutcome::Completed));
    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].address, a);
}

#[tokio::test]
async fn test_synthesized_kept_and_labeled_when_opted_in() {
    let source = ScriptedSource::of_pairs(vec![pair("WIF", "pair_1")]);
    let fetcher = ScriptedFetcher::new(vec![Ok(vec![CandidateAddress::synthesized(
        "pair_1_buy_m5_0",
    )])]);
    let (sink, records) = MemorySink::new();

    let mut options = fast_options();
    options.emit_synthesized = true;

    let (mut orch, _) = orchestrator(source, fetcher, sink, options);
    let summary = orch.run().await;

    assert!(matches!(summary.outcome, RunOutcome::Completed));
    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    // Degraded-mode rows are labeled so confidence levels never mix silently
    assert_eq!(records[0].coin, "WIF (synthesized)");
    assert_eq!(records[0].address, "pair_1_buy_m5_0");
}

#[tokio::test]
async fn test_seeded_dedupe_suppresses_known_addresses() {
    let (a, b) = (addr('A'), addr('B'));
    let source = ScriptedSource::of_pairs(vec![pair("WIF", "pair_1")]);
    let fetcher = ScriptedFetcher::new(vec![Ok(vec![
        CandidateAddress::observed(&a),
        CandidateAddress::observed(&b),
    ])]);
    let (sink, records) = MemorySink::new();

    let (mut orch, _) = orchestrator(source, fetcher, sink, fast_options());
    orch.seed_dedupe(vec![a.clone()]);
    let summary = orch.run().await;

    assert!(matches!(summary.outcome, RunOutcome::Completed));
    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].address, b);
    assert_eq!(summary.addresses_emitted, 1);
}

#[test]
fn test_dedupe_store_is_run_scoped() {
    // A fresh store per run: nothing carries over implicitly
    let mut first_run = DedupeStore::new();
    assert!(first_run.try_add("addr"));

    let mut second_run = DedupeStore::new();
    assert!(second_run.try_add("addr"));
}
