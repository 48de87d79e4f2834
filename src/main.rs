pub mod config;
pub mod dedupe;
pub mod discovery;
pub mod fetcher;
pub mod orchestrator;
pub mod retry;
pub mod sink;
pub mod validator;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use config::{Config, FetcherBackend};
use discovery::PairDiscovery;
use fetcher::api::ApiFetcher;
use fetcher::browser::{BrowserFetcher, BrowserOptions};
use fetcher::Fetcher;
use orchestrator::{CrawlOptions, CrawlOrchestrator, RunOutcome};
use retry::{Pacing, RetryPolicy};
use sink::CsvSink;

#[tokio::main]
pub async fn main() {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    log::info!("🚀 Starting solharvest...");
    log::info!("📊 Configuration:");
    log::info!("   Query: {}", config.query);
    log::info!("   Top pairs: {}", config.top_pairs);
    log::info!("   Backend: {:?}", config.backend);
    log::info!("   Output: {}", config.output_path);

    let sink = match CsvSink::new(&config.output_path) {
        Ok(sink) => sink,
        Err(e) => {
            log::error!("❌ Cannot open output file {}: {}", config.output_path, e);
            std::process::exit(2);
        }
    };

    let source = match PairDiscovery::new(config.discovery_timeout) {
        Ok(source) => source,
        Err(e) => {
            log::error!("❌ Cannot build discovery client: {}", e);
            std::process::exit(2);
        }
    };

    let fetcher: Box<dyn Fetcher> = match config.backend {
        FetcherBackend::Api => match ApiFetcher::new(config.fetch_timeout) {
            Ok(fetcher) => Box::new(fetcher),
            Err(e) => {
                log::error!("❌ Cannot build API fetcher: {}", e);
                std::process::exit(2);
            }
        },
        FetcherBackend::Browser => {
            let options = BrowserOptions {
                headless: config.browser_headless,
                panel_wait: config.panel_wait,
                nav_delay_min: config.nav_delay_min,
                nav_delay_max: config.nav_delay_max,
            };
            match BrowserFetcher::launch(options).await {
                Ok(fetcher) => Box::new(fetcher),
                Err(e) => {
                    log::error!("❌ Cannot launch browser session: {}", e);
                    std::process::exit(2);
                }
            }
        }
    };

    // Cooperative cancellation between pairs
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("⚠️  Ctrl-C received, stopping after the current pair");
            cancel_flag.store(true, Ordering::Relaxed);
        }
    });

    let options = CrawlOptions {
        query: config.query.clone(),
        limit: config.top_pairs,
        pacing: Pacing {
            min: config.pacing_min,
            max: config.pacing_max,
        },
        retry_policy: RetryPolicy {
            max_attempts: config.retry_max_attempts,
            backoff_min: config.backoff_min,
            backoff_max: config.backoff_max,
            backoff_spread: config.backoff_spread,
        },
        discovery_timeout: config.discovery_timeout,
        fetch_timeout: config.fetch_timeout,
        emit_synthesized: config.emit_synthesized,
    };

    let mut orchestrator = CrawlOrchestrator::new(
        Box::new(source),
        fetcher,
        Box::new(sink),
        options,
        cancel,
    );

    if config.resume_from_output {
        match CsvSink::existing_addresses(&config.output_path) {
            Ok(addresses) => {
                let seeded = orchestrator.seed_dedupe(addresses);
                log::info!("🔁 Seeded {} previously emitted addresses", seeded);
            }
            Err(e) => {
                log::warn!("⚠️  Could not read previous output for seeding: {}", e);
            }
        }
    }

    let summary = orchestrator.run().await;

    let elapsed = summary.finished_at - summary.started_at;
    log::info!(
        "📊 Run finished in {}s: {}/{} pairs processed, {} unique addresses written to {}",
        elapsed.num_seconds(),
        summary.pairs_processed,
        summary.pairs_total,
        summary.addresses_emitted,
        config.output_path
    );

    match summary.outcome {
        RunOutcome::Completed => {
            log::info!("✅ Crawl completed");
        }
        RunOutcome::Cancelled => {
            log::warn!("⚠️  Crawl cancelled; emitted records are preserved");
        }
        RunOutcome::Failed(failure) => {
            log::error!(
                "❌ Crawl failed after {} discovery attempts: {}",
                summary.retry_count,
                failure
            );
            std::process::exit(1);
        }
    }
}
