//! Browser-automation fetcher over a pair's detail page
//!
//! Renders the pair page in a chromiumoxide-controlled Chromium session,
//! waits up to a bounded timeout for the trader panel to appear, then scrapes
//! explorer account links and table cells that structurally resemble
//! addresses. A jittered human-like delay is applied before and after each
//! navigation to avoid request-rate triggers.
//!
//! The browser is a single scoped resource: launched once at run start and
//! released exactly once through `shutdown`, whichever way the run exits.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use indexmap::IndexSet;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::USER_AGENT;
use crate::discovery::Pair;
use crate::fetcher::{CandidateAddress, FetchError, Fetcher};
use crate::retry::jitter_between;

const PAIR_PAGE_BASE: &str = "https://dexscreener.com/solana";

/// Explorer links on the pair page that carry wallet addresses
const ACCOUNT_LINK_SELECTOR: &str = "a[href*='solscan.io/account/']";

/// Poll interval while waiting for the trader panel to render
const PANEL_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Bounded wait for the trader panel to become visible
    pub panel_wait: Duration,
    /// Human-like delay window applied before and after navigation
    pub nav_delay_min: Duration,
    pub nav_delay_max: Duration,
}

pub struct BrowserFetcher {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    options: BrowserOptions,
}

impl BrowserFetcher {
    /// Launch the browsing session. The session lives for the whole run.
    pub async fn launch(options: BrowserOptions) -> Result<Self, FetchError> {
        let mut builder = BrowserConfig::builder().window_size(1366, 768);
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(FetchError::TransportFailure)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::TransportFailure(e.to_string()))?;

        // The handler stream must be polled for the browser connection to
        // make progress; it ends when the browser closes.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::TransportFailure(e.to_string()))?;

        page.set_user_agent(USER_AGENT)
            .await
            .map_err(|e| FetchError::TransportFailure(e.to_string()))?;

        log::info!(
            "🌐 Browser session started (headless: {})",
            options.headless
        );

        Ok(Self {
            browser,
            page,
            handler_task,
            options,
        })
    }

    async fn human_delay(&self) {
        let delay = jitter_between(self.options.nav_delay_min, self.options.nav_delay_max);
        sleep(delay).await;
    }

    /// Wait for the trader panel selector to appear, up to the configured
    /// bound. The panel never appearing is a soft failure for this pair.
    async fn wait_for_trader_panel(&self) -> Result<(), FetchError> {
        let deadline = Instant::now() + self.options.panel_wait;

        loop {
            if let Ok(elements) = self.page.find_elements(ACCOUNT_LINK_SELECTOR).await {
                if !elements.is_empty() {
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                return Err(FetchError::SelectorMissing(
                    ACCOUNT_LINK_SELECTOR.to_string(),
                ));
            }

            sleep(PANEL_POLL_INTERVAL).await;
        }
    }

    /// Pull every address-shaped string off the rendered page: explorer
    /// account links first, then bare table cells.
    async fn scrape_candidates(&self) -> Result<IndexSet<CandidateAddress>, FetchError> {
        let mut candidates = IndexSet::new();

        let links = self
            .page
            .find_elements("a")
            .await
            .map_err(|e| FetchError::MalformedPage(e.to_string()))?;

        for link in links {
            let Ok(Some(href)) = link.attribute("href").await else {
                continue;
            };
            if let Some(address) = href.split("/account/").nth(1) {
                let address = address.trim_matches('/');
                if !address.is_empty() {
                    candidates.insert(CandidateAddress::observed(address));
                }
            }
        }

        // Table cells holding bare addresses; the validator filters the rest
        if let Ok(cells) = self.page.find_elements("td").await {
            for cell in cells {
                let Ok(Some(text)) = cell.inner_text().await else {
                    continue;
                };
                let text = text.trim();
                if !text.is_empty() && !text.contains(char::is_whitespace) {
                    candidates.insert(CandidateAddress::observed(text));
                }
            }
        }

        Ok(candidates)
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch_trader_addresses(
        &mut self,
        pair: &Pair,
    ) -> Result<IndexSet<CandidateAddress>, FetchError> {
        let url = pair
            .source_url
            .clone()
            .unwrap_or_else(|| format!("{}/{}", PAIR_PAGE_BASE, pair.identifier));

        self.human_delay().await;

        self.page
            .goto(url.as_str())
            .await
            .map_err(|e| FetchError::TransportFailure(e.to_string()))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| FetchError::TransportFailure(e.to_string()))?;

        self.human_delay().await;

        self.wait_for_trader_panel().await?;

        let candidates = self.scrape_candidates().await?;
        log::debug!(
            "Browser fetch for {}: scraped {} candidates",
            pair.identifier,
            candidates.len()
        );

        Ok(candidates)
    }

    fn backend_type(&self) -> &'static str {
        "Browser"
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.browser.close().await {
            log::warn!("⚠️  Browser did not close cleanly: {}", e);
        }
        // The handler stream ends once the browser process is gone; don't
        // hang teardown if it never does
        let drained =
            tokio::time::timeout(Duration::from_secs(5), &mut self.handler_task).await;
        if drained.is_err() {
            self.handler_task.abort();
        }
        log::info!("🌐 Browser session closed");
    }
}
