//! Fetcher abstraction over how participant data is obtained for a pair
//!
//! Two interchangeable backends satisfy the same contract:
//! - `ApiFetcher` - structured DexScreener pair endpoint (degraded mode:
//!   synthesizes provenance-tagged placeholders from trade counts)
//! - `BrowserFetcher` - renders the pair detail page and scrapes it
//!
//! The orchestrator never branches on which backend is active.

pub mod api;
pub mod browser;

use async_trait::async_trait;
use indexmap::IndexSet;

use crate::discovery::Pair;

/// How a candidate address was obtained.
///
/// `Synthesized` values are count-derived placeholders, not real wallet
/// addresses; they must never be silently mixed with observed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Scraped or returned directly by the source
    Observed,
    /// Manufactured from aggregate trade counts (degraded API mode)
    Synthesized,
}

/// A raw address candidate extracted from a source, not yet validated
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateAddress {
    pub value: String,
    pub provenance: Provenance,
}

impl CandidateAddress {
    pub fn observed(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            provenance: Provenance::Observed,
        }
    }

    pub fn synthesized(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            provenance: Provenance::Synthesized,
        }
    }
}

#[derive(Debug)]
pub enum FetchError {
    TransportFailure(String),
    Timeout,
    SelectorMissing(String),
    MalformedPage(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::TransportFailure(e) => write!(f, "Transport failure: {}", e),
            FetchError::Timeout => write!(f, "Fetch timed out"),
            FetchError::SelectorMissing(s) => write!(f, "Selector not found: {}", s),
            FetchError::MalformedPage(e) => write!(f, "Malformed page or payload: {}", e),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::TransportFailure(err.to_string())
        }
    }
}

/// Extracts candidate trader addresses for a single pair.
///
/// A failed fetch for one pair must not abort the run; the orchestrator
/// absorbs the error as zero addresses for that pair.
#[async_trait]
pub trait Fetcher: Send {
    /// Fetch candidate addresses for the pair, in stable first-seen order
    async fn fetch_trader_addresses(
        &mut self,
        pair: &Pair,
    ) -> Result<IndexSet<CandidateAddress>, FetchError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;

    /// Release any scoped session resource. Called exactly once by the
    /// orchestrator on every exit path; no-op for sessionless backends.
    async fn shutdown(&mut self) {}
}
