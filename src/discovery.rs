//! Trending-pair discovery via the DexScreener search API
//!
//! Endpoint: `GET https://api.dexscreener.com/latest/dex/search?q={query}`
//!
//! The response is treated as untrusted and partial: every field the upstream
//! may omit is optional, and entries missing the fields we need are skipped
//! rather than failing the whole response. Qualifying pairs are filtered to
//! the Solana chain, ranked by 24h volume descending (stable, so ties keep
//! source order) and truncated to the requested limit.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::USER_AGENT;

const DEXSCREENER_API: &str = "https://api.dexscreener.com";

/// A tradable pair selected for crawling. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    /// Token symbol used as the COIN label in the output
    pub label: String,
    /// Source-specific pair address, used to fetch trader data
    pub identifier: String,
    /// Detail page URL when the source provides one
    pub source_url: Option<String>,
}

#[derive(Debug)]
pub enum DiscoveryError {
    /// Network failure, timeout or non-success HTTP status
    TransportFailure(String),
    /// Payload that does not parse as the expected shape
    MalformedResponse(String),
    /// Structurally valid response with zero qualifying pairs
    Empty,
}

impl std::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryError::TransportFailure(e) => write!(f, "Discovery transport failure: {}", e),
            DiscoveryError::MalformedResponse(e) => write!(f, "Malformed discovery response: {}", e),
            DiscoveryError::Empty => write!(f, "No qualifying pairs discovered"),
        }
    }
}

impl std::error::Error for DiscoveryError {}

impl From<reqwest::Error> for DiscoveryError {
    fn from(err: reqwest::Error) -> Self {
        DiscoveryError::TransportFailure(err.to_string())
    }
}

impl From<serde_json::Error> for DiscoveryError {
    fn from(err: serde_json::Error) -> Self {
        DiscoveryError::MalformedResponse(err.to_string())
    }
}

/// Source of candidate trading pairs for a crawl run
#[async_trait]
pub trait PairSource: Send {
    async fn discover(&self, query: &str, limit: usize) -> Result<Vec<Pair>, DiscoveryError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pairs: Option<Vec<PairSummary>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairSummary {
    #[serde(rename = "chainId", default)]
    chain_id: Option<String>,
    #[serde(rename = "pairAddress", default)]
    pair_address: Option<String>,
    #[serde(rename = "baseToken", default)]
    base_token: Option<BaseToken>,
    #[serde(default)]
    volume: Option<VolumeBuckets>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct BaseToken {
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct VolumeBuckets {
    // Observed as both a JSON number and a stringified number upstream
    #[serde(default)]
    h24: Option<serde_json::Value>,
}

impl PairSummary {
    fn volume_h24(&self) -> f64 {
        self.volume
            .as_ref()
            .and_then(|v| v.h24.as_ref())
            .and_then(|h24| match h24 {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .unwrap_or(0.0)
    }
}

/// Filter to the Solana chain, rank by 24h volume descending and truncate.
///
/// The sort is stable: pairs with equal volume keep their source order.
/// Entries missing the pair address or base token symbol are skipped.
pub fn rank_pairs(summaries: Vec<PairSummary>, limit: usize) -> Vec<Pair> {
    let mut qualifying: Vec<PairSummary> = summaries
        .into_iter()
        .filter(|p| p.chain_id.as_deref() == Some("solana"))
        .filter(|p| p.pair_address.is_some())
        .filter(|p| p.base_token.as_ref().and_then(|t| t.symbol.as_ref()).is_some())
        .collect();

    qualifying.sort_by(|a, b| {
        b.volume_h24()
            .partial_cmp(&a.volume_h24())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    qualifying.truncate(limit);

    qualifying
        .into_iter()
        .map(|p| Pair {
            label: p
                .base_token
                .as_ref()
                .and_then(|t| t.symbol.clone())
                .unwrap_or_default(),
            identifier: p.pair_address.clone().unwrap_or_default(),
            source_url: p.url,
        })
        .collect()
}

/// DexScreener-backed pair discovery
pub struct PairDiscovery {
    client: reqwest::Client,
    base_url: String,
}

impl PairDiscovery {
    pub fn new(timeout: Duration) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: DEXSCREENER_API.to_string(),
        })
    }
}

#[async_trait]
impl PairSource for PairDiscovery {
    async fn discover(&self, query: &str, limit: usize) -> Result<Vec<Pair>, DiscoveryError> {
        let url = format!("{}/latest/dex/search", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DiscoveryError::TransportFailure(format!(
                "search returned HTTP {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let parsed: SearchResponse = serde_json::from_str(&body)?;

        let pairs = rank_pairs(parsed.pairs.unwrap_or_default(), limit);
        if pairs.is_empty() {
            return Err(DiscoveryError::Empty);
        }

        Ok(pairs)
    }
}
