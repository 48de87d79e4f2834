//! Structured API fetcher over the DexScreener pair endpoint
//!
//! Endpoint: `GET https://api.dexscreener.com/latest/dex/pairs/solana/{pair}`
//!
//! The endpoint exposes buy/sell counts per timeframe but not the identity of
//! individual traders. This backend therefore runs in a degraded mode: it
//! synthesizes placeholder identifiers from the counts, tagged
//! `Provenance::Synthesized`, which prove volume but not identity. The
//! orchestrator drops them before validation unless explicitly configured to
//! keep them.

use async_trait::async_trait;
use indexmap::IndexSet;
use serde::Deserialize;
use std::time::Duration;

use crate::config::USER_AGENT;
use crate::discovery::Pair;
use crate::fetcher::{CandidateAddress, FetchError, Fetcher};

const DEXSCREENER_API: &str = "https://api.dexscreener.com";

/// Timeframe buckets exposed by the pair endpoint
const TIMEFRAMES: [&str; 4] = ["m5", "m15", "h1", "h24"];

/// Cap on placeholders synthesized per (direction, timeframe) bucket
const SYNTH_CAP_PER_BUCKET: u64 = 100;

#[derive(Debug, Deserialize)]
struct PairResponse {
    #[serde(default)]
    pair: Option<PairDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct PairDetail {
    #[serde(default)]
    txns: Option<TxnBuckets>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TxnBuckets {
    #[serde(default)]
    m5: Option<TxnCounts>,
    #[serde(default)]
    m15: Option<TxnCounts>,
    #[serde(default)]
    h1: Option<TxnCounts>,
    #[serde(default)]
    h24: Option<TxnCounts>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TxnCounts {
    #[serde(default)]
    buys: Option<u64>,
    #[serde(default)]
    sells: Option<u64>,
}

impl TxnBuckets {
    fn get(&self, timeframe: &str) -> Option<&TxnCounts> {
        match timeframe {
            "m5" => self.m5.as_ref(),
            "m15" => self.m15.as_ref(),
            "h1" => self.h1.as_ref(),
            "h24" => self.h24.as_ref(),
            _ => None,
        }
    }
}

/// Synthesize placeholder participant identifiers from per-timeframe trade
/// counts, capped per bucket. Deterministic and insertion-ordered.
pub fn synthesize_candidates(identifier: &str, txns: &TxnBuckets) -> IndexSet<CandidateAddress> {
    let mut candidates = IndexSet::new();

    for timeframe in TIMEFRAMES {
        let Some(counts) = txns.get(timeframe) else {
            continue;
        };

        let buys = counts.buys.unwrap_or(0).min(SYNTH_CAP_PER_BUCKET);
        for i in 0..buys {
            candidates.insert(CandidateAddress::synthesized(format!(
                "{}_buy_{}_{}",
                identifier, timeframe, i
            )));
        }

        let sells = counts.sells.unwrap_or(0).min(SYNTH_CAP_PER_BUCKET);
        for i in 0..sells {
            candidates.insert(CandidateAddress::synthesized(format!(
                "{}_sell_{}_{}",
                identifier, timeframe, i
            )));
        }
    }

    candidates
}

pub struct ApiFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl ApiFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
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
impl Fetcher for ApiFetcher {
    async fn fetch_trader_addresses(
        &mut self,
        pair: &Pair,
    ) -> Result<IndexSet<CandidateAddress>, FetchError> {
        let url = format!(
            "{}/latest/dex/pairs/solana/{}",
            self.base_url, pair.identifier
        );

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::TransportFailure(format!(
                "pair endpoint returned HTTP {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let parsed: PairResponse = serde_json::from_str(&body)
            .map_err(|e| FetchError::MalformedPage(e.to_string()))?;

        let Some(detail) = parsed.pair else {
            return Err(FetchError::MalformedPage(
                "response is missing the pair object".to_string(),
            ));
        };

        let candidates = detail
            .txns
            .map(|txns| synthesize_candidates(&pair.identifier, &txns))
            .unwrap_or_default();

        log::debug!(
            "API fetch for {}: synthesized {} placeholder candidates",
            pair.identifier,
            candidates.len()
        );

        Ok(candidates)
    }

    fn backend_type(&self) -> &'static str {
        "API"
    }
}
