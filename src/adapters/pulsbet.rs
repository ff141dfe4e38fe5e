//! Compressed-overview provider: one per-sport endpoint whose payload uses
//! single-letter field names to keep the document small. The decode tables
//! for those fields live here, in the adapter; canonicalization still goes
//! through the codec like everywhere else.
//!
//! Field map: `g` (top level) = games; per game `b` = pairing string
//! "Home - Away", `d` = start epoch seconds, `e` = external id, `g` = vendor
//! sport code, `l` = league, `h` = markets; per market `n` = market name,
//! `m` = line, `s` = selection, `o` = prices. Three-way price arrays arrive
//! in vendor order home/draw/away.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::http::HttpFetcher;
use super::platform::push_encoded;
use super::{parse_epoch_seconds, AdapterError, ProviderAdapter, RawMatch};
use crate::config::Config;
use crate::markets::codec::{self, VendorMarket};
use crate::markets::vocabulary::{self, SportId};
use crate::providers::{self, ProviderId};
use crate::stats::Stats;

const SUPPORTED: &[SportId] = &[
    vocabulary::FOOTBALL,
    vocabulary::BASKETBALL,
    vocabulary::TENNIS,
    vocabulary::HOCKEY,
    vocabulary::TABLE_TENNIS,
];

pub struct PulsbetAdapter {
    base_url: String,
    fetcher: HttpFetcher,
    stats: Arc<Stats>,
}

impl PulsbetAdapter {
    pub fn new(config: &Config, stats: Arc<Stats>) -> Self {
        let fetcher = HttpFetcher::new(
            "pulsbet",
            Duration::from_secs(config.request_timeout_seconds),
            config.max_concurrent_requests,
            stats.clone(),
        );
        Self { base_url: config.pulsbet_base_url.clone(), fetcher, stats }
    }
}

impl ProviderAdapter for PulsbetAdapter {
    fn provider(&self) -> ProviderId {
        providers::PULSBET
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn supported_sports(&self) -> &'static [SportId] {
        SUPPORTED
    }

    async fn scrape(&self, sport: SportId) -> Result<Vec<RawMatch>, AdapterError> {
        let Some(feed) = vendor_sport(sport) else {
            return Ok(Vec::new());
        };
        let url = format!("{}/feed/{}", self.base_url, feed);
        let payload = self.fetcher.get_json(&url, &[]).await?;
        Ok(parse_feed(sport, &payload, &self.stats))
    }
}

fn vendor_sport(sport: SportId) -> Option<u32> {
    match sport {
        vocabulary::FOOTBALL => Some(66),
        vocabulary::BASKETBALL => Some(67),
        vocabulary::TENNIS => Some(68),
        vocabulary::HOCKEY => Some(70),
        vocabulary::TABLE_TENNIS => Some(77),
        _ => None,
    }
}

pub fn parse_feed(sport: SportId, payload: &Value, stats: &Stats) -> Vec<RawMatch> {
    let provider = providers::PULSBET;
    let Some(games) = payload.get("g").and_then(|g| g.as_array()) else {
        return Vec::new();
    };
    let mut matches = Vec::with_capacity(games.len());
    for game in games {
        let Some(pairing) = game.get("b").and_then(|v| v.as_str()) else { continue };
        let Some((team1, team2)) = pairing.split_once(" - ") else {
            debug!(provider, pairing, "pairing string without separator");
            continue;
        };
        let Some(start_time) = game
            .get("d")
            .and_then(|v| v.as_i64())
            .and_then(parse_epoch_seconds)
        else {
            continue;
        };

        let mut odds = Vec::new();
        for market in game.get("h").and_then(|h| h.as_array()).unwrap_or(&Vec::new()) {
            let Some(code) = market.get("n").and_then(|v| v.as_str()) else { continue };
            let Some(bt) = codec::lookup(provider, sport, code) else {
                Stats::bump(&stats.unmapped_markets);
                debug!(target: "unmapped_market", provider, code, "unknown compressed market");
                continue;
            };
            let margin = market.get("m").and_then(|v| v.as_f64());
            let selection = market.get("s").and_then(|v| v.as_str());
            let prices: Vec<f64> = market
                .get("o")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|p| p.as_f64()).collect())
                .unwrap_or_default();
            if prices.len() != bt.arity as usize {
                Stats::bump(&stats.rows_dropped);
                debug!(provider, code, got = prices.len(), want = bt.arity, "price count mismatch");
                continue;
            }
            // Vendor three-way order is home/draw/away; canonical p3 is the
            // draw-or-third outcome.
            let positional = match bt.arity {
                3 => [Some(prices[0]), Some(prices[2]), Some(prices[1])],
                2 => [Some(prices[0]), Some(prices[1]), None],
                _ => [Some(prices[0]), None, None],
            };
            let encoded = codec::encode(provider, sport, VendorMarket { code, margin, selection });
            push_encoded(provider, code, encoded, positional, stats, &mut odds);
        }

        matches.push(RawMatch {
            provider,
            team1: team1.to_string(),
            team2: team2.to_string(),
            sport,
            start_time,
            league: game.get("l").and_then(|v| v.as_str()).map(str::to_string),
            external_id: game
                .get("e")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            odds,
        });
    }
    matches
}
