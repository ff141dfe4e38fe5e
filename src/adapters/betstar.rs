//! Structured provider: hierarchical JSON with first-class bet type ids,
//! outcome arrays and market names. The only fold it needs is the HT/FT
//! separator (`1-1` instead of `1/1`), handled by the codec.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::http::HttpFetcher;
use super::platform::push_encoded;
use super::{parse_rfc3339, AdapterError, ProviderAdapter, RawMatch, RawOdds};
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

#[derive(Debug, Deserialize)]
pub struct BetstarOffer {
    pub events: Vec<BetstarEvent>,
}

#[derive(Debug, Deserialize)]
pub struct BetstarEvent {
    pub event_id: String,
    pub home: String,
    pub away: String,
    pub start: String,
    pub league: Option<BetstarLeague>,
    #[serde(default)]
    pub markets: Vec<BetstarMarket>,
}

#[derive(Debug, Deserialize)]
pub struct BetstarLeague {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct BetstarMarket {
    pub bet_type_id: i64,
    #[serde(default)]
    pub market_name: String,
    pub line: Option<f64>,
    #[serde(default)]
    pub bet_outcomes: Vec<BetstarOutcome>,
}

/// Outcomes carry either a positional index (1, 2, 3 = draw-or-third) or a
/// selection string, never both.
#[derive(Debug, Deserialize)]
pub struct BetstarOutcome {
    pub index: Option<u8>,
    pub selection: Option<String>,
    pub price: f64,
}

pub struct BetstarAdapter {
    base_url: String,
    fetcher: HttpFetcher,
    stats: Arc<Stats>,
}

impl BetstarAdapter {
    pub fn new(config: &Config, stats: Arc<Stats>) -> Self {
        let fetcher = HttpFetcher::new(
            "betstar",
            Duration::from_secs(config.request_timeout_seconds),
            config.max_concurrent_requests,
            stats.clone(),
        );
        Self { base_url: config.betstar_base_url.clone(), fetcher, stats }
    }
}

impl ProviderAdapter for BetstarAdapter {
    fn provider(&self) -> ProviderId {
        providers::BETSTAR
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn supported_sports(&self) -> &'static [SportId] {
        SUPPORTED
    }

    async fn scrape(&self, sport: SportId) -> Result<Vec<RawMatch>, AdapterError> {
        let Some(code) = sport_code(sport) else {
            return Ok(Vec::new());
        };
        let url = format!("{}/v2/offer", self.base_url);
        let payload = self
            .fetcher
            .get_json(&url, &[("sport", code.to_string())])
            .await?;
        let offer: BetstarOffer = serde_json::from_value(payload)
            .map_err(|e| AdapterError::parse(format!("offer: {}", e)))?;
        Ok(parse_offer(sport, offer, &self.stats))
    }
}

fn sport_code(sport: SportId) -> Option<&'static str> {
    match sport {
        vocabulary::FOOTBALL => Some("soccer"),
        vocabulary::BASKETBALL => Some("basket"),
        vocabulary::TENNIS => Some("tennis"),
        vocabulary::HOCKEY => Some("ice-hockey"),
        vocabulary::TABLE_TENNIS => Some("table-tennis"),
        _ => None,
    }
}

pub fn parse_offer(sport: SportId, offer: BetstarOffer, stats: &Stats) -> Vec<RawMatch> {
    let provider = providers::BETSTAR;
    let mut matches = Vec::with_capacity(offer.events.len());
    for event in offer.events {
        let Some(start_time) = parse_rfc3339(&event.start) else {
            debug!(provider, event_id = %event.event_id, start = %event.start, "unparseable start time");
            continue;
        };
        let mut odds = Vec::new();
        for market in &event.markets {
            collect_market(provider, sport, market, stats, &mut odds);
        }
        matches.push(RawMatch {
            provider,
            team1: event.home,
            team2: event.away,
            sport,
            start_time,
            league: event.league.map(|l| l.name),
            external_id: Some(event.event_id),
            odds,
        });
    }
    matches
}

fn collect_market(
    provider: ProviderId,
    sport: SportId,
    market: &BetstarMarket,
    stats: &Stats,
    out: &mut Vec<RawOdds>,
) {
    let code = market.bet_type_id.to_string();
    let Some(bt) = codec::lookup(provider, sport, &code) else {
        Stats::bump(&stats.unmapped_markets);
        debug!(
            target: "unmapped_market",
            provider,
            vendor_id = market.bet_type_id,
            market_name = %market.market_name,
            "unknown structured bet type"
        );
        return;
    };

    if bt.arity == 1 {
        for outcome in &market.bet_outcomes {
            let Some(selection) = outcome.selection.as_deref() else { continue };
            let encoded = codec::encode(
                provider,
                sport,
                VendorMarket { code: &code, margin: market.line, selection: Some(selection) },
            );
            push_encoded(provider, &code, encoded, [Some(outcome.price), None, None], stats, out);
        }
        return;
    }

    let mut prices = [None, None, None];
    for outcome in &market.bet_outcomes {
        if let Some(index @ 1..=3) = outcome.index {
            prices[(index - 1) as usize] = Some(outcome.price);
        }
    }
    let encoded = codec::encode(
        provider,
        sport,
        VendorMarket { code: &code, margin: market.line, selection: None },
    );
    push_encoded(provider, &code, encoded, prices, stats, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markets::vocabulary::{ASIAN_HANDICAP, FOOTBALL, FULL_TIME_1X2, HALFTIME_FULLTIME};

    fn offer(json: serde_json::Value) -> BetstarOffer {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn parses_indexed_and_selection_outcomes() {
        let stats = Stats::new();
        let offer = offer(serde_json::json!({
            "events": [{
                "event_id": "e-991",
                "home": "Partizan",
                "away": "Red Star Belgrade",
                "start": "2026-08-01T18:00:00Z",
                "league": {"name": "Super Liga"},
                "markets": [
                    {"bet_type_id": 110, "market_name": "Match Result", "line": null,
                     "bet_outcomes": [
                        {"index": 1, "price": 2.3},
                        {"index": 2, "price": 3.4},
                        {"index": 3, "price": 3.1}
                     ]},
                    {"bet_type_id": 140, "market_name": "Halftime/Fulltime",
                     "bet_outcomes": [{"selection": "1-1", "price": 5.6}]},
                    {"bet_type_id": 131, "market_name": "Asian Handicap", "line": 1.0,
                     "bet_outcomes": [{"index": 1, "price": 1.72}, {"index": 2, "price": 2.05}]}
                ]
            }]
        }));
        let matches = parse_offer(FOOTBALL, offer, &stats);
        assert_eq!(matches.len(), 1);
        let m = &matches[0];

        let x12 = m.odds.iter().find(|o| o.key.bet_type == FULL_TIME_1X2).unwrap();
        assert_eq!((x12.p1, x12.p2, x12.p3), (2.3, Some(3.4), Some(3.1)));

        // '-' separator folds to canonical '/'.
        let htft = m.odds.iter().find(|o| o.key.bet_type == HALFTIME_FULLTIME).unwrap();
        assert_eq!(htft.key.selection, "1/1");
        assert_eq!(htft.p1, 5.6);

        // Structured vendor already quotes home-advantage lines; no fold.
        let ah = m.odds.iter().find(|o| o.key.bet_type == ASIAN_HANDICAP).unwrap();
        assert_eq!(ah.key.margin, 1.0);
    }

    #[test]
    fn incomplete_outcome_sets_are_dropped() {
        let stats = Stats::new();
        let offer = offer(serde_json::json!({
            "events": [{
                "event_id": "e-1",
                "home": "A", "away": "B",
                "start": "2026-08-01T18:00:00Z",
                "markets": [
                    {"bet_type_id": 110, "bet_outcomes": [{"index": 1, "price": 2.0}]}
                ]
            }]
        }));
        let matches = parse_offer(FOOTBALL, offer, &stats);
        assert!(matches[0].odds.is_empty());
        assert_eq!(stats.snapshot().rows_dropped, 1);
    }
}
