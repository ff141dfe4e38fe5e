//! The flat platform family: one shared backend deployed under several
//! brands (`topbet`, `orionbet`, and `velobet` behind its anti-bot wall).
//! One config-dict endpoint describes the deployed market catalog; one
//! per-sport endpoint lists events with markets keyed by short codes.
//! Margined markets only appear inside a nested `params` dict keyed by
//! line. Selections arrive with Roman-numeral half prefixes and localized
//! team tokens, which the codec folds away.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use super::http::HttpFetcher;
use super::{parse_epoch_seconds, AdapterError, ProviderAdapter, RawMatch, RawOdds};
use crate::config::Config;
use crate::markets::codec::{self, EncodeOutcome, VendorMarket};
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

pub struct PlatformAdapter {
    provider: ProviderId,
    base_url: String,
    fetcher: HttpFetcher,
    stats: Arc<Stats>,
    /// Market catalog from the config endpoint: code -> vendor display name.
    catalog: OnceCell<HashMap<String, String>>,
}

impl PlatformAdapter {
    pub fn topbet(config: &Config, stats: Arc<Stats>) -> Self {
        Self::deployment(providers::TOPBET, config.topbet_base_url.clone(), config, stats)
    }

    pub fn orionbet(config: &Config, stats: Arc<Stats>) -> Self {
        Self::deployment(providers::ORIONBET, config.orionbet_base_url.clone(), config, stats)
    }

    fn deployment(provider: ProviderId, base_url: String, config: &Config, stats: Arc<Stats>) -> Self {
        let fetcher = HttpFetcher::new(
            providers::provider_name(provider),
            Duration::from_secs(config.request_timeout_seconds),
            config.max_concurrent_requests,
            stats.clone(),
        );
        Self { provider, base_url, fetcher, stats, catalog: OnceCell::new() }
    }
}

impl ProviderAdapter for PlatformAdapter {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn supported_sports(&self) -> &'static [SportId] {
        SUPPORTED
    }

    async fn scrape(&self, sport: SportId) -> Result<Vec<RawMatch>, AdapterError> {
        let Some(path) = sport_path(sport) else {
            return Ok(Vec::new());
        };
        let catalog = self
            .catalog
            .get_or_try_init(|| async {
                let url = format!("{}/config", self.base_url);
                let payload = self.fetcher.get_json(&url, &[]).await?;
                Ok::<_, AdapterError>(parse_catalog(&payload))
            })
            .await?;

        let url = format!("{}/sports/{}/events", self.base_url, path);
        let payload = self.fetcher.get_json(&url, &[]).await?;
        Ok(parse_events(self.provider, sport, &payload, catalog, &self.stats))
    }
}

fn sport_path(sport: SportId) -> Option<&'static str> {
    match sport {
        vocabulary::FOOTBALL => Some("fudbal"),
        vocabulary::BASKETBALL => Some("kosarka"),
        vocabulary::TENNIS => Some("tenis"),
        vocabulary::HOCKEY => Some("hokej"),
        vocabulary::TABLE_TENNIS => Some("stoni-tenis"),
        _ => None,
    }
}

/// The config endpoint ships the deployed market catalog:
/// `{"markets": [{"code": "ki", "name": "Konacni ishod"}, ...]}`.
pub fn parse_catalog(payload: &Value) -> HashMap<String, String> {
    let mut catalog = HashMap::new();
    if let Some(markets) = payload.get("markets").and_then(|m| m.as_array()) {
        for market in markets {
            if let (Some(code), Some(name)) = (
                market.get("code").and_then(|c| c.as_str()),
                market.get("name").and_then(|n| n.as_str()),
            ) {
                catalog.insert(code.to_string(), name.to_string());
            }
        }
    }
    catalog
}

/// Parse one per-sport events payload into raw matches. Pure so fixtures
/// can drive it; shared with the browser-driven deployment.
pub fn parse_events(
    provider: ProviderId,
    sport: SportId,
    payload: &Value,
    catalog: &HashMap<String, String>,
    stats: &Stats,
) -> Vec<RawMatch> {
    let Some(events) = payload.get("events").and_then(|e| e.as_array()) else {
        return Vec::new();
    };
    let mut matches = Vec::with_capacity(events.len());
    for event in events {
        let Some(team1) = event.get("home").and_then(|v| v.as_str()) else { continue };
        let Some(team2) = event.get("away").and_then(|v| v.as_str()) else { continue };
        let Some(start_time) = event
            .get("kickoff")
            .and_then(|v| v.as_i64())
            .and_then(parse_epoch_seconds)
        else {
            continue;
        };

        let mut odds = Vec::new();
        if let Some(markets) = event.get("odds").and_then(|o| o.as_object()) {
            for (code, body) in markets {
                if code == "params" {
                    continue;
                }
                collect_market(provider, sport, code, None, body, catalog, stats, &mut odds);
            }
            if let Some(params) = markets.get("params").and_then(|p| p.as_object()) {
                for (code, lines) in params {
                    let Some(lines) = lines.as_object() else { continue };
                    for (line, body) in lines {
                        let Ok(margin) = line.parse::<f64>() else {
                            debug!(provider, code = %code, line = %line, "unparseable line key");
                            continue;
                        };
                        collect_market(provider, sport, code, Some(margin), body, catalog, stats, &mut odds);
                    }
                }
            }
        }

        matches.push(RawMatch {
            provider,
            team1: team1.to_string(),
            team2: team2.to_string(),
            sport,
            start_time,
            league: event.get("league").and_then(|v| v.as_str()).map(str::to_string),
            external_id: event.get("id").and_then(|v| v.as_i64()).map(|id| id.to_string()),
            odds,
        });
    }
    matches
}

// Price field layouts in canonical (p1, p2, p3) order. p3 is the
// draw-or-third outcome, so a 1X2 object reads "1", "2", "x".
const TRIPLE_LAYOUTS: &[[&str; 3]] = &[["1", "2", "x"], ["1x", "x2", "12"]];
const PAIR_LAYOUTS: &[[&str; 2]] = &[["1", "2"], ["+", "-"], ["gg", "ng"], ["odd", "even"], ["yes", "no"]];

#[allow(clippy::too_many_arguments)]
fn collect_market(
    provider: ProviderId,
    sport: SportId,
    code: &str,
    margin: Option<f64>,
    body: &Value,
    catalog: &HashMap<String, String>,
    stats: &Stats,
    out: &mut Vec<RawOdds>,
) {
    let Some(bt) = codec::lookup(provider, sport, code) else {
        Stats::bump(&stats.unmapped_markets);
        debug!(
            target: "unmapped_market",
            provider,
            code,
            vendor_name = catalog.get(code).map(String::as_str).unwrap_or(""),
            "unknown platform market code"
        );
        return;
    };
    let Some(body) = body.as_object() else { return };

    match bt.arity {
        1 => {
            for (selection, price) in body {
                let Some(price) = price.as_f64() else { continue };
                let encoded = codec::encode(
                    provider,
                    sport,
                    VendorMarket { code, margin, selection: Some(selection.as_str()) },
                );
                push_encoded(provider, code, encoded, [Some(price), None, None], stats, out);
            }
        }
        2 => {
            let Some([p1, p2]) = extract_pair(body) else { return };
            let encoded = codec::encode(provider, sport, VendorMarket { code, margin, selection: None });
            push_encoded(provider, code, encoded, [Some(p1), Some(p2), None], stats, out);
        }
        _ => {
            let Some([p1, p2, p3]) = extract_triple(body) else { return };
            let encoded = codec::encode(provider, sport, VendorMarket { code, margin, selection: None });
            push_encoded(provider, code, encoded, [Some(p1), Some(p2), Some(p3)], stats, out);
        }
    }
}

fn extract_pair(body: &serde_json::Map<String, Value>) -> Option<[f64; 2]> {
    for layout in PAIR_LAYOUTS {
        if let (Some(a), Some(b)) = (
            body.get(layout[0]).and_then(|v| v.as_f64()),
            body.get(layout[1]).and_then(|v| v.as_f64()),
        ) {
            return Some([a, b]);
        }
    }
    None
}

fn extract_triple(body: &serde_json::Map<String, Value>) -> Option<[f64; 3]> {
    for layout in TRIPLE_LAYOUTS {
        if let (Some(a), Some(b), Some(c)) = (
            body.get(layout[0]).and_then(|v| v.as_f64()),
            body.get(layout[1]).and_then(|v| v.as_f64()),
            body.get(layout[2]).and_then(|v| v.as_f64()),
        ) {
            return Some([a, b, c]);
        }
    }
    None
}

/// Shared tail of every adapter's row emission: count unmapped, validate the
/// canonical contract, drop violations.
pub(super) fn push_encoded(
    provider: ProviderId,
    code: &str,
    encoded: EncodeOutcome,
    prices: [Option<f64>; 3],
    stats: &Stats,
    out: &mut Vec<RawOdds>,
) {
    let key = match encoded {
        EncodeOutcome::Key(key) => key,
        EncodeOutcome::Unmapped(detail) => {
            Stats::bump(&stats.unmapped_markets);
            debug!(target: "unmapped_market", provider, code, detail = %detail, "unmapped market");
            return;
        }
    };
    if let Err(violation) = codec::validate(&key, &prices) {
        Stats::bump(&stats.rows_dropped);
        tracing::warn!(provider, code, %violation, "dropping price row");
        return;
    }
    out.push(RawOdds { key, p1: prices[0].unwrap_or_default(), p2: prices[1], p3: prices[2] });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markets::vocabulary::{ASIAN_HANDICAP, FOOTBALL, FULL_TIME_1X2, HALF_GOALS_COMBO, TOTAL_GOALS};
    use crate::providers::TOPBET;

    fn sample_payload() -> Value {
        serde_json::json!({
            "events": [{
                "id": 48211,
                "home": "Crvena Zvezda",
                "away": "Partizan",
                "kickoff": 1_784_138_400,
                "league": "Super Liga",
                "odds": {
                    "ki": {"1": 2.1, "x": 3.3, "2": 3.5},
                    "gg": {"gg": 1.7, "ng": 2.05},
                    "pol": {"I:1+&FT:2+": 2.4},
                    "zzz": {"1": 1.5},
                    "params": {
                        "ah": {"-1.0": {"1": 1.70, "2": 2.10}},
                        "ug": {"2.5": {"+": 1.85, "-": 1.95}}
                    }
                }
            }]
        })
    }

    #[test]
    fn parses_events_markets_and_params() {
        let stats = Stats::new();
        let matches = parse_events(TOPBET, FOOTBALL, &sample_payload(), &HashMap::new(), &stats);
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.team1, "Crvena Zvezda");
        assert_eq!(m.external_id.as_deref(), Some("48211"));

        let x12 = m.odds.iter().find(|o| o.key.bet_type == FULL_TIME_1X2).unwrap();
        // p3 is the draw.
        assert_eq!((x12.p1, x12.p2, x12.p3), (2.1, Some(3.5), Some(3.3)));

        let total = m.odds.iter().find(|o| o.key.bet_type == TOTAL_GOALS).unwrap();
        assert_eq!(total.key.margin, 2.5);
        assert_eq!((total.p1, total.p2), (1.85, Some(1.95)));

        let combo = m.odds.iter().find(|o| o.key.bet_type == HALF_GOALS_COMBO).unwrap();
        assert_eq!(combo.key.selection, "H1:1+&FT:2+");
    }

    #[test]
    fn handicap_line_is_sign_folded() {
        let stats = Stats::new();
        let matches = parse_events(TOPBET, FOOTBALL, &sample_payload(), &HashMap::new(), &stats);
        let ah = matches[0].odds.iter().find(|o| o.key.bet_type == ASIAN_HANDICAP).unwrap();
        // Vendor quoted -1.0; canonical is positive = home advantage.
        assert_eq!(ah.key.margin, 1.0);
        assert_eq!((ah.p1, ah.p2), (1.70, Some(2.10)));
    }

    #[test]
    fn unknown_codes_count_as_unmapped() {
        let stats = Stats::new();
        parse_events(TOPBET, FOOTBALL, &sample_payload(), &HashMap::new(), &stats);
        assert_eq!(stats.snapshot().unmapped_markets, 1);
    }

    #[test]
    fn catalog_parses() {
        let payload = serde_json::json!({"markets": [
            {"code": "ki", "name": "Konacni ishod"},
            {"code": "ug", "name": "Ukupno golova"}
        ]});
        let catalog = parse_catalog(&payload);
        assert_eq!(catalog["ki"], "Konacni ishod");
        assert_eq!(catalog.len(), 2);
    }
}
