pub mod betstar;
pub mod http;
pub mod platform;
pub mod pulsbet;
pub mod velobet;

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::config::Config;
use crate::markets::codec::MarketKey;
use crate::markets::vocabulary::SportId;
use crate::providers::ProviderId;
use crate::stats::Stats;

/// One canonical price row as an adapter emits it, already encoded through
/// the codec. Price fields are positional: `p1` is outcome 1, `p2` outcome
/// 2, `p3` the draw-or-third outcome. An adapter fills exactly as many as
/// the bet type's arity.
#[derive(Debug, Clone)]
pub struct RawOdds {
    pub key: MarketKey,
    pub p1: f64,
    pub p2: Option<f64>,
    pub p3: Option<f64>,
}

impl RawOdds {
    pub fn prices(&self) -> [Option<f64>; 3] {
        [Some(self.p1), self.p2, self.p3]
    }
}

/// One event as observed at one provider during one scrape.
#[derive(Debug, Clone)]
pub struct RawMatch {
    pub provider: ProviderId,
    pub team1: String,
    pub team2: String,
    pub sport: SportId,
    pub start_time: DateTime<Utc>,
    pub league: Option<String>,
    pub external_id: Option<String>,
    pub odds: Vec<RawOdds>,
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned {0}")]
    Status(reqwest::StatusCode),
    #[error("parse: {0}")]
    Parse(String),
    #[error("browser session: {0}")]
    Browser(String),
}

impl AdapterError {
    pub fn parse(msg: impl Into<String>) -> Self {
        AdapterError::Parse(msg.into())
    }
}

/// The capability surface every provider integration exposes to the
/// scheduler. Adapters are stateless across cycles apart from lazily
/// created sessions; they never touch the database.
pub trait ProviderAdapter {
    fn provider(&self) -> ProviderId;
    fn base_url(&self) -> &str;
    fn supported_sports(&self) -> &'static [SportId];
    async fn scrape(&self, sport: SportId) -> Result<Vec<RawMatch>, AdapterError>;
}

/// Closed enum over the adapter implementations. Keeps scrape futures
/// `Send` without boxing and gives the registry a concrete element type.
pub enum AnyAdapter {
    Platform(platform::PlatformAdapter),
    Betstar(betstar::BetstarAdapter),
    Pulsbet(pulsbet::PulsbetAdapter),
    Velobet(velobet::VelobetAdapter),
}

impl AnyAdapter {
    pub fn provider(&self) -> ProviderId {
        match self {
            AnyAdapter::Platform(a) => a.provider(),
            AnyAdapter::Betstar(a) => a.provider(),
            AnyAdapter::Pulsbet(a) => a.provider(),
            AnyAdapter::Velobet(a) => a.provider(),
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            AnyAdapter::Platform(a) => a.base_url(),
            AnyAdapter::Betstar(a) => a.base_url(),
            AnyAdapter::Pulsbet(a) => a.base_url(),
            AnyAdapter::Velobet(a) => a.base_url(),
        }
    }

    pub fn supported_sports(&self) -> &'static [SportId] {
        match self {
            AnyAdapter::Platform(a) => a.supported_sports(),
            AnyAdapter::Betstar(a) => a.supported_sports(),
            AnyAdapter::Pulsbet(a) => a.supported_sports(),
            AnyAdapter::Velobet(a) => a.supported_sports(),
        }
    }

    pub async fn scrape(&self, sport: SportId) -> Result<Vec<RawMatch>, AdapterError> {
        match self {
            AnyAdapter::Platform(a) => a.scrape(sport).await,
            AnyAdapter::Betstar(a) => a.scrape(sport).await,
            AnyAdapter::Pulsbet(a) => a.scrape(sport).await,
            AnyAdapter::Velobet(a) => a.scrape(sport).await,
        }
    }
}

/// Build the adapter set for the enabled providers.
pub fn build_registry(config: &Config, stats: Arc<Stats>) -> Vec<AnyAdapter> {
    let enabled = |name: &str| config.providers_enabled.iter().any(|p| p == name);
    let mut adapters = Vec::new();
    if enabled("topbet") {
        adapters.push(AnyAdapter::Platform(platform::PlatformAdapter::topbet(
            config,
            stats.clone(),
        )));
    }
    if enabled("orionbet") {
        adapters.push(AnyAdapter::Platform(platform::PlatformAdapter::orionbet(
            config,
            stats.clone(),
        )));
    }
    if enabled("betstar") {
        adapters.push(AnyAdapter::Betstar(betstar::BetstarAdapter::new(config, stats.clone())));
    }
    if enabled("pulsbet") {
        adapters.push(AnyAdapter::Pulsbet(pulsbet::PulsbetAdapter::new(config, stats.clone())));
    }
    if enabled("velobet") {
        match &config.browser_ws_url {
            Some(url) if !url.is_empty() => {
                adapters.push(AnyAdapter::Velobet(velobet::VelobetAdapter::new(
                    config,
                    url.clone(),
                    stats,
                )));
            }
            _ => tracing::warn!("velobet enabled but BROWSER_WS_URL is not set; skipping"),
        }
    }
    adapters
}

// --- Shared vendor timestamp parsing ---------------------------------------

/// Epoch seconds as the flat platforms send them.
pub fn parse_epoch_seconds(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// RFC 3339 with offset, the structured vendor's format.
pub fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Naive `YYYY-MM-DDTHH:MM:SS` assumed UTC, seen on older vendor endpoints.
pub fn parse_naive_utc(raw: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_parsers() {
        assert!(parse_epoch_seconds(1_723_456_789).is_some());
        assert_eq!(
            parse_rfc3339("2026-08-01T18:00:00+02:00").map(|dt| dt.to_rfc3339()),
            Some("2026-08-01T16:00:00+00:00".to_string())
        );
        assert!(parse_naive_utc("2026-08-01T18:00:00").is_some());
        assert!(parse_naive_utc("yesterday").is_none());
    }
}
