//! Browser-driven deployment of the platform family. The output contract is
//! identical to the plain-HTTP deployments; only the channel differs: every
//! request goes through a headless-browser session so the vendor's anti-bot
//! wall sees a real page. The session persists across cycles; any failure
//! tears it down and the next cycle starts a fresh one.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::platform::{parse_catalog, parse_events};
use super::{AdapterError, ProviderAdapter, RawMatch};
use crate::browser::BrowserSession;
use crate::config::Config;
use crate::markets::vocabulary::{self, SportId};
use crate::providers::{self, ProviderId};
use crate::stats::Stats;

const SUPPORTED: &[SportId] = &[
    vocabulary::FOOTBALL,
    vocabulary::BASKETBALL,
    vocabulary::TENNIS,
];

pub struct VelobetAdapter {
    base_url: String,
    devtools_url: String,
    stats: Arc<Stats>,
    session: Mutex<Option<BrowserSession>>,
    catalog: Mutex<Option<HashMap<String, String>>>,
}

impl VelobetAdapter {
    pub fn new(config: &Config, devtools_url: String, stats: Arc<Stats>) -> Self {
        Self {
            base_url: config.velobet_base_url.clone(),
            devtools_url,
            stats,
            session: Mutex::new(None),
            catalog: Mutex::new(None),
        }
    }
}

impl ProviderAdapter for VelobetAdapter {
    fn provider(&self) -> ProviderId {
        providers::VELOBET
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn supported_sports(&self) -> &'static [SportId] {
        SUPPORTED
    }

    async fn scrape(&self, sport: SportId) -> Result<Vec<RawMatch>, AdapterError> {
        let Some(path) = platform_sport_path(sport) else {
            return Ok(Vec::new());
        };

        let catalog = match self.fetch_catalog().await {
            Ok(catalog) => catalog,
            Err(e) => {
                self.teardown().await;
                return Err(e);
            }
        };

        let url = format!("{}/sports/{}/events", self.base_url, path);
        let payload = match self.fetch_json(&url).await {
            Ok(payload) => payload,
            Err(e) => {
                self.teardown().await;
                return Err(e);
            }
        };

        Ok(parse_events(providers::VELOBET, sport, &payload, &catalog, &self.stats))
    }
}

impl VelobetAdapter {
    async fn fetch_catalog(&self) -> Result<HashMap<String, String>, AdapterError> {
        let mut cached = self.catalog.lock().await;
        if let Some(catalog) = cached.as_ref() {
            return Ok(catalog.clone());
        }
        let payload = self.fetch_json(&format!("{}/config", self.base_url)).await?;
        let catalog = parse_catalog(&payload);
        *cached = Some(catalog.clone());
        Ok(catalog)
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, AdapterError> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            info!(devtools = %self.devtools_url, "starting browser session");
            *guard = Some(BrowserSession::connect(&self.devtools_url).await?);
        }
        let Some(session) = guard.as_mut() else {
            return Err(AdapterError::Browser("session unavailable".into()));
        };

        Stats::bump(&self.stats.requests_total);
        let body = match session.fetch(url).await {
            Ok(body) => body,
            Err(e) => {
                Stats::bump(&self.stats.request_errors);
                return Err(e);
            }
        };
        serde_json::from_str(&body).map_err(|e| AdapterError::parse(format!("{}: {}", url, e)))
    }

    async fn teardown(&self) {
        let mut guard = self.session.lock().await;
        if guard.take().is_some() {
            warn!("browser session torn down; will recreate next cycle");
        }
    }
}

fn platform_sport_path(sport: SportId) -> Option<&'static str> {
    match sport {
        vocabulary::FOOTBALL => Some("fudbal"),
        vocabulary::BASKETBALL => Some("kosarka"),
        vocabulary::TENNIS => Some("tenis"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markets::vocabulary::FOOTBALL;

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/test".into(),
            server_port: 0,
            scrape_interval_seconds: 2,
            request_timeout_seconds: 1,
            max_concurrent_requests: 2,
            match_similarity_threshold: 85.0,
            min_profit_percentage: 0.5,
            providers_enabled: vec!["velobet".into()],
            browser_ws_url: Some("http://127.0.0.1:9".into()),
            topbet_base_url: String::new(),
            orionbet_base_url: String::new(),
            betstar_base_url: String::new(),
            pulsbet_base_url: String::new(),
            velobet_base_url: "http://127.0.0.1:9/api".into(),
            odds_history_retention_days: 7,
            match_retention_days: 30,
            arbitrage_retention_days: 90,
        }
    }

    #[tokio::test]
    async fn lost_session_is_recreated_on_the_next_cycle() {
        // Nothing listens on the discard port, so every connect fails fast.
        let adapter = VelobetAdapter::new(
            &test_config(),
            "http://127.0.0.1:9".into(),
            Arc::new(Stats::new()),
        );

        let err = adapter.scrape(FOOTBALL).await.unwrap_err();
        assert!(matches!(err, AdapterError::Browser(_)));
        // The failed session is gone, not wedged.
        assert!(adapter.session.lock().await.is_none());

        // The next cycle starts a fresh connect attempt without operator
        // intervention.
        let err = adapter.scrape(FOOTBALL).await.unwrap_err();
        assert!(matches!(err, AdapterError::Browser(_)));
        assert!(adapter.session.lock().await.is_none());
    }
}
