use std::env;

use tracing::warn;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_port: u16,

    pub scrape_interval_seconds: u64,
    pub request_timeout_seconds: u64,
    pub max_concurrent_requests: usize,
    pub match_similarity_threshold: f64,
    pub min_profit_percentage: f64,
    pub providers_enabled: Vec<String>,
    /// DevTools endpoint for the browser-driven provider; empty disables it.
    pub browser_ws_url: Option<String>,

    pub topbet_base_url: String,
    pub orionbet_base_url: String,
    pub betstar_base_url: String,
    pub pulsbet_base_url: String,
    pub velobet_base_url: String,

    pub odds_history_retention_days: i64,
    pub match_retention_days: i64,
    pub arbitrage_retention_days: i64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            server_port: parse_or("SERVER_PORT", 8080),
            scrape_interval_seconds: parse_or("SCRAPE_INTERVAL_SECONDS", 2),
            request_timeout_seconds: parse_or("REQUEST_TIMEOUT_SECONDS", 30),
            max_concurrent_requests: parse_or("MAX_CONCURRENT_REQUESTS", 10),
            match_similarity_threshold: parse_or("MATCH_SIMILARITY_THRESHOLD", 85.0),
            min_profit_percentage: parse_or("MIN_PROFIT_PERCENTAGE", 0.5),
            providers_enabled: providers_from_env(),
            browser_ws_url: env::var("BROWSER_WS_URL").ok().filter(|v| !v.is_empty()),
            topbet_base_url: url_or("TOPBET_BASE_URL", "https://api.topbet.rs"),
            orionbet_base_url: url_or("ORIONBET_BASE_URL", "https://api.orionbet.com"),
            betstar_base_url: url_or("BETSTAR_BASE_URL", "https://sb-api.betstar.me"),
            pulsbet_base_url: url_or("PULSBET_BASE_URL", "https://feed.pulsbet.com"),
            velobet_base_url: url_or("VELOBET_BASE_URL", "https://www.velobet.net/api"),
            odds_history_retention_days: parse_or("ODDS_HISTORY_RETENTION_DAYS", 7),
            match_retention_days: parse_or("MATCH_RETENTION_DAYS", 30),
            arbitrage_retention_days: parse_or("ARBITRAGE_RETENTION_DAYS", 90),
        }
    }
}

fn parse_or<T: std::str::FromStr + std::fmt::Display + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("invalid {} {:?}, defaulting to {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn url_or(key: &str, default: &str) -> String {
    let url = env::var(key).unwrap_or_else(|_| default.to_string());
    url.trim_end_matches('/').to_string()
}

fn providers_from_env() -> Vec<String> {
    match env::var("PROVIDERS_ENABLED") {
        Ok(raw) => raw
            .split(',')
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect(),
        Err(_) => crate::providers::PROVIDERS
            .iter()
            .map(|p| p.name.to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_falls_back() {
        env::remove_var("ODDSRADAR_TEST_MISSING");
        assert_eq!(parse_or("ODDSRADAR_TEST_MISSING", 7u64), 7);
        env::set_var("ODDSRADAR_TEST_BAD", "not-a-number");
        assert_eq!(parse_or("ODDSRADAR_TEST_BAD", 7u64), 7);
        env::set_var("ODDSRADAR_TEST_GOOD", "31");
        assert_eq!(parse_or("ODDSRADAR_TEST_GOOD", 7u64), 31);
    }

    #[test]
    fn base_urls_lose_trailing_slash() {
        env::set_var("ODDSRADAR_TEST_URL", "https://x.example/api/");
        assert_eq!(url_or("ODDSRADAR_TEST_URL", ""), "https://x.example/api");
    }
}
