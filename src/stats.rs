//! Pipeline counters behind the `/stats` observability surface. Everything
//! is monotonic and lock-free; per-provider wall-clock is the latest cycle's
//! measurement.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

#[derive(Default)]
pub struct Stats {
    pub cycles_completed: AtomicU64,
    pub cycles_skipped: AtomicU64,
    pub requests_total: AtomicU64,
    pub request_errors: AtomicU64,
    pub unmapped_markets: AtomicU64,
    pub rows_dropped: AtomicU64,
    pub matches_persisted: AtomicU64,
    pub odds_persisted: AtomicU64,
    pub matches_created: AtomicU64,
    pub matches_reused: AtomicU64,
    pub arbitrage_detected: AtomicU64,
    pub arbitrage_expired: AtomicU64,
    pub publisher_lagged: AtomicU64,
    pub provider_cycle_ms: DashMap<&'static str, u64>,
    pub provider_errors: DashMap<&'static str, u64>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_provider_cycle(&self, provider: &'static str, elapsed_ms: u64) {
        self.provider_cycle_ms.insert(provider, elapsed_ms);
    }

    pub fn record_provider_error(&self, provider: &'static str) {
        *self.provider_errors.entry(provider).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            cycles_completed: load(&self.cycles_completed),
            cycles_skipped: load(&self.cycles_skipped),
            requests_total: load(&self.requests_total),
            request_errors: load(&self.request_errors),
            unmapped_markets: load(&self.unmapped_markets),
            rows_dropped: load(&self.rows_dropped),
            matches_persisted: load(&self.matches_persisted),
            odds_persisted: load(&self.odds_persisted),
            matches_created: load(&self.matches_created),
            matches_reused: load(&self.matches_reused),
            arbitrage_detected: load(&self.arbitrage_detected),
            arbitrage_expired: load(&self.arbitrage_expired),
            publisher_lagged: load(&self.publisher_lagged),
            provider_cycle_ms: self
                .provider_cycle_ms
                .iter()
                .map(|e| (e.key().to_string(), *e.value()))
                .collect(),
            provider_errors: self
                .provider_errors
                .iter()
                .map(|e| (e.key().to_string(), *e.value()))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub requests_total: u64,
    pub request_errors: u64,
    pub unmapped_markets: u64,
    pub rows_dropped: u64,
    pub matches_persisted: u64,
    pub odds_persisted: u64,
    pub matches_created: u64,
    pub matches_reused: u64,
    pub arbitrage_detected: u64,
    pub arbitrage_expired: u64,
    pub publisher_lagged: u64,
    pub provider_cycle_ms: std::collections::HashMap<String, u64>,
    pub provider_errors: std::collections::HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = Stats::new();
        Stats::bump(&stats.cycles_completed);
        Stats::add(&stats.odds_persisted, 41);
        stats.record_provider_cycle("topbet", 120);
        stats.record_provider_error("topbet");
        stats.record_provider_error("topbet");

        let snap = stats.snapshot();
        assert_eq!(snap.cycles_completed, 1);
        assert_eq!(snap.odds_persisted, 41);
        assert_eq!(snap.provider_cycle_ms["topbet"], 120);
        assert_eq!(snap.provider_errors["topbet"], 2);
    }
}
