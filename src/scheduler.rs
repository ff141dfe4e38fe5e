//! The scrape scheduler: one cycle per configured interval, all enabled
//! adapters in parallel, per-provider isolation. A provider still busy from
//! a previous cycle is skipped (and counted) rather than run twice; a
//! provider failing takes down only its own branch. After every provider
//! has persisted or been skipped, the arbitrage engine runs exactly once
//! and the publisher fans out what changed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::adapters::{AnyAdapter, RawMatch};
use crate::arbitrage;
use crate::core::Core;
use crate::db::persister;
use crate::markets::vocabulary;
use crate::providers::{provider_name, ProviderId};
use crate::publisher::{Event, EventKind, EventLeg};
use crate::resolver;
use crate::stats::Stats;

pub async fn run(core: Arc<Core>, adapters: Vec<AnyAdapter>) {
    if adapters.is_empty() {
        warn!("no providers enabled; scheduler idle");
        return;
    }
    info!(
        providers = ?adapters.iter().map(|a| provider_name(a.provider())).collect::<Vec<_>>(),
        interval_s = core.config.scrape_interval_seconds,
        "scheduler starting"
    );

    let adapters: Arc<Vec<Arc<AnyAdapter>>> =
        Arc::new(adapters.into_iter().map(Arc::new).collect());
    let in_flight: Arc<DashMap<ProviderId, ()>> = Arc::new(DashMap::new());
    let engine_gate = Arc::new(Mutex::new(()));

    let interval_secs = core.config.scrape_interval_seconds.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let core = core.clone();
        let adapters = adapters.clone();
        let in_flight = in_flight.clone();
        let engine_gate = engine_gate.clone();
        // Cycles start on cadence even when the previous one runs long; the
        // in-flight guard keeps any single provider from overlapping itself.
        tokio::spawn(async move {
            run_cycle(core, adapters, in_flight, engine_gate).await;
        });
    }
}

async fn run_cycle(
    core: Arc<Core>,
    adapters: Arc<Vec<Arc<AnyAdapter>>>,
    in_flight: Arc<DashMap<ProviderId, ()>>,
    engine_gate: Arc<Mutex<()>>,
) {
    let deadline = Duration::from_secs(2 * core.config.scrape_interval_seconds.max(1));

    let mut handles = Vec::new();
    for adapter in adapters.iter() {
        let provider = adapter.provider();
        if in_flight.insert(provider, ()).is_some() {
            Stats::bump(&core.stats.cycles_skipped);
            debug!(provider = provider_name(provider), "still scraping; skipped this cycle");
            continue;
        }
        let adapter = adapter.clone();
        let core = core.clone();
        let in_flight = in_flight.clone();
        handles.push(tokio::spawn(async move {
            let started = Instant::now();
            let result = tokio::time::timeout(deadline, scrape_provider(&core, &adapter)).await;
            in_flight.remove(&provider);
            (provider, result, started.elapsed())
        }));
    }

    let mut batches: Vec<(ProviderId, Vec<RawMatch>)> = Vec::new();
    for handle in handles {
        match handle.await {
            Ok((provider, Ok(matches), elapsed)) => {
                core.stats
                    .record_provider_cycle(provider_name(provider), elapsed.as_millis() as u64);
                batches.push((provider, matches));
            }
            Ok((provider, Err(_), elapsed)) => {
                // Deadline hit: the scrape future was cancelled and its
                // partial work dropped.
                warn!(
                    provider = provider_name(provider),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "scrape exceeded cycle deadline; discarded"
                );
                core.stats.record_provider_error(provider_name(provider));
            }
            Err(join_err) => {
                error!("scrape task failed: {}", join_err);
            }
        }
    }

    for (provider, batch) in batches {
        if batch.is_empty() {
            continue;
        }
        match persist_provider(&core, provider, batch).await {
            Ok(events) => {
                for event in events {
                    core.publisher.publish(event);
                }
            }
            Err(e) => {
                // This provider's cycle is lost; the next one retries from
                // scratch.
                error!(provider = provider_name(provider), "persist failed: {}", e);
                core.stats.record_provider_error(provider_name(provider));
            }
        }
    }

    // One engine pass per cycle, never on a mid-cycle snapshot.
    let _engine = engine_gate.lock().await;
    match arbitrage::run_pass(&core.db, core.config.min_profit_percentage).await {
        Ok(outcome) => publish_engine_outcome(&core, outcome),
        Err(e) => {
            error!("arbitrage pass failed; publishing skipped this cycle: {}", e);
        }
    }
    Stats::bump(&core.stats.cycles_completed);
}

/// Scrape every supported sport of one provider in parallel. A sport that
/// fails loses only its own results.
async fn scrape_provider(core: &Core, adapter: &AnyAdapter) -> Vec<RawMatch> {
    let scrapes = adapter.supported_sports().iter().map(|&sport| async move {
        match adapter.scrape(sport).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!(
                    provider = provider_name(adapter.provider()),
                    sport = vocabulary::sport_name(sport),
                    "scrape failed: {}",
                    e
                );
                core.stats.record_provider_error(provider_name(adapter.provider()));
                Vec::new()
            }
        }
    });
    futures::future::join_all(scrapes)
        .await
        .into_iter()
        .flatten()
        .collect()
}

/// Resolve and persist one provider's batch: matches upsert strictly before
/// the odds write. Returns the `odds.update` events for rows that changed.
async fn persist_provider(
    core: &Core,
    provider: ProviderId,
    batch: Vec<RawMatch>,
) -> Result<Vec<Event>, sqlx::Error> {
    let mut resolved = resolver::resolve_batch(&core.db, &core.config, &core.stats, batch).await?;
    persister::upsert_matches(&core.db, &mut resolved).await?;

    let mut labels: HashMap<i64, String> = HashMap::new();
    let mut rows = Vec::new();
    for item in &resolved {
        let Some(match_id) = item.match_id else { continue };
        labels
            .entry(match_id)
            .or_insert_with(|| format!("{} - {}", item.raw.team1, item.raw.team2));
        for odds in &item.raw.odds {
            rows.push((match_id, odds.clone()));
        }
    }

    Stats::add(&core.stats.matches_persisted, resolved.len() as u64);
    let (written, changed) = persister::write_odds(&core.db, provider, rows, Utc::now()).await?;
    Stats::add(&core.stats.odds_persisted, written);

    let events = changed
        .into_iter()
        .map(|c| Event {
            kind: EventKind::OddsUpdate,
            match_id: c.match_id,
            match_label: labels.get(&c.match_id).cloned().unwrap_or_default(),
            bet_type: bet_type_label(c.bet_type_id),
            margin: c.margin,
            selection: (!c.selection.is_empty()).then_some(c.selection),
            legs: Vec::new(),
            stakes: None,
            profit_pct: None,
        })
        .collect();
    Ok(events)
}

fn publish_engine_outcome(core: &Core, outcome: arbitrage::EngineOutcome) {
    Stats::add(&core.stats.arbitrage_detected, outcome.new.len() as u64);
    Stats::add(&core.stats.arbitrage_expired, outcome.expired.len() as u64);

    for opp in &outcome.new {
        info!(
            match_id = opp.match_id,
            bet_type = %bet_type_label(opp.bet_type),
            margin = opp.margin,
            profit_pct = opp.profit_pct,
            "arbitrage detected"
        );
        core.publisher.publish(Event {
            kind: EventKind::ArbitrageNew,
            match_id: opp.match_id,
            match_label: outcome
                .match_labels
                .get(&opp.match_id)
                .cloned()
                .unwrap_or_default(),
            bet_type: bet_type_label(opp.bet_type),
            margin: opp.margin,
            selection: None,
            legs: opp
                .legs
                .iter()
                .map(|l| EventLeg {
                    provider: provider_name(l.provider_id).to_string(),
                    outcome: l.outcome,
                    price: l.price,
                })
                .collect(),
            stakes: Some(opp.stakes.clone()),
            profit_pct: Some(opp.profit_pct),
        });
    }

    for expired in &outcome.expired {
        core.publisher.publish(Event {
            kind: EventKind::ArbitrageExpired,
            match_id: expired.match_id,
            match_label: outcome
                .match_labels
                .get(&expired.match_id)
                .cloned()
                .unwrap_or_default(),
            bet_type: bet_type_label(expired.bet_type),
            margin: expired.margin,
            selection: None,
            legs: Vec::new(),
            stakes: None,
            profit_pct: None,
        });
    }
}

fn bet_type_label(id: i16) -> String {
    vocabulary::bet_type(id)
        .map(|bt| bt.name.to_string())
        .unwrap_or_else(|| format!("bet type {}", id))
}
