//! Arbitrage detection: group the latest odds by canonical key, take the
//! best price per outcome across providers, and surface combinations whose
//! implied probabilities sum below one. The math lives in pure functions;
//! the async shell reads the store, upserts by content hash and reports
//! what changed so the scheduler can publish.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::markets::vocabulary::{self, BetTypeId};
use crate::markets::{margin_key, MarketKey};
use crate::providers::ProviderId;

const PROFIT_TICK: f64 = 0.01;
/// Prices are hashed at this tick so jitter below it cannot mint "new"
/// opportunities.
const PRICE_HASH_TICK: f64 = 0.001;

/// One current-odds row as the engine consumes it.
#[derive(Debug, Clone)]
pub struct InputRow {
    pub match_id: i64,
    pub provider_id: ProviderId,
    pub bet_type: BetTypeId,
    pub margin: f64,
    pub selection: String,
    pub prices: [Option<f64>; 3],
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArbLeg {
    pub provider_id: ProviderId,
    /// 1-based outcome index; for partition groups, the position within the
    /// declared partition.
    pub outcome: u8,
    pub price: f64,
}

#[derive(Debug, Clone)]
pub struct Opportunity {
    pub match_id: i64,
    pub bet_type: BetTypeId,
    pub margin: f64,
    pub profit_pct: f64,
    pub legs: Vec<ArbLeg>,
    /// Unit-stake split in leg order; sums to one.
    pub stakes: Vec<f64>,
    pub content_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn market_key(&self) -> MarketKey {
        MarketKey { bet_type: self.bet_type, selection: String::new(), margin: self.margin }
    }
}

/// Detect every profitable group in the given rows. Deterministic: output
/// is ordered by (match, bet type, margin) and leg selection breaks price
/// ties toward the lowest provider id.
pub fn detect(rows: &[InputRow], min_profit_pct: f64) -> Vec<Opportunity> {
    let mut groups: HashMap<(i64, BetTypeId, i64), Vec<&InputRow>> = HashMap::new();
    for row in rows {
        groups
            .entry((row.match_id, row.bet_type, margin_key(row.margin)))
            .or_default()
            .push(row);
    }

    let mut found = Vec::new();
    for ((match_id, bet_type, _), group) in &groups {
        let Some(bt) = vocabulary::bet_type(*bet_type) else { continue };
        let best = match bt.arity {
            2 | 3 => best_positional(group, bt.arity),
            1 => match bt.partition {
                Some(partition) => best_partition(group, partition),
                // Without a declared complete partition, arity-1 rows are
                // never combined.
                None => None,
            },
            _ => None,
        };
        let Some(legs) = best else { continue };

        let implied: f64 = legs.iter().map(|leg| 1.0 / leg.price).sum();
        if implied >= 1.0 {
            continue;
        }
        let profit_pct = round_tick((1.0 / implied - 1.0) * 100.0, PROFIT_TICK);
        if profit_pct < min_profit_pct {
            continue;
        }
        let stakes: Vec<f64> = legs.iter().map(|leg| (1.0 / leg.price) / implied).collect();

        found.push(Opportunity {
            match_id: *match_id,
            bet_type: *bet_type,
            margin: group[0].margin,
            profit_pct,
            content_hash: content_hash(&legs),
            stakes,
            legs,
            expires_at: group[0].start_time,
        });
    }

    found.sort_by(|a, b| {
        (a.match_id, a.bet_type, margin_key(a.margin)).cmp(&(
            b.match_id,
            b.bet_type,
            margin_key(b.margin),
        ))
    });
    found
}

/// Best price per positional outcome. Every outcome must be priced by at
/// least one row; ties go to the lowest provider id.
fn best_positional(group: &[&InputRow], arity: u8) -> Option<Vec<ArbLeg>> {
    let mut legs = Vec::with_capacity(arity as usize);
    for outcome in 0..arity as usize {
        let mut best: Option<(f64, ProviderId)> = None;
        for row in group {
            let Some(price) = row.prices[outcome] else { continue };
            let beat = match best {
                Some((bp, bprov)) => {
                    price > bp || (price == bp && row.provider_id < bprov)
                }
                None => true,
            };
            if beat {
                best = Some((price, row.provider_id));
            }
        }
        let (price, provider_id) = best?;
        legs.push(ArbLeg { provider_id, outcome: (outcome + 1) as u8, price });
    }
    Some(legs)
}

/// Best price per member of a declared complete outcome partition. The
/// group only qualifies when every member is priced somewhere.
fn best_partition(group: &[&InputRow], partition: &[&str]) -> Option<Vec<ArbLeg>> {
    let mut legs = Vec::with_capacity(partition.len());
    for (position, member) in partition.iter().enumerate() {
        let mut best: Option<(f64, ProviderId)> = None;
        for row in group {
            if row.selection != *member {
                continue;
            }
            let Some(price) = row.prices[0] else { continue };
            let beat = match best {
                Some((bp, bprov)) => {
                    price > bp || (price == bp && row.provider_id < bprov)
                }
                None => true,
            };
            if beat {
                best = Some((price, row.provider_id));
            }
        }
        let (price, provider_id) = best?;
        legs.push(ArbLeg { provider_id, outcome: (position + 1) as u8, price });
    }
    Some(legs)
}

/// SHA-256 over the sorted leg multiset at price-tick precision. Stable
/// under leg permutation, so re-detection of an unchanged opportunity is a
/// no-op upsert.
pub fn content_hash(legs: &[ArbLeg]) -> String {
    let mut material: Vec<(ProviderId, u8, i64)> = legs
        .iter()
        .map(|leg| (leg.provider_id, leg.outcome, (leg.price / PRICE_HASH_TICK).round() as i64))
        .collect();
    material.sort_unstable();

    let mut hasher = Sha256::new();
    for (provider, outcome, price_ticks) in material {
        hasher.update(provider.to_le_bytes());
        hasher.update([outcome]);
        hasher.update(price_ticks.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn round_tick(value: f64, tick: f64) -> f64 {
    (value / tick).round() * tick
}

// --- Store shell ------------------------------------------------------------

/// Result of one engine pass: opportunities seen for the first time and
/// active rows that just expired, both with enough context to publish.
pub struct EngineOutcome {
    pub new: Vec<Opportunity>,
    pub refreshed: u64,
    pub expired: Vec<ExpiredArb>,
    pub match_labels: HashMap<i64, String>,
}

#[derive(Debug)]
pub struct ExpiredArb {
    pub match_id: i64,
    pub bet_type: BetTypeId,
    pub margin: f64,
}

/// One full engine pass: load valid rows, detect, upsert by hash, expire.
pub async fn run_pass(pool: &PgPool, min_profit_pct: f64) -> Result<EngineOutcome, sqlx::Error> {
    let now = Utc::now();
    let (rows, mut match_labels) = load_rows(pool, now).await?;
    let opportunities = detect(&rows, min_profit_pct);
    debug!(rows = rows.len(), detected = opportunities.len(), "engine pass");

    let mut new = Vec::new();
    let mut refreshed = 0u64;
    for opp in opportunities.iter() {
        let legs = serde_json::to_value(
            opp.legs
                .iter()
                .map(|l| {
                    serde_json::json!({
                        "provider_id": l.provider_id,
                        "outcome_index": l.outcome,
                        "price": l.price,
                    })
                })
                .collect::<Vec<_>>(),
        )
        .unwrap_or_default();
        let stakes = serde_json::to_value(&opp.stakes).unwrap_or_default();

        let row = sqlx::query(
            r#"
            INSERT INTO arbitrage (
                match_id, bet_type_id, margin, profit_pct, best_legs,
                stake_split, content_hash, detected_at, last_seen_at,
                expires_at, active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9, true)
            ON CONFLICT (content_hash) DO UPDATE SET
                last_seen_at = EXCLUDED.last_seen_at,
                profit_pct = EXCLUDED.profit_pct,
                active = true
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(opp.match_id)
        .bind(opp.bet_type)
        .bind(opp.margin)
        .bind(opp.profit_pct)
        .bind(legs)
        .bind(stakes)
        .bind(&opp.content_hash)
        .bind(now)
        .bind(opp.expires_at)
        .fetch_one(pool)
        .await?;

        if row.get::<bool, _>("inserted") {
            new.push(opp.clone());
        } else {
            refreshed += 1;
        }
    }

    // Deactivate started matches and combinations that no longer hold.
    let live_hashes: Vec<String> =
        opportunities.iter().map(|o| o.content_hash.clone()).collect();
    let expired_rows = sqlx::query(
        r#"
        UPDATE arbitrage
        SET active = false
        WHERE active
          AND (expires_at <= $1 OR NOT (content_hash = ANY($2)))
        RETURNING match_id, bet_type_id, margin
        "#,
    )
    .bind(now)
    .bind(&live_hashes)
    .fetch_all(pool)
    .await?;

    let expired: Vec<ExpiredArb> = expired_rows
        .into_iter()
        .map(|row| ExpiredArb {
            match_id: row.get("match_id"),
            bet_type: row.get("bet_type_id"),
            margin: row.get("margin"),
        })
        .collect();

    // Expired rows can reference matches that already started and thus were
    // absent from the odds read.
    let missing: Vec<i64> = expired
        .iter()
        .map(|e| e.match_id)
        .filter(|id| !match_labels.contains_key(id))
        .collect();
    if !missing.is_empty() {
        let rows = sqlx::query(
            "SELECT id, team1_raw, team2_raw FROM matches WHERE id = ANY($1)",
        )
        .bind(&missing)
        .fetch_all(pool)
        .await?;
        for row in rows {
            match_labels.insert(
                row.get::<i64, _>("id"),
                format!("{} - {}", row.get::<String, _>("team1_raw"), row.get::<String, _>("team2_raw")),
            );
        }
    }

    Ok(EngineOutcome { new, refreshed, expired, match_labels })
}

type LoadedRows = (Vec<InputRow>, HashMap<i64, String>);

/// All currently valid odds rows: matches not yet started, prices above
/// 1.0 (zeroed-out rows mean a closed market).
async fn load_rows(pool: &PgPool, now: DateTime<Utc>) -> Result<LoadedRows, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT co.match_id, co.provider_id, co.bet_type_id, co.margin,
               co.selection, co.p1, co.p2, co.p3,
               m.start_time, m.team1_raw, m.team2_raw
        FROM current_odds co
        JOIN matches m ON m.id = co.match_id
        WHERE m.start_time > $1 AND co.p1 > 1.0
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;

    let mut input = Vec::with_capacity(rows.len());
    let mut labels = HashMap::new();
    for row in rows {
        let match_id: i64 = row.get("match_id");
        labels.entry(match_id).or_insert_with(|| {
            format!(
                "{} - {}",
                row.get::<String, _>("team1_raw"),
                row.get::<String, _>("team2_raw")
            )
        });
        input.push(InputRow {
            match_id,
            provider_id: row.get("provider_id"),
            bet_type: row.get("bet_type_id"),
            margin: row.get("margin"),
            selection: row.get("selection"),
            prices: [
                Some(row.get::<f64, _>("p1")),
                row.get::<Option<f64>, _>("p2"),
                row.get::<Option<f64>, _>("p3"),
            ],
            start_time: row.get("start_time"),
        });
    }
    Ok((input, labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crate::markets::vocabulary::{
        CORRECT_SCORE, FULL_TIME_1X2, HALFTIME_FULLTIME, TOTAL_GOALS,
    };

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 18, 0, 0).unwrap()
    }

    fn x12_row(provider: ProviderId, one: f64, two: f64, draw: f64) -> InputRow {
        InputRow {
            match_id: 1,
            provider_id: provider,
            bet_type: FULL_TIME_1X2,
            margin: 0.0,
            selection: String::new(),
            prices: [Some(one), Some(two), Some(draw)],
            start_time: start(),
        }
    }

    fn sel_row(provider: ProviderId, bet_type: BetTypeId, selection: &str, price: f64) -> InputRow {
        InputRow {
            match_id: 1,
            provider_id: provider,
            bet_type,
            margin: 0.0,
            selection: selection.into(),
            prices: [Some(price), None, None],
            start_time: start(),
        }
    }

    #[test]
    fn worked_1x2_example() {
        // Prices quoted 1/X/2; positionally that is (p1, p3, p2).
        let rows = vec![x12_row(1, 2.10, 4.20, 3.50), x12_row(2, 2.30, 3.80, 3.60)];
        let found = detect(&rows, 0.0);
        assert_eq!(found.len(), 1);
        let opp = &found[0];

        assert!((opp.profit_pct - 5.19).abs() < 1e-9, "profit was {}", opp.profit_pct);
        let prices: Vec<f64> = opp.legs.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![2.30, 4.20, 3.60]);
        let providers: Vec<ProviderId> = opp.legs.iter().map(|l| l.provider_id).collect();
        assert_eq!(providers, vec![2, 1, 2]);

        let stake_sum: f64 = opp.stakes.iter().sum();
        assert!((stake_sum - 1.0).abs() <= 1e-9);
        assert!((opp.stakes[0] - 0.457).abs() < 0.001);
        assert!((opp.stakes[1] - 0.250).abs() < 0.001);
        assert!((opp.stakes[2] - 0.292).abs() < 0.001);

        let implied: f64 = opp.legs.iter().map(|l| 1.0 / l.price).sum();
        assert!(implied < 1.0);
    }

    #[test]
    fn no_arbitrage_when_implied_sum_reaches_one() {
        let rows = vec![x12_row(1, 2.0, 3.0, 3.0)];
        assert!(detect(&rows, 0.0).is_empty());
    }

    #[test]
    fn profit_floor_applies() {
        let rows = vec![x12_row(1, 2.10, 4.20, 3.50), x12_row(2, 2.30, 3.80, 3.60)];
        assert!(detect(&rows, 6.0).is_empty());
        assert_eq!(detect(&rows, 5.0).len(), 1);
    }

    #[test]
    fn tie_breaks_to_lowest_provider() {
        let rows = vec![x12_row(4, 2.30, 4.20, 3.60), x12_row(2, 2.30, 4.20, 3.60)];
        let found = detect(&rows, 0.0);
        assert!(found[0].legs.iter().all(|l| l.provider_id == 2));
    }

    #[test]
    fn hash_is_stable_under_leg_permutation() {
        let legs = vec![
            ArbLeg { provider_id: 2, outcome: 1, price: 2.30 },
            ArbLeg { provider_id: 1, outcome: 2, price: 4.20 },
            ArbLeg { provider_id: 2, outcome: 3, price: 3.60 },
        ];
        let mut shuffled = legs.clone();
        shuffled.rotate_left(2);
        assert_eq!(content_hash(&legs), content_hash(&shuffled));
    }

    #[test]
    fn hash_moves_with_a_price_tick() {
        let legs = vec![ArbLeg { provider_id: 1, outcome: 1, price: 2.30 }];
        let mut nudged = legs.clone();
        nudged[0].price = 2.301;
        assert_ne!(content_hash(&legs), content_hash(&nudged));
        // Sub-tick jitter hashes identically.
        let mut jitter = legs.clone();
        jitter[0].price = 2.300_000_4;
        assert_eq!(content_hash(&legs), content_hash(&jitter));
    }

    #[test]
    fn declared_partition_combines_across_providers() {
        // Two providers across the nine HT/FT selections, best of each at
        // 10.0 or better: implied sum 9/10 < 1.
        let partition = vocabulary::bet_type(HALFTIME_FULLTIME).unwrap().partition.unwrap();
        let mut rows = Vec::new();
        for (i, member) in partition.iter().enumerate() {
            let provider = if i % 2 == 0 { 1 } else { 3 };
            rows.push(sel_row(provider, HALFTIME_FULLTIME, member, 10.0));
            rows.push(sel_row(4, HALFTIME_FULLTIME, member, 9.5));
        }
        let found = detect(&rows, 0.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].legs.len(), 9);
        assert!(found[0].legs.iter().all(|l| l.price == 10.0));
    }

    #[test]
    fn incomplete_partition_never_combines() {
        let rows = vec![
            sel_row(1, HALFTIME_FULLTIME, "1/1", 50.0),
            sel_row(2, HALFTIME_FULLTIME, "1/X", 50.0),
        ];
        assert!(detect(&rows, 0.0).is_empty());
    }

    #[test]
    fn undeclared_partition_types_never_combine() {
        // Correct score has no declared partition; even absurd prices stay
        // out of the engine.
        let rows = vec![
            sel_row(1, CORRECT_SCORE, "1:0", 100.0),
            sel_row(2, CORRECT_SCORE, "0:1", 100.0),
        ];
        assert!(detect(&rows, 0.0).is_empty());
    }

    #[test]
    fn groups_split_by_margin() {
        let total = |provider: ProviderId, margin: f64, over: f64, under: f64| InputRow {
            match_id: 1,
            provider_id: provider,
            bet_type: TOTAL_GOALS,
            margin,
            selection: String::new(),
            prices: [Some(over), Some(under), None],
            start_time: start(),
        };
        // 2.5 line arbs across books; 3.5 line does not.
        let rows = vec![
            total(1, 2.5, 2.10, 1.80),
            total(2, 2.5, 1.85, 2.15),
            total(1, 3.5, 1.90, 1.90),
        ];
        let found = detect(&rows, 0.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].margin, 2.5);
        let prices: Vec<f64> = found[0].legs.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![2.10, 2.15]);
    }
}
