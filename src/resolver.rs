//! Cross-provider match identity: folds each provider's raw matches onto
//! stable internal match ids with a weighted score over normalized team
//! names, start-time proximity, league identity and price coherence.
//!
//! Resolution order within a batch is deterministic (sport, then start
//! time, then normalized pair), so two providers that agree exactly on
//! inputs always produce the same resolution.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::adapters::RawMatch;
use crate::config::Config;
use crate::markets::vocabulary::candidate_window_minutes;
use crate::markets::{margin_key, vocabulary::SportId};
use crate::normalize::{normalize_for_sport, normalize_team, pair_similarity};
use crate::stats::Stats;

const NAME_WEIGHT: f64 = 0.5;
const TIME_WEIGHT: f64 = 0.25;
const LEAGUE_WEIGHT: f64 = 0.15;
const PRICE_WEIGHT: f64 = 0.10;

/// Below the auto-merge threshold, a candidate may still be reused when the
/// kickoff times agree this closely.
const REVIEW_SCORE: f64 = 70.0;
const REVIEW_TIME_SLACK_MIN: i64 = 30;

/// A provider observation after identity resolution. `match_id` is `None`
/// until either the resolver pinned an existing row or the persister
/// inserted a new one.
#[derive(Debug)]
pub struct ResolvedMatch {
    pub raw: RawMatch,
    pub team1_norm: String,
    pub team2_norm: String,
    pub match_id: Option<i64>,
}

impl ResolvedMatch {
    /// JSONB patch merging this provider's external id into the match row.
    pub fn external_id_patch(&self) -> Option<serde_json::Value> {
        self.raw
            .external_id
            .as_ref()
            .map(|ext| json!({ self.raw.provider.to_string(): ext }))
    }
}

#[derive(Debug)]
pub struct Candidate {
    id: i64,
    sport: SportId,
    team1_norm: String,
    team2_norm: String,
    league_norm: Option<String>,
    start_time: DateTime<Utc>,
}

/// Resolve one provider's batch against the store.
pub async fn resolve_batch(
    pool: &PgPool,
    config: &Config,
    stats: &Stats,
    mut batch: Vec<RawMatch>,
) -> Result<Vec<ResolvedMatch>, sqlx::Error> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }

    let mut resolved: Vec<ResolvedMatch> = batch
        .drain(..)
        .map(|raw| {
            let team1_norm = normalize_for_sport(raw.sport, &raw.team1);
            let team2_norm = normalize_for_sport(raw.sport, &raw.team2);
            ResolvedMatch { raw, team1_norm, team2_norm, match_id: None }
        })
        .collect();
    resolved.sort_by(|a, b| {
        (a.raw.sport, a.raw.start_time, &a.team1_norm, &a.team2_norm).cmp(&(
            b.raw.sport,
            b.raw.start_time,
            &b.team1_norm,
            &b.team2_norm,
        ))
    });

    let candidates = load_candidates(pool, &resolved).await?;
    let candidate_odds = load_candidate_odds(pool, &candidates).await?;

    for item in &mut resolved {
        let window = Duration::minutes(candidate_window_minutes(item.raw.sport));
        let mut best: Option<(f64, i64, i64)> = None; // (score, |delta| minutes, id)
        for candidate in &candidates {
            if candidate.sport != item.raw.sport {
                continue;
            }
            let delta = candidate.start_time - item.raw.start_time;
            if delta.abs() > window {
                continue;
            }
            let price_hit = price_coherent(item, candidate.id, &candidate_odds);
            let score = score_candidate(
                &item.team1_norm,
                &item.team2_norm,
                item.raw.start_time,
                item.raw.league.as_deref(),
                candidate,
                price_hit,
            );
            let delta_min = delta.num_minutes().abs();
            let beat = match best {
                // Prefer higher score; on a tie the earlier (smaller) id.
                Some((bs, _, bid)) => score > bs || (score == bs && candidate.id < bid),
                None => true,
            };
            if beat {
                best = Some((score, delta_min, candidate.id));
            }
        }

        match best {
            Some((score, delta_min, id))
                if score >= config.match_similarity_threshold
                    || (score >= REVIEW_SCORE && delta_min <= REVIEW_TIME_SLACK_MIN) =>
            {
                if score < config.match_similarity_threshold {
                    tracing::warn!(
                        provider = item.raw.provider,
                        team1 = %item.raw.team1,
                        team2 = %item.raw.team2,
                        score,
                        "resolver merged on the review band"
                    );
                }
                item.match_id = Some(id);
                Stats::bump(&stats.matches_reused);
            }
            _ => {
                debug!(
                    provider = item.raw.provider,
                    team1 = %item.raw.team1,
                    team2 = %item.raw.team2,
                    "no candidate above threshold; creating match"
                );
                Stats::bump(&stats.matches_created);
            }
        }
    }

    Ok(resolved)
}

/// Weighted candidate score in [0, 100].
pub fn score_candidate(
    team1_norm: &str,
    team2_norm: &str,
    start_time: DateTime<Utc>,
    league: Option<&str>,
    candidate: &Candidate,
    price_hit: bool,
) -> f64 {
    let name = pair_similarity(
        team1_norm,
        team2_norm,
        &candidate.team1_norm,
        &candidate.team2_norm,
    );

    let window_min = candidate_window_minutes(candidate.sport) as f64;
    let delta_min = (candidate.start_time - start_time).num_minutes().abs() as f64;
    let time = ((1.0 - delta_min / window_min).max(0.0)) * 100.0;

    let league_score = match (league, candidate.league_norm.as_deref()) {
        (Some(a), Some(b)) if normalize_team(a) == *b => 100.0,
        _ => 0.0,
    };

    let price = if price_hit { 100.0 } else { 0.0 };

    NAME_WEIGHT * name + TIME_WEIGHT * time + LEAGUE_WEIGHT * league_score + PRICE_WEIGHT * price
}

type CandidateOdds = HashMap<(i64, i16, i64, String), [Option<f64>; 3]>;

fn price_coherent(item: &ResolvedMatch, candidate_id: i64, odds: &CandidateOdds) -> bool {
    for row in &item.raw.odds {
        let key = (
            candidate_id,
            row.key.bet_type,
            margin_key(row.key.margin),
            row.key.selection.clone(),
        );
        if let Some(candidate_prices) = odds.get(&key) {
            let pairs = [
                (Some(row.p1), candidate_prices[0]),
                (row.p2, candidate_prices[1]),
                (row.p3, candidate_prices[2]),
            ];
            for (a, b) in pairs {
                if let (Some(a), Some(b)) = (a, b) {
                    if within_fifth(a, b) {
                        return true;
                    }
                }
            }
        }
    }
    false
}

fn within_fifth(a: f64, b: f64) -> bool {
    let floor = a.min(b);
    floor > 0.0 && (a - b).abs() / floor <= 0.20
}

async fn load_candidates(
    pool: &PgPool,
    batch: &[ResolvedMatch],
) -> Result<Vec<Candidate>, sqlx::Error> {
    let mut sports: Vec<SportId> = batch.iter().map(|r| r.raw.sport).collect();
    sports.sort_unstable();
    sports.dedup();

    // One query spanning the widest window of the batch; per-item windows
    // are enforced during scoring.
    let slack = Duration::minutes(
        sports
            .iter()
            .map(|&s| candidate_window_minutes(s))
            .max()
            .unwrap_or(120),
    );
    let (Some(earliest), Some(latest)) = (
        batch.iter().map(|r| r.raw.start_time).min(),
        batch.iter().map(|r| r.raw.start_time).max(),
    ) else {
        return Ok(Vec::new());
    };
    let (earliest, latest) = (earliest - slack, latest + slack);

    let rows = sqlx::query(
        r#"
        SELECT id, sport_id, team1_norm, team2_norm, league_name, start_time
        FROM matches
        WHERE sport_id = ANY($1)
          AND start_time BETWEEN $2 AND $3
          AND status IN ('upcoming', 'live')
        "#,
    )
    .bind(&sports)
    .bind(earliest)
    .bind(latest)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Candidate {
            id: row.get("id"),
            sport: row.get("sport_id"),
            team1_norm: row.get("team1_norm"),
            team2_norm: row.get("team2_norm"),
            league_norm: row
                .get::<Option<String>, _>("league_name")
                .map(|l| normalize_team(&l)),
            start_time: row.get("start_time"),
        })
        .collect())
}

async fn load_candidate_odds(
    pool: &PgPool,
    candidates: &[Candidate],
) -> Result<CandidateOdds, sqlx::Error> {
    if candidates.is_empty() {
        return Ok(HashMap::new());
    }
    let ids: Vec<i64> = candidates.iter().map(|c| c.id).collect();
    let rows = sqlx::query(
        r#"
        SELECT match_id, bet_type_id, margin, selection, p1, p2, p3
        FROM current_odds
        WHERE match_id = ANY($1)
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut odds = HashMap::new();
    for row in rows {
        let key = (
            row.get::<i64, _>("match_id"),
            row.get::<i16, _>("bet_type_id"),
            margin_key(row.get::<f64, _>("margin")),
            row.get::<String, _>("selection"),
        );
        odds.insert(
            key,
            [
                Some(row.get::<f64, _>("p1")),
                row.get::<Option<f64>, _>("p2"),
                row.get::<Option<f64>, _>("p3"),
            ],
        );
    }
    Ok(odds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crate::markets::vocabulary::FOOTBALL;

    fn kickoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 18, 0, 0).unwrap()
    }

    fn candidate(team1: &str, team2: &str, league: Option<&str>, offset_min: i64) -> Candidate {
        Candidate {
            id: 11,
            sport: FOOTBALL,
            team1_norm: team1.to_string(),
            team2_norm: team2.to_string(),
            league_norm: league.map(|l| normalize_team(l)),
            start_time: kickoff() + Duration::minutes(offset_min),
        }
    }

    #[test]
    fn identical_observation_scores_near_perfect() {
        let c = candidate("crvena zvezda", "partizan", Some("Super Liga"), 0);
        let score = score_candidate(
            "crvena zvezda",
            "partizan",
            kickoff(),
            Some("Super Liga"),
            &c,
            true,
        );
        assert!(score > 99.0, "score was {}", score);
    }

    #[test]
    fn order_flip_with_translated_name_lands_in_review_band() {
        // One provider: Crvena Zvezda v Partizan. The other: Partizan v Red
        // Star Belgrade, same league, same kickoff. Names alone cannot clear
        // 85, but the agreeing kickoff must still merge them.
        let c = candidate("crvena zvezda", "partizan", Some("Super Liga"), 0);
        let score = score_candidate(
            "partizan",
            "red star belgrade",
            kickoff(),
            Some("Super Liga"),
            &c,
            true,
        );
        assert!(score >= REVIEW_SCORE, "score was {}", score);
        assert!(score < 99.0);
    }

    #[test]
    fn time_decay_is_linear_within_the_window() {
        let near = candidate("partizan", "vojvodina", None, 0);
        let far = candidate("partizan", "vojvodina", None, 90);
        let s_near = score_candidate("partizan", "vojvodina", kickoff(), None, &near, false);
        let s_far = score_candidate("partizan", "vojvodina", kickoff(), None, &far, false);
        assert!(s_near > s_far);
        // 90 of 120 minutes gone: time term contributes a quarter of its
        // weight.
        assert!((s_near - s_far - 0.25 * 100.0 * 0.75).abs() < 1e-9);
    }

    #[test]
    fn unrelated_teams_score_low() {
        let c = candidate("mladost lucani", "javor ivanjica", None, 10);
        let score = score_candidate("partizan", "crvena zvezda", kickoff(), None, &c, false);
        assert!(score < REVIEW_SCORE, "score was {}", score);
    }

    #[test]
    fn price_window() {
        assert!(within_fifth(2.0, 2.3));
        assert!(!within_fifth(2.0, 2.5));
        assert!(within_fifth(1.85, 1.9));
    }
}
