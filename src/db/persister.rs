//! Bulk persistence: one batched matches upsert and one batched odds write
//! per provider per cycle. Per-row round-trips are forbidden at the design
//! level, so every statement feeds from `UNNEST` arrays. Duplicate-key
//! races between providers touching the same match are absorbed by the
//! upserts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{PgPool, Row};

use crate::adapters::RawOdds;
use crate::markets::margin_key;
use crate::resolver::ResolvedMatch;

/// A five-tuple key change from the current-odds upsert, used to emit
/// `odds.update` events for rows whose prices actually moved.
#[derive(Debug, Clone)]
pub struct ChangedKey {
    pub match_id: i64,
    pub provider_id: i16,
    pub bet_type_id: i16,
    pub margin: f64,
    pub selection: String,
}

/// Insert new matches and merge external ids into resolved ones. Fills in
/// `match_id` on every element of the batch; returns how many rows were
/// newly inserted.
pub async fn upsert_matches(
    pool: &PgPool,
    batch: &mut [ResolvedMatch],
) -> Result<u64, sqlx::Error> {
    // External-id merge for matches the resolver already pinned to a row.
    let mut merge_ids = Vec::new();
    let mut merge_ext = Vec::new();
    for resolved in batch.iter() {
        if let (Some(id), Some(ext)) = (resolved.match_id, resolved.external_id_patch()) {
            merge_ids.push(id);
            merge_ext.push(ext);
        }
    }
    if !merge_ids.is_empty() {
        sqlx::query(
            r#"
            UPDATE matches AS m
            SET external_ids = m.external_ids || v.ext
            FROM (SELECT UNNEST($1::bigint[]) AS id, UNNEST($2::jsonb[]) AS ext) AS v
            WHERE m.id = v.id
            "#,
        )
        .bind(&merge_ids)
        .bind(&merge_ext)
        .execute(pool)
        .await?;
    }

    // Batched insert of everything the resolver could not place. The
    // conflict target is the normalized identity, so two providers racing
    // on the same new match collapse into one row.
    let pending: Vec<usize> = batch
        .iter()
        .enumerate()
        .filter(|(_, r)| r.match_id.is_none())
        .map(|(i, _)| i)
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let mut team1_raw = Vec::with_capacity(pending.len());
    let mut team2_raw = Vec::with_capacity(pending.len());
    let mut team1_norm = Vec::with_capacity(pending.len());
    let mut team2_norm = Vec::with_capacity(pending.len());
    let mut sport_ids = Vec::with_capacity(pending.len());
    let mut leagues = Vec::with_capacity(pending.len());
    let mut start_times = Vec::with_capacity(pending.len());
    let mut external_ids = Vec::with_capacity(pending.len());
    // A provider occasionally lists the same event twice; the statement may
    // not touch one conflict key twice, so only the first copy is inserted
    // and the id flows back to both through the conflict-key lookup.
    let mut seen = std::collections::HashSet::new();
    for &i in &pending {
        let r = &batch[i];
        if !seen.insert((
            r.team1_norm.clone(),
            r.team2_norm.clone(),
            r.raw.sport,
            r.raw.start_time.timestamp(),
        )) {
            continue;
        }
        team1_raw.push(r.raw.team1.clone());
        team2_raw.push(r.raw.team2.clone());
        team1_norm.push(r.team1_norm.clone());
        team2_norm.push(r.team2_norm.clone());
        sport_ids.push(r.raw.sport);
        leagues.push(r.raw.league.clone());
        start_times.push(r.raw.start_time);
        external_ids.push(r.external_id_patch().unwrap_or_else(|| json!({})));
    }

    let rows = sqlx::query(
        r#"
        INSERT INTO matches (
            team1_raw, team2_raw, team1_norm, team2_norm,
            sport_id, league_name, start_time, external_ids, status
        )
        SELECT t1r, t2r, t1n, t2n, sport, league, start, ext, 'upcoming'
        FROM UNNEST(
            $1::text[], $2::text[], $3::text[], $4::text[],
            $5::smallint[], $6::text[], $7::timestamptz[], $8::jsonb[]
        ) AS v(t1r, t2r, t1n, t2n, sport, league, start, ext)
        ON CONFLICT (team1_norm, team2_norm, sport_id, start_time)
        DO UPDATE SET external_ids = matches.external_ids || EXCLUDED.external_ids
        RETURNING id, team1_norm, team2_norm, sport_id, start_time
        "#,
    )
    .bind(&team1_raw)
    .bind(&team2_raw)
    .bind(&team1_norm)
    .bind(&team2_norm)
    .bind(&sport_ids)
    .bind(&leagues)
    .bind(&start_times)
    .bind(&external_ids)
    .fetch_all(pool)
    .await?;

    let mut assigned: HashMap<(String, String, i16, i64), i64> = HashMap::new();
    for row in &rows {
        let key = (
            row.get::<String, _>("team1_norm"),
            row.get::<String, _>("team2_norm"),
            row.get::<i16, _>("sport_id"),
            row.get::<DateTime<Utc>, _>("start_time").timestamp(),
        );
        assigned.insert(key, row.get::<i64, _>("id"));
    }
    for &i in &pending {
        let key = {
            let r = &batch[i];
            (
                r.team1_norm.clone(),
                r.team2_norm.clone(),
                r.raw.sport,
                r.raw.start_time.timestamp(),
            )
        };
        let id = assigned.get(&key).copied();
        if id.is_none() {
            tracing::warn!(
                team1 = %batch[i].raw.team1,
                team2 = %batch[i].raw.team2,
                "matches upsert returned no id for batch row"
            );
        }
        batch[i].match_id = id;
    }

    Ok(rows.len() as u64)
}

/// Drop in-batch duplicates of the full five-tuple, keeping the last
/// observation. The upsert would otherwise hit
/// `ON CONFLICT DO UPDATE cannot affect row a second time`.
pub fn dedupe_rows(rows: Vec<(i64, RawOdds)>) -> Vec<(i64, RawOdds)> {
    let mut index: HashMap<(i64, i16, i64, String), usize> = HashMap::new();
    let mut deduped: Vec<Option<(i64, RawOdds)>> = Vec::with_capacity(rows.len());
    for (match_id, odds) in rows {
        let key = (
            match_id,
            odds.key.bet_type,
            margin_key(odds.key.margin),
            odds.key.selection.clone(),
        );
        match index.get(&key) {
            Some(&slot) => deduped[slot] = Some((match_id, odds)),
            None => {
                index.insert(key, deduped.len());
                deduped.push(Some((match_id, odds)));
            }
        }
    }
    deduped.into_iter().flatten().collect()
}

/// One round-trip: append every observation to the history and upsert the
/// current table, returning the keys whose prices actually changed.
pub async fn write_odds(
    pool: &PgPool,
    provider_id: i16,
    rows: Vec<(i64, RawOdds)>,
    observed_at: DateTime<Utc>,
) -> Result<(u64, Vec<ChangedKey>), sqlx::Error> {
    let rows = dedupe_rows(rows);
    if rows.is_empty() {
        return Ok((0, Vec::new()));
    }
    let written = rows.len() as u64;

    let mut match_ids = Vec::with_capacity(rows.len());
    let mut bet_types = Vec::with_capacity(rows.len());
    let mut margins = Vec::with_capacity(rows.len());
    let mut selections = Vec::with_capacity(rows.len());
    let mut p1s = Vec::with_capacity(rows.len());
    let mut p2s = Vec::with_capacity(rows.len());
    let mut p3s = Vec::with_capacity(rows.len());
    for (match_id, odds) in &rows {
        match_ids.push(*match_id);
        bet_types.push(odds.key.bet_type);
        margins.push(odds.key.margin);
        selections.push(odds.key.selection.clone());
        p1s.push(odds.p1);
        p2s.push(odds.p2);
        p3s.push(odds.p3);
    }

    let changed = sqlx::query(
        r#"
        WITH data AS (
            SELECT * FROM UNNEST(
                $1::bigint[], $2::smallint[], $3::float8[], $4::text[],
                $5::float8[], $6::float8[], $7::float8[]
            ) AS t(match_id, bet_type_id, margin, selection, p1, p2, p3)
        ),
        hist AS (
            INSERT INTO odds_history (
                match_id, provider_id, bet_type_id, margin, selection,
                p1, p2, p3, observed_at
            )
            SELECT match_id, $8, bet_type_id, margin, selection, p1, p2, p3, $9
            FROM data
        ),
        up AS (
            INSERT INTO current_odds (
                match_id, provider_id, bet_type_id, margin, selection,
                p1, p2, p3, updated_at
            )
            SELECT match_id, $8, bet_type_id, margin, selection, p1, p2, p3, $9
            FROM data
            ON CONFLICT (match_id, provider_id, bet_type_id, margin, selection)
            DO UPDATE SET
                p1 = EXCLUDED.p1,
                p2 = EXCLUDED.p2,
                p3 = EXCLUDED.p3,
                updated_at = EXCLUDED.updated_at
            WHERE (current_odds.p1, current_odds.p2, current_odds.p3)
                  IS DISTINCT FROM (EXCLUDED.p1, EXCLUDED.p2, EXCLUDED.p3)
            RETURNING match_id, bet_type_id, margin, selection
        )
        SELECT match_id, bet_type_id, margin, selection FROM up
        "#,
    )
    .bind(&match_ids)
    .bind(&bet_types)
    .bind(&margins)
    .bind(&selections)
    .bind(&p1s)
    .bind(&p2s)
    .bind(&p3s)
    .bind(provider_id)
    .bind(observed_at)
    .fetch_all(pool)
    .await?;

    let changed = changed
        .into_iter()
        .map(|row| ChangedKey {
            match_id: row.get("match_id"),
            provider_id,
            bet_type_id: row.get("bet_type_id"),
            margin: row.get("margin"),
            selection: row.get("selection"),
        })
        .collect();

    Ok((written, changed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markets::codec::MarketKey;
    use crate::markets::vocabulary::{FULL_TIME_1X2, TOTAL_GOALS};

    fn odds(bet_type: i16, margin: f64, selection: &str, p1: f64) -> RawOdds {
        RawOdds {
            key: MarketKey { bet_type, selection: selection.into(), margin },
            p1,
            p2: None,
            p3: None,
        }
    }

    #[test]
    fn dedupe_keeps_the_last_observation() {
        let rows = vec![
            (1, odds(FULL_TIME_1X2, 0.0, "", 2.0)),
            (1, odds(TOTAL_GOALS, 2.5, "", 1.9)),
            (1, odds(FULL_TIME_1X2, 0.0, "", 2.1)),
        ];
        let deduped = dedupe_rows(rows);
        assert_eq!(deduped.len(), 2);
        let x12 = deduped
            .iter()
            .find(|(_, o)| o.key.bet_type == FULL_TIME_1X2)
            .unwrap();
        assert_eq!(x12.1.p1, 2.1);
    }

    #[test]
    fn dedupe_distinguishes_margins_and_selections() {
        let rows = vec![
            (1, odds(TOTAL_GOALS, 2.5, "", 1.9)),
            (1, odds(TOTAL_GOALS, 3.5, "", 2.6)),
            (2, odds(TOTAL_GOALS, 2.5, "", 1.8)),
        ];
        assert_eq!(dedupe_rows(rows).len(), 3);
    }

    #[test]
    fn dedupe_margin_is_tick_exact() {
        // 2.5 and 2.5000000001 are the same line after the hundredths key.
        let rows = vec![
            (1, odds(TOTAL_GOALS, 2.5, "", 1.9)),
            (1, odds(TOTAL_GOALS, 2.500_000_000_1, "", 1.95)),
        ];
        assert_eq!(dedupe_rows(rows).len(), 1);
    }
}
