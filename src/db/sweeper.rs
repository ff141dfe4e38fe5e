//! Periodic retention sweeper, kept out of the hot scrape loop: advances
//! match status on the clock, trims history to its window, and hard-deletes
//! old matches (the schema cascades to their odds rows) and stale inactive
//! arbitrage rows.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing::{debug, error};

use crate::core::Core;

const SWEEP_PERIOD: Duration = Duration::from_secs(60);
const FINISHED_AFTER_HOURS: i32 = 4;

pub async fn run(core: Arc<Core>) {
    let mut interval = tokio::time::interval(SWEEP_PERIOD);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(e) = sweep(&core.db, &core.config).await {
            error!("sweep failed: {}", e);
        }
    }
}

async fn sweep(pool: &PgPool, config: &crate::config::Config) -> Result<(), sqlx::Error> {
    let live = sqlx::query(
        "UPDATE matches SET status = 'live' WHERE status = 'upcoming' AND start_time <= now()",
    )
    .execute(pool)
    .await?
    .rows_affected();

    let finished = sqlx::query(
        r#"
        UPDATE matches SET status = 'finished'
        WHERE status IN ('upcoming', 'live')
          AND start_time + make_interval(hours => $1) <= now()
        "#,
    )
    .bind(FINISHED_AFTER_HOURS)
    .execute(pool)
    .await?
    .rows_affected();

    let history = sqlx::query(
        "DELETE FROM odds_history WHERE observed_at < now() - make_interval(days => $1)",
    )
    .bind(config.odds_history_retention_days as i32)
    .execute(pool)
    .await?
    .rows_affected();

    let matches = sqlx::query(
        "DELETE FROM matches WHERE start_time < now() - make_interval(days => $1)",
    )
    .bind(config.match_retention_days as i32)
    .execute(pool)
    .await?
    .rows_affected();

    let arbitrage = sqlx::query(
        r#"
        DELETE FROM arbitrage
        WHERE active = false AND detected_at < now() - make_interval(days => $1)
        "#,
    )
    .bind(config.arbitrage_retention_days as i32)
    .execute(pool)
    .await?
    .rows_affected();

    if live + finished + history + matches + arbitrage > 0 {
        debug!(live, finished, history, matches, arbitrage, "sweep applied");
    }
    Ok(())
}
