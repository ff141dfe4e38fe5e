//! The injected `Core` value: everything the pipeline stages share,
//! constructed once at startup and passed by `Arc`. Replaces the
//! module-level registries and singletons a system like this tends to grow.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::publisher::Publisher;
use crate::stats::Stats;

pub struct Core {
    pub config: Config,
    pub db: PgPool,
    pub publisher: Publisher,
    pub stats: Arc<Stats>,
}

impl Core {
    pub fn new(config: Config, db: PgPool, stats: Arc<Stats>) -> Self {
        Self { config, db, publisher: Publisher::new(), stats }
    }
}
