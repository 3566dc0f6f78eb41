//! PostgreSQL sink backed by `parley-db`.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use tracing::info;

use parley_db::config::DbConfig;
use parley_db::pool;
use parley_db::queries::runs;

use super::{ReportSink, RunReport};

/// Inserts each report into `negotiation_runs`.
///
/// The pool is created (and migrations applied) on first use. Concurrent
/// first calls share one initialisation.
#[derive(Debug)]
pub struct PgReportSink {
    config: DbConfig,
    pool: OnceCell<PgPool>,
}

impl PgReportSink {
    pub fn new(config: DbConfig) -> Self {
        Self {
            config,
            pool: OnceCell::new(),
        }
    }

    /// Use an existing, already migrated pool.
    pub fn with_pool(config: DbConfig, pool: PgPool) -> Self {
        Self {
            config,
            pool: OnceCell::new_with(Some(pool)),
        }
    }

    pub async fn pool(&self) -> Result<&PgPool> {
        self.pool
            .get_or_try_init(|| pool::open(&self.config))
            .await
    }
}

#[async_trait]
impl ReportSink for PgReportSink {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn persist(&self, report: &RunReport) -> Result<()> {
        let pool = self.pool().await?;
        let row = runs::insert_run(pool, &report.to_new_run()?).await?;
        info!(run = %row.id, digest = %row.transcript_digest, "report stored");
        Ok(())
    }
}
