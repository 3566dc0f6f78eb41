//! Opening the run store.
//!
//! [`open`] is the single entry point used by the report sink and by
//! `parley history`: it creates the database on first use, connects,
//! applies the embedded migrations and then checks that `negotiation_runs`
//! is actually there before anyone queries it.

use anyhow::{Context, Result, bail};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::{debug, info};

use crate::config::DbConfig;

/// Migrations embedded at compile time from `crates/parley-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// The one table this crate owns.
pub const RUNS_TABLE: &str = "negotiation_runs";

/// What [`status`] found in a connected database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStoreStatus {
    pub table_present: bool,
    /// Zero when the table is missing.
    pub stored_runs: i64,
}

impl RunStoreStatus {
    pub fn is_ready(&self) -> bool {
        self.table_present
    }
}

/// Connect to the configured database without touching its schema.
pub async fn connect(config: &DbConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to run store at {}", config.redacted_url()))
}

/// Apply every pending embedded migration.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to migrate the run store")?;
    debug!(table = RUNS_TABLE, "run store migrations applied");
    Ok(())
}

/// Whether the runs table exists, and how many runs it holds.
pub async fn status(pool: &PgPool) -> Result<RunStoreStatus> {
    let table_present: bool =
        sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(format!("public.{RUNS_TABLE}"))
            .fetch_one(pool)
            .await
            .context("failed to look up the runs table")?;

    let stored_runs: i64 = if table_present {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {RUNS_TABLE}"))
            .fetch_one(pool)
            .await
            .context("failed to count stored runs")?
    } else {
        0
    };

    Ok(RunStoreStatus {
        table_present,
        stored_runs,
    })
}

/// Create the configured database unless it already exists.
///
/// Returns `true` when it had to be created.
pub async fn create_database_if_missing(config: &DbConfig) -> Result<bool> {
    let Some(name) = config.database_name() else {
        bail!("database URL {} names no database", config.redacted_url());
    };
    if !config.has_plain_database_name() {
        bail!("database name {name:?} may only contain letters, digits and underscores");
    }

    let maintenance = DbConfig {
        database_url: config.maintenance_url(),
        max_connections: 1,
        ..config.clone()
    };
    let maint_pool = connect(&maintenance).await?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(name)
            .fetch_one(&maint_pool)
            .await
            .context("failed to query pg_database")?;

    let created = if exists {
        false
    } else {
        maint_pool
            .execute(format!("CREATE DATABASE {name}").as_str())
            .await
            .with_context(|| format!("failed to create database {name}"))?;
        info!(db = name, "run store database created");
        true
    };

    maint_pool.close().await;
    Ok(created)
}

/// Create if needed, connect, migrate and verify the runs table.
pub async fn open(config: &DbConfig) -> Result<PgPool> {
    create_database_if_missing(config).await?;
    let pool = connect(config).await?;
    migrate(&pool).await?;

    let store = status(&pool).await?;
    if !store.is_ready() {
        pool.close().await;
        bail!(
            "{RUNS_TABLE} is missing from {} after migration",
            config.redacted_url()
        );
    }
    info!(
        db = config.database_name().unwrap_or_default(),
        stored_runs = store.stored_runs,
        "run store ready"
    );
    Ok(pool)
}
