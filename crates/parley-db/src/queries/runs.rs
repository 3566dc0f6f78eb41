//! Database query functions for the `negotiation_runs` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{NegotiationRun, NewRun};

/// Insert a completed run. Returns the stored row with `created_at` filled in.
pub async fn insert_run(pool: &PgPool, run: &NewRun) -> Result<NegotiationRun> {
    let row = sqlx::query_as::<_, NegotiationRun>(
        "INSERT INTO negotiation_runs \
             (id, topic, mode, brain_mode, agent_a, agent_b, round_count, \
              tension_score, tension_label, synthesis_parsed, stress_verdict, \
              transcript_digest, report, started_at, completed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
         RETURNING *",
    )
    .bind(run.id)
    .bind(&run.topic)
    .bind(run.mode)
    .bind(&run.brain_mode)
    .bind(&run.agent_a)
    .bind(&run.agent_b)
    .bind(run.round_count)
    .bind(run.tension_score)
    .bind(&run.tension_label)
    .bind(run.synthesis_parsed)
    .bind(&run.stress_verdict)
    .bind(&run.transcript_digest)
    .bind(&run.report)
    .bind(run.started_at)
    .bind(run.completed_at)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert negotiation run {}", run.id))?;

    Ok(row)
}

/// Fetch a run by its ID.
pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<Option<NegotiationRun>> {
    let row = sqlx::query_as::<_, NegotiationRun>("SELECT * FROM negotiation_runs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch negotiation run")?;

    Ok(row)
}

/// List the most recent runs, newest first.
pub async fn list_runs(pool: &PgPool, limit: i64) -> Result<Vec<NegotiationRun>> {
    let rows = sqlx::query_as::<_, NegotiationRun>(
        "SELECT * FROM negotiation_runs ORDER BY created_at DESC, started_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list negotiation runs")?;

    Ok(rows)
}

/// Find every run whose transcript hashes to `digest`.
///
/// Identical digests mean identical transcripts, so their tension scores
/// must match as well.
pub async fn find_runs_by_digest(pool: &PgPool, digest: &str) -> Result<Vec<NegotiationRun>> {
    let rows = sqlx::query_as::<_, NegotiationRun>(
        "SELECT * FROM negotiation_runs WHERE transcript_digest = $1 ORDER BY created_at",
    )
    .bind(digest)
    .fetch_all(pool)
    .await
    .context("failed to query negotiation runs by digest")?;

    Ok(rows)
}
