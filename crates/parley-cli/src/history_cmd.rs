//! `parley history` command: list stored runs.

use anyhow::Result;

use parley_db::pool;
use parley_db::queries::runs;

use crate::config::ParleyConfig;

pub async fn run_history(cfg: &ParleyConfig, limit: i64) -> Result<()> {
    let db_pool = pool::open(&cfg.db_config()).await?;

    let result = async {
        let store = pool::status(&db_pool).await?;
        let rows = runs::list_runs(&db_pool, limit).await?;
        anyhow::Ok((store, rows))
    }
    .await;
    db_pool.close().await;
    let (store, rows) = result?;

    if rows.is_empty() {
        println!("No runs stored yet. Use `parley negotiate --persist` to record one.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<16}  {:<10}  {:>6}  {:<8}  {:<16}  TOPIC",
        "ID", "DATE", "MODE", "SCORE", "LABEL", "VERDICT"
    );
    for row in &rows {
        println!(
            "{:<36}  {:<16}  {:<10}  {:>6.2}  {:<8}  {:<16}  {}",
            row.id,
            row.started_at.format("%Y-%m-%d %H:%M"),
            row.mode.to_string(),
            row.tension_score,
            row.tension_label,
            row.stress_verdict.as_deref().unwrap_or("-"),
            row.topic
        );
    }
    println!();
    println!("{} of {} stored run(s)", rows.len(), store.stored_runs);
    Ok(())
}
