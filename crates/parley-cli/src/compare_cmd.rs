//! `parley compare` command: same topic, parallel then sequential.

use anyhow::Result;

use parley_core::report::{FileReportSink, ReportSink, markdown};

use crate::config::ParleyConfig;
use crate::negotiate_cmd::print_lineup;
use crate::runtime;

pub async fn run_compare(cfg: &ParleyConfig, topic: &str) -> Result<()> {
    let negotiator = runtime::negotiator(cfg);
    let store = runtime::profile_store(cfg);
    let lineup = negotiator.prepare(&store, &cfg.participants, &cfg.credentials)?;

    eprintln!("Comparing PARALLEL vs SEQUENTIAL on: {topic}");
    print_lineup(&lineup);
    eprintln!();

    let comparison = negotiator.compare_modes(topic, &lineup).await?;
    println!("{}", markdown::render_comparison(&comparison));

    let files = FileReportSink::new(&cfg.output_dir);
    files.persist(&comparison.parallel).await?;
    files.persist(&comparison.sequential).await?;
    let path = files.write_comparison(&comparison).await?;
    eprintln!("Comparison: {}", path.display());
    Ok(())
}
