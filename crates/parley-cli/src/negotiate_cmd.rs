//! `parley negotiate` command: run one negotiation and save its report.

use anyhow::Result;

use parley_core::negotiation::Lineup;
use parley_core::report::{FileReportSink, MultiSink, PgReportSink, ReportSink, markdown};

use crate::config::ParleyConfig;
use crate::runtime;

/// Print who sits where before any call is made.
pub fn print_lineup(lineup: &Lineup) {
    for p in lineup.participants() {
        eprintln!(
            "  {:<8} {:<10} {} / {} [{}]",
            p.seat, p.name, p.backend, p.model, p.mode
        );
    }
    if let Some(reason) = &lineup.critic_skip_reason {
        eprintln!("  stress test disabled: {reason}");
    }
    eprintln!("  {}", lineup.brain_mode());
}

pub async fn run_negotiate(cfg: &ParleyConfig, topic: &str, persist: bool, json: bool) -> Result<()> {
    let negotiator = runtime::negotiator(cfg);
    let store = runtime::profile_store(cfg);
    let lineup = negotiator.prepare(&store, &cfg.participants, &cfg.credentials)?;

    eprintln!("Negotiating: {topic}");
    print_lineup(&lineup);
    eprintln!();

    let report = negotiator.run(topic, &lineup).await?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", markdown::render_run(&report));
    }

    let files = FileReportSink::new(&cfg.output_dir);
    let (json_path, md_path) = files.paths(&report);
    let mut sinks = MultiSink::new().with(Box::new(files));
    if persist {
        sinks.push(Box::new(PgReportSink::new(cfg.db_config())));
    }
    sinks.persist(&report).await?;

    eprintln!("Report: {}", md_path.display());
    eprintln!("Data:   {}", json_path.display());
    if persist {
        eprintln!("Stored run {} in the database", report.id);
    }
    Ok(())
}
