//! `parley preflight` command: ping backends, preview seats, give a verdict.

use anyhow::{Result, bail};

use parley_core::negotiation::ArbiterChoice;
use parley_core::provider::preflight::{PingStatus, Preflight};

use crate::config::ParleyConfig;
use crate::runtime;

pub async fn run_preflight(cfg: &ParleyConfig) -> Result<()> {
    let store = runtime::profile_store(cfg);
    let agent_a = store.load(&cfg.participants.agent_a)?;
    let agent_b = store.load(&cfg.participants.agent_b)?;
    let critic = cfg
        .participants
        .critic
        .as_deref()
        .map(|id| store.load(id))
        .transpose()?;

    let mut seats = vec![("agent_a", &agent_a, true), ("agent_b", &agent_b, true)];
    if let Some(critic) = &critic {
        seats.push(("critic", critic, false));
    }

    let arbiter = match cfg.negotiation.arbiter {
        ArbiterChoice::FirstPrincipal => None,
        ArbiterChoice::Backend(backend) => Some(backend),
    };

    println!("Backends:");
    let report = Preflight::new(runtime::adapter(cfg))
        .run(&cfg.credentials, &seats, arbiter)
        .await;
    for ping in &report.pings {
        let latency = ping
            .latency_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<4} {:<10} {:>7}  {}",
            ping.status.to_string(),
            ping.backend.to_string(),
            latency,
            ping.detail
        );
    }
    println!(
        "  {} ok, {} warn, {} fail, {} skipped",
        report.count(PingStatus::Ok),
        report.count(PingStatus::Warn),
        report.count(PingStatus::Fail),
        report.count(PingStatus::Skip)
    );
    println!();

    println!("Agents:");
    for agent in &report.agents {
        match &agent.provider {
            Some(p) => println!(
                "  {:<8} {:<10} wants {:<10} gets {} / {} [{}]",
                agent.seat,
                agent.profile_name,
                agent.preferred.to_string(),
                p.backend,
                p.model,
                p.mode
            ),
            None => println!(
                "  {:<8} {:<10} wants {:<10} no provider",
                agent.seat,
                agent.profile_name,
                agent.preferred.to_string()
            ),
        }
    }
    println!("  {}", report.brain_mode);
    println!();

    let verdict = report.verdict();
    println!("Verdict: {verdict}");
    if verdict.is_blocked() {
        bail!("preflight blocked");
    }
    Ok(())
}
