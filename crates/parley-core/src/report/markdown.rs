//! Markdown rendering for run and comparison reports.

use std::fmt::Write;

use super::RunReport;
use crate::negotiation::{ModeComparison, SynthesisOutcome};

// `write!` into a `String` cannot fail.
macro_rules! put {
    ($out:expr) => { $out.push('\n') };
    ($out:expr, $($arg:tt)*) => {{
        let _ = writeln!($out, $($arg)*);
    }};
}

pub fn render_run(report: &RunReport) -> String {
    let mut out = String::new();

    put!(out, "# Negotiation: {}", report.topic);
    put!(out);
    put!(out, "- **Run:** `{}`", report.id);
    put!(out, "- **Date:** {}", report.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    put!(out, "- **Mode:** {} ({})", report.mode, report.brain_mode);
    put!(out, "- **Rounds:** {}", report.rounds.len());
    put!(out, "- **Transcript digest:** `{}`", report.transcript_digest);
    put!(out);

    put!(out, "## Participants");
    put!(out);
    put!(out, "| Seat | Name | Backend | Model | Mode |");
    put!(out, "|------|------|---------|-------|------|");
    for p in &report.participants {
        put!(out, "| {} | {} | {} | {} | {} |", p.seat, p.name, p.backend, p.model, p.mode);
    }
    put!(out);

    let name_a = seat_name(report, "agent_a", "Agent A");
    let name_b = seat_name(report, "agent_b", "Agent B");
    for round in &report.rounds {
        if round.round_number == 1 {
            put!(out, "## Round 1 (opening)");
        } else {
            put!(out, "## Round {}", round.round_number);
        }
        put!(out);
        put!(out, "### {name_a}");
        put!(out);
        put!(out, "{}", or_placeholder(&round.agent_a_output));
        put!(out);
        put!(out, "### {name_b}");
        put!(out);
        put!(out, "{}", or_placeholder(&round.agent_b_output));
        put!(out);
    }

    put!(out, "## Synthesis");
    put!(out);
    match &report.synthesis.outcome {
        SynthesisOutcome::Parsed { artifact } => {
            put!(out, "**{}** ({})", artifact.nucleus.title, artifact.nucleus.kind);
            put!(out);
            put!(out, "{}", artifact.nucleus.content);
            put!(out);
            let axioms = artifact.referenced_axioms();
            if !axioms.is_empty() {
                put!(out, "Axioms referenced: {}", axioms.join(", "));
                put!(out);
            }
        }
        SynthesisOutcome::Unparsed { parse_error } => {
            put!(out, "_Synthesis output was not a joint artifact: {parse_error}_");
            put!(out);
            put!(out, "```text");
            put!(out, "{}", report.synthesis.raw.trim_end());
            put!(out, "```");
            put!(out);
        }
    }
    if !report.synthesis.constraints.is_empty() {
        put!(out, "Shared axioms supplied as constraints:");
        put!(out);
        for axiom in &report.synthesis.constraints {
            put!(out, "- {} {} (avg {:.2})", axiom.id, axiom.title, axiom.average_weight);
        }
        put!(out);
    }

    put!(out, "## Stress test");
    put!(out);
    match (&report.stress_test, &report.stress_test_skipped) {
        (Some(test), _) => {
            put!(out, "**{}** verdict: **{}**", test.critic, test.verdict);
            put!(out);
            put!(out, "{}", or_placeholder(&test.raw));
        }
        (None, Some(reason)) => put!(out, "_Skipped: {reason}_"),
        (None, None) => put!(out, "_Not requested._"),
    }
    put!(out);

    let t = &report.tension;
    put!(out, "## Tension");
    put!(out);
    put!(out, "**{:.2}** ({}), persistence {:.2}", t.score, t.label, t.friction_persistence);
    put!(out);
    put!(out, "| Round | Friction | Agreement |");
    put!(out, "|-------|----------|-----------|");
    for r in &t.per_round {
        put!(out, "| {} | {} | {} |", r.round, r.friction, r.agreement);
    }
    put!(out, "| **Total** | {} | {} |", t.friction_count, t.agreement_count);
    put!(out);

    let timings = &report.timings;
    put!(out, "## Timings");
    put!(out);
    put!(out, "| Phase | ms |");
    put!(out, "|-------|----|");
    for (i, ms) in timings.rounds_ms.iter().enumerate() {
        put!(out, "| round {} | {ms} |", i + 1);
    }
    put!(out, "| synthesis | {} |", timings.synthesis_ms);
    if let Some(ms) = timings.stress_test_ms {
        put!(out, "| stress test | {ms} |");
    }
    put!(out, "| **total** | {} |", timings.total_ms);

    out
}

pub fn render_comparison(comparison: &ModeComparison) -> String {
    let mut out = String::new();

    put!(out, "# Mode comparison: {}", comparison.parallel.topic);
    put!(out);
    put!(out, "| Phase | PARALLEL (ms) | SEQUENTIAL (ms) | Speedup |");
    put!(out, "|-------|---------------|-----------------|---------|");
    for row in comparison.phases() {
        put!(
            out,
            "| {} | {} | {} | {} |",
            row.phase,
            row.parallel_ms,
            row.sequential_ms,
            fmt_speedup(row.speedup())
        );
    }
    put!(
        out,
        "| **total** | {} | {} | {} |",
        comparison.parallel.timings.total_ms,
        comparison.sequential.timings.total_ms,
        fmt_speedup(comparison.total_speedup())
    );
    put!(out);

    let savings = comparison.savings_ms();
    if savings >= 0 {
        put!(out, "Parallel mode saved **{savings} ms**.");
    } else {
        put!(out, "Parallel mode was **{} ms** slower.", -savings);
    }
    put!(
        out,
        "Tension: parallel {:.2} ({}), sequential {:.2} ({}).",
        comparison.parallel.tension.score,
        comparison.parallel.tension.label,
        comparison.sequential.tension.score,
        comparison.sequential.tension.label
    );

    out
}

fn seat_name<'a>(report: &'a RunReport, seat: &str, fallback: &'a str) -> &'a str {
    report
        .participant(seat)
        .map(|p| p.name.as_str())
        .unwrap_or(fallback)
}

fn or_placeholder(text: &str) -> &str {
    if text.trim().is_empty() { "_(no output)_" } else { text }
}

fn fmt_speedup(speedup: Option<f64>) -> String {
    speedup.map_or_else(|| "n/a".to_string(), |s| format!("{s:.2}x"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures;

    #[test]
    fn run_report_has_every_section() {
        let md = render_run(&fixtures::report());
        assert!(md.starts_with("# Negotiation: Should the ledger be public?"));
        for heading in [
            "## Participants",
            "## Round 1 (opening)",
            "## Round 2",
            "## Synthesis",
            "## Stress test",
            "## Tension",
            "## Timings",
        ] {
            assert!(md.contains(heading), "missing {heading}");
        }
        assert!(md.contains("### Boolean"));
        assert!(md.contains("**Staged ledger** (proposal)"));
        assert!(md.contains("**Seer** verdict: **PASS**"));
        assert!(md.contains("| **total** | 4300 |"));
    }

    #[test]
    fn unparsed_synthesis_shows_raw_text() {
        let mut report = fixtures::report();
        report.synthesis.raw = "Both sides should compromise.".into();
        report.synthesis.outcome = crate::negotiation::parse_synthesis(&report.synthesis.raw);
        report.stress_test = None;
        report.stress_test_skipped = Some("groq returned 503".into());

        let md = render_run(&report);
        assert!(md.contains("not a joint artifact"));
        assert!(md.contains("Both sides should compromise."));
        assert!(md.contains("_Skipped: groq returned 503_"));
    }

    #[test]
    fn comparison_table_reports_speedup_and_savings() {
        let parallel = fixtures::report();
        let mut sequential = fixtures::report();
        sequential.mode = parley_db::models::RunMode::Sequential;
        sequential.timings.rounds_ms = vec![2400, 1800];
        sequential.timings.total_ms = 6400;

        let md = render_comparison(&ModeComparison::new(parallel, sequential));
        assert!(md.contains("| round 1 (opening) | 1200 | 2400 | 2.00x |"));
        assert!(md.contains("| synthesis | 1500 | 1500 | 1.00x |"));
        assert!(md.contains("Parallel mode saved **2100 ms**."));
    }
}
