//! Run reports and where they go.
//!
//! A [`RunReport`] is the complete record of one negotiation. It serializes
//! to JSON, renders to Markdown ([`markdown`]) and is handed to a
//! [`ReportSink`] for persistence.

pub mod file;
pub mod markdown;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use parley_db::models::{NewRun, RunMode};

use crate::backend::BackendId;
use crate::negotiation::{RoundRecord, StressTest, Synthesis};
use crate::provider::{BrainMode, ProviderMode};
use crate::tension::TensionScore;

pub use file::FileReportSink;
pub use postgres::PgReportSink;

// ---------------------------------------------------------------------------
// Report model
// ---------------------------------------------------------------------------

/// Who sat where, and on which backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    /// `agent_a`, `agent_b`, `arbiter` or `critic`.
    pub seat: String,
    pub name: String,
    pub profile_id: Option<String>,
    pub top_axiom: Option<String>,
    pub backend: BackendId,
    pub model: String,
    pub mode: ProviderMode,
}

/// Wall-clock milliseconds per phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTimings {
    /// Index 0 is the opening round.
    pub rounds_ms: Vec<u64>,
    pub synthesis_ms: u64,
    pub stress_test_ms: Option<u64>,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub id: Uuid,
    pub topic: String,
    pub mode: RunMode,
    pub brain_mode: BrainMode,
    pub participants: Vec<ParticipantInfo>,
    pub rounds: Vec<RoundRecord>,
    pub synthesis: Synthesis,
    pub stress_test: Option<StressTest>,
    /// Set when a critic was requested but the stress test did not run.
    pub stress_test_skipped: Option<String>,
    pub tension: TensionScore,
    pub timings: PhaseTimings,
    pub transcript_digest: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunReport {
    /// The participant in `seat` ("agent_a", "agent_b", "arbiter", "critic").
    pub fn participant(&self, seat: &str) -> Option<&ParticipantInfo> {
        self.participants.iter().find(|p| p.seat == seat)
    }

    /// Pretty-printed JSON, the form written to `run-<ts>.json`.
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Column values for the `negotiation_runs` table.
    pub fn to_new_run(&self) -> anyhow::Result<NewRun> {
        let name = |seat: &str| {
            self.participant(seat)
                .map(|p| p.name.clone())
                .unwrap_or_default()
        };
        Ok(NewRun {
            id: self.id,
            topic: self.topic.clone(),
            mode: self.mode,
            brain_mode: self.brain_mode.to_string(),
            agent_a: name("agent_a"),
            agent_b: name("agent_b"),
            round_count: i32::try_from(self.rounds.len())?,
            tension_score: self.tension.score,
            tension_label: self.tension.label.to_string(),
            synthesis_parsed: self.synthesis.is_parsed(),
            stress_verdict: self.stress_test.as_ref().map(|t| t.verdict.to_string()),
            transcript_digest: self.transcript_digest.clone(),
            report: serde_json::to_value(self)?,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

/// SHA-256 hex over the round-ordered outputs.
///
/// Every output is length-prefixed so that moving text between agents or
/// rounds changes the digest.
pub fn transcript_digest(rounds: &[RoundRecord]) -> String {
    let mut hasher = Sha256::new();
    for round in rounds {
        hasher.update(round.round_number.to_be_bytes());
        for output in [&round.agent_a_output, &round.agent_b_output] {
            hasher.update((output.len() as u64).to_be_bytes());
            hasher.update(output.as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &str;

    async fn persist(&self, report: &RunReport) -> anyhow::Result<()>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn ReportSink) {}
};

/// Fans a report out to every inner sink in order. Stops at the first error.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl MultiSink {
    /// A sink with no targets; persisting to it is a no-op.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a target. Targets persist in insertion order.
    pub fn push(&mut self, sink: Box<dyn ReportSink>) {
        self.sinks.push(sink);
    }

    /// Builder form of [`Self::push`].
    pub fn with(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.push(sink);
        self
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether there are no targets.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for MultiSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiSink")
            .field("sinks", &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl ReportSink for MultiSink {
    fn name(&self) -> &str {
        "multi"
    }

    async fn persist(&self, report: &RunReport) -> anyhow::Result<()> {
        for sink in &self.sinks {
            sink.persist(report)
                .await
                .map_err(|e| e.context(format!("report sink {} failed", sink.name())))?;
            tracing::debug!(sink = sink.name(), run = %report.id, "report persisted");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn digest_is_stable_and_order_sensitive() {
        let a = vec![RoundRecord::new(1, "x".into(), "y".into())];
        let swapped = vec![RoundRecord::new(1, "y".into(), "x".into())];
        let shifted = vec![RoundRecord::new(1, "xy".into(), "".into())];
        assert_eq!(transcript_digest(&a), transcript_digest(&a));
        assert_eq!(transcript_digest(&a).len(), 64);
        assert_ne!(transcript_digest(&a), transcript_digest(&swapped));
        assert_ne!(transcript_digest(&a), transcript_digest(&shifted));
    }

    #[test]
    fn new_run_carries_summary_columns() {
        let report = fixtures::report();
        let run = report.to_new_run().unwrap();
        assert_eq!(run.agent_a, "Boolean");
        assert_eq!(run.agent_b, "Roux");
        assert_eq!(run.round_count, 2);
        assert!(run.synthesis_parsed);
        assert_eq!(run.stress_verdict.as_deref(), Some("PASS"));
        assert_eq!(run.brain_mode, "DUAL-BRAIN");
        assert_eq!(run.report["topic"], "Should the ledger be public?");
    }

    #[test]
    fn json_round_trips() {
        let report = fixtures::report();
        let back: RunReport = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(back.rounds, report.rounds);
        assert_eq!(back.synthesis, report.synthesis);
    }

    struct Recording {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl ReportSink for Recording {
        fn name(&self) -> &str {
            self.name
        }

        async fn persist(&self, _report: &RunReport) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(self.name);
            if self.fail {
                anyhow::bail!("disk full");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn multi_sink_runs_in_order_and_stops_on_error() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = |name, fail| -> Box<dyn ReportSink> {
            Box::new(Recording {
                name,
                seen: Arc::clone(&seen),
                fail,
            })
        };
        let multi = MultiSink::new()
            .with(sink("first", false))
            .with(sink("second", true))
            .with(sink("third", false));
        assert_eq!(multi.len(), 3);

        let err = multi.persist(&fixtures::report()).await.unwrap_err();
        assert!(format!("{err:#}").contains("report sink second failed"));
        assert!(format!("{err:#}").contains("disk full"));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }
}
