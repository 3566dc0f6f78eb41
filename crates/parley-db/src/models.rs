use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How the two principal agents' calls are scheduled within a phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Both principals are called concurrently inside a phase.
    #[default]
    Parallel,
    /// Agent A is called first, then agent B.
    Sequential,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
        };
        f.write_str(s)
    }
}

impl FromStr for RunMode {
    type Err = RunModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parallel" => Ok(Self::Parallel),
            "sequential" => Ok(Self::Sequential),
            other => Err(RunModeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`RunMode`] string.
#[derive(Debug, Clone)]
pub struct RunModeParseError(pub String);

impl fmt::Display for RunModeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid run mode: {:?} (expected parallel or sequential)", self.0)
    }
}

impl std::error::Error for RunModeParseError {}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A persisted negotiation run.
#[derive(Debug, Clone, FromRow)]
pub struct NegotiationRun {
    pub id: Uuid,
    pub topic: String,
    pub mode: RunMode,
    pub brain_mode: String,
    pub agent_a: String,
    pub agent_b: String,
    pub round_count: i32,
    pub tension_score: f64,
    pub tension_label: String,
    pub synthesis_parsed: bool,
    pub stress_verdict: Option<String>,
    pub transcript_digest: String,
    /// The full run report as serialized by the core crate.
    pub report: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Column values for inserting a run. `created_at` is server-generated.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub id: Uuid,
    pub topic: String,
    pub mode: RunMode,
    pub brain_mode: String,
    pub agent_a: String,
    pub agent_b: String,
    pub round_count: i32,
    pub tension_score: f64,
    pub tension_label: String,
    pub synthesis_parsed: bool,
    pub stress_verdict: Option<String>,
    pub transcript_digest: String,
    pub report: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}
