//! Synthesis and stress-test results.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::backend::BackendId;
use crate::prompt::SharedAxiom;

// ---------------------------------------------------------------------------
// Joint artifact
// ---------------------------------------------------------------------------

/// The arbiter's structured output. Only `nucleus` is mandatory; models
/// routinely drop or rename the outer sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointArtifact {
    pub nucleus: Nucleus,
    #[serde(default)]
    pub shell: Shell,
    #[serde(default)]
    pub corona: Corona,
    #[serde(default)]
    pub echo: Echo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nucleus {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shell {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub axioms_honored: Vec<String>,
    #[serde(default)]
    pub axioms_tensioned: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    #[serde(rename = "type")]
    pub kind: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Corona {
    #[serde(default)]
    pub harmonizes_with: Vec<String>,
    #[serde(default)]
    pub disrupts: Vec<String>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    /// The arbiter's own estimate, not the transcript score.
    #[serde(default)]
    pub tension_score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    #[serde(default)]
    pub provenance: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub rounds: Option<u32>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

impl JointArtifact {
    /// Every axiom id the artifact mentions in its shell or corona.
    pub fn referenced_axioms(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .shell
            .axioms_honored
            .iter()
            .chain(&self.shell.axioms_tensioned)
            .chain(&self.corona.harmonizes_with)
            .chain(&self.corona.disrupts)
            .map(String::as_str)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SynthesisOutcome {
    Parsed { artifact: JointArtifact },
    Unparsed { parse_error: String },
}

/// Extract and parse the JSON object between the first `{` and the last `}`.
pub fn parse_synthesis(raw: &str) -> SynthesisOutcome {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return SynthesisOutcome::Unparsed {
            parse_error: "no JSON object found in synthesis output".to_string(),
        };
    };
    if end < start {
        return SynthesisOutcome::Unparsed {
            parse_error: "no JSON object found in synthesis output".to_string(),
        };
    }

    match serde_json::from_str::<JointArtifact>(&raw[start..=end]) {
        Ok(artifact) => SynthesisOutcome::Parsed { artifact },
        Err(e) => SynthesisOutcome::Unparsed {
            parse_error: e.to_string(),
        },
    }
}

/// The arbiter call's result. `raw` is kept whether or not it parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub raw: String,
    pub outcome: SynthesisOutcome,
    pub backend: BackendId,
    pub model: String,
    /// Shared axioms the arbiter was bound by.
    pub constraints: Vec<SharedAxiom>,
}

impl Synthesis {
    pub fn artifact(&self) -> Option<&JointArtifact> {
        match &self.outcome {
            SynthesisOutcome::Parsed { artifact } => Some(artifact),
            SynthesisOutcome::Unparsed { .. } => None,
        }
    }

    pub fn parse_error(&self) -> Option<&str> {
        match &self.outcome {
            SynthesisOutcome::Parsed { .. } => None,
            SynthesisOutcome::Unparsed { parse_error } => Some(parse_error),
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.artifact().is_some()
    }
}

// ---------------------------------------------------------------------------
// Stress test
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StressVerdict {
    Pass,
    ConditionalPass,
    Fail,
    Unknown,
}

impl fmt::Display for StressVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::ConditionalPass => "CONDITIONAL_PASS",
            Self::Fail => "FAIL",
            Self::Unknown => "UNKNOWN",
        })
    }
}

static VERDICT_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bverdict\b").expect("valid regex"));
static CONDITIONAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bconditional[\s_-]+pass\b").expect("valid regex"));
static FAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfail\b").expect("valid regex"));
static PASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpass\b").expect("valid regex"));

/// Characters after the last "verdict" heading that are searched.
const VERDICT_WINDOW: usize = 160;

impl StressVerdict {
    /// Read the verdict following the critic's last `VERDICT` heading.
    pub fn extract(text: &str) -> Self {
        let Some(heading) = VERDICT_HEADING.find_iter(text).last() else {
            return Self::Unknown;
        };
        let window: String = text[heading.end()..].chars().take(VERDICT_WINDOW).collect();

        // Earliest keyword wins so "PASS, not FAIL" reads as a pass.
        let candidates = [
            (CONDITIONAL.find(&window), Self::ConditionalPass),
            (FAIL.find(&window), Self::Fail),
            (PASS.find(&window), Self::Pass),
        ];
        candidates
            .into_iter()
            .filter_map(|(m, verdict)| m.map(|m| (m.start(), verdict)))
            .min_by_key(|(start, _)| *start)
            .map(|(_, verdict)| verdict)
            .unwrap_or(Self::Unknown)
    }
}

/// The critic call's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressTest {
    pub critic: String,
    pub backend: BackendId,
    pub model: String,
    pub raw: String,
    pub verdict: StressVerdict,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTIFACT: &str = r#"{
        "nucleus": {"title": "Third Door", "content": "Both win.", "type": "SOLUTION"},
        "shell": {"tags": ["negotiation"], "axioms_honored": ["S"], "axioms_tensioned": []},
        "corona": {"harmonizes_with": ["S"], "disrupts": [], "tension_score": 0.4,
                   "relations": [{"type": "extends", "target": "cooperatives"}]},
        "echo": {"participants": ["A", "B"], "rounds": 3}
    }"#;

    #[test]
    fn parses_bare_json() {
        let outcome = parse_synthesis(ARTIFACT);
        let SynthesisOutcome::Parsed { artifact } = outcome else {
            panic!("expected parsed artifact");
        };
        assert_eq!(artifact.nucleus.title, "Third Door");
        assert_eq!(artifact.corona.relations[0].kind, "extends");
        assert_eq!(artifact.echo.rounds, Some(3));
        assert_eq!(artifact.referenced_axioms(), vec!["S"]);
    }

    #[test]
    fn parses_json_wrapped_in_prose_and_fences() {
        let raw = format!("Here is the artifact:\n```json\n{ARTIFACT}\n```\nThanks!");
        assert!(matches!(parse_synthesis(&raw), SynthesisOutcome::Parsed { .. }));
    }

    #[test]
    fn missing_sections_default() {
        let outcome = parse_synthesis(r#"{"nucleus": {"title": "t"}}"#);
        let SynthesisOutcome::Parsed { artifact } = outcome else {
            panic!("expected parsed artifact");
        };
        assert!(artifact.shell.tags.is_empty());
        assert!(artifact.corona.tension_score.is_none());
    }

    #[test]
    fn plain_prose_is_unparsed_not_an_error() {
        let outcome = parse_synthesis("Both agents should simply cooperate more.");
        let SynthesisOutcome::Unparsed { parse_error } = outcome else {
            panic!("expected unparsed outcome");
        };
        assert!(parse_error.contains("no JSON object"));
    }

    #[test]
    fn reversed_braces_are_unparsed() {
        assert!(matches!(
            parse_synthesis("} nothing here {"),
            SynthesisOutcome::Unparsed { .. }
        ));
    }

    #[test]
    fn invalid_json_carries_serde_message() {
        let outcome = parse_synthesis("{\"nucleus\": {\"title\": }");
        let SynthesisOutcome::Unparsed { parse_error } = outcome else {
            panic!("expected unparsed outcome");
        };
        assert!(!parse_error.is_empty());
    }

    #[test]
    fn json_without_nucleus_is_unparsed() {
        assert!(matches!(
            parse_synthesis(r#"{"shell": {}}"#),
            SynthesisOutcome::Unparsed { .. }
        ));
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(SynthesisOutcome::Unparsed {
            parse_error: "bad".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "unparsed");
        assert_eq!(json["parse_error"], "bad");
    }

    #[test]
    fn verdict_extraction() {
        assert_eq!(StressVerdict::extract("3. VERDICT: PASS (robust)"), StressVerdict::Pass);
        assert_eq!(
            StressVerdict::extract("**Verdict:** Conditional Pass. Needs audits."),
            StressVerdict::ConditionalPass
        );
        assert_eq!(StressVerdict::extract("VERDICT\nFAIL: fragile"), StressVerdict::Fail);
        assert_eq!(StressVerdict::extract("It will probably pass."), StressVerdict::Unknown);
    }

    #[test]
    fn verdict_uses_last_heading() {
        let text = "I will give a VERDICT at the end.\n...\n3. VERDICT: FAIL";
        assert_eq!(StressVerdict::extract(text), StressVerdict::Fail);
    }

    #[test]
    fn conditional_pass_is_not_read_as_pass() {
        assert_eq!(
            StressVerdict::extract("VERDICT: CONDITIONAL_PASS"),
            StressVerdict::ConditionalPass
        );
    }
}
