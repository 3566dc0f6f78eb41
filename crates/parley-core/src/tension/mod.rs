//! Transcript-derived tension score.
//!
//! Counts friction and agreement markers per round and combines the overall
//! friction ratio with how much friction survives from the first round to
//! the last. Deterministic: identical transcripts score identically.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::negotiation::RoundRecord;

const FRICTION_MARKERS: &[&str] = &[
    "however",
    "but",
    "push.?back",
    "challenge",
    "disagree",
    "reject",
    "insufficient",
    "not enough",
    "hold firm",
    "still requires",
    "critically",
    "unless",
    "without",
    "missing",
    "fail",
    "warn",
    "problematic",
    "weaker",
    "incomplete",
];

const AGREEMENT_MARKERS: &[&str] = &[
    "agree",
    "accept",
    "acknowledge",
    "exactly",
    "correct",
    "valid",
    "incorporate",
    "embrace",
    "welcome",
    "appreciate",
    "concur",
    "right",
    "indeed",
];

fn compile(markers: &[&str]) -> Vec<Regex> {
    markers
        .iter()
        .map(|m| Regex::new(&format!(r"(?i)\b{m}\b")).expect("marker lexicon is valid regex"))
        .collect()
}

static FRICTION: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(FRICTION_MARKERS));
static AGREEMENT: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(AGREEMENT_MARKERS));

fn count(lexicon: &[Regex], text: &str) -> u32 {
    lexicon.iter().map(|re| re.find_iter(text).count() as u32).sum()
}

/// Whole-word, case-insensitive friction marker occurrences.
pub fn count_friction(text: &str) -> u32 {
    count(&FRICTION, text)
}

/// Whole-word, case-insensitive agreement marker occurrences.
pub fn count_agreement(text: &str) -> u32 {
    count(&AGREEMENT, text)
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Scoring constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensionWeights {
    pub ratio_weight: f64,
    pub persistence_weight: f64,
    /// Added to the ratio denominator; pulls short transcripts toward zero.
    pub damping: f64,
}

impl Default for TensionWeights {
    fn default() -> Self {
        Self {
            ratio_weight: 0.6,
            persistence_weight: 0.4,
            damping: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TensionLabel {
    Minimal,
    Low,
    Medium,
    High,
    Maximum,
}

impl TensionLabel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Maximum
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else if score >= 0.2 {
            Self::Low
        } else {
            Self::Minimal
        }
    }
}

impl fmt::Display for TensionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Minimal => "MINIMAL",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Maximum => "MAXIMUM",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTension {
    pub round: u32,
    pub friction: u32,
    pub agreement: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensionScore {
    /// In `[0, 1]`, two decimals.
    pub score: f64,
    pub label: TensionLabel,
    pub friction_count: u32,
    pub agreement_count: u32,
    /// In `[0, 1]`, two decimals.
    pub friction_persistence: f64,
    pub per_round: Vec<RoundTension>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Score with the default weights.
pub fn score(rounds: &[RoundRecord]) -> TensionScore {
    score_with(rounds, &TensionWeights::default())
}

pub fn score_with(rounds: &[RoundRecord], weights: &TensionWeights) -> TensionScore {
    let per_round: Vec<RoundTension> = rounds
        .iter()
        .map(|r| {
            let text = format!("{} {}", r.agent_a_output, r.agent_b_output);
            RoundTension {
                round: r.round_number,
                friction: count_friction(&text),
                agreement: count_agreement(&text),
            }
        })
        .collect();

    let friction_count: u32 = per_round.iter().map(|r| r.friction).sum();
    let agreement_count: u32 = per_round.iter().map(|r| r.agreement).sum();

    let first = match per_round.first().map(|r| r.friction) {
        Some(0) | None => 1,
        Some(f) => f,
    };
    let last = per_round.last().map(|r| r.friction).unwrap_or(0);
    let persistence = (last as f64 / first as f64).min(1.0);

    let total_f = friction_count as f64;
    let raw_ratio = total_f / (total_f + agreement_count as f64 + weights.damping);
    let raw = raw_ratio * weights.ratio_weight + persistence * weights.persistence_weight;
    let score = round2(raw.clamp(0.0, 1.0));

    TensionScore {
        score,
        label: TensionLabel::from_score(score),
        friction_count,
        agreement_count,
        friction_persistence: round2(persistence),
        per_round,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rounds(texts: &[(&str, &str)]) -> Vec<RoundRecord> {
        texts
            .iter()
            .enumerate()
            .map(|(i, (a, b))| RoundRecord::new(i as u32 + 1, a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn markers_match_whole_words_case_insensitively() {
        assert_eq!(count_friction("However, BUT but"), 3);
        assert_eq!(count_friction("butter rebuttal"), 0);
        assert_eq!(count_friction("push back, pushback, push-back"), 3);
        assert_eq!(count_friction("this is not enough; we hold firm"), 2);
        assert_eq!(count_agreement("I agree. Indeed, you are right."), 3);
        assert_eq!(count_agreement("agreeable disagreement"), 0);
    }

    #[test]
    fn empty_history_is_minimal() {
        let score = score(&[]);
        assert_eq!(score.score, 0.0);
        assert_eq!(score.label, TensionLabel::Minimal);
        assert_eq!(score.friction_persistence, 0.0);
        assert!(score.per_round.is_empty());
    }

    #[test]
    fn pure_agreement_scores_below_medium() {
        let history = rounds(&[
            ("I agree and accept this.", "Exactly right."),
            ("We concur.", "I appreciate that; indeed valid."),
            ("I welcome it.", "Correct."),
        ]);
        let score = score(&history);
        assert_eq!(score.friction_count, 0);
        assert!(score.agreement_count > 0);
        assert!(score.score < 0.4);
    }

    #[test]
    fn persistent_friction_scores_high() {
        let hot = "However, I disagree and reject this. It is insufficient and problematic.";
        let history = rounds(&[(hot, hot), (hot, hot), (hot, hot)]);
        let score = score(&history);
        assert_eq!(score.friction_persistence, 1.0);
        assert!(score.score >= 0.6);
        assert!(score.label >= TensionLabel::High);
    }

    #[test]
    fn matches_reference_arithmetic() {
        // Round 1: F=2 A=1, round 2: F=1 A=1.
        let history = rounds(&[("but however", "agree"), ("without", "right")]);
        let score = score(&history);
        assert_eq!(score.friction_count, 3);
        assert_eq!(score.agreement_count, 2);
        // ratio 3/6 = 0.5, persistence 1/2 = 0.5 -> 0.3 + 0.2
        assert_eq!(score.score, 0.5);
        assert_eq!(score.friction_persistence, 0.5);
        assert_eq!(score.label, TensionLabel::Medium);
        assert_eq!(
            score.per_round,
            vec![
                RoundTension { round: 1, friction: 2, agreement: 1 },
                RoundTension { round: 2, friction: 1, agreement: 1 },
            ]
        );
    }

    #[test]
    fn zero_first_round_friction_divides_by_one() {
        let history = rounds(&[("agree", "accept"), ("but", "however")]);
        let score = score(&history);
        assert_eq!(score.friction_persistence, 1.0);
    }

    #[test]
    fn score_is_always_in_unit_interval() {
        let samples = [
            "", "but", "agree", "but but but but but but", "however agree reject accept",
        ];
        for a in samples {
            for b in samples {
                let s = score(&rounds(&[(a, b), (b, a), (a, a)]));
                assert!((0.0..=1.0).contains(&s.score), "{a:?}/{b:?} -> {}", s.score);
                assert!((0.0..=1.0).contains(&s.friction_persistence));
            }
        }
    }

    #[test]
    fn custom_weights_change_the_blend() {
        let history = rounds(&[("but", ""), ("but", "")]);
        let ratio_only = TensionWeights {
            ratio_weight: 1.0,
            persistence_weight: 0.0,
            damping: 0.0,
        };
        assert_eq!(score_with(&history, &ratio_only).score, 1.0);
    }

    #[test]
    fn label_thresholds() {
        assert_eq!(TensionLabel::from_score(0.8), TensionLabel::Maximum);
        assert_eq!(TensionLabel::from_score(0.79), TensionLabel::High);
        assert_eq!(TensionLabel::from_score(0.6), TensionLabel::High);
        assert_eq!(TensionLabel::from_score(0.4), TensionLabel::Medium);
        assert_eq!(TensionLabel::from_score(0.2), TensionLabel::Low);
        assert_eq!(TensionLabel::from_score(0.19), TensionLabel::Minimal);
    }
}
