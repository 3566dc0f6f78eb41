//! Position summarizer: what one agent is allowed to see of the other.
//!
//! Keeps the opening lines, where models put their claims, and drops the
//! elaboration.

use serde::{Deserialize, Serialize};

const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryLimits {
    pub max_lines: usize,
    /// Characters, not bytes.
    pub max_chars: usize,
}

impl Default for SummaryLimits {
    fn default() -> Self {
        Self {
            max_lines: 8,
            max_chars: 600,
        }
    }
}

/// Summarize with the default limits.
pub fn summarize(raw: &str) -> String {
    summarize_with(raw, &SummaryLimits::default())
}

/// First `max_lines` non-blank lines, then a hard cap of `max_chars`
/// characters ending in `...` when cut.
pub fn summarize_with(raw: &str, limits: &SummaryLimits) -> String {
    let summary = raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(limits.max_lines)
        .collect::<Vec<_>>()
        .join("\n");

    if summary.chars().count() <= limits.max_chars {
        return summary;
    }

    let keep = limits.max_chars.saturating_sub(ELLIPSIS.len());
    let mut cut: String = summary.chars().take(keep).collect();
    cut.push_str(ELLIPSIS);
    cut
}
