//! Parallel vs. sequential timing comparison.

use serde::{Deserialize, Serialize};

use crate::report::RunReport;

/// Timing of one phase under both schedules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpeedup {
    pub phase: String,
    pub parallel_ms: u64,
    pub sequential_ms: u64,
}

impl PhaseSpeedup {
    /// `sequential / parallel`; `None` when the parallel run took 0 ms.
    pub fn speedup(&self) -> Option<f64> {
        ratio(self.sequential_ms, self.parallel_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeComparison {
    pub parallel: RunReport,
    pub sequential: RunReport,
}

impl ModeComparison {
    pub fn new(parallel: RunReport, sequential: RunReport) -> Self {
        Self {
            parallel,
            sequential,
        }
    }

    /// One row per round, then synthesis and stress test. The stress test
    /// row is present only when both runs timed one.
    pub fn phases(&self) -> Vec<PhaseSpeedup> {
        let (p, s) = (&self.parallel.timings, &self.sequential.timings);
        let mut rows: Vec<PhaseSpeedup> = p
            .rounds_ms
            .iter()
            .zip(&s.rounds_ms)
            .enumerate()
            .map(|(i, (&par, &seq))| PhaseSpeedup {
                phase: if i == 0 {
                    "round 1 (opening)".to_string()
                } else {
                    format!("round {}", i + 1)
                },
                parallel_ms: par,
                sequential_ms: seq,
            })
            .collect();

        rows.push(PhaseSpeedup {
            phase: "synthesis".to_string(),
            parallel_ms: p.synthesis_ms,
            sequential_ms: s.synthesis_ms,
        });
        if let (Some(par), Some(seq)) = (p.stress_test_ms, s.stress_test_ms) {
            rows.push(PhaseSpeedup {
                phase: "stress test".to_string(),
                parallel_ms: par,
                sequential_ms: seq,
            });
        }
        rows
    }

    pub fn total_speedup(&self) -> Option<f64> {
        ratio(
            self.sequential.timings.total_ms,
            self.parallel.timings.total_ms,
        )
    }

    /// Wall-clock time saved by the parallel schedule. Negative when the
    /// parallel run was slower.
    pub fn savings_ms(&self) -> i64 {
        self.sequential.timings.total_ms as i64 - self.parallel.timings.total_ms as i64
    }
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speedup_is_sequential_over_parallel() {
        let row = PhaseSpeedup {
            phase: "round 2".into(),
            parallel_ms: 100,
            sequential_ms: 190,
        };
        assert!((row.speedup().unwrap() - 1.9).abs() < 1e-9);
    }

    #[test]
    fn zero_parallel_time_has_no_speedup() {
        assert_eq!(ratio(10, 0), None);
    }
}
