use serde::{Deserialize, Serialize};

use crate::stimulus::StimulusKind;

/// Recorded result of one trial.
///
/// A trial emits one row per press during its acceptance window plus one
/// synthetic row if the window closes unanswered; `reaction_time_ms == None`
/// marks the synthetic case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub block: u32,
    /// 1-based trial number within the block.
    pub trial: u32,
    pub kind: StimulusKind,
    /// Milliseconds from stimulus onset, rounded to two decimals.
    pub reaction_time_ms: Option<f64>,
    pub correct: bool,
}

impl TrialOutcome {
    /// The objective target flag logged alongside correctness.
    pub fn is_target(&self) -> bool {
        self.kind.is_target()
    }
}

/// End-of-block subjective count reported by the participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub block: u32,
    pub reported_targets: u32,
}

/// One entry of the session log. Summary rows are tagged distinctly and
/// excluded from per-trial accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "row", rename_all = "lowercase")]
pub enum LogRow {
    Trial(TrialOutcome),
    Summary(BlockSummary),
}

impl LogRow {
    pub fn is_summary(&self) -> bool {
        matches!(self, LogRow::Summary(_))
    }
}

/// Rounds milliseconds to the log's two-decimal reaction-time precision.
pub fn round2(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_matches_log_precision() {
        assert_eq!(round2(120.0), 120.0);
        assert_eq!(round2(333.333_33), 333.33);
        assert_eq!(round2(99.995), 100.0);
        assert_eq!(round2(0.004), 0.0);
    }

    #[test]
    fn summary_rows_are_distinct() {
        let trial = LogRow::Trial(TrialOutcome {
            block: 1,
            trial: 1,
            kind: StimulusKind::Standard,
            reaction_time_ms: None,
            correct: true,
        });
        let summary = LogRow::Summary(BlockSummary {
            block: 1,
            reported_targets: 4,
        });
        assert!(!trial.is_summary());
        assert!(summary.is_summary());
    }
}
