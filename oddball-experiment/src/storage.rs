use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;
use oddball_core::{BlockSummary, LogRow, TrialOutcome};
use serde::Serialize;
use thiserror::Error;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::config::SessionConfig;

/// Fixed column order of the session CSV.
pub const CSV_COLUMNS: [&str; 7] = [
    "block",
    "trial",
    "stim_type",
    "reaction_time",
    "correct",
    "target",
    "reported_targets",
];

#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to write session log: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize session metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only session log, buffered in memory for the whole session and
/// written to disk exactly once at the end.
#[derive(Debug, Default, Clone)]
pub struct SessionLog {
    rows: Vec<LogRow>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_trial(&mut self, outcome: TrialOutcome) {
        self.rows.push(LogRow::Trial(outcome));
    }

    pub fn append_summary(&mut self, summary: BlockSummary) {
        self.rows.push(LogRow::Summary(summary));
    }

    pub fn rows(&self) -> &[LogRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of per-trial rows, summaries excluded.
    pub fn trial_count(&self) -> usize {
        self.rows.iter().filter(|r| !r.is_summary()).count()
    }

    /// Renders the whole log in insertion order. Reaction times carry two
    /// decimals; a missing response leaves the field empty.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str(&CSV_COLUMNS.join(","));
        csv.push('\n');

        for row in &self.rows {
            let fields: [String; 7] = match row {
                LogRow::Trial(t) => [
                    t.block.to_string(),
                    t.trial.to_string(),
                    t.kind.label().to_string(),
                    t.reaction_time_ms
                        .map(|rt| format!("{rt:.2}"))
                        .unwrap_or_default(),
                    u8::from(t.correct).to_string(),
                    u8::from(t.is_target()).to_string(),
                    String::new(),
                ],
                LogRow::Summary(s) => [
                    s.block.to_string(),
                    "summary".to_string(),
                    "target_count".to_string(),
                    String::new(),
                    String::new(),
                    String::new(),
                    s.reported_targets.to_string(),
                ],
            };
            let line = fields
                .iter()
                .map(|f| escape_csv(f))
                .collect::<Vec<_>>()
                .join(",");
            csv.push_str(&line);
            csv.push('\n');
        }

        csv
    }

    pub fn write_csv<W: Write>(&self, mut sink: W) -> Result<(), LogError> {
        sink.write_all(self.to_csv().as_bytes())?;
        Ok(())
    }
}

fn escape_csv(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    let needs_quotes = value.contains(',') || value.contains('"') || value.contains('\n');
    if needs_quotes {
        let escaped = value.replace('"', "\"\"");
        format!("\"{escaped}\"")
    } else {
        value.to_string()
    }
}

fn timestamp_slug() -> String {
    OffsetDateTime::now_utc()
        .format(&format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .unwrap_or_else(|_| "session".into())
}

fn sanitize_participant(name: &str) -> String {
    let cleaned: String = name.chars().filter(char::is_ascii_alphanumeric).collect();
    if cleaned.is_empty() {
        "anonymous".into()
    } else {
        cleaned
    }
}

/// `oddball_log_<participant>_<timestamp>`, with an `_aborted` marker when
/// the session did not run to completion.
pub fn session_basename(participant: &str, aborted: bool) -> String {
    let suffix = if aborted { "_aborted" } else { "" };
    format!(
        "oddball_log_{}_{}{suffix}",
        sanitize_participant(participant),
        timestamp_slug()
    )
}

#[derive(Debug, Serialize)]
struct SessionMeta<'a> {
    participant: &'a str,
    aborted: bool,
    rows: usize,
    config: &'a SessionConfig,
}

/// Writes the CSV log plus a JSON metadata sidecar into `dir` and returns
/// the CSV path. The log is rendered in full before anything touches disk;
/// sink failures propagate untouched.
pub fn flush_session(
    log: &SessionLog,
    config: &SessionConfig,
    dir: &Path,
    aborted: bool,
) -> Result<PathBuf, LogError> {
    let base = session_basename(&config.participant, aborted);
    let csv_path = dir.join(format!("{base}.csv"));
    fs::write(&csv_path, log.to_csv())?;

    let meta = SessionMeta {
        participant: &config.participant,
        aborted,
        rows: log.rows().len(),
        config,
    };
    fs::write(
        dir.join(format!("{base}.json")),
        serde_json::to_string_pretty(&meta)?,
    )?;

    info!(
        "session log written: {} ({} rows{})",
        csv_path.display(),
        log.rows().len(),
        if aborted { ", aborted" } else { "" }
    );
    Ok(csv_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oddball_core::StimulusKind;

    fn sample_log() -> SessionLog {
        let mut log = SessionLog::new();
        log.append_trial(TrialOutcome {
            block: 1,
            trial: 1,
            kind: StimulusKind::Standard,
            reaction_time_ms: None,
            correct: true,
        });
        log.append_trial(TrialOutcome {
            block: 1,
            trial: 2,
            kind: StimulusKind::Target,
            reaction_time_ms: Some(120.0),
            correct: true,
        });
        log.append_summary(BlockSummary {
            block: 1,
            reported_targets: 4,
        });
        log
    }

    #[test]
    fn csv_has_fixed_header_and_field_order() {
        let csv = sample_log().to_csv();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("block,trial,stim_type,reaction_time,correct,target,reported_targets")
        );
        assert_eq!(lines.next(), Some("1,1,standard,,1,0,"));
        assert_eq!(lines.next(), Some("1,2,target,120.00,1,1,"));
        assert_eq!(lines.next(), Some("1,summary,target_count,,,,4"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn reaction_times_carry_two_decimals() {
        let mut log = SessionLog::new();
        log.append_trial(TrialOutcome {
            block: 2,
            trial: 7,
            kind: StimulusKind::Target,
            reaction_time_ms: Some(333.33),
            correct: false,
        });
        assert!(log.to_csv().contains("2,7,target,333.33,0,1,"));
    }

    #[test]
    fn rows_are_never_reordered_or_deduplicated() {
        let mut log = SessionLog::new();
        for _ in 0..2 {
            log.append_trial(TrialOutcome {
                block: 1,
                trial: 3,
                kind: StimulusKind::Standard,
                reaction_time_ms: Some(80.0),
                correct: false,
            });
        }
        assert_eq!(log.trial_count(), 2);
        assert_eq!(log.to_csv().matches("1,3,standard,80.00,0,0,").count(), 2);
    }

    #[test]
    fn escape_quotes_commas_and_newlines() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv(""), "");
    }

    #[test]
    fn participant_names_are_sanitized_for_filenames() {
        assert_eq!(sanitize_participant("Ada L."), "AdaL");
        assert_eq!(sanitize_participant("../../etc"), "etc");
        assert_eq!(sanitize_participant("!!"), "anonymous");
    }

    #[test]
    fn basename_marks_aborted_sessions() {
        let base = session_basename("ada", true);
        assert!(base.starts_with("oddball_log_ada_"));
        assert!(base.ends_with("_aborted"));
        assert!(!session_basename("ada", false).contains("aborted"));
    }

    #[test]
    fn flush_writes_csv_and_metadata_sidecar() {
        let dir = std::env::temp_dir().join(format!("oddball-flush-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let config = SessionConfig {
            participant: "tester".into(),
            ..SessionConfig::default()
        };
        let csv_path = flush_session(&sample_log(), &config, &dir, false).unwrap();
        assert!(csv_path.exists());

        let json_path = csv_path.with_extension("json");
        assert!(json_path.exists());
        let meta: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(meta["participant"], "tester");
        assert_eq!(meta["aborted"], false);
        assert_eq!(meta["rows"], 3);

        std::fs::remove_dir_all(&dir).ok();
    }
}
