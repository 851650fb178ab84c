use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::describe::Resolution;
use crate::fingerprint::Fingerprint;
use crate::media::MediaKind;

/// Where in the per-file sequence a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Read,
    Gate,
    Inspect,
    Ladder,
    Publish,
    Commit,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Read => "read",
            PipelineStep::Gate => "gate",
            PipelineStep::Inspect => "inspect",
            PipelineStep::Ladder => "ladder",
            PipelineStep::Publish => "publish",
            PipelineStep::Commit => "commit",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    /// A completion flag already existed.
    Skipped,
    Unsupported,
    Completed {
        kind: MediaKind,
        resolution: Resolution,
        artifacts: Vec<PathBuf>,
        /// Description record and, for images, the HTML page.
        pages: Vec<PathBuf>,
    },
    Failed {
        step: PipelineStep,
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub fingerprint: Option<Fingerprint>,
    #[serde(flatten)]
    pub status: FileStatus,
    pub finished_at: DateTime<Utc>,
}

impl FileOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, FileStatus::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, FileStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub discovered: usize,
    pub completed: usize,
    pub skipped: usize,
    pub unsupported: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: BatchSummary,
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn from_outcomes(started_at: DateTime<Utc>, outcomes: Vec<FileOutcome>) -> Self {
        let mut summary = BatchSummary {
            discovered: outcomes.len(),
            ..BatchSummary::default()
        };
        for outcome in &outcomes {
            match outcome.status {
                FileStatus::Skipped => summary.skipped += 1,
                FileStatus::Unsupported => summary.unsupported += 1,
                FileStatus::Completed { .. } => summary.completed += 1,
                FileStatus::Failed { .. } => summary.failed += 1,
            }
        }
        Self {
            started_at,
            finished_at: Utc::now(),
            summary,
            outcomes,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: FileStatus) -> FileOutcome {
        FileOutcome {
            path: PathBuf::from("in/x.jpg"),
            fingerprint: None,
            status,
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn summary_counts_each_status() {
        let report = BatchReport::from_outcomes(
            Utc::now(),
            vec![
                outcome(FileStatus::Skipped),
                outcome(FileStatus::Unsupported),
                outcome(FileStatus::Failed {
                    step: PipelineStep::Ladder,
                    error: "boom".to_string(),
                }),
                outcome(FileStatus::Skipped),
            ],
        );
        assert_eq!(
            report.summary,
            BatchSummary {
                discovered: 4,
                completed: 0,
                skipped: 2,
                unsupported: 1,
                failed: 1,
            }
        );
        assert!(report.has_failures());
    }

    #[test]
    fn failed_outcome_serializes_step() {
        let value = serde_json::to_value(outcome(FileStatus::Failed {
            step: PipelineStep::Inspect,
            error: "no video stream".to_string(),
        }))
        .unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["step"], "inspect");
        assert_eq!(value["path"], "in/x.jpg");
    }
}
