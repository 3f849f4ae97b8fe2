//! Core types for bookgen-client

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Candidate titles keyed by language code (e.g. "en"), one ordered sequence per language
pub type TitlesByLanguage = BTreeMap<String, Vec<String>>;

/// Per-item metadata reported with a completed job, kept as the server sent it
pub type ResultMetadata = serde_json::Value;

/// Opaque identifier of a generation job, as issued by the backend
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new JobId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse job status, as carried by the `status` field of a progress frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    /// Accepted, not started
    #[default]
    Pending,
    /// Generating
    Running,
    /// All items generated
    Completed,
    /// Generation failed
    Failed,
}

impl JobPhase {
    /// Whether no further progress is expected
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed)
    }

    /// Short display label
    pub fn label(&self) -> &'static str {
        match self {
            JobPhase::Pending => "Pending",
            JobPhase::Running => "In Progress",
            JobPhase::Completed => "Completed",
            JobPhase::Failed => "Failed",
        }
    }
}

impl std::str::FromStr for JobPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobPhase::Pending),
            "running" => Ok(JobPhase::Running),
            "completed" => Ok(JobPhase::Completed),
            "failed" => Ok(JobPhase::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Job status carried by a progress frame
///
/// Results only exist once the job completed.
#[derive(Clone, Debug, PartialEq)]
pub enum JobStatus {
    /// Accepted, not started
    Pending,
    /// Generating
    Running,
    /// All items generated
    Completed {
        /// Generated item title → metadata (empty when the server omitted it)
        results: BTreeMap<String, ResultMetadata>,
    },
    /// Generation failed
    Failed,
}

impl JobStatus {
    /// The coarse phase of this status
    pub fn phase(&self) -> JobPhase {
        match self {
            JobStatus::Pending => JobPhase::Pending,
            JobStatus::Running => JobPhase::Running,
            JobStatus::Completed { .. } => JobPhase::Completed,
            JobStatus::Failed => JobPhase::Failed,
        }
    }

    /// Whether no further progress is expected
    pub fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }
}

/// One decoded progress frame
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressUpdate {
    /// Job status, including results on completion
    pub status: JobStatus,
    /// Items generated so far
    pub completed: u64,
    /// Items requested
    pub total: u64,
    /// Items still to generate
    pub remaining: u64,
}

impl ProgressUpdate {
    /// Rounded completion percentage (0 when the total is unknown)
    pub fn percent(&self) -> u8 {
        percent(self.completed, self.total)
    }
}

pub(crate) fn percent(completed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (completed as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Snapshot of the tracked generation job
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationJob {
    /// Backend job identifier
    pub job_id: JobId,
    /// Book the bonuses are generated for
    pub book_title: String,
    /// Latest known status
    pub status: JobPhase,
    /// Items generated so far
    pub completed: u64,
    /// Items requested
    pub total: u64,
    /// Items still to generate
    pub remaining: u64,
    /// Generated item title → metadata, filled on completion
    pub results: BTreeMap<String, ResultMetadata>,
    /// Last failure message shown for this job (stream or download)
    pub error: Option<String>,
    /// Whether a status subscription is still expected to deliver updates
    pub tracking: bool,
    /// Whether at least one progress frame was received
    pub has_progress: bool,
}

impl GenerationJob {
    /// A freshly started job with no progress yet
    pub fn new(job_id: JobId, book_title: impl Into<String>) -> Self {
        Self {
            job_id,
            book_title: book_title.into(),
            status: JobPhase::Pending,
            completed: 0,
            total: 0,
            remaining: 0,
            results: BTreeMap::new(),
            error: None,
            tracking: true,
            has_progress: false,
        }
    }

    /// Fold a progress frame into the snapshot
    pub fn apply(&mut self, update: &ProgressUpdate) {
        self.status = update.status.phase();
        self.completed = update.completed;
        self.total = update.total;
        self.remaining = update.remaining;
        if let JobStatus::Completed { results } = &update.status {
            self.results = results.clone();
        }
        if self.status.is_terminal() {
            self.tracking = false;
        }
        self.has_progress = true;
        self.error = None;
    }

    /// Rounded completion percentage
    pub fn percent(&self) -> u8 {
        percent(self.completed, self.total)
    }
}

/// Format of a single generated file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// PDF document
    Pdf,
    /// Word document
    Docx,
}

impl FileKind {
    /// Value of the `file_type` query parameter, also used as the file extension
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Docx => "docx",
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A past generation run, as listed by the history endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Backend job identifier
    pub job_id: JobId,
    /// Book the bonuses were generated for
    pub book_title: String,
    /// Creation timestamp as sent by the server
    #[serde(default)]
    pub created_at: Option<String>,
    /// Number of generated bonuses
    #[serde(default)]
    pub total_bonuses: u64,
    /// Titles of the generated bonuses
    #[serde(default)]
    pub bonus_titles: Vec<String>,
}

/// Notifications broadcast by [`crate::job::JobCoordinator`]
#[derive(Clone, Debug, PartialEq)]
pub enum JobEvent {
    /// A job id was recorded and its status subscription opened
    Started {
        /// Backend job identifier
        job_id: JobId,
    },
    /// Non-terminal progress frame
    Progress {
        /// Backend job identifier
        job_id: JobId,
        /// Items generated so far
        completed: u64,
        /// Items requested
        total: u64,
    },
    /// The job finished successfully
    Completed {
        /// Backend job identifier
        job_id: JobId,
        /// Number of generated items
        result_count: usize,
    },
    /// The backend reported the job as failed
    Failed {
        /// Backend job identifier
        job_id: JobId,
    },
    /// The stream or a download reported an error
    Errored {
        /// Backend job identifier
        job_id: JobId,
        /// Message shown to the user
        message: String,
    },
    /// The status stream closed before the job reached a terminal status
    StreamEnded {
        /// Backend job identifier
        job_id: JobId,
    },
}
