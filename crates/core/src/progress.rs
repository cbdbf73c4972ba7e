//! Progress records - per-teacher, per-lesson completion state.

use serde::{Deserialize, Serialize};

use crate::id::{ContentId, CourseId, ProgressRecordId, TeacherId};
use crate::Time;

/// Completion state of one (teacher, content item) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    /// No interaction recorded yet
    NotStarted,
    /// Started but not finished
    InProgress,
    /// Finished
    Completed,
}

impl ProgressStatus {
    /// Canonical string form, used as the SQL column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not_started",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProgressStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(ProgressStatus::NotStarted),
            "in_progress" => Ok(ProgressStatus::InProgress),
            "completed" => Ok(ProgressStatus::Completed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Error for an unrecognized progress status string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown progress status: {0}")]
pub struct ParseStatusError(pub String);

/// Error for a progress percentage outside the 0-100 range.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("progress percentage out of range: {0}")]
pub struct InvalidPercentage(pub f64);

/// One row per (teacher, content item) interaction.
///
/// Created on first interaction, updated on subsequent interaction, never
/// deleted by the progress core. At most one record exists per
/// (teacher, content item); the stores enforce this on write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Unique identifier
    pub id: ProgressRecordId,

    /// The learning teacher
    pub teacher_id: TeacherId,

    /// Course the content item belongs to
    pub course_id: CourseId,

    /// The content item interacted with
    pub content_id: ContentId,

    /// Current status
    pub status: ProgressStatus,

    /// Progress through the lesson, 0-100
    pub progress_percentage: f64,

    /// When the lesson was completed
    pub completed_at: Option<Time>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl ProgressRecord {
    /// Create a fresh record for a first interaction.
    pub fn new(teacher_id: TeacherId, course_id: CourseId, content_id: ContentId) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: ProgressRecordId::new(),
            teacher_id,
            course_id,
            content_id,
            status: ProgressStatus::NotStarted,
            progress_percentage: 0.0,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record partial progress. Moves the record to `InProgress` unless it
    /// is already `Completed`.
    pub fn touch(&mut self, percentage: f64) -> Result<(), InvalidPercentage> {
        if !(0.0..=100.0).contains(&percentage) {
            return Err(InvalidPercentage(percentage));
        }
        if self.status != ProgressStatus::Completed {
            self.status = ProgressStatus::InProgress;
            self.progress_percentage = percentage;
        }
        self.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// Mark the lesson completed.
    pub fn complete(&mut self) {
        let now = chrono::Utc::now();
        self.status = ProgressStatus::Completed;
        self.progress_percentage = 100.0;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Whether the record counts toward completion totals.
    pub fn is_completed(&self) -> bool {
        self.status == ProgressStatus::Completed
    }
}
