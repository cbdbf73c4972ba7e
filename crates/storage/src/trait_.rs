//! Storage trait abstractions.

use std::collections::HashMap;

use async_trait::async_trait;
use paceline_core::{
    ContentId, Course, CourseId, ProgressRecord, ProgressStatus, TeacherId, Time,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error
    #[cfg(feature = "sqlite")]
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Read/write access to the content catalog.
///
/// The catalog is read-only to the derivation engines; the write operations
/// exist for the ingestion/admin side of the system and for tests.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Save a course aggregate (create or update, modules and lessons included).
    async fn save_course(&mut self, course: &Course) -> Result<()>;

    /// Load a course by ID.
    async fn load_course(&self, id: CourseId) -> Result<Option<Course>>;

    /// List all courses.
    async fn list_courses(&self) -> Result<Vec<Course>>;

    /// Delete a course.
    async fn delete_course(&mut self, id: CourseId) -> Result<()>;

    /// Count of active content items under active modules, grouped by
    /// course. Courses with no active content are absent from the map.
    async fn count_active_content(
        &self,
        course_ids: &[CourseId],
    ) -> Result<HashMap<CourseId, u64>>;
}

/// Read/write access to progress records.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Upsert a progress record. At most one record exists per
    /// (teacher, content item); a second write for the same pair replaces
    /// the first.
    async fn record_progress(&mut self, record: &ProgressRecord) -> Result<()>;

    /// Load the record for one (teacher, content item) pair.
    async fn load_progress(
        &self,
        teacher_id: TeacherId,
        content_id: ContentId,
    ) -> Result<Option<ProgressRecord>>;

    /// Status per content item for one teacher across one course. Items
    /// without a record are simply absent.
    async fn progress_statuses(
        &self,
        teacher_id: TeacherId,
        course_id: CourseId,
    ) -> Result<HashMap<ContentId, ProgressStatus>>;

    /// Grouped aggregation over progress records per (course, teacher),
    /// restricted to the given courses (and teachers, when provided) and
    /// to content items that are still active under active modules.
    ///
    /// Only pairs with at least one record produce a row.
    async fn aggregate_progress(
        &self,
        course_ids: &[CourseId],
        teacher_ids: Option<&[TeacherId]>,
    ) -> Result<Vec<ProgressAggregateRow>>;
}

/// One grouped-aggregation row for a (course, teacher) pair with activity.
///
/// Keys are string-normalized identifiers: the aggregation may run in SQL
/// where ids are TEXT columns, so mapping back to typed identifiers is the
/// caller's job (the completion aggregator keeps an explicit lookup table
/// for this).
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressAggregateRow {
    /// String-normalized course id
    pub course_key: String,

    /// String-normalized teacher id
    pub teacher_key: String,

    /// Number of progress records for the pair
    pub activity_count: u64,

    /// Records with status Completed
    pub completed_content_count: u64,

    /// Sum of progress percentages over all records, 0 when none
    pub progress_sum: f64,

    /// Max completed_at among Completed records
    pub last_completed_at: Option<Time>,
}
