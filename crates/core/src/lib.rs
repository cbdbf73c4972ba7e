//! paceline core data models.
//!
//! This crate defines the catalog entities (courses, modules, lessons),
//! the per-teacher progress records, and the derived sequence/completion
//! state types consumed by dashboard and course-detail callers.

#![warn(missing_docs)]

// Core identities
mod id;

// Content catalog
mod course;

// Progress tracking
mod progress;
mod state;

// Re-exports
pub use id::*;

// Catalog
pub use course::{ContentItem, ContentKind, Course, CourseModule, ParseKindError};

// Progress
pub use progress::{InvalidPercentage, ParseStatusError, ProgressRecord, ProgressStatus};

// Derived state
pub use state::{ContentSequenceState, CourseCompletionSnapshot, ModuleSequenceState};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
