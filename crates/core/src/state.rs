//! Derived progress state - computed fresh on every call, never persisted.

use serde::{Deserialize, Serialize};

use crate::id::{CourseId, TeacherId};
use crate::progress::ProgressStatus;
use crate::Time;

/// Sequence state of one module for one teacher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSequenceState {
    /// Active lessons the teacher has completed
    pub completed_content_count: u64,

    /// Active lessons in the module
    pub total_content_count: u64,

    /// completed / total * 100; 100.0 for an empty module
    pub completion_percentage: f64,

    /// Whether the module counts as completed
    pub is_completed: bool,

    /// Whether the module is locked by the previous module
    pub is_locked: bool,

    /// Fixed human-readable reason when locked
    pub lock_reason: Option<String>,
}

/// Sequence state of one content item for one teacher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSequenceState {
    /// Whether the lesson is locked
    pub is_locked: bool,

    /// Fixed human-readable reason when locked
    pub lock_reason: Option<String>,
}

impl ContentSequenceState {
    /// The neutral unlocked state.
    pub fn unlocked() -> Self {
        Self {
            is_locked: false,
            lock_reason: None,
        }
    }

    /// A locked state with the given reason.
    pub fn locked(reason: impl Into<String>) -> Self {
        Self {
            is_locked: true,
            lock_reason: Some(reason.into()),
        }
    }
}

/// Point-in-time completion summary for one (course, teacher) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseCompletionSnapshot {
    /// The course
    pub course_id: CourseId,

    /// The teacher
    pub teacher_id: TeacherId,

    /// Active lessons in the course
    pub total_content_count: u64,

    /// Active lessons the teacher has completed
    pub completed_content_count: u64,

    /// round(sum of record percentages / total, 2); 0.0 for an empty course
    pub progress_percentage: f64,

    /// Derived course-level status
    pub status: ProgressStatus,

    /// Whether any progress record exists for the pair
    pub has_activity: bool,

    /// Latest completion timestamp among completed lessons
    pub last_completed_at: Option<Time>,
}
