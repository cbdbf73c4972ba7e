//! Progress derivation engines.
//!
//! Sequence locking (which modules and lessons a teacher may open) and
//! completion aggregation (per-(course, teacher) snapshots), plus the
//! combined course-overview view. Both engines are read-only, stateless
//! across calls, and degrade to empty/zero results on missing data.

#![warn(missing_docs)]

pub mod aggregator;
pub mod overview;
pub mod sequence;

pub use aggregator::CompletionAggregator;
pub use overview::{ContentOverview, CourseOverview, ModuleOverview, ProgressService};
pub use sequence::{
    CourseSequenceState, SequenceEngine, CONTENT_LOCK_REASON, MODULE_LOCK_REASON,
};
