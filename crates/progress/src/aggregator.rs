//! Completion aggregation.
//!
//! Builds per-(course, teacher) completion snapshots from grouped
//! progress-record aggregates. The stores hand back string-normalized
//! identifier keys (the aggregation may run as SQL over TEXT columns);
//! an explicit lookup table built once per call maps them back to the
//! typed identifiers supplied by the caller.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use paceline_core::{CourseCompletionSnapshot, CourseId, ProgressStatus, TeacherId};
use paceline_storage::{CatalogStore, ProgressAggregateRow, ProgressStore, Result};
use tracing::debug;

/// Builds completion snapshots for dashboard and report callers.
///
/// Read-only and stateless across calls.
pub struct CompletionAggregator {
    catalog: Arc<dyn CatalogStore>,
    progress: Arc<dyn ProgressStore>,
}

/// Bidirectional lookup between string-normalized keys and the caller's
/// typed identifiers, built once per call. String equality is never the
/// source of truth for identity: rows that do not resolve through the
/// table (or parse, for activity-derived teachers) are dropped.
struct KeyTable {
    courses: HashMap<String, CourseId>,
    teachers: HashMap<String, TeacherId>,
}

impl KeyTable {
    fn new(course_ids: &[CourseId], teacher_ids: Option<&[TeacherId]>) -> Self {
        Self {
            courses: course_ids.iter().map(|id| (id.to_string(), *id)).collect(),
            teachers: teacher_ids
                .unwrap_or_default()
                .iter()
                .map(|id| (id.to_string(), *id))
                .collect(),
        }
    }

    fn course(&self, key: &str) -> Option<CourseId> {
        self.courses.get(key).copied()
    }

    /// Resolve a teacher key: the supplied identifier when known, a parsed
    /// one for activity-derived rows.
    fn teacher(&self, key: &str) -> Option<TeacherId> {
        self.teachers
            .get(key)
            .copied()
            .or_else(|| key.parse().ok())
    }
}

impl CompletionAggregator {
    /// Create a new completion aggregator.
    pub fn new(catalog: Arc<dyn CatalogStore>, progress: Arc<dyn ProgressStore>) -> Self {
        Self { catalog, progress }
    }

    /// Build completion snapshots per (course, teacher) pair.
    ///
    /// With `teacher_ids` supplied, every requested pair appears - the
    /// full cross product, zero-activity pairs included. Without it, only
    /// pairs that have at least one progress record appear. The two shapes
    /// are deliberately different: an empty `teacher_ids` slice is an
    /// empty cross product and yields an empty map, not "all teachers".
    ///
    /// Unknown course or teacher ids simply produce zero-valued snapshots
    /// (or nothing); this is a read-side derivation layer and never fails
    /// on missing data.
    pub async fn build_teacher_course_snapshots(
        &self,
        course_ids: &[CourseId],
        teacher_ids: Option<&[TeacherId]>,
    ) -> Result<BTreeMap<(CourseId, TeacherId), CourseCompletionSnapshot>> {
        // Dedup while keeping first occurrence.
        let mut seen = HashSet::new();
        let courses: Vec<CourseId> = course_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let totals = self.catalog.count_active_content(&courses).await?;
        let rows = self
            .progress
            .aggregate_progress(&courses, teacher_ids)
            .await?;
        debug!(courses = courses.len(), rows = rows.len(), "building completion snapshots");

        let table = KeyTable::new(&courses, teacher_ids);
        let mut aggregates: HashMap<(CourseId, TeacherId), ProgressAggregateRow> = HashMap::new();
        for row in rows {
            let Some(course_id) = table.course(&row.course_key) else {
                continue;
            };
            let Some(teacher_id) = table.teacher(&row.teacher_key) else {
                continue;
            };
            aggregates.insert((course_id, teacher_id), row);
        }

        let mut snapshots = BTreeMap::new();
        match teacher_ids {
            Some(teachers) => {
                for &course_id in &courses {
                    let total = totals.get(&course_id).copied().unwrap_or(0);
                    for &teacher_id in teachers {
                        let row = aggregates.get(&(course_id, teacher_id));
                        snapshots.insert(
                            (course_id, teacher_id),
                            assemble_snapshot(course_id, teacher_id, total, row),
                        );
                    }
                }
            }
            None => {
                for ((course_id, teacher_id), row) in &aggregates {
                    let total = totals.get(course_id).copied().unwrap_or(0);
                    snapshots.insert(
                        (*course_id, *teacher_id),
                        assemble_snapshot(*course_id, *teacher_id, total, Some(row)),
                    );
                }
            }
        }

        Ok(snapshots)
    }

    /// The supplied teacher ids whose snapshot status for the course is
    /// Completed, in their supplied order and as the original values.
    pub async fn completed_teacher_ids_for_course(
        &self,
        course_id: CourseId,
        teacher_ids: &[TeacherId],
    ) -> Result<Vec<TeacherId>> {
        let snapshots = self
            .build_teacher_course_snapshots(&[course_id], Some(teacher_ids))
            .await?;
        Ok(teacher_ids
            .iter()
            .copied()
            .filter(|teacher_id| {
                snapshots
                    .get(&(course_id, *teacher_id))
                    .map(|s| s.status == ProgressStatus::Completed)
                    .unwrap_or(false)
            })
            .collect())
    }
}

fn assemble_snapshot(
    course_id: CourseId,
    teacher_id: TeacherId,
    total: u64,
    row: Option<&ProgressAggregateRow>,
) -> CourseCompletionSnapshot {
    let activity = row.map(|r| r.activity_count).unwrap_or(0);
    let completed = row.map(|r| r.completed_content_count).unwrap_or(0);
    let progress_sum = row.map(|r| r.progress_sum).unwrap_or(0.0);
    let last_completed_at = row.and_then(|r| r.last_completed_at);

    let status = if total > 0 && completed >= total {
        ProgressStatus::Completed
    } else if activity > 0 {
        ProgressStatus::InProgress
    } else {
        ProgressStatus::NotStarted
    };
    let progress_percentage = if total == 0 {
        0.0
    } else {
        round2(progress_sum / total as f64)
    };

    CourseCompletionSnapshot {
        course_id,
        teacher_id,
        total_content_count: total,
        completed_content_count: completed,
        progress_percentage,
        status,
        has_activity: activity > 0,
        last_completed_at,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
