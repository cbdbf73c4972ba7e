//! Sequence-lock engine.
//!
//! Computes which modules and which lessons within each module are
//! unlocked for a teacher, under strict linear completion order: module
//! N+1 opens when module N is completed, lesson K+1 opens when lesson K
//! is completed. A module with no active lessons is vacuously complete
//! and never blocks its successor.

use std::collections::HashMap;
use std::sync::Arc;

use paceline_core::{
    ContentId, ContentSequenceState, Course, ModuleId, ModuleSequenceState, ProgressStatus,
    TeacherId,
};
use paceline_storage::{ProgressStore, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Reason shown for a module locked behind its predecessor, inherited by
/// every lesson in it.
pub const MODULE_LOCK_REASON: &str = "Complete the previous module to unlock this one.";

/// Reason shown for a lesson locked behind its predecessor.
pub const CONTENT_LOCK_REASON: &str = "Complete the previous lesson to unlock this one.";

/// Sequence state of every active module and lesson of a course for one
/// teacher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseSequenceState {
    /// Module state by module id
    pub module_states: HashMap<ModuleId, ModuleSequenceState>,

    /// Lesson state by content id
    pub content_states: HashMap<ContentId, ContentSequenceState>,
}

/// Derives lock state from the teacher's progress records.
///
/// Read-only and stateless across calls; every computation fetches the
/// teacher's statuses once and derives the rest in memory.
pub struct SequenceEngine {
    progress: Arc<dyn ProgressStore>,
}

impl SequenceEngine {
    /// Create a new sequence engine.
    pub fn new(progress: Arc<dyn ProgressStore>) -> Self {
        Self { progress }
    }

    /// Compute the sequence state of a whole course for one teacher.
    ///
    /// Content items without a progress record count as not started.
    pub async fn course_sequence_state(
        &self,
        course: &Course,
        teacher_id: TeacherId,
    ) -> Result<CourseSequenceState> {
        let statuses = self
            .progress
            .progress_statuses(teacher_id, course.id)
            .await?;
        debug!(course = %course.id, teacher = %teacher_id, records = statuses.len(),
            "computing sequence state");
        Ok(derive_sequence_state(course, &statuses))
    }

    /// Lock state of a single lesson.
    ///
    /// Recomputes the whole course: locking is sequential and cumulative,
    /// so there is no per-item shortcut. A content id that is not part of
    /// the course yields the neutral unlocked state.
    pub async fn content_lock_state(
        &self,
        course: &Course,
        content_id: ContentId,
        teacher_id: TeacherId,
    ) -> Result<ContentSequenceState> {
        let state = self.course_sequence_state(course, teacher_id).await?;
        Ok(state
            .content_states
            .get(&content_id)
            .cloned()
            .unwrap_or_else(ContentSequenceState::unlocked))
    }
}

/// One ordered pass over the active modules and lessons.
fn derive_sequence_state(
    course: &Course,
    statuses: &HashMap<ContentId, ProgressStatus>,
) -> CourseSequenceState {
    let mut state = CourseSequenceState::default();

    // The first module is always eligible.
    let mut previous_module_completed = true;

    for module in course.active_modules() {
        let contents = module.active_contents();
        let total = contents.len() as u64;
        let completed = contents
            .iter()
            .filter(|c| statuses.get(&c.id) == Some(&ProgressStatus::Completed))
            .count() as u64;

        // A module with no active lessons is vacuously complete.
        let completion_percentage = if total == 0 {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        let is_completed = total == 0 || completed >= total;
        let is_locked = !previous_module_completed;

        let mut previous_content_completed = true;
        for (index, content) in contents.iter().enumerate() {
            let item_completed = statuses.get(&content.id) == Some(&ProgressStatus::Completed);
            let content_state = if is_locked {
                ContentSequenceState::locked(MODULE_LOCK_REASON)
            } else if index > 0 && !previous_content_completed {
                ContentSequenceState::locked(CONTENT_LOCK_REASON)
            } else {
                ContentSequenceState::unlocked()
            };
            state.content_states.insert(content.id, content_state);

            // One incomplete lesson locks every later lesson in the module.
            previous_content_completed = previous_content_completed && item_completed;
        }

        state.module_states.insert(
            module.id,
            ModuleSequenceState {
                completed_content_count: completed,
                total_content_count: total,
                completion_percentage,
                is_completed,
                is_locked,
                lock_reason: is_locked.then(|| MODULE_LOCK_REASON.to_string()),
            },
        );

        previous_module_completed = is_completed;
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use paceline_core::{ContentItem, ContentKind, CourseModule, ProgressRecord};
    use paceline_storage::ProgressAggregateRow;

    /// Progress store that serves a fixed status map.
    struct FixedStatuses(HashMap<ContentId, ProgressStatus>);

    #[async_trait::async_trait]
    impl ProgressStore for FixedStatuses {
        async fn record_progress(&mut self, _record: &ProgressRecord) -> Result<()> {
            Ok(())
        }
        async fn load_progress(
            &self,
            _teacher_id: TeacherId,
            _content_id: ContentId,
        ) -> Result<Option<ProgressRecord>> {
            Ok(None)
        }
        async fn progress_statuses(
            &self,
            _teacher_id: TeacherId,
            _course_id: paceline_core::CourseId,
        ) -> Result<HashMap<ContentId, ProgressStatus>> {
            Ok(self.0.clone())
        }
        async fn aggregate_progress(
            &self,
            _course_ids: &[paceline_core::CourseId],
            _teacher_ids: Option<&[TeacherId]>,
        ) -> Result<Vec<ProgressAggregateRow>> {
            Ok(Vec::new())
        }
    }

    fn two_module_course() -> (Course, Vec<ContentId>) {
        let mut course = Course::new("Course", "");

        let mut m1 = CourseModule::new("M1", 0);
        m1.contents.push(ContentItem::new("L1", ContentKind::Video, 0));
        m1.contents.push(ContentItem::new("L2", ContentKind::Video, 1));

        let mut m2 = CourseModule::new("M2", 1);
        m2.contents.push(ContentItem::new("L3", ContentKind::Quiz, 0));

        let ids = vec![
            m1.contents[0].id,
            m1.contents[1].id,
            m2.contents[0].id,
        ];
        course.modules.push(m1);
        course.modules.push(m2);
        (course, ids)
    }

    fn engine(statuses: HashMap<ContentId, ProgressStatus>) -> SequenceEngine {
        SequenceEngine::new(Arc::new(FixedStatuses(statuses)))
    }

    #[tokio::test]
    async fn completed_first_module_unlocks_second() {
        let (course, ids) = two_module_course();
        let statuses = HashMap::from([
            (ids[0], ProgressStatus::Completed),
            (ids[1], ProgressStatus::Completed),
        ]);

        let state = engine(statuses)
            .course_sequence_state(&course, TeacherId::new())
            .await
            .unwrap();

        let m1 = &state.module_states[&course.modules[0].id];
        assert!(!m1.is_locked);
        assert!(m1.is_completed);
        assert_eq!(m1.completion_percentage, 100.0);

        let m2 = &state.module_states[&course.modules[1].id];
        assert!(!m2.is_locked);
        assert!(!state.content_states[&ids[2]].is_locked);
    }

    #[tokio::test]
    async fn incomplete_first_module_locks_second() {
        let (course, ids) = two_module_course();
        let statuses = HashMap::from([(ids[0], ProgressStatus::Completed)]);

        let state = engine(statuses)
            .course_sequence_state(&course, TeacherId::new())
            .await
            .unwrap();

        let m1 = &state.module_states[&course.modules[0].id];
        assert!(!m1.is_locked);
        assert!(!m1.is_completed);
        assert_eq!(m1.completed_content_count, 1);
        assert_eq!(m1.completion_percentage, 50.0);

        // First lesson done, so the second is reachable.
        assert!(!state.content_states[&ids[1]].is_locked);

        // The next module and everything in it stays locked.
        let m2 = &state.module_states[&course.modules[1].id];
        assert!(m2.is_locked);
        assert_eq!(m2.lock_reason.as_deref(), Some(MODULE_LOCK_REASON));
        let l3 = &state.content_states[&ids[2]];
        assert!(l3.is_locked);
        assert_eq!(l3.lock_reason.as_deref(), Some(MODULE_LOCK_REASON));
    }

    #[tokio::test]
    async fn unstarted_lesson_locks_all_later_lessons() {
        let (course, ids) = two_module_course();

        let state = engine(HashMap::new())
            .course_sequence_state(&course, TeacherId::new())
            .await
            .unwrap();

        // First lesson of the first module is always open.
        assert!(!state.content_states[&ids[0]].is_locked);
        let l2 = &state.content_states[&ids[1]];
        assert!(l2.is_locked);
        assert_eq!(l2.lock_reason.as_deref(), Some(CONTENT_LOCK_REASON));
    }

    #[tokio::test]
    async fn in_progress_does_not_count_as_completed() {
        let (course, ids) = two_module_course();
        let statuses = HashMap::from([(ids[0], ProgressStatus::InProgress)]);

        let state = engine(statuses)
            .course_sequence_state(&course, TeacherId::new())
            .await
            .unwrap();

        assert_eq!(
            state.module_states[&course.modules[0].id].completed_content_count,
            0
        );
        assert!(state.content_states[&ids[1]].is_locked);
    }

    #[tokio::test]
    async fn empty_module_is_vacuously_complete() {
        let mut course = Course::new("Course", "");
        course.modules.push(CourseModule::new("Empty", 0));
        let mut m2 = CourseModule::new("M2", 1);
        m2.contents.push(ContentItem::new("L1", ContentKind::Text, 0));
        let lesson_id = m2.contents[0].id;
        course.modules.push(m2);

        let state = engine(HashMap::new())
            .course_sequence_state(&course, TeacherId::new())
            .await
            .unwrap();

        let empty = &state.module_states[&course.modules[0].id];
        assert!(empty.is_completed);
        assert!(!empty.is_locked);
        assert_eq!(empty.completion_percentage, 100.0);
        assert_eq!(empty.total_content_count, 0);

        // The empty module does not block its successor.
        assert!(!state.module_states[&course.modules[1].id].is_locked);
        assert!(!state.content_states[&lesson_id].is_locked);
    }

    #[tokio::test]
    async fn course_without_modules_yields_empty_maps() {
        let course = Course::new("Course", "");
        let state = engine(HashMap::new())
            .course_sequence_state(&course, TeacherId::new())
            .await
            .unwrap();
        assert!(state.module_states.is_empty());
        assert!(state.content_states.is_empty());
    }

    #[tokio::test]
    async fn content_lock_state_matches_full_traversal() {
        let (course, ids) = two_module_course();
        let statuses = HashMap::from([(ids[0], ProgressStatus::Completed)]);
        let engine = engine(statuses);
        let teacher = TeacherId::new();

        let full = engine.course_sequence_state(&course, teacher).await.unwrap();
        for id in &ids {
            let single = engine.content_lock_state(&course, *id, teacher).await.unwrap();
            assert_eq!(single.is_locked, full.content_states[id].is_locked);
        }

        // Unknown content ids fall back to the neutral unlocked state.
        let unknown = engine
            .content_lock_state(&course, ContentId::new(), teacher)
            .await
            .unwrap();
        assert!(!unknown.is_locked);
    }
}
