//! Course overview composition.
//!
//! Course-detail and dashboard callers need both derivations at once: the
//! completion snapshot for the header and the per-module/per-lesson lock
//! states for the outline. `ProgressService` wires the two engines over
//! shared stores and assembles the combined view.

use std::sync::Arc;

use paceline_core::{
    ContentId, ContentKind, ContentSequenceState, CourseCompletionSnapshot, CourseId, ModuleId,
    ModuleSequenceState, TeacherId,
};
use paceline_storage::{CatalogStore, ProgressStore, Result};
use serde::{Deserialize, Serialize};

use crate::aggregator::CompletionAggregator;
use crate::sequence::SequenceEngine;

/// Combined view of one course for one teacher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseOverview {
    /// The course
    pub course_id: CourseId,

    /// The teacher
    pub teacher_id: TeacherId,

    /// Course title
    pub title: String,

    /// Completion summary
    pub snapshot: CourseCompletionSnapshot,

    /// Active modules in catalog order
    pub modules: Vec<ModuleOverview>,
}

/// One module of the overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleOverview {
    /// The module
    pub module_id: ModuleId,

    /// Module title
    pub title: String,

    /// Sequence state of the module
    pub state: ModuleSequenceState,

    /// Active lessons in catalog order
    pub contents: Vec<ContentOverview>,
}

/// One lesson of the overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentOverview {
    /// The lesson
    pub content_id: ContentId,

    /// Lesson title
    pub title: String,

    /// Kind of lesson
    pub kind: ContentKind,

    /// Sequence state of the lesson
    pub state: ContentSequenceState,
}

/// Both derivation engines over shared stores.
pub struct ProgressService {
    catalog: Arc<dyn CatalogStore>,
    engine: SequenceEngine,
    aggregator: CompletionAggregator,
}

impl ProgressService {
    /// Create a service over the given stores.
    pub fn new(catalog: Arc<dyn CatalogStore>, progress: Arc<dyn ProgressStore>) -> Self {
        Self {
            catalog: catalog.clone(),
            engine: SequenceEngine::new(progress.clone()),
            aggregator: CompletionAggregator::new(catalog, progress),
        }
    }

    /// The sequence-lock engine.
    pub fn sequence(&self) -> &SequenceEngine {
        &self.engine
    }

    /// The completion aggregator.
    pub fn aggregator(&self) -> &CompletionAggregator {
        &self.aggregator
    }

    /// Assemble the combined course view for one teacher.
    ///
    /// Returns `None` for an unknown course id.
    pub async fn course_overview(
        &self,
        course_id: CourseId,
        teacher_id: TeacherId,
    ) -> Result<Option<CourseOverview>> {
        let Some(course) = self.catalog.load_course(course_id).await? else {
            return Ok(None);
        };

        let sequence = self
            .engine
            .course_sequence_state(&course, teacher_id)
            .await?;
        let mut snapshots = self
            .aggregator
            .build_teacher_course_snapshots(&[course_id], Some(&[teacher_id]))
            .await?;
        let Some(snapshot) = snapshots.remove(&(course_id, teacher_id)) else {
            // The cross product guarantees the pair; treat a miss as no data.
            return Ok(None);
        };

        let mut modules = Vec::new();
        for module in course.active_modules() {
            let Some(state) = sequence.module_states.get(&module.id) else {
                continue;
            };
            let contents = module
                .active_contents()
                .into_iter()
                .map(|content| ContentOverview {
                    content_id: content.id,
                    title: content.title.clone(),
                    kind: content.kind,
                    state: sequence
                        .content_states
                        .get(&content.id)
                        .cloned()
                        .unwrap_or_else(ContentSequenceState::unlocked),
                })
                .collect();
            modules.push(ModuleOverview {
                module_id: module.id,
                title: module.title.clone(),
                state: state.clone(),
                contents,
            });
        }

        Ok(Some(CourseOverview {
            course_id,
            teacher_id,
            title: course.title.clone(),
            snapshot,
            modules,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paceline_core::{ContentItem, Course, CourseModule, ProgressRecord, ProgressStatus};
    use paceline_storage::JsonStore;

    async fn service_with_course() -> (tempfile::TempDir, Arc<JsonStore>, Course) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::new(dir.path()).await.unwrap();

        let mut course = Course::new("Safeguarding basics", "Annual training");
        let mut m1 = CourseModule::new("Foundations", 0);
        m1.contents.push(ContentItem::new("Welcome", ContentKind::Video, 0));
        m1.contents.push(ContentItem::new("Policies", ContentKind::Text, 1));
        let mut m2 = CourseModule::new("Assessment", 1);
        m2.contents.push(ContentItem::new("Final quiz", ContentKind::Quiz, 0));
        course.modules.push(m1);
        course.modules.push(m2);
        store.save_course(&course).await.unwrap();

        (dir, Arc::new(store), course)
    }

    #[tokio::test]
    async fn overview_combines_snapshot_and_lock_state() {
        let (_dir, store, course) = service_with_course().await;
        let teacher = TeacherId::new();

        {
            let mut record =
                ProgressRecord::new(teacher, course.id, course.modules[0].contents[0].id);
            record.complete();
            // Write through a second handle; JsonStore instances share the
            // same directory.
            let mut writer = JsonStore::new(_dir.path()).await.unwrap();
            writer.record_progress(&record).await.unwrap();
        }

        let service = ProgressService::new(store.clone(), store);
        let overview = service
            .course_overview(course.id, teacher)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(overview.title, "Safeguarding basics");
        assert_eq!(overview.snapshot.status, ProgressStatus::InProgress);
        assert_eq!(overview.snapshot.completed_content_count, 1);
        assert_eq!(overview.modules.len(), 2);

        let foundations = &overview.modules[0];
        assert!(!foundations.state.is_locked);
        assert!(!foundations.contents[0].state.is_locked);
        assert!(!foundations.contents[1].state.is_locked);

        let assessment = &overview.modules[1];
        assert!(assessment.state.is_locked);
        assert!(assessment.contents[0].state.is_locked);
    }

    #[tokio::test]
    async fn overview_for_unknown_course_is_none() {
        let (_dir, store, _course) = service_with_course().await;
        let service = ProgressService::new(store.clone(), store);

        let overview = service
            .course_overview(CourseId::new(), TeacherId::new())
            .await
            .unwrap();
        assert!(overview.is_none());
    }
}
