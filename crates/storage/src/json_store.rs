//! JSON file storage implementation.
//!
//! Stores data as JSON files in a `.paceline` directory: one file per
//! course aggregate under `courses/`, one file per progress record under
//! `progress/<teacher_id>/<content_id>.json`. The record path doubles as
//! the uniqueness invariant for (teacher, content item): writing the same
//! pair twice overwrites the first file.

use std::collections::HashMap;
use std::path::Path;

use paceline_core::{
    ContentId, Course, CourseId, ProgressRecord, ProgressStatus, TeacherId,
};
use tokio::fs;
use tracing::debug;

use super::{CatalogStore, ProgressAggregateRow, ProgressStore, Result};

/// File-based JSON storage backend.
pub struct JsonStore {
    root: std::path::PathBuf,
}

impl JsonStore {
    /// Create storage. This will create the `courses/` and `progress/`
    /// subdirectories under the given root.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("courses")).await?;
        fs::create_dir_all(root.join("progress")).await?;

        Ok(Self { root })
    }

    fn course_path(&self, id: CourseId) -> std::path::PathBuf {
        self.root.join("courses").join(format!("{}.json", id))
    }
    fn teacher_dir(&self, id: TeacherId) -> std::path::PathBuf {
        self.root.join("progress").join(id.to_string())
    }
    fn record_path(&self, teacher_id: TeacherId, content_id: ContentId) -> std::path::PathBuf {
        self.teacher_dir(teacher_id)
            .join(format!("{}.json", content_id))
    }

    /// Teachers with at least one progress record on disk.
    async fn teachers_with_activity(&self) -> Result<Vec<TeacherId>> {
        let dir = self.root.join("progress");
        let mut teachers = Vec::new();
        let mut rd = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(teachers),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = rd.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(|s| s.parse::<TeacherId>().ok()) {
                teachers.push(id);
            }
        }
        Ok(teachers)
    }

    /// All progress records for one teacher.
    async fn teacher_records(&self, teacher_id: TeacherId) -> Result<Vec<ProgressRecord>> {
        let dir = self.teacher_dir(teacher_id);
        match fs::metadata(&dir).await {
            Ok(_) => list_dir(&dir).await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Active content ids per requested course.
    async fn active_content_sets(
        &self,
        course_ids: &[CourseId],
    ) -> Result<HashMap<CourseId, std::collections::HashSet<ContentId>>> {
        let mut sets = HashMap::new();
        for &course_id in course_ids {
            if sets.contains_key(&course_id) {
                continue;
            }
            if let Some(course) = self.load_course(course_id).await? {
                let ids = course
                    .active_modules()
                    .iter()
                    .flat_map(|m| m.active_contents().into_iter().map(|c| c.id))
                    .collect();
                sets.insert(course_id, ids);
            }
        }
        Ok(sets)
    }
}

#[async_trait::async_trait]
impl CatalogStore for JsonStore {
    async fn save_course(&mut self, course: &Course) -> Result<()> {
        let path = self.course_path(course.id);
        let json = serde_json::to_string_pretty(course)?;
        fs::write(&path, json.as_bytes()).await?;
        Ok(())
    }

    async fn load_course(&self, id: CourseId) -> Result<Option<Course>> {
        read_json(&self.course_path(id)).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        let mut courses: Vec<Course> = list_dir(&self.root.join("courses")).await?;
        courses.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(courses)
    }

    async fn delete_course(&mut self, id: CourseId) -> Result<()> {
        fs::remove_file(self.course_path(id)).await.or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Ok(())
            } else {
                Err(e)
            }
        })?;
        Ok(())
    }

    async fn count_active_content(
        &self,
        course_ids: &[CourseId],
    ) -> Result<HashMap<CourseId, u64>> {
        let mut counts = HashMap::new();
        for &course_id in course_ids {
            if counts.contains_key(&course_id) {
                continue;
            }
            if let Some(course) = self.load_course(course_id).await? {
                let n = course.active_content_count();
                if n > 0 {
                    counts.insert(course_id, n);
                }
            }
        }
        Ok(counts)
    }
}

#[async_trait::async_trait]
impl ProgressStore for JsonStore {
    async fn record_progress(&mut self, record: &ProgressRecord) -> Result<()> {
        let dir = self.teacher_dir(record.teacher_id);
        fs::create_dir_all(&dir).await?;
        let path = self.record_path(record.teacher_id, record.content_id);
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json.as_bytes()).await?;
        Ok(())
    }

    async fn load_progress(
        &self,
        teacher_id: TeacherId,
        content_id: ContentId,
    ) -> Result<Option<ProgressRecord>> {
        read_json(&self.record_path(teacher_id, content_id)).await
    }

    async fn progress_statuses(
        &self,
        teacher_id: TeacherId,
        course_id: CourseId,
    ) -> Result<HashMap<ContentId, ProgressStatus>> {
        let records = self.teacher_records(teacher_id).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.course_id == course_id)
            .map(|r| (r.content_id, r.status))
            .collect())
    }

    async fn aggregate_progress(
        &self,
        course_ids: &[CourseId],
        teacher_ids: Option<&[TeacherId]>,
    ) -> Result<Vec<ProgressAggregateRow>> {
        if course_ids.is_empty() {
            return Ok(Vec::new());
        }
        let active = self.active_content_sets(course_ids).await?;

        let mut teachers = match teacher_ids {
            Some(ids) if ids.is_empty() => return Ok(Vec::new()),
            Some(ids) => ids.to_vec(),
            None => self.teachers_with_activity().await?,
        };
        // Duplicate ids must not double-count records.
        let mut seen = std::collections::HashSet::new();
        teachers.retain(|id| seen.insert(*id));

        #[derive(Default)]
        struct Acc {
            activity: u64,
            completed: u64,
            sum: f64,
            last_completed_at: Option<paceline_core::Time>,
        }

        let mut groups: HashMap<(CourseId, TeacherId), Acc> = HashMap::new();
        for &teacher_id in &teachers {
            for record in self.teacher_records(teacher_id).await? {
                let Some(content_ids) = active.get(&record.course_id) else {
                    continue;
                };
                if !content_ids.contains(&record.content_id) {
                    continue;
                }
                let acc = groups.entry((record.course_id, teacher_id)).or_default();
                acc.activity += 1;
                acc.sum += record.progress_percentage;
                if record.is_completed() {
                    acc.completed += 1;
                    if record.completed_at > acc.last_completed_at {
                        acc.last_completed_at = record.completed_at;
                    }
                }
            }
        }
        debug!(groups = groups.len(), "aggregated progress from json store");

        let mut rows: Vec<ProgressAggregateRow> = groups
            .into_iter()
            .map(|((course_id, teacher_id), acc)| ProgressAggregateRow {
                course_key: course_id.to_string(),
                teacher_key: teacher_id.to_string(),
                activity_count: acc.activity,
                completed_content_count: acc.completed,
                progress_sum: acc.sum,
                last_completed_at: acc.last_completed_at,
            })
            .collect();
        rows.sort_by(|a, b| {
            (&a.course_key, &a.teacher_key).cmp(&(&b.course_key, &b.teacher_key))
        });
        Ok(rows)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &std::path::Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Ok(Some(item)) = read_json(&entry.path()).await {
            items.push(item);
        }
    }
    Ok(items)
}
