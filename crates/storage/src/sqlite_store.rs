//! SQLite storage backend for paceline.
//!
//! Relational schema (courses, modules, contents, progress_records) so the
//! completion aggregation can run as a single GROUP BY query in the
//! database. Timestamps are stored as fixed-width RFC 3339 UTC text, which
//! makes lexical MAX() chronological.

use std::collections::HashMap;

use chrono::SecondsFormat;
use paceline_core::{
    ContentId, ContentItem, Course, CourseId, CourseModule, ModuleId, ProgressRecord,
    ProgressRecordId, ProgressStatus, TeacherId, Time,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use tracing::debug;

use super::{CatalogStore, ProgressAggregateRow, ProgressStore, Result, StorageError};

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStore {
    /// Database connection pool
    pool: sqlx::SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a SQLite database at the given path.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let store = Self { pool };
        store.init_schema().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite storage for testing.
    ///
    /// Capped at one connection: every pooled connection to `:memory:`
    /// would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;

        Ok(store)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS courses (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                is_active INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS modules (
                id TEXT PRIMARY KEY,
                course_id TEXT NOT NULL,
                title TEXT NOT NULL,
                position INTEGER NOT NULL,
                is_active INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS contents (
                id TEXT PRIMARY KEY,
                module_id TEXT NOT NULL,
                course_id TEXT NOT NULL,
                title TEXT NOT NULL,
                kind TEXT NOT NULL,
                position INTEGER NOT NULL,
                is_active INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS progress_records (
                id TEXT PRIMARY KEY,
                teacher_id TEXT NOT NULL,
                course_id TEXT NOT NULL,
                content_id TEXT NOT NULL,
                status TEXT NOT NULL,
                progress_percentage REAL NOT NULL,
                completed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(teacher_id, content_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        // Indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_modules_course ON modules(course_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_contents_course ON contents(course_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_progress_course ON progress_records(course_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn fmt_time(t: Time) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(s: &str) -> Result<Time> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| StorageError::Other(format!("invalid timestamp {s}: {e}")))
}

fn parse_id<T>(s: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    s.parse()
        .map_err(|e: T::Err| StorageError::Other(format!("invalid id {s}: {e}")))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn row_to_record(row: &SqliteRow) -> Result<ProgressRecord> {
    let status: String = row.try_get("status")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;
    Ok(ProgressRecord {
        id: parse_id::<ProgressRecordId>(row.try_get("id")?)?,
        teacher_id: parse_id::<TeacherId>(row.try_get("teacher_id")?)?,
        course_id: parse_id::<CourseId>(row.try_get("course_id")?)?,
        content_id: parse_id::<ContentId>(row.try_get("content_id")?)?,
        status: status
            .parse::<ProgressStatus>()
            .map_err(|e| StorageError::Other(e.to_string()))?,
        progress_percentage: row.try_get("progress_percentage")?,
        completed_at: completed_at.as_deref().map(parse_time).transpose()?,
        created_at: parse_time(row.try_get("created_at")?)?,
        updated_at: parse_time(row.try_get("updated_at")?)?,
    })
}

#[async_trait::async_trait]
impl CatalogStore for SqliteStore {
    async fn save_course(&mut self, course: &Course) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM contents WHERE course_id = ?")
            .bind(course.id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM modules WHERE course_id = ?")
            .bind(course.id.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT OR REPLACE INTO courses (id, title, description, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(course.id.to_string())
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.is_active)
        .bind(fmt_time(course.created_at))
        .bind(fmt_time(course.updated_at))
        .execute(&mut *tx)
        .await?;

        for module in &course.modules {
            sqlx::query(
                "INSERT INTO modules (id, course_id, title, position, is_active, created_at)
                VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(module.id.to_string())
            .bind(course.id.to_string())
            .bind(&module.title)
            .bind(module.order as i64)
            .bind(module.is_active)
            .bind(fmt_time(module.created_at))
            .execute(&mut *tx)
            .await?;

            for content in &module.contents {
                sqlx::query(
                    "INSERT INTO contents (id, module_id, course_id, title, kind, position, is_active, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(content.id.to_string())
                .bind(module.id.to_string())
                .bind(course.id.to_string())
                .bind(&content.title)
                .bind(content.kind.as_str())
                .bind(content.order as i64)
                .bind(content.is_active)
                .bind(fmt_time(content.created_at))
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_course(&self, id: CourseId) -> Result<Option<Course>> {
        let row = sqlx::query(
            "SELECT id, title, description, is_active, created_at, updated_at
            FROM courses WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let module_rows = sqlx::query(
            "SELECT id, title, position, is_active, created_at
            FROM modules WHERE course_id = ? ORDER BY position, created_at",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let content_rows = sqlx::query(
            "SELECT id, module_id, title, kind, position, is_active, created_at
            FROM contents WHERE course_id = ? ORDER BY position, created_at",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut contents_by_module: HashMap<String, Vec<ContentItem>> = HashMap::new();
        for crow in &content_rows {
            let kind: String = crow.try_get("kind")?;
            let position: i64 = crow.try_get("position")?;
            let item = ContentItem {
                id: parse_id::<ContentId>(crow.try_get("id")?)?,
                title: crow.try_get("title")?,
                kind: kind
                    .parse()
                    .map_err(|e: paceline_core::ParseKindError| StorageError::Other(e.to_string()))?,
                order: position as u32,
                is_active: crow.try_get("is_active")?,
                created_at: parse_time(crow.try_get("created_at")?)?,
            };
            contents_by_module
                .entry(crow.try_get::<String, _>("module_id")?)
                .or_default()
                .push(item);
        }

        let mut modules = Vec::with_capacity(module_rows.len());
        for mrow in &module_rows {
            let module_key: String = mrow.try_get("id")?;
            let position: i64 = mrow.try_get("position")?;
            modules.push(CourseModule {
                id: parse_id::<ModuleId>(&module_key)?,
                title: mrow.try_get("title")?,
                order: position as u32,
                is_active: mrow.try_get("is_active")?,
                contents: contents_by_module.remove(&module_key).unwrap_or_default(),
                created_at: parse_time(mrow.try_get("created_at")?)?,
            });
        }

        Ok(Some(Course {
            id,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            is_active: row.try_get("is_active")?,
            modules,
            created_at: parse_time(row.try_get("created_at")?)?,
            updated_at: parse_time(row.try_get("updated_at")?)?,
        }))
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        let rows = sqlx::query("SELECT id FROM courses ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        let mut courses = Vec::with_capacity(rows.len());
        for row in rows {
            let id = parse_id::<CourseId>(row.try_get("id")?)?;
            if let Some(course) = self.load_course(id).await? {
                courses.push(course);
            }
        }
        Ok(courses)
    }

    async fn delete_course(&mut self, id: CourseId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM contents WHERE course_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM modules WHERE course_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM courses WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn count_active_content(
        &self,
        course_ids: &[CourseId],
    ) -> Result<HashMap<CourseId, u64>> {
        if course_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT c.course_id, COUNT(*) AS n
            FROM contents c
            JOIN modules m ON m.id = c.module_id
            WHERE c.is_active = 1 AND m.is_active = 1 AND c.course_id IN ({})
            GROUP BY c.course_id",
            placeholders(course_ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in course_ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut counts = HashMap::new();
        for row in rows {
            let course_id = parse_id::<CourseId>(row.try_get("course_id")?)?;
            let n: i64 = row.try_get("n")?;
            counts.insert(course_id, n as u64);
        }
        Ok(counts)
    }
}

#[async_trait::async_trait]
impl ProgressStore for SqliteStore {
    async fn record_progress(&mut self, record: &ProgressRecord) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO progress_records
            (id, teacher_id, course_id, content_id, status, progress_percentage, completed_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(record.teacher_id.to_string())
        .bind(record.course_id.to_string())
        .bind(record.content_id.to_string())
        .bind(record.status.as_str())
        .bind(record.progress_percentage)
        .bind(record.completed_at.map(fmt_time))
        .bind(fmt_time(record.created_at))
        .bind(fmt_time(record.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_progress(
        &self,
        teacher_id: TeacherId,
        content_id: ContentId,
    ) -> Result<Option<ProgressRecord>> {
        let row = sqlx::query(
            "SELECT id, teacher_id, course_id, content_id, status, progress_percentage, completed_at, created_at, updated_at
            FROM progress_records WHERE teacher_id = ? AND content_id = ?",
        )
        .bind(teacher_id.to_string())
        .bind(content_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn progress_statuses(
        &self,
        teacher_id: TeacherId,
        course_id: CourseId,
    ) -> Result<HashMap<ContentId, ProgressStatus>> {
        let rows = sqlx::query(
            "SELECT content_id, status FROM progress_records
            WHERE teacher_id = ? AND course_id = ?",
        )
        .bind(teacher_id.to_string())
        .bind(course_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut statuses = HashMap::new();
        for row in rows {
            let content_id = parse_id::<ContentId>(row.try_get("content_id")?)?;
            let status: String = row.try_get("status")?;
            let status = status
                .parse::<ProgressStatus>()
                .map_err(|e| StorageError::Other(e.to_string()))?;
            statuses.insert(content_id, status);
        }
        Ok(statuses)
    }

    async fn aggregate_progress(
        &self,
        course_ids: &[CourseId],
        teacher_ids: Option<&[TeacherId]>,
    ) -> Result<Vec<ProgressAggregateRow>> {
        if course_ids.is_empty() {
            return Ok(Vec::new());
        }
        if matches!(teacher_ids, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT p.course_id, p.teacher_id,
                COUNT(*) AS activity_count,
                SUM(CASE WHEN p.status = 'completed' THEN 1 ELSE 0 END) AS completed_count,
                COALESCE(SUM(p.progress_percentage), 0.0) AS progress_sum,
                MAX(CASE WHEN p.status = 'completed' THEN p.completed_at END) AS last_completed_at
            FROM progress_records p
            JOIN contents c ON c.id = p.content_id
            JOIN modules m ON m.id = c.module_id
            WHERE c.is_active = 1 AND m.is_active = 1 AND p.course_id IN ({})",
            placeholders(course_ids.len())
        );
        if let Some(teachers) = teacher_ids {
            sql.push_str(&format!(
                " AND p.teacher_id IN ({})",
                placeholders(teachers.len())
            ));
        }
        sql.push_str(" GROUP BY p.course_id, p.teacher_id ORDER BY p.course_id, p.teacher_id");

        let mut query = sqlx::query(&sql);
        for id in course_ids {
            query = query.bind(id.to_string());
        }
        if let Some(teachers) = teacher_ids {
            for id in teachers {
                query = query.bind(id.to_string());
            }
        }
        let rows = query.fetch_all(&self.pool).await?;
        debug!(rows = rows.len(), "aggregated progress from sqlite");

        let mut aggregates = Vec::with_capacity(rows.len());
        for row in rows {
            let activity_count: i64 = row.try_get("activity_count")?;
            let completed_count: i64 = row.try_get("completed_count")?;
            let last_completed_at: Option<String> = row.try_get("last_completed_at")?;
            aggregates.push(ProgressAggregateRow {
                course_key: row.try_get("course_id")?,
                teacher_key: row.try_get("teacher_id")?,
                activity_count: activity_count as u64,
                completed_content_count: completed_count as u64,
                progress_sum: row.try_get("progress_sum")?,
                last_completed_at: last_completed_at.as_deref().map(parse_time).transpose()?,
            });
        }
        Ok(aggregates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paceline_core::ContentKind;

    fn course_with_modules(lessons_per_module: &[usize]) -> Course {
        let mut course = Course::new("Test course", "desc");
        for (i, &lessons) in lessons_per_module.iter().enumerate() {
            let mut module = CourseModule::new(format!("M{i}"), i as u32);
            for j in 0..lessons {
                module
                    .contents
                    .push(ContentItem::new(format!("L{i}.{j}"), ContentKind::Video, j as u32));
            }
            course.modules.push(module);
        }
        course
    }

    #[tokio::test]
    async fn course_round_trip() {
        let mut store = SqliteStore::in_memory().await.unwrap();

        let course = course_with_modules(&[2, 1]);
        store.save_course(&course).await.unwrap();

        let loaded = store.load_course(course.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Test course");
        assert_eq!(loaded.modules.len(), 2);
        assert_eq!(loaded.modules[0].contents.len(), 2);
        assert_eq!(loaded.modules[1].contents.len(), 1);

        // Re-saving replaces module/content rows instead of accumulating.
        store.save_course(&course).await.unwrap();
        let loaded = store.load_course(course.id).await.unwrap().unwrap();
        assert_eq!(loaded.modules.len(), 2);

        store.delete_course(course.id).await.unwrap();
        assert!(store.load_course(course.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn count_active_content_skips_inactive() {
        let mut store = SqliteStore::in_memory().await.unwrap();

        let mut course = course_with_modules(&[2, 3]);
        course.modules[0].contents[0].is_active = false;
        course.modules[1].is_active = false;
        store.save_course(&course).await.unwrap();

        let counts = store.count_active_content(&[course.id]).await.unwrap();
        assert_eq!(counts.get(&course.id), Some(&1));

        // Unknown course ids are simply absent.
        let counts = store.count_active_content(&[CourseId::new()]).await.unwrap();
        assert!(counts.is_empty());
    }

    #[tokio::test]
    async fn record_progress_unique_per_teacher_and_content() {
        let mut store = SqliteStore::in_memory().await.unwrap();

        let course = course_with_modules(&[1]);
        let content_id = course.modules[0].contents[0].id;
        store.save_course(&course).await.unwrap();

        let teacher = TeacherId::new();
        let mut record = ProgressRecord::new(teacher, course.id, content_id);
        record.touch(25.0).unwrap();
        store.record_progress(&record).await.unwrap();
        record.complete();
        store.record_progress(&record).await.unwrap();

        let loaded = store.load_progress(teacher, content_id).await.unwrap().unwrap();
        assert!(loaded.is_completed());
        assert_eq!(loaded.progress_percentage, 100.0);

        let rows = store
            .aggregate_progress(&[course.id], Some(&[teacher]))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].activity_count, 1);
    }

    #[tokio::test]
    async fn aggregate_groups_by_course_and_teacher() {
        let mut store = SqliteStore::in_memory().await.unwrap();

        let course = course_with_modules(&[2]);
        let c0 = course.modules[0].contents[0].id;
        let c1 = course.modules[0].contents[1].id;
        store.save_course(&course).await.unwrap();

        let alice = TeacherId::new();
        let bob = TeacherId::new();

        for content_id in [c0, c1] {
            let mut record = ProgressRecord::new(alice, course.id, content_id);
            record.complete();
            store.record_progress(&record).await.unwrap();
        }
        let mut record = ProgressRecord::new(bob, course.id, c0);
        record.touch(50.0).unwrap();
        store.record_progress(&record).await.unwrap();

        let rows = store.aggregate_progress(&[course.id], None).await.unwrap();
        assert_eq!(rows.len(), 2);

        let alice_row = rows
            .iter()
            .find(|r| r.teacher_key == alice.to_string())
            .unwrap();
        assert_eq!(alice_row.activity_count, 2);
        assert_eq!(alice_row.completed_content_count, 2);
        assert_eq!(alice_row.progress_sum, 200.0);
        assert!(alice_row.last_completed_at.is_some());

        let bob_row = rows
            .iter()
            .find(|r| r.teacher_key == bob.to_string())
            .unwrap();
        assert_eq!(bob_row.activity_count, 1);
        assert_eq!(bob_row.completed_content_count, 0);
        assert_eq!(bob_row.progress_sum, 50.0);
        assert!(bob_row.last_completed_at.is_none());
    }

    #[tokio::test]
    async fn aggregate_excludes_inactive_content_and_modules() {
        let mut store = SqliteStore::in_memory().await.unwrap();

        let mut course = course_with_modules(&[1, 1]);
        course.modules[1].is_active = false;
        let active_content = course.modules[0].contents[0].id;
        let orphaned_content = course.modules[1].contents[0].id;
        store.save_course(&course).await.unwrap();

        let teacher = TeacherId::new();
        for content_id in [active_content, orphaned_content] {
            let mut record = ProgressRecord::new(teacher, course.id, content_id);
            record.complete();
            store.record_progress(&record).await.unwrap();
        }

        let rows = store
            .aggregate_progress(&[course.id], Some(&[teacher]))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].activity_count, 1);
        assert_eq!(rows[0].completed_content_count, 1);
    }

    #[tokio::test]
    async fn aggregate_empty_inputs() {
        let store = SqliteStore::in_memory().await.unwrap();

        assert!(store.aggregate_progress(&[], None).await.unwrap().is_empty());
        assert!(store
            .aggregate_progress(&[CourseId::new()], Some(&[]))
            .await
            .unwrap()
            .is_empty());
    }
}
