//! Course catalog models - courses, modules, and content items.
//!
//! A course owns an ordered list of modules; each module owns an ordered
//! list of content items (lessons). Only active modules and content items
//! participate in sequence locking and completion totals. The ordering key
//! is `(order, created_at)` everywhere.

use serde::{Deserialize, Serialize};

use crate::id::{ContentId, CourseId, ModuleId};
use crate::Time;

/// A course: the top-level unit of the content catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    /// Unique identifier
    pub id: CourseId,

    /// Course title
    pub title: String,

    /// Detailed description
    pub description: String,

    /// Whether the course is visible to learners
    pub is_active: bool,

    /// Modules in this course
    pub modules: Vec<CourseModule>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl Course {
    /// Create an empty active course.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: CourseId::new(),
            title: title.into(),
            description: description.into(),
            is_active: true,
            modules: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Active modules, sorted by `(order, created_at)`.
    pub fn active_modules(&self) -> Vec<&CourseModule> {
        let mut modules: Vec<&CourseModule> =
            self.modules.iter().filter(|m| m.is_active).collect();
        modules.sort_by(|a, b| (a.order, a.created_at).cmp(&(b.order, b.created_at)));
        modules
    }

    /// Count of active content items under active modules.
    pub fn active_content_count(&self) -> u64 {
        self.active_modules()
            .iter()
            .map(|m| m.active_contents().len() as u64)
            .sum()
    }

    /// Look up a module by id.
    pub fn module(&self, id: ModuleId) -> Option<&CourseModule> {
        self.modules.iter().find(|m| m.id == id)
    }
}

/// An ordered grouping of lessons within a course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseModule {
    /// Unique identifier
    pub id: ModuleId,

    /// Module title
    pub title: String,

    /// Position within the course
    pub order: u32,

    /// Whether the module participates in locking and totals
    pub is_active: bool,

    /// Content items in this module
    pub contents: Vec<ContentItem>,

    /// Creation timestamp, tiebreaker for equal `order` values
    pub created_at: Time,
}

impl CourseModule {
    /// Create an empty active module at the given position.
    pub fn new(title: impl Into<String>, order: u32) -> Self {
        Self {
            id: ModuleId::new(),
            title: title.into(),
            order,
            is_active: true,
            contents: Vec::new(),
            created_at: chrono::Utc::now(),
        }
    }

    /// Active content items, sorted by `(order, created_at)`.
    pub fn active_contents(&self) -> Vec<&ContentItem> {
        let mut contents: Vec<&ContentItem> =
            self.contents.iter().filter(|c| c.is_active).collect();
        contents.sort_by(|a, b| (a.order, a.created_at).cmp(&(b.order, b.created_at)));
        contents
    }
}

/// A single lesson within a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    /// Unique identifier
    pub id: ContentId,

    /// Lesson title
    pub title: String,

    /// Kind of lesson
    pub kind: ContentKind,

    /// Position within the module
    pub order: u32,

    /// Whether the lesson participates in locking and totals
    pub is_active: bool,

    /// Creation timestamp, tiebreaker for equal `order` values
    pub created_at: Time,
}

impl ContentItem {
    /// Create an active lesson at the given position.
    pub fn new(title: impl Into<String>, kind: ContentKind, order: u32) -> Self {
        Self {
            id: ContentId::new(),
            title: title.into(),
            kind,
            order,
            is_active: true,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Kind of content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Video lesson
    Video,
    /// Text lesson
    Text,
    /// Auto-generated quiz
    Quiz,
    /// Reflection assignment
    Assignment,
}

impl ContentKind {
    /// Canonical string form, used as the SQL column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Video => "video",
            ContentKind::Text => "text",
            ContentKind::Quiz => "quiz",
            ContentKind::Assignment => "assignment",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(ContentKind::Video),
            "text" => Ok(ContentKind::Text),
            "quiz" => Ok(ContentKind::Quiz),
            "assignment" => Ok(ContentKind::Assignment),
            other => Err(ParseKindError(other.to_string())),
        }
    }
}

/// Error for an unrecognized content kind string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown content kind: {0}")]
pub struct ParseKindError(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn active_modules_sorted_by_order_then_created_at() {
        let mut course = Course::new("Classroom Management", "");
        let t0 = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let mut m_late = CourseModule::new("B", 1);
        m_late.created_at = t1;
        let mut m_early = CourseModule::new("A", 1);
        m_early.created_at = t0;
        let mut m_first = CourseModule::new("Intro", 0);
        m_first.created_at = t1;
        let mut m_hidden = CourseModule::new("Draft", 0);
        m_hidden.is_active = false;
        m_hidden.created_at = t0;

        course.modules = vec![m_late.clone(), m_early.clone(), m_first.clone(), m_hidden];

        let ordered: Vec<ModuleId> = course.active_modules().iter().map(|m| m.id).collect();
        assert_eq!(ordered, vec![m_first.id, m_early.id, m_late.id]);
    }

    #[test]
    fn active_content_count_skips_inactive() {
        let mut course = Course::new("Course", "");
        let mut module = CourseModule::new("M1", 0);
        module.contents.push(ContentItem::new("L1", ContentKind::Video, 0));
        let mut hidden = ContentItem::new("L2", ContentKind::Text, 1);
        hidden.is_active = false;
        module.contents.push(hidden);
        course.modules.push(module);

        let mut inactive_module = CourseModule::new("M2", 1);
        inactive_module.is_active = false;
        inactive_module
            .contents
            .push(ContentItem::new("L3", ContentKind::Video, 0));
        course.modules.push(inactive_module);

        assert_eq!(course.active_content_count(), 1);
    }

    #[test]
    fn course_serde_round_trip() {
        let mut course = Course::new("Course", "desc");
        let mut module = CourseModule::new("M1", 0);
        module.contents.push(ContentItem::new("L1", ContentKind::Quiz, 0));
        course.modules.push(module);

        let json = serde_json::to_string(&course).unwrap();
        let back: Course = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, course.id);
        assert_eq!(back.modules.len(), 1);
        assert_eq!(back.modules[0].contents[0].kind, ContentKind::Quiz);
    }
}
