//! paceline CLI - inspect course unlocking and completion from the shell.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use paceline_core::{ContentId, Course, CourseId, ProgressRecord, TeacherId};
use paceline_progress::ProgressService;
use paceline_storage::{CatalogStore, JsonStore, ProgressStore};
use tracing::Level;

#[derive(Parser)]
#[command(name = "paceline")]
#[command(about = "Course sequencing and completion tracking", long_about = None)]
struct Cli {
    /// Storage root directory
    #[arg(long, default_value = ".paceline")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a course from a JSON file
    Import {
        /// Path to a course JSON aggregate
        file: PathBuf,
    },
    /// List courses
    Courses,
    /// Show a course outline
    Show {
        /// Course ID
        course: String,
    },
    /// Record progress for a teacher on a lesson
    Record {
        /// Teacher ID
        teacher: String,
        /// Course ID
        course: String,
        /// Content ID
        content: String,
        /// Progress percentage (0-100)
        #[arg(long)]
        percent: Option<f64>,
        /// Mark the lesson completed
        #[arg(long)]
        complete: bool,
    },
    /// Show module and lesson lock state for a teacher
    Unlock {
        /// Course ID
        course: String,
        /// Teacher ID
        teacher: String,
    },
    /// Show completion snapshots for a course
    Report {
        /// Course ID
        course: String,
        /// Comma-separated teacher IDs; omit to list teachers with activity
        #[arg(long)]
        teachers: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let mut store = JsonStore::new(&cli.root).await?;

    match cli.command {
        Commands::Import { file } => {
            let json = tokio::fs::read_to_string(&file).await?;
            let course: Course = serde_json::from_str(&json)?;
            store.save_course(&course).await?;
            println!("Imported course: {} - {}", course.id, course.title);
        }
        Commands::Courses => {
            let courses = store.list_courses().await?;
            println!("Courses ({})", courses.len());
            for course in courses {
                println!(
                    "  {} | {} | {} modules | {} lessons",
                    course.id,
                    course.title,
                    course.active_modules().len(),
                    course.active_content_count(),
                );
            }
        }
        Commands::Show { course } => {
            let course_id = parse_course(&course)?;
            let Some(course) = store.load_course(course_id).await? else {
                println!("Course not found");
                return Ok(());
            };

            println!("Course: {}", course.title);
            println!("  {}", course.description);
            for module in course.active_modules() {
                println!("  [{}] {}", module.order, module.title);
                for content in module.active_contents() {
                    println!("    - {} ({}) {}", content.title, content.kind, content.id);
                }
            }
        }
        Commands::Record {
            teacher,
            course,
            content,
            percent,
            complete,
        } => {
            let teacher_id = parse_teacher(&teacher)?;
            let course_id = parse_course(&course)?;
            let content_id: ContentId = content
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid content ID"))?;

            let mut record = match store.load_progress(teacher_id, content_id).await? {
                Some(existing) => existing,
                None => ProgressRecord::new(teacher_id, course_id, content_id),
            };
            if complete {
                record.complete();
            } else {
                record.touch(percent.unwrap_or(0.0))?;
            }
            store.record_progress(&record).await?;
            println!(
                "Recorded: {} on {} - {} ({:.1}%)",
                teacher_id, content_id, record.status, record.progress_percentage,
            );
        }
        Commands::Unlock { course, teacher } => {
            let course_id = parse_course(&course)?;
            let teacher_id = parse_teacher(&teacher)?;
            let store = Arc::new(store);
            let service = ProgressService::new(store.clone(), store);

            let Some(overview) = service.course_overview(course_id, teacher_id).await? else {
                println!("Course not found");
                return Ok(());
            };

            println!("Course: {} ({})", overview.title, overview.snapshot.status);
            for module in &overview.modules {
                println!(
                    "  [{}] {} - {}/{} ({:.1}%) {}",
                    if module.state.is_locked { "locked" } else { "open" },
                    module.title,
                    module.state.completed_content_count,
                    module.state.total_content_count,
                    module.state.completion_percentage,
                    module.state.lock_reason.as_deref().unwrap_or(""),
                );
                for content in &module.contents {
                    println!(
                        "    [{}] {} ({})",
                        if content.state.is_locked { "locked" } else { "open" },
                        content.title,
                        content.kind,
                    );
                }
            }
        }
        Commands::Report { course, teachers } => {
            let course_id = parse_course(&course)?;
            let teacher_ids = teachers
                .map(|list| {
                    list.split(',')
                        .map(|s| parse_teacher(s.trim()))
                        .collect::<Result<Vec<_>>>()
                })
                .transpose()?;

            let store = Arc::new(store);
            let service = ProgressService::new(store.clone(), store);
            let snapshots = service
                .aggregator()
                .build_teacher_course_snapshots(&[course_id], teacher_ids.as_deref())
                .await?;

            println!("Snapshots ({})", snapshots.len());
            for ((_, teacher_id), snapshot) in &snapshots {
                println!(
                    "  {} | {} | {:.2}% | {}/{} | last completed: {}",
                    teacher_id,
                    snapshot.status,
                    snapshot.progress_percentage,
                    snapshot.completed_content_count,
                    snapshot.total_content_count,
                    snapshot
                        .last_completed_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
        }
    }

    Ok(())
}

fn parse_course(s: &str) -> Result<CourseId> {
    s.parse().map_err(|_| anyhow::anyhow!("Invalid course ID"))
}

fn parse_teacher(s: &str) -> Result<TeacherId> {
    s.parse().map_err(|_| anyhow::anyhow!("Invalid teacher ID"))
}
