use crate::config::PipelineSettings;
use crate::gemini::{preview, CourseGenerator};
use crate::models::{AgentStage, CourseContent, SessionSnapshot};
use crate::pipeline::{spawn_progress_simulator, StatusBoard, TEXT_PHASE};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn, error};

#[derive(Debug, Error, PartialEq)]
pub enum TopicError {
    #[error("Please enter a topic.")]
    Empty,
}

/// The single "current run" value the view layer reads.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub run_id: u64,
    pub topic: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub course: Option<CourseContent>,
    pub board: StatusBoard,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            run_id: self.run_id,
            topic: self.topic.clone(),
            is_loading: self.is_loading,
            error: self.error.clone(),
            course: self.course.clone(),
            statuses: self.board.statuses().to_vec(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Handle for a run that has been registered but not yet executed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunTicket {
    pub run_id: u64,
    pub topic: String,
}

#[derive(Clone)]
pub struct Orchestrator {
    session: Arc<RwLock<Session>>,
    generator: Arc<dyn CourseGenerator>,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn CourseGenerator>, settings: PipelineSettings) -> Self {
        Self { session: Arc::default(), generator, settings }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.read().snapshot()
    }

    /// Validates the topic and resets the session for a new run.
    /// Any run still in flight becomes stale and its writes are dropped.
    pub fn begin(&self, topic: &str) -> Result<RunTicket, TopicError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(TopicError::Empty);
        }

        let mut session = self.session.write();
        let run_id = session.run_id + 1;
        let mut board = StatusBoard::pending();
        board.start(AgentStage::Redator);
        *session = Session {
            run_id,
            topic: Some(topic.to_string()),
            is_loading: true,
            error: None,
            course: None,
            board,
            started_at: Some(Utc::now()),
            finished_at: None,
        };
        info!(run_id, "🚀 Starting course generation for topic: {}", topic);
        Ok(RunTicket { run_id, topic: topic.to_string() })
    }

    /// Registers a run and drives it on a background task.
    pub fn start(&self, topic: &str) -> Result<u64, TopicError> {
        let ticket = self.begin(topic)?;
        let run_id = ticket.run_id;
        let this = self.clone();
        tokio::spawn(async move { this.execute(ticket).await });
        Ok(run_id)
    }

    /// Applies `f` only while `run_id` is still the current run.
    fn commit<F>(&self, run_id: u64, f: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        commit_to(&self.session, run_id, f)
    }

    pub async fn execute(&self, ticket: RunTicket) {
        let RunTicket { run_id, topic } = ticket;

        let session = self.session.clone();
        let simulator = spawn_progress_simulator(self.settings.progress_tick, move |from, to| {
            let mut advanced = false;
            commit_to(&session, run_id, |s| advanced = s.board.advance(from, to));
            advanced
        });

        let result = self.generator.generate_course_content(&topic).await;
        if let Some(handle) = simulator {
            handle.abort();
        }

        let course = match result {
            Ok(course) => course,
            Err(e) => {
                error!(run_id, "❌ Course generation failed: {}", e);
                self.commit(run_id, |s| {
                    let failed = s.board.fail_current();
                    warn!(run_id, ?failed, "stage marked as failed");
                    s.error = Some(format!("Failed to generate course content. {e}"));
                    s.course = None;
                    s.is_loading = false;
                    s.finished_at = Some(Utc::now());
                });
                return;
            }
        };

        let still_current = self.commit(run_id, |s| {
            s.board.complete_all(&TEXT_PHASE);
            s.board.start(AgentStage::Illustrator);
            s.course = Some(course.clone());
        });
        if !still_current {
            info!(run_id, "⏭️ Run superseded before illustration, dropping result");
            return;
        }

        let course = illustrate(self.generator.as_ref(), course, self.settings.image_concurrency).await;
        info!(run_id, "🖼️ Illustrated {}/{} sections", course.illustrated_count(), course.section_count());

        let still_current = self.commit(run_id, |s| {
            s.course = Some(course);
            s.board.complete(AgentStage::Illustrator);
            s.board.start(AgentStage::Qa);
        });
        if !still_current {
            return;
        }

        tokio::time::sleep(self.settings.qa_delay).await;

        self.commit(run_id, |s| {
            s.board.complete(AgentStage::Qa);
            s.is_loading = false;
            s.finished_at = Some(Utc::now());
            info!(run_id, all_completed = s.board.is_complete(), "✅ Course generation completed");
        });
    }
}

fn commit_to<F>(session: &RwLock<Session>, run_id: u64, f: F) -> bool
where
    F: FnOnce(&mut Session),
{
    let mut guard = session.write();
    if guard.run_id != run_id {
        return false;
    }
    f(&mut guard);
    true
}

/// Best-effort enrichment: one image request per suggested illustration,
/// at most `limit` in flight. A failed request leaves its section unset.
pub async fn illustrate(generator: &dyn CourseGenerator, mut course: CourseContent, limit: usize) -> CourseContent {
    let jobs: Vec<(usize, usize, String)> = course
        .modules
        .iter()
        .enumerate()
        .flat_map(|(m, module)| {
            module
                .sections
                .iter()
                .enumerate()
                .filter_map(move |(s, section)| section.image_prompt().map(|p| (m, s, p.to_string())))
        })
        .collect();

    if jobs.is_empty() {
        return course;
    }
    info!("🎨 Generating {} illustrations (max {} at once)", jobs.len(), limit.max(1));

    let results: Vec<_> = stream::iter(jobs)
        .map(|(m, s, prompt)| async move {
            let result = generator.generate_image(&prompt).await;
            (m, s, prompt, result)
        })
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    for (m, s, prompt, result) in results {
        match result {
            Ok(image) => {
                info!("✅ Illustration ready for \"{}\": {}", prompt, preview(&image));
                course.modules[m].sections[s].generated_image_base64 = Some(image);
            }
            Err(e) => warn!("Could not generate image for suggestion: \"{}\". Skipping. {}", prompt, e),
        }
    }
    course
}
