use serde::{Serialize, Deserialize};
use serde_with::skip_serializing_none;
use chrono::{DateTime, Utc};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseContent {
    pub title: String,
    #[serde(default)]
    pub introduction: String, // rich text, rendered verbatim
    #[serde(default)]
    pub modules: Vec<CourseModule>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseModule {
    pub title: String,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub sections: Vec<CourseSection>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CourseSection {
    pub title: String,
    #[serde(default)]
    pub content: String, // rich text, rendered verbatim
    #[serde(default)]
    pub code_example: Option<CodeExample>,
    #[serde(default)]
    pub image_suggestion: Option<String>,
    #[serde(default)]
    pub generated_image_base64: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CodeExample {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub code: String,
}

impl CourseContent {
    /// Minimal shape check applied to every generated course.
    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty() && !self.modules.is_empty()
    }

    pub fn section_count(&self) -> usize {
        self.modules.iter().map(|m| m.sections.len()).sum()
    }

    pub fn illustrated_count(&self) -> usize {
        self.modules
            .iter()
            .flat_map(|m| &m.sections)
            .filter(|s| s.generated_image_base64.is_some())
            .count()
    }
}

impl CourseSection {
    /// The prompt to illustrate this section with, if the generator suggested one.
    pub fn image_prompt(&self) -> Option<&str> {
        self.image_suggestion.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentStage {
    Redator,
    Designer,
    Developer,
    Illustrator,
    #[serde(rename = "QA")]
    Qa,
}

impl AgentStage {
    pub const ALL: [AgentStage; 5] = [
        AgentStage::Redator,
        AgentStage::Designer,
        AgentStage::Developer,
        AgentStage::Illustrator,
        AgentStage::Qa,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            AgentStage::Redator => "Redator Agent",
            AgentStage::Designer => "Designer Agent",
            AgentStage::Developer => "Developer Agent",
            AgentStage::Illustrator => "Illustrator Agent",
            AgentStage::Qa => "QA Agent",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl StageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Processing => "processing",
            StageStatus::Completed => "completed",
            StageStatus::Error => "error",
        }
    }

    /// Completed and error are terminal within a run.
    pub fn can_become(self, next: StageStatus) -> bool {
        matches!(
            (self, next),
            (StageStatus::Pending, StageStatus::Processing)
                | (StageStatus::Pending, StageStatus::Completed)
                | (StageStatus::Processing, StageStatus::Completed)
                | (StageStatus::Pending, StageStatus::Error)
                | (StageStatus::Processing, StageStatus::Error)
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AgentStatus {
    pub stage: AgentStage,
    pub name: String,
    pub status: StageStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateRequest {
    pub topic: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAccepted {
    pub run_id: u64,
}

/// Everything the view layer reads about the current run.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub run_id: u64,
    pub topic: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub course: Option<CourseContent>,
    pub statuses: Vec<AgentStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn section_serializes_camel_case_and_skips_absent_fields() {
        let section = CourseSection {
            title: "Loops".into(),
            content: "<p>for</p>".into(),
            image_suggestion: Some("A loop diagram".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&section).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "title": "Loops",
                "content": "<p>for</p>",
                "imageSuggestion": "A loop diagram"
            })
        );
    }

    #[test]
    fn course_parses_remote_shape() {
        let raw = r#"{
            "title": "Rust Basics",
            "introduction": "<p>Hi</p>",
            "modules": [{
                "title": "Ownership",
                "durationMinutes": 40,
                "sections": [{
                    "title": "Moves",
                    "content": "<p>moved</p>",
                    "codeExample": {"language": "rust", "code": "let a = b;"}
                }]
            }]
        }"#;
        let course: CourseContent = serde_json::from_str(raw).unwrap();
        assert!(course.is_complete());
        assert_eq!(course.modules[0].duration_minutes, 40);
        assert_eq!(course.modules[0].sections[0].code_example.as_ref().unwrap().language, "rust");
        assert_eq!(course.section_count(), 1);
        assert_eq!(course.illustrated_count(), 0);
    }

    #[test]
    fn blank_image_suggestion_is_no_prompt() {
        let section = CourseSection { image_suggestion: Some("   ".into()), ..Default::default() };
        assert_eq!(section.image_prompt(), None);
    }

    #[test]
    fn terminal_statuses_do_not_move() {
        assert!(StageStatus::Pending.can_become(StageStatus::Processing));
        assert!(StageStatus::Processing.can_become(StageStatus::Error));
        assert!(!StageStatus::Completed.can_become(StageStatus::Error));
        assert!(!StageStatus::Error.can_become(StageStatus::Processing));
        assert!(!StageStatus::Processing.can_become(StageStatus::Pending));
    }

    #[test]
    fn qa_stage_keeps_its_wire_name() {
        assert_eq!(serde_json::to_string(&AgentStage::Qa).unwrap(), "\"QA\"");
    }
}
