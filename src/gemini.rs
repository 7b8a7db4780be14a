use crate::config::Config;
use crate::models::{CodeExample, CourseContent, CourseModule, CourseSection};
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use serde::Deserialize;
use base64::Engine;
use reqwest::Client;
use tracing::{info, error, debug};

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("parse error: {0}")] Parse(String),
    #[error("Generated content is missing required fields.")] Incomplete,
    #[error("Other: {0}")] Other(String),
}

/// The two remote operations a generation run depends on.
#[async_trait]
pub trait CourseGenerator: Send + Sync {
    async fn generate_course_content(&self, topic: &str) -> Result<CourseContent, GeminiError>;
    async fn generate_image(&self, prompt: &str) -> Result<String, GeminiError>;
}

const SYSTEM_INSTRUCTION: &str = "You are a multi-agent AI system that creates comprehensive, 2-hour-long, didactic course websites from a single topic.
1. **Redator Agent**: You will first act as a content writer. Research the topic and structure a complete 2-hour lesson plan. The content must be didactic, educational, and avoid any quizzes or interactive questions for the student. The total course content should be very substantial.
2. **Designer Agent**: Next, as a UI/UX designer, you will format the content using HTML tags and appropriate Tailwind CSS classes to ensure it is visually appealing, professional, and highly readable. Use a dark mode theme with accent colors like cyan and teal.
3. **Developer Agent**: As a developer, you will provide clean, well-commented code examples where relevant to the topic.
4. **QA Agent**: Finally, as a QA agent, you will review the entire output to ensure it's coherent, accurate, and perfectly structured according to the required JSON schema.
The final output must be a single, valid JSON object that strictly adheres to the provided schema.";

/// Structured-output schema sent with every course request.
pub fn course_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": {
                "type": "STRING",
                "description": "A compelling and descriptive title for the course."
            },
            "introduction": {
                "type": "STRING",
                "description": "An engaging introduction to the course topic. Should be 2-3 paragraphs. Use HTML p and strong tags for formatting."
            },
            "modules": {
                "type": "ARRAY",
                "description": "An array of course modules. The total duration should be approximately 120 minutes.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING", "description": "The title of this module." },
                        "durationMinutes": { "type": "INTEGER", "description": "The estimated duration of this module in minutes." },
                        "sections": {
                            "type": "ARRAY",
                            "description": "The sections within this module.",
                            "items": {
                                "type": "OBJECT",
                                "properties": {
                                    "title": { "type": "STRING", "description": "The title of this section." },
                                    "content": {
                                        "type": "STRING",
                                        "description": "Detailed didactic content for this section. Use HTML tags like <p>, <strong>, <em>, <ul>, <ol>, <li> and <code> for formatting, with Tailwind CSS classes for a dark theme (e.g. text-cyan-400 for highlights, bg-gray-800 p-4 rounded-md for callouts). Be extensive and thorough."
                                    },
                                    "codeExample": {
                                        "type": "OBJECT",
                                        "description": "An optional code example relevant to the section. Provide clean, well-commented code.",
                                        "properties": {
                                            "language": { "type": "STRING", "description": "The programming language of the code snippet (e.g., javascript, python, html)." },
                                            "code": { "type": "STRING", "description": "The actual code snippet." }
                                        }
                                    },
                                    "imageSuggestion": {
                                        "type": "STRING",
                                        "description": "An optional descriptive prompt for an illustrative image, e.g., \"A diagram of the DOM tree\"."
                                    }
                                },
                                "required": ["title", "content"]
                            }
                        }
                    },
                    "required": ["title", "durationMinutes", "sections"]
                }
            }
        },
        "required": ["title", "introduction", "modules"]
    })
}

pub fn build_course_prompt(topic: &str) -> String {
    format!("Generate a complete 2-hour course on the topic: \"{}\".", topic.trim())
}

pub fn build_image_prompt(suggestion: &str) -> String {
    format!("Educational illustration for an online course: {suggestion}. Clean vector style, dark neutral background, high contrast, no text over image.")
}

/// Parses the model's JSON text into a course and applies the minimal shape check.
pub fn parse_course(text: &str) -> Result<CourseContent, GeminiError> {
    let trimmed = text.trim();
    // Some responses still arrive fenced despite the JSON mime type.
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    let course: CourseContent = serde_json::from_str(body)
        .map_err(|e| GeminiError::Parse(e.to_string()))?;
    if !course.is_complete() {
        return Err(GeminiError::Incomplete);
    }
    Ok(course)
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

pub(crate) fn preview(data: &str) -> String {
    if data.len() > 50 {
        format!("{}...[{} chars total]", data.chars().take(50).collect::<String>(), data.len())
    } else {
        data.to_string()
    }
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
    demo: bool,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            demo: config.is_demo(),
        }
    }

    async fn perform_api_call(&self, model: &str, request_body: &Value) -> Result<GeminiResponse, GeminiError> {
        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, model, self.api_key);

        info!("🔗 Making request to: {}", url.replace(&self.api_key, "***"));
        debug!("📤 Request body: {}", serde_json::to_string_pretty(request_body).unwrap_or_default());

        let response = self.client
            .post(&url)
            .json(request_body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!("❌ API Error response: {}", error_body);
            return Err(GeminiError::Http(format!("status={} body={}", status, error_body)));
        }

        let response_text = response.text().await
            .map_err(|e| GeminiError::Other(e.to_string()))?;

        if let Ok(mut json_value) = serde_json::from_str::<Value>(&response_text) {
            truncate_base64_in_json(&mut json_value);
            debug!("📥 Raw Gemini API response: {}", json_value);
        }

        serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Parse(format!("{}: {}", e, preview(&response_text))))
    }

    fn generate_placeholder_image(&self, prompt: &str) -> String {
        let palette = ["#06B6D4", "#14B8A6", "#3B82F6", "#8B5CF6", "#F59E0B"];
        let color = palette[prompt.len() % palette.len()];
        let caption: String = prompt.chars().take(48).collect();
        let caption = caption.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;");

        let svg = format!(r#"<svg width="640" height="360" xmlns="http://www.w3.org/2000/svg">
            <defs>
                <linearGradient id="grad" x1="0%" y1="0%" x2="100%" y2="100%">
                    <stop offset="0%" style="stop-color:{color};stop-opacity:1" />
                    <stop offset="100%" style="stop-color:#111827;stop-opacity:1" />
                </linearGradient>
            </defs>
            <rect width="640" height="360" fill="url(#grad)" />
            <text x="320" y="170" font-family="Arial, sans-serif" font-size="22" font-weight="bold"
                  text-anchor="middle" fill="white">{caption}</text>
            <text x="320" y="210" font-family="Arial, sans-serif" font-size="12"
                  text-anchor="middle" fill="white" opacity="0.8">Course illustration (demo)</text>
        </svg>"#);

        base64::engine::general_purpose::STANDARD.encode(svg.as_bytes())
    }
}

#[async_trait]
impl CourseGenerator for GeminiClient {
    async fn generate_course_content(&self, topic: &str) -> Result<CourseContent, GeminiError> {
        if self.demo {
            info!("Using demo mode - generating canned course");
            return Ok(demo_course(topic));
        }

        info!("📝 Generating course content for topic: {}", topic);
        let request_body = json!({
            "systemInstruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
            "contents": [{ "role": "user", "parts": [{ "text": build_course_prompt(topic) }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": course_schema(),
                "temperature": 0.7
            }
        });

        let parsed = self.perform_api_call(&self.text_model, &request_body).await?;
        let text = extract_first_text(&parsed)
            .ok_or_else(|| GeminiError::Other("No text content found in response".to_string()))?;
        let course = parse_course(&text)?;
        info!("✅ Course '{}' generated with {} modules, {} sections", course.title, course.modules.len(), course.section_count());
        Ok(course)
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, GeminiError> {
        if self.demo {
            let placeholder = self.generate_placeholder_image(prompt);
            info!("📦 Generated placeholder image: {}", preview(&placeholder));
            return Ok(placeholder);
        }

        let request_body = json!({
            "contents": [{
                "parts": [{ "text": build_image_prompt(prompt) }]
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "temperature": 0.4,
                "candidateCount": 1
            }
        });

        let parsed = self.perform_api_call(&self.image_model, &request_body).await?;
        let image = extract_first_image_b64(&parsed)
            .ok_or_else(|| GeminiError::Other("no image data in response".into()))?;
        info!("🖼️ Image generated: {}", preview(&image));
        Ok(image)
    }
}

/// Offline course used when the key is `DEMO_KEY`.
pub fn demo_course(topic: &str) -> CourseContent {
    let topic = topic.trim();
    CourseContent {
        title: format!("{topic}: A Two-Hour Introduction"),
        introduction: format!(
            "<p class=\"text-lg text-gray-300 mb-4\">This course walks through the essentials of <strong>{topic}</strong>.</p>"
        ),
        modules: vec![
            CourseModule {
                title: "Foundations".to_string(),
                duration_minutes: 60,
                sections: vec![
                    CourseSection {
                        title: "Core Concepts".to_string(),
                        content: format!("<p class=\"text-lg text-gray-300 mb-4\">The vocabulary you need for {topic}.</p>"),
                        image_suggestion: Some(format!("A concept map of {topic}")),
                        ..Default::default()
                    },
                    CourseSection {
                        title: "A First Example".to_string(),
                        content: "<p class=\"text-lg text-gray-300 mb-4\">A small worked example.</p>".to_string(),
                        code_example: Some(CodeExample {
                            language: "python".to_string(),
                            code: "def compare(a, b):\n    # True when a < b\n    return a < b".to_string(),
                        }),
                        ..Default::default()
                    },
                ],
            },
            CourseModule {
                title: "Putting It Into Practice".to_string(),
                duration_minutes: 60,
                sections: vec![CourseSection {
                    title: "Common Pitfalls".to_string(),
                    content: "<ul><li>Skipping the fundamentals</li><li>Ignoring feedback</li></ul>".to_string(),
                    image_suggestion: Some(format!("A checklist of best practices for {topic}")),
                    ..Default::default()
                }],
            },
        ],
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData
    },
    Text { text: String },
    #[allow(dead_code)]
    Other(Value)
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

fn extract_first_text(resp: &GeminiResponse) -> Option<String> {
    resp.candidates.first()?.content.parts.iter().find_map(|p| match p {
        Part::Text { text } => Some(text.trim().to_string()),
        _ => None,
    })
}

fn extract_first_image_b64(resp: &GeminiResponse) -> Option<String> {
    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Inline { inline_data } = p {
                info!("🎯 Found image data with mime type: {}", inline_data.mime_type);
                return Some(inline_data.data.clone());
            }
        }
    }
    info!("⚠️ No inline image data found in response structure");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_and_plain_json() {
        let raw = r#"{"title":"T","introduction":"<p>i</p>","modules":[{"title":"M","durationMinutes":10,"sections":[]}]}"#;
        assert_eq!(parse_course(raw).unwrap().title, "T");
        let fenced = format!("```json\n{raw}\n```");
        assert_eq!(parse_course(&fenced).unwrap().modules.len(), 1);
    }

    #[test]
    fn rejects_unparsable_and_incomplete_courses() {
        assert!(matches!(parse_course("not json"), Err(GeminiError::Parse(_))));
        let no_modules = r#"{"title":"T","introduction":"","modules":[]}"#;
        assert!(matches!(parse_course(no_modules), Err(GeminiError::Incomplete)));
        let blank_title = r#"{"title":"  ","introduction":"","modules":[{"title":"M","durationMinutes":1,"sections":[]}]}"#;
        assert!(matches!(parse_course(blank_title), Err(GeminiError::Incomplete)));
    }

    #[test]
    fn code_example_without_code_is_accepted() {
        let raw = r#"{"title":"T","introduction":"","modules":[{"title":"M","durationMinutes":5,"sections":[{"title":"S","content":"<p>c</p>","codeExample":{"language":"python"}}]}]}"#;
        let course = parse_course(raw).unwrap();
        let example = course.modules[0].sections[0].code_example.as_ref().unwrap();
        assert_eq!(example.language, "python");
        assert!(example.code.is_empty());
    }

    #[test]
    fn extracts_text_and_inline_image_parts() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [
                { "text": "  caption  " },
                { "inlineData": { "mimeType": "image/png", "data": "iVBORw0KGgo=" } }
            ]}}]
        }))
        .unwrap();
        assert_eq!(extract_first_text(&resp).as_deref(), Some("caption"));
        assert_eq!(extract_first_image_b64(&resp).as_deref(), Some("iVBORw0KGgo="));

        let empty: GeminiResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(extract_first_text(&empty), None);
        assert_eq!(extract_first_image_b64(&empty), None);
    }

    #[test]
    fn schema_requires_core_fields() {
        let schema = course_schema();
        assert_eq!(schema["required"], json!(["title", "introduction", "modules"]));
        let section = &schema["properties"]["modules"]["items"]["properties"]["sections"]["items"];
        assert_eq!(section["required"], json!(["title", "content"]));
    }

    #[test]
    fn base64_payloads_are_truncated_for_logs() {
        let long = "A".repeat(200);
        let mut value = json!({ "parts": [{ "inlineData": { "data": long } }] });
        truncate_base64_in_json(&mut value);
        let data = value["parts"][0]["inlineData"]["data"].as_str().unwrap();
        assert!(data.ends_with("[truncated 150 chars]"));

        // Non-ASCII payloads are left alone rather than sliced mid-character.
        let accented = "é".repeat(120);
        let mut value = json!({ "data": accented.clone() });
        truncate_base64_in_json(&mut value);
        assert_eq!(value["data"].as_str(), Some(accented.as_str()));
    }

    #[tokio::test]
    async fn demo_mode_needs_no_network() {
        let cfg = Config::from_lookup(|k| (k == "GEMINI_API_KEY").then(|| crate::config::DEMO_KEY.to_string())).unwrap();
        let client = GeminiClient::new(&cfg);
        let course = client.generate_course_content("Rust").await.unwrap();
        assert!(course.is_complete());
        let image = client.generate_image("A concept map").await.unwrap();
        assert!(image.starts_with("PHN2Zy"));
    }
}
