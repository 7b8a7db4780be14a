use axum::{
    Form, Json,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    models::{GenerateAccepted, GenerateRequest, SessionSnapshot},
    orchestrator::{Orchestrator, TopicError},
    render::{export_filename, export_html, render_page},
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

#[derive(Debug, Deserialize)]
pub struct TopicForm {
    #[serde(default)]
    pub topic: String,
}

pub enum ApiError {
    BadRequest(String),
    NotFound(&'static str),
}

impl From<TopicError> for ApiError {
    fn from(e: TopicError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_page(&state.orchestrator.snapshot(), None, None))
}

pub async fn submit_form(State(state): State<AppState>, Form(form): Form<TopicForm>) -> Response {
    match state.orchestrator.start(&form.topic) {
        Ok(_) => Redirect::to("/").into_response(),
        Err(e) => {
            tracing::info!("⚠️ Rejected topic submission: {}", e);
            let page = render_page(&state.orchestrator.snapshot(), Some(&e.to_string()), Some(&form.topic));
            (StatusCode::UNPROCESSABLE_ENTITY, Html(page)).into_response()
        }
    }
}

pub async fn generate_course(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<GenerateAccepted>), ApiError> {
    let run_id = state.orchestrator.start(&body.topic)?;
    Ok((StatusCode::ACCEPTED, Json(GenerateAccepted { run_id })))
}

pub async fn get_course(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.orchestrator.snapshot())
}

pub async fn export_course(State(state): State<AppState>) -> Result<Response, ApiError> {
    let course = state
        .orchestrator
        .snapshot()
        .course
        .ok_or(ApiError::NotFound("no course has been generated"))?;

    let filename = export_filename(&course.title);
    let html = export_html(&course);
    tracing::info!("📦 Exporting course '{}' as {} ({} bytes)", course.title, filename, html.len());

    let mut headers = axum::http::HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(&filename));
    Ok((StatusCode::OK, headers, html).into_response())
}

/// Attachment header carrying the derived filename; non-ASCII titles go
/// through the RFC 5987 `filename*` form with an ASCII fallback.
fn content_disposition(filename: &str) -> HeaderValue {
    let ascii_safe = filename
        .chars()
        .all(|c| c.is_ascii_graphic() && c != '"' && c != '\\');
    let value = if ascii_safe {
        format!("attachment; filename=\"{filename}\"")
    } else {
        format!(
            "attachment; filename=\"course.html\"; filename*=UTF-8''{}",
            urlencoding::encode(filename)
        )
    };
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"course.html\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineSettings;
    use crate::gemini::{CourseGenerator, GeminiError};
    use crate::models::{CourseContent, CourseModule, CourseSection};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct StaticGenerator;

    #[async_trait]
    impl CourseGenerator for StaticGenerator {
        async fn generate_course_content(&self, topic: &str) -> Result<CourseContent, GeminiError> {
            Ok(CourseContent {
                title: topic.to_string(),
                introduction: "<p>intro</p>".to_string(),
                modules: vec![CourseModule {
                    title: "M".to_string(),
                    duration_minutes: 30,
                    sections: vec![CourseSection {
                        title: "S".to_string(),
                        content: "<p>body</p>".to_string(),
                        ..Default::default()
                    }],
                }],
            })
        }

        async fn generate_image(&self, _prompt: &str) -> Result<String, GeminiError> {
            Err(GeminiError::Other("unused".to_string()))
        }
    }

    fn state() -> AppState {
        let settings = PipelineSettings { image_concurrency: 1, qa_delay: Duration::ZERO, progress_tick: Duration::ZERO };
        AppState { orchestrator: Orchestrator::new(Arc::new(StaticGenerator), settings) }
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn export_is_404_before_any_course() {
        let app = crate::router(state());
        let response = app
            .oneshot(Request::get("/api/course/export").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_json_topic_is_rejected() {
        let app = crate::router(state());
        let response = app
            .oneshot(
                Request::post("/api/course")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"topic":"   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("Please enter a topic."));
    }

    #[tokio::test]
    async fn blank_form_topic_renders_inline_error() {
        let state = state();
        let app = crate::router(state.clone());
        let response = app
            .oneshot(
                Request::post("/generate")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("topic=+++"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_string(response).await.contains("Please enter a topic."));
        assert_eq!(state.orchestrator.snapshot().run_id, 0);
    }

    #[tokio::test]
    async fn generated_course_downloads_with_derived_filename() {
        let state = state();
        let ticket = state.orchestrator.begin("Intro to Quantum Computing").unwrap();
        state.orchestrator.execute(ticket).await;

        let app = crate::router(state);
        let response = app
            .oneshot(Request::get("/api/course/export").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"intro-to-quantum-computing.html\""
        );
        let body = body_string(response).await;
        assert!(body.contains("<title>Intro to Quantum Computing</title>"));
    }

    #[tokio::test]
    async fn json_submission_starts_a_run() {
        let state = state();
        let app = crate::router(state.clone());
        let response = app
            .oneshot(
                Request::post("/api/course")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"topic":"Rust"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_string(response).await, r#"{"runId":1}"#);
        assert_eq!(state.orchestrator.snapshot().topic.as_deref(), Some("Rust"));
    }

    #[test]
    fn non_ascii_filenames_use_extended_form() {
        let value = content_disposition("introdução.html");
        let value = value.to_str().unwrap();
        assert!(value.contains("filename=\"course.html\""));
        assert!(value.contains("filename*=UTF-8''introdu%C3%A7%C3%A3o.html"));

        let value = content_disposition("curso \"rápido\".html");
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"course.html\"; filename*=UTF-8''curso%20%22r%C3%A1pido%22.html"
        );
    }
}
