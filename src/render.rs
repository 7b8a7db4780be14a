//! HTML renderers for a generated course.
//!
//! The interactive page and the downloadable export share one course
//! skeleton, so structure and escaping cannot drift apart. Rich-text fields
//! (`introduction`, section `content`) are emitted verbatim; every plain-text
//! field and all code are escaped.

use crate::models::{AgentStatus, CourseContent, CourseModule, CourseSection, SessionSnapshot, StageStatus};
use base64::Engine;
use image::ImageFormat;

const TAILWIND_CDN: &str = r#"<script src="https://cdn.tailwindcss.com"></script>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Interactive,
    Export,
}

impl Surface {
    fn section_class(self) -> &'static str {
        match self {
            Surface::Interactive => "mt-8 p-6 bg-gray-800/50 rounded-lg border border-gray-700 transition-shadow duration-300 hover:shadow-cyan-500/10",
            Surface::Export => "mt-8 p-6 bg-gray-800/50 rounded-lg border border-gray-700",
        }
    }

    fn content_class(self) -> &'static str {
        match self {
            Surface::Interactive => "mt-4 prose prose-invert max-w-none",
            Surface::Export => "mt-4",
        }
    }

    fn image_class(self) -> &'static str {
        match self {
            Surface::Interactive => "mt-2 rounded-md mx-auto max-h-[400px] w-auto",
            Surface::Export => "mt-2 rounded-md mx-auto",
        }
    }
}

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Escaping for text placed inside `<pre><code>`.
pub fn escape_code(code: &str) -> String {
    code.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// `"Intro to Quantum Computing"` becomes `intro-to-quantum-computing.html`.
pub fn export_filename(title: &str) -> String {
    let slug = title.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-");
    if slug.is_empty() {
        "course.html".to_string()
    } else {
        format!("{slug}.html")
    }
}

/// MIME type for a base64 image payload, sniffed from its leading bytes.
pub fn image_mime(data: &str) -> &'static str {
    if data.starts_with("PHN2Zy") || data.starts_with("PD94bWwg") {
        return "image/svg+xml";
    }
    let head: String = data.chars().filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')).take(32).collect();
    // Decode whole quanta only.
    let head = &head[..head.len() / 4 * 4];
    let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(head) else {
        return "image/jpeg";
    };
    match image::guess_format(&bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        _ => "image/jpeg",
    }
}

fn code_block(language: &str, code: &str) -> String {
    let language = html_escape(language);
    format!(
        r#"<div class="mt-6">
  <p class="text-sm font-semibold text-gray-400 uppercase tracking-wider mb-2">{language} Example</p>
  <pre class="bg-gray-900 rounded-md p-4 text-sm overflow-x-auto"><code class="language-{language}">{}</code></pre>
</div>"#,
        escape_code(code)
    )
}

fn illustration(section: &CourseSection, surface: Surface) -> String {
    // Images are only attached to sections that carried a suggestion.
    let (Some(image), Some(suggestion)) = (&section.generated_image_base64, &section.image_suggestion) else {
        return String::new();
    };
    let caption = html_escape(suggestion);
    format!(
        r#"<div class="mt-6 p-4 bg-gray-700/50 rounded-lg text-center">
  <p class="text-gray-400 italic">Illustration for: "{caption}"</p>
  <img src="data:{};base64,{image}" alt="{caption}" class="{}" />
</div>"#,
        image_mime(image),
        surface.image_class()
    )
}

fn section_markup(section: &CourseSection, surface: Surface) -> String {
    let code = section
        .code_example
        .as_ref()
        .filter(|c| !c.code.trim().is_empty())
        .map(|c| code_block(&c.language, &c.code))
        .unwrap_or_default();
    format!(
        r#"<div class="{}">
  <h4 class="text-2xl font-semibold text-cyan-400">{}</h4>
  <div class="{}">{}</div>
{code}
{}
</div>"#,
        surface.section_class(),
        html_escape(&section.title),
        surface.content_class(),
        section.content,
        illustration(section, surface)
    )
}

fn module_markup(module: &CourseModule, surface: Surface) -> String {
    let sections: String = module.sections.iter().map(|s| section_markup(s, surface)).collect();
    format!(
        r#"<div class="mt-12">
  <h3 class="text-4xl font-bold text-teal-300 border-b-2 border-teal-400 pb-2 mb-4">{}</h3>
  <p class="text-gray-400 italic">Estimated duration: {} minutes</p>
{sections}
</div>"#,
        html_escape(&module.title),
        module.duration_minutes
    )
}

/// Title, introduction and every module, shared by both surfaces.
pub fn course_markup(content: &CourseContent, surface: Surface) -> String {
    let title = html_escape(&content.title);
    let modules: String = content.modules.iter().map(|m| module_markup(m, surface)).collect();
    let introduction = format!(
        r#"<h2 class="text-3xl font-bold text-teal-300 border-b-2 border-teal-400 pb-2">Introduction</h2>
{}"#,
        content.introduction
    );

    match surface {
        Surface::Interactive => format!(
            r#"<header class="text-center mb-12">
  <h1 class="text-5xl font-extrabold text-cyan-400">{title}</h1>
</header>
<div class="prose prose-invert max-w-none">
{introduction}
</div>
{modules}"#
        ),
        Surface::Export => format!(
            r#"<header class="bg-gray-800 p-8 text-center">
  <h1 class="text-5xl font-bold text-cyan-400">{title}</h1>
</header>
<main class="container mx-auto p-8">
<div class="prose prose-invert max-w-none bg-gray-900 p-8 rounded-lg">
{introduction}
{modules}
</div>
</main>"#
        ),
    }
}

/// Self-contained document offered as the download.
pub fn export_html(content: &CourseContent) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{}</title>
{TAILWIND_CDN}
</head>
<body class="bg-gray-900 text-gray-100 font-sans">
{}
</body>
</html>
"#,
        html_escape(&content.title),
        course_markup(content, Surface::Export)
    )
}

fn status_color(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Completed => "text-green-400",
        StageStatus::Processing => "text-cyan-400",
        StageStatus::Error => "text-red-400",
        StageStatus::Pending => "text-gray-500",
    }
}

fn status_icon(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Completed => "✓",
        StageStatus::Processing => "…",
        StageStatus::Error => "✕",
        StageStatus::Pending => "○",
    }
}

fn pipeline_markup(statuses: &[AgentStatus]) -> String {
    let stages: Vec<String> = statuses
        .iter()
        .map(|agent| {
            let color = status_color(agent.status);
            format!(
                r#"<div class="flex flex-col items-center text-center w-40" data-stage="{:?}">
  <div class="flex items-center justify-center w-16 h-16 bg-gray-700/50 rounded-full border-2 border-gray-600 mb-2 text-2xl {color}">{}</div>
  <p class="font-semibold text-gray-300">{}</p>
  <p class="text-sm capitalize font-medium {color}">{}</p>
</div>"#,
                agent.stage,
                status_icon(agent.status),
                html_escape(&agent.name),
                agent.status.as_str()
            )
        })
        .collect();
    let connector = r#"<div class="hidden md:block flex-grow h-1 bg-gray-700 rounded-full"></div>"#;
    format!(
        r#"<div class="w-full max-w-4xl mt-8">
<div class="bg-gray-800/50 backdrop-blur-sm rounded-2xl p-6 border border-gray-700">
  <h3 class="text-xl font-bold text-cyan-400 mb-4 text-center">Generation Pipeline</h3>
  <div class="flex flex-col md:flex-row justify-between items-center space-y-4 md:space-y-0 md:space-x-4">
{}
  </div>
</div>
</div>"#,
        stages.join(connector)
    )
}

fn topic_form(topic: &str, is_loading: bool) -> String {
    let disabled = if is_loading || topic.trim().is_empty() { " disabled" } else { "" };
    let input_disabled = if is_loading { " disabled" } else { "" };
    let label = if is_loading { "Generating..." } else { "Generate Course" };
    format!(
        r#"<form method="post" action="/generate" class="flex flex-col sm:flex-row items-center gap-4">
  <input type="text" name="topic" value="{}" required pattern=".*\S.*" autofocus{input_disabled}
    oninput="this.form.querySelector('button').disabled = !this.value.trim()"
    placeholder="e.g., 'Introduction to Quantum Computing'"
    class="w-full flex-grow bg-gray-900 border-2 border-gray-600 rounded-lg px-4 py-3 text-lg text-gray-200 placeholder-gray-500" />
  <button type="submit"{disabled}
    class="w-full sm:w-auto bg-cyan-600 hover:bg-cyan-500 disabled:bg-gray-600 disabled:cursor-not-allowed text-white font-bold text-lg px-8 py-3 rounded-lg">{label}</button>
</form>"#,
        html_escape(topic)
    )
}

/// The interactive page for the current session.
///
/// `input_error` is an inline validation message for a rejected submission;
/// it takes precedence over the session's own error.
pub fn render_page(snapshot: &SessionSnapshot, input_error: Option<&str>, topic: Option<&str>) -> String {
    let topic = topic.or(snapshot.topic.as_deref()).unwrap_or_default();
    let error = input_error
        .or(snapshot.error.as_deref())
        .map(|e| format!(r#"<p class="text-red-400 mt-4 text-center">{}</p>"#, html_escape(e)))
        .unwrap_or_default();
    let refresh = if snapshot.is_loading { r#"<meta http-equiv="refresh" content="1">"# } else { "" };

    let pipeline = if snapshot.is_loading || snapshot.course.is_some() {
        pipeline_markup(&snapshot.statuses)
    } else {
        String::new()
    };

    let course = snapshot
        .course
        .as_ref()
        .map(|c| {
            format!(
                r#"<div class="w-full max-w-6xl mt-8">
<div class="bg-gray-800/50 backdrop-blur-sm rounded-2xl shadow-2xl p-6 md:p-8 border border-gray-700 relative">
  <a href="/api/course/export" download="{}" class="absolute top-4 right-4 bg-teal-600 hover:bg-teal-500 text-white font-bold py-2 px-4 rounded-lg">Download HTML</a>
{}
</div>
</div>"#,
                html_escape(&export_filename(&c.title)),
                course_markup(c, Surface::Interactive)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
{refresh}
<title>AI Course Architect</title>
{TAILWIND_CDN}
</head>
<body class="min-h-screen bg-gray-900 text-gray-100 font-sans flex flex-col">
<header class="bg-gray-900/80 backdrop-blur-sm border-b border-gray-700 sticky top-0 z-10">
  <div class="container mx-auto px-4 md:px-8 py-4 flex items-center justify-center">
    <h1 class="text-3xl md:text-4xl font-extrabold tracking-tight"><span class="text-white">AI Course</span><span class="text-cyan-400">Architect</span></h1>
  </div>
</header>
<main class="flex-grow container mx-auto p-4 md:p-8 flex flex-col items-center">
<div class="w-full max-w-4xl bg-gray-800/50 backdrop-blur-sm rounded-2xl shadow-2xl p-6 md:p-8 border border-gray-700">
  <h2 class="text-2xl md:text-3xl font-bold text-cyan-400 mb-4 text-center">Generate a 2-Hour Course Website</h2>
  <p class="text-gray-400 mb-6 text-center">Enter a topic, and our AI agents will build a complete, didactic lesson plan for you.</p>
{}
{error}
</div>
{pipeline}
{course}
</main>
</body>
</html>
"#,
        topic_form(topic, snapshot.is_loading)
    )
}
