use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// Inline message shown when a rich-preview file has no registered renderer.
pub const NO_PREVIEW_MESSAGE: &str = "No preview available for this file type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    Html,
    Markdown,
    Csv,
}

/// Extensions that have a rich preview.
pub fn select_renderer(extension: &str) -> Option<RendererKind> {
    match extension {
        "html" | "htm" => Some(RendererKind::Html),
        "md" | "markdown" => Some(RendererKind::Markdown),
        "csv" | "tsv" => Some(RendererKind::Csv),
        _ => None,
    }
}

pub struct PreviewInput<'a> {
    pub content: &'a str,
    pub preview_url: &'a str,
    pub extension: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPreview {
    pub kind: RendererKind,
    pub title: Option<String>,
    pub body: String,
    pub source_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderOutcome {
    Rendered(RenderedPreview),
    Mismatch { message: String },
}

pub trait PreviewRenderer: Send + Sync {
    fn kind(&self) -> RendererKind;

    fn render(&self, input: &PreviewInput<'_>) -> RenderedPreview;
}

pub struct RendererRegistry {
    renderers: HashMap<RendererKind, Box<dyn PreviewRenderer>>,
}

impl RendererRegistry {
    pub fn empty() -> Self {
        Self {
            renderers: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(HtmlRenderer));
        registry.register(Box::new(MarkdownRenderer));
        registry.register(Box::new(CsvRenderer));
        registry
    }

    pub fn register(&mut self, renderer: Box<dyn PreviewRenderer>) {
        debug!("Registering preview renderer: {:?}", renderer.kind());
        self.renderers.insert(renderer.kind(), renderer);
    }

    pub fn dispatch(&self, input: &PreviewInput<'_>) -> RenderOutcome {
        let renderer = select_renderer(input.extension).and_then(|kind| self.renderers.get(&kind));
        match renderer {
            Some(renderer) => RenderOutcome::Rendered(renderer.render(input)),
            None => RenderOutcome::Mismatch {
                message: NO_PREVIEW_MESSAGE.to_string(),
            },
        }
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

static HTML_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));
static HTML_HIDDEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|head)\b[^>]*>.*?</(script|style|head)>")
        .expect("valid hidden block regex")
});
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Text outline of an HTML document: its title and visible text.
pub struct HtmlRenderer;

impl PreviewRenderer for HtmlRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::Html
    }

    fn render(&self, input: &PreviewInput<'_>) -> RenderedPreview {
        let title = HTML_TITLE
            .captures(input.content)
            .map(|c| WHITESPACE.replace_all(c[1].trim(), " ").into_owned())
            .filter(|t| !t.is_empty());
        let visible = HTML_HIDDEN.replace_all(input.content, " ");
        let text = HTML_TAG.replace_all(&visible, " ");
        let body = WHITESPACE.replace_all(text.trim(), " ").into_owned();

        RenderedPreview {
            kind: RendererKind::Html,
            title,
            body,
            source_url: input.preview_url.to_string(),
        }
    }
}

/// First heading becomes the title; the document itself is passed through.
pub struct MarkdownRenderer;

impl PreviewRenderer for MarkdownRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::Markdown
    }

    fn render(&self, input: &PreviewInput<'_>) -> RenderedPreview {
        let title = input
            .content
            .lines()
            .map(str::trim_start)
            .find(|line| line.starts_with('#'))
            .map(|line| line.trim_start_matches('#').trim().to_string())
            .filter(|t| !t.is_empty());

        RenderedPreview {
            kind: RendererKind::Markdown,
            title,
            body: input.content.trim_end().to_string(),
            source_url: input.preview_url.to_string(),
        }
    }
}

/// Tabular summary: header row, row count and column count.
pub struct CsvRenderer;

impl CsvRenderer {
    fn delimiter(extension: &str) -> char {
        if extension == "tsv" {
            '\t'
        } else {
            ','
        }
    }
}

impl PreviewRenderer for CsvRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::Csv
    }

    fn render(&self, input: &PreviewInput<'_>) -> RenderedPreview {
        let delimiter = Self::delimiter(input.extension);
        let rows: Vec<Vec<String>> = input
            .content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| split_record(line, delimiter))
            .collect();

        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        let data_rows = rows.len().saturating_sub(1);
        let header = rows.first().map(|h| h.join(" | ")).unwrap_or_default();

        let mut body = format!("{} rows x {} columns", data_rows, columns);
        if !header.is_empty() {
            body.push('\n');
            body.push_str(&header);
        }
        for row in rows.iter().skip(1) {
            body.push('\n');
            body.push_str(&row.join(" | "));
        }

        RenderedPreview {
            kind: RendererKind::Csv,
            title: None,
            body,
            source_url: input.preview_url.to_string(),
        }
    }
}

fn split_record(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}
