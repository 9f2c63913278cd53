use serde::Serialize;

/// Maximum number of characters forwarded to the completion service.
pub const CONTENT_CHAR_BUDGET: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    Website,
    #[serde(rename = "YouTube")]
    Video,
    Image,
}

impl SourceKind {
    /// Label shown to users and used in the prompt.
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Website => "Website",
            SourceKind::Video => "YouTube",
            SourceKind::Image => "Image",
        }
    }
}

/// Title shown for recipes read from an uploaded image.
pub const IMAGE_TITLE: &str = "Recipe from Image";

/// Text acquired for a single request from a page or a video.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentSource {
    pub kind: SourceKind,
    pub title: String,
    pub text: String,
}

impl ContentSource {
    pub fn new(kind: SourceKind, title: impl Into<String>, text: impl Into<String>) -> Self {
        ContentSource {
            kind,
            title: title.into(),
            text: text.into(),
        }
    }
}

/// Text ready for formatting, capped at [`CONTENT_CHAR_BUDGET`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    text: String,
    pub title: String,
    pub source: SourceKind,
}

impl ExtractedText {
    pub fn new(text: &str, title: impl Into<String>, source: SourceKind) -> Self {
        ExtractedText {
            text: truncate_chars(text, CONTENT_CHAR_BUDGET).to_string(),
            title: title.into(),
            source,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
