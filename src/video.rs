use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::Html;
use serde::Deserialize;

use crate::content::{ContentSource, SourceKind};
use crate::error::{AppError, Result};
use crate::scraper::page_title;

static VIDEO_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([^&\n?#]+)",
        r"youtube\.com/watch\?.*v=([^&\n?#]+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Failed to compile video id pattern"))
    .collect()
});

static TIMED_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<text start="([\d.]+)"(?: dur="([\d.]+)")?[^>]*>(.*?)</text>"#)
        .expect("Failed to compile timed text pattern")
});

const TITLE_SUFFIX: &str = "- YouTube";
const CAPTION_TRACKS_KEY: &str = "\"captionTracks\":";

/// Returns the video id when `url` is a watch, short or embed link.
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .filter(|id| !id.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    pub text: String,
    pub offset_secs: f64,
    pub duration_secs: f64,
}

/// Retrieves the spoken-word transcript of a video in playback order.
#[async_trait]
pub trait TranscriptService: Send + Sync {
    async fn fetch_transcript(&self, video_id: &str) -> Result<Vec<TranscriptSegment>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    #[serde(default)]
    language_code: String,
}

/// Reads caption tracks advertised on the public watch page.
pub struct YoutubeTranscripts {
    client: Client,
    base_url: String,
}

impl YoutubeTranscripts {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        YoutubeTranscripts {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn caption_track_url(&self, video_id: &str) -> Result<String> {
        let watch_page = fetch_watch_page(&self.client, &self.base_url, video_id).await?;

        let start = watch_page
            .find(CAPTION_TRACKS_KEY)
            .map(|idx| idx + CAPTION_TRACKS_KEY.len())
            .ok_or_else(|| AppError::FetchError(format!("Transcript is disabled on this video ({})", video_id)))?;

        // The track list is embedded mid-script; parse one JSON value and ignore the rest
        let tracks: Vec<CaptionTrack> = serde_json::Deserializer::from_str(&watch_page[start..])
            .into_iter::<Vec<CaptionTrack>>()
            .next()
            .ok_or_else(|| AppError::FetchError("Empty caption track list".to_string()))?
            .map_err(|e| AppError::FetchError(format!("Unreadable caption track list: {}", e)))?;

        let track = tracks
            .iter()
            .find(|track| track.language_code.starts_with("en"))
            .or_else(|| tracks.first())
            .ok_or_else(|| AppError::FetchError(format!("No transcripts are available for this video ({})", video_id)))?;

        Ok(track.base_url.clone())
    }
}

#[async_trait]
impl TranscriptService for YoutubeTranscripts {
    async fn fetch_transcript(&self, video_id: &str) -> Result<Vec<TranscriptSegment>> {
        let track_url = self.caption_track_url(video_id).await?;

        let response = self.client.get(&track_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::FetchError(format!("Transcript request returned {}", status)));
        }

        let xml = response.text().await?;
        Ok(parse_timed_text(&xml))
    }
}

/// Parses the timed-text XML format into segments. Entities are decoded twice
/// because caption text arrives double-escaped.
pub fn parse_timed_text(xml: &str) -> Vec<TranscriptSegment> {
    TIMED_TEXT
        .captures_iter(xml)
        .map(|captures| {
            let raw = captures.get(3).map_or("", |m| m.as_str());
            let once = html_escape::decode_html_entities(raw);
            let text = html_escape::decode_html_entities(&once).trim().to_string();
            TranscriptSegment {
                text,
                offset_secs: captures.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0.0),
                duration_secs: captures.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0.0),
            }
        })
        .collect()
}

/// Segment texts in order, separated by single spaces.
pub fn join_segments(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|segment| segment.text.as_str())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

async fn fetch_watch_page(client: &Client, base_url: &str, video_id: &str) -> Result<String> {
    let url = format!("{}/watch?v={}", base_url, video_id);
    let response = client
        .get(&url)
        .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::FetchError(format!("Video page returned {}", status)));
    }

    Ok(response.text().await?)
}

/// Watch-page title without the platform suffix.
pub fn video_title(html: &str) -> String {
    let document = Html::parse_document(html);
    page_title(&document)
        .map(|title| title.strip_suffix(TITLE_SUFFIX).unwrap_or(&title).trim_end().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| "Unknown Title".to_string())
}

/// Transcript text plus the watch-page title for a single video.
pub async fn fetch_video_content(
    client: &Client,
    transcripts: &dyn TranscriptService,
    base_url: &str,
    video_id: &str,
) -> Result<ContentSource> {
    let segments = transcripts
        .fetch_transcript(video_id)
        .await
        .map_err(|e| AppError::FetchError(format!("Failed to extract YouTube content: {}", e)))?;
    tracing::info!(video_id, segments = segments.len(), "transcript retrieved");

    let watch_page = fetch_watch_page(client, base_url.trim_end_matches('/'), video_id)
        .await
        .map_err(|e| AppError::FetchError(format!("Failed to extract YouTube content: {}", e)))?;

    Ok(ContentSource::new(SourceKind::Video, video_title(&watch_page), join_segments(&segments)))
}
