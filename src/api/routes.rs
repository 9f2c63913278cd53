use axum::{
    routing::post,
    Router,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Json, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use url::Url;

use crate::error::{Result, AppError};
use crate::api::models::{ExtractUrlRequest, RecipeResult};
use crate::api::response;
use crate::content::{ContentSource, ExtractedText, SourceKind, IMAGE_TITLE};
use crate::formatter;
use crate::ocr::{self, MAX_IMAGE_BYTES};
use crate::scraper::{fetch_html, read_page};
use crate::video::{extract_video_id, fetch_video_content};
use crate::AppState;

/// Room for multipart framing on top of the largest accepted image.
const BODY_LIMIT_OVERHEAD: usize = 1024 * 1024;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/api/extract",
            post(extract_url_handler).fallback(response::method_not_allowed),
        )
        .route(
            "/api/extract-image",
            post(extract_image_handler).fallback(response::method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + BODY_LIMIT_OVERHEAD))
        .layer(CatchPanicLayer::custom(response::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

async fn extract_url_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ExtractUrlRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "unreadable extract request body");
            ExtractUrlRequest::default()
        }
    };

    let start_time = std::time::Instant::now();
    let result = process_url_request(&state, req.url).await;
    tracing::info!(elapsed = ?start_time.elapsed(), ok = result.is_ok(), "url extraction finished");

    match result {
        Ok(result) => response::success(result).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn extract_image_handler(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let start_time = std::time::Instant::now();
    let result = process_image_request(&state, multipart).await;
    tracing::info!(elapsed = ?start_time.elapsed(), ok = result.is_ok(), "image extraction finished");

    match result {
        Ok(result) => response::success(result).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn process_url_request(state: &AppState, url: Option<String>) -> Result<RecipeResult> {
    let url = url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| AppError::ValidationError("Please provide a URL".to_string()))?;
    validate_url(&url)?;

    tracing::info!(%url, "processing extract request");

    let source = match extract_video_id(&url) {
        Some(video_id) => {
            tracing::info!(%video_id, "classified as video");
            fetch_video_content(&state.http, state.transcripts.as_ref(), &state.config.youtube_base_url, &video_id)
                .await?
        }
        None => fetch_website_content(state, &url).await?,
    };

    let extracted = select_text(source)?;
    let formatted = format_for_response(state, &extracted).await?;

    Ok(RecipeResult::success(extracted.title, extracted.source, formatted, url))
}

async fn process_image_request(
    state: &AppState,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<RecipeResult> {
    let mut multipart = multipart.map_err(|rejection| {
        AppError::ValidationError(format!("Expected a multipart form upload: {}", rejection.body_text()))
    })?;

    let bytes = read_image_field(&mut multipart)
        .await?
        .ok_or_else(|| AppError::ValidationError("No image file provided".to_string()))?;
    tracing::info!(bytes = bytes.len(), "processing image upload");

    let text = ocr::extract_image_text(state.ocr.as_ref(), bytes).await?;

    let extracted = ExtractedText::new(&text, IMAGE_TITLE, SourceKind::Image);
    if extracted.is_blank() {
        return Err(AppError::ExtractionError(
            "No text could be extracted from the image. Please ensure the image contains readable text.".to_string(),
        ));
    }

    let formatted = format_for_response(state, &extracted).await?;
    Ok(RecipeResult::success(extracted.title, SourceKind::Image, formatted, "Uploaded Image"))
}

fn validate_url(raw: &str) -> Result<()> {
    let parsed = Url::parse(raw).map_err(|e| AppError::ValidationError(format!("Invalid URL: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(AppError::ValidationError(format!("Unsupported URL scheme: {}", other))),
    }
}

async fn fetch_website_content(state: &AppState, url: &str) -> Result<ContentSource> {
    let fetch_start = std::time::Instant::now();
    let html = fetch_html(&state.http, url).await.map_err(|e| match e {
        AppError::FetchError(msg) if msg.starts_with("Failed to scrape website") => AppError::FetchError(msg),
        other => AppError::FetchError(format!("Failed to scrape website: {}", other)),
    })?;
    tracing::info!(elapsed = ?fetch_start.elapsed(), bytes = html.len(), "html fetched");

    let page = read_page(&state.selectors, &html);
    Ok(ContentSource::new(SourceKind::Website, page.title, page.text.unwrap_or_default()))
}

fn select_text(source: ContentSource) -> Result<ExtractedText> {
    let extracted = ExtractedText::new(&source.text, source.title, source.kind);
    if extracted.is_blank() {
        let what = match source.kind {
            SourceKind::Video => "the video transcript",
            _ => "the page",
        };
        return Err(AppError::ExtractionError(format!("No text could be extracted from {}", what)));
    }

    tracing::debug!(chars = extracted.text().chars().count(), "content selected for formatting");
    Ok(extracted)
}

/// Formatting failures become the recipe body unless strict formatting is on.
async fn format_for_response(state: &AppState, extracted: &ExtractedText) -> Result<String> {
    let llm_start = std::time::Instant::now();
    match formatter::format_recipe(state.completion.as_ref(), extracted).await {
        Ok(formatted) => {
            tracing::info!(elapsed = ?llm_start.elapsed(), "recipe formatted");
            Ok(formatted)
        }
        Err(err) if state.config.strict_formatting => Err(err),
        Err(err) => {
            tracing::warn!(error = %err, "completion failed, returning error text as recipe");
            Ok(formatter::degrade(&err))
        }
    }
}

async fn read_image_field(multipart: &mut Multipart) -> Result<Option<Vec<u8>>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("image") {
            continue;
        }

        // Reject on the declared type before reading the payload
        let content_type = field.content_type().map(str::to_string);
        ocr::validate_upload(content_type.as_deref(), 0)?;

        let data = field.bytes().await.map_err(multipart_error)?;
        ocr::validate_upload(content_type.as_deref(), data.len())?;
        return Ok(Some(data.to_vec()));
    }

    Ok(None)
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::ValidationError(format!("File too large. Maximum size is {} bytes", MAX_IMAGE_BYTES))
    } else {
        AppError::ValidationError(format!("Failed to read multipart data: {}", err.body_text()))
    }
}
