use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageReader;
use reqwest::Client;
use serde_json::{json, Value};
use std::io::Cursor;

use crate::error::{AppError, Result};

/// Maximum accepted upload size (10MB).
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_IMAGE_DIMENSION: u32 = 1200;
pub const JPEG_QUALITY: u8 = 90;

/// Rejects uploads that are not declared as images or exceed [`MAX_IMAGE_BYTES`].
pub fn validate_upload(content_type: Option<&str>, len: usize) -> Result<()> {
    let is_image = content_type
        .map(|mime| mime.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false);
    if !is_image {
        return Err(AppError::ValidationError("Only image files are allowed".to_string()));
    }

    if len > MAX_IMAGE_BYTES {
        return Err(AppError::ValidationError(format!(
            "File too large. Maximum size is {} bytes",
            MAX_IMAGE_BYTES
        )));
    }

    Ok(())
}

/// Decodes an image, shrinks it to fit within [`MAX_IMAGE_DIMENSION`] on both axes
/// (never enlarging) and re-encodes it as JPEG.
pub fn prepare_image(data: &[u8]) -> Result<Vec<u8>> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| AppError::ValidationError(format!("Failed to read image: {}", e)))?;

    let img = reader
        .decode()
        .map_err(|e| AppError::ValidationError(format!("Failed to decode image: {}", e)))?;

    let img = if img.width() > MAX_IMAGE_DIMENSION || img.height() > MAX_IMAGE_DIMENSION {
        // resize() keeps the aspect ratio, fitting inside the bounds
        img.resize(MAX_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| AppError::Unhandled(format!("Image processing failed: {}", e)))?;

    Ok(buf)
}

/// Image-to-text backend.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<String>;
}

/// OCR through the Google Cloud Vision `TEXT_DETECTION` feature.
pub struct GoogleVisionRecognizer {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl GoogleVisionRecognizer {
    pub fn new(client: Client, api_key: Option<String>, base_url: impl Into<String>) -> Self {
        GoogleVisionRecognizer {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TextRecognizer for GoogleVisionRecognizer {
    async fn recognize(&self, image: &[u8]) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::ConfigError("GOOGLE_API_KEY is not set; image OCR is unavailable".to_string()))?;

        let request_body = json!({
            "requests": [{
                "image": {
                    "content": STANDARD.encode(image)
                },
                "features": [{
                    "type": "TEXT_DETECTION"
                }]
            }]
        });

        tracing::debug!(bytes = image.len(), "sending OCR request to Google Vision API");

        let response = self
            .client
            .post(format!("{}/v1/images:annotate", self.base_url))
            .query(&[("key", api_key)])
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::FetchError(format!(
                "Google Vision API error ({}): {}",
                status,
                error_text.trim()
            )));
        }

        let body: Value = response.json().await?;

        if let Some(message) = body["responses"][0]["error"]["message"].as_str() {
            return Err(AppError::FetchError(format!("Google Vision API error: {}", message)));
        }

        // No annotation means the image held no detectable text
        let text = body["responses"][0]["fullTextAnnotation"]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        tracing::debug!(chars = text.len(), "text recognised from image");
        Ok(text)
    }
}

/// Resizes the uploaded image off the async runtime, then runs OCR on the result.
pub async fn extract_image_text(recognizer: &dyn TextRecognizer, bytes: Vec<u8>) -> Result<String> {
    let prepared = tokio::task::spawn_blocking(move || prepare_image(&bytes)).await??;
    tracing::info!(bytes = prepared.len(), "image prepared for OCR");

    recognizer.recognize(&prepared).await
}
