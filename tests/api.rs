use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::{json, Value};
use tower::ServiceExt;

use recipe_extractor::api::routes::create_router;
use recipe_extractor::config::Config;
use recipe_extractor::error::Result;
use recipe_extractor::llm::OpenAiClient;
use recipe_extractor::ocr::{TextRecognizer, MAX_IMAGE_BYTES};
use recipe_extractor::video::{TranscriptService, TranscriptSegment};
use recipe_extractor::AppState;

struct FakeTranscripts {
    segments: Vec<&'static str>,
    calls: AtomicUsize,
}

#[async_trait]
impl TranscriptService for FakeTranscripts {
    async fn fetch_transcript(&self, _video_id: &str) -> Result<Vec<TranscriptSegment>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .segments
            .iter()
            .map(|text| TranscriptSegment {
                text: text.to_string(),
                offset_secs: 0.0,
                duration_secs: 1.0,
            })
            .collect())
    }
}

struct FakeOcr {
    text: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl TextRecognizer for FakeOcr {
    async fn recognize(&self, _image: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.to_string())
    }
}

struct Harness {
    server: ServerGuard,
    transcripts: Arc<FakeTranscripts>,
    ocr: Arc<FakeOcr>,
    strict: bool,
}

impl Harness {
    async fn new() -> Self {
        Harness {
            server: Server::new_async().await,
            transcripts: Arc::new(FakeTranscripts {
                segments: vec!["today we whisk the eggs", "with a cup of sugar"],
                calls: AtomicUsize::new(0),
            }),
            ocr: Arc::new(FakeOcr {
                text: "Lemon Bars\n1 cup sugar\nBake 20 minutes",
                calls: AtomicUsize::new(0),
            }),
            strict: false,
        }
    }

    fn app(&self) -> Router {
        let mut vars = HashMap::new();
        vars.insert("OPENAI_API_KEY", "sk-test".to_string());
        vars.insert("OPENAI_BASE_URL", self.server.url());
        vars.insert("YOUTUBE_BASE_URL", self.server.url());
        vars.insert("STRICT_FORMATTING", self.strict.to_string());
        let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();

        let completion = Arc::new(
            OpenAiClient::new("sk-test", self.server.url(), "gpt-3.5-turbo", config.completion_timeout).unwrap(),
        );
        let mut state = AppState::new(config, completion).unwrap();
        state.transcripts = self.transcripts.clone();
        state.ocr = self.ocr.clone();
        create_router(state)
    }

    async fn mock_completion(&mut self, reply: &str, hits: usize) -> mockito::Mock {
        self.server
            .mock("POST", "/v1/chat/completions")
            .expect(hits)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"choices": [{"message": {"content": reply}}]}).to_string())
            .create_async()
            .await
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn multipart_request(field: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    let boundary = "recipe-test-boundary";
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"upload\"\r\nContent-Type: {}\r\n\r\n",
            field, content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/extract-image")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
        .body(Body::from(body))
        .unwrap()
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(64, 32, image::Rgb([250, 250, 250]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

#[tokio::test]
async fn youtube_short_link_end_to_end() {
    let mut harness = Harness::new().await;
    let watch = harness
        .server
        .mock("GET", "/watch")
        .match_query(Matcher::UrlEncoded("v".into(), "abc123".into()))
        .with_status(200)
        .with_body("<html><head><title>Sponge Cake - YouTube</title></head><body></body></html>")
        .create_async()
        .await;
    let completion = harness
        .server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::Regex("today we whisk the eggs with a cup of sugar".into()))
        .with_status(200)
        .with_body(r##"{"choices":[{"message":{"content":"# Sponge Cake\n- 3 eggs"}}]}"##)
        .expect(1)
        .create_async()
        .await;

    let (status, body) = send(
        harness.app(),
        json_request("/api/extract", json!({"url": "https://youtu.be/abc123"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["source"], "YouTube");
    assert_eq!(body["title"], "Sponge Cake");
    assert_eq!(body["formatted_recipe"], "# Sponge Cake\n- 3 eggs");
    assert_eq!(body["original_url"], "https://youtu.be/abc123");
    assert_eq!(harness.transcripts.calls.load(Ordering::SeqCst), 1);
    watch.assert_async().await;
    completion.assert_async().await;
}

#[tokio::test]
async fn website_with_json_ld_end_to_end() {
    let mut harness = Harness::new().await;
    let page = harness
        .server
        .mock("GET", "/best-focaccia")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(
            r#"<html><head><title>Best Focaccia</title>
            <script type="application/ld+json">{"@type":"Recipe","name":"Focaccia","recipeIngredient":["500g flour"]}</script>
            </head><body><nav>menu</nav><div class="recipe">fallback</div></body></html>"#,
        )
        .create_async()
        .await;
    let completion = harness
        .server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::Regex("500g flour".into()))
        .with_status(200)
        .with_body(r##"{"choices":[{"message":{"content":"# Focaccia"}}]}"##)
        .expect(1)
        .create_async()
        .await;

    let url = format!("{}/best-focaccia", harness.server.url());
    let (status, body) = send(harness.app(), json_request("/api/extract", json!({ "url": url }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["source"], "Website");
    assert_eq!(body["title"], "Best Focaccia");
    assert_eq!(body["formatted_recipe"], "# Focaccia");
    assert_eq!(body["original_url"], url);
    assert!(body.get("error").is_none());
    page.assert_async().await;
    completion.assert_async().await;
}

#[tokio::test]
async fn completion_failure_still_returns_success_envelope() {
    let mut harness = Harness::new().await;
    let _page = harness
        .server
        .mock("GET", "/soup")
        .with_status(200)
        .with_body("<html><body><article>Simmer the broth.</article></body></html>")
        .create_async()
        .await;
    let _completion = harness
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(500)
        .with_body("upstream exploded")
        .create_async()
        .await;

    let url = format!("{}/soup", harness.server.url());
    let (status, body) = send(harness.app(), json_request("/api/extract", json!({ "url": url }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let formatted = body["formatted_recipe"].as_str().unwrap();
    assert!(formatted.starts_with("Error formatting recipe with OpenAI"), "{}", formatted);
    assert!(formatted.contains("500"));
}

#[tokio::test]
async fn strict_formatting_surfaces_completion_failure() {
    let mut harness = Harness::new().await;
    harness.strict = true;
    let _page = harness
        .server
        .mock("GET", "/soup")
        .with_status(200)
        .with_body("<html><body><article>Simmer the broth.</article></body></html>")
        .create_async()
        .await;
    let _completion = harness
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(500)
        .create_async()
        .await;

    let url = format!("{}/soup", harness.server.url());
    let (status, body) = send(harness.app(), json_request("/api/extract", json!({ "url": url }))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.get("success").is_none());
    assert!(body["error"].as_str().unwrap().contains("Error formatting recipe"));
}

#[tokio::test]
async fn missing_url_is_rejected() {
    let harness = Harness::new().await;

    let (status, body) = send(harness.app(), json_request("/api/extract", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please provide a URL");

    let (status, body) = send(harness.app(), json_request("/api/extract", json!({"url": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn unreadable_body_is_treated_as_missing_url() {
    let harness = Harness::new().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/extract")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(harness.app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please provide a URL");
}

#[tokio::test]
async fn malformed_url_is_rejected() {
    let harness = Harness::new().await;
    let (status, body) = send(harness.app(), json_request("/api/extract", json!({"url": "recipes/cake"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid URL"));
}

#[tokio::test]
async fn upstream_error_status_is_a_bad_request() {
    let mut harness = Harness::new().await;
    let _page = harness.server.mock("GET", "/gone").with_status(404).create_async().await;
    let completion = harness.mock_completion("unused", 0).await;

    let url = format!("{}/gone", harness.server.url());
    let (status, body) = send(harness.app(), json_request("/api/extract", json!({ "url": url }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Failed to scrape website"), "{}", error);
    assert!(error.contains("404"));
    completion.assert_async().await;
}

#[tokio::test]
async fn page_without_text_is_an_extraction_error() {
    let mut harness = Harness::new().await;
    let _page = harness
        .server
        .mock("GET", "/blank")
        .with_status(200)
        .with_body("<html><head><title>Blank</title></head><body><script>track()</script></body></html>")
        .create_async()
        .await;

    let url = format!("{}/blank", harness.server.url());
    let (status, body) = send(harness.app(), json_request("/api/extract", json!({ "url": url }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("No text could be extracted"));
}

#[tokio::test]
async fn non_post_methods_are_not_allowed() {
    let harness = Harness::new().await;

    for uri in ["/api/extract", "/api/extract-image"] {
        let request = Request::builder().method(Method::GET).uri(uri).body(Body::empty()).unwrap();
        let (status, body) = send(harness.app(), request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{}", uri);
        assert_eq!(body["error"], "Method not allowed");
    }
}

#[tokio::test]
async fn image_upload_end_to_end() {
    let mut harness = Harness::new().await;
    let completion = harness
        .server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::Regex("Lemon Bars".into()))
        .with_status(200)
        .with_body(r##"{"choices":[{"message":{"content":"# Lemon Bars"}}]}"##)
        .expect(1)
        .create_async()
        .await;

    let (status, body) = send(harness.app(), multipart_request("image", "image/png", &png_bytes())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "success": true,
            "title": "Recipe from Image",
            "source": "Image",
            "formatted_recipe": "# Lemon Bars",
            "original_url": "Uploaded Image"
        })
    );
    assert_eq!(harness.ocr.calls.load(Ordering::SeqCst), 1);
    completion.assert_async().await;
}

#[tokio::test]
async fn missing_image_field_is_rejected() {
    let harness = Harness::new().await;
    let (status, body) = send(harness.app(), multipart_request("document", "image/png", &png_bytes())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image file provided");
}

#[tokio::test]
async fn non_multipart_upload_is_rejected() {
    let harness = Harness::new().await;
    let (status, body) = send(harness.app(), json_request("/api/extract-image", json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn non_image_upload_is_rejected_before_ocr() {
    let harness = Harness::new().await;
    let (status, body) = send(harness.app(), multipart_request("image", "application/pdf", b"%PDF-1.4")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Only image files are allowed");
    assert_eq!(harness.ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversized_image_is_rejected_before_ocr() {
    let mut harness = Harness::new().await;
    let completion = harness.mock_completion("unused", 0).await;

    let data = vec![0u8; MAX_IMAGE_BYTES + 1];
    let (status, body) = send(harness.app(), multipart_request("image", "image/jpeg", &data)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("too large"));
    assert_eq!(harness.ocr.calls.load(Ordering::SeqCst), 0);
    completion.assert_async().await;
}

#[tokio::test]
async fn blank_ocr_text_is_an_extraction_error() {
    let mut harness = Harness::new().await;
    harness.ocr = Arc::new(FakeOcr {
        text: "   \n ",
        calls: AtomicUsize::new(0),
    });

    let (status, body) = send(harness.app(), multipart_request("image", "image/png", &png_bytes())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("No text could be extracted from the image"));
    assert_eq!(harness.ocr.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn body_over_upload_limit_is_rejected_before_ocr() {
    let mut harness = Harness::new().await;
    let completion = harness.mock_completion("unused", 0).await;

    let data = vec![0u8; MAX_IMAGE_BYTES + 2 * 1024 * 1024];
    let (status, body) = send(harness.app(), multipart_request("image", "image/jpeg", &data)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("too large"));
    assert_eq!(harness.ocr.calls.load(Ordering::SeqCst), 0);
    completion.assert_async().await;
}
