pub mod api;
pub mod config;
pub mod content;
pub mod error;
pub mod formatter;
pub mod llm;
pub mod ocr;
pub mod scraper;
pub mod video;

use std::sync::Arc;
use crate::config::Config;
use crate::error::Result;
use crate::llm::CompletionService;
use crate::ocr::{GoogleVisionRecognizer, TextRecognizer};
use crate::scraper::SelectorChain;
use crate::video::{TranscriptService, YoutubeTranscripts};

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Outbound client for page and watch-page fetches.
    pub http: reqwest::Client,
    pub completion: Arc<dyn CompletionService>,
    pub transcripts: Arc<dyn TranscriptService>,
    pub ocr: Arc<dyn TextRecognizer>,
    pub selectors: Arc<SelectorChain>,
}

impl AppState {
    /// Wires the default collaborators around an already constructed completion client.
    pub fn new(config: Config, completion: Arc<dyn CompletionService>) -> Result<Self> {
        let http = crate::scraper::build_client(config.fetch_timeout)?;

        let transcripts = Arc::new(YoutubeTranscripts::new(http.clone(), config.youtube_base_url.clone()));
        let ocr = Arc::new(GoogleVisionRecognizer::new(
            http.clone(),
            config.google_api_key.clone(),
            config.vision_base_url.clone(),
        ));

        Ok(AppState {
            config: Arc::new(config),
            http,
            completion,
            transcripts,
            ocr,
            selectors: Arc::new(SelectorChain::default()),
        })
    }
}
