use reqwest::{Client, ClientBuilder};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::time::Duration;
use once_cell::sync::Lazy;
use crate::error::{AppError, Result};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Selectors tried after structured data, most specific first.
pub const CONTENT_SELECTORS: &[&str] = &[
    ".recipe",
    ".recipe-content",
    ".recipe-instructions",
    ".recipe-ingredients",
    "[itemtype*=\"Recipe\"]",
    ".entry-content",
    ".post-content",
    "main",
    "article",
];

// Create static selectors to avoid recompiling them each time
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("body").expect("Failed to parse body selector")
});

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("title").expect("Failed to parse title selector")
});

static JSON_LD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("Failed to parse JSON-LD selector")
});

static NOISE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script, style, nav, header, footer, aside").expect("Failed to parse noise selector")
});

/// Client shared by every outbound page fetch.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .user_agent(BROWSER_USER_AGENT)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))
}

pub async fn fetch_html(client: &Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::FetchError(format!("Failed to scrape website: {} returned {}", url, status)));
    }

    let html = response.text().await?;
    Ok(html)
}

/// Trimmed `<title>` text, if the document has a non-empty one.
pub fn page_title(document: &Html) -> Option<String> {
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Visible text of an element with runs of whitespace collapsed.
pub fn visible_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Detaches script, style and page-chrome elements from the tree.
pub fn strip_noise(document: &mut Html) {
    let ids: Vec<_> = document.select(&NOISE_SELECTOR).map(|element| element.id()).collect();
    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// One heuristic for pulling recipe text out of a page.
pub trait ContentStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `None` when the heuristic does not apply or finds only whitespace.
    fn select(&self, document: &Html) -> Option<String>;

    /// Whether the strategy must see the page before noise elements are removed.
    fn needs_raw_document(&self) -> bool {
        false
    }
}

/// Embedded `application/ld+json` data typed as a Recipe.
pub struct JsonLdRecipe;

impl JsonLdRecipe {
    fn find_recipe(value: &Value) -> Option<&Value> {
        let root = match value {
            Value::Array(items) => items.first()?,
            other => other,
        };

        if is_recipe(root) {
            return Some(root);
        }

        root.get("@graph")
            .and_then(Value::as_array)
            .and_then(|graph| graph.iter().find(|node| is_recipe(node)))
    }
}

fn is_recipe(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(kind)) => kind == "Recipe",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind.as_str() == Some("Recipe")),
        _ => false,
    }
}

impl ContentStrategy for JsonLdRecipe {
    fn name(&self) -> &str {
        "json-ld"
    }

    fn needs_raw_document(&self) -> bool {
        true
    }

    fn select(&self, document: &Html) -> Option<String> {
        document.select(&JSON_LD_SELECTOR).find_map(|script| {
            let raw = script.text().collect::<String>();
            let parsed: Value = match serde_json::from_str(raw.trim()) {
                Ok(value) => value,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unparsable JSON-LD block");
                    return None;
                }
            };
            Self::find_recipe(&parsed).and_then(|recipe| serde_json::to_string_pretty(recipe).ok())
        })
    }
}

/// Concatenated text of every element matching a CSS selector.
pub struct CssSelectorStrategy {
    source: &'static str,
    selector: Selector,
}

impl CssSelectorStrategy {
    pub fn new(source: &'static str) -> Result<Self> {
        let selector = Selector::parse(source)
            .map_err(|e| AppError::ConfigError(format!("Invalid selector {}: {:?}", source, e)))?;
        Ok(CssSelectorStrategy { source, selector })
    }
}

impl ContentStrategy for CssSelectorStrategy {
    fn name(&self) -> &str {
        self.source
    }

    fn select(&self, document: &Html) -> Option<String> {
        let text = document
            .select(&self.selector)
            .map(visible_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        (!text.is_empty()).then_some(text)
    }
}

/// Last resort: everything visible in `<body>`.
pub struct WholeBody;

impl ContentStrategy for WholeBody {
    fn name(&self) -> &str {
        "body"
    }

    fn select(&self, document: &Html) -> Option<String> {
        let text = document.select(&BODY_SELECTOR).next().map(visible_text)?;
        (!text.is_empty()).then_some(text)
    }
}

/// Ordered list of strategies; the first non-empty result wins.
pub struct SelectorChain {
    strategies: Vec<Box<dyn ContentStrategy>>,
}

impl SelectorChain {
    pub fn new(strategies: Vec<Box<dyn ContentStrategy>>) -> Self {
        SelectorChain { strategies }
    }

    #[cfg(test)]
    fn strategies(&self) -> impl Iterator<Item = &str> {
        self.strategies.iter().map(|strategy| strategy.name())
    }

    #[cfg(test)]
    fn select_html(&self, html: &str) -> Option<String> {
        let mut document = Html::parse_document(html);
        self.select(&mut document)
    }

    /// Runs the chain. Raw-document strategies run before noise stripping.
    pub fn select(&self, document: &mut Html) -> Option<String> {
        let (structured, cleaned): (Vec<_>, Vec<_>) = self
            .strategies
            .iter()
            .partition(|strategy| strategy.needs_raw_document());

        if let Some(found) = Self::first_match(&structured, document) {
            return Some(found);
        }

        strip_noise(document);
        Self::first_match(&cleaned, document)
    }

    fn first_match(strategies: &[&Box<dyn ContentStrategy>], document: &Html) -> Option<String> {
        strategies.iter().find_map(|strategy| {
            let found = strategy.select(document)?;
            tracing::debug!(strategy = strategy.name(), chars = found.len(), "content selected");
            Some(found)
        })
    }
}

/// Title and selected text of a fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub title: String,
    pub text: Option<String>,
}

/// Parses `html` once, reading the title before the selector chain mutates the tree.
pub fn read_page(chain: &SelectorChain, html: &str) -> Page {
    let mut document = Html::parse_document(html);
    let title = page_title(&document).unwrap_or_else(|| "Recipe".to_string());
    let text = chain.select(&mut document);
    Page { title, text }
}

impl Default for SelectorChain {
    fn default() -> Self {
        let mut strategies: Vec<Box<dyn ContentStrategy>> = vec![Box::new(JsonLdRecipe)];
        for source in CONTENT_SELECTORS {
            match CssSelectorStrategy::new(source) {
                Ok(strategy) => strategies.push(Box::new(strategy)),
                Err(e) => tracing::error!(error = %e, "dropping content selector"),
            }
        }
        strategies.push(Box::new(WholeBody));
        SelectorChain::new(strategies)
    }
}
