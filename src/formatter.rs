use crate::content::{ExtractedText, SourceKind};
use crate::error::{AppError, Result};
use crate::llm::{CompletionRequest, CompletionService};

pub const TEMPERATURE: f32 = 0.3;
pub const MAX_OUTPUT_TOKENS: u32 = 1500;

const EMPTY_COMPLETION: &str = "Failed to format recipe";

const OUTPUT_LAYOUT: &str = "Please format the output as follows:
- Recipe Title
- Description (brief)
- Prep Time & Cook Time (if available)
- Servings (if available)
- Ingredients (bulleted list with quantities)
- Instructions (numbered steps)
- Notes or Tips (if any)";

fn system_prompt(source: SourceKind) -> &'static str {
    match source {
        SourceKind::Image => "You are a helpful assistant that extracts and formats recipes from OCR text. Always provide clear, well-structured recipe formatting. If the text is unclear or incomplete, do your best to format what's available.",
        SourceKind::Website | SourceKind::Video => "You are a helpful assistant that extracts and formats recipes from various content sources. Always provide clear, well-structured recipe formatting.",
    }
}

pub fn build_prompt(extracted: &ExtractedText) -> String {
    let text = extracted.text();
    let mut prompt = String::with_capacity(text.len() + 800);

    match extracted.source {
        SourceKind::Image => {
            prompt.push_str("Please extract and format the following text from an image into a clean, well-structured recipe format.\n\n");
            prompt.push_str("Extracted Text: ");
        }
        source => {
            prompt.push_str("Please extract and format the following ");
            prompt.push_str(&source.label().to_lowercase());
            prompt.push_str(" content into a clean, well-structured recipe format.\n\n");
            prompt.push_str("Title: ");
            prompt.push_str(&extracted.title);
            prompt.push_str("\n\nContent: ");
        }
    }
    prompt.push_str(text);
    prompt.push_str("\n\n");
    prompt.push_str(OUTPUT_LAYOUT);
    prompt.push_str("\n\nIf the content doesn't contain a complete recipe, please extract whatever recipe information is available and note what's missing.");
    if extracted.source == SourceKind::Image {
        prompt.push_str(" If there's no recipe content at all, please indicate that clearly.");
    }

    prompt
}

/// Asks the completion service for a formatted recipe. Errors come back as
/// [`AppError::FormattingError`].
pub async fn format_recipe(service: &dyn CompletionService, extracted: &ExtractedText) -> Result<String> {
    let request = CompletionRequest {
        system: system_prompt(extracted.source).to_string(),
        user: build_prompt(extracted),
        temperature: TEMPERATURE,
        max_tokens: MAX_OUTPUT_TOKENS,
    };

    let reply = service.complete(&request).await.map_err(|e| match e {
        AppError::FormattingError(msg) => AppError::FormattingError(msg),
        other => AppError::FormattingError(other.to_string()),
    })?;

    if reply.trim().is_empty() {
        return Ok(EMPTY_COMPLETION.to_string());
    }

    Ok(reply)
}

/// Displayable text for a failed formatting attempt.
pub fn degrade(err: &AppError) -> String {
    match err {
        AppError::FormattingError(_) => err.to_string(),
        other => format!("Error formatting recipe with OpenAI: {}", other),
    }
}
