use serde::{Deserialize, Serialize};

use crate::content::SourceKind;

#[derive(Debug, Default, Deserialize)]
pub struct ExtractUrlRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RecipeSuccess {
    pub success: bool,
    pub title: String,
    pub source: SourceKind,
    pub formatted_recipe: String,
    pub original_url: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RecipeFailure {
    pub error: String,
}

/// Response envelope shared by both extraction endpoints.
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum RecipeResult {
    Success(RecipeSuccess),
    Failure(RecipeFailure),
}

impl RecipeResult {
    pub fn success(
        title: impl Into<String>,
        source: SourceKind,
        formatted_recipe: impl Into<String>,
        original_url: impl Into<String>,
    ) -> Self {
        RecipeResult::Success(RecipeSuccess {
            success: true,
            title: title.into(),
            source,
            formatted_recipe: formatted_recipe.into(),
            original_url: original_url.into(),
        })
    }

    pub fn failure(error: impl Into<String>) -> Self {
        RecipeResult::Failure(RecipeFailure { error: error.into() })
    }
}
