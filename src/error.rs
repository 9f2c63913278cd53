use axum::{
    response::{IntoResponse, Response},
    Json,
    http::StatusCode,
};

use crate::api::models::RecipeResult;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    FetchError(String),

    #[error("{0}")]
    ExtractionError(String),

    #[error("Error formatting recipe with OpenAI: {0}")]
    FormattingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("An error occurred: {0}")]
    Unhandled(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_)
            | AppError::FetchError(_)
            | AppError::ExtractionError(_) => StatusCode::BAD_REQUEST,
            AppError::FormattingError(_) => StatusCode::BAD_GATEWAY,
            AppError::ConfigError(_) | AppError::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::ConfigError(_) | AppError::Unhandled(_) => {
                tracing::error!(error = %self, "request failed unexpectedly");
            }
            _ => tracing::warn!(status = status.as_u16(), error = %self, "request rejected"),
        }

        (status, Json(RecipeResult::failure(self.to_string()))).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::FetchError(format!("Request timed out: {}", err))
        } else {
            AppError::FetchError(err.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Unhandled(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
