use std::any::Any;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::api::models::RecipeResult;

pub fn success(result: RecipeResult) -> (StatusCode, Json<RecipeResult>) {
    (StatusCode::OK, Json(result))
}

pub fn error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<RecipeResult>) {
    (status, Json(RecipeResult::failure(message)))
}

pub async fn method_not_allowed() -> (StatusCode, Json<RecipeResult>) {
    error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// Turns a handler panic into the generic 500 envelope.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    tracing::error!(%detail, "handler panicked");
    error(StatusCode::INTERNAL_SERVER_ERROR, format!("An error occurred: {}", detail)).into_response()
}
