// ============================================================================
// Error Handling - HTTP boundary for storefront errors
// ============================================================================
//
// Internal errors (ERP transport, search API, content store) are logged
// server side with full detail. Clients only receive a generic message in
// a `{ "error", "status" }` JSON body.
//
// ============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

use crate::templates::RenderError;
use crate::services::content_entry_service::ContentEntryError;
use crate::services::erp::{ErpError, LifecycleError};
use crate::services::SearchError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("ERP error: {0}")]
    Erp(#[from] ErpError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Content entry error: {0}")]
    ContentEntry(#[from] ContentEntryError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Password hashing error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Erp(e) => AppError::Erp(e),
            LifecycleError::ContentEntry(e) => AppError::ContentEntry(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Erp(ErpError::Maintenance(reason)) => {
                tracing::warn!("ERP maintenance: {}", reason);
                (StatusCode::SERVICE_UNAVAILABLE, "Store under maintenance".to_string())
            }
            AppError::Erp(err) => {
                tracing::error!("ERP error: {:?}", err);
                (StatusCode::BAD_GATEWAY, "Upstream error".to_string())
            }
            AppError::Search(err) => {
                tracing::error!("Search error: {:?}", err);
                (StatusCode::BAD_GATEWAY, "Upstream error".to_string())
            }
            AppError::ContentEntry(ContentEntryError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, "Entry not found".to_string())
            }
            AppError::ContentEntry(err) => {
                tracing::error!("Content entry error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Render(RenderError::SnippetNotFound(name)) => {
                (StatusCode::NOT_FOUND, format!("Snippet not found: {}", name))
            }
            AppError::Render(err) => {
                tracing::error!("Render error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Validation(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "Validation failed".to_string())
            }
            AppError::PasswordHash(ref e) => {
                tracing::error!("Password hashing error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Password processing error".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (AppError::Erp(ErpError::Maintenance("down".into())), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::Erp(ErpError::InvalidResponse("x".into())), StatusCode::BAD_GATEWAY),
            (AppError::Search(SearchError::UnknownIndex("x".into())), StatusCode::BAD_GATEWAY),
            (AppError::NotFound("page".into()), StatusCode::NOT_FOUND),
            (
                AppError::Render(RenderError::SnippetNotFound("cart".into())),
                StatusCode::NOT_FOUND,
            ),
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
            (AppError::BadRequest("nope".into()), StatusCode::BAD_REQUEST),
            (
                AppError::Validation(ValidationErrors::new()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_lifecycle_error_conversion() {
        let err: AppError = LifecycleError::Erp(ErpError::Maintenance("down".into())).into();
        assert!(matches!(err, AppError::Erp(ErpError::Maintenance(_))));
    }
}
