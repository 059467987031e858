use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::repository::errors::RepositoryError;

#[derive(Debug, Error)]
pub enum UsecaseError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("You have already reviewed this movie")]
    DuplicateReview,

    #[error("{0}")]
    Forbidden(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<RepositoryError> for UsecaseError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => UsecaseError::NotFound("Resource".to_string()),
            RepositoryError::Conflict(_) => UsecaseError::DuplicateReview,
            RepositoryError::Unavailable(msg) | RepositoryError::DatabaseError(msg) => {
                UsecaseError::StoreUnavailable(msg)
            }
        }
    }
}

impl IntoResponse for UsecaseError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            UsecaseError::Validation(_) => StatusCode::BAD_REQUEST,
            UsecaseError::NotFound(_) => StatusCode::NOT_FOUND,
            UsecaseError::DuplicateReview => StatusCode::CONFLICT,
            UsecaseError::Forbidden(_) => StatusCode::FORBIDDEN,
            UsecaseError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        match &self {
            UsecaseError::StoreUnavailable(_) => {
                tracing::error!(error = %self, "store unavailable");
            }
            UsecaseError::NotFound(_) => {
                tracing::warn!(error = %self, "resource not found");
            }
            UsecaseError::Forbidden(_) => {
                tracing::warn!(error = %self, "forbidden");
            }
            _ => {
                tracing::debug!(error = %self);
            }
        }

        (status, self.to_string()).into_response()
    }
}
