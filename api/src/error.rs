use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quibble_shared::ApiResponse;
use std::collections::HashMap;
use thiserror::Error;

pub type FieldErrors = HashMap<String, Vec<String>>;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed input. The message enumerates every violated constraint;
    /// `details` maps each field to its violation messages.
    #[error("{message}")]
    Validation {
        message: String,
        details: FieldErrors,
    },

    #[error("Please log in to perform this action")]
    Unauthorized,

    #[error("You are not allowed to modify this resource")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Something went wrong. Please try again.")]
    Store,
}

impl ApiError {
    /// Builds a validation error from collected per-field violations.
    /// The top-level message joins every violation so callers see all
    /// failing fields at once.
    pub fn validation(details: FieldErrors) -> Self {
        let mut messages: Vec<&str> = Vec::new();
        let mut fields: Vec<&String> = details.keys().collect();
        fields.sort();
        for field in fields {
            for msg in &details[field] {
                messages.push(msg.as_str());
            }
        }
        Self::Validation {
            message: messages.join(", "),
            details,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Store => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            ApiError::Validation { details, .. } => Some(details.clone()),
            _ => None,
        };
        let body = ApiResponse::<()>::err(self.to_string(), details);
        (status, Json(body)).into_response()
    }
}

// Store-layer failures are surfaced as a generic retryable error; the
// underlying cause goes to the log, not to the client.

impl From<r2d2::Error> for ApiError {
    fn from(err: r2d2::Error) -> Self {
        tracing::error!("db pool error: {err}");
        ApiError::Store
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        tracing::error!("db error: {err}");
        ApiError::Store
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!("blocking task failed: {err}");
        ApiError::Store
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            tracing::warn!("upstream request timed out: {err}");
            ApiError::Upstream("request timed out".to_string())
        } else {
            tracing::error!("upstream request failed: {err}");
            ApiError::Upstream(err.to_string())
        }
    }
}
