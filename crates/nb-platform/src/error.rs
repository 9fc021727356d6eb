//! Platform Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::api::common::ApiError;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    Unauthorized { message: String },

    #[error("User session timeout.")]
    SessionTimeout,

    #[error("Session expired.")]
    RefreshExpired,

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Transaction failure: {message}")]
    Transaction { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PlatformError {
    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden { message: message.into() }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Stable error code exposed in API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::Validation { .. } => "VALIDATION",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::SessionTimeout => "SESSION_TIMEOUT",
            Self::RefreshExpired => "SESSION_EXPIRED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::Transaction { .. } | Self::Database(_) => "TRANSACTION_FAILURE",
            Self::Cache(_) => "CACHE_ERROR",
            Self::Json(_) | Self::Configuration { .. } | Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } | Self::SessionTimeout => StatusCode::UNAUTHORIZED,
            // 440 Login Time-out, what browser clients key the re-login flow on
            Self::RefreshExpired => {
                StatusCode::from_u16(440).unwrap_or(StatusCode::UNAUTHORIZED)
            }
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Transaction { .. }
            | Self::Database(_)
            | Self::Cache(_)
            | Self::Json(_)
            | Self::Configuration { .. }
            | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self, code = self.code(), "Request failed");
            "Something went wrong. Please retry again.".to_string()
        } else {
            self.to_string()
        };

        let body = ApiError {
            error: self.code().to_string(),
            message,
            details: None,
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;
