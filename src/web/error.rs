//! Response envelope and API errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Body of every JSON response, success or failure.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub error: bool,
    pub status_code: u16,
    pub message: String,
    pub data: Option<T>,
    pub pagination: Option<()>,
}

/// A successful response carrying `data`.
pub fn respond<T: Serialize>(status: StatusCode, message: impl Into<String>, data: T) -> Response {
    let body = ApiResponse {
        error: false,
        status_code: status.as_u16(),
        message: message.into(),
        data: Some(data),
        pagination: None,
    };
    (status, Json(body)).into_response()
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    /// Request body failed field validation.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// No valid access token on a protected route.
    #[must_use]
    pub fn not_authorized() -> Self {
        Self::Unauthorized("You are not authorized!".to_string())
    }

    /// Refresh token missing, invalid or revoked.
    #[must_use]
    pub fn not_authenticated() -> Self {
        Self::Unauthorized("You are not authenticated!".to_string())
    }

    /// Caller does not own the resource.
    #[must_use]
    pub fn no_permission() -> Self {
        Self::Forbidden("You are not have permission!".to_string())
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Internal(e) => {
                error!("Request failed: {e:#}");
                "Internal server error!".to_string()
            }
            Self::BadRequest(m)
            | Self::Validation(m)
            | Self::NotFound(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m) => m,
        };

        let body: ApiResponse<()> = ApiResponse {
            error: true,
            status_code: status.as_u16(),
            message,
            data: None,
            pagination: None,
        };
        (status, Json(body)).into_response()
    }
}
