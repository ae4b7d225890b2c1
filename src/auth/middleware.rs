use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};

use crate::db::{self, Session, User};
use crate::web::error::AppError;
use crate::web::AppState;

/// The caller behind a valid access token.
///
/// Rejects with 401 when the `Authorization: Bearer` token is missing,
/// invalid or expired, or when its session or user no longer exists.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session: Session,
}

impl CurrentUser {
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.user.id
    }

    /// Fail with 403 unless the caller is `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Forbidden`] for anyone else.
    pub fn ensure_owns(&self, owner_id: i64) -> Result<(), AppError> {
        if self.user.id == owner_id {
            Ok(())
        } else {
            Err(AppError::no_permission())
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(AppError::not_authorized)?;

        let claims = state
            .tokens
            .verify_access_token(token)
            .map_err(|_| AppError::not_authorized())?;

        let session = db::get_session(state.db.pool(), claims.session_id)
            .await?
            .ok_or_else(AppError::not_authorized)?;

        let user = db::get_user(state.db.pool(), session.user_id)
            .await?
            .ok_or_else(AppError::not_authorized)?;

        Ok(Self { user, session })
    }
}

/// Client IP as reported by a reverse proxy, if any.
#[must_use]
pub fn get_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(first_ip) = forwarded.split(',').next() {
            return Some(first_ip.trim().to_string());
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(String::from)
}

#[must_use]
pub fn get_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(String::from)
}
