use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::{verify_password, CurrentUser};
use crate::db::{self, NewSession, Page, Session};
use crate::web::error::{AppError, AppResult};
use crate::web::extract::{FieldErrors, Validate};
use crate::web::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        errors.min_len("username", &self.username, 1, "Username");
        errors.min_len("password", &self.password, 1, "Password");
    }
}

/// Where the login request came from.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// A new session and the tokens that go with it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Login {
    #[serde(flatten)]
    pub session: Session,
    pub access_token: String,
    #[serde(skip)]
    pub refresh_token: String,
}

/// Check credentials and open a session.
///
/// # Errors
///
/// Bad request when the username is unknown or the password does not match.
pub async fn login(state: &AppState, request: LoginRequest, client: ClientInfo) -> AppResult<Login> {
    let invalid = || AppError::bad_request("Post session data not valid!");

    let user = db::get_user_by_username(state.db.pool(), &request.username)
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&request.password, &user.password_hash)? {
        debug!(username = %request.username, "Login rejected: wrong password");
        return Err(invalid());
    }

    let refresh_token = state.tokens.issue_refresh_token(user.id)?;
    let new_session = NewSession {
        user_id: user.id,
        refresh_token: refresh_token.clone(),
        ip: client.ip,
        user_agent: client.user_agent,
    };
    let id = db::insert_session(state.db.pool(), &new_session, state.clock.now()).await?;
    let access_token = state.tokens.issue_access_token(id)?;

    let session = db::get_session(state.db.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found("No session data found!"))?;

    info!(user_id = user.id, session_id = id, "Session created");
    Ok(Login {
        session,
        access_token,
        refresh_token,
    })
}

/// Exchange a refresh token for a new access token.
///
/// # Errors
///
/// Unauthorized when the token is invalid, expired, or its session is gone.
pub async fn refresh(state: &AppState, refresh_token: Option<&str>) -> AppResult<String> {
    let token = refresh_token.ok_or_else(AppError::not_authenticated)?;
    state
        .tokens
        .verify_refresh_token(token)
        .map_err(|_| AppError::not_authenticated())?;

    let session = db::get_session_by_refresh_token(state.db.pool(), token)
        .await?
        .ok_or_else(AppError::not_authenticated)?;

    Ok(state.tokens.issue_access_token(session.id)?)
}

/// # Errors
///
/// Not found when the caller has no sessions on this page.
pub async fn list(state: &AppState, caller: &CurrentUser, page: Page) -> AppResult<Vec<Session>> {
    let sessions = db::list_sessions(state.db.pool(), caller.id(), page).await?;
    if sessions.is_empty() {
        return Err(AppError::not_found("No sessions data found!"));
    }
    Ok(sessions)
}

/// # Errors
///
/// Not found, or forbidden for another user's session.
pub async fn get(state: &AppState, caller: &CurrentUser, id: i64) -> AppResult<Session> {
    let session = db::get_session(state.db.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found("No session data found!"))?;
    caller.ensure_owns(session.user_id)?;
    Ok(session)
}

/// Log out a session.
///
/// # Errors
///
/// Not found, or forbidden for another user's session.
pub async fn delete(state: &AppState, caller: &CurrentUser, id: i64) -> AppResult<Session> {
    let session = get(state, caller, id).await?;
    db::soft_delete_session(state.db.pool(), id, state.clock.now()).await?;
    info!(user_id = session.user_id, session_id = id, "Session deleted");
    Ok(session)
}
