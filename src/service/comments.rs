use serde::Deserialize;

use super::posts;
use crate::auth::CurrentUser;
use crate::db::{self, Comment, EdgeFilter, Page};
use crate::web::error::{AppError, AppResult};
use crate::web::extract::{FieldErrors, Validate};
use crate::web::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub text: String,
    pub post_id: i64,
}

impl Validate for CreateCommentRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        errors.min_len("text", &self.text, 1, "Text");
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UpdateCommentRequest {
    pub text: Option<String>,
}

impl Validate for UpdateCommentRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        errors.min_len_opt("text", self.text.as_deref(), 1, "Text");
    }
}

/// # Errors
///
/// Not found when no comment matches.
pub async fn list(state: &AppState, filter: EdgeFilter, page: Page) -> AppResult<Vec<Comment>> {
    let comments = db::list_comments(state.db.pool(), filter, page).await?;
    if comments.is_empty() {
        return Err(AppError::not_found("No comments data found!"));
    }
    Ok(comments)
}

/// # Errors
///
/// Not found when the comment does not exist or was deleted.
pub async fn get(state: &AppState, id: i64) -> AppResult<Comment> {
    db::get_comment(state.db.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found("No comment data found!"))
}

/// Comment on a live post as the caller.
///
/// # Errors
///
/// Not found when the post does not exist or was deleted.
pub async fn create(
    state: &AppState,
    caller: &CurrentUser,
    request: CreateCommentRequest,
) -> AppResult<Comment> {
    let post = posts::find(state, request.post_id).await?;
    let id = db::insert_comment(
        state.db.pool(),
        post.id,
        caller.id(),
        &request.text,
        state.clock.now(),
    )
    .await?;
    get(state, id).await
}

/// # Errors
///
/// Not found, or forbidden for someone else's comment.
pub async fn update(
    state: &AppState,
    caller: &CurrentUser,
    id: i64,
    request: UpdateCommentRequest,
) -> AppResult<Comment> {
    let comment = get(state, id).await?;
    caller.ensure_owns(comment.user_id)?;

    if let Some(text) = &request.text {
        db::update_comment(state.db.pool(), id, text, state.clock.now()).await?;
    }
    get(state, id).await
}

/// # Errors
///
/// Not found, or forbidden for someone else's comment.
pub async fn delete(state: &AppState, caller: &CurrentUser, id: i64) -> AppResult<Comment> {
    let comment = get(state, id).await?;
    caller.ensure_owns(comment.user_id)?;
    db::soft_delete_comment(state.db.pool(), id, state.clock.now()).await?;
    Ok(comment)
}
