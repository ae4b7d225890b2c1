//! Likes, reposts and bookmarks.

use serde::Deserialize;
use tracing::debug;

use super::posts;
use crate::auth::CurrentUser;
use crate::db::{self, EdgeFilter, Engagement, EngagementKind, Page};
use crate::web::error::{AppError, AppResult};
use crate::web::extract::{FieldErrors, Validate};
use crate::web::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateEngagementRequest {
    pub post_id: i64,
}

impl Validate for CreateEngagementRequest {
    fn validate(&self, _errors: &mut FieldErrors) {}
}

/// Result of a create request.
#[derive(Debug)]
pub enum Toggle {
    Created(Engagement),
    /// The caller already had one; it was removed instead.
    Removed(Engagement),
}

/// # Errors
///
/// Not found when nothing matches.
pub async fn list(
    state: &AppState,
    kind: EngagementKind,
    filter: EdgeFilter,
    page: Page,
) -> AppResult<Vec<Engagement>> {
    let edges = db::list_engagements(state.db.pool(), kind, filter, page).await?;
    if edges.is_empty() {
        return Err(AppError::not_found(format!(
            "No {} data found!",
            kind.table()
        )));
    }
    Ok(edges)
}

/// # Errors
///
/// Not found when the edge does not exist or was deleted.
pub async fn get(state: &AppState, kind: EngagementKind, id: i64) -> AppResult<Engagement> {
    db::get_engagement(state.db.pool(), kind, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("No {} data found!", kind.label())))
}

/// Add the caller's like, repost or bookmark to a post.
///
/// Likes and reposts toggle: a second request removes the existing one.
///
/// # Errors
///
/// Not found when the post does not exist or was deleted.
pub async fn create(
    state: &AppState,
    caller: &CurrentUser,
    kind: EngagementKind,
    request: &CreateEngagementRequest,
) -> AppResult<Toggle> {
    let post = posts::find(state, request.post_id).await?;
    let pool = state.db.pool();
    let now = state.clock.now();

    if kind.toggles() {
        if let Some(existing) = db::find_engagement(pool, kind, post.id, caller.id()).await? {
            debug!(kind = kind.label(), id = existing.id, post_id = post.id, "Toggling off");
            db::soft_delete_engagement(pool, kind, existing.id, now).await?;
            return Ok(Toggle::Removed(existing));
        }
    }

    let id = db::insert_engagement(pool, kind, post.id, caller.id(), now).await?;
    Ok(Toggle::Created(get(state, kind, id).await?))
}

/// # Errors
///
/// Not found, or forbidden for someone else's edge.
pub async fn delete(
    state: &AppState,
    caller: &CurrentUser,
    kind: EngagementKind,
    id: i64,
) -> AppResult<Engagement> {
    let edge = get(state, kind, id).await?;
    caller.ensure_owns(edge.user_id)?;
    db::soft_delete_engagement(state.db.pool(), kind, id, state.clock.now()).await?;
    Ok(edge)
}
