use serde::{Deserialize, Serialize};
use tracing::info;

use super::{check_image, discard_image, store_image};
use crate::auth::CurrentUser;
use crate::db::{
    self, Comment, Engagement, EngagementKind, NewPost, Page, Post, PostChanges, PostFilter, User,
};
use crate::storage::ImageFolder;
use crate::web::error::{AppError, AppResult};
use crate::web::extract::{FieldErrors, QueryParams, UploadedImage, Validate};
use crate::web::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub caption: String,
}

impl Validate for CreatePostRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        errors.min_len("caption", &self.caption, 1, "Caption");
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub caption: Option<String>,
}

impl Validate for UpdatePostRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        errors.min_len_opt("caption", self.caption.as_deref(), 1, "Caption");
    }
}

/// Related records to embed in a post response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Includes {
    pub user: bool,
    pub comments: bool,
    pub likes: bool,
    pub reposts: bool,
    pub bookmarks: bool,
}

impl Includes {
    /// Read the `include*` flags. `includeAll` is honoured only when `allow_all` is set.
    #[must_use]
    pub fn from_params(params: &QueryParams, allow_all: bool) -> Self {
        let all = allow_all && params.flag("includeAll");
        Self {
            user: all || params.flag("includeUser"),
            comments: all || params.flag("includeComments"),
            likes: all || params.flag("includeLikes"),
            reposts: all || params.flag("includeReposts"),
            bookmarks: all || params.flag("includeBookmarks"),
        }
    }
}

/// A post with whichever relations were requested.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes: Option<Vec<Engagement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reposts: Option<Vec<Engagement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmarks: Option<Vec<Engagement>>,
}

async fn expand(state: &AppState, post: Post, includes: Includes) -> AppResult<PostView> {
    let pool = state.db.pool();

    let user = if includes.user {
        db::get_user(pool, post.user_id).await?
    } else {
        None
    };
    let comments = if includes.comments {
        Some(db::list_comments_for_post(pool, post.id).await?)
    } else {
        None
    };

    let mut edges = [None, None, None];
    for (slot, (wanted, kind)) in edges.iter_mut().zip([
        (includes.likes, EngagementKind::Like),
        (includes.reposts, EngagementKind::Repost),
        (includes.bookmarks, EngagementKind::Bookmark),
    ]) {
        if wanted {
            *slot = Some(db::list_engagements_for_post(pool, kind, post.id).await?);
        }
    }
    let [likes, reposts, bookmarks] = edges;

    Ok(PostView {
        post,
        user,
        comments,
        likes,
        reposts,
        bookmarks,
    })
}

/// # Errors
///
/// Not found when no post matches.
pub async fn list(
    state: &AppState,
    filter: PostFilter,
    page: Page,
    includes: Includes,
) -> AppResult<Vec<PostView>> {
    let posts = db::list_posts(state.db.pool(), filter, page).await?;
    if posts.is_empty() {
        return Err(AppError::not_found("No posts data found!"));
    }

    let mut views = Vec::with_capacity(posts.len());
    for post in posts {
        views.push(expand(state, post, includes).await?);
    }
    Ok(views)
}

/// Fetch a live post.
///
/// # Errors
///
/// Not found when the post does not exist or was deleted.
pub async fn find(state: &AppState, id: i64) -> AppResult<Post> {
    db::get_post(state.db.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found("No post data found!"))
}

/// # Errors
///
/// Not found when the post does not exist or was deleted.
pub async fn get(state: &AppState, id: i64, includes: Includes) -> AppResult<PostView> {
    let post = find(state, id).await?;
    expand(state, post, includes).await
}

/// # Errors
///
/// Bad request for an invalid image.
pub async fn create(
    state: &AppState,
    caller: &CurrentUser,
    request: CreatePostRequest,
    image: Option<UploadedImage>,
) -> AppResult<Post> {
    if let Some(image) = &image {
        check_image(state, image)?;
    }
    let image_key = match &image {
        Some(image) => Some(store_image(state, ImageFolder::PostImages, image).await?),
        None => None,
    };

    let new_post = NewPost {
        user_id: caller.id(),
        caption: request.caption,
        image_key: image_key.clone(),
    };
    let id = match db::insert_post(state.db.pool(), &new_post, state.clock.now()).await {
        Ok(id) => id,
        Err(e) => {
            if let Some(key) = &image_key {
                discard_image(state, key).await;
            }
            return Err(e.into());
        }
    };

    info!(post_id = id, user_id = caller.id(), "Post created");
    find(state, id).await
}

/// Edit the caption and/or replace the image of the caller's post.
///
/// # Errors
///
/// Not found, forbidden for someone else's post, or bad request for an invalid image.
pub async fn update(
    state: &AppState,
    caller: &CurrentUser,
    id: i64,
    request: UpdatePostRequest,
    image: Option<UploadedImage>,
) -> AppResult<Post> {
    let post = find(state, id).await?;
    caller.ensure_owns(post.user_id)?;

    if let Some(image) = &image {
        check_image(state, image)?;
    }
    let image_key = match &image {
        Some(image) => Some(store_image(state, ImageFolder::PostImages, image).await?),
        None => None,
    };

    let changes = PostChanges {
        caption: request.caption,
        image_key: image_key.clone(),
    };
    if let Err(e) = db::update_post(state.db.pool(), id, &changes, state.clock.now()).await {
        if let Some(key) = &image_key {
            discard_image(state, key).await;
        }
        return Err(e.into());
    }

    if let (Some(new), Some(old)) = (&image_key, &post.image_key) {
        if new != old {
            discard_image(state, old).await;
        }
    }

    find(state, id).await
}

/// Soft-delete the caller's post together with its comments and engagement.
///
/// # Errors
///
/// Not found, or forbidden for someone else's post.
pub async fn delete(state: &AppState, caller: &CurrentUser, id: i64) -> AppResult<Post> {
    let post = find(state, id).await?;
    caller.ensure_owns(post.user_id)?;

    db::soft_delete_post(state.db.pool(), id, state.clock.now()).await?;
    if let Some(key) = &post.image_key {
        discard_image(state, key).await;
    }

    info!(post_id = id, "Post deleted");
    Ok(post)
}
