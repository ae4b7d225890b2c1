use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::models::{
    timestamp, Comment, EdgeFilter, Engagement, EngagementKind, NewPost, NewSession, NewUser, Page,
    Post, PostChanges, PostFilter, Session, User, UserChanges, UserFilter,
};
use crate::trending::EngagementSnapshot;

/// Whether `err` was caused by a UNIQUE constraint, e.g. a live username taken
/// between the availability check and the write.
#[must_use]
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::Database(e)) if e.is_unique_violation()
    )
}

/// Escape `LIKE` wildcards so user input matches literally under `ESCAPE '\'`.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// ========== Users ==========

/// Insert a new user, returning its ID.
pub async fn insert_user(pool: &SqlitePool, user: &NewUser, now: DateTime<Utc>) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO users (fullname, username, password_hash, picture_key, created_at)
        VALUES (?, ?, ?, ?, ?)
        ",
    )
    .bind(&user.fullname)
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(&user.picture_key)
    .bind(timestamp(now))
    .execute(pool)
    .await
    .context("Failed to insert user")?;

    Ok(result.last_insert_rowid())
}

/// Get a live user by ID.
pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    sqlx::query_as("SELECT * FROM users WHERE id = ? AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user")
}

/// Get a live user by exact username.
pub async fn get_user_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    sqlx::query_as("SELECT * FROM users WHERE username = ? AND deleted_at IS NULL")
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user by username")
}

/// List live users, optionally filtered by exact username and/or a fullname substring.
pub async fn list_users(pool: &SqlitePool, filter: &UserFilter, page: Page) -> Result<Vec<User>> {
    sqlx::query_as(
        r"
        SELECT * FROM users
        WHERE deleted_at IS NULL
          AND (?1 IS NULL OR username = ?1)
          AND (?2 IS NULL OR fullname LIKE '%' || ?2 || '%' ESCAPE '\')
        ORDER BY id
        LIMIT ?3 OFFSET ?4
        ",
    )
    .bind(&filter.username)
    .bind(filter.fullname.as_deref().map(escape_like))
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await
    .context("Failed to list users")
}

/// Apply a partial update to a live user.
pub async fn update_user(
    pool: &SqlitePool,
    id: i64,
    changes: &UserChanges,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r"
        UPDATE users SET
            fullname = COALESCE(?, fullname),
            username = COALESCE(?, username),
            password_hash = COALESCE(?, password_hash),
            picture_key = COALESCE(?, picture_key),
            last_updated_at = ?
        WHERE id = ? AND deleted_at IS NULL
        ",
    )
    .bind(&changes.fullname)
    .bind(&changes.username)
    .bind(&changes.password_hash)
    .bind(&changes.picture_key)
    .bind(timestamp(now))
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    Ok(())
}

/// Soft-delete a user together with their sessions.
pub async fn soft_delete_user(pool: &SqlitePool, id: i64, now: DateTime<Utc>) -> Result<()> {
    let now = timestamp(now);
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin user delete transaction")?;

    sqlx::query("UPDATE sessions SET deleted_at = ? WHERE user_id = ? AND deleted_at IS NULL")
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete user sessions")?;

    sqlx::query("UPDATE users SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete user")?;

    tx.commit().await.context("Failed to commit user delete")?;
    Ok(())
}

// ========== Sessions ==========

/// Insert a new session, returning its ID.
pub async fn insert_session(
    pool: &SqlitePool,
    session: &NewSession,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO sessions (user_id, refresh_token, ip, user_agent, created_at)
        VALUES (?, ?, ?, ?, ?)
        ",
    )
    .bind(session.user_id)
    .bind(&session.refresh_token)
    .bind(&session.ip)
    .bind(&session.user_agent)
    .bind(timestamp(now))
    .execute(pool)
    .await
    .context("Failed to insert session")?;

    Ok(result.last_insert_rowid())
}

/// Get a live session by ID.
pub async fn get_session(pool: &SqlitePool, id: i64) -> Result<Option<Session>> {
    sqlx::query_as("SELECT * FROM sessions WHERE id = ? AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch session")
}

/// Get a live session by its refresh token.
pub async fn get_session_by_refresh_token(
    pool: &SqlitePool,
    refresh_token: &str,
) -> Result<Option<Session>> {
    sqlx::query_as("SELECT * FROM sessions WHERE refresh_token = ? AND deleted_at IS NULL")
        .bind(refresh_token)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch session by refresh token")
}

/// List a user's live sessions.
pub async fn list_sessions(pool: &SqlitePool, user_id: i64, page: Page) -> Result<Vec<Session>> {
    sqlx::query_as(
        r"
        SELECT * FROM sessions
        WHERE user_id = ? AND deleted_at IS NULL
        ORDER BY id
        LIMIT ? OFFSET ?
        ",
    )
    .bind(user_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await
    .context("Failed to list sessions")
}

/// Soft-delete a session (logout).
pub async fn soft_delete_session(pool: &SqlitePool, id: i64, now: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE sessions SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(timestamp(now))
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete session")?;
    Ok(())
}

// ========== Posts ==========

/// Insert a new post, returning its ID.
pub async fn insert_post(pool: &SqlitePool, post: &NewPost, now: DateTime<Utc>) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO posts (user_id, caption, image_key, created_at)
        VALUES (?, ?, ?, ?)
        ",
    )
    .bind(post.user_id)
    .bind(&post.caption)
    .bind(&post.image_key)
    .bind(timestamp(now))
    .execute(pool)
    .await
    .context("Failed to insert post")?;

    Ok(result.last_insert_rowid())
}

/// Get a live post by ID.
pub async fn get_post(pool: &SqlitePool, id: i64) -> Result<Option<Post>> {
    sqlx::query_as("SELECT * FROM posts WHERE id = ? AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch post")
}

/// List live posts, newest-first by trending score when requested, otherwise by id.
pub async fn list_posts(pool: &SqlitePool, filter: PostFilter, page: Page) -> Result<Vec<Post>> {
    let order = if filter.trending {
        "trending_score DESC, id"
    } else {
        "id"
    };

    sqlx::query_as(&format!(
        r"
        SELECT * FROM posts
        WHERE deleted_at IS NULL
          AND (?1 IS NULL OR user_id = ?1)
        ORDER BY {order}
        LIMIT ?2 OFFSET ?3
        "
    ))
    .bind(filter.user_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await
    .context("Failed to list posts")
}

/// Apply a partial update to a live post.
pub async fn update_post(
    pool: &SqlitePool,
    id: i64,
    changes: &PostChanges,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r"
        UPDATE posts SET
            caption = COALESCE(?, caption),
            image_key = COALESCE(?, image_key),
            last_updated_at = ?
        WHERE id = ? AND deleted_at IS NULL
        ",
    )
    .bind(&changes.caption)
    .bind(&changes.image_key)
    .bind(timestamp(now))
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update post")?;

    Ok(())
}

/// Soft-delete a post and every live edge that points at it.
pub async fn soft_delete_post(pool: &SqlitePool, id: i64, now: DateTime<Utc>) -> Result<()> {
    let now = timestamp(now);
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin post delete transaction")?;

    for table in ["comments", "likes", "reposts", "bookmarks"] {
        sqlx::query(&format!(
            "UPDATE {table} SET deleted_at = ? WHERE post_id = ? AND deleted_at IS NULL"
        ))
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to delete {table} of post"))?;
    }

    sqlx::query("UPDATE posts SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete post")?;

    tx.commit().await.context("Failed to commit post delete")?;
    Ok(())
}

// ========== Comments ==========

/// Insert a new comment, returning its ID.
pub async fn insert_comment(
    pool: &SqlitePool,
    post_id: i64,
    user_id: i64,
    text: &str,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO comments (post_id, user_id, text, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(post_id)
    .bind(user_id)
    .bind(text)
    .bind(timestamp(now))
    .execute(pool)
    .await
    .context("Failed to insert comment")?;

    Ok(result.last_insert_rowid())
}

/// Get a live comment by ID.
pub async fn get_comment(pool: &SqlitePool, id: i64) -> Result<Option<Comment>> {
    sqlx::query_as("SELECT * FROM comments WHERE id = ? AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch comment")
}

/// List live comments, optionally restricted to a post and/or an author.
pub async fn list_comments(
    pool: &SqlitePool,
    filter: EdgeFilter,
    page: Page,
) -> Result<Vec<Comment>> {
    sqlx::query_as(
        r"
        SELECT * FROM comments
        WHERE deleted_at IS NULL
          AND (?1 IS NULL OR post_id = ?1)
          AND (?2 IS NULL OR user_id = ?2)
        ORDER BY id
        LIMIT ?3 OFFSET ?4
        ",
    )
    .bind(filter.post_id)
    .bind(filter.user_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await
    .context("Failed to list comments")
}

/// All live comments on a post, oldest first.
pub async fn list_comments_for_post(pool: &SqlitePool, post_id: i64) -> Result<Vec<Comment>> {
    sqlx::query_as("SELECT * FROM comments WHERE post_id = ? AND deleted_at IS NULL ORDER BY id")
        .bind(post_id)
        .fetch_all(pool)
        .await
        .context("Failed to list comments for post")
}

/// Replace a comment's text.
pub async fn update_comment(
    pool: &SqlitePool,
    id: i64,
    text: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE comments SET text = ?, last_updated_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(text)
    .bind(timestamp(now))
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update comment")?;
    Ok(())
}

pub async fn soft_delete_comment(pool: &SqlitePool, id: i64, now: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE comments SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(timestamp(now))
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete comment")?;
    Ok(())
}

// ========== Likes / Reposts / Bookmarks ==========

/// Insert a new engagement edge, returning its ID.
pub async fn insert_engagement(
    pool: &SqlitePool,
    kind: EngagementKind,
    post_id: i64,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(&format!(
        "INSERT INTO {} (post_id, user_id, created_at) VALUES (?, ?, ?)",
        kind.table()
    ))
    .bind(post_id)
    .bind(user_id)
    .bind(timestamp(now))
    .execute(pool)
    .await
    .with_context(|| format!("Failed to insert {}", kind.label()))?;

    Ok(result.last_insert_rowid())
}

/// Get a live engagement edge by ID.
pub async fn get_engagement(
    pool: &SqlitePool,
    kind: EngagementKind,
    id: i64,
) -> Result<Option<Engagement>> {
    sqlx::query_as(&format!(
        "SELECT * FROM {} WHERE id = ? AND deleted_at IS NULL",
        kind.table()
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to fetch {}", kind.label()))
}

/// Find the user's live edge of this kind on a post, if any.
pub async fn find_engagement(
    pool: &SqlitePool,
    kind: EngagementKind,
    post_id: i64,
    user_id: i64,
) -> Result<Option<Engagement>> {
    sqlx::query_as(&format!(
        r"
        SELECT * FROM {}
        WHERE post_id = ? AND user_id = ? AND deleted_at IS NULL
        ORDER BY id
        LIMIT 1
        ",
        kind.table()
    ))
    .bind(post_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to look up existing {}", kind.label()))
}

pub async fn list_engagements(
    pool: &SqlitePool,
    kind: EngagementKind,
    filter: EdgeFilter,
    page: Page,
) -> Result<Vec<Engagement>> {
    sqlx::query_as(&format!(
        r"
        SELECT * FROM {}
        WHERE deleted_at IS NULL
          AND (?1 IS NULL OR post_id = ?1)
          AND (?2 IS NULL OR user_id = ?2)
        ORDER BY id
        LIMIT ?3 OFFSET ?4
        ",
        kind.table()
    ))
    .bind(filter.post_id)
    .bind(filter.user_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to list {}", kind.table()))
}

/// All live edges of this kind on a post.
pub async fn list_engagements_for_post(
    pool: &SqlitePool,
    kind: EngagementKind,
    post_id: i64,
) -> Result<Vec<Engagement>> {
    sqlx::query_as(&format!(
        "SELECT * FROM {} WHERE post_id = ? AND deleted_at IS NULL ORDER BY id",
        kind.table()
    ))
    .bind(post_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to list {} for post", kind.table()))
}

pub async fn soft_delete_engagement(
    pool: &SqlitePool,
    kind: EngagementKind,
    id: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(&format!(
        "UPDATE {} SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        kind.table()
    ))
    .bind(timestamp(now))
    .bind(id)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to delete {}", kind.label()))?;
    Ok(())
}

// ========== Trending ==========

/// Load every live post with the acting users of its live engagement edges.
///
/// Posts come back in ascending id order.
pub async fn fetch_engagement_snapshots(pool: &SqlitePool) -> Result<Vec<EngagementSnapshot>> {
    let posts: Vec<(i64, i64, String)> = sqlx::query_as(
        "SELECT id, user_id, created_at FROM posts WHERE deleted_at IS NULL ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .context("Failed to fetch posts for trending")?;

    let mut snapshots = Vec::with_capacity(posts.len());
    let mut index = HashMap::with_capacity(posts.len());
    for (id, user_id, created_at) in posts {
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .with_context(|| format!("Post {id} has an invalid created_at: {created_at}"))?
            .with_timezone(&Utc);
        index.insert(id, snapshots.len());
        snapshots.push(EngagementSnapshot::new(id, user_id, created_at));
    }

    for table in ["comments", "likes", "reposts", "bookmarks"] {
        let edges: Vec<(i64, i64)> = sqlx::query_as(&format!(
            r"
            SELECT e.post_id, e.user_id FROM {table} e
            JOIN posts p ON p.id = e.post_id
            WHERE e.deleted_at IS NULL AND p.deleted_at IS NULL
            ORDER BY e.id
            "
        ))
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to fetch {table} for trending"))?;

        for (post_id, user_id) in edges {
            let Some(&i) = index.get(&post_id) else {
                continue;
            };
            let snapshot = &mut snapshots[i];
            let actors = match table {
                "comments" => &mut snapshot.commenters,
                "likes" => &mut snapshot.likers,
                "reposts" => &mut snapshot.reposters,
                _ => &mut snapshot.bookmarkers,
            };
            actors.push(user_id);
        }
    }

    Ok(snapshots)
}

/// Persist a recomputed trending score.
pub async fn set_trending_score(pool: &SqlitePool, post_id: i64, score: f64) -> Result<()> {
    sqlx::query("UPDATE posts SET trending_score = ? WHERE id = ?")
        .bind(score)
        .bind(post_id)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to update trending score of post {post_id}"))?;
    Ok(())
}
