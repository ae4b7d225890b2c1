use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// Render an instant the way every timestamp column stores it.
///
/// Fixed millisecond precision with a `Z` suffix keeps the text sortable.
#[must_use]
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Public URL under which a stored image is served.
#[must_use]
pub fn public_url(key: &str) -> String {
    format!("/public/{key}")
}

#[allow(clippy::ref_option)]
fn serialize_public_url<S: Serializer>(key: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
    match key {
        Some(key) => s.serialize_some(&public_url(key)),
        None => s.serialize_none(),
    }
}

/// A registered user.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub fullname: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(rename = "pictureUrl", serialize_with = "serialize_public_url")]
    pub picture_key: Option<String>,
    pub role: String,
    pub created_at: String,
    pub last_updated_at: Option<String>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<String>,
}

/// Data for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub fullname: String,
    pub username: String,
    pub password_hash: String,
    pub picture_key: Option<String>,
}

/// Partial update of a user. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub fullname: Option<String>,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub picture_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub username: Option<String>,
    pub fullname: Option<String>,
}

/// A login session, identified by its refresh token.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
    pub last_updated_at: Option<String>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: i64,
    pub refresh_token: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// A post. `trending_score` is written only by the trending job.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub caption: String,
    #[serde(rename = "imageUrl", serialize_with = "serialize_public_url")]
    pub image_key: Option<String>,
    pub trending_score: f64,
    pub created_at: String,
    pub last_updated_at: Option<String>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub caption: String,
    pub image_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub caption: Option<String>,
    pub image_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostFilter {
    pub user_id: Option<i64>,
    /// Order by trending score instead of id.
    pub trending: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub text: String,
    pub created_at: String,
    pub last_updated_at: Option<String>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<String>,
}

/// Filter shared by comment and engagement listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeFilter {
    pub post_id: Option<i64>,
    pub user_id: Option<i64>,
}

/// The three engagement edges that carry no payload of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngagementKind {
    Like,
    Repost,
    Bookmark,
}

impl EngagementKind {
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Like => "likes",
            Self::Repost => "reposts",
            Self::Bookmark => "bookmarks",
        }
    }

    /// Singular, lowercase name used in response messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Repost => "repost",
            Self::Bookmark => "bookmark",
        }
    }

    /// Whether creating an edge that already exists removes it instead.
    #[must_use]
    pub const fn toggles(self) -> bool {
        matches!(self, Self::Like | Self::Repost)
    }
}

/// A like, repost or bookmark.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Engagement {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub created_at: String,
    pub last_updated_at: Option<String>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<String>,
}

/// Limit and offset for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 10;

    /// Zero-based page number to offset.
    #[must_use]
    pub fn new(limit: i64, page: i64) -> Self {
        Self {
            limit,
            offset: limit.saturating_mul(page),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT, 0)
    }
}
