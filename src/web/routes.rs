use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;

use super::error::{respond, AppError, AppResult};
use super::extract::{IdPath, ImageForm, QueryParams, ValidJson};
use super::AppState;
use crate::auth::{
    get_client_ip, get_user_agent, refresh_cookie, refresh_token_from_cookies, CurrentUser,
};
use crate::db::{EdgeFilter, EngagementKind, PostFilter, UserFilter};
use crate::service::comments::{CreateCommentRequest, UpdateCommentRequest};
use crate::service::engagements::{CreateEngagementRequest, Toggle};
use crate::service::posts::{CreatePostRequest, Includes, UpdatePostRequest};
use crate::service::sessions::{ClientInfo, LoginRequest};
use crate::service::users::{CreateUserRequest, UpdateUserRequest};
use crate::service::{comments, engagements, posts, sessions, users};

/// Create the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/:id",
            get(get_post).patch(update_post).delete(delete_post),
        )
        .route("/comments", get(list_comments).post(create_comment))
        .route(
            "/comments/:id",
            get(get_comment).patch(update_comment).delete(delete_comment),
        )
        .merge(engagement_routes(EngagementKind::Like))
        .merge(engagement_routes(EngagementKind::Repost))
        .merge(engagement_routes(EngagementKind::Bookmark))
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/access-tokens", post(create_access_token))
        .route("/public/*key", get(serve_image))
        .route("/healthz", get(health))
}

async fn health() -> &'static str {
    "ok"
}

// ========== Users ==========

async fn list_users(
    State(state): State<AppState>,
    _caller: CurrentUser,
    params: QueryParams,
) -> AppResult<Response> {
    let filter = UserFilter {
        username: params.string("username"),
        fullname: params.string("fullname"),
    };
    let users = users::list(&state, &filter, params.page()?).await?;
    Ok(respond(StatusCode::OK, "Get users data successfully!", users))
}

async fn get_user(
    State(state): State<AppState>,
    _caller: CurrentUser,
    IdPath(id): IdPath,
) -> AppResult<Response> {
    let user = users::get(&state, id).await?;
    Ok(respond(StatusCode::OK, "Get user data successfully!", user))
}

async fn create_user(
    State(state): State<AppState>,
    form: ImageForm<CreateUserRequest>,
) -> AppResult<Response> {
    let user = users::create(&state, form.data, form.image).await?;
    Ok(respond(StatusCode::CREATED, "Post user data successfully!", user))
}

async fn update_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    IdPath(id): IdPath,
    form: ImageForm<UpdateUserRequest>,
) -> AppResult<Response> {
    let user = users::update(&state, &caller, id, form.data, form.image).await?;
    Ok(respond(StatusCode::OK, "Patch user data successfully!", user))
}

async fn delete_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    IdPath(id): IdPath,
) -> AppResult<Response> {
    let user = users::delete(&state, &caller, id).await?;
    Ok(respond(StatusCode::OK, "Delete user data successfully!", user))
}

// ========== Posts ==========

async fn list_posts(
    State(state): State<AppState>,
    _caller: CurrentUser,
    params: QueryParams,
) -> AppResult<Response> {
    let filter = PostFilter {
        user_id: params.id("userId")?,
        trending: params.flag("isTrending"),
    };
    let includes = Includes::from_params(&params, true);
    let posts = posts::list(&state, filter, params.page()?, includes).await?;
    Ok(respond(StatusCode::OK, "Get posts data successfully!", posts))
}

async fn get_post(
    State(state): State<AppState>,
    _caller: CurrentUser,
    IdPath(id): IdPath,
    params: QueryParams,
) -> AppResult<Response> {
    let post = posts::get(&state, id, Includes::from_params(&params, false)).await?;
    Ok(respond(StatusCode::OK, "Get post data successfully!", post))
}

async fn create_post(
    State(state): State<AppState>,
    caller: CurrentUser,
    form: ImageForm<CreatePostRequest>,
) -> AppResult<Response> {
    let post = posts::create(&state, &caller, form.data, form.image).await?;
    Ok(respond(StatusCode::CREATED, "Post post data successfully!", post))
}

async fn update_post(
    State(state): State<AppState>,
    caller: CurrentUser,
    IdPath(id): IdPath,
    form: ImageForm<UpdatePostRequest>,
) -> AppResult<Response> {
    let post = posts::update(&state, &caller, id, form.data, form.image).await?;
    Ok(respond(StatusCode::OK, "Patch post data successfully!", post))
}

async fn delete_post(
    State(state): State<AppState>,
    caller: CurrentUser,
    IdPath(id): IdPath,
) -> AppResult<Response> {
    let post = posts::delete(&state, &caller, id).await?;
    Ok(respond(StatusCode::OK, "Delete post data successfully!", post))
}

// ========== Comments ==========

fn edge_filter(params: &QueryParams) -> AppResult<EdgeFilter> {
    Ok(EdgeFilter {
        post_id: params.id("postId")?,
        user_id: params.id("userId")?,
    })
}

async fn list_comments(
    State(state): State<AppState>,
    _caller: CurrentUser,
    params: QueryParams,
) -> AppResult<Response> {
    let comments = comments::list(&state, edge_filter(&params)?, params.page()?).await?;
    Ok(respond(StatusCode::OK, "Get comments data successfully!", comments))
}

async fn get_comment(
    State(state): State<AppState>,
    _caller: CurrentUser,
    IdPath(id): IdPath,
) -> AppResult<Response> {
    let comment = comments::get(&state, id).await?;
    Ok(respond(StatusCode::OK, "Get comment data successfully!", comment))
}

async fn create_comment(
    State(state): State<AppState>,
    caller: CurrentUser,
    ValidJson(request): ValidJson<CreateCommentRequest>,
) -> AppResult<Response> {
    let comment = comments::create(&state, &caller, request).await?;
    Ok(respond(StatusCode::CREATED, "Post comment successfully!", comment))
}

async fn update_comment(
    State(state): State<AppState>,
    caller: CurrentUser,
    IdPath(id): IdPath,
    ValidJson(request): ValidJson<UpdateCommentRequest>,
) -> AppResult<Response> {
    let comment = comments::update(&state, &caller, id, request).await?;
    Ok(respond(StatusCode::OK, "Patch comment successfully!", comment))
}

async fn delete_comment(
    State(state): State<AppState>,
    caller: CurrentUser,
    IdPath(id): IdPath,
) -> AppResult<Response> {
    let comment = comments::delete(&state, &caller, id).await?;
    Ok(respond(StatusCode::OK, "Delete comment successfully!", comment))
}

// ========== Likes / Reposts / Bookmarks ==========

/// `/<kind>s` and `/<kind>s/:id` for one engagement kind.
fn engagement_routes(kind: EngagementKind) -> Router<AppState> {
    let collection = format!("/{}", kind.table());
    let item = format!("/{}/:id", kind.table());

    Router::new()
        .route(
            &collection,
            get(
                move |State(state): State<AppState>, caller: CurrentUser, params: QueryParams| {
                    list_engagements(state, caller, params, kind)
                },
            )
            .post(
                move |State(state): State<AppState>,
                      caller: CurrentUser,
                      ValidJson(request): ValidJson<CreateEngagementRequest>| {
                    create_engagement(state, caller, request, kind)
                },
            ),
        )
        .route(
            &item,
            get(
                move |State(state): State<AppState>, caller: CurrentUser, IdPath(id): IdPath| {
                    get_engagement(state, caller, id, kind)
                },
            )
            .delete(
                move |State(state): State<AppState>, caller: CurrentUser, IdPath(id): IdPath| {
                    delete_engagement(state, caller, id, kind)
                },
            ),
        )
}

async fn list_engagements(
    state: AppState,
    _caller: CurrentUser,
    params: QueryParams,
    kind: EngagementKind,
) -> AppResult<Response> {
    let edges = engagements::list(&state, kind, edge_filter(&params)?, params.page()?).await?;
    Ok(respond(
        StatusCode::OK,
        format!("Get {} data successfully!", kind.table()),
        edges,
    ))
}

async fn get_engagement(
    state: AppState,
    _caller: CurrentUser,
    id: i64,
    kind: EngagementKind,
) -> AppResult<Response> {
    let edge = engagements::get(&state, kind, id).await?;
    Ok(respond(
        StatusCode::OK,
        format!("Get {} data successfully!", kind.label()),
        edge,
    ))
}

async fn create_engagement(
    state: AppState,
    caller: CurrentUser,
    request: CreateEngagementRequest,
    kind: EngagementKind,
) -> AppResult<Response> {
    Ok(match engagements::create(&state, &caller, kind, &request).await? {
        Toggle::Created(edge) => respond(
            StatusCode::CREATED,
            format!("Post {} successfully!", kind.label()),
            edge,
        ),
        Toggle::Removed(edge) => respond(
            StatusCode::OK,
            format!("Delete {} successfully!", kind.label()),
            edge,
        ),
    })
}

async fn delete_engagement(
    state: AppState,
    caller: CurrentUser,
    id: i64,
    kind: EngagementKind,
) -> AppResult<Response> {
    let edge = engagements::delete(&state, &caller, kind, id).await?;
    Ok(respond(
        StatusCode::OK,
        format!("Delete {} successfully!", kind.label()),
        edge,
    ))
}

// ========== Sessions ==========

async fn list_sessions(
    State(state): State<AppState>,
    caller: CurrentUser,
    params: QueryParams,
) -> AppResult<Response> {
    let sessions = sessions::list(&state, &caller, params.page()?).await?;
    Ok(respond(StatusCode::OK, "Get sessions data successfully!", sessions))
}

async fn get_session(
    State(state): State<AppState>,
    caller: CurrentUser,
    IdPath(id): IdPath,
) -> AppResult<Response> {
    let session = sessions::get(&state, &caller, id).await?;
    Ok(respond(StatusCode::OK, "Get session data successfully!", session))
}

async fn create_session(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    ValidJson(request): ValidJson<LoginRequest>,
) -> AppResult<Response> {
    let client = ClientInfo {
        ip: get_client_ip(&headers)
            .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip().to_string())),
        user_agent: get_user_agent(&headers),
    };
    let login = sessions::login(&state, request, client).await?;

    let cookie = refresh_cookie(
        &login.refresh_token,
        state.config.refresh_token_ttl.as_secs(),
    );
    let mut response = respond(StatusCode::CREATED, "Post session data successfully!", login);
    if let Ok(value) = cookie.parse() {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    Ok(response)
}

async fn delete_session(
    State(state): State<AppState>,
    caller: CurrentUser,
    IdPath(id): IdPath,
) -> AppResult<Response> {
    let session = sessions::delete(&state, &caller, id).await?;
    let mut response = respond(StatusCode::OK, "Delete session data successfully!", session);
    // Only logging out of the current session clears its cookie.
    if id == caller.session.id {
        if let Ok(value) = refresh_cookie("", 0).parse() {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    Ok(response)
}

async fn create_access_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let cookies = headers
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    let access_token = sessions::refresh(&state, refresh_token_from_cookies(cookies)).await?;
    Ok(respond(
        StatusCode::CREATED,
        "Access token created successfully!",
        json!({ "accessToken": access_token }),
    ))
}

// ========== Images ==========

async fn serve_image(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.images.get(&key).await {
        Ok(Some(image)) => (
            [
                (header::CONTENT_TYPE, image.content_type),
                (header::CACHE_CONTROL, "public, max-age=31536000".to_string()),
            ],
            image.bytes,
        )
            .into_response(),
        Ok(None) => AppError::not_found("Static file not found").into_response(),
        Err(e) => {
            tracing::error!(key = %key, "Failed to load image: {e:#}");
            AppError::not_found("Static file not found").into_response()
        }
    }
}
