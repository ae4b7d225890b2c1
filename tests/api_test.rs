//! HTTP-level tests for the REST API.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use social_api::auth::TokenService;
use social_api::clock::FixedClock;
use social_api::config::Config;
use social_api::db::Database;
use social_api::storage::MemoryImageStore;
use social_api::web::{create_app, AppState};
use tempfile::TempDir;
use tower::ServiceExt;

const IMAGE_MAX_BYTES: usize = 1024 * 1024;

fn test_config(temp_dir: &TempDir) -> Config {
    Config {
        database_path: temp_dir.path().join("test.sqlite"),
        web_host: "127.0.0.1".to_string(),
        web_port: 0,
        client_url: Some("http://localhost:5173".to_string()),
        access_token_secret: "access-secret-for-tests".to_string(),
        refresh_token_secret: "refresh-secret-for-tests".to_string(),
        access_token_ttl: Duration::from_secs(900),
        refresh_token_ttl: Duration::from_secs(86_400),
        s3_bucket: None,
        s3_region: "us-east-1".to_string(),
        s3_endpoint: None,
        s3_prefix: String::new(),
        image_max_bytes: IMAGE_MAX_BYTES,
        trending_interval: Duration::from_secs(60),
        clock_offset_hours: 0,
    }
}

async fn setup_app() -> (Router, TempDir) {
    let (app, _images, temp_dir) = setup_app_with_images().await;
    (app, temp_dir)
}

/// Like [`setup_app`], also handing back the image store behind the router.
async fn setup_app_with_images() -> (Router, Arc<MemoryImageStore>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);
    let db = Database::new(&config.database_path)
        .await
        .expect("Failed to create database");
    let now = DateTime::parse_from_rfc3339("2024-05-01T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc);

    let images = Arc::new(MemoryImageStore::default());
    let state = AppState {
        db,
        tokens: Arc::new(TokenService::from_config(&config)),
        config: Arc::new(config),
        clock: Arc::new(FixedClock(now)),
        images: images.clone(),
    };
    (create_app(state), images, temp_dir)
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse {
        status,
        headers,
        body,
    }
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn multipart_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    fields: &[(&str, &str)],
    image: Option<(&str, &[u8])>,
) -> Request<Body> {
    const BOUNDARY: &str = "----social-api-test-boundary";
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((content_type, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder().method(method).uri(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

async fn register(app: &Router, username: &str) -> i64 {
    let response = send(
        app,
        json_request(
            Method::POST,
            "/users",
            None,
            &json!({ "fullname": "Test Person", "username": username, "password": "password123" }),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    response.body["data"]["id"].as_i64().unwrap()
}

/// Log in and return the access token and the refresh cookie pair.
async fn login(app: &Router, username: &str) -> (String, String) {
    let response = send(
        app,
        json_request(
            Method::POST,
            "/sessions",
            None,
            &json!({ "username": username, "password": "password123" }),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);

    let token = response.body["data"]["accessToken"]
        .as_str()
        .unwrap()
        .to_string();
    let cookie = response.headers[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    (token, cookie)
}

async fn create_post(app: &Router, token: &str, caption: &str) -> i64 {
    let response = send(
        app,
        json_request(Method::POST, "/posts", Some(token), &json!({ "caption": caption })),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    response.body["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _temp_dir) = setup_app().await;
    let response = app
        .clone()
        .oneshot(get_request("/healthz", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_register_returns_envelope_without_secrets() {
    let (app, _temp_dir) = setup_app().await;
    let response = send(
        &app,
        json_request(
            Method::POST,
            "/users",
            None,
            &json!({ "fullname": "Alice Wonder", "username": "alice_wonder", "password": "password123" }),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["error"], false);
    assert_eq!(response.body["statusCode"], 201);
    assert_eq!(response.body["message"], "Post user data successfully!");
    assert!(response.body["pagination"].is_null());
    assert_eq!(response.body["data"]["username"], "alice_wonder");
    assert_eq!(response.body["data"]["role"], "USER");
    assert_eq!(response.body["data"]["createdAt"], "2024-05-01T08:00:00.000Z");
    assert!(response.body["data"].get("password").is_none());
    assert!(response.body["data"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_register_rejects_duplicate_username() {
    let (app, _temp_dir) = setup_app().await;
    register(&app, "alice_wonder").await;

    let response = send(
        &app,
        json_request(
            Method::POST,
            "/users",
            None,
            &json!({ "fullname": "Other", "username": "alice_wonder", "password": "password123" }),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], true);
    assert_eq!(response.body["message"], "Username already used!");
}

#[tokio::test]
async fn test_register_validation_messages() {
    let (app, _temp_dir) = setup_app().await;
    let response = send(
        &app,
        json_request(
            Method::POST,
            "/users",
            None,
            &json!({ "fullname": "Al", "username": "short", "password": "password123" }),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body["message"],
        "Fullname must be at least 3 characters long! at path fullname\n\n\
         Username must be at least 8 characters long! at path username"
    );
}

#[tokio::test]
async fn test_unknown_fields_rejected() {
    let (app, _temp_dir) = setup_app().await;
    let response = send(
        &app,
        json_request(
            Method::POST,
            "/users",
            None,
            &json!({
                "fullname": "Alice Wonder",
                "username": "alice_wonder",
                "password": "password123",
                "role": "ADMIN"
            }),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let (app, _temp_dir) = setup_app().await;
    register(&app, "alice_wonder").await;

    let response = send(
        &app,
        json_request(
            Method::POST,
            "/sessions",
            None,
            &json!({ "username": "alice_wonder", "password": "wrong-password" }),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["message"], "Post session data not valid!");
}

#[tokio::test]
async fn test_login_sets_refresh_cookie() {
    let (app, _temp_dir) = setup_app().await;
    let user_id = register(&app, "alice_wonder").await;

    let response = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/sessions")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, "api-test")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::from(
                json!({ "username": "alice_wonder", "password": "password123" }).to_string(),
            ))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["message"], "Post session data successfully!");
    assert_eq!(response.body["data"]["userId"], user_id);
    assert_eq!(response.body["data"]["ip"], "203.0.113.7");
    assert_eq!(response.body["data"]["userAgent"], "api-test");
    assert!(response.body["data"]["accessToken"].is_string());
    assert!(response.body["data"].get("refreshToken").is_none());

    let cookie = response.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("refreshToken="));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (app, _temp_dir) = setup_app().await;

    for uri in ["/users", "/posts", "/comments", "/likes", "/sessions"] {
        let response = send(&app, get_request(uri, None)).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(response.body["message"], "You are not authorized!");
    }

    let response = send(&app, get_request("/posts", Some("not-a-jwt"))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_access_token_from_refresh_cookie() {
    let (app, _temp_dir) = setup_app().await;
    register(&app, "alice_wonder").await;
    let (_, cookie) = login(&app, "alice_wonder").await;

    let response = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/access-tokens")
            .header(header::COOKIE, format!("theme=dark; {cookie}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["message"], "Access token created successfully!");

    let token = response.body["data"]["accessToken"].as_str().unwrap();
    let response = send(&app, get_request("/users", Some(token))).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/access-tokens")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["message"], "You are not authenticated!");
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let (app, _temp_dir) = setup_app().await;
    register(&app, "alice_wonder").await;
    let (token, cookie) = login(&app, "alice_wonder").await;

    let sessions = send(&app, get_request("/sessions", Some(&token))).await;
    assert_eq!(sessions.status, StatusCode::OK);
    let session_id = sessions.body["data"][0]["id"].as_i64().unwrap();

    let response = send(
        &app,
        json_request(
            Method::DELETE,
            &format!("/sessions/{session_id}"),
            Some(&token),
            &Value::Null,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = send(&app, get_request("/posts", Some(&token))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/access-tokens")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_post_lifecycle() {
    let (app, _temp_dir) = setup_app().await;
    let user_id = register(&app, "alice_wonder").await;
    let (token, _) = login(&app, "alice_wonder").await;

    let response = send(&app, get_request("/posts", Some(&token))).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["message"], "No posts data found!");

    let post_id = create_post(&app, &token, "Hello world").await;

    let response = send(
        &app,
        get_request(&format!("/posts/{post_id}?includeUser=true"), Some(&token)),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["caption"], "Hello world");
    assert_eq!(response.body["data"]["userId"], user_id);
    assert_eq!(response.body["data"]["trendingScore"], 0.0);
    assert_eq!(response.body["data"]["user"]["username"], "alice_wonder");

    let response = send(
        &app,
        json_request(
            Method::PATCH,
            &format!("/posts/{post_id}"),
            Some(&token),
            &json!({ "caption": "Edited" }),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Patch post data successfully!");
    assert_eq!(response.body["data"]["caption"], "Edited");

    let response = send(
        &app,
        json_request(
            Method::DELETE,
            &format!("/posts/{post_id}"),
            Some(&token),
            &Value::Null,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = send(&app, get_request(&format!("/posts/{post_id}"), Some(&token))).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["message"], "No post data found!");
}

#[tokio::test]
async fn test_only_owner_may_modify() {
    let (app, _temp_dir) = setup_app().await;
    register(&app, "alice_wonder").await;
    register(&app, "bob_builder").await;
    let (alice, _) = login(&app, "alice_wonder").await;
    let (bob, _) = login(&app, "bob_builder").await;

    let post_id = create_post(&app, &alice, "Alice's post").await;

    let response = send(
        &app,
        json_request(
            Method::PATCH,
            &format!("/posts/{post_id}"),
            Some(&bob),
            &json!({ "caption": "hijacked" }),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["message"], "You are not have permission!");

    let response = send(
        &app,
        json_request(
            Method::DELETE,
            &format!("/posts/{post_id}"),
            Some(&bob),
            &Value::Null,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_like_toggles() {
    let (app, _temp_dir) = setup_app().await;
    register(&app, "alice_wonder").await;
    let bob_id = register(&app, "bob_builder").await;
    let (alice, _) = login(&app, "alice_wonder").await;
    let (bob, _) = login(&app, "bob_builder").await;
    let post_id = create_post(&app, &alice, "Like me").await;

    let like = json!({ "postId": post_id });
    let response = send(&app, json_request(Method::POST, "/likes", Some(&bob), &like)).await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["message"], "Post like successfully!");
    assert_eq!(response.body["data"]["userId"], bob_id);

    let response = send(
        &app,
        get_request(&format!("/likes?postId={post_id}"), Some(&alice)),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"].as_array().unwrap().len(), 1);

    let response = send(&app, json_request(Method::POST, "/likes", Some(&bob), &like)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Delete like successfully!");

    let response = send(
        &app,
        get_request(&format!("/likes?postId={post_id}"), Some(&alice)),
    )
    .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["message"], "No likes data found!");
}

#[tokio::test]
async fn test_comment_on_missing_post() {
    let (app, _temp_dir) = setup_app().await;
    register(&app, "alice_wonder").await;
    let (token, _) = login(&app, "alice_wonder").await;

    let response = send(
        &app,
        json_request(
            Method::POST,
            "/comments",
            Some(&token),
            &json!({ "text": "anyone?", "postId": 999 }),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["message"], "No post data found!");
}

#[tokio::test]
async fn test_comments_listed_with_post() {
    let (app, _temp_dir) = setup_app().await;
    register(&app, "alice_wonder").await;
    let (token, _) = login(&app, "alice_wonder").await;
    let post_id = create_post(&app, &token, "Talk to me").await;

    let response = send(
        &app,
        json_request(
            Method::POST,
            "/comments",
            Some(&token),
            &json!({ "text": "first!", "postId": post_id }),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["message"], "Post comment successfully!");

    let response = send(
        &app,
        get_request(
            &format!("/posts/{post_id}?includeComments=true"),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["comments"][0]["text"], "first!");
}

#[tokio::test]
async fn test_query_parameter_errors() {
    let (app, _temp_dir) = setup_app().await;
    register(&app, "alice_wonder").await;
    let (token, _) = login(&app, "alice_wonder").await;

    let response = send(&app, get_request("/posts?limit=abc", Some(&token))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["message"], "Limit or page must be number!");

    let response = send(&app, get_request("/posts/abc", Some(&token))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["message"], "Id must be number!");
}

#[tokio::test]
async fn test_post_with_image_is_served() {
    let (app, _temp_dir) = setup_app().await;
    register(&app, "alice_wonder").await;
    let (token, _) = login(&app, "alice_wonder").await;

    let png: &[u8] = b"\x89PNG\r\n\x1a\nnot really a png";
    let response = send(
        &app,
        multipart_request(
            Method::POST,
            "/posts",
            Some(&token),
            &[("caption", "Look at this")],
            Some(("image/png", png)),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    let image_url = response.body["data"]["imageUrl"].as_str().unwrap().to_string();
    assert!(image_url.starts_with("/public/post-images/"));
    assert!(image_url.ends_with(".png"));

    let response = app
        .clone()
        .oneshot(get_request(&image_url, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], png);

    let response = send(&app, get_request("/public/post-images/missing.png", None)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["message"], "Static file not found");
}

#[tokio::test]
async fn test_image_upload_limits() {
    let (app, _temp_dir) = setup_app().await;
    register(&app, "alice_wonder").await;
    let (token, _) = login(&app, "alice_wonder").await;

    let response = send(
        &app,
        multipart_request(
            Method::POST,
            "/posts",
            Some(&token),
            &[("caption", "Not an image")],
            Some(("text/plain", b"hello".as_slice())),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["message"], "Only image files are allowed!");

    let oversized = vec![0u8; IMAGE_MAX_BYTES + 1];
    let response = send(
        &app,
        multipart_request(
            Method::POST,
            "/posts",
            Some(&token),
            &[("caption", "Too big")],
            Some(("image/jpeg", oversized.as_slice())),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["message"], "Image size must be less than 1MB!");
}

#[tokio::test]
async fn test_delete_user_ends_access() {
    let (app, _temp_dir) = setup_app().await;
    let user_id = register(&app, "alice_wonder").await;
    let (token, _) = login(&app, "alice_wonder").await;

    let response = send(
        &app,
        json_request(
            Method::DELETE,
            &format!("/users/{user_id}"),
            Some(&token),
            &Value::Null,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Delete user data successfully!");

    let response = send(&app, get_request("/users", Some(&token))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    // username is free again
    register(&app, "alice_wonder").await;
}

async fn fetch_image(app: &Router, url: &str) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(get_request(url, None)).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn image_key(url: &str) -> &str {
    url.strip_prefix("/public/").unwrap()
}

async fn create_image_post(app: &Router, token: &str, png: &[u8]) -> (i64, String) {
    let response = send(
        app,
        multipart_request(
            Method::POST,
            "/posts",
            Some(token),
            &[("caption", "with image")],
            Some(("image/png", png)),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    (
        response.body["data"]["id"].as_i64().unwrap(),
        response.body["data"]["imageUrl"].as_str().unwrap().to_string(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_same_username() {
    let (app, _temp_dir) = setup_app().await;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move {
                send(
                    &app,
                    json_request(
                        Method::POST,
                        "/users",
                        None,
                        &json!({ "fullname": "Same Name", "username": "samename1", "password": "password123" }),
                    ),
                )
                .await
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        let response = handle.await.unwrap();
        if response.status == StatusCode::CREATED {
            created += 1;
        } else {
            assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", response.body);
            assert_eq!(response.body["message"], "Username already used!");
        }
    }
    assert_eq!(created, 1);
}

#[tokio::test]
async fn test_uploads_in_same_instant_keep_separate_images() {
    let (app, images, _temp_dir) = setup_app_with_images().await;
    register(&app, "alice_wonder").await;
    register(&app, "bob_builder").await;
    let (alice, _) = login(&app, "alice_wonder").await;
    let (bob, _) = login(&app, "bob_builder").await;

    let (_, alice_url) = create_image_post(&app, &alice, b"alice").await;
    let (bob_post, bob_url) = create_image_post(&app, &bob, b"bob").await;
    assert_ne!(alice_url, bob_url);
    assert_eq!(images.len().await, 2);

    assert_eq!(fetch_image(&app, &alice_url).await.1, b"alice");
    assert_eq!(fetch_image(&app, &bob_url).await.1, b"bob");

    let response = send(
        &app,
        json_request(
            Method::DELETE,
            &format!("/posts/{bob_post}"),
            Some(&bob),
            &Value::Null,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);

    assert_eq!(fetch_image(&app, &alice_url).await, (StatusCode::OK, b"alice".to_vec()));
    assert!(images.contains(image_key(&alice_url)).await);
    assert!(!images.contains(image_key(&bob_url)).await);
}

#[tokio::test]
async fn test_replacing_post_image_removes_old_one() {
    let (app, images, _temp_dir) = setup_app_with_images().await;
    register(&app, "alice_wonder").await;
    let (token, _) = login(&app, "alice_wonder").await;

    let (post_id, old_url) = create_image_post(&app, &token, b"first").await;

    let response = send(
        &app,
        multipart_request(
            Method::PATCH,
            &format!("/posts/{post_id}"),
            Some(&token),
            &[],
            Some(("image/png", b"second".as_slice())),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["data"]["caption"], "with image");
    let new_url = response.body["data"]["imageUrl"].as_str().unwrap().to_string();
    assert_ne!(new_url, old_url);

    assert_eq!(fetch_image(&app, &old_url).await.0, StatusCode::NOT_FOUND);
    assert_eq!(fetch_image(&app, &new_url).await, (StatusCode::OK, b"second".to_vec()));
    assert_eq!(images.len().await, 1);

    let response = send(
        &app,
        json_request(
            Method::DELETE,
            &format!("/posts/{post_id}"),
            Some(&token),
            &Value::Null,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(fetch_image(&app, &new_url).await.0, StatusCode::NOT_FOUND);
    assert!(images.is_empty().await);
}

#[tokio::test]
async fn test_replacing_profile_picture_removes_old_one() {
    let (app, images, _temp_dir) = setup_app_with_images().await;

    let response = send(
        &app,
        multipart_request(
            Method::POST,
            "/users",
            None,
            &[
                ("fullname", "Alice Wonder"),
                ("username", "alice_wonder"),
                ("password", "password123"),
            ],
            Some(("image/jpeg", b"portrait".as_slice())),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    let user_id = response.body["data"]["id"].as_i64().unwrap();
    let old_url = response.body["data"]["pictureUrl"].as_str().unwrap().to_string();
    assert!(old_url.starts_with("/public/profile-pictures/"));
    assert!(old_url.ends_with(".jpeg"));

    let (token, _) = login(&app, "alice_wonder").await;
    let response = send(
        &app,
        multipart_request(
            Method::PATCH,
            &format!("/users/{user_id}"),
            Some(&token),
            &[("fullname", "Alice W.")],
            Some(("image/jpeg", b"new portrait".as_slice())),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["data"]["fullname"], "Alice W.");
    let new_url = response.body["data"]["pictureUrl"].as_str().unwrap().to_string();

    assert_eq!(fetch_image(&app, &old_url).await.0, StatusCode::NOT_FOUND);
    assert_eq!(
        fetch_image(&app, &new_url).await,
        (StatusCode::OK, b"new portrait".to_vec())
    );

    let response = send(
        &app,
        json_request(
            Method::DELETE,
            &format!("/users/{user_id}"),
            Some(&token),
            &Value::Null,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(fetch_image(&app, &new_url).await.0, StatusCode::NOT_FOUND);
    assert!(images.is_empty().await);
}

#[tokio::test]
async fn test_deleting_other_session_keeps_cookie() {
    let (app, _temp_dir) = setup_app().await;
    register(&app, "alice_wonder").await;
    let (laptop, _) = login(&app, "alice_wonder").await;
    let (phone, _) = login(&app, "alice_wonder").await;

    let sessions = send(&app, get_request("/sessions", Some(&laptop))).await;
    assert_eq!(sessions.status, StatusCode::OK);
    let ids: Vec<i64> = sessions.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    let (laptop_id, phone_id) = (ids[0], ids[1]);

    let response = send(
        &app,
        json_request(
            Method::DELETE,
            &format!("/sessions/{phone_id}"),
            Some(&laptop),
            &Value::Null,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.headers.get(header::SET_COOKIE).is_none());
    assert_eq!(
        send(&app, get_request("/sessions", Some(&phone))).await.status,
        StatusCode::UNAUTHORIZED
    );

    let response = send(
        &app,
        json_request(
            Method::DELETE,
            &format!("/sessions/{laptop_id}"),
            Some(&laptop),
            &Value::Null,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    let cookie = response.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("refreshToken=;"));
    assert!(cookie.contains("Max-Age=0"));
}


#[tokio::test]
async fn test_failed_update_discards_new_image() {
    let (app, images, temp_dir) = setup_app_with_images().await;
    register(&app, "alice_wonder").await;
    let (token, _) = login(&app, "alice_wonder").await;
    let (post_id, old_url) = create_image_post(&app, &token, b"first").await;

    let db = Database::new(&temp_dir.path().join("test.sqlite")).await.unwrap();
    sqlx::query(
        "CREATE TRIGGER posts_read_only BEFORE UPDATE ON posts
         BEGIN SELECT RAISE(ABORT, 'posts are read-only'); END",
    )
    .execute(db.pool())
    .await
    .unwrap();

    let response = send(
        &app,
        multipart_request(
            Method::PATCH,
            &format!("/posts/{post_id}"),
            Some(&token),
            &[],
            Some(("image/png", b"second".as_slice())),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(images.len().await, 1);
    assert!(images.contains(image_key(&old_url)).await);
    assert_eq!(fetch_image(&app, &old_url).await, (StatusCode::OK, b"first".to_vec()));
}
