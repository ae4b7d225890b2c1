//! Request extractors that report failures through the API envelope.

use std::collections::HashMap;

use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Multipart, Path, Query, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use super::error::AppError;
use crate::db::Page;

/// Field-level checks run after a body deserializes.
pub trait Validate {
    fn validate(&self, errors: &mut FieldErrors);
}

/// Collected validation failures, rendered as `"<message> at path <field>"`
/// separated by blank lines.
#[derive(Debug, Default)]
pub struct FieldErrors(Vec<String>);

impl FieldErrors {
    pub fn push(&mut self, path: &str, message: &str) {
        self.0.push(format!("{message} at path {path}"));
    }

    /// Require at least `min` characters.
    pub fn min_len(&mut self, path: &str, value: &str, min: usize, label: &str) {
        if value.chars().count() < min {
            self.push(
                path,
                &format!("{label} must be at least {min} characters long!"),
            );
        }
    }

    /// Same as [`min_len`](Self::min_len) for a field that may be absent.
    pub fn min_len_opt(&mut self, path: &str, value: Option<&str>, min: usize, label: &str) {
        if let Some(value) = value {
            self.min_len(path, value, min, label);
        }
    }

    fn into_result(self) -> Result<(), AppError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.0.join("\n\n")))
        }
    }
}

fn check<T: Validate>(value: &T) -> Result<(), AppError> {
    let mut errors = FieldErrors::default();
    value.validate(&mut errors);
    errors.into_result()
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    match rejection {
        JsonRejection::JsonDataError(e) => AppError::Validation(e.body_text()),
        JsonRejection::JsonSyntaxError(e) => AppError::bad_request(e.body_text()),
        JsonRejection::MissingJsonContentType(_) => AppError::bad_request("Invalid content type"),
        other => {
            warn!("Unhandled JSON rejection: {other:?}");
            AppError::bad_request(other.body_text())
        }
    }
}

/// JSON body that is deserialized strictly and then validated.
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(json_rejection)?;
        check(&value)?;
        Ok(Self(value))
    }
}

/// An uploaded image, not yet checked against type or size limits.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A body that arrives either as JSON or as `multipart/form-data` with an
/// optional `image` file field alongside text fields.
#[derive(Debug)]
pub struct ImageForm<T> {
    pub data: T,
    pub image: Option<UploadedImage>,
}

#[async_trait]
impl<T, S> FromRequest<S> for ImageForm<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));

        if !is_multipart {
            let ValidJson(data) = ValidJson::<T>::from_request(req, state).await?;
            return Ok(Self { data, image: None });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;

        let mut fields = Map::new();
        let mut image = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == "image" {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::bad_request(e.body_text()))?;
                if !bytes.is_empty() {
                    image = Some(UploadedImage {
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::bad_request(e.body_text()))?;
                fields.insert(name, Value::String(text));
            }
        }

        let data: T = serde_json::from_value(Value::Object(fields))
            .map_err(|e| AppError::Validation(e.to_string()))?;
        check(&data)?;

        Ok(Self { data, image })
    }
}

/// Numeric `:id` path segment.
#[derive(Debug, Clone, Copy)]
pub struct IdPath(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for IdPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::bad_request("Id must be number!"))?;
        Ok(Self(id))
    }
}

/// Raw query string parameters with typed accessors.
#[derive(Debug, Default)]
pub struct QueryParams(HashMap<String, String>);

impl QueryParams {
    #[must_use]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// Non-empty string value.
    #[must_use]
    pub fn string(&self, name: &str) -> Option<String> {
        self.0.get(name).filter(|v| !v.is_empty()).cloned()
    }

    /// `true` only for the literal value `true`.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.0.get(name).is_some_and(|v| v == "true")
    }

    /// Optional numeric id filter.
    ///
    /// # Errors
    ///
    /// Returns a bad request if the value is present but not an integer.
    pub fn id(&self, name: &str) -> Result<Option<i64>, AppError> {
        match self.0.get(name).filter(|v| !v.is_empty()) {
            None => Ok(None),
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_| AppError::bad_request(format!("{name} must be number!"))),
        }
    }

    /// `limit` (default 10) and zero-based `page`.
    ///
    /// # Errors
    ///
    /// Returns a bad request if either is not a non-negative integer.
    pub fn page(&self) -> Result<Page, AppError> {
        let parse = |name: &str| -> Result<Option<i64>, AppError> {
            match self.0.get(name).filter(|v| !v.is_empty()) {
                None => Ok(None),
                Some(v) => match v.parse::<i64>() {
                    Ok(n) if n >= 0 => Ok(Some(n)),
                    _ => Err(AppError::bad_request("Limit or page must be number!")),
                },
            }
        };

        let limit = parse("limit")?
            .filter(|&n| n > 0)
            .unwrap_or(Page::DEFAULT_LIMIT);
        let page = parse("page")?.unwrap_or(0);
        Ok(Page::new(limit, page))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for QueryParams
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        Ok(Self(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults_and_offsets() {
        let params = QueryParams::default();
        assert_eq!(params.page().unwrap(), Page::new(10, 0));

        let params = QueryParams::from_pairs([("limit", "5"), ("page", "2")]);
        assert_eq!(params.page().unwrap(), Page { limit: 5, offset: 10 });

        let params = QueryParams::from_pairs([("limit", "0")]);
        assert_eq!(params.page().unwrap().limit, 10);
    }

    #[test]
    fn test_page_rejects_non_numbers() {
        for (k, v) in [("limit", "ten"), ("page", "x"), ("page", "-1")] {
            let err = QueryParams::from_pairs([(k, v)]).page().unwrap_err();
            assert_eq!(err.to_string(), "Limit or page must be number!");
        }
    }

    #[test]
    fn test_flags_and_ids() {
        let params = QueryParams::from_pairs([("isTrending", "true"), ("userId", "4")]);
        assert!(params.flag("isTrending"));
        assert!(!params.flag("includeAll"));
        assert_eq!(params.id("userId").unwrap(), Some(4));
        assert_eq!(params.id("postId").unwrap(), None);
        assert!(QueryParams::from_pairs([("postId", "abc")]).id("postId").is_err());
    }

    #[test]
    fn test_field_errors_message() {
        let mut errors = FieldErrors::default();
        errors.min_len("fullname", "ab", 3, "Fullname");
        errors.min_len("username", "short", 8, "Username");
        errors.min_len_opt("password", None, 8, "Password");
        let err = errors.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Fullname must be at least 3 characters long! at path fullname\n\n\
             Username must be at least 8 characters long! at path username"
        );
    }
}
