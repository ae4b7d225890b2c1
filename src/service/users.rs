use serde::Deserialize;
use tracing::info;

use super::{check_image, discard_image, store_image};
use crate::auth::{hash_password, verify_password, CurrentUser, MIN_PASSWORD_LENGTH};
use crate::db::{self, NewUser, Page, User, UserChanges, UserFilter};
use crate::storage::ImageFolder;
use crate::web::error::{AppError, AppResult};
use crate::web::extract::{FieldErrors, UploadedImage, Validate};
use crate::web::AppState;

const MIN_FULLNAME_LENGTH: usize = 3;
const MIN_USERNAME_LENGTH: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub fullname: String,
    pub username: String,
    pub password: String,
}

impl Validate for CreateUserRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        errors.min_len("fullname", &self.fullname, MIN_FULLNAME_LENGTH, "Fullname");
        errors.min_len("username", &self.username, MIN_USERNAME_LENGTH, "Username");
        errors.min_len("password", &self.password, MIN_PASSWORD_LENGTH, "Password");
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub fullname: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub old_password: Option<String>,
}

impl Validate for UpdateUserRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        errors.min_len_opt("fullname", self.fullname.as_deref(), MIN_FULLNAME_LENGTH, "Fullname");
        errors.min_len_opt("username", self.username.as_deref(), MIN_USERNAME_LENGTH, "Username");
        errors.min_len_opt("password", self.password.as_deref(), MIN_PASSWORD_LENGTH, "Password");
    }
}

/// # Errors
///
/// Not found when no user matches.
pub async fn list(state: &AppState, filter: &UserFilter, page: Page) -> AppResult<Vec<User>> {
    let users = db::list_users(state.db.pool(), filter, page).await?;
    if users.is_empty() {
        return Err(AppError::not_found("No users data found!"));
    }
    Ok(users)
}

/// # Errors
///
/// Not found when the user does not exist or was deleted.
pub async fn get(state: &AppState, id: i64) -> AppResult<User> {
    db::get_user(state.db.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found("No user data found!"))
}

async fn ensure_username_free(state: &AppState, username: &str) -> AppResult<()> {
    if db::get_user_by_username(state.db.pool(), username)
        .await?
        .is_some()
    {
        return Err(username_taken());
    }
    Ok(())
}

fn username_taken() -> AppError {
    AppError::bad_request("Username already used!")
}

/// A concurrent request can claim the username after the availability check;
/// the unique index catches it at write time.
fn write_error(e: anyhow::Error) -> AppError {
    if db::is_unique_violation(&e) {
        username_taken()
    } else {
        e.into()
    }
}

/// Register a new user with an optional profile picture.
///
/// # Errors
///
/// Bad request for a taken username or an invalid picture.
pub async fn create(
    state: &AppState,
    request: CreateUserRequest,
    picture: Option<UploadedImage>,
) -> AppResult<User> {
    if let Some(picture) = &picture {
        check_image(state, picture)?;
    }
    ensure_username_free(state, &request.username).await?;

    let password_hash = hash_password(&request.password)?;
    let picture_key = match &picture {
        Some(picture) => Some(store_image(state, ImageFolder::ProfilePictures, picture).await?),
        None => None,
    };

    let new_user = NewUser {
        fullname: request.fullname,
        username: request.username,
        password_hash,
        picture_key: picture_key.clone(),
    };

    let id = match db::insert_user(state.db.pool(), &new_user, state.clock.now()).await {
        Ok(id) => id,
        Err(e) => {
            if let Some(key) = &picture_key {
                discard_image(state, key).await;
            }
            return Err(write_error(e));
        }
    };

    info!(user_id = id, username = %new_user.username, "User registered");
    get(state, id).await
}

/// Update the caller's own profile.
///
/// # Errors
///
/// Not found, forbidden for someone else's profile, or bad request for a
/// taken username, a missing or wrong old password, or an invalid picture.
pub async fn update(
    state: &AppState,
    caller: &CurrentUser,
    id: i64,
    request: UpdateUserRequest,
    picture: Option<UploadedImage>,
) -> AppResult<User> {
    let user = get(state, id).await?;
    caller.ensure_owns(user.id)?;

    if let Some(picture) = &picture {
        check_image(state, picture)?;
    }

    if let Some(username) = &request.username {
        if *username != user.username {
            ensure_username_free(state, username).await?;
        }
    }

    let password_hash = match &request.password {
        Some(password) => {
            let old_password = request
                .old_password
                .as_deref()
                .ok_or_else(|| AppError::bad_request("Old password is required!"))?;
            if !verify_password(old_password, &user.password_hash)? {
                return Err(AppError::bad_request("Old password is incorrect!"));
            }
            Some(hash_password(password)?)
        }
        None => None,
    };

    let picture_key = match &picture {
        Some(picture) => Some(store_image(state, ImageFolder::ProfilePictures, picture).await?),
        None => None,
    };

    let changes = UserChanges {
        fullname: request.fullname,
        username: request.username,
        password_hash,
        picture_key: picture_key.clone(),
    };
    if let Err(e) = db::update_user(state.db.pool(), id, &changes, state.clock.now()).await {
        if let Some(key) = &picture_key {
            discard_image(state, key).await;
        }
        return Err(write_error(e));
    }

    if let (Some(new), Some(old)) = (&picture_key, &user.picture_key) {
        if new != old {
            discard_image(state, old).await;
        }
    }

    get(state, id).await
}

/// Soft-delete the caller's account and log out all of their sessions.
///
/// # Errors
///
/// Not found, or forbidden for someone else's account.
pub async fn delete(state: &AppState, caller: &CurrentUser, id: i64) -> AppResult<User> {
    let user = get(state, id).await?;
    caller.ensure_owns(user.id)?;

    db::soft_delete_user(state.db.pool(), id, state.clock.now()).await?;
    if let Some(key) = &user.picture_key {
        discard_image(state, key).await;
    }

    info!(user_id = id, "User deleted");
    Ok(user)
}
