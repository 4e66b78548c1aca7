//! User routes with avatar and cover image uploads.
//!
//! Create and update take `multipart/form-data`:
//! - `username`: text
//! - `avatar`, `cover_image`: a file part sets the attachment, a text part
//!   that is empty or `null` clears it, an absent part leaves it alone

use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use stowage_core::attachment::{Attachment, MultipartFile};
use stowage_core::lifecycle::AttachmentColumn;
use stowage_core::storage::SignedUrlOptions;
use stowage_db::User;
use stowage_shared::AppError;
use stowage_shared::types::{PageRequest, PageResponse};

use crate::AppState;
use crate::error::ApiError;

/// What a form part asks for one attachment column.
#[derive(Debug, Default)]
enum ColumnUpdate {
    #[default]
    Keep,
    Clear,
    Set(Attachment),
}

impl ColumnUpdate {
    fn apply(self, column: &mut AttachmentColumn) {
        match self {
            Self::Keep => {}
            Self::Clear => column.clear(),
            Self::Set(value) => column.set(value),
        }
    }
}

#[derive(Debug, Default)]
struct UserForm {
    username: Option<String>,
    avatar: ColumnUpdate,
    cover_image: ColumnUpdate,
}

impl UserForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
            let name = field.name().unwrap_or_default().to_string();
            let client_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.map_err(bad_form)?;

            match name.as_str() {
                "username" => {
                    let username = String::from_utf8(data.to_vec())
                        .map_err(|_| AppError::Validation("username must be UTF-8".into()))?;
                    form.username = Some(username.trim().to_string());
                }
                "avatar" | "cover_image" => {
                    let update = if client_name.is_none() && is_null_part(&data) {
                        ColumnUpdate::Clear
                    } else {
                        let file = MultipartFile::new(name.clone(), client_name, content_type, data);
                        ColumnUpdate::Set(Attachment::from_file(file))
                    };
                    if name == "avatar" {
                        form.avatar = update;
                    } else {
                        form.cover_image = update;
                    }
                }
                other => {
                    tracing::debug!(field = other, "Ignoring unknown form field");
                }
            }
        }
        Ok(form)
    }

    fn apply(self, user: &mut User) {
        if let Some(username) = self.username {
            user.username = username;
        }
        self.avatar.apply(&mut user.avatar);
        self.cover_image.apply(&mut user.cover_image);
    }
}

fn is_null_part(data: &[u8]) -> bool {
    let text = String::from_utf8_lossy(data);
    let text = text.trim();
    text.is_empty() || text == "null"
}

fn bad_form(err: axum::extract::multipart::MultipartError) -> ApiError {
    AppError::Validation(format!("invalid form: {}", err.body_text())).into()
}

async fn load(state: &AppState, id: i32) -> Result<User, ApiError> {
    state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {id}")).into())
}

/// POST /users
async fn create_user(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let form = UserForm::read(multipart).await?;
    let mut user = User::default();
    form.apply(&mut user);
    if user.username.is_empty() {
        return Err(AppError::Validation("username is required".into()).into());
    }

    state.users.save(&mut user).await?;
    let id = user.id.ok_or_else(|| AppError::Internal("saved user has no id".into()))?;
    Ok((StatusCode::CREATED, Json(load(&state, id).await?)))
}

/// PUT /users/{id}
async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> Result<Json<User>, ApiError> {
    let form = UserForm::read(multipart).await?;
    let mut user = load(&state, id).await?;
    form.apply(&mut user);
    if user.username.is_empty() {
        return Err(AppError::Validation("username must not be empty".into()).into());
    }

    state.users.save(&mut user).await?;
    Ok(Json(load(&state, id).await?))
}

/// GET /users/{id}
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(load(&state, id).await?))
}

/// GET /users
async fn list_users(
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> Result<Json<PageResponse<User>>, ApiError> {
    Ok(Json(state.users.list(&page).await?))
}

/// DELETE /users/{id}
async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let user = load(&state, id).await?;
    state.users.delete(&user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Query for a signed attachment URL.
#[derive(Debug, Deserialize)]
pub struct SignedUrlQuery {
    /// Lifetime in seconds; the disk default applies when absent.
    pub expires_in: Option<u64>,
    /// Ask the backend to answer with this `Content-Disposition`.
    pub disposition: Option<String>,
}

/// Signed URL response.
#[derive(Debug, Serialize)]
pub struct SignedUrlResponse {
    /// The signed URL.
    pub url: String,
}

/// GET /users/{id}/{field}/signed-url
async fn signed_url(
    State(state): State<AppState>,
    Path((id, field)): Path<(i32, String)>,
    Query(query): Query<SignedUrlQuery>,
) -> Result<Json<SignedUrlResponse>, ApiError> {
    let user = load(&state, id).await?;
    let column = match field.as_str() {
        "avatar" => &user.avatar,
        "cover_image" => &user.cover_image,
        _ => return Err(AppError::NotFound(format!("Attachment field {field}")).into()),
    };
    let attachment = column
        .get()
        .ok_or_else(|| AppError::NotFound(format!("User {id} has no {field}")))?;

    let options = SignedUrlOptions {
        expires_in: query.expires_in.map(Duration::from_secs),
        content_type: None,
        content_disposition: query.disposition,
    };
    let url = attachment.get_signed_url(&state.drive, &options).await?;
    Ok(Json(SignedUrlResponse { url }))
}

/// Creates user routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/{id}/{field}/signed-url", get(signed_url))
}
