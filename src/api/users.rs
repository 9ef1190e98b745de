//! User endpoints: registration, profile, wallet, notifications.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::routes::AppState;
use super::types::MessageResponse;
use crate::notify::Notification;
use crate::users::{NewUser, User, Wallet};

/// POST /api/users/register - Create an account.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), (StatusCode, String)> {
    let user = state.store.create_user(req).await?;
    tracing::info!("Registered user {} ({})", user.name, user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/users/me - Current principal's profile.
pub async fn me(Extension(user): Extension<User>) -> Json<User> {
    Json(user)
}

/// GET /api/users/me/wallet - Earnings and confirmation backlog.
pub async fn wallet(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Wallet>, (StatusCode, String)> {
    let wallet = state.store.wallet(&user.id).await?;
    Ok(Json(wallet))
}

/// GET /api/users/me/notifications - Newest first.
pub async fn notifications(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Notification>>, (StatusCode, String)> {
    let notifications = state.store.notifications_for_user(&user.id).await?;
    Ok(Json(notifications))
}

/// POST /api/users/me/notifications/:id/read - Mark one notification read.
pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    if state.store.mark_notification_read(&user.id, &id).await? {
        Ok(Json(MessageResponse::new("Notification marked read")))
    } else {
        Err((StatusCode::NOT_FOUND, "Notification not found".to_string()))
    }
}
