//! Escrow endpoints.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::routes::AppState;
use super::types::{CreateEscrowRequest, ReleaseEscrowRequest};
use crate::escrow::Escrow;
use crate::users::User;

/// POST /api/payments/escrow - Hold the task pay in escrow.
pub async fn create_escrow(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateEscrowRequest>,
) -> Result<(StatusCode, Json<Escrow>), (StatusCode, String)> {
    let escrow = state
        .store
        .create_escrow(&req.task_id, &user.id, req.amount)
        .await?;
    tracing::info!(
        "Escrow {} created for task {} by {}",
        escrow.id,
        req.task_id,
        user.id
    );
    Ok((StatusCode::CREATED, Json(escrow)))
}

/// POST /api/payments/escrow/:id/release - Release to the recipient.
pub async fn release_escrow(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Json(req): Json<ReleaseEscrowRequest>,
) -> Result<Json<Escrow>, (StatusCode, String)> {
    let escrow = state
        .store
        .release_escrow(&id, &user.id, req.recipient_id.as_deref())
        .await?;
    tracing::info!("Escrow {} released by {}", escrow.id, user.id);
    Ok(Json(escrow))
}

/// GET /api/payments/escrow - Escrows the caller is party to.
pub async fn list_escrows(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Escrow>>, (StatusCode, String)> {
    let escrows = state.store.escrows_for_user(&user.id).await?;
    Ok(Json(escrows))
}
