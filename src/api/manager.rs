//! Manager endpoints: dispute queue, resolution, overdue confirmations.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::routes::AppState;
use super::types::ResolveRequest;
use crate::dispute::{DisputeCase, ManagerStats, ResolveOutcome};
use crate::error::CoreError;
use crate::scanner::OverdueTask;
use crate::users::User;

fn require_manager(user: &User) -> Result<(), (StatusCode, String)> {
    if user.role.is_manager() {
        Ok(())
    } else {
        Err(CoreError::Forbidden("Manager access required".to_string()).into())
    }
}

/// GET /api/manager/disputes - Pending disputes, oldest first.
pub async fn disputes(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<DisputeCase>>, (StatusCode, String)> {
    require_manager(&user)?;
    let disputes = state.store.pending_disputes().await?;
    Ok(Json(disputes))
}

/// POST /api/manager/disputes/:task_id/resolve - Resolve a dispute.
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(task_id): Path<String>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolveOutcome>, (StatusCode, String)> {
    require_manager(&user)?;
    let outcome = state
        .store
        .resolve_dispute(&task_id, &user, req.resolution, req.pay_amount)
        .await?;
    tracing::info!(
        "Dispute on task {} resolved as {} by {}",
        task_id,
        outcome.resolution.as_str(),
        user.id
    );
    Ok(Json(outcome))
}

/// GET /api/manager/overdue - Completed tasks past the confirmation SLA.
pub async fn overdue(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<OverdueTask>>, (StatusCode, String)> {
    require_manager(&user)?;
    let overdue = state
        .store
        .overdue_tasks(state.config.confirm_sla_hours)
        .await?;
    Ok(Json(overdue))
}

/// GET /api/manager/stats - Dashboard counters.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<ManagerStats>, (StatusCode, String)> {
    require_manager(&user)?;
    let stats = state
        .store
        .manager_stats(state.config.confirm_sla_hours)
        .await?;
    Ok(Json(stats))
}
