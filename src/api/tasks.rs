//! Task endpoints: listing, creation, and every lifecycle transition.
//!
//! Handlers stay thin: parse the request, hand the authenticated principal
//! to the store operation, map `CoreError` to a status code.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::routes::AppState;
use super::types::{
    ApplyRequest, DisputeRequest, ListTasksQuery, MessageResponse, SelectApplicantRequest,
    TaskDetailResponse, TaskResponse,
};
use crate::error::CoreError;
use crate::task::{Applicant, NewTask, ProofPayload, TaskFilter, TaskStatus};
use crate::users::User;

/// GET /api/tasks - List tasks with optional filters.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<TaskResponse>>, (StatusCode, String)> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(raw.parse::<TaskStatus>().map_err(|e| {
            (StatusCode::BAD_REQUEST, e.to_string())
        })?),
        None => None,
    };

    let tasks = state
        .store
        .list_tasks(TaskFilter {
            status,
            worker_id: query.worker_id,
            poster_id: query.poster_id,
            limit: query.limit.unwrap_or(50),
            offset: query.offset.unwrap_or(0),
        })
        .await?;

    let threshold = state.config.escrow_threshold;
    Ok(Json(
        tasks
            .into_iter()
            .map(|t| TaskResponse::new(t, threshold))
            .collect(),
    ))
}

/// POST /api/tasks - Create a task.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<NewTask>,
) -> Result<(StatusCode, Json<TaskResponse>), (StatusCode, String)> {
    let task = state.store.create_task(&user.id, req).await?;
    tracing::info!("Task {} created by {}", task.id, user.id);
    Ok((
        StatusCode::CREATED,
        Json(TaskResponse::new(task, state.config.escrow_threshold)),
    ))
}

/// GET /api/tasks/:id - Task detail with applicants and proof.
pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskDetailResponse>, (StatusCode, String)> {
    let task = state.store.task_by_id(&id).await?;
    let applicants = state.store.applicants_for_task(&id).await?;
    let proof_submitted = state.store.proof_for_task(&id).await?;
    let high_value = task.pay >= state.config.escrow_threshold;
    Ok(Json(TaskDetailResponse {
        task,
        high_value,
        applicants,
        proof_submitted,
    }))
}

/// POST /api/tasks/:id/reserve - Reserve a single-mode task.
pub async fn reserve(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, (StatusCode, String)> {
    let task = state.store.reserve(&id, &user.id).await?;
    Ok(Json(TaskResponse::new(task, state.config.escrow_threshold)))
}

/// POST /api/tasks/:id/apply - Apply for an applications-mode task.
pub async fn apply(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Json(req): Json<ApplyRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    state
        .store
        .apply(&id, &user.id, &req.note, req.distance)
        .await?;
    Ok(Json(MessageResponse::new(
        "Application submitted successfully",
    )))
}

/// POST /api/tasks/:id/select - Poster picks an applicant.
pub async fn select_applicant(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Json(req): Json<SelectApplicantRequest>,
) -> Result<Json<TaskResponse>, (StatusCode, String)> {
    let task = state
        .store
        .select_applicant(&id, &user.id, &req.user_id)
        .await?;
    Ok(Json(TaskResponse::new(task, state.config.escrow_threshold)))
}

/// POST /api/tasks/:id/proof - Worker submits completion proof.
pub async fn submit_proof(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Json(payload): Json<ProofPayload>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    state.store.submit_proof(&id, &user.id, payload).await?;
    Ok(Json(MessageResponse::new("Proof uploaded successfully")))
}

/// POST /api/tasks/:id/confirm - Poster confirms and pays.
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, (StatusCode, String)> {
    let task = state.store.confirm(&id, &user.id).await?;
    Ok(Json(TaskResponse::new(task, state.config.escrow_threshold)))
}

/// POST /api/tasks/:id/dispute - Open a dispute on a completed task.
pub async fn dispute(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Json(req): Json<DisputeRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    state.store.dispute(&id, &user.id, &req.reason).await?;
    Ok(Json(MessageResponse::new("Dispute submitted for review")))
}

/// POST /api/tasks/:id/cancel - Poster cancels an active task.
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    state.store.cancel_task(&id, &user.id).await?;
    Ok(Json(MessageResponse::new("Task cancelled")))
}

/// GET /api/tasks/:id/applicants - Applicant list, poster only.
pub async fn applicants(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Applicant>>, (StatusCode, String)> {
    let task = state.store.task_by_id(&id).await?;
    if task.poster_id != user.id {
        return Err(CoreError::Forbidden("Not authorized to view applicants".to_string()).into());
    }
    let applicants = state.store.applicants_for_task(&id).await?;
    Ok(Json(applicants))
}
