//! Request/response types for the HTTP API.

use serde::{Deserialize, Serialize};

use crate::dispute::ResolutionKind;
use crate::task::{Applicant, Proof, Task};
use crate::users::Role;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub exp: i64,
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub dev_mode: bool,
    pub confirm_sla_hours: i64,
}

/// Simple acknowledgement body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub worker_id: Option<String>,
    pub poster_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A task plus the advisory high-value flag clients use to suggest escrow.
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    #[serde(flatten)]
    pub task: Task,
    pub high_value: bool,
}

impl TaskResponse {
    pub fn new(task: Task, escrow_threshold: i64) -> Self {
        let high_value = task.pay >= escrow_threshold;
        Self { task, high_value }
    }
}

/// Full task detail for the task page.
#[derive(Debug, Serialize)]
pub struct TaskDetailResponse {
    #[serde(flatten)]
    pub task: Task,
    pub high_value: bool,
    pub applicants: Vec<Applicant>,
    pub proof_submitted: Option<Proof>,
}

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    #[serde(default)]
    pub note: String,
    /// Distance in km from the geolocation collaborator, if available.
    pub distance: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SelectApplicantRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DisputeRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolution: ResolutionKind,
    /// Optional payout override in kobo (partial resolutions).
    pub pay_amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEscrowRequest {
    pub task_id: String,
    /// Must equal the task pay, in kobo.
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseEscrowRequest {
    #[serde(default)]
    pub recipient_id: Option<String>,
}
