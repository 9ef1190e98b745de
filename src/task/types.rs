//! Task types.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ParseEnumError;

/// Assignment mode, fixed at creation.
///
/// `Single` tasks are first-come-first-served: one worker reserves directly.
/// `Applications` tasks collect up to three applicants and the poster picks
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    Single,
    Applications,
}

impl TaskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskMode::Single => "single",
            TaskMode::Applications => "applications",
        }
    }
}

impl FromStr for TaskMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(TaskMode::Single),
            "applications" => Ok(TaskMode::Applications),
            other => Err(ParseEnumError::new("task mode", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Reserved,
    Completed,
    Paid,
    Disputed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Reserved => "reserved",
            TaskStatus::Completed => "completed",
            TaskStatus::Paid => "paid",
            TaskStatus::Disputed => "disputed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

}

impl FromStr for TaskStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TaskStatus::Active),
            "reserved" => Ok(TaskStatus::Reserved),
            "completed" => Ok(TaskStatus::Completed),
            "paid" => Ok(TaskStatus::Paid),
            "disputed" => Ok(TaskStatus::Disputed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(ParseEnumError::new("task status", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Pay in kobo.
    pub pay: i64,
    pub location: String,
    pub date_time: String,
    pub category: String,
    pub mode: TaskMode,
    pub proof_required: bool,
    pub status: TaskStatus,
    pub poster_id: String,
    pub worker_id: Option<String>,
    pub escrow_required: bool,
    pub escrow_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Task creation input.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Pay in kobo.
    pub pay: i64,
    pub location: String,
    pub date_time: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub mode: TaskMode,
    #[serde(default)]
    pub proof_required: bool,
}

fn default_category() -> String {
    "general".to_string()
}

/// An applicant on an applications-mode task, joined with the candidate's
/// trust profile for the poster's review.
#[derive(Debug, Clone, Serialize)]
pub struct Applicant {
    pub user_id: String,
    pub name: String,
    pub trusted: bool,
    pub completed_count: i64,
    pub note: String,
    /// Distance in km, supplied by the geolocation collaborator (0 when
    /// unavailable).
    pub distance: f64,
    pub applied_at: DateTime<Utc>,
}

pub(crate) fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let mode_str: String = row.get("mode")?;
    let mode = mode_str.parse::<TaskMode>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status_str: String = row.get("status")?;
    let status = status_str.parse::<TaskStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        pay: row.get("pay")?,
        location: row.get("location")?,
        date_time: row.get("date_time")?,
        category: row.get("category")?,
        mode,
        proof_required: row.get("proof_required")?,
        status,
        poster_id: row.get("poster_id")?,
        worker_id: row.get("worker_id")?,
        escrow_required: row.get("escrow_required")?,
        escrow_id: row.get("escrow_id")?,
        created_at: row.get("created_at")?,
        reserved_at: row.get("reserved_at")?,
        completed_at: row.get("completed_at")?,
        confirmed_at: row.get("confirmed_at")?,
    })
}

pub(crate) const SELECT_TASK: &str = r#"
    SELECT id, title, description, pay, location, date_time, category, mode,
           proof_required, status, poster_id, worker_id, escrow_required,
           escrow_id, created_at, reserved_at, completed_at, confirmed_at
    FROM tasks
"#;
