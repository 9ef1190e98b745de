//! Completion proof.
//!
//! A proof belongs 1:1 to a task; resubmission overwrites (last write wins,
//! no history). The file storage collaborator turns raw image bytes into
//! references — the core only ever stores the references.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::types::{task_from_row, SELECT_TASK};
use crate::db::Store;
use crate::error::{CoreError, CoreResult, ParseEnumError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofType {
    Photo,
    Code,
}

impl ProofType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofType::Photo => "photo",
            ProofType::Code => "code",
        }
    }
}

impl FromStr for ProofType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(ProofType::Photo),
            "code" => Ok(ProofType::Code),
            other => Err(ParseEnumError::new("proof type", other)),
        }
    }
}

/// Worker-submitted completion evidence.
#[derive(Debug, Clone, Deserialize)]
pub struct ProofPayload {
    #[serde(rename = "type")]
    pub proof_type: ProofType,
    /// Reference to the before image (photo proofs).
    pub before_image: Option<String>,
    /// Reference to the after image (photo proofs).
    pub after_image: Option<String>,
    /// Completion code (code proofs).
    pub code: Option<String>,
}

impl ProofPayload {
    /// Photo proofs need both image references; code proofs a non-empty code.
    pub fn validate(&self) -> CoreResult<()> {
        match self.proof_type {
            ProofType::Photo => {
                let has_both = self.before_image.as_deref().is_some_and(|s| !s.is_empty())
                    && self.after_image.as_deref().is_some_and(|s| !s.is_empty());
                if !has_both {
                    return Err(CoreError::Validation(
                        "Photo proof requires both before and after images".to_string(),
                    ));
                }
            }
            ProofType::Code => {
                if self.code.as_deref().map_or(true, |c| c.trim().is_empty()) {
                    return Err(CoreError::Validation(
                        "Code proof requires a non-empty code".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Proof {
    pub task_id: String,
    #[serde(rename = "type")]
    pub proof_type: ProofType,
    pub before_image: Option<String>,
    pub after_image: Option<String>,
    pub code: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl Store {
    /// Submit (or resubmit) completion proof and move the task to
    /// `completed`. Only the assigned worker may submit, and only while the
    /// task is `reserved`.
    pub async fn submit_proof(
        &self,
        task_id: &str,
        worker_id: &str,
        payload: ProofPayload,
    ) -> CoreResult<()> {
        payload.validate()?;

        let (poster_id, title, worker_name) = {
            let mut conn = self.conn.lock().await;
            let tx = conn.transaction()?;

            let task = tx
                .query_row(
                    &format!("{SELECT_TASK} WHERE id = ?1"),
                    params![task_id],
                    task_from_row,
                )
                .optional()?
                .ok_or_else(|| CoreError::NotFound("Task".to_string()))?;

            if task.worker_id.as_deref() != Some(worker_id) {
                return Err(CoreError::Forbidden(
                    "Not authorized to submit proof for this task".to_string(),
                ));
            }

            let now = Utc::now();
            let changed = tx.execute(
                r#"
                UPDATE tasks SET status = 'completed', completed_at = ?1
                WHERE id = ?2 AND status = 'reserved' AND worker_id = ?3
                "#,
                params![now, task_id, worker_id],
            )?;
            if changed == 0 {
                return Err(CoreError::Conflict(
                    "Task is not in reserved state".to_string(),
                ));
            }

            tx.execute(
                r#"
                INSERT INTO proofs (task_id, type, before_image_url, after_image_url, code, submitted_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT (task_id) DO UPDATE SET
                    type = excluded.type,
                    before_image_url = excluded.before_image_url,
                    after_image_url = excluded.after_image_url,
                    code = excluded.code,
                    submitted_at = excluded.submitted_at
                "#,
                params![
                    task_id,
                    payload.proof_type.as_str(),
                    payload.before_image,
                    payload.after_image,
                    payload.code,
                    now,
                ],
            )?;

            let worker_name: String = tx.query_row(
                "SELECT name FROM users WHERE id = ?1",
                params![worker_id],
                |row| row.get(0),
            )?;

            tx.commit()?;
            (task.poster_id, task.title, worker_name)
        };

        self.notify_best_effort(
            &poster_id,
            "Task Completed - Review Required",
            &format!("{} completed task with proof: {}", worker_name, title),
            Some(task_id),
        )
        .await;

        Ok(())
    }

    /// The proof on file for a task, if any.
    pub async fn proof_for_task(&self, task_id: &str) -> CoreResult<Option<Proof>> {
        let conn = self.conn.lock().await;
        let proof = conn
            .query_row(
                r#"
                SELECT task_id, type, before_image_url, after_image_url, code, submitted_at
                FROM proofs WHERE task_id = ?1
                "#,
                params![task_id],
                |row| {
                    let type_str: String = row.get(1)?;
                    let proof_type = type_str.parse::<ProofType>().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                    Ok(Proof {
                        task_id: row.get(0)?,
                        proof_type,
                        before_image: row.get(2)?,
                        after_image: row.get(3)?,
                        code: row.get(4)?,
                        submitted_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(proof)
    }
}
