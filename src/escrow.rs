//! Simulated escrow for high-value tasks.
//!
//! An escrow holds the full task pay until the poster releases it to a
//! recipient. Release is the alternate payment path to poster confirmation;
//! both converge on the same ledger credit and terminal `paid` task state,
//! and the `status = 'held'` write guard keeps the payout exactly-once.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::db::Store;
use crate::error::{CoreError, CoreResult, ParseEnumError};
use crate::ledger::credit_completion_tx;
use crate::notify::fmt_naira;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    Held,
    Released,
}

impl FromStr for EscrowStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "held" => Ok(EscrowStatus::Held),
            "released" => Ok(EscrowStatus::Released),
            other => Err(ParseEnumError::new("escrow status", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Escrow {
    pub id: String,
    pub task_id: String,
    pub poster_id: String,
    /// Held amount in kobo; equals the task pay at creation and never
    /// changes afterwards.
    pub amount: i64,
    pub status: EscrowStatus,
    pub recipient_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

fn escrow_from_row(row: &Row<'_>) -> rusqlite::Result<Escrow> {
    let status_str: String = row.get("status")?;
    let status = status_str.parse::<EscrowStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Escrow {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        poster_id: row.get("poster_id")?,
        amount: row.get("amount")?,
        status,
        recipient_id: row.get("recipient_id")?,
        created_at: row.get("created_at")?,
        released_at: row.get("released_at")?,
    })
}

const SELECT_ESCROW: &str = r#"
    SELECT id, task_id, poster_id, amount, status, recipient_id, created_at, released_at
    FROM escrow
"#;

impl Store {
    /// Hold the task pay in escrow. The amount must match the task pay
    /// exactly; there is no partial escrow.
    pub async fn create_escrow(
        &self,
        task_id: &str,
        poster_id: &str,
        amount: i64,
    ) -> CoreResult<Escrow> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let task: Option<(String, i64)> = tx
            .query_row(
                "SELECT poster_id, pay FROM tasks WHERE id = ?1",
                params![task_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (owner, pay) = task.ok_or_else(|| CoreError::NotFound("Task".to_string()))?;

        if owner != poster_id {
            return Err(CoreError::Forbidden(
                "Only the poster can create escrow for this task".to_string(),
            ));
        }
        if amount != pay {
            return Err(CoreError::Validation(
                "Amount must match task pay".to_string(),
            ));
        }

        let escrow = Escrow {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            poster_id: poster_id.to_string(),
            amount,
            status: EscrowStatus::Held,
            recipient_id: None,
            created_at: Utc::now(),
            released_at: None,
        };

        let inserted = tx.execute(
            r#"
            INSERT INTO escrow (id, task_id, poster_id, amount, status, created_at)
            VALUES (?1, ?2, ?3, ?4, 'held', ?5)
            "#,
            params![
                escrow.id,
                escrow.task_id,
                escrow.poster_id,
                escrow.amount,
                escrow.created_at,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(CoreError::Conflict(
                    "Escrow already exists for this task".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        tx.execute(
            "UPDATE tasks SET escrow_required = 1, escrow_id = ?1 WHERE id = ?2",
            params![escrow.id, task_id],
        )?;

        Store::audit_tx(
            &tx,
            poster_id,
            "create_escrow",
            "escrow",
            &escrow.id,
            serde_json::json!({ "taskId": task_id, "amount": amount }),
        )?;

        tx.commit()?;
        Ok(escrow)
    }

    /// Release a held escrow to the recipient (defaults to the task's
    /// worker). Atomically credits the ledger and moves the task to `paid`.
    ///
    /// The `status = 'held'` condition arbitrates concurrent releases — and
    /// also refuses escrows already released by a poster `confirm` — so the
    /// credit fires at most once per escrow.
    pub async fn release_escrow(
        &self,
        escrow_id: &str,
        poster_id: &str,
        recipient_id: Option<&str>,
    ) -> CoreResult<Escrow> {
        let (escrow, task_title, outcome, recipient) = {
            let mut conn = self.conn.lock().await;
            let tx = conn.transaction()?;

            let escrow = tx
                .query_row(
                    &format!("{SELECT_ESCROW} WHERE id = ?1"),
                    params![escrow_id],
                    escrow_from_row,
                )
                .optional()?
                .ok_or_else(|| CoreError::NotFound("Escrow".to_string()))?;

            if escrow.poster_id != poster_id {
                return Err(CoreError::Forbidden(
                    "Only the poster can release this escrow".to_string(),
                ));
            }

            let (worker_id, task_title): (Option<String>, String) = tx.query_row(
                "SELECT worker_id, title FROM tasks WHERE id = ?1",
                params![escrow.task_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let recipient = recipient_id
                .map(String::from)
                .or(worker_id)
                .ok_or_else(|| {
                    CoreError::Validation("No recipient specified".to_string())
                })?;

            let now = Utc::now();
            let changed = tx.execute(
                r#"
                UPDATE escrow SET status = 'released', recipient_id = ?1, released_at = ?2
                WHERE id = ?3 AND status = 'held'
                "#,
                params![recipient, now, escrow_id],
            )?;
            if changed == 0 {
                return Err(CoreError::AlreadyProcessed(
                    "Escrow already processed".to_string(),
                ));
            }

            let outcome = credit_completion_tx(&tx, &recipient, escrow.amount)?;

            // Terminal task states stay terminal.
            tx.execute(
                r#"
                UPDATE tasks SET status = 'paid', confirmed_at = ?1
                WHERE id = ?2 AND status NOT IN ('paid', 'cancelled')
                "#,
                params![now, escrow.task_id],
            )?;

            Store::audit_tx(
                &tx,
                poster_id,
                "release_escrow",
                "escrow",
                escrow_id,
                serde_json::json!({ "recipientId": recipient, "amount": escrow.amount }),
            )?;

            tx.commit()?;
            (escrow, task_title, outcome, recipient)
        };

        let (title, message) = if outcome.newly_trusted {
            (
                "Payment Received - You're now Trusted!",
                format!(
                    "You received {} for: {} And you've earned your Trusted badge!",
                    fmt_naira(escrow.amount),
                    task_title
                ),
            )
        } else {
            (
                "Payment Received",
                format!(
                    "You received {} for: {}",
                    fmt_naira(escrow.amount),
                    task_title
                ),
            )
        };
        self.notify_best_effort(&recipient, title, &message, Some(&escrow.task_id))
            .await;

        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("{SELECT_ESCROW} WHERE id = ?1"),
            params![escrow_id],
            escrow_from_row,
        )
        .map_err(Into::into)
    }

    /// Escrows the user is party to, as poster or recipient, newest first.
    pub async fn escrows_for_user(&self, user_id: &str) -> CoreResult<Vec<Escrow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_ESCROW} WHERE poster_id = ?1 OR recipient_id = ?1 ORDER BY created_at DESC"
        ))?;
        let escrows = stmt
            .query_map(params![user_id], escrow_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(escrows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;
    use crate::task::{NewTask, ProofPayload, ProofType, TaskMode, TaskStatus};
    use crate::users::Role;
    use std::sync::Arc;

    async fn reserved_task(
        store: &Store,
        poster_id: &str,
        worker_id: &str,
        pay: i64,
    ) -> crate::task::Task {
        let task = store
            .create_task(
                poster_id,
                NewTask {
                    title: "Clear the gutter".to_string(),
                    description: String::new(),
                    pay,
                    location: "Surulere".to_string(),
                    date_time: "2026-08-09T08:00:00Z".to_string(),
                    category: "general".to_string(),
                    mode: TaskMode::Single,
                    proof_required: false,
                },
            )
            .await
            .unwrap();
        store.reserve(&task.id, worker_id).await.unwrap();
        task
    }

    fn code_proof() -> ProofPayload {
        ProofPayload {
            proof_type: ProofType::Code,
            before_image: None,
            after_image: None,
            code: Some("OK-123".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_escrow_validations() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let task = reserved_task(&store, &poster.id, &worker.id, 600_000).await;

        // Amount must match pay.
        let result = store.create_escrow(&task.id, &poster.id, 500_000).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));

        // Only the poster may create.
        let result = store.create_escrow(&task.id, &worker.id, 600_000).await;
        assert!(matches!(result, Err(CoreError::Forbidden(_))));

        let escrow = store
            .create_escrow(&task.id, &poster.id, 600_000)
            .await
            .unwrap();
        assert_eq!(escrow.status, EscrowStatus::Held);

        let task = store.task_by_id(&task.id).await.unwrap();
        assert!(task.escrow_required);
        assert_eq!(task.escrow_id.as_deref(), Some(escrow.id.as_str()));

        // One escrow per task.
        let second = store.create_escrow(&task.id, &poster.id, 600_000).await;
        assert!(matches!(second, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_release_pays_worker_and_finishes_task() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let task = reserved_task(&store, &poster.id, &worker.id, 600_000).await;
        let escrow = store
            .create_escrow(&task.id, &poster.id, 600_000)
            .await
            .unwrap();

        let released = store
            .release_escrow(&escrow.id, &poster.id, None)
            .await
            .unwrap();
        assert_eq!(released.status, EscrowStatus::Released);
        assert_eq!(released.recipient_id.as_deref(), Some(worker.id.as_str()));
        assert!(released.released_at.is_some());

        let task = store.task_by_id(&task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Paid);

        let worker = store.user_by_id(&worker.id).await.unwrap();
        assert_eq!(worker.earnings, 600_000);
        assert_eq!(worker.completed_count, 1);
    }

    #[tokio::test]
    async fn test_double_release_credits_once() {
        let (_dir, store) = testutil::store();
        let store = Arc::new(store);
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let task = reserved_task(&store, &poster.id, &worker.id, 600_000).await;
        let escrow = store
            .create_escrow(&task.id, &poster.id, 600_000)
            .await
            .unwrap();

        let (ra, rb) = tokio::join!(
            {
                let store = Arc::clone(&store);
                let (escrow_id, poster_id) = (escrow.id.clone(), poster.id.clone());
                async move { store.release_escrow(&escrow_id, &poster_id, None).await }
            },
            {
                let store = Arc::clone(&store);
                let (escrow_id, poster_id) = (escrow.id.clone(), poster.id.clone());
                async move { store.release_escrow(&escrow_id, &poster_id, None).await }
            },
        );

        let wins = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        let loser = if ra.is_ok() { rb } else { ra };
        assert!(matches!(loser, Err(CoreError::AlreadyProcessed(_))));

        // Credited exactly once.
        let worker = store.user_by_id(&worker.id).await.unwrap();
        assert_eq!(worker.earnings, 600_000);
        assert_eq!(worker.completed_count, 1);
    }

    #[tokio::test]
    async fn test_confirm_releases_escrow_so_release_cannot_double_pay() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let task = reserved_task(&store, &poster.id, &worker.id, 600_000).await;
        let escrow = store
            .create_escrow(&task.id, &poster.id, 600_000)
            .await
            .unwrap();

        store
            .submit_proof(&task.id, &worker.id, code_proof())
            .await
            .unwrap();
        store.confirm(&task.id, &poster.id).await.unwrap();

        // The escrow went with the confirmation.
        let result = store.release_escrow(&escrow.id, &poster.id, None).await;
        assert!(matches!(result, Err(CoreError::AlreadyProcessed(_))));

        let worker = store.user_by_id(&worker.id).await.unwrap();
        assert_eq!(worker.earnings, 600_000);
        assert_eq!(worker.completed_count, 1);
    }

    #[tokio::test]
    async fn test_release_without_recipient_fails() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let task = store
            .create_task(
                &poster.id,
                NewTask {
                    title: "Paint the fence".to_string(),
                    description: String::new(),
                    pay: 700_000,
                    location: "Yaba".to_string(),
                    date_time: "2026-08-10T08:00:00Z".to_string(),
                    category: "general".to_string(),
                    mode: TaskMode::Single,
                    proof_required: false,
                },
            )
            .await
            .unwrap();
        let escrow = store
            .create_escrow(&task.id, &poster.id, 700_000)
            .await
            .unwrap();

        // No worker assigned and no explicit recipient.
        let result = store.release_escrow(&escrow.id, &poster.id, None).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));

        // State unchanged: a later release with a recipient still works.
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let released = store
            .release_escrow(&escrow.id, &poster.id, Some(&worker.id))
            .await
            .unwrap();
        assert_eq!(released.status, EscrowStatus::Released);
    }
}
