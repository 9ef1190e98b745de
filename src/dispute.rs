//! Dispute resolution.
//!
//! A disputed task leaves that state only through a manager's resolution.
//! The resolution payload is a closed set of variants and all payout math
//! goes through [`ResolutionKind::payout`], so the exactly-one-credit and
//! default-half-pay rules hold at every call site.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::db::Store;
use crate::error::{CoreError, CoreResult, ParseEnumError};
use crate::ledger::credit_completion_tx;
use crate::notify::fmt_naira;
use crate::task::{task_from_row, Task, TaskStatus, SELECT_TASK};
use crate::users::User;

/// Manager's disposition of a disputed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionKind {
    /// Worker is paid in full.
    Paid,
    /// Worker is paid a reduced amount (default: half the task pay).
    Partial,
    /// Task returns to `active` for another attempt; no payment.
    Rework,
    /// Task is cancelled; no payment.
    Cancelled,
}

impl ResolutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionKind::Paid => "paid",
            ResolutionKind::Partial => "partial",
            ResolutionKind::Rework => "rework",
            ResolutionKind::Cancelled => "cancelled",
        }
    }

    /// The payout in kobo for this resolution. `Partial` defaults to half
    /// the task pay, floored to the smallest unit; an explicit override
    /// wins.
    pub fn payout(&self, task_pay: i64, override_amount: Option<i64>) -> i64 {
        match self {
            ResolutionKind::Paid => task_pay,
            ResolutionKind::Partial => override_amount.unwrap_or(task_pay / 2),
            ResolutionKind::Rework | ResolutionKind::Cancelled => 0,
        }
    }

    /// Task status after the resolution takes effect.
    pub fn next_status(&self) -> TaskStatus {
        match self {
            ResolutionKind::Paid | ResolutionKind::Partial => TaskStatus::Paid,
            ResolutionKind::Rework => TaskStatus::Active,
            ResolutionKind::Cancelled => TaskStatus::Cancelled,
        }
    }
}

impl FromStr for ResolutionKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid" => Ok(ResolutionKind::Paid),
            "partial" => Ok(ResolutionKind::Partial),
            "rework" => Ok(ResolutionKind::Rework),
            "cancelled" => Ok(ResolutionKind::Cancelled),
            other => Err(ParseEnumError::new("resolution", other)),
        }
    }
}

/// A disputed task in the manager queue.
#[derive(Debug, Clone, Serialize)]
pub struct DisputeCase {
    pub task: Task,
    pub reason: String,
    pub disputed_at: DateTime<Utc>,
    pub poster_name: String,
    pub worker_name: Option<String>,
}

/// Outcome summary returned to the resolving manager.
#[derive(Debug, Clone, Serialize)]
pub struct ResolveOutcome {
    pub resolution: ResolutionKind,
    /// Amount actually credited to the worker, in kobo.
    pub pay_amount: i64,
    pub task_status: TaskStatus,
}

/// Manager dashboard counters.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub active_disputes: i64,
    pub overdue_confirmations: i64,
    pub resolved_today: i64,
}

impl Store {
    /// Pending disputes, oldest first.
    pub async fn pending_disputes(&self) -> CoreResult<Vec<DisputeCase>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"
            SELECT task_id, reason, created_at FROM resolutions
            WHERE status = 'pending'
            ORDER BY created_at ASC
            "#,
        )?;
        let pending = stmt
            .query_map(params![], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, DateTime<Utc>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut cases = Vec::with_capacity(pending.len());
        for (task_id, reason, disputed_at) in pending {
            let task = conn
                .query_row(
                    &format!("{SELECT_TASK} WHERE id = ?1 AND status = 'disputed'"),
                    params![task_id],
                    task_from_row,
                )
                .optional()?;
            let Some(task) = task else { continue };

            let poster_name: String = conn.query_row(
                "SELECT name FROM users WHERE id = ?1",
                params![task.poster_id],
                |row| row.get(0),
            )?;
            let worker_name: Option<String> = match &task.worker_id {
                Some(worker_id) => conn
                    .query_row(
                        "SELECT name FROM users WHERE id = ?1",
                        params![worker_id],
                        |row| row.get(0),
                    )
                    .optional()?,
                None => None,
            };
            cases.push(DisputeCase {
                task,
                reason,
                disputed_at,
                poster_name,
                worker_name,
            });
        }
        Ok(cases)
    }

    /// Resolve the pending dispute on a task.
    ///
    /// The `status = 'pending'` guard on the resolution record arbitrates
    /// concurrent resolves: exactly one caller flips it, the rest get
    /// `AlreadyProcessed`. Ledger credit, task transition, resolution
    /// update, and audit entry commit together.
    pub async fn resolve_dispute(
        &self,
        task_id: &str,
        manager: &User,
        kind: ResolutionKind,
        pay_override: Option<i64>,
    ) -> CoreResult<ResolveOutcome> {
        if !manager.role.is_manager() {
            return Err(CoreError::Forbidden("Manager access required".to_string()));
        }
        if let Some(amount) = pay_override {
            if amount <= 0 {
                return Err(CoreError::Validation(
                    "Override amount must be positive".to_string(),
                ));
            }
        }

        let (task, payout, outcome) = {
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

            if task.status != TaskStatus::Disputed {
                return Err(CoreError::Conflict("Task is not disputed".to_string()));
            }
            if let Some(amount) = pay_override {
                if amount > task.pay {
                    return Err(CoreError::Validation(
                        "Override amount cannot exceed task pay".to_string(),
                    ));
                }
            }

            let now = Utc::now();
            let claimed = tx.execute(
                r#"
                UPDATE resolutions
                SET status = 'resolved', resolution = ?1, resolved_by = ?2, resolved_at = ?3
                WHERE task_id = ?4 AND status = 'pending'
                "#,
                params![kind.as_str(), manager.id, now, task_id],
            )?;
            if claimed == 0 {
                return Err(CoreError::AlreadyProcessed(
                    "Dispute already resolved".to_string(),
                ));
            }

            let next = kind.next_status();
            match next {
                TaskStatus::Paid => {
                    tx.execute(
                        r#"
                        UPDATE tasks SET status = 'paid', confirmed_at = ?1
                        WHERE id = ?2 AND status = 'disputed'
                        "#,
                        params![now, task_id],
                    )?;
                }
                // Rework keeps worker and applicants so the exchange can
                // pick up where it left off.
                _ => {
                    tx.execute(
                        "UPDATE tasks SET status = ?1 WHERE id = ?2 AND status = 'disputed'",
                        params![next.as_str(), task_id],
                    )?;
                }
            }

            let payout = kind.payout(task.pay, pay_override);
            let outcome = match (&task.worker_id, payout) {
                (Some(worker_id), _) => Some(credit_completion_tx(&tx, worker_id, payout)?),
                (None, 0) => None,
                (None, _) => {
                    return Err(CoreError::Conflict(
                        "Task has no worker to pay".to_string(),
                    ));
                }
            };

            Store::audit_tx(
                &tx,
                &manager.id,
                "resolve_dispute",
                "task",
                task_id,
                serde_json::json!({ "resolution": kind.as_str(), "payAmount": payout }),
            )?;

            tx.commit()?;
            (task, payout, outcome)
        };

        self.notify_best_effort(
            &task.poster_id,
            "Dispute Resolved",
            &format!(
                "Dispute for \"{}\" was resolved: {}",
                task.title,
                kind.as_str()
            ),
            Some(task_id),
        )
        .await;

        if payout > 0 {
            if let (Some(worker_id), Some(outcome)) = (&task.worker_id, outcome) {
                let (title, message) = if outcome.newly_trusted {
                    (
                        "Payment Received - You're now Trusted!",
                        format!(
                            "You received {} for: {} And you've earned your Trusted badge!",
                            fmt_naira(payout),
                            task.title
                        ),
                    )
                } else {
                    (
                        "Payment Received",
                        format!("You received {} for: {}", fmt_naira(payout), task.title),
                    )
                };
                self.notify_best_effort(worker_id, title, &message, Some(task_id))
                    .await;
            }
        }

        Ok(ResolveOutcome {
            resolution: kind,
            pay_amount: payout,
            task_status: kind.next_status(),
        })
    }

    /// Counters for the manager dashboard.
    pub async fn manager_stats(&self, sla_hours: i64) -> CoreResult<ManagerStats> {
        let overdue_cutoff = Utc::now() - chrono::Duration::hours(sla_hours);
        let resolved_cutoff = Utc::now() - chrono::Duration::hours(24);
        let conn = self.conn.lock().await;
        let stats = conn.query_row(
            r#"
            SELECT
                COUNT(CASE WHEN status = 'disputed' THEN 1 END),
                COUNT(CASE WHEN status = 'completed' AND completed_at < ?1 THEN 1 END),
                COUNT(CASE WHEN status = 'paid' AND confirmed_at > ?2 THEN 1 END)
            FROM tasks
            "#,
            params![overdue_cutoff, resolved_cutoff],
            |row| {
                Ok(ManagerStats {
                    active_disputes: row.get(0)?,
                    overdue_confirmations: row.get(1)?,
                    resolved_today: row.get(2)?,
                })
            },
        )?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;
    use crate::task::{NewTask, ProofPayload, ProofType, TaskMode};
    use crate::users::Role;

    async fn disputed_task(store: &Store, pay: i64) -> (crate::task::Task, User, User) {
        let poster = testutil::user(store, "bayo", Role::Poster).await;
        let worker = testutil::user(store, "amina", Role::Worker).await;
        let task = store
            .create_task(
                &poster.id,
                NewTask {
                    title: "Wash the car".to_string(),
                    description: String::new(),
                    pay,
                    location: "Lekki".to_string(),
                    date_time: "2026-08-09T10:00:00Z".to_string(),
                    category: "general".to_string(),
                    mode: TaskMode::Single,
                    proof_required: false,
                },
            )
            .await
            .unwrap();
        store.reserve(&task.id, &worker.id).await.unwrap();
        store
            .submit_proof(
                &task.id,
                &worker.id,
                ProofPayload {
                    proof_type: ProofType::Code,
                    before_image: None,
                    after_image: None,
                    code: Some("DONE".to_string()),
                },
            )
            .await
            .unwrap();
        store
            .dispute(&task.id, &poster.id, "poor quality")
            .await
            .unwrap();
        (store.task_by_id(&task.id).await.unwrap(), poster, worker)
    }

    #[tokio::test]
    async fn test_resolve_requires_manager_role() {
        let (_dir, store) = testutil::store();
        let (task, poster, _worker) = disputed_task(&store, 100_000).await;

        let result = store
            .resolve_dispute(&task.id, &poster, ResolutionKind::Paid, None)
            .await;
        assert!(matches!(result, Err(CoreError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_resolve_paid_credits_full_amount() {
        let (_dir, store) = testutil::store();
        let (task, _poster, worker) = disputed_task(&store, 100_000).await;
        let manager = testutil::user(&store, "sani", Role::Manager).await;

        let outcome = store
            .resolve_dispute(&task.id, &manager, ResolutionKind::Paid, None)
            .await
            .unwrap();
        assert_eq!(outcome.pay_amount, 100_000);
        assert_eq!(outcome.task_status, TaskStatus::Paid);

        let worker = store.user_by_id(&worker.id).await.unwrap();
        assert_eq!(worker.earnings, 100_000);
        assert_eq!(worker.completed_count, 1);
    }

    #[tokio::test]
    async fn test_partial_defaults_to_half_pay() {
        let (_dir, store) = testutil::store();
        let (task, _poster, worker) = disputed_task(&store, 100_000).await;
        let manager = testutil::user(&store, "sani", Role::Manager).await;

        let outcome = store
            .resolve_dispute(&task.id, &manager, ResolutionKind::Partial, None)
            .await
            .unwrap();
        assert_eq!(outcome.pay_amount, 50_000);
        assert_eq!(outcome.task_status, TaskStatus::Paid);

        // Partial pay still counts as one full completion.
        let worker = store.user_by_id(&worker.id).await.unwrap();
        assert_eq!(worker.earnings, 50_000);
        assert_eq!(worker.completed_count, 1);
    }

    #[tokio::test]
    async fn test_partial_override_and_odd_amount_floor() {
        let (_dir, store) = testutil::store();
        let (task, _poster, worker) = disputed_task(&store, 100_001).await;
        let manager = testutil::user(&store, "sani", Role::Manager).await;

        // No override: floor(100_001 / 2) = 50_000 kobo.
        let outcome = store
            .resolve_dispute(&task.id, &manager, ResolutionKind::Partial, None)
            .await
            .unwrap();
        assert_eq!(outcome.pay_amount, 50_000);
        let _ = worker;
    }

    #[tokio::test]
    async fn test_partial_explicit_override() {
        let (_dir, store) = testutil::store();
        let (task, _poster, worker) = disputed_task(&store, 100_000).await;
        let manager = testutil::user(&store, "sani", Role::Manager).await;

        let outcome = store
            .resolve_dispute(&task.id, &manager, ResolutionKind::Partial, Some(75_000))
            .await
            .unwrap();
        assert_eq!(outcome.pay_amount, 75_000);

        let worker = store.user_by_id(&worker.id).await.unwrap();
        assert_eq!(worker.earnings, 75_000);
    }

    #[tokio::test]
    async fn test_rework_reopens_without_credit() {
        let (_dir, store) = testutil::store();
        let (task, _poster, worker) = disputed_task(&store, 100_000).await;
        let manager = testutil::user(&store, "sani", Role::Manager).await;

        let outcome = store
            .resolve_dispute(&task.id, &manager, ResolutionKind::Rework, None)
            .await
            .unwrap();
        assert_eq!(outcome.pay_amount, 0);
        assert_eq!(outcome.task_status, TaskStatus::Active);

        let task = store.task_by_id(&task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Active);
        // Worker assignment survives the rework round-trip.
        assert_eq!(task.worker_id.as_deref(), Some(worker.id.as_str()));

        let worker = store.user_by_id(&worker.id).await.unwrap();
        assert_eq!(worker.earnings, 0);
        assert_eq!(worker.completed_count, 0);
    }

    #[tokio::test]
    async fn test_cancelled_resolution_is_terminal() {
        let (_dir, store) = testutil::store();
        let (task, _poster, worker) = disputed_task(&store, 100_000).await;
        let manager = testutil::user(&store, "sani", Role::Manager).await;

        store
            .resolve_dispute(&task.id, &manager, ResolutionKind::Cancelled, None)
            .await
            .unwrap();

        let task = store.task_by_id(&task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);

        let worker = store.user_by_id(&worker.id).await.unwrap();
        assert_eq!(worker.earnings, 0);
    }

    #[tokio::test]
    async fn test_double_resolve_rejected() {
        let (_dir, store) = testutil::store();
        let (task, _poster, worker) = disputed_task(&store, 100_000).await;
        let manager = testutil::user(&store, "sani", Role::Manager).await;

        store
            .resolve_dispute(&task.id, &manager, ResolutionKind::Paid, None)
            .await
            .unwrap();
        let second = store
            .resolve_dispute(&task.id, &manager, ResolutionKind::Partial, None)
            .await;
        assert!(matches!(second, Err(CoreError::Conflict(_))));

        let worker = store.user_by_id(&worker.id).await.unwrap();
        assert_eq!(worker.earnings, 100_000);
        assert_eq!(worker.completed_count, 1);
    }

    #[tokio::test]
    async fn test_trust_latch_flips_through_resolution() {
        let (_dir, store) = testutil::store();
        let (task, _poster, worker) = disputed_task(&store, 100_000).await;
        let manager = testutil::user(&store, "sani", Role::Manager).await;

        // Two prior completions; the resolution should be the third.
        store.credit_completion(&worker.id, 10_000).await.unwrap();
        store.credit_completion(&worker.id, 10_000).await.unwrap();
        let before = store.user_by_id(&worker.id).await.unwrap();
        assert!(!before.trusted);

        store
            .resolve_dispute(&task.id, &manager, ResolutionKind::Paid, None)
            .await
            .unwrap();

        let after = store.user_by_id(&worker.id).await.unwrap();
        assert_eq!(after.completed_count, 3);
        assert!(after.trusted);
    }

    #[tokio::test]
    async fn test_disputes_queue_lists_pending() {
        let (_dir, store) = testutil::store();
        let (task, _poster, _worker) = disputed_task(&store, 100_000).await;

        let queue = store.pending_disputes().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].task.id, task.id);
        assert_eq!(queue[0].reason, "poor quality");
        assert_eq!(queue[0].poster_name, "bayo");
        assert_eq!(queue[0].worker_name.as_deref(), Some("amina"));

        let manager = testutil::user(&store, "sani", Role::Manager).await;
        store
            .resolve_dispute(&task.id, &manager, ResolutionKind::Paid, None)
            .await
            .unwrap();
        assert!(store.pending_disputes().await.unwrap().is_empty());
    }
}
