//! Task lifecycle operations.
//!
//! Every transition re-validates its guard at write time: the authoritative
//! check is a conditional `UPDATE ... WHERE status = ...` whose affected-row
//! count decides success. Preceding reads only classify failures
//! (`NotFound` vs `Forbidden` vs `Conflict`); they never substitute for the
//! write-time guard, so concurrent callers cannot slip a stale state
//! through.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::types::{task_from_row, Applicant, NewTask, Task, TaskMode, TaskStatus, SELECT_TASK};
use crate::db::Store;
use crate::error::{CoreError, CoreResult};
use crate::ledger::credit_completion_tx;
use crate::notify::fmt_naira;

/// Maximum applicants on an applications-mode task.
pub const MAX_APPLICANTS: i64 = 3;

/// Filters for task listing.
#[derive(Debug, Default, Clone)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub worker_id: Option<String>,
    pub poster_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Store {
    /// Create a task. Status starts at `active` with no worker assigned.
    pub async fn create_task(&self, poster_id: &str, new: NewTask) -> CoreResult<Task> {
        if new.title.trim().is_empty() {
            return Err(CoreError::Validation("Title is required".to_string()));
        }
        if new.pay <= 0 {
            return Err(CoreError::Validation(
                "Pay must be greater than 0".to_string(),
            ));
        }
        if new.location.trim().is_empty() || new.date_time.trim().is_empty() {
            return Err(CoreError::Validation(
                "Location and dateTime are required".to_string(),
            ));
        }

        // Poster must exist before we hand out a task id.
        self.user_by_id(poster_id).await?;

        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: new.title.trim().to_string(),
            description: new.description,
            pay: new.pay,
            location: new.location,
            date_time: new.date_time,
            category: new.category,
            mode: new.mode,
            proof_required: new.proof_required,
            status: TaskStatus::Active,
            poster_id: poster_id.to_string(),
            worker_id: None,
            escrow_required: false,
            escrow_id: None,
            created_at: Utc::now(),
            reserved_at: None,
            completed_at: None,
            confirmed_at: None,
        };

        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO tasks (id, title, description, pay, location, date_time, category,
                               mode, proof_required, status, poster_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'active', ?10, ?11)
            "#,
            params![
                task.id,
                task.title,
                task.description,
                task.pay,
                task.location,
                task.date_time,
                task.category,
                task.mode.as_str(),
                task.proof_required,
                task.poster_id,
                task.created_at,
            ],
        )?;
        Ok(task)
    }

    pub async fn task_by_id(&self, id: &str) -> CoreResult<Task> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("{SELECT_TASK} WHERE id = ?1"),
            params![id],
            task_from_row,
        )
        .optional()?
        .ok_or_else(|| CoreError::NotFound("Task".to_string()))
    }

    pub async fn list_tasks(&self, filter: TaskFilter) -> CoreResult<Vec<Task>> {
        let limit = if filter.limit > 0 {
            filter.limit.min(200)
        } else {
            50
        };
        let conn = self.conn.lock().await;
        let mut sql = format!("{SELECT_TASK} WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(status) = filter.status {
            sql.push_str(&format!(" AND status = ?{}", args.len() + 1));
            args.push(Box::new(status.as_str().to_string()));
        }
        if let Some(worker_id) = filter.worker_id {
            sql.push_str(&format!(" AND worker_id = ?{}", args.len() + 1));
            args.push(Box::new(worker_id));
        }
        if let Some(poster_id) = filter.poster_id {
            sql.push_str(&format!(" AND poster_id = ?{}", args.len() + 1));
            args.push(Box::new(poster_id));
        }
        sql.push_str(&format!(
            " ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
            args.len() + 1,
            args.len() + 2
        ));
        args.push(Box::new(limit));
        args.push(Box::new(filter.offset.max(0)));

        let mut stmt = conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(
                rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
                task_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Reserve a single-mode task, first-writer-wins.
    ///
    /// The conditional update is the race arbiter: of two concurrent
    /// reservations only one changes a row, the other gets `Conflict` and a
    /// "no longer available" message.
    pub async fn reserve(&self, task_id: &str, user_id: &str) -> CoreResult<Task> {
        let conn = self.conn.lock().await;

        let task = conn
            .query_row(
                &format!("{SELECT_TASK} WHERE id = ?1"),
                params![task_id],
                task_from_row,
            )
            .optional()?
            .ok_or_else(|| CoreError::NotFound("Task".to_string()))?;

        if task.mode != TaskMode::Single {
            return Err(CoreError::Conflict(
                "Task does not support direct reservation".to_string(),
            ));
        }
        if task.poster_id == user_id {
            return Err(CoreError::Forbidden(
                "Cannot reserve your own task".to_string(),
            ));
        }

        let changed = conn.execute(
            r#"
            UPDATE tasks SET status = 'reserved', worker_id = ?1, reserved_at = ?2
            WHERE id = ?3 AND status = 'active'
            "#,
            params![user_id, Utc::now(), task_id],
        )?;
        if changed == 0 {
            return Err(CoreError::Conflict(
                "Task is no longer available".to_string(),
            ));
        }

        conn.query_row(
            &format!("{SELECT_TASK} WHERE id = ?1"),
            params![task_id],
            task_from_row,
        )
        .map_err(Into::into)
    }

    /// Apply to an applications-mode task. Applicants are capped at
    /// [`MAX_APPLICANTS`] and each user may apply once.
    pub async fn apply(
        &self,
        task_id: &str,
        user_id: &str,
        note: &str,
        distance: Option<f64>,
    ) -> CoreResult<()> {
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

        if task.mode != TaskMode::Applications {
            return Err(CoreError::Conflict(
                "Task does not accept applications".to_string(),
            ));
        }
        if task.poster_id == user_id {
            return Err(CoreError::Forbidden(
                "Cannot apply to your own task".to_string(),
            ));
        }
        if task.status != TaskStatus::Active {
            return Err(CoreError::Conflict(
                "Task is no longer available".to_string(),
            ));
        }

        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM applications WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )?;
        if count >= MAX_APPLICANTS {
            return Err(CoreError::Conflict(
                "Maximum applications reached".to_string(),
            ));
        }

        let inserted = tx.execute(
            r#"
            INSERT INTO applications (task_id, user_id, note, distance, applied_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![task_id, user_id, note, distance.unwrap_or(0.0), Utc::now()],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(CoreError::Conflict(
                    "Already applied to this task".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit()?;
        Ok(())
    }

    /// Poster picks one of the applicants; the task moves to `reserved`.
    pub async fn select_applicant(
        &self,
        task_id: &str,
        poster_id: &str,
        chosen_user_id: &str,
    ) -> CoreResult<Task> {
        let conn = self.conn.lock().await;

        let task = conn
            .query_row(
                &format!("{SELECT_TASK} WHERE id = ?1"),
                params![task_id],
                task_from_row,
            )
            .optional()?
            .ok_or_else(|| CoreError::NotFound("Task".to_string()))?;

        if task.poster_id != poster_id {
            return Err(CoreError::Forbidden(
                "Only the poster can select an applicant".to_string(),
            ));
        }

        let applied: i64 = conn.query_row(
            "SELECT COUNT(*) FROM applications WHERE task_id = ?1 AND user_id = ?2",
            params![task_id, chosen_user_id],
            |row| row.get(0),
        )?;
        if applied == 0 {
            return Err(CoreError::NotFound("Applicant".to_string()));
        }

        let changed = conn.execute(
            r#"
            UPDATE tasks SET status = 'reserved', worker_id = ?1, reserved_at = ?2
            WHERE id = ?3 AND status = 'active'
            "#,
            params![chosen_user_id, Utc::now(), task_id],
        )?;
        if changed == 0 {
            return Err(CoreError::Conflict(
                "Task is no longer available".to_string(),
            ));
        }

        conn.query_row(
            &format!("{SELECT_TASK} WHERE id = ?1"),
            params![task_id],
            task_from_row,
        )
        .map_err(Into::into)
    }

    /// Poster cancels an active task. Terminal.
    pub async fn cancel_task(&self, task_id: &str, poster_id: &str) -> CoreResult<()> {
        let conn = self.conn.lock().await;

        let owner: Option<String> = conn
            .query_row(
                "SELECT poster_id FROM tasks WHERE id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()?;
        match owner {
            None => return Err(CoreError::NotFound("Task".to_string())),
            Some(owner) if owner != poster_id => {
                return Err(CoreError::Forbidden(
                    "Only the poster can cancel this task".to_string(),
                ));
            }
            Some(_) => {}
        }

        let changed = conn.execute(
            "UPDATE tasks SET status = 'cancelled' WHERE id = ?1 AND status = 'active'",
            params![task_id],
        )?;
        if changed == 0 {
            return Err(CoreError::Conflict(
                "Only active tasks can be cancelled".to_string(),
            ));
        }
        Ok(())
    }

    /// Poster accepts the completed work: task → `paid`, worker credited.
    ///
    /// If a held escrow exists for the task it is released to the worker in
    /// the same transaction, so a later `release_escrow` call cannot pay a
    /// second time.
    pub async fn confirm(&self, task_id: &str, poster_id: &str) -> CoreResult<Task> {
        let (task, outcome, worker_id) = {
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

            if task.poster_id != poster_id {
                return Err(CoreError::Forbidden(
                    "Only the poster can confirm this task".to_string(),
                ));
            }
            let worker_id = task.worker_id.clone().ok_or_else(|| {
                CoreError::Conflict("Task has no assigned worker".to_string())
            })?;

            let now = Utc::now();
            let changed = tx.execute(
                r#"
                UPDATE tasks SET status = 'paid', confirmed_at = ?1
                WHERE id = ?2 AND status = 'completed'
                "#,
                params![now, task_id],
            )?;
            if changed == 0 {
                return Err(CoreError::Conflict(
                    "Task is not awaiting confirmation".to_string(),
                ));
            }

            if let Some(escrow_id) = &task.escrow_id {
                tx.execute(
                    r#"
                    UPDATE escrow SET status = 'released', recipient_id = ?1, released_at = ?2
                    WHERE id = ?3 AND status = 'held'
                    "#,
                    params![worker_id, now, escrow_id],
                )?;
            }

            let outcome = credit_completion_tx(&tx, &worker_id, task.pay)?;

            Store::audit_tx(
                &tx,
                poster_id,
                "confirm_task",
                "task",
                task_id,
                serde_json::json!({ "payAmount": task.pay }),
            )?;

            tx.commit()?;
            (task, outcome, worker_id)
        };

        let (title, message) = if outcome.newly_trusted {
            (
                "Payment Received - You're now Trusted!",
                format!(
                    "You received {} for: {} And you've earned your Trusted badge!",
                    fmt_naira(task.pay),
                    task.title
                ),
            )
        } else {
            (
                "Payment Received",
                format!("You received {} for: {}", fmt_naira(task.pay), task.title),
            )
        };
        self.notify_best_effort(&worker_id, title, &message, Some(task_id))
            .await;

        self.task_by_id(task_id).await
    }

    /// Open a dispute on a completed task. Either side of the exchange may
    /// raise one; the pending resolution lands in the manager queue.
    pub async fn dispute(&self, task_id: &str, caller_id: &str, reason: &str) -> CoreResult<()> {
        if reason.trim().is_empty() {
            return Err(CoreError::Validation(
                "A dispute reason is required".to_string(),
            ));
        }

        let (task, raised_by_worker, caller_name) = {
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

            let is_poster = task.poster_id == caller_id;
            let is_worker = task.worker_id.as_deref() == Some(caller_id);
            if !is_poster && !is_worker {
                return Err(CoreError::Forbidden(
                    "Only the poster or worker can dispute this task".to_string(),
                ));
            }

            let changed = tx.execute(
                "UPDATE tasks SET status = 'disputed' WHERE id = ?1 AND status = 'completed'",
                params![task_id],
            )?;
            if changed == 0 {
                return Err(CoreError::Conflict(
                    "Task cannot be disputed in its current state".to_string(),
                ));
            }

            let inserted = tx.execute(
                r#"
                INSERT INTO resolutions (id, task_id, reason, status, created_at)
                VALUES (?1, ?2, ?3, 'pending', ?4)
                "#,
                params![
                    Uuid::new_v4().to_string(),
                    task_id,
                    reason.trim(),
                    Utc::now()
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    return Err(CoreError::AlreadyProcessed(
                        "A dispute is already open for this task".to_string(),
                    ));
                }
                Err(e) => return Err(e.into()),
            }

            Store::audit_tx(
                &tx,
                caller_id,
                "open_dispute",
                "task",
                task_id,
                serde_json::json!({ "reason": reason.trim() }),
            )?;

            let caller_name: String = tx.query_row(
                "SELECT name FROM users WHERE id = ?1",
                params![caller_id],
                |row| row.get(0),
            )?;

            tx.commit()?;
            (task, is_worker, caller_name)
        };

        let (title, message) = if raised_by_worker {
            (
                "Payment Dispute",
                format!("{} reports not being paid for: {}", caller_name, task.title),
            )
        } else {
            ("Task Dispute", format!("Dispute raised for task: {}", task.title))
        };
        for manager in self.users_by_role(crate::users::Role::Manager).await? {
            self.notify_best_effort(&manager.id, title, &message, Some(task_id))
                .await;
        }

        Ok(())
    }

    /// Applicants on a task, newest last, with each candidate's trust
    /// profile.
    pub async fn applicants_for_task(&self, task_id: &str) -> CoreResult<Vec<Applicant>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"
            SELECT a.user_id, u.name, u.trusted, u.completed_count,
                   a.note, a.distance, a.applied_at
            FROM applications a
            JOIN users u ON a.user_id = u.id
            WHERE a.task_id = ?1
            ORDER BY a.applied_at ASC
            "#,
        )?;
        let applicants = stmt
            .query_map(params![task_id], |row| {
                Ok(Applicant {
                    user_id: row.get(0)?,
                    name: row.get(1)?,
                    trusted: row.get(2)?,
                    completed_count: row.get(3)?,
                    note: row.get(4)?,
                    distance: row.get(5)?,
                    applied_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(applicants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;
    use crate::task::{ProofPayload, ProofType};
    use crate::users::Role;
    use std::sync::Arc;

    fn new_task(pay: i64, mode: TaskMode) -> NewTask {
        NewTask {
            title: "Fix the gate".to_string(),
            description: "The compound gate hinge is loose".to_string(),
            pay,
            location: "Ikeja GRA".to_string(),
            date_time: "2026-08-08T09:00:00Z".to_string(),
            category: "repairs".to_string(),
            mode,
            proof_required: true,
        }
    }

    fn photo_proof() -> ProofPayload {
        ProofPayload {
            proof_type: ProofType::Photo,
            before_image: Some("/uploads/before.jpg".to_string()),
            after_image: Some("/uploads/after.jpg".to_string()),
            code: None,
        }
    }

    #[tokio::test]
    async fn test_create_task_validation() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;

        let mut bad = new_task(0, TaskMode::Single);
        bad.pay = 0;
        let result = store.create_task(&poster.id, bad).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));

        let mut bad = new_task(80_000, TaskMode::Single);
        bad.location = String::new();
        let result = store.create_task(&poster.id, bad).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));

        let task = store
            .create_task(&poster.id, new_task(80_000, TaskMode::Single))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Active);
        assert!(task.worker_id.is_none());
    }

    #[tokio::test]
    async fn test_reserve_single_mode() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let task = store
            .create_task(&poster.id, new_task(80_000, TaskMode::Single))
            .await
            .unwrap();

        let reserved = store.reserve(&task.id, &worker.id).await.unwrap();
        assert_eq!(reserved.status, TaskStatus::Reserved);
        assert_eq!(reserved.worker_id.as_deref(), Some(worker.id.as_str()));
        assert!(reserved.reserved_at.is_some());
    }

    #[tokio::test]
    async fn test_second_reservation_loses() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let first = testutil::user(&store, "amina", Role::Worker).await;
        let second = testutil::user(&store, "chidi", Role::Worker).await;
        let task = store
            .create_task(&poster.id, new_task(80_000, TaskMode::Single))
            .await
            .unwrap();

        store.reserve(&task.id, &first.id).await.unwrap();
        let result = store.reserve(&task.id, &second.id).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));

        // The winner's assignment is untouched.
        let task = store.task_by_id(&task.id).await.unwrap();
        assert_eq!(task.worker_id.as_deref(), Some(first.id.as_str()));
    }

    #[tokio::test]
    async fn test_concurrent_reservations_have_one_winner() {
        let (_dir, store) = testutil::store();
        let store = Arc::new(store);
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let a = testutil::user(&store, "amina", Role::Worker).await;
        let b = testutil::user(&store, "chidi", Role::Worker).await;
        let task = store
            .create_task(&poster.id, new_task(80_000, TaskMode::Single))
            .await
            .unwrap();

        let (ra, rb) = tokio::join!(
            {
                let store = Arc::clone(&store);
                let (task_id, user_id) = (task.id.clone(), a.id.clone());
                async move { store.reserve(&task_id, &user_id).await }
            },
            {
                let store = Arc::clone(&store);
                let (task_id, user_id) = (task.id.clone(), b.id.clone());
                async move { store.reserve(&task_id, &user_id).await }
            },
        );

        let wins = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        let loser = if ra.is_ok() { rb } else { ra };
        assert!(matches!(loser, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_self_reservation_forbidden() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let task = store
            .create_task(&poster.id, new_task(80_000, TaskMode::Single))
            .await
            .unwrap();

        let result = store.reserve(&task.id, &poster.id).await;
        assert!(matches!(result, Err(CoreError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_reserve_rejects_applications_mode() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let task = store
            .create_task(&poster.id, new_task(80_000, TaskMode::Applications))
            .await
            .unwrap();

        let result = store.reserve(&task.id, &worker.id).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_applicant_cap_and_duplicates() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let task = store
            .create_task(&poster.id, new_task(120_000, TaskMode::Applications))
            .await
            .unwrap();

        let w1 = testutil::user(&store, "amina", Role::Worker).await;
        let w2 = testutil::user(&store, "chidi", Role::Worker).await;
        let w3 = testutil::user(&store, "kemi", Role::Worker).await;
        let w4 = testutil::user(&store, "tunde", Role::Worker).await;

        store.apply(&task.id, &w1.id, "I live nearby", Some(1.2)).await.unwrap();
        store.apply(&task.id, &w2.id, "", None).await.unwrap();

        // Duplicate application.
        let dup = store.apply(&task.id, &w1.id, "again", None).await;
        assert!(matches!(dup, Err(CoreError::Conflict(_))));

        store.apply(&task.id, &w3.id, "", None).await.unwrap();

        // Cap reached.
        let fourth = store.apply(&task.id, &w4.id, "", None).await;
        assert!(matches!(fourth, Err(CoreError::Conflict(_))));

        let applicants = store.applicants_for_task(&task.id).await.unwrap();
        assert_eq!(applicants.len(), 3);
        let mut ids: Vec<_> = applicants.iter().map(|a| a.user_id.clone()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn test_select_applicant() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let other = testutil::user(&store, "chidi", Role::Worker).await;
        let task = store
            .create_task(&poster.id, new_task(120_000, TaskMode::Applications))
            .await
            .unwrap();
        store.apply(&task.id, &worker.id, "", None).await.unwrap();

        // Only the poster may select.
        let result = store.select_applicant(&task.id, &other.id, &worker.id).await;
        assert!(matches!(result, Err(CoreError::Forbidden(_))));

        // The chosen user must have applied.
        let result = store.select_applicant(&task.id, &poster.id, &other.id).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));

        let selected = store
            .select_applicant(&task.id, &poster.id, &worker.id)
            .await
            .unwrap();
        assert_eq!(selected.status, TaskStatus::Reserved);
        assert_eq!(selected.worker_id.as_deref(), Some(worker.id.as_str()));

        // Task left `active`; a second selection loses.
        let result = store.select_applicant(&task.id, &poster.id, &worker.id).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_proof_then_confirm_pays_worker() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let task = store
            .create_task(&poster.id, new_task(120_000, TaskMode::Single))
            .await
            .unwrap();
        store.reserve(&task.id, &worker.id).await.unwrap();

        store
            .submit_proof(&task.id, &worker.id, photo_proof())
            .await
            .unwrap();
        let task_after = store.task_by_id(&task.id).await.unwrap();
        assert_eq!(task_after.status, TaskStatus::Completed);
        assert!(task_after.completed_at.is_some());

        let paid = store.confirm(&task.id, &poster.id).await.unwrap();
        assert_eq!(paid.status, TaskStatus::Paid);

        let worker = store.user_by_id(&worker.id).await.unwrap();
        assert_eq!(worker.earnings, 120_000);
        assert_eq!(worker.completed_count, 1);

        // Worker got the payment notification.
        let notes = store.notifications_for_user(&worker.id).await.unwrap();
        assert!(notes.iter().any(|n| n.title == "Payment Received"));
    }

    #[tokio::test]
    async fn test_proof_resubmission_overwrites() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let task = store
            .create_task(&poster.id, new_task(120_000, TaskMode::Single))
            .await
            .unwrap();
        store.reserve(&task.id, &worker.id).await.unwrap();
        store
            .submit_proof(&task.id, &worker.id, photo_proof())
            .await
            .unwrap();

        // Task is now `completed`; a straight resubmission is refused...
        let again = store.submit_proof(&task.id, &worker.id, photo_proof()).await;
        assert!(matches!(again, Err(CoreError::Conflict(_))));

        // ...and there is exactly one proof row on file.
        let proof = store.proof_for_task(&task.id).await.unwrap().unwrap();
        assert_eq!(proof.proof_type, ProofType::Photo);
        assert_eq!(proof.before_image.as_deref(), Some("/uploads/before.jpg"));
    }

    #[tokio::test]
    async fn test_proof_requires_assigned_worker_and_reserved_state() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let stranger = testutil::user(&store, "chidi", Role::Worker).await;
        let task = store
            .create_task(&poster.id, new_task(120_000, TaskMode::Single))
            .await
            .unwrap();

        // Not reserved yet, and no worker assigned.
        let result = store.submit_proof(&task.id, &worker.id, photo_proof()).await;
        assert!(matches!(result, Err(CoreError::Forbidden(_))));

        store.reserve(&task.id, &worker.id).await.unwrap();
        let result = store
            .submit_proof(&task.id, &stranger.id, photo_proof())
            .await;
        assert!(matches!(result, Err(CoreError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_confirm_only_from_completed() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let task = store
            .create_task(&poster.id, new_task(120_000, TaskMode::Single))
            .await
            .unwrap();
        store.reserve(&task.id, &worker.id).await.unwrap();

        let result = store.confirm(&task.id, &poster.id).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_double_confirm_credits_once() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let task = store
            .create_task(&poster.id, new_task(120_000, TaskMode::Single))
            .await
            .unwrap();
        store.reserve(&task.id, &worker.id).await.unwrap();
        store
            .submit_proof(&task.id, &worker.id, photo_proof())
            .await
            .unwrap();

        store.confirm(&task.id, &poster.id).await.unwrap();
        let result = store.confirm(&task.id, &poster.id).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));

        let worker = store.user_by_id(&worker.id).await.unwrap();
        assert_eq!(worker.earnings, 120_000);
        assert_eq!(worker.completed_count, 1);
    }

    #[tokio::test]
    async fn test_dispute_routes_to_managers() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let manager = testutil::user(&store, "sani", Role::Manager).await;
        let task = store
            .create_task(&poster.id, new_task(100_000, TaskMode::Single))
            .await
            .unwrap();
        store.reserve(&task.id, &worker.id).await.unwrap();
        store
            .submit_proof(&task.id, &worker.id, photo_proof())
            .await
            .unwrap();

        store
            .dispute(&task.id, &poster.id, "poor quality")
            .await
            .unwrap();

        let task = store.task_by_id(&task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Disputed);

        let notes = store.notifications_for_user(&manager.id).await.unwrap();
        assert!(notes.iter().any(|n| n.title == "Task Dispute"));

        // No second dispute while one is pending.
        let again = store.dispute(&task.id, &worker.id, "still unpaid").await;
        assert!(matches!(again, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_dispute_requires_participant() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let stranger = testutil::user(&store, "chidi", Role::Worker).await;
        let task = store
            .create_task(&poster.id, new_task(100_000, TaskMode::Single))
            .await
            .unwrap();
        store.reserve(&task.id, &worker.id).await.unwrap();
        store
            .submit_proof(&task.id, &worker.id, photo_proof())
            .await
            .unwrap();

        let result = store.dispute(&task.id, &stranger.id, "not my business").await;
        assert!(matches!(result, Err(CoreError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_cancel_active_task() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let task = store
            .create_task(&poster.id, new_task(80_000, TaskMode::Single))
            .await
            .unwrap();

        store.cancel_task(&task.id, &poster.id).await.unwrap();
        let task_after = store.task_by_id(&task.id).await.unwrap();
        assert_eq!(task_after.status, TaskStatus::Cancelled);

        // Terminal: nobody can reserve a cancelled task.
        let result = store.reserve(&task.id, &worker.id).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_list_tasks_filters() {
        let (_dir, store) = testutil::store();
        let poster = testutil::user(&store, "bayo", Role::Poster).await;
        let worker = testutil::user(&store, "amina", Role::Worker).await;
        let t1 = store
            .create_task(&poster.id, new_task(80_000, TaskMode::Single))
            .await
            .unwrap();
        store
            .create_task(&poster.id, new_task(90_000, TaskMode::Single))
            .await
            .unwrap();
        store.reserve(&t1.id, &worker.id).await.unwrap();

        let active = store
            .list_tasks(TaskFilter {
                status: Some(TaskStatus::Active),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(active.len(), 1);

        let mine = store
            .list_tasks(TaskFilter {
                worker_id: Some(worker.id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, t1.id);
    }
}
