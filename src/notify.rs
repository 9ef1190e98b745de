//! Notification emission.
//!
//! The core only records what is emitted and when; delivery and display are
//! external. Notification writes are best-effort and happen after the state
//! transition that triggered them has committed — a failed write is logged
//! and never rolls the transition back.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;
use uuid::Uuid;

use crate::db::Store;
use crate::error::CoreResult;

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub task_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Format a kobo amount as naira for user-facing messages.
pub fn fmt_naira(kobo: i64) -> String {
    if kobo % 100 == 0 {
        format!("₦{}", kobo / 100)
    } else {
        format!("₦{}.{:02}", kobo / 100, kobo % 100)
    }
}

impl Store {
    async fn notify(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        task_id: Option<&str>,
    ) -> CoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO notifications (id, user_id, title, message, task_id, is_read, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
            "#,
            params![
                Uuid::new_v4().to_string(),
                user_id,
                title,
                message,
                task_id,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    /// Fire-and-forget notification write.
    pub async fn notify_best_effort(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        task_id: Option<&str>,
    ) {
        if let Err(e) = self.notify(user_id, title, message, task_id).await {
            tracing::warn!("Failed to write notification for {}: {}", user_id, e);
        }
    }

    /// Newest-first notifications for a user.
    pub async fn notifications_for_user(&self, user_id: &str) -> CoreResult<Vec<Notification>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, user_id, title, message, task_id, is_read, created_at
            FROM notifications
            WHERE user_id = ?1
            ORDER BY created_at DESC
            "#,
        )?;
        let notifications = stmt
            .query_map(params![user_id], |row| {
                Ok(Notification {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    message: row.get(3)?,
                    task_id: row.get(4)?,
                    is_read: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    /// Mark one of the user's notifications read. Returns false when the
    /// notification does not exist or belongs to someone else.
    pub async fn mark_notification_read(&self, user_id: &str, id: &str) -> CoreResult<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(changed > 0)
    }
}
