//! Overdue confirmation scanner.
//!
//! Tasks that sit in `completed` past the confirmation SLA are surfaced to
//! the manager queue. The scan is read-only — it never transitions a task;
//! managers act on what it reports.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::error::CoreResult;
use crate::task::{task_from_row, Task, SELECT_TASK};

/// A completed task awaiting confirmation past the SLA.
#[derive(Debug, Clone, Serialize)]
pub struct OverdueTask {
    pub task: Task,
    pub hours_overdue: i64,
    pub poster_name: String,
    pub worker_name: Option<String>,
}

impl Store {
    /// Completed tasks whose confirmation window has lapsed, oldest first.
    pub async fn overdue_tasks(&self, sla_hours: i64) -> CoreResult<Vec<OverdueTask>> {
        self.overdue_tasks_at(Utc::now(), sla_hours).await
    }

    pub(crate) async fn overdue_tasks_at(
        &self,
        now: DateTime<Utc>,
        sla_hours: i64,
    ) -> CoreResult<Vec<OverdueTask>> {
        let cutoff = now - chrono::Duration::hours(sla_hours);
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            r#"
            {SELECT_TASK}
            WHERE status = 'completed' AND completed_at < ?1
            ORDER BY completed_at ASC
            "#
        ))?;
        let tasks = stmt
            .query_map(params![cutoff], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut overdue = Vec::with_capacity(tasks.len());
        for task in tasks {
            let hours_overdue = task
                .completed_at
                .map(|done| (now - done).num_hours())
                .unwrap_or(0);
            let poster_name: String = conn.query_row(
                "SELECT name FROM users WHERE id = ?1",
                params![task.poster_id],
                |row| row.get(0),
            )?;
            let worker_name: Option<String> = match &task.worker_id {
                Some(worker_id) => Some(conn.query_row(
                    "SELECT name FROM users WHERE id = ?1",
                    params![worker_id],
                    |row| row.get(0),
                )?),
                None => None,
            };
            overdue.push(OverdueTask {
                task,
                hours_overdue,
                poster_name,
                worker_name,
            });
        }
        Ok(overdue)
    }
}

/// Periodic background scan. Logs the queue depth so operators see stuck
/// confirmations without polling the endpoint.
pub async fn run(store: Arc<Store>, config: Config) {
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(config.scanner_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        match store.overdue_tasks(config.confirm_sla_hours).await {
            Ok(overdue) if overdue.is_empty() => {
                tracing::debug!("Overdue scan: no tasks past confirmation SLA");
            }
            Ok(overdue) => {
                tracing::info!(
                    "Overdue scan: {} task(s) past the {}h confirmation SLA",
                    overdue.len(),
                    config.confirm_sla_hours
                );
            }
            Err(e) => {
                tracing::warn!("Overdue scan failed: {}", e);
            }
        }
    }
}
