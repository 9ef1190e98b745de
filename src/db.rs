//! SQLite-backed store.
//!
//! One `Store` owns the connection; domain modules (`users`, `task`,
//! `escrow`, `dispute`, ...) add their operations as `impl Store` blocks.
//! Every multi-statement operation runs in a single transaction, and state
//! guards are conditional `UPDATE ... WHERE` statements whose affected-row
//! count decides success — losers of a race see zero rows changed, never a
//! partial write.

use std::path::Path;

use rusqlite::{params, Connection, Transaction};
use tokio::sync::Mutex;

use crate::error::CoreResult;

/// Shared durable store for the marketplace.
pub struct Store {
    pub(crate) conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and bootstrap the schema.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Write an audit log entry as part of an ongoing transaction.
    pub(crate) fn audit_tx(
        tx: &Transaction<'_>,
        actor_id: &str,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        details: serde_json::Value,
    ) -> rusqlite::Result<()> {
        tx.execute(
            r#"
            INSERT INTO audit_logs (actor_id, action, resource_type, resource_id, details, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                actor_id,
                action,
                resource_type,
                resource_id,
                details.to_string(),
                chrono::Utc::now(),
            ],
        )?;
        Ok(())
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            email           TEXT NOT NULL UNIQUE,
            phone           TEXT NOT NULL UNIQUE,
            role            TEXT NOT NULL,
            lga             TEXT NOT NULL DEFAULT '',
            neighbourhood   TEXT NOT NULL DEFAULT '',
            trusted         INTEGER NOT NULL DEFAULT 0,
            completed_count INTEGER NOT NULL DEFAULT 0,
            earnings        INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id              TEXT PRIMARY KEY,
            title           TEXT NOT NULL,
            description     TEXT NOT NULL DEFAULT '',
            pay             INTEGER NOT NULL,
            location        TEXT NOT NULL,
            date_time       TEXT NOT NULL,
            category        TEXT NOT NULL DEFAULT 'general',
            mode            TEXT NOT NULL,
            proof_required  INTEGER NOT NULL DEFAULT 0,
            status          TEXT NOT NULL,
            poster_id       TEXT NOT NULL REFERENCES users(id),
            worker_id       TEXT REFERENCES users(id),
            escrow_required INTEGER NOT NULL DEFAULT 0,
            escrow_id       TEXT,
            created_at      TEXT NOT NULL,
            reserved_at     TEXT,
            completed_at    TEXT,
            confirmed_at    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
        CREATE INDEX IF NOT EXISTS idx_tasks_poster ON tasks(poster_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_worker ON tasks(worker_id);

        CREATE TABLE IF NOT EXISTS applications (
            task_id    TEXT NOT NULL REFERENCES tasks(id),
            user_id    TEXT NOT NULL REFERENCES users(id),
            note       TEXT NOT NULL DEFAULT '',
            distance   REAL NOT NULL DEFAULT 0,
            applied_at TEXT NOT NULL,
            UNIQUE (task_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS proofs (
            task_id          TEXT PRIMARY KEY REFERENCES tasks(id),
            type             TEXT NOT NULL,
            before_image_url TEXT,
            after_image_url  TEXT,
            code             TEXT,
            submitted_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS escrow (
            id           TEXT PRIMARY KEY,
            task_id      TEXT NOT NULL UNIQUE REFERENCES tasks(id),
            poster_id    TEXT NOT NULL REFERENCES users(id),
            amount       INTEGER NOT NULL,
            status       TEXT NOT NULL,
            recipient_id TEXT,
            created_at   TEXT NOT NULL,
            released_at  TEXT
        );

        CREATE TABLE IF NOT EXISTS resolutions (
            id          TEXT PRIMARY KEY,
            task_id     TEXT NOT NULL REFERENCES tasks(id),
            reason      TEXT NOT NULL,
            status      TEXT NOT NULL,
            resolution  TEXT,
            resolved_by TEXT,
            created_at  TEXT NOT NULL,
            resolved_at TEXT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_resolutions_open
            ON resolutions(task_id) WHERE status = 'pending';

        CREATE TABLE IF NOT EXISTS notifications (
            id         TEXT PRIMARY KEY,
            user_id    TEXT NOT NULL REFERENCES users(id),
            title      TEXT NOT NULL,
            message    TEXT NOT NULL,
            task_id    TEXT,
            is_read    INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);

        CREATE TABLE IF NOT EXISTS audit_logs (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            actor_id      TEXT NOT NULL,
            action        TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id   TEXT NOT NULL,
            details       TEXT,
            created_at    TEXT NOT NULL
        );
        "#,
    )
}
