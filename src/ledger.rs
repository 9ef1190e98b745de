//! Trust/earnings ledger.
//!
//! The single write path for `earnings`, `completed_count`, and the
//! `trusted` latch. Payment-bearing transitions (confirm, escrow release,
//! dispute resolution) call `credit_completion_tx` inside their own
//! transaction so the ledger update commits or rolls back together with the
//! task state change.

use rusqlite::{params, OptionalExtension, Transaction};

use crate::db::Store;
use crate::error::{CoreError, CoreResult};

/// Number of completed paid tasks after which a worker becomes trusted.
pub const TRUSTED_THRESHOLD: i64 = 3;

/// Outcome of a ledger credit.
#[derive(Debug, Clone, Copy)]
pub struct CreditOutcome {
    pub completed_count: i64,
    pub earnings: i64,
    pub trusted: bool,
    /// True when this credit flipped the trust latch.
    pub newly_trusted: bool,
}

/// Credit a completed task to `worker_id` within an open transaction.
///
/// `amount` is in kobo and must be >= 0. A zero amount is a legal no-op
/// credit (rework/cancelled resolutions advance state without paying) and
/// does not count as a completion. Any positive amount counts as exactly one
/// completion regardless of size, so a partial payout still moves the worker
/// toward trusted.
///
/// The read-modify-write runs under the transaction's write lock, so
/// concurrent credits to the same user serialize and no increment is lost.
pub fn credit_completion_tx(
    tx: &Transaction<'_>,
    worker_id: &str,
    amount: i64,
) -> CoreResult<CreditOutcome> {
    debug_assert!(amount >= 0);

    let row: Option<(i64, i64, bool)> = tx
        .query_row(
            "SELECT completed_count, earnings, trusted FROM users WHERE id = ?1",
            params![worker_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let (count, earnings, was_trusted) =
        row.ok_or_else(|| CoreError::NotFound("User".to_string()))?;

    let completed_count = if amount > 0 { count + 1 } else { count };
    let earnings = earnings + amount;
    // One-way latch: once trusted, never unset.
    let trusted = was_trusted || completed_count >= TRUSTED_THRESHOLD;

    tx.execute(
        "UPDATE users SET earnings = ?1, completed_count = ?2, trusted = ?3 WHERE id = ?4",
        params![earnings, completed_count, trusted, worker_id],
    )?;

    Ok(CreditOutcome {
        completed_count,
        earnings,
        trusted,
        newly_trusted: trusted && !was_trusted,
    })
}

impl Store {
    /// Standalone credit operation (see `credit_completion_tx`).
    pub async fn credit_completion(
        &self,
        worker_id: &str,
        amount: i64,
    ) -> CoreResult<CreditOutcome> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let outcome = credit_completion_tx(&tx, worker_id, amount)?;
        tx.commit()?;
        Ok(outcome)
    }
}
