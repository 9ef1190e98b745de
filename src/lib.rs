//! # JobBridge
//!
//! A local micro-task marketplace service.
//!
//! This library provides:
//! - An HTTP API for posting, reserving, and completing short tasks
//! - A simulated escrow with an explicit release protocol
//! - Manager-side dispute resolution and an overdue-confirmation queue
//!
//! ## Task Flow
//!
//! ```text
//!   active ──reserve/select──▶ reserved ──proof──▶ completed
//!                                                     │
//!                              ┌──confirm────────────┤
//!                              ▼                      ▼
//!                            paid ◀──resolve──── disputed ──resolve──▶ active / cancelled
//! ```
//!
//! 1. A poster creates a task (`single` reservation or up to three
//!    `applications`)
//! 2. A worker reserves it, or applies and gets picked
//! 3. The worker submits completion proof (photo pair or code)
//! 4. The poster confirms (worker is paid) or disputes; silence past the
//!    SLA surfaces the task to managers
//! 5. Payouts credit the worker's ledger; three completed paid tasks flip
//!    the one-way `trusted` latch
//!
//! ## Modules
//! - `task`: task entity, lifecycle state machine, completion proof
//! - `ledger`: the single write path for earnings and the trust latch
//! - `escrow`: held payments for high-value tasks
//! - `dispute`: manager resolutions (paid / partial / rework / cancelled)
//! - `scanner`: overdue-confirmation queue
//! - `api`: axum HTTP surface

pub mod api;
pub mod config;
pub mod db;
pub mod dispute;
pub mod error;
pub mod escrow;
pub mod ledger;
pub mod notify;
pub mod scanner;
pub mod task;
pub mod users;

pub use config::Config;
pub use db::Store;
pub use error::{CoreError, CoreResult};
