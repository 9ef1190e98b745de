//! Task entity, lifecycle state machine, and completion proof.
//!
//! Status flow: `active → reserved → completed → {paid | disputed}`;
//! disputed tasks leave that state only through a manager resolution
//! (`crate::dispute`). `active → cancelled` is reachable directly by the
//! poster. `paid` and `cancelled` are terminal.

pub mod lifecycle;
pub mod proof;
pub mod types;

pub use lifecycle::TaskFilter;
pub use proof::{Proof, ProofPayload, ProofType};
pub use types::{Applicant, NewTask, Task, TaskMode, TaskStatus};

pub(crate) use types::{task_from_row, SELECT_TASK};
