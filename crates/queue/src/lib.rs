//! Background work for the sanction ledger.
//!
//! This crate drives expiry without any external broker:
//!
//! - **Expiry queue**: One-shot timers for mute/softban rows, kept in an
//!   in-process min-heap ordered by end time
//! - **Scheduler**: Periodic sweeps (due warnings, overdue live rows, and
//!   ban/kick/freeze reconciliation)

pub mod expiry_queue;
pub mod scheduler;

pub use expiry_queue::{ExpiryQueue, ExpiryQueueHandle};
pub use scheduler::{JobExecutor, LedgerJobExecutor, ScheduledJob, SchedulerConfig, run_scheduler};
