//! Common utilities and shared types for the sanction ledger.
//!
//! This crate provides foundational components used across all sanction crates:
//!
//! - **Configuration**: Application settings via [`Config`], including the warning
//!   escalation policy
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: Punishment record ids and ULID-based internal ids via [`IdGenerator`]
//! - **Clock**: Injectable time source via [`Clock`]
//! - **Durations**: Parsing and formatting of human-readable durations via [`DurationParser`]
//!
//! # Example
//!
//! ```no_run
//! use sanction_common::{AppResult, Config, IdGenerator};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.punishment_id();
//!     println!("Generated ID: {} ({:?})", id, config.warnings.expiration_mode);
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    Config, DatabaseConfig, ExpirationMode, SchedulerSettings, TimeUnitsConfig, WarnLevelConfig,
    WarningPolicy,
};
pub use duration::{DurationParser, Expiration};
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
