//! Core business logic for the sanction ledger.
//!
//! [`LedgerService`] is the entry point: it issues and revokes punishments,
//! answers "is this subject punished" queries and routes warnings through the
//! [`WarningController`]. [`ExpiryService`] is driven by timers and periodic
//! sweeps to retire punishments whose time has run out.

pub mod services;

pub use services::*;
