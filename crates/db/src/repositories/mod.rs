//! Database repositories.
//!
//! Each repository borrows a [`sea_orm::ConnectionTrait`] implementor, so the
//! same queries run against the pool or inside an open transaction.

mod live;
mod punishment;
mod warning;

pub use live::{LiveEntry, LiveRepository, LiveTable};
pub use punishment::PunishmentRepository;
pub use warning::WarningRepository;
