//! Database entities.

pub mod active_mute;
pub mod active_softban;
pub mod active_warning;
pub mod punishment_history;

pub use active_mute::Entity as ActiveMute;
pub use active_softban::Entity as ActiveSoftban;
pub use active_warning::Entity as ActiveWarning;
pub use punishment_history::Entity as PunishmentHistory;
pub use punishment_history::{PERMANENT_END, PunishmentType, SYSTEM_ACTOR, reasons};
