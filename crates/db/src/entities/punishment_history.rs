//! Punishment history entity (the ledger).

use std::fmt;
use std::str::FromStr;

use sea_orm::entity::prelude::*;
use sea_orm::Iterable;
use serde::{Deserialize, Serialize};

/// End timestamp meaning "never expires".
pub const PERMANENT_END: i64 = i64::MAX;

/// `removed_by` value for transitions the ledger makes on its own.
pub const SYSTEM_ACTOR: &str = "System";

/// Removal reasons written by the ledger itself.
pub mod reasons {
    /// A newer warning replaced this one (unique mode).
    pub const SUPERSEDED_BY_WARNING: &str = "Superseded by new warning";
    /// A newer punishment of the same type replaced this one.
    pub const SUPERSEDED_BY_PUNISHMENT: &str = "Superseded by new punishment";
    /// Temporarily inactive; may be reactivated.
    pub const PAUSED: &str = "Paused by new warning";
    pub const EXPIRED: &str = "Expired";
    /// The warning this punishment depended on was removed.
    pub const ASSOCIATED_WARNING_REMOVED: &str = "Associated warning removed.";
}

/// Kind of punishment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum PunishmentType {
    #[sea_orm(string_value = "ban")]
    Ban,
    #[sea_orm(string_value = "mute")]
    Mute,
    #[sea_orm(string_value = "softban")]
    Softban,
    #[sea_orm(string_value = "kick")]
    Kick,
    #[sea_orm(string_value = "warn")]
    Warn,
    #[sea_orm(string_value = "freeze")]
    Freeze,
}

impl PunishmentType {
    /// Stable lowercase name, as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ban => "ban",
            Self::Mute => "mute",
            Self::Softban => "softban",
            Self::Kick => "kick",
            Self::Warn => "warn",
            Self::Freeze => "freeze",
        }
    }

    /// Types that keep a row in the "currently in effect" table.
    #[must_use]
    pub const fn has_live_entry(self) -> bool {
        matches!(self, Self::Mute | Self::Softban)
    }

    /// Types whose expiry is flipped in bulk by the reconciliation sweep.
    #[must_use]
    pub const fn reconciled_in_bulk(self) -> bool {
        matches!(self, Self::Ban | Self::Kick | Self::Freeze)
    }

    /// Every type reconciled in bulk.
    #[must_use]
    pub fn bulk_reconciled() -> Vec<Self> {
        Self::iter().filter(|t| t.reconciled_in_bulk()).collect()
    }
}

impl fmt::Display for PunishmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PunishmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ban" => Ok(Self::Ban),
            "mute" => Ok(Self::Mute),
            "softban" => Ok(Self::Softban),
            "kick" => Ok(Self::Kick),
            "warn" => Ok(Self::Warn),
            "freeze" => Ok(Self::Freeze),
            other => Err(format!("unknown punishment type: {other}")),
        }
    }
}

/// One row per issued punishment. Never deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "punishment_history")]
pub struct Model {
    /// Six-character record id.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The punished entity.
    pub subject_id: String,

    /// Network address of the subject at issue time.
    #[sea_orm(nullable)]
    pub subject_address: Option<String>,

    pub punishment_type: PunishmentType,

    #[sea_orm(column_type = "Text")]
    pub reason: String,

    /// Name of the moderator (or "Console") who issued it.
    pub issuer_name: String,

    pub issued_at: DateTimeWithTimeZone,

    /// Whether the punishment also applies to the subject's address.
    pub by_address: bool,

    /// Absolute expiry in epoch milliseconds; [`PERMANENT_END`] never expires.
    pub end_timestamp: i64,

    /// Duration text captured at issue time, kept verbatim.
    pub duration_label: String,

    pub active: bool,

    #[sea_orm(nullable)]
    pub removed_by: Option<String>,

    #[sea_orm(nullable, column_type = "Text")]
    pub removed_reason: Option<String>,

    #[sea_orm(nullable)]
    pub removed_at: Option<DateTimeWithTimeZone>,

    /// Escalation level, 0 unless this is a warning.
    pub warn_level: i32,
}

impl Model {
    /// Whether the record never expires.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        self.end_timestamp == PERMANENT_END
    }

    /// Whether the record is active and not past its end at `now_millis`.
    #[must_use]
    pub const fn is_in_effect(&self, now_millis: i64) -> bool {
        self.active && self.end_timestamp > now_millis
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_type_round_trips_through_str() {
        for kind in PunishmentType::iter() {
            assert_eq!(kind.as_str().parse::<PunishmentType>().unwrap(), kind);
        }
        assert!("yeet".parse::<PunishmentType>().is_err());
        assert_eq!("MUTE".parse::<PunishmentType>().unwrap(), PunishmentType::Mute);
    }

    #[test]
    fn test_type_groups() {
        assert!(PunishmentType::Mute.has_live_entry());
        assert!(!PunishmentType::Ban.has_live_entry());
        assert_eq!(
            PunishmentType::bulk_reconciled(),
            vec![PunishmentType::Ban, PunishmentType::Kick, PunishmentType::Freeze]
        );
    }
}
