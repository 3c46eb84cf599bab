//! Active warning entity (current and paused escalation steps).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sentinel for "no natural expiry" and "unbounded remaining time".
pub const NO_EXPIRY: i64 = -1;

/// One row per tracked warning step. Rows are deleted on final removal.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "active_warning")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub subject_id: String,

    /// The warn-type ledger record this step belongs to.
    #[sea_orm(unique)]
    pub punishment_record_id: String,

    pub level: i32,

    /// Epoch milliseconds.
    pub start_time: i64,

    /// Epoch milliseconds, or [`NO_EXPIRY`].
    pub end_time: i64,

    pub paused: bool,

    /// Milliseconds left when paused, or [`NO_EXPIRY`] if unbounded.
    pub remaining_on_pause: i64,

    /// JSON array of `"type:recordId"` entries.
    #[sea_orm(column_type = "Text")]
    pub associated_punishment_ids: String,
}

impl Model {
    /// Whether the step has a natural end.
    #[must_use]
    pub const fn expires(&self) -> bool {
        self.end_time != NO_EXPIRY
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::punishment_history::Entity",
        from = "Column::PunishmentRecordId",
        to = "super::punishment_history::Column::Id"
    )]
    PunishmentRecord,
}

impl Related<super::punishment_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PunishmentRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
