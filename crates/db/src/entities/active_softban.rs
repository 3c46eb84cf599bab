//! Softbans currently in effect, one row per subject.
//!
//! Mirrors a subset of `punishment_history`; the one-shot expiry timers act on
//! these rows directly.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "active_softban")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub subject_id: String,

    /// Ledger record that put this row in place.
    pub record_id: String,

    /// Epoch milliseconds; `i64::MAX` never expires.
    pub end_time: i64,

    #[sea_orm(column_type = "Text")]
    pub reason: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
