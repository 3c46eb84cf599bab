//! Repository for the "currently in effect" tables (mutes and softbans).

use sanction_common::{AppError, AppResult};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};

use crate::entities::{PERMANENT_END, PunishmentType};

/// Which live table a row lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveTable {
    Mute,
    Softban,
}

impl LiveTable {
    /// Both live tables.
    pub const ALL: [Self; 2] = [Self::Mute, Self::Softban];

    /// The live table backing a punishment type, if it has one.
    #[must_use]
    pub const fn for_type(kind: PunishmentType) -> Option<Self> {
        match kind {
            PunishmentType::Mute => Some(Self::Mute),
            PunishmentType::Softban => Some(Self::Softban),
            _ => None,
        }
    }

    /// The punishment type whose rows this table holds.
    #[must_use]
    pub const fn punishment_type(self) -> PunishmentType {
        match self {
            Self::Mute => PunishmentType::Mute,
            Self::Softban => PunishmentType::Softban,
        }
    }
}

/// A row of either live table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveEntry {
    pub table: LiveTable,
    pub subject_id: String,
    pub record_id: String,
    /// Epoch milliseconds; `i64::MAX` never expires.
    pub end_time: i64,
    pub reason: String,
}

impl LiveEntry {
    /// Whether the row has a finite end.
    #[must_use]
    pub const fn expires(&self) -> bool {
        self.end_time != PERMANENT_END
    }
}

/// Both tables share a shape; run `$body` against the one `$table` selects.
macro_rules! with_live_table {
    ($table:expr, $entity:ident, $module:ident => $body:expr) => {
        match $table {
            LiveTable::Mute => {
                use crate::entities::{ActiveMute as $entity, active_mute as $module};
                $body
            }
            LiveTable::Softban => {
                use crate::entities::{ActiveSoftban as $entity, active_softban as $module};
                $body
            }
        }
    };
}

/// Live table repository.
#[derive(Clone, Copy)]
pub struct LiveRepository<'c, C> {
    db: &'c C,
}

impl<'c, C: ConnectionTrait> LiveRepository<'c, C> {
    /// Create a new live table repository.
    #[must_use]
    pub const fn new(db: &'c C) -> Self {
        Self { db }
    }

    /// Insert or replace the subject's row.
    pub async fn upsert(
        &self,
        table: LiveTable,
        subject_id: &str,
        record_id: &str,
        end_time: i64,
        reason: &str,
    ) -> AppResult<()> {
        with_live_table!(table, Entity, model => {
            let row = model::ActiveModel {
                subject_id: Set(subject_id.to_string()),
                record_id: Set(record_id.to_string()),
                end_time: Set(end_time),
                reason: Set(reason.to_string()),
            };
            Entity::insert(row)
                .on_conflict(
                    OnConflict::column(model::Column::SubjectId)
                        .update_columns([
                            model::Column::RecordId,
                            model::Column::EndTime,
                            model::Column::Reason,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(self.db)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        });
        Ok(())
    }

    /// Find the subject's row.
    pub async fn find(&self, table: LiveTable, subject_id: &str) -> AppResult<Option<LiveEntry>> {
        with_live_table!(table, Entity, model => {
            let row = Entity::find_by_id(subject_id)
                .one(self.db)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            Ok(row.map(|m| LiveEntry {
                table,
                subject_id: m.subject_id,
                record_id: m.record_id,
                end_time: m.end_time,
                reason: m.reason,
            }))
        })
    }

    /// Delete the subject's row unconditionally.
    pub async fn delete(&self, table: LiveTable, subject_id: &str) -> AppResult<bool> {
        let affected = with_live_table!(table, Entity, model => {
            Entity::delete_many()
                .filter(model::Column::SubjectId.eq(subject_id))
                .exec(self.db)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?
                .rows_affected
        });
        Ok(affected == 1)
    }

    /// Delete the subject's row only if it still belongs to `record_id`.
    pub async fn delete_if_record(
        &self,
        table: LiveTable,
        subject_id: &str,
        record_id: &str,
    ) -> AppResult<bool> {
        let affected = with_live_table!(table, Entity, model => {
            Entity::delete_many()
                .filter(model::Column::SubjectId.eq(subject_id))
                .filter(model::Column::RecordId.eq(record_id))
                .exec(self.db)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?
                .rows_affected
        });
        Ok(affected == 1)
    }

    /// Delete the subject's row only if its end time is still `expected_end`.
    ///
    /// Used by expiry timers: a row replaced since the timer was armed has a
    /// different end time and survives.
    pub async fn delete_if_end(
        &self,
        table: LiveTable,
        subject_id: &str,
        expected_end: i64,
    ) -> AppResult<bool> {
        let affected = with_live_table!(table, Entity, model => {
            Entity::delete_many()
                .filter(model::Column::SubjectId.eq(subject_id))
                .filter(model::Column::EndTime.eq(expected_end))
                .exec(self.db)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?
                .rows_affected
        });
        Ok(affected == 1)
    }

    /// Rows whose end time has passed.
    pub async fn find_expired(&self, table: LiveTable, now_millis: i64) -> AppResult<Vec<LiveEntry>> {
        with_live_table!(table, Entity, model => {
            let rows = Entity::find()
                .filter(model::Column::EndTime.lte(now_millis))
                .filter(model::Column::EndTime.ne(PERMANENT_END))
                .order_by_asc(model::Column::EndTime)
                .all(self.db)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            Ok(rows
                .into_iter()
                .map(|m| LiveEntry {
                    table,
                    subject_id: m.subject_id,
                    record_id: m.record_id,
                    end_time: m.end_time,
                    reason: m.reason,
                })
                .collect())
        })
    }

    /// Every row of a table.
    pub async fn all(&self, table: LiveTable) -> AppResult<Vec<LiveEntry>> {
        with_live_table!(table, Entity, model => {
            let rows = Entity::find()
                .order_by_asc(model::Column::EndTime)
                .all(self.db)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            Ok(rows
                .into_iter()
                .map(|m| LiveEntry {
                    table,
                    subject_id: m.subject_id,
                    record_id: m.record_id,
                    end_time: m.end_time,
                    reason: m.reason,
                })
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_for_type() {
        assert_eq!(LiveTable::for_type(PunishmentType::Mute), Some(LiveTable::Mute));
        assert_eq!(
            LiveTable::for_type(PunishmentType::Softban),
            Some(LiveTable::Softban)
        );
        assert_eq!(LiveTable::for_type(PunishmentType::Ban), None);
        assert_eq!(LiveTable::Softban.punishment_type(), PunishmentType::Softban);
    }
}
