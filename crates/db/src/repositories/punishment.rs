//! Punishment history repository (the ledger store).

use sanction_common::{AppError, AppResult, IdGenerator};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use tracing::debug;

use crate::entities::{
    PERMANENT_END, PunishmentHistory, PunishmentType, SYSTEM_ACTOR, punishment_history, reasons,
};

/// Attempts at drawing an unused record id before giving up.
const MAX_ID_ATTEMPTS: usize = 16;

/// Punishment history repository.
///
/// Borrows its connection, which may be a pool or an open transaction.
#[derive(Clone, Copy)]
pub struct PunishmentRepository<'c, C> {
    db: &'c C,
}

impl<'c, C: ConnectionTrait> PunishmentRepository<'c, C> {
    /// Create a new punishment repository.
    #[must_use]
    pub const fn new(db: &'c C) -> Self {
        Self { db }
    }

    /// Draw a record id that is not in use yet.
    pub async fn allocate_id(&self, ids: &IdGenerator) -> AppResult<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = ids.punishment_id();
            if self.find_by_id(&candidate).await?.is_none() {
                return Ok(candidate);
            }
            debug!(record_id = %candidate, "Record id collision, drawing again");
        }
        Err(AppError::Conflict(
            "Could not allocate an unused punishment id".to_string(),
        ))
    }

    /// Insert a record.
    pub async fn create(
        &self,
        model: punishment_history::ActiveModel,
    ) -> AppResult<punishment_history::Model> {
        model
            .insert(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a record by id.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<punishment_history::Model>> {
        PunishmentHistory::find_by_id(id)
            .one(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Newest record of a type that is active and not past its end.
    pub async fn latest_active(
        &self,
        subject_id: &str,
        kind: PunishmentType,
        now_millis: i64,
    ) -> AppResult<Option<punishment_history::Model>> {
        PunishmentHistory::find()
            .filter(punishment_history::Column::SubjectId.eq(subject_id))
            .filter(punishment_history::Column::PunishmentType.eq(kind))
            .filter(punishment_history::Column::Active.eq(true))
            .filter(punishment_history::Column::EndTimestamp.gt(now_millis))
            .order_by_desc(punishment_history::Column::IssuedAt)
            .one(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Newest in-effect record issued against an address.
    pub async fn latest_active_by_address(
        &self,
        address: &str,
        kind: PunishmentType,
        now_millis: i64,
    ) -> AppResult<Option<punishment_history::Model>> {
        PunishmentHistory::find()
            .filter(punishment_history::Column::SubjectAddress.eq(address))
            .filter(punishment_history::Column::ByAddress.eq(true))
            .filter(punishment_history::Column::PunishmentType.eq(kind))
            .filter(punishment_history::Column::Active.eq(true))
            .filter(punishment_history::Column::EndTimestamp.gt(now_millis))
            .order_by_desc(punishment_history::Column::IssuedAt)
            .one(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Every record of a type still flagged active, regardless of end time.
    pub async fn find_active(
        &self,
        subject_id: &str,
        kind: PunishmentType,
    ) -> AppResult<Vec<punishment_history::Model>> {
        PunishmentHistory::find()
            .filter(punishment_history::Column::SubjectId.eq(subject_id))
            .filter(punishment_history::Column::PunishmentType.eq(kind))
            .filter(punishment_history::Column::Active.eq(true))
            .order_by_desc(punishment_history::Column::IssuedAt)
            .all(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// History of a subject, newest first.
    pub async fn find_by_subject(
        &self,
        subject_id: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<punishment_history::Model>> {
        PunishmentHistory::find()
            .filter(punishment_history::Column::SubjectId.eq(subject_id))
            .order_by_desc(punishment_history::Column::IssuedAt)
            .order_by_desc(punishment_history::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// History of a subject restricted to one type, newest first.
    pub async fn find_by_subject_and_type(
        &self,
        subject_id: &str,
        kind: PunishmentType,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<punishment_history::Model>> {
        PunishmentHistory::find()
            .filter(punishment_history::Column::SubjectId.eq(subject_id))
            .filter(punishment_history::Column::PunishmentType.eq(kind))
            .order_by_desc(punishment_history::Column::IssuedAt)
            .order_by_desc(punishment_history::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Records issued against an address, newest first.
    pub async fn find_by_address(
        &self,
        address: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<punishment_history::Model>> {
        PunishmentHistory::find()
            .filter(punishment_history::Column::SubjectAddress.eq(address))
            .order_by_desc(punishment_history::Column::IssuedAt)
            .offset(offset)
            .limit(limit)
            .all(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Number of records held against a subject.
    pub async fn count_by_subject(&self, subject_id: &str) -> AppResult<u64> {
        PunishmentHistory::find()
            .filter(punishment_history::Column::SubjectId.eq(subject_id))
            .count(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Per-type record totals for a subject. Types with no records are absent.
    pub async fn counts_by_type(&self, subject_id: &str) -> AppResult<Vec<(PunishmentType, i64)>> {
        PunishmentHistory::find()
            .select_only()
            .column(punishment_history::Column::PunishmentType)
            .column_as(Expr::col(punishment_history::Column::Id).count(), "count")
            .filter(punishment_history::Column::SubjectId.eq(subject_id))
            .group_by(punishment_history::Column::PunishmentType)
            .into_tuple::<(PunishmentType, i64)>()
            .all(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Ids of every active record of a type.
    pub async fn all_active_ids(&self, kind: PunishmentType) -> AppResult<Vec<String>> {
        PunishmentHistory::find()
            .select_only()
            .column(punishment_history::Column::Id)
            .filter(punishment_history::Column::PunishmentType.eq(kind))
            .filter(punishment_history::Column::Active.eq(true))
            .into_tuple::<String>()
            .all(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Active records of the given types whose end time has passed.
    pub async fn find_expired_active(
        &self,
        now_millis: i64,
        kinds: &[PunishmentType],
    ) -> AppResult<Vec<punishment_history::Model>> {
        PunishmentHistory::find()
            .filter(punishment_history::Column::PunishmentType.is_in(kinds.iter().copied()))
            .filter(punishment_history::Column::Active.eq(true))
            .filter(punishment_history::Column::EndTimestamp.lte(now_millis))
            .filter(punishment_history::Column::EndTimestamp.ne(PERMANENT_END))
            .order_by_asc(punishment_history::Column::EndTimestamp)
            .all(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Mark an active record removed.
    ///
    /// Returns `false` when the record was no longer active.
    pub async fn mark_removed(
        &self,
        id: &str,
        removed_by: &str,
        reason: &str,
        at: DateTimeWithTimeZone,
    ) -> AppResult<bool> {
        let result = PunishmentHistory::update_many()
            .col_expr(punishment_history::Column::Active, Expr::value(false))
            .col_expr(punishment_history::Column::RemovedBy, Expr::value(removed_by))
            .col_expr(punishment_history::Column::RemovedReason, Expr::value(reason))
            .col_expr(punishment_history::Column::RemovedAt, Expr::value(at))
            .filter(punishment_history::Column::Id.eq(id))
            .filter(punishment_history::Column::Active.eq(true))
            .exec(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }

    /// Give a record its final removal reason.
    ///
    /// Applies to active records and to records only paused, so a paused
    /// record does not keep a reason that suggests it may come back.
    pub async fn finalize_removal(
        &self,
        id: &str,
        removed_by: &str,
        reason: &str,
        at: DateTimeWithTimeZone,
    ) -> AppResult<bool> {
        let result = PunishmentHistory::update_many()
            .col_expr(punishment_history::Column::Active, Expr::value(false))
            .col_expr(punishment_history::Column::RemovedBy, Expr::value(removed_by))
            .col_expr(punishment_history::Column::RemovedReason, Expr::value(reason))
            .col_expr(punishment_history::Column::RemovedAt, Expr::value(at))
            .filter(punishment_history::Column::Id.eq(id))
            .filter(
                Condition::any()
                    .add(punishment_history::Column::Active.eq(true))
                    .add(punishment_history::Column::RemovedReason.eq(reasons::PAUSED)),
            )
            .exec(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }

    /// Bring a paused record back with a new end time.
    ///
    /// Returns `false` unless the record is inactive with the paused reason.
    pub async fn reactivate(&self, id: &str, end_timestamp: i64) -> AppResult<bool> {
        let result = PunishmentHistory::update_many()
            .col_expr(punishment_history::Column::Active, Expr::value(true))
            .col_expr(
                punishment_history::Column::EndTimestamp,
                Expr::value(end_timestamp),
            )
            .col_expr(
                punishment_history::Column::RemovedBy,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                punishment_history::Column::RemovedReason,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                punishment_history::Column::RemovedAt,
                Expr::value(Option::<DateTimeWithTimeZone>::None),
            )
            .filter(punishment_history::Column::Id.eq(id))
            .filter(punishment_history::Column::Active.eq(false))
            .filter(punishment_history::Column::RemovedReason.eq(reasons::PAUSED))
            .exec(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }

    /// Flip every expired record of the given types to inactive.
    ///
    /// Each record is flipped with its own compare-and-swap; records a
    /// concurrent writer got to first are skipped. Returns the records this
    /// call deactivated, as they were before the flip.
    pub async fn deactivate_expired(
        &self,
        now_millis: i64,
        kinds: &[PunishmentType],
        at: DateTimeWithTimeZone,
    ) -> AppResult<Vec<punishment_history::Model>> {
        let candidates = self.find_expired_active(now_millis, kinds).await?;
        let mut flipped = Vec::with_capacity(candidates.len());
        for record in candidates {
            if self
                .mark_removed(&record.id, SYSTEM_ACTOR, reasons::EXPIRED, at)
                .await?
            {
                flipped.push(record);
            }
        }
        Ok(flipped)
    }
}
