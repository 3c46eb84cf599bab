//! Active warning repository.

use sanction_common::{AppError, AppResult};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
};

use crate::entities::{ActiveWarning, active_warning, active_warning::NO_EXPIRY};

/// Repository for active and paused warning steps.
#[derive(Clone, Copy)]
pub struct WarningRepository<'c, C> {
    db: &'c C,
}

impl<'c, C: ConnectionTrait> WarningRepository<'c, C> {
    /// Create a new warning repository.
    #[must_use]
    pub const fn new(db: &'c C) -> Self {
        Self { db }
    }

    /// Insert a warning step.
    pub async fn create(
        &self,
        model: active_warning::ActiveModel,
    ) -> AppResult<active_warning::Model> {
        model
            .insert(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the step belonging to a ledger record.
    pub async fn find_by_record_id(
        &self,
        record_id: &str,
    ) -> AppResult<Option<active_warning::Model>> {
        ActiveWarning::find()
            .filter(active_warning::Column::PunishmentRecordId.eq(record_id))
            .one(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The subject's current (non-paused) step, newest first if several exist.
    pub async fn find_active(&self, subject_id: &str) -> AppResult<Option<active_warning::Model>> {
        ActiveWarning::find()
            .filter(active_warning::Column::SubjectId.eq(subject_id))
            .filter(active_warning::Column::Paused.eq(false))
            .order_by_desc(active_warning::Column::StartTime)
            .order_by_desc(active_warning::Column::Id)
            .one(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The most recently started paused step of a subject.
    pub async fn find_latest_paused(
        &self,
        subject_id: &str,
    ) -> AppResult<Option<active_warning::Model>> {
        ActiveWarning::find()
            .filter(active_warning::Column::SubjectId.eq(subject_id))
            .filter(active_warning::Column::Paused.eq(true))
            .order_by_desc(active_warning::Column::StartTime)
            .order_by_desc(active_warning::Column::Id)
            .one(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Every step of a subject, current and paused, newest first.
    pub async fn find_all_for_subject(
        &self,
        subject_id: &str,
    ) -> AppResult<Vec<active_warning::Model>> {
        ActiveWarning::find()
            .filter(active_warning::Column::SubjectId.eq(subject_id))
            .order_by_desc(active_warning::Column::StartTime)
            .order_by_desc(active_warning::Column::Id)
            .all(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Every tracked step across all subjects.
    pub async fn find_all(&self) -> AppResult<Vec<active_warning::Model>> {
        ActiveWarning::find()
            .order_by_asc(active_warning::Column::SubjectId)
            .order_by_desc(active_warning::Column::StartTime)
            .all(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Non-paused steps whose end time has passed.
    pub async fn find_due(&self, now_millis: i64) -> AppResult<Vec<active_warning::Model>> {
        ActiveWarning::find()
            .filter(active_warning::Column::Paused.eq(false))
            .filter(active_warning::Column::EndTime.ne(NO_EXPIRY))
            .filter(active_warning::Column::EndTime.lte(now_millis))
            .order_by_asc(active_warning::Column::EndTime)
            .all(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Pause a running step, remembering how much time it had left.
    ///
    /// Returns `false` when the step was already paused or gone.
    pub async fn pause(&self, id: &str, remaining: i64) -> AppResult<bool> {
        let result = ActiveWarning::update_many()
            .col_expr(active_warning::Column::Paused, Expr::value(true))
            .col_expr(active_warning::Column::RemainingOnPause, Expr::value(remaining))
            .filter(active_warning::Column::Id.eq(id))
            .filter(active_warning::Column::Paused.eq(false))
            .exec(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }

    /// Resume a paused step with a fresh end time.
    ///
    /// Returns `false` when the step was not paused.
    pub async fn resume(&self, id: &str, end_time: i64) -> AppResult<bool> {
        let result = ActiveWarning::update_many()
            .col_expr(active_warning::Column::Paused, Expr::value(false))
            .col_expr(active_warning::Column::EndTime, Expr::value(end_time))
            .col_expr(
                active_warning::Column::RemainingOnPause,
                Expr::value(NO_EXPIRY),
            )
            .filter(active_warning::Column::Id.eq(id))
            .filter(active_warning::Column::Paused.eq(true))
            .exec(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }

    /// Replace the serialized association list of a step.
    pub async fn set_associations(&self, id: &str, associations: &str) -> AppResult<bool> {
        let result = ActiveWarning::update_many()
            .col_expr(
                active_warning::Column::AssociatedPunishmentIds,
                Expr::value(associations),
            )
            .filter(active_warning::Column::Id.eq(id))
            .exec(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }

    /// Delete a step. Returns `false` if it was already gone.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = ActiveWarning::delete_by_id(id)
            .exec(self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }
}
