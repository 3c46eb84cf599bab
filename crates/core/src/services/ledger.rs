//! Ledger service: the operations callers use to issue, revoke and look up
//! punishments.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sanction_common::{AppError, AppResult, Clock, DurationParser, IdGenerator, WarningPolicy};
use sanction_db::entities::{PERMANENT_END, PunishmentType, active_warning, punishment_history, reasons};
use sanction_db::repositories::{LiveRepository, LiveTable, PunishmentRepository};
use sea_orm::{DatabaseConnection, DatabaseTransaction, Iterable, Set, TransactionTrait};
use serde::Deserialize;
use tracing::{debug, error, info};
use validator::Validate;

use super::association::AssociationManager;
use super::effects::Effects;
use super::event_publisher::{EventPublisherService, LedgerEvent};
use super::expiry::{ExpiryArmerService, ExpiryTicket};
use super::hooks::{HookExecutorService, NoOpHookExecutor};
use super::warning::{WarningController, WarningTarget, deactivated};

/// Input for issuing a punishment.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IssuePunishmentInput {
    /// Subject being punished.
    #[validate(length(min = 1, max = 64))]
    pub subject_id: String,
    /// Warnings are routed to the escalation controller.
    pub punishment_type: PunishmentType,
    /// Free text, stored verbatim.
    #[validate(length(max = 512))]
    #[serde(default)]
    pub reason: String,
    /// Name of the moderator or console issuing it.
    #[validate(length(min = 1, max = 64))]
    pub issuer: String,
    /// Epoch milliseconds; `i64::MAX` never expires. Ignored for kicks, and
    /// for warnings that use their level's configured expiration.
    #[serde(default = "default_end_timestamp")]
    pub end_timestamp: i64,
    /// Display duration kept verbatim. For warnings, empty or `default`
    /// selects the level's configured expiration.
    #[validate(length(max = 64))]
    #[serde(default)]
    pub duration_label: String,
    /// Applies to the subject's address rather than the subject alone.
    #[serde(default)]
    pub by_address: bool,
    /// Last known address, stored for address lookups.
    #[validate(length(max = 64))]
    #[serde(default)]
    pub subject_address: Option<String>,
}

const fn default_end_timestamp() -> i64 {
    PERMANENT_END
}

/// Input for revoking a punishment.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RevokePunishmentInput {
    /// Subject whose punishment is revoked.
    #[validate(length(min = 1, max = 64))]
    pub subject_id: String,
    /// Type to revoke; warnings go through the escalation controller.
    pub punishment_type: PunishmentType,
    /// Recorded as `removed_by`.
    #[validate(length(min = 1, max = 64))]
    pub issuer: String,
    /// Removal reason. A blank reason on a warning becomes
    /// "Associated warning removed.".
    #[validate(length(max = 512))]
    #[serde(default)]
    pub reason: String,
    /// Revoke this record instead of the latest active one.
    #[serde(default)]
    pub record_id: Option<String>,
}

/// Ledger service.
#[derive(Clone)]
pub struct LedgerService {
    db: Arc<DatabaseConnection>,
    clock: Arc<dyn Clock>,
    events: EventPublisherService,
    expiry: ExpiryArmerService,
    warnings: WarningController,
    associations: AssociationManager,
    id_gen: IdGenerator,
}

impl LedgerService {
    /// Create a new ledger service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        clock: Arc<dyn Clock>,
        events: EventPublisherService,
        hooks: HookExecutorService,
        expiry: ExpiryArmerService,
        policy: WarningPolicy,
        durations: DurationParser,
    ) -> Self {
        let warnings = WarningController::new(
            db.clone(),
            clock.clone(),
            events.clone(),
            hooks,
            expiry.clone(),
            Arc::new(policy),
            Arc::new(durations),
        );
        Self {
            associations: AssociationManager::new(db.clone()),
            db,
            clock,
            events,
            expiry,
            warnings,
            id_gen: IdGenerator::new(),
        }
    }

    /// The warning escalation controller.
    #[must_use]
    pub const fn warnings(&self) -> &WarningController {
        &self.warnings
    }

    /// The association manager.
    #[must_use]
    pub const fn associations(&self) -> &AssociationManager {
        &self.associations
    }

    /// Issue a punishment and return its record id.
    ///
    /// Warnings go through the escalation controller. Any other type first
    /// supersedes every active record of the same type for the subject, so at
    /// most one stays active.
    pub async fn issue_punishment(&self, input: IssuePunishmentInput) -> AppResult<String> {
        input
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        if input.punishment_type == PunishmentType::Warn {
            return self.warnings.issue_warning(&input).await;
        }

        let now = self.clock.now();
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let (record, effects) = self
            .issue_in(&txn, &input, now)
            .await
            .inspect_err(|e| {
                error!(subject_id = %input.subject_id, kind = %input.punishment_type, error = %e, "Issue failed, rolled back");
            })?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        self.dispatch(effects).await;

        info!(
            subject_id = %record.subject_id,
            record_id = %record.id,
            kind = %record.punishment_type,
            issuer = %record.issuer_name,
            "Punishment issued"
        );
        Ok(record.id)
    }

    /// Revoke the subject's active punishment of a type, or a specific one.
    ///
    /// Returns the revoked record id, or `None` when nothing active matched.
    pub async fn revoke_punishment(&self, input: RevokePunishmentInput) -> AppResult<Option<String>> {
        input
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        if input.punishment_type == PunishmentType::Warn {
            let target = match &input.record_id {
                Some(record_id) => {
                    let owned_by_subject = self
                        .warnings
                        .get_active_warning_by_record_id(record_id)
                        .await?
                        .is_some_and(|w| w.subject_id == input.subject_id);
                    if !owned_by_subject {
                        return Ok(None);
                    }
                    WarningTarget::Record(record_id.clone())
                }
                None => WarningTarget::Current(input.subject_id.clone()),
            };
            return self
                .warnings
                .remove_warning(target, &input.issuer, Some(&input.reason))
                .await;
        }

        let now = self.clock.now();
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        let records = PunishmentRepository::new(&txn);

        let target = match &input.record_id {
            Some(record_id) => records.find_by_id(record_id).await?.filter(|r| {
                r.subject_id == input.subject_id
                    && r.punishment_type == input.punishment_type
                    && r.active
            }),
            None => {
                records
                    .latest_active(&input.subject_id, input.punishment_type, now.timestamp_millis())
                    .await?
            }
        };
        let Some(target) = target else {
            return Ok(None);
        };

        if !records
            .mark_removed(&target.id, &input.issuer, &input.reason, now.fixed_offset())
            .await?
        {
            debug!(record_id = %target.id, "Record no longer active, nothing to revoke");
            return Ok(None);
        }
        if let Some(table) = LiveTable::for_type(target.punishment_type) {
            LiveRepository::new(&txn)
                .delete_if_record(table, &target.subject_id, &target.id)
                .await?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut effects = Effects::default();
        effects.event(deactivated(
            &target.subject_id,
            target.punishment_type,
            &target.id,
            &input.issuer,
            &input.reason,
        ));
        self.dispatch(effects).await;

        info!(
            subject_id = %target.subject_id,
            record_id = %target.id,
            kind = %target.punishment_type,
            "Punishment revoked"
        );
        Ok(Some(target.id))
    }

    /// Look up a record by id.
    pub async fn get_by_id(&self, id: &str) -> AppResult<Option<punishment_history::Model>> {
        PunishmentRepository::new(self.db.as_ref()).find_by_id(id).await
    }

    /// The subject's newest record of a type that is still in effect.
    pub async fn latest_active(
        &self,
        subject_id: &str,
        kind: PunishmentType,
    ) -> AppResult<Option<punishment_history::Model>> {
        PunishmentRepository::new(self.db.as_ref())
            .latest_active(subject_id, kind, self.clock.now_millis())
            .await
    }

    /// The newest address-scoped record of a type still in effect for an address.
    pub async fn latest_active_by_address(
        &self,
        address: &str,
        kind: PunishmentType,
    ) -> AppResult<Option<punishment_history::Model>> {
        PunishmentRepository::new(self.db.as_ref())
            .latest_active_by_address(address, kind, self.clock.now_millis())
            .await
    }

    /// Whether a punishment of the type currently applies to the subject.
    pub async fn is_punished(&self, subject_id: &str, kind: PunishmentType) -> AppResult<bool> {
        Ok(self.latest_active(subject_id, kind).await?.is_some())
    }

    /// Whether the subject is muted.
    pub async fn is_muted(&self, subject_id: &str) -> AppResult<bool> {
        self.is_punished(subject_id, PunishmentType::Mute).await
    }

    /// Whether the subject is softbanned.
    pub async fn is_softbanned(&self, subject_id: &str) -> AppResult<bool> {
        self.is_punished(subject_id, PunishmentType::Softban).await
    }

    /// Whether the subject is banned.
    pub async fn is_banned(&self, subject_id: &str) -> AppResult<bool> {
        self.is_punished(subject_id, PunishmentType::Ban).await
    }

    /// Whether the subject is frozen.
    pub async fn is_frozen(&self, subject_id: &str) -> AppResult<bool> {
        self.is_punished(subject_id, PunishmentType::Freeze).await
    }

    /// A page of the subject's history, newest first.
    pub async fn history(
        &self,
        subject_id: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<punishment_history::Model>> {
        PunishmentRepository::new(self.db.as_ref())
            .find_by_subject(subject_id, limit, offset)
            .await
    }

    /// A page of the subject's history for one type, newest first.
    pub async fn history_by_type(
        &self,
        subject_id: &str,
        kind: PunishmentType,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<punishment_history::Model>> {
        PunishmentRepository::new(self.db.as_ref())
            .find_by_subject_and_type(subject_id, kind, limit, offset)
            .await
    }

    /// A page of records issued against an address, newest first.
    pub async fn history_by_address(
        &self,
        address: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<punishment_history::Model>> {
        PunishmentRepository::new(self.db.as_ref())
            .find_by_address(address, limit, offset)
            .await
    }

    /// Total number of records held against the subject.
    pub async fn history_count(&self, subject_id: &str) -> AppResult<u64> {
        PunishmentRepository::new(self.db.as_ref())
            .count_by_subject(subject_id)
            .await
    }

    /// Record totals per type for the subject; every type is present.
    pub async fn punishment_counts(
        &self,
        subject_id: &str,
    ) -> AppResult<HashMap<PunishmentType, u64>> {
        let mut counts: HashMap<PunishmentType, u64> =
            PunishmentType::iter().map(|kind| (kind, 0)).collect();
        for (kind, count) in PunishmentRepository::new(self.db.as_ref())
            .counts_by_type(subject_id)
            .await?
        {
            counts.insert(kind, u64::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }

    /// Ids of every active record of a type.
    pub async fn active_record_ids(&self, kind: PunishmentType) -> AppResult<Vec<String>> {
        PunishmentRepository::new(self.db.as_ref())
            .all_active_ids(kind)
            .await
    }

    /// Record that a punishment was applied because of a warning.
    pub async fn link_association(
        &self,
        warning_record_id: &str,
        dependent_type: PunishmentType,
        dependent_record_id: &str,
    ) -> AppResult<()> {
        self.associations
            .link(warning_record_id, dependent_type, dependent_record_id)
            .await
    }

    /// See [`WarningController::get_active_warning`].
    pub async fn get_active_warning(
        &self,
        subject_id: &str,
    ) -> AppResult<Option<active_warning::Model>> {
        self.warnings.get_active_warning(subject_id).await
    }

    /// See [`WarningController::get_active_warning_by_record_id`].
    pub async fn get_active_warning_by_record_id(
        &self,
        record_id: &str,
    ) -> AppResult<Option<active_warning::Model>> {
        self.warnings.get_active_warning_by_record_id(record_id).await
    }

    /// See [`WarningController::all_active_and_paused_warnings`].
    pub async fn all_active_and_paused_warnings(
        &self,
        subject_id: &str,
    ) -> AppResult<Vec<active_warning::Model>> {
        self.warnings.all_active_and_paused_warnings(subject_id).await
    }

    async fn issue_in(
        &self,
        txn: &DatabaseTransaction,
        input: &IssuePunishmentInput,
        now: DateTime<Utc>,
    ) -> AppResult<(punishment_history::Model, Effects)> {
        let at = now.fixed_offset();
        let kind = input.punishment_type;
        // A kick is over the moment it happens.
        let end_timestamp = if kind == PunishmentType::Kick {
            now.timestamp_millis()
        } else {
            input.end_timestamp
        };
        let records = PunishmentRepository::new(txn);
        let mut effects = Effects::default();

        for previous in records.find_active(&input.subject_id, kind).await? {
            if records
                .mark_removed(
                    &previous.id,
                    &input.issuer,
                    reasons::SUPERSEDED_BY_PUNISHMENT,
                    at,
                )
                .await?
            {
                effects.event(deactivated(
                    &previous.subject_id,
                    kind,
                    &previous.id,
                    &input.issuer,
                    reasons::SUPERSEDED_BY_PUNISHMENT,
                ));
            }
        }

        let record_id = records.allocate_id(&self.id_gen).await?;
        let record = records
            .create(punishment_history::ActiveModel {
                id: Set(record_id),
                subject_id: Set(input.subject_id.clone()),
                subject_address: Set(input.subject_address.clone()),
                punishment_type: Set(kind),
                reason: Set(input.reason.clone()),
                issuer_name: Set(input.issuer.clone()),
                issued_at: Set(at),
                by_address: Set(input.by_address),
                end_timestamp: Set(end_timestamp),
                duration_label: Set(input.duration_label.clone()),
                active: Set(true),
                removed_by: Set(None),
                removed_reason: Set(None),
                removed_at: Set(None),
                warn_level: Set(0),
            })
            .await?;

        if let Some(table) = LiveTable::for_type(kind) {
            LiveRepository::new(txn)
                .upsert(
                    table,
                    &record.subject_id,
                    &record.id,
                    end_timestamp,
                    &record.reason,
                )
                .await?;
            if end_timestamp != PERMANENT_END {
                effects.timer(ExpiryTicket {
                    table,
                    subject_id: record.subject_id.clone(),
                    end_time: end_timestamp,
                });
            }
        }

        effects.event(LedgerEvent::Activated {
            subject_id: record.subject_id.clone(),
            punishment_type: kind,
            record_id: record.id.clone(),
            end_time: end_timestamp,
            reason: record.reason.clone(),
        });
        Ok((record, effects))
    }

    async fn dispatch(&self, effects: Effects) {
        effects
            .dispatch(self.events.as_ref(), &NoOpHookExecutor, self.expiry.as_ref())
            .await;
    }
}
