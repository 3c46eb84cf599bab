//! Warning escalation controller.
//!
//! Per subject the controller moves between "no warning", "active at level
//! N" and "paused at level N". Issuing a warning escalates one level above
//! the running warning; the running warning is either superseded for good
//! (unique mode) or paused together with its dependent punishments
//! (incremental mode) and resumed once the newer warning goes away.
//!
//! Every transition runs in one database transaction. Events, timers and
//! hooks are dispatched only after the transaction commits.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sanction_common::{
    AppError, AppResult, Clock, DurationParser, Expiration, ExpirationMode, IdGenerator,
    WarnLevelConfig, WarningPolicy,
};
use sanction_db::entities::{
    PERMANENT_END, PunishmentType, SYSTEM_ACTOR, active_warning, active_warning::NO_EXPIRY,
    punishment_history, reasons,
};
use sanction_db::repositories::{LiveRepository, LiveTable, PunishmentRepository, WarningRepository};
use sea_orm::{DatabaseConnection, DatabaseTransaction, Set, TransactionTrait};
use tracing::{debug, error, info};

use super::association::links_of;
use super::effects::Effects;
use super::event_publisher::{EventPublisherService, LedgerEvent};
use super::expiry::{ExpiryArmerService, ExpiryTicket};
use super::hooks::{HookExecutorService, HookInvocation, HookTrigger, WarningContext};
use super::ledger::IssuePunishmentInput;

/// Which warning a removal applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningTarget {
    /// The subject's running (non-paused) warning.
    Current(String),
    /// The warning step owning this ledger record, paused or not.
    Record(String),
}

/// Warning escalation controller.
#[derive(Clone)]
pub struct WarningController {
    db: Arc<DatabaseConnection>,
    clock: Arc<dyn Clock>,
    events: EventPublisherService,
    hooks: HookExecutorService,
    expiry: ExpiryArmerService,
    policy: Arc<WarningPolicy>,
    durations: Arc<DurationParser>,
    id_gen: IdGenerator,
}

impl WarningController {
    /// Create a new warning controller.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        clock: Arc<dyn Clock>,
        events: EventPublisherService,
        hooks: HookExecutorService,
        expiry: ExpiryArmerService,
        policy: Arc<WarningPolicy>,
        durations: Arc<DurationParser>,
    ) -> Self {
        Self {
            db,
            clock,
            events,
            hooks,
            expiry,
            policy,
            durations,
            id_gen: IdGenerator::new(),
        }
    }

    /// The escalation policy in force.
    #[must_use]
    pub fn policy(&self) -> &WarningPolicy {
        &self.policy
    }

    /// Issue a warning one level above the subject's running warning.
    ///
    /// The level's configured expiration applies unless the input carries
    /// its own duration label (anything but empty or `default`). Fails with
    /// [`AppError::WarnLevelNotConfigured`] when the computed level has no
    /// configuration; nothing is written in that case.
    pub async fn issue_warning(&self, input: &IssuePunishmentInput) -> AppResult<String> {
        let now = self.clock.now();
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let (record_id, effects) = self
            .issue_in(&txn, input, now)
            .await
            .inspect_err(|e| {
                if e.is_server_error() {
                    error!(subject_id = %input.subject_id, error = %e, "Warning issue failed, rolled back");
                }
            })?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        self.dispatch(effects).await;

        Ok(record_id)
    }

    /// Remove a warning, then resume the subject's paused warning if the
    /// policy is incremental.
    ///
    /// Dependents receive the same removal reason as the warning itself.
    /// Returns `None` when there was nothing to remove.
    pub async fn remove_warning(
        &self,
        target: WarningTarget,
        removed_by: &str,
        reason: Option<&str>,
    ) -> AppResult<Option<String>> {
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(reasons::ASSOCIATED_WARNING_REMOVED);
        let now = self.clock.now();
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let warnings = WarningRepository::new(&txn);
        let warning = match &target {
            WarningTarget::Current(subject_id) => warnings.find_active(subject_id).await?,
            WarningTarget::Record(record_id) => warnings.find_by_record_id(record_id).await?,
        };
        let Some(warning) = warning else {
            return Ok(None);
        };

        let mut effects = Effects::default();
        let removed = async {
            if !self
                .remove_in(&txn, &warning, removed_by, reason, now, &mut effects)
                .await?
            {
                return Ok(false);
            }
            self.resume_in(&txn, &warning.subject_id, now, &mut effects)
                .await?;
            Ok::<_, AppError>(true)
        }
        .await
        .inspect_err(|e| {
            error!(record_id = %warning.punishment_record_id, error = %e, "Warning removal failed, rolled back");
        })?;
        if !removed {
            return Ok(None);
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        self.dispatch(effects).await;

        info!(
            subject_id = %warning.subject_id,
            record_id = %warning.punishment_record_id,
            level = warning.level,
            "Warning removed"
        );
        Ok(Some(warning.punishment_record_id))
    }

    /// Expire every running warning whose end time has passed.
    pub async fn expire_due_warnings(&self) -> AppResult<u64> {
        let due = WarningRepository::new(self.db.as_ref())
            .find_due(self.clock.now_millis())
            .await?;

        let mut expired = 0;
        for warning in due {
            match self.expire_warning(&warning).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(record_id = %warning.punishment_record_id, error = %e, "Failed to expire warning");
                }
            }
        }
        if expired > 0 {
            info!(count = expired, "Expired warnings");
        }
        Ok(expired)
    }

    /// The subject's running (non-paused) warning.
    pub async fn get_active_warning(
        &self,
        subject_id: &str,
    ) -> AppResult<Option<active_warning::Model>> {
        WarningRepository::new(self.db.as_ref())
            .find_active(subject_id)
            .await
    }

    /// The warning step owning a ledger record.
    pub async fn get_active_warning_by_record_id(
        &self,
        record_id: &str,
    ) -> AppResult<Option<active_warning::Model>> {
        WarningRepository::new(self.db.as_ref())
            .find_by_record_id(record_id)
            .await
    }

    /// Running and paused warning steps of a subject, newest first.
    pub async fn all_active_and_paused_warnings(
        &self,
        subject_id: &str,
    ) -> AppResult<Vec<active_warning::Model>> {
        WarningRepository::new(self.db.as_ref())
            .find_all_for_subject(subject_id)
            .await
    }

    async fn expire_warning(&self, due: &active_warning::Model) -> AppResult<bool> {
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let Some(current) = WarningRepository::new(&txn)
            .find_by_record_id(&due.punishment_record_id)
            .await?
        else {
            return Ok(false);
        };
        if current.paused || !current.expires() || current.end_time > now_ms {
            debug!(record_id = %current.punishment_record_id, "Warning changed since it was found due");
            return Ok(false);
        }
        let record = PunishmentRepository::new(&txn)
            .find_by_id(&current.punishment_record_id)
            .await?;

        let mut effects = Effects::default();
        if !self
            .remove_in(&txn, &current, SYSTEM_ACTOR, reasons::EXPIRED, now, &mut effects)
            .await?
        {
            return Ok(false);
        }
        effects.event(LedgerEvent::ExpiryNotice {
            subject_id: current.subject_id.clone(),
            punishment_type: PunishmentType::Warn,
            record_id: current.punishment_record_id.clone(),
        });
        let on_expire = self
            .level_config(current.level)
            .map(|config| config.on_expire.clone())
            .unwrap_or_default();
        let (duration_label, reason) = record
            .map(|r| (r.duration_label, r.reason))
            .unwrap_or_default();
        effects.hook(HookInvocation {
            actor: SYSTEM_ACTOR.to_string(),
            subject_id: current.subject_id.clone(),
            action_kind: PunishmentType::Warn,
            duration_label,
            reason,
            is_removal: true,
            actions: on_expire,
            warning: Some(WarningContext::from(&current)),
            trigger: HookTrigger::Expired,
        });
        self.resume_in(&txn, &current.subject_id, now, &mut effects)
            .await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        self.dispatch(effects).await;

        info!(subject_id = %current.subject_id, level = current.level, "Warning expired");
        Ok(true)
    }

    async fn issue_in(
        &self,
        txn: &DatabaseTransaction,
        input: &IssuePunishmentInput,
        now: DateTime<Utc>,
    ) -> AppResult<(String, Effects)> {
        let now_ms = now.timestamp_millis();
        let warnings = WarningRepository::new(txn);
        let records = PunishmentRepository::new(txn);
        let mut effects = Effects::default();

        let current = warnings.find_active(&input.subject_id).await?;
        let level = current.as_ref().map_or(1, |w| w.level + 1);
        let config = self
            .level_config(level)
            .ok_or(AppError::WarnLevelNotConfigured(level as u32))?;
        let (end_timestamp, duration_label) = self.warning_span(input, config, level, now_ms)?;

        if let Some(current) = current {
            match self.policy.expiration_mode {
                ExpirationMode::Unique => {
                    self.remove_in(
                        txn,
                        &current,
                        &input.issuer,
                        reasons::SUPERSEDED_BY_WARNING,
                        now,
                        &mut effects,
                    )
                    .await?;
                }
                ExpirationMode::Incremental => {
                    self.pause_in(txn, &current, &input.issuer, now, &mut effects)
                        .await?;
                }
            }
        }

        let record_id = records.allocate_id(&self.id_gen).await?;
        let record = records
            .create(punishment_history::ActiveModel {
                id: Set(record_id),
                subject_id: Set(input.subject_id.clone()),
                subject_address: Set(input.subject_address.clone()),
                punishment_type: Set(PunishmentType::Warn),
                reason: Set(input.reason.clone()),
                issuer_name: Set(input.issuer.clone()),
                issued_at: Set(now.fixed_offset()),
                by_address: Set(false),
                end_timestamp: Set(end_timestamp),
                duration_label: Set(duration_label.clone()),
                active: Set(true),
                removed_by: Set(None),
                removed_reason: Set(None),
                removed_at: Set(None),
                warn_level: Set(level),
            })
            .await?;

        let warning = warnings
            .create(active_warning::ActiveModel {
                id: Set(self.id_gen.generate()),
                subject_id: Set(input.subject_id.clone()),
                punishment_record_id: Set(record.id.clone()),
                level: Set(level),
                start_time: Set(now_ms),
                end_time: Set(if end_timestamp == PERMANENT_END {
                    NO_EXPIRY
                } else {
                    end_timestamp
                }),
                paused: Set(false),
                remaining_on_pause: Set(NO_EXPIRY),
                associated_punishment_ids: Set("[]".to_string()),
            })
            .await?;

        effects.event(LedgerEvent::Activated {
            subject_id: record.subject_id.clone(),
            punishment_type: PunishmentType::Warn,
            record_id: record.id.clone(),
            end_time: end_timestamp,
            reason: record.reason.clone(),
        });
        effects.hook(HookInvocation {
            actor: input.issuer.clone(),
            subject_id: input.subject_id.clone(),
            action_kind: PunishmentType::Warn,
            duration_label,
            reason: input.reason.clone(),
            is_removal: false,
            actions: config.on_warn.clone(),
            warning: Some(WarningContext::from(&warning)),
            trigger: HookTrigger::Issued,
        });

        info!(subject_id = %input.subject_id, record_id = %record.id, level, "Warning issued");
        Ok((record.id, effects))
    }

    /// Pause a running warning and every dependent punishment.
    async fn pause_in(
        &self,
        txn: &DatabaseTransaction,
        warning: &active_warning::Model,
        actor: &str,
        now: DateTime<Utc>,
        effects: &mut Effects,
    ) -> AppResult<bool> {
        let at = now.fixed_offset();
        let remaining = if warning.expires() {
            (warning.end_time - now.timestamp_millis()).max(0)
        } else {
            NO_EXPIRY
        };

        if !WarningRepository::new(txn)
            .pause(&warning.id, remaining)
            .await?
        {
            debug!(record_id = %warning.punishment_record_id, "Warning already paused");
            return Ok(false);
        }

        let records = PunishmentRepository::new(txn);
        let live = LiveRepository::new(txn);
        if records
            .mark_removed(&warning.punishment_record_id, actor, reasons::PAUSED, at)
            .await?
        {
            effects.event(deactivated(
                &warning.subject_id,
                PunishmentType::Warn,
                &warning.punishment_record_id,
                actor,
                reasons::PAUSED,
            ));
        }
        for link in links_of(warning) {
            if !records
                .mark_removed(&link.record_id, actor, reasons::PAUSED, at)
                .await?
            {
                continue;
            }
            if let Some(table) = LiveTable::for_type(link.punishment_type) {
                live.delete_if_record(table, &warning.subject_id, &link.record_id)
                    .await?;
            }
            effects.event(deactivated(
                &warning.subject_id,
                link.punishment_type,
                &link.record_id,
                actor,
                reasons::PAUSED,
            ));
        }

        debug!(
            subject_id = %warning.subject_id,
            record_id = %warning.punishment_record_id,
            remaining,
            "Warning paused"
        );
        Ok(true)
    }

    /// Remove a warning step and give it and its dependents a final reason.
    ///
    /// Returns `false` if the step was already gone.
    async fn remove_in(
        &self,
        txn: &DatabaseTransaction,
        warning: &active_warning::Model,
        actor: &str,
        reason: &str,
        now: DateTime<Utc>,
        effects: &mut Effects,
    ) -> AppResult<bool> {
        let at = now.fixed_offset();
        let warnings = WarningRepository::new(txn);
        let records = PunishmentRepository::new(txn);
        let live = LiveRepository::new(txn);

        let Some(current) = warnings
            .find_by_record_id(&warning.punishment_record_id)
            .await?
        else {
            debug!(record_id = %warning.punishment_record_id, "Warning already removed");
            return Ok(false);
        };

        for link in links_of(&current) {
            if !records
                .finalize_removal(&link.record_id, actor, reason, at)
                .await?
            {
                continue;
            }
            if let Some(table) = LiveTable::for_type(link.punishment_type) {
                live.delete_if_record(table, &current.subject_id, &link.record_id)
                    .await?;
            }
            effects.event(deactivated(
                &current.subject_id,
                link.punishment_type,
                &link.record_id,
                actor,
                reason,
            ));
        }
        if records
            .finalize_removal(&current.punishment_record_id, actor, reason, at)
            .await?
        {
            effects.event(deactivated(
                &current.subject_id,
                PunishmentType::Warn,
                &current.punishment_record_id,
                actor,
                reason,
            ));
        }

        warnings.delete(&current.id).await
    }

    /// Resume the subject's most recently started paused warning, if the
    /// policy resumes and the subject has no running warning.
    async fn resume_in(
        &self,
        txn: &DatabaseTransaction,
        subject_id: &str,
        now: DateTime<Utc>,
        effects: &mut Effects,
    ) -> AppResult<Option<String>> {
        if !self.policy.expiration_mode.resumes_paused() {
            return Ok(None);
        }
        let warnings = WarningRepository::new(txn);
        if warnings.find_active(subject_id).await?.is_some() {
            debug!(subject_id, "Subject still has a running warning, nothing to resume");
            return Ok(None);
        }
        let Some(paused) = warnings.find_latest_paused(subject_id).await? else {
            return Ok(None);
        };

        let remaining = paused.remaining_on_pause;
        let (warning_end, record_end) = if remaining == NO_EXPIRY {
            (NO_EXPIRY, PERMANENT_END)
        } else {
            let end = now.timestamp_millis().saturating_add(remaining);
            (end, end)
        };
        if !warnings.resume(&paused.id, warning_end).await? {
            debug!(record_id = %paused.punishment_record_id, "Warning no longer paused");
            return Ok(None);
        }

        let records = PunishmentRepository::new(txn);
        let live = LiveRepository::new(txn);
        let duration_label = if remaining == NO_EXPIRY {
            self.durations.permanent_label().to_string()
        } else {
            // Rounded up, so a sub-second remainder is not labelled permanent.
            self.durations
                .format((remaining.saturating_add(999) / 1000).max(1))
        };
        let context = WarningContext {
            end_time: warning_end,
            ..WarningContext::from(&paused)
        };

        let warning_reason = records
            .find_by_id(&paused.punishment_record_id)
            .await?
            .map(|r| r.reason)
            .unwrap_or_default();
        if records
            .reactivate(&paused.punishment_record_id, record_end)
            .await?
        {
            effects.event(LedgerEvent::Activated {
                subject_id: paused.subject_id.clone(),
                punishment_type: PunishmentType::Warn,
                record_id: paused.punishment_record_id.clone(),
                end_time: record_end,
                reason: warning_reason.clone(),
            });
        }

        for link in links_of(&paused) {
            // A punishment of the same type issued while this one was paused wins.
            if records
                .find_active(&paused.subject_id, link.punishment_type)
                .await?
                .iter()
                .any(|newer| newer.id != link.record_id)
            {
                if records
                    .finalize_removal(
                        &link.record_id,
                        SYSTEM_ACTOR,
                        reasons::SUPERSEDED_BY_PUNISHMENT,
                        now.fixed_offset(),
                    )
                    .await?
                {
                    debug!(
                        record_id = %link.record_id,
                        kind = %link.punishment_type,
                        "Paused dependent superseded by a newer punishment"
                    );
                    effects.event(deactivated(
                        &paused.subject_id,
                        link.punishment_type,
                        &link.record_id,
                        SYSTEM_ACTOR,
                        reasons::SUPERSEDED_BY_PUNISHMENT,
                    ));
                }
                continue;
            }
            if !records.reactivate(&link.record_id, record_end).await? {
                debug!(record_id = %link.record_id, "Dependent punishment not paused, skipping");
                continue;
            }
            let Some(dependent) = records.find_by_id(&link.record_id).await? else {
                continue;
            };
            if let Some(table) = LiveTable::for_type(link.punishment_type) {
                live.upsert(
                    table,
                    &dependent.subject_id,
                    &dependent.id,
                    record_end,
                    &dependent.reason,
                )
                .await?;
                if record_end != PERMANENT_END {
                    effects.timer(ExpiryTicket {
                        table,
                        subject_id: dependent.subject_id.clone(),
                        end_time: record_end,
                    });
                }
            }
            effects.event(LedgerEvent::Activated {
                subject_id: dependent.subject_id.clone(),
                punishment_type: link.punishment_type,
                record_id: dependent.id.clone(),
                end_time: record_end,
                reason: dependent.reason.clone(),
            });
            effects.hook(HookInvocation {
                actor: SYSTEM_ACTOR.to_string(),
                subject_id: dependent.subject_id,
                action_kind: link.punishment_type,
                duration_label: duration_label.clone(),
                reason: dependent.reason,
                is_removal: false,
                actions: Vec::new(),
                warning: Some(context.clone()),
                trigger: HookTrigger::Resumed,
            });
        }

        effects.hook(HookInvocation {
            actor: SYSTEM_ACTOR.to_string(),
            subject_id: paused.subject_id.clone(),
            action_kind: PunishmentType::Warn,
            duration_label,
            reason: warning_reason,
            is_removal: false,
            actions: Vec::new(),
            warning: Some(context),
            trigger: HookTrigger::Resumed,
        });

        info!(
            subject_id = %paused.subject_id,
            record_id = %paused.punishment_record_id,
            level = paused.level,
            remaining,
            "Warning resumed"
        );
        Ok(Some(paused.punishment_record_id))
    }

    /// End timestamp and display label of a new warning.
    fn warning_span(
        &self,
        input: &IssuePunishmentInput,
        config: &WarnLevelConfig,
        level: i32,
        now_ms: i64,
    ) -> AppResult<(i64, String)> {
        let label = input.duration_label.trim();
        if !label.is_empty() && !label.eq_ignore_ascii_case("default") {
            return Ok((input.end_timestamp, input.duration_label.clone()));
        }

        match self.durations.parse_expiration(&config.expiration) {
            Some(Expiration::Never) => Ok((
                PERMANENT_END,
                self.durations.permanent_label().to_string(),
            )),
            Some(Expiration::After(secs)) => {
                let secs = i64::try_from(secs).unwrap_or(i64::MAX);
                Ok((
                    now_ms.saturating_add(secs.saturating_mul(1000)),
                    self.durations.format(secs),
                ))
            }
            None => Err(AppError::Config(format!(
                "Warn level {level} has an invalid expiration {:?}",
                config.expiration
            ))),
        }
    }

    fn level_config(&self, level: i32) -> Option<&WarnLevelConfig> {
        u32::try_from(level)
            .ok()
            .and_then(|level| self.policy.level(level))
    }

    async fn dispatch(&self, effects: Effects) {
        effects
            .dispatch(
                self.events.as_ref(),
                self.hooks.as_ref(),
                self.expiry.as_ref(),
            )
            .await;
    }
}

/// `Deactivated` event for a removal made inside a cascade.
pub(crate) fn deactivated(
    subject_id: &str,
    punishment_type: PunishmentType,
    record_id: &str,
    removed_by: &str,
    reason: &str,
) -> LedgerEvent {
    LedgerEvent::Deactivated {
        subject_id: subject_id.to_string(),
        punishment_type,
        record_id: record_id.to_string(),
        removed_by: removed_by.to_string(),
        reason: reason.to_string(),
    }
}
