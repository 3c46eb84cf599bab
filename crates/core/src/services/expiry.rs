//! Expiry service.
//!
//! Acts on mute/softban rows once their end time passes and reconciles the
//! punishment types that have no live table (ban, kick, freeze). Every
//! action re-reads the row it is about to change, so stale timers and
//! overlapping sweeps are harmless.

use std::sync::Arc;

use async_trait::async_trait;
use sanction_common::{AppError, AppResult, Clock};
use sanction_db::entities::{PunishmentType, SYSTEM_ACTOR, reasons};
use sanction_db::repositories::{LiveRepository, LiveTable, PunishmentRepository};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::effects::Effects;
use super::event_publisher::{EventPublisherService, LedgerEvent};
use super::hooks::NoOpHookExecutor;

/// A one-shot expiry request for a live row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpiryTicket {
    pub table: LiveTable,
    pub subject_id: String,
    /// End time of the row when the ticket was armed, epoch milliseconds.
    pub end_time: i64,
}

/// Arms one-shot expiry timers. Armed tickets are never cancelled.
#[async_trait]
pub trait ExpiryArmer: Send + Sync {
    /// Schedule `ticket` to fire at its end time.
    async fn arm(&self, ticket: ExpiryTicket) -> AppResult<()>;
}

/// Armer that drops every ticket; the periodic live sweep still expires rows.
#[derive(Clone, Default)]
pub struct NoOpExpiryArmer;

#[async_trait]
impl ExpiryArmer for NoOpExpiryArmer {
    async fn arm(&self, _ticket: ExpiryTicket) -> AppResult<()> {
        Ok(())
    }
}

/// Armer that keeps every ticket, for tests.
#[derive(Default)]
pub struct RecordingExpiryArmer {
    tickets: Mutex<Vec<ExpiryTicket>>,
}

impl RecordingExpiryArmer {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tickets armed so far.
    pub async fn tickets(&self) -> Vec<ExpiryTicket> {
        self.tickets.lock().await.clone()
    }
}

#[async_trait]
impl ExpiryArmer for RecordingExpiryArmer {
    async fn arm(&self, ticket: ExpiryTicket) -> AppResult<()> {
        self.tickets.lock().await.push(ticket);
        Ok(())
    }
}

/// Wrapper for boxed `ExpiryArmer` trait object.
pub type ExpiryArmerService = Arc<dyn ExpiryArmer>;

/// Expiry service.
#[derive(Clone)]
pub struct ExpiryService {
    db: Arc<DatabaseConnection>,
    clock: Arc<dyn Clock>,
    events: EventPublisherService,
}

impl ExpiryService {
    /// Create a new expiry service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        clock: Arc<dyn Clock>,
        events: EventPublisherService,
    ) -> Self {
        Self { db, clock, events }
    }

    /// Fire a one-shot timer.
    ///
    /// Expires the live row only if it still carries the end time the ticket
    /// was armed with and that time has passed. Returns whether anything
    /// was expired; a second firing of the same ticket returns `false`.
    pub async fn expire_live(&self, ticket: &ExpiryTicket) -> AppResult<bool> {
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        let live = LiveRepository::new(&txn);

        let Some(row) = live.find(ticket.table, &ticket.subject_id).await? else {
            debug!(subject_id = %ticket.subject_id, "Live row already gone, timer is stale");
            return Ok(false);
        };
        if row.end_time != ticket.end_time || row.end_time > now_ms {
            debug!(
                subject_id = %ticket.subject_id,
                armed_end = ticket.end_time,
                stored_end = row.end_time,
                "Live row changed since the timer was armed"
            );
            return Ok(false);
        }
        if !live
            .delete_if_end(ticket.table, &ticket.subject_id, ticket.end_time)
            .await?
        {
            return Ok(false);
        }

        let marked = PunishmentRepository::new(&txn)
            .mark_removed(&row.record_id, SYSTEM_ACTOR, reasons::EXPIRED, now.fixed_offset())
            .await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let kind = ticket.table.punishment_type();
        let mut effects = Effects::default();
        if marked {
            effects.event(LedgerEvent::Deactivated {
                subject_id: row.subject_id.clone(),
                punishment_type: kind,
                record_id: row.record_id.clone(),
                removed_by: SYSTEM_ACTOR.to_string(),
                reason: reasons::EXPIRED.to_string(),
            });
        }
        effects.event(LedgerEvent::ExpiryNotice {
            subject_id: row.subject_id.clone(),
            punishment_type: kind,
            record_id: row.record_id.clone(),
        });
        self.dispatch(effects).await;

        info!(subject_id = %row.subject_id, record_id = %row.record_id, kind = %kind, "Punishment expired");
        Ok(true)
    }

    /// Expire every overdue row of a live table. Returns how many expired.
    pub async fn sweep_live(&self, table: LiveTable) -> AppResult<u64> {
        let now_ms = self.clock.now_millis();
        let overdue = LiveRepository::new(self.db.as_ref())
            .find_expired(table, now_ms)
            .await?;

        let mut expired = 0;
        for row in overdue {
            let ticket = ExpiryTicket {
                table,
                subject_id: row.subject_id,
                end_time: row.end_time,
            };
            match self.expire_live(&ticket).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(subject_id = %ticket.subject_id, error = %e, "Failed to expire live row");
                }
            }
        }
        Ok(expired)
    }

    /// Flip elapsed ban, kick and freeze records to inactive.
    pub async fn reconcile_permanent_types(&self) -> AppResult<u64> {
        let now = self.clock.now();
        let flipped = PunishmentRepository::new(self.db.as_ref())
            .deactivate_expired(
                now.timestamp_millis(),
                &PunishmentType::bulk_reconciled(),
                now.fixed_offset(),
            )
            .await?;

        let mut effects = Effects::default();
        for record in &flipped {
            effects.event(LedgerEvent::Deactivated {
                subject_id: record.subject_id.clone(),
                punishment_type: record.punishment_type,
                record_id: record.id.clone(),
                removed_by: SYSTEM_ACTOR.to_string(),
                reason: reasons::EXPIRED.to_string(),
            });
        }
        self.dispatch(effects).await;

        Ok(flipped.len() as u64)
    }

    /// Tickets for every live row with a finite end, used to re-arm timers
    /// after a restart.
    pub async fn pending_live_expiries(&self) -> AppResult<Vec<ExpiryTicket>> {
        let live = LiveRepository::new(self.db.as_ref());
        let mut tickets = Vec::new();
        for table in LiveTable::ALL {
            tickets.extend(
                live.all(table)
                    .await?
                    .into_iter()
                    .filter(|row| row.expires())
                    .map(|row| ExpiryTicket {
                        table,
                        subject_id: row.subject_id,
                        end_time: row.end_time,
                    }),
            );
        }
        Ok(tickets)
    }

    async fn dispatch(&self, effects: Effects) {
        effects
            .dispatch(self.events.as_ref(), &NoOpHookExecutor, &NoOpExpiryArmer)
            .await;
    }
}
