//! Event publisher service.
//!
//! The ledger keeps no in-memory view of who is punished. Instead it emits
//! [`LedgerEvent`]s after every committed state change so the enforcement
//! layer can maintain its own caches (active mutes, softbans, ...).

use async_trait::async_trait;
use sanction_common::AppResult;
use sanction_db::entities::PunishmentType;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

/// Default capacity of the broadcast channel.
const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// State changes observable by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LedgerEvent {
    /// A punishment started (or resumed) applying to a subject.
    Activated {
        subject_id: String,
        punishment_type: PunishmentType,
        record_id: String,
        /// Epoch milliseconds; `i64::MAX` never expires.
        end_time: i64,
        reason: String,
    },
    /// A punishment stopped applying to a subject.
    Deactivated {
        subject_id: String,
        punishment_type: PunishmentType,
        record_id: String,
        removed_by: String,
        reason: String,
    },
    /// A punishment ran out; the subject should be told if reachable.
    ExpiryNotice {
        subject_id: String,
        punishment_type: PunishmentType,
        record_id: String,
    },
}

impl LedgerEvent {
    /// Subject the event concerns.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        match self {
            Self::Activated { subject_id, .. }
            | Self::Deactivated { subject_id, .. }
            | Self::ExpiryNotice { subject_id, .. } => subject_id,
        }
    }

    /// Ledger record the event concerns.
    #[must_use]
    pub fn record_id(&self) -> &str {
        match self {
            Self::Activated { record_id, .. }
            | Self::Deactivated { record_id, .. }
            | Self::ExpiryNotice { record_id, .. } => record_id,
        }
    }
}

/// Trait for publishing ledger events.
///
/// This keeps the core services independent of whatever transport the
/// enforcement layer listens on.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one event.
    async fn publish(&self, event: LedgerEvent) -> AppResult<()>;
}

/// A no-op implementation of `EventPublisher` for when nobody listens.
#[derive(Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish(&self, _event: LedgerEvent) -> AppResult<()> {
        Ok(())
    }
}

/// Publisher fanning events out over a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<LedgerEvent>,
}

impl BroadcastEventPublisher {
    /// Create a publisher with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventPublisher {
    async fn publish(&self, event: LedgerEvent) -> AppResult<()> {
        // Sending only fails when there are no subscribers.
        let _ = self.sender.send(event);
        Ok(())
    }
}

/// Publisher that keeps every event in memory, for tests and replay.
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<LedgerEvent>>,
}

impl RecordingEventPublisher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events published so far, oldest first.
    pub async fn events(&self) -> Vec<LedgerEvent> {
        self.events.lock().await.clone()
    }

    /// Drain recorded events.
    pub async fn take(&self) -> Vec<LedgerEvent> {
        std::mem::take(&mut *self.events.lock().await)
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(&self, event: LedgerEvent) -> AppResult<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

/// Wrapper for boxed `EventPublisher` trait object.
pub type EventPublisherService = Arc<dyn EventPublisher>;
