//! Shared fixtures for ledger service tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;

use sanction_common::{Clock, DurationParser, ExpirationMode, ManualClock, WarnLevelConfig, WarningPolicy};
use sanction_core::{
    ExpiryService, IssuePunishmentInput, LedgerService, RecordingEventPublisher,
    RecordingExpiryArmer, RecordingHookExecutor, RevokePunishmentInput,
};
use sanction_db::entities::{PERMANENT_END, PunishmentType};
use sanction_db::test_utils::TestDatabase;

/// Epoch milliseconds every fixture clock starts at.
pub const NOW: i64 = 1_700_000_000_000;

pub struct Harness {
    pub db: TestDatabase,
    pub clock: Arc<ManualClock>,
    pub events: Arc<RecordingEventPublisher>,
    pub hooks: Arc<RecordingHookExecutor>,
    pub timers: Arc<RecordingExpiryArmer>,
    pub ledger: LedgerService,
    pub expiry: ExpiryService,
}

impl Harness {
    pub async fn new(mode: ExpirationMode, levels: Vec<WarnLevelConfig>) -> Self {
        let db = TestDatabase::new().await.unwrap();
        let conn = db.conn.clone();
        let clock = Arc::new(ManualClock::new(NOW));
        let events = Arc::new(RecordingEventPublisher::new());
        let hooks = Arc::new(RecordingHookExecutor::new());
        let timers = Arc::new(RecordingExpiryArmer::new());

        let ledger = LedgerService::new(
            conn.clone(),
            clock.clone(),
            events.clone(),
            hooks.clone(),
            timers.clone(),
            WarningPolicy::new(mode, levels),
            DurationParser::default(),
        );
        let expiry = ExpiryService::new(conn, clock.clone(), events.clone());

        Self {
            db,
            clock,
            events,
            hooks,
            timers,
            ledger,
            expiry,
        }
    }

    /// Ledger with no warn levels, for non-warning tests.
    pub async fn plain() -> Self {
        Self::new(ExpirationMode::Unique, Vec::new()).await
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    pub async fn issue(&self, subject: &str, kind: PunishmentType, end: i64, label: &str) -> String {
        self.ledger
            .issue_punishment(issue_input(subject, kind, end, label))
            .await
            .unwrap()
    }

    /// Issue a warning using the level's configured expiration.
    pub async fn warn(&self, subject: &str) -> String {
        self.issue(subject, PunishmentType::Warn, PERMANENT_END, "")
            .await
    }
}

pub fn level(expiration: &str) -> WarnLevelConfig {
    WarnLevelConfig {
        expiration: expiration.to_string(),
        on_warn: Vec::new(),
        on_expire: Vec::new(),
    }
}

pub fn issue_input(
    subject: &str,
    kind: PunishmentType,
    end: i64,
    label: &str,
) -> IssuePunishmentInput {
    IssuePunishmentInput {
        subject_id: subject.to_string(),
        punishment_type: kind,
        reason: "spamming".to_string(),
        issuer: "mod".to_string(),
        end_timestamp: end,
        duration_label: label.to_string(),
        by_address: false,
        subject_address: Some("10.0.0.1".to_string()),
    }
}

pub fn revoke_input(subject: &str, kind: PunishmentType, reason: &str) -> RevokePunishmentInput {
    RevokePunishmentInput {
        subject_id: subject.to_string(),
        punishment_type: kind,
        issuer: "mod".to_string(),
        reason: reason.to_string(),
        record_id: None,
    }
}
