//! Ledger service tests against an in-memory SQLite database.

#![allow(clippy::unwrap_used)]

mod common;

use common::{Harness, NOW, issue_input, revoke_input};
use sanction_common::AppError;
use sanction_core::{LedgerEvent, RevokePunishmentInput};
use sanction_db::entities::{PERMANENT_END, PunishmentType, SYSTEM_ACTOR, reasons};
use sanction_db::repositories::{LiveRepository, LiveTable};

const TEN_MINUTES: i64 = 10 * 60 * 1000;

#[tokio::test]
async fn test_ten_minute_mute_expires_once() {
    let h = Harness::plain().await;
    let record_id = h
        .issue("alice", PunishmentType::Mute, NOW + TEN_MINUTES, "10m")
        .await;

    assert!(h.ledger.is_muted("alice").await.unwrap());
    let tickets = h.timers.tickets().await;
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].table, LiveTable::Mute);
    assert_eq!(tickets[0].end_time, NOW + TEN_MINUTES);

    // Firing early changes nothing.
    assert!(!h.expiry.expire_live(&tickets[0]).await.unwrap());
    assert!(h.ledger.is_muted("alice").await.unwrap());

    h.clock.advance_millis(TEN_MINUTES);
    assert!(h.expiry.expire_live(&tickets[0]).await.unwrap());
    assert!(!h.expiry.expire_live(&tickets[0]).await.unwrap());

    assert!(!h.ledger.is_muted("alice").await.unwrap());
    let record = h.ledger.get_by_id(&record_id).await.unwrap().unwrap();
    assert!(!record.active);
    assert_eq!(record.removed_by.as_deref(), Some(SYSTEM_ACTOR));
    assert_eq!(record.removed_reason.as_deref(), Some(reasons::EXPIRED));
    assert_eq!(record.duration_label, "10m");

    let events = h.events.events().await;
    let notices = events
        .iter()
        .filter(|e| matches!(e, LedgerEvent::ExpiryNotice { .. }))
        .count();
    assert_eq!(notices, 1);
}

#[tokio::test]
async fn test_reissue_supersedes_and_stales_old_timer() {
    let h = Harness::plain().await;
    let first = h
        .issue("alice", PunishmentType::Mute, NOW + TEN_MINUTES, "10m")
        .await;
    let second = h
        .issue("alice", PunishmentType::Mute, NOW + 6 * TEN_MINUTES, "1h")
        .await;

    let old = h.ledger.get_by_id(&first).await.unwrap().unwrap();
    assert!(!old.active);
    assert_eq!(old.removed_by.as_deref(), Some("mod"));
    assert_eq!(
        old.removed_reason.as_deref(),
        Some(reasons::SUPERSEDED_BY_PUNISHMENT)
    );
    assert_eq!(h.ledger.active_record_ids(PunishmentType::Mute).await.unwrap(), vec![second.clone()]);

    // The first timer fires at its original end and must not touch the new mute.
    h.clock.advance_millis(TEN_MINUTES);
    let first_ticket = h.timers.tickets().await[0].clone();
    assert!(!h.expiry.expire_live(&first_ticket).await.unwrap());
    assert!(h.ledger.is_muted("alice").await.unwrap());

    let live = LiveRepository::new(h.db.connection())
        .find(LiveTable::Mute, "alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(live.record_id, second);

    let events = h.events.events().await;
    assert!(matches!(
        &events[1],
        LedgerEvent::Deactivated { record_id, reason, .. }
            if *record_id == first && reason == reasons::SUPERSEDED_BY_PUNISHMENT
    ));
    assert!(matches!(&events[2], LedgerEvent::Activated { record_id, .. } if *record_id == second));
}

#[tokio::test]
async fn test_timer_after_manual_revoke_is_noop() {
    let h = Harness::plain().await;
    let record_id = h
        .issue("alice", PunishmentType::Softban, NOW + TEN_MINUTES, "10m")
        .await;
    assert!(h.ledger.is_softbanned("alice").await.unwrap());

    let revoked = h
        .ledger
        .revoke_punishment(revoke_input("alice", PunishmentType::Softban, "appeal"))
        .await
        .unwrap();
    assert_eq!(revoked, Some(record_id.clone()));
    assert!(!h.ledger.is_softbanned("alice").await.unwrap());

    h.clock.advance_millis(TEN_MINUTES);
    let ticket = h.timers.tickets().await[0].clone();
    assert!(!h.expiry.expire_live(&ticket).await.unwrap());

    let record = h.ledger.get_by_id(&record_id).await.unwrap().unwrap();
    assert_eq!(record.removed_by.as_deref(), Some("mod"));
    assert_eq!(record.removed_reason.as_deref(), Some("appeal"));
}

#[tokio::test]
async fn test_revoke_without_active_record_returns_none() {
    let h = Harness::plain().await;
    let revoked = h
        .ledger
        .revoke_punishment(revoke_input("nobody", PunishmentType::Ban, ""))
        .await
        .unwrap();
    assert!(revoked.is_none());
}

#[tokio::test]
async fn test_revoke_by_record_id_checks_subject() {
    let h = Harness::plain().await;
    let record_id = h
        .issue("alice", PunishmentType::Ban, PERMANENT_END, "Permanent")
        .await;

    let wrong_subject = RevokePunishmentInput {
        record_id: Some(record_id.clone()),
        ..revoke_input("bob", PunishmentType::Ban, "")
    };
    assert!(h.ledger.revoke_punishment(wrong_subject).await.unwrap().is_none());
    assert!(h.ledger.is_banned("alice").await.unwrap());

    let right_subject = RevokePunishmentInput {
        record_id: Some(record_id.clone()),
        ..revoke_input("alice", PunishmentType::Ban, "")
    };
    assert_eq!(
        h.ledger.revoke_punishment(right_subject).await.unwrap(),
        Some(record_id)
    );
    assert!(!h.ledger.is_banned("alice").await.unwrap());
}

#[tokio::test]
async fn test_kick_is_recorded_but_never_in_effect() {
    let h = Harness::plain().await;
    let record_id = h
        .issue("alice", PunishmentType::Kick, PERMANENT_END, "")
        .await;

    let record = h.ledger.get_by_id(&record_id).await.unwrap().unwrap();
    assert_eq!(record.end_timestamp, NOW);
    assert!(
        h.ledger
            .latest_active("alice", PunishmentType::Kick)
            .await
            .unwrap()
            .is_none()
    );
    assert!(h.timers.tickets().await.is_empty());
}

#[tokio::test]
async fn test_reconcile_flips_elapsed_bans_kicks_and_freezes() {
    let h = Harness::plain().await;
    let ban = h.issue("alice", PunishmentType::Ban, NOW + 1000, "1s").await;
    let kick = h.issue("alice", PunishmentType::Kick, PERMANENT_END, "").await;
    let permanent = h
        .issue("bob", PunishmentType::Freeze, PERMANENT_END, "Permanent")
        .await;

    h.clock.advance_secs(2);
    assert_eq!(h.expiry.reconcile_permanent_types().await.unwrap(), 2);
    assert_eq!(h.expiry.reconcile_permanent_types().await.unwrap(), 0);

    for id in [&ban, &kick] {
        let record = h.ledger.get_by_id(id).await.unwrap().unwrap();
        assert!(!record.active);
        assert_eq!(record.removed_reason.as_deref(), Some(reasons::EXPIRED));
    }
    assert!(h.ledger.get_by_id(&permanent).await.unwrap().unwrap().active);
    assert!(h.ledger.is_frozen("bob").await.unwrap());
}

#[tokio::test]
async fn test_sweep_expires_overdue_live_rows() {
    let h = Harness::plain().await;
    h.issue("alice", PunishmentType::Mute, NOW + 1000, "1s").await;
    h.issue("bob", PunishmentType::Mute, PERMANENT_END, "Permanent")
        .await;

    assert_eq!(h.expiry.pending_live_expiries().await.unwrap().len(), 1);

    h.clock.advance_secs(5);
    assert_eq!(h.expiry.sweep_live(LiveTable::Mute).await.unwrap(), 1);
    assert!(!h.ledger.is_muted("alice").await.unwrap());
    assert!(h.ledger.is_muted("bob").await.unwrap());
    assert!(h.expiry.pending_live_expiries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_history_and_counts() {
    let h = Harness::plain().await;
    h.issue("alice", PunishmentType::Ban, PERMANENT_END, "Permanent")
        .await;
    h.clock.advance_secs(1);
    h.issue("alice", PunishmentType::Mute, NOW + TEN_MINUTES, "10m")
        .await;
    h.clock.advance_secs(1);
    h.issue("alice", PunishmentType::Mute, NOW + TEN_MINUTES, "10m")
        .await;

    assert_eq!(h.ledger.history_count("alice").await.unwrap(), 3);
    let page = h.ledger.history("alice", 2, 0).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].punishment_type, PunishmentType::Mute);
    assert!(page[0].issued_at > page[1].issued_at);

    let mutes = h
        .ledger
        .history_by_type("alice", PunishmentType::Mute, 10, 0)
        .await
        .unwrap();
    assert_eq!(mutes.len(), 2);

    let counts = h.ledger.punishment_counts("alice").await.unwrap();
    assert_eq!(counts.len(), 6);
    assert_eq!(counts[&PunishmentType::Mute], 2);
    assert_eq!(counts[&PunishmentType::Ban], 1);
    assert_eq!(counts[&PunishmentType::Warn], 0);

    assert_eq!(h.ledger.history_by_address("10.0.0.1", 10, 0).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_address_lookup_requires_by_address() {
    let h = Harness::plain().await;
    h.issue("alice", PunishmentType::Ban, PERMANENT_END, "Permanent")
        .await;
    assert!(
        h.ledger
            .latest_active_by_address("10.0.0.1", PunishmentType::Ban)
            .await
            .unwrap()
            .is_none()
    );

    let mut input = issue_input("bob", PunishmentType::Ban, PERMANENT_END, "Permanent");
    input.by_address = true;
    let record_id = h.ledger.issue_punishment(input).await.unwrap();
    let found = h
        .ledger
        .latest_active_by_address("10.0.0.1", PunishmentType::Ban)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, record_id);
}

#[tokio::test]
async fn test_issue_rejects_invalid_input() {
    let h = Harness::plain().await;
    let mut input = issue_input("", PunishmentType::Ban, PERMANENT_END, "");
    let err = h.ledger.issue_punishment(input.clone()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    input.subject_id = "alice".to_string();
    input.issuer = String::new();
    let err = h.ledger.issue_punishment(input).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert_eq!(h.ledger.history_count("alice").await.unwrap(), 0);
}
