//! Warning escalation tests against an in-memory SQLite database.

#![allow(clippy::unwrap_used)]

mod common;

use common::{Harness, NOW, issue_input, level, revoke_input};
use sanction_common::{AppError, ExpirationMode, WarnLevelConfig};
use sanction_core::{AssociationLink, HookTrigger, LedgerEvent, RevokePunishmentInput, WarningTarget};
use sanction_db::entities::{PERMANENT_END, PunishmentType, SYSTEM_ACTOR, reasons};
use sanction_db::repositories::{LiveRepository, LiveTable};

const DAY: i64 = 24 * 60 * 60 * 1000;

async fn incremental(levels: Vec<WarnLevelConfig>) -> Harness {
    Harness::new(ExpirationMode::Incremental, levels).await
}

async fn unique(levels: Vec<WarnLevelConfig>) -> Harness {
    Harness::new(ExpirationMode::Unique, levels).await
}

#[tokio::test]
async fn test_levels_escalate_and_restart_at_one() {
    let h = unique(vec![level("1d"), level("2d"), level("permanent")]).await;

    let first = h.warn("alice").await;
    let step = h.ledger.get_active_warning("alice").await.unwrap().unwrap();
    assert_eq!(step.level, 1);
    assert_eq!(step.end_time, NOW + DAY);
    let record = h.ledger.get_by_id(&first).await.unwrap().unwrap();
    assert_eq!(record.warn_level, 1);
    assert_eq!(record.end_timestamp, NOW + DAY);
    assert_eq!(record.duration_label, "1d");

    h.clock.advance_secs(1);
    h.warn("alice").await;
    h.clock.advance_secs(1);
    let third = h.warn("alice").await;
    let step = h.ledger.get_active_warning("alice").await.unwrap().unwrap();
    assert_eq!(step.level, 3);
    assert_eq!(step.end_time, -1);
    let record = h.ledger.get_by_id(&third).await.unwrap().unwrap();
    assert_eq!(record.end_timestamp, PERMANENT_END);
    assert_eq!(record.duration_label, "Permanent");

    let removed = h
        .ledger
        .revoke_punishment(revoke_input("alice", PunishmentType::Warn, "cleared"))
        .await
        .unwrap();
    assert_eq!(removed, Some(third));
    assert!(h.ledger.get_active_warning("alice").await.unwrap().is_none());

    h.warn("alice").await;
    let step = h.ledger.get_active_warning("alice").await.unwrap().unwrap();
    assert_eq!(step.level, 1);
}

#[tokio::test]
async fn test_unconfigured_level_fails_without_writing() {
    let h = unique(vec![level("1d")]).await;
    let first = h.warn("alice").await;

    let err = h
        .ledger
        .issue_punishment(issue_input("alice", PunishmentType::Warn, PERMANENT_END, ""))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::WarnLevelNotConfigured(2)));

    assert_eq!(h.ledger.history_count("alice").await.unwrap(), 1);
    let step = h.ledger.get_active_warning("alice").await.unwrap().unwrap();
    assert_eq!(step.punishment_record_id, first);
    assert!(h.ledger.get_by_id(&first).await.unwrap().unwrap().active);
}

#[tokio::test]
async fn test_duration_override_replaces_level_expiration() {
    let h = unique(vec![level("1d")]).await;
    let record_id = h
        .issue("alice", PunishmentType::Warn, NOW + 7200 * 1000, "2h")
        .await;

    let record = h.ledger.get_by_id(&record_id).await.unwrap().unwrap();
    assert_eq!(record.end_timestamp, NOW + 7200 * 1000);
    assert_eq!(record.duration_label, "2h");
    let step = h.ledger.get_active_warning("alice").await.unwrap().unwrap();
    assert_eq!(step.end_time, NOW + 7200 * 1000);
}

#[tokio::test]
async fn test_unique_mode_supersedes_for_good() {
    let h = unique(vec![level("1d"), level("1d")]).await;
    let first = h.warn("alice").await;
    let mute = h
        .issue("alice", PunishmentType::Mute, NOW + DAY, "1d")
        .await;
    h.ledger
        .link_association(&first, PunishmentType::Mute, &mute)
        .await
        .unwrap();

    h.clock.advance_secs(1);
    h.warn("alice").await;

    for id in [&first, &mute] {
        let record = h.ledger.get_by_id(id).await.unwrap().unwrap();
        assert!(!record.active);
        assert_eq!(record.removed_by.as_deref(), Some("mod"));
        assert_eq!(
            record.removed_reason.as_deref(),
            Some(reasons::SUPERSEDED_BY_WARNING)
        );
    }
    assert!(!h.ledger.is_muted("alice").await.unwrap());
    assert!(
        h.ledger
            .get_active_warning_by_record_id(&first)
            .await
            .unwrap()
            .is_none()
    );

    h.ledger
        .revoke_punishment(revoke_input("alice", PunishmentType::Warn, ""))
        .await
        .unwrap();
    assert!(h.ledger.get_active_warning("alice").await.unwrap().is_none());
    assert!(!h.ledger.get_by_id(&first).await.unwrap().unwrap().active);
    assert!(
        h.ledger
            .all_active_and_paused_warnings("alice")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_pause_and_resume_carries_linked_mute() {
    let h = incremental(vec![level("200s"), level("1d")]).await;
    let first = h.warn("alice").await;
    let mute = h
        .issue("alice", PunishmentType::Mute, NOW + 200_000, "200s")
        .await;
    h.ledger
        .link_association(&first, PunishmentType::Mute, &mute)
        .await
        .unwrap();
    assert_eq!(
        h.ledger.associations().associations(&first).await.unwrap(),
        vec![AssociationLink::new(PunishmentType::Mute, mute.clone())]
    );

    h.clock.advance_millis(100_000);
    let second = h.warn("alice").await;

    let paused = h
        .ledger
        .get_active_warning_by_record_id(&first)
        .await
        .unwrap()
        .unwrap();
    assert!(paused.paused);
    assert_eq!(paused.remaining_on_pause, 100_000);
    for id in [&first, &mute] {
        let record = h.ledger.get_by_id(id).await.unwrap().unwrap();
        assert!(!record.active);
        assert_eq!(record.removed_reason.as_deref(), Some(reasons::PAUSED));
    }
    assert!(!h.ledger.is_muted("alice").await.unwrap());
    assert_eq!(
        h.ledger
            .all_active_and_paused_warnings("alice")
            .await
            .unwrap()
            .len(),
        2
    );

    h.clock.advance_millis(50_000);
    let resume_at = h.now();
    let removed = h
        .ledger
        .revoke_punishment(revoke_input("alice", PunishmentType::Warn, "appeal"))
        .await
        .unwrap();
    assert_eq!(removed, Some(second.clone()));

    let second_record = h.ledger.get_by_id(&second).await.unwrap().unwrap();
    assert!(!second_record.active);
    assert_eq!(second_record.removed_reason.as_deref(), Some("appeal"));

    let resumed = h.ledger.get_active_warning("alice").await.unwrap().unwrap();
    assert_eq!(resumed.punishment_record_id, first);
    assert!(!resumed.paused);
    assert_eq!(resumed.end_time, resume_at + 100_000);
    assert_eq!(resumed.remaining_on_pause, -1);

    for id in [&first, &mute] {
        let record = h.ledger.get_by_id(id).await.unwrap().unwrap();
        assert!(record.active);
        assert_eq!(record.end_timestamp, resume_at + 100_000);
        assert!(record.removed_reason.is_none());
        assert!(record.removed_by.is_none());
    }
    assert!(h.ledger.is_muted("alice").await.unwrap());
    let live = LiveRepository::new(h.db.connection())
        .find(LiveTable::Mute, "alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(live.record_id, mute);
    assert_eq!(live.end_time, resume_at + 100_000);
    assert!(
        h.timers
            .tickets()
            .await
            .iter()
            .any(|t| t.end_time == resume_at + 100_000)
    );

    let resumed_hooks: Vec<_> = h
        .hooks
        .invocations()
        .await
        .into_iter()
        .filter(|i| i.trigger == HookTrigger::Resumed)
        .collect();
    assert_eq!(resumed_hooks.len(), 2);
    assert!(resumed_hooks.iter().all(|i| i.actor == SYSTEM_ACTOR));
    assert_eq!(resumed_hooks[0].action_kind, PunishmentType::Mute);
    assert_eq!(resumed_hooks[1].action_kind, PunishmentType::Warn);
    assert_eq!(resumed_hooks[1].duration_label, "1m 40s");
}

#[tokio::test]
async fn test_resume_yields_to_newer_punishment_of_same_type() {
    let h = incremental(vec![level("1d"), level("1d")]).await;
    let first = h.warn("alice").await;
    let linked_mute = h
        .issue("alice", PunishmentType::Mute, NOW + DAY, "1d")
        .await;
    h.ledger
        .link_association(&first, PunishmentType::Mute, &linked_mute)
        .await
        .unwrap();

    h.warn("alice").await;
    let manual_mute = h
        .issue("alice", PunishmentType::Mute, NOW + 2 * DAY, "2d")
        .await;
    h.ledger
        .revoke_punishment(revoke_input("alice", PunishmentType::Warn, "appeal"))
        .await
        .unwrap();

    let resumed = h.ledger.get_active_warning("alice").await.unwrap().unwrap();
    assert_eq!(resumed.punishment_record_id, first);

    let linked = h.ledger.get_by_id(&linked_mute).await.unwrap().unwrap();
    assert!(!linked.active);
    assert_eq!(
        linked.removed_reason.as_deref(),
        Some(reasons::SUPERSEDED_BY_PUNISHMENT)
    );
    assert_eq!(
        h.ledger.active_record_ids(PunishmentType::Mute).await.unwrap(),
        vec![manual_mute.clone()]
    );
    let live = LiveRepository::new(h.db.connection())
        .find(LiveTable::Mute, "alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(live.record_id, manual_mute);
    assert_eq!(live.end_time, NOW + 2 * DAY);
    assert!(
        h.hooks
            .invocations()
            .await
            .iter()
            .all(|i| !(i.trigger == HookTrigger::Resumed && i.action_kind == PunishmentType::Mute))
    );
}

#[tokio::test]
async fn test_resume_label_rounds_up_sub_second_remainder() {
    let h = incremental(vec![level("200s"), level("1d")]).await;
    h.warn("alice").await;
    h.clock.advance_millis(199_600);
    h.warn("alice").await;
    h.ledger
        .revoke_punishment(revoke_input("alice", PunishmentType::Warn, "appeal"))
        .await
        .unwrap();

    let resumed = h
        .hooks
        .invocations()
        .await
        .into_iter()
        .find(|i| i.trigger == HookTrigger::Resumed)
        .unwrap();
    assert_eq!(resumed.duration_label, "1s");
}

#[tokio::test]
async fn test_removal_reason_reaches_dependents() {
    let h = unique(vec![level("1d")]).await;
    let warning = h.warn("alice").await;
    let mute = h
        .issue("alice", PunishmentType::Mute, NOW + DAY, "1d")
        .await;
    h.ledger
        .link_association(&warning, PunishmentType::Mute, &mute)
        .await
        .unwrap();

    h.ledger
        .revoke_punishment(revoke_input("alice", PunishmentType::Warn, "appeal accepted"))
        .await
        .unwrap();

    let record = h.ledger.get_by_id(&mute).await.unwrap().unwrap();
    assert!(!record.active);
    assert_eq!(record.removed_by.as_deref(), Some("mod"));
    assert_eq!(record.removed_reason.as_deref(), Some("appeal accepted"));
    assert!(!h.ledger.is_muted("alice").await.unwrap());

    let events = h.events.events().await;
    assert!(events.iter().any(|e| matches!(
        e,
        LedgerEvent::Deactivated { record_id, reason, .. }
            if *record_id == mute && reason == "appeal accepted"
    )));
}

#[tokio::test]
async fn test_blank_removal_reason_uses_default() {
    let h = unique(vec![level("1d")]).await;
    let warning = h.warn("alice").await;
    let ban = h
        .issue("alice", PunishmentType::Ban, PERMANENT_END, "Permanent")
        .await;
    h.ledger
        .link_association(&warning, PunishmentType::Ban, &ban)
        .await
        .unwrap();

    h.ledger
        .warnings()
        .remove_warning(WarningTarget::Current("alice".to_string()), "mod", Some("  "))
        .await
        .unwrap();

    let record = h.ledger.get_by_id(&ban).await.unwrap().unwrap();
    assert_eq!(
        record.removed_reason.as_deref(),
        Some(reasons::ASSOCIATED_WARNING_REMOVED)
    );
    assert!(!h.ledger.is_banned("alice").await.unwrap());
}

#[tokio::test]
async fn test_resume_follows_strict_stack() {
    let h = incremental(vec![level("1d"), level("1d"), level("1d")]).await;
    let first = h.warn("alice").await;
    h.clock.advance_secs(1);
    let second = h.warn("alice").await;
    h.clock.advance_secs(1);
    let third = h.warn("alice").await;

    // Removing a paused step while another runs resumes nothing.
    let removed = h
        .ledger
        .warnings()
        .remove_warning(WarningTarget::Record(first.clone()), "mod", None)
        .await
        .unwrap();
    assert_eq!(removed, Some(first.clone()));
    let running = h.ledger.get_active_warning("alice").await.unwrap().unwrap();
    assert_eq!(running.punishment_record_id, third);
    let first_record = h.ledger.get_by_id(&first).await.unwrap().unwrap();
    assert!(!first_record.active);
    assert_eq!(
        first_record.removed_reason.as_deref(),
        Some(reasons::ASSOCIATED_WARNING_REMOVED)
    );

    h.ledger
        .revoke_punishment(revoke_input("alice", PunishmentType::Warn, ""))
        .await
        .unwrap();
    let running = h.ledger.get_active_warning("alice").await.unwrap().unwrap();
    assert_eq!(running.punishment_record_id, second);
    assert_eq!(running.level, 2);

    // The next warning escalates from the resumed level.
    h.clock.advance_secs(1);
    h.warn("alice").await;
    let running = h.ledger.get_active_warning("alice").await.unwrap().unwrap();
    assert_eq!(running.level, 3);
}

#[tokio::test]
async fn test_revoke_warning_by_record_checks_subject() {
    let h = unique(vec![level("1d")]).await;
    let warning = h.warn("alice").await;

    let input = RevokePunishmentInput {
        record_id: Some(warning.clone()),
        ..revoke_input("bob", PunishmentType::Warn, "")
    };
    assert!(h.ledger.revoke_punishment(input).await.unwrap().is_none());
    assert!(h.ledger.get_active_warning("alice").await.unwrap().is_some());
}

#[tokio::test]
async fn test_due_warning_expires_and_resumes_predecessor() {
    let mut second_level = level("1h");
    second_level.on_expire = vec!["unmute {subject}".to_string()];
    let h = incremental(vec![level("1d"), second_level]).await;
    let first = h.warn("alice").await;
    let second = h.warn("alice").await;

    h.clock.advance_millis(60 * 60 * 1000);
    assert_eq!(h.ledger.warnings().expire_due_warnings().await.unwrap(), 1);
    assert_eq!(h.ledger.warnings().expire_due_warnings().await.unwrap(), 0);

    let record = h.ledger.get_by_id(&second).await.unwrap().unwrap();
    assert!(!record.active);
    assert_eq!(record.removed_by.as_deref(), Some(SYSTEM_ACTOR));
    assert_eq!(record.removed_reason.as_deref(), Some(reasons::EXPIRED));

    let running = h.ledger.get_active_warning("alice").await.unwrap().unwrap();
    assert_eq!(running.punishment_record_id, first);
    assert_eq!(running.end_time, h.now() + DAY);

    let hooks = h.hooks.invocations().await;
    let expired = hooks
        .iter()
        .find(|i| i.trigger == HookTrigger::Expired)
        .unwrap();
    assert!(expired.is_removal);
    assert_eq!(expired.actions, vec!["unmute {subject}".to_string()]);
    assert_eq!(expired.warning.as_ref().unwrap().level, 2);

    let events = h.events.events().await;
    assert!(events.iter().any(|e| matches!(
        e,
        LedgerEvent::ExpiryNotice { record_id, .. } if *record_id == second
    )));
}

#[tokio::test]
async fn test_issue_hook_carries_level_actions() {
    let mut first_level = level("1d");
    first_level.on_warn = vec!["mute {subject} 1h".to_string()];
    let h = unique(vec![first_level]).await;
    let record_id = h.warn("alice").await;

    let hooks = h.hooks.invocations().await;
    assert_eq!(hooks.len(), 1);
    let hook = &hooks[0];
    assert_eq!(hook.trigger, HookTrigger::Issued);
    assert_eq!(hook.actor, "mod");
    assert!(!hook.is_removal);
    assert_eq!(hook.actions, vec!["mute {subject} 1h".to_string()]);
    let context = hook.warning.as_ref().unwrap();
    assert_eq!(context.record_id, record_id);
    assert_eq!(context.level, 1);
    assert_eq!(context.start_time, NOW);
}
