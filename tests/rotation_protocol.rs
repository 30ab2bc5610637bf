//! End-to-end tests of the rotation engine over an in-memory store and a
//! fake HSM.

mod common;

use chrono::Duration;
use std::sync::atomic::Ordering;

use common::{harness, harness_with, test_policy, CSR_PEM};
use lapsvault::domain::{MachineId, PasswordStatus, SHARE_LINK_ACTOR_SUFFIX};
use lapsvault::rotation::{CheckinOutcome, PasswordLookup, RotationError};
use lapsvault::secrets::SecretString;

fn token_of(outcome: CheckinOutcome) -> String {
    match outcome {
        CheckinOutcome::NeedsUpdate { session_token } => session_token,
        CheckinOutcome::Current => panic!("expected NeedsUpdate"),
    }
}

#[tokio::test]
async fn test_first_rotation_round_applies_password() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;

    let token = token_of(h.engine.checkin(&m1, "pc-01", "SN-01").await.unwrap());
    assert_eq!(token.len(), lapsvault::rotation::TOKEN_LENGTH);

    let password_id =
        h.engine.submit_secret(&m1, &token, &SecretString::new("Sw0rd!")).await.unwrap();
    let pending = h.store.get_password(&password_id).await.unwrap().unwrap();
    assert!(!pending.applied);
    assert_eq!(pending.status, PasswordStatus::Unseen);
    assert_ne!(pending.ciphertext, "Sw0rd!");
    assert!(h.engine.has_update_session(&m1).await);

    let outcome = h.engine.confirm_secret(&m1, &token, "ok").await.unwrap();
    assert!(outcome.applied);
    assert!(!h.engine.has_update_session(&m1).await);

    let latest = h.store.latest_applied_password(&m1).await.unwrap().unwrap();
    assert_eq!(latest.id, password_id);
    assert!(latest.applied);
    assert_eq!(latest.expires_at, latest.received_at + h.policy.password_validity());

    let machine = h.store.get_machine(&m1).await.unwrap().unwrap();
    assert!(machine.enroll_success);

    assert_eq!(h.engine.checkin(&m1, "pc-01", "SN-01").await.unwrap(), CheckinOutcome::Current);
}

#[tokio::test]
async fn test_second_checkin_replaces_update_session() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;

    let first = token_of(h.engine.checkin(&m1, "pc-01", "SN-01").await.unwrap());
    let second = token_of(h.engine.checkin(&m1, "pc-01", "SN-01").await.unwrap());
    assert_ne!(first, second);

    let err = h.engine.submit_secret(&m1, &first, &"pw".into()).await.unwrap_err();
    assert!(matches!(err, RotationError::SessionMismatch { .. }));
    assert!(h.engine.submit_secret(&m1, &second, &"pw".into()).await.is_ok());
}

#[tokio::test]
async fn test_mismatched_token_mutates_nothing() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;
    let encrypts_before = h.hsm.encrypts.load(Ordering::SeqCst);

    // no session at all
    let err = h.engine.submit_secret(&m1, "bogus", &"pw".into()).await.unwrap_err();
    assert_eq!(err.kind(), "session_mismatch");

    let token = token_of(h.engine.checkin(&m1, "pc-01", "SN-01").await.unwrap());
    let err = h.engine.submit_secret(&m1, "bogus", &"pw".into()).await.unwrap_err();
    assert_eq!(err.kind(), "session_mismatch");
    let err = h.engine.confirm_secret(&m1, "bogus", "ok").await.unwrap_err();
    assert_eq!(err.kind(), "session_mismatch");

    assert!(h.store.list_passwords(&m1).await.unwrap().is_empty());
    assert_eq!(h.hsm.encrypts.load(Ordering::SeqCst), encrypts_before);
    assert!(h.engine.has_update_session(&m1).await);
    assert!(h.engine.submit_secret(&m1, &token, &"pw".into()).await.is_ok());
}

#[tokio::test]
async fn test_failed_device_report_ends_session_without_applying() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;

    let token = token_of(h.engine.checkin(&m1, "pc-01", "SN-01").await.unwrap());
    let password_id = h.engine.submit_secret(&m1, &token, &"pw".into()).await.unwrap();
    let report = "Failed to set password: access denied";
    let outcome = h.engine.confirm_secret(&m1, &token, report).await.unwrap();

    assert!(!outcome.applied);
    assert!(!h.engine.has_update_session(&m1).await);
    assert!(!h.store.get_password(&password_id).await.unwrap().unwrap().applied);
    assert!(h.store.latest_applied_password(&m1).await.unwrap().is_none());

    let next = h.engine.checkin(&m1, "pc-01", "SN-01").await.unwrap();
    assert!(matches!(next, CheckinOutcome::NeedsUpdate { .. }));
}

#[tokio::test]
async fn test_confirm_without_pending_password_keeps_session() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;
    let token = token_of(h.engine.checkin(&m1, "pc-01", "SN-01").await.unwrap());

    let err = h.engine.confirm_secret(&m1, &token, "ok").await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
    assert!(h.engine.has_update_session(&m1).await);
}

#[tokio::test]
async fn test_confirm_never_applies_a_password_from_an_earlier_round() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;

    let first = token_of(h.engine.checkin(&m1, "pc-01", "SN-01").await.unwrap());
    let failed_id = h.engine.submit_secret(&m1, &first, &"never-installed".into()).await.unwrap();
    let outcome = h.engine.confirm_secret(&m1, &first, "Failed to set password").await.unwrap();
    assert!(!outcome.applied);

    let second = token_of(h.engine.checkin(&m1, "pc-01", "SN-01").await.unwrap());
    let err = h.engine.confirm_secret(&m1, &second, "ok").await.unwrap_err();

    assert_eq!(err.kind(), "not_found");
    assert!(h.engine.has_update_session(&m1).await);
    assert!(!h.store.get_password(&failed_id).await.unwrap().unwrap().applied);
    assert!(h.store.latest_applied_password(&m1).await.unwrap().is_none());

    let current_id = h.engine.submit_secret(&m1, &second, &"Sw0rd!".into()).await.unwrap();
    assert!(h.engine.confirm_secret(&m1, &second, "ok").await.unwrap().applied);
    let latest = h.store.latest_applied_password(&m1).await.unwrap().unwrap();
    assert_eq!(latest.id, current_id);
}

#[tokio::test]
async fn test_resubmit_in_same_round_confirms_the_latest_submission() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;

    let token = token_of(h.engine.checkin(&m1, "pc-01", "SN-01").await.unwrap());
    let earlier = h.engine.submit_secret(&m1, &token, &"first".into()).await.unwrap();
    let later = h.engine.submit_secret(&m1, &token, &"second".into()).await.unwrap();
    h.engine.confirm_secret(&m1, &token, "ok").await.unwrap();

    assert!(!h.store.get_password(&earlier).await.unwrap().unwrap().applied);
    assert!(h.store.get_password(&later).await.unwrap().unwrap().applied);
}

#[tokio::test]
async fn test_disabled_machine_never_gets_an_update_session() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;
    h.rotate(&m1, "Sw0rd!").await;

    h.engine.disable_machine(&m1).await.unwrap();

    let err = h.engine.checkin(&m1, "pc-01", "SN-01").await.unwrap_err();
    assert_eq!(err, RotationError::machine_disabled(&m1));
    assert!(!h.engine.has_update_session(&m1).await);
    assert!(h.store.latest_applied_password(&m1).await.unwrap().is_none());

    let err = h.engine.disclose(&PasswordLookup::Machine(m1.clone()), "alice").await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn test_disabling_drops_open_round() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;
    let token = token_of(h.engine.checkin(&m1, "pc-01", "SN-01").await.unwrap());

    h.engine.disable_machine(&m1).await.unwrap();

    let err = h.engine.submit_secret(&m1, &token, &"pw".into()).await.unwrap_err();
    assert_eq!(err.kind(), "session_mismatch");
    assert!(h.engine.disable_machine(&MachineId::new()).await.is_err());
}

#[tokio::test]
async fn test_budget_renewal_at_threshold_before_decrypt() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;
    h.rotate(&m1, "Sw0rd!").await;

    {
        let mut session = h.engine.hsm().lock().await;
        while session.uses() < h.policy.max_uses - 1 {
            session.encrypt(&"filler".into()).await.unwrap();
        }
    }
    let logins_before = h.hsm.logins.load(Ordering::SeqCst);

    let disclosure =
        h.engine.disclose(&PasswordLookup::Machine(m1.clone()), "alice").await.unwrap();

    assert_eq!(disclosure.password.expose_secret(), "Sw0rd!");
    assert_eq!(h.hsm.logins.load(Ordering::SeqCst), logins_before + 1);
    assert_eq!(h.hsm_uses().await, 1);
}

#[tokio::test]
async fn test_failed_renewal_blocks_hsm_call_but_keeps_audit_entry() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;
    h.rotate(&m1, "Sw0rd!").await;

    {
        let mut session = h.engine.hsm().lock().await;
        while session.uses() < h.policy.max_uses - 1 {
            session.encrypt(&"filler".into()).await.unwrap();
        }
    }
    h.hsm.reject_logins.store(true, Ordering::SeqCst);
    let decrypts_before = h.hsm.decrypts.load(Ordering::SeqCst);

    let err = h.engine.disclose(&PasswordLookup::Machine(m1.clone()), "alice").await.unwrap_err();

    assert_eq!(err, RotationError::BudgetExhausted);
    assert_eq!(h.hsm.decrypts.load(Ordering::SeqCst), decrypts_before);
    assert!(h.hsm_uses().await <= h.policy.max_uses - 1);

    let log = h.engine.access_log().await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].entry.operator, "alice");

    let latest = h.store.latest_applied_password(&m1).await.unwrap().unwrap();
    assert_eq!(latest.status, PasswordStatus::Unseen);
}

#[tokio::test]
async fn test_budget_exhaustion_aborts_submit_without_state() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;
    let token = token_of(h.engine.checkin(&m1, "pc-01", "SN-01").await.unwrap());

    {
        let mut session = h.engine.hsm().lock().await;
        while session.uses() < h.policy.max_uses - 1 {
            session.decrypt("fake:v1:x").await.unwrap();
        }
    }
    h.hsm.reject_logins.store(true, Ordering::SeqCst);

    let err = h.engine.submit_secret(&m1, &token, &"pw".into()).await.unwrap_err();
    assert_eq!(err, RotationError::BudgetExhausted);
    assert!(h.store.list_passwords(&m1).await.unwrap().is_empty());
    assert!(h.engine.has_update_session(&m1).await);
}

#[tokio::test]
async fn test_decrypt_failure_is_audited_and_discloses_nothing() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;
    let password_id = h.rotate(&m1, "Sw0rd!").await;

    h.hsm.fail_data_calls.store(true, Ordering::SeqCst);
    let err =
        h.engine.disclose(&PasswordLookup::Password(password_id.clone()), "bob").await.unwrap_err();

    assert_eq!(err.kind(), "decryption_failed");
    let log = h.engine.access_log().await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].entry.password_id, password_id);
    assert_eq!(log[0].hostname, "host");

    let record = h.store.get_password(&password_id).await.unwrap().unwrap();
    assert_eq!(record.status, PasswordStatus::Unseen);
}

#[tokio::test]
async fn test_disclosure_marks_seen_and_shortens_expiry() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;
    let password_id = h.rotate(&m1, "Sw0rd!").await;

    let disclosure =
        h.engine.disclose(&PasswordLookup::Machine(m1.clone()), "alice").await.unwrap();
    assert_eq!(disclosure.password_id, password_id);
    assert_eq!(disclosure.expires_at, h.now() + Duration::hours(1));

    let record = h.store.get_password(&password_id).await.unwrap().unwrap();
    assert_eq!(record.status, PasswordStatus::Seen);
    assert_eq!(record.expires_at, disclosure.expires_at);

    // a later disclosure never pushes expiry back out
    h.clock.advance(Duration::minutes(30));
    let again = h.engine.disclose(&PasswordLookup::Machine(m1.clone()), "alice").await.unwrap();
    assert_eq!(again.expires_at, disclosure.expires_at);

    h.clock.advance(Duration::minutes(31));
    let outcome = h.engine.checkin(&m1, "host", "serial").await.unwrap();
    assert!(matches!(outcome, CheckinOutcome::NeedsUpdate { .. }));
    let record = h.store.get_password(&password_id).await.unwrap().unwrap();
    assert_eq!(record.status, PasswordStatus::Expired);
}

#[tokio::test]
async fn test_expire_now_only_moves_expiry_earlier() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;
    let password_id = h.rotate(&m1, "Sw0rd!").await;

    let summary =
        h.engine.expire_now(&PasswordLookup::Password(password_id.clone())).await.unwrap();
    assert_eq!(summary.expires_at, h.now());
    assert_eq!(summary.status, PasswordStatus::Expired);

    h.clock.advance(Duration::hours(2));
    let summary =
        h.engine.expire_now(&PasswordLookup::Password(password_id.clone())).await.unwrap();
    assert!(summary.expires_at < h.now());

    let err = h.engine.expire_now(&PasswordLookup::Password(Default::default())).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn test_retention_keeps_five_applied_and_all_unapplied() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;

    let mut applied = Vec::new();
    for round in 0..3 {
        applied.push(h.rotate(&m1, &format!("pw-{round}")).await);
        h.expire_latest(&m1).await;
        h.clock.advance(Duration::minutes(1));
    }

    let token = token_of(h.engine.checkin(&m1, "host", "serial").await.unwrap());
    let failed = h.engine.submit_secret(&m1, &token, &"lost".into()).await.unwrap();
    h.engine.confirm_secret(&m1, &token, "Failed to set password").await.unwrap();
    h.clock.advance(Duration::minutes(1));

    for round in 3..7 {
        applied.push(h.rotate(&m1, &format!("pw-{round}")).await);
        h.expire_latest(&m1).await;
        h.clock.advance(Duration::minutes(1));
    }

    let remaining = h.store.list_passwords(&m1).await.unwrap();
    let remaining_applied: Vec<_> =
        remaining.iter().filter(|p| p.applied).map(|p| p.id.clone()).collect();

    assert_eq!(remaining_applied.len(), 5);
    assert_eq!(remaining_applied, applied[2..].iter().rev().cloned().collect::<Vec<_>>());
    assert!(remaining.iter().any(|p| p.id == failed));
    assert_eq!(remaining.len(), 6);
}

#[tokio::test]
async fn test_share_link_window_and_gate_password() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;
    h.rotate(&m1, "Sw0rd!").await;

    let link = h.engine.issue_share_link(&m1, "gate".into(), "alice").await.unwrap();
    assert_eq!(link.expires_at, h.now() + Duration::minutes(15));
    assert_eq!(h.engine.access_log().await.unwrap().len(), 1);

    let status = h.engine.share_link_status(&link.token).await.unwrap();
    assert_eq!(status.machine_id, m1);
    assert_eq!(status.expires_at, link.expires_at);

    let err = h.engine.redeem_share_link(&link.token, &"wrong".into()).await.unwrap_err();
    assert_eq!(err, RotationError::WrongPassword);

    h.clock.advance(Duration::minutes(10));
    let disclosure = h.engine.redeem_share_link(&link.token, &"gate".into()).await.unwrap();
    assert_eq!(disclosure.password.expose_secret(), "Sw0rd!");

    let log = h.engine.access_log().await.unwrap();
    assert_eq!(log.len(), 2);
    assert!(log
        .iter()
        .any(|view| view.entry.operator == format!("alice{SHARE_LINK_ACTOR_SUFFIX}")));

    h.clock.advance(Duration::minutes(5));
    let err = h.engine.redeem_share_link(&link.token, &"gate".into()).await.unwrap_err();
    assert_eq!(err, RotationError::LinkExpired);
    assert_eq!(
        h.engine.share_link_status(&link.token).await.unwrap_err(),
        RotationError::LinkExpired
    );

    let err = h.engine.redeem_share_link("no-such-token", &"gate".into()).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn test_share_link_requires_applied_password() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;

    let err = h.engine.issue_share_link(&m1, "gate".into(), "alice").await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
    assert!(h.engine.access_log().await.unwrap().is_empty());

    h.rotate(&m1, "Sw0rd!").await;
    let err = h.engine.issue_share_link(&m1, SecretString::default(), "alice").await.unwrap_err();
    assert_eq!(err.kind(), "invalid_input");
}

#[tokio::test]
async fn test_disabling_machine_revokes_share_links() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;
    h.rotate(&m1, "Sw0rd!").await;
    let link = h.engine.issue_share_link(&m1, "gate".into(), "alice").await.unwrap();

    h.engine.disable_machine(&m1).await.unwrap();

    let err = h.engine.redeem_share_link(&link.token, &"gate".into()).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn test_failed_enrollment_leaves_no_machine() {
    let h = harness().await;
    h.hsm.fail_data_calls.store(true, Ordering::SeqCst);

    let err = h.engine.enroll(CSR_PEM, "pc-01", "SN-01").await.unwrap_err();
    assert_eq!(err.kind(), "signing_failed");
    assert!(h.store.list_active_machines().await.unwrap().is_empty());

    let err = h.engine.enroll("not a csr", "pc-01", "SN-01").await.unwrap_err();
    assert_eq!(err.kind(), "invalid_input");
}

#[tokio::test]
async fn test_enrollment_certificate_names_machine() {
    let h = harness().await;
    let enrollment = h.engine.enroll(CSR_PEM, "pc-01", "SN-01").await.unwrap();
    assert!(enrollment.certificate.contains(enrollment.machine_id.as_str()));

    let machine = h.store.get_machine(&enrollment.machine_id).await.unwrap().unwrap();
    assert!(!machine.enroll_success);
}

#[tokio::test]
async fn test_dev_mode_passwords_expire_after_a_second() {
    let mut policy = test_policy();
    policy.dev_mode = true;
    let h = harness_with(policy).await;
    let m1 = h.enroll("pc-01", "SN-01").await;
    h.rotate(&m1, "Sw0rd!").await;

    assert_eq!(h.engine.checkin(&m1, "host", "serial").await.unwrap(), CheckinOutcome::Current);
    h.clock.advance(Duration::seconds(1));
    let outcome = h.engine.checkin(&m1, "host", "serial").await.unwrap();
    assert!(matches!(outcome, CheckinOutcome::NeedsUpdate { .. }));
}

#[tokio::test]
async fn test_operator_views() {
    let h = harness().await;
    let m1 = h.enroll("pc-01", "SN-01").await;
    let m2 = h.enroll("pc-01", "SN-02").await;
    let m3 = h.enroll("pc-01", "SN-03").await;
    h.rotate(&m1, "Sw0rd!").await;
    h.engine.checkin(&m2, "pc-01", "SN-02").await.unwrap();

    let overview = h.engine.machine_overview().await.unwrap();
    assert_eq!(overview.len(), 3);
    let first = overview.iter().find(|o| o.machine.id == m1).unwrap();
    assert_eq!(first.password_status, Some(PasswordStatus::Unseen));
    let third = overview.iter().find(|o| o.machine.id == m3).unwrap();
    assert_eq!(third.password_status, None);

    let detail = h.engine.machine_detail(&m1).await.unwrap();
    assert_eq!(detail.passwords.len(), 1);
    assert_eq!(detail.checkins.len(), 1);

    let detail = h.engine.machine_detail(&m2).await.unwrap();
    assert_eq!(detail.possible_duplicates.len(), 1);

    // m3 never checked in
    assert_eq!(h.engine.disable_unenrolled_machines().await.unwrap(), 1);
    let overview = h.engine.machine_overview().await.unwrap();
    assert!(overview.iter().all(|o| o.machine.id != m3));
}
