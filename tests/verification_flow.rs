//! Verification Lifecycle Tests
//!
//! Drives the orchestrator the way the three entry points do (chat events,
//! web completion, moderator operations) against the recording platform
//! and the mock mailer.

use std::sync::Arc;

use gatekeeper::config::Settings;
use gatekeeper::email::MockMailer;
use gatekeeper::identity::{IdentityStore, Lookup, VerificationState};
use gatekeeper::observability::Logger;
use gatekeeper::platform::{MemberRef, RecordingPlatform, RoleId};
use gatekeeper::verification::{messages, Orchestrator, PurgeTarget, VerifyError};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

struct World {
    orchestrator: Orchestrator,
    store: Arc<IdentityStore>,
    platform: Arc<RecordingPlatform>,
    mailer: Arc<MockMailer>,
    _dir: TempDir,
}

fn world(team_selection: bool) -> World {
    let dir = TempDir::new().unwrap();
    let settings = Settings::from_json(&format!(
        r#"{{
            "platform": {{ "admin_role": "mods", "members_role": "members" }},
            "email": {{ "smtp_host": "smtp.acme.com", "from_address": "bot@acme.com" }},
            "server": {{ "base_url": "https://gate.acme.com" }},
            "features": {{ "enable_team_selection": {} }},
            "approved_domains": ["acme.com"],
            "teams": {{ "engineering": "r-eng", "design": "r-des" }}
        }}"#,
        team_selection
    ))
    .unwrap();

    let store = Arc::new(IdentityStore::open(dir.path()).unwrap());
    let platform = Arc::new(RecordingPlatform::new());
    let mailer = Arc::new(MockMailer::new());
    let orchestrator = Orchestrator::new(
        store.clone(),
        platform.clone(),
        mailer.clone(),
        Arc::new(settings),
        Logger::disabled(),
    );
    World {
        orchestrator,
        store,
        platform,
        mailer,
        _dir: dir,
    }
}

fn alice() -> MemberRef {
    MemberRef::new("100", "alice")
}

/// The code embedded in the most recent verification link
fn last_code(mailer: &MockMailer) -> String {
    let email = mailer.sent().pop().expect("no email sent");
    let start = email.text_body.find("code=").expect("no link") + "code=".len();
    email.text_body[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

async fn verify_alice(w: &World, team: &str) -> String {
    w.orchestrator
        .direct_message(&alice(), "alice@acme.com")
        .await
        .unwrap();
    let code = last_code(&w.mailer);
    w.orchestrator
        .complete_web(&code, Some(team))
        .await
        .unwrap();
    code
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_approved_email_creates_pending_record() {
    let w = world(true);
    w.orchestrator
        .direct_message(&alice(), "  Alice@ACME.com ")
        .await
        .unwrap();

    let record = w.store.get(Lookup::PlatformId(&alice().id)).unwrap();
    assert_eq!(record.state, VerificationState::Pending);
    assert_eq!(record.email, "alice@acme.com");

    let sent = w.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "alice@acme.com");
    assert!(sent[0]
        .text_body
        .contains("https://gate.acme.com/verify?code="));

    let reply = w.platform.last_message_to(&alice().id).unwrap();
    assert_eq!(reply, messages::email_sent("alice@acme.com", true));
}

#[tokio::test]
async fn test_unapproved_domain_is_rejected() {
    let w = world(true);
    let err = w
        .orchestrator
        .direct_message(&alice(), "alice@evil.com")
        .await
        .unwrap_err();

    assert!(matches!(err, VerifyError::Validation(_)));
    assert!(w.store.find(Lookup::PlatformId(&alice().id)).unwrap().is_none());
    assert_eq!(w.mailer.sent_count(), 0);
    assert_eq!(
        w.platform.last_message_to(&alice().id).unwrap(),
        messages::domain_not_approved("alice@evil.com")
    );
}

#[tokio::test]
async fn test_verified_member_dm_changes_nothing() {
    let w = world(true);
    verify_alice(&w, "engineering").await;
    let before = w.store.get(Lookup::PlatformId(&alice().id)).unwrap();

    let err = w
        .orchestrator
        .direct_message(&alice(), "someone-else@acme.com")
        .await
        .unwrap_err();

    assert!(matches!(err, VerifyError::Conflict(_)));
    assert_eq!(
        w.platform.last_message_to(&alice().id).unwrap(),
        messages::ALREADY_VERIFIED
    );
    assert_eq!(w.store.get(Lookup::PlatformId(&alice().id)).unwrap(), before);
    assert_eq!(w.mailer.sent_count(), 1);
}

#[tokio::test]
async fn test_web_completion_grants_roles_and_consumes_code() {
    let w = world(true);
    let code = verify_alice(&w, "design").await;

    let record = w.store.get(Lookup::PlatformId(&alice().id)).unwrap();
    assert_eq!(record.state, VerificationState::Verified);
    assert_eq!(record.team(), Some("design"));

    let roles = w.platform.roles_of(&alice().id);
    assert!(roles.contains(&RoleId::new("members")));
    assert!(roles.contains(&RoleId::new("r-des")));
    assert_eq!(
        w.platform.last_message_to(&alice().id).unwrap(),
        messages::verification_complete(Some("design"))
    );

    // resubmitting the consumed code, even with another team, fails
    let err = w
        .orchestrator
        .complete_web(&code, Some("engineering"))
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Conflict(_)));
    assert_eq!(
        w.store
            .get(Lookup::PlatformId(&alice().id))
            .unwrap()
            .team(),
        Some("design")
    );
}

#[tokio::test]
async fn test_unknown_code_is_not_found() {
    let w = world(true);
    assert!(matches!(
        w.orchestrator.web_view("deadbeef"),
        Err(VerifyError::NotFound(_))
    ));
    assert!(matches!(
        w.orchestrator.complete_web("deadbeef", Some("design")).await,
        Err(VerifyError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_completion_without_team_selection() {
    let w = world(false);
    w.orchestrator
        .direct_message(&alice(), "alice@acme.com")
        .await
        .unwrap();
    let code = last_code(&w.mailer);

    w.orchestrator.complete_web(&code, None).await.unwrap();

    let record = w.store.get(Lookup::PlatformId(&alice().id)).unwrap();
    assert_eq!(record.state, VerificationState::Verified);
    assert_eq!(record.team(), None);
    assert!(w.platform.roles_of(&alice().id).contains(&RoleId::new("members")));
}

#[tokio::test]
async fn test_restrict_unrestrict_round_trip() {
    let w = world(true);
    verify_alice(&w, "engineering").await;
    let verified = w.store.get(Lookup::PlatformId(&alice().id)).unwrap();

    w.orchestrator
        .restrict(&alice(), Some("spam"))
        .await
        .unwrap();
    let restricted = w.store.get(Lookup::PlatformId(&alice().id)).unwrap();
    assert_eq!(restricted.state, VerificationState::Restricted);
    assert_eq!(restricted.restriction_reason.as_deref(), Some("spam"));
    assert!(w.platform.roles_of(&alice().id).is_empty());

    // restricted members cannot restart verification
    let err = w
        .orchestrator
        .direct_message(&alice(), "alice2@acme.com")
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Conflict(_)));
    assert_eq!(
        w.platform.last_message_to(&alice().id).unwrap(),
        messages::RESTRICTED
    );

    w.orchestrator.unrestrict(&alice()).await.unwrap();
    let restored = w.store.get(Lookup::PlatformId(&alice().id)).unwrap();
    assert_eq!(restored.state, VerificationState::Verified);
    assert_eq!(restored.team(), Some("engineering"));
    assert_eq!(restored.code_digest, verified.code_digest);
    assert!(restored.restriction_reason.is_none());
    assert!(w.platform.roles_of(&alice().id).contains(&RoleId::new("r-eng")));
    assert_eq!(w.mailer.sent_count(), 1);
}

#[tokio::test]
async fn test_purge_erases_every_lookup() {
    let w = world(true);
    let code = verify_alice(&w, "engineering").await;

    let outcome = w
        .orchestrator
        .purge(&PurgeTarget::Member(alice()))
        .await
        .unwrap();
    assert!(outcome.record.is_none());
    assert_eq!(outcome.previous.unwrap().email, "alice@acme.com");

    assert!(w.store.find(Lookup::PlatformId(&alice().id)).unwrap().is_none());
    assert!(w.store.find(Lookup::Email("alice@acme.com")).unwrap().is_none());
    assert!(w.store.find(Lookup::Code(&code)).unwrap().is_none());
    assert!(w.platform.roles_of(&alice().id).is_empty());
    assert_eq!(
        w.platform.last_message_to(&alice().id).unwrap(),
        messages::PURGED
    );

    assert!(matches!(
        w.orchestrator.purge(&PurgeTarget::Member(alice())).await,
        Err(VerifyError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_reset_lets_member_start_over() {
    let w = world(true);
    verify_alice(&w, "engineering").await;

    w.orchestrator.reset(&alice()).await.unwrap();
    assert!(w.platform.roles_of(&alice().id).is_empty());

    w.orchestrator
        .direct_message(&alice(), "alice@acme.com")
        .await
        .unwrap();
    let record = w.store.get(Lookup::PlatformId(&alice().id)).unwrap();
    assert_eq!(record.state, VerificationState::Pending);
    assert_eq!(w.mailer.sent_count(), 2);
}

#[tokio::test]
async fn test_failed_role_sync_is_reconciled_on_rejoin() {
    let w = world(true);
    w.platform.fail_role(&RoleId::new("r-eng"));

    w.orchestrator
        .direct_message(&alice(), "alice@acme.com")
        .await
        .unwrap();
    let code = last_code(&w.mailer);
    let outcome = w
        .orchestrator
        .complete_web(&code, Some("engineering"))
        .await
        .unwrap();

    // committed, but degraded
    assert!(outcome.roles_degraded());
    assert_eq!(
        w.store.get(Lookup::PlatformId(&alice().id)).unwrap().state,
        VerificationState::Verified
    );
    assert!(!w.platform.roles_of(&alice().id).contains(&RoleId::new("r-eng")));

    w.platform.heal_role(&RoleId::new("r-eng"));
    w.platform.remove_member(&alice().id);
    let outcome = w.orchestrator.member_joined(&alice()).await.unwrap();

    assert!(!outcome.roles_degraded());
    let roles = w.platform.roles_of(&alice().id);
    assert!(roles.contains(&RoleId::new("members")));
    assert!(roles.contains(&RoleId::new("r-eng")));
}

#[tokio::test]
async fn test_concurrent_completion_and_restrict() {
    let w = world(true);
    w.orchestrator
        .direct_message(&alice(), "alice@acme.com")
        .await
        .unwrap();
    let code = last_code(&w.mailer);

    // either order is legal; the record must match whichever restrict saw
    let (completed, restricted) = tokio::join!(
        w.orchestrator.complete_web(&code, Some("design")),
        async {
            tokio::task::yield_now().await;
            w.orchestrator.restrict(&alice(), None).await
        }
    );

    let record = w.store.get(Lookup::PlatformId(&alice().id)).unwrap();
    match (completed, restricted) {
        (Ok(_), Ok(_)) => assert_eq!(record.state, VerificationState::Restricted),
        (Ok(_), Err(e)) => {
            assert!(e.is_client_error());
            assert_eq!(record.state, VerificationState::Verified);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_change_team_swaps_roles() {
    let w = world(true);
    verify_alice(&w, "engineering").await;

    let outcome = w
        .orchestrator
        .change_team(&alice(), "design")
        .await
        .unwrap();
    assert!(!outcome.roles_degraded());
    assert_eq!(outcome.record.unwrap().team(), Some("design"));

    let roles = w.platform.roles_of(&alice().id);
    assert!(roles.contains(&RoleId::new("r-des")));
    assert!(!roles.contains(&RoleId::new("r-eng")));
    assert!(roles.contains(&RoleId::new("members")));
    assert_eq!(
        w.store.get(Lookup::PlatformId(&alice().id)).unwrap().team(),
        Some("design")
    );

    // same team again is refused without touching roles
    assert!(matches!(
        w.orchestrator.change_team(&alice(), "design").await,
        Err(VerifyError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_change_team_with_stuck_old_role_is_degraded() {
    let w = world(true);
    verify_alice(&w, "engineering").await;
    w.platform.fail_role(&RoleId::new("r-eng"));

    let outcome = w
        .orchestrator
        .change_team(&alice(), "design")
        .await
        .unwrap();

    // committed and the new role granted; the old one is reported
    assert!(outcome.roles_degraded());
    assert_eq!(outcome.roles.failed.len(), 1);
    assert_eq!(outcome.roles.failed[0].role, RoleId::new("r-eng"));
    assert_eq!(
        w.store.get(Lookup::PlatformId(&alice().id)).unwrap().team(),
        Some("design")
    );
    let roles = w.platform.roles_of(&alice().id);
    assert!(roles.contains(&RoleId::new("r-des")));
    assert!(roles.contains(&RoleId::new("r-eng")));
}

#[tokio::test]
async fn test_manual_verify_races_web_completion() {
    let w = world(true);
    w.orchestrator
        .direct_message(&alice(), "alice@acme.com")
        .await
        .unwrap();
    let code = last_code(&w.mailer);

    let alice_ref = alice();
    let (completed, forced) = tokio::join!(
        w.orchestrator.complete_web(&code, Some("design")),
        w.orchestrator
            .manual_verify(&alice_ref, "alice@acme.com", Some("engineering"))
    );

    // exactly one wins; the loser gets a conflict and changes nothing
    let record = w.store.get(Lookup::PlatformId(&alice().id)).unwrap();
    assert_eq!(record.state, VerificationState::Verified);
    match (completed, forced) {
        (Ok(_), Err(e)) => {
            assert!(matches!(e, VerifyError::Conflict(_)), "{:?}", e);
            assert_eq!(record.team(), Some("design"));
        }
        (Err(e), Ok(_)) => {
            assert!(matches!(e, VerifyError::Conflict(_) | VerifyError::NotFound(_)), "{:?}", e);
            assert_eq!(record.team(), Some("engineering"));
            assert!(w.store.find(Lookup::Code(&code)).unwrap().is_none());
        }
        other => panic!("expected exactly one winner, got {:?}", other),
    }
    assert_eq!(w.store.stats().unwrap().total, 1);
}
