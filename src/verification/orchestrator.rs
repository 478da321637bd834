//! Verification orchestrator
//!
//! Executes state-machine plans for every entry point: chat events, the
//! web callback and moderator commands. Each call reads the record, plans,
//! applies the mutation through the store's guarded operations, then runs
//! the side effects. Side effects never run under a store latch, and a
//! role-sync failure after a committed mutation is reported, not rolled
//! back.

use std::sync::Arc;

use crate::config::Settings;
use crate::email::{Mailer, VerificationEmail};
use crate::identity::{
    IdentityRecord, IdentityStore, Lookup, NewIdentity, StoreError, StoreStats, UniqueKey,
};
use crate::observability::{fingerprint, Logger};
use crate::platform::{ChatPlatform, Invoker, MemberRef, PlatformId};
use crate::policy::normalize_email;
use crate::roles::{RoleSync, SyncReport};

use super::errors::{VerifyError, VerifyResult};
use super::machine::{self, Effect, Erasure, Mutation};
use super::messages;

/// Result of an executed plan
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    /// Record before the operation
    pub previous: Option<IdentityRecord>,
    /// Record after the operation; `None` when erased or never created
    pub record: Option<IdentityRecord>,
    /// Role calls made as side effects
    pub roles: SyncReport,
    /// Whether the member's direct message was delivered
    pub notified: bool,
}

impl Outcome {
    /// The mutation committed but some role call failed
    pub fn roles_degraded(&self) -> bool {
        !self.roles.is_complete()
    }
}

/// Who a purge is looked up by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeTarget {
    Member(MemberRef),
    Email(String),
}

/// Mutation result plus the raw code when one was issued
struct Applied {
    /// No mutation was made; the previous record stands
    kept: bool,
    record: Option<IdentityRecord>,
    code: Option<String>,
}

/// The verification state machine bound to its collaborators
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<IdentityStore>,
    platform: Arc<dyn ChatPlatform>,
    mailer: Arc<dyn Mailer>,
    roles: RoleSync,
    settings: Arc<Settings>,
    logger: Logger,
}

impl Orchestrator {
    pub fn new(
        store: Arc<IdentityStore>,
        platform: Arc<dyn ChatPlatform>,
        mailer: Arc<dyn Mailer>,
        settings: Arc<Settings>,
        logger: Logger,
    ) -> Self {
        let roles = RoleSync::new(platform.clone(), logger.clone());
        Self {
            store,
            platform,
            mailer,
            roles,
            settings,
            logger,
        }
    }

    /// Same collaborators, different logger (e.g. carrying a correlation id)
    pub fn with_logger(&self, logger: Logger) -> Self {
        Self {
            roles: RoleSync::new(self.platform.clone(), logger.clone()),
            logger,
            ..self.clone()
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn platform_connected(&self) -> bool {
        self.platform.is_connected()
    }

    /// Whether the invoker may run moderator commands
    pub fn is_admin(&self, invoker: &Invoker) -> bool {
        self.platform
            .has_admin_capability(invoker, &self.settings.platform.admin_role)
    }

    // ==================
    // Chat entry points
    // ==================

    /// A member joined the community space
    ///
    /// Verified members get their recorded roles back; nobody else is
    /// touched in the store. Failures are logged here.
    pub async fn member_joined(&self, member: &MemberRef) -> VerifyResult<Outcome> {
        let result = self.reconcile_member(member).await;
        if let Err(err) = &result {
            self.log_failure("MEMBER_JOIN_FAILED", &member.id, err);
        }
        result
    }

    async fn reconcile_member(&self, member: &MemberRef) -> VerifyResult<Outcome> {
        let current = self.store.find(Lookup::PlatformId(&member.id))?;
        let plan = machine::on_member_joined(current.as_ref(), &self.settings);

        let restoring = current.as_ref().map(|r| r.is_verified()).unwrap_or(false);
        self.logger.info(
            if restoring {
                "MEMBER_REJOINED_VERIFIED"
            } else {
                "MEMBER_JOINED"
            },
            &[
                ("member", member.id.as_str()),
                ("display_name", &member.display_name),
            ],
        );

        let outcome = self
            .finish(&member.id, current, plan.effects, Applied::kept())
            .await?;
        if outcome.roles_degraded() {
            self.logger.warn(
                "ROLE_RECONCILE_INCOMPLETE",
                &[
                    ("member", member.id.as_str()),
                    ("failed", &outcome.roles.failed.len().to_string()),
                ],
            );
        }
        Ok(outcome)
    }

    /// A member sent the bot a direct message
    ///
    /// The reply (success or rejection) is delivered to the member here;
    /// the returned error is for logging only.
    pub async fn direct_message(&self, author: &MemberRef, text: &str) -> VerifyResult<Outcome> {
        self.logger
            .debug("DIRECT_MESSAGE_RECEIVED", &[("member", author.id.as_str())]);

        let result = self.submit_email(author, text).await;
        if let Err(err) = &result {
            let reply = match err {
                e if e.is_client_error() => e.to_string(),
                VerifyError::ExternalService(_) => messages::EMAIL_SEND_FAILED.to_string(),
                _ => messages::INTERNAL_ERROR.to_string(),
            };
            self.log_failure("EMAIL_SUBMISSION_REJECTED", &author.id, err);
            self.notify(&author.id, &reply).await;
        }
        result
    }

    async fn submit_email(&self, author: &MemberRef, text: &str) -> VerifyResult<Outcome> {
        let current = self.store.find(Lookup::PlatformId(&author.id))?;
        let plan = machine::on_email_submitted(current.as_ref(), text, &self.settings)?;

        if let Mutation::Create { email } = &plan.mutation {
            // Friendlier early answer; the store's constraint is what decides
            if self.store.find(Lookup::Email(email))?.is_some() {
                return Err(VerifyError::Conflict(messages::EMAIL_TAKEN.to_string()));
            }
        }

        let applied = self
            .apply(&author.id, &author.display_name, plan.mutation)
            .await
            .map_err(|e| match e {
                // Lost a race against our own earlier message
                StoreError::Conflict(UniqueKey::PlatformId) => {
                    VerifyError::Conflict(messages::ALREADY_IN_PROGRESS.to_string())
                }
                other => other.into(),
            })?;

        if let Some(record) = &applied.record {
            if applied.code.is_some() {
                self.logger.info(
                    "VERIFICATION_STARTED",
                    &[("member", author.id.as_str()), ("email", &record.email)],
                );
            }
        }

        self.finish(&author.id, current, plan.effects, applied)
            .await
    }

    // ==================
    // Web entry points
    // ==================

    /// Record behind a verification link, for rendering
    pub fn web_view(&self, code: &str) -> VerifyResult<IdentityRecord> {
        let code = code.trim();
        if code.is_empty() {
            return Err(VerifyError::Validation(
                "Verification code is required".to_string(),
            ));
        }
        self.store.find(Lookup::Code(code))?.ok_or_else(|| {
            VerifyError::NotFound("Invalid or expired verification code".to_string())
        })
    }

    /// Complete verification from the web form
    pub async fn complete_web(&self, code: &str, team: Option<&str>) -> VerifyResult<Outcome> {
        let code = code.trim();
        if code.is_empty() {
            return Err(VerifyError::Validation(
                "Code and team are required".to_string(),
            ));
        }
        // Malformed requests are refused before the code is looked up
        if self.settings.team_selection && team.map_or(true, |t| t.trim().is_empty()) {
            return Err(VerifyError::Validation(
                "Code and team are required".to_string(),
            ));
        }

        let record = self
            .store
            .find(Lookup::Code(code))?
            .ok_or_else(|| VerifyError::NotFound("Invalid verification code".to_string()))?;
        let plan = machine::on_web_completion(&record, team, &self.settings)?;

        let id = record.platform_id.clone();
        let applied = self
            .apply(&id, &record.display_name, plan.mutation)
            .await
            .map_err(|e| match e {
                StoreError::StateMismatch { .. } => {
                    VerifyError::Conflict("User already verified".to_string())
                }
                StoreError::NotFound | StoreError::Stale(_) => {
                    VerifyError::NotFound("Invalid verification code".to_string())
                }
                other => other.into(),
            })?;

        let code_fp = fingerprint(code);
        let team_name = applied
            .record
            .as_ref()
            .and_then(|r| r.team())
            .unwrap_or("")
            .to_string();
        self.logger.info(
            "VERIFICATION_COMPLETED",
            &[
                ("member", id.as_str()),
                ("code_fp", &code_fp),
                ("team", &team_name),
            ],
        );

        let outcome = self
            .finish(&id, Some(record), plan.effects, applied)
            .await?;
        if outcome.roles_degraded() {
            self.logger.warn(
                "VERIFIED_WITHOUT_ROLES",
                &[("member", id.as_str()), ("code_fp", &code_fp)],
            );
        }
        Ok(outcome)
    }

    // ==================
    // Moderator operations
    // ==================

    /// Create or replace a record directly in `Verified`
    pub async fn manual_verify(
        &self,
        target: &MemberRef,
        email: &str,
        team: Option<&str>,
    ) -> VerifyResult<Outcome> {
        let mention = target.id.mention();
        let current = self.store.find(Lookup::PlatformId(&target.id))?;
        let plan =
            machine::on_manual_verify(current.as_ref(), &mention, email, team, &self.settings)?;

        let taken = || {
            VerifyError::Conflict(
                "❌ This email address is already registered to another user.".to_string(),
            )
        };
        if let Mutation::ReplaceVerified { email, .. } = &plan.mutation {
            if let Some(owner) = self.store.find(Lookup::Email(email))? {
                if owner.platform_id != target.id {
                    return Err(taken());
                }
            }
        }

        let applied = self
            .apply(&target.id, &target.display_name, plan.mutation)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(UniqueKey::Email) => taken(),
                other => race_lost(other, &mention),
            })?;
        self.logger.info(
            "MANUALLY_VERIFIED",
            &[("member", target.id.as_str())],
        );

        self.finish(&target.id, current, plan.effects, applied)
            .await
    }

    /// Move a verified member to another team
    pub async fn change_team(&self, target: &MemberRef, team: &str) -> VerifyResult<Outcome> {
        let mention = target.id.mention();
        let current = self.store.find(Lookup::PlatformId(&target.id))?;
        let plan = machine::on_change_team(current.as_ref(), &mention, team, &self.settings)?;

        let applied = self
            .apply(&target.id, &target.display_name, plan.mutation)
            .await
            .map_err(|e| race_lost(e, &mention))?;
        self.logger.info(
            "TEAM_CHANGED",
            &[("member", target.id.as_str()), ("team", team.trim())],
        );

        self.finish(&target.id, current, plan.effects, applied)
            .await
    }

    /// Revoke a verified member's access
    pub async fn restrict(
        &self,
        target: &MemberRef,
        reason: Option<&str>,
    ) -> VerifyResult<Outcome> {
        let mention = target.id.mention();
        let current = self.store.find(Lookup::PlatformId(&target.id))?;
        let plan = machine::on_restrict(current.as_ref(), &mention, reason, &self.settings)?;

        let applied = self
            .apply(&target.id, &target.display_name, plan.mutation)
            .await
            .map_err(|e| race_lost(e, &mention))?;
        self.logger
            .info("MEMBER_RESTRICTED", &[("member", target.id.as_str())]);

        self.finish(&target.id, current, plan.effects, applied)
            .await
    }

    /// Restore a restricted member to `Verified` with their recorded team
    pub async fn unrestrict(&self, target: &MemberRef) -> VerifyResult<Outcome> {
        let mention = target.id.mention();
        let current = self.store.find(Lookup::PlatformId(&target.id))?;
        let plan = machine::on_unrestrict(current.as_ref(), &mention, &self.settings)?;

        let applied = self
            .apply(&target.id, &target.display_name, plan.mutation)
            .await
            .map_err(|e| race_lost(e, &mention))?;
        self.logger
            .info("MEMBER_UNRESTRICTED", &[("member", target.id.as_str())]);

        self.finish(&target.id, current, plan.effects, applied)
            .await
    }

    /// Delete a member's record so they can start over
    pub async fn reset(&self, target: &MemberRef) -> VerifyResult<Outcome> {
        let record = self
            .store
            .find(Lookup::PlatformId(&target.id))?
            .ok_or_else(|| VerifyError::NotFound("❌ User not found in the database.".to_string()))?;
        self.erase(record, Erasure::Reset).await
    }

    /// Permanently erase a member's data, looked up by member or email
    pub async fn purge(&self, target: &PurgeTarget) -> VerifyResult<Outcome> {
        let (found, kind, identifier) = match target {
            PurgeTarget::Member(member) => (
                self.store.find(Lookup::PlatformId(&member.id))?,
                "user",
                member.display_name.clone(),
            ),
            PurgeTarget::Email(email) => {
                let email = normalize_email(email);
                (self.store.find(Lookup::Email(&email))?, "email", email)
            }
        };
        let record = found.ok_or_else(|| {
            VerifyError::NotFound(format!("❌ No user found with {}: `{}`", kind, identifier))
        })?;
        self.erase(record, Erasure::Purge).await
    }

    async fn erase(&self, record: IdentityRecord, erasure: Erasure) -> VerifyResult<Outcome> {
        let plan = machine::on_erase(&record, erasure, &self.settings);
        let id = record.platform_id.clone();

        let applied = self
            .apply(&id, &record.display_name, plan.mutation)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => {
                    VerifyError::NotFound(format!("❌ {} was already removed.", id.mention()))
                }
                other => other.into(),
            })?;
        self.logger.info(
            match erasure {
                Erasure::Reset => "MEMBER_RESET",
                Erasure::Purge => "MEMBER_PURGED",
            },
            &[("member", id.as_str())],
        );

        self.finish(&id, Some(record), plan.effects, applied)
            .await
    }

    /// Record counts by state
    pub fn stats(&self) -> VerifyResult<StoreStats> {
        Ok(self.store.stats()?)
    }

    /// Every record, most recent first
    pub fn list(&self) -> VerifyResult<Vec<IdentityRecord>> {
        Ok(self.store.list_all()?)
    }

    /// Approved email domains
    pub fn domains(&self) -> &[String] {
        &self.settings.approved_domains
    }

    // ==================
    // Plan execution
    // ==================

    /// Apply a mutation on the blocking pool
    async fn apply(
        &self,
        id: &PlatformId,
        display_name: &str,
        mutation: Mutation,
    ) -> Result<Applied, StoreError> {
        if matches!(mutation, Mutation::Keep) {
            return Ok(Applied::kept());
        }
        let id = id.clone();
        let display_name = display_name.to_string();
        self.blocking(move |store| apply_mutation(store, &id, &display_name, mutation))
            .await
    }

    /// Run a store call off the runtime workers; journal I/O may fsync or compact
    async fn blocking<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: FnOnce(&IdentityStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || call(&store))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Run effects in order after the mutation committed
    async fn finish(
        &self,
        id: &PlatformId,
        previous: Option<IdentityRecord>,
        effects: Vec<Effect>,
        applied: Applied,
    ) -> VerifyResult<Outcome> {
        let Applied { kept, record, code } = applied;
        let mut outcome = Outcome {
            record: if kept {
                previous.clone()
            } else {
                record.clone()
            },
            previous,
            ..Default::default()
        };

        for effect in effects {
            match effect {
                Effect::SendVerificationEmail => {
                    let (Some(record), Some(code)) = (record.as_ref(), code.as_deref()) else {
                        continue;
                    };
                    self.send_verification_email(record, code).await?;
                }
                Effect::GrantRoles(roles) => {
                    outcome.roles.merge(self.roles.grant_all(id, &roles).await);
                }
                Effect::RevokeRoles(roles) => {
                    outcome.roles.merge(self.roles.revoke_all(id, &roles).await);
                }
                Effect::SwapTeamRole { old, new } => {
                    outcome
                        .roles
                        .merge(self.roles.swap(id, old.as_ref(), &new).await);
                }
                Effect::Notify(text) => {
                    outcome.notified = self.notify(id, &text).await;
                }
            }
        }

        Ok(outcome)
    }

    /// Mail the code; on failure retire the `Pending` record so the member can retry
    async fn send_verification_email(
        &self,
        record: &IdentityRecord,
        code: &str,
    ) -> VerifyResult<()> {
        let outgoing = VerificationEmail::render(&self.settings, &record.display_name, code)
            .to(record.email.as_str());

        let Err(err) = self.mailer.send(&outgoing).await else {
            self.logger.info(
                "VERIFICATION_EMAIL_SENT",
                &[
                    ("member", record.platform_id.as_str()),
                    ("code_fp", &fingerprint(code)),
                ],
            );
            return Ok(());
        };

        self.logger.error(
            "VERIFICATION_EMAIL_FAILED",
            &[
                ("member", record.platform_id.as_str()),
                ("error", &err.to_string()),
            ],
        );
        let id = record.platform_id.clone();
        let digest = record.code_digest.clone();
        if let Err(discard) = self
            .blocking(move |store| store.discard_pending(&id, &digest))
            .await
        {
            self.logger.error(
                "PENDING_DISCARD_FAILED",
                &[
                    ("member", record.platform_id.as_str()),
                    ("error", &discard.to_string()),
                ],
            );
        }
        Err(err.into())
    }

    /// Best-effort direct message; failures are logged
    async fn notify(&self, id: &PlatformId, text: &str) -> bool {
        match self.platform.send_direct_message(id, text).await {
            Ok(()) => true,
            Err(e) => {
                self.logger.warn(
                    "DIRECT_MESSAGE_FAILED",
                    &[("member", id.as_str()), ("error", &e.to_string())],
                );
                false
            }
        }
    }

    fn log_failure(&self, event: &str, id: &PlatformId, err: &VerifyError) {
        let fields = [
            ("member", id.as_str()),
            ("code", err.code()),
            ("error", &err.to_string()),
        ];
        if err.is_client_error() {
            self.logger.debug(event, &fields);
        } else {
            self.logger.error(event, &fields);
        }
    }
}

impl Applied {
    fn kept() -> Self {
        Self {
            kept: true,
            record: None,
            code: None,
        }
    }

    fn changed(record: Option<IdentityRecord>) -> Self {
        Self {
            kept: false,
            record,
            code: None,
        }
    }
}

fn apply_mutation(
    store: &IdentityStore,
    id: &PlatformId,
    display_name: &str,
    mutation: Mutation,
) -> Result<Applied, StoreError> {
    match mutation {
        Mutation::Keep => Ok(Applied::kept()),
        Mutation::Create { email } => {
            let issued = store.create(NewIdentity::new(id.clone(), display_name, email))?;
            Ok(Applied {
                kept: false,
                record: Some(issued.record),
                code: Some(issued.code),
            })
        }
        Mutation::Transition(change) => Ok(Applied::changed(Some(store.transition(id, change)?))),
        Mutation::ReplaceVerified { email, team } => {
            let replaced =
                store.replace_verified(NewIdentity::new(id.clone(), display_name, email), team)?;
            Ok(Applied::changed(Some(replaced.record)))
        }
        Mutation::Delete => {
            store.delete(id)?;
            Ok(Applied::changed(None))
        }
    }
}

/// Map a store failure during a moderator command
fn race_lost(err: StoreError, mention: &str) -> VerifyError {
    match err {
        StoreError::NotFound | StoreError::StateMismatch { .. } | StoreError::Stale(_) => {
            VerifyError::Conflict(format!(
                "❌ {} changed while this command ran. Please try again.",
                mention
            ))
        }
        other => other.into(),
    }
}
