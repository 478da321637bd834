//! Verification state machine
//!
//! Pure planning: given the record as last read (or its absence), the input
//! and the settings, decide the store mutation and the side effects that
//! follow it. Nothing here touches the store, the platform or the mailer;
//! the orchestrator executes plans and the store re-checks every guard
//! atomically when the mutation is applied.

use crate::config::Settings;
use crate::identity::{IdentityRecord, StateChange, VerificationState};
use crate::platform::RoleId;
use crate::policy::{is_approved_domain, is_valid_format, normalize_email};

use super::errors::{VerifyError, VerifyResult};
use super::messages;

/// Store mutation a plan requires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// No state change
    Keep,
    /// New `Pending` record with a fresh code
    Create { email: String },
    /// Guarded transition of the existing record
    Transition(StateChange),
    /// Create or replace directly into `Verified`
    ReplaceVerified { email: String, team: Option<String> },
    /// Hard delete
    Delete,
}

/// Side effect executed after the mutation succeeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Mail the freshly issued code to the record's email
    SendVerificationEmail,
    GrantRoles(Vec<RoleId>),
    RevokeRoles(Vec<RoleId>),
    SwapTeamRole { old: Option<RoleId>, new: RoleId },
    /// Direct message to the member
    Notify(String),
}

/// Mutation plus ordered effects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub mutation: Mutation,
    pub effects: Vec<Effect>,
}

impl Plan {
    fn keep(effects: Vec<Effect>) -> Self {
        Self {
            mutation: Mutation::Keep,
            effects,
        }
    }
}

/// Why a record is being erased
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Erasure {
    Reset,
    Purge,
}

/// Member joined (or rejoined) the community space
pub fn on_member_joined(current: Option<&IdentityRecord>, settings: &Settings) -> Plan {
    match current.map(|r| r.state) {
        Some(VerificationState::Verified) => {
            let team = current.and_then(|r| r.team());
            Plan::keep(vec![Effect::GrantRoles(settings.roles_for_team(team))])
        }
        Some(VerificationState::Restricted) => {
            Plan::keep(vec![Effect::Notify(messages::RESTRICTED.to_string())])
        }
        Some(VerificationState::Pending) | None => Plan::keep(vec![Effect::Notify(
            settings.platform.welcome_message.clone(),
        )]),
    }
}

/// Member sent text over direct message
pub fn on_email_submitted(
    current: Option<&IdentityRecord>,
    text: &str,
    settings: &Settings,
) -> VerifyResult<Plan> {
    match current.map(|r| r.state) {
        Some(VerificationState::Verified) => {
            return Err(VerifyError::Conflict(messages::ALREADY_VERIFIED.to_string()))
        }
        Some(VerificationState::Restricted) => {
            return Err(VerifyError::Conflict(messages::RESTRICTED.to_string()))
        }
        _ => {}
    }

    let email = normalize_email(text);
    if !is_valid_format(&email) {
        return Err(VerifyError::Validation(messages::INVALID_FORMAT.to_string()));
    }
    if !is_approved_domain(&email, &settings.approved_domains) {
        return Err(VerifyError::Validation(messages::domain_not_approved(
            &email,
        )));
    }

    if current.is_some() {
        // Pending: idempotent no-op
        return Ok(Plan::keep(vec![Effect::Notify(
            messages::ALREADY_IN_PROGRESS.to_string(),
        )]));
    }

    Ok(Plan {
        effects: vec![
            Effect::SendVerificationEmail,
            Effect::Notify(messages::email_sent(&email, settings.team_selection)),
        ],
        mutation: Mutation::Create { email },
    })
}

/// Resolve the team a request names against the directory
///
/// With team selection disabled any requested team is ignored.
fn resolve_team(
    team: Option<&str>,
    settings: &Settings,
    missing: &str,
) -> VerifyResult<Option<String>> {
    if !settings.team_selection {
        return Ok(None);
    }
    let name = team
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| VerifyError::Validation(missing.to_string()))?;
    match settings.teams.get(name) {
        Some(team) => Ok(Some(team.name.clone())),
        None => Err(VerifyError::NotFound(format!(
            "❌ Team '{}' not found.\n\n**Available teams:** {}",
            name,
            team_list(settings)
        ))),
    }
}

/// Available team names as inline code, comma separated
pub fn team_list(settings: &Settings) -> String {
    settings
        .teams
        .names()
        .iter()
        .map(|name| format!("`{}`", name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Web completion of the code the record was found by
pub fn on_web_completion(
    record: &IdentityRecord,
    team: Option<&str>,
    settings: &Settings,
) -> VerifyResult<Plan> {
    if record.state != VerificationState::Pending {
        return Err(VerifyError::Conflict("User already verified".to_string()));
    }

    let team = match resolve_team(team, settings, "Code and team are required") {
        Ok(team) => team,
        // The web surface reports an unknown team as a bad request
        Err(VerifyError::NotFound(_)) => {
            return Err(VerifyError::Validation("Invalid team selection".to_string()))
        }
        Err(e) => return Err(e),
    };

    Ok(Plan {
        effects: vec![
            Effect::GrantRoles(settings.roles_for_team(team.as_deref())),
            Effect::Notify(messages::verification_complete(team.as_deref())),
        ],
        mutation: Mutation::Transition(StateChange::CompleteVerification {
            code_digest: record.code_digest.clone(),
            team,
        }),
    })
}

/// Moderator marks a member verified directly
pub fn on_manual_verify(
    current: Option<&IdentityRecord>,
    mention: &str,
    email: &str,
    team: Option<&str>,
    settings: &Settings,
) -> VerifyResult<Plan> {
    let email = normalize_email(email);
    if !is_valid_format(&email) {
        return Err(VerifyError::Validation("❌ Invalid email format.".to_string()));
    }
    if !is_approved_domain(&email, &settings.approved_domains) {
        return Err(VerifyError::Validation(
            "❌ Domain not approved. Email must be from an approved domain.".to_string(),
        ));
    }
    let team = resolve_team(team, settings, "❌ A team is required.")?;

    match current.map(|r| r.state) {
        Some(VerificationState::Verified) if settings.team_selection => {
            return Err(VerifyError::Conflict(format!(
                "❌ {} is already verified. Use `/changeteam` to change their team.",
                mention
            )))
        }
        Some(VerificationState::Verified) => {
            return Err(VerifyError::Conflict(format!(
                "❌ {} is already verified.",
                mention
            )))
        }
        Some(VerificationState::Restricted) => {
            return Err(VerifyError::Conflict(format!(
                "❌ {} is restricted. Use `/unrestrict` to restore their access.",
                mention
            )))
        }
        _ => {}
    }

    Ok(Plan {
        effects: vec![
            Effect::GrantRoles(settings.roles_for_team(team.as_deref())),
            Effect::Notify(messages::manually_verified(team.as_deref())),
        ],
        mutation: Mutation::ReplaceVerified { email, team },
    })
}

/// Moderator moves a verified member to another team
pub fn on_change_team(
    current: Option<&IdentityRecord>,
    mention: &str,
    to: &str,
    settings: &Settings,
) -> VerifyResult<Plan> {
    if !settings.team_selection {
        return Err(VerifyError::Validation(
            "❌ Team selection is disabled.".to_string(),
        ));
    }
    let to = resolve_team(Some(to), settings, "❌ A team is required.")?
        .ok_or_else(|| VerifyError::Validation("❌ A team is required.".to_string()))?;

    let record = current.ok_or_else(|| {
        VerifyError::NotFound(format!(
            "❌ {} is not verified. Use `/verify` to verify them first.",
            mention
        ))
    })?;
    if record.state != VerificationState::Verified {
        return Err(VerifyError::Conflict(format!(
            "❌ {} is not verified yet. Use `/verify` to verify them first.",
            mention
        )));
    }
    if record.team() == Some(to.as_str()) {
        return Err(VerifyError::Conflict(format!(
            "❌ {} is already on the **{}** team.",
            mention, to
        )));
    }

    let old_role = record
        .team()
        .and_then(|name| settings.teams.get(name))
        .map(|t| t.role_id.clone());
    let new_role = settings
        .teams
        .get(&to)
        .map(|t| t.role_id.clone())
        .ok_or_else(|| VerifyError::NotFound(format!("❌ Team '{}' not found.", to)))?;

    Ok(Plan {
        effects: vec![
            Effect::SwapTeamRole {
                old: old_role,
                new: new_role,
            },
            Effect::Notify(messages::team_changed(record.team(), &to)),
        ],
        mutation: Mutation::Transition(StateChange::ChangeTeam {
            from: record.team_role.clone(),
            to,
        }),
    })
}

/// Moderator revokes a verified member's access
pub fn on_restrict(
    current: Option<&IdentityRecord>,
    mention: &str,
    reason: Option<&str>,
    settings: &Settings,
) -> VerifyResult<Plan> {
    let record = current
        .ok_or_else(|| VerifyError::NotFound(format!("❌ {} is not in the system.", mention)))?;
    match record.state {
        VerificationState::Pending => {
            return Err(VerifyError::Conflict(format!(
                "❌ {} is not verified.",
                mention
            )))
        }
        VerificationState::Restricted => {
            return Err(VerifyError::Conflict(format!(
                "❌ {} is already restricted.",
                mention
            )))
        }
        VerificationState::Verified => {}
    }

    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    Ok(Plan {
        effects: vec![
            Effect::RevokeRoles(settings.roles_for_team(record.team())),
            Effect::Notify(messages::restricted(reason)),
        ],
        mutation: Mutation::Transition(StateChange::Restrict {
            reason: reason.map(str::to_string),
        }),
    })
}

/// Moderator restores a restricted member
pub fn on_unrestrict(
    current: Option<&IdentityRecord>,
    mention: &str,
    settings: &Settings,
) -> VerifyResult<Plan> {
    let record = current
        .ok_or_else(|| VerifyError::NotFound(format!("❌ {} is not in the system.", mention)))?;
    if record.state != VerificationState::Restricted {
        return Err(VerifyError::Conflict(format!(
            "❌ {} is not restricted. Use `/verify` for new users or `/changeteam` to change teams.",
            mention
        )));
    }

    Ok(Plan {
        effects: vec![
            Effect::GrantRoles(settings.roles_for_team(record.team())),
            Effect::Notify(messages::unrestricted(record.team())),
        ],
        mutation: Mutation::Transition(StateChange::Unrestrict),
    })
}

/// Moderator erases a record (reset or purge), any state
pub fn on_erase(record: &IdentityRecord, erasure: Erasure, settings: &Settings) -> Plan {
    let mut effects = Vec::new();
    if record.state != VerificationState::Pending {
        effects.push(Effect::RevokeRoles(settings.roles_for_team(record.team())));
    }
    effects.push(Effect::Notify(
        match erasure {
            Erasure::Reset => messages::RESET,
            Erasure::Purge => messages::PURGED,
        }
        .to_string(),
    ));

    Plan {
        mutation: Mutation::Delete,
        effects,
    }
}
