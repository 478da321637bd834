//! Identity record model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platform::PlatformId;

/// Verification lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    /// Awaiting email confirmation (and team selection, when enabled)
    Pending,
    /// Email confirmed, roles granted
    Verified,
    /// Verified member whose access a moderator has revoked
    Restricted,
}

impl VerificationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationState::Pending => "pending",
            VerificationState::Verified => "verified",
            VerificationState::Restricted => "restricted",
        }
    }
}

impl fmt::Display for VerificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One member's verification record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Member identity on the chat platform (unique, immutable)
    pub platform_id: PlatformId,

    /// Display name at the time of first contact (informational)
    pub display_name: String,

    /// Canonical lower-cased email (unique among live records)
    pub email: String,

    /// SHA-256 digest of the verification code (unique among live records)
    pub code_digest: String,

    /// Assigned team; `None` while pending or when team selection is disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_role: Option<String>,

    pub state: VerificationState,

    /// Moderator-supplied reason while restricted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restriction_reason: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

impl IdentityRecord {
    pub fn is_verified(&self) -> bool {
        self.state == VerificationState::Verified
    }

    pub fn team(&self) -> Option<&str> {
        self.team_role.as_deref()
    }
}

/// Input for creating a record
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub platform_id: PlatformId,
    pub display_name: String,
    pub email: String,
}

impl NewIdentity {
    pub fn new(
        platform_id: PlatformId,
        display_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            platform_id,
            display_name: display_name.into(),
            email: email.into(),
        }
    }
}

/// Key to look a record up by
#[derive(Debug, Clone, Copy)]
pub enum Lookup<'a> {
    PlatformId(&'a PlatformId),
    /// Matched case-insensitively
    Email(&'a str),
    /// Raw code as presented by the member; hashed before lookup
    Code(&'a str),
}

/// Guarded state change applied by [`IdentityStore::transition`]
///
/// Each variant names the state it must start from; the store rejects the
/// change if the record has moved on since the caller read it.
///
/// [`IdentityStore::transition`]: super::IdentityStore::transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    /// `Pending -> Verified` via web completion of the code with `code_digest`
    CompleteVerification {
        code_digest: String,
        team: Option<String>,
    },

    /// `Verified -> Verified` with a new team, provided the team is still `from`
    ChangeTeam { from: Option<String>, to: String },

    /// `Verified -> Restricted`
    Restrict { reason: Option<String> },

    /// `Restricted -> Verified`
    Unrestrict,
}

impl StateChange {
    /// State the record must be in for this change to apply
    pub fn required_state(&self) -> VerificationState {
        match self {
            StateChange::CompleteVerification { .. } => VerificationState::Pending,
            StateChange::ChangeTeam { .. } => VerificationState::Verified,
            StateChange::Restrict { .. } => VerificationState::Verified,
            StateChange::Unrestrict => VerificationState::Restricted,
        }
    }

    /// State the record is in afterwards
    pub fn target_state(&self) -> VerificationState {
        match self {
            StateChange::Restrict { .. } => VerificationState::Restricted,
            _ => VerificationState::Verified,
        }
    }

    /// Check the optimistic preconditions beyond the state itself
    pub(crate) fn check_fresh(&self, record: &IdentityRecord) -> Result<(), &'static str> {
        match self {
            StateChange::CompleteVerification { code_digest, .. }
                if *code_digest != record.code_digest =>
            {
                Err("verification code replaced")
            }
            StateChange::ChangeTeam { from, .. } if *from != record.team_role => {
                Err("team changed")
            }
            _ => Ok(()),
        }
    }

    /// Apply to a record already known to satisfy the guards
    pub(crate) fn apply(&self, record: &mut IdentityRecord, now: DateTime<Utc>) {
        match self {
            StateChange::CompleteVerification { team, .. } => {
                record.team_role = team.clone();
                record.verified_at = Some(now);
            }
            StateChange::ChangeTeam { to, .. } => {
                record.team_role = Some(to.clone());
            }
            StateChange::Restrict { reason } => {
                record.restriction_reason = reason.clone();
            }
            StateChange::Unrestrict => {
                record.restriction_reason = None;
                record.verified_at = Some(now);
            }
        }
        record.state = self.target_state();
    }
}

/// Record counts by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub verified: usize,
    pub pending: usize,
    pub restricted: usize,
}
