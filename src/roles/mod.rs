//! # Role Synchronizer
//!
//! Translates verification state into role grants and revocations on the
//! chat platform.
//!
//! There is no transactional link to the identity store. The store is
//! ground truth; role state is best effort and reconciled when a verified
//! member rejoins. Every call is idempotent: granting a held role or
//! revoking a missing one succeeds.

use std::sync::Arc;

use crate::observability::Logger;
use crate::platform::{ChatPlatform, PlatformError, PlatformId, PlatformResult, RoleId};

/// A role call that failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleFailure {
    pub role: RoleId,
    pub error: PlatformError,
}

/// Outcome of a multi-role sync
///
/// Every role is attempted even when an earlier one fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub applied: Vec<RoleId>,
    pub failed: Vec<RoleFailure>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn merge(&mut self, other: SyncReport) {
        self.applied.extend(other.applied);
        self.failed.extend(other.failed);
    }

    fn record(&mut self, role: &RoleId, result: PlatformResult<()>) {
        match result {
            Ok(()) => self.applied.push(role.clone()),
            Err(error) => self.failed.push(RoleFailure {
                role: role.clone(),
                error,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Grant,
    Revoke,
}

impl Direction {
    fn event(&self) -> &'static str {
        match self {
            Direction::Grant => "ROLE_GRANT_FAILED",
            Direction::Revoke => "ROLE_REVOKE_FAILED",
        }
    }
}

/// Idempotent role grant/revoke over a [`ChatPlatform`]
#[derive(Clone)]
pub struct RoleSync {
    platform: Arc<dyn ChatPlatform>,
    logger: Logger,
}

impl RoleSync {
    pub fn new(platform: Arc<dyn ChatPlatform>, logger: Logger) -> Self {
        Self { platform, logger }
    }

    /// Grant `role`; already holding it counts as success
    pub async fn grant(&self, member: &PlatformId, role: &RoleId) -> PlatformResult<()> {
        self.call(Direction::Grant, member, role).await
    }

    /// Revoke `role`; not holding it counts as success
    pub async fn revoke(&self, member: &PlatformId, role: &RoleId) -> PlatformResult<()> {
        self.call(Direction::Revoke, member, role).await
    }

    pub async fn grant_all(&self, member: &PlatformId, roles: &[RoleId]) -> SyncReport {
        let mut report = SyncReport::default();
        for role in roles {
            report.record(role, self.grant(member, role).await);
        }
        report
    }

    pub async fn revoke_all(&self, member: &PlatformId, roles: &[RoleId]) -> SyncReport {
        let mut report = SyncReport::default();
        for role in roles {
            report.record(role, self.revoke(member, role).await);
        }
        report
    }

    /// Move a member from one team role to another
    ///
    /// The new role is granted even if revoking the old one fails.
    pub async fn swap(
        &self,
        member: &PlatformId,
        old: Option<&RoleId>,
        new: &RoleId,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        if let Some(old) = old {
            if old != new {
                report.record(old, self.revoke(member, old).await);
            }
        }
        report.record(new, self.grant(member, new).await);
        report
    }

    async fn call(
        &self,
        direction: Direction,
        member: &PlatformId,
        role: &RoleId,
    ) -> PlatformResult<()> {
        let result = match direction {
            Direction::Grant => self.platform.grant_role(member, role).await,
            Direction::Revoke => self.platform.revoke_role(member, role).await,
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_applied() => {
                self.logger.debug(
                    "ROLE_ALREADY_APPLIED",
                    &[("member", member.as_str()), ("role", role.as_str())],
                );
                Ok(())
            }
            Err(e) => {
                self.logger.error(
                    direction.event(),
                    &[
                        ("member", member.as_str()),
                        ("role", role.as_str()),
                        ("error", &e.to_string()),
                    ],
                );
                Err(e)
            }
        }
    }
}
