//! # Chat Platform Adapter
//!
//! The contract the verification core needs from the chat platform: outbound
//! direct messages and role changes, plus the inbound event shapes. The
//! gateway connection itself lives outside this crate; adapters implement
//! [`ChatPlatform`] and feed [`PlatformEvent`]s to the dispatcher.

mod errors;
mod events;
mod types;

pub use errors::{PlatformError, PlatformResult};
pub use events::{
    CommandInvocation, CommandOption, CommandReply, OptionValue, PlatformEvent,
};
pub use types::{Invoker, MemberRef, PlatformId, RoleId};

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use futures_util::future::{BoxFuture, FutureExt};

use crate::observability::Logger;

/// Outbound operations on the chat platform
pub trait ChatPlatform: Send + Sync {
    /// Send a direct message to a member
    fn send_direct_message<'a>(
        &'a self,
        member: &'a PlatformId,
        text: &'a str,
    ) -> BoxFuture<'a, PlatformResult<()>>;

    /// Grant a role to a member
    fn grant_role<'a>(
        &'a self,
        member: &'a PlatformId,
        role: &'a RoleId,
    ) -> BoxFuture<'a, PlatformResult<()>>;

    /// Revoke a role from a member
    fn revoke_role<'a>(
        &'a self,
        member: &'a PlatformId,
        role: &'a RoleId,
    ) -> BoxFuture<'a, PlatformResult<()>>;

    /// Whether the gateway connection is currently up
    fn is_connected(&self) -> bool;

    /// Whether the invoker may run moderator commands
    fn has_admin_capability(&self, invoker: &Invoker, admin_role: &RoleId) -> bool {
        invoker.is_administrator || invoker.roles.iter().any(|r| r == admin_role)
    }
}

// ==================
// Recording adapter
// ==================

#[derive(Debug, Default)]
struct RecordingState {
    connected: bool,
    roles: HashMap<PlatformId, BTreeSet<RoleId>>,
    messages: Vec<(PlatformId, String)>,
    failing_roles: HashSet<RoleId>,
    dms_closed: HashSet<PlatformId>,
}

/// In-memory adapter that records every outbound call
///
/// Mirrors the platform's own semantics: granting a held role answers
/// `RoleAlreadyGranted`, revoking a missing one answers `RoleNotHeld`.
/// Individual roles can be scripted to fail.
#[derive(Debug)]
pub struct RecordingPlatform {
    state: RwLock<RecordingState>,
}

impl Default for RecordingPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RecordingState {
                connected: true,
                ..Default::default()
            }),
        }
    }

    /// Roles currently held by a member
    pub fn roles_of(&self, member: &PlatformId) -> BTreeSet<RoleId> {
        self.state
            .read()
            .map(|s| s.roles.get(member).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Direct messages sent to a member, oldest first
    pub fn messages_to(&self, member: &PlatformId) -> Vec<String> {
        self.state
            .read()
            .map(|s| {
                s.messages
                    .iter()
                    .filter(|(to, _)| to == member)
                    .map(|(_, text)| text.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recent direct message sent to a member
    pub fn last_message_to(&self, member: &PlatformId) -> Option<String> {
        self.messages_to(member).pop()
    }

    /// Make every grant/revoke of `role` fail
    pub fn fail_role(&self, role: &RoleId) {
        if let Ok(mut s) = self.state.write() {
            s.failing_roles.insert(role.clone());
        }
    }

    /// Stop failing `role`
    pub fn heal_role(&self, role: &RoleId) {
        if let Ok(mut s) = self.state.write() {
            s.failing_roles.remove(role);
        }
    }

    /// Refuse direct messages to `member`
    pub fn close_dms(&self, member: &PlatformId) {
        if let Ok(mut s) = self.state.write() {
            s.dms_closed.insert(member.clone());
        }
    }

    /// Drop every role a member holds, as the platform does when they leave
    pub fn remove_member(&self, member: &PlatformId) {
        if let Ok(mut s) = self.state.write() {
            s.roles.remove(member);
        }
    }

    pub fn set_connected(&self, connected: bool) {
        if let Ok(mut s) = self.state.write() {
            s.connected = connected;
        }
    }

    fn poisoned() -> PlatformError {
        PlatformError::Rejected("recording state poisoned".to_string())
    }
}

impl ChatPlatform for RecordingPlatform {
    fn send_direct_message<'a>(
        &'a self,
        member: &'a PlatformId,
        text: &'a str,
    ) -> BoxFuture<'a, PlatformResult<()>> {
        async move {
            let mut s = self.state.write().map_err(|_| Self::poisoned())?;
            if s.dms_closed.contains(member) {
                return Err(PlatformError::DirectMessagesClosed(member.to_string()));
            }
            s.messages.push((member.clone(), text.to_string()));
            Ok(())
        }
        .boxed()
    }

    fn grant_role<'a>(
        &'a self,
        member: &'a PlatformId,
        role: &'a RoleId,
    ) -> BoxFuture<'a, PlatformResult<()>> {
        async move {
            let mut s = self.state.write().map_err(|_| Self::poisoned())?;
            if s.failing_roles.contains(role) {
                return Err(PlatformError::Rejected(format!("cannot grant {}", role)));
            }
            if !s.roles.entry(member.clone()).or_default().insert(role.clone()) {
                return Err(PlatformError::RoleAlreadyGranted(role.to_string()));
            }
            Ok(())
        }
        .boxed()
    }

    fn revoke_role<'a>(
        &'a self,
        member: &'a PlatformId,
        role: &'a RoleId,
    ) -> BoxFuture<'a, PlatformResult<()>> {
        async move {
            let mut s = self.state.write().map_err(|_| Self::poisoned())?;
            if s.failing_roles.contains(role) {
                return Err(PlatformError::Rejected(format!("cannot revoke {}", role)));
            }
            let removed = s
                .roles
                .get_mut(member)
                .map(|held| held.remove(role))
                .unwrap_or(false);
            if !removed {
                return Err(PlatformError::RoleNotHeld(role.to_string()));
            }
            Ok(())
        }
        .boxed()
    }

    fn is_connected(&self) -> bool {
        self.state.read().map(|s| s.connected).unwrap_or(false)
    }
}

// ==================
// Dry-run adapter
// ==================

/// Adapter that only logs outbound calls
///
/// Used by the binary when no gateway bridge is linked in.
#[derive(Debug, Clone)]
pub struct DryRunPlatform {
    logger: Logger,
}

impl DryRunPlatform {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl ChatPlatform for DryRunPlatform {
    fn send_direct_message<'a>(
        &'a self,
        member: &'a PlatformId,
        text: &'a str,
    ) -> BoxFuture<'a, PlatformResult<()>> {
        async move {
            self.logger.info(
                "PLATFORM_DRY_RUN_DM",
                &[("member", member.as_str()), ("text", text)],
            );
            Ok(())
        }
        .boxed()
    }

    fn grant_role<'a>(
        &'a self,
        member: &'a PlatformId,
        role: &'a RoleId,
    ) -> BoxFuture<'a, PlatformResult<()>> {
        async move {
            self.logger.info(
                "PLATFORM_DRY_RUN_GRANT",
                &[("member", member.as_str()), ("role", role.as_str())],
            );
            Ok(())
        }
        .boxed()
    }

    fn revoke_role<'a>(
        &'a self,
        member: &'a PlatformId,
        role: &'a RoleId,
    ) -> BoxFuture<'a, PlatformResult<()>> {
        async move {
            self.logger.info(
                "PLATFORM_DRY_RUN_REVOKE",
                &[("member", member.as_str()), ("role", role.as_str())],
            );
            Ok(())
        }
        .boxed()
    }

    fn is_connected(&self) -> bool {
        false
    }
}
