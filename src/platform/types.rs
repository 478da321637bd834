//! Identifier types shared across the platform boundary

use std::fmt;

use serde::{Deserialize, Serialize};

/// A member's identity on the chat platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformId(String);

impl PlatformId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Platform mention markup for this member
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A grantable role on the chat platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A member referenced by the platform (event author, command target)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub id: PlatformId,
    pub display_name: String,
}

impl MemberRef {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: PlatformId::new(id),
            display_name: display_name.into(),
        }
    }
}

/// The member who invoked a command, with the permissions the platform reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoker {
    pub member: MemberRef,
    /// Roles the invoker currently holds
    pub roles: Vec<RoleId>,
    /// Platform-level administrator permission
    pub is_administrator: bool,
}
