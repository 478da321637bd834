//! Configuration
//!
//! The JSON file is deserialized into a raw shape, then validated eagerly into
//! an immutable [`Settings`]. Team references, domains, log level and URLs are
//! all checked here so that nothing configuration-shaped fails at runtime.

mod errors;

pub use errors::{ConfigError, ConfigResult};

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::observability::Severity;
use crate::platform::RoleId;

const DEFAULT_WELCOME_MESSAGE: &str = "👋 Welcome to the server!\n\n\
To gain access, you need to verify your work email address.\n\n\
Please reply to this message with your work email address (e.g., yourname@company.com).\n\n\
Your email must be from one of our approved company domains.";

// ==================
// Raw file shape
// ==================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawConfig {
    platform: RawPlatform,
    email: RawEmail,
    #[serde(default)]
    server: RawServer,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_data_dir")]
    data_dir: String,
    #[serde(default)]
    features: RawFeatures,
    #[serde(default)]
    approved_domains: Vec<String>,
    #[serde(default)]
    teams: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPlatform {
    #[serde(default)]
    guild_id: String,
    admin_role: String,
    #[serde(default)]
    members_role: Option<String>,
    #[serde(default)]
    welcome_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawEmail {
    smtp_host: String,
    #[serde(default = "default_smtp_port")]
    smtp_port: u16,
    #[serde(default)]
    smtp_username: String,
    #[serde(default)]
    smtp_password: String,
    from_address: String,
    #[serde(default = "default_from_name")]
    from_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawServer {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_base_url")]
    base_url: String,
}

impl Default for RawServer {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawFeatures {
    #[serde(default = "default_true")]
    enable_team_selection: bool,
}

impl Default for RawFeatures {
    fn default() -> Self {
        Self {
            enable_team_selection: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_from_name() -> String {
    "Gatekeeper".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_true() -> bool {
    true
}

// ==================
// Validated settings
// ==================

/// Chat platform settings
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    /// Community space identifier on the platform
    pub guild_id: String,
    /// Role whose holders may run moderator commands
    pub admin_role: RoleId,
    /// Base role granted to every verified member
    pub members_role: Option<RoleId>,
    /// First DM sent to members who join unverified
    pub welcome_message: String,
}

/// SMTP settings
#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
    pub from_name: String,
}

/// Web surface settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Public base URL used in verification links, without trailing slash
    pub base_url: String,
}

impl ServerSettings {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A team and the external role that represents it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub name: String,
    pub role_id: RoleId,
}

/// Configured teams, ordered by name
#[derive(Debug, Clone, Default)]
pub struct TeamDirectory {
    teams: Vec<Team>,
}

impl TeamDirectory {
    /// Look up a team by exact name
    pub fn get(&self, name: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Team> {
        self.teams.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.teams.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }
}

/// Fully validated runtime configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub platform: PlatformSettings,
    pub email: EmailSettings,
    pub server: ServerSettings,
    pub log_level: Severity,
    pub data_dir: PathBuf,
    /// Whether members pick a team during web completion
    pub team_selection: bool,
    /// Lower-cased approved email domains
    pub approved_domains: Vec<String>,
    pub teams: TeamDirectory,
}

impl Settings {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let raw: RawConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Malformed(e.to_string()))?;

        raw.validate()
    }

    /// Role IDs a verified member on `team` should hold
    pub fn roles_for_team(&self, team: Option<&str>) -> Vec<RoleId> {
        let mut roles = Vec::new();
        if let Some(base) = &self.platform.members_role {
            roles.push(base.clone());
        }
        if self.team_selection {
            if let Some(team) = team.and_then(|name| self.teams.get(name)) {
                roles.push(team.role_id.clone());
            }
        }
        roles
    }
}

impl RawConfig {
    fn validate(self) -> ConfigResult<Settings> {
        let log_level: Severity = self
            .log_level
            .parse()
            .map_err(|e: String| ConfigError::invalid("log_level", e))?;

        if self.platform.admin_role.trim().is_empty() {
            return Err(ConfigError::invalid("platform.admin_role", "must not be empty"));
        }

        let members_role = match self.platform.members_role {
            Some(role) if !role.trim().is_empty() => Some(RoleId::new(role.trim())),
            _ => None,
        };

        let welcome_message = match self.platform.welcome_message {
            Some(msg) if !msg.trim().is_empty() => msg,
            _ => DEFAULT_WELCOME_MESSAGE.to_string(),
        };

        let approved_domains = validate_domains(self.approved_domains)?;

        let teams = validate_teams(self.teams)?;
        if self.features.enable_team_selection && teams.is_empty() {
            return Err(ConfigError::invalid(
                "teams",
                "at least one team is required when team selection is enabled",
            ));
        }

        let server = validate_server(self.server)?;

        if self.email.smtp_host.trim().is_empty() {
            return Err(ConfigError::invalid("email.smtp_host", "must not be empty"));
        }
        if !self.email.from_address.contains('@') {
            return Err(ConfigError::invalid(
                "email.from_address",
                format!("'{}' is not an email address", self.email.from_address),
            ));
        }

        Ok(Settings {
            platform: PlatformSettings {
                guild_id: self.platform.guild_id,
                admin_role: RoleId::new(self.platform.admin_role.trim()),
                members_role,
                welcome_message,
            },
            email: EmailSettings {
                smtp_host: self.email.smtp_host,
                smtp_port: self.email.smtp_port,
                smtp_username: self.email.smtp_username,
                smtp_password: self.email.smtp_password,
                from_address: self.email.from_address,
                from_name: self.email.from_name,
            },
            server,
            log_level,
            data_dir: PathBuf::from(self.data_dir),
            team_selection: self.features.enable_team_selection,
            approved_domains,
            teams,
        })
    }
}

fn validate_domains(domains: Vec<String>) -> ConfigResult<Vec<String>> {
    if domains.is_empty() {
        return Err(ConfigError::invalid(
            "approved_domains",
            "at least one approved domain is required",
        ));
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(domains.len());
    for domain in domains {
        let domain = domain.trim().to_ascii_lowercase();
        if domain.is_empty() || domain.contains('@') || !domain.contains('.') {
            return Err(ConfigError::invalid(
                "approved_domains",
                format!("'{}' is not a domain name", domain),
            ));
        }
        if !seen.insert(domain.clone()) {
            return Err(ConfigError::invalid(
                "approved_domains",
                format!("'{}' is listed twice", domain),
            ));
        }
        out.push(domain);
    }
    Ok(out)
}

fn validate_teams(teams: BTreeMap<String, String>) -> ConfigResult<TeamDirectory> {
    let mut out = Vec::with_capacity(teams.len());
    for (name, role_id) in teams {
        if name.trim().is_empty() {
            return Err(ConfigError::invalid("teams", "team names must not be empty"));
        }
        if role_id.trim().is_empty() {
            return Err(ConfigError::invalid(
                "teams",
                format!("team '{}' has no role ID", name),
            ));
        }
        out.push(Team {
            name,
            role_id: RoleId::new(role_id.trim()),
        });
    }
    Ok(TeamDirectory { teams: out })
}

fn validate_server(server: RawServer) -> ConfigResult<ServerSettings> {
    if server.port == 0 {
        return Err(ConfigError::invalid("server.port", "must be > 0"));
    }
    if !(server.base_url.starts_with("http://") || server.base_url.starts_with("https://")) {
        return Err(ConfigError::invalid(
            "server.base_url",
            format!("'{}' must start with http:// or https://", server.base_url),
        ));
    }
    Ok(ServerSettings {
        host: server.host,
        port: server.port,
        base_url: server.base_url.trim_end_matches('/').to_string(),
    })
}
