//! Command definitions registered with the platform

use serde::Serialize;

use crate::config::Settings;

/// Kind of value an option accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    User,
    Text,
}

/// One option of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: OptionKind,
    pub required: bool,
    /// Allowed values; empty means free input
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl OptionDefinition {
    fn user(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: OptionKind::User,
            required: true,
            choices: Vec::new(),
        }
    }

    fn text(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: OptionKind::Text,
            required: true,
            choices: Vec::new(),
        }
    }

    fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn with_choices(mut self, choices: Vec<String>) -> Self {
        self.choices = choices;
        self
    }
}

/// A command as the platform displays it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub options: Vec<OptionDefinition>,
}

impl CommandDefinition {
    fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            options: Vec::new(),
        }
    }

    fn option(mut self, option: OptionDefinition) -> Self {
        self.options.push(option);
        self
    }
}

/// Every command available under `settings`
///
/// With team selection disabled `changeteam` is absent and `verify` takes
/// no team.
pub(super) fn for_settings(settings: &Settings) -> Vec<CommandDefinition> {
    let teams: Vec<String> = settings.teams.names().into_iter().map(String::from).collect();

    let mut verify = CommandDefinition::new("verify", "Manually verify a user (Moderator only)")
        .option(OptionDefinition::user("user", "The user to verify"))
        .option(OptionDefinition::text("email", "User's work email address"));
    if settings.team_selection {
        verify = verify.option(
            OptionDefinition::text("team", "Team to assign").with_choices(teams.clone()),
        );
    }

    let mut defs = vec![
        CommandDefinition::new("stats", "View verification statistics (Moderator only)"),
        CommandDefinition::new(
            "list",
            "List all users and their verification status (Moderator only)",
        ),
        CommandDefinition::new("reset", "Reset a user's verification (Moderator only)")
            .option(OptionDefinition::user("user", "The user to reset")),
        verify,
    ];

    if settings.team_selection {
        defs.push(
            CommandDefinition::new("changeteam", "Change a verified user's team (Moderator only)")
                .option(OptionDefinition::user("user", "The user to change"))
                .option(OptionDefinition::text("team", "New team to assign").with_choices(teams)),
        );
    }

    defs.extend([
        CommandDefinition::new("restrict", "Temporarily restrict a user's access (Moderator only)")
            .option(OptionDefinition::user("user", "The user to restrict"))
            .option(OptionDefinition::text("reason", "Reason for restriction (optional)").optional()),
        CommandDefinition::new("unrestrict", "Remove restrictions from a user (Moderator only)")
            .option(OptionDefinition::user("user", "The user to unrestrict")),
        CommandDefinition::new("purge", "Permanently delete user data (Moderator only)")
            .option(OptionDefinition::user("user", "The user to purge (by account)").optional())
            .option(
                OptionDefinition::text("email", "The user to purge (by email address)").optional(),
            ),
        CommandDefinition::new("domains", "List approved email domains (Moderator only)"),
        CommandDefinition::new("help", "Show help information"),
    ]);

    defs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(team_selection: bool) -> Settings {
        Settings::from_json(&format!(
            r#"{{
                "platform": {{ "admin_role": "mods" }},
                "email": {{ "smtp_host": "smtp.acme.com", "from_address": "bot@acme.com" }},
                "features": {{ "enable_team_selection": {} }},
                "approved_domains": ["acme.com"],
                "teams": {{ "engineering": "r-eng", "design": "r-des" }}
            }}"#,
            team_selection
        ))
        .unwrap()
    }

    #[test]
    fn test_team_options_carry_choices() {
        let defs = for_settings(&settings(true));
        let change = defs.iter().find(|d| d.name == "changeteam").unwrap();
        let team = change.options.iter().find(|o| o.name == "team").unwrap();
        assert_eq!(team.choices, vec!["design", "engineering"]);
    }

    #[test]
    fn test_purge_options_are_both_optional() {
        let defs = for_settings(&settings(false));
        let purge = defs.iter().find(|d| d.name == "purge").unwrap();
        assert!(purge.options.iter().all(|o| !o.required));
        assert!(defs.iter().all(|d| d.name != "changeteam"));

        let json = serde_json::to_value(&defs).unwrap();
        assert_eq!(json[0]["name"], "stats");
    }
}
