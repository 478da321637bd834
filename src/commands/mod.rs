//! # Moderator Commands
//!
//! A table from command name to handler. Every handler is a thin adapter:
//! it pulls options out of the invocation, calls the orchestrator and
//! renders the reply shown to the invoker. Admin gating happens once, in
//! [`CommandRegistry::handle`], before the handler runs.

mod definitions;
mod replies;

pub use definitions::{CommandDefinition, OptionDefinition, OptionKind};

use std::collections::BTreeMap;

use futures_util::future::{BoxFuture, FutureExt};

use crate::platform::{CommandInvocation, CommandReply, MemberRef};
use crate::verification::{Orchestrator, PurgeTarget, VerifyError, VerifyResult};

type HandlerFuture<'a> = BoxFuture<'a, VerifyResult<CommandReply>>;
type Handler = for<'a> fn(&'a Orchestrator, &'a CommandInvocation) -> HandlerFuture<'a>;

struct CommandEntry {
    admin_only: bool,
    handler: Handler,
}

fn entry(admin_only: bool, handler: Handler) -> CommandEntry {
    CommandEntry {
        admin_only,
        handler,
    }
}

/// Name-to-handler table for moderator commands
pub struct CommandRegistry {
    orchestrator: Orchestrator,
    table: BTreeMap<&'static str, CommandEntry>,
}

impl CommandRegistry {
    /// Build the table for the configured feature set
    pub fn new(orchestrator: Orchestrator) -> Self {
        let team_selection = orchestrator.settings().team_selection;

        let mut table = BTreeMap::new();
        table.insert("stats", entry(true, |o, inv| stats(o, inv).boxed()));
        table.insert("list", entry(true, |o, inv| list(o, inv).boxed()));
        table.insert("reset", entry(true, |o, inv| reset(o, inv).boxed()));
        table.insert("verify", entry(true, |o, inv| verify(o, inv).boxed()));
        if team_selection {
            table.insert("changeteam", entry(true, |o, inv| change_team(o, inv).boxed()));
        }
        table.insert("restrict", entry(true, |o, inv| restrict(o, inv).boxed()));
        table.insert("unrestrict", entry(true, |o, inv| unrestrict(o, inv).boxed()));
        table.insert("purge", entry(true, |o, inv| purge(o, inv).boxed()));
        table.insert("domains", entry(true, |o, inv| domains(o, inv).boxed()));
        table.insert("help", entry(false, |o, inv| help(o, inv).boxed()));

        Self {
            orchestrator,
            table,
        }
    }

    /// Registered command names
    pub fn names(&self) -> Vec<&'static str> {
        self.table.keys().copied().collect()
    }

    /// Definitions to register with the platform
    pub fn definitions(&self) -> Vec<CommandDefinition> {
        definitions::for_settings(self.orchestrator.settings())
    }

    /// Run a command and render its reply; never fails
    pub async fn handle(&self, invocation: &CommandInvocation) -> CommandReply {
        self.handle_with(&self.orchestrator, invocation).await
    }

    /// Like [`handle`](Self::handle), against a specific orchestrator
    /// (typically one carrying a per-event logger)
    pub async fn handle_with(
        &self,
        orchestrator: &Orchestrator,
        invocation: &CommandInvocation,
    ) -> CommandReply {
        let logger = orchestrator.logger();
        let invoker = invocation.invoker.member.id.as_str();
        logger.debug(
            "COMMAND_INVOKED",
            &[("command", invocation.name.as_str()), ("invoker", invoker)],
        );

        let result = match self.table.get(invocation.name.as_str()) {
            None => Err(VerifyError::Validation(format!(
                "❌ Unknown command `{}`.",
                invocation.name
            ))),
            Some(entry) if entry.admin_only && !orchestrator.is_admin(&invocation.invoker) => {
                Err(VerifyError::Authorization)
            }
            Some(entry) => (entry.handler)(orchestrator, invocation).await,
        };

        match result {
            Ok(reply) => reply,
            Err(err) if err.is_client_error() => {
                logger.info(
                    "COMMAND_REJECTED",
                    &[
                        ("command", invocation.name.as_str()),
                        ("invoker", invoker),
                        ("code", err.code()),
                    ],
                );
                CommandReply::new(err.to_string())
            }
            Err(err) => {
                logger.error(
                    "COMMAND_FAILED",
                    &[
                        ("command", invocation.name.as_str()),
                        ("invoker", invoker),
                        ("error", &err.to_string()),
                    ],
                );
                CommandReply::new("❌ An internal error occurred. Please check the logs.")
            }
        }
    }
}

fn required_user<'a>(invocation: &'a CommandInvocation) -> VerifyResult<&'a MemberRef> {
    invocation
        .user("user")
        .ok_or_else(|| VerifyError::Validation("❌ Missing required option `user`.".to_string()))
}

fn required_text<'a>(invocation: &'a CommandInvocation, name: &str) -> VerifyResult<&'a str> {
    invocation.text(name).ok_or_else(|| {
        VerifyError::Validation(format!("❌ Missing required option `{}`.", name))
    })
}

// ==================
// Handlers
// ==================

async fn stats(o: &Orchestrator, _: &CommandInvocation) -> VerifyResult<CommandReply> {
    Ok(replies::stats(&o.stats()?))
}

async fn list(o: &Orchestrator, _: &CommandInvocation) -> VerifyResult<CommandReply> {
    Ok(replies::list(&o.list()?))
}

async fn reset(o: &Orchestrator, inv: &CommandInvocation) -> VerifyResult<CommandReply> {
    let target = required_user(inv)?;
    let outcome = o.reset(target).await?;
    Ok(replies::reset(target, &outcome))
}

async fn verify(o: &Orchestrator, inv: &CommandInvocation) -> VerifyResult<CommandReply> {
    let target = required_user(inv)?;
    let email = required_text(inv, "email")?;
    let outcome = o.manual_verify(target, email, inv.text("team")).await?;
    Ok(replies::verified(target, &outcome))
}

async fn change_team(o: &Orchestrator, inv: &CommandInvocation) -> VerifyResult<CommandReply> {
    let target = required_user(inv)?;
    let team = required_text(inv, "team")?;
    let outcome = o.change_team(target, team).await?;
    Ok(replies::team_changed(target, &outcome))
}

async fn restrict(o: &Orchestrator, inv: &CommandInvocation) -> VerifyResult<CommandReply> {
    let target = required_user(inv)?;
    let reason = inv.text("reason");
    let outcome = o.restrict(target, reason).await?;
    Ok(replies::restricted(target, reason, &outcome))
}

async fn unrestrict(o: &Orchestrator, inv: &CommandInvocation) -> VerifyResult<CommandReply> {
    let target = required_user(inv)?;
    let outcome = o.unrestrict(target).await?;
    Ok(replies::unrestricted(target, &outcome))
}

async fn purge(o: &Orchestrator, inv: &CommandInvocation) -> VerifyResult<CommandReply> {
    let target = match (inv.user("user"), inv.text("email")) {
        (Some(member), None) => PurgeTarget::Member(member.clone()),
        (None, Some(email)) => PurgeTarget::Email(email.to_string()),
        (None, None) => {
            return Err(VerifyError::Validation(
                "❌ Please provide either a user or an email address.".to_string(),
            ))
        }
        (Some(_), Some(_)) => {
            return Err(VerifyError::Validation(
                "❌ Please provide either a user or an email address, not both.".to_string(),
            ))
        }
    };
    let outcome = o.purge(&target).await?;
    Ok(replies::purged(&outcome))
}

async fn domains(o: &Orchestrator, _: &CommandInvocation) -> VerifyResult<CommandReply> {
    Ok(replies::domains(o.domains()))
}

async fn help(o: &Orchestrator, inv: &CommandInvocation) -> VerifyResult<CommandReply> {
    let is_admin = o.is_admin(&inv.invoker);
    Ok(replies::help(o.settings().team_selection, is_admin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::Settings;
    use crate::email::MockMailer;
    use crate::identity::IdentityStore;
    use crate::observability::Logger;
    use crate::platform::{Invoker, RecordingPlatform, RoleId};

    fn registry(team_selection: bool) -> (CommandRegistry, Arc<RecordingPlatform>) {
        let settings = Settings::from_json(&format!(
            r#"{{
                "platform": {{ "admin_role": "mods", "members_role": "members" }},
                "email": {{ "smtp_host": "smtp.acme.com", "from_address": "bot@acme.com" }},
                "features": {{ "enable_team_selection": {} }},
                "approved_domains": ["acme.com"],
                "teams": {{ "engineering": "r-eng", "design": "r-des" }}
            }}"#,
            team_selection
        ))
        .unwrap();
        let platform = Arc::new(RecordingPlatform::new());
        let orchestrator = Orchestrator::new(
            Arc::new(IdentityStore::in_memory()),
            platform.clone(),
            Arc::new(MockMailer::new()),
            Arc::new(settings),
            Logger::disabled(),
        );
        (CommandRegistry::new(orchestrator), platform)
    }

    fn moderator() -> Invoker {
        Invoker {
            member: MemberRef::new("mod", "moderator"),
            roles: vec![RoleId::new("mods")],
            is_administrator: false,
        }
    }

    fn member() -> Invoker {
        Invoker {
            member: MemberRef::new("2", "bob"),
            roles: vec![],
            is_administrator: false,
        }
    }

    #[tokio::test]
    async fn test_non_admin_is_refused() {
        let (registry, _) = registry(true);
        let reply = registry
            .handle(&CommandInvocation::new("stats", member()))
            .await;
        assert_eq!(reply.content, VerifyError::Authorization.to_string());
    }

    #[tokio::test]
    async fn test_help_varies_by_admin() {
        let (registry, _) = registry(true);
        let for_member = registry
            .handle(&CommandInvocation::new("help", member()))
            .await;
        let for_mod = registry
            .handle(&CommandInvocation::new("help", moderator()))
            .await;

        assert!(!for_member.content.contains("/purge"));
        assert!(for_mod.content.contains("/purge"));
        assert!(for_mod.content.contains("/changeteam"));
    }

    #[tokio::test]
    async fn test_verify_then_restrict_round_trip() {
        let (registry, platform) = registry(true);
        let alice = MemberRef::new("1", "alice");

        let reply = registry
            .handle(
                &CommandInvocation::new("verify", moderator())
                    .with_user("user", alice.clone())
                    .with_text("email", "alice@acme.com")
                    .with_text("team", "design"),
            )
            .await;
        assert!(reply.content.starts_with("✅ Successfully verified"), "{}", reply.content);

        let reply = registry
            .handle(
                &CommandInvocation::new("restrict", moderator())
                    .with_user("user", alice.clone())
                    .with_text("reason", "spam"),
            )
            .await;
        assert!(reply.content.contains("**Reason:** spam"));
        assert!(platform.roles_of(&alice.id).is_empty());

        let reply = registry
            .handle(&CommandInvocation::new("unrestrict", moderator()).with_user("user", alice.clone()))
            .await;
        assert!(reply.content.contains("**design**"));
        assert!(platform.roles_of(&alice.id).contains(&RoleId::new("r-des")));
    }

    #[tokio::test]
    async fn test_reset_reports_roles_left_behind() {
        let (registry, platform) = registry(true);
        let alice = MemberRef::new("1", "alice");
        registry
            .handle(
                &CommandInvocation::new("verify", moderator())
                    .with_user("user", alice.clone())
                    .with_text("email", "alice@acme.com")
                    .with_text("team", "design"),
            )
            .await;

        platform.fail_role(&RoleId::new("r-des"));
        let reply = registry
            .handle(&CommandInvocation::new("reset", moderator()).with_user("user", alice.clone()))
            .await;

        assert!(reply.content.starts_with("✅ Reset verification for <@1>."));
        assert!(reply.content.contains("Some roles could not be removed"));
        assert!(platform.roles_of(&alice.id).contains(&RoleId::new("r-des")));
        assert!(!platform.roles_of(&alice.id).contains(&RoleId::new("members")));
    }

    #[tokio::test]
    async fn test_purge_requires_exactly_one_target() {
        let (registry, _) = registry(true);
        let reply = registry
            .handle(&CommandInvocation::new("purge", moderator()))
            .await;
        assert!(reply.content.contains("either a user or an email"));

        let reply = registry
            .handle(&CommandInvocation::new("purge", moderator()).with_text("email", "x@acme.com"))
            .await;
        assert!(reply.content.contains("No user found with email"));
    }

    #[test]
    fn test_table_honors_team_toggle() {
        let (with_teams, _) = registry(true);
        let (without_teams, _) = registry(false);

        assert!(with_teams.names().contains(&"changeteam"));
        assert!(!without_teams.names().contains(&"changeteam"));

        let verify = without_teams
            .definitions()
            .into_iter()
            .find(|d| d.name == "verify")
            .unwrap();
        assert!(verify.options.iter().all(|o| o.name != "team"));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (registry, _) = registry(false);
        let reply = registry
            .handle(&CommandInvocation::new("changeteam", moderator()))
            .await;
        assert!(reply.content.contains("Unknown command"));
    }
}
