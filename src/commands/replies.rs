//! Reply rendering for moderator commands

use std::fmt::Write;

use crate::identity::{IdentityRecord, StoreStats, VerificationState};
use crate::platform::{CommandReply, MemberRef};
use crate::verification::Outcome;

/// Replies longer than this are cut to stay under platform message limits
const MAX_LIST_ENTRIES: usize = 50;

pub(super) fn stats(stats: &StoreStats) -> CommandReply {
    CommandReply::new(format!(
        "📊 **Verification Statistics**\n\
         **Total Users:** {}\n**Verified:** {}\n**Pending:** {}\n**Restricted:** {}",
        stats.total, stats.verified, stats.pending, stats.restricted
    ))
}

fn status_of(record: &IdentityRecord) -> String {
    match (record.state, record.team()) {
        (VerificationState::Pending, _) => "⏳ Pending".to_string(),
        (VerificationState::Verified, Some(team)) => format!("✅ Verified ({})", team),
        (VerificationState::Verified, None) => "✅ Verified".to_string(),
        (VerificationState::Restricted, Some(team)) => format!("⚠️ Restricted (was {})", team),
        (VerificationState::Restricted, None) => "⚠️ Restricted".to_string(),
    }
}

pub(super) fn list(records: &[IdentityRecord]) -> CommandReply {
    if records.is_empty() {
        return CommandReply::new("No users in the database yet.");
    }

    let mut out = String::from("👥 **User List**\n\n");
    for record in records.iter().take(MAX_LIST_ENTRIES) {
        let _ = write!(
            out,
            "**{}**\n└ {}\n└ {}\n\n",
            record.display_name,
            record.email,
            status_of(record)
        );
    }
    if records.len() > MAX_LIST_ENTRIES {
        let _ = write!(out, "…and {} more", records.len() - MAX_LIST_ENTRIES);
    }
    CommandReply::new(out.trim_end())
}

pub(super) fn verified(target: &MemberRef, outcome: &Outcome) -> CommandReply {
    if outcome.roles_degraded() {
        return CommandReply::new(
            "⚠️ User verified in database but failed to assign roles. Please assign manually.",
        );
    }

    let record = outcome.record.as_ref();
    let email = record.map(|r| r.email.as_str()).unwrap_or_default();
    match record.and_then(|r| r.team()) {
        Some(team) => CommandReply::new(format!(
            "✅ Successfully verified {} with email `{}` and assigned to **{}** team.",
            target.id.mention(),
            email,
            team
        )),
        None => CommandReply::new(format!(
            "✅ Successfully verified {} with email `{}`.",
            target.id.mention(),
            email
        )),
    }
}

pub(super) fn team_changed(target: &MemberRef, outcome: &Outcome) -> CommandReply {
    if outcome.roles_degraded() {
        return CommandReply::new(
            "⚠️ Team changed in database but role update failed. Please assign manually.",
        );
    }

    let team_of = |r: Option<&IdentityRecord>| {
        r.and_then(|r| r.team()).unwrap_or("none").to_string()
    };
    CommandReply::new(format!(
        "✅ Changed {} from **{}** to **{}** team.",
        target.id.mention(),
        team_of(outcome.previous.as_ref()),
        team_of(outcome.record.as_ref())
    ))
}

pub(super) fn restricted(
    target: &MemberRef,
    reason: Option<&str>,
    outcome: &Outcome,
) -> CommandReply {
    let mut out = format!("✅ Restricted {}.", target.id.mention());
    if let Some(reason) = reason {
        let _ = write!(out, "\n**Reason:** {}", reason);
    }
    out.push_str(
        "\n\nUser has been notified and their roles removed. Use `/unrestrict` to restore access.",
    );
    if outcome.roles_degraded() {
        out.push_str("\n\n⚠️ Some roles could not be removed. Please remove them manually.");
    }
    if !outcome.notified {
        out.push_str("\n\n⚠️ The user could not be notified by direct message.");
    }
    CommandReply::new(out)
}

pub(super) fn unrestricted(target: &MemberRef, outcome: &Outcome) -> CommandReply {
    if outcome.roles_degraded() {
        return CommandReply::new("⚠️ Failed to assign roles. Please assign manually.");
    }

    match outcome.record.as_ref().and_then(|r| r.team()) {
        Some(team) => CommandReply::new(format!(
            "✅ Removed restrictions from {} on the **{}** team. Their access has been restored.",
            target.id.mention(),
            team
        )),
        None => CommandReply::new(format!(
            "✅ Removed restrictions from {}. Their access has been restored.",
            target.id.mention()
        )),
    }
}

pub(super) fn reset(target: &MemberRef, outcome: &Outcome) -> CommandReply {
    let mut out = format!(
        "✅ Reset verification for {}. They can now start the verification process again.",
        target.id.mention()
    );
    if outcome.roles_degraded() {
        out.push_str("\n\n⚠️ Some roles could not be removed. Please remove them manually.");
    }
    CommandReply::new(out)
}

pub(super) fn purged(outcome: &Outcome) -> CommandReply {
    let Some(record) = outcome.previous.as_ref() else {
        return CommandReply::new("✅ User data purged successfully.");
    };

    let mut out = format!(
        "✅ User data purged successfully.\n\n**User:** {}\n**Email:** {}\n**Account ID:** {}\n\n\
         All user data has been permanently removed from the database.",
        record.display_name, record.email, record.platform_id
    );
    if outcome.roles_degraded() {
        out.push_str("\n\n⚠️ Some roles could not be removed. Please remove them manually.");
    }
    CommandReply::new(out)
}

pub(super) fn domains(domains: &[String]) -> CommandReply {
    let mut out = String::from("📧 **Approved Email Domains**\n");
    for domain in domains {
        let _ = write!(out, "\n• {}", domain);
    }
    CommandReply::new(out)
}

pub(super) fn help(team_selection: bool, is_admin: bool) -> CommandReply {
    let completion = if team_selection {
        "Click the link, select your team, and you're all set!"
    } else {
        "Click the link and confirm, and you're all set!"
    };

    let mut out = format!(
        "🛡️ **Gatekeeper Help**\n\
         I manage server access through work email verification.\n\n\
         **🆕 New Users**\n\
         When you join the server, I'll send you a DM. Simply reply with your work email \
         address, and I'll send you a verification link. {}\n\n\
         **📧 Email Requirements**\n\
         Your email must be from an approved company domain. Each email can only be used once.",
        completion
    );

    if is_admin {
        out.push_str(
            "\n\n**🔧 Moderator Commands**\n\
             `/stats` - View verification statistics\n\
             `/list` - List all users\n\
             `/reset` - Reset a user's verification\n\
             `/verify` - Manually verify a user\n",
        );
        if team_selection {
            out.push_str("`/changeteam` - Change a user's team\n");
        }
        out.push_str(
            "`/restrict` - Temporarily restrict a user's access\n\
             `/unrestrict` - Remove restrictions from a user\n\
             `/purge` - Permanently delete user data\n\
             `/domains` - View approved domains",
        );
    }

    CommandReply::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::platform::PlatformId;

    fn record(name: &str, state: VerificationState, team: Option<&str>) -> IdentityRecord {
        IdentityRecord {
            platform_id: PlatformId::new(name),
            display_name: name.to_string(),
            email: format!("{}@acme.com", name),
            code_digest: format!("digest-{}", name),
            team_role: team.map(String::from),
            state,
            restriction_reason: None,
            created_at: Utc::now(),
            verified_at: None,
        }
    }

    #[test]
    fn test_list_renders_each_state() {
        let reply = list(&[
            record("ann", VerificationState::Pending, None),
            record("ben", VerificationState::Verified, Some("design")),
            record("cat", VerificationState::Restricted, Some("design")),
        ]);
        assert!(reply.content.contains("**ann**\n└ ann@acme.com\n└ ⏳ Pending"));
        assert!(reply.content.contains("✅ Verified (design)"));
        assert!(reply.content.contains("⚠️ Restricted (was design)"));
    }

    #[test]
    fn test_list_is_capped() {
        let records: Vec<_> = (0..MAX_LIST_ENTRIES + 3)
            .map(|i| record(&format!("m{}", i), VerificationState::Pending, None))
            .collect();
        assert!(list(&records).content.ends_with("…and 3 more"));
        assert_eq!(list(&[]).content, "No users in the database yet.");
    }

    #[test]
    fn test_degraded_role_sync_asks_for_manual_fix() {
        let mut outcome = Outcome::default();
        outcome.roles.failed.push(crate::roles::RoleFailure {
            role: crate::platform::RoleId::new("r-eng"),
            error: crate::platform::PlatformError::NotConnected,
        });
        let target = MemberRef::new("1", "alice");

        assert!(verified(&target, &outcome).content.contains("Please assign manually"));
        assert!(unrestricted(&target, &outcome).content.contains("Please assign manually"));
        assert!(reset(&target, &outcome).content.contains("Please remove them manually"));
        assert!(!reset(&target, &Outcome::default()).content.contains("⚠️"));
    }

    #[test]
    fn test_help_omits_changeteam_without_teams() {
        assert!(!help(false, true).content.contains("/changeteam"));
        assert!(help(true, true).content.contains("/changeteam"));
        assert!(!help(true, false).content.contains("Moderator Commands"));
    }
}
