//! Member-facing message text

pub const ALREADY_VERIFIED: &str = "✅ You're already verified!";

pub const RESTRICTED: &str = "⚠️ Your access has been temporarily restricted. Please contact a moderator to reactivate your account. You cannot use the automatic verification system.";

pub const INVALID_FORMAT: &str =
    "❌ That doesn't look like a valid email address. Please try again.";

pub const EMAIL_TAKEN: &str =
    "❌ This email address is already registered. Each email can only be used once.";

pub const ALREADY_IN_PROGRESS: &str = "❌ You've already started the verification process. Please check your email for the verification link.";

pub const EMAIL_SEND_FAILED: &str =
    "❌ Failed to send verification email. Please contact an administrator.";

pub const INTERNAL_ERROR: &str = "❌ An error occurred. Please try again later.";

pub const RESET: &str = "Your verification has been reset by an administrator. Please send me your work email address to start the verification process again.";

pub const PURGED: &str = "Your data has been permanently deleted from our system. If you wish to rejoin in the future, you will need to complete the verification process again.";

pub fn domain_not_approved(email: &str) -> String {
    format!(
        "❌ Sorry, the domain for {} is not approved. Please use your work email from an approved company domain.",
        email
    )
}

pub fn email_sent(email: &str, team_selection: bool) -> String {
    let next = if team_selection {
        "You'll be asked to select your team, and then you'll have full access to the server."
    } else {
        "Once you verify, you'll have full access to the server."
    };
    format!(
        "✅ Verification email sent to **{}**!\n\nPlease check your inbox and click the verification link. {}",
        email, next
    )
}

pub fn verification_complete(team: Option<&str>) -> String {
    match team {
        Some(team) => format!(
            "✅ Verification complete! Welcome to the {} team. You now have access to the server.",
            team
        ),
        None => "✅ Verification complete! You now have access to the server.".to_string(),
    }
}

pub fn manually_verified(team: Option<&str>) -> String {
    match team {
        Some(team) => format!(
            "✅ You have been manually verified by a moderator! Welcome to the **{}** team. You now have access to the server.",
            team
        ),
        None => {
            "✅ You have been manually verified by a moderator! You now have access to the server."
                .to_string()
        }
    }
}

pub fn team_changed(from: Option<&str>, to: &str) -> String {
    format!(
        "📝 Your team has been changed from **{}** to **{}** by a moderator.",
        from.unwrap_or("none"),
        to
    )
}

pub fn restricted(reason: Option<&str>) -> String {
    let mut message =
        "⚠️ Your server access has been temporarily restricted by a moderator.".to_string();
    if let Some(reason) = reason {
        message.push_str(&format!("\n**Reason:** {}", reason));
    }
    message.push_str(
        "\n\nYou cannot use the automatic verification system. Please contact a moderator to restore your account.",
    );
    message
}

pub fn unrestricted(team: Option<&str>) -> String {
    match team {
        Some(team) => format!(
            "✅ Your server access has been restored by a moderator! Welcome back to the **{}** team.",
            team
        ),
        None => "✅ Your server access has been restored by a moderator! Welcome back.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restricted_reason_is_optional() {
        assert!(restricted(Some("spam")).contains("**Reason:** spam"));
        assert!(!restricted(None).contains("Reason"));
    }

    #[test]
    fn test_email_sent_mentions_team_only_when_enabled() {
        assert!(email_sent("a@acme.com", true).contains("select your team"));
        assert!(!email_sent("a@acme.com", false).contains("team"));
    }
}
