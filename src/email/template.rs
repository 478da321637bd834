//! Verification email rendering

use super::OutgoingEmail;
use crate::config::Settings;

pub const VERIFICATION_SUBJECT: &str = "Verify Your Discord Account";

/// Escape text for interpolation into HTML
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Link the member follows to complete verification
pub fn verification_link(base_url: &str, code: &str) -> String {
    format!("{}/verify?code={}", base_url, code)
}

/// Rendered verification email, not yet addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationEmail {
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

impl VerificationEmail {
    pub fn render(settings: &Settings, display_name: &str, code: &str) -> Self {
        let link = verification_link(&settings.server.base_url, code);
        let signature = &settings.email.from_name;

        let (text_steps, html_steps) = if settings.team_selection {
            (
                "This link will allow you to:\n\
                 1. Confirm your email address\n\
                 2. Select your team role\n\n\
                 Once you've completed these steps, you'll be granted access to the server.",
                "<p><strong>This link will allow you to:</strong></p>\n\
                 <ol>\n<li>Confirm your email address</li>\n<li>Select your team role</li>\n</ol>\n\
                 <p>Once you've completed these steps, you'll be granted access to the server.</p>",
            )
        } else {
            (
                "Once you've confirmed your email address, you'll be granted access to the server.",
                "<p>Once you've confirmed your email address, you'll be granted access to the server.</p>",
            )
        };

        let text_body = format!(
            "Hello {name},\n\n\
             Welcome to the server! Please verify your email address by clicking the link below:\n\n\
             {link}\n\n\
             {steps}\n\n\
             If you didn't request this verification, please ignore this email.\n\n\
             Best regards,\n\
             {signature}",
            name = display_name,
            link = link,
            steps = text_steps,
            signature = signature,
        );

        let link_html = escape_html(&link);
        let html_body = format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<style>
body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
.container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
.button {{ display: inline-block; padding: 15px 30px; background: #5865f2; color: white; text-decoration: none; border-radius: 5px; font-weight: bold; margin: 20px 0; }}
.steps {{ background: #f4f4f4; padding: 20px; border-radius: 5px; margin: 20px 0; }}
.footer {{ text-align: center; color: #666; font-size: 12px; margin-top: 20px; }}
</style>
</head>
<body>
<div class="container">
<p>Hello <strong>{name}</strong>,</p>
<p>Welcome to the server! Please verify your email address to complete your registration.</p>
<p style="text-align: center;"><a href="{link}" class="button">Verify My Email</a></p>
<p style="text-align: center; color: #666; font-size: 14px;">Or copy and paste this link into your browser:<br><code>{link}</code></p>
<div class="steps">
{steps}
</div>
<p style="color: #666; font-size: 14px;">If you didn't request this verification, please ignore this email.</p>
<div class="footer"><p>Best regards,<br>{signature}</p></div>
</div>
</body>
</html>"#,
            name = escape_html(display_name),
            link = link_html,
            steps = html_steps,
            signature = escape_html(signature),
        );

        Self {
            subject: VERIFICATION_SUBJECT.to_string(),
            text_body,
            html_body,
        }
    }

    /// Address the rendered email
    pub fn to(self, address: impl Into<String>) -> OutgoingEmail {
        OutgoingEmail {
            to: address.into(),
            subject: self.subject,
            text_body: self.text_body,
            html_body: self.html_body,
        }
    }
}
