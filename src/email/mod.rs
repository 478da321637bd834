//! # Email Transport
//!
//! Outbound mail for the verification step. The orchestrator only sees the
//! [`Mailer`] trait; the SMTP transport and the recording mock live here.

mod errors;
mod template;

pub use errors::{EmailError, EmailResult};
pub use template::{escape_html, verification_link, VerificationEmail, VERIFICATION_SUBJECT};

use std::sync::RwLock;

use futures_util::future::{BoxFuture, FutureExt};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailSettings;

/// A fully rendered, addressed email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Email sender abstraction
pub trait Mailer: Send + Sync {
    /// Send one email; delivery beyond the relay accepting it is best effort
    fn send<'a>(&'a self, email: &'a OutgoingEmail) -> BoxFuture<'a, EmailResult<()>>;
}

// ==================
// Mock
// ==================

/// Mailer that records instead of sending
#[derive(Debug, Default)]
pub struct MockMailer {
    sent: RwLock<Vec<OutgoingEmail>>,
    fail_with: RwLock<Option<EmailError>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get number of sent emails
    pub fn sent_count(&self) -> usize {
        self.sent.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Sent emails, oldest first
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Most recent email sent to `to`
    pub fn last_to(&self, to: &str) -> Option<OutgoingEmail> {
        self.sent().into_iter().rev().find(|e| e.to == to)
    }

    /// Fail every subsequent send with `error` (or stop failing with `None`)
    pub fn fail_with(&self, error: Option<EmailError>) {
        if let Ok(mut f) = self.fail_with.write() {
            *f = error;
        }
    }
}

impl Mailer for MockMailer {
    fn send<'a>(&'a self, email: &'a OutgoingEmail) -> BoxFuture<'a, EmailResult<()>> {
        async move {
            if let Some(error) = self.fail_with.read().ok().and_then(|f| f.clone()) {
                return Err(error);
            }
            self.sent
                .write()
                .map_err(|_| EmailError::Send("mock mailbox poisoned".to_string()))?
                .push(email.clone());
            Ok(())
        }
        .boxed()
    }
}

// ==================
// SMTP
// ==================

/// SMTP sender over lettre's tokio transport
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(settings: &EmailSettings) -> EmailResult<Self> {
        let from = parse_mailbox(&format!(
            "{} <{}>",
            settings.from_name, settings.from_address
        ))?;

        let transport = if settings.smtp_username.is_empty() {
            // No authentication (for local development SMTP relays)
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.smtp_host)
                .port(settings.smtp_port)
                .build()
        } else {
            let creds = Credentials::new(
                settings.smtp_username.clone(),
                settings.smtp_password.clone(),
            );

            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.smtp_host)
                .map_err(|e| EmailError::Relay(e.to_string()))?
                .credentials(creds)
                .port(settings.smtp_port)
                .build()
        };

        Ok(Self { from, transport })
    }

    fn build_message(&self, email: &OutgoingEmail) -> EmailResult<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&email.to)?)
            .subject(email.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                email.text_body.clone(),
                email.html_body.clone(),
            ))
            .map_err(|e| EmailError::Build(e.to_string()))
    }
}

impl Mailer for SmtpMailer {
    fn send<'a>(&'a self, email: &'a OutgoingEmail) -> BoxFuture<'a, EmailResult<()>> {
        async move {
            let message = self.build_message(email)?;
            self.transport
                .send(message)
                .await
                .map_err(|e| EmailError::Send(e.to_string()))?;
            Ok(())
        }
        .boxed()
    }
}

fn parse_mailbox(address: &str) -> EmailResult<Mailbox> {
    address.parse().map_err(|e: lettre::address::AddressError| {
        EmailError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outgoing(to: &str) -> OutgoingEmail {
        OutgoingEmail {
            to: to.to_string(),
            subject: "s".to_string(),
            text_body: "t".to_string(),
            html_body: "<p>h</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_mailer() {
        let mailer = MockMailer::new();
        mailer.send(&outgoing("a@acme.com")).await.unwrap();
        assert_eq!(mailer.sent_count(), 1);
        assert_eq!(mailer.last_to("a@acme.com").unwrap().subject, "s");

        mailer.fail_with(Some(EmailError::Send("relay down".to_string())));
        assert!(mailer.send(&outgoing("b@acme.com")).await.is_err());
        assert_eq!(mailer.sent_count(), 1);
    }

    #[test]
    fn test_smtp_message_is_multipart() {
        let settings = EmailSettings {
            smtp_host: "localhost".to_string(),
            smtp_port: 1025,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: "bot@acme.com".to_string(),
            from_name: "Acme Bot".to_string(),
        };
        let mailer = SmtpMailer::new(&settings).unwrap();

        let message = mailer.build_message(&outgoing("alice@acme.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("alice@acme.com"));

        assert!(matches!(
            mailer.build_message(&outgoing("not an address")),
            Err(EmailError::InvalidAddress { .. })
        ));
    }
}
