//! Inbound events emitted by the chat platform adapter

use tokio::sync::oneshot;

use super::types::{Invoker, MemberRef};

/// Value of a single command option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// A member picked from the platform's user selector
    User(MemberRef),
    /// Free text
    Text(String),
}

/// A named command option as supplied by the invoker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOption {
    pub name: String,
    pub value: OptionValue,
}

/// A moderator command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub name: String,
    pub options: Vec<CommandOption>,
    pub invoker: Invoker,
}

impl CommandInvocation {
    pub fn new(name: impl Into<String>, invoker: Invoker) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
            invoker,
        }
    }

    /// Builder: add a member option
    pub fn with_user(mut self, name: &str, member: MemberRef) -> Self {
        self.options.push(CommandOption {
            name: name.to_string(),
            value: OptionValue::User(member),
        });
        self
    }

    /// Builder: add a text option
    pub fn with_text(mut self, name: &str, text: impl Into<String>) -> Self {
        self.options.push(CommandOption {
            name: name.to_string(),
            value: OptionValue::Text(text.into()),
        });
        self
    }

    /// The member option called `name`, if supplied
    pub fn user(&self, name: &str) -> Option<&MemberRef> {
        self.options.iter().find_map(|opt| match &opt.value {
            OptionValue::User(member) if opt.name == name => Some(member),
            _ => None,
        })
    }

    /// The non-blank text option called `name`, if supplied
    pub fn text(&self, name: &str) -> Option<&str> {
        self.options.iter().find_map(|opt| match &opt.value {
            OptionValue::Text(text) if opt.name == name && !text.trim().is_empty() => {
                Some(text.trim())
            }
            _ => None,
        })
    }
}

/// Reply to a command, shown only to the invoker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub content: String,
}

impl CommandReply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Events delivered by the platform adapter
#[derive(Debug)]
pub enum PlatformEvent {
    /// A member joined the community space
    MemberJoined(MemberRef),

    /// A member sent the bot a direct message
    DirectMessage { author: MemberRef, text: String },

    /// A command was invoked; the reply goes back over `reply_to`
    CommandInvoked {
        invocation: CommandInvocation,
        reply_to: oneshot::Sender<CommandReply>,
    },
}

impl PlatformEvent {
    /// Short name for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            PlatformEvent::MemberJoined(_) => "member_joined",
            PlatformEvent::DirectMessage { .. } => "direct_message",
            PlatformEvent::CommandInvoked { .. } => "command_invoked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::types::RoleId;

    fn invoker() -> Invoker {
        Invoker {
            member: MemberRef::new("mod-1", "mod"),
            roles: vec![RoleId::new("mods")],
            is_administrator: false,
        }
    }

    #[test]
    fn test_option_accessors() {
        let inv = CommandInvocation::new("purge", invoker())
            .with_user("user", MemberRef::new("42", "alice"))
            .with_text("email", "  alice@acme.com ")
            .with_text("reason", "   ");

        assert_eq!(inv.user("user").unwrap().display_name, "alice");
        assert_eq!(inv.text("email"), Some("alice@acme.com"));
        assert_eq!(inv.text("reason"), None);
        assert!(inv.user("email").is_none());
        assert!(inv.text("team").is_none());
    }
}
