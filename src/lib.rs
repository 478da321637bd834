//! gatekeeper - work-email verification for community chat spaces
//!
//! Binds a member's platform identity to a verified work email address,
//! optionally followed by a team choice, with moderator override and
//! reversible restriction. Three entry points race on the same records: the
//! chat event stream, the web callback and moderator commands.

pub mod cli;
pub mod commands;
pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod email;
pub mod http_server;
pub mod identity;
pub mod observability;
pub mod platform;
pub mod policy;
pub mod roles;
pub mod verification;
