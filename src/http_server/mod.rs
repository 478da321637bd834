//! # HTTP Server Module
//!
//! The web half of verification: members land here from the emailed link.
//!
//! # Endpoints
//!
//! - `GET /verify?code=` - Verification page for a code
//! - `POST /api/verify` - Complete verification (`{code, team}`)
//! - `GET /health` - Liveness
//! - `GET /status` - Uptime, platform connection and record counts

pub mod pages;
pub mod routes;
pub mod server;

pub use routes::AppState;
pub use server::{build_router, HttpServer};
