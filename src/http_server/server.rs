//! # HTTP Server
//!
//! Combines the route groups into one axum router and serves it until the
//! shutdown signal fires.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::verification::Orchestrator;

use super::routes::{health_routes, verify_routes, AppState};

/// Web surface for verification links
pub struct HttpServer {
    addr: String,
    state: Arc<AppState>,
    router: Router,
}

impl HttpServer {
    /// Bind address comes from the orchestrator's settings
    pub fn new(orchestrator: Orchestrator) -> Self {
        let addr = orchestrator.settings().server.socket_addr();
        let state = Arc::new(AppState::new(orchestrator));
        let router = build_router(state.clone());
        Self {
            addr,
            state,
            router,
        }
    }

    pub fn socket_addr(&self) -> &str {
        &self.addr
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until `shutdown` fires
    pub async fn start(self, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr: SocketAddr = self.addr.parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid socket address '{}': {}", self.addr, e),
            )
        })?;

        let logger = self.state.orchestrator.logger().clone();
        let listener = TcpListener::bind(addr).await?;
        logger.info("HTTP_SERVER_LISTENING", &[("addr", &addr.to_string())]);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        logger.info("HTTP_SERVER_STOPPED", &[]);
        Ok(())
    }
}

/// Combined router over shared state
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health_routes(state.clone()))
        .merge(verify_routes(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::Settings;
    use crate::email::MockMailer;
    use crate::identity::IdentityStore;
    use crate::observability::Logger;
    use crate::platform::RecordingPlatform;

    #[test]
    fn test_server_uses_configured_addr() {
        let settings = Settings::from_json(
            r#"{
                "platform": { "admin_role": "mods" },
                "email": { "smtp_host": "smtp.acme.com", "from_address": "bot@acme.com" },
                "server": { "host": "127.0.0.1", "port": 9090 },
                "features": { "enable_team_selection": false },
                "approved_domains": ["acme.com"]
            }"#,
        )
        .unwrap();
        let orchestrator = Orchestrator::new(
            Arc::new(IdentityStore::in_memory()),
            Arc::new(RecordingPlatform::new()),
            Arc::new(MockMailer::new()),
            Arc::new(settings),
            Logger::disabled(),
        );

        let server = HttpServer::new(orchestrator);
        assert_eq!(server.socket_addr(), "127.0.0.1:9090");
        let _router = server.router();
    }
}
