//! CLI command implementations
//!
//! `start` boots in a fixed order: configuration, logger, identity store
//! (journal replay), mail transport, platform adapter, then the dispatcher
//! and web server. Any failure before serving is fatal.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast;

use crate::config::Settings;
use crate::dispatch::{self, Dispatcher};
use crate::email::SmtpMailer;
use crate::http_server::HttpServer;
use crate::identity::IdentityStore;
use crate::observability::Logger;
use crate::platform::DryRunPlatform;
use crate::verification::Orchestrator;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Start { config } => start(&config),
        Command::CheckConfig { config } => check_config(&config),
        Command::Stats { config } => stats(&config),
    }
}

/// Run the dispatcher and web server until Ctrl-C
pub fn start(config_path: &Path) -> CliResult<()> {
    let settings = Arc::new(Settings::load(config_path)?);
    let logger = Logger::new(settings.log_level);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::Runtime(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(serve(settings, logger))
}

async fn serve(settings: Arc<Settings>, logger: Logger) -> CliResult<()> {
    let store = Arc::new(IdentityStore::open(&settings.data_dir)?);
    let counts = store.stats()?;
    logger.info(
        "STORE_OPENED",
        &[
            ("data_dir", &settings.data_dir.display().to_string()),
            ("records", &counts.total.to_string()),
        ],
    );

    let mailer = Arc::new(SmtpMailer::new(&settings.email)?);
    let platform = Arc::new(DryRunPlatform::new(logger.clone()));
    logger.warn(
        "PLATFORM_DRY_RUN",
        &[("reason", "no gateway bridge linked; outbound calls are only logged")],
    );

    let orchestrator = Orchestrator::new(
        store,
        platform,
        mailer,
        settings.clone(),
        logger.clone(),
    );

    let dispatcher = Arc::new(Dispatcher::new(orchestrator.clone()));
    let names = dispatcher.commands().names().join(",");
    logger.info("COMMANDS_REGISTERED", &[("commands", &names)]);

    let (shutdown_tx, _) = broadcast::channel(1);
    // A gateway bridge would feed events through this sender.
    let (events_tx, events_rx) = dispatch::channel();
    let dispatcher_task = tokio::spawn(dispatcher.run(events_rx, shutdown_tx.subscribe()));

    let server = HttpServer::new(orchestrator);
    let mut server_task = tokio::spawn(server.start(shutdown_tx.subscribe()));

    let early_exit = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.info("SHUTDOWN_REQUESTED", &[]);
            None
        }
        joined = &mut server_task => Some(joined),
    };

    let _ = shutdown_tx.send(());
    drop(events_tx);

    let server_result = match early_exit {
        Some(joined) => joined,
        None => server_task.await,
    };
    let dispatched = dispatcher_task
        .await
        .map_err(|e| CliError::Runtime(format!("dispatcher task failed: {}", e)))?;

    server_result
        .map_err(|e| CliError::Runtime(format!("HTTP server task failed: {}", e)))?
        .map_err(|e| CliError::Io(format!("HTTP server failed: {}", e)))?;

    logger.info(
        "SHUTDOWN_COMPLETE",
        &[("events_dispatched", &dispatched.to_string())],
    );
    Ok(())
}

/// Validate the configuration file and print a summary
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let settings = Settings::load(config_path)?;

    write_response("check-config", json!({
        "config": config_path.display().to_string(),
        "guild_id": settings.platform.guild_id,
        "admin_role": settings.platform.admin_role.as_str(),
        "members_role": settings.platform.members_role.as_ref().map(|r| r.as_str()),
        "team_selection": settings.team_selection,
        "teams": settings.teams.names(),
        "approved_domains": settings.approved_domains,
        "smtp": {
            "host": settings.email.smtp_host,
            "port": settings.email.smtp_port,
            "authenticated": !settings.email.smtp_username.is_empty(),
        },
        "server": settings.server.socket_addr(),
        "base_url": settings.server.base_url,
        "data_dir": settings.data_dir.display().to_string(),
        "log_level": settings.log_level.as_str(),
    }))
}

/// Print record counts as JSON
///
/// Safe to run beside a live `start`: the journal is only read.
pub fn stats(config_path: &Path) -> CliResult<()> {
    let settings = Settings::load(config_path)?;
    let store = IdentityStore::open_read_only(&settings.data_dir)?;
    let stats = store.stats()?;

    write_response("stats", serde_json::to_value(stats)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::TempDir;

    fn write_config(dir: &TempDir, extra: &str) -> std::path::PathBuf {
        let data_dir = dir.path().join("data");
        let path = dir.path().join("gatekeeper.json");
        fs::write(
            &path,
            format!(
                r#"{{
                    "platform": {{ "admin_role": "mods" }},
                    "email": {{ "smtp_host": "smtp.acme.com", "from_address": "bot@acme.com" }},
                    "data_dir": {:?},
                    "features": {{ "enable_team_selection": false }},
                    "approved_domains": [{}]
                }}"#,
                data_dir.display().to_string(),
                extra
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn test_check_config_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "");
        let err = check_config(&path).unwrap_err();
        assert_eq!(err.code_str(), "GATEKEEPER_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_stats_reads_without_creating() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, r#""acme.com""#);
        check_config(&path).unwrap();
        stats(&path).unwrap();
        assert!(!dir.path().join("data").join("identity").exists());

        let journal = dir.path().join("data").join("identity").join("journal.log");
        IdentityStore::open(&dir.path().join("data")).unwrap();
        let before = fs::read(&journal).unwrap();
        stats(&path).unwrap();
        assert_eq!(fs::read(&journal).unwrap(), before);
    }

    #[test]
    fn test_missing_config_file() {
        let err = stats(Path::new("/nonexistent/gatekeeper.json")).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
