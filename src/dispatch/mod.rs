//! # Event Dispatcher
//!
//! Fans inbound platform events out to one task each, so a slow email send
//! or role call for one member never stalls anyone else. Every task logs
//! under its own correlation id.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::commands::CommandRegistry;
use crate::observability::Logger;
use crate::platform::PlatformEvent;
use crate::verification::{Orchestrator, VerifyError};

/// Event sender handed to the platform adapter
pub type EventSender = mpsc::Sender<PlatformEvent>;

/// Event receiver consumed by [`Dispatcher::run`]
pub type EventReceiver = mpsc::Receiver<PlatformEvent>;

/// Bounded queue between adapter and dispatcher
pub const EVENT_QUEUE_DEPTH: usize = 256;

/// Create the adapter-to-dispatcher channel
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_QUEUE_DEPTH)
}

/// Routes platform events to the orchestrator and command table
pub struct Dispatcher {
    orchestrator: Orchestrator,
    commands: CommandRegistry,
}

impl Dispatcher {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let commands = CommandRegistry::new(orchestrator.clone());
        Self {
            orchestrator,
            commands,
        }
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Consume events until the channel closes or shutdown fires
    ///
    /// In-flight tasks are awaited before returning. Returns the number of
    /// events dispatched.
    pub async fn run(
        self: Arc<Self>,
        mut events: EventReceiver,
        mut shutdown: broadcast::Receiver<()>,
    ) -> usize {
        let logger = self.orchestrator.logger().clone();
        logger.info("DISPATCHER_STARTED", &[]);

        let mut tasks = JoinSet::new();
        let mut dispatched = 0usize;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    dispatched += 1;
                    let this = Arc::clone(&self);
                    tasks.spawn(async move { this.handle(event).await });
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        logger.error("DISPATCH_TASK_PANICKED", &[("error", &e.to_string())]);
                    }
                }

                _ = shutdown.recv() => {
                    logger.info("DISPATCHER_SHUTDOWN_REQUESTED", &[]);
                    break;
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                logger.error("DISPATCH_TASK_PANICKED", &[("error", &e.to_string())]);
            }
        }

        logger.info(
            "DISPATCHER_STOPPED",
            &[("dispatched", &dispatched.to_string())],
        );
        dispatched
    }

    /// Handle one event under a fresh correlation id
    pub async fn handle(&self, event: PlatformEvent) {
        let correlation_id = Uuid::new_v4().to_string();
        let logger = self
            .orchestrator
            .logger()
            .with_field("correlation_id", &correlation_id);
        logger.debug("EVENT_RECEIVED", &[("kind", event.kind())]);

        let orchestrator = self.orchestrator.with_logger(logger.clone());

        match event {
            PlatformEvent::MemberJoined(member) => {
                let result = orchestrator.member_joined(&member).await;
                log_handled(&logger, "member_joined", result.as_ref().err());
            }
            PlatformEvent::DirectMessage { author, text } => {
                let result = orchestrator.direct_message(&author, &text).await;
                log_handled(&logger, "direct_message", result.as_ref().err());
            }
            PlatformEvent::CommandInvoked {
                invocation,
                reply_to,
            } => {
                let reply = self.commands.handle_with(&orchestrator, &invocation).await;
                if reply_to.send(reply).is_err() {
                    logger.warn(
                        "COMMAND_REPLY_DROPPED",
                        &[("command", invocation.name.as_str())],
                    );
                }
            }
        }
    }
}

/// Note how an event ended; the orchestrator has already logged the failure itself
fn log_handled(logger: &Logger, kind: &str, err: Option<&VerifyError>) {
    let outcome = err.map(|e| e.code()).unwrap_or("OK");
    logger.debug("EVENT_HANDLED", &[("kind", kind), ("outcome", outcome)]);
}
