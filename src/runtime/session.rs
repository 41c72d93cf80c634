//! One connection session: world events in, queued jobs out.

use tokio::sync::mpsc;

use crate::agent::AgentContext;
use crate::command::{recognize, Recognition};
use crate::world::WorldEvent;

use super::queue::TaskQueue;

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The connection dropped. `reason` is the kick message when there was one.
    Disconnected { reason: String },
    /// Closed locally.
    Closed,
}

/// Drive a session until the connection ends.
pub async fn run_session(
    ctx: AgentContext,
    mut events: mpsc::UnboundedReceiver<WorldEvent>,
) -> SessionEnd {
    let (queue, worker) = TaskQueue::start(ctx.clone());
    let mut kick_reason: Option<String> = None;

    loop {
        let Some(event) = events.recv().await else {
            break;
        };

        match event {
            WorldEvent::Chat { sender, message } => {
                if ctx.is_self(&sender) {
                    continue;
                }
                let Recognition::Match(command) = recognize(&message) else {
                    tracing::trace!("Ignoring chat from {}: {}", sender, message);
                    continue;
                };
                tracing::info!("{} asked for {}", sender, command.command);

                let name = command.command;
                match queue.submit(&sender, command) {
                    Ok(0) => {}
                    Ok(ahead) => ctx.say(format!("Queued {} ({} ahead).", name, ahead)),
                    Err(e) => tracing::error!("Could not queue {}: {}", name, e),
                }
            }
            WorldEvent::Wake => {
                if let Some(home) = ctx.home {
                    tracing::debug!("Woke up, heading home to {}", home);
                    ctx.world.set_goal(home);
                }
            }
            WorldEvent::Kicked(reason) => {
                tracing::warn!("Kicked: {}", reason);
                kick_reason = Some(reason);
            }
            WorldEvent::Error(detail) => tracing::warn!("Connection error: {}", detail),
            WorldEvent::End => break,
            WorldEvent::Shutdown => {
                tracing::info!("Session closed, finishing {} queued task(s)", queue.depth());
                drop(queue);
                if let Err(e) = worker.await {
                    tracing::error!("Task worker failed: {}", e);
                }
                return SessionEnd::Closed;
            }
        }
    }

    // The world handle is gone; pending jobs cannot run.
    worker.abort();
    let reason = kick_reason.unwrap_or_else(|| "connection ended".to_string());
    tracing::info!("Disconnected: {}", reason);
    SessionEnd::Disconnected { reason }
}
