//! Per-session agent context.

use std::sync::Arc;

use crate::config::TaskSettings;
use crate::world::{Position, World};

/// Everything a task needs, scoped to one connection session.
#[derive(Clone)]
pub struct AgentContext {
    pub world: Arc<dyn World>,
    pub username: String,
    pub tasks: TaskSettings,
    /// Where the agent spawned; the wake reaction walks back here.
    pub home: Option<Position>,
}

impl AgentContext {
    pub fn new(world: Arc<dyn World>, username: &str, tasks: TaskSettings) -> Self {
        let home = Some(world.position().floored());
        Self {
            world,
            username: username.to_string(),
            tasks,
            home,
        }
    }

    pub fn without_home(mut self) -> Self {
        self.home = None;
        self
    }

    /// Send a line to chat.
    pub fn say(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::debug!(agent = %self.username, "chat: {}", message);
        self.world.chat(message);
    }

    pub fn is_self(&self, sender: &str) -> bool {
        sender == self.username
    }
}
