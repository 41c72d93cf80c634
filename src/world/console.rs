//! Console connector: drives a [`MemoryWorld`] from stdin.
//!
//! Plain lines are chat from the `console` player. Lines starting with `/`
//! control the fake server: `/wake`, `/day`, `/night`, `/kick <reason>` and
//! `/quit`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use super::{Connection, MemoryWorld, Scenario, WorldEvent};
use crate::error::Result;
use crate::supervisor::Connector;

/// Sender name for lines typed into the console.
pub const CONSOLE_SENDER: &str = "console";

pub struct ConsoleConnector {
    scenario: Scenario,
    username: String,
}

impl ConsoleConnector {
    pub fn new(scenario: Scenario, username: &str) -> Self {
        Self {
            scenario,
            username: username.to_string(),
        }
    }
}

#[async_trait]
impl Connector for ConsoleConnector {
    async fn connect(&self) -> Result<Connection> {
        let (chat_tx, mut chat_rx) = mpsc::unbounded_channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let world = Arc::new(MemoryWorld::new(self.scenario.clone()).with_outbox(chat_tx));

        let username = self.username.clone();
        tokio::spawn(async move {
            while let Some(line) = chat_rx.recv().await {
                println!("<{}> {}", username, line);
            }
        });

        tokio::spawn(read_console(world.clone(), event_tx));

        tracing::info!("Connected to console world as {}", self.username);
        Ok(Connection {
            world,
            events: event_rx,
        })
    }
}

async fn read_console(world: Arc<MemoryWorld>, events: mpsc::UnboundedSender<WorldEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                let _ = events.send(WorldEvent::Shutdown);
                return;
            }
            Err(e) => {
                let _ = events.send(WorldEvent::Error(e.to_string()));
                let _ = events.send(WorldEvent::Shutdown);
                return;
            }
        };

        let event = match parse_console_line(&line) {
            Some(ConsoleLine::Event(event)) => event,
            Some(ConsoleLine::Daytime(daytime)) => {
                world.set_daytime(daytime);
                continue;
            }
            None => continue,
        };

        let ends = matches!(event, WorldEvent::End | WorldEvent::Shutdown);
        let kicked = matches!(event, WorldEvent::Kicked(_));
        if events.send(event).is_err() {
            return;
        }
        if kicked {
            let _ = events.send(WorldEvent::End);
            return;
        }
        if ends {
            return;
        }
    }
}

#[derive(Debug, PartialEq)]
enum ConsoleLine {
    Event(WorldEvent),
    Daytime(bool),
}

fn parse_console_line(line: &str) -> Option<ConsoleLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let Some(control) = line.strip_prefix('/') else {
        return Some(ConsoleLine::Event(WorldEvent::Chat {
            sender: CONSOLE_SENDER.to_string(),
            message: line.to_string(),
        }));
    };

    let (name, rest) = control.split_once(' ').unwrap_or((control, ""));
    match name {
        "wake" => Some(ConsoleLine::Event(WorldEvent::Wake)),
        "day" => Some(ConsoleLine::Daytime(true)),
        "night" => Some(ConsoleLine::Daytime(false)),
        "kick" => {
            let reason = if rest.trim().is_empty() {
                "Kicked by console"
            } else {
                rest.trim()
            };
            Some(ConsoleLine::Event(WorldEvent::Kicked(reason.to_string())))
        }
        "quit" => Some(ConsoleLine::Event(WorldEvent::Shutdown)),
        other => {
            tracing::warn!("Unknown console control: /{}", other);
            None
        }
    }
}
