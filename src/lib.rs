//! bunkbot library root.

pub mod agent;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod supervisor;
pub mod tasks;
pub mod world;

pub use agent::AgentContext;
pub use cli::Commands;
pub use command::{recognize, ParsedCommand, Recognition};
pub use config::{load_settings, Settings};
pub use error::{Error, Result};
pub use supervisor::{Connector, Supervisor};
pub use tasks::{TaskError, TaskOutcome};
pub use world::{MemoryWorld, World};
