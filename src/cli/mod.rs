//! CLI commands for bunkbot using clap.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::command::{recognize, Recognition};
use crate::config::{load_settings, load_settings_or_default, resolve_settings_path};
use crate::supervisor::{Supervisor, SupervisorExit};
use crate::world::{ConsoleConnector, Scenario};

/// bunkbot - a chat-commanded game agent that sleeps and fetches things.
#[derive(Parser)]
#[command(name = "bunkbot")]
#[command(version)]
#[command(about = "bunkbot - sleeps when told, collects what it's asked for", long_about = None)]
pub struct Commands {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the agent against a console-driven world
    Run {
        /// Settings file (default: ./settings.json, then the config directory)
        #[arg(short, long, env = "BUNKBOT_CONFIG")]
        config: Option<PathBuf>,

        /// Scenario JSON describing the world (default: built-in demo)
        #[arg(short, long)]
        scenario: Option<PathBuf>,
    },

    /// Load and validate settings, then print them
    CheckConfig {
        #[arg(short, long, env = "BUNKBOT_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Show how a chat line is recognized
    Parse {
        /// Chat text
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
}

impl Commands {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Run { config, scenario } => cmd_run(config, scenario).await,
            Command::CheckConfig { config } => cmd_check_config(config),
            Command::Parse { text } => cmd_parse(&text.join(" ")),
        }
    }
}

async fn cmd_run(config: Option<PathBuf>, scenario: Option<PathBuf>) -> Result<()> {
    let settings = load_settings_or_default(config.as_deref())?;

    let scenario = match scenario {
        Some(path) => Scenario::load(&path)
            .with_context(|| format!("loading scenario {}", path.display()))?,
        None => Scenario::demo(),
    };

    println!("bunkbot is up as {}.", settings.bot_account.username);
    println!("Type chat lines. Controls: /wake /day /night /kick <reason> /quit");

    let connector = ConsoleConnector::new(scenario, &settings.bot_account.username);
    let supervisor = Supervisor::new(connector, settings);

    match supervisor.run().await? {
        SupervisorExit::Closed | SupervisorExit::Interrupted => {
            println!("Bye.");
            Ok(())
        }
        SupervisorExit::ReconnectDisabled(reason) => {
            println!("Disconnected: {}", reason);
            Ok(())
        }
        SupervisorExit::DuplicateLogin(reason) => {
            bail!("duplicate login, not reconnecting: {}", reason)
        }
    }
}

fn cmd_check_config(config: Option<PathBuf>) -> Result<()> {
    let path = resolve_settings_path(config.as_deref())?;
    let mut settings = load_settings(Some(&path))?;
    if settings.bot_account.password.is_some() {
        settings.bot_account.password = Some("********".to_string());
    }

    println!("Settings OK: {}", path.display());
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn cmd_parse(text: &str) -> Result<()> {
    match recognize(text) {
        Recognition::NoMatch => println!("no match"),
        Recognition::Match(parsed) if parsed.args.is_empty() => {
            println!("{}", parsed.command)
        }
        Recognition::Match(parsed) => {
            println!("{} {}", parsed.command, parsed.args.join(" "))
        }
    }
    Ok(())
}
