//! Chat-commanded tasks and their outcome contract.
//!
//! Every task resolves to a [`TaskOutcome`] and reports it to chat itself.
//! Failures never propagate past the task boundary: the agent stays
//! responsive and the user reissues the command if they want a retry.

pub mod collect;
pub mod container;
pub mod rest;
pub mod spatial;

use thiserror::Error;

use crate::agent::AgentContext;
use crate::command::{CommandKind, ParsedCommand, HELP_TEXT};
use crate::world::ItemKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Nothing to work with: no surface or material, no recipe.
    #[error("{0}")]
    PreconditionUnmet(String),

    /// A world action was refused.
    #[error("{0}")]
    ActionFailed(String),

    #[error("usage: {0}")]
    UsageError(String),

    /// Every fallback ran and the goal is still short.
    #[error("only have {have}/{target} {kind}, {} short", .target - .have)]
    PartialSuccess {
        kind: ItemKind,
        have: u32,
        target: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Satisfied,
    PartiallySatisfied(u32),
    Failed(TaskError),
}

/// Chat line for a task error: the message with its first letter raised.
pub(crate) fn sentence(error: &TaskError) -> String {
    let line = error.to_string();
    let mut chars = line.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Run one recognized command to completion.
pub async fn run(ctx: &AgentContext, command: &ParsedCommand) -> TaskOutcome {
    let outcome = match command.command {
        CommandKind::Rest => rest::run(ctx).await,
        CommandKind::Collect => collect::run(ctx, &command.args).await,
        CommandKind::Help => {
            ctx.say(HELP_TEXT);
            TaskOutcome::Satisfied
        }
    };

    match &outcome {
        TaskOutcome::Satisfied => tracing::info!("Task {} satisfied", command.command),
        TaskOutcome::PartiallySatisfied(have) => {
            tracing::info!("Task {} partially satisfied ({})", command.command, have)
        }
        TaskOutcome::Failed(e) => tracing::warn!("Task {} failed: {}", command.command, e),
    }
    outcome
}
