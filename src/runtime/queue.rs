//! Single-consumer task queue.
//!
//! Commands for one agent run strictly one after another. A command that
//! arrives while another runs waits its turn; nothing preempts a running task.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use ulid::Ulid;

use crate::agent::AgentContext;
use crate::command::ParsedCommand;
use crate::error::{Error, Result};
use crate::tasks::{self, TaskOutcome};

/// A queued command.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Ulid,
    pub requester: String,
    pub command: ParsedCommand,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(requester: &str, command: ParsedCommand) -> Self {
        Self {
            id: Ulid::new(),
            requester: requester.to_string(),
            command,
            enqueued_at: Utc::now(),
        }
    }
}

/// Handle for submitting jobs to the agent's worker.
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Job>,
    depth: Arc<AtomicUsize>,
}

impl TaskQueue {
    /// Start a worker that runs jobs through the task pipeline.
    pub fn start(ctx: AgentContext) -> (Self, JoinHandle<()>) {
        Self::start_with(ctx, |ctx, command| async move {
            tasks::run(&ctx, &command).await
        })
    }

    /// Start a worker with a custom job runner.
    pub fn start_with<F, Fut>(ctx: AgentContext, runner: F) -> (Self, JoinHandle<()>)
    where
        F: Fn(AgentContext, ParsedCommand) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskOutcome> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        let worker = tokio::spawn(work(ctx, rx, depth.clone(), runner));
        (Self { tx, depth }, worker)
    }

    /// Enqueue a command. Returns how many jobs are ahead of it, counting the
    /// one currently running.
    pub fn submit(&self, requester: &str, command: ParsedCommand) -> Result<usize> {
        let job = Job::new(requester, command);
        let ahead = self.depth.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(job = %job.id, requester, ahead, "Queued {}", job.command.command);

        if self.tx.send(job).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Queue("task worker has stopped".to_string()));
        }
        Ok(ahead)
    }

    /// Jobs waiting or running.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

async fn work<F, Fut>(
    ctx: AgentContext,
    mut rx: mpsc::UnboundedReceiver<Job>,
    depth: Arc<AtomicUsize>,
    runner: F,
) where
    F: Fn(AgentContext, ParsedCommand) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskOutcome> + Send + 'static,
{
    while let Some(job) = rx.recv().await {
        let waited = Utc::now() - job.enqueued_at;
        tracing::info!(
            job = %job.id,
            requester = %job.requester,
            waited_ms = waited.num_milliseconds(),
            "Running {}",
            job.command.command
        );

        // Run in its own task so a panic stops at this boundary.
        let handle = tokio::spawn(runner(ctx.clone(), job.command.clone()));
        let _running = AbortOnDrop(handle.abort_handle());
        if let Err(e) = handle.await {
            let detail = if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                e.to_string()
            };
            tracing::error!(job = %job.id, "Task {} crashed: {}", job.command.command, detail);
            ctx.say(format!("Unexpected error: {}", detail));
        }

        depth.fetch_sub(1, Ordering::SeqCst);
    }
    tracing::debug!("Task queue closed");
}

/// Aborts the running job if the worker is dropped while awaiting it.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "task panicked".to_string(),
        },
    }
}
