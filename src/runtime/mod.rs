//! Agent runtime: the per-session event loop and its task queue.

pub mod queue;
pub mod session;

pub use queue::{Job, TaskQueue};
pub use session::{run_session, SessionEnd};
