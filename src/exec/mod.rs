//! Privileged command execution
//!
//! Runs single shell-style command lines through an elevated shell and
//! bounds how many of them may be in flight at once.

mod pool;
mod su;

pub use pool::{PoolError, WorkerPool};
pub use su::SuExecutor;

/// Runs one command line with elevated privileges.
///
/// Implementations block until the privileged process exits and must never
/// panic or return an error past this call: failures are logged and
/// reported as `false`.
pub trait PrivilegedExecutor: Send + Sync + 'static {
    /// Execute `command` verbatim, returning whether it exited successfully
    fn execute(&self, command: &str) -> bool;
}
