//! The polymorphic deploy behavior the conductor orchestrates.
//!
//! Every action variant (push, stop, start) implements the same phase
//! contract; the conductor neither knows nor cares which one it is driving.
//! Per-foundation phases receive the worker's courier and the foundation's
//! output buffer; whatever the platform printed is appended to the buffer
//! whether the phase succeeded or not.

use anyhow::Result;

use crate::config::Environment;
use crate::courier::Courier;
use crate::error::{CutoverError, FoundationFailure};

/// The operations an action can embody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ActionKind {
    Push,
    Stop,
    Start,
}

/// Observations made during the execute phase, reported to the conductor
/// even when the phase fails.
#[derive(Debug, Default)]
pub struct ExecuteReport {
    /// The application already existed on this foundation. The conductor
    /// derives the first-deploy flag from this after the execute barrier.
    pub app_existed: bool,
    /// Recent application logs captured for post-mortem inspection.
    pub logs: Option<Vec<u8>>,
}

/// Phase contract shared by all action variants.
///
/// For each foundation the phase order is `initially` then `execute`, then
/// exactly one of `success` or `undo`. No `execute` runs unless every
/// `initially` succeeded, and `clean_up` runs exactly once per action
/// regardless of outcome; both guarantees are the conductor's responsibility.
pub trait Action: Send + Sync {
    /// One-time preparation before any per-foundation work. Idempotent:
    /// calling it again on the same action is a no-op.
    fn set_up(&mut self, environment: &Environment) -> Result<(), CutoverError>;

    /// Emits the operation's start event. Runs after set-up, before fan-out.
    fn on_start(&self) -> Result<(), CutoverError>;

    /// Per-foundation login and prechecks.
    fn initially(&self, courier: &dyn Courier, foundation: &str, out: &mut Vec<u8>) -> Result<()>;

    /// Best-effort removal of a parked instance a crashed predecessor left
    /// behind. Returns whether one was found. Errors are logged by the
    /// conductor, never fatal.
    fn clean_venerable(
        &self,
        courier: &dyn Courier,
        foundation: &str,
        out: &mut Vec<u8>,
    ) -> Result<bool> {
        let _ = (courier, foundation, out);
        Ok(false)
    }

    /// Per-foundation main work. Observations are recorded on `report` even
    /// when the phase fails.
    fn execute(
        &self,
        courier: &dyn Courier,
        foundation: &str,
        out: &mut Vec<u8>,
        report: &mut ExecuteReport,
    ) -> Result<()>;

    /// Per-foundation rollback of `execute`.
    fn undo(
        &self,
        courier: &dyn Courier,
        foundation: &str,
        first_deploy: bool,
        out: &mut Vec<u8>,
    ) -> Result<()>;

    /// Per-foundation commit after every foundation's `execute` succeeded.
    fn success(&self, courier: &dyn Courier, foundation: &str, out: &mut Vec<u8>) -> Result<()>;

    /// Releases per-action resources. Invoked on every exit path.
    fn clean_up(&self);

    /// Aggregates login-phase failures into one typed error.
    fn initially_error(&self, failures: Vec<FoundationFailure>) -> CutoverError;

    /// Aggregates execute-phase failures when no rollback was attempted.
    fn execute_error(&self, failures: Vec<FoundationFailure>) -> CutoverError;

    /// Aggregates execute- and undo-phase failures after a rollback.
    fn undo_error(
        &self,
        execute: Vec<FoundationFailure>,
        undo: Vec<FoundationFailure>,
    ) -> CutoverError;

    /// Aggregates success-phase failures.
    fn success_error(&self, failures: Vec<FoundationFailure>) -> CutoverError;
}
