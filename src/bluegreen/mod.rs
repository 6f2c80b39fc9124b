//! The blue-green orchestration core.
//!
//! One deploy fans the same staged operation sequence out over every
//! foundation of an environment:
//!
//! 1. **set-up** — one-time preparation (artifact fetch, manifest decode)
//! 2. **initially** — per-foundation login
//! 3. **execute** — per-foundation main work (push, stop, start)
//! 4. **success** or **undo** — commit everywhere, or roll back everywhere
//!
//! The [`Conductor`] drives one [`Worker`] per foundation through these
//! phases with strict barriers: no worker enters a phase until every worker
//! has finished the previous one. The [`Action`] trait supplies the behavior
//! each phase runs; [`ActionFactory`] selects the variant for an operation.

mod action;
mod conductor;
mod factory;
mod push;
mod start;
mod stop;
mod worker;

pub use action::{Action, ActionKind, ExecuteReport};
pub use conductor::Conductor;
pub use factory::ActionFactory;
pub use push::PushAction;
pub use start::StartAction;
pub use stop::StopAction;
pub use worker::{PhaseCommand, PhaseReport, Worker};
