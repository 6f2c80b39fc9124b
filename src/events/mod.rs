//! Lifecycle event pub/sub.
//!
//! Handlers register against an [`EventKind`] at startup and are invoked
//! synchronously, in registration order, whenever the pipeline or an action
//! emits a matching event. A failing handler does not stop the remaining
//! handlers; the first failure is returned to the emitter once fan-out
//! completes. Handlers are expected to be fast; long-running work belongs in
//! a worker, not a handler.

pub mod health_checker;
pub mod route_mapper;

use std::collections::BTreeMap;
use std::collections::HashMap;

use anyhow::Result;

use crate::courier::Courier;
use crate::deployment::DeploymentInfo;
use crate::error::CutoverError;

/// The lifecycle moments handlers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum EventKind {
    DeployStart,
    DeployFinish,
    DeploySuccess,
    DeployFailure,
    DeployError,
    PushStarted,
    PushFinished,
    StopStarted,
    StopFinished,
    StopSuccess,
    StopFailure,
    StartStarted,
    StartFinished,
    StartSuccess,
    StartFailure,
}

/// A lifecycle event and the deployment context it happened in.
///
/// Borrowed fields keep emission allocation-free; events never outlive the
/// deploy that produced them.
pub struct Event<'a> {
    pub kind: EventKind,
    pub info: &'a DeploymentInfo,
    /// The foundation-local courier, for per-foundation events emitted from
    /// inside a worker (push finished, for example).
    pub courier: Option<&'a dyn Courier>,
    /// The foundation URL, for per-foundation events.
    pub foundation: Option<&'a str>,
    /// The error being reported, for failure events.
    pub error: Option<&'a CutoverError>,
    /// Free-form request payload.
    pub data: &'a BTreeMap<String, serde_json::Value>,
}

impl<'a> Event<'a> {
    /// A deploy-scoped event with no foundation attached.
    pub fn deploy(kind: EventKind, info: &'a DeploymentInfo) -> Self {
        Self {
            kind,
            info,
            courier: None,
            foundation: None,
            error: None,
            data: &info.data,
        }
    }

    /// A deploy-scoped failure event.
    pub fn failure(kind: EventKind, info: &'a DeploymentInfo, error: &'a CutoverError) -> Self {
        Self {
            error: Some(error),
            ..Self::deploy(kind, info)
        }
    }

    /// A per-foundation event carrying the worker's courier.
    pub fn foundation(
        kind: EventKind,
        info: &'a DeploymentInfo,
        courier: &'a dyn Courier,
        foundation: &'a str,
    ) -> Self {
        Self {
            courier: Some(courier),
            foundation: Some(foundation),
            ..Self::deploy(kind, info)
        }
    }
}

/// Trait for lifecycle event handlers.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &Event<'_>) -> Result<()>;
}

/// Synchronous event fan-out.
///
/// Registration happens while the manager is still exclusively owned;
/// emission happens behind an `Arc` from the pipeline and from worker
/// threads.
#[derive(Default)]
pub struct EventManager {
    handlers: HashMap<EventKind, Vec<Box<dyn EventHandler>>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one event kind. Handlers fire in
    /// registration order.
    pub fn register(&mut self, kind: EventKind, handler: Box<dyn EventHandler>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Emits an event to every registered handler.
    ///
    /// All handlers run even when an earlier one fails; the first failure is
    /// returned.
    pub fn emit(&self, event: &Event<'_>) -> Result<()> {
        let mut first_error = None;
        for handler in self.handlers.get(&event.kind).into_iter().flatten() {
            if let Err(err) = handler.on_event(event) {
                tracing::error!("{} handler failed: {:#}", event.kind, err);
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}
