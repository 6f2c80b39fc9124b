//! Action construction.

use std::sync::Arc;

use super::action::{Action, ActionKind};
use super::{PushAction, StartAction, StopAction};
use crate::deployment::DeploymentInfo;
use crate::events::EventManager;
use crate::fetcher::Fetcher;

/// Builds one action per operation.
///
/// The factory owns the long-lived collaborators (event manager, fetcher);
/// the deployment info is per-operation and arrives at create time.
pub struct ActionFactory {
    events: Arc<EventManager>,
    fetcher: Arc<dyn Fetcher>,
}

impl ActionFactory {
    pub fn new(events: Arc<EventManager>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { events, fetcher }
    }

    /// Creates the action variant for `kind`. One action serves the whole
    /// deploy; couriers are created per foundation by the conductor.
    pub fn create(&self, kind: ActionKind, info: Arc<DeploymentInfo>) -> Box<dyn Action> {
        match kind {
            ActionKind::Push => Box::new(PushAction::new(
                info,
                self.events.clone(),
                self.fetcher.clone(),
            )),
            ActionKind::Stop => Box::new(StopAction::new(info, self.events.clone())),
            ActionKind::Start => Box::new(StartAction::new(info, self.events.clone())),
        }
    }
}
