//! The start action: bring a stopped application back up on every
//! foundation. Mirrors [`StopAction`](super::StopAction) with the verbs
//! swapped.

use std::sync::Arc;

use anyhow::{Result, bail};

use super::action::{Action, ExecuteReport};
use crate::config::Environment;
use crate::courier::Courier;
use crate::deployment::DeploymentInfo;
use crate::error::{CutoverError, FoundationFailure};
use crate::events::{Event, EventKind, EventManager};

pub struct StartAction {
    info: Arc<DeploymentInfo>,
    events: Arc<EventManager>,
}

impl StartAction {
    pub fn new(info: Arc<DeploymentInfo>, events: Arc<EventManager>) -> Self {
        Self { info, events }
    }
}

impl Action for StartAction {
    fn set_up(&mut self, _environment: &Environment) -> Result<(), CutoverError> {
        Ok(())
    }

    fn on_start(&self) -> Result<(), CutoverError> {
        self.events
            .emit(&Event::deploy(EventKind::StartStarted, &self.info))
            .map_err(|source| CutoverError::Event {
                kind: EventKind::StartStarted.to_string(),
                source,
            })
    }

    fn initially(&self, courier: &dyn Courier, foundation: &str, out: &mut Vec<u8>) -> Result<()> {
        let result = courier.login(
            foundation,
            &self.info.username,
            &self.info.password,
            &self.info.org,
            &self.info.space,
            self.info.skip_ssl,
        )?;
        out.extend_from_slice(&result.output);
        if !result.success {
            bail!("cannot login to {}", foundation);
        }
        Ok(())
    }

    fn execute(
        &self,
        courier: &dyn Courier,
        foundation: &str,
        out: &mut Vec<u8>,
        report: &mut ExecuteReport,
    ) -> Result<()> {
        report.app_existed = true;

        let result = courier.start(&self.info.app_name)?;
        out.extend_from_slice(&result.output);
        if !result.success {
            bail!("cannot start {} on {}", self.info.app_name, foundation);
        }
        Ok(())
    }

    fn undo(
        &self,
        courier: &dyn Courier,
        foundation: &str,
        _first_deploy: bool,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let result = courier.stop(&self.info.app_name)?;
        out.extend_from_slice(&result.output);
        if !result.success {
            bail!("cannot stop {} on {}", self.info.app_name, foundation);
        }
        Ok(())
    }

    fn success(
        &self,
        _courier: &dyn Courier,
        _foundation: &str,
        _out: &mut Vec<u8>,
    ) -> Result<()> {
        Ok(())
    }

    fn clean_up(&self) {}

    fn initially_error(&self, failures: Vec<FoundationFailure>) -> CutoverError {
        CutoverError::Login { failures }
    }

    fn execute_error(&self, failures: Vec<FoundationFailure>) -> CutoverError {
        CutoverError::Start { failures }
    }

    fn undo_error(
        &self,
        execute: Vec<FoundationFailure>,
        undo: Vec<FoundationFailure>,
    ) -> CutoverError {
        CutoverError::StartRollback { execute, undo }
    }

    fn success_error(&self, failures: Vec<FoundationFailure>) -> CutoverError {
        CutoverError::FinishStart { failures }
    }
}
