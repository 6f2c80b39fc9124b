//! The blue-green push action.
//!
//! Executing a push on one foundation parks any existing production instance
//! under the venerable name, pushes the new build as the application name,
//! and captures its recent logs. Success deletes the parked instance and
//! maps the manifest routes; undo deletes the new build and restores the
//! parked instance (or just deletes on a first deploy, where there is
//! nothing to restore).

use std::fs;
use std::sync::Arc;

use anyhow::{Result, bail};
use camino::Utf8PathBuf;
use tracing::{debug, warn};

use super::action::{Action, ExecuteReport};
use crate::config::Environment;
use crate::courier::Courier;
use crate::deployment::{ContentKind, DeploymentInfo};
use crate::error::{CutoverError, FoundationFailure};
use crate::events::{Event, EventKind, EventManager};
use crate::fetcher::Fetcher;
use crate::manifest::Manifest;

pub struct PushAction {
    info: Arc<DeploymentInfo>,
    events: Arc<EventManager>,
    fetcher: Arc<dyn Fetcher>,
    /// Exploded artifact directory, resolved by set-up.
    app_path: Option<Utf8PathBuf>,
    /// Whether this action fetched `app_path` itself and owns its removal.
    fetched: bool,
    /// Instance count derived from the manifest or the environment default.
    instances: u16,
}

impl PushAction {
    pub fn new(
        info: Arc<DeploymentInfo>,
        events: Arc<EventManager>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            info,
            events,
            fetcher,
            app_path: None,
            fetched: false,
            instances: 1,
        }
    }
}

impl Action for PushAction {
    fn set_up(&mut self, environment: &Environment) -> Result<(), CutoverError> {
        if self.app_path.is_some() {
            return Ok(());
        }

        let app_path = match self.info.content_kind {
            Some(ContentKind::Zip) => {
                // The pipeline already extracted the uploaded archive; the
                // artifact URL is its local path.
                Utf8PathBuf::from(&self.info.artifact_url)
            }
            _ => {
                let path = self
                    .fetcher
                    .fetch(&self.info.artifact_url, &self.info.manifest)
                    .map_err(|source| CutoverError::ArtifactFetch {
                        url: self.info.artifact_url.clone(),
                        source,
                    })?;
                self.fetched = true;
                path
            }
        };

        self.instances = Manifest::parse(&self.info.manifest)
            .ok()
            .and_then(|manifest| manifest.instances())
            .unwrap_or(environment.instances);

        debug!(
            "push set up: {} instance(s), artifact at {}",
            self.instances, app_path
        );
        self.app_path = Some(app_path);
        Ok(())
    }

    fn on_start(&self) -> Result<(), CutoverError> {
        self.events
            .emit(&Event::deploy(EventKind::PushStarted, &self.info))
            .map_err(|source| CutoverError::Event {
                kind: EventKind::PushStarted.to_string(),
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

    fn clean_venerable(
        &self,
        courier: &dyn Courier,
        foundation: &str,
        out: &mut Vec<u8>,
    ) -> Result<bool> {
        let app = &self.info.app_name;
        let venerable = self.info.venerable_name();
        if !courier.exists(&venerable) {
            return Ok(false);
        }

        // A predecessor crashed mid-rollback. If the application name is
        // still taken the parked copy is redundant; otherwise restore it.
        let result = if courier.exists(app) {
            courier.delete(&venerable)?
        } else {
            courier.rename(&venerable, app)?
        };
        out.extend_from_slice(&result.output);
        if !result.success {
            bail!("cannot clean up {} on {}", venerable, foundation);
        }
        Ok(true)
    }

    fn execute(
        &self,
        courier: &dyn Courier,
        foundation: &str,
        out: &mut Vec<u8>,
        report: &mut ExecuteReport,
    ) -> Result<()> {
        let Some(app_path) = &self.app_path else {
            bail!("push action was not set up");
        };
        let app = &self.info.app_name;
        let venerable = self.info.venerable_name();

        if courier.exists(app) {
            report.app_existed = true;
            let renamed = courier.rename(app, &venerable)?;
            out.extend_from_slice(&renamed.output);
            if !renamed.success {
                bail!("cannot rename {} to {} on {}", app, venerable, foundation);
            }
        }

        let pushed = courier.push(app, app_path, app, self.instances, &self.info.push_opts)?;
        out.extend_from_slice(&pushed.output);

        // Recent logs are kept for post-mortem inspection even when the
        // push succeeded.
        match courier.logs(app) {
            Ok(logs) if logs.success => report.logs = Some(logs.output),
            Ok(_) | Err(_) => debug!("recent logs unavailable for {} at {}", app, foundation),
        }

        if !pushed.success {
            bail!("push failed on {}", foundation);
        }
        Ok(())
    }

    fn undo(
        &self,
        courier: &dyn Courier,
        foundation: &str,
        first_deploy: bool,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let app = &self.info.app_name;
        let venerable = self.info.venerable_name();

        let deleted = courier.delete(app)?;
        out.extend_from_slice(&deleted.output);
        if !deleted.success {
            bail!("cannot delete {} on {}", app, foundation);
        }

        if !first_deploy {
            let renamed = courier.rename(&venerable, app)?;
            out.extend_from_slice(&renamed.output);
            if !renamed.success {
                bail!("cannot rename {} back to {} on {}", venerable, app, foundation);
            }
        }
        Ok(())
    }

    fn success(&self, courier: &dyn Courier, foundation: &str, out: &mut Vec<u8>) -> Result<()> {
        let venerable = self.info.venerable_name();
        if courier.exists(&venerable) {
            let deleted = courier.delete(&venerable)?;
            out.extend_from_slice(&deleted.output);
            if !deleted.success {
                bail!("cannot delete {} on {}", venerable, foundation);
            }
        }

        // Route mapping happens through the push-finished handler so
        // deployments can opt out of it wholesale at startup.
        self.events.emit(&Event::foundation(
            EventKind::PushFinished,
            &self.info,
            courier,
            foundation,
        ))
    }

    fn clean_up(&self) {
        let Some(app_path) = &self.app_path else {
            return;
        };
        if !self.fetched {
            return;
        }
        if let Err(err) = fs::remove_dir_all(app_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("artifact path left behind: {}: {}", app_path, err);
            }
        }
    }

    fn initially_error(&self, failures: Vec<FoundationFailure>) -> CutoverError {
        CutoverError::Login { failures }
    }

    fn execute_error(&self, failures: Vec<FoundationFailure>) -> CutoverError {
        CutoverError::Push { failures }
    }

    fn undo_error(
        &self,
        execute: Vec<FoundationFailure>,
        undo: Vec<FoundationFailure>,
    ) -> CutoverError {
        CutoverError::Rollback { execute, undo }
    }

    fn success_error(&self, failures: Vec<FoundationFailure>) -> CutoverError {
        CutoverError::FinishPush { failures }
    }
}
