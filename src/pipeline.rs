//! The deployment pipeline.
//!
//! One public operation per action kind: resolve the request against the
//! configuration, precheck the foundations, select the action, hand it to
//! the conductor, and translate the outcome into a status code. The
//! pipeline is the only place errors become status codes.
//!
//! Event discipline: once the deployment info exists, the success-or-failure
//! event and the finish event always fire, in that order, with finish as the
//! last observable effect. A failing start event aborts the operation; a
//! failing finish event overrides the status.

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use camino::Utf8PathBuf;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bluegreen::{ActionFactory, ActionKind, Conductor};
use crate::config::{Config, Environment};
use crate::courier::CourierFactory;
use crate::deployment::{
    Authorization, CfContext, ContentKind, DeployPayload, DeployRequest, DeployResponse,
    DeploymentInfo,
};
use crate::error::CutoverError;
use crate::error_finder::ErrorFinder;
use crate::events::{Event, EventKind, EventManager};
use crate::fetcher::{Fetcher, read_packaged_manifest};
use crate::manifest::Manifest;
use crate::prechecker::Prechecker;

const SUCCESSFUL_DEPLOY: &str = "\nYour deploy was successful! (^_^)b
If you experience any problems after this point, check that you can manually
push your application to the platform on a lower environment.
It is likely that it is an error with your application and not with cutover.

";

/// Orchestrates one deployment operation end to end.
pub struct DeploymentPipeline {
    config: Config,
    events: Arc<EventManager>,
    factory: ActionFactory,
    conductor: Conductor,
    prechecker: Prechecker,
    error_finder: ErrorFinder,
    fetcher: Arc<dyn Fetcher>,
}

impl DeploymentPipeline {
    pub fn new(
        config: Config,
        events: Arc<EventManager>,
        couriers: Arc<dyn CourierFactory>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, anyhow::Error> {
        let error_finder = ErrorFinder::from_config(&config.error_matchers)?;
        Ok(Self {
            factory: ActionFactory::new(events.clone(), fetcher.clone()),
            conductor: Conductor::new(couriers),
            prechecker: Prechecker::new(events.clone()),
            error_finder,
            fetcher,
            events,
            config,
        })
    }

    /// Deploys an application to every foundation of the request's
    /// environment. Platform output is streamed into `response` phase by
    /// phase; the returned status follows HTTP vocabulary.
    pub fn deploy(
        &self,
        request: DeployRequest,
        context: &CfContext,
        response: &mut Vec<u8>,
    ) -> DeployResponse {
        let environment = match self.resolve_environment(context, response) {
            Ok(environment) => environment,
            Err(outcome) => return outcome,
        };

        let mut info = base_info(context, &environment);
        info!("preparing to deploy {} with UUID {}", info.app_name, info.uuid);

        if let Err(err) = self
            .prechecker
            .assert_all_foundations_up(&environment, &info)
        {
            append_line(response, &err.to_string());
            return DeployResponse::failed(500, err);
        }

        match self.resolve_auth(request.authorization.as_ref(), &environment) {
            Ok(auth) => {
                info.username = auth.username;
                info.password = auth.password;
            }
            Err(err) => {
                append_line(response, &err.to_string());
                return DeployResponse::failed(401, err);
            }
        }

        // From here on the success-or-failure event and the finish event
        // always fire, whatever happens.
        let mut scratch = None;
        let (mut outcome, info) =
            self.run_deploy(&request, &environment, info, response, &mut scratch);

        if let Some(surfaced) = outcome.error.take() {
            outcome.error = Some(self.find_better_error(surfaced, response));
        }

        match &outcome.error {
            None => {
                if let Err(err) = self.events.emit(&Event::deploy(EventKind::DeploySuccess, &info))
                {
                    error!("deploy success event failed: {:#}", err);
                    append_line(response, &format!("{:#}", err));
                }
                response.extend_from_slice(SUCCESSFUL_DEPLOY.as_bytes());
            }
            Some(surfaced) => {
                append_line(response, &format!("cannot deploy application: {}", surfaced));
                if let Err(err) = self
                    .events
                    .emit(&Event::failure(EventKind::DeployFailure, &info, surfaced))
                {
                    error!("deploy failure event failed: {:#}", err);
                    append_line(response, &format!("{:#}", err));
                }
            }
        }

        if let Err(source) = self.events.emit(&Event::deploy(EventKind::DeployFinish, &info)) {
            outcome = DeployResponse::failed(
                500,
                CutoverError::Event {
                    kind: EventKind::DeployFinish.to_string(),
                    source,
                },
            );
        }

        if let Some(path) = scratch {
            if let Err(err) = fs::remove_dir_all(&path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    error!("artifact path left behind: {}: {}", path, err);
                }
            }
        }

        outcome
    }

    /// Stops an application on every foundation of the request's environment.
    pub fn stop(
        &self,
        context: &CfContext,
        authorization: Option<Authorization>,
        data: BTreeMap<String, serde_json::Value>,
        response: &mut Vec<u8>,
    ) -> DeployResponse {
        self.lifecycle(ActionKind::Stop, context, authorization, data, response)
    }

    /// Starts an application on every foundation of the request's environment.
    pub fn start(
        &self,
        context: &CfContext,
        authorization: Option<Authorization>,
        data: BTreeMap<String, serde_json::Value>,
        response: &mut Vec<u8>,
    ) -> DeployResponse {
        self.lifecycle(ActionKind::Start, context, authorization, data, response)
    }

    fn lifecycle(
        &self,
        kind: ActionKind,
        context: &CfContext,
        authorization: Option<Authorization>,
        data: BTreeMap<String, serde_json::Value>,
        response: &mut Vec<u8>,
    ) -> DeployResponse {
        let environment = match self.resolve_environment(context, response) {
            Ok(environment) => environment,
            Err(outcome) => return outcome,
        };

        let mut info = base_info(context, &environment);
        info.data = data;
        info!("preparing to {} {} with UUID {}", kind, info.app_name, info.uuid);

        match self.resolve_auth(authorization.as_ref(), &environment) {
            Ok(auth) => {
                info.username = auth.username;
                info.password = auth.password;
            }
            Err(err) => {
                append_line(response, &err.to_string());
                return DeployResponse::failed(401, err);
            }
        }

        let info = Arc::new(info);
        let action = self.factory.create(kind, info.clone());
        let result = self.conductor.run(action, &environment, &info, response);
        let mut outcome = classify(&environment, result);

        if let Some(surfaced) = outcome.error.take() {
            outcome.error = Some(self.find_better_error(surfaced, response));
        }

        let (success_kind, failure_kind, finish_kind) = lifecycle_events(kind);
        match &outcome.error {
            None => {
                if let Err(err) = self.events.emit(&Event::deploy(success_kind, &info)) {
                    error!("{} event failed: {:#}", success_kind, err);
                    append_line(response, &format!("{:#}", err));
                }
            }
            Some(surfaced) => {
                if let Err(err) = self
                    .events
                    .emit(&Event::failure(failure_kind, &info, surfaced))
                {
                    error!("{} event failed: {:#}", failure_kind, err);
                    append_line(response, &format!("{:#}", err));
                }
            }
        }

        if let Err(source) = self.events.emit(&Event::deploy(finish_kind, &info)) {
            outcome = DeployResponse::failed(
                500,
                CutoverError::Event {
                    kind: finish_kind.to_string(),
                    source,
                },
            );
        }

        outcome
    }

    fn run_deploy(
        &self,
        request: &DeployRequest,
        environment: &Environment,
        mut info: DeploymentInfo,
        response: &mut Vec<u8>,
        scratch: &mut Option<Utf8PathBuf>,
    ) -> (DeployResponse, Arc<DeploymentInfo>) {
        let kind = match ContentKind::from_header(&request.content_type) {
            Some(kind) => kind,
            None => {
                let err = CutoverError::InvalidContentType(request.content_type.clone());
                append_line(response, &err.to_string());
                return (DeployResponse::failed(400, err), Arc::new(info));
            }
        };
        info.content_kind = Some(kind);

        match kind {
            ContentKind::Json => {
                let payload: DeployPayload = match serde_json::from_slice(&request.body) {
                    Ok(payload) => payload,
                    Err(err) => {
                        return (
                            DeployResponse::failed(500, CutoverError::InvalidRequestBody(err)),
                            Arc::new(info),
                        );
                    }
                };
                if payload.artifact_url.trim().is_empty() {
                    let err = CutoverError::MissingParameter("artifact_url".to_string());
                    append_line(response, &err.to_string());
                    return (DeployResponse::failed(500, err), Arc::new(info));
                }
                if !payload.manifest.is_empty() {
                    let decoded = match BASE64.decode(payload.manifest.as_bytes()) {
                        Ok(decoded) => decoded,
                        Err(err) => {
                            return (
                                DeployResponse::failed(400, CutoverError::ManifestDecode(err)),
                                Arc::new(info),
                            );
                        }
                    };
                    match String::from_utf8(decoded) {
                        Ok(text) => info.manifest = text,
                        Err(_) => {
                            let err =
                                CutoverError::Manifest("manifest is not valid UTF-8".to_string());
                            return (DeployResponse::failed(400, err), Arc::new(info));
                        }
                    }
                }
                info.artifact_url = payload.artifact_url;
                info.environment_variables = payload.environment_variables;
                info.data = payload.data;
                info.health_check_endpoint = payload.health_check_endpoint;
            }
            ContentKind::Zip => {
                let path = match self.fetcher.fetch_zip(&request.body) {
                    Ok(path) => path,
                    Err(err) => {
                        return (
                            DeployResponse::failed(500, CutoverError::Unzip(err)),
                            Arc::new(info),
                        );
                    }
                };
                match read_packaged_manifest(&path) {
                    Ok(Some(manifest)) => info.manifest = manifest,
                    Ok(None) => debug!("uploaded archive carries no manifest"),
                    Err(err) => warn!("ignoring unreadable packaged manifest: {:#}", err),
                }
                info.artifact_url = path.to_string();
                *scratch = Some(path);
            }
        }

        if let Err(err) = merge_environment_variables(&mut info) {
            return (DeployResponse::failed(400, err), Arc::new(info));
        }

        response.extend_from_slice(deployment_banner(&info).as_bytes());
        let info = Arc::new(info);

        if let Err(source) = self.events.emit(&Event::deploy(EventKind::DeployStart, &info)) {
            let err = CutoverError::Event {
                kind: EventKind::DeployStart.to_string(),
                source,
            };
            return (DeployResponse::failed(500, err), info);
        }

        let action = self.factory.create(ActionKind::Push, info.clone());
        let result = self.conductor.run(action, environment, &info, response);
        (classify(environment, result), info)
    }

    fn resolve_environment(
        &self,
        context: &CfContext,
        response: &mut Vec<u8>,
    ) -> Result<Environment, DeployResponse> {
        match self.config.environment(&context.environment) {
            Some(environment) => Ok(environment.clone()),
            None => {
                let err = CutoverError::EnvironmentNotFound(context.environment.clone());
                append_line(response, &err.to_string());
                Err(DeployResponse::failed(500, err))
            }
        }
    }

    fn resolve_auth(
        &self,
        authorization: Option<&Authorization>,
        environment: &Environment,
    ) -> Result<Authorization, CutoverError> {
        match authorization {
            Some(auth) => Ok(auth.clone()),
            None if environment.authenticate => Err(CutoverError::BasicAuthRequired),
            None => Ok(Authorization {
                username: self.config.username.clone(),
                password: self.config.password.clone(),
            }),
        }
    }

    /// Post-mortem: scans the accumulated response for known failure
    /// patterns. The first match replaces the surfaced error; every match is
    /// appended to the response with its potential solution.
    fn find_better_error(&self, surfaced: CutoverError, response: &mut Vec<u8>) -> CutoverError {
        let text = String::from_utf8_lossy(response).into_owned();
        let found = self.error_finder.find(&text);
        let Some(first) = found.first().cloned() else {
            return surfaced;
        };

        for matched in &found {
            append_line(response, "");
            append_line(response, "*******************");
            append_line(
                response,
                &format!(
                    "The following error was found in the above logs: {}",
                    matched.description
                ),
            );
            append_line(response, &format!("Error: {}", matched.matched_line));
            append_line(
                response,
                &format!("Potential solution: {}", matched.solution),
            );
            append_line(response, "*******************");
        }

        debug!("replacing {} with matched error: {}", surfaced, first.description);
        CutoverError::Matched(first)
    }
}

fn base_info(context: &CfContext, environment: &Environment) -> DeploymentInfo {
    DeploymentInfo {
        org: context.organization.clone(),
        space: context.space.clone(),
        app_name: context.application.clone(),
        environment: context.environment.clone(),
        uuid: Uuid::new_v4().to_string(),
        skip_ssl: environment.skip_ssl,
        instances: environment.instances,
        domain: environment.domain.clone(),
        custom_params: environment.custom_params.clone(),
        ..Default::default()
    }
}

fn classify(environment: &Environment, result: Result<(), CutoverError>) -> DeployResponse {
    match result {
        Ok(()) => DeployResponse::ok(),
        // A failing start event is an infrastructure problem, never advisory.
        Err(err @ CutoverError::Event { .. }) => DeployResponse::failed(500, err),
        // With rollback disabled deploy errors are advisory: the caller gets
        // the error in the body and the failure event, not the status.
        Err(err) if !environment.enable_rollback => DeployResponse::failed(200, err),
        Err(err) if err.is_login_failure() => DeployResponse::failed(400, err),
        Err(err) => DeployResponse::failed(500, err),
    }
}

fn lifecycle_events(kind: ActionKind) -> (EventKind, EventKind, EventKind) {
    match kind {
        ActionKind::Push => (
            EventKind::DeploySuccess,
            EventKind::DeployFailure,
            EventKind::DeployFinish,
        ),
        ActionKind::Stop => (
            EventKind::StopSuccess,
            EventKind::StopFailure,
            EventKind::StopFinished,
        ),
        ActionKind::Start => (
            EventKind::StartSuccess,
            EventKind::StartFailure,
            EventKind::StartFinished,
        ),
    }
}

fn merge_environment_variables(info: &mut DeploymentInfo) -> Result<(), CutoverError> {
    if info.environment_variables.is_empty() || info.manifest.is_empty() {
        return Ok(());
    }
    let mut manifest =
        Manifest::parse(&info.manifest).map_err(|e| CutoverError::Manifest(format!("{:#}", e)))?;
    for (name, value) in &info.environment_variables {
        manifest.add_env_var(name.as_str(), value.as_str());
    }
    info.manifest = manifest
        .to_yaml()
        .map_err(|e| CutoverError::Manifest(format!("{:#}", e)))?;
    Ok(())
}

fn deployment_banner(info: &DeploymentInfo) -> String {
    format!(
        "Deployment Parameters:
Artifact URL: {},
Username:     {},
Environment:  {},
Org:          {},
Space:        {},
AppName:      {}

",
        info.artifact_url, info.username, info.environment, info.org, info.space, info.app_name
    )
}

fn append_line(response: &mut Vec<u8>, line: &str) {
    response.extend_from_slice(line.as_bytes());
    response.push(b'\n');
}
