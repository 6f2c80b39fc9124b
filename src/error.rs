//! Domain-specific error types for cutover.
//!
//! This module defines `CutoverError`, a `thiserror`-based enum that provides
//! typed error variants for the failure modes a deployment can hit. Public
//! API functions return `Result<T, CutoverError>` for programmatic error
//! handling, while trait boundaries (actions, couriers, fetchers, event
//! handlers) continue to use `anyhow::Result`.
//!
//! Phase failures are aggregated per foundation: a login phase that fails on
//! two of three foundations produces a single `CutoverError::Login` carrying
//! two [`FoundationFailure`] entries. Only the deployment pipeline translates
//! these variants into status codes.

use std::fmt;

use crate::error_finder::MatchedError;

/// A single foundation's failure within one phase of a deployment.
#[derive(Debug, Clone)]
pub struct FoundationFailure {
    /// The foundation URL the failure occurred on.
    pub foundation: String,
    /// Human-readable reason, usually the flattened error chain.
    pub reason: String,
}

impl FoundationFailure {
    pub fn new(foundation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            foundation: foundation.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FoundationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.foundation, self.reason)
    }
}

/// Formats a failure list for embedding in error messages.
pub(crate) fn join_failures(failures: &[FoundationFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Domain-specific error type for cutover.
///
/// Provides typed variants for the failure modes of a deployment, enabling
/// the pipeline to classify errors programmatically rather than parsing
/// message strings.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CutoverError {
    /// The request named an environment that is not configured.
    #[error("environment not found: {0}")]
    EnvironmentNotFound(String),

    /// The environment requires authentication and no credentials were supplied.
    #[error("basic authorization required")]
    BasicAuthRequired,

    /// The request content type is not deployable.
    #[error("invalid content type: {0}")]
    InvalidContentType(String),

    /// The request body could not be decoded into deployment properties.
    #[error("deployment request body could not be parsed")]
    InvalidRequestBody(#[source] serde_json::Error),

    /// A required request property was missing or empty.
    #[error("the following properties are missing: {0}")]
    MissingParameter(String),

    /// The supplied manifest was not valid base64.
    #[error("base64 encoded manifest could not be decoded")]
    ManifestDecode(#[source] base64::DecodeError),

    /// The manifest text could not be parsed or rewritten as YAML.
    #[error("manifest could not be processed: {0}")]
    Manifest(String),

    /// The artifact could not be fetched to a local path.
    #[error("artifact could not be fetched: {url}")]
    ArtifactFetch {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    /// The uploaded archive could not be extracted.
    #[error("could not process zip file")]
    Unzip(#[source] anyhow::Error),

    /// A courier could not be constructed for a foundation.
    #[error("failed to create courier")]
    CourierCreation(#[source] anyhow::Error),

    /// A worker could not be spawned or died before the deploy terminated.
    #[error("foundation worker failed: {0}")]
    Worker(String),

    /// A foundation failed its liveness probe.
    #[error("foundation unreachable: {foundation}: {reason}")]
    Precheck { foundation: String, reason: String },

    /// An event handler failed during emission.
    #[error("an error occurred in the {kind} event")]
    Event {
        kind: String,
        #[source]
        source: anyhow::Error,
    },

    /// One or more foundations failed the login phase.
    #[error("login failed: [{}]", join_failures(.failures))]
    Login { failures: Vec<FoundationFailure> },

    /// The push phase failed and no rollback was attempted.
    #[error("push failed")]
    Push { failures: Vec<FoundationFailure> },

    /// The push phase failed on a first deploy with first-deploy rollback disabled.
    #[error("push failed: first deploy, rollback not enabled")]
    FirstDeployNoRollback { failures: Vec<FoundationFailure> },

    /// The push phase failed and the new instances were rolled back.
    #[error("push failed: rollback triggered")]
    Rollback {
        execute: Vec<FoundationFailure>,
        undo: Vec<FoundationFailure>,
    },

    /// The finish phase of a push failed after every push succeeded.
    #[error("finish push failed")]
    FinishPush { failures: Vec<FoundationFailure> },

    /// The stop phase failed and no rollback was attempted.
    #[error("stop failed")]
    Stop { failures: Vec<FoundationFailure> },

    /// The stop phase failed and the stopped instances were restarted.
    #[error("stop failed: rollback triggered")]
    StopRollback {
        execute: Vec<FoundationFailure>,
        undo: Vec<FoundationFailure>,
    },

    /// The finish phase of a stop failed.
    #[error("finish stop failed")]
    FinishStop { failures: Vec<FoundationFailure> },

    /// The start phase failed and no rollback was attempted.
    #[error("start failed")]
    Start { failures: Vec<FoundationFailure> },

    /// The start phase failed and the started instances were stopped again.
    #[error("start failed: rollback triggered")]
    StartRollback {
        execute: Vec<FoundationFailure>,
        undo: Vec<FoundationFailure>,
    },

    /// The finish phase of a start failed.
    #[error("finish start failed")]
    FinishStart { failures: Vec<FoundationFailure> },

    /// A known error pattern matched in the platform output.
    ///
    /// Produced post-mortem by the error finder; replaces the generic phase
    /// error the conductor surfaced. The raw platform output containing the
    /// original failure text remains in the response body.
    #[error("{}", .0.description)]
    Matched(MatchedError),

    /// An I/O operation failed with contextual information.
    #[error("{context}: {source}")]
    Io {
        /// What was being done when the error occurred.
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl CutoverError {
    /// Creates an `Io` variant with the given context.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns true if this error originated in the login phase.
    ///
    /// The pipeline maps login failures to a client error status because bad
    /// credentials are a caller problem, not a platform problem.
    pub fn is_login_failure(&self) -> bool {
        matches!(self, CutoverError::Login { .. })
    }
}
