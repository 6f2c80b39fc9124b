//! Request and deployment value types.
//!
//! A [`DeployRequest`] is the thin-shim view of an incoming request (body
//! bytes, content type, optional basic authorization). The pipeline resolves
//! it against the configuration into a [`DeploymentInfo`], the
//! immutable-after-construction record every action and worker reads during
//! one deploy.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::CutoverError;

/// The request content types the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ContentKind {
    /// `application/json`: properties body with an artifact URL.
    #[strum(serialize = "application/json")]
    Json,
    /// `application/zip`: the artifact itself as the request body.
    #[strum(serialize = "application/zip")]
    Zip,
}

impl ContentKind {
    /// Parses a content-type header value, ignoring any parameters.
    pub fn from_header(value: &str) -> Option<Self> {
        match value.split(';').next().map(str::trim) {
            Some("application/json") => Some(Self::Json),
            Some("application/zip") => Some(Self::Zip),
            _ => None,
        }
    }
}

/// Basic credentials for the platform.
#[derive(Debug, Clone, Default)]
pub struct Authorization {
    pub username: String,
    pub password: String,
}

/// The path parameters of a deployment operation: which application, where.
#[derive(Debug, Clone)]
pub struct CfContext {
    pub environment: String,
    pub organization: String,
    pub space: String,
    pub application: String,
}

/// An incoming deploy request before resolution.
#[derive(Debug)]
pub struct DeployRequest {
    /// Raw content-type header value.
    pub content_type: String,
    /// Credentials from the request, if any.
    pub authorization: Option<Authorization>,
    /// Raw request body: JSON properties or a zip archive.
    pub body: Vec<u8>,
}

/// The JSON body shape of an `application/json` deploy request.
#[derive(Debug, Default, Deserialize)]
pub struct DeployPayload {
    #[serde(default)]
    pub artifact_url: String,
    /// Base64-encoded platform manifest.
    #[serde(default)]
    pub manifest: String,
    /// Environment variables merged into the manifest before push.
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
    /// Free-form payload forwarded to event handlers.
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub health_check_endpoint: String,
}

/// Everything one deployment needs to know, resolved once by the pipeline.
///
/// Owned by the pipeline and shared by reference with actions and workers;
/// never mutated after construction.
#[derive(Debug, Clone, Default)]
pub struct DeploymentInfo {
    pub org: String,
    pub space: String,
    pub app_name: String,
    pub environment: String,
    /// Artifact URL for JSON deploys, or the extracted local path for zip
    /// deploys.
    pub artifact_url: String,
    /// Plaintext manifest, already base64-decoded and env-var merged.
    pub manifest: String,
    pub username: String,
    pub password: String,
    /// Per-deploy correlation ID.
    pub uuid: String,
    pub skip_ssl: bool,
    pub instances: u16,
    pub domain: String,
    pub content_kind: Option<ContentKind>,
    pub custom_params: BTreeMap<String, String>,
    pub environment_variables: BTreeMap<String, String>,
    pub data: BTreeMap<String, serde_json::Value>,
    /// Extra options appended verbatim to the push command line.
    pub push_opts: BTreeMap<String, String>,
    pub health_check_endpoint: String,
}

impl DeploymentInfo {
    /// The transient name the previous production instance is parked under
    /// during a blue-green push.
    pub fn venerable_name(&self) -> String {
        format!("{}-venerable", self.app_name)
    }
}

/// The outcome of a pipeline operation: a status code in HTTP vocabulary and
/// the error that produced it, if any.
#[derive(Debug)]
pub struct DeployResponse {
    pub status: u16,
    pub error: Option<CutoverError>,
}

impl DeployResponse {
    pub fn ok() -> Self {
        Self {
            status: 200,
            error: None,
        }
    }

    pub fn failed(status: u16, error: CutoverError) -> Self {
        Self {
            status,
            error: Some(error),
        }
    }

    /// True when the operation completed without a surfaced error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
