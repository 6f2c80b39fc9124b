//! Platform CLI façade.
//!
//! This module provides:
//! - [`Courier`]: the verb-level trait the deployment core drives
//! - [`CourierOutput`]: combined output plus terminal status of one verb
//! - [`CourierFactory`]: per-worker courier construction
//! - [`CfCourier`] / [`CfExecutor`]: the production implementation wrapping
//!   the `cf` binary
//!
//! A courier is never called concurrently; serializing calls is the worker's
//! job. Each courier owns a private login home so concurrent workers target
//! different foundations without trampling each other's sessions.

mod cf;
mod executor;

use std::collections::BTreeMap;

use anyhow::Result;
use camino::Utf8Path;

pub use cf::{CfCourier, CfCourierFactory};
pub use executor::CfExecutor;

/// Result of one courier verb: the combined standard output and standard
/// error of the underlying CLI call, and whether it terminated successfully.
#[derive(Debug, Default)]
pub struct CourierOutput {
    pub output: Vec<u8>,
    pub success: bool,
}

impl CourierOutput {
    /// The output as lossily-decoded text, for error messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Verb-level interface to one platform CLI session.
///
/// Every verb returns the combined output even on failure; callers buffer it
/// into the deployment response regardless of outcome. Implementations must
/// be `Send`: each courier is moved into the worker thread that owns it.
pub trait Courier: Send {
    fn login(
        &self,
        api: &str,
        username: &str,
        password: &str,
        org: &str,
        space: &str,
        skip_ssl: bool,
    ) -> Result<CourierOutput>;

    fn push(
        &self,
        app_name: &str,
        app_path: &Utf8Path,
        hostname: &str,
        instances: u16,
        push_opts: &BTreeMap<String, String>,
    ) -> Result<CourierOutput>;

    fn delete(&self, app_name: &str) -> Result<CourierOutput>;

    fn rename(&self, app_name: &str, new_app_name: &str) -> Result<CourierOutput>;

    fn stop(&self, app_name: &str) -> Result<CourierOutput>;

    fn start(&self, app_name: &str) -> Result<CourierOutput>;

    fn map_route(&self, app_name: &str, domain: &str, hostname: &str) -> Result<CourierOutput>;

    fn map_route_with_path(
        &self,
        app_name: &str,
        domain: &str,
        hostname: &str,
        path: &str,
    ) -> Result<CourierOutput>;

    fn unmap_route(&self, app_name: &str, domain: &str, hostname: &str) -> Result<CourierOutput>;

    /// Recent application logs, captured for post-mortem inspection.
    fn logs(&self, app_name: &str) -> Result<CourierOutput>;

    /// Whether the application is present on the logged-in foundation.
    fn exists(&self, app_name: &str) -> bool;

    /// The routable domains of the logged-in foundation.
    fn domains(&self) -> Result<Vec<String>>;

    /// Creates a user-provided service.
    fn cups(&self, service_name: &str, body: &str) -> Result<CourierOutput>;

    /// Releases the courier's scratch filesystem state.
    fn clean_up(&self) -> Result<()>;
}

/// Constructs one courier per worker.
///
/// `Send + Sync` so the conductor can hold the factory behind an `Arc` and
/// create couriers while fanning out.
pub trait CourierFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn Courier>>;
}
