//! Post-push health checking.
//!
//! When a deploy carries a `health_check_endpoint`, the new build must prove
//! it is serving before the deploy is allowed to finish. After a push
//! completes on a foundation, a temporary route is mapped to the new
//! instance, `https://<app>.<domain><endpoint>` is fetched, and the route is
//! unmapped again whether or not the check passed. A non-2xx answer (or no
//! answer) fails the deploy on that foundation.

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use super::{Event, EventHandler, EventKind};

/// Minimal HTTP seam so health checks can be tested without a network.
pub trait HealthClient: Send + Sync {
    /// Performs a GET and returns the response status code.
    fn get(&self, url: &str) -> Result<u16>;
}

/// Production client over `ureq`.
pub struct UreqClient;

impl HealthClient for UreqClient {
    fn get(&self, url: &str) -> Result<u16> {
        match ureq::get(url).call() {
            Ok(response) => Ok(response.status()),
            Err(ureq::Error::Status(code, _)) => Ok(code),
            Err(err) => Err(err).with_context(|| format!("health check request failed: {}", url)),
        }
    }
}

/// Verifies the freshly pushed build answers on its health endpoint.
pub struct HealthChecker {
    client: Box<dyn HealthClient>,
}

impl HealthChecker {
    pub fn new(client: Box<dyn HealthClient>) -> Self {
        Self { client }
    }

    pub fn with_ureq() -> Self {
        Self::new(Box::new(UreqClient))
    }

    fn check(&self, event: &Event<'_>) -> Result<()> {
        let endpoint = &event.info.health_check_endpoint;
        if endpoint.is_empty() {
            debug!("no health check endpoint configured, skipping");
            return Ok(());
        }
        let Some(courier) = event.courier else {
            bail!("push finished event carried no courier");
        };
        let app = &event.info.app_name;
        let domain = &event.info.domain;
        if domain.is_empty() {
            warn!("skipping health check for {}: environment has no domain", app);
            return Ok(());
        }

        // Temporary route so the new build is reachable before cutover.
        let mapped = courier.map_route(app, domain, app)?;
        if !mapped.success {
            bail!("cannot map health check route for {}: {}", app, mapped.text());
        }

        let result = self.probe(app, domain, endpoint);

        // The temporary route comes off whether or not the check passed.
        match courier.unmap_route(app, domain, app) {
            Ok(output) if !output.success => {
                warn!("failed to unmap health check route for {}: {}", app, output.text());
            }
            Err(err) => {
                warn!("failed to unmap health check route for {}: {:#}", app, err);
            }
            Ok(_) => {}
        }

        result
    }

    fn probe(&self, app: &str, domain: &str, endpoint: &str) -> Result<()> {
        let url = health_check_url(app, domain, endpoint);
        info!("health checking {}", url);
        let status = self.client.get(&url)?;
        if !(200..300).contains(&status) {
            bail!("health check failed on endpoint {}: status {}", endpoint, status);
        }
        info!("health check passed: {}", url);
        Ok(())
    }
}

/// Builds the check URL, defaulting the leading `/` of the endpoint.
fn health_check_url(app: &str, domain: &str, endpoint: &str) -> String {
    if endpoint.starts_with('/') {
        format!("https://{}.{}{}", app, domain, endpoint)
    } else {
        format!("https://{}.{}/{}", app, domain, endpoint)
    }
}

impl EventHandler for HealthChecker {
    fn on_event(&self, event: &Event<'_>) -> Result<()> {
        if event.kind != EventKind::PushFinished {
            return Ok(());
        }
        self.check(event)
    }
}
