//! Route mapping after a successful push.
//!
//! If the manifest carries a `routes:` array, each entry is checked against
//! the foundation's routable domains and mapped to the freshly pushed
//! application. Route strings come in three shapes:
//!
//! - `domain.com` — the route *is* a foundation domain; mapped with the
//!   application name as hostname
//! - `host.domain.com` — split on the first `.`: hostname plus domain
//! - `host.domain.com/path` — as above, with the remainder after the first
//!   `/` mapped as the route path

use anyhow::{Result, bail};
use tracing::{debug, info};

use super::{Event, EventHandler, EventKind};
use crate::manifest::Manifest;

/// Maps manifest routes when a push finishes on a foundation.
pub struct RouteMapper;

impl RouteMapper {
    fn map_routes(&self, event: &Event<'_>) -> Result<()> {
        let Some(courier) = event.courier else {
            bail!("push finished event carried no courier");
        };

        if event.info.manifest.is_empty() {
            info!("finished mapping routes: no manifest found");
            return Ok(());
        }

        let manifest = Manifest::parse(&event.info.manifest)?;
        let routes = manifest.routes();
        if routes.is_empty() {
            info!("finished mapping routes: no routes to map");
            return Ok(());
        }

        info!("found {} route(s) in the manifest", routes.len());
        let domains = courier.domains()?;
        let app_name = &event.info.app_name;

        for route in routes {
            let (hostname, domain, path) = split_route(&route.route);

            let output = if domains.iter().any(|d| d == &route.route) {
                courier.map_route(app_name, &route.route, app_name)?
            } else if !domain.is_empty() && domains.iter().any(|d| d == domain) {
                match path {
                    Some(path) => {
                        courier.map_route_with_path(app_name, domain, hostname, path)?
                    }
                    None => courier.map_route(app_name, domain, hostname)?,
                }
            } else {
                bail!("route {} is not a domain in the foundation", route.route);
            };

            if !output.success {
                bail!("failed to map route {}: {}", route.route, output.text());
            }
            debug!("mapped route {} to {}", route.route, app_name);
        }

        info!("route mapping successful: finished mapping routes");
        Ok(())
    }
}

/// Splits a route string into hostname, domain and optional path.
fn split_route(route: &str) -> (&str, &str, Option<&str>) {
    let (hostname, rest) = match route.split_once('.') {
        Some((hostname, rest)) => (hostname, rest),
        None => return (route, "", None),
    };
    match rest.split_once('/') {
        Some((domain, path)) => (hostname, domain, Some(path)),
        None => (hostname, rest, None),
    }
}

impl EventHandler for RouteMapper {
    fn on_event(&self, event: &Event<'_>) -> Result<()> {
        if event.kind != EventKind::PushFinished {
            return Ok(());
        }
        debug!("starting route mapper");
        self.map_routes(event)
    }
}
