//! Foundation liveness probing.
//!
//! Before any courier work starts, every foundation of the target
//! environment is probed for reachability. The probe is a bounded TCP
//! connect to the foundation's host and port; it asserts the control plane
//! is there at all, not that credentials will work. A reachable foundation
//! that rejects logins surfaces in the login phase instead.

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::debug;
use url::Url;

use crate::config::Environment;
use crate::deployment::DeploymentInfo;
use crate::error::CutoverError;
use crate::events::{Event, EventKind, EventManager};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probes every foundation of an environment before a deploy.
pub struct Prechecker {
    events: Arc<EventManager>,
}

impl Prechecker {
    pub fn new(events: Arc<EventManager>) -> Self {
        Self { events }
    }

    /// Returns an error naming the first unreachable foundation, after
    /// emitting a deploy-error event for it.
    pub fn assert_all_foundations_up(
        &self,
        environment: &Environment,
        info: &DeploymentInfo,
    ) -> Result<(), CutoverError> {
        for foundation in &environment.foundations {
            debug!("prechecking foundation {}", foundation);
            if let Err(err) = probe(foundation) {
                let error = CutoverError::Precheck {
                    foundation: foundation.clone(),
                    reason: format!("{:#}", err),
                };
                if let Err(emit_err) = self
                    .events
                    .emit(&Event::failure(EventKind::DeployError, info, &error))
                {
                    tracing::error!("deploy error event failed: {:#}", emit_err);
                }
                return Err(error);
            }
        }
        Ok(())
    }
}

fn probe(foundation: &str) -> Result<()> {
    let url = Url::parse(foundation)
        .with_context(|| format!("invalid foundation URL: {}", foundation))?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("foundation URL has no host: {}", foundation))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("foundation URL has no port: {}", foundation))?;

    let address = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve {}", host))?
        .next()
        .ok_or_else(|| anyhow!("no address for {}", host))?;

    TcpStream::connect_timeout(&address, PROBE_TIMEOUT)
        .with_context(|| format!("failed to connect to {}", address))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_rejects_invalid_url() {
        assert!(probe("not a url").is_err());
    }

    #[test]
    fn test_probe_reaches_local_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        probe(&format!("http://127.0.0.1:{}", port)).unwrap();
    }

    #[test]
    fn test_probe_fails_on_closed_port() {
        // Bind then drop to find a port that is very likely closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(probe(&format!("http://127.0.0.1:{}", port)).is_err());
    }
}
