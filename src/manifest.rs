//! Platform manifest handling.
//!
//! A manifest is the platform's YAML application descriptor. The core reads
//! `instances` and `routes`, merges request-supplied environment variables
//! into `env`, and round-trips every other field untouched.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Parsed platform manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applications: Vec<Application>,
}

/// One application entry of a manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Application {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buildpack: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    /// Fields the core does not interpret; preserved across the round-trip.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// A `routes:` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub route: String,
}

impl Manifest {
    /// Parses manifest YAML text.
    pub fn parse(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("failed to parse manifest yaml")
    }

    /// Serializes the manifest back to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialize manifest yaml")
    }

    /// Returns the instance count of the first application, when it is
    /// present and at least one. Anything else means "use the environment
    /// default".
    pub fn instances(&self) -> Option<u16> {
        self.applications
            .first()
            .and_then(|app| app.instances)
            .filter(|count| *count >= 1)
    }

    /// Returns the routes of the first application.
    pub fn routes(&self) -> &[Route] {
        self.applications
            .first()
            .map(|app| app.routes.as_slice())
            .unwrap_or_default()
    }

    /// Merges an environment variable into the first application.
    ///
    /// Erases the `path` field at the same time: the push happens from an
    /// exploded temporary directory, so a path recorded by the uploader
    /// would point at a filesystem that no longer exists.
    pub fn add_env_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if let Some(app) = self.applications.first_mut() {
            app.env.insert(name.into(), value.into());
            app.path = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = "applications:\n- name: myapp\n  instances: 3\n  memory: 512M\n";

    #[test]
    fn test_instances_present() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        assert_eq!(manifest.instances(), Some(3));
    }

    #[test]
    fn test_instances_absent() {
        let manifest = Manifest::parse("applications:\n- name: myapp\n").unwrap();
        assert_eq!(manifest.instances(), None);
    }

    #[test]
    fn test_instances_zero_is_ignored() {
        let manifest = Manifest::parse("applications:\n- name: myapp\n  instances: 0\n").unwrap();
        assert_eq!(manifest.instances(), None);
    }

    #[test]
    fn test_instances_no_applications() {
        let manifest = Manifest::parse("applications: []\n").unwrap();
        assert_eq!(manifest.instances(), None);
    }

    #[test]
    fn test_add_env_var_erases_path() {
        let mut manifest =
            Manifest::parse("applications:\n- name: myapp\n  path: ./target\n").unwrap();
        manifest.add_env_var("FOO", "bar");
        let app = &manifest.applications[0];
        assert_eq!(app.env.get("FOO").map(String::as_str), Some("bar"));
        assert!(app.path.is_none());
    }

    #[test]
    fn test_add_env_var_without_applications_is_a_no_op() {
        let mut manifest = Manifest::default();
        manifest.add_env_var("FOO", "bar");
        assert!(manifest.applications.is_empty());
    }

    #[test]
    fn test_round_trip_preserves_unknown_fields() {
        let text = "applications:\n- name: myapp\n  buildpack: java\n  stack: cflinuxfs4\n";
        let manifest = Manifest::parse(text).unwrap();
        let yaml = manifest.to_yaml().unwrap();
        let reparsed = Manifest::parse(&yaml).unwrap();
        assert_eq!(
            reparsed.applications[0]
                .extra
                .get("stack")
                .and_then(|v| v.as_str()),
            Some("cflinuxfs4")
        );
    }

    #[test]
    fn test_routes() {
        let text = "applications:\n- name: myapp\n  routes:\n  - route: myapp.example.com\n";
        let manifest = Manifest::parse(text).unwrap();
        assert_eq!(manifest.routes().len(), 1);
        assert_eq!(manifest.routes()[0].route, "myapp.example.com");
    }
}
