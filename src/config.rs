//! Configuration module for cutover.
//!
//! This module provides data structures and functions for configuring the
//! deployment service. A configuration names the environments the service can
//! deploy to (each with its list of foundation URLs and rollback policy),
//! default platform credentials, and the catalog of known error patterns the
//! error finder scans platform output with.
//!
//! The configuration is typically loaded from a YAML file using
//! [`load_config`].

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;

use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use serde::Deserialize;
use tracing::debug;

/// Top-level service configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Default platform username, used when a request carries no
    /// authorization and the environment does not require one.
    #[serde(default)]
    pub username: String,
    /// Default platform password.
    #[serde(default)]
    pub password: String,
    /// Deployable environments.
    pub environments: Vec<Environment>,
    /// Known error patterns, scanned in order against platform output.
    #[serde(default)]
    pub error_matchers: Vec<MatcherConfig>,
}

/// A named deployment environment.
///
/// An environment is a set of foundations (regional control planes) that
/// receive the same operations during one deploy, plus the policy knobs
/// governing rollback behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct Environment {
    /// Environment name as used in deploy requests (matched case-insensitively).
    pub name: String,
    /// Foundation base URLs. Order here is the order per-foundation output is
    /// written to the response.
    pub foundations: Vec<String>,
    /// Default instance count when the manifest does not specify one.
    #[serde(default = "default_instances")]
    pub instances: u16,
    /// Default routable domain for the environment.
    #[serde(default)]
    pub domain: String,
    /// Skip TLS validation when logging in to foundations.
    #[serde(default)]
    pub skip_ssl: bool,
    /// Roll back all foundations when any foundation's main phase fails.
    #[serde(default = "default_true")]
    pub enable_rollback: bool,
    /// Suppress rollback when no foundation knew the application beforehand.
    /// There is nothing to roll back to on a first deploy.
    #[serde(default)]
    pub disable_first_deploy_rollback: bool,
    /// Require request-supplied basic authorization instead of falling back
    /// to the configured default credentials.
    #[serde(default)]
    pub authenticate: bool,
    /// Free-form parameters passed through to deployments.
    #[serde(default)]
    pub custom_params: BTreeMap<String, String>,
}

/// One error-matcher entry of the error finder catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct MatcherConfig {
    /// Short description of the failure, surfaced as the replacement error.
    pub description: String,
    /// Regular expression matched against platform output lines.
    pub pattern: String,
    /// Suggested remediation, appended to the response.
    #[serde(default)]
    pub solution: String,
    /// Stable identifier for the failure class.
    #[serde(default)]
    pub code: String,
}

fn default_instances() -> u16 {
    1
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Validate configuration semantics beyond basic deserialization.
    pub fn validate(&self) -> Result<()> {
        if self.environments.is_empty() {
            bail!("at least one environment must be configured");
        }
        let mut seen = Vec::with_capacity(self.environments.len());
        for environment in &self.environments {
            environment.validate()?;
            let lowered = environment.name.to_ascii_lowercase();
            if seen.contains(&lowered) {
                bail!("duplicate environment name: {}", environment.name);
            }
            seen.push(lowered);
        }
        for (index, matcher) in self.error_matchers.iter().enumerate() {
            regex::Regex::new(&matcher.pattern).with_context(|| {
                format!("error matcher {} has an invalid pattern", index + 1)
            })?;
        }
        Ok(())
    }

    /// Looks up an environment by name, case-insensitively.
    pub fn environment(&self, name: &str) -> Option<&Environment> {
        self.environments
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }
}

impl Environment {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("environment name must not be empty");
        }
        if self.foundations.is_empty() {
            bail!("environment {} has no foundations", self.name);
        }
        for foundation in &self.foundations {
            url::Url::parse(foundation).with_context(|| {
                format!(
                    "environment {} has an invalid foundation URL: {}",
                    self.name, foundation
                )
            })?;
        }
        if self.instances < 1 {
            bail!("environment {} must allow at least one instance", self.name);
        }
        Ok(())
    }
}

/// Loads a service configuration from a YAML file.
#[tracing::instrument]
pub fn load_config(path: &Utf8Path) -> Result<Config> {
    let file = File::open(path).with_context(|| format!("failed to load file: {}", path))?;
    let reader = BufReader::new(file);
    let config: Config = serde_yaml::from_reader(reader)
        .with_context(|| format!("failed to parse yaml: {}", path))?;
    debug!("loaded config with {} environment(s)", config.environments.len());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_environment() -> Environment {
        Environment {
            name: "dev".to_string(),
            foundations: vec!["https://f1.example.com".to_string()],
            instances: 2,
            domain: "apps.example.com".to_string(),
            skip_ssl: false,
            enable_rollback: true,
            disable_first_deploy_rollback: false,
            authenticate: false,
            custom_params: BTreeMap::new(),
        }
    }

    #[test]
    fn test_environment_lookup_is_case_insensitive() {
        let config = Config {
            username: String::new(),
            password: String::new(),
            environments: vec![dev_environment()],
            error_matchers: vec![],
        };
        assert!(config.environment("DEV").is_some());
        assert!(config.environment("prod").is_none());
    }

    #[test]
    fn test_validate_rejects_empty_foundations() {
        let mut environment = dev_environment();
        environment.foundations.clear();
        let config = Config {
            username: String::new(),
            password: String::new(),
            environments: vec![environment],
            error_matchers: vec![],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let config = Config {
            username: String::new(),
            password: String::new(),
            environments: vec![dev_environment(), dev_environment()],
            error_matchers: vec![],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_matcher_pattern() {
        let config = Config {
            username: String::new(),
            password: String::new(),
            environments: vec![dev_environment()],
            error_matchers: vec![MatcherConfig {
                description: "broken".to_string(),
                pattern: "(".to_string(),
                solution: String::new(),
                code: String::new(),
            }],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rollback_defaults() {
        let yaml = "name: dev\nfoundations: [\"https://f1\"]\n";
        let environment: Environment = serde_yaml::from_str(yaml).unwrap();
        assert!(environment.enable_rollback);
        assert!(!environment.disable_first_deploy_rollback);
        assert_eq!(environment.instances, 1);
    }
}
