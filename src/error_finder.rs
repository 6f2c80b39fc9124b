//! Post-mortem scanning of platform output for known failure patterns.
//!
//! The platform CLI reports many failures with a generic exit status; the
//! interesting detail is buried in its output. The error finder is
//! configured with an ordered catalog of patterns and, given the accumulated
//! output of a failed deploy, derives a typed error carrying a description
//! and a suggested remediation. The first matching pattern is authoritative.

use std::fmt;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::MatcherConfig;

/// A known failure pattern found in platform output.
#[derive(Debug, Clone)]
pub struct MatchedError {
    /// Short description of the failure class.
    pub description: String,
    /// The output line the pattern matched.
    pub matched_line: String,
    /// Suggested remediation.
    pub solution: String,
    /// Stable identifier for the failure class.
    pub code: String,
}

impl fmt::Display for MatchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// One compiled matcher of the catalog.
struct ErrorMatcher {
    description: String,
    pattern: Regex,
    solution: String,
    code: String,
}

/// Ordered catalog of known failure patterns.
pub struct ErrorFinder {
    matchers: Vec<ErrorMatcher>,
}

impl ErrorFinder {
    /// Compiles the configured matcher catalog.
    pub fn from_config(matchers: &[MatcherConfig]) -> Result<Self> {
        let matchers = matchers
            .iter()
            .map(|m| {
                Ok(ErrorMatcher {
                    description: m.description.clone(),
                    pattern: Regex::new(&m.pattern)
                        .with_context(|| format!("invalid error matcher pattern: {}", m.pattern))?,
                    solution: m.solution.clone(),
                    code: m.code.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { matchers })
    }

    /// Scans output for known failure patterns, in catalog order.
    ///
    /// Each matcher contributes at most one match (its first matching line).
    /// The first entry of the returned list is the authoritative one.
    pub fn find(&self, output: &str) -> Vec<MatchedError> {
        let mut found = Vec::new();
        for matcher in &self.matchers {
            let matched = output
                .lines()
                .find(|line| matcher.pattern.is_match(line));
            if let Some(line) = matched {
                found.push(MatchedError {
                    description: matcher.description.clone(),
                    matched_line: line.to_string(),
                    solution: matcher.solution.clone(),
                    code: matcher.code.clone(),
                });
            }
        }
        found
    }
}
