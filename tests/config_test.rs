//! Tests for configuration loading and validation.

use std::io::Write;

use camino::Utf8Path;
use cutover::config::load_config;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"username: default-user
password: default-pass
environments:
  - name: dev
    foundations:
      - "https://f1.example.com"
      - "https://f2.example.com"
    instances: 2
    domain: apps.example.com
  - name: prod
    foundations:
      - "https://p1.example.com"
    enable_rollback: true
    disable_first_deploy_rollback: true
    authenticate: true
error_matchers:
  - description: insufficient memory
    pattern: "insufficient memory"
    solution: increase the memory quota
    code: oom
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_full_config() {
    let file = write_config(CONFIG);
    let config = load_config(Utf8Path::from_path(file.path()).unwrap()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.username, "default-user");
    assert_eq!(config.environments.len(), 2);

    let dev = config.environment("dev").unwrap();
    assert_eq!(dev.foundations.len(), 2);
    assert_eq!(dev.instances, 2);
    assert!(dev.enable_rollback);
    assert!(!dev.authenticate);

    let prod = config.environment("PROD").unwrap();
    assert!(prod.disable_first_deploy_rollback);
    assert!(prod.authenticate);
    // Unspecified instance count falls back to one.
    assert_eq!(prod.instances, 1);

    assert_eq!(config.error_matchers.len(), 1);
    assert_eq!(config.error_matchers[0].code, "oom");
}

#[test]
fn test_load_rejects_malformed_yaml() {
    let file = write_config("environments: [not closed\n");
    assert!(load_config(Utf8Path::from_path(file.path()).unwrap()).is_err());
}

#[test]
fn test_validate_rejects_invalid_foundation_url() {
    let file = write_config("environments:\n  - name: dev\n    foundations: [\"not a url\"]\n");
    let config = load_config(Utf8Path::from_path(file.path()).unwrap()).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_load_missing_file() {
    assert!(load_config(Utf8Path::new("/nonexistent/cutover.yaml")).is_err());
}
