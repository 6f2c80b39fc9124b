#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use cutover::config::Environment;
use cutover::courier::{Courier, CourierFactory, CourierOutput};
use cutover::events::{Event, EventHandler};
use cutover::fetcher::{ArtifactFetcher, Fetcher};

/// Scripted behavior for one foundation's mock courier.
#[derive(Clone, Default)]
pub struct CourierScript {
    pub login_fails: bool,
    pub push_fails: bool,
    pub stop_fails: bool,
    pub start_fails: bool,
    pub delete_fails: bool,
    pub rename_fails: bool,
    pub map_route_fails: bool,
    /// `exists(app)` answer for the application name itself.
    pub app_exists: bool,
    /// `exists(app)` answer for the `-venerable` name.
    pub venerable_exists: bool,
    /// Routable domains answered by `domains()`.
    pub domains: Vec<String>,
    /// Extra delay before answering login, to shake out barrier bugs.
    pub login_delay: Option<Duration>,
    /// Extra delay before answering push.
    pub push_delay: Option<Duration>,
    /// Output override for the push verb.
    pub push_output: Option<String>,
    /// Recent logs answered by `logs()`.
    pub recent_logs: Option<String>,
}

/// Records every courier call across all foundations, in call order.
///
/// Entries look like `f1:login` or `f2:push:2`; the shared mutex makes the
/// interleaving across worker threads observable.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub struct MockCourier {
    label: String,
    log: CallLog,
    script: CourierScript,
    /// Whether the venerable name currently exists; renames and deletes
    /// keep it up to date so blue-green sequences behave realistically.
    venerable_present: Mutex<bool>,
}

impl MockCourier {
    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn answer(&self, verb: &str, fails: bool) -> CourierOutput {
        CourierOutput {
            output: format!("{} {} output\n", self.label, verb).into_bytes(),
            success: !fails,
        }
    }
}

impl Courier for MockCourier {
    fn login(
        &self,
        _api: &str,
        _username: &str,
        _password: &str,
        _org: &str,
        _space: &str,
        _skip_ssl: bool,
    ) -> Result<CourierOutput> {
        if let Some(delay) = self.script.login_delay {
            std::thread::sleep(delay);
        }
        self.record(format!("{}:login", self.label));
        Ok(self.answer("login", self.script.login_fails))
    }

    fn push(
        &self,
        _app_name: &str,
        _app_path: &Utf8Path,
        _hostname: &str,
        instances: u16,
        _push_opts: &BTreeMap<String, String>,
    ) -> Result<CourierOutput> {
        if let Some(delay) = self.script.push_delay {
            std::thread::sleep(delay);
        }
        self.record(format!("{}:push:{}", self.label, instances));
        let mut result = self.answer("push", self.script.push_fails);
        if let Some(output) = &self.script.push_output {
            result.output = output.clone().into_bytes();
        }
        Ok(result)
    }

    fn delete(&self, app_name: &str) -> Result<CourierOutput> {
        self.record(format!("{}:delete:{}", self.label, app_name));
        let result = self.answer("delete", self.script.delete_fails);
        if result.success && app_name.ends_with("-venerable") {
            *self.venerable_present.lock().unwrap() = false;
        }
        Ok(result)
    }

    fn rename(&self, app_name: &str, new_app_name: &str) -> Result<CourierOutput> {
        self.record(format!("{}:rename:{}:{}", self.label, app_name, new_app_name));
        let result = self.answer("rename", self.script.rename_fails);
        if result.success {
            if new_app_name.ends_with("-venerable") {
                *self.venerable_present.lock().unwrap() = true;
            } else if app_name.ends_with("-venerable") {
                *self.venerable_present.lock().unwrap() = false;
            }
        }
        Ok(result)
    }

    fn stop(&self, app_name: &str) -> Result<CourierOutput> {
        self.record(format!("{}:stop:{}", self.label, app_name));
        Ok(self.answer("stop", self.script.stop_fails))
    }

    fn start(&self, app_name: &str) -> Result<CourierOutput> {
        self.record(format!("{}:start:{}", self.label, app_name));
        Ok(self.answer("start", self.script.start_fails))
    }

    fn map_route(&self, app_name: &str, domain: &str, hostname: &str) -> Result<CourierOutput> {
        self.record(format!("{}:map-route:{}:{}:{}", self.label, app_name, domain, hostname));
        Ok(self.answer("map-route", self.script.map_route_fails))
    }

    fn map_route_with_path(
        &self,
        app_name: &str,
        domain: &str,
        hostname: &str,
        path: &str,
    ) -> Result<CourierOutput> {
        self.record(format!(
            "{}:map-route:{}:{}:{}:{}",
            self.label, app_name, domain, hostname, path
        ));
        Ok(self.answer("map-route", self.script.map_route_fails))
    }

    fn unmap_route(&self, app_name: &str, domain: &str, hostname: &str) -> Result<CourierOutput> {
        self.record(format!("{}:unmap-route:{}:{}:{}", self.label, app_name, domain, hostname));
        Ok(self.answer("unmap-route", false))
    }

    fn logs(&self, app_name: &str) -> Result<CourierOutput> {
        self.record(format!("{}:logs:{}", self.label, app_name));
        match &self.script.recent_logs {
            Some(logs) => Ok(CourierOutput {
                output: logs.clone().into_bytes(),
                success: true,
            }),
            None => Ok(CourierOutput {
                output: Vec::new(),
                success: false,
            }),
        }
    }

    fn exists(&self, app_name: &str) -> bool {
        self.record(format!("{}:exists:{}", self.label, app_name));
        if app_name.ends_with("-venerable") {
            *self.venerable_present.lock().unwrap()
        } else {
            self.script.app_exists
        }
    }

    fn domains(&self) -> Result<Vec<String>> {
        self.record(format!("{}:domains", self.label));
        Ok(self.script.domains.clone())
    }

    fn cups(&self, service_name: &str, _body: &str) -> Result<CourierOutput> {
        self.record(format!("{}:cups:{}", self.label, service_name));
        Ok(self.answer("cups", false))
    }

    fn clean_up(&self) -> Result<()> {
        self.record(format!("{}:clean_up", self.label));
        Ok(())
    }
}

/// Hands out pre-scripted couriers in foundation (configuration) order.
pub struct MockCourierFactory {
    scripts: Mutex<VecDeque<(String, CourierScript)>>,
    pub log: CallLog,
    pub fail_create: bool,
}

impl MockCourierFactory {
    pub fn new(scripts: Vec<(&str, CourierScript)>) -> Self {
        Self {
            scripts: Mutex::new(
                scripts
                    .into_iter()
                    .map(|(label, script)| (label.to_string(), script))
                    .collect(),
            ),
            log: Arc::new(Mutex::new(Vec::new())),
            fail_create: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            log: Arc::new(Mutex::new(Vec::new())),
            fail_create: true,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl CourierFactory for MockCourierFactory {
    fn create(&self) -> Result<Box<dyn Courier>> {
        if self.fail_create {
            bail!("no courier available");
        }
        let (label, script) = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .context("factory ran out of scripted couriers")?;
        let venerable_present = Mutex::new(script.venerable_exists);
        Ok(Box::new(MockCourier {
            label,
            log: self.log.clone(),
            script,
            venerable_present,
        }))
    }
}

/// Fetcher that fabricates artifact directories locally.
///
/// `fetch` creates an empty scratch directory and records the URL;
/// `fetch_zip` delegates to the real extraction so zip deploys exercise the
/// production path without any network.
pub struct MockFetcher {
    pub fetched_urls: Mutex<Vec<String>>,
    /// The manifest text handed to each `fetch` call.
    pub manifests: Mutex<Vec<String>>,
    pub created: Mutex<Vec<Utf8PathBuf>>,
    pub fail: bool,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            fetched_urls: Mutex::new(Vec::new()),
            manifests: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fetched_urls: Mutex::new(Vec::new()),
            manifests: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn created_paths(&self) -> Vec<Utf8PathBuf> {
        self.created.lock().unwrap().clone()
    }

    fn scratch(&self) -> Result<Utf8PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix("cutover-test-artifact-")
            .tempdir()?;
        let path = Utf8PathBuf::from_path_buf(dir.keep())
            .map_err(|p| anyhow::anyhow!("non-utf8 temp path: {}", p.display()))?;
        self.created.lock().unwrap().push(path.clone());
        Ok(path)
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, url: &str, manifest: &str) -> Result<Utf8PathBuf> {
        if self.fail {
            bail!("artifact store unavailable");
        }
        self.fetched_urls.lock().unwrap().push(url.to_string());
        self.manifests.lock().unwrap().push(manifest.to_string());
        let path = self.scratch()?;
        if !manifest.is_empty() {
            std::fs::write(path.join("manifest.yml"), manifest)?;
        }
        Ok(path)
    }

    fn fetch_zip(&self, body: &[u8]) -> Result<Utf8PathBuf> {
        if self.fail {
            bail!("zip extraction unavailable");
        }
        let path = ArtifactFetcher.fetch_zip(body)?;
        self.created.lock().unwrap().push(path.clone());
        Ok(path)
    }
}

/// Event handler that records the kinds it saw, optionally failing or
/// panicking on a specific kind.
pub struct RecordingHandler {
    pub seen: Arc<Mutex<Vec<String>>>,
    pub fail_on: Option<&'static str>,
    pub panic_on: Option<&'static str>,
}

impl RecordingHandler {
    pub fn new(seen: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            seen,
            fail_on: None,
            panic_on: None,
        }
    }
}

impl EventHandler for RecordingHandler {
    fn on_event(&self, event: &Event<'_>) -> Result<()> {
        let kind = event.kind.to_string();
        self.seen.lock().unwrap().push(kind.clone());
        if self.panic_on == Some(kind.as_str()) {
            panic!("handler panic on {}", kind);
        }
        if self.fail_on == Some(kind.as_str()) {
            bail!("handler failure on {}", kind);
        }
        Ok(())
    }
}

/// Builds an environment over the given foundation URLs with rollback
/// enabled and two default instances.
pub fn test_environment(name: &str, foundations: &[&str]) -> Environment {
    let yaml = format!(
        "name: {}\nfoundations: [{}]\ninstances: 2\ndomain: apps.example.com\n",
        name,
        foundations
            .iter()
            .map(|f| format!("\"{}\"", f))
            .collect::<Vec<_>>()
            .join(", ")
    );
    serde_yaml::from_str(&yaml).unwrap()
}

/// Builds a zip archive in memory from (name, content) entries.
pub fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    use std::io::{Cursor, Write};
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

/// Index of the first log entry containing `needle`, or panics.
pub fn position(calls: &[String], needle: &str) -> usize {
    calls
        .iter()
        .position(|entry| entry.contains(needle))
        .unwrap_or_else(|| panic!("no call matching {:?} in {:?}", needle, calls))
}

/// All indices of log entries containing `needle`.
pub fn positions(calls: &[String], needle: &str) -> Vec<usize> {
    calls
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.contains(needle))
        .map(|(index, _)| index)
        .collect()
}
