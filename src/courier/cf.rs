//! The `cf` courier: verb-to-argv mapping over [`CfExecutor`].

use std::collections::BTreeMap;

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use which::which;

use super::{Courier, CourierFactory, CourierOutput, executor::CfExecutor};

/// Appends a flag and its value when the value is not empty.
fn add_flag(args: &mut Vec<String>, flag: &str, value: &str) {
    if !value.is_empty() {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
}

/// Production courier wrapping the `cf` binary.
pub struct CfCourier {
    executor: CfExecutor,
}

impl CfCourier {
    pub fn new(executor: CfExecutor) -> Self {
        Self { executor }
    }
}

impl Courier for CfCourier {
    fn login(
        &self,
        api: &str,
        username: &str,
        password: &str,
        org: &str,
        space: &str,
        skip_ssl: bool,
    ) -> Result<CourierOutput> {
        let mut args = vec!["login".to_string()];
        add_flag(&mut args, "-a", api);
        add_flag(&mut args, "-u", username);
        add_flag(&mut args, "-p", password);
        add_flag(&mut args, "-o", org);
        add_flag(&mut args, "-s", space);
        if skip_ssl {
            args.push("--skip-ssl-validation".to_string());
        }
        self.executor.execute(&args)
    }

    fn push(
        &self,
        app_name: &str,
        app_path: &Utf8Path,
        hostname: &str,
        instances: u16,
        push_opts: &BTreeMap<String, String>,
    ) -> Result<CourierOutput> {
        let mut args = vec!["push".to_string(), app_name.to_string()];
        add_flag(&mut args, "-i", &instances.to_string());
        add_flag(&mut args, "-n", hostname);
        for (key, value) in push_opts {
            add_flag(&mut args, &format!("--{}", key), value);
        }
        // Pushed from inside the exploded artifact so relative manifest
        // paths resolve.
        self.executor.execute_in(app_path, &args)
    }

    fn delete(&self, app_name: &str) -> Result<CourierOutput> {
        self.executor
            .execute(&["delete".to_string(), app_name.to_string(), "-f".to_string()])
    }

    fn rename(&self, app_name: &str, new_app_name: &str) -> Result<CourierOutput> {
        self.executor.execute(&[
            "rename".to_string(),
            app_name.to_string(),
            new_app_name.to_string(),
        ])
    }

    fn stop(&self, app_name: &str) -> Result<CourierOutput> {
        self.executor
            .execute(&["stop".to_string(), app_name.to_string()])
    }

    fn start(&self, app_name: &str) -> Result<CourierOutput> {
        self.executor
            .execute(&["start".to_string(), app_name.to_string()])
    }

    fn map_route(&self, app_name: &str, domain: &str, hostname: &str) -> Result<CourierOutput> {
        let mut args = vec![
            "map-route".to_string(),
            app_name.to_string(),
            domain.to_string(),
        ];
        add_flag(&mut args, "-n", hostname);
        self.executor.execute(&args)
    }

    fn map_route_with_path(
        &self,
        app_name: &str,
        domain: &str,
        hostname: &str,
        path: &str,
    ) -> Result<CourierOutput> {
        let mut args = vec![
            "map-route".to_string(),
            app_name.to_string(),
            domain.to_string(),
        ];
        add_flag(&mut args, "-n", hostname);
        add_flag(&mut args, "--path", path);
        self.executor.execute(&args)
    }

    fn unmap_route(&self, app_name: &str, domain: &str, hostname: &str) -> Result<CourierOutput> {
        let mut args = vec![
            "unmap-route".to_string(),
            app_name.to_string(),
            domain.to_string(),
        ];
        add_flag(&mut args, "-n", hostname);
        self.executor.execute(&args)
    }

    fn logs(&self, app_name: &str) -> Result<CourierOutput> {
        self.executor.execute(&[
            "logs".to_string(),
            app_name.to_string(),
            "--recent".to_string(),
        ])
    }

    fn exists(&self, app_name: &str) -> bool {
        self.executor
            .execute(&["app".to_string(), app_name.to_string()])
            .map(|result| result.success)
            .unwrap_or(false)
    }

    fn domains(&self) -> Result<Vec<String>> {
        let result = self.executor.execute(&["domains".to_string()])?;
        if !result.success {
            anyhow::bail!("failed to list domains: {}", result.text());
        }
        // Tabular output: everything before the `name ...` header line is
        // connection chatter; the first token of each following line is the
        // domain.
        let text = result.text();
        let mut domains = Vec::new();
        let mut saw_header = false;
        for line in text.lines() {
            let Some(first) = line.split_whitespace().next() else {
                continue;
            };
            if !saw_header {
                if first == "name" {
                    saw_header = true;
                }
                continue;
            }
            domains.push(first.to_string());
        }
        Ok(domains)
    }

    fn cups(&self, service_name: &str, body: &str) -> Result<CourierOutput> {
        self.executor.execute(&[
            "cups".to_string(),
            service_name.to_string(),
            "-p".to_string(),
            body.to_string(),
        ])
    }

    fn clean_up(&self) -> Result<()> {
        self.executor.clean_up()
    }
}

/// Creates `cf`-backed couriers. Construction fails when the binary is not
/// on PATH, so a misconfigured host is caught at startup rather than at the
/// first deploy.
pub struct CfCourierFactory {
    cf_path: Utf8PathBuf,
}

impl CfCourierFactory {
    pub fn new() -> Result<Self> {
        let cf_path = which("cf").map_err(|e| anyhow::anyhow!("cf binary not found: {}", e))?;
        let cf_path = Utf8PathBuf::from_path_buf(cf_path)
            .map_err(|p| anyhow::anyhow!("cf path is not UTF-8: {}", p.display()))?;
        Ok(Self { cf_path })
    }
}

impl CourierFactory for CfCourierFactory {
    fn create(&self) -> Result<Box<dyn Courier>> {
        let executor = CfExecutor::new(self.cf_path.clone())?;
        Ok(Box::new(CfCourier::new(executor)))
    }
}
