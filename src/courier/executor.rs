//! Process execution for the platform CLI.
//!
//! [`CfExecutor`] runs the `cf` binary with a private `CF_HOME`, captures
//! stdout and stderr through named reader threads, and returns the combined
//! output with the terminal status. The private home keeps concurrent
//! couriers logged in to different foundations at the same time.

use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::thread::JoinHandle;

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};

use super::CourierOutput;

/// Extracts a human-readable message from a thread panic.
fn panic_message(err: &(dyn std::any::Any + Send)) -> &str {
    err.downcast_ref::<&str>()
        .copied()
        .or_else(|| err.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic")
}

/// Reads a pipe to EOF into a buffer, tracing each line.
///
/// Binary data is handled gracefully: lossy UTF-8 conversion for the trace
/// output, original bytes preserved in the returned buffer.
fn read_pipe_to_buffer<R: Read>(pipe: Option<R>, stream: &'static str) -> Vec<u8> {
    let Some(pipe) = pipe else {
        return Vec::new();
    };

    let mut reader = BufReader::new(pipe);
    let mut buffer = Vec::new();
    let mut line_buf = Vec::new();

    loop {
        line_buf.clear();
        match reader.read_until(b'\n', &mut line_buf) {
            Ok(0) => break, // EOF
            Ok(_) => {
                let content = line_buf.strip_suffix(b"\n").unwrap_or(&line_buf);
                tracing::debug!(stream = stream, "{}", String::from_utf8_lossy(content));
                buffer.extend_from_slice(&line_buf);
            }
            Err(e) => {
                tracing::warn!(stream = stream, error = %e, "I/O error, stopping read");
                break;
            }
        }
    }

    buffer
}

/// Kills a child process and joins its reader threads.
///
/// Called from error paths to prevent process and thread leaks when waiting
/// on the child fails.
fn cleanup_child_process<I>(child: &mut Child, handles: I)
where
    I: IntoIterator<Item = JoinHandle<Vec<u8>>>,
{
    let pid = child.id();
    if let Err(e) = child.kill() {
        tracing::debug!(pid = pid, "kill returned error (process may have already exited): {}", e);
    }
    if let Err(e) = child.wait() {
        tracing::warn!(pid = pid, "failed to wait for child process after kill: {}", e);
    }
    for handle in handles {
        if let Err(e) = handle.join() {
            tracing::warn!("reader thread panicked during cleanup: {}", panic_message(&*e));
        }
    }
}

/// Executes `cf` commands with a private login home.
///
/// The home directory is created when the executor is, and removed by
/// [`CfExecutor::clean_up`]; a `Drop` guard removes it if the explicit
/// clean-up never ran.
pub struct CfExecutor {
    cf_path: Utf8PathBuf,
    home: Utf8PathBuf,
}

impl CfExecutor {
    /// Creates an executor around the resolved `cf` binary.
    pub fn new(cf_path: Utf8PathBuf) -> Result<Self> {
        let home = tempfile::Builder::new()
            .prefix("cutover-cf-home-")
            .tempdir()
            .context("failed to create courier home directory")?;
        let home = Utf8PathBuf::from_path_buf(home.keep())
            .map_err(|p| anyhow::anyhow!("courier home path is not UTF-8: {}", p.display()))?;
        Ok(Self { cf_path, home })
    }

    /// Runs `cf` with the given arguments, from the current directory.
    pub fn execute(&self, args: &[String]) -> Result<CourierOutput> {
        self.run(args, None)
    }

    /// Runs `cf` with the given arguments, from inside `dir`.
    pub fn execute_in(&self, dir: &Utf8Path, args: &[String]) -> Result<CourierOutput> {
        self.run(args, Some(dir))
    }

    /// Removes the executor's home directory. Idempotent.
    pub fn clean_up(&self) -> Result<()> {
        match fs::remove_dir_all(&self.home) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove courier home: {}", self.home))
            }
        }
    }

    fn run(&self, args: &[String], cwd: Option<&Utf8Path>) -> Result<CourierOutput> {
        let verb = args.first().map(String::as_str).unwrap_or("<none>");
        tracing::trace!("running cf verb: {}", verb);

        let mut command = Command::new(self.cf_path.as_std_path());
        command.args(args);
        command.env("CF_HOME", self.home.as_std_path());
        if let Some(dir) = cwd {
            command.current_dir(dir.as_std_path());
        }
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn cf {}", verb))?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let stdout_handle = match thread::Builder::new()
            .name("stdout-reader".to_string())
            .spawn(move || read_pipe_to_buffer(stdout_pipe, "stdout"))
        {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, []);
                bail!("failed to spawn stdout reader thread: {}", e);
            }
        };

        let stderr_handle = match thread::Builder::new()
            .name("stderr-reader".to_string())
            .spawn(move || read_pipe_to_buffer(stderr_pipe, "stderr"))
        {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, [stdout_handle]);
                bail!("failed to spawn stderr reader thread: {}", e);
            }
        };

        let status = match child.wait() {
            Ok(s) => s,
            Err(e) => {
                cleanup_child_process(&mut child, [stdout_handle, stderr_handle]);
                bail!("failed to wait for cf {}: {}", verb, e);
            }
        };

        let mut output = stdout_handle.join().unwrap_or_else(|e| {
            tracing::error!(stream = "stdout", panic = panic_message(&*e), "reader thread panicked");
            Vec::new()
        });
        let stderr = stderr_handle.join().unwrap_or_else(|e| {
            tracing::error!(stream = "stderr", panic = panic_message(&*e), "reader thread panicked");
            Vec::new()
        });
        output.extend_from_slice(&stderr);

        tracing::trace!("cf {} finished: success={}", verb, status.success());

        Ok(CourierOutput {
            output,
            success: status.success(),
        })
    }
}

impl Drop for CfExecutor {
    fn drop(&mut self) {
        if let Err(e) = self.clean_up() {
            tracing::warn!("courier home left behind: {:#}", e);
        }
    }
}
