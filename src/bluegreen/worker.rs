//! The per-foundation serial executor.
//!
//! A worker binds one foundation and its courier to a dedicated thread. The
//! conductor feeds it one [`PhaseCommand`] at a time; the worker runs the
//! matching action phase against its courier and answers with a
//! [`PhaseReport`] carrying the phase output, the error if any, and the
//! observations the conductor reads after the barrier. Within a worker
//! everything is strictly serial (the courier is never called concurrently);
//! across workers the conductor drives N foundations in parallel.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};

use super::action::{Action, ExecuteReport};
use crate::courier::Courier;

/// One phase of the deploy, dispatched by the conductor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseCommand {
    Initially,
    CleanVenerable,
    Execute,
    Undo { first_deploy: bool },
    Success,
}

/// A worker's answer to one phase command.
#[derive(Debug, Default)]
pub struct PhaseReport {
    /// The foundation this report is for.
    pub foundation: String,
    /// Everything the platform printed during the phase.
    pub output: Vec<u8>,
    /// The flattened error chain when the phase failed.
    pub error: Option<String>,
    /// Execute phase: the application already existed on this foundation.
    pub app_existed: bool,
    /// Execute phase: recent application logs for post-mortem inspection.
    pub logs: Option<Vec<u8>>,
    /// Venerable cleanup: a parked instance was found and removed.
    pub found_venerable: bool,
}

/// Handle to one foundation's worker thread.
///
/// Workers are ephemeral: spawned by the conductor when a deploy starts and
/// closed when it terminates. Dropping the handle closes the command channel,
/// which lets the thread clean up its courier and exit; the drop then joins
/// the thread.
pub struct Worker {
    foundation: String,
    commands: Option<SyncSender<PhaseCommand>>,
    reports: Receiver<PhaseReport>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns the worker thread for one foundation.
    pub fn spawn(
        index: usize,
        foundation: String,
        courier: Box<dyn Courier>,
        action: Arc<dyn Action>,
    ) -> Result<Self> {
        let (command_tx, command_rx) = sync_channel(1);
        let (report_tx, report_rx) = sync_channel(1);
        let thread_foundation = foundation.clone();
        let handle = thread::Builder::new()
            .name(format!("worker-{}", index))
            .spawn(move || run(thread_foundation, courier, action, command_rx, report_tx))
            .with_context(|| format!("failed to spawn worker for {}", foundation))?;
        Ok(Self {
            foundation,
            commands: Some(command_tx),
            reports: report_rx,
            handle: Some(handle),
        })
    }

    pub fn foundation(&self) -> &str {
        &self.foundation
    }

    /// Hands the worker its next phase. Fails when the thread is gone.
    pub fn dispatch(&self, command: PhaseCommand) -> Result<()> {
        self.commands
            .as_ref()
            .context("worker already closed")?
            .send(command)
            .with_context(|| format!("worker for {} is gone", self.foundation))
    }

    /// Blocks until the worker answers the dispatched phase.
    pub fn collect(&self) -> Result<PhaseReport> {
        self.reports
            .recv()
            .with_context(|| format!("worker for {} died mid-phase", self.foundation))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Closing the command channel ends the thread's loop; the thread
        // cleans up its courier on the way out.
        drop(self.commands.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("worker for {} panicked", self.foundation);
            }
        }
    }
}

fn run(
    foundation: String,
    courier: Box<dyn Courier>,
    action: Arc<dyn Action>,
    commands: Receiver<PhaseCommand>,
    reports: SyncSender<PhaseReport>,
) {
    for command in commands.iter() {
        let mut out = Vec::new();
        let mut execute_report = ExecuteReport::default();
        let mut found_venerable = false;

        let result = match command {
            PhaseCommand::Initially => action.initially(courier.as_ref(), &foundation, &mut out),
            PhaseCommand::CleanVenerable => action
                .clean_venerable(courier.as_ref(), &foundation, &mut out)
                .map(|found| found_venerable = found),
            PhaseCommand::Execute => action.execute(
                courier.as_ref(),
                &foundation,
                &mut out,
                &mut execute_report,
            ),
            PhaseCommand::Undo { first_deploy } => {
                action.undo(courier.as_ref(), &foundation, first_deploy, &mut out)
            }
            PhaseCommand::Success => action.success(courier.as_ref(), &foundation, &mut out),
        };

        let report = PhaseReport {
            foundation: foundation.clone(),
            output: out,
            error: result.err().map(|e| format!("{:#}", e)),
            app_existed: execute_report.app_existed,
            logs: execute_report.logs,
            found_venerable,
        };
        if reports.send(report).is_err() {
            // Conductor is gone; stop working.
            break;
        }
    }

    if let Err(err) = courier.clean_up() {
        tracing::warn!("courier cleanup failed for {}: {:#}", foundation, err);
    }
}
