//! The phase machine driving a blue-green deploy across foundations.
//!
//! The conductor owns the fan-out: it spawns one worker per foundation,
//! dispatches each phase to every worker, and collects every answer before
//! issuing the next phase. That barrier is strict, so phase order is global.
//! Between phases the per-foundation output buffers are flushed to the
//! response sink in configuration order, never completion order.
//!
//! The commit-or-rollback decision lives here. After the execute barrier the
//! conductor knows which foundations failed and whether any foundation knew
//! the application beforehand (the first-deploy flag); together with the
//! environment's rollback policy that decides between the success phase, the
//! undo phase, or aborting with the aggregate error.

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, error, info};

use super::action::Action;
use super::worker::{PhaseCommand, PhaseReport, Worker};
use crate::config::Environment;
use crate::courier::CourierFactory;
use crate::deployment::DeploymentInfo;
use crate::error::{CutoverError, FoundationFailure};

/// Calls `Action::clean_up` exactly once, on every exit path.
struct CleanUpGuard(Arc<dyn Action>);

impl Drop for CleanUpGuard {
    fn drop(&mut self) {
        self.0.clean_up();
    }
}

pub struct Conductor {
    couriers: Arc<dyn CourierFactory>,
}

impl Conductor {
    pub fn new(couriers: Arc<dyn CourierFactory>) -> Self {
        Self { couriers }
    }

    /// Runs one action across every foundation of the environment.
    ///
    /// Writes per-foundation platform output to `sink` phase by phase, and
    /// returns the aggregate error when the deploy did not commit.
    pub fn run(
        &self,
        mut action: Box<dyn Action>,
        environment: &Environment,
        info: &DeploymentInfo,
        sink: &mut dyn Write,
    ) -> Result<(), CutoverError> {
        action.set_up(environment)?;

        let action: Arc<dyn Action> = Arc::from(action);
        let _clean_up = CleanUpGuard(action.clone());

        action.on_start()?;

        let mut workers = Vec::with_capacity(environment.foundations.len());
        for (index, foundation) in environment.foundations.iter().enumerate() {
            let courier = self
                .couriers
                .create()
                .map_err(CutoverError::CourierCreation)?;
            let worker = Worker::spawn(index, foundation.clone(), courier, action.clone())
                .map_err(|e| CutoverError::Worker(format!("{:#}", e)))?;
            workers.push(worker);
        }
        debug!("spawned {} worker(s)", workers.len());

        // Login phase: a single failure anywhere aborts the deploy before
        // any foundation is touched.
        let reports = run_phase(&workers, PhaseCommand::Initially)?;
        flush(sink, &reports)?;
        let failures = collect_failures(&reports);
        if !failures.is_empty() {
            for failure in &failures {
                error!("{}", failure);
            }
            return Err(action.initially_error(failures));
        }

        // Venerable cleanup: handles a predecessor that crashed
        // mid-rollback. Best-effort; failures never abort the deploy.
        let reports = run_phase(&workers, PhaseCommand::CleanVenerable)?;
        flush(sink, &reports)?;
        for failure in collect_failures(&reports) {
            error!("venerable cleanup failed: {}", failure);
        }
        if reports.iter().any(|r| r.found_venerable) {
            error!("cleaned up venerable instances of {}", info.app_name);
        }

        // Execute phase. The first-deploy flag is only read after the
        // barrier, so the workers' observations need no synchronization.
        let reports = run_phase(&workers, PhaseCommand::Execute)?;
        flush(sink, &reports)?;
        let first_deploy = !reports.iter().any(|r| r.app_existed);
        let response_logs = collect_logs(&reports, info);
        let execute_failures = collect_failures(&reports);

        let result = if execute_failures.is_empty() {
            let reports = run_phase(&workers, PhaseCommand::Success)?;
            flush(sink, &reports)?;
            let failures = collect_failures(&reports);
            if failures.is_empty() {
                info!("deployed {} to {} foundation(s)", info.app_name, workers.len());
                Ok(())
            } else {
                Err(action.success_error(failures))
            }
        } else {
            for failure in &execute_failures {
                error!("{}", failure);
            }
            let rollback_eligible = environment.enable_rollback
                && (!first_deploy || !environment.disable_first_deploy_rollback);

            if rollback_eligible {
                // Undo runs on every foundation, including those whose
                // execute succeeded: the environment either commits
                // everywhere or nowhere.
                let reports = run_phase(&workers, PhaseCommand::Undo { first_deploy })?;
                flush(sink, &reports)?;
                Err(action.undo_error(execute_failures, collect_failures(&reports)))
            } else if environment.enable_rollback {
                Err(CutoverError::FirstDeployNoRollback {
                    failures: execute_failures,
                })
            } else {
                Err(action.execute_error(execute_failures))
            }
        };

        // Captured platform logs go after all phase output so they are
        // never interleaved with it.
        if !response_logs.is_empty() {
            sink.write_all(&response_logs)
                .map_err(|e| CutoverError::io("failed to write platform logs", e))?;
        }

        result
    }
}

/// Dispatches one command to every worker, then collects every answer.
///
/// Collection happens in worker (configuration) order, which is what makes
/// the flushed output deterministic.
fn run_phase(workers: &[Worker], command: PhaseCommand) -> Result<Vec<PhaseReport>, CutoverError> {
    for worker in workers {
        worker
            .dispatch(command)
            .map_err(|e| CutoverError::Worker(format!("{:#}", e)))?;
    }
    let mut reports = Vec::with_capacity(workers.len());
    for worker in workers {
        reports.push(
            worker
                .collect()
                .map_err(|e| CutoverError::Worker(format!("{:#}", e)))?,
        );
    }
    Ok(reports)
}

fn flush(sink: &mut dyn Write, reports: &[PhaseReport]) -> Result<(), CutoverError> {
    for report in reports {
        sink.write_all(&report.output).map_err(|e| {
            CutoverError::io(format!("failed to write output for {}", report.foundation), e)
        })?;
    }
    Ok(())
}

fn collect_failures(reports: &[PhaseReport]) -> Vec<FoundationFailure> {
    reports
        .iter()
        .filter_map(|report| {
            report
                .error
                .as_deref()
                .map(|reason| FoundationFailure::new(report.foundation.as_str(), reason))
        })
        .collect()
}

fn collect_logs(reports: &[PhaseReport], info: &DeploymentInfo) -> Vec<u8> {
    let mut combined = Vec::new();
    for report in reports {
        if let Some(logs) = &report.logs {
            combined.extend_from_slice(
                format!(
                    "\nPlatform logs for {} at {}\n{}\n",
                    info.app_name,
                    report.foundation,
                    "-".repeat(60)
                )
                .as_bytes(),
            );
            combined.extend_from_slice(logs);
            combined.push(b'\n');
        }
    }
    combined
}
