// Flow executor: validate, lock, build, run, compensate, release

use chrono::Utc;
use statig::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};

use super::errors::FlowError;
use super::flow::Flow;
use super::lifecycle::{LifecycleEvent, Phase, SubmissionLifecycle};
use super::task::{Task, TaskContext, TaskList};
use super::types::{FlowResult, Mode, RevertFailure, RunReport, TaskRecord, TaskStatus};
use crate::lock::{LockCoordinator, LockError};
use crate::observability::{flow_metrics, OperationTimer};

/// Outcome of running a task chain
#[derive(Debug)]
pub struct TaskRun {
    pub outcome: Result<(), FlowError>,
    pub report: RunReport,
}

/// Everything observed while driving one submission
#[derive(Debug)]
pub struct FlowRun {
    pub outcome: Result<FlowResult, FlowError>,
    pub report: RunReport,
    pub phases: Vec<Phase>,
    /// Lifecycle events the run sent out of order
    pub ignored_events: usize,
}

impl FlowRun {
    pub fn final_phase(&self) -> Option<Phase> {
        self.phases.last().copied()
    }
}

/// Drives flows through their lifecycle using the injected lock coordinator
#[derive(Clone)]
pub struct FlowExecutor {
    locks: Arc<dyn LockCoordinator>,
    lock_timeout: Duration,
}

impl FlowExecutor {
    pub fn new(locks: Arc<dyn LockCoordinator>, lock_timeout: Duration) -> Self {
        Self {
            locks,
            lock_timeout,
        }
    }

    pub fn locks(&self) -> &Arc<dyn LockCoordinator> {
        &self.locks
    }

    /// Run one flow to a terminal outcome. The project lock, if taken, is
    /// released on every path out of this function.
    pub async fn run_flow(
        &self,
        flow: &dyn Flow,
        mode: Mode,
        force_fail: bool,
        ctx: TaskContext,
    ) -> FlowRun {
        let started = Instant::now();
        let mut lifecycle = SubmissionLifecycle::new(&ctx.correlation_id).state_machine();

        if let Err(e) = flow.validate(mode) {
            warn!(flow = flow.name(), error = %e, "Flow validation failed");
            lifecycle.handle(&LifecycleEvent::Failed);
            return finish(Err(e), RunReport::default(), &lifecycle);
        }
        lifecycle.handle(&LifecycleEvent::Validated);

        let handle = if flow.spec().require_lock {
            let resource_id = flow.project_uuid().to_string();
            let timer = OperationTimer::new("lock_acquire");
            match self.locks.acquire(&resource_id, self.lock_timeout).await {
                Ok(handle) => {
                    debug!(
                        resource = %resource_id,
                        waited_ms = timer.finish().as_millis() as u64,
                        "Project lock acquired"
                    );
                    lifecycle.handle(&LifecycleEvent::LockAcquired);
                    Some(handle)
                }
                Err(e) => {
                    if matches!(e, LockError::Timeout { .. }) {
                        flow_metrics().record_lock_timeout();
                    }
                    error!(resource = %resource_id, error = %e, "Unable to acquire project lock");
                    lifecycle.handle(&LifecycleEvent::Failed);
                    return finish(Err(FlowError::Lock(e)), RunReport::default(), &lifecycle);
                }
            }
        } else {
            info!(flow = flow.name(), "Lock not required (require_lock=false)");
            None
        };

        let (outcome, report) = self
            .build_and_run(flow, mode, force_fail, ctx, &mut lifecycle, started)
            .await;

        if let Some(handle) = handle {
            match self.locks.release(&handle).await {
                Ok(true) => debug!(resource = %handle.resource_id, "Project lock released"),
                Ok(false) => warn!(resource = %handle.resource_id, "Project lock was already released"),
                Err(e) => error!(resource = %handle.resource_id, error = %e, "Failed to release project lock"),
            }
        }
        // A build failure with nothing held is already terminal in FAILED
        if !lifecycle.inner().is_terminal() {
            lifecycle.handle(&LifecycleEvent::Released);
        }

        finish(outcome, report, &lifecycle)
    }

    async fn build_and_run(
        &self,
        flow: &dyn Flow,
        mode: Mode,
        force_fail: bool,
        ctx: TaskContext,
        lifecycle: &mut StateMachine<SubmissionLifecycle>,
        started: Instant,
    ) -> (Result<FlowResult, FlowError>, RunReport) {
        info!(flow = flow.name(), "Building flow..");
        let tasks = match flow.build(force_fail).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(flow = flow.name(), error = %e, "Flow build failed");
                lifecycle.handle(&LifecycleEvent::Failed);
                return (Err(e), RunReport::default());
            }
        };
        lifecycle.handle(&LifecycleEvent::Built);
        info!(flow = flow.name(), task_count = tasks.len(), "Building flow OK");

        lifecycle.handle(&LifecycleEvent::Started);
        let run = run_tasks(tasks, ctx).await;

        match run.outcome {
            Ok(()) => {
                lifecycle.handle(&LifecycleEvent::Completed);
                let result = FlowResult {
                    flow_name: flow.name().to_string(),
                    project_uuid: flow.project_uuid(),
                    mode,
                    tasks_executed: run.report.executed_count(),
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                (Ok(result), run.report)
            }
            Err(e) => {
                lifecycle.handle(&LifecycleEvent::Failed);
                (Err(e), run.report)
            }
        }
    }
}

fn finish(
    outcome: Result<FlowResult, FlowError>,
    report: RunReport,
    lifecycle: &StateMachine<SubmissionLifecycle>,
) -> FlowRun {
    FlowRun {
        outcome,
        report,
        phases: lifecycle.inner().history().to_vec(),
        ignored_events: lifecycle.inner().ignored_events(),
    }
}

/// Execute tasks strictly in order and compensate on the first failure.
///
/// A chain that aborts without producing a result (a panicking task) is
/// reported as `FlowError::Unknown`.
pub async fn run_tasks(tasks: TaskList, ctx: TaskContext) -> TaskRun {
    let flow_name = ctx.flow_name.clone();
    match tokio::spawn(run_chain(tasks.into_inner(), ctx).in_current_span()).await {
        Ok(run) => run,
        Err(join_error) => {
            error!(flow = %flow_name, error = %join_error, "Task chain aborted without a result");
            TaskRun {
                outcome: Err(FlowError::Unknown),
                report: RunReport::default(),
            }
        }
    }
}

async fn run_chain(mut tasks: Vec<Box<dyn Task>>, mut ctx: TaskContext) -> TaskRun {
    let mut report = RunReport {
        records: tasks.iter().map(|t| TaskRecord::new(t.name())).collect(),
        ..Default::default()
    };
    let mut executed: Vec<usize> = Vec::with_capacity(tasks.len());
    let mut failure: Option<(String, String)> = None;

    for (idx, task) in tasks.iter_mut().enumerate() {
        let record = &mut report.records[idx];
        debug!(task = %record.name, "Executing task");
        record.started_at = Some(Utc::now());
        let result = task.execute(&ctx).await;
        record.finished_at = Some(Utc::now());

        match result {
            Ok(()) => {
                record.status = TaskStatus::Executed;
                executed.push(idx);
            }
            Err(e) => {
                record.status = TaskStatus::Failed;
                failure = Some((record.name.clone(), format!("{e:#}")));
                break;
            }
        }
    }

    let Some((task, message)) = failure else {
        return TaskRun {
            outcome: Ok(()),
            report,
        };
    };

    error!(task = %task, error = %message, "Task execution failed, reverting executed tasks");
    ctx.set_failure(message.clone());
    compensate(&mut tasks, &executed, &mut report, &ctx).await;

    TaskRun {
        outcome: Err(FlowError::TaskExecution { task, message }),
        report,
    }
}

/// Revert executed tasks in reverse order, best-effort
async fn compensate(
    tasks: &mut [Box<dyn Task>],
    executed: &[usize],
    report: &mut RunReport,
    ctx: &TaskContext,
) {
    flow_metrics().record_rollback();
    for &idx in executed.iter().rev() {
        let task = &mut tasks[idx];
        let name = task.name().to_string();
        report.revert_order.push(name.clone());

        match task.revert(ctx).await {
            Ok(()) => {
                debug!(task = %name, "Task reverted");
                report.records[idx].status = TaskStatus::Reverted;
            }
            Err(e) => {
                let message = format!("{e:#}");
                error!(task = %name, error = %message, "Revert failed, continuing compensation");
                flow_metrics().record_revert_failure();
                report.records[idx].status = TaskStatus::RevertFailed;
                report.revert_failures.push(RevertFailure {
                    task: name,
                    message,
                });
            }
        }
    }
}
