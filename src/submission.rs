// Submission API: single entry point for running flows inline or in the background

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::TaskflowConfig;
use crate::domain::timeline::{Timeline, TimelineStatus};
use crate::engine::{
    truncate_message, DomainStatus, FlowError, FlowExecutor, FlowInit, FlowRegistry, FlowResult,
    FlowServices, Mode, Parameters, SubmitOutcome, TaskContext, TerminalReporter,
    DEFAULT_MESSAGE_LIMIT,
};
use crate::flows::default_registry;
use crate::lock::{coordinator_from_config, LockCoordinator, MemoryLockCoordinator};
use crate::observability::{flow_metrics, OperationTimer};
use crate::queue::{FlowJob, JobQueue};
use crate::telemetry::{create_submission_span, generate_correlation_id};

/// One request to run a flow against a project
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub project_uuid: Uuid,
    pub flow_name: String,
    pub parameters: Parameters,
    pub mode: Mode,
    /// Pre-created audit entry that receives the terminal status
    pub audit_ref: Option<Uuid>,
    /// Make the last task of the chain fail
    pub force_fail: bool,
}

impl SubmitRequest {
    pub fn new(project_uuid: Uuid, flow_name: &str) -> Self {
        Self {
            project_uuid,
            flow_name: flow_name.to_string(),
            parameters: Parameters::new(),
            mode: Mode::Sync,
            audit_ref: None,
            force_fail: false,
        }
    }

    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn audit_ref(mut self, audit_ref: Uuid) -> Self {
        self.audit_ref = Some(audit_ref);
        self
    }

    pub fn force_fail(mut self, force_fail: bool) -> Self {
        self.force_fail = force_fail;
        self
    }

    fn into_job(self) -> FlowJob {
        FlowJob {
            audit_ref: self.audit_ref,
            force_fail: self.force_fail,
            ..FlowJob::new(self.project_uuid, &self.flow_name, self.parameters)
        }
    }

    fn from_job(job: FlowJob) -> Self {
        Self {
            project_uuid: job.project_uuid,
            flow_name: job.flow_name,
            parameters: job.parameters,
            mode: Mode::Async,
            audit_ref: job.audit_ref,
            force_fail: job.force_fail,
        }
    }
}

pub struct TaskflowApiBuilder {
    services: FlowServices,
    timeline: Arc<dyn Timeline>,
    registry: Option<FlowRegistry>,
    locks: Option<Arc<dyn LockCoordinator>>,
    lock_timeout: Duration,
    queue: Option<Arc<dyn JobQueue>>,
    message_limit: usize,
    test_mode: bool,
    permanent_users: Vec<String>,
}

impl TaskflowApiBuilder {
    fn new(services: FlowServices, timeline: Arc<dyn Timeline>) -> Self {
        let defaults = TaskflowConfig::default();
        Self {
            services,
            timeline,
            registry: None,
            locks: None,
            lock_timeout: defaults.lock.acquire_timeout(),
            queue: None,
            message_limit: defaults.engine.message_limit,
            test_mode: defaults.engine.test_mode,
            permanent_users: defaults.storage.permanent_users,
        }
    }

    /// Take engine, lock and storage settings from configuration
    pub fn config(mut self, config: &TaskflowConfig) -> Result<Self, FlowError> {
        self.lock_timeout = config.lock.acquire_timeout();
        self.message_limit = config.engine.message_limit;
        self.test_mode = config.engine.test_mode;
        self.permanent_users = config.storage.permanent_users.clone();
        self.locks = Some(coordinator_from_config(&config.lock)?);
        Ok(self)
    }

    pub fn registry(mut self, registry: FlowRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn locks(mut self, locks: Arc<dyn LockCoordinator>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn message_limit(mut self, limit: usize) -> Self {
        self.message_limit = limit;
        self
    }

    pub fn test_mode(mut self, enabled: bool) -> Self {
        self.test_mode = enabled;
        self
    }

    pub fn build(self) -> Result<TaskflowApi, FlowError> {
        let registry = match self.registry {
            Some(registry) => registry,
            None => default_registry()?,
        };
        let locks = self
            .locks
            .unwrap_or_else(|| Arc::new(MemoryLockCoordinator::new()));
        Ok(TaskflowApi {
            registry,
            executor: FlowExecutor::new(locks, self.lock_timeout),
            services: self.services,
            timeline: self.timeline,
            queue: self.queue,
            message_limit: self.message_limit,
            test_mode: self.test_mode,
            permanent_users: self.permanent_users,
        })
    }
}

/// Resolves flows and runs them synchronously or through the job queue.
///
/// Every submission writes exactly one terminal status to its audit entry
/// and, if the flow addresses one, to its domain object.
pub struct TaskflowApi {
    registry: FlowRegistry,
    executor: FlowExecutor,
    services: FlowServices,
    timeline: Arc<dyn Timeline>,
    queue: Option<Arc<dyn JobQueue>>,
    message_limit: usize,
    test_mode: bool,
    permanent_users: Vec<String>,
}

impl TaskflowApi {
    pub fn builder(services: FlowServices, timeline: Arc<dyn Timeline>) -> TaskflowApiBuilder {
        TaskflowApiBuilder::new(services, timeline)
    }

    pub fn registry(&self) -> &FlowRegistry {
        &self.registry
    }

    pub fn services(&self) -> &FlowServices {
        &self.services
    }

    pub fn locks(&self) -> &Arc<dyn LockCoordinator> {
        self.executor.locks()
    }

    pub fn queue(&self) -> Option<&Arc<dyn JobQueue>> {
        self.queue.as_ref()
    }

    /// Printable failure message for a flow
    pub fn get_error_msg(flow_name: &str, info: &str) -> String {
        format!(
            "Taskflow \"{flow_name}\" failed! Reason: \"{}\"",
            truncate_message(info, DEFAULT_MESSAGE_LIMIT)
        )
    }

    fn reporter(
        &self,
        audit_ref: Option<Uuid>,
        domain: Option<Arc<DomainStatus>>,
        mode: Mode,
    ) -> TerminalReporter {
        TerminalReporter::new(
            self.timeline.clone(),
            audit_ref,
            domain,
            mode,
            self.message_limit,
        )
    }

    async fn reject(&self, request: &SubmitRequest, err: FlowError) -> FlowError {
        warn!(flow = %request.flow_name, project = %request.project_uuid, error = %err, "Submission rejected");
        self.reporter(request.audit_ref, None, request.mode)
            .report_failure(&err)
            .await;
        flow_metrics().record_failure();
        err
    }

    /// Submit a flow. Sync requests run to completion; async requests are
    /// queued and return before validation, locking or building.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome, FlowError> {
        flow_metrics().record_submission();
        if let Err(e) = self.registry.resolve(&request.flow_name) {
            return Err(self.reject(&request, e).await);
        }
        match request.mode {
            Mode::Sync => self
                .run_submission(request)
                .await
                .map(SubmitOutcome::Completed),
            Mode::Async => self
                .enqueue(request)
                .await
                .map(|job_id| SubmitOutcome::Queued { job_id }),
        }
    }

    async fn enqueue(&self, request: SubmitRequest) -> Result<Uuid, FlowError> {
        let Some(queue) = self.queue.clone() else {
            let err = FlowError::ImproperlyConfigured {
                reason: "no job queue configured for async submissions".to_string(),
            };
            return Err(self.reject(&request, err).await);
        };

        // The marker must land before a worker can write the terminal status
        if let Some(event) = request.audit_ref {
            if let Err(e) = self
                .timeline
                .set_status(event, TimelineStatus::Submit, "Async job queued")
                .await
            {
                warn!(event = %event, error = %e, "Failed to mark timeline event as submitted");
            }
        }

        let job = request.clone().into_job();
        if let Err(e) = queue.enqueue(&job) {
            return Err(self.reject(&request, e.into()).await);
        }
        flow_metrics().record_enqueued();
        info!(job_id = %job.job_id, flow = %job.flow_name, project = %job.project_uuid, "Async submit queued");
        Ok(job.job_id)
    }

    /// Run a dequeued job through the ordinary submission pipeline
    pub async fn run_job(&self, job: FlowJob) -> Result<FlowResult, FlowError> {
        let job_id = job.job_id;
        info!(job_id = %job_id, flow = %job.flow_name, "Running queued job");
        self.run_submission(SubmitRequest::from_job(job)).await
    }

    async fn run_submission(&self, request: SubmitRequest) -> Result<FlowResult, FlowError> {
        let correlation_id = generate_correlation_id();
        let span = create_submission_span(
            &request.flow_name,
            &request.project_uuid,
            request.mode.as_str(),
            &correlation_id,
        );
        self.run_resolved(request, correlation_id)
            .instrument(span)
            .await
    }

    async fn run_resolved(
        &self,
        request: SubmitRequest,
        correlation_id: String,
    ) -> Result<FlowResult, FlowError> {
        let constructor = match self.registry.resolve(&request.flow_name) {
            Ok(constructor) => constructor,
            Err(e) => return Err(self.reject(&request, e).await),
        };

        let flow = constructor(FlowInit {
            project_uuid: request.project_uuid,
            flow_name: request.flow_name.clone(),
            parameters: request.parameters,
            mode: request.mode,
            services: self.services.clone(),
        });
        let domain = flow
            .domain_target()
            .await
            .map(|target| Arc::new(DomainStatus::new(target, self.message_limit)));

        let reporter = self.reporter(request.audit_ref, domain.clone(), request.mode);
        let ctx = TaskContext::new(&request.flow_name, request.project_uuid, &correlation_id)
            .with_domain(domain);

        info!("Submitting flow");
        let timer = OperationTimer::new("flow_submission");
        let run = self
            .executor
            .run_flow(&*flow, request.mode, request.force_fail, ctx)
            .await;
        timer.finish();

        if run.report.rolled_back() {
            info!(
                revert_order = ?run.report.revert_order,
                revert_failures = run.report.revert_failures.len(),
                "Flow rolled back"
            );
        }
        reporter.report(&run.outcome).await;

        match &run.outcome {
            Ok(result) => {
                flow_metrics().record_success();
                info!(tasks = result.tasks_executed, duration_ms = result.duration_ms, "Flow completed");
            }
            Err(e) => {
                flow_metrics().record_failure();
                error!(error = %e, "{}", Self::get_error_msg(&request.flow_name, &e.to_string()));
            }
        }
        run.outcome
    }

    /// Withdraw a queued job before a worker picks it up.
    ///
    /// Returns false if the job is unknown or already running.
    pub async fn cancel(&self, job_id: Uuid) -> Result<bool, FlowError> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| FlowError::ImproperlyConfigured {
                reason: "no job queue configured".to_string(),
            })?;
        let Some(job) = queue.cancel(&job_id) else {
            return Ok(false);
        };
        info!(job_id = %job_id, flow = %job.flow_name, "Queued job cancelled");
        self.reporter(job.audit_ref, None, Mode::Async)
            .report_failure(&FlowError::Cancelled { job_id })
            .await;
        Ok(true)
    }

    /// Remove all project data and non-permanent users. Test mode only.
    pub async fn cleanup(&self) -> Result<(), FlowError> {
        if !self.test_mode {
            return Err(FlowError::ImproperlyConfigured {
                reason: "cleanup() is only allowed in test mode".to_string(),
            });
        }
        let storage = &self.services.storage;
        let root = self.services.paths.projects_root();
        if storage
            .collection_exists(&root)
            .await
            .map_err(FlowError::Storage)?
        {
            storage
                .remove_collection(&root)
                .await
                .map_err(FlowError::Storage)?;
        }

        let users = storage.list_users().await.map_err(FlowError::Storage)?;
        let mut removed = 0usize;
        for user in users.iter().filter(|u| !self.permanent_users.contains(u)) {
            storage.remove_user(user).await.map_err(FlowError::Storage)?;
            removed += 1;
        }
        info!(projects_root = %root, removed_users = removed, "Storage cleanup done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::timeline::{MemoryTimeline, MockTimeline};
    use crate::engine::mocks::test_services;
    use crate::queue::MockJobQueue;
    use crate::storage::UserKind;

    #[test]
    fn error_message_is_bounded() {
        let msg = TaskflowApi::get_error_msg("zone_create", &"x".repeat(400));
        assert!(msg.starts_with("Taskflow \"zone_create\" failed! Reason: \""));
        assert_eq!(msg.matches('x').count(), 256);
    }

    #[tokio::test]
    async fn unknown_flow_is_reported_once() {
        let timeline = Arc::new(MemoryTimeline::new());
        let api = TaskflowApi::builder(test_services(), timeline.clone())
            .build()
            .unwrap();
        let project = Uuid::new_v4();
        let event = timeline.add_event(project, "nope", "Unknown flow");

        let err = api
            .submit(SubmitRequest::new(project, "nope").audit_ref(event))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::UnknownFlow { .. }));

        let terminal = timeline.terminal_statuses(event);
        assert_eq!(terminal.len(), 1);
        assert_eq!(terminal[0].message, "Flow \"nope\" not supported");
    }

    #[tokio::test]
    async fn async_without_queue_is_misconfigured() {
        let api = TaskflowApi::builder(test_services(), Arc::new(MemoryTimeline::new()))
            .build()
            .unwrap();
        let err = api
            .submit(SubmitRequest::new(Uuid::new_v4(), "zone_create").mode(Mode::Async))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::ImproperlyConfigured { .. }));
    }

    #[tokio::test]
    async fn async_submit_only_enqueues() {
        let mut queue = MockJobQueue::new();
        queue
            .expect_enqueue()
            .withf(|job| job.flow_name == "zone_create" && job.force_fail)
            .times(1)
            .returning(|_| Ok(()));

        // Audit entry only sees the SUBMIT marker, never a terminal status
        let mut timeline = MockTimeline::new();
        timeline
            .expect_set_status()
            .withf(|_, status, _| *status == TimelineStatus::Submit)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let api = TaskflowApi::builder(test_services(), Arc::new(timeline))
            .queue(Arc::new(queue))
            .build()
            .unwrap();
        let outcome = api
            .submit(
                SubmitRequest::new(Uuid::new_v4(), "zone_create")
                    .mode(Mode::Async)
                    .audit_ref(Uuid::new_v4())
                    .force_fail(true),
            )
            .await
            .unwrap();
        assert!(outcome.job_id().is_some());
        assert!(outcome.result().is_none());
    }

    /// Timeline whose SUBMIT writes are slow
    struct SlowSubmitTimeline {
        inner: MemoryTimeline,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl Timeline for SlowSubmitTimeline {
        async fn set_status(
            &self,
            event: Uuid,
            status: TimelineStatus,
            message: &str,
        ) -> anyhow::Result<()> {
            if status == TimelineStatus::Submit {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.set_status(event, status, message).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_submit_marker_never_follows_terminal_status() {
        let timeline = Arc::new(SlowSubmitTimeline {
            inner: MemoryTimeline::new(),
            delay: Duration::from_millis(100),
        });
        let project = Uuid::new_v4();
        let event = timeline.inner.add_event(project, "zone_create", "Create zone");

        let (queue, receiver) = crate::queue::ChannelQueue::new();
        let api = Arc::new(
            TaskflowApi::builder(test_services(), timeline.clone())
                .queue(Arc::new(queue))
                .build()
                .unwrap(),
        );
        let pool = crate::queue::WorkerPool::spawn(receiver, api.clone());

        // Missing parameters: the worker fails the job right away
        api.submit(
            SubmitRequest::new(project, "zone_create")
                .mode(Mode::Async)
                .audit_ref(event),
        )
        .await
        .unwrap();
        pool.shutdown(Duration::from_secs(5)).await.unwrap();

        let statuses: Vec<TimelineStatus> = timeline
            .inner
            .statuses(event)
            .into_iter()
            .map(|s| s.status)
            .collect();
        assert_eq!(
            statuses,
            vec![TimelineStatus::Init, TimelineStatus::Submit, TimelineStatus::Failed]
        );
    }

    #[tokio::test]
    async fn enqueue_failure_closes_audit_entry() {
        let mut queue = MockJobQueue::new();
        queue
            .expect_enqueue()
            .times(1)
            .returning(|_| Err(crate::queue::QueueError::Closed));

        let timeline = Arc::new(MemoryTimeline::new());
        let project = Uuid::new_v4();
        let event = timeline.add_event(project, "zone_create", "Create zone");
        let api = TaskflowApi::builder(test_services(), timeline.clone())
            .queue(Arc::new(queue))
            .build()
            .unwrap();

        let err = api
            .submit(
                SubmitRequest::new(project, "zone_create")
                    .mode(Mode::Async)
                    .audit_ref(event),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Queue(_)));

        let last = timeline.statuses(event).last().map(|s| s.status);
        assert_eq!(last, Some(TimelineStatus::Failed));
    }

    #[tokio::test]
    async fn cleanup_requires_test_mode() {
        let api = TaskflowApi::builder(test_services(), Arc::new(MemoryTimeline::new()))
            .build()
            .unwrap();
        assert!(matches!(
            api.cleanup().await,
            Err(FlowError::ImproperlyConfigured { .. })
        ));
    }

    #[tokio::test]
    async fn cleanup_keeps_permanent_users() {
        let services = test_services();
        let storage = services.storage.clone();
        let root = services.paths.projects_root();
        storage.create_collection(&format!("{root}/ab/abc")).await.unwrap();
        storage.create_user("rods", UserKind::User).await.unwrap();
        storage.create_user("alice", UserKind::User).await.unwrap();

        let api = TaskflowApi::builder(services, Arc::new(MemoryTimeline::new()))
            .test_mode(true)
            .build()
            .unwrap();
        api.cleanup().await.unwrap();

        assert!(!storage.collection_exists(&root).await.unwrap());
        assert_eq!(storage.list_users().await.unwrap(), vec!["rods"]);
    }
}
