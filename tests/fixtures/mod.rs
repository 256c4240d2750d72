#![allow(dead_code)]
/// Shared harness: an in-memory engine with a project to run flows against
use project_taskflow::{
    ChannelQueue, FlowRegistry, FlowServices, JobQueue, JobReceiver, LandingZone, LockCoordinator,
    MemoryStorage, MemoryTimeline, MemoryZoneRepository, Parameters, StoragePaths, SubmitRequest,
    TaskflowApi, TaskflowConfig, WorkerPool,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const ZONE_USER: &str = "alice";

pub struct Harness {
    pub api: Arc<TaskflowApi>,
    pub storage: Arc<MemoryStorage>,
    pub zones: Arc<MemoryZoneRepository>,
    pub timeline: Arc<MemoryTimeline>,
    pub paths: StoragePaths,
    pub queue: Arc<dyn JobQueue>,
    pub project: Uuid,
    receiver: Option<JobReceiver>,
    pool: Option<WorkerPool>,
}

pub struct HarnessBuilder {
    storage: MemoryStorage,
    registry: Option<FlowRegistry>,
    locks: Option<Arc<dyn LockCoordinator>>,
    lock_timeout: Duration,
}

impl HarnessBuilder {
    pub fn storage(mut self, storage: MemoryStorage) -> Self {
        self.storage = storage;
        self
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

    pub fn build(self) -> Harness {
        let storage = Arc::new(self.storage);
        let zones = Arc::new(MemoryZoneRepository::new());
        let timeline = Arc::new(MemoryTimeline::new());
        let paths = StoragePaths::from_config(&TaskflowConfig::default().storage);
        let services = FlowServices {
            storage: storage.clone(),
            zones: zones.clone(),
            paths: paths.clone(),
        };

        let (queue, receiver) = ChannelQueue::new();
        let queue: Arc<dyn JobQueue> = Arc::new(queue);

        let mut builder = TaskflowApi::builder(services, timeline.clone())
            .queue(queue.clone())
            .lock_timeout(self.lock_timeout)
            .test_mode(true);
        if let Some(registry) = self.registry {
            builder = builder.registry(registry);
        }
        if let Some(locks) = self.locks {
            builder = builder.locks(locks);
        }

        Harness {
            api: Arc::new(builder.build().expect("api builds")),
            storage,
            zones,
            timeline,
            paths,
            queue,
            project: Uuid::new_v4(),
            receiver: Some(receiver),
            pool: None,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            storage: MemoryStorage::new(),
            registry: None,
            locks: None,
            lock_timeout: Duration::from_secs(5),
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Harness whose project collection and user group already exist
    pub async fn with_project() -> Self {
        let harness = Self::new();
        harness.create_project().await;
        harness
    }

    pub async fn create_project(&self) {
        self.api
            .submit(
                SubmitRequest::new(self.project, "project_create")
                    .parameters(params(json!({"title": "Test project"}))),
            )
            .await
            .expect("project_create succeeds");
    }

    pub fn add_zone(&self, title: &str) -> LandingZone {
        let mut zone = LandingZone::new(self.project, ZONE_USER, "study_1/assay_1", title);
        zone.description = Some("integration test zone".to_string());
        self.zones.insert(zone.clone());
        zone
    }

    /// Current state of a zone in the repository
    pub fn zone(&self, zone: &LandingZone) -> LandingZone {
        self.zones.zone(&zone.uuid).expect("zone exists")
    }

    pub fn audit_event(&self, name: &str) -> Uuid {
        self.timeline.add_event(self.project, name, "integration test")
    }

    /// Collections below the zone, relative to the zone path
    pub fn zone_collections(&self, zone: &LandingZone) -> Vec<String> {
        let root = self.paths.zone_path(zone);
        let prefix = format!("{root}/");
        let mut colls: Vec<String> = self
            .storage
            .collections_under(&root)
            .into_iter()
            .map(|c| c.trim_start_matches(prefix.as_str()).to_string())
            .collect();
        colls.sort();
        colls
    }

    pub fn start_workers(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            self.pool = Some(WorkerPool::spawn(receiver, self.api.clone()));
        }
    }

    /// Run every queued job to completion and stop the workers
    pub async fn drain(&mut self) -> usize {
        self.start_workers();
        self.queue.close();
        match self.pool.take() {
            Some(pool) => pool
                .shutdown(Duration::from_secs(10))
                .await
                .expect("workers finish"),
            None => 0,
        }
    }
}

pub fn params(value: Value) -> Parameters {
    value.as_object().cloned().unwrap_or_default()
}

pub fn zone_params(zone: &LandingZone, colls: &[&str]) -> Parameters {
    params(json!({"zone_uuid": zone.uuid.to_string(), "colls": colls}))
}
