use anyhow::Result;
use project_taskflow::config::TaskflowConfig;
use project_taskflow::queue::{ChannelQueue, JobQueue, WorkerPool};
use project_taskflow::{
    FlowServices, LandingZone, MemoryStorage, MemoryTimeline, MemoryZoneRepository, Mode,
    ShutdownCoordinator, StoragePaths, SubmitOutcome, SubmitRequest, TaskflowApi,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::Command;

const DEMO_USER: &str = "demo_user";

pub struct DemoCommand {
    config: TaskflowConfig,
    mode: Mode,
    force_fail: bool,
    colls: Vec<String>,
}

impl DemoCommand {
    pub fn new(config: TaskflowConfig) -> Self {
        Self {
            config,
            mode: Mode::Sync,
            force_fail: false,
            colls: Vec::new(),
        }
    }

    pub fn with_async(mut self, run_async: bool) -> Self {
        self.mode = if run_async { Mode::Async } else { Mode::Sync };
        self
    }

    pub fn with_force_fail(mut self, force_fail: bool) -> Self {
        self.force_fail = force_fail;
        self
    }

    pub fn with_colls(mut self, colls: Vec<String>) -> Self {
        self.colls = colls;
        self
    }
}

impl Command for DemoCommand {
    async fn execute(&self) -> Result<()> {
        let storage = Arc::new(MemoryStorage::new());
        let zones = Arc::new(MemoryZoneRepository::new());
        let timeline = Arc::new(MemoryTimeline::new());
        let paths = StoragePaths::from_config(&self.config.storage);
        let services = FlowServices {
            storage: storage.clone(),
            zones: zones.clone(),
            paths: paths.clone(),
        };

        let (queue, receiver) = ChannelQueue::new();
        let queue: Arc<dyn JobQueue> = Arc::new(queue);
        let api = Arc::new(
            TaskflowApi::builder(services, timeline.clone())
                .config(&self.config)?
                .queue(queue.clone())
                .build()?,
        );
        let pool = WorkerPool::spawn(receiver, api.clone());

        let project = Uuid::new_v4();
        println!("🚀 Creating demo project {project}");
        api.submit(
            SubmitRequest::new(project, "project_create")
                .parameters(as_params(json!({"title": "Demo project", "owner": DEMO_USER}))),
        )
        .await?;

        let zone = LandingZone::new(project, DEMO_USER, "study_demo/assay_demo", "demo_zone");
        zones.insert(zone.clone());
        let event = timeline.add_event(project, "zone_create", "Create landing zone");

        println!(
            "📦 Submitting zone_create ({}{})",
            self.mode,
            if self.force_fail { ", forced failure" } else { "" }
        );
        let request = SubmitRequest::new(project, "zone_create")
            .parameters(as_params(json!({
                "zone_uuid": zone.uuid.to_string(),
                "colls": self.colls,
            })))
            .mode(self.mode)
            .audit_ref(event)
            .force_fail(self.force_fail);

        let shutdown = ShutdownCoordinator::from_config(&self.config.queue);
        let outcome = tokio::select! {
            outcome = api.submit(request) => Some(outcome),
            signal = shutdown.wait_for_signal() => {
                signal?;
                None
            }
        };
        match outcome {
            Some(Ok(SubmitOutcome::Completed(result))) => {
                println!("✅ Flow completed: {} tasks in {}ms", result.tasks_executed, result.duration_ms);
            }
            Some(Ok(SubmitOutcome::Queued { job_id })) => println!("⏳ Queued as job {job_id}"),
            Some(Err(e)) => println!("❌ {}", TaskflowApi::get_error_msg("zone_create", &e.to_string())),
            None => println!("🛑 Interrupted, shutting down"),
        }

        shutdown
            .shutdown_all_services(Some(queue), Some(pool))
            .await?;

        if let Some(zone) = zones.zone(&zone.uuid) {
            println!();
            println!("🏷️  Zone status: {} ({})", zone.status, zone.status_info);
            let zone_path = paths.zone_path(&zone);
            let colls = storage.collections_under(&zone_path);
            if colls.is_empty() {
                println!("   📂 No collections in {zone_path}");
            } else {
                println!("   📂 Collections in {zone_path}:");
                for coll in colls {
                    println!("      {coll}");
                }
            }
        }
        for entry in timeline.terminal_statuses(event) {
            println!("📝 Audit: {} {}", entry.status, entry.message);
        }
        Ok(())
    }
}

fn as_params(value: serde_json::Value) -> project_taskflow::Parameters {
    value.as_object().cloned().unwrap_or_default()
}
