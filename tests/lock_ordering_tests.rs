/// Project lock behavior across concurrent submissions
mod fixtures;

use anyhow::{bail, Result};
use async_trait::async_trait;
use fixtures::{params, Harness};
use futures::future::join_all;
use project_taskflow::{
    FileLockCoordinator, Flow, FlowError, FlowInit, FlowRegistry, FlowSpec, LockCoordinator,
    LockError, LockHandle, MemoryLockCoordinator, Parameters, SubmitRequest, Task, TaskContext,
    TaskList, TimelineStatus,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

type Windows = Arc<Mutex<Vec<(Instant, Instant)>>>;

/// Records when it ran
struct WindowTask {
    hold: Duration,
    windows: Windows,
}

#[async_trait]
impl Task for WindowTask {
    fn name(&self) -> &str {
        "Record execution window"
    }

    async fn execute(&mut self, _ctx: &TaskContext) -> Result<()> {
        let start = Instant::now();
        tokio::time::sleep(self.hold).await;
        self.windows.lock().unwrap().push((start, Instant::now()));
        Ok(())
    }

    async fn revert(&mut self, _ctx: &TaskContext) -> Result<()> {
        Ok(())
    }
}

struct WindowFlow {
    init: FlowInit,
    spec: FlowSpec,
    broken: bool,
    windows: Windows,
}

#[async_trait]
impl Flow for WindowFlow {
    fn name(&self) -> &str {
        &self.init.flow_name
    }

    fn project_uuid(&self) -> Uuid {
        self.init.project_uuid
    }

    fn parameters(&self) -> &Parameters {
        &self.init.parameters
    }

    fn spec(&self) -> &FlowSpec {
        &self.spec
    }

    async fn build_tasks(&self, tasks: &mut TaskList) -> Result<()> {
        if self.broken {
            bail!("referenced object does not exist");
        }
        let hold_ms = self
            .init
            .parameters
            .get("hold_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(100);
        tasks.add(WindowTask {
            hold: Duration::from_millis(hold_ms),
            windows: self.windows.clone(),
        });
        Ok(())
    }
}

fn window_registry(windows: &Windows) -> FlowRegistry {
    let mut registry = FlowRegistry::new();
    for (name, lock, broken) in [
        ("locked_window", true, false),
        ("unlocked_window", false, false),
        ("broken_locked", true, true),
    ] {
        let windows = windows.clone();
        registry
            .register(name, move |init| {
                Box::new(WindowFlow {
                    init,
                    spec: FlowSpec::new().require(&["label"]).lock(lock),
                    broken,
                    windows: windows.clone(),
                })
            })
            .expect("unique flow name");
    }
    registry
}

fn request(project: Uuid, flow: &str) -> SubmitRequest {
    SubmitRequest::new(project, flow).parameters(params(json!({"label": "test"})))
}

fn sorted_windows(windows: &Windows) -> Vec<(Instant, Instant)> {
    let mut windows = windows.lock().unwrap().clone();
    windows.sort_by_key(|(start, _)| *start);
    windows
}

/// Memory coordinator that counts acquire and release calls
#[derive(Default)]
struct CountingLocks {
    inner: MemoryLockCoordinator,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

#[async_trait]
impl LockCoordinator for CountingLocks {
    async fn acquire(&self, resource_id: &str, timeout: Duration) -> Result<LockHandle, LockError> {
        let handle = self.inner.acquire(resource_id, timeout).await?;
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    async fn release(&self, handle: &LockHandle) -> Result<bool, LockError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release(handle).await
    }

    fn is_locked(&self, resource_id: &str) -> bool {
        self.inner.is_locked(resource_id)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn locked_flows_on_one_project_run_one_at_a_time() {
    let windows = Windows::default();
    let harness = Harness::builder().registry(window_registry(&windows)).build();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let api = harness.api.clone();
        let request = request(harness.project, "locked_window");
        handles.push(tokio::spawn(async move { api.submit(request).await }));
    }
    for result in join_all(handles).await {
        result.unwrap().expect("locked flow succeeds");
    }

    let windows = sorted_windows(&windows);
    assert_eq!(windows.len(), 3);
    for pair in windows.windows(2) {
        assert!(pair[1].0 >= pair[0].1, "execution windows overlap");
    }
    assert!(!harness.api.locks().is_locked(&harness.project.to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unlocked_flows_may_run_concurrently() {
    let windows = Windows::default();
    let harness = Harness::builder().registry(window_registry(&windows)).build();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let api = harness.api.clone();
        let request = SubmitRequest::new(harness.project, "unlocked_window")
            .parameters(params(json!({"label": "test", "hold_ms": 300})));
        handles.push(tokio::spawn(async move { api.submit(request).await }));
    }
    for result in join_all(handles).await {
        result.unwrap().expect("unlocked flow succeeds");
    }

    let windows = sorted_windows(&windows);
    assert_eq!(windows.len(), 2);
    assert!(windows[1].0 < windows[0].1, "unlocked flows were serialized");
}

#[tokio::test]
async fn lock_is_released_on_every_path() {
    let windows = Windows::default();
    let locks = Arc::new(CountingLocks::default());
    let harness = Harness::builder()
        .registry(window_registry(&windows))
        .locks(locks.clone())
        .build();
    let resource = harness.project.to_string();

    harness
        .api
        .submit(request(harness.project, "locked_window"))
        .await
        .expect("success path");
    harness
        .api
        .submit(request(harness.project, "locked_window").force_fail(true))
        .await
        .expect_err("task failure path");
    let err = harness
        .api
        .submit(request(harness.project, "broken_locked"))
        .await
        .expect_err("build failure path");
    assert!(matches!(err, FlowError::Build { .. }));

    assert_eq!(locks.acquired.load(Ordering::SeqCst), 3);
    assert_eq!(locks.released.load(Ordering::SeqCst), 3);
    assert!(!locks.is_locked(&resource));

    // Validation failures never touch the lock
    let err = harness
        .api
        .submit(SubmitRequest::new(harness.project, "locked_window"))
        .await
        .expect_err("validation failure path");
    assert!(err.is_validation());
    assert_eq!(locks.acquired.load(Ordering::SeqCst), 3);
    assert_eq!(locks.released.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn lock_timeout_fails_without_running_tasks() {
    let windows = Windows::default();
    let harness = Harness::builder()
        .registry(window_registry(&windows))
        .lock_timeout(Duration::from_millis(50))
        .build();
    let event = harness.audit_event("locked_window");
    let resource = harness.project.to_string();

    let held = harness
        .api
        .locks()
        .acquire(&resource, Duration::from_secs(1))
        .await
        .expect("lock is free");

    let err = harness
        .api
        .submit(request(harness.project, "locked_window").audit_ref(event))
        .await
        .expect_err("lock is held elsewhere");
    assert!(matches!(err, FlowError::Lock(LockError::Timeout { .. })));
    assert!(err.to_string().starts_with("Unable to acquire project lock"));
    assert!(windows.lock().unwrap().is_empty());

    let terminal = harness.timeline.terminal_statuses(event);
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].status, TimelineStatus::Failed);

    // The foreign holder keeps its lock
    assert!(harness.api.locks().is_locked(&resource));
    assert!(harness.api.locks().release(&held).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_locks_serialize_separate_engines() {
    let lock_dir = tempfile::tempdir().unwrap();
    let windows = Windows::default();
    let poll = Duration::from_millis(10);

    let first = Harness::builder()
        .registry(window_registry(&windows))
        .locks(Arc::new(FileLockCoordinator::new(lock_dir.path(), poll).unwrap()))
        .build();
    let mut second = Harness::builder()
        .registry(window_registry(&windows))
        .locks(Arc::new(FileLockCoordinator::new(lock_dir.path(), poll).unwrap()))
        .build();
    second.project = first.project;

    let a = {
        let api = first.api.clone();
        let request = request(first.project, "locked_window");
        tokio::spawn(async move { api.submit(request).await })
    };
    let b = {
        let api = second.api.clone();
        let request = request(second.project, "locked_window");
        tokio::spawn(async move { api.submit(request).await })
    };
    let (a, b) = futures::future::join(a, b).await;
    a.unwrap().expect("first engine succeeds");
    b.unwrap().expect("second engine succeeds");

    let windows = sorted_windows(&windows);
    assert_eq!(windows.len(), 2);
    assert!(windows[1].0 >= windows[0].1, "file lock did not exclude");
}
