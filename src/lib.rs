// Project Taskflow - transactional flow orchestration for project storage
// This exposes the engine, built-in flows and collaborators for embedding and testing

pub mod config;
pub mod domain;
pub mod engine;
pub mod flows;
pub mod lock;
pub mod observability;
pub mod queue;
pub mod shutdown;
pub mod storage;
pub mod submission;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{config, init_config, TaskflowConfig};
pub use domain::{LandingZone, MemoryTimeline, MemoryZoneRepository, Timeline, TimelineStatus, ZoneRepository, ZoneStatus};
pub use engine::{
    Flow, FlowError, FlowExecutor, FlowInit, FlowRegistry, FlowResult, FlowServices, FlowSpec, Mode,
    Parameters, SubmitOutcome, Task, TaskContext, TaskList,
};
pub use flows::{default_registry, register_default_flows};
pub use lock::{FileLockCoordinator, LockCoordinator, LockError, LockHandle, MemoryLockCoordinator};
pub use observability::{flow_metrics, FlowMetrics, OperationTimer};
pub use queue::{ChannelQueue, FlowJob, JobQueue, JobReceiver, QueueError, WorkerPool};
pub use shutdown::ShutdownCoordinator;
pub use storage::{AccessLevel, MemoryStorage, StorageBackend, StoragePaths, UserKind};
pub use submission::{SubmitRequest, TaskflowApi, TaskflowApiBuilder};
pub use telemetry::{create_submission_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
