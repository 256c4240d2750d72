// Flow engine: tasks, flows, registry, lifecycle and execution

pub mod errors;
pub mod executor;
pub mod flow;
pub mod lifecycle;
pub mod registry;
pub mod reporting;
pub mod task;
pub mod types;

#[cfg(test)]
pub(crate) mod mocks;

pub use errors::{truncate_message, FlowError, DEFAULT_MESSAGE_LIMIT, UNKNOWN_RUN_ERROR};
pub use executor::{run_tasks, FlowExecutor, FlowRun, TaskRun};
pub use flow::{Flow, FlowInit, FlowServices, FlowSpec};
pub use lifecycle::{LifecycleEvent, Phase, SubmissionLifecycle};
pub use registry::{FlowConstructor, FlowRegistry};
pub use reporting::{DomainStatus, DomainTarget, StatusTarget, TerminalReporter};
pub use task::{ForcedFailure, Task, TaskContext, TaskList, FORCED_FAILURE_MESSAGE};
pub use types::{FlowResult, Mode, Parameters, RevertFailure, RunReport, SubmitOutcome, TaskRecord, TaskStatus};
