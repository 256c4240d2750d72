use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::QueueConfig;
use crate::observability::flow_metrics;
use crate::queue::{JobQueue, WorkerPool};
use crate::telemetry::shutdown_telemetry;

/// Graceful shutdown coordinator for the taskflow engine
pub struct ShutdownCoordinator {
    timeout: Duration,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.shutdown_timeout())
    }

    /// Wait for SIGINT
    pub async fn wait_for_signal(&self) -> Result<()> {
        info!("Shutdown coordinator ready - will shutdown gracefully on SIGINT");
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
        Ok(())
    }

    /// Stop accepting jobs, let queued and running jobs finish, log final stats.
    /// Returns the number of jobs the pool processed.
    pub async fn shutdown_all_services(
        self,
        queue: Option<Arc<dyn JobQueue>>,
        pool: Option<WorkerPool>,
    ) -> Result<usize> {
        info!("Initiating graceful shutdown of all services...");

        if let Some(queue) = &queue {
            let pending = queue.pending();
            queue.close();
            info!(pending, "Job queue closed to new submissions");
        }

        let processed = match pool {
            Some(pool) => match pool.shutdown(self.timeout).await {
                Ok(processed) => processed,
                Err(e) => {
                    warn!("Some jobs may not have finished cleanly: {}", e);
                    0
                }
            },
            None => 0,
        };

        flow_metrics().log_stats();
        shutdown_telemetry();
        info!("Graceful shutdown completed successfully");
        Ok(processed)
    }
}
