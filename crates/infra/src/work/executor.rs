//! Work executor with retry and backoff logic.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::queue::WorkQueue;
use super::types::{WorkItem, WorkOutcome};

/// Boxed future returned by work handlers.
pub type WorkFuture = Pin<Box<dyn Future<Output = WorkOutcome> + Send>>;

/// Work handler function type.
pub type WorkHandler = Arc<dyn Fn(WorkItem) -> WorkFuture + Send + Sync>;

/// Work executor configuration.
#[derive(Debug, Clone)]
pub struct WorkExecutorConfig {
    /// How often to poll for new items
    pub poll_interval: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for WorkExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "work-executor".to_string(),
        }
    }
}

impl WorkExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Handle to control a running executor.
///
/// Dropping the handle stops the executor on its next poll.
#[derive(Debug)]
pub struct WorkExecutorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<tokio::task::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl WorkExecutorHandle {
    /// Request graceful shutdown and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(()).await;
        if let Some(j) = self.join.take() {
            let _ = j.await;
        }
    }

    /// Get current executor statistics.
    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().unwrap().clone()
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutorStats {
    pub items_processed: u64,
    pub items_succeeded: u64,
    pub items_failed: u64,
    pub uptime_secs: u64,
}

/// Background work executor.
///
/// Polls a work queue for pending items and executes them with registered
/// handlers; failed attempts are requeued per each item's retry policy.
pub struct WorkExecutor<Q: WorkQueue> {
    queue: Q,
    handlers: HashMap<String, WorkHandler>,
}

impl<Q: WorkQueue + 'static> WorkExecutor<Q> {
    /// Create a new executor polling the given queue.
    pub fn new(queue: Q) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a work kind.
    ///
    /// Patterns are matched exactly first, then by category (`"analytics.*"`
    /// matches `"analytics.reduce"`), then by the `"*"` wildcard.
    pub fn register_handler<F, Fut>(&mut self, kind_pattern: impl Into<String>, handler: F)
    where
        F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkOutcome> + Send + 'static,
    {
        self.handlers.insert(
            kind_pattern.into(),
            Arc::new(move |item| -> WorkFuture { Box::pin(handler(item)) }),
        );
    }

    /// Get the handler for a work kind.
    fn get_handler(&self, kind: &str) -> Option<&WorkHandler> {
        // Try exact match first
        if let Some(h) = self.handlers.get(kind) {
            return Some(h);
        }

        // Try category match (e.g., "analytics.*" matches "analytics.reduce")
        for (pattern, handler) in &self.handlers {
            if pattern.ends_with(".*") {
                let prefix = &pattern[..pattern.len() - 2];
                if kind.starts_with(prefix) {
                    return Some(handler);
                }
            }
        }

        // Try wildcard
        self.handlers.get("*")
    }

    /// Spawn the executor as a background task.
    pub fn spawn(self, config: WorkExecutorConfig) -> WorkExecutorHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let stats_clone = stats.clone();

        let join = tokio::spawn(executor_loop(self, config, shutdown_rx, stats_clone));

        WorkExecutorHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }

    /// Execute a single claimed item (for testing or synchronous use).
    ///
    /// The item must already be in the `Running` state; `claim_next` puts it
    /// there and bumps the attempt counter.
    pub async fn execute_one(&self, item: &mut WorkItem) -> Result<(), String> {
        let handler = match self.get_handler(&item.kind) {
            Some(h) => h,
            None => {
                let error = format!("no handler for work kind: {}", item.kind);
                warn!(item_id = %item.id, kind = %item.kind, "no handler for work item");
                item.mark_failed(error.clone());
                self.queue.update(item).ok();
                return Err(error);
            }
        };

        match handler(item.clone()).await {
            WorkOutcome::Completed(result) => {
                item.mark_completed(result);
                self.queue.update(item).map_err(|e| e.to_string())?;
                debug!(item_id = %item.id, "work item completed");
                Ok(())
            }
            WorkOutcome::Failed(error) => {
                item.mark_failed(error.clone());
                self.queue.update(item).map_err(|e| e.to_string())?;
                if item.status.is_terminal() {
                    warn!(item_id = %item.id, error = %error, "work item failed permanently");
                }
                Err(error)
            }
        }
    }
}

async fn executor_loop<Q: WorkQueue + 'static>(
    executor: WorkExecutor<Q>,
    config: WorkExecutorConfig,
    mut shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<ExecutorStats>>,
) {
    info!(executor = %config.name, "work executor started");
    let start_time = Instant::now();

    loop {
        match shutdown_rx.try_recv() {
            Ok(()) | Err(mpsc::error::TryRecvError::Disconnected) => break,
            Err(mpsc::error::TryRecvError::Empty) => {}
        }

        {
            let mut s = stats.lock().unwrap();
            s.uptime_secs = start_time.elapsed().as_secs();
        }

        match executor.queue.claim_next() {
            Ok(Some(mut item)) => {
                debug!(
                    executor = %config.name,
                    item_id = %item.id,
                    kind = %item.kind,
                    "claimed work item"
                );

                let result = executor.execute_one(&mut item).await;

                {
                    let mut s = stats.lock().unwrap();
                    s.items_processed += 1;
                    match &result {
                        Ok(()) => s.items_succeeded += 1,
                        Err(_) => s.items_failed += 1,
                    }
                }

                if let Err(e) = result {
                    debug!(
                        executor = %config.name,
                        item_id = %item.id,
                        error = %e,
                        status = ?item.status,
                        "work item attempt failed"
                    );
                }
            }
            Ok(None) => {
                // Nothing ready, sleep
                tokio::time::sleep(config.poll_interval).await;
            }
            Err(e) => {
                error!(executor = %config.name, error = ?e, "failed to claim work item");
                tokio::time::sleep(config.poll_interval).await;
            }
        }
    }

    info!(executor = %config.name, "work executor stopped");
}
