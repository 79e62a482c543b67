//! In-process pool: a tokio task per processor group.
//!
//! The task owns the pool's status and replica count and answers handle
//! messages over an mpsc mailbox. Terminating aborts the task, after which
//! every call on the handle fails with [`PoolError::Unavailable`], which is
//! exactly what a crashed remote pool looks like to the orchestrator.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use flowgrid_core::{ProcessorGroup, ProcessorOptions, RunId, RuntimeStatus};

use crate::error::{PoolError, PoolResult};
use crate::factory::PoolFactory;
use crate::handle::{BoxFuture, PoolHandle, PoolSnapshot, SharedPoolHandle};

const MAILBOX_CAPACITY: usize = 64;

/// Callback that picks a desired replica count for a pool.
///
/// Called on every `scale()` while the pool is running. The result is
/// clamped to the group's replica bounds.
pub type ReplicaEstimator = Arc<dyn Fn(&PoolSnapshot) -> anyhow::Result<u32> + Send + Sync>;

enum PoolCommand {
    Run { reply: oneshot::Sender<()> },
    Drain { reply: oneshot::Sender<bool> },
    Status { reply: oneshot::Sender<RuntimeStatus> },
    Scale { reply: oneshot::Sender<PoolResult<()>> },
    Snapshot { reply: oneshot::Sender<PoolSnapshot> },
}

/// Handle to an in-process pool task.
pub struct LocalPool {
    group_id: String,
    commands: mpsc::Sender<PoolCommand>,
    abort: AbortHandle,
}

impl LocalPool {
    /// Spawn the pool task. Must be called inside a tokio runtime.
    pub fn spawn(
        run_id: &RunId,
        group: &ProcessorGroup,
        options: &ProcessorOptions,
        estimator: Option<ReplicaEstimator>,
    ) -> Self {
        let (commands, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        let state = PoolState {
            run_id: run_id.clone(),
            group: group.clone(),
            options: options.clone(),
            status: RuntimeStatus::Idle,
            num_replicas: 0,
            scale_checks: 0,
            scale_events: 0,
            estimator,
        };
        let task = tokio::spawn(state.serve(mailbox));

        debug!(%run_id, group_id = %group.group_id, "local pool spawned");
        Self {
            group_id: group.group_id.clone(),
            commands,
            abort: task.abort_handle(),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Whether the pool task has exited (terminated or panicked).
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> PoolCommand,
    ) -> PoolResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| self.unavailable())?;
        response.await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> PoolError {
        PoolError::Unavailable(format!("local pool {} is not running", self.group_id))
    }
}

impl PoolHandle for LocalPool {
    fn run(&self) -> BoxFuture<'_, PoolResult<()>> {
        Box::pin(self.request(|reply| PoolCommand::Run { reply }))
    }

    fn drain(&self) -> BoxFuture<'_, PoolResult<bool>> {
        Box::pin(self.request(|reply| PoolCommand::Drain { reply }))
    }

    fn status(&self) -> BoxFuture<'_, PoolResult<RuntimeStatus>> {
        Box::pin(self.request(|reply| PoolCommand::Status { reply }))
    }

    fn scale(&self) -> BoxFuture<'_, PoolResult<()>> {
        Box::pin(async move { self.request(|reply| PoolCommand::Scale { reply }).await? })
    }

    fn snapshot(&self) -> BoxFuture<'_, PoolResult<PoolSnapshot>> {
        Box::pin(self.request(|reply| PoolCommand::Snapshot { reply }))
    }

    fn terminate(&self) -> BoxFuture<'_, PoolResult<()>> {
        Box::pin(async move {
            self.abort.abort();
            info!(group_id = %self.group_id, "local pool terminated");
            Ok(())
        })
    }
}

/// State owned by the pool task.
struct PoolState {
    run_id: RunId,
    group: ProcessorGroup,
    options: ProcessorOptions,
    status: RuntimeStatus,
    num_replicas: u32,
    /// Number of `scale()` calls handled.
    scale_checks: u64,
    /// Number of `scale()` calls that changed the replica count.
    scale_events: u64,
    estimator: Option<ReplicaEstimator>,
}

impl PoolState {
    async fn serve(mut self, mut mailbox: mpsc::Receiver<PoolCommand>) {
        while let Some(command) = mailbox.recv().await {
            match command {
                PoolCommand::Run { reply } => {
                    self.start();
                    let _ = reply.send(());
                }
                PoolCommand::Drain { reply } => {
                    self.drain();
                    let _ = reply.send(true);
                }
                PoolCommand::Status { reply } => {
                    let _ = reply.send(self.status);
                }
                PoolCommand::Scale { reply } => {
                    let _ = reply.send(self.scale());
                }
                PoolCommand::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
            }
        }
        debug!(group_id = %self.group.group_id, "local pool mailbox closed");
    }

    fn start(&mut self) {
        if self.status == RuntimeStatus::Running {
            debug!(group_id = %self.group.group_id, "local pool already running");
            return;
        }
        let autoscaler = &self.options.autoscaler_options;
        self.num_replicas = autoscaler.clamp_replicas(self.options.num_replicas);
        self.status = RuntimeStatus::Running;
        info!(
            run_id = %self.run_id,
            group_id = %self.group.group_id,
            group_type = %self.group.group_type,
            replicas = self.num_replicas,
            "local pool running"
        );
    }

    /// Local replicas hold no in-flight work, so draining completes at once.
    fn drain(&mut self) {
        debug!(group_id = %self.group.group_id, replicas = self.num_replicas, "draining local pool");
        self.num_replicas = 0;
        self.status = RuntimeStatus::Idle;
        info!(group_id = %self.group.group_id, "local pool drained");
    }

    fn scale(&mut self) -> PoolResult<()> {
        if self.status != RuntimeStatus::Running {
            debug!(group_id = %self.group.group_id, status = %self.status, "not running, skipping scale");
            return Ok(());
        }
        self.scale_checks += 1;

        let autoscaler = &self.options.autoscaler_options;
        if !autoscaler.enable_autoscaler {
            return Ok(());
        }
        let Some(estimator) = self.estimator.clone() else {
            return Ok(());
        };

        let desired = estimator(&self.snapshot()).map_err(|e| {
            warn!(group_id = %self.group.group_id, error = %e, "replica estimate failed");
            PoolError::Failed(e.to_string())
        })?;
        let target = self.options.autoscaler_options.clamp_replicas(desired);

        if target != self.num_replicas {
            info!(
                group_id = %self.group.group_id,
                from = self.num_replicas,
                to = target,
                "scaling local pool"
            );
            self.num_replicas = target;
            self.scale_events += 1;
        }
        Ok(())
    }

    fn snapshot(&self) -> PoolSnapshot {
        let mut metrics = BTreeMap::new();
        metrics.insert("scale_checks".to_string(), self.scale_checks as f64);
        metrics.insert("scale_events".to_string(), self.scale_events as f64);
        PoolSnapshot {
            group_id: self.group.group_id.clone(),
            group_type: self.group.group_type,
            status: self.status,
            num_replicas: self.num_replicas,
            timestamp_millis: epoch_millis(),
            metrics,
        }
    }
}

/// Factory producing a [`LocalPool`] for every implemented group type.
///
/// Keeps the pools it spawned so callers can inspect or kill them. Pools
/// whose task has exited are forgotten the next time one is spawned.
#[derive(Clone, Default)]
pub struct LocalPoolFactory {
    estimator: Option<ReplicaEstimator>,
    spawned: Arc<Mutex<Vec<Arc<LocalPool>>>>,
}

impl LocalPoolFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the callback pools use to pick a replica count on `scale()`.
    pub fn with_estimator(mut self, estimator: ReplicaEstimator) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Registered pools, oldest first.
    pub fn pools(&self) -> Vec<Arc<LocalPool>> {
        self.spawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Registered pools for one group, oldest first.
    pub fn pools_for(&self, group_id: &str) -> Vec<Arc<LocalPool>> {
        self.pools()
            .into_iter()
            .filter(|pool| pool.group_id() == group_id)
            .collect()
    }

    fn spawn(
        &self,
        run_id: &RunId,
        group: &ProcessorGroup,
        options: &ProcessorOptions,
    ) -> PoolResult<SharedPoolHandle> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(PoolError::Failed(
                "local pools must be created inside a tokio runtime".to_string(),
            ));
        }
        let pool = Arc::new(LocalPool::spawn(
            run_id,
            group,
            options,
            self.estimator.clone(),
        ));
        let mut spawned = self.spawned.lock().unwrap_or_else(PoisonError::into_inner);
        spawned.retain(|existing| !existing.is_finished());
        spawned.push(pool.clone());
        Ok(pool)
    }
}

impl PoolFactory for LocalPoolFactory {
    fn consumer_pool(
        &self,
        run_id: &RunId,
        group: &ProcessorGroup,
        options: &ProcessorOptions,
    ) -> PoolResult<SharedPoolHandle> {
        self.spawn(run_id, group, options)
    }

    fn collector_pool(
        &self,
        run_id: &RunId,
        group: &ProcessorGroup,
        options: &ProcessorOptions,
    ) -> PoolResult<SharedPoolHandle> {
        self.spawn(run_id, group, options)
    }

    fn endpoint_pool(
        &self,
        run_id: &RunId,
        group: &ProcessorGroup,
        options: &ProcessorOptions,
    ) -> PoolResult<SharedPoolHandle> {
        self.spawn(run_id, group, options)
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
