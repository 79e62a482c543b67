//! The public orchestrator handle.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, info_span};

use flowgrid_core::{ProcessorGroup, RunId, RuntimeOptions, RuntimeStatus};
use flowgrid_pool::PoolFactory;

use crate::error::{RuntimeError, RuntimeResult};
use crate::snapshot::RuntimeSnapshot;
use crate::supervisor::{Command, Supervisor};

const COMMAND_BUFFER: usize = 64;

/// Handle to a running orchestrator.
///
/// Cheap to clone; every clone talks to the same supervisor task, which
/// applies calls one at a time in arrival order. Once the runtime has been
/// force-stopped by a second [`drain`](Self::drain), calls fail with
/// [`RuntimeError::Terminated`].
#[derive(Clone)]
pub struct Runtime {
    run_id: RunId,
    commands: mpsc::Sender<Command>,
}

impl Runtime {
    /// Validate `options` and start the supervisor with a fresh run id.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(options: RuntimeOptions, factory: Arc<dyn PoolFactory>) -> RuntimeResult<Self> {
        Self::with_run_id(RunId::new(), options, factory)
    }

    pub fn with_run_id(
        run_id: RunId,
        options: RuntimeOptions,
        factory: Arc<dyn PoolFactory>,
    ) -> RuntimeResult<Self> {
        options.validate()?;

        let (commands, mailbox) = mpsc::channel(COMMAND_BUFFER);
        let span = info_span!("runtime", run_id = %run_id);
        let supervisor = Supervisor::new(run_id.clone(), options, factory);
        tokio::spawn(supervisor.run(mailbox).instrument(span));

        Ok(Self { run_id, commands })
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Start one pool per group and begin supervising them.
    ///
    /// Only allowed while IDLE. Every group is checked before anything is
    /// built, so an unsupported type or a group without options leaves the
    /// runtime IDLE with no pools started. Returns once every pool has been
    /// told to run, without waiting for them to come up.
    pub async fn run(&self, groups: impl IntoIterator<Item = ProcessorGroup>) -> RuntimeResult<()> {
        let groups = groups.into_iter().collect();
        self.request(|reply| Command::Run { groups, reply }).await?
    }

    /// Drain every pool, then go IDLE.
    ///
    /// Calling it again while a drain is in progress terminates every pool
    /// and stops the runtime; the pending first call then fails with
    /// [`RuntimeError::Terminated`].
    pub async fn drain(&self) -> RuntimeResult<bool> {
        self.request(|reply| Command::Drain { reply }).await?
    }

    /// Current status. While DRAINING this asks every pool and moves to
    /// IDLE once all of them report IDLE.
    pub async fn status(&self) -> RuntimeResult<RuntimeStatus> {
        self.request(|reply| Command::Status { reply }).await?
    }

    /// Snapshot every pool in `run()` order. Fails if any pool fails.
    pub async fn snapshot(&self) -> RuntimeResult<RuntimeSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await?
    }

    /// Wait for the supervision loop to stop, then leave the runtime IDLE.
    ///
    /// Returns at once when no loop is running, including after the runtime
    /// has been force-stopped.
    pub async fn run_until_complete(&self) {
        // Err means the supervisor is gone, and the loop with it.
        let _ = self.request(|reply| Command::AwaitLoop { reply }).await;
    }

    /// Whether the status is RUNNING or DRAINING.
    pub async fn is_active(&self) -> RuntimeResult<bool> {
        self.request(|reply| Command::IsActive { reply }).await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> RuntimeResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| RuntimeError::Terminated)?;
        response.await.map_err(|_| RuntimeError::Terminated)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").field("run_id", &self.run_id).finish()
    }
}
