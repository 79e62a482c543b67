//! The supervisor task, sole owner of all runtime state.
//!
//! Public calls on [`Runtime`](crate::Runtime) arrive here as [`Command`]s.
//! Anything that waits on pools (drain, status probes, snapshots, loop
//! ticks, scale calls) runs as a child task in a `JoinSet` and reports
//! back as an [`Event`], so the supervisor keeps answering commands while
//! pools are slow. That is what lets a second `drain()` escalate while the
//! first one is still waiting.
//!
//! # Supervision loop
//!
//! ```text
//! tick ──► status IDLE? ──yes──► loop stops, waiters released
//!            │ no
//!            ▼
//!          probe every pool (child task)
//!            ▼
//!          TickProbed: restart unreachable pools (RUNNING only)
//!                      poll autoscale timers   (RUNNING only)
//!            ▼
//!          scale due pools (child task, errors logged)
//!            ▼
//!          TickFinished: next tick in checkin_frequency_loop_secs
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, warn};

use flowgrid_core::{ProcessorGroup, RunId, RuntimeOptions, RuntimeStatus};
use flowgrid_pool::{PoolFactory, PoolResult, PoolSnapshot, Probe, SharedPoolHandle};

use crate::error::{RuntimeError, RuntimeResult};
use crate::reference::{AutoscaleTimer, PoolReference, build_pool, check_startable};
use crate::snapshot::RuntimeSnapshot;

/// Requests from [`Runtime`](crate::Runtime) handles.
pub(crate) enum Command {
    Run {
        groups: Vec<ProcessorGroup>,
        reply: oneshot::Sender<RuntimeResult<()>>,
    },
    Drain {
        reply: oneshot::Sender<RuntimeResult<bool>>,
    },
    Status {
        reply: oneshot::Sender<RuntimeResult<RuntimeStatus>>,
    },
    Snapshot {
        reply: oneshot::Sender<RuntimeResult<RuntimeSnapshot>>,
    },
    AwaitLoop {
        reply: oneshot::Sender<()>,
    },
    IsActive {
        reply: oneshot::Sender<bool>,
    },
}

/// Results of child tasks.
///
/// Events that depend on the reference list carry the `generation` they
/// were started under, so results from before a re-`run()` are discarded.
enum Event {
    PoolStarted {
        group_id: String,
        result: PoolResult<()>,
    },
    PoolTerminated {
        group_id: String,
        result: PoolResult<()>,
    },
    Drained {
        generation: u64,
        result: PoolResult<()>,
        reply: oneshot::Sender<RuntimeResult<bool>>,
    },
    StatusProbed {
        generation: u64,
        all_idle: PoolResult<bool>,
        reply: oneshot::Sender<RuntimeResult<RuntimeStatus>>,
    },
    SnapshotTaken {
        status: RuntimeStatus,
        result: PoolResult<Vec<PoolSnapshot>>,
        reply: oneshot::Sender<RuntimeResult<RuntimeSnapshot>>,
    },
    TickProbed {
        generation: u64,
        probes: Vec<Probe>,
    },
    TickFinished,
}

enum Flow {
    Continue,
    Exit,
}

pub(crate) struct Supervisor {
    run_id: RunId,
    options: RuntimeOptions,
    factory: Arc<dyn PoolFactory>,
    status: RuntimeStatus,
    references: Vec<PoolReference>,
    /// Bumped on every successful `run()`.
    generation: u64,
    /// Set while the supervision loop is running.
    loop_active: bool,
    /// Next tick deadline. `None` while a tick is in flight or the loop is stopped.
    next_tick: Option<Instant>,
    loop_waiters: Vec<oneshot::Sender<()>>,
    tasks: JoinSet<Event>,
}

impl Supervisor {
    pub(crate) fn new(run_id: RunId, options: RuntimeOptions, factory: Arc<dyn PoolFactory>) -> Self {
        Self {
            run_id,
            options,
            factory,
            status: RuntimeStatus::Idle,
            references: Vec::new(),
            generation: 0,
            loop_active: false,
            next_tick: None,
            loop_waiters: Vec::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Serve commands until force-stopped, or until every handle is gone
    /// and the loop has stopped.
    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut commands_open = true;

        loop {
            tokio::select! {
                command = commands.recv(), if commands_open => match command {
                    Some(command) => {
                        if let Flow::Exit = self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        debug!("all runtime handles dropped");
                        commands_open = false;
                    }
                },
                Some(joined) = self.tasks.join_next() => match joined {
                    Ok(event) => self.handle_event(event),
                    Err(e) => error!(error = %e, "runtime child task failed"),
                },
                () = wait_until(self.next_tick) => self.on_tick(),
            }

            if !commands_open && !self.loop_active {
                break;
            }
        }

        self.tasks.abort_all();
        info!(status = %self.status, "runtime supervisor stopped");
    }

    async fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Run { groups, reply } => {
                let _ = reply.send(self.start(groups));
            }
            Command::Drain { reply } => return self.drain(reply).await,
            Command::Status { reply } => self.status(reply),
            Command::Snapshot { reply } => self.snapshot(reply),
            Command::AwaitLoop { reply } => {
                if self.loop_active {
                    self.loop_waiters.push(reply);
                } else {
                    self.status = RuntimeStatus::Idle;
                    let _ = reply.send(());
                }
            }
            Command::IsActive { reply } => {
                let _ = reply.send(self.status.is_active());
            }
        }
        Flow::Continue
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::PoolStarted { group_id, result } => {
                if let Err(e) = result {
                    warn!(%group_id, error = %e, "pool failed to start");
                }
            }
            Event::PoolTerminated { group_id, result } => {
                if let Err(e) = result {
                    warn!(%group_id, error = %e, "pool terminate failed");
                }
            }
            Event::Drained {
                generation,
                result,
                reply,
            } => match result {
                Ok(()) => {
                    if generation == self.generation && self.status == RuntimeStatus::Draining {
                        self.status = RuntimeStatus::Idle;
                        info!("drain runtime complete");
                    }
                    let _ = reply.send(Ok(true));
                }
                Err(e) => {
                    error!(error = %e, "pool drain failed");
                    let _ = reply.send(Err(e.into()));
                }
            },
            Event::StatusProbed {
                generation,
                all_idle,
                reply,
            } => match all_idle {
                Ok(all_idle) => {
                    if all_idle && generation == self.generation && self.status == RuntimeStatus::Draining {
                        self.status = RuntimeStatus::Idle;
                        info!("all pools drained");
                    }
                    let _ = reply.send(Ok(self.status));
                }
                Err(e) => {
                    warn!(error = %e, "pool status check failed while draining");
                    let _ = reply.send(Err(e.into()));
                }
            },
            Event::SnapshotTaken {
                status,
                result,
                reply,
            } => {
                let snapshot = result
                    .map(|processors| RuntimeSnapshot::new(status, processors))
                    .map_err(RuntimeError::from);
                let _ = reply.send(snapshot);
            }
            Event::TickProbed { generation, probes } => {
                if generation == self.generation {
                    self.supervise(probes);
                    self.dispatch_autoscale();
                } else {
                    self.schedule_next_tick();
                }
            }
            Event::TickFinished => self.schedule_next_tick(),
        }
    }

    // ── Commands ────────────────────────────────────────────────────

    fn start(&mut self, groups: Vec<ProcessorGroup>) -> RuntimeResult<()> {
        if self.status != RuntimeStatus::Idle {
            return Err(RuntimeError::IllegalState(self.status));
        }
        info!(groups = groups.len(), "starting runtime");

        for group in &groups {
            check_startable(&self.options, group)?;
        }

        let now = Instant::now();
        let mut references = Vec::with_capacity(groups.len());
        for group in groups {
            let built = build_pool(self.factory.as_ref(), &self.run_id, &self.options, &group)
                .and_then(|handle| {
                    let interval = self
                        .options
                        .processor_options(&group.group_id)?
                        .autoscaler_options
                        .autoscale_interval();
                    Ok((handle, interval))
                });
            match built {
                Ok((handle, interval)) => references.push(PoolReference {
                    handle,
                    processor_group: group,
                    autoscale: AutoscaleTimer::new(interval, now),
                }),
                Err(e) => {
                    error!(group_id = %group.group_id, error = %e, "failed to build pool, aborting run");
                    for reference in references {
                        self.spawn_terminate(reference);
                    }
                    return Err(e);
                }
            }
        }

        self.status = RuntimeStatus::Running;
        self.generation += 1;
        self.references = references;
        let started: Vec<_> = self
            .references
            .iter()
            .map(|r| (r.handle.clone(), r.processor_group.group_id.clone()))
            .collect();
        for (handle, group_id) in started {
            self.issue_run(handle, group_id);
        }

        if !self.loop_active {
            self.loop_active = true;
            self.next_tick = Some(now);
            info!(
                period_secs = self.options.checkin_frequency_loop_secs,
                "supervision loop started"
            );
        }
        Ok(())
    }

    async fn drain(&mut self, reply: oneshot::Sender<RuntimeResult<bool>>) -> Flow {
        if self.status == RuntimeStatus::Draining {
            warn!("received drain twice, killing remaining pools");
            let handles = self.handles();
            let results = join_all(handles.iter().map(|handle| handle.terminate())).await;
            for (reference, result) in self.references.iter().zip(results) {
                if let Err(e) = result {
                    warn!(group_id = %reference.processor_group.group_id, error = %e, "pool terminate failed");
                }
            }
            let _ = reply.send(Ok(true));
            return Flow::Exit;
        }

        warn!("draining runtime");
        warn!("-- draining again will force stop the runtime");
        self.status = RuntimeStatus::Draining;

        let handles = self.handles();
        let generation = self.generation;
        self.spawn_child(async move {
            let result = try_join_all(handles.iter().map(|handle| handle.drain()))
                .await
                .map(|_| ());
            Event::Drained {
                generation,
                result,
                reply,
            }
        });
        Flow::Continue
    }

    fn status(&mut self, reply: oneshot::Sender<RuntimeResult<RuntimeStatus>>) {
        if self.status != RuntimeStatus::Draining {
            let _ = reply.send(Ok(self.status));
            return;
        }

        let handles = self.handles();
        let generation = self.generation;
        self.spawn_child(async move {
            // A pool that cannot answer has not reported IDLE.
            let all_idle = try_join_all(handles.iter().map(|handle| handle.status()))
                .await
                .map(|statuses| statuses.iter().all(|status| *status == RuntimeStatus::Idle));
            Event::StatusProbed {
                generation,
                all_idle,
                reply,
            }
        });
    }

    fn snapshot(&mut self, reply: oneshot::Sender<RuntimeResult<RuntimeSnapshot>>) {
        let handles = self.handles();
        let status = self.status;
        self.spawn_child(async move {
            let result = try_join_all(handles.iter().map(|handle| handle.snapshot())).await;
            Event::SnapshotTaken {
                status,
                result,
                reply,
            }
        });
    }

    // ── Supervision loop ────────────────────────────────────────────

    fn on_tick(&mut self) {
        self.next_tick = None;

        if !self.status.is_active() {
            self.finish_loop();
            return;
        }

        let handles = self.handles();
        let generation = self.generation;
        self.spawn_child(async move {
            let probes = probe_all(&handles).await;
            Event::TickProbed { generation, probes }
        });
    }

    /// Restart every pool whose probe says it is gone, if still running.
    fn supervise(&mut self, probes: Vec<Probe>) {
        for (index, probe) in probes.into_iter().enumerate() {
            let group_id = &self.references[index].processor_group.group_id;
            match probe {
                Probe::Alive(_) => {}
                Probe::Errored(reason) => {
                    warn!(%group_id, %reason, "pool status probe returned an error");
                }
                Probe::Unreachable(reason) => {
                    if self.status == RuntimeStatus::Running {
                        error!(%group_id, %reason, "pool unexpectedly died, restarting");
                        self.restart(index);
                    } else {
                        warn!(%group_id, %reason, status = %self.status, "pool unreachable, not restarting");
                    }
                }
            }
        }
    }

    fn restart(&mut self, index: usize) {
        let group = self.references[index].processor_group.clone();
        match build_pool(self.factory.as_ref(), &self.run_id, &self.options, &group) {
            Ok(handle) => {
                self.references[index].handle = handle.clone();
                self.issue_run(handle, group.group_id);
            }
            Err(e) => {
                error!(group_id = %group.group_id, error = %e, "pool restart failed, retrying next tick");
            }
        }
    }

    /// Fire `scale` on every pool whose autoscale interval has elapsed.
    fn dispatch_autoscale(&mut self) {
        if self.status != RuntimeStatus::Running {
            self.schedule_next_tick();
            return;
        }

        let now = Instant::now();
        let due: Vec<(String, SharedPoolHandle)> = self
            .references
            .iter_mut()
            .filter_map(|reference| {
                reference
                    .autoscale
                    .poll(now)
                    .then(|| (reference.processor_group.group_id.clone(), reference.handle.clone()))
            })
            .collect();

        if due.is_empty() {
            self.schedule_next_tick();
            return;
        }

        debug!(pools = due.len(), "starting autoscale check");
        self.spawn_child(async move {
            let results = join_all(due.iter().map(|(_, handle)| handle.scale())).await;
            for ((group_id, _), result) in due.iter().zip(results) {
                if let Err(e) = result {
                    warn!(%group_id, error = %e, "autoscale failed");
                }
            }
            debug!("autoscale check ended");
            Event::TickFinished
        });
    }

    fn schedule_next_tick(&mut self) {
        if self.loop_active {
            self.next_tick = Some(Instant::now() + self.options.checkin_interval());
        }
    }

    fn finish_loop(&mut self) {
        self.loop_active = false;
        self.status = RuntimeStatus::Idle;
        info!("supervision loop stopped");
        for waiter in self.loop_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn handles(&self) -> Vec<SharedPoolHandle> {
        self.references.iter().map(|r| r.handle.clone()).collect()
    }

    /// Send `run` without waiting for the pool to come up.
    fn issue_run(&mut self, handle: SharedPoolHandle, group_id: String) {
        debug!(%group_id, "issuing run");
        self.spawn_child(async move {
            let result = handle.run().await;
            Event::PoolStarted { group_id, result }
        });
    }

    fn spawn_terminate(&mut self, reference: PoolReference) {
        let group_id = reference.processor_group.group_id;
        let handle = reference.handle;
        self.spawn_child(async move {
            let result = handle.terminate().await;
            Event::PoolTerminated { group_id, result }
        });
    }

    fn spawn_child(&mut self, task: impl Future<Output = Event> + Send + 'static) {
        self.tasks.spawn(task.in_current_span());
    }
}

async fn probe_all(handles: &[SharedPoolHandle]) -> Vec<Probe> {
    join_all(handles.iter().map(|handle| Probe::of(handle.as_ref()))).await
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
