//! Scripted pools for orchestrator tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use flowgrid_core::{ProcessorGroup, ProcessorOptions, ProcessorType, RunId, RuntimeStatus};
use flowgrid_pool::{
    BoxFuture, PoolError, PoolFactory, PoolHandle, PoolResult, PoolSnapshot, SharedPoolHandle,
};

/// A pool whose behaviour tests flip at will.
pub(crate) struct MockPool {
    pub(crate) group_id: String,
    group_type: ProcessorType,
    status: Mutex<RuntimeStatus>,
    alive: AtomicBool,
    hold_drain: AtomicBool,
    pub(crate) fail_drain: AtomicBool,
    pub(crate) fail_scale: AtomicBool,
    pub(crate) fail_snapshot: AtomicBool,
    runs: AtomicUsize,
    drains: AtomicUsize,
    scales: AtomicUsize,
    terminates: AtomicUsize,
}

impl MockPool {
    fn new(group_id: &str, group_type: ProcessorType) -> Self {
        Self {
            group_id: group_id.to_string(),
            group_type,
            status: Mutex::new(RuntimeStatus::Idle),
            alive: AtomicBool::new(true),
            hold_drain: AtomicBool::new(false),
            fail_drain: AtomicBool::new(false),
            fail_scale: AtomicBool::new(false),
            fail_snapshot: AtomicBool::new(false),
            runs: AtomicUsize::new(0),
            drains: AtomicUsize::new(0),
            scales: AtomicUsize::new(0),
            terminates: AtomicUsize::new(0),
        }
    }

    /// Simulate a crash: every call now fails as unreachable.
    pub(crate) fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub(crate) fn set_status(&self, status: RuntimeStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub(crate) fn current_status(&self) -> RuntimeStatus {
        *self.status.lock().unwrap()
    }

    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub(crate) fn drains(&self) -> usize {
        self.drains.load(Ordering::SeqCst)
    }

    pub(crate) fn scales(&self) -> usize {
        self.scales.load(Ordering::SeqCst)
    }

    pub(crate) fn terminates(&self) -> usize {
        self.terminates.load(Ordering::SeqCst)
    }

    fn check_alive(&self) -> PoolResult<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(PoolError::Unavailable(format!("{} is gone", self.group_id)))
        }
    }
}

impl PoolHandle for MockPool {
    fn run(&self) -> BoxFuture<'_, PoolResult<()>> {
        Box::pin(async move {
            self.check_alive()?;
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.set_status(RuntimeStatus::Running);
            Ok(())
        })
    }

    fn drain(&self) -> BoxFuture<'_, PoolResult<bool>> {
        Box::pin(async move {
            self.check_alive()?;
            self.drains.fetch_add(1, Ordering::SeqCst);
            if self.fail_drain.load(Ordering::SeqCst) {
                return Err(PoolError::Failed("drain refused".into()));
            }
            self.set_status(RuntimeStatus::Draining);
            if self.hold_drain.load(Ordering::SeqCst) {
                // Stays DRAINING until a test flips the status by hand.
                std::future::pending::<()>().await;
            }
            self.set_status(RuntimeStatus::Idle);
            Ok(true)
        })
    }

    fn status(&self) -> BoxFuture<'_, PoolResult<RuntimeStatus>> {
        Box::pin(async move {
            self.check_alive()?;
            Ok(self.current_status())
        })
    }

    fn scale(&self) -> BoxFuture<'_, PoolResult<()>> {
        Box::pin(async move {
            self.check_alive()?;
            self.scales.fetch_add(1, Ordering::SeqCst);
            if self.fail_scale.load(Ordering::SeqCst) {
                return Err(PoolError::Failed("estimator exploded".into()));
            }
            Ok(())
        })
    }

    fn snapshot(&self) -> BoxFuture<'_, PoolResult<PoolSnapshot>> {
        Box::pin(async move {
            self.check_alive()?;
            if self.fail_snapshot.load(Ordering::SeqCst) {
                return Err(PoolError::Failed("snapshot refused".into()));
            }
            Ok(PoolSnapshot {
                group_id: self.group_id.clone(),
                group_type: self.group_type,
                status: self.current_status(),
                num_replicas: 1,
                timestamp_millis: 0,
                metrics: BTreeMap::new(),
            })
        })
    }

    fn terminate(&self) -> BoxFuture<'_, PoolResult<()>> {
        Box::pin(async move {
            self.terminates.fetch_add(1, Ordering::SeqCst);
            self.kill();
            Ok(())
        })
    }
}

/// Records every pool it builds so tests can reach them afterwards.
#[derive(Default)]
pub(crate) struct MockFactory {
    created: Mutex<Vec<(ProcessorType, Arc<MockPool>)>>,
    hold_drains: AtomicBool,
    failing_scale: Mutex<HashSet<String>>,
    failing_build: Mutex<HashSet<String>>,
}

impl MockFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Pools built from now on never finish draining on their own.
    pub(crate) fn holding_drains(self) -> Self {
        self.hold_drains.store(true, Ordering::SeqCst);
        self
    }

    /// Pools built for `group_id` fail every `scale` call.
    pub(crate) fn failing_scale(self, group_id: &str) -> Self {
        self.failing_scale.lock().unwrap().insert(group_id.to_string());
        self
    }

    /// Building a pool for `group_id` fails.
    pub(crate) fn failing_build(self, group_id: &str) -> Self {
        self.failing_build.lock().unwrap().insert(group_id.to_string());
        self
    }

    pub(crate) fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub(crate) fn created_types(&self) -> Vec<ProcessorType> {
        self.created.lock().unwrap().iter().map(|(ty, _)| *ty).collect()
    }

    /// Every pool built for `group_id`, oldest first.
    pub(crate) fn pools_for(&self, group_id: &str) -> Vec<Arc<MockPool>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, pool)| pool.group_id == group_id)
            .map(|(_, pool)| pool.clone())
            .collect()
    }

    pub(crate) fn latest(&self, group_id: &str) -> Arc<MockPool> {
        self.pools_for(group_id)
            .pop()
            .unwrap_or_else(|| panic!("no pool built for {group_id}"))
    }

    fn create(&self, group_type: ProcessorType, group: &ProcessorGroup) -> PoolResult<SharedPoolHandle> {
        if self.failing_build.lock().unwrap().contains(&group.group_id) {
            return Err(PoolError::Failed(format!("cannot build {}", group.group_id)));
        }
        let pool = Arc::new(MockPool::new(&group.group_id, group_type));
        pool.hold_drain
            .store(self.hold_drains.load(Ordering::SeqCst), Ordering::SeqCst);
        if self.failing_scale.lock().unwrap().contains(&group.group_id) {
            pool.fail_scale.store(true, Ordering::SeqCst);
        }
        self.created.lock().unwrap().push((group_type, pool.clone()));
        Ok(pool)
    }
}

impl PoolFactory for MockFactory {
    fn consumer_pool(
        &self,
        _run_id: &RunId,
        group: &ProcessorGroup,
        _options: &ProcessorOptions,
    ) -> PoolResult<SharedPoolHandle> {
        self.create(ProcessorType::Consumer, group)
    }

    fn collector_pool(
        &self,
        _run_id: &RunId,
        group: &ProcessorGroup,
        _options: &ProcessorOptions,
    ) -> PoolResult<SharedPoolHandle> {
        self.create(ProcessorType::Collector, group)
    }

    fn endpoint_pool(
        &self,
        _run_id: &RunId,
        group: &ProcessorGroup,
        _options: &ProcessorOptions,
    ) -> PoolResult<SharedPoolHandle> {
        self.create(ProcessorType::Endpoint, group)
    }
}
