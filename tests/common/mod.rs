//! Shared test fixtures: a recording container runtime and pool setup.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use tideway_pool::{
    ContainerRuntime, Executor, ExecutorSpec, HostInfo, Pool, PoolBuilder, PoolConfig, PoolError,
    Resources,
};

/// Executor lifecycle event observed through the mock runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start(String),
    Kill(String),
}

struct Recorder {
    events: Mutex<Vec<Event>>,
    tx: UnboundedSender<Event>,
}

impl Recorder {
    fn record(&self, event: Event) {
        self.events.lock().push(event.clone());
        let _ = self.tx.send(event);
    }
}

/// A container runtime that reports fixed host facts and records every
/// executor start and kill.
pub struct MockRuntime {
    mem_total: u64,
    ncpu: u32,
    cpu_features: Vec<String>,
    disk: u64,
    fail_starts: AtomicBool,
    recorder: Arc<Recorder>,
}

impl MockRuntime {
    pub fn new(
        mem_total: u64,
        ncpu: u32,
        cpu_features: &[&str],
        disk: u64,
    ) -> (Arc<Self>, UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(Self {
            mem_total,
            ncpu,
            cpu_features: cpu_features.iter().map(|f| (*f).to_string()).collect(),
            disk,
            fail_starts: AtomicBool::new(false),
            recorder: Arc::new(Recorder {
                events: Mutex::new(Vec::new()),
                tx,
            }),
        });
        (runtime, rx)
    }

    /// Make every subsequent executor start fail.
    pub fn fail_starts(&self, fail: bool) {
        self.fail_starts.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<Event> {
        self.recorder.events.lock().clone()
    }

    pub fn starts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Start(id) => Some(id),
                Event::Kill(_) => None,
            })
            .collect()
    }

    pub fn kills(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Kill(id) => Some(id),
                Event::Start(_) => None,
            })
            .collect()
    }
}

struct MockExecutor {
    id: String,
    fail_start: bool,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl Executor for MockExecutor {
    async fn start(&self, _name: &str) -> Result<(), PoolError> {
        if self.fail_start {
            return Err(PoolError::Runtime("executor start failed".into()));
        }
        self.recorder.record(Event::Start(self.id.clone()));
        Ok(())
    }

    async fn kill(&self) -> Result<(), PoolError> {
        self.recorder.record(Event::Kill(self.id.clone()));
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn host_info(&self) -> Result<HostInfo, PoolError> {
        Ok(HostInfo {
            mem_total: self.mem_total,
            ncpu: self.ncpu,
            cpu_features: self.cpu_features.clone(),
        })
    }

    async fn disk_capacity(&self, _path: &Path) -> Result<u64, PoolError> {
        if self.disk == 0 {
            return Err(PoolError::Runtime("disk stat failed".into()));
        }
        Ok(self.disk)
    }

    fn executor(&self, spec: ExecutorSpec) -> Arc<dyn Executor> {
        Arc::new(MockExecutor {
            id: spec.id,
            fail_start: self.fail_starts.load(Ordering::SeqCst),
            recorder: self.recorder.clone(),
        })
    }
}

/// A started pool over a mock runtime and a temporary directory.
pub struct TestPool {
    pub pool: Pool,
    pub runtime: Arc<MockRuntime>,
    pub events: UnboundedReceiver<Event>,
    pub root: PathBuf,
    _tempdir: tempfile::TempDir,
}

pub async fn started_pool(
    mem_total: u64,
    ncpu: u32,
    disk: u64,
    keepalive_secs: u64,
) -> TestPool {
    started_pool_with_features(mem_total, ncpu, &[], disk, keepalive_secs).await
}

pub async fn started_pool_with_features(
    mem_total: u64,
    ncpu: u32,
    cpu_features: &[&str],
    disk: u64,
    keepalive_secs: u64,
) -> TestPool {
    tideway_pool::util::telemetry::init_tracing();
    let tempdir = tempfile::tempdir().unwrap();
    let root = tempdir.path().join("pool");
    let (runtime, events) = MockRuntime::new(mem_total, ncpu, cpu_features, disk);
    let config =
        PoolConfig::new(&root).with_keepalive_interval_secs(keepalive_secs);
    let pool = PoolBuilder::new(config)
        .with_runtime(runtime.clone())
        .build()
        .unwrap();
    pool.start().await.unwrap();
    TestPool {
        pool,
        runtime,
        events,
        root,
        _tempdir: tempdir,
    }
}

pub fn res(pairs: &[(&str, f64)]) -> Resources {
    pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
}

/// Reads the persisted roster back from `state.json`.
pub fn read_state(root: &Path) -> HashMap<String, Resources> {
    let file = std::fs::File::open(root.join("state.json")).unwrap();
    serde_json::from_reader(file).unwrap()
}

/// Waits for `n` kill events, returning the killed ids in order.
pub async fn wait_kills(rx: &mut UnboundedReceiver<Event>, n: usize) -> Vec<String> {
    let mut kills = Vec::new();
    while kills.len() < n {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(Event::Kill(id))) => kills.push(id),
            Ok(Some(Event::Start(_))) => {}
            Ok(None) => panic!("event channel closed"),
            Err(_) => panic!("timed out waiting for {n} kills, got {kills:?}"),
        }
    }
    kills
}
