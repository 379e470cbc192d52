//! The container-runtime boundary consumed by the pool.
//!
//! The pool never talks to a container daemon directly. It observes host
//! facts through [`ContainerRuntime`] at startup and hands each alloc an
//! [`Executor`] bound to the alloc's directory; the executor does the
//! heavy lifting of actually running containerized work there.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::PoolError;

/// Host facts observed once at pool startup.
#[derive(Debug, Clone)]
pub struct HostInfo {
    /// Total physical memory in bytes.
    pub mem_total: u64,
    /// Number of CPUs.
    pub ncpu: u32,
    /// CPU hardware-feature flags. Each becomes a pool dimension with
    /// capacity equal to the CPU count, so an alloc requesting one feature
    /// unit reserves one CPU's worth of that feature.
    pub cpu_features: Vec<String>,
}

/// Everything an executor needs to take ownership of an alloc directory.
#[derive(Debug, Clone)]
pub struct ExecutorSpec {
    /// The alloc id the executor serves.
    pub id: String,
    /// The alloc's on-disk root. State under this directory is managed by
    /// the executor.
    pub dir: PathBuf,
    /// Enforce a hard memory limit on the executor's containers.
    pub hard_mem_limit: bool,
}

/// Runs containerized work inside a single alloc.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Starts the executor under the given run name. Idempotent over
    /// restored allocs.
    async fn start(&self, name: &str) -> Result<(), PoolError>;

    /// Kills the executor and everything it is running.
    async fn kill(&self) -> Result<(), PoolError>;
}

/// A container daemon on the same host as the pool.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Queries the daemon for host memory, CPU count, and feature flags.
    async fn host_info(&self) -> Result<HostInfo, PoolError>;

    /// Total capacity in bytes of the filesystem holding `path`.
    async fn disk_capacity(&self, path: &Path) -> Result<u64, PoolError>;

    /// Creates the executor bound to an alloc's directory.
    fn executor(&self, spec: ExecutorSpec) -> Arc<dyn Executor>;
}
