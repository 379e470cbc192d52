//! Local host observation and the host-backed runtime adapter.
//!
//! [`HostRuntime`] implements [`ContainerRuntime`] for the machine the
//! pool runs on: host facts come straight from procfs and statvfs, while
//! executor construction is delegated to an injected factory, since
//! running the containerized work itself belongs to the daemon
//! integration.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::PoolError;
use crate::core::executor::{ContainerRuntime, Executor, ExecutorSpec, HostInfo};

/// Builds the executor bound to an alloc directory.
pub type ExecutorFactory = Box<dyn Fn(ExecutorSpec) -> Arc<dyn Executor> + Send + Sync>;

/// A container runtime backed by direct host observation.
pub struct HostRuntime {
    executors: ExecutorFactory,
}

impl HostRuntime {
    /// Creates a runtime that observes this host and builds executors
    /// through `executors`.
    pub fn new(executors: ExecutorFactory) -> Self {
        Self { executors }
    }
}

#[async_trait]
impl ContainerRuntime for HostRuntime {
    async fn host_info(&self) -> Result<HostInfo, PoolError> {
        host_info()
    }

    async fn disk_capacity(&self, path: &Path) -> Result<u64, PoolError> {
        disk_capacity(path)
    }

    fn executor(&self, spec: ExecutorSpec) -> Arc<dyn Executor> {
        (self.executors)(spec)
    }
}

/// Observes the local host's memory, CPU count, and CPU feature flags.
pub fn host_info() -> Result<HostInfo, PoolError> {
    Ok(HostInfo {
        mem_total: mem_total()?,
        ncpu: num_cpus::get() as u32,
        cpu_features: cpu_features()?,
    })
}

/// Total capacity in bytes of the filesystem holding `path`.
#[cfg(unix)]
pub fn disk_capacity(path: &Path) -> Result<u64, PoolError> {
    let stat = nix::sys::statvfs::statvfs(path)
        .map_err(|err| PoolError::Runtime(format!("statvfs {}: {err}", path.display())))?;
    Ok(stat.blocks() as u64 * stat.fragment_size() as u64)
}

/// Total capacity in bytes of the filesystem holding `path`.
#[cfg(not(unix))]
pub fn disk_capacity(path: &Path) -> Result<u64, PoolError> {
    let _ = path;
    Err(PoolError::Runtime("disk stat unsupported on this platform".into()))
}

#[cfg(target_os = "linux")]
fn mem_total() -> Result<u64, PoolError> {
    let text = std::fs::read_to_string("/proc/meminfo")?;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kb: u64 = rest
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .parse()
                .map_err(|err| PoolError::Runtime(format!("parse MemTotal: {err}")))?;
            return Ok(kb * 1024);
        }
    }
    Err(PoolError::Runtime("MemTotal not reported".into()))
}

#[cfg(not(target_os = "linux"))]
fn mem_total() -> Result<u64, PoolError> {
    Err(PoolError::Runtime("memory detection unsupported on this platform".into()))
}

#[cfg(target_os = "linux")]
fn cpu_features() -> Result<Vec<String>, PoolError> {
    let text = std::fs::read_to_string("/proc/cpuinfo")?;
    for line in text.lines() {
        if line.starts_with("flags") {
            if let Some((_, flags)) = line.split_once(':') {
                return Ok(flags.split_whitespace().map(str::to_string).collect());
            }
        }
    }
    Ok(Vec::new())
}

#[cfg(not(target_os = "linux"))]
fn cpu_features() -> Result<Vec<String>, PoolError> {
    Ok(Vec::new())
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    struct NullExecutor;

    #[async_trait]
    impl Executor for NullExecutor {
        async fn start(&self, _name: &str) -> Result<(), PoolError> {
            Ok(())
        }

        async fn kill(&self) -> Result<(), PoolError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_host_runtime_observes_host() {
        let runtime =
            HostRuntime::new(Box::new(|_spec| Arc::new(NullExecutor) as Arc<dyn Executor>));
        let info = runtime.host_info().await.unwrap();
        assert!(info.mem_total > 0);
        assert!(info.ncpu > 0);
        assert!(runtime.disk_capacity(Path::new("/")).await.unwrap() > 0);

        let executor = runtime.executor(ExecutorSpec {
            id: "a1b2c3d4e5f60718".into(),
            dir: "/tmp/a1b2c3d4e5f60718".into(),
            hard_mem_limit: false,
        });
        executor.start("probe").await.unwrap();
        executor.kill().await.unwrap();
    }
}
