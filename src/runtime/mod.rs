//! Runtime adapters: task spawning and the host-backed container runtime.

pub mod host;
pub mod tokio_spawner;

pub use host::{ExecutorFactory, HostRuntime};
pub use tokio_spawner::{Spawn, TokioSpawner};
