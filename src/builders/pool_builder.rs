//! Builder assembling a pool from configuration and collaborators.

use std::sync::Arc;

use crate::config::PoolConfig;
use crate::core::error::PoolError;
use crate::core::executor::ContainerRuntime;
use crate::core::pool::Pool;
use crate::runtime::{Spawn, TokioSpawner};

/// Builds a [`Pool`] from validated configuration.
///
/// # Example
///
/// ```rust,ignore
/// let pool = PoolBuilder::new(PoolConfig::new("/var/tideway/pool"))
///     .with_runtime(runtime)
///     .build()?;
/// ```
pub struct PoolBuilder {
    config: PoolConfig,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    spawner: Option<Arc<dyn Spawn>>,
}

impl PoolBuilder {
    /// Starts a builder over `config`.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            runtime: None,
            spawner: None,
        }
    }

    /// Sets the container runtime the pool manages capacity for.
    #[must_use]
    pub fn with_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Sets the spawner used for background executor kills. Defaults to
    /// the current tokio runtime.
    #[must_use]
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawn>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Validates the configuration and assembles the pool. The pool is
    /// not started.
    pub fn build(self) -> Result<Pool, PoolError> {
        self.config.validate().map_err(PoolError::Config)?;
        let runtime = self
            .runtime
            .ok_or_else(|| PoolError::Config("container runtime is required".into()))?;
        let spawner = self
            .spawner
            .unwrap_or_else(|| Arc::new(TokioSpawner::current()));
        Ok(Pool::new(self.config, runtime, spawner))
    }
}
