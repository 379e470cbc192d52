//! Pool configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_keepalive_interval_secs() -> u64 {
    60
}

fn default_disk_bytes() -> f64 {
    2e12
}

/// Configuration for the local pool.
///
/// # Example
///
/// ```rust
/// use tideway_pool::PoolConfig;
///
/// let config = PoolConfig::new("/var/tideway/pool")
///     .with_keepalive_interval_secs(30)
///     .with_hard_mem_limit(true);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Filesystem root of the pool. Everything under this path is owned
    /// and managed by the pool.
    pub dir: PathBuf,

    /// Prepended to paths constructed by allocs. This permits running the
    /// pool manager inside a container whose mounts shift the root.
    #[serde(default)]
    pub prefix: PathBuf,

    /// Initial lease granted to a new alloc before its first keepalive,
    /// in seconds.
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,

    /// Disk capacity assumed, in bytes, when statting the pool root fails
    /// and no earlier measurement exists.
    #[serde(default = "default_disk_bytes")]
    pub default_disk_bytes: f64,

    /// Enforce hard memory limits on executors.
    #[serde(default)]
    pub hard_mem_limit: bool,
}

impl PoolConfig {
    /// Creates a configuration rooted at `dir` with default values.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: PathBuf::new(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            default_disk_bytes: default_disk_bytes(),
            hard_mem_limit: false,
        }
    }

    /// Sets the path prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the initial lease in seconds.
    #[must_use]
    pub fn with_keepalive_interval_secs(mut self, secs: u64) -> Self {
        self.keepalive_interval_secs = secs;
        self
    }

    /// Sets the fallback disk capacity in bytes.
    #[must_use]
    pub fn with_default_disk_bytes(mut self, bytes: f64) -> Self {
        self.default_disk_bytes = bytes;
        self
    }

    /// Sets hard memory limit enforcement.
    #[must_use]
    pub fn with_hard_mem_limit(mut self, hard: bool) -> Self {
        self.hard_mem_limit = hard;
        self
    }

    /// The initial lease as a [`Duration`].
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    /// Validates configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.dir.as_os_str().is_empty() {
            return Err("dir must not be empty".into());
        }
        if self.default_disk_bytes <= 0.0 {
            return Err("default_disk_bytes must be greater than 0".into());
        }
        Ok(())
    }

    /// Parses a configuration from a JSON string and validates it.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = PoolConfig::new("/var/tideway/pool");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.keepalive_interval(), Duration::from_secs(60));
        assert_eq!(cfg.default_disk_bytes, 2e12);
        assert!(!cfg.hard_mem_limit);
    }

    #[test]
    fn test_empty_dir_invalid() {
        assert!(PoolConfig::new("").validate().is_err());
    }

    #[test]
    fn test_from_json_str() {
        let cfg = PoolConfig::from_json_str(r#"{"dir": "/data/pool", "hard_mem_limit": true}"#)
            .expect("valid config");
        assert_eq!(cfg.dir, PathBuf::from("/data/pool"));
        assert!(cfg.hard_mem_limit);
        assert_eq!(cfg.keepalive_interval_secs, 60);
        assert!(PoolConfig::from_json_str(r#"{"dir": ""}"#).is_err());
        assert!(PoolConfig::from_json_str("not json").is_err());
    }
}
