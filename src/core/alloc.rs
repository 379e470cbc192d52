//! Alloc lifecycle: metadata, lease clock, keepalive, free.
//!
//! An alloc embeds the executor that does the heavy lifting while the
//! code here deals with lifecycle and resource concerns. The owning pool
//! holds the alloc strongly; the alloc reaches back through a weak
//! reference and validates its lease by re-looking itself up in the
//! pool's roster, so liveness is an identity check, not equality.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::error::PoolError;
use crate::core::executor::Executor;
use crate::core::pool::PoolShared;
use crate::core::resources::Resources;
use crate::core::state::StateStore;

/// Maximum lease any single keepalive can grant. The ceiling keeps a
/// buggy client from holding capacity indefinitely.
pub const MAX_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);

/// Client-provided alloc metadata: the requested resources, a display
/// name used as the executor run name, and an opaque label map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocMeta {
    /// The resources the alloc was granted.
    pub want: Resources,
    /// Display name for the alloc's run.
    #[serde(default)]
    pub name: String,
    /// Opaque labels carried along for bookkeeping.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl AllocMeta {
    /// Creates metadata for a request of `want` under `name`.
    pub fn new(want: Resources, name: impl Into<String>) -> Self {
        Self {
            want,
            name: name.into(),
            labels: HashMap::new(),
        }
    }
}

/// Point-in-time view of an alloc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocInspect {
    /// The alloc id.
    pub id: String,
    /// Resources granted to the alloc.
    pub resources: Resources,
    /// The metadata the alloc was configured with.
    pub meta: AllocMeta,
    /// When the alloc was created.
    pub created: SystemTime,
    /// When the current lease runs out.
    pub expires: SystemTime,
    /// When the last keepalive arrived.
    pub last_keepalive: SystemTime,
}

#[derive(Debug)]
struct AllocState {
    meta: AllocMeta,
    resources: Resources,
    expires: SystemTime,
    last_keepalive: SystemTime,
    freed: bool,
}

/// A time-leased reservation of resources on this host, owning a
/// directory and an executor.
pub struct Alloc {
    id: String,
    dir: PathBuf,
    created: SystemTime,
    pool: Weak<PoolShared>,
    executor: Arc<dyn Executor>,
    state: Mutex<AllocState>,
}

impl std::fmt::Debug for Alloc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alloc")
            .field("id", &self.id)
            .field("dir", &self.dir)
            .field("created", &self.created)
            .field("state", &self.state)
            .finish()
    }
}

impl Alloc {
    pub(crate) fn new(
        id: String,
        dir: PathBuf,
        pool: Weak<PoolShared>,
        executor: Arc<dyn Executor>,
        lease: Duration,
    ) -> Arc<Self> {
        let now = SystemTime::now();
        Arc::new(Self {
            id,
            dir,
            created: now,
            pool,
            executor,
            state: Mutex::new(AllocState {
                meta: AllocMeta::default(),
                resources: Resources::default(),
                expires: now + lease,
                last_keepalive: now,
                freed: false,
            }),
        })
    }

    /// The alloc's id: a random 64-bit hex string.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The alloc's on-disk root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// When the alloc was created.
    pub fn created(&self) -> SystemTime {
        self.created
    }

    /// The resource vector the alloc was granted. Latched at configure
    /// time and never mutated afterwards.
    pub fn resources(&self) -> Resources {
        self.state.lock().resources.clone()
    }

    /// The metadata the alloc was configured with.
    pub fn meta(&self) -> AllocMeta {
        self.state.lock().meta.clone()
    }

    /// When the current lease runs out.
    pub fn expires(&self) -> SystemTime {
        self.state.lock().expires
    }

    /// Whether the lease has run out.
    pub fn expired(&self) -> bool {
        self.expires() < SystemTime::now()
    }

    /// How long ago the lease ran out, zero while it is still current.
    pub fn expired_by(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.expires())
            .unwrap_or_default()
    }

    /// Stores `meta` in the alloc's directory and latches its resources.
    pub(crate) fn configure(&self, meta: AllocMeta, store: &StateStore) -> Result<(), PoolError> {
        {
            let mut state = self.state.lock();
            state.resources = meta.want.clone();
            state.meta = meta;
        }
        store.save_meta(&self.id, &self.meta())
    }

    /// Reads stored metadata back from the alloc's directory.
    pub(crate) fn restore(&self, store: &StateStore) -> Result<(), PoolError> {
        let meta = store.load_meta(&self.id)?;
        let mut state = self.state.lock();
        state.resources = meta.want.clone();
        state.meta = meta;
        Ok(())
    }

    /// Starts the alloc's executor under the configured run name.
    /// Idempotent over restored allocs.
    pub async fn start(&self) -> Result<(), PoolError> {
        let name = self.state.lock().meta.name.clone();
        self.executor.start(&name).await
    }

    pub(crate) async fn kill(&self) -> Result<(), PoolError> {
        self.executor.kill().await
    }

    /// Maintains the alloc's lease. Fails with
    /// [`PoolError::AllocExpired`] when this alloc is no longer the one
    /// registered under its id. The granted duration is `next` clamped to
    /// [`MAX_KEEPALIVE_INTERVAL`]; the lease then runs until now plus the
    /// grant.
    pub async fn keepalive(&self, next: Duration) -> Result<Duration, PoolError> {
        let pool = self
            .pool
            .upgrade()
            .ok_or_else(|| PoolError::AllocExpired(self.id.clone()))?;
        if !pool.alive(self).await {
            return Err(PoolError::AllocExpired(self.id.clone()));
        }
        let granted = next.min(MAX_KEEPALIVE_INTERVAL);
        let expires = {
            let mut state = self.state.lock();
            let now = SystemTime::now();
            state.last_keepalive = now;
            state.expires = now + granted;
            state.expires
        };
        tracing::debug!(id = %self.id, expires = ?expires, "keepalive");
        Ok(granted)
    }

    /// Snapshot of the alloc's status.
    pub fn inspect(&self) -> AllocInspect {
        let state = self.state.lock();
        AllocInspect {
            id: self.id.clone(),
            resources: state.resources.clone(),
            meta: state.meta.clone(),
            created: self.created,
            expires: state.expires,
            last_keepalive: state.last_keepalive,
        }
    }

    /// Relinquishes the alloc from its pool and kills its executor. The
    /// deregistration is persisted before the kill is issued; metadata and
    /// logs stay on disk so they can be examined posthumously. Freeing an
    /// already-freed alloc succeeds without killing again.
    pub async fn free(&self) -> Result<(), PoolError> {
        if let Some(pool) = self.pool.upgrade() {
            pool.deregister(self).await?;
        }
        let first = {
            let mut state = self.state.lock();
            let first = !state.freed;
            state.freed = true;
            first
        };
        if first {
            tracing::info!(id = %self.id, "killing freed alloc");
            if let Err(err) = self.executor.kill().await {
                tracing::error!(id = %self.id, %err, "error killing alloc");
            }
        }
        Ok(())
    }
}
