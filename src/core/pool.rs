//! Pool manager: offers, admission, reclamation, and recovery.
//!
//! The pool must run on the same machine as the container daemon since it
//! performs local filesystem operations that are reflected inside the
//! containers it hosts. A single coarse mutex guards the roster; disk and
//! daemon I/O during admission runs under it so that a successful accept
//! is durable before the caller observes it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;

use crate::config::PoolConfig;
use crate::core::alloc::{Alloc, AllocMeta};
use crate::core::error::PoolError;
use crate::core::executor::{ContainerRuntime, ExecutorSpec};
use crate::core::resources::{Resources, CPU, DISK, MEM};
use crate::core::state::{list_alloc_dirs, StateStore};
use crate::runtime::Spawn;
use crate::util::ids::random_id;

/// The pool id. There is exactly one local pool per host.
pub const POOL_ID: &str = "local";
/// The fixed id of the pool's single offer.
pub const OFFER_ID: &str = "1";

const MEM_HEADROOM: f64 = 0.95;

struct PoolState {
    resources: Resources,
    allocs: HashMap<String, Arc<Alloc>>,
    stopped: bool,
}

pub(crate) struct PoolShared {
    cfg: PoolConfig,
    runtime: Arc<dyn ContainerRuntime>,
    spawner: Arc<dyn Spawn>,
    store: StateStore,
    state: Mutex<PoolState>,
}

/// The local resource pool: tracks allocs, advertises free capacity, and
/// admits new allocs against it, reclaiming expired ones as needed.
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<PoolShared>,
}

/// A snapshot advertisement of currently-free capacity. An offer is not
/// persisted and is only valid until the next admission; accepting a
/// stale offer revalidates capacity and may fail with
/// [`PoolError::OfferExpired`].
pub struct Offer {
    pool: Pool,
    id: &'static str,
    available: Resources,
}

impl std::fmt::Debug for Offer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Offer")
            .field("id", &self.id)
            .field("available", &self.available)
            .finish()
    }
}

impl Offer {
    /// The offer id, always `"1"` for the local pool.
    pub fn id(&self) -> &str {
        self.id
    }

    /// The pool that made this offer.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// The free capacity the offer advertises.
    pub fn available(&self) -> &Resources {
        &self.available
    }

    /// Accepts the offer, admitting a new alloc for `meta.want`.
    pub async fn accept(&self, meta: AllocMeta) -> Result<Arc<Alloc>, PoolError> {
        self.pool.new_alloc(meta).await
    }
}

/// An on-disk alloc directory with no live alloc behind it. Zombies are
/// surfaced by lookups so metadata and logs remain retrievable after an
/// alloc has been freed or reclaimed.
#[derive(Debug)]
pub struct Zombie {
    id: String,
    store: StateStore,
}

impl Zombie {
    /// The dead alloc's id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The dead alloc's directory.
    pub fn dir(&self) -> std::path::PathBuf {
        self.store.alloc_dir(&self.id)
    }

    /// Reads the metadata left behind on disk.
    pub fn meta(&self) -> Result<AllocMeta, PoolError> {
        self.store.load_meta(&self.id)
    }
}

/// Result of an alloc lookup: a live roster member or a zombie.
#[derive(Debug)]
pub enum AllocHandle {
    /// The alloc is registered in the pool.
    Live(Arc<Alloc>),
    /// Only the on-disk directory remains.
    Zombie(Zombie),
}

impl AllocHandle {
    /// The id of the underlying alloc.
    pub fn id(&self) -> &str {
        match self {
            Self::Live(alloc) => alloc.id(),
            Self::Zombie(zombie) => zombie.id(),
        }
    }
}

impl Pool {
    /// Creates an unstarted pool over the given collaborators.
    pub fn new(
        cfg: PoolConfig,
        runtime: Arc<dyn ContainerRuntime>,
        spawner: Arc<dyn Spawn>,
    ) -> Self {
        let store = StateStore::new(&cfg.prefix, &cfg.dir);
        Self {
            shared: Arc::new(PoolShared {
                cfg,
                runtime,
                spawner,
                store,
                state: Mutex::new(PoolState {
                    resources: Resources::default(),
                    allocs: HashMap::new(),
                    stopped: false,
                }),
            }),
        }
    }

    /// The pool id. Always `"local"`.
    pub fn id(&self) -> &'static str {
        POOL_ID
    }

    fn make_alloc(&self, id: &str, lease: Duration) -> Arc<Alloc> {
        let shared = &self.shared;
        let dir = shared.store.alloc_dir(id);
        let executor = shared.runtime.executor(ExecutorSpec {
            id: id.to_string(),
            dir: dir.clone(),
            hard_mem_limit: shared.cfg.hard_mem_limit,
        });
        Alloc::new(
            id.to_string(),
            dir,
            Arc::downgrade(shared),
            executor,
            lease,
        )
    }

    /// Starts the pool: detects host capacity, restores the previous
    /// state snapshot if one exists, and collects zombie allocs.
    pub async fn start(&self) -> Result<(), PoolError> {
        let shared = &self.shared;
        let info = shared.runtime.host_info().await?;
        let mut state = shared.state.lock().await;

        let mut resources = Resources::default();
        resources.set(MEM, (info.mem_total as f64 * MEM_HEADROOM).floor());
        resources.set(CPU, f64::from(info.ncpu));
        for feature in &info.cpu_features {
            // One feature unit per CPU.
            resources.set(feature.clone(), f64::from(info.ncpu));
        }
        state.resources = resources;
        shared.store.ensure_layout()?;
        shared.detect_disk(&mut state).await;

        let mut roster = shared.store.load()?;
        state.allocs.clear();
        let mut orphans = Vec::new();
        for id in list_alloc_dirs(&shared.store.allocs_dir())? {
            let alloc = self.make_alloc(&id, Duration::ZERO);
            match alloc.restore(&shared.store) {
                Ok(()) => {}
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
            if roster.remove(&id).is_some() {
                alloc.start().await?;
                state.allocs.insert(id, alloc);
            } else {
                tracing::info!(%id, "collecting orphaned alloc");
                orphans.push(alloc);
            }
        }
        for id in roster.keys() {
            tracing::warn!(%id, "alloc in state snapshot has no directory");
        }
        drop(state);

        for alloc in orphans {
            shared.spawner.spawn(Box::pin(async move {
                if let Err(err) = alloc.kill().await {
                    tracing::error!(id = %alloc.id(), %err, "error killing orphaned alloc");
                }
            }));
        }
        Ok(())
    }

    /// The pool's total resources. Disk capacity is re-statted on every
    /// call; memory, CPU count, and feature flags are detected once at
    /// start.
    pub async fn resources(&self) -> Resources {
        let mut state = self.shared.state.lock().await;
        self.shared.detect_disk(&mut state).await;
        state.resources.clone()
    }

    /// Currently free resources: the total less what is reserved by
    /// non-expired allocs.
    pub async fn available(&self) -> Resources {
        let mut state = self.shared.state.lock().await;
        self.shared.detect_disk(&mut state).await;
        Self::free_of(&state)
    }

    fn free_of(state: &PoolState) -> Resources {
        let mut reserved = Resources::default();
        for alloc in state.allocs.values() {
            if !alloc.expired() {
                reserved = reserved.add(&alloc.resources());
            }
        }
        state.resources.sub(&reserved)
    }

    /// Enumerates the pool's current offers: none when the pool is
    /// stopped or any of memory, CPU, or disk is exhausted, otherwise a
    /// single offer comprising the entirety of free resources.
    pub async fn offers(&self) -> Vec<Offer> {
        let mut state = self.shared.state.lock().await;
        if state.stopped {
            return Vec::new();
        }
        self.shared.detect_disk(&mut state).await;
        let available = Self::free_of(&state);
        if available.get(MEM) == 0.0 || available.get(CPU) == 0.0 || available.get(DISK) == 0.0 {
            return Vec::new();
        }
        vec![Offer {
            pool: self.clone(),
            id: OFFER_ID,
            available,
        }]
    }

    /// Looks up an offer by id.
    pub async fn offer(&self, id: &str) -> Result<Offer, PoolError> {
        let mut offers = self.offers().await;
        if offers.is_empty() || id != OFFER_ID {
            return Err(PoolError::NotExist {
                kind: "offer",
                id: id.to_string(),
            });
        }
        Ok(offers.remove(0))
    }

    /// Looks up an alloc by id: the live alloc when registered, a zombie
    /// when only its directory remains.
    pub async fn alloc(&self, id: &str) -> Result<AllocHandle, PoolError> {
        let state = self.shared.state.lock().await;
        if let Some(alloc) = state.allocs.get(id) {
            return Ok(AllocHandle::Live(alloc.clone()));
        }
        drop(state);
        if self.shared.store.alloc_dir_exists(id) {
            return Ok(AllocHandle::Zombie(Zombie {
                id: id.to_string(),
                store: self.shared.store.clone(),
            }));
        }
        Err(PoolError::NotExist {
            kind: "alloc",
            id: id.to_string(),
        })
    }

    /// A snapshot of the active allocs.
    pub async fn allocs(&self) -> Vec<Arc<Alloc>> {
        let state = self.shared.state.lock().await;
        state.allocs.values().cloned().collect()
    }

    /// Stops the pool if every alloc has been expired for at least `d`,
    /// returning `(true, 0)`. Otherwise returns `(false, wait)` where
    /// `wait` is how long until the pool could become that idle. Further
    /// keepalives can push idleness out again before then. Once stopped,
    /// the pool makes no offers and admits nothing; stopping is terminal.
    pub async fn stop_if_idle_for(&self, d: Duration) -> (bool, Duration) {
        let mut state = self.shared.state.lock().await;
        let now = SystemTime::now();
        let mut idle = true;
        let mut wait = Duration::ZERO;
        for alloc in state.allocs.values() {
            if alloc.expired() && alloc.expired_by() >= d {
                continue;
            }
            idle = false;
            if let Ok(remaining) = (alloc.expires() + d).duration_since(now) {
                wait = wait.max(remaining);
            }
        }
        if idle {
            state.stopped = true;
            tracing::info!("pool stopped: idle");
            return (true, Duration::ZERO);
        }
        (false, wait)
    }

    /// Admits a new alloc for `meta.want`, reclaiming expired allocs as
    /// needed to make room. Non-expired allocs are never preempted, and
    /// there is no partial admission.
    async fn new_alloc(&self, meta: AllocMeta) -> Result<Arc<Alloc>, PoolError> {
        let shared = &self.shared;
        let mut state = shared.state.lock().await;
        if state.stopped {
            return Err(PoolError::ShuttingDown);
        }
        shared.detect_disk(&mut state).await;

        let total = state.resources.clone();
        let mut used = Resources::default();
        let mut expired = Vec::new();
        for alloc in state.allocs.values() {
            used = used.add(&alloc.resources());
            if alloc.expired() {
                expired.push(alloc.clone());
            }
        }
        tracing::info!(%total, %used, want = %meta.want, "admission");

        // Most-overdue first: the longest-dead alloc's container is the
        // most likely to have already exited.
        let mut collect = Vec::new();
        let mut free = total.sub(&used);
        while !free.available(&meta.want) && !expired.is_empty() {
            let mut overdue = 0;
            for i in 1..expired.len() {
                if expired[i].expired_by() > expired[overdue].expired_by() {
                    overdue = i;
                }
            }
            let alloc = expired.swap_remove(overdue);
            used = used.sub(&alloc.resources());
            free = total.sub(&used);
            collect.push(alloc);
        }
        if !free.available(&meta.want) {
            return Err(PoolError::OfferExpired);
        }
        for alloc in &collect {
            state.allocs.remove(alloc.id());
        }

        let id = random_id();
        let alloc = self.make_alloc(&id, shared.cfg.keepalive_interval());
        let configured = match alloc.configure(meta, &shared.store) {
            Ok(()) => alloc.start().await,
            Err(err) => Err(err),
        };
        if let Err(err) = configured {
            for alloc in collect {
                state.allocs.insert(alloc.id().to_string(), alloc);
            }
            return Err(err);
        }

        state.allocs.insert(id.clone(), alloc.clone());
        if let Err(err) = shared.store.save(&PoolShared::roster(&state)) {
            state.allocs.remove(&id);
            for alloc in collect {
                state.allocs.insert(alloc.id().to_string(), alloc);
            }
            drop(state);
            if let Err(kill_err) = alloc.kill().await {
                tracing::error!(id = %alloc.id(), %kill_err, "error killing alloc");
            }
            return Err(err);
        }
        drop(state);

        if !collect.is_empty() {
            shared.spawner.spawn(Box::pin(async move {
                for alloc in collect {
                    tracing::info!(id = %alloc.id(), "reclaiming alloc");
                    if let Err(err) = alloc.kill().await {
                        tracing::error!(id = %alloc.id(), %err, "error killing reclaimed alloc");
                    }
                }
            }));
        }
        Ok(alloc)
    }
}

impl PoolShared {
    fn roster(state: &PoolState) -> HashMap<String, Resources> {
        state
            .allocs
            .iter()
            .map(|(id, alloc)| (id.clone(), alloc.resources()))
            .collect()
    }

    async fn detect_disk(&self, state: &mut PoolState) {
        let root = self.store.root();
        match self.runtime.disk_capacity(&root).await {
            Ok(total) => state.resources.set(DISK, total as f64),
            Err(err) => {
                let assumed = if state.resources.get(DISK) > 0.0 {
                    state.resources.get(DISK)
                } else {
                    self.cfg.default_disk_bytes
                };
                tracing::warn!(root = %root.display(), %err, assumed, "disk stat failed");
                state.resources.set(DISK, assumed);
            }
        }
    }

    /// Deregisters `alloc`, persisting the roster before acknowledging.
    /// Freeing an alloc that is no longer registered is a no-op.
    pub(crate) async fn deregister(&self, alloc: &Alloc) -> Result<(), PoolError> {
        let mut state = self.state.lock().await;
        let registered = match state.allocs.get(alloc.id()) {
            Some(current) if std::ptr::eq(Arc::as_ptr(current), alloc) => current.clone(),
            _ => return Ok(()),
        };
        state.allocs.remove(alloc.id());
        if let Err(err) = self.store.save(&Self::roster(&state)) {
            state.allocs.insert(alloc.id().to_string(), registered);
            return Err(err);
        }
        Ok(())
    }

    /// Whether `alloc` is the alloc currently registered under its id.
    /// Identity, not equality: a different alloc minted under the same id
    /// does not count.
    pub(crate) async fn alive(&self, alloc: &Alloc) -> bool {
        let state = self.state.lock().await;
        state
            .allocs
            .get(alloc.id())
            .map(|current| std::ptr::eq(Arc::as_ptr(current), alloc))
            .unwrap_or(false)
    }
}
