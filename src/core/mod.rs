//! Core pool abstractions: resource arithmetic, alloc lifecycle, admission.

pub mod alloc;
pub mod error;
pub mod executor;
pub mod pool;
pub mod requirements;
pub mod resources;
pub mod state;

pub use alloc::{Alloc, AllocInspect, AllocMeta, MAX_KEEPALIVE_INTERVAL};
pub use error::{AppResult, PoolError};
pub use executor::{ContainerRuntime, Executor, ExecutorSpec, HostInfo};
pub use pool::{AllocHandle, Offer, Pool, Zombie, OFFER_ID, POOL_ID};
pub use requirements::Requirements;
pub use resources::Resources;
pub use state::StateStore;
