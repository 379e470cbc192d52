//! # Tideway Pool
//!
//! The local resource pool of the Tideway workflow executor. A pool
//! represents the compute capacity of a single host and rents it out as
//! time-leased *allocs* to remote clients, which then run containerized
//! work inside them.
//!
//! The pool surfaces at most one [`Offer`] covering its entire free
//! capacity. Accepting the offer admits a new [`Alloc`], reclaiming
//! expired allocs when the request would not otherwise fit. Each alloc
//! holds a keepalive-refreshed lease; a missed keepalive makes the alloc
//! eligible for reclamation on the next admission.
//!
//! All pool state is kept on disk so a host restart rejoins in-progress
//! work:
//!
//! ```text
//! <prefix>/<dir>/state.json          active allocs and their resources
//! <prefix>/<dir>/allocs/<id>/        alloc root, managed by its executor
//! <prefix>/<dir>/allocs/<id>/meta.json
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use tideway_pool::{AllocMeta, PoolBuilder, PoolConfig, Resources};
//!
//! let pool = PoolBuilder::new(PoolConfig::new("/var/tideway/pool"))
//!     .with_runtime(runtime)
//!     .build()?;
//! pool.start().await?;
//!
//! let offer = pool.offer("1").await?;
//! let mut want = Resources::default();
//! want.set("mem", 2e9);
//! want.set("cpu", 1.0);
//! let alloc = offer.accept(AllocMeta::new(want, "example")).await?;
//! alloc.keepalive(std::time::Duration::from_secs(300)).await?;
//! alloc.free().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builders;
pub mod config;
pub mod core;
pub mod runtime;
pub mod util;

pub use crate::builders::PoolBuilder;
pub use crate::config::PoolConfig;
pub use crate::core::alloc::{Alloc, AllocInspect, AllocMeta, MAX_KEEPALIVE_INTERVAL};
pub use crate::core::error::{AppResult, PoolError};
pub use crate::core::executor::{ContainerRuntime, Executor, ExecutorSpec, HostInfo};
pub use crate::core::pool::{AllocHandle, Offer, Pool, Zombie, OFFER_ID, POOL_ID};
pub use crate::core::requirements::Requirements;
pub use crate::core::resources::Resources;
pub use crate::runtime::{ExecutorFactory, HostRuntime, Spawn, TokioSpawner};
