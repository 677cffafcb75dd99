//! # respool
//!
//! Bounded, thread-safe resource pool for expensive-to-construct values such
//! as connections, buffers or workers.
//!
//! ## Features
//!
//! - Pre-warming: `capacity` resources are created in parallel at construction
//! - Lazy top-up of missing resources on demand, never above the ceiling
//! - Overflow allowance for bursts; overflow resources are not kept idle
//! - Optional bounded wait when the pool is exhausted (blocking or async)
//! - In-use tracking that rejects foreign or stale leases
//! - Reset on return; resources that fail to reset are destroyed
//! - Automatic return of resources via RAII (Drop trait)
//! - Metrics snapshot and Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use respool::{FnFactory, PoolConfiguration, ResourcePool};
//!
//! let factory = FnFactory::new(|| Ok::<_, String>(Vec::<u8>::with_capacity(1024)))
//!     .with_reset(|buf: &mut Vec<u8>| {
//!         buf.clear();
//!         Ok(())
//!     });
//!
//! let pool = ResourcePool::new(PoolConfiguration::new().with_capacity(4), factory).unwrap();
//! {
//!     let mut buf = pool.acquire().unwrap();
//!     buf.extend_from_slice(b"payload");
//!     // Resource is reset and returned when `buf` goes out of scope
//! }
//! assert_eq!(pool.idle_count(), 4);
//! ```

mod config;
mod errors;
mod factory;
mod metrics;
mod pool;
mod wait;

pub use config::{CreationErrorPolicy, PoolConfiguration};
pub use errors::{PoolError, PoolResult};
pub use factory::{FnFactory, ResourceFactory};
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use pool::{PooledResource, ResourcePool};
