//! Core resource pool implementation

use crate::config::{CreationErrorPolicy, PoolConfiguration};
use crate::errors::{PoolError, PoolResult};
use crate::factory::ResourceFactory;
use crate::metrics::{MetricsTracker, PoolGauges, PoolMetrics};
use crate::wait::WaitQueue;

use crossbeam::queue::ArrayQueue;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Pause between on-demand creation attempts while a swallowed failure waits
const CREATE_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Return path from a lease to the pool that issued it
trait Reclaim<T>: Send + Sync {
    fn reclaim(&self, resource: T, id: usize) -> PoolResult<()>;

    fn forget(&self, id: usize);
}

/// A checked-out resource that returns to its pool when dropped
///
/// Use [`release`](Self::release) (or [`ResourcePool::release`]) to observe
/// reset failures; a plain drop logs them instead.
pub struct PooledResource<T> {
    value: Option<T>,
    id: usize,
    pool_id: u64,
    home: Arc<dyn Reclaim<T>>,
}

impl<T> PooledResource<T> {
    /// Handle identifying this checkout within its pool
    pub fn id(&self) -> usize {
        self.id
    }

    /// Return the resource to the pool it came from
    pub fn release(mut self) -> PoolResult<()> {
        match self.value.take() {
            Some(value) => self.home.reclaim(value, self.id),
            None => Ok(()),
        }
    }

    /// Take the resource out of the pool for good
    ///
    /// The pool stops counting it, which frees a slot for a new resource.
    pub fn detach(mut self) -> T {
        let value = self.value.take().expect("Value already taken");
        self.home.forget(self.id);
        value
    }
}

impl<T> Deref for PooledResource<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.value.as_ref().expect("Value already taken")
    }
}

impl<T> DerefMut for PooledResource<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value.as_mut().expect("Value already taken")
    }
}

impl<T> Drop for PooledResource<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take()
            && let Err(err) = self.home.reclaim(value, self.id)
        {
            tracing::warn!(id = self.id, error = %err, "release on drop failed");
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PooledResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledResource")
            .field("id", &self.id)
            .field("value", &self.value)
            .finish()
    }
}

enum Checkout<T> {
    Idle(T, usize),
    Reserved,
}

struct PoolShared<T, F> {
    pool_id: u64,
    config: PoolConfiguration,
    factory: F,
    idle: ArrayQueue<(T, usize)>,
    live: AtomicUsize,
    in_use: DashMap<usize, ()>,
    next_id: AtomicUsize,
    metrics: MetricsTracker,
    waiters: WaitQueue,
}

impl<T, F> PoolShared<T, F>
where
    T: Send + 'static,
    F: ResourceFactory<T> + 'static,
{
    fn new(config: PoolConfiguration, factory: F) -> PoolResult<Self> {
        config.validate()?;

        Ok(Self {
            pool_id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            idle: ArrayQueue::new(config.capacity),
            config,
            factory,
            live: AtomicUsize::new(0),
            in_use: DashMap::new(),
            next_id: AtomicUsize::new(0),
            metrics: MetricsTracker::new(),
            waiters: WaitQueue::new(),
        })
    }

    /// Claim a slot below the ceiling; the check and the increment are one step
    fn try_reserve(&self) -> bool {
        let ceiling = self.config.ceiling();
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < ceiling).then(|| live + 1)
            })
            .is_ok()
    }

    fn try_idle(&self) -> Option<Checkout<T>> {
        self.idle.pop().map(|(resource, id)| Checkout::Idle(resource, id))
    }

    fn try_checkout(&self) -> Option<Checkout<T>> {
        self.try_idle()
            .or_else(|| self.try_reserve().then_some(Checkout::Reserved))
    }

    /// Fill a reserved slot. On failure the slot is handed back.
    fn create(&self) -> PoolResult<(T, usize)> {
        match self.factory.create() {
            Ok(resource) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                MetricsTracker::record(&self.metrics.total_created);
                tracing::debug!(
                    pool = %self.config.name,
                    id,
                    live = self.live.load(Ordering::Relaxed),
                    "resource created"
                );
                Ok((resource, id))
            }
            Err(err) => {
                MetricsTracker::record(&self.metrics.creation_failures);
                self.unreserve();
                Err(PoolError::CreationFailed(err.to_string()))
            }
        }
    }

    /// Hand back a reserved slot that was never filled
    fn unreserve(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        self.waiters.wake_one();
    }

    /// Fill a reserved slot on the blocking thread pool
    ///
    /// If the caller stops waiting, the new resource is parked in the idle
    /// set for the next one.
    async fn create_async(self: &Arc<Self>) -> PoolResult<(T, usize)> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let shared = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            if let Err(Ok((resource, id))) = tx.send(shared.create()) {
                tracing::debug!(pool = %shared.config.name, id, "creation outlived its caller");
                shared.stash(resource, id);
            }
        });

        match rx.await {
            Ok(created) => created,
            // The factory panicked before a result was sent, so the slot is still held
            Err(_) => {
                self.unreserve();
                Err(PoolError::CreationFailed("creation task panicked".to_string()))
            }
        }
    }

    /// Park a counted resource in the idle set
    fn stash(&self, resource: T, id: usize) {
        if let Err((resource, id)) = self.idle.push((resource, id)) {
            self.destroy(resource, id, "idle set full");
        } else {
            self.waiters.wake_one();
        }
    }

    fn warm_one(&self) {
        if !self.try_reserve() {
            return;
        }
        match self.create() {
            Ok((resource, id)) => self.stash(resource, id),
            Err(err) => {
                tracing::warn!(pool = %self.config.name, error = %err, "warm-up creation failed");
            }
        }
    }

    fn lease(self: &Arc<Self>, resource: T, id: usize) -> PooledResource<T> {
        if self.config.track_in_use {
            self.in_use.insert(id, ());
        }
        MetricsTracker::record(&self.metrics.total_acquired);
        tracing::trace!(pool = %self.config.name, id, "resource acquired");

        let home: Arc<dyn Reclaim<T>> = Arc::clone(self) as Arc<dyn Reclaim<T>>;
        PooledResource {
            value: Some(resource),
            id,
            pool_id: self.pool_id,
            home,
        }
    }

    /// Counts one wait per acquisition, however many times it parks
    fn note_wait(&self, waited: &mut bool) {
        if !std::mem::replace(waited, true) {
            MetricsTracker::record(&self.metrics.wait_events);
            tracing::trace!(pool = %self.config.name, "waiting for a released resource");
        }
    }

    fn wait_for<R>(
        &self,
        deadline: Instant,
        waited: &mut bool,
        attempt: impl FnMut() -> Option<R>,
    ) -> Option<R> {
        self.note_wait(waited);
        self.waiters.wait_until(deadline, attempt)
    }

    async fn wait_for_async<R>(
        &self,
        deadline: tokio::time::Instant,
        waited: &mut bool,
        attempt: impl FnMut() -> Option<R>,
    ) -> Option<R> {
        self.note_wait(waited);
        self.waiters.wait_until_async(deadline, attempt).await
    }

    fn unavailable(&self) -> PoolError {
        MetricsTracker::record(&self.metrics.unavailable_events);
        tracing::debug!(
            pool = %self.config.name,
            live = self.live.load(Ordering::Relaxed),
            ceiling = self.config.ceiling(),
            "no resource available"
        );
        PoolError::ResourceUnavailable
    }

    /// Decide what an on-demand creation failure turns into
    fn creation_failed(&self, err: PoolError) -> PoolResult<()> {
        tracing::debug!(pool = %self.config.name, error = %err, "on-demand creation failed");
        match self.config.creation_error_policy {
            CreationErrorPolicy::Surface => Err(err),
            CreationErrorPolicy::Swallow => Ok(()),
        }
    }

    /// Drop a resource whose slot is still counted in `live`
    fn destroy(&self, resource: T, id: usize, reason: &'static str) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        self.retire(resource, id, reason);
    }

    /// Drop a resource whose slot has already been uncounted
    fn retire(&self, resource: T, id: usize, reason: &'static str) {
        drop(resource);
        MetricsTracker::record(&self.metrics.total_destroyed);
        tracing::debug!(
            pool = %self.config.name,
            id,
            reason,
            live = self.live.load(Ordering::Relaxed),
            "resource destroyed"
        );
        self.waiters.wake_one();
    }

    fn in_use_count(&self) -> usize {
        if self.config.track_in_use {
            self.in_use.len()
        } else {
            self.live.load(Ordering::Acquire).saturating_sub(self.idle.len())
        }
    }
}

impl<T, F> Reclaim<T> for PoolShared<T, F>
where
    T: Send + 'static,
    F: ResourceFactory<T> + 'static,
{
    fn reclaim(&self, mut resource: T, id: usize) -> PoolResult<()> {
        if self.config.track_in_use {
            self.in_use.remove(&id);
        }
        tracing::trace!(pool = %self.config.name, id, "releasing resource");

        if let Err(err) = self.factory.reset(&mut resource) {
            MetricsTracker::record(&self.metrics.reset_failures);
            tracing::warn!(pool = %self.config.name, id, error = %err, "resource reset failed");
            self.destroy(resource, id, "reset failed");
            return Err(PoolError::ResetFailed(err.to_string()));
        }

        let capacity = self.config.capacity;
        let over_capacity = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live > capacity).then(|| live - 1)
            })
            .is_ok();

        if over_capacity {
            self.retire(resource, id, "over capacity");
        } else {
            self.stash(resource, id);
        }

        MetricsTracker::record(&self.metrics.total_released);
        Ok(())
    }

    fn forget(&self, id: usize) {
        if self.config.track_in_use {
            self.in_use.remove(&id);
        }
        self.live.fetch_sub(1, Ordering::AcqRel);
        tracing::debug!(pool = %self.config.name, id, "resource detached");
        self.waiters.wake_one();
    }
}

/// Thread-safe pool of factory-created resources
///
/// Cloning the pool is cheap and yields a handle to the same resources.
///
/// # Examples
///
/// ```
/// use respool::{FnFactory, PoolConfiguration, PoolError, ResourcePool};
///
/// let factory = FnFactory::new(|| Ok::<_, String>(String::with_capacity(64)))
///     .with_reset(|s: &mut String| {
///         s.clear();
///         Ok(())
///     });
/// let pool = ResourcePool::new(PoolConfiguration::new().with_capacity(2), factory).unwrap();
///
/// let mut a = pool.acquire().unwrap();
/// a.push_str("hello");
/// let _b = pool.acquire().unwrap();
/// assert_eq!(pool.acquire().unwrap_err(), PoolError::ResourceUnavailable);
///
/// pool.release(a).unwrap();
/// assert!(pool.acquire().unwrap().is_empty());
/// ```
pub struct ResourcePool<T, F> {
    shared: Arc<PoolShared<T, F>>,
}

impl<T, F> ResourcePool<T, F>
where
    T: Send + 'static,
    F: ResourceFactory<T> + 'static,
{
    /// Create a pool, pre-warming it with `capacity` parallel creations
    ///
    /// Creations that fail are dropped, so the pool may start with fewer
    /// live resources than its capacity.
    pub fn new(config: PoolConfiguration, factory: F) -> PoolResult<Self> {
        let shared = Arc::new(PoolShared::new(config, factory)?);

        if shared.config.warmup {
            let capacity = shared.config.capacity;
            crossbeam::thread::scope(|scope| {
                for _ in 0..capacity {
                    scope.spawn(|_| shared.warm_one());
                }
            })
            .map_err(|_| PoolError::CreationFailed("warm-up task panicked".to_string()))?;
        }

        Ok(Self::started(shared))
    }

    /// Create a pool with default settings and the given capacity
    pub fn with_capacity(capacity: usize, factory: F) -> PoolResult<Self> {
        Self::new(PoolConfiguration::new().with_capacity(capacity), factory)
    }

    /// Create a pool from async code, pre-warming on the blocking thread pool
    pub async fn new_async(config: PoolConfiguration, factory: F) -> PoolResult<Self> {
        let shared = Arc::new(PoolShared::new(config, factory)?);

        if shared.config.warmup {
            let mut tasks = tokio::task::JoinSet::new();
            for _ in 0..shared.config.capacity {
                let shared = Arc::clone(&shared);
                tasks.spawn_blocking(move || shared.warm_one());
            }
            while let Some(joined) = tasks.join_next().await {
                joined.map_err(|e| PoolError::CreationFailed(format!("warm-up task failed: {e}")))?;
            }
        }

        Ok(Self::started(shared))
    }

    fn started(shared: Arc<PoolShared<T, F>>) -> Self {
        tracing::info!(
            pool = %shared.config.name,
            capacity = shared.config.capacity,
            overflow = shared.config.overflow,
            live = shared.live.load(Ordering::Relaxed),
            "resource pool ready"
        );
        Self { shared }
    }

    /// Check out a resource
    ///
    /// Takes an idle resource, creates one while below the ceiling, and
    /// otherwise waits up to the configured timeout before failing with
    /// [`PoolError::ResourceUnavailable`]. Blocks the calling thread while
    /// waiting; use [`acquire_async`](Self::acquire_async) from async code.
    ///
    /// Under [`CreationErrorPolicy::Swallow`] a failed creation is retried
    /// until the deadline, taking any resource released in the meantime.
    pub fn acquire(&self) -> PoolResult<PooledResource<T>> {
        let shared = &self.shared;
        let deadline = shared.config.effective_wait().map(|wait| Instant::now() + wait);
        let mut waited = false;

        let mut checkout = shared.try_checkout();
        loop {
            if checkout.is_none()
                && let Some(deadline) = deadline
            {
                checkout = shared.wait_for(deadline, &mut waited, || shared.try_checkout());
            }

            match checkout.take() {
                Some(Checkout::Idle(resource, id)) => return Ok(shared.lease(resource, id)),
                Some(Checkout::Reserved) => match shared.create() {
                    Ok((resource, id)) => return Ok(shared.lease(resource, id)),
                    Err(err) => shared.creation_failed(err)?,
                },
                None => return Err(shared.unavailable()),
            }

            let Some(deadline) = deadline else {
                return Err(shared.unavailable());
            };
            let retry_at = deadline.min(Instant::now() + CREATE_RETRY_DELAY);
            checkout = shared.wait_for(retry_at, &mut waited, || shared.try_idle());
            if checkout.is_none() && Instant::now() >= deadline {
                return Err(shared.unavailable());
            }
        }
    }

    /// Try to check out a resource, discarding the error
    pub fn try_acquire(&self) -> Option<PooledResource<T>> {
        self.acquire().ok()
    }

    /// Check out a resource without blocking the executor while waiting
    ///
    /// New resources are created on the blocking thread pool, so a slow
    /// factory does not stall other tasks. Dropping the future mid-creation
    /// leaves the new resource idle in the pool. Releasing a lease still runs
    /// `reset` on the releasing thread.
    pub async fn acquire_async(&self) -> PoolResult<PooledResource<T>> {
        let shared = &self.shared;
        let deadline = shared
            .config
            .effective_wait()
            .map(|wait| tokio::time::Instant::now() + wait);
        let mut waited = false;

        let mut checkout = shared.try_checkout();
        loop {
            if checkout.is_none()
                && let Some(deadline) = deadline
            {
                checkout = shared
                    .wait_for_async(deadline, &mut waited, || shared.try_checkout())
                    .await;
            }

            match checkout.take() {
                Some(Checkout::Idle(resource, id)) => return Ok(shared.lease(resource, id)),
                Some(Checkout::Reserved) => match shared.create_async().await {
                    Ok((resource, id)) => return Ok(shared.lease(resource, id)),
                    Err(err) => shared.creation_failed(err)?,
                },
                None => return Err(shared.unavailable()),
            }

            let Some(deadline) = deadline else {
                return Err(shared.unavailable());
            };
            let retry_at = deadline.min(tokio::time::Instant::now() + CREATE_RETRY_DELAY);
            checkout = shared
                .wait_for_async(retry_at, &mut waited, || shared.try_idle())
                .await;
            if checkout.is_none() && tokio::time::Instant::now() >= deadline {
                return Err(shared.unavailable());
            }
        }
    }

    /// Return a resource to the pool
    ///
    /// With in-use tracking enabled, a lease that is not checked out from
    /// this pool is rejected with [`PoolError::UnknownResource`] and this
    /// pool is left untouched; the rejected lease then goes back to its own
    /// pool. Use [`try_release`](Self::try_release) to keep it instead. A
    /// reset failure destroys the resource and is reported as
    /// [`PoolError::ResetFailed`].
    pub fn release(&self, resource: PooledResource<T>) -> PoolResult<()> {
        self.try_release(resource)
            .unwrap_or_else(|_rejected| Err(PoolError::UnknownResource))
    }

    /// Return a resource to the pool, handing back a lease this pool does not own
    ///
    /// # Examples
    ///
    /// ```
    /// use respool::{FnFactory, ResourcePool};
    ///
    /// let a = ResourcePool::with_capacity(1, FnFactory::new(|| Ok::<_, String>('a'))).unwrap();
    /// let b = ResourcePool::with_capacity(1, FnFactory::new(|| Ok::<_, String>('b'))).unwrap();
    ///
    /// let lease = a.acquire().unwrap();
    /// let lease = b.try_release(lease).unwrap_err();
    /// assert_eq!(*lease, 'a');
    /// assert!(a.try_release(lease).unwrap().is_ok());
    /// ```
    pub fn try_release(
        &self,
        resource: PooledResource<T>,
    ) -> Result<PoolResult<()>, PooledResource<T>> {
        if self.shared.config.track_in_use && !self.is_in_use(&resource) {
            tracing::warn!(
                pool = %self.shared.config.name,
                id = resource.id,
                "release of a resource not checked out from this pool"
            );
            return Err(resource);
        }
        Ok(resource.release())
    }

    /// Whether `resource` is currently checked out from this pool
    pub fn is_in_use(&self, resource: &PooledResource<T>) -> bool {
        resource.pool_id == self.shared.pool_id
            && (!self.shared.config.track_in_use || self.shared.in_use.contains_key(&resource.id))
    }

    /// Base capacity
    pub fn capacity(&self) -> usize {
        self.shared.config.capacity
    }

    /// Capacity plus overflow allowance
    pub fn ceiling(&self) -> usize {
        self.shared.config.ceiling()
    }

    /// Resources that currently exist, including ones being created
    pub fn live_count(&self) -> usize {
        self.shared.live.load(Ordering::Acquire)
    }

    /// Resources available for checkout
    pub fn idle_count(&self) -> usize {
        self.shared.idle.len()
    }

    /// Resources currently checked out
    pub fn in_use_count(&self) -> usize {
        self.shared.in_use_count()
    }

    pub fn config(&self) -> &PoolConfiguration {
        &self.shared.config
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        let shared = &self.shared;
        shared.metrics.get_metrics(PoolGauges {
            live: shared.live.load(Ordering::Acquire),
            idle: shared.idle.len(),
            in_use: shared.in_use_count(),
            capacity: shared.config.capacity,
            ceiling: shared.config.ceiling(),
        })
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        crate::metrics::MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }
}

impl<T, F> Clone for ResourcePool<T, F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, F> fmt::Debug for ResourcePool<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("name", &self.shared.config.name)
            .field("capacity", &self.shared.config.capacity)
            .field("overflow", &self.shared.config.overflow)
            .field("live", &self.shared.live.load(Ordering::Relaxed))
            .field("idle", &self.shared.idle.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::FnFactory;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn numbered(counter: Arc<AtomicUsize>) -> impl Fn() -> Result<usize, String> + Send + Sync {
        move || Ok(counter.fetch_add(1, Ordering::SeqCst))
    }

    #[test]
    fn test_pool_basic() {
        let created = Arc::new(AtomicUsize::new(0));
        let factory = FnFactory::new(numbered(Arc::clone(&created)));
        let pool = ResourcePool::with_capacity(3, factory).unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 3);
        assert_eq!(pool.live_count(), 3);

        {
            let res = pool.acquire().unwrap();
            assert!(*res < 3);
            assert_eq!(pool.in_use_count(), 1);
        }

        assert_eq!(pool.idle_count(), 3);
        assert_eq!(pool.in_use_count(), 0);
    }

    #[test]
    fn test_lazy_fill_without_warmup() {
        let created = Arc::new(AtomicUsize::new(0));
        let config = PoolConfiguration::new().with_capacity(2).with_warmup(false);
        let factory = FnFactory::new(numbered(Arc::clone(&created)));
        let pool = ResourcePool::new(config, factory).unwrap();

        assert_eq!(pool.live_count(), 0);
        let _a = pool.acquire().unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.live_count(), 1);
    }

    #[test]
    fn test_detach_frees_slot() {
        let pool = ResourcePool::with_capacity(1, FnFactory::new(|| Ok::<_, String>(7))).unwrap();

        let res = pool.acquire().unwrap();
        assert_eq!(res.detach(), 7);
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.in_use_count(), 0);

        // The slot is free again, so a fresh resource is created
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_untracked_pool_counts_in_use_from_live() {
        let config = PoolConfiguration::new().with_capacity(2).with_tracking(false);
        let pool = ResourcePool::new(config, FnFactory::new(|| Ok::<_, String>(()))).unwrap();

        let _a = pool.acquire().unwrap();
        assert_eq!(pool.in_use_count(), 1);
        assert!(pool.shared.in_use.is_empty());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let factory = FnFactory::new(|| Ok::<_, String>(()));
        let err = ResourcePool::with_capacity(0, factory).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_async_acquire() {
        let config = PoolConfiguration::new()
            .with_capacity(2)
            .with_wait_timeout(Duration::from_millis(50));
        let pool = ResourcePool::new_async(config, FnFactory::new(|| Ok::<_, String>(1u8)))
            .await
            .unwrap();

        assert_eq!(pool.live_count(), 2);
        let res = pool.acquire_async().await.unwrap();
        assert_eq!(*res, 1);
    }
}
