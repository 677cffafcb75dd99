//! Async construction and acquisition.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use respool::{FnFactory, PoolConfiguration, PoolError, ResourcePool};
use tokio::time::{Instant, sleep};

fn counting_factory(
    counter: Arc<AtomicUsize>,
) -> FnFactory<usize, String, impl Fn() -> Result<usize, String> + Send + Sync> {
    FnFactory::new(move || Ok(counter.fetch_add(1, Ordering::SeqCst)))
}

#[tokio::test]
async fn new_async_prewarms() {
    let counter = Arc::new(AtomicUsize::new(0));
    let config = PoolConfiguration::new().with_capacity(4);
    let pool = ResourcePool::new_async(config, counting_factory(Arc::clone(&counter)))
        .await
        .unwrap();

    assert_eq!(pool.live_count(), 4);
    assert_eq!(pool.idle_count(), 4);
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn new_async_rejects_zero_capacity() {
    let config = PoolConfiguration::new().with_capacity(0);
    let err = ResourcePool::new_async(config, counting_factory(Arc::new(AtomicUsize::new(0))))
        .await
        .unwrap_err();

    assert!(matches!(err, PoolError::InvalidConfiguration(_)));
}

#[tokio::test]
async fn new_async_fails_when_the_factory_panics() {
    let factory = FnFactory::new(|| -> Result<u32, String> { panic!("driver crashed") });
    let err = ResourcePool::new_async(PoolConfiguration::new().with_capacity(2), factory)
        .await
        .unwrap_err();

    assert!(matches!(err, PoolError::CreationFailed(_)));
}

fn slow_factory(
    delay: Duration,
) -> FnFactory<u8, String, impl Fn() -> Result<u8, String> + Send + Sync> {
    FnFactory::new(move || {
        std::thread::sleep(delay);
        Ok(7)
    })
}

#[tokio::test]
async fn acquire_async_creates_off_the_executor() {
    let config = PoolConfiguration::new().with_capacity(1).with_warmup(false);
    let pool = ResourcePool::new(config, slow_factory(Duration::from_millis(300))).unwrap();

    let start = Instant::now();
    let ticker = async {
        sleep(Duration::from_millis(10)).await;
        start.elapsed()
    };
    let (res, ticked_after) = tokio::join!(pool.acquire_async(), ticker);

    // The single-threaded executor kept running while the factory slept
    assert!(ticked_after < Duration::from_millis(200));
    assert_eq!(*res.unwrap(), 7);
}

#[tokio::test]
async fn abandoned_creation_is_kept_for_the_next_caller() {
    let config = PoolConfiguration::new().with_capacity(1).with_warmup(false);
    let pool = ResourcePool::new(config, slow_factory(Duration::from_millis(100))).unwrap();

    let attempt = tokio::time::timeout(Duration::from_millis(10), pool.acquire_async()).await;
    assert!(attempt.is_err());

    sleep(Duration::from_millis(300)).await;
    assert_eq!(pool.live_count(), 1);
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(*pool.acquire_async().await.unwrap(), 7);
}

#[tokio::test]
async fn acquire_async_is_woken_by_a_release() {
    let config = PoolConfiguration::new()
        .with_capacity(1)
        .with_wait_timeout(Duration::from_secs(5));
    let pool = ResourcePool::new(config, counting_factory(Arc::new(AtomicUsize::new(0)))).unwrap();

    let held = pool.acquire_async().await.unwrap();
    let holder = tokio::spawn(async move {
        sleep(Duration::from_millis(50)).await;
        drop(held);
    });

    let start = Instant::now();
    let res = pool.acquire_async().await.unwrap();
    holder.await.unwrap();

    assert_eq!(*res, 0);
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn acquire_async_times_out() {
    let timeout = Duration::from_millis(80);
    let config = PoolConfiguration::new().with_capacity(1).with_wait_timeout(timeout);
    let pool = ResourcePool::new(config, counting_factory(Arc::new(AtomicUsize::new(0)))).unwrap();

    let _held = pool.acquire_async().await.unwrap();

    let start = Instant::now();
    let err = pool.acquire_async().await.unwrap_err();

    assert_eq!(err, PoolError::ResourceUnavailable);
    assert!(start.elapsed() >= timeout);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_share_a_small_pool() {
    let counter = Arc::new(AtomicUsize::new(0));
    let config = PoolConfiguration::new()
        .with_capacity(2)
        .with_wait_timeout(Duration::from_secs(10));
    let pool = ResourcePool::new_async(config, counting_factory(Arc::clone(&counter)))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let res = pool.acquire_async().await.unwrap();
                sleep(Duration::from_millis(5)).await;
                pool.release(res).unwrap();
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(pool.get_metrics().total_acquired, 16);
    assert_eq!(pool.idle_count(), 2);
}
