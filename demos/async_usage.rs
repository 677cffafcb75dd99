//! Async usage examples

use respool::{FnFactory, PoolConfiguration, ResourcePool};
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    println!("=== respool - Async Examples ===\n");

    // Example 1: Async construction and acquire
    async_acquire().await;

    // Example 2: Waiting with a timeout
    async_with_timeout().await;

    // Example 3: Concurrent access
    concurrent_access().await;
}

async fn async_acquire() {
    println!("1. Async Acquire:");
    let pool = ResourcePool::new_async(
        PoolConfiguration::new().with_capacity(3),
        FnFactory::new(|| Ok::<_, String>(String::from("session"))),
    )
    .await
    .unwrap();

    {
        let res = pool.acquire_async().await.unwrap();
        println!("   Got resource asynchronously: {}", *res);
    }

    println!();
}

async fn async_with_timeout() {
    println!("2. Async with Timeout:");

    let config = PoolConfiguration::new()
        .with_capacity(1)
        .with_wait_timeout(Duration::from_millis(100));
    let pool = ResourcePool::new(config, FnFactory::new(|| Ok::<_, String>(42))).unwrap();

    // Hold the only resource
    let _res = pool.acquire_async().await.unwrap();

    // Try to get another (should time out)
    match pool.acquire_async().await {
        Ok(_) => println!("   Got resource"),
        Err(e) => println!("   Error: {}", e),
    }

    println!();
}

async fn concurrent_access() {
    println!("3. Concurrent Access:");

    let config = PoolConfiguration::new()
        .with_capacity(3)
        .with_wait_timeout(Duration::from_secs(1));
    let pool = ResourcePool::new(config, FnFactory::new(|| Ok::<_, String>(0usize))).unwrap();

    let mut handles = vec![];

    for i in 0..10 {
        let pool = pool.clone();
        let handle = tokio::spawn(async move {
            match pool.acquire_async().await {
                Ok(mut res) => {
                    *res += 1;
                    println!("   Task {} got resource {} (uses: {})", i, res.id(), *res);
                    sleep(Duration::from_millis(50)).await;
                }
                Err(e) => println!("   Task {} failed: {}", i, e),
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.await.unwrap();
    }

    println!("   Final idle: {}", pool.idle_count());
}
