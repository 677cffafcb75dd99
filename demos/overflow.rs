//! Overflow allowance, reset failures and Prometheus export

use respool::{CreationErrorPolicy, FnFactory, PoolConfiguration, ResourcePool};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== respool - Overflow and Failures ===\n");

    burst();
    reset_failure();
    prometheus_export();
}

fn burst() {
    println!("1. Burst beyond capacity:");
    let config = PoolConfiguration::new()
        .with_name("workers")
        .with_capacity(2)
        .with_overflow(2);
    let pool = ResourcePool::new(config, FnFactory::new(|| Ok::<_, String>(()))).unwrap();

    let held: Vec<_> = (0..4).filter_map(|_| pool.acquire().ok()).collect();
    println!("   Held {} of ceiling {}", held.len(), pool.ceiling());
    println!("   Fifth acquire ok: {}", pool.try_acquire().is_some());

    drop(held);
    println!("   Live after burst: {} (capacity {})\n", pool.live_count(), pool.capacity());
}

fn reset_failure() {
    println!("2. Reset failure:");
    let broken = Arc::new(AtomicBool::new(false));
    let factory = {
        let broken = Arc::clone(&broken);
        FnFactory::new(|| Ok::<_, String>(0u32)).with_reset(move |_: &mut u32| {
            if broken.load(Ordering::Relaxed) {
                Err("socket closed".to_string())
            } else {
                Ok(())
            }
        })
    };
    let config = PoolConfiguration::new()
        .with_capacity(2)
        .with_creation_error_policy(CreationErrorPolicy::Surface);
    let pool = ResourcePool::new(config, factory).unwrap();

    let res = pool.acquire().unwrap();
    broken.store(true, Ordering::Relaxed);
    if let Err(e) = pool.release(res) {
        println!("   Release failed: {}", e);
    }
    println!("   Live after failed reset: {}\n", pool.live_count());
}

fn prometheus_export() {
    println!("3. Prometheus export:");
    let pool = ResourcePool::with_capacity(3, FnFactory::new(|| Ok::<_, String>(0u8))).unwrap();
    let _res = pool.acquire().unwrap();

    let mut tags = HashMap::new();
    tags.insert("service".to_string(), "demo".to_string());

    match pool.export_metrics_prometheus("demo_pool", Some(&tags)) {
        Ok(output) => print!("{}", output),
        Err(e) => println!("   Export failed: {}", e),
    }
}
