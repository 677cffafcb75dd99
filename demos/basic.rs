//! Basic usage examples for ResourcePool

use respool::{FnFactory, PoolConfiguration, PoolError, ResourceFactory, ResourcePool};

/// Stand-in for an expensive connection
#[derive(Debug)]
struct Connection {
    id: usize,
    statements_run: usize,
}

struct ConnectionFactory {
    next_id: std::sync::atomic::AtomicUsize,
}

impl ResourceFactory<Connection> for ConnectionFactory {
    type Error = String;

    fn create(&self) -> Result<Connection, String> {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        println!("   Opening connection {}", id);
        Ok(Connection { id, statements_run: 0 })
    }

    fn reset(&self, conn: &mut Connection) -> Result<(), String> {
        conn.statements_run = 0;
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== respool - Basic Examples ===\n");

    // Example 1: Trait-based factory
    trait_factory();

    // Example 2: Closure factory
    closure_factory();

    // Example 3: Exhaustion and explicit release
    exhaustion();

    // Example 4: Metrics
    metrics();
}

fn trait_factory() {
    println!("1. Trait-based Factory:");
    let factory = ConnectionFactory {
        next_id: Default::default(),
    };
    let pool = ResourcePool::new(PoolConfiguration::new().with_name("db").with_capacity(3), factory)
        .expect("valid configuration");

    {
        let mut conn = pool.acquire().unwrap();
        conn.statements_run += 1;
        println!("   Got connection {}", conn.id);
        // Connection is reset and returned when dropped
    }

    println!("   Idle after return: {}\n", pool.idle_count());
}

fn closure_factory() {
    println!("2. Closure Factory:");
    let factory = FnFactory::new(|| Ok::<_, String>(Vec::<u8>::with_capacity(4096)))
        .with_reset(|buf: &mut Vec<u8>| {
            buf.clear();
            Ok(())
        });
    let pool = ResourcePool::with_capacity(2, factory).unwrap();

    let mut buf = pool.acquire().unwrap();
    buf.extend_from_slice(b"hello");
    println!("   Buffer holds {} bytes", buf.len());
    pool.release(buf).unwrap();

    let buf = pool.acquire().unwrap();
    println!("   Reused buffer holds {} bytes\n", buf.len());
}

fn exhaustion() {
    println!("3. Exhaustion:");
    let pool = ResourcePool::with_capacity(1, FnFactory::new(|| Ok::<_, String>(42))).unwrap();

    let first = pool.acquire().unwrap();
    match pool.acquire() {
        Err(PoolError::ResourceUnavailable) => println!("   Second acquire: unavailable"),
        other => println!("   Second acquire: {:?}", other.map(|r| *r)),
    }

    pool.release(first).unwrap();
    println!("   After release: {}\n", pool.try_acquire().is_some());
}

fn metrics() {
    println!("4. Metrics:");
    let pool = ResourcePool::with_capacity(4, FnFactory::new(|| Ok::<_, String>(0u64))).unwrap();

    {
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
    }

    let mut metrics: Vec<_> = pool.export_metrics().into_iter().collect();
    metrics.sort();
    for (key, value) in metrics {
        println!("     {}: {}", key, value);
    }
}
