use criterion::{Criterion, black_box, criterion_group, criterion_main};
use respool::{FnFactory, PoolConfiguration, ResourcePool};
use std::sync::Arc;
use std::thread;

fn bench_single_thread(c: &mut Criterion) {
    let factory = FnFactory::new(|| Ok::<_, String>(vec![0u8; 1024]));
    let factory = factory.with_reset(|buf: &mut Vec<u8>| {
        buf.clear();
        Ok(())
    });
    let pool = ResourcePool::new(PoolConfiguration::new().with_capacity(16), factory).unwrap();

    c.bench_function("acquire_release", |b| {
        b.iter(|| {
            let res = pool.acquire().unwrap();
            black_box(res.len());
        })
    });

    let untracked = ResourcePool::new(
        PoolConfiguration::new().with_capacity(16).with_tracking(false),
        FnFactory::new(|| Ok::<_, String>(0u64)),
    )
    .unwrap();

    c.bench_function("acquire_release_untracked", |b| {
        b.iter(|| {
            let res = untracked.acquire().unwrap();
            black_box(*res);
        })
    });
}

fn bench_contended(c: &mut Criterion) {
    let config = PoolConfiguration::new()
        .with_capacity(4)
        .with_wait_timeout(std::time::Duration::from_secs(5));
    let factory = FnFactory::new(|| Ok::<_, String>(0u64));
    let pool = Arc::new(ResourcePool::new(config, factory).unwrap());

    c.bench_function("contended_8_threads", |b| {
        b.iter(|| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    let pool = Arc::clone(&pool);
                    thread::spawn(move || {
                        for _ in 0..100 {
                            let mut res = pool.acquire().unwrap();
                            *res += 1;
                        }
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }
        })
    });
}

criterion_group!(benches, bench_single_thread, bench_contended);
criterion_main!(benches);
