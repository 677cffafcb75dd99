//! Metrics collection and export for resource pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Point-in-time metrics for a pool
///
/// # Examples
///
/// ```
/// use respool::{FnFactory, PoolConfiguration, ResourcePool};
///
/// let factory = FnFactory::new(|| Ok::<_, String>(0u32));
/// let pool = ResourcePool::new(PoolConfiguration::new().with_capacity(3), factory).unwrap();
///
/// {
///     let _res = pool.acquire().unwrap();
///     let metrics = pool.get_metrics();
///     assert_eq!(metrics.total_acquired, 1);
///     assert_eq!(metrics.in_use_resources, 1);
///     assert_eq!(metrics.live_resources, 3);
/// }
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PoolMetrics {
    /// Successful acquisitions
    pub total_acquired: usize,

    /// Releases that completed without error
    pub total_released: usize,

    /// Resources produced by the factory
    pub total_created: usize,

    /// Factory `create` failures
    pub creation_failures: usize,

    /// Factory `reset` failures
    pub reset_failures: usize,

    /// Resources dropped by the pool
    pub total_destroyed: usize,

    /// Acquisitions that ended in `ResourceUnavailable`
    pub unavailable_events: usize,

    /// Acquisitions that had to wait
    pub wait_events: usize,

    /// Resources currently alive (idle, in use, or being created)
    pub live_resources: usize,

    /// Resources currently idle
    pub idle_resources: usize,

    /// Resources currently checked out
    pub in_use_resources: usize,

    /// Base capacity
    pub capacity: usize,

    /// Capacity plus overflow
    pub ceiling: usize,

    /// In-use ratio against capacity; exceeds 1.0 while overflow is in use
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("creation_failures".to_string(), self.creation_failures.to_string());
        metrics.insert("reset_failures".to_string(), self.reset_failures.to_string());
        metrics.insert("total_destroyed".to_string(), self.total_destroyed.to_string());
        metrics.insert("unavailable_events".to_string(), self.unavailable_events.to_string());
        metrics.insert("wait_events".to_string(), self.wait_events.to_string());
        metrics.insert("live_resources".to_string(), self.live_resources.to_string());
        metrics.insert("idle_resources".to_string(), self.idle_resources.to_string());
        metrics.insert("in_use_resources".to_string(), self.in_use_resources.to_string());
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics.insert("ceiling".to_string(), self.ceiling.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use respool::{FnFactory, PoolConfiguration, ResourcePool};
    /// use std::collections::HashMap;
    ///
    /// let factory = FnFactory::new(|| Ok::<_, String>(0u32));
    /// let pool = ResourcePool::new(PoolConfiguration::new().with_capacity(2), factory).unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("db", Some(&tags)).unwrap();
    /// assert!(output.contains("respool_resources_live"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> crate::PoolResult<String> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let export_err = |e: prometheus::Error| crate::PoolError::MetricsExport(e.to_string());

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }
        let opts = |name: &str, help: &str| Opts::new(name, help).const_labels(labels.clone());

        let registry = Registry::new();

        // Gauge metrics
        let gauges = [
            ("respool_resources_live", "Resources currently alive", metrics.live_resources),
            ("respool_resources_idle", "Resources currently idle", metrics.idle_resources),
            ("respool_resources_in_use", "Resources checked out", metrics.in_use_resources),
            ("respool_capacity", "Base pool capacity", metrics.capacity),
            ("respool_ceiling", "Capacity plus overflow allowance", metrics.ceiling),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(opts(name, help)).map_err(export_err)?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge)).map_err(export_err)?;
        }

        let utilization_opts = opts("respool_utilization", "In-use ratio against capacity");
        let utilization = Gauge::with_opts(utilization_opts).map_err(export_err)?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization)).map_err(export_err)?;

        // Counter metrics
        let counters = [
            ("respool_acquired_total", "Successful acquisitions", metrics.total_acquired),
            ("respool_released_total", "Successful releases", metrics.total_released),
            ("respool_created_total", "Resources created by the factory", metrics.total_created),
            ("respool_creation_failures_total", "Creation failures", metrics.creation_failures),
            ("respool_reset_failures_total", "Factory reset failures", metrics.reset_failures),
            ("respool_destroyed_total", "Resources destroyed by the pool", metrics.total_destroyed),
            ("respool_unavailable_total", "Acquisitions that failed", metrics.unavailable_events),
            ("respool_waits_total", "Acquisitions that waited", metrics.wait_events),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(opts(name, help)).map_err(export_err)?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter)).map_err(export_err)?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(export_err)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::PoolError::MetricsExport(e.to_string()))
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub total_acquired: AtomicUsize,
    pub total_released: AtomicUsize,
    pub total_created: AtomicUsize,
    pub creation_failures: AtomicUsize,
    pub reset_failures: AtomicUsize,
    pub total_destroyed: AtomicUsize,
    pub unavailable_events: AtomicUsize,
    pub wait_events: AtomicUsize,
}

/// Gauge values sampled from the pool alongside the counters
pub(crate) struct PoolGauges {
    pub live: usize,
    pub idle: usize,
    pub in_use: usize,
    pub capacity: usize,
    pub ceiling: usize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, gauges: PoolGauges) -> PoolMetrics {
        let utilization = if gauges.capacity > 0 {
            gauges.in_use as f64 / gauges.capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            creation_failures: self.creation_failures.load(Ordering::Relaxed),
            reset_failures: self.reset_failures.load(Ordering::Relaxed),
            total_destroyed: self.total_destroyed.load(Ordering::Relaxed),
            unavailable_events: self.unavailable_events.load(Ordering::Relaxed),
            wait_events: self.wait_events.load(Ordering::Relaxed),
            live_resources: gauges.live,
            idle_resources: gauges.idle,
            in_use_resources: gauges.in_use,
            capacity: gauges.capacity,
            ceiling: gauges.ceiling,
            utilization,
        }
    }
}
