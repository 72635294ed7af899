use crate::api::v1::PvPool;
use crate::util::errors::Error;
use kube::ResourceExt;
use prometheus::{histogram_opts, opts, HistogramVec, IntCounter, IntCounterVec, Registry};
use tokio::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    pub reconciliations: IntCounter,
    pub failures: IntCounterVec,
    pub reconcile_duration: HistogramVec,
    pub decommissions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let reconcile_duration = HistogramVec::new(
            histogram_opts!(
                "pvpool_reconcile_duration_seconds",
                "The duration of reconcile to complete in seconds",
            )
            .buckets(vec![0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60.]),
            &["instance"],
        )?;
        let failures = IntCounterVec::new(
            opts!("pvpool_reconciliation_errors_total", "reconciliation errors",),
            &["instance", "error"],
        )?;
        let reconciliations = IntCounter::new("pvpool_reconciliations_total", "reconciliations")?;
        let decommissions = IntCounterVec::new(
            opts!(
                "pvpool_decommissions_total",
                "decommission requests sent to storage agents",
            ),
            &["pool"],
        )?;
        Ok(Metrics {
            reconciliations,
            failures,
            reconcile_duration,
            decommissions,
        })
    }

    /// Register API metrics to start tracking them.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.reconcile_duration.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.reconciliations.clone()))?;
        registry.register(Box::new(self.decommissions.clone()))?;
        Ok(self)
    }

    pub fn reconcile_failure(&self, pool: &PvPool, e: &Error) {
        self.failures
            .with_label_values(&[pool.name_any().as_ref(), e.metric_label().as_ref()])
            .inc()
    }

    pub fn decommissioned(&self, pool: &PvPool, count: usize) {
        self.decommissions
            .with_label_values(&[pool.name_any().as_str()])
            .inc_by(count as u64)
    }

    pub fn count_and_measure(&self, controller: &str) -> ReconcileMeasurer {
        self.reconciliations.inc();
        ReconcileMeasurer {
            start: Instant::now(),
            metric: self.reconcile_duration.clone(),
            instance: controller.to_string(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct ReconcileMeasurer {
    start: Instant,
    metric: HistogramVec,
    instance: String,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric
            .with_label_values(&[self.instance.as_str()])
            .observe(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_once_per_registry() {
        let registry = Registry::new();
        let metrics = Metrics::new().unwrap().register(&registry).unwrap();
        {
            let _timer = metrics.count_and_measure("pvpool");
        }
        assert_eq!(metrics.reconciliations.get(), 1);
        assert!(Metrics::new().unwrap().register(&registry).is_err());
    }
}
