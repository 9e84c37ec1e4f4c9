use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};

/// Write-path counters. Registered against a caller-supplied registry so
/// several writers (or tests) never collide on process-wide state.
#[derive(Clone)]
pub struct WriterMetrics {
    pub mutations_written: IntCounter,
    pub mutations_rejected: IntCounter,
    pub flush_attempts: IntCounter,
    pub batches_flushed: IntCounter,
    pub flush_duration: Histogram,
}

impl WriterMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self::unregistered()?;
        registry.register(Box::new(metrics.mutations_written.clone()))?;
        registry.register(Box::new(metrics.mutations_rejected.clone()))?;
        registry.register(Box::new(metrics.flush_attempts.clone()))?;
        registry.register(Box::new(metrics.batches_flushed.clone()))?;
        registry.register(Box::new(metrics.flush_duration.clone()))?;
        Ok(metrics)
    }

    /// Metrics that are counted but not exported anywhere.
    pub fn unregistered() -> prometheus::Result<Self> {
        Ok(Self {
            mutations_written: IntCounter::new(
                "tablet_client_mutations_written_total",
                "Mutations acknowledged durable by the store",
            )?,
            mutations_rejected: IntCounter::new(
                "tablet_client_mutations_rejected_total",
                "Mutations refused by the store after all retries",
            )?,
            flush_attempts: IntCounter::new(
                "tablet_client_flush_attempts_total",
                "Batch send attempts, including retries",
            )?,
            batches_flushed: IntCounter::new(
                "tablet_client_batches_flushed_total",
                "Batches flushed to the store",
            )?,
            flush_duration: Histogram::with_opts(
                HistogramOpts::new(
                    "tablet_client_flush_duration_seconds",
                    "Time to flush one batch including retries",
                )
                .buckets(vec![0.001, 0.01, 0.1, 1.0, 10.0, 60.0]),
            )?,
        })
    }
}

/// Render a registry in the Prometheus text format.
pub fn render(registry: &Registry) -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&registry.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_render() {
        let registry = Registry::new();
        let metrics = WriterMetrics::register(&registry).unwrap();
        metrics.mutations_written.inc_by(5);
        metrics.batches_flushed.inc();

        let text = render(&registry);
        assert!(text.contains("tablet_client_mutations_written_total 5"));
        assert!(text.contains("tablet_client_batches_flushed_total 1"));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        WriterMetrics::register(&registry).unwrap();
        assert!(WriterMetrics::register(&registry).is_err());
    }
}
