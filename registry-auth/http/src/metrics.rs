use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};
use tokio::time;

/// Counts token requests by outcome and records how long they took.
#[derive(Clone, Debug)]
pub struct RequestMetrics {
    requests: Family<OutcomeLabels, Counter>,
    duration: Histogram,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct OutcomeLabels {
    outcome: &'static str,
}

// === impl RequestMetrics ===

impl RequestMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let requests = Family::<OutcomeLabels, Counter>::default();
        reg.register(
            "requests",
            "Total number of token requests by outcome",
            requests.clone(),
        );

        // Cache hits answer in microseconds; store fetches are bounded by the
        // fetch deadline.
        let duration = Histogram::new([0.001, 0.005, 0.025, 0.1, 0.5, 1.0, 5.0, 10.0]);
        reg.register_with_unit(
            "request_duration",
            "Histogram of token request latency",
            Unit::Seconds,
            duration.clone(),
        );

        Self { requests, duration }
    }

    pub(crate) fn observe(&self, outcome: &'static str, start: time::Instant) {
        self.requests
            .get_or_create(&OutcomeLabels { outcome })
            .inc();
        self.duration.observe(start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[tokio::test(start_paused = true)]
    async fn records_outcomes() {
        let mut registry = Registry::default();
        let metrics = RequestMetrics::register(&mut registry);

        let start = time::Instant::now();
        time::advance(time::Duration::from_millis(20)).await;
        metrics.observe("issued", start);
        metrics.observe("issued", start);
        metrics.observe("unauthorized", start);

        let mut text = String::new();
        encode(&mut text, &registry).expect("metrics must encode");
        assert!(text.contains("requests_total{outcome=\"issued\"} 2"), "{text}");
        assert!(text.contains("requests_total{outcome=\"unauthorized\"} 1"), "{text}");
        assert!(text.contains("request_duration_seconds_count 3"), "{text}");
    }
}
