use metrics::gauge;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::freshness::FreshnessWindow;

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and publish the configured freshness window.
    /// Fails if a recorder is already installed (second call in one process).
    pub fn init(window: FreshnessWindow) -> Result<Self, BuildError> {
        // Use default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new().install_recorder()?;

        gauge!("freshness_window_hours").set(window.max_age().num_hours() as f64);

        Ok(Self { handle })
    }

    /// Prometheus text exposition.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
