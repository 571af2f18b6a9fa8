use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

/// Install the Prometheus recorder when enabled. The returned handle renders
/// scrape bodies; `None` keeps the `/metrics` surface dark.
pub(crate) fn init(settings: &Settings) -> anyhow::Result<Option<PrometheusHandle>> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(None);
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(Some(handle))
}
