use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::model_client::ModelClient;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    model: ModelClient,
    http: reqwest::Client,
    prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        model: ModelClient,
        http: reqwest::Client,
        prometheus: Option<PrometheusHandle>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, redis, model, http, prometheus }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn model(&self) -> &ModelClient {
        &self.inner.model
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub(crate) fn prometheus(&self) -> Option<&PrometheusHandle> {
        self.inner.prometheus.as_ref()
    }
}
