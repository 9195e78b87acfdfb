use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use kennel_storage::Database;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::{admin, api, breeds, dogs, telemetry};

const FALLBACK_BASE_URL: &str = "http://localhost";

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    page_size: u32,
    public_url: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        page_size: u32,
        public_url: Option<String>,
    ) -> Self {
        Self {
            metrics,
            storage,
            page_size,
            public_url: public_url.map(Arc::from),
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Origin used for absolute links: the configured public URL, else the
    /// request `Host` header.
    pub fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.public_url {
            return url.to_string();
        }
        headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .filter(|host| !host.is_empty())
            .map(|host| format!("http://{host}"))
            .unwrap_or_else(|| FALLBACK_BASE_URL.to_string())
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api", get(api::root))
        .route("/api/dogs", get(dogs::list).post(dogs::create))
        .route(
            "/api/dogs/:id",
            get(dogs::retrieve)
                .put(dogs::update)
                .patch(dogs::partial_update)
                .delete(dogs::destroy),
        )
        .route("/api/breeds", get(breeds::list).post(breeds::create))
        .route(
            "/api/breeds/:id",
            get(breeds::retrieve)
                .put(breeds::update)
                .patch(breeds::partial_update)
                .delete(breeds::destroy),
        )
        .route("/admin/dogs", get(admin::list_dogs))
        .route("/admin/breeds", get(admin::list_breeds))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
