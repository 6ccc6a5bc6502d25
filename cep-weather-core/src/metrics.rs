//! Prometheus HTTP metrics for the service routers.
//!
//! Collected per router (prefix is the service name, e.g. `cep_validator`):
//! - `<prefix>_http_requests_total`: requests by method, route and status (counter)
//! - `<prefix>_http_request_duration_seconds`: request latency (histogram)
//!
//! Exposed at `GET /metrics` in the text exposition format.

use std::time::Instant;

use axum::{
    Router,
    extract::{MatchedPath, Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

const LABELS: [&str; 3] = ["method", "route", "status"];

#[derive(Clone)]
pub struct HttpMetrics {
    registry: Registry,
    requests: IntCounterVec,
    latency: HistogramVec,
}

impl HttpMetrics {
    pub fn new(prefix: &str) -> Result<Self, prometheus::Error> {
        let namespace = prefix.replace(['-', '.', ' '], "_");
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests").namespace(namespace.clone()),
            &LABELS,
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request latency")
                .namespace(namespace),
            &LABELS,
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;

        Ok(Self {
            registry,
            requests,
            latency,
        })
    }

    fn observe(&self, method: &str, route: &str, status: StatusCode, seconds: f64) {
        let status = status.as_u16().to_string();
        let labels = [method, route, status.as_str()];
        self.requests.with_label_values(&labels).inc();
        self.latency.with_label_values(&labels).observe(seconds);
    }

    /// Current metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }

    /// `GET /metrics` route, stateless for merging into any router.
    pub fn routes(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_endpoint))
            .with_state(self.clone())
    }
}

/// Middleware counting every request that passes through the router.
pub async fn track(State(metrics): State<HttpMetrics>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let start = Instant::now();
    let response = next.run(req).await;
    metrics.observe(&method, &route, response.status(), start.elapsed().as_secs_f64());

    response
}

async fn metrics_endpoint(State(metrics): State<HttpMetrics>) -> Response {
    match metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
