//! The finder service: postal code → locality → weather → three temperature scales.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::{Instrument, Span, field, info_span};

use crate::{
    config::FinderConfig,
    error::ServiceError,
    metrics::{self, HttpMetrics},
    model::{EnrichedResult, PostalLookup, PostalQuery, PostalRecord, WeatherSnapshot},
    normalize::normalize,
    provider::{PostalDirectory, ViaCepDirectory, WeatherApiProvider, WeatherProvider},
    telemetry::{Propagation, TraceContext},
};

/// Everything a successful enrichment produced.
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub result: EnrichedResult,
    pub record: PostalRecord,
    /// Accent-free locality actually sent to the weather service.
    pub query_locality: String,
    pub snapshot: WeatherSnapshot,
}

#[derive(Debug)]
pub struct Finder {
    postal: Arc<dyn PostalDirectory>,
    weather: Arc<dyn WeatherProvider>,
    api_key: String,
    propagation: Arc<dyn Propagation>,
}

impl Finder {
    /// Finder backed by the real directory and weather clients.
    pub fn new(cfg: &FinderConfig, propagation: Arc<dyn Propagation>) -> anyhow::Result<Self> {
        let api_key = cfg.require_api_key()?.to_string();
        let postal = ViaCepDirectory::new(&cfg.postal_base_url)
            .with_context(|| format!("Invalid postal directory url: {}", cfg.postal_base_url))?;
        let weather = WeatherApiProvider::new(cfg.weather_base_url.as_str());

        Ok(Self::with_providers(
            Arc::new(postal),
            Arc::new(weather),
            api_key,
            propagation,
        ))
    }

    pub fn with_providers(
        postal: Arc<dyn PostalDirectory>,
        weather: Arc<dyn WeatherProvider>,
        api_key: impl Into<String>,
        propagation: Arc<dyn Propagation>,
    ) -> Self {
        Self {
            postal,
            weather,
            api_key: api_key.into(),
            propagation,
        }
    }

    /// Runs the lookup pipeline for one postal code. Every failure is terminal.
    pub async fn enrich(&self, cep: &str, trace: &TraceContext) -> Result<Enrichment, ServiceError> {
        let span = info_span!("resolve_postal_code", cep);
        let cx = self.propagation.outbound(&span, trace);
        let record = match self.postal.lookup(cep, &cx).instrument(span).await {
            Ok(PostalLookup::Found(record)) => record,
            Ok(PostalLookup::NotFound) => return Err(ServiceError::NotFoundUpstream),
            Err(err) => {
                tracing::error!(cep, error = %err, "postal directory lookup failed");
                return Err(err.into());
            }
        };

        let query_locality = info_span!("normalize_locality").in_scope(|| normalize(&record.locality));

        let span = info_span!("resolve_weather", locality = %query_locality);
        let cx = self.propagation.outbound(&span, trace);
        let snapshot = self
            .weather
            .current(&query_locality, &self.api_key, &cx)
            .instrument(span)
            .await
            .map_err(|err| {
                tracing::error!(locality = %query_locality, error = %err, "weather lookup failed");
                ServiceError::UpstreamUnavailable
            })?;

        // The weather service's own locality name is what the client sees.
        let result = EnrichedResult::from_celsius(snapshot.locality(), snapshot.temperature_c());
        tracing::info!(
            cep,
            city = %result.city,
            temp_c = result.temp_c,
            temp_f = result.temp_f,
            temp_k = result.temp_k,
            "weather enrichment complete"
        );

        Ok(Enrichment {
            result,
            record,
            query_locality,
            snapshot,
        })
    }

    async fn handle(&self, trace: &TraceContext, body: &[u8]) -> Result<EnrichedResult, ServiceError> {
        let query: PostalQuery = serde_json::from_slice(body).map_err(|err| {
            tracing::debug!(error = %err, "rejecting malformed request body");
            ServiceError::InvalidBody
        })?;
        Span::current().record("cep", query.cep.as_str());

        Ok(self.enrich(&query.cep, trace).await?.result)
    }
}

/// `POST /cep`
async fn handle_cep(State(finder): State<Arc<Finder>>, headers: HeaderMap, body: Bytes) -> Response {
    let trace = TraceContext::from_headers(&headers);
    let span = info_span!(
        "finder.cep",
        otel.kind = "server",
        cep = field::Empty,
        trace_id = field::Empty
    );
    finder.propagation.attach(&span, &trace);

    match finder.handle(&trace, &body).instrument(span).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn router(finder: Arc<Finder>, metrics: HttpMetrics) -> Router {
    Router::new()
        .route("/cep", post(handle_cep))
        .route("/health", get(handle_health))
        .with_state(finder)
        .merge(metrics.routes())
        .layer(middleware::from_fn_with_state(metrics, metrics::track))
        .layer(TraceLayer::new_for_http())
}
