//! The validator gateway: checks the postal code shape and relays the finder's answer.

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use reqwest::Client;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, Span, field, info_span};

use crate::{
    config::ValidatorConfig,
    error::{ServiceError, truncate_body},
    metrics::{self, HttpMetrics},
    model::{EnrichedResult, PostalQuery},
    telemetry::{Propagation, TraceContext},
};

#[derive(Debug)]
pub struct Validator {
    http: Client,
    finder_url: String,
    response_time: Duration,
    min_cep_length: usize,
    request_name: String,
    propagation: Arc<dyn Propagation>,
}

impl Validator {
    pub fn new(cfg: &ValidatorConfig, propagation: Arc<dyn Propagation>) -> Self {
        Self::with_client(cfg, Client::new(), propagation)
    }

    pub fn with_client(cfg: &ValidatorConfig, http: Client, propagation: Arc<dyn Propagation>) -> Self {
        Self {
            http,
            finder_url: cfg.finder_url.clone(),
            response_time: cfg.response_time(),
            min_cep_length: cfg.min_cep_length,
            request_name: cfg.request_name.clone(),
            propagation,
        }
    }

    /// Shape check only; whether the code exists is the finder's concern.
    pub fn validate(&self, query: &PostalQuery) -> Result<(), ServiceError> {
        if query.cep.is_empty() {
            return Err(ServiceError::MissingCode);
        }
        if query.cep.chars().count() < self.min_cep_length {
            return Err(ServiceError::CodeTooShort {
                min: self.min_cep_length,
            });
        }
        Ok(())
    }

    async fn handle(&self, trace: &TraceContext, body: &[u8]) -> Response {
        if !self.response_time.is_zero() {
            tokio::time::sleep(self.response_time).await;
        }

        let query: PostalQuery = match serde_json::from_slice(body) {
            Ok(query) => query,
            Err(err) => {
                tracing::debug!(error = %err, "rejecting malformed request body");
                return ServiceError::InvalidBody.into_response();
            }
        };
        Span::current().record("cep", query.cep.as_str());

        if let Err(err) = self.validate(&query) {
            tracing::info!(cep = %query.cep, reason = %err, "postal code rejected");
            return err.into_response();
        }

        match self.forward(&query, trace).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }

    /// POSTs the query to the finder and relays what comes back.
    async fn forward(&self, query: &PostalQuery, trace: &TraceContext) -> Result<Response, ServiceError> {
        let span = info_span!("forward_to_finder", url = %self.finder_url);
        let cx = self.propagation.outbound(&span, trace);

        let req = cx.apply(self.http.post(&self.finder_url).json(query));
        let res = req.send().instrument(span).await.map_err(|err| {
            tracing::error!(url = %self.finder_url, error = %err, "finder call failed");
            ServiceError::ForwardFailed
        })?;

        let status = res.status();
        if status != StatusCode::OK {
            let content_type = res.headers().get(header::CONTENT_TYPE).cloned();
            let body = res.bytes().await.map_err(|err| {
                tracing::error!(error = %err, "failed to read finder response");
                ServiceError::ForwardFailed
            })?;
            tracing::info!(
                status = status.as_u16(),
                body = %truncate_body(&String::from_utf8_lossy(&body)),
                "relaying finder error"
            );

            let mut response = (status, body).into_response();
            match content_type {
                Some(value) => {
                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                }
                None => {
                    response.headers_mut().remove(header::CONTENT_TYPE);
                }
            }
            return Ok(response);
        }

        let result: EnrichedResult = res.json().await.map_err(|err| {
            tracing::error!(error = %err, "failed to decode finder response");
            ServiceError::ForwardDecode
        })?;

        Ok((StatusCode::OK, Json(result)).into_response())
    }
}

/// `POST /validate`
async fn handle_validate(
    State(validator): State<Arc<Validator>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace = TraceContext::from_headers(&headers);
    let span = info_span!(
        "validator.validate",
        otel.name = %validator.request_name,
        otel.kind = "server",
        cep = field::Empty,
        trace_id = field::Empty
    );
    validator.propagation.attach(&span, &trace);

    validator.handle(&trace, &body).instrument(span).await
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn router(validator: Arc<Validator>, metrics: HttpMetrics) -> Router {
    Router::new()
        .route("/validate", post(handle_validate))
        .route("/health", get(handle_health))
        .with_state(validator)
        .merge(metrics.routes())
        .layer(middleware::from_fn_with_state(metrics, metrics::track))
        .layer(TraceLayer::new_for_http())
}
