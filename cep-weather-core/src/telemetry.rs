//! Logging and distributed tracing.
//!
//! A [`TraceContext`] is the per-request carrier of W3C trace headers. It is
//! extracted from the inbound request, handed explicitly down the call chain,
//! and applied to outbound requests. A [`Propagation`] decides how spans are
//! stitched to that carrier: [`W3cPropagation`] in the services, which start a
//! new trace when the caller sent none, and [`NoopPropagation`] in tests.

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use anyhow::{Context as _, Result};
use axum::http::HeaderMap;
use opentelemetry::{
    KeyValue, global,
    propagation::{Extractor, Injector, TextMapPropagator},
    trace::TracerProvider as _,
};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    Resource,
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider},
};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::TelemetryConfig;

pub const TRACEPARENT: &str = "traceparent";
pub const TRACESTATE: &str = "tracestate";

const PROPAGATED_HEADERS: [&str; 2] = [TRACEPARENT, TRACESTATE];
const DEFAULT_LOG_FILTER: &str = "info";

/// Trace propagation headers carried across one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    fields: HashMap<String, String>,
}

impl TraceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the trace headers present in `headers`; other headers are ignored.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cx = Self::new();
        for name in PROPAGATED_HEADERS {
            if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
                cx.insert(name, value);
            }
        }
        cx
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn traceparent(&self) -> Option<&str> {
        self.get(TRACEPARENT)
    }

    /// Trace id from a version-00 `traceparent` (`00-{trace_id}-{span_id}-{flags}`).
    pub fn trace_id(&self) -> Option<&str> {
        let mut parts = self.traceparent()?.split('-');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("00"), Some(trace_id), Some(_), Some(_)) if trace_id.len() == 32 => Some(trace_id),
            _ => None,
        }
    }

    /// Adds the carried headers to an outbound request.
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        self.fields
            .iter()
            .fold(request, |req, (name, value)| req.header(name.as_str(), value.as_str()))
    }
}

impl Extractor for TraceContext {
    fn get(&self, key: &str) -> Option<&str> {
        TraceContext::get(self, key)
    }

    fn keys(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }
}

impl Injector for TraceContext {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key, value);
    }
}

/// Connects request spans to the carried trace context.
pub trait Propagation: Send + Sync + Debug {
    /// Makes `span` continue the trace described by `incoming`.
    fn attach(&self, span: &Span, incoming: &TraceContext);

    /// Context to send downstream from within `span`.
    fn outbound(&self, span: &Span, incoming: &TraceContext) -> TraceContext;
}

/// W3C Trace Context propagation through the OpenTelemetry layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct W3cPropagation;

impl Propagation for W3cPropagation {
    fn attach(&self, span: &Span, incoming: &TraceContext) {
        let parent = TraceContextPropagator::new().extract(incoming);
        if let Err(err) = span.set_parent(parent) {
            tracing::debug!(error = ?err, "incoming trace context rejected");
        }
        record_trace_id(span, incoming);
    }

    fn outbound(&self, span: &Span, incoming: &TraceContext) -> TraceContext {
        let mut cx = TraceContext::new();
        TraceContextPropagator::new().inject_context(&span.context(), &mut cx);
        // No OpenTelemetry layer on the subscriber: nothing was injected.
        if cx.is_empty() { incoming.clone() } else { cx }
    }
}

/// Propagation without an exporter: forwards the incoming headers untouched
/// and records the trace id for log correlation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPropagation;

impl Propagation for NoopPropagation {
    fn attach(&self, span: &Span, incoming: &TraceContext) {
        record_trace_id(span, incoming);
    }

    fn outbound(&self, _span: &Span, incoming: &TraceContext) -> TraceContext {
        incoming.clone()
    }
}

fn record_trace_id(span: &Span, cx: &TraceContext) {
    if let Some(trace_id) = cx.trace_id() {
        span.record("trace_id", trace_id);
    }
}

/// Keeps the tracer provider alive; flushes and shuts it down on drop.
#[derive(Debug)]
pub struct TelemetryGuard {
    provider: SdkTracerProvider,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(err) = self.provider.shutdown() {
            tracing::warn!(error = %err, "failed to shut down tracer provider");
        }
    }
}

/// Installs the global `tracing` subscriber with an OpenTelemetry layer, so
/// every inbound request gets a trace context. Spans are exported only when
/// an OTLP endpoint is configured.
///
/// An exporter that cannot be built is logged and skipped; the service keeps
/// tracing and logging without export.
pub fn init(
    cfg: &TelemetryConfig,
    default_service: &str,
) -> Result<(TelemetryGuard, Arc<dyn Propagation>)> {
    let filter = match &cfg.log_filter {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("Invalid log filter: {directive}"))?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };

    let service_name = cfg.service_name.as_deref().unwrap_or(default_service);

    let (exporter, export_error) = match cfg.otlp_endpoint.as_deref() {
        Some(endpoint) => match build_exporter(endpoint) {
            Ok(exporter) => (Some(exporter), None),
            Err(err) => (None, Some(err)),
        },
        None => (None, None),
    };
    let exporting = exporter.is_some();
    let provider = build_provider(exporter, service_name);

    tracing_subscriber::registry()
        .with(tracing_opentelemetry::layer().with_tracer(provider.tracer("cep-weather")))
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(err) = export_error {
        tracing::warn!(error = %err, "trace export disabled");
    }

    global::set_text_map_propagator(TraceContextPropagator::new());
    global::set_tracer_provider(provider.clone());
    if exporting {
        tracing::info!(service = service_name, "OpenTelemetry export enabled");
    }

    Ok((TelemetryGuard { provider }, Arc::new(W3cPropagation)))
}

fn build_exporter(endpoint: &str) -> Result<SpanExporter> {
    let endpoint = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    };

    SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .build()
        .with_context(|| format!("Failed to build OTLP exporter for {endpoint}"))
}

fn build_provider(exporter: Option<SpanExporter>, service_name: &str) -> SdkTracerProvider {
    let resource = Resource::builder_empty()
        .with_attributes([KeyValue::new("service.name", service_name.to_string())])
        .build();

    let mut builder = SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(resource);
    if let Some(exporter) = exporter {
        builder = builder.with_batch_exporter(exporter);
    }
    builder.build()
}
