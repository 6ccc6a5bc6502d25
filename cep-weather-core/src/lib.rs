//! Core library for the postal-code weather services.
//!
//! This crate defines:
//! - Configuration loaded once at start-up (TOML file + environment)
//! - Clients for the postal directory and the weather service
//! - The finder pipeline and the validator gateway, each with its axum router
//! - Trace-context propagation, logging setup and HTTP metrics
//!
//! It is used by `cep-weather-cli`, but the routers can be mounted by other binaries too.

pub mod config;
pub mod convert;
pub mod error;
pub mod finder;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod provider;
pub mod telemetry;
pub mod validator;

pub use config::{Config, FinderConfig, TelemetryConfig, ValidatorConfig};
pub use error::{Failure, LookupError, ServiceError};
pub use finder::{Enrichment, Finder};
pub use metrics::HttpMetrics;
pub use model::{EnrichedResult, PostalLookup, PostalQuery, PostalRecord, WeatherSnapshot};
pub use provider::{PostalDirectory, WeatherProvider};
pub use telemetry::{NoopPropagation, Propagation, TraceContext, W3cPropagation};
pub use validator::Validator;
