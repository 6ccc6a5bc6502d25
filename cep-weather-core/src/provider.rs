//! Clients for the two upstream services the finder composes.

use async_trait::async_trait;
use reqwest::Response;
use std::fmt::Debug;

use crate::{
    error::{LookupError, truncate_body},
    model::{PostalLookup, WeatherSnapshot},
    telemetry::TraceContext,
};

pub mod viacep;
pub mod weatherapi;

pub use viacep::ViaCepDirectory;
pub use weatherapi::WeatherApiProvider;

/// Resolves a postal code to an address record.
#[async_trait]
pub trait PostalDirectory: Send + Sync + Debug {
    async fn lookup(&self, cep: &str, trace: &TraceContext) -> Result<PostalLookup, LookupError>;
}

/// Current conditions for a locality name.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn current(
        &self,
        locality: &str,
        api_key: &str,
        trace: &TraceContext,
    ) -> Result<WeatherSnapshot, LookupError>;
}

/// Reads the body of a successful response; any other status is an error.
async fn success_body(res: Response, upstream: &str) -> Result<Vec<u8>, LookupError> {
    let status = res.status();
    let body = res.bytes().await?;

    if !status.is_success() {
        let body = truncate_body(&String::from_utf8_lossy(&body));
        tracing::warn!(upstream, status = status.as_u16(), %body, "upstream request failed");
        return Err(LookupError::UpstreamStatus {
            status: status.as_u16(),
            body,
        });
    }

    Ok(body.to_vec())
}
