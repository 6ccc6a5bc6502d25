use async_trait::async_trait;
use reqwest::Client;

use crate::{error::LookupError, model::WeatherSnapshot, telemetry::TraceContext};

use super::{WeatherProvider, success_body};

/// WeatherAPI.com current-conditions client.
#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    fn current_url(&self) -> String {
        format!("{}/current.json", self.base_url)
    }
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    async fn current(
        &self,
        locality: &str,
        api_key: &str,
        trace: &TraceContext,
    ) -> Result<WeatherSnapshot, LookupError> {
        // `query` form-encodes the locality.
        let req = self
            .http
            .get(self.current_url())
            .query(&[("key", api_key), ("q", locality)]);

        let res = trace.apply(req).send().await?;
        let body = success_body(res, "weather").await?;
        let snapshot: WeatherSnapshot = serde_json::from_slice(&body)?;

        tracing::debug!(
            locality,
            resolved = %snapshot.locality(),
            temp_c = snapshot.temperature_c(),
            condition = %snapshot.condition_text(),
            "current weather resolved"
        );

        Ok(snapshot)
    }
}
