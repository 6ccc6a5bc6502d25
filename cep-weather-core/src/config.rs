use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Environment variable naming an explicit config file path.
pub const CONFIG_PATH_ENV: &str = "CEP_WEATHER_CONFIG";

/// Settings of the finder service (postal + weather lookups).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderConfig {
    pub listen_addr: String,
    pub api_key: Option<String>,
    pub postal_base_url: String,
    pub weather_base_url: String,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            api_key: None,
            postal_base_url: "http://viacep.com.br".to_string(),
            weather_base_url: "http://api.weatherapi.com/v1".to_string(),
        }
    }
}

impl FinderConfig {
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty()).ok_or_else(|| {
            anyhow!(
                "No weather API key configured.\n\
                 Hint: set API_KEY or run `cep-weather configure`."
            )
        })
    }
}

/// Settings of the validator gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub listen_addr: String,
    pub finder_url: String,
    /// Artificial delay before each request is processed.
    pub response_time_ms: u64,
    pub min_cep_length: usize,
    /// Name given to the request-level span.
    pub request_name: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9000".to_string(),
            finder_url: "http://cep-finder:8080/cep".to_string(),
            response_time_ms: 2000,
            min_cep_length: 9,
            request_name: "cep-validator-request".to_string(),
        }
    }
}

impl ValidatorConfig {
    pub fn response_time(&self) -> Duration {
        Duration::from_millis(self.response_time_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub service_name: Option<String>,
    /// OTLP/gRPC collector, e.g. `otel-collector:4317`. No export when unset.
    pub otlp_endpoint: Option<String>,
    pub log_filter: Option<String>,
}

/// Process configuration, built once at start-up and passed down by reference.
///
/// Example TOML:
/// [finder]
/// api_key = "..."
///
/// [validator]
/// finder_url = "http://localhost:8080/cep"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub finder: FinderConfig,
    pub validator: ValidatorConfig,
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load the config file (if any) and overlay the process environment.
    pub fn load() -> Result<Self> {
        Self::load_at(&Self::config_file_path()?)
    }

    /// Like [`Config::load`] with an explicit file path.
    pub fn load_at(path: &Path) -> Result<Self> {
        let mut cfg = Self::load_from(path)?;
        cfg.apply_env(std::env::vars())?;
        Ok(cfg)
    }

    /// Read a TOML file, or return defaults if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Overlay recognised environment variables. Empty values are ignored.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let value: String = value.into();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "API_KEY" => self.finder.api_key = Some(value),
                "HTTP_PORT" => {
                    let addr = listen_addr_from_port(&value);
                    self.finder.listen_addr = addr.clone();
                    self.validator.listen_addr = addr;
                }
                "VIACEP_BASE_URL" => self.finder.postal_base_url = value,
                "WEATHER_API_BASE_URL" => self.finder.weather_base_url = value,
                "EXTERNAL_CALL_URL" => self.validator.finder_url = value,
                "RESPONSE_TIME" => {
                    self.validator.response_time_ms = value
                        .trim()
                        .parse()
                        .with_context(|| format!("RESPONSE_TIME must be milliseconds, got '{value}'"))?;
                }
                "CEP_MIN_LENGTH" => {
                    self.validator.min_cep_length = value
                        .trim()
                        .parse()
                        .with_context(|| format!("CEP_MIN_LENGTH must be a number, got '{value}'"))?;
                }
                "REQUEST_NAME_OTEL" => self.validator.request_name = value,
                "OTEL_SERVICE_NAME" => self.telemetry.service_name = Some(value),
                "OTEL_EXPORTER_OTLP_ENDPOINT" => self.telemetry.otlp_endpoint = Some(value),
                "RUST_LOG" => self.telemetry.log_filter = Some(value),
                _ => {}
            }
        }
        Ok(())
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file: `CEP_WEATHER_CONFIG`, else the platform config dir.
    pub fn config_file_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }

        let dirs = ProjectDirs::from("dev", "cep-weather", "cep-weather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Accepts Go-style `":8080"`, a bare port, or a full `host:port`.
fn listen_addr_from_port(value: &str) -> String {
    let value = value.trim();
    if let Some(port) = value.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else if value.chars().all(|c| c.is_ascii_digit()) {
        format!("0.0.0.0:{value}")
    } else {
        value.to_string()
    }
}
