use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use cep_weather_core::{
    Config, Finder, HttpMetrics, TraceContext, Validator, finder, normalize::normalize,
    telemetry, validator,
};
use chrono::Local;
use clap::{Parser, Subcommand};
use inquire::Password;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "cep-weather", version, about = "Postal code to weather services")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true, env = "CEP_WEATHER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the finder service (postal code and weather lookups).
    Finder,

    /// Run the validator gateway in front of the finder.
    Validator,

    /// Resolve one postal code in-process and print the result.
    Lookup {
        /// Postal code, e.g. "01310-100".
        cep: String,
    },

    /// Store the weather API key in the config file.
    Configure,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let path = match self.config {
            Some(path) => path,
            None => Config::config_file_path()?,
        };

        match self.command {
            Command::Finder => {
                let cfg = Config::load_at(&path)?;
                let (_guard, propagation) = telemetry::init(&cfg.telemetry, "cep-finder")?;

                let finder = Arc::new(Finder::new(&cfg.finder, propagation)?);
                let app = finder::router(finder, HttpMetrics::new("cep_finder")?);
                serve(&cfg.finder.listen_addr, app).await?;
            }
            Command::Validator => {
                let cfg = Config::load_at(&path)?;
                let (_guard, propagation) = telemetry::init(&cfg.telemetry, "cep-validator")?;

                tracing::info!(
                    finder_url = %cfg.validator.finder_url,
                    min_cep_length = cfg.validator.min_cep_length,
                    response_time_ms = cfg.validator.response_time_ms,
                    "validator configured"
                );
                let validator = Arc::new(Validator::new(&cfg.validator, propagation));
                let app = validator::router(validator, HttpMetrics::new("cep_validator")?);
                serve(&cfg.validator.listen_addr, app).await?;
            }
            Command::Lookup { cep } => {
                let cfg = Config::load_at(&path)?;
                let (_guard, propagation) = telemetry::init(&cfg.telemetry, "cep-weather")?;

                let finder = Finder::new(&cfg.finder, propagation)?;
                let enrichment = finder
                    .enrich(&cep, &TraceContext::new())
                    .await
                    .with_context(|| format!("Lookup failed for postal code {cep}"))?;

                let record = &enrichment.record;
                let snapshot = &enrichment.snapshot;
                let result = &enrichment.result;
                println!("{} ({}, {}-{})", record.cep, record.street, record.locality, record.state_code);
                println!("City:        {}", result.city);
                println!("Conditions:  {} (code {})", snapshot.condition_text(), snapshot.condition_code());
                println!(
                    "Temperature: {:.1} °C | {:.1} °F | {:.2} K",
                    result.temp_c, result.temp_f, result.temp_k
                );
                println!(
                    "Observed:    {}",
                    snapshot.observed_at().with_timezone(&Local).format("%Y-%m-%d %H:%M %Z")
                );
                if enrichment.query_locality != normalize(&result.city) {
                    println!("(queried as \"{}\")", enrichment.query_locality);
                }
            }
            Command::Configure => {
                let mut cfg = Config::load_from(&path)?;
                let api_key = Password::new("Weather API key:")
                    .without_confirmation()
                    .prompt()
                    .context("Failed to read API key")?;

                cfg.finder.api_key = Some(api_key.trim().to_string());
                cfg.save_to(&path)?;
                println!("Saved configuration to {}", path.display());
            }
        }

        Ok(())
    }
}

/// Serves `app` until Ctrl-C.
async fn serve(listen_addr: &str, app: axum::Router) -> Result<()> {
    let addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address: {listen_addr}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    tracing::info!("shut down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
