//! Process configuration, loaded from a JSON file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use postpulse_core::Dimension;
use postpulse_sse::HubConfig;

use crate::logging::LoggerConfig;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "API_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "./config.json";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "sse_client_config")]
    pub sse: HubConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub logger: LoggerConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds granted to in-flight requests on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
    #[serde(default)]
    pub analysis_handler_config: AnalysisHandlerConfig,
}

fn default_addr() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 8080 }
fn default_shutdown_timeout() -> u64 { 10 }

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
            analysis_handler_config: AnalysisHandlerConfig::default(),
        }
    }
}

impl RouterConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

/// `/analysis` endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisHandlerConfig {
    /// Dimensions callers may request
    #[serde(default = "default_authorized_dimensions")]
    pub authorized_dimensions: Vec<String>,
}

fn default_authorized_dimensions() -> Vec<String> {
    Dimension::ALL.iter().map(|d| d.as_str().to_string()).collect()
}

impl Default for AnalysisHandlerConfig {
    fn default() -> Self {
        Self {
            authorized_dimensions: default_authorized_dimensions(),
        }
    }
}

impl AppConfig {
    /// Read, parse and validate the file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("can't open configuration file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content).context("can't parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sse.server_url.trim().is_empty() {
            bail!("sse_client_config.server_url must not be empty");
        }
        if self.router.port == 0 {
            bail!("router.port must not be 0");
        }
        for name in &self.router.analysis_handler_config.authorized_dimensions {
            if name.parse::<Dimension>().is_err() {
                bail!("authorized dimension {name:?} is not one of likes, comments, favorites, retweets");
            }
        }
        Ok(())
    }
}

/// Config path: explicit flag, else `$API_CONFIG`, else `./config.json`.
pub fn resolve_path(flag: Option<String>) -> PathBuf {
    flag.or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
        .into()
}
