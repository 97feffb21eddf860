//! Log output for the server process.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// `logger` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: String,
    /// Per-target levels, e.g. `{"postpulse-sse": "debug"}`.
    pub targets: BTreeMap<String, String>,
    pub format: LogFormat,
    /// File the logs are appended to. Unset or `"stderr"` means stderr.
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            targets: BTreeMap::new(),
            format: LogFormat::Text,
            output_path: None,
        }
    }
}

impl LoggerConfig {
    /// `EnvFilter` directives, e.g. `"info,postpulse_sse=debug"`.
    pub fn directives(&self) -> String {
        self.targets.iter().fold(self.level.clone(), |mut acc, (target, level)| {
            acc.push_str(&format!(",{}={level}", target.replace('-', "_")));
            acc
        })
    }

    fn destination(&self) -> Option<&Path> {
        self.output_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty() && *p != Path::new("stderr"))
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn output_layer(config: &LoggerConfig) -> anyhow::Result<BoxedLayer> {
    let Some(path) = config.destination() else {
        let layer = fmt::layer().with_writer(std::io::stderr);
        return Ok(match config.format {
            LogFormat::Text => layer.boxed(),
            LogFormat::Json => layer.json().boxed(),
        });
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("can't open log output file {}", path.display()))?;
    let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
    Ok(match config.format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    })
}

/// Install the global subscriber. `RUST_LOG`, when set, replaces the configured levels.
pub fn init(config: &LoggerConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.directives()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(output_layer(config)?)
        .with(filter)
        .try_init()
        .context("can't install tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_append_target_levels() {
        let mut config = LoggerConfig::default();
        config.targets.insert("postpulse-sse".into(), "debug".into());
        config.targets.insert("hyper".into(), "warn".into());
        assert_eq!(config.directives(), "info,hyper=warn,postpulse_sse=debug");
    }

    #[test]
    fn stderr_path_means_no_file() {
        let mut config = LoggerConfig { output_path: Some("stderr".into()), ..Default::default() };
        assert!(config.destination().is_none());
        config.output_path = Some("/var/log/postpulse.log".into());
        assert_eq!(config.destination(), Some(Path::new("/var/log/postpulse.log")));
    }

    #[test]
    fn parses_format_and_output_path() {
        let config: LoggerConfig =
            serde_json::from_str(r#"{"format":"json","output_path":"/tmp/postpulse.log"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "info");
        assert_eq!(config.output_path, Some(PathBuf::from("/tmp/postpulse.log")));
    }

    #[test]
    fn unwritable_output_path_fails() {
        let config = LoggerConfig {
            output_path: Some("/nonexistent-dir/postpulse.log".into()),
            ..Default::default()
        };
        let err = init(&config).unwrap_err();
        assert!(err.to_string().contains("can't open log output file"));
    }

    #[test]
    fn writes_to_output_file() {
        let path = std::env::temp_dir().join(format!("postpulse-log-{}.log", std::process::id()));
        let config = LoggerConfig { output_path: Some(path.clone()), ..Default::default() };

        init(&config).unwrap();
        tracing::error!("log file check");

        let written = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(written.contains("log file check"));
    }
}
