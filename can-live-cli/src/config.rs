//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use can_live_decoder::ListenerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Socketcan,
    Candump,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    #[serde(default = "default_kind")]
    pub kind: TransportKind,
    /// SocketCAN interface name
    #[serde(default = "default_interface")]
    pub interface: String,
    /// candump log to replay
    pub file: Option<PathBuf>,
    /// Replay at recorded speed instead of as fast as possible
    #[serde(default)]
    pub realtime: bool,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

fn default_kind() -> TransportKind {
    TransportKind::Socketcan
}

fn default_interface() -> String {
    "can0".to_string()
}

fn default_read_timeout() -> u64 {
    500
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            interface: default_interface(),
            file: None,
            realtime: false,
            read_timeout_ms: default_read_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_true")]
    pub show_indicators: bool,
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            show_indicators: true,
        }
    }
}

impl AppConfig {
    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.transport.kind == TransportKind::Candump && self.transport.file.is_none() {
            bail!("transport.kind = \"candump\" requires transport.file");
        }
        if self.transport.kind == TransportKind::Socketcan && self.transport.interface.is_empty() {
            bail!("transport.interface must not be empty");
        }
        self.listener
            .validate()
            .context("Invalid [listener] section")?;
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [transport]
            kind = "candump"
            file = "drive.log"
            realtime = true

            [listener]
            queue_capacity = 256
            error_backoff_ms = 50

            [output]
            format = "json"
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.transport.kind, TransportKind::Candump);
        assert_eq!(config.transport.file, Some(PathBuf::from("drive.log")));
        assert!(config.transport.realtime);
        assert_eq!(config.listener.queue_capacity, Some(256));
        assert_eq!(config.listener.error_backoff_ms, 50);
        assert_eq!(config.listener.thread_name, "can-listener");
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.show_indicators);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.transport.kind, TransportKind::Socketcan);
        assert_eq!(config.transport.interface, "can0");
        assert_eq!(config.transport.read_timeout_ms, 500);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_candump_without_file_is_invalid() {
        let config: AppConfig = toml::from_str("[transport]\nkind = \"candump\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[transport]\ninterface = \"vcan0\"\n[output]\nshow_indicators = false").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.transport.interface, "vcan0");
        assert!(!config.output.show_indicators);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
