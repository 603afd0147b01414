//! Server configuration loaded from `chronod.toml`.
//!
//! Missing or malformed files fall back to defaults with a warning;
//! the `PORT` environment variable overrides the configured port.

use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Graceful shutdown deadline in milliseconds.
    pub shutdown_timeout_ms: u64,
    /// Per-job execution history cap.
    pub history_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4400,
            shutdown_timeout_ms: 30_000,
            history_limit: crate::history::DEFAULT_LIMIT,
        }
    }
}

/// Load configuration from `path`, then apply the `PORT` override.
pub fn load_config(path: &Path) -> ServerConfig {
    let mut config = read_config_file(path);
    apply_port_override(&mut config, std::env::var("PORT").ok().as_deref());
    config
}

fn read_config_file(path: &Path) -> ServerConfig {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return ServerConfig::default();
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "failed to read config, using defaults");
            return ServerConfig::default();
        }
    };

    match toml::from_str::<ServerConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "failed to parse config, using defaults");
            ServerConfig::default()
        }
    }
}

fn apply_port_override(config: &mut ServerConfig, port: Option<&str>) {
    let Some(raw) = port else {
        return;
    };
    match raw.parse::<u16>() {
        Ok(port) => config.port = port,
        Err(_) => tracing::warn!(port = raw, "ignoring unparseable PORT override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = read_config_file(&tmp.path().join("chronod.toml"));
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn valid_toml_is_parsed_with_partial_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chronod.toml");
        std::fs::write(&path, "port = 8080\nshutdown_timeout_ms = 5000\n").unwrap();

        let config = read_config_file(&path);
        assert_eq!(config.port, 8080);
        assert_eq!(config.shutdown_timeout_ms, 5_000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.history_limit, 50);
    }

    #[test]
    fn malformed_toml_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chronod.toml");
        std::fs::write(&path, "this is not { valid toml !!!").unwrap();

        let config = read_config_file(&path);
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn port_override_applies_when_parseable() {
        let mut config = ServerConfig::default();
        apply_port_override(&mut config, Some("9001"));
        assert_eq!(config.port, 9001);

        apply_port_override(&mut config, Some("not-a-port"));
        assert_eq!(config.port, 9001);

        apply_port_override(&mut config, None);
        assert_eq!(config.port, 9001);
    }
}
