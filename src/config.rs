use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config/bridge.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Whole store kept as one pretty-printed JSON document.
    Json,
    /// Whole store kept as one blob row in a SQLite database.
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Address the subscriber connects to.
    pub relay_addr: String,
    /// WebSocket endpoint of the chat protocol gateway.
    pub upstream_url: String,
    pub data_dir: PathBuf,
    pub store_backend: StoreBackend,
    /// File name of the store, relative to `data_dir`.
    pub store_file: String,
    pub auth_dir: PathBuf,
    /// Pause before reconnecting after a transient closure. 0 reconnects immediately.
    pub reconnect_delay_ms: u64,
    /// Give up after this many consecutive failed sessions. Absent retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Run the offline-guard audit every time the session opens.
    pub audit_on_connect: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            relay_addr: "0.0.0.0:8080".to_string(),
            upstream_url: "ws://127.0.0.1:3000/session".to_string(),
            data_dir: PathBuf::from("data"),
            store_backend: StoreBackend::Json,
            store_file: "messages.json".to_string(),
            auth_dir: PathBuf::from("auth_info"),
            reconnect_delay_ms: 0,
            max_reconnect_attempts: None,
            audit_on_connect: true,
        }
    }
}

impl AppConfig {
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(&self.store_file)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Rejects values the bridge cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.relay_addr.parse::<SocketAddr>().is_err() {
            return Err(BridgeError::Config(format!(
                "relay_addr `{}` is not a socket address",
                self.relay_addr
            )));
        }
        if !(self.upstream_url.starts_with("ws://") || self.upstream_url.starts_with("wss://")) {
            return Err(BridgeError::Config(format!(
                "upstream_url `{}` must use ws:// or wss://",
                self.upstream_url
            )));
        }
        if self.store_file.trim().is_empty() {
            return Err(BridgeError::Config("store_file must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Reads the config at `path`. An absent or unparsable file yields the defaults.
pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            log::info!("No config at {} ({err}); using defaults", path.display());
            return AppConfig::default();
        }
    };
    serde_json::from_str(&content).unwrap_or_else(|err| {
        log::warn!("Ignoring invalid config {}: {err}", path.display());
        AppConfig::default()
    })
}

pub fn save_config(path: &str, config: &AppConfig) -> Result<()> {
    let path = Path::new(path);
    let config_error =
        |err: std::io::Error| BridgeError::Config(format!("cannot write {}: {err}", path.display()));

    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(config_error)?;
    }
    fs::write(path, serde_json::to_string_pretty(config)?).map_err(config_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = load_config(path.to_str().unwrap());
        assert_eq!(config.relay_addr, "0.0.0.0:8080");
        assert_eq!(config.store_backend, StoreBackend::Json);
        assert_eq!(config.reconnect_delay(), Duration::ZERO);
        assert!(config.max_reconnect_attempts.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        fs::write(&path, r#"{ "store_backend": "sqlite", "store_file": "bridge.db" }"#).unwrap();

        let config = load_config(path.to_str().unwrap());
        assert_eq!(config.store_backend, StoreBackend::Sqlite);
        assert_eq!(config.store_path(), PathBuf::from("data").join("bridge.db"));
        assert!(config.audit_on_connect);
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        fs::write(&path, "{ not json").unwrap();
        let config = load_config(path.to_str().unwrap());
        assert_eq!(config.store_file, "messages.json");
    }

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let bad = [
            AppConfig {
                relay_addr: "port 8080".into(),
                ..AppConfig::default()
            },
            AppConfig {
                upstream_url: "http://127.0.0.1:3000".into(),
                ..AppConfig::default()
            },
            AppConfig {
                store_file: " ".into(),
                ..AppConfig::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(BridgeError::Config(_))));
        }
    }

    #[test]
    fn save_into_unwritable_location_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        // The parent path is a file, so no directory can be created under it.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let path = blocker.join("bridge.json");

        assert!(matches!(
            save_config(path.to_str().unwrap(), &AppConfig::default()),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bridge.json");
        let path = path.to_str().unwrap();

        let config = AppConfig {
            max_reconnect_attempts: Some(3),
            ..AppConfig::default()
        };
        save_config(path, &config).unwrap();

        assert_eq!(load_config(path).max_reconnect_attempts, Some(3));
    }
}
