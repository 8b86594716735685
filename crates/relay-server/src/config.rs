//! Server configuration loaded from a JSON file.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use relay_engine::EngineConfig;

/// Relay server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds.
    pub listen_ip: IpAddr,

    /// Port the listener binds.
    pub listen_port: u16,

    /// Directory of static browser-client files.
    pub public_dir: PathBuf,

    /// Engine settings handed to the orchestrator.
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_ip: [0, 0, 0, 0].into(),
            listen_port: 3000,
            public_dir: PathBuf::from("public"),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{ "listen_port": 8443 }"#).unwrap();
        assert_eq!(config.listen_port, 8443);
        assert_eq!(config.public_dir, PathBuf::from("public"));
    }

    #[test]
    fn test_engine_settings_parse() {
        let config: ServerConfig = serde_json::from_str(
            r#"{
                "engine": {
                    "worker": { "executable": "/usr/bin/sfu-worker", "log_level": "debug",
                                "rtc_min_port": 20000, "rtc_max_port": 29999 },
                    "router": { "media_codecs": [] },
                    "transport": { "listen_infos": [{ "ip": "0.0.0.0" }],
                                   "max_incoming_bitrate": 1500000 }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.engine.worker.rtc_min_port, 20000);
        assert_eq!(config.engine.transport.max_incoming_bitrate, Some(1500000));
    }
}
