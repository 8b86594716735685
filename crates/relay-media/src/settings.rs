//! Engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Settings for the worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Path to the SFU worker executable.
    pub executable: PathBuf,

    /// Log level handed to the worker on spawn.
    pub log_level: String,

    /// Lower bound of the RTC port range.
    pub rtc_min_port: u16,

    /// Upper bound of the RTC port range.
    pub rtc_max_port: u16,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("sfu-worker"),
            log_level: "warn".to_string(),
            rtc_min_port: 40000,
            rtc_max_port: 49999,
        }
    }
}

/// Settings for router creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Codec capability list handed to the router verbatim.
    pub media_codecs: serde_json::Value,
}

/// Settings for WebRTC transport creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Listen address/announced-address pairs handed to the engine verbatim.
    pub listen_infos: serde_json::Value,

    /// Incoming-bitrate cap applied to each new transport, best effort.
    pub max_incoming_bitrate: Option<u32>,

    /// Initial outgoing bitrate hint for new transports.
    pub initial_available_outgoing_bitrate: Option<u32>,
}
