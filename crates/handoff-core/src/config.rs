use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::transport::Strategy;

/// Device brand and model, used to build the advertised endpoint name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub brand: String,
    pub model: String,
}

impl DeviceInfo {
    /// `"<brand>: <model>"`, the name both roles show to peers.
    pub fn endpoint_name(&self) -> String {
        format!("{}: {}", self.brand, self.model)
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        let model = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            brand: std::env::consts::OS.to_string(),
            model,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// Directory holding config.json and the incoming directory
    pub data_dir: PathBuf,

    /// Stable identifier scoping advertise/discover to our own peers
    pub service_id: String,

    pub device: DeviceInfo,

    /// Connection strategy shared by both roles
    pub strategy: Strategy,

    /// Whether a sender relays the file to a next peer after a successful send
    pub chain_after_send: bool,

    /// Give up on a phase after this many silent seconds (None = wait forever)
    pub phase_timeout_secs: Option<u64>,

    /// Payload chunk size used by streaming transports (64 KiB)
    pub chunk_size: usize,

    /// Port for inbound links (0 = ephemeral)
    pub listen_port: u16,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".handoff"),
            service_id: "dev.handoff.relay".to_string(),
            device: DeviceInfo::default(),
            strategy: Strategy::PointToPoint,
            chain_after_send: true,
            phase_timeout_secs: None,
            chunk_size: 64 * 1024,
            listen_port: 0,
        }
    }
}

impl HandoffConfig {
    pub fn with_device(mut self, brand: String, model: String) -> Self {
        self.device = DeviceInfo { brand, model };
        self
    }

    pub fn endpoint_name(&self) -> String {
        self.device.endpoint_name()
    }

    pub fn phase_timeout(&self) -> Option<Duration> {
        self.phase_timeout_secs.map(Duration::from_secs)
    }

    pub fn incoming_dir(&self) -> PathBuf {
        self.data_dir.join("incoming")
    }

    pub fn ensure_data_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.incoming_dir())?;
        Ok(())
    }
}
