//! Device identity: how to reach the emulator over `adb`.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

fn default_adb_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_adb_port() -> u16 {
    16384
}

/// Location of the `adb` executable and the emulator it should talk to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Path to the `adb` executable.
    pub adb_path: String,
    /// Emulator host used by `adb connect`.
    #[serde(default = "default_adb_ip")]
    pub adb_ip: String,
    /// Emulator port used by `adb connect`.
    #[serde(default = "default_adb_port")]
    pub adb_port: u16,
    /// Serial passed as `adb -s <device_id>` when several devices are attached.
    #[serde(default)]
    pub device_id: Option<String>,
}

impl DeviceSettings {
    /// `host:port` as understood by `adb connect`.
    #[must_use]
    pub fn connect_addr(&self) -> String {
        format!("{}:{}", self.adb_ip, self.adb_port)
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.adb_path.trim().is_empty() {
            return Err(ValidationError::EmptyAdbPath);
        }
        Ok(())
    }
}
