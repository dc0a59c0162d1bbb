//! Device Backend - Host capabilities behind one interface
//!
//! One method per intent. Everything platform-specific lives behind this trait
//! so that dispatch and interpretation can be exercised with a fake backend.

mod host;

pub use host::{HostBackend, Platform};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0} is not supported on this platform")]
    Unsupported(String),

    #[error("command '{command}' failed: {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse {what} from output: {output}")]
    Parse { what: String, output: String },

    #[error("{0}")]
    Unavailable(String),
}

/// Radio power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioState {
    On,
    Off,
}

impl RadioState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "on" => Some(RadioState::On),
            "off" => Some(RadioState::Off),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RadioState::On => "on",
            RadioState::Off => "off",
        }
    }
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output volume and mute flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeReading {
    pub level: u8,
    pub muted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    pub percent: f32,
    pub charging: bool,
}

/// Raw result of a shell command, before success is judged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRun {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Host-level primitives, one per intent
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Short platform name for logs
    fn platform(&self) -> &str;

    async fn set_brightness(&self, level: u8) -> Result<(), BackendError>;

    async fn set_volume(&self, level: u8) -> Result<(), BackendError>;

    async fn get_volume(&self) -> Result<VolumeReading, BackendError>;

    async fn toggle_wifi(&self, state: RadioState) -> Result<(), BackendError>;

    async fn toggle_bluetooth(&self, state: RadioState) -> Result<(), BackendError>;

    async fn get_wifi_status(&self) -> Result<RadioState, BackendError>;

    async fn get_bluetooth_status(&self) -> Result<RadioState, BackendError>;

    /// `None` when the host has no battery
    async fn get_battery_status(&self) -> Result<Option<BatteryStatus>, BackendError>;

    /// Percent, 0..=100
    fn get_cpu_usage(&self) -> Result<f32, BackendError>;

    /// Percent, 0..=100
    fn get_memory_usage(&self) -> Result<f32, BackendError>;

    /// Run through the platform shell. The caller bounds the duration.
    async fn run_shell_command(&self, command: &str) -> Result<ShellRun, BackendError>;
}
