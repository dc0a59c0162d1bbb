//! Intent Registry - Intent → backend capability
//!
//! Each entry records the parameter shape a capability expects and whether it
//! suspends on I/O. Parameters are validated against the shape before the
//! backend is touched, so out-of-range or malformed values never reach it.

use crate::device::{BackendError, DeviceBackend, RadioState};
use hostlink_intent::{IntentKind, Outcome, Parameters, ShellReport};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Parameters a capability takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamShape {
    /// No parameters
    Empty,
    /// `level`: integer in 0..=100
    Level,
    /// `state`: "on" | "off"
    State,
    /// `command`: string
    Command,
}

/// Whether invoking the capability waits on I/O
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Computed in place (CPU, memory)
    Immediate,
    /// Spawns processes or touches the filesystem
    Suspending,
}

/// Validated parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Args {
    None,
    Level(u8),
    State(RadioState),
    Command(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("parameters do not match action '{intent}': {detail}")]
    Mismatch { intent: IntentKind, detail: String },

    #[error("{subject} level must be between 0 and 100")]
    OutOfRange { subject: &'static str, value: i64 },

    #[error("State must be 'on' or 'off'")]
    InvalidState(String),
}

impl ParamError {
    /// Reply text for the client
    pub fn client_message(&self) -> String {
        match self {
            ParamError::Mismatch { intent, .. } => {
                format!("Error: Incorrect parameters provided for action '{intent}'.")
            }
            other => format!("Error: {other}."),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Capability {
    pub intent: IntentKind,
    pub shape: ParamShape,
    pub mode: InvocationMode,
}

impl Capability {
    const fn new(intent: IntentKind, shape: ParamShape, mode: InvocationMode) -> Self {
        Self {
            intent,
            shape,
            mode,
        }
    }

    /// Check `parameters` against this capability's shape
    pub fn validate(&self, parameters: &Parameters) -> Result<Args, ParamError> {
        let mismatch = |detail: String| ParamError::Mismatch {
            intent: self.intent,
            detail,
        };

        let expected: &[&str] = match self.shape {
            ParamShape::Empty => &[],
            ParamShape::Level => &["level"],
            ParamShape::State => &["state"],
            ParamShape::Command => &["command"],
        };

        if let Some(extra) = parameters.keys().find(|k| !expected.contains(&k.as_str())) {
            return Err(mismatch(format!("unexpected parameter '{extra}'")));
        }

        let Some(key) = expected.first() else {
            return Ok(Args::None);
        };
        let value = parameters
            .get(*key)
            .ok_or_else(|| mismatch(format!("missing parameter '{key}'")))?;

        match self.shape {
            ParamShape::Empty => Ok(Args::None),
            ParamShape::Level => {
                let level = integer(value).ok_or_else(|| mismatch(format!("'level' is not an integer: {value}")))?;
                if !(0..=100).contains(&level) {
                    return Err(ParamError::OutOfRange {
                        subject: level_subject(self.intent),
                        value: level,
                    });
                }
                Ok(Args::Level(level as u8))
            }
            ParamShape::State => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| mismatch(format!("'state' is not a string: {value}")))?;
                RadioState::parse(raw)
                    .map(Args::State)
                    .ok_or_else(|| ParamError::InvalidState(raw.to_string()))
            }
            ParamShape::Command => value
                .as_str()
                .map(|command| Args::Command(command.to_string()))
                .ok_or_else(|| mismatch(format!("'command' is not a string: {value}"))),
        }
    }
}

/// Whole numbers only; `50.0` is accepted, `50.5` and `"50"` are not
fn integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn level_subject(intent: IntentKind) -> &'static str {
    match intent {
        IntentKind::SetBrightness => "Brightness",
        _ => "Volume",
    }
}

const STANDARD: &[Capability] = &[
    Capability::new(IntentKind::SetBrightness, ParamShape::Level, InvocationMode::Suspending),
    Capability::new(IntentKind::ToggleWifi, ParamShape::State, InvocationMode::Suspending),
    Capability::new(IntentKind::ToggleBluetooth, ParamShape::State, InvocationMode::Suspending),
    Capability::new(IntentKind::SetVolume, ParamShape::Level, InvocationMode::Suspending),
    Capability::new(IntentKind::GetVolume, ParamShape::Empty, InvocationMode::Suspending),
    Capability::new(IntentKind::GetBatteryStatus, ParamShape::Empty, InvocationMode::Suspending),
    Capability::new(IntentKind::GetCpuUsage, ParamShape::Empty, InvocationMode::Immediate),
    Capability::new(IntentKind::GetMemoryUsage, ParamShape::Empty, InvocationMode::Immediate),
    Capability::new(IntentKind::GetWifiStatus, ParamShape::Empty, InvocationMode::Suspending),
    Capability::new(IntentKind::GetBluetoothStatus, ParamShape::Empty, InvocationMode::Suspending),
    Capability::new(IntentKind::RunShellCommand, ParamShape::Command, InvocationMode::Suspending),
];

/// Maps intents to capabilities of one backend
pub struct IntentRegistry {
    backend: Arc<dyn DeviceBackend>,
    entries: HashMap<IntentKind, Capability>,
}

impl IntentRegistry {
    /// Every capability the bridge knows about
    pub fn standard(backend: Arc<dyn DeviceBackend>) -> Self {
        let entries = STANDARD.iter().map(|c| (c.intent, *c)).collect();
        Self { backend, entries }
    }

    /// Drop one capability; dispatching it then reports "no handler"
    pub fn without(mut self, intent: IntentKind) -> Self {
        self.entries.remove(&intent);
        self
    }

    pub fn lookup(&self, intent: IntentKind) -> Option<&Capability> {
        self.entries.get(&intent)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn backend(&self) -> &Arc<dyn DeviceBackend> {
        &self.backend
    }

    /// Run a capability with validated arguments.
    ///
    /// Shell commands never fail here: spawn errors land in the report.
    /// The caller bounds shell execution time.
    pub async fn invoke(&self, capability: &Capability, args: Args) -> Result<Outcome, BackendError> {
        let backend = self.backend.as_ref();

        let outcome = match (capability.intent, args) {
            (IntentKind::SetBrightness, Args::Level(level)) => {
                backend.set_brightness(level).await?;
                Outcome::success(format!("Brightness set to {level}%"))
            }
            (IntentKind::SetVolume, Args::Level(level)) => {
                backend.set_volume(level).await?;
                Outcome::success(format!("Volume set to {level}%"))
            }
            (IntentKind::GetVolume, _) => {
                let reading = backend.get_volume().await?;
                if reading.muted {
                    Outcome::success(format!("Current Volume: Muted ({}%)", reading.level))
                } else {
                    Outcome::success(format!("Current Volume: {}%", reading.level))
                }
            }
            (IntentKind::ToggleWifi, Args::State(state)) => {
                backend.toggle_wifi(state).await?;
                Outcome::success(format!("Wi-Fi toggled {state}."))
            }
            (IntentKind::ToggleBluetooth, Args::State(state)) => {
                backend.toggle_bluetooth(state).await?;
                Outcome::success(format!("Bluetooth toggled {state}."))
            }
            (IntentKind::GetWifiStatus, _) => {
                let state = backend.get_wifi_status().await?;
                Outcome::success(format!("Wi-Fi Status: {state}"))
            }
            (IntentKind::GetBluetoothStatus, _) => {
                let state = backend.get_bluetooth_status().await?;
                Outcome::success(format!("Bluetooth Status: {state}"))
            }
            (IntentKind::GetBatteryStatus, _) => match backend.get_battery_status().await? {
                Some(battery) => {
                    let percent = battery.percent.round() as i64;
                    let status_text = format!(
                        "Battery: {percent}% ({})",
                        if battery.charging { "Charging" } else { "Discharging" }
                    );
                    Outcome::success(status_text.clone()).with_data(json!({
                        "percent": percent,
                        "charging": battery.charging,
                        "status_text": status_text,
                    }))
                }
                None => Outcome::success("No battery detected."),
            },
            (IntentKind::GetCpuUsage, _) => {
                let usage = backend.get_cpu_usage()?;
                Outcome::success(format!("CPU Usage: {usage:.1}%"))
            }
            (IntentKind::GetMemoryUsage, _) => {
                let usage = backend.get_memory_usage()?;
                Outcome::success(format!("Memory Usage: {usage:.1}%"))
            }
            (IntentKind::RunShellCommand, Args::Command(command)) => {
                log::warn!("EXECUTING SHELL COMMAND: {}", command);
                let report = match backend.run_shell_command(&command).await {
                    Ok(run) => ShellReport::completed(command, run.exit_code, run.stdout, run.stderr),
                    Err(e) => {
                        log::error!("Error executing shell command '{}': {}", command, e);
                        ShellReport::aborted(command, format!("Error executing shell command: {e}"))
                    }
                };
                Outcome::shell(report)
            }
            (intent, args) => {
                return Err(BackendError::Unavailable(format!(
                    "no capability accepts {args:?} for '{intent}'"
                )))
            }
        };

        Ok(outcome)
    }
}
