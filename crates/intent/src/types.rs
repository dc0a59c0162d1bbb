//! Hostlink Intent - Core Data Structures
//!
//! The closed intent vocabulary, interpretation results, execution outcomes,
//! and the per-turn records that flow between the interpreter, the dispatcher
//! and the session.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Parameter bag attached to an intent. Shape depends on the intent.
pub type Parameters = Map<String, Value>;

/// Closed set of actions a request can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    SetBrightness,
    ToggleWifi,
    ToggleBluetooth,
    SetVolume,
    GetVolume,
    GetBatteryStatus,
    GetCpuUsage,
    GetMemoryUsage,
    GetWifiStatus,
    GetBluetoothStatus,
    RunShellCommand,
    Unknown,
    ErrorBlocked,
}

impl IntentKind {
    /// Every intent, in vocabulary order
    pub const ALL: [IntentKind; 13] = [
        IntentKind::SetBrightness,
        IntentKind::ToggleWifi,
        IntentKind::ToggleBluetooth,
        IntentKind::SetVolume,
        IntentKind::GetVolume,
        IntentKind::GetBatteryStatus,
        IntentKind::GetCpuUsage,
        IntentKind::GetMemoryUsage,
        IntentKind::GetWifiStatus,
        IntentKind::GetBluetoothStatus,
        IntentKind::RunShellCommand,
        IntentKind::Unknown,
        IntentKind::ErrorBlocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::SetBrightness => "set_brightness",
            IntentKind::ToggleWifi => "toggle_wifi",
            IntentKind::ToggleBluetooth => "toggle_bluetooth",
            IntentKind::SetVolume => "set_volume",
            IntentKind::GetVolume => "get_volume",
            IntentKind::GetBatteryStatus => "get_battery_status",
            IntentKind::GetCpuUsage => "get_cpu_usage",
            IntentKind::GetMemoryUsage => "get_memory_usage",
            IntentKind::GetWifiStatus => "get_wifi_status",
            IntentKind::GetBluetoothStatus => "get_bluetooth_status",
            IntentKind::RunShellCommand => "run_shell_command",
            IntentKind::Unknown => "unknown",
            IntentKind::ErrorBlocked => "error_blocked",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IntentKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Result of interpreting one inbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    pub intent: IntentKind,
    #[serde(default)]
    pub parameters: Parameters,
}

impl Interpretation {
    pub fn new(intent: IntentKind, parameters: Parameters) -> Self {
        Self { intent, parameters }
    }

    /// Intent that takes no parameters
    pub fn bare(intent: IntentKind) -> Self {
        Self::new(intent, Parameters::new())
    }

    pub fn with_param(intent: IntentKind, key: &str, value: impl Into<Value>) -> Self {
        let mut parameters = Parameters::new();
        parameters.insert(key.to_string(), value.into());
        Self::new(intent, parameters)
    }

    /// `unknown` carrying a human-readable reason
    pub fn unknown(error: impl Into<String>) -> Self {
        Self::with_param(IntentKind::Unknown, "error", error.into())
    }

    /// The `error` parameter, if the interpreter attached one
    pub fn error_message(&self) -> Option<&str> {
        self.parameters.get("error").and_then(Value::as_str)
    }
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry of conversational history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Structured result of a shell execution, sent to the client as-is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellReport {
    pub command: String,
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub error_message: Option<String>,
}

impl ShellReport {
    /// Success requires a zero exit code and nothing at all on stderr.
    /// Streams are judged raw and trimmed only for display.
    pub fn completed(command: impl Into<String>, exit_code: i32, stdout: String, stderr: String) -> Self {
        let success = exit_code == 0 && stderr.is_empty();
        Self {
            command: command.into(),
            success,
            exit_code,
            stdout: stdout.trim().to_string(),
            stderr: stderr.trim().to_string(),
            error_message: None,
        }
    }

    /// The command never produced an exit status (timeout, spawn failure)
    pub fn aborted(command: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            success: false,
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            error_message: Some(error_message.into()),
        }
    }

    /// Stderr, or the abort reason when stderr is empty
    pub fn failure_detail(&self) -> Option<&str> {
        if !self.stderr.is_empty() {
            Some(self.stderr.as_str())
        } else {
            self.error_message.as_deref()
        }
    }

    pub fn summary(&self) -> String {
        if self.success {
            format!(
                "Command executed successfully: {}\nExit Code: {}\nStdout: {}",
                self.command,
                self.exit_code,
                non_empty_or_none(&self.stdout)
            )
        } else {
            format!(
                "Error executing command: {}\nExit Code: {}\nStderr: {}",
                self.command,
                self.exit_code,
                self.failure_detail().unwrap_or("(None)")
            )
        }
    }
}

fn non_empty_or_none(s: &str) -> &str {
    if s.is_empty() {
        "(None)"
    } else {
        s
    }
}

/// Normalized result of dispatching one intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
    /// Present only for shell execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<ShellReport>,
    /// Structured payload for capabilities that report objects (battery)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Outcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            structured: None,
            data: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            structured: None,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn shell(report: ShellReport) -> Self {
        Self {
            success: report.success,
            message: report.summary(),
            structured: Some(report),
            data: None,
        }
    }

    /// Text recorded as the assistant's reply in conversation history
    pub fn history_entry(&self) -> String {
        if let Some(report) = &self.structured {
            if let Ok(json) = serde_json::to_string(report) {
                return json;
            }
        }
        if let Some(data) = &self.data {
            return data.to_string();
        }
        self.message.clone()
    }
}

/// Last failed shell command, offered back to the interpreter for correction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingError {
    pub command: String,
    pub exit_code: i32,
    pub stderr: String,
}

impl PendingError {
    pub fn from_report(report: &ShellReport) -> Self {
        Self {
            command: report.command.clone(),
            exit_code: report.exit_code,
            stderr: report.failure_detail().unwrap_or_default().to_string(),
        }
    }

    /// Note appended to the interpreter's context for the next turn
    pub fn note(&self, current_request: &str) -> String {
        let stderr = if self.stderr.is_empty() {
            "(none)"
        } else {
            self.stderr.as_str()
        };
        format!(
            "SYSTEM_NOTE: The previous command '{}' failed (Exit Code: {}, Stderr: {}). \
             Please analyze this error and try to correct the command based on the user's \
             *current* request: '{}'",
            self.command, self.exit_code, stderr, current_request
        )
    }
}

/// Interpretation-side configuration, fixed at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    /// Whether `run_shell_command` may be produced and executed
    pub allow_shell_execution: bool,

    /// Maximum number of history entries kept per connection
    pub history_depth: usize,

    /// Consecutive turns that receive a failed command as correction context
    pub max_error_feedback_attempts: u32,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            allow_shell_execution: false,
            history_depth: 8,
            max_error_feedback_attempts: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_names_round_trip_through_serde() {
        let json = serde_json::to_string(&IntentKind::GetBluetoothStatus).unwrap();
        assert_eq!(json, "\"get_bluetooth_status\"");

        let kind: IntentKind = "run_shell_command".parse().unwrap();
        assert_eq!(kind, IntentKind::RunShellCommand);
        assert!("open_browser".parse::<IntentKind>().is_err());
    }

    #[test]
    fn test_stderr_with_zero_exit_is_failure() {
        let report = ShellReport::completed("echo ok", 0, "ok".into(), "warning: x".into());
        assert!(!report.success);
        assert!(report.summary().starts_with("Error executing command"));
    }

    #[test]
    fn test_whitespace_only_stderr_is_failure() {
        let report = ShellReport::completed("echo done", 0, "done\n".into(), "\n  \n".into());
        assert!(!report.success);
        assert_eq!(report.stdout, "done");
        assert_eq!(report.stderr, "");
    }

    #[test]
    fn test_clean_zero_exit_is_success() {
        let report = ShellReport::completed("touch done", 0, "done".into(), String::new());
        assert!(report.success);
        assert!(report.summary().contains("Stdout: done"));
    }

    #[test]
    fn test_pending_error_prefers_stderr_then_abort_reason() {
        let failed = ShellReport::completed("ls /nope", 2, String::new(), "No such file".into());
        assert_eq!(PendingError::from_report(&failed).stderr, "No such file");

        let timed_out = ShellReport::aborted("sleep 99", "Command timed out after 30 seconds.");
        let pending = PendingError::from_report(&timed_out);
        assert_eq!(pending.exit_code, -1);
        assert!(pending.stderr.contains("timed out"));
    }

    #[test]
    fn test_history_entry_serializes_shell_report() {
        let outcome = Outcome::shell(ShellReport::completed("true", 0, String::new(), String::new()));
        let entry = outcome.history_entry();
        let parsed: serde_json::Value = serde_json::from_str(&entry).unwrap();
        assert_eq!(parsed["command"], "true");
        assert_eq!(parsed["success"], true);

        assert_eq!(Outcome::success("CPU Usage: 3%").history_entry(), "CPU Usage: 3%");
    }
}
