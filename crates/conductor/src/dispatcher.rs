//! Dispatcher - Interpretation → Outcome
//!
//! Applies the shell policy, looks the intent up in the registry, validates
//! parameters, invokes the capability and folds every failure into an
//! `Outcome`. Nothing raised by a capability escapes `dispatch`.

use crate::registry::{Args, Capability, IntentRegistry};
use futures::FutureExt;
use hostlink_intent::{IntentKind, Interpretation, Outcome, ShellReport};
use std::panic::AssertUnwindSafe;
use std::time::Duration;

pub const SHELL_DISABLED_MESSAGE: &str = "Error: Shell command execution is disabled by server configuration.";

/// Terminal state of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    PolicyBlocked,
    NoHandler,
    NotUnderstood,
    ParamError,
    ExecError,
    /// Non-shell capability finished
    Completed,
    CommandSucceeded,
    CommandFailed,
    CommandTimedOut,
}

impl OutcomeKind {
    /// Only a failed or timed-out shell command seeds correction feedback
    pub fn seeds_feedback(&self) -> bool {
        matches!(self, OutcomeKind::CommandFailed | OutcomeKind::CommandTimedOut)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub kind: OutcomeKind,
    pub outcome: Outcome,
}

impl Dispatch {
    fn new(kind: OutcomeKind, outcome: Outcome) -> Self {
        Self { kind, outcome }
    }
}

pub struct Dispatcher {
    registry: IntentRegistry,
    allow_shell_execution: bool,
    shell_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: IntentRegistry, allow_shell_execution: bool, shell_timeout: Duration) -> Self {
        Self {
            registry,
            allow_shell_execution,
            shell_timeout,
        }
    }

    pub fn registry(&self) -> &IntentRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, interpretation: &Interpretation) -> Dispatch {
        let intent = interpretation.intent;

        if (intent == IntentKind::RunShellCommand && !self.allow_shell_execution)
            || intent == IntentKind::ErrorBlocked
        {
            log::warn!(
                "Blocked attempt to execute shell command (disabled): {:?}",
                interpretation.parameters.get("command")
            );
            return Dispatch::new(OutcomeKind::PolicyBlocked, Outcome::failure(SHELL_DISABLED_MESSAGE));
        }

        if intent == IntentKind::Unknown {
            let reason = interpretation.error_message().unwrap_or_default();
            return Dispatch::new(
                OutcomeKind::NotUnderstood,
                Outcome::failure(format!("Command not understood. {reason}")),
            );
        }

        let Some(capability) = self.registry.lookup(intent) else {
            log::error!("No handler registered for intent '{}'", intent);
            return Dispatch::new(
                OutcomeKind::NoHandler,
                Outcome::failure(format!("No handler defined for intent: {intent}")),
            );
        };

        let args = match capability.validate(&interpretation.parameters) {
            Ok(args) => args,
            Err(e) => {
                log::error!(
                    "Parameter mismatch for intent '{}': {}. Params: {:?}",
                    intent,
                    e,
                    interpretation.parameters
                );
                return Dispatch::new(OutcomeKind::ParamError, Outcome::failure(e.client_message()));
            }
        };

        log::debug!("Invoking '{}' ({:?})", intent, capability.mode);

        if intent == IntentKind::RunShellCommand {
            return self.run_shell(capability, args).await;
        }

        match self.guarded_invoke(capability, args).await {
            Ok(outcome) => Dispatch::new(OutcomeKind::Completed, outcome),
            Err(message) => {
                log::error!("Error executing handler for intent '{}': {}", intent, message);
                Dispatch::new(
                    OutcomeKind::ExecError,
                    Outcome::failure(format!("Error executing action for '{intent}': {message}")),
                )
            }
        }
    }

    /// Shell execution with the hard timeout. Dropping the future kills the child.
    async fn run_shell(&self, capability: &Capability, args: Args) -> Dispatch {
        let command = match &args {
            Args::Command(command) => command.clone(),
            _ => String::new(),
        };

        let outcome = match tokio::time::timeout(self.shell_timeout, self.guarded_invoke(capability, args)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(message)) => Outcome::shell(ShellReport::aborted(
                command.as_str(),
                format!("Error executing shell command: {message}"),
            )),
            Err(_) => {
                log::error!("Shell command timed out: {}", command);
                let report = ShellReport::aborted(
                    command.as_str(),
                    format!("Command timed out after {} seconds.", self.shell_timeout.as_secs()),
                );
                return Dispatch::new(OutcomeKind::CommandTimedOut, Outcome::shell(report));
            }
        };

        if outcome.success {
            log::info!("Shell command executed successfully. Exit Code: 0, Stderr: (empty)");
            Dispatch::new(OutcomeKind::CommandSucceeded, outcome)
        } else {
            if let Some(report) = &outcome.structured {
                log::warn!(
                    "Shell command failed (Exit Code: {}, Stderr: '{}')",
                    report.exit_code,
                    report.failure_detail().unwrap_or_default().chars().take(100).collect::<String>()
                );
            }
            Dispatch::new(OutcomeKind::CommandFailed, outcome)
        }
    }

    /// Invoke and turn backend errors and panics into a message
    async fn guarded_invoke(&self, capability: &Capability, args: Args) -> Result<Outcome, String> {
        match AssertUnwindSafe(self.registry.invoke(capability, args)).catch_unwind().await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(e.to_string()),
            Err(panic) => Err(panic_message(panic.as_ref())),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "capability panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BackendError, BatteryStatus, DeviceBackend, RadioState, ShellRun, VolumeReading};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    /// Records calls; behaviour is scripted per test
    #[derive(Default)]
    struct FakeBackend {
        calls: Mutex<Vec<String>>,
        shell: Mutex<Option<ShellRun>>,
        shell_delay: Option<Duration>,
        battery: Option<BatteryStatus>,
        fail_wifi: bool,
        panic_cpu: bool,
    }

    impl FakeBackend {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl DeviceBackend for FakeBackend {
        fn platform(&self) -> &str {
            "fake"
        }

        async fn set_brightness(&self, level: u8) -> Result<(), BackendError> {
            self.record(format!("set_brightness {level}"));
            Ok(())
        }

        async fn set_volume(&self, level: u8) -> Result<(), BackendError> {
            self.record(format!("set_volume {level}"));
            Ok(())
        }

        async fn get_volume(&self) -> Result<VolumeReading, BackendError> {
            self.record("get_volume");
            Ok(VolumeReading {
                level: 30,
                muted: true,
            })
        }

        async fn toggle_wifi(&self, state: RadioState) -> Result<(), BackendError> {
            self.record(format!("toggle_wifi {state}"));
            if self.fail_wifi {
                return Err(BackendError::CommandFailed {
                    command: "nmcli radio wifi on".to_string(),
                    detail: "NetworkManager is not running".to_string(),
                });
            }
            Ok(())
        }

        async fn toggle_bluetooth(&self, state: RadioState) -> Result<(), BackendError> {
            self.record(format!("toggle_bluetooth {state}"));
            Ok(())
        }

        async fn get_wifi_status(&self) -> Result<RadioState, BackendError> {
            self.record("get_wifi_status");
            Ok(RadioState::On)
        }

        async fn get_bluetooth_status(&self) -> Result<RadioState, BackendError> {
            self.record("get_bluetooth_status");
            Ok(RadioState::Off)
        }

        async fn get_battery_status(&self) -> Result<Option<BatteryStatus>, BackendError> {
            self.record("get_battery_status");
            Ok(self.battery)
        }

        fn get_cpu_usage(&self) -> Result<f32, BackendError> {
            self.record("get_cpu_usage");
            if self.panic_cpu {
                panic!("sensor exploded");
            }
            Ok(12.5)
        }

        fn get_memory_usage(&self) -> Result<f32, BackendError> {
            self.record("get_memory_usage");
            Ok(48.0)
        }

        async fn run_shell_command(&self, command: &str) -> Result<ShellRun, BackendError> {
            self.record(format!("run_shell_command {command}"));
            if let Some(delay) = self.shell_delay {
                tokio::time::sleep(delay).await;
            }
            self.shell
                .lock()
                .clone()
                .ok_or_else(|| BackendError::Unavailable("no shell scripted".to_string()))
        }
    }

    fn dispatcher(backend: Arc<FakeBackend>, allow_shell: bool) -> Dispatcher {
        Dispatcher::new(IntentRegistry::standard(backend), allow_shell, Duration::from_secs(30))
    }

    fn interp(value: serde_json::Value) -> Interpretation {
        serde_json::from_value(value).unwrap()
    }

    fn shell_run(exit_code: i32, stdout: &str, stderr: &str) -> Option<ShellRun> {
        Some(ShellRun {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        })
    }

    #[tokio::test]
    async fn test_shell_blocked_when_disabled() {
        let backend = Arc::new(FakeBackend::default());
        let dispatcher = dispatcher(backend.clone(), false);

        for params in [json!({"command": "rm -rf /tmp/x"}), json!({}), json!({"cmd": 1})] {
            let result = dispatcher
                .dispatch(&interp(json!({"intent": "run_shell_command", "parameters": params})))
                .await;
            assert_eq!(result.kind, OutcomeKind::PolicyBlocked);
            assert_eq!(result.outcome.message, SHELL_DISABLED_MESSAGE);
            assert!(result.outcome.structured.is_none());
        }

        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_volume_range_checked_before_backend() {
        let backend = Arc::new(FakeBackend::default());
        let dispatcher = dispatcher(backend.clone(), false);

        for level in [150, -1] {
            let result = dispatcher
                .dispatch(&interp(json!({"intent": "set_volume", "parameters": {"level": level}})))
                .await;
            assert_eq!(result.kind, OutcomeKind::ParamError);
        }
        assert!(backend.calls().is_empty());

        let result = dispatcher
            .dispatch(&interp(json!({"intent": "set_volume", "parameters": {"level": 50}})))
            .await;
        assert_eq!(result.kind, OutcomeKind::Completed);
        assert_eq!(result.outcome.message, "Volume set to 50%");
        assert_eq!(backend.calls(), vec!["set_volume 50"]);
    }

    #[tokio::test]
    async fn test_shell_stderr_with_zero_exit_is_failure() {
        let backend = Arc::new(FakeBackend {
            shell: Mutex::new(shell_run(0, "ok", "warning: x")),
            ..FakeBackend::default()
        });
        let dispatcher = dispatcher(backend, true);

        let result = dispatcher
            .dispatch(&interp(json!({"intent": "run_shell_command", "parameters": {"command": "make"}})))
            .await;

        assert_eq!(result.kind, OutcomeKind::CommandFailed);
        assert!(!result.outcome.success);
        let report = result.outcome.structured.unwrap();
        assert!(!report.success);
        assert_eq!(report.stderr, "warning: x");
        assert!(result.kind.seeds_feedback());
    }

    #[tokio::test]
    async fn test_shell_clean_exit_is_success() {
        let backend = Arc::new(FakeBackend {
            shell: Mutex::new(shell_run(0, "done", "")),
            ..FakeBackend::default()
        });
        let dispatcher = dispatcher(backend, true);

        let result = dispatcher
            .dispatch(&interp(json!({"intent": "run_shell_command", "parameters": {"command": "touch x"}})))
            .await;

        assert_eq!(result.kind, OutcomeKind::CommandSucceeded);
        assert!(result.outcome.success);
        assert_eq!(result.outcome.structured.unwrap().stdout, "done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shell_timeout_is_reported_distinctly() {
        let backend = Arc::new(FakeBackend {
            shell: Mutex::new(shell_run(0, "late", "")),
            shell_delay: Some(Duration::from_secs(120)),
            ..FakeBackend::default()
        });
        let dispatcher = dispatcher(backend, true);

        let result = dispatcher
            .dispatch(&interp(json!({"intent": "run_shell_command", "parameters": {"command": "sleep 120"}})))
            .await;

        assert_eq!(result.kind, OutcomeKind::CommandTimedOut);
        let report = result.outcome.structured.unwrap();
        assert_eq!(report.exit_code, -1);
        assert_eq!(report.error_message.as_deref(), Some("Command timed out after 30 seconds."));
        assert!(result.kind.seeds_feedback());
    }

    #[tokio::test]
    async fn test_shell_backend_error_lands_in_report() {
        let backend = Arc::new(FakeBackend::default());
        let dispatcher = dispatcher(backend, true);

        let result = dispatcher
            .dispatch(&interp(json!({"intent": "run_shell_command", "parameters": {"command": "ls"}})))
            .await;

        assert_eq!(result.kind, OutcomeKind::CommandFailed);
        let report = result.outcome.structured.unwrap();
        assert!(report.error_message.unwrap().contains("no shell scripted"));
    }

    #[tokio::test]
    async fn test_capability_error_is_caught() {
        let backend = Arc::new(FakeBackend {
            fail_wifi: true,
            ..FakeBackend::default()
        });
        let dispatcher = dispatcher(backend, false);

        let result = dispatcher
            .dispatch(&interp(json!({"intent": "toggle_wifi", "parameters": {"state": "on"}})))
            .await;

        assert_eq!(result.kind, OutcomeKind::ExecError);
        assert!(result
            .outcome
            .message
            .starts_with("Error executing action for 'toggle_wifi':"));
        assert!(result.outcome.message.contains("NetworkManager is not running"));
    }

    #[tokio::test]
    async fn test_capability_panic_is_caught() {
        let backend = Arc::new(FakeBackend {
            panic_cpu: true,
            ..FakeBackend::default()
        });
        let dispatcher = dispatcher(backend, false);

        let result = dispatcher
            .dispatch(&interp(json!({"intent": "get_cpu_usage", "parameters": {}})))
            .await;

        assert_eq!(result.kind, OutcomeKind::ExecError);
        assert!(result.outcome.message.contains("sensor exploded"));
    }

    #[tokio::test]
    async fn test_unknown_and_no_handler_are_distinct() {
        let backend = Arc::new(FakeBackend::default());
        let registry = IntentRegistry::standard(backend.clone()).without(IntentKind::GetBluetoothStatus);
        let dispatcher = Dispatcher::new(registry, false, Duration::from_secs(30));

        let unknown = dispatcher
            .dispatch(&Interpretation::unknown("AI interpretation is unavailable."))
            .await;
        assert_eq!(unknown.kind, OutcomeKind::NotUnderstood);
        assert_eq!(
            unknown.outcome.message,
            "Command not understood. AI interpretation is unavailable."
        );

        let missing = dispatcher
            .dispatch(&Interpretation::bare(IntentKind::GetBluetoothStatus))
            .await;
        assert_eq!(missing.kind, OutcomeKind::NoHandler);
        assert_eq!(
            missing.outcome.message,
            "No handler defined for intent: get_bluetooth_status"
        );

        assert!(backend.calls().is_empty());
    }

    async fn message(dispatcher: &Dispatcher, intent: IntentKind) -> Outcome {
        dispatcher.dispatch(&Interpretation::bare(intent)).await.outcome
    }

    #[tokio::test]
    async fn test_query_messages() {
        let backend = Arc::new(FakeBackend {
            battery: Some(BatteryStatus {
                percent: 76.6,
                charging: true,
            }),
            ..FakeBackend::default()
        });
        let dispatcher = dispatcher(backend, false);

        assert_eq!(message(&dispatcher, IntentKind::GetCpuUsage).await.message, "CPU Usage: 12.5%");
        assert_eq!(message(&dispatcher, IntentKind::GetMemoryUsage).await.message, "Memory Usage: 48.0%");
        assert_eq!(message(&dispatcher, IntentKind::GetVolume).await.message, "Current Volume: Muted (30%)");
        assert_eq!(message(&dispatcher, IntentKind::GetWifiStatus).await.message, "Wi-Fi Status: on");
        assert_eq!(message(&dispatcher, IntentKind::GetBluetoothStatus).await.message, "Bluetooth Status: off");

        let battery = message(&dispatcher, IntentKind::GetBatteryStatus).await;
        assert_eq!(
            battery.data,
            Some(json!({"percent": 77, "charging": true, "status_text": "Battery: 77% (Charging)"}))
        );
    }

    #[tokio::test]
    async fn test_missing_battery() {
        let backend = Arc::new(FakeBackend::default());
        let dispatcher = dispatcher(backend, false);

        let result = dispatcher
            .dispatch(&Interpretation::bare(IntentKind::GetBatteryStatus))
            .await;
        assert_eq!(result.outcome.message, "No battery detected.");
        assert!(result.outcome.data.is_none());
    }
}
