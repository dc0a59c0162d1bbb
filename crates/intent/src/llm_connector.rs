//! LLM Connector - Model-backed interpretation
//!
//! Used only when no rule decides an utterance. Builds a system prompt that
//! describes the host, the intent vocabulary and the shell policy, sends it
//! with the conversation history to a chat-completions model, and parses the
//! JSON reply back into an [`Interpretation`].
//!
//! Every failure degrades to an `unknown` intent; nothing here returns an
//! error to the caller of [`AiInterpreter::interpret`].

use crate::error::InterpretError;
use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// One message of a chat-completions request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

/// External language model that answers with a JSON object
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send the conversation and return the raw reply text
    async fn complete_json(&self, messages: &[ChatMessage]) -> Result<String, InterpretError>;

    fn model_name(&self) -> &str;
}

/// OpenAI-compatible chat-completions client
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

impl OpenAiChat {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InterpretError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn complete_json(&self, messages: &[ChatMessage]) -> Result<String, InterpretError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = CompletionRequest {
            model: &self.model,
            messages,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InterpretError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(InterpretError::EmptyReply)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Identity of the host, as shown to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsContext {
    /// `std::env::consts::OS` style family name
    pub family: String,
    /// Human-readable distribution / release
    pub description: String,
}

impl OsContext {
    pub fn new(family: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            description: description.into(),
        }
    }

    /// Detect from the running system
    pub fn detect() -> Self {
        let family = std::env::consts::OS.to_string();

        let distro = match (sysinfo::System::name(), sysinfo::System::os_version()) {
            (Some(name), Some(version)) => Some(format!("{name} {version}")),
            (Some(name), None) => Some(name),
            _ => None,
        };

        let description = distro
            .or_else(|| sysinfo::System::kernel_version().map(|release| format!("{family} {release}")))
            .unwrap_or_else(|| {
                if family == "linux" {
                    "Linux (Unknown Distribution)".to_string()
                } else {
                    family.clone()
                }
            });

        Self {
            family,
            description,
        }
    }

    pub fn is_linux(&self) -> bool {
        self.family == "linux"
    }
}

/// Model-backed interpreter with a shell-execution policy
pub struct AiInterpreter {
    model: Option<Arc<dyn LanguageModel>>,
    os: OsContext,
    allow_shell_execution: bool,
}

impl AiInterpreter {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, os: OsContext, allow_shell_execution: bool) -> Self {
        Self {
            model,
            os,
            allow_shell_execution,
        }
    }

    /// Check if a model is configured
    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_info(&self) -> String {
        match &self.model {
            Some(model) => format!("LLM enabled (model: {})", model.model_name()),
            None => "LLM not configured - rule matching only".to_string(),
        }
    }

    /// Interpret an utterance with history; never fails
    pub async fn interpret(&self, utterance: &str, history: &[Turn]) -> Interpretation {
        match self.try_interpret(utterance, history).await {
            Ok(interpretation) => interpretation,
            Err(InterpretError::Unconfigured) => {
                log::debug!("No language model configured; '{}' stays unknown", utterance);
                Interpretation::unknown(InterpretError::Unconfigured.fallback_message())
            }
            Err(InterpretError::ShellDisabled) => {
                log::warn!("LLM proposed a shell command while execution is disabled; blocking");
                Interpretation::unknown(InterpretError::ShellDisabled.fallback_message())
            }
            Err(e) => {
                log::error!("AI interpretation failed for '{}': {}", utterance, e);
                Interpretation::unknown(e.fallback_message())
            }
        }
    }

    async fn try_interpret(&self, utterance: &str, history: &[Turn]) -> Result<Interpretation, InterpretError> {
        let model = self.model.as_ref().ok_or(InterpretError::Unconfigured)?;

        log::info!("Querying LLM for: '{}' ({} history entries)", utterance, history.len());

        let messages = self.build_messages(utterance, history);
        let reply = model.complete_json(&messages).await?;
        let value: Value = serde_json::from_str(reply.trim())?;

        // Policy comes before shape: a shell proposal is refused however it is formed
        let proposes_shell = proposed_intent(&value) == Some(IntentKind::RunShellCommand.as_str());
        if proposes_shell && !self.allow_shell_execution {
            return Err(InterpretError::ShellDisabled);
        }
        let interpretation = interpretation_from(&value)?;

        log::info!("AI interpretation: {:?}", interpretation);
        Ok(interpretation)
    }

    /// System prompt + history + the current utterance
    pub fn build_messages(&self, utterance: &str, history: &[Turn]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage {
            role: Role::System,
            content: self.system_prompt(),
        });
        messages.extend(history.iter().map(ChatMessage::from));
        messages.push(ChatMessage {
            role: Role::User,
            content: utterance.to_string(),
        });
        messages
    }

    /// Generate the system prompt for intent extraction
    pub fn system_prompt(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str(
            "You interpret user commands for controlling a device or running tasks on the target system.\n",
        );
        prompt.push_str(&format!(
            "The target system is running: {}. Use this to choose appropriate commands \
             (for example the right package manager).\n",
            self.os.description
        ));
        prompt.push_str(
            "Identify the user's intent and extract its parameters from the command and, where relevant, \
             the previous conversation (pronouns like \"it\", or follow-ups on earlier output).\n",
        );
        prompt.push_str(
            "If a SYSTEM_NOTE in the history reports that the previous command failed, analyze the error \
             and produce a corrected command when the current request implies fixing it.\n",
        );
        prompt.push_str(
            "Respond ONLY with a JSON object with the keys \"intent\" and \"parameters\". \
             No explanation or surrounding text.\n\n",
        );

        prompt.push_str("Available intents and their parameters:\n");
        prompt.push_str("- \"set_brightness\": requires \"level\" (integer 0-100).\n");
        prompt.push_str("- \"toggle_wifi\": requires \"state\" (\"on\" or \"off\").\n");
        prompt.push_str("- \"toggle_bluetooth\": requires \"state\" (\"on\" or \"off\").\n");
        prompt.push_str("- \"set_volume\": requires \"level\" (integer 0-100).\n");
        prompt.push_str("- \"get_volume\": no parameters.\n");
        prompt.push_str("- \"get_battery_status\": no parameters.\n");
        prompt.push_str("- \"get_cpu_usage\": no parameters.\n");
        prompt.push_str("- \"get_memory_usage\": no parameters.\n");
        prompt.push_str("- \"get_wifi_status\": no parameters.\n");
        prompt.push_str("- \"get_bluetooth_status\": no parameters.\n");

        if self.allow_shell_execution {
            prompt.push_str(
                "- \"run_shell_command\": requires \"command\" (string, the exact shell command to execute).\n",
            );
            prompt.push_str(
                "    Example: {\"intent\": \"run_shell_command\", \"parameters\": {\"command\": \"ls -l /tmp\"}}\n",
            );
            if self.os.is_linux() {
                prompt.push_str(
                    "    Example: {\"intent\": \"run_shell_command\", \"parameters\": {\"command\": \"firefox &\"}}\n",
                );
                prompt.push_str(
                    "    When opening GUI applications or files, ALWAYS append ' &' so the program runs in the background.\n",
                );
            }
        }

        prompt.push_str(
            "\nIf the command is unclear, matches no intent, or lacks required parameters even with the \
             context, respond with: {\"intent\": \"unknown\", \"parameters\": {\"error\": \
             \"Command not understood or parameters missing.\"}}\n",
        );

        if self.allow_shell_execution {
            prompt.push_str(
                "\nSECURITY NOTE: \"run_shell_command\" is ENABLED and executes arbitrary commands. \
                 Be extremely careful what you ask it to run.\n",
            );
        } else {
            prompt.push_str(
                "\nNOTE: \"run_shell_command\" is disabled by server configuration; never produce it.\n",
            );
        }

        prompt
    }
}

/// Parse a model reply into an interpretation
pub fn parse_reply(reply: &str) -> Result<Interpretation, InterpretError> {
    let value: Value = serde_json::from_str(reply.trim())?;
    interpretation_from(&value)
}

fn proposed_intent(value: &Value) -> Option<&str> {
    value.get("intent").and_then(Value::as_str)
}

fn interpretation_from(value: &Value) -> Result<Interpretation, InterpretError> {
    let object = value.as_object().ok_or(InterpretError::MissingKeys)?;

    let intent = object
        .get("intent")
        .and_then(Value::as_str)
        .ok_or(InterpretError::MissingKeys)?;
    let parameters = match object.get("parameters") {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::Null) => Parameters::new(),
        _ => return Err(InterpretError::MissingKeys),
    };

    let intent = intent
        .parse::<IntentKind>()
        .map_err(InterpretError::UnrecognizedIntent)?;

    Ok(Interpretation::new(intent, parameters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Returns a canned reply and records what it was sent
    struct ScriptedModel {
        reply: Result<String, ()>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete_json(&self, messages: &[ChatMessage]) -> Result<String, InterpretError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.reply.clone().map_err(|_| InterpretError::EmptyReply)
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn linux() -> OsContext {
        OsContext::new("linux", "Ubuntu 24.04")
    }

    #[test]
    fn test_prompt_mentions_os_and_shell_policy() {
        let disabled = AiInterpreter::new(None, linux(), false);
        let prompt = disabled.system_prompt();
        assert!(prompt.contains("Ubuntu 24.04"));
        assert!(prompt.contains("get_bluetooth_status"));
        assert!(!prompt.contains("requires \"command\""));
        assert!(prompt.contains("disabled by server configuration"));

        let enabled = AiInterpreter::new(None, linux(), true);
        let prompt = enabled.system_prompt();
        assert!(prompt.contains("requires \"command\""));
        assert!(prompt.contains("append ' &'"));
        assert!(prompt.contains("SECURITY NOTE"));
    }

    #[test]
    fn test_background_hint_is_linux_only() {
        let mac = AiInterpreter::new(None, OsContext::new("macos", "macOS 14.5"), true);
        assert!(!mac.system_prompt().contains("append ' &'"));
    }

    #[test]
    fn test_parse_reply() {
        let parsed = parse_reply(r#"{"intent": "set_volume", "parameters": {"level": 40}}"#).unwrap();
        assert_eq!(parsed.intent, IntentKind::SetVolume);
        assert_eq!(parsed.parameters["level"], json!(40));

        assert!(matches!(parse_reply("not json"), Err(InterpretError::MalformedReply(_))));
        assert!(matches!(parse_reply(r#"{"intent": "get_volume"}"#), Err(InterpretError::MissingKeys)));
        assert!(matches!(parse_reply("[1, 2]"), Err(InterpretError::MissingKeys)));
        assert!(matches!(
            parse_reply(r#"{"intent": "reboot", "parameters": {}}"#),
            Err(InterpretError::UnrecognizedIntent(name)) if name == "reboot"
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_model_degrades_to_unknown() {
        let interpreter = AiInterpreter::new(None, linux(), false);
        let result = interpreter.interpret("open the pod bay doors", &[]).await;
        assert_eq!(result.intent, IntentKind::Unknown);
        assert_eq!(result.error_message(), Some("AI interpretation is unavailable."));
    }

    #[tokio::test]
    async fn test_model_failure_degrades_to_unknown() {
        let interpreter = AiInterpreter::new(Some(ScriptedModel::failing()), linux(), false);
        let result = interpreter.interpret("do something", &[]).await;
        assert_eq!(result.intent, IntentKind::Unknown);
        assert!(result.error_message().unwrap().starts_with("Unexpected AI error"));

        let garbled = AiInterpreter::new(Some(ScriptedModel::replying("{oops")), linux(), false);
        let result = garbled.interpret("do something", &[]).await;
        assert_eq!(
            result.error_message(),
            Some("Failed to interpret command via AI (invalid format).")
        );
    }

    #[tokio::test]
    async fn test_shell_reply_rewritten_when_disabled() {
        let model = ScriptedModel::replying(
            r#"{"intent": "run_shell_command", "parameters": {"command": "rm -rf /"}}"#,
        );
        let interpreter = AiInterpreter::new(Some(model), linux(), false);
        let result = interpreter.interpret("clean up everything", &[]).await;
        assert_eq!(result.intent, IntentKind::Unknown);
        assert_eq!(
            result.error_message(),
            Some("Shell command execution is disabled by server configuration.")
        );
    }

    #[tokio::test]
    async fn test_malformed_shell_reply_gets_policy_message() {
        let model = ScriptedModel::replying(r#"{"intent": "run_shell_command"}"#);
        let interpreter = AiInterpreter::new(Some(model), linux(), false);
        let result = interpreter.interpret("open a terminal", &[]).await;
        assert_eq!(result.intent, IntentKind::Unknown);
        assert_eq!(
            result.error_message(),
            Some("Shell command execution is disabled by server configuration.")
        );

        // with shell allowed the same reply is just malformed
        let model = ScriptedModel::replying(r#"{"intent": "run_shell_command"}"#);
        let interpreter = AiInterpreter::new(Some(model), linux(), true);
        let result = interpreter.interpret("open a terminal", &[]).await;
        assert_eq!(
            result.error_message(),
            Some("Failed to interpret command via AI (invalid format).")
        );
    }

    #[tokio::test]
    async fn test_history_is_sent_between_prompt_and_utterance() {
        let model = ScriptedModel::replying(r#"{"intent": "get_volume", "parameters": {}}"#);
        let interpreter = AiInterpreter::new(Some(model.clone()), linux(), true);
        let history = vec![Turn::user("set volume to 20"), Turn::assistant("Volume set to 20%")];

        let result = interpreter.interpret("what is it now", &history).await;
        assert_eq!(result.intent, IntentKind::GetVolume);

        let seen = model.seen.lock().unwrap();
        let sent = &seen[0];
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(sent[1].content, "set volume to 20");
        assert_eq!(sent[3].content, "what is it now");
    }
}
