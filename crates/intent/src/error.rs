//! Interpretation errors
//!
//! None of these escape a turn: the AI interpreter degrades every variant to
//! an `unknown` intent carrying the error's text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("AI interpretation is unavailable (no language model configured)")]
    Unconfigured,

    #[error("language model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("language model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("language model returned an empty reply")]
    EmptyReply,

    #[error("reply is not valid JSON: {0}")]
    MalformedReply(#[from] serde_json::Error),

    #[error("reply lacks required keys 'intent' and 'parameters'")]
    MissingKeys,

    #[error("reply names an intent outside the vocabulary: '{0}'")]
    UnrecognizedIntent(String),

    #[error("reply proposes a shell command while shell execution is disabled")]
    ShellDisabled,
}

impl InterpretError {
    /// Message placed in the `error` parameter of the fallback `unknown` intent
    pub fn fallback_message(&self) -> String {
        match self {
            InterpretError::Unconfigured => "AI interpretation is unavailable.".to_string(),
            InterpretError::MalformedReply(_) | InterpretError::MissingKeys => {
                "Failed to interpret command via AI (invalid format).".to_string()
            }
            InterpretError::UnrecognizedIntent(name) => {
                format!("AI proposed an unsupported action '{name}'.")
            }
            InterpretError::ShellDisabled => {
                "Shell command execution is disabled by server configuration.".to_string()
            }
            other => format!("Unexpected AI error: {other}"),
        }
    }
}
