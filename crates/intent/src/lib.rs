//! Hostlink Intent - Command Interpretation
//!
//! Reduces free-text commands to a small, closed vocabulary of intents.
//!
//! # Architecture
//!
//! - **Rule Interpreter**: ordered keyword rules, no I/O
//! - **LLM Connector**: model fallback with OS context, history and shell policy
//! - **Intent Engine**: rules first, model second
//! - **Session**: bounded history and failed-command feedback per connection
//!
//! # Usage
//!
//! ```rust,no_run
//! use hostlink_intent::{IntentConfig, IntentEngine, OsContext, Session};
//!
//! # async fn demo() {
//! let config = IntentConfig::default();
//! let engine = IntentEngine::new(&config, None, OsContext::detect());
//! let mut session = Session::new(&config);
//!
//! let context = session.on_turn_start("get cpu usage");
//! let resolution = engine.interpret("get cpu usage", &context).await;
//! println!("{:?}", resolution.interpretation);
//! # }
//! ```

pub mod error;
pub mod llm_connector;
pub mod rules;
pub mod session;
pub mod types;

pub use error::InterpretError;
pub use llm_connector::{AiInterpreter, ChatMessage, LanguageModel, OpenAiChat, OsContext};
pub use rules::RuleInterpreter;
pub use session::{History, Session};
pub use types::*;

use std::sync::Arc;

/// Which interpreter produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Rule,
    Model,
}

/// Interpretation plus where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub interpretation: Interpretation,
    pub source: Source,
}

/// Rules first, model second
pub struct IntentEngine {
    rules: RuleInterpreter,
    ai: AiInterpreter,
}

impl IntentEngine {
    pub fn new(config: &IntentConfig, model: Option<Arc<dyn LanguageModel>>, os: OsContext) -> Self {
        Self {
            rules: RuleInterpreter::new(),
            ai: AiInterpreter::new(model, os, config.allow_shell_execution),
        }
    }

    /// Interpret one utterance against this turn's history
    pub async fn interpret(&self, utterance: &str, history: &[Turn]) -> Resolution {
        log::info!("Interpreting command: '{}'", utterance);

        if let Some(interpretation) = self.rules.interpret(utterance) {
            return Resolution {
                interpretation,
                source: Source::Rule,
            };
        }

        Resolution {
            interpretation: self.ai.interpret(utterance, history).await,
            source: Source::Model,
        }
    }

    pub fn is_llm_available(&self) -> bool {
        self.ai.is_available()
    }

    /// Get engine info
    pub fn info(&self) -> String {
        format!("Intent Engine\nRules: enabled\nLLM: {}", self.ai.model_info())
    }
}

/// Builder for IntentConfig
pub struct IntentConfigBuilder {
    config: IntentConfig,
}

impl IntentConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: IntentConfig::default(),
        }
    }

    pub fn allow_shell_execution(mut self, allow: bool) -> Self {
        self.config.allow_shell_execution = allow;
        self
    }

    pub fn history_depth(mut self, depth: usize) -> Self {
        self.config.history_depth = depth;
        self
    }

    pub fn max_error_feedback_attempts(mut self, attempts: u32) -> Self {
        self.config.max_error_feedback_attempts = attempts;
        self
    }

    pub fn build(self) -> IntentConfig {
        self.config
    }
}

impl Default for IntentConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
