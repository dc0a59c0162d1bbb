//! Bridge - One inbound message → one reply
//!
//! Drives a turn through the session, the intent engine and the dispatcher.
//! A panic anywhere in the turn becomes a server-error reply; the session
//! and the connection carry on.

use crate::config::BridgeConfig;
use crate::device::DeviceBackend;
use crate::dispatcher::{Dispatch, Dispatcher};
use crate::registry::IntentRegistry;
use futures::FutureExt;
use hostlink_intent::{IntentConfig, IntentEngine, LanguageModel, OsContext, Outcome, Session, Source};
use serde::Serialize;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub const SERVER_ERROR_MESSAGE: &str = "Server error occurred.";

/// Wire reply: `{"response": ...}` or `{"error": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    Response(Value),
    Error(String),
}

impl Reply {
    /// Shell report object, capability payload, or the plain message
    pub fn from_outcome(outcome: &Outcome) -> Self {
        if let Some(report) = &outcome.structured {
            if let Ok(value) = serde_json::to_value(report) {
                return Reply::Response(value);
            }
        }
        if let Some(data) = &outcome.data {
            return Reply::Response(data.clone());
        }
        Reply::Response(Value::String(outcome.message.clone()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"error\": \"{SERVER_ERROR_MESSAGE}\"}}"))
    }
}

/// Everything a turn needs. Shared read-only across connections.
pub struct Bridge {
    engine: IntentEngine,
    dispatcher: Dispatcher,
    intent_config: IntentConfig,
}

impl Bridge {
    pub fn new(engine: IntentEngine, dispatcher: Dispatcher, intent_config: IntentConfig) -> Self {
        Self {
            engine,
            dispatcher,
            intent_config,
        }
    }

    /// Wire the standard registry over `backend`
    pub fn from_config(
        config: &BridgeConfig,
        backend: Arc<dyn DeviceBackend>,
        model: Option<Arc<dyn LanguageModel>>,
        os: OsContext,
    ) -> Self {
        let intent_config = config.intent_config();
        let engine = IntentEngine::new(&intent_config, model, os);
        let dispatcher = Dispatcher::new(
            IntentRegistry::standard(backend),
            config.allow_shell_execution,
            config.shell_timeout(),
        );
        Self::new(engine, dispatcher, intent_config)
    }

    pub fn engine(&self) -> &IntentEngine {
        &self.engine
    }

    pub fn new_session(&self) -> Session {
        Session::new(&self.intent_config)
    }

    /// Process one message. Never fails; panics become an error reply.
    pub async fn handle(&self, session: &mut Session, message: &str) -> Reply {
        match AssertUnwindSafe(self.turn(session, message)).catch_unwind().await {
            Ok(dispatch) => Reply::from_outcome(&dispatch.outcome),
            Err(_) => {
                log::error!("Unexpected error while processing '{}'", message);
                Reply::Error(SERVER_ERROR_MESSAGE.to_string())
            }
        }
    }

    async fn turn(&self, session: &mut Session, message: &str) -> Dispatch {
        let context = session.on_turn_start(message);

        let resolution = self.engine.interpret(message, &context).await;
        if resolution.source == Source::Model {
            log::info!("Model interpretation: {:?}", resolution.interpretation);
        }

        let dispatch = self.dispatcher.dispatch(&resolution.interpretation).await;
        log::debug!("Dispatch finished as {:?}", dispatch.kind);

        session.on_turn_end(message, &dispatch.outcome);
        dispatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostlink_intent::ShellReport;
    use serde_json::json;

    #[test]
    fn test_reply_shapes() {
        let text = Reply::from_outcome(&Outcome::success("CPU Usage: 3.0%"));
        assert_eq!(text.to_json(), r#"{"response":"CPU Usage: 3.0%"}"#);

        let report = ShellReport::completed("ls", 0, "a".into(), String::new());
        let shell = Reply::from_outcome(&Outcome::shell(report));
        let value: Value = serde_json::from_str(&shell.to_json()).unwrap();
        assert_eq!(
            value,
            json!({"response": {
                "command": "ls",
                "success": true,
                "exit_code": 0,
                "stdout": "a",
                "stderr": "",
                "error_message": null
            }})
        );

        let battery = Outcome::success("Battery: 50% (Charging)").with_data(json!({"percent": 50}));
        assert_eq!(Reply::from_outcome(&battery), Reply::Response(json!({"percent": 50})));

        let error = Reply::Error(SERVER_ERROR_MESSAGE.to_string());
        assert_eq!(error.to_json(), r#"{"error":"Server error occurred."}"#);
    }
}
