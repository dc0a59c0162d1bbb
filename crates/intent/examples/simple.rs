//! Example: rule-only interpretation with a session
//!
//! No language model is configured, so anything the rules cannot decide
//! comes back as `unknown`.

use hostlink_intent::*;

#[tokio::main]
async fn main() {
    println!("=== Simple Intent Interpretation Example ===\n");

    let config = IntentConfigBuilder::new().history_depth(4).build();
    let engine = IntentEngine::new(&config, None, OsContext::detect());
    let mut session = Session::new(&config);

    let commands = [
        "get cpu usage",
        "set brightness to 40",
        "mute",
        "turn bluetooth off",
        "what's the wifi status",
        "open the calculator",
    ];

    for cmd in commands {
        println!("Input: \"{}\"", cmd);

        let context = session.on_turn_start(cmd);
        let resolution = engine.interpret(cmd, &context).await;

        println!("  Intent: {}", resolution.interpretation.intent);
        println!("  Parameters: {}", serde_json::Value::Object(resolution.interpretation.parameters.clone()));
        println!("  Source: {:?}", resolution.source);

        session.on_turn_end(cmd, &Outcome::success(format!("handled {}", resolution.interpretation.intent)));
        println!();
    }

    println!("History kept: {} of {}", session.history().len(), session.history().capacity());
}
