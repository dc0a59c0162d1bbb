//! Rule Interpreter - Utterance → Intent without a model
//!
//! An ordered table of keyword rules. The first rule that claims an utterance
//! decides the result; a claiming rule that cannot extract its parameters
//! yields no match rather than letting a looser rule further down fire.
//! Exact phrases come before keyword rules and must stay there.

use crate::types::*;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

/// Lower-cased input with the pieces rules look at
struct Utterance {
    text: String,
    words: Vec<String>,
    first_number: Option<i64>,
}

impl Utterance {
    fn new(input: &str, number: &Regex) -> Self {
        let text = input.trim().to_lowercase();
        let words = text.unicode_words().map(str::to_string).collect();
        let first_number = number
            .find(&text)
            .and_then(|m| m.as_str().parse::<i64>().ok());

        Self {
            text,
            words,
            first_number,
        }
    }

    fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }

    fn has_word(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }

    fn level(&self) -> Option<i64> {
        self.first_number.map(|n| n.clamp(0, 100))
    }

    fn radio_state(&self) -> Option<&'static str> {
        if self.has_word("on") || self.has_word("enable") {
            Some("on")
        } else if self.has_word("off") || self.has_word("disable") {
            Some("off")
        } else {
            None
        }
    }
}

struct Rule {
    name: &'static str,
    claims: fn(&Utterance) -> bool,
    resolve: fn(&Utterance) -> Option<Interpretation>,
}

const RULES: &[Rule] = &[
    Rule {
        name: "exact:get cpu usage",
        claims: |u| u.text == "get cpu usage",
        resolve: |_| Some(Interpretation::bare(IntentKind::GetCpuUsage)),
    },
    Rule {
        name: "exact:get memory usage",
        claims: |u| u.text == "get memory usage",
        resolve: |_| Some(Interpretation::bare(IntentKind::GetMemoryUsage)),
    },
    Rule {
        name: "exact:get_volume",
        claims: |u| u.text == "get_volume",
        resolve: |_| Some(Interpretation::bare(IntentKind::GetVolume)),
    },
    Rule {
        name: "exact:get_battery_status",
        claims: |u| u.text == "get_battery_status",
        resolve: |_| Some(Interpretation::bare(IntentKind::GetBatteryStatus)),
    },
    Rule {
        name: "wifi status",
        claims: |u| u.contains("wifi") && u.contains("status"),
        resolve: |_| Some(Interpretation::bare(IntentKind::GetWifiStatus)),
    },
    Rule {
        name: "bluetooth status",
        claims: |u| u.contains("bluetooth") && u.contains("status"),
        resolve: |_| Some(Interpretation::bare(IntentKind::GetBluetoothStatus)),
    },
    Rule {
        name: "brightness",
        claims: |u| u.contains("brightness"),
        resolve: |u| {
            u.level()
                .map(|level| Interpretation::with_param(IntentKind::SetBrightness, "level", level))
        },
    },
    Rule {
        name: "volume",
        claims: |u| u.contains("volume") || u.contains("sound") || u.contains("mute"),
        resolve: |u| {
            let level = u.level().or_else(|| u.has_word("mute").then_some(0))?;
            Some(Interpretation::with_param(IntentKind::SetVolume, "level", level))
        },
    },
    Rule {
        name: "wifi toggle",
        claims: |u| u.contains("wi-fi") || u.contains("wifi"),
        resolve: |u| {
            u.radio_state()
                .map(|state| Interpretation::with_param(IntentKind::ToggleWifi, "state", state))
        },
    },
    Rule {
        name: "bluetooth toggle",
        claims: |u| u.contains("bluetooth"),
        resolve: |u| {
            u.radio_state()
                .map(|state| Interpretation::with_param(IntentKind::ToggleBluetooth, "state", state))
        },
    },
    Rule {
        name: "battery",
        claims: |u| u.contains("battery") || u.contains("charging") || u.contains("power level"),
        resolve: |_| Some(Interpretation::bare(IntentKind::GetBatteryStatus)),
    },
    Rule {
        name: "cpu usage",
        claims: |u| u.contains("cpu") && u.contains("usage"),
        resolve: |_| Some(Interpretation::bare(IntentKind::GetCpuUsage)),
    },
    Rule {
        name: "memory usage",
        claims: |u| (u.contains("memory") || u.has_word("ram")) && u.contains("usage"),
        resolve: |_| Some(Interpretation::bare(IntentKind::GetMemoryUsage)),
    },
];

/// Deterministic keyword interpreter, tried before any model call
pub struct RuleInterpreter {
    number: Regex,
}

impl RuleInterpreter {
    pub fn new() -> Self {
        Self {
            number: Regex::new(r"-?\d+").unwrap(),
        }
    }

    /// Resolve an utterance, or `None` when no rule can decide it
    pub fn interpret(&self, input: &str) -> Option<Interpretation> {
        let utterance = Utterance::new(input, &self.number);

        let rule = RULES.iter().find(|rule| (rule.claims)(&utterance))?;
        let result = (rule.resolve)(&utterance);

        match &result {
            Some(interpretation) => {
                log::info!("Command matched rule '{}': {:?}", rule.name, interpretation)
            }
            None => log::debug!("Rule '{}' claimed input but found no parameters", rule.name),
        }

        result
    }
}

impl Default for RuleInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn interpret(input: &str) -> Option<Interpretation> {
        RuleInterpreter::new().interpret(input)
    }

    #[test]
    fn test_exact_phrases() {
        assert_eq!(interpret("get cpu usage").unwrap().intent, IntentKind::GetCpuUsage);
        assert_eq!(interpret("Get Memory Usage").unwrap().intent, IntentKind::GetMemoryUsage);
        assert_eq!(interpret("get_volume").unwrap().intent, IntentKind::GetVolume);
        assert_eq!(
            interpret("get_battery_status").unwrap().intent,
            IntentKind::GetBatteryStatus
        );
    }

    #[test]
    fn test_status_checks_win_over_toggles() {
        assert_eq!(
            interpret("what's the wifi status?").unwrap().intent,
            IntentKind::GetWifiStatus
        );
        assert_eq!(
            interpret("bluetooth status on this box").unwrap().intent,
            IntentKind::GetBluetoothStatus
        );
    }

    #[test]
    fn test_brightness_level_is_clamped() {
        let result = interpret("set brightness to 70%").unwrap();
        assert_eq!(result.intent, IntentKind::SetBrightness);
        assert_eq!(result.parameters["level"], json!(70));

        let result = interpret("brightness 150").unwrap();
        assert_eq!(result.parameters["level"], json!(100));
    }

    #[test]
    fn test_claiming_rule_without_level_stops_matching() {
        // "brightness" claims the input, so the cpu rule further down never fires
        assert!(interpret("brightness and cpu usage").is_none());
        assert!(interpret("make the screen brightness nicer").is_none());
    }

    #[test]
    fn test_volume_and_mute() {
        let result = interpret("turn the volume to 35").unwrap();
        assert_eq!(result.intent, IntentKind::SetVolume);
        assert_eq!(result.parameters["level"], json!(35));

        let result = interpret("mute").unwrap();
        assert_eq!(result.parameters["level"], json!(0));

        assert!(interpret("unmute the sound").is_none());
    }

    #[test]
    fn test_radio_toggles_use_whole_words() {
        let result = interpret("turn wifi on").unwrap();
        assert_eq!(result.intent, IntentKind::ToggleWifi);
        assert_eq!(result.parameters["state"], json!("on"));

        let result = interpret("please disable Bluetooth").unwrap();
        assert_eq!(result.intent, IntentKind::ToggleBluetooth);
        assert_eq!(result.parameters["state"], json!("off"));

        // "connection" must not read as "on"
        assert!(interpret("wi-fi connection").is_none());
    }

    #[test]
    fn test_battery_cpu_memory_keywords() {
        assert_eq!(interpret("is it charging").unwrap().intent, IntentKind::GetBatteryStatus);
        assert_eq!(interpret("what is the power level").unwrap().intent, IntentKind::GetBatteryStatus);
        assert_eq!(interpret("show cpu usage please").unwrap().intent, IntentKind::GetCpuUsage);
        assert_eq!(interpret("ram usage").unwrap().intent, IntentKind::GetMemoryUsage);
    }

    #[test]
    fn test_unmatched_input() {
        assert!(interpret("open firefox").is_none());
        assert!(interpret("").is_none());
        assert!(interpret("list the files in /tmp").is_none());
    }
}
