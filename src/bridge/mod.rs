//! Voice-platform skill bridge
//!
//! The skill posts a JSON envelope for every utterance. Slot text is either
//! routed through the local command router or sent to the language model,
//! and the answer goes back as a plain-text speech envelope.

pub mod endpoint;
pub mod server;
pub mod tunnel;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use endpoint::EndpointConfig;
use tunnel::TunnelConfig;

pub const LAUNCH_GREETING: &str = "Hello, Jarvis is ready. What can I do for you?";
pub const MISSING_LOCAL_COMMAND: &str = "Sorry, I didn't get a specific command for local action.";
pub const MISSING_QUERY: &str = "Sorry, I didn't get a specific query for the AI.";
pub const UNKNOWN_REQUEST: &str = "Sorry, I didn't understand that type of request.";
pub const INCOMPLETE_REQUEST: &str = "Sorry, I received an incomplete request from Alexa.";
pub const LOCAL_NOT_HANDLED: &str = "Sorry, I could not process the local command.";
/// Spoken for local commands that succeed silently (player controls)
pub const LOCAL_DONE: &str = "Done.";

const LOCAL_INTENT: &str = "LocalToIntent";
const LOCAL_SLOT: &str = "localquery";
const QUERY_SLOT: &str = "query";
const LOCAL_PREFIX: &str = "local to ";

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub host: [u8; 4],
    pub port: u16,
    /// Path segment of the webhook (`/alexa`)
    pub route: String,
    pub tunnel: TunnelConfig,
    pub endpoint: EndpointConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: [127, 0, 0, 1],
            port: 5000,
            route: "alexa".into(),
            tunnel: TunnelConfig::default(),
            endpoint: EndpointConfig::default(),
        }
    }
}

/// Incoming skill envelope. Every level is optional so a malformed request
/// still gets a spoken answer instead of a rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillRequest {
    pub request: Option<RequestBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestBody {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub intent: Option<Intent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Intent {
    pub name: Option<String>,
    pub slots: Option<HashMap<String, Slot>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Slot {
    pub value: Option<String>,
}

/// Outgoing speech envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillResponse {
    pub version: String,
    pub response: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    pub output_speech: OutputSpeech,
    pub should_end_session: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpeech {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl SkillResponse {
    pub fn plain_text(text: impl Into<String>) -> Self {
        Self {
            version: "1.0".into(),
            response: ResponseBody {
                output_speech: OutputSpeech {
                    kind: "PlainText".into(),
                    text: text.into(),
                },
                should_end_session: true,
            },
        }
    }

    pub fn text(&self) -> &str {
        &self.response.output_speech.text
    }
}

/// What a request asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillAction {
    /// Fixed answer, no work needed
    Say(String),
    /// Route through the local command router
    Local(String),
    /// Forward to the language model
    AskModel(String),
}

fn slot_value(slots: &HashMap<String, Slot>, name: &str) -> Option<String> {
    slots
        .get(name)?
        .value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Decide how to answer a request
pub fn plan_action(request: &SkillRequest) -> SkillAction {
    let Some(kind) = request.request.as_ref().and_then(|r| r.kind.as_deref()) else {
        return SkillAction::Say(INCOMPLETE_REQUEST.into());
    };
    log::debug!("Skill request type: {}", kind);

    match kind {
        "LaunchRequest" => SkillAction::Say(LAUNCH_GREETING.into()),
        "SessionEndedRequest" => SkillAction::Say(String::new()),
        "IntentRequest" => {
            let intent = request.request.as_ref().and_then(|r| r.intent.as_ref());
            let (Some(intent), Some(slots)) = (intent, intent.and_then(|i| i.slots.as_ref()))
            else {
                return SkillAction::Say(INCOMPLETE_REQUEST.into());
            };
            log::debug!("Intent: {:?}", intent.name);

            if intent.name.as_deref() == Some(LOCAL_INTENT) {
                return match slot_value(slots, LOCAL_SLOT) {
                    Some(command) => SkillAction::Local(command),
                    None => SkillAction::Say(MISSING_LOCAL_COMMAND.into()),
                };
            }

            match slot_value(slots, QUERY_SLOT) {
                Some(query) => match query.to_lowercase().strip_prefix(LOCAL_PREFIX) {
                    Some(command) => SkillAction::Local(command.trim().to_string()),
                    None => SkillAction::AskModel(query),
                },
                None => SkillAction::Say(MISSING_QUERY.into()),
            }
        }
        other => {
            log::warn!("Unhandled skill request type: {}", other);
            SkillAction::Say(UNKNOWN_REQUEST.into())
        }
    }
}

/// Speech for a locally routed command
pub fn local_reply_text(routed: Option<crate::router::Routed>) -> String {
    match routed {
        Some(routed) if routed.reply.lines.is_empty() => LOCAL_DONE.to_string(),
        Some(routed) => routed.reply.text(),
        None => LOCAL_NOT_HANDLED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{Reply, Routed};
    use serde_json::json;

    fn plan(value: serde_json::Value) -> SkillAction {
        plan_action(&serde_json::from_value(value).unwrap())
    }

    fn intent(name: &str, slots: serde_json::Value) -> serde_json::Value {
        json!({ "request": { "type": "IntentRequest", "intent": { "name": name, "slots": slots } } })
    }

    #[test]
    fn test_launch_and_session_end() {
        assert_eq!(
            plan(json!({ "request": { "type": "LaunchRequest" } })),
            SkillAction::Say(LAUNCH_GREETING.into())
        );
        assert_eq!(
            plan(json!({ "request": { "type": "SessionEndedRequest" } })),
            SkillAction::Say(String::new())
        );
    }

    #[test]
    fn test_local_intent() {
        assert_eq!(
            plan(intent("LocalToIntent", json!({ "localquery": { "name": "localquery", "value": "show tasks" } }))),
            SkillAction::Local("show tasks".into())
        );
        assert_eq!(
            plan(intent("LocalToIntent", json!({ "localquery": { "name": "localquery" } }))),
            SkillAction::Say(MISSING_LOCAL_COMMAND.into())
        );
    }

    #[test]
    fn test_query_prefix_routes_locally() {
        assert_eq!(
            plan(intent("AskIntent", json!({ "query": { "value": "Local to play music" } }))),
            SkillAction::Local("play music".into())
        );
        assert_eq!(
            plan(intent("AskIntent", json!({ "query": { "value": "why is the sky blue" } }))),
            SkillAction::AskModel("why is the sky blue".into())
        );
        assert_eq!(
            plan(intent("AskIntent", json!({}))),
            SkillAction::Say(MISSING_QUERY.into())
        );
    }

    #[test]
    fn test_incomplete_and_unknown() {
        assert_eq!(plan(json!({})), SkillAction::Say(INCOMPLETE_REQUEST.into()));
        assert_eq!(
            plan(json!({ "request": { "type": "IntentRequest" } })),
            SkillAction::Say(INCOMPLETE_REQUEST.into())
        );
        assert_eq!(
            plan(json!({ "request": { "type": "CanFulfillIntentRequest" } })),
            SkillAction::Say(UNKNOWN_REQUEST.into())
        );
    }

    #[test]
    fn test_response_envelope_shape() {
        let value = serde_json::to_value(SkillResponse::plain_text("Hi")).unwrap();
        assert_eq!(
            value,
            json!({
                "version": "1.0",
                "response": {
                    "outputSpeech": { "type": "PlainText", "text": "Hi" },
                    "shouldEndSession": true
                }
            })
        );
    }

    #[test]
    fn test_local_reply_text() {
        assert_eq!(local_reply_text(None), LOCAL_NOT_HANDLED);
        let silent = Routed {
            handler: "media",
            reply: Reply::default(),
        };
        assert_eq!(local_reply_text(Some(silent)), LOCAL_DONE);
        let spoken = Routed {
            handler: "to-do",
            reply: Reply::say("task-1 added: milk"),
        };
        assert_eq!(local_reply_text(Some(spoken)), "task-1 added: milk");
    }
}
