//! Agent-runtime collaborator interface.
//!
//! The gateway never generates text itself; it launches a run on an
//! external agent runtime and consumes the run's event sequence. Upstream
//! events arrive loosely typed; [`SourceEvent::classify`] folds them into
//! a closed union so the relay can match exhaustively instead of probing
//! fields. Anything unrecognized becomes [`SourceEvent::Unknown`].

pub mod http;

pub use http::HttpAgentRuntime;

use async_trait::async_trait;
use bon::Builder;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::HistoryEntry;
use crate::error::Result;
use crate::session::SessionHandle;

/// Upper bound on agent tool-loop turns per run.
pub const DEFAULT_MAX_TURNS: u32 = 24;

/// Marker prefixing the injected user-context block; its presence in
/// history suppresses re-injection.
pub const USER_CONTEXT_MARKER: &str = "USER_CONTEXT::";

/// One event observed from an upstream run.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// Incremental fragment of assistant text.
    TextDelta {
        item_id: Option<String>,
        text: String,
    },
    /// Incremental fragment of reasoning text.
    ReasoningDelta { text: String },
    /// End of the current reasoning block.
    ReasoningDone,
    /// A finalized message item, possibly never streamed incrementally.
    ItemCompleted {
        item_id: Option<String>,
        text: String,
    },
    /// A tool invocation was dispatched.
    ToolCallStarted { tool_name: Option<String> },
    /// A tool invocation produced its result.
    ToolCallCompleted { tool_name: Option<String> },
    /// Upstream reported a failure; not necessarily terminal.
    Failed { message: Option<String> },
    /// Control marker: a different agent took over the run.
    Handoff,
    /// Anything whose shape matches no known case.
    Unknown,
}

/// Async sequence of upstream events for one run.
pub type SourceStream = BoxStream<'static, SourceEvent>;

/// A callable tool advertised to the agent at launch. The gateway only
/// observes start/complete notifications; execution is upstream's job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Tuning knobs for one run.
#[derive(Debug, Clone, Default, Builder, Serialize, Deserialize)]
pub struct RunSettings {
    pub max_turns: Option<u32>,
    pub model: Option<String>,
    /// System context injected ahead of history unless already present.
    pub user_context: Option<String>,
}

impl RunSettings {
    pub fn effective_max_turns(&self) -> u32 {
        self.max_turns.unwrap_or(DEFAULT_MAX_TURNS)
    }
}

/// Request payload to start an upstream run.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub run_id: Uuid,
    pub prompt: String,
    pub history: Vec<HistoryEntry>,
    pub session_key: String,
    pub session: Option<SessionHandle>,
    pub tools: Vec<ToolDefinition>,
    pub settings: RunSettings,
}

impl LaunchRequest {
    pub fn new(prompt: impl Into<String>, session_key: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            prompt: prompt.into(),
            history: Vec::new(),
            session_key: session_key.into(),
            session: None,
            tools: Vec::new(),
            settings: RunSettings::default(),
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    pub fn with_session(mut self, session: Option<SessionHandle>) -> Self {
        self.session = session;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// The upstream collaborator: can start a run and enumerate the tools it
/// exposes to the agent.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Start a run. An `Err` here is a launch failure: terminal, surfaced
    /// to the client as a single error event, never retried.
    async fn launch(&self, request: LaunchRequest) -> Result<SourceStream>;

    /// The allow-listed tool set advertised at launch.
    fn tool_definitions(&self) -> Vec<ToolDefinition>;
}

/// User-context block tying runs to the authenticated caller, mirrored
/// into the model's system context.
pub fn user_context_text(session_key: &str, user_id: &str) -> String {
    format!(
        "{USER_CONTEXT_MARKER}{user_id}\nUser id: {user_id}\nSession key: {session_key}\n\
         Always pass this user id when using handoff or task-status tools."
    )
}

impl SourceEvent {
    /// Fold one loosely-typed upstream wire event into the closed union.
    ///
    /// Wire shapes follow the upstream run protocol: raw response events
    /// wrap a `data` object dispatched on `data.type`; run-item events
    /// carry tool lifecycle notifications; agent-update events signal a
    /// handoff.
    pub fn classify(value: &serde_json::Value) -> SourceEvent {
        let event_type = value.get("type").and_then(|t| t.as_str()).unwrap_or("");
        match event_type {
            "raw_response_event" => {
                let Some(data) = value.get("data") else {
                    return SourceEvent::Unknown;
                };
                Self::classify_response_data(data)
            }
            "run_item_stream_event" => {
                let name = value.get("name").and_then(|n| n.as_str()).unwrap_or("");
                let tool_name = tool_name_from_item(value.get("item"));
                match name {
                    "tool_called" => SourceEvent::ToolCallStarted { tool_name },
                    "tool_output" => SourceEvent::ToolCallCompleted { tool_name },
                    _ => SourceEvent::Unknown,
                }
            }
            "agent_updated_stream_event" => SourceEvent::Handoff,
            _ => SourceEvent::Unknown,
        }
    }

    fn classify_response_data(data: &serde_json::Value) -> SourceEvent {
        let data_type = data.get("type").and_then(|t| t.as_str()).unwrap_or("");
        match data_type {
            "response.output_text.delta" => SourceEvent::TextDelta {
                item_id: data
                    .get("item_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                text: data
                    .get("delta")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            },
            "response.reasoning_text.delta" | "response.reasoning_summary_text.delta" => {
                SourceEvent::ReasoningDelta {
                    text: data
                        .get("delta")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                }
            }
            "response.reasoning_text.done" | "response.reasoning_summary_text.done" => {
                SourceEvent::ReasoningDone
            }
            "response.output_item.added" | "response.output_item.done" => {
                let Some(item) = data.get("item") else {
                    return SourceEvent::Unknown;
                };
                if item.get("type").and_then(|t| t.as_str()) != Some("message") {
                    return SourceEvent::Unknown;
                }
                SourceEvent::ItemCompleted {
                    item_id: item.get("id").and_then(|v| v.as_str()).map(str::to_string),
                    text: message_item_text(item),
                }
            }
            "response.failed" => SourceEvent::Failed {
                message: data
                    .get("response")
                    .and_then(|r| r.get("error"))
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string),
            },
            "error" | "response.error" => SourceEvent::Failed {
                message: data
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string),
            },
            _ => SourceEvent::Unknown,
        }
    }
}

/// Concatenated text of a finalized message item: output text plus any
/// refusal text, in content order.
fn message_item_text(item: &serde_json::Value) -> String {
    let Some(content) = item.get("content").and_then(|v| v.as_array()) else {
        return String::new();
    };
    let mut text = String::new();
    for part in content {
        match part.get("type").and_then(|t| t.as_str()) {
            Some("output_text") => {
                if let Some(fragment) = part.get("text").and_then(|t| t.as_str()) {
                    text.push_str(fragment);
                }
            }
            Some("output_refusal") => {
                if let Some(fragment) = part.get("refusal").and_then(|t| t.as_str()) {
                    text.push_str(fragment);
                }
            }
            _ => {}
        }
    }
    text
}

fn tool_name_from_item(item: Option<&serde_json::Value>) -> Option<String> {
    let raw = item?.get("raw_item")?;
    raw.get("name")
        .or_else(|| raw.get("tool_name"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn classifies_text_delta() {
        let event = json!({
            "type": "raw_response_event",
            "data": {"type": "response.output_text.delta", "item_id": "m1", "delta": "hi"}
        });
        assert_eq!(
            SourceEvent::classify(&event),
            SourceEvent::TextDelta {
                item_id: Some("m1".to_string()),
                text: "hi".to_string()
            }
        );
    }

    #[test]
    fn classifies_completed_message_item_with_refusal() {
        let event = json!({
            "type": "raw_response_event",
            "data": {
                "type": "response.output_item.done",
                "item": {
                    "type": "message",
                    "id": "m2",
                    "content": [
                        {"type": "output_text", "text": "partial "},
                        {"type": "output_refusal", "refusal": "no"}
                    ]
                }
            }
        });
        assert_eq!(
            SourceEvent::classify(&event),
            SourceEvent::ItemCompleted {
                item_id: Some("m2".to_string()),
                text: "partial no".to_string()
            }
        );
    }

    #[test]
    fn classifies_tool_lifecycle_with_missing_name() {
        let started = json!({
            "type": "run_item_stream_event",
            "name": "tool_called",
            "item": {"raw_item": {"arguments": "{}"}}
        });
        assert_eq!(
            SourceEvent::classify(&started),
            SourceEvent::ToolCallStarted { tool_name: None }
        );

        let output = json!({
            "type": "run_item_stream_event",
            "name": "tool_output",
            "item": {"raw_item": {"tool_name": "search_knowledge"}}
        });
        assert_eq!(
            SourceEvent::classify(&output),
            SourceEvent::ToolCallCompleted {
                tool_name: Some("search_knowledge".to_string())
            }
        );
    }

    #[test]
    fn classifies_failure_shapes() {
        let failed = json!({
            "type": "raw_response_event",
            "data": {"type": "response.failed", "response": {"error": {"message": "boom"}}}
        });
        assert_eq!(
            SourceEvent::classify(&failed),
            SourceEvent::Failed {
                message: Some("boom".to_string())
            }
        );

        let bare = json!({"type": "raw_response_event", "data": {"type": "error"}});
        assert_eq!(
            SourceEvent::classify(&bare),
            SourceEvent::Failed { message: None }
        );
    }

    #[test]
    fn unrecognized_shapes_become_unknown() {
        for raw in [
            json!({"type": "telemetry", "data": {}}),
            json!({"type": "raw_response_event", "data": {"type": "response.usage"}}),
            json!({"completely": "different"}),
        ] {
            assert_eq!(SourceEvent::classify(&raw), SourceEvent::Unknown);
        }
    }

    #[test]
    fn handoff_is_a_control_marker() {
        let event = json!({"type": "agent_updated_stream_event", "new_agent": "expert"});
        assert_eq!(SourceEvent::classify(&event), SourceEvent::Handoff);
    }

    #[test]
    fn run_settings_default_max_turns() {
        assert_eq!(RunSettings::default().effective_max_turns(), 24);
        let settings = RunSettings::builder().max_turns(4).build();
        assert_eq!(settings.effective_max_turns(), 4);
    }

    #[test]
    fn user_context_carries_marker_and_ids() {
        let text = user_context_text("s1", "u1");
        assert!(text.starts_with("USER_CONTEXT::u1"));
        assert!(text.contains("Session key: s1"));
    }
}
