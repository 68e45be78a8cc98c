//! Outbound event stream types.
//!
//! Every message pushed to a client is one [`OutboundEvent`], JSON-encoded
//! as `{"event": <kind>, "data": <payload>}`. Construction is pure; the
//! relay decides when each event is emitted.

use serde::{Deserialize, Serialize};

use crate::actions::UiAction;
use crate::context::PageContext;

/// Lifecycle state recorded for a tool invocation in the audit trail.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Started,
}

/// One entry of the tool-call audit trail reported in the final metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub status: ToolCallStatus,
}

impl ToolCallRecord {
    pub fn started(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolCallStatus::Started,
        }
    }
}

/// Events pushed to the client, in emission order.
///
/// Terminal `actions`/`metadata`/`complete` events always follow the last
/// content event. A `reasoning_start` precedes the first `reasoning_delta`
/// and is matched by at most one `reasoning_done`; reasoning blocks never
/// nest or overlap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    TextDelta {
        text: String,
    },
    ReasoningStart {},
    ReasoningDelta {
        text: String,
    },
    ReasoningDone {},
    ToolCallStarted {
        tool_name: String,
    },
    ToolCallCompleted {
        tool_name: String,
    },
    Actions {
        actions: Vec<UiAction>,
    },
    Metadata {
        tools_used: Vec<ToolCallRecord>,
        page_context: PageContext,
    },
    Error {
        message: String,
    },
    Heartbeat {},
    Complete {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

impl OutboundEvent {
    /// Serialize to the wire envelope. Falls back to an empty string on
    /// the unreachable serializer error path.
    pub fn to_wire_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
