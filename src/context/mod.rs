//! Request context types and prompt enrichment.
//!
//! The client ships a full picture of its UI state with every request:
//! a DOM snapshot, page location, chat history, and an optional active
//! walkthrough. [`build_prompt`] renders that picture into a textual
//! briefing prepended to the user's prompt.

mod briefing;

pub use briefing::{build_prompt, render_briefing};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prior turns retained when forwarding history upstream; oldest are
/// discarded, order preserved.
pub const MAX_HISTORY: usize = 50;

/// Snapshot of one DOM element as observed by the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomElementSnapshot {
    #[serde(default)]
    pub id: String,
    pub tag_name: String,
    #[serde(default)]
    pub text_content: String,
    #[serde(default)]
    pub class_names: Vec<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub aria_label: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub is_interactive: bool,
}

/// Location of the page the user is currently looking at.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageContext {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub fragment: String,
    #[serde(default)]
    pub title: String,
}

/// Progress through a guided walkthrough, when one is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkthroughContext {
    pub id: String,
    pub step_index: usize,
    pub step_count: usize,
    #[serde(default)]
    pub step_detail: serde_json::Value,
}

/// One prior turn of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    pub id: String,
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Role/content pair in the shape the agent runtime accepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

/// Complete context package from the client. Immutable for the lifetime
/// of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPackage {
    pub prompt: String,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
    #[serde(default)]
    pub dom_snapshot: Vec<DomElementSnapshot>,
    #[serde(default)]
    pub page_context: PageContext,
    #[serde(default)]
    pub walkthrough: Option<WalkthroughContext>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ContextPackage {
    /// The most recent [`MAX_HISTORY`] turns, oldest first.
    pub fn recent_history(&self) -> &[HistoryMessage] {
        let start = self.history.len().saturating_sub(MAX_HISTORY);
        &self.history[start..]
    }

    /// History formatted for the agent runtime, truncated to the
    /// retention window.
    pub fn formatted_history(&self) -> Vec<HistoryEntry> {
        self.recent_history()
            .iter()
            .map(|message| HistoryEntry {
                role: message.role.clone(),
                content: message.content.clone(),
            })
            .collect()
    }
}
