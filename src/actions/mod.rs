//! UI-action directive extraction.
//!
//! Generated text may carry a `[ACTIONS]{...}[/ACTIONS]` block instructing
//! the client to navigate or highlight elements. The block is stripped from
//! user-visible text and parsed into typed [`UiAction`]s at drain time.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Highlight duration handed to the client, in milliseconds.
const HIGHLIGHT_DURATION_MS: u64 = 5_000;

/// A directive for the client UI. Constructed only by [`extract`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Display)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UiAction {
    Navigate {
        path: String,
    },
    Highlight {
        selectors: Vec<String>,
        duration: u64,
    },
}

/// Result of one extraction pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub cleaned_text: String,
    pub actions: Vec<UiAction>,
}

fn block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)\[ACTIONS\](.*?)\[/ACTIONS\]").expect("action block pattern compiles")
    })
}

/// Scan `text` for directive blocks, parse the last one, and return the
/// text with every block removed.
///
/// Never fails: a missing or unbalanced marker pair returns the input
/// unchanged with no actions, and a block whose interior is not valid JSON
/// is stripped anyway (the raw directive must never reach the user) while
/// yielding no actions. Running the pass twice is a no-op.
pub fn extract(text: &str) -> Extraction {
    let pattern = block_pattern();
    let Some(last) = pattern.captures_iter(text).last() else {
        return Extraction {
            cleaned_text: text.to_string(),
            actions: Vec::new(),
        };
    };

    let interior = last
        .get(1)
        .map(|m| m.as_str().trim())
        .unwrap_or_default();
    let actions = match serde_json::from_str::<serde_json::Value>(interior) {
        Ok(value) => actions_from_value(&value),
        Err(error) => {
            tracing::debug!(%error, "directive block interior is not valid JSON; stripping");
            Vec::new()
        }
    };

    let cleaned_text = pattern.replace_all(text, "").trim().to_string();
    Extraction {
        cleaned_text,
        actions,
    }
}

fn actions_from_value(value: &serde_json::Value) -> Vec<UiAction> {
    let mut actions = Vec::new();

    if let Some(path) = value.get("navigate").and_then(|v| v.as_str()) {
        if !path.is_empty() {
            actions.push(UiAction::Navigate {
                path: path.to_string(),
            });
        }
    }

    let selectors = match value.get("highlight") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => vec![s.clone()],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    if !selectors.is_empty() {
        actions.push(UiAction::Highlight {
            selectors,
            duration: HIGHLIGHT_DURATION_MS,
        });
    }

    actions
}
