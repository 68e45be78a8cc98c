//! The streaming relay state machine.
//!
//! One relay drives one upstream run:
//! `STARTING -> STREAMING -> (DRAINING | DISCONNECTED | FAILED) -> DONE`.
//! It classifies each upstream event, de-duplicates content, enforces the
//! heartbeat cadence, polls the disconnect signal once per iteration, and
//! performs a single action-extraction pass over the accumulated text at
//! drain time. Raw directive text streams live mid-run; only the final
//! transcript is cleaned.

pub mod dedup;

pub use dedup::{Delivery, DeliveryTracker};

use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::actions;
use crate::context::PageContext;
use crate::events::{OutboundEvent, ToolCallRecord};
use crate::runtime::{AgentRuntime, LaunchRequest, SourceEvent};

/// Emitted when upstream stays silent this long, so intermediary proxies
/// and client connections survive long model think-time.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(15);

const FALLBACK_ERROR_MESSAGE: &str = "upstream run failed";

/// Per-run relay configuration.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub session_key: String,
    pub page_context: PageContext,
    pub heartbeat: Duration,
    pub cancel: CancellationToken,
}

impl RelayOptions {
    pub fn new(session_key: impl Into<String>, page_context: PageContext) -> Self {
        Self {
            session_key: session_key.into(),
            page_context,
            heartbeat: DEFAULT_HEARTBEAT,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Mutable relay state, exclusively owned by one streamed run and
/// discarded when the outbound stream terminates.
#[derive(Debug, Default)]
struct RelayState {
    reasoning_open: bool,
    tracker: DeliveryTracker,
    accumulated_text: String,
    tool_calls: Vec<ToolCallRecord>,
    disconnected: bool,
}

impl RelayState {
    /// Step function: fold one upstream event into state and return the
    /// outbound events it produces, in order.
    fn apply(&mut self, event: SourceEvent) -> Vec<OutboundEvent> {
        let mut out = Vec::new();
        match event {
            SourceEvent::TextDelta { item_id, text } => {
                self.tracker
                    .should_emit(item_id.as_deref(), Delivery::Incremental);
                self.accumulated_text.push_str(&text);
                if !text.is_empty() {
                    out.push(OutboundEvent::TextDelta { text });
                }
            }
            SourceEvent::ItemCompleted { item_id, text } => {
                if self.tracker.should_emit(item_id.as_deref(), Delivery::Final) {
                    self.accumulated_text.push_str(&text);
                    if !text.is_empty() {
                        out.push(OutboundEvent::TextDelta { text });
                    }
                }
            }
            SourceEvent::ReasoningDelta { text } => {
                if !self.reasoning_open {
                    self.reasoning_open = true;
                    out.push(OutboundEvent::ReasoningStart {});
                }
                if !text.is_empty() {
                    out.push(OutboundEvent::ReasoningDelta { text });
                }
            }
            SourceEvent::ReasoningDone => {
                if self.reasoning_open {
                    self.reasoning_open = false;
                    out.push(OutboundEvent::ReasoningDone {});
                }
            }
            SourceEvent::ToolCallStarted { tool_name } => {
                let tool_name = tool_name.unwrap_or_else(|| "unknown".to_string());
                self.tool_calls.push(ToolCallRecord::started(&tool_name));
                out.push(OutboundEvent::ToolCallStarted { tool_name });
            }
            SourceEvent::ToolCallCompleted { tool_name } => {
                out.push(OutboundEvent::ToolCallCompleted {
                    tool_name: tool_name.unwrap_or_else(|| "unknown".to_string()),
                });
            }
            SourceEvent::Failed { message } => {
                // Non-fatal: a failed content block does not imply the
                // whole run is dead; keep draining whatever follows.
                out.push(OutboundEvent::Error {
                    message: message.unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string()),
                });
            }
            SourceEvent::Handoff => {
                // A new agent taking over implicitly closes any open
                // reasoning block; state reset, not a content event.
                self.reasoning_open = false;
            }
            SourceEvent::Unknown => {
                tracing::debug!("skipping unrecognized upstream event");
            }
        }
        out
    }

    /// Terminal pass once upstream is exhausted: close an open reasoning
    /// block, extract directives from the full transcript, and report the
    /// tool audit trail.
    fn drain(&mut self, page_context: &PageContext) -> Vec<OutboundEvent> {
        let mut out = Vec::new();
        if self.reasoning_open {
            self.reasoning_open = false;
            out.push(OutboundEvent::ReasoningDone {});
        }
        if !self.accumulated_text.is_empty() {
            let extraction = actions::extract(&self.accumulated_text);
            if !extraction.actions.is_empty() {
                out.push(OutboundEvent::Actions {
                    actions: extraction.actions,
                });
            }
        }
        if !self.tool_calls.is_empty() {
            out.push(OutboundEvent::Metadata {
                tools_used: std::mem::take(&mut self.tool_calls),
                page_context: page_context.clone(),
            });
        }
        out
    }
}

/// Drives one upstream run and produces the outbound event sequence.
pub struct StreamRelay {
    options: RelayOptions,
}

impl StreamRelay {
    pub fn new(options: RelayOptions) -> Self {
        Self { options }
    }

    /// Launch the run and relay its events until upstream is exhausted,
    /// the client disconnects, or the launch fails.
    ///
    /// The client always sees either a terminal `complete` event or an
    /// `error` event for a failed launch; only a client-initiated
    /// disconnect ends the stream without one.
    pub fn run(
        self,
        runtime: Arc<dyn AgentRuntime>,
        request: LaunchRequest,
    ) -> BoxStream<'static, OutboundEvent> {
        let RelayOptions {
            session_key,
            page_context,
            heartbeat,
            cancel,
        } = self.options;
        let run_id = request.run_id;

        let stream = async_stream::stream! {
            let mut source = match runtime.launch(request).await {
                Ok(source) => source,
                Err(error) => {
                    tracing::warn!(%run_id, %error, "run launch failed");
                    yield OutboundEvent::Error {
                        message: error.to_string(),
                    };
                    return;
                }
            };
            tracing::debug!(%run_id, session_key = %session_key, "relay streaming");

            let mut state = RelayState::default();
            loop {
                // Disconnect is polled once per iteration: best-effort,
                // not preemptive. Outstanding upstream work is abandoned.
                if cancel.is_cancelled() {
                    state.disconnected = true;
                    break;
                }
                match time::timeout(heartbeat, source.next()).await {
                    Err(_) => {
                        yield OutboundEvent::Heartbeat {};
                    }
                    Ok(None) => break,
                    Ok(Some(event)) => {
                        for outbound in state.apply(event) {
                            yield outbound;
                        }
                    }
                }
            }

            if state.disconnected {
                tracing::debug!(%run_id, session_key = %session_key, "client disconnected; dropping terminal events");
                return;
            }

            for outbound in state.drain(&page_context) {
                yield outbound;
            }
            yield OutboundEvent::Complete {
                session_id: session_key,
            };
            tracing::debug!(%run_id, "relay complete");
        };
        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests;
