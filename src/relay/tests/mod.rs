use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::actions::UiAction;
use crate::context::PageContext;
use crate::error::{Result, SwitchboardError};
use crate::events::{OutboundEvent, ToolCallRecord};
use crate::relay::{RelayOptions, StreamRelay};
use crate::runtime::{AgentRuntime, LaunchRequest, SourceEvent, SourceStream, ToolDefinition};

struct ScriptedRuntime {
    events: Vec<SourceEvent>,
    hang_after: bool,
    fail_launch: Option<String>,
}

impl ScriptedRuntime {
    fn with_events(events: Vec<SourceEvent>) -> Arc<Self> {
        Arc::new(Self {
            events,
            hang_after: false,
            fail_launch: None,
        })
    }

    fn hanging(events: Vec<SourceEvent>) -> Arc<Self> {
        Arc::new(Self {
            events,
            hang_after: true,
            fail_launch: None,
        })
    }

    fn failing_launch(message: &str) -> Arc<Self> {
        Arc::new(Self {
            events: Vec::new(),
            hang_after: false,
            fail_launch: Some(message.to_string()),
        })
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn launch(&self, _request: LaunchRequest) -> Result<SourceStream> {
        if let Some(message) = &self.fail_launch {
            return Err(SwitchboardError::Launch(message.clone()));
        }
        let events = self.events.clone();
        let hang_after = self.hang_after;
        let stream = async_stream::stream! {
            for event in events {
                yield event;
            }
            if hang_after {
                futures::future::pending::<()>().await;
            }
        };
        Ok(Box::pin(stream))
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }
}

/// Runtime fed by a channel, for tests that interleave sends with polls.
struct ChannelRuntime {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<SourceEvent>>>,
}

impl ChannelRuntime {
    fn new() -> (Arc<Self>, mpsc::UnboundedSender<SourceEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                receiver: Mutex::new(Some(receiver)),
            }),
            sender,
        )
    }
}

#[async_trait]
impl AgentRuntime for ChannelRuntime {
    async fn launch(&self, _request: LaunchRequest) -> Result<SourceStream> {
        let receiver = self
            .receiver
            .lock()
            .await
            .take()
            .expect("channel runtime launched twice");
        Ok(Box::pin(UnboundedReceiverStream::new(receiver)))
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }
}

fn page() -> PageContext {
    PageContext {
        path: "/posts".to_string(),
        title: "Posts".to_string(),
        ..Default::default()
    }
}

fn options() -> RelayOptions {
    RelayOptions::new("s1", page())
}

fn text(item_id: &str, text: &str) -> SourceEvent {
    SourceEvent::TextDelta {
        item_id: Some(item_id.to_string()),
        text: text.to_string(),
    }
}

async fn collect(runtime: Arc<dyn AgentRuntime>, options: RelayOptions) -> Vec<OutboundEvent> {
    StreamRelay::new(options)
        .run(runtime, LaunchRequest::new("prompt", "s1"))
        .collect()
        .await
}

#[tokio::test]
async fn plain_text_run_ends_with_complete() {
    let runtime = ScriptedRuntime::with_events(vec![text("m1", "Hello "), text("m1", "there")]);
    let events = collect(runtime, options()).await;
    assert_eq!(
        events,
        vec![
            OutboundEvent::TextDelta {
                text: "Hello ".to_string()
            },
            OutboundEvent::TextDelta {
                text: "there".to_string()
            },
            OutboundEvent::Complete {
                session_id: "s1".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn directive_block_streams_raw_and_is_extracted_at_drain() {
    let runtime = ScriptedRuntime::with_events(vec![
        text("m1", "Let's go! "),
        text("m1", "[ACTIONS]{\"navigate\":"),
        text("m1", "\"/tags\"}[/ACTIONS]"),
    ]);
    let events = collect(runtime, options()).await;
    assert_eq!(
        events,
        vec![
            OutboundEvent::TextDelta {
                text: "Let's go! ".to_string()
            },
            OutboundEvent::TextDelta {
                text: "[ACTIONS]{\"navigate\":".to_string()
            },
            OutboundEvent::TextDelta {
                text: "\"/tags\"}[/ACTIONS]".to_string()
            },
            OutboundEvent::Actions {
                actions: vec![UiAction::Navigate {
                    path: "/tags".to_string()
                }]
            },
            OutboundEvent::Complete {
                session_id: "s1".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn finalized_duplicate_of_streamed_item_is_suppressed() {
    let runtime = ScriptedRuntime::with_events(vec![
        text("m1", "streamed"),
        SourceEvent::ItemCompleted {
            item_id: Some("m1".to_string()),
            text: "streamed".to_string(),
        },
        SourceEvent::ItemCompleted {
            item_id: Some("m2".to_string()),
            text: " synthesized".to_string(),
        },
    ]);
    let events = collect(runtime, options()).await;
    assert_eq!(
        events,
        vec![
            OutboundEvent::TextDelta {
                text: "streamed".to_string()
            },
            OutboundEvent::TextDelta {
                text: " synthesized".to_string()
            },
            OutboundEvent::Complete {
                session_id: "s1".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn reasoning_blocks_are_balanced_and_handoff_closes_implicitly() {
    let runtime = ScriptedRuntime::with_events(vec![
        SourceEvent::ReasoningDelta {
            text: "thinking".to_string(),
        },
        SourceEvent::ReasoningDelta {
            text: " more".to_string(),
        },
        SourceEvent::ReasoningDone,
        SourceEvent::ReasoningDelta {
            text: "expert view".to_string(),
        },
        SourceEvent::Handoff,
        text("m1", "answer"),
    ]);
    let events = collect(runtime, options()).await;
    assert_eq!(
        events,
        vec![
            OutboundEvent::ReasoningStart {},
            OutboundEvent::ReasoningDelta {
                text: "thinking".to_string()
            },
            OutboundEvent::ReasoningDelta {
                text: " more".to_string()
            },
            OutboundEvent::ReasoningDone {},
            OutboundEvent::ReasoningStart {},
            OutboundEvent::ReasoningDelta {
                text: "expert view".to_string()
            },
            OutboundEvent::TextDelta {
                text: "answer".to_string()
            },
            OutboundEvent::Complete {
                session_id: "s1".to_string()
            },
        ]
    );
    // The handoff closed the second block without a reasoning_done.
    let starts = events
        .iter()
        .filter(|e| matches!(e, OutboundEvent::ReasoningStart {}))
        .count();
    let dones = events
        .iter()
        .filter(|e| matches!(e, OutboundEvent::ReasoningDone {}))
        .count();
    assert_eq!(starts, 2);
    assert_eq!(dones, 1);
}

#[tokio::test]
async fn open_reasoning_block_is_closed_at_drain() {
    let runtime = ScriptedRuntime::with_events(vec![SourceEvent::ReasoningDelta {
        text: "unfinished".to_string(),
    }]);
    let events = collect(runtime, options()).await;
    assert_eq!(
        events,
        vec![
            OutboundEvent::ReasoningStart {},
            OutboundEvent::ReasoningDelta {
                text: "unfinished".to_string()
            },
            OutboundEvent::ReasoningDone {},
            OutboundEvent::Complete {
                session_id: "s1".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn launch_failure_emits_single_error_and_no_complete() {
    let runtime = ScriptedRuntime::failing_launch("runtime unavailable");
    let events = collect(runtime, options()).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        OutboundEvent::Error { message } if message.contains("runtime unavailable")
    ));
}

#[tokio::test]
async fn upstream_failure_is_non_fatal() {
    let runtime = ScriptedRuntime::with_events(vec![
        text("m1", "before"),
        SourceEvent::Failed { message: None },
        text("m2", " after"),
    ]);
    let events = collect(runtime, options()).await;
    assert_eq!(
        events,
        vec![
            OutboundEvent::TextDelta {
                text: "before".to_string()
            },
            OutboundEvent::Error {
                message: "upstream run failed".to_string()
            },
            OutboundEvent::TextDelta {
                text: " after".to_string()
            },
            OutboundEvent::Complete {
                session_id: "s1".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn unknown_events_are_skipped() {
    let runtime = ScriptedRuntime::with_events(vec![
        SourceEvent::Unknown,
        text("m1", "fine"),
        SourceEvent::Unknown,
    ]);
    let events = collect(runtime, options()).await;
    assert_eq!(
        events,
        vec![
            OutboundEvent::TextDelta {
                text: "fine".to_string()
            },
            OutboundEvent::Complete {
                session_id: "s1".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn tool_audit_trail_lands_in_metadata() {
    let runtime = ScriptedRuntime::with_events(vec![
        SourceEvent::ToolCallStarted {
            tool_name: Some("search_knowledge".to_string()),
        },
        SourceEvent::ToolCallCompleted { tool_name: None },
        text("m1", "found it"),
    ]);
    let events = collect(runtime, options()).await;
    assert_eq!(
        events,
        vec![
            OutboundEvent::ToolCallStarted {
                tool_name: "search_knowledge".to_string()
            },
            OutboundEvent::ToolCallCompleted {
                tool_name: "unknown".to_string()
            },
            OutboundEvent::TextDelta {
                text: "found it".to_string()
            },
            OutboundEvent::Metadata {
                tools_used: vec![ToolCallRecord::started("search_knowledge")],
                page_context: page(),
            },
            OutboundEvent::Complete {
                session_id: "s1".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn pre_cancelled_run_emits_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let runtime = ScriptedRuntime::with_events(vec![text("m1", "never seen")]);
    let events = collect(runtime, options().with_cancel(cancel)).await;
    assert_eq!(events, Vec::new());
}

#[tokio::test]
async fn disconnect_mid_stream_suppresses_terminal_events() {
    let cancel = CancellationToken::new();
    let runtime = ScriptedRuntime::hanging(vec![
        SourceEvent::ToolCallStarted {
            tool_name: Some("search_knowledge".to_string()),
        },
        text("m1", "partial [ACTIONS]{\"navigate\": \"/tags\"}[/ACTIONS]"),
    ]);
    let mut stream = StreamRelay::new(options().with_cancel(cancel.clone()))
        .run(runtime, LaunchRequest::new("prompt", "s1"));

    assert!(matches!(
        stream.next().await,
        Some(OutboundEvent::ToolCallStarted { .. })
    ));
    assert!(matches!(
        stream.next().await,
        Some(OutboundEvent::TextDelta { .. })
    ));

    cancel.cancel();
    // No actions, metadata, or complete after the disconnect is observed.
    assert_eq!(stream.next().await, None);
}

#[tokio::test(start_paused = true)]
async fn silent_upstream_produces_heartbeats() {
    let runtime = ScriptedRuntime::hanging(Vec::new());
    let mut stream = StreamRelay::new(options().with_heartbeat(Duration::from_secs(15)))
        .run(runtime, LaunchRequest::new("prompt", "s1"));
    for _ in 0..3 {
        assert_eq!(stream.next().await, Some(OutboundEvent::Heartbeat {}));
    }
}

#[tokio::test(start_paused = true)]
async fn heartbeats_stop_once_upstream_completes() {
    let (runtime, sender) = ChannelRuntime::new();
    let mut stream = StreamRelay::new(options().with_heartbeat(Duration::from_secs(15)))
        .run(runtime, LaunchRequest::new("prompt", "s1"));

    assert_eq!(stream.next().await, Some(OutboundEvent::Heartbeat {}));

    sender.send(text("m1", "late answer")).expect("send");
    assert_eq!(
        stream.next().await,
        Some(OutboundEvent::TextDelta {
            text: "late answer".to_string()
        })
    );

    drop(sender);
    assert_eq!(
        stream.next().await,
        Some(OutboundEvent::Complete {
            session_id: "s1".to_string()
        })
    );
    assert_eq!(stream.next().await, None);
}
