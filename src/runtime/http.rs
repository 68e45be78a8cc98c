//! HTTP/SSE transport for a remote agent runtime.
//!
//! Launches a run with `POST {base}/v1/runs` and consumes the response as
//! a server-sent event feed. Each SSE message carries one JSON-encoded
//! upstream event, classified into [`SourceEvent`] before it reaches the
//! relay. A connection-level failure before the feed opens is a launch
//! failure; one after it opens surfaces in-band as a `Failed` event.

use futures::StreamExt;
use reqwest_eventsource::{Error as SseError, Event as SseEvent, EventSource};
use serde_json::json;

use super::{
    AgentRuntime, LaunchRequest, SourceEvent, SourceStream, ToolDefinition, USER_CONTEXT_MARKER,
};
use crate::error::{Result, SwitchboardError};

#[derive(Debug, Clone)]
pub struct HttpAgentRuntime {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    tools: Vec<ToolDefinition>,
}

impl HttpAgentRuntime {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            client: reqwest::Client::new(),
            tools: Vec::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    fn runs_url(&self) -> String {
        format!("{}/v1/runs", self.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &LaunchRequest) -> serde_json::Value {
        let mut history: Vec<serde_json::Value> = Vec::new();
        let already_injected = request
            .history
            .iter()
            .any(|entry| entry.content.contains(USER_CONTEXT_MARKER));
        if let Some(context) = &request.settings.user_context {
            if !already_injected {
                history.push(json!({"role": "system", "content": context}));
            }
        }
        history.extend(
            request
                .history
                .iter()
                .map(|entry| json!({"role": entry.role, "content": entry.content})),
        );

        json!({
            "run_id": request.run_id,
            "input": request.prompt,
            "history": history,
            "session": request
                .session
                .as_ref()
                .map(|handle| json!({"key": handle.session_key})),
            "session_key": request.session_key,
            "tools": request.tools,
            "model": request.settings.model,
            "max_turns": request.settings.effective_max_turns(),
            "stream": true,
        })
    }
}

#[async_trait::async_trait]
impl AgentRuntime for HttpAgentRuntime {
    async fn launch(&self, request: LaunchRequest) -> Result<SourceStream> {
        let mut builder = self.client.post(self.runs_url()).json(&self.build_body(&request));
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let mut source = EventSource::new(builder)
            .map_err(|error| SwitchboardError::Launch(error.to_string()))?;

        // The feed is not considered launched until the server accepts the
        // request; a pre-open failure is terminal.
        let mut pending: Option<SourceEvent> = None;
        match source.next().await {
            Some(Ok(SseEvent::Open)) => {}
            Some(Ok(SseEvent::Message(message))) => {
                pending = Some(parse_message(&message.data));
            }
            Some(Err(error)) => {
                source.close();
                return Err(SwitchboardError::Launch(error.to_string()));
            }
            None => {
                return Err(SwitchboardError::Launch(
                    "upstream closed before opening the event feed".to_string(),
                ));
            }
        }

        let run_id = request.run_id;
        let stream = async_stream::stream! {
            if let Some(event) = pending {
                yield event;
            }
            loop {
                match source.next().await {
                    Some(Ok(SseEvent::Open)) => {}
                    Some(Ok(SseEvent::Message(message))) => {
                        yield parse_message(&message.data);
                    }
                    Some(Err(SseError::StreamEnded)) | None => {
                        break;
                    }
                    Some(Err(error)) => {
                        tracing::warn!(%run_id, %error, "agent runtime feed failed mid-run");
                        source.close();
                        yield SourceEvent::Failed {
                            message: Some(error.to_string()),
                        };
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.clone()
    }
}

fn parse_message(data: &str) -> SourceEvent {
    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(value) => SourceEvent::classify(&value),
        Err(error) => {
            tracing::debug!(%error, "discarding non-JSON upstream event");
            SourceEvent::Unknown
        }
    }
}
