//! Mocks shared by the Ferry crates' tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use ferry_core::config::ModelConfig;
use ferry_core::error::{FerryError, Result};
use ferry_core::output::{OutputEvent, OutputSink};
use ferry_core::traits::{ChatModel, LlmClient, StreamObserver, ToolProvider};
use ferry_core::types::*;

// ---- LLM clients ----

enum LlmStep {
    Fail(String),
    Deltas(Vec<StreamDelta>),
    Broken(Vec<StreamDelta>, String),
}

/// Streaming client that plays back a script, one step per call.
#[derive(Default)]
pub struct ScriptedLlm {
    steps: Mutex<VecDeque<LlmStep>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// The call fails before a stream is opened.
    pub fn then_fail(self, message: &str) -> Self {
        self.push(LlmStep::Fail(message.to_string()))
    }

    /// The call streams these deltas and ends cleanly.
    pub fn then_deltas(self, deltas: Vec<StreamDelta>) -> Self {
        self.push(LlmStep::Deltas(deltas))
    }

    /// The call streams these deltas and then errors.
    pub fn then_broken_stream(self, deltas: Vec<StreamDelta>, message: &str) -> Self {
        self.push(LlmStep::Broken(deltas, message.to_string()))
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    fn push(self, step: LlmStep) -> Self {
        self.steps.lock().unwrap().push_back(step);
        self
    }
}

impl LlmClient for ScriptedLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        _messages: Vec<ChatMessage>,
        _tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        Box::pin(async move {
            let items: Vec<Result<StreamDelta>> = match step {
                None => return Err(FerryError::LlmRequest("script exhausted".into())),
                Some(LlmStep::Fail(m)) => return Err(FerryError::LlmRequest(m)),
                Some(LlmStep::Deltas(d)) => d.into_iter().map(Ok).collect(),
                Some(LlmStep::Broken(d, m)) => d
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(FerryError::LlmStream(m))))
                    .collect(),
            };
            Ok(Box::pin(futures::stream::iter(items)) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

/// Streaming client that always fails and counts attempts.
#[derive(Default)]
pub struct FailingLlm {
    calls: Arc<AtomicUsize>,
}

impl FailingLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl LlmClient for FailingLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        _messages: Vec<ChatMessage>,
        _tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move { Err(FerryError::LlmRequest(format!("HTTP 503 (attempt {})", n))) })
    }
}

// ---- Chat model ----

enum ChatStep {
    Respond {
        response: LlmResponse,
        deltas: Vec<StreamDelta>,
    },
    Fail(String),
}

/// [`ChatModel`] returning scripted responses and recording every request.
#[derive(Default)]
pub struct ScriptedChat {
    steps: Mutex<VecDeque<ChatStep>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    tool_names: Mutex<Vec<Vec<String>>>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, response: LlmResponse) -> Self {
        self.then_streaming(response, Vec::new())
    }

    /// Feed `deltas` to the observer before returning `response`.
    pub fn then_streaming(self, response: LlmResponse, deltas: Vec<StreamDelta>) -> Self {
        self.steps
            .lock()
            .unwrap()
            .push_back(ChatStep::Respond { response, deltas });
        self
    }

    /// The call fails as if every retry had been used up.
    pub fn then_fail(self, message: &str) -> Self {
        self.steps
            .lock()
            .unwrap()
            .push_back(ChatStep::Fail(message.to_string()));
        self
    }

    /// Messages sent on each call, in call order.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    /// Tool names offered on each call.
    pub fn offered_tools(&self) -> Vec<Vec<String>> {
        self.tool_names.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl ChatModel for ScriptedChat {
    fn chat<'a>(
        &'a self,
        messages: Vec<ChatMessage>,
        tools: &'a [ToolDefinition],
        observer: &'a mut dyn StreamObserver,
    ) -> BoxFuture<'a, Result<LlmResponse>> {
        self.requests.lock().unwrap().push(messages);
        self.tool_names
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());
        let step = self.steps.lock().unwrap().pop_front();
        Box::pin(async move {
            match step {
                Some(ChatStep::Respond { response, deltas }) => {
                    for delta in &deltas {
                        observer.on_delta(delta).await;
                    }
                    observer.finish().await;
                    Ok(response)
                }
                Some(ChatStep::Fail(last)) => Err(FerryError::RetriesExhausted { attempts: 3, last }),
                None => Err(FerryError::RetriesExhausted {
                    attempts: 1,
                    last: "script exhausted".into(),
                }),
            }
        })
    }
}

/// Final-answer response.
pub fn answer(content: &str) -> LlmResponse {
    LlmResponse {
        content: content.to_string(),
        finish_reason: FinishReason::Stop,
        ..Default::default()
    }
}

/// Response requesting the given `(name, arguments)` tool calls.
pub fn calls(calls: &[(&str, serde_json::Value)]) -> LlmResponse {
    LlmResponse {
        tool_calls: calls
            .iter()
            .enumerate()
            .map(|(i, (name, args))| {
                let arguments = args.as_object().cloned().unwrap_or_default();
                ToolCall::new(format!("call_{}", i), *name, arguments)
            })
            .collect(),
        finish_reason: FinishReason::ToolCalls,
        ..Default::default()
    }
}

// ---- Remote tools ----

/// Scriptable [`ToolProvider`].
#[derive(Default)]
pub struct MockToolProvider {
    tools: Vec<ToolDefinition>,
    results: HashMap<String, std::result::Result<String, String>>,
    delays: HashMap<String, Duration>,
    fail_listing: Option<String>,
    list_calls: AtomicUsize,
    calls: Mutex<Vec<(String, serde_json::Map<String, serde_json::Value>)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockToolProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: &str, result: &str) -> Self {
        self.tools.push(definition(name));
        self.results.insert(name.to_string(), Ok(result.to_string()));
        self
    }

    pub fn with_failing_tool(mut self, name: &str, error: &str) -> Self {
        self.tools.push(definition(name));
        self.results.insert(name.to_string(), Err(error.to_string()));
        self
    }

    /// Delay the named tool's reply.
    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    pub fn failing_list(mut self, error: &str) -> Self {
        self.fail_listing = Some(error.to_string());
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Tool names in the order calls started.
    pub fn called(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn definition(name: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: format!("mock tool {}", name),
        input_schema: serde_json::json!({"type": "object", "properties": {}}),
    }
}

impl ToolProvider for MockToolProvider {
    fn list_tools(&self) -> BoxFuture<'_, Result<Vec<ToolDefinition>>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            match &self.fail_listing {
                Some(e) => Err(FerryError::Mcp(e.clone())),
                None => Ok(self.tools.clone()),
            }
        })
    }

    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'a, Result<String>> {
        self.calls.lock().unwrap().push((name.to_string(), arguments));
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delays.get(name) {
                tokio::time::sleep(*delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match self.results.get(name) {
                Some(Ok(out)) => Ok(out.clone()),
                Some(Err(e)) => Err(FerryError::ToolExecution {
                    tool: name.to_string(),
                    message: e.clone(),
                }),
                None => Err(FerryError::ToolNotFound(name.to_string())),
            }
        })
    }
}

// ---- Output ----

/// Sink that keeps every event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<OutputEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                OutputEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// Events other than status updates.
    pub fn stream(&self) -> Vec<OutputEvent> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, OutputEvent::Status(_)))
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl OutputSink for RecordingSink {
    fn emit(&self, event: OutputEvent) -> BoxFuture<'_, ()> {
        self.events.lock().unwrap().push(event);
        Box::pin(async {})
    }
}
