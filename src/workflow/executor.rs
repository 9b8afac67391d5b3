//! Workflow executor: runs agents turn by turn, dispatches their tool calls
//! and moves control between them.

use crate::agent::descriptor::AgentDescriptor;
use crate::agent::graph::{AgentGraph, HANDOFF_TOOL};
use crate::agent::llm::LLMProvider;
use crate::agent::types::{ChatMessage, ToolCallRequest};
use crate::browser::BrowserDriver;
use crate::error::{DuetError, Result};
use crate::state::SessionState;
use crate::tools::{self, ToolErrorKind, ToolKind, ToolOutcome};
use crate::workflow::schema::{RunOutput, WorkflowEvent};
use futures::Stream;
use serde::Deserialize;
use std::sync::Arc;
use std::task::Poll;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default bound on model turns per run
pub const DEFAULT_MAX_STEPS: u32 = 50;

/// Capacity of the event channel between runner and consumer
const EVENT_BUFFER: usize = 64;

/// A configured set of agents ready to serve user requests.
pub struct Workflow {
    graph: Arc<AgentGraph>,
    llm: Arc<dyn LLMProvider>,
    browser: Arc<dyn BrowserDriver>,
    max_steps: u32,
}

impl Workflow {
    pub fn new(
        graph: AgentGraph,
        llm: Arc<dyn LLMProvider>,
        browser: Arc<dyn BrowserDriver>,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            llm,
            browser,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Start a run on the tokio runtime, beginning at the root agent.
    pub fn run(&self, user_msg: impl Into<String>) -> WorkflowHandler {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let runner = Runner {
            graph: Arc::clone(&self.graph),
            llm: Arc::clone(&self.llm),
            browser: Arc::clone(&self.browser),
            max_steps: self.max_steps,
            events: tx,
        };
        let user_msg = user_msg.into();
        let state = SessionState::new();

        let task = tokio::spawn(async move {
            let result = runner.drive(user_msg, state).await;
            if let Err(e) = &result {
                tracing::error!("Workflow run failed: {}", e);
            }
            result
        });

        WorkflowHandler {
            events: Some(rx),
            task,
        }
    }
}

/// Handle to one in-flight run
pub struct WorkflowHandler {
    events: Option<mpsc::Receiver<WorkflowEvent>>,
    task: JoinHandle<Result<RunOutput>>,
}

impl WorkflowHandler {
    /// Events in emission order. Ends when the run finishes; a second call
    /// yields nothing.
    pub fn stream_events(&mut self) -> impl Stream<Item = WorkflowEvent> + '_ {
        futures::stream::poll_fn(move |cx| match self.events.as_mut() {
            Some(rx) => rx.poll_recv(cx),
            None => Poll::Ready(None),
        })
    }

    /// Wait for the run to end. Unread events are discarded.
    pub async fn finish(mut self) -> Result<RunOutput> {
        // Closing the receiver keeps the runner from blocking on a full channel
        self.events.take();
        self.task.await?
    }
}

#[derive(Debug, Deserialize)]
struct HandoffArgs {
    to_agent: String,
    #[serde(default)]
    reason: String,
}

struct Runner {
    graph: Arc<AgentGraph>,
    llm: Arc<dyn LLMProvider>,
    browser: Arc<dyn BrowserDriver>,
    max_steps: u32,
    events: mpsc::Sender<WorkflowEvent>,
}

impl Runner {
    async fn emit(&self, event: WorkflowEvent) {
        if self.events.send(event).await.is_err() {
            tracing::trace!("Event receiver closed, dropping event");
        }
    }

    async fn drive(&self, user_msg: String, mut state: SessionState) -> Result<RunOutput> {
        let graph = self.graph.as_ref();
        let mut active = graph.root();
        tracing::info!(agent = active.name(), "Starting workflow run");
        self.emit(WorkflowEvent::AgentChanged {
            current_agent_name: active.name().to_string(),
            reason: None,
        })
        .await;

        let mut conversation = vec![ChatMessage::user(user_msg)];

        for step in 1..=self.max_steps {
            tracing::debug!(step, agent = active.name(), "Requesting model turn");

            let mut messages = Vec::with_capacity(conversation.len() + 1);
            messages.push(ChatMessage::system(graph.system_prompt(active)));
            messages.extend(conversation.iter().cloned());
            let tool_schemas = graph.tool_schemas(active);

            let response = self.llm.chat(&messages, &tool_schemas).await?;

            if let Some(text) = &response.content {
                self.emit(WorkflowEvent::OutputChunk {
                    current_agent_name: active.name().to_string(),
                    text: text.clone(),
                })
                .await;
            }

            if response.tool_calls.is_empty() {
                let reply = response.content.unwrap_or_default();
                if !reply.is_empty() {
                    state.extracted_info = reply.clone();
                }
                tracing::info!(step, agent = active.name(), "Workflow run complete");
                return Ok(RunOutput {
                    response: reply,
                    final_agent: active.name().to_string(),
                    state,
                    steps: step,
                });
            }

            conversation.push(ChatMessage::assistant(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            let mut handoff: Option<(&AgentDescriptor, String)> = None;
            for call in &response.tool_calls {
                self.emit(WorkflowEvent::ToolCallRequested {
                    current_agent_name: active.name().to_string(),
                    tool_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                })
                .await;

                let outcome = if let Some((next, _)) = &handoff {
                    ToolOutcome::failure(
                        ToolErrorKind::Skipped,
                        format!("Skipped: control was handed off to {}", next.name()),
                    )
                } else if call.name == HANDOFF_TOOL {
                    match self.resolve_handoff(active, call) {
                        Ok((next, reason)) => {
                            let outcome = ToolOutcome::success(format!(
                                "Handed off to {}",
                                next.name()
                            ));
                            handoff = Some((next, reason));
                            outcome
                        }
                        Err(outcome) => outcome,
                    }
                } else {
                    self.invoke(active, call, &mut state).await?
                };

                conversation.push(ChatMessage::tool(
                    call.id.clone(),
                    outcome.to_model_content(),
                ));
                self.emit(WorkflowEvent::ToolCallResult {
                    current_agent_name: active.name().to_string(),
                    tool_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    outcome,
                })
                .await;
            }

            if let Some((next, reason)) = handoff {
                tracing::info!(from = active.name(), to = next.name(), "Agent hand-off");
                active = next;
                self.emit(WorkflowEvent::AgentChanged {
                    current_agent_name: active.name().to_string(),
                    reason: Some(reason).filter(|r| !r.is_empty()),
                })
                .await;
            }
        }

        Err(DuetError::StepLimit(self.max_steps))
    }

    /// Check a hand-off request against the active agent's declared peers.
    fn resolve_handoff<'g>(
        &'g self,
        active: &AgentDescriptor,
        call: &ToolCallRequest,
    ) -> std::result::Result<(&'g AgentDescriptor, String), ToolOutcome> {
        let args: HandoffArgs = serde_json::from_value(call.arguments.clone()).map_err(|e| {
            ToolOutcome::failure(
                ToolErrorKind::InvalidArguments,
                format!("Invalid arguments for {}: {}", HANDOFF_TOOL, e),
            )
        })?;

        let target = self
            .graph
            .get(&args.to_agent)
            .filter(|_| self.graph.can_handoff(active.name(), &args.to_agent));

        match target {
            Some(next) => Ok((next, args.reason)),
            None => {
                let allowed: Vec<&str> =
                    active.handoff_targets().iter().map(String::as_str).collect();
                tracing::warn!(
                    from = active.name(),
                    to = %args.to_agent,
                    "Rejected hand-off"
                );
                Err(ToolOutcome::failure(
                    ToolErrorKind::HandoffRejected,
                    format!(
                        "Agent {} cannot hand off to {}. Allowed targets: {}",
                        active.name(),
                        args.to_agent,
                        allowed.join(", ")
                    ),
                ))
            }
        }
    }

    /// Run a browser tool, refusing tools outside the agent's set.
    async fn invoke(
        &self,
        active: &AgentDescriptor,
        call: &ToolCallRequest,
        state: &mut SessionState,
    ) -> Result<ToolOutcome> {
        let kind = ToolKind::from_name(&call.name).filter(|kind| active.has_tool(*kind));
        match kind {
            Some(kind) => tools::dispatch(kind, &call.arguments, self.browser.as_ref(), state).await,
            None => {
                tracing::warn!(agent = active.name(), tool = %call.name, "Unknown tool requested");
                Ok(ToolOutcome::failure(
                    ToolErrorKind::UnknownTool,
                    format!("Tool {} is not available to {}", call.name, active.name()),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::descriptor::{ANALYSIS_AGENT, BROWSER_AGENT};
    use crate::agent::types::LLMResponse;
    use crate::tools::action::fake::FakeBrowser;
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records every request
    #[derive(Default)]
    struct ScriptedLlm {
        replies: Mutex<VecDeque<LLMResponse>>,
        requests: Mutex<Vec<(Vec<ChatMessage>, Vec<Value>)>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<LLMResponse>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn offered_tools(&self, turn: usize) -> Vec<String> {
            self.requests.lock().unwrap()[turn]
                .1
                .iter()
                .filter_map(|s| s["function"]["name"].as_str().map(String::from))
                .collect()
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedLlm {
        async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((messages.to_vec(), tools.to_vec()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| DuetError::Llm("script exhausted".to_string()))
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-model"
        }
    }

    fn call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    fn workflow(llm: Arc<ScriptedLlm>, browser: Arc<FakeBrowser>) -> Workflow {
        Workflow::new(AgentGraph::browsing_pair().unwrap(), llm, browser)
    }

    async fn run_to_end(workflow: &Workflow, msg: &str) -> (Vec<WorkflowEvent>, Result<RunOutput>) {
        let mut handler = workflow.run(msg);
        let events: Vec<WorkflowEvent> = handler.stream_events().collect().await;
        (events, handler.finish().await)
    }

    fn results(events: &[WorkflowEvent]) -> Vec<(String, ToolOutcome)> {
        events
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::ToolCallResult {
                    tool_name, outcome, ..
                } => Some((tool_name.clone(), outcome.clone())),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigate_and_screenshot_scenario() {
        let llm = ScriptedLlm::new(vec![
            LLMResponse::calls(vec![call(
                "c1",
                "navigate_to",
                json!({"url": "https://example.com"}),
            )]),
            LLMResponse::calls(vec![call("c2", "take_screenshot", json!({}))]),
            LLMResponse::text("Took a screenshot of example.com."),
        ]);
        let browser = Arc::new(FakeBrowser::default());
        let wf = workflow(llm.clone(), browser.clone());

        let (events, output) = run_to_end(&wf, "go to example.com and take a screenshot").await;
        let output = output.unwrap();

        assert_eq!(output.steps, 3);
        assert_eq!(output.final_agent, BROWSER_AGENT);
        assert_eq!(output.response, "Took a screenshot of example.com.");
        assert_eq!(output.state.screenshots.len(), 1);
        assert_eq!(output.state.current_url, "https://example.com");
        assert_eq!(output.state.extracted_info, output.response);

        let changes = events
            .iter()
            .filter(|e| matches!(e, WorkflowEvent::AgentChanged { .. }))
            .count();
        assert_eq!(changes, 1);
        assert!(events.iter().all(|e| e.current_agent_name() == BROWSER_AGENT));

        let results = results(&events);
        assert_eq!(results[0].1.message(), "Navigated to https://example.com");
        assert_eq!(results[1].1.message(), "Screenshot taken: (1000, 1300) pixels");
        assert!(matches!(events.last(), Some(WorkflowEvent::OutputChunk { .. })));

        // The tool result reaches the model on the next turn
        let requests = llm.requests.lock().unwrap();
        let second_turn = &requests[1].0;
        assert_eq!(second_turn[0].role, "system");
        assert_eq!(
            second_turn.last().unwrap().content.as_deref(),
            Some("Navigated to https://example.com")
        );
    }

    #[tokio::test]
    async fn test_handoff_switches_agent_and_tools() {
        let llm = ScriptedLlm::new(vec![
            LLMResponse::calls(vec![call(
                "c1",
                HANDOFF_TOOL,
                json!({"to_agent": ANALYSIS_AGENT, "reason": "page loaded, needs analysis"}),
            )]),
            LLMResponse::text("The page is a placeholder domain."),
        ]);
        let wf = workflow(llm.clone(), Arc::new(FakeBrowser::default()));

        let (events, output) = run_to_end(&wf, "analyze the page").await;
        let output = output.unwrap();
        assert_eq!(output.final_agent, ANALYSIS_AGENT);

        let changes: Vec<(&str, Option<&str>)> = events
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::AgentChanged {
                    current_agent_name,
                    reason,
                } => Some((current_agent_name.as_str(), reason.as_deref())),
                _ => None,
            })
            .collect();
        assert_eq!(
            changes,
            vec![
                (BROWSER_AGENT, None),
                (ANALYSIS_AGENT, Some("page loaded, needs analysis"))
            ]
        );

        assert_eq!(
            llm.offered_tools(0),
            vec!["navigate_to", "click_element", "search_text", "take_screenshot", HANDOFF_TOOL]
        );
        assert_eq!(
            llm.offered_tools(1),
            vec!["search_text", "take_screenshot", HANDOFF_TOOL]
        );

        let requests = llm.requests.lock().unwrap();
        let system = requests[1].0[0].content.clone().unwrap();
        assert!(system.starts_with("You analyze web content"));
    }

    #[tokio::test]
    async fn test_handoff_outside_declared_edges_is_rejected() {
        let llm = ScriptedLlm::new(vec![
            LLMResponse::calls(vec![call(
                "c1",
                HANDOFF_TOOL,
                json!({"to_agent": "PlannerAgent", "reason": "planning"}),
            )]),
            LLMResponse::text("Staying put."),
        ]);
        let wf = workflow(llm, Arc::new(FakeBrowser::default()));

        let (events, output) = run_to_end(&wf, "plan something").await;
        assert_eq!(output.unwrap().final_agent, BROWSER_AGENT);

        let results = results(&events);
        assert_eq!(results[0].1.error_kind(), Some(ToolErrorKind::HandoffRejected));
        assert!(results[0].1.message().contains("Allowed targets: AnalysisAgent"));
        assert!(events.iter().all(|e| e.current_agent_name() == BROWSER_AGENT));
    }

    #[tokio::test]
    async fn test_calls_after_handoff_are_skipped() {
        let llm = ScriptedLlm::new(vec![
            LLMResponse::calls(vec![
                call("c1", HANDOFF_TOOL, json!({"to_agent": ANALYSIS_AGENT, "reason": "r"})),
                call("c2", "navigate_to", json!({"url": "https://example.com"})),
            ]),
            LLMResponse::text("done"),
        ]);
        let browser = Arc::new(FakeBrowser::default());
        let wf = workflow(llm, browser.clone());

        let (events, output) = run_to_end(&wf, "hand off").await;
        output.unwrap();

        let results = results(&events);
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].1.error_kind(), Some(ToolErrorKind::Skipped));
        assert!(browser.visited.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tool_outside_agent_set_is_not_dispatched() {
        let llm = ScriptedLlm::new(vec![
            LLMResponse::calls(vec![call(
                "c1",
                HANDOFF_TOOL,
                json!({"to_agent": ANALYSIS_AGENT, "reason": "r"}),
            )]),
            LLMResponse::calls(vec![
                call("c2", "navigate_to", json!({"url": "https://example.com"})),
                call("c3", "open_devtools", json!({})),
            ]),
            LLMResponse::text("I cannot navigate."),
        ]);
        let browser = Arc::new(FakeBrowser::default());
        let wf = workflow(llm, browser.clone());

        let (events, output) = run_to_end(&wf, "navigate as analyst").await;
        output.unwrap();

        let results = results(&events);
        assert_eq!(results[1].1.error_kind(), Some(ToolErrorKind::UnknownTool));
        assert_eq!(
            results[1].1.message(),
            "Tool navigate_to is not available to AnalysisAgent"
        );
        assert_eq!(results[2].1.error_kind(), Some(ToolErrorKind::UnknownTool));
        assert!(browser.visited.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_arguments_reported_to_model() {
        let llm = ScriptedLlm::new(vec![
            LLMResponse::calls(vec![call(
                "c1",
                "navigate_to",
                Value::String("{url: oops".to_string()),
            )]),
            LLMResponse::text("retrying later"),
        ]);
        let wf = workflow(llm, Arc::new(FakeBrowser::default()));

        let (events, output) = run_to_end(&wf, "go").await;
        output.unwrap();
        assert_eq!(
            results(&events)[0].1.error_kind(),
            Some(ToolErrorKind::InvalidArguments)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_limit() {
        let replies = (0..5)
            .map(|i| LLMResponse::calls(vec![call(&format!("c{}", i), "take_screenshot", json!({}))]))
            .collect();
        let llm = ScriptedLlm::new(replies);
        let wf = workflow(llm, Arc::new(FakeBrowser::default())).with_max_steps(2);

        let (_, output) = run_to_end(&wf, "screenshot forever").await;
        assert!(matches!(output, Err(DuetError::StepLimit(2))));
    }

    #[tokio::test]
    async fn test_browser_fault_ends_run() {
        let llm = ScriptedLlm::new(vec![LLMResponse::calls(vec![call(
            "c1",
            "navigate_to",
            json!({"url": "https://nowhere.invalid"}),
        )])]);
        let browser = Arc::new(FakeBrowser {
            fail_navigation: true,
            ..FakeBrowser::default()
        });
        let wf = workflow(llm, browser);

        let (events, output) = run_to_end(&wf, "go nowhere").await;
        assert!(matches!(output, Err(DuetError::Browser(_))));
        assert!(matches!(
            events.last(),
            Some(WorkflowEvent::ToolCallRequested { .. })
        ));
    }

    #[tokio::test]
    async fn test_llm_error_ends_run() {
        let wf = workflow(ScriptedLlm::new(vec![]), Arc::new(FakeBrowser::default()));
        let (events, output) = run_to_end(&wf, "anything").await;
        assert!(matches!(output, Err(DuetError::Llm(_))));
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_finish_without_streaming() {
        let llm = ScriptedLlm::new(vec![LLMResponse::text("nothing to do")]);
        let wf = workflow(llm, Arc::new(FakeBrowser::default()));

        let output = wf.run("hello").finish().await.unwrap();
        assert_eq!(output.response, "nothing to do");
        assert_eq!(output.steps, 1);
    }

    #[tokio::test]
    async fn test_stream_is_single_pass() {
        let llm = ScriptedLlm::new(vec![LLMResponse::text("ok")]);
        let wf = workflow(llm, Arc::new(FakeBrowser::default()));

        let mut handler = wf.run("hello");
        let first: Vec<_> = handler.stream_events().collect().await;
        let second: Vec<_> = handler.stream_events().collect().await;
        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        handler.finish().await.unwrap();
    }
}
