//! OpenAI-backed engine: Chat Completions with tools, retry, and streaming.
//!
//! One turn runs the descriptor's middleware, then a bounded tool loop:
//! model call, execute any returned tool calls through the descriptor's
//! [`Toolbox`](crate::tools::Toolbox), feed the results back, repeat until
//! the model answers without tools or the round budget runs out. Tool
//! failures become tool messages so the model can recover with corrected
//! input; only model-call failures (after the retry policy is exhausted)
//! fail the turn.
//!
//! Streaming follows the [OpenAI Chat Completions Streaming] format: we
//! read `choices[0].delta.content` for incremental text and accumulate
//! `choices[0].delta.tool_calls` by index.
//!
//! [OpenAI Chat Completions Streaming]: https://platform.openai.com/docs/api-reference/chat-streaming

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionMessageToolCalls, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage, ChatCompletionTool,
        ChatCompletionToolChoiceOption, ChatCompletionTools, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, FunctionObject, ToolChoiceOptions,
    },
    Client,
};

use crate::context::RequestContext;
use crate::error::AgentError;
use crate::factory::AgentDescriptor;
use crate::message::{Message, Role};
use crate::middleware::PendingCall;
use crate::state::{ConversationState, TurnUpdate};
use crate::tools::{ToolError, Toolbox};

use super::{AgentEngine, ReplyChunk};

/// Upper bound on model calls per turn (first answer plus tool rounds).
const DEFAULT_MAX_TOOL_ROUNDS: usize = 4;

/// One tool invocation requested by the model.
#[derive(Clone, Debug)]
struct ToolInvocation {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Assistant text and tool calls from one model call.
#[derive(Debug, Default)]
struct ModelReply {
    content: String,
    tool_calls: Vec<ToolInvocation>,
}

/// Whether a failed model call may be attempted again. Fatal failures
/// bypass the retry policy: a closed chunk channel means the consumer is
/// gone, and a stream that already delivered text must not be replayed.
#[derive(Debug)]
enum CallFailure {
    Retryable(AgentError),
    Fatal(AgentError),
}

/// Chat Completions engine. API key comes from `OPENAI_API_KEY` by default;
/// use [`with_config`](OpenAiEngine::with_config) for an explicit key or
/// base URL.
pub struct OpenAiEngine {
    client: Client<OpenAIConfig>,
    max_tool_rounds: usize,
}

impl OpenAiEngine {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_config(config: OpenAIConfig) -> Self {
        Self {
            client: Client::with_config(config),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    /// Converts the system prompt and history to request messages. Tool
    /// output is replayed as user-role text ("Tool result: ...").
    fn request_messages(
        system_prompt: &str,
        messages: &[Message],
    ) -> Vec<ChatCompletionRequestMessage> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        out.push(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessage::from(system_prompt),
        ));
        for m in messages {
            out.push(match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(m.content.as_str()),
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(m.content.as_str()),
                ),
                Role::Assistant => {
                    ChatCompletionRequestMessage::Assistant((m.content.as_str()).into())
                }
                Role::Tool => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(
                        format!("Tool result: {}", m.content).as_str(),
                    ),
                ),
            });
        }
        out
    }

    fn build_request(
        descriptor: &AgentDescriptor,
        system_prompt: &str,
        window: &[Message],
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, AgentError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(descriptor.model.clone());
        args.messages(Self::request_messages(system_prompt, window));
        if stream {
            args.stream(true);
        }

        let specs = descriptor.toolbox.specs();
        if !specs.is_empty() {
            let tools: Vec<ChatCompletionTools> = specs
                .into_iter()
                .map(|t| {
                    ChatCompletionTools::Function(ChatCompletionTool {
                        function: FunctionObject {
                            name: t.name,
                            description: t.description,
                            parameters: Some(t.input_schema),
                            ..Default::default()
                        },
                    })
                })
                .collect();
            args.tools(tools);
            args.tool_choice(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Auto));
        }

        if let Some(t) = descriptor.temperature {
            args.temperature(t);
        }

        args.build()
            .map_err(|e| AgentError::ExecutionFailed(format!("request build failed: {e}")))
    }

    /// One model call, optionally forwarding content deltas. A dropped
    /// chunk receiver abandons the turn.
    async fn model_turn(
        &self,
        descriptor: &AgentDescriptor,
        system_prompt: &str,
        window: &[Message],
        chunk_tx: Option<&mpsc::Sender<ReplyChunk>>,
    ) -> Result<ModelReply, CallFailure> {
        let Some(chunk_tx) = chunk_tx else {
            return self.model_turn_whole(descriptor, system_prompt, window).await;
        };

        let request = Self::build_request(descriptor, system_prompt, window, true)
            .map_err(CallFailure::Fatal)?;
        debug!(
            model = %descriptor.model,
            node = %descriptor.node,
            window = window.len(),
            stream = true,
            "chat create_stream"
        );
        let mut stream = self.client.chat().create_stream(request).await.map_err(|e| {
            CallFailure::Retryable(AgentError::ExecutionFailed(format!("stream open: {e}")))
        })?;

        let mut content = String::new();
        // index -> (id, name, arguments), accumulated across deltas
        let mut tool_call_map: std::collections::BTreeMap<u32, (String, String, String)> =
            std::collections::BTreeMap::new();

        while let Some(result) = stream.next().await {
            let response = result.map_err(|e| {
                let error = AgentError::ExecutionFailed(format!("stream read: {e}"));
                // retrying after delivered text would replay it
                if content.is_empty() {
                    CallFailure::Retryable(error)
                } else {
                    CallFailure::Fatal(error)
                }
            })?;
            for choice in response.choices {
                let delta = &choice.delta;
                if let Some(ref text) = delta.content {
                    if !text.is_empty() {
                        content.push_str(text);
                        if chunk_tx
                            .send(ReplyChunk {
                                content: text.clone(),
                            })
                            .await
                            .is_err()
                        {
                            return Err(CallFailure::Fatal(AgentError::ExecutionFailed(
                                "reply stream closed by consumer".to_string(),
                            )));
                        }
                    }
                }
                if let Some(ref tool_calls) = delta.tool_calls {
                    for tc in tool_calls {
                        let entry = tool_call_map.entry(tc.index).or_default();
                        if let Some(ref id) = tc.id {
                            if !id.is_empty() {
                                entry.0 = id.clone();
                            }
                        }
                        if let Some(ref func) = tc.function {
                            if let Some(ref name) = func.name {
                                entry.1.push_str(name);
                            }
                            if let Some(ref arguments) = func.arguments {
                                entry.2.push_str(arguments);
                            }
                        }
                    }
                }
            }
        }

        let tool_calls = tool_call_map
            .into_values()
            .map(|(id, name, arguments)| ToolInvocation {
                id: if id.is_empty() { None } else { Some(id) },
                name,
                arguments,
            })
            .collect();
        Ok(ModelReply {
            content,
            tool_calls,
        })
    }

    async fn model_turn_whole(
        &self,
        descriptor: &AgentDescriptor,
        system_prompt: &str,
        window: &[Message],
    ) -> Result<ModelReply, CallFailure> {
        let request = Self::build_request(descriptor, system_prompt, window, false)
            .map_err(CallFailure::Fatal)?;
        debug!(
            model = %descriptor.model,
            node = %descriptor.node,
            window = window.len(),
            "chat create"
        );
        let response = self.client.chat().create(request).await.map_err(|e| {
            CallFailure::Retryable(AgentError::ExecutionFailed(format!("api error: {e}")))
        })?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            CallFailure::Retryable(AgentError::ExecutionFailed(
                "no choices in response".to_string(),
            ))
        })?;
        let msg = choice.message;
        let tool_calls = msg
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| {
                if let ChatCompletionMessageToolCalls::Function(f) = tc {
                    Some(ToolInvocation {
                        id: Some(f.id),
                        name: f.function.name,
                        arguments: f.function.arguments,
                    })
                } else {
                    None
                }
            })
            .collect();
        Ok(ModelReply {
            content: msg.content.unwrap_or_default(),
            tool_calls,
        })
    }

    /// Model call wrapped in the descriptor's retry policy. Fatal failures
    /// and a closed chunk channel return immediately; retrying a turn the
    /// consumer already walked away from would only burn model calls.
    async fn model_turn_with_retry(
        &self,
        descriptor: &AgentDescriptor,
        system_prompt: &str,
        window: &[Message],
        chunk_tx: Option<&mpsc::Sender<ReplyChunk>>,
    ) -> Result<ModelReply, AgentError> {
        let policy = &descriptor.retry;
        let mut attempt = 0u32;
        loop {
            match self
                .model_turn(descriptor, system_prompt, window, chunk_tx)
                .await
            {
                Ok(reply) => return Ok(reply),
                Err(CallFailure::Fatal(e)) => return Err(e),
                Err(CallFailure::Retryable(e)) => {
                    attempt += 1;
                    if attempt >= policy.max_attempts {
                        return Err(e);
                    }
                    if chunk_tx.is_some_and(|tx| tx.is_closed()) {
                        return Err(e);
                    }
                    let delay = policy.delay_for(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn run_turn(
        &self,
        descriptor: &AgentDescriptor,
        state: &ConversationState,
        ctx: &RequestContext,
        chunk_tx: Option<&mpsc::Sender<ReplyChunk>>,
    ) -> Result<TurnUpdate, AgentError> {
        let mut call = PendingCall {
            system_prompt: descriptor.system_prompt.clone(),
            messages: state.messages.clone(),
            extensions: state.extensions.clone(),
        };
        for mw in &descriptor.middleware {
            mw.before_model(&mut call, ctx).await;
        }

        let mut window = call.messages;
        let mut extensions = call.extensions;
        let mut appended: Vec<Message> = Vec::new();

        for round in 0..self.max_tool_rounds {
            let reply = self
                .model_turn_with_retry(descriptor, &call.system_prompt, &window, chunk_tx)
                .await?;

            let assistant = Message::assistant(reply.content);
            window.push(assistant.clone());
            appended.push(assistant);

            if reply.tool_calls.is_empty() {
                break;
            }
            if round + 1 == self.max_tool_rounds {
                warn!(
                    node = %descriptor.node,
                    rounds = self.max_tool_rounds,
                    "tool round budget exhausted"
                );
                break;
            }

            for (i, tc) in reply.tool_calls.into_iter().enumerate() {
                let ToolInvocation {
                    id,
                    name,
                    arguments,
                } = tc;
                let call_id = id.unwrap_or_else(|| format!("call-{round}-{i}"));
                let message =
                    match run_tool(descriptor.toolbox.as_ref(), &name, &arguments, ctx).await {
                        Ok(outcome) => {
                            extensions.extend(outcome.extensions);
                            Message::tool(outcome.content, call_id)
                        }
                        Err(e) => {
                            warn!(tool = %name, error = %e, "tool call failed");
                            Message::tool(
                                format!(
                                    "Tool error in '{name}': {e}. Check the input and try again."
                                ),
                                call_id,
                            )
                        }
                    };
                window.push(message.clone());
                appended.push(message);
            }
        }

        let mut turn = TurnUpdate {
            messages: appended,
            extensions,
        };
        for mw in &descriptor.middleware {
            mw.after_model(&mut turn, ctx).await;
        }
        Ok(turn)
    }
}

impl Default for OpenAiEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses the raw argument JSON and executes one tool call.
async fn run_tool(
    toolbox: &dyn Toolbox,
    name: &str,
    raw_arguments: &str,
    ctx: &RequestContext,
) -> Result<crate::tools::ToolOutcome, ToolError> {
    let arguments: serde_json::Value = if raw_arguments.trim().is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str(raw_arguments).map_err(|e| ToolError::InvalidArguments {
            tool: name.to_string(),
            message: e.to_string(),
        })?
    };
    toolbox.call(name, &arguments, ctx).await
}

#[async_trait]
impl AgentEngine for OpenAiEngine {
    async fn execute(
        &self,
        descriptor: &AgentDescriptor,
        state: &ConversationState,
        ctx: &RequestContext,
    ) -> Result<TurnUpdate, AgentError> {
        self.run_turn(descriptor, state, ctx, None).await
    }

    async fn execute_stream(
        &self,
        descriptor: &AgentDescriptor,
        state: &ConversationState,
        ctx: &RequestContext,
        chunk_tx: mpsc::Sender<ReplyChunk>,
    ) -> Result<TurnUpdate, AgentError> {
        self.run_turn(descriptor, state, ctx, Some(&chunk_tx)).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::engine::RetryPolicy;
    use crate::factory::{AgentFactory, FactoryConfig};
    use crate::prompts::PromptStore;

    use super::*;

    fn descriptor() -> AgentDescriptor {
        AgentFactory::new(PromptStore::new(), FactoryConfig::default())
            .build("assistant")
            .unwrap()
    }

    fn unreachable_engine() -> OpenAiEngine {
        let config = OpenAIConfig::new()
            .with_api_key("test-key")
            .with_api_base("http://127.0.0.1:1");
        OpenAiEngine::with_config(config)
    }

    /// Request carries system prompt first, then history, with tool
    /// definitions attached.
    #[test]
    fn build_request_shapes_messages_and_tools() {
        let d = descriptor();
        let window = [
            Message::user("hi"),
            Message::assistant("hello"),
            Message::tool("4", "c1"),
        ];
        let request = OpenAiEngine::build_request(&d, "prompt text", &window, false).unwrap();
        let json = serde_json::to_value(&request).unwrap();
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        // tool output is replayed as user-role text
        assert_eq!(messages[3]["role"], "user");
        assert!(messages[3]["content"]
            .as_str()
            .unwrap()
            .starts_with("Tool result:"));
        assert_eq!(json["tools"].as_array().unwrap().len(), 4);
    }

    /// **Scenario**: execute() against an unreachable API base returns
    /// `ExecutionFailed` (no real API key needed).
    #[tokio::test]
    async fn execute_with_unreachable_base_fails() {
        let engine = unreachable_engine();
        let mut d = descriptor();
        d.retry = RetryPolicy::disabled();
        let state = ConversationState::new("t1").with_user_message("hi");
        let result = engine.execute(&d, &state, &RequestContext::default()).await;
        assert!(matches!(result, Err(AgentError::ExecutionFailed(_))));
    }

    /// Retry policy exhausts quickly with a tiny delay and still fails.
    #[tokio::test]
    async fn retry_exhaustion_propagates_the_last_error() {
        let engine = unreachable_engine();
        let mut d = descriptor();
        d.retry = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let state = ConversationState::new("t1").with_user_message("hi");
        let result = engine.execute(&d, &state, &RequestContext::default()).await;
        assert!(matches!(result, Err(AgentError::ExecutionFailed(_))));
    }

    /// A dropped chunk receiver fails the turn without walking the retry
    /// backoff schedule: with 5s delays configured, the error must surface
    /// well before the first sleep would have elapsed.
    #[tokio::test]
    async fn dropped_receiver_skips_retry_backoff() {
        let engine = unreachable_engine();
        let mut d = descriptor();
        d.retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
        };
        let state = ConversationState::new("t1").with_user_message("hi");
        let (tx, rx) = mpsc::channel::<ReplyChunk>(4);
        drop(rx);

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            engine.execute_stream(&d, &state, &RequestContext::default(), tx),
        )
        .await;
        match result {
            Ok(Err(AgentError::ExecutionFailed(_))) => {}
            Ok(Err(other)) => panic!("expected ExecutionFailed, got {other:?}"),
            Ok(Ok(_)) => panic!("turn must fail without a consumer"),
            Err(_) => panic!("turn was retried with backoff after the consumer disconnected"),
        }
    }

    #[tokio::test]
    async fn run_tool_rejects_malformed_argument_json() {
        let d = descriptor();
        let err = run_tool(
            d.toolbox.as_ref(),
            "calculate",
            "{not json",
            &RequestContext::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn run_tool_defaults_empty_arguments_to_object() {
        let d = descriptor();
        let outcome = run_tool(
            d.toolbox.as_ref(),
            "user_info",
            "",
            &RequestContext::for_session("u1", "t1"),
        )
        .await
        .unwrap();
        assert!(outcome.content.contains("u1"));
    }
}
