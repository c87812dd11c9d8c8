//! RAG agent: OpenAI chat completions with tool calling.
//!
//! Routing lives in the system prompt: labor-law questions go through the
//! knowledge-store tool, personal interests through the memory tools. All
//! dependencies travel in an explicit [`AgentDeps`] context — there is no
//! module-level client state.

use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
        ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
        ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
        ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
        ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequest, FunctionObject,
    },
    Client as OpenAIClient,
};
use futures::StreamExt;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::integrations::{Mem0Client, MemoryMessage};
use crate::kg::{KnowledgeStore, QueryMode};
use crate::session::ChatTurn;

/// Upper bound on tool rounds per question; the last round runs without
/// tools so the model must answer.
const MAX_TOOL_ROUNDS: usize = 4;

/// Chunks retrieved per knowledge-store query.
const RETRIEVE_TOP_K: usize = 8;

const SYSTEM_PROMPT: &str = "\
You are a helpful assistant that answers different user questions.
Use the retrieve_rag tool to get relevant information from the knowledge base \
if the user input is related to employment policies, labor laws in Germany, or HR.
Use the retrieve_memory tool if the user input is related to the user's personal \
growth and interests.
If the user input is about personal growth or interests, use the store_memory tool \
to store the new memory and inform the user about it.
If data retrieved from the tools doesn't contain the answer, clearly state that the \
information isn't available in the stored data and provide your best general \
knowledge response.";

/// Dependencies for the RAG agent, created once at process start.
pub struct AgentDeps {
    pub store: Arc<KnowledgeStore>,
    pub memory: Mem0Client,
    pub user_id: String,
}

/// Result of one agent run.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub answer: String,
    pub new_messages: Vec<ChatTurn>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RetrieveRagArgs {
    /// The search query to find relevant documents
    search_query: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct StoreMemoryArgs {
    /// The user statement to remember
    messages: String,
    /// Optional user id overriding the session default
    user_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RetrieveMemoryArgs {
    /// The search query to find relevant memories
    query: String,
    /// Optional user id overriding the session default
    user_id: Option<String>,
}

/// Streamed-tool-call accumulator (one per `index` in the delta stream).
#[derive(Debug, Default, Clone)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// The RAG agent.
pub struct RagAgent {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl RagAgent {
    /// Create the agent from configuration; requires OPENAI_API_KEY.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY not set".to_string()))?;

        let openai_config = OpenAIConfig::new().with_api_key(api_key);
        Ok(Self {
            client: OpenAIClient::with_config(openai_config),
            model: config.chat_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Answer a question, running tools as needed.
    pub async fn run(
        &self,
        deps: &AgentDeps,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<AgentReply> {
        let mut messages = build_messages(question, history);

        for round in 0..MAX_TOOL_ROUNDS {
            let with_tools = round + 1 < MAX_TOOL_ROUNDS;
            let request = self.request(messages.clone(), with_tools, false);

            let response = self.client.chat().create(request).await?;
            let choice = response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| Error::OpenAi("no response choices returned".to_string()))?;

            let tool_calls = choice.message.tool_calls.unwrap_or_default();
            if tool_calls.is_empty() {
                let answer = choice.message.content.unwrap_or_default();
                return Ok(reply(question, answer));
            }

            let content = choice.message.content.clone();
            messages.push(assistant_with_tool_calls(content, tool_calls.clone()));

            for call in tool_calls {
                let result = self
                    .dispatch_tool(deps, &call.function.name, &call.function.arguments)
                    .await;
                messages.push(tool_result(call.id, result));
            }
        }

        Err(Error::OpenAi(
            "agent did not produce a final answer".to_string(),
        ))
    }

    /// Answer a question, streaming final-answer text deltas into `tx`.
    pub async fn run_stream(
        &self,
        deps: &AgentDeps,
        question: &str,
        history: &[ChatTurn],
        tx: mpsc::Sender<String>,
    ) -> Result<AgentReply> {
        let mut messages = build_messages(question, history);

        for round in 0..MAX_TOOL_ROUNDS {
            let with_tools = round + 1 < MAX_TOOL_ROUNDS;
            let request = self.request(messages.clone(), with_tools, true);

            let mut stream = self.client.chat().create_stream(request).await?;
            let mut content = String::new();
            let mut calls: Vec<PendingCall> = Vec::new();

            while let Some(result) = stream.next().await {
                let chunk = result?;
                let Some(choice) = chunk.choices.first() else {
                    continue;
                };

                if let Some(delta) = &choice.delta.content {
                    if !delta.is_empty() {
                        content.push_str(delta);
                        // Receiver gone means the client disconnected; keep
                        // accumulating so the session history stays complete.
                        let _ = tx.send(delta.clone()).await;
                    }
                }

                if let Some(tool_deltas) = &choice.delta.tool_calls {
                    for tool_delta in tool_deltas {
                        let index = tool_delta.index as usize;
                        if calls.len() <= index {
                            calls.resize(index + 1, PendingCall::default());
                        }
                        let pending = &mut calls[index];
                        if let Some(id) = &tool_delta.id {
                            pending.id.push_str(id);
                        }
                        if let Some(function) = &tool_delta.function {
                            if let Some(name) = &function.name {
                                pending.name.push_str(name);
                            }
                            if let Some(arguments) = &function.arguments {
                                pending.arguments.push_str(arguments);
                            }
                        }
                    }
                }
            }

            if calls.is_empty() {
                return Ok(reply(question, content));
            }

            debug!("Agent round {}: {} tool call(s)", round + 1, calls.len());

            let tool_calls: Vec<ChatCompletionMessageToolCall> = calls
                .iter()
                .map(|call| ChatCompletionMessageToolCall {
                    id: call.id.clone(),
                    r#type: ChatCompletionToolType::Function,
                    function: async_openai::types::FunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect();

            let content = (!content.is_empty()).then_some(content);
            messages.push(assistant_with_tool_calls(content, tool_calls));

            for call in calls {
                let result = self.dispatch_tool(deps, &call.name, &call.arguments).await;
                messages.push(tool_result(call.id, result));
            }
        }

        Err(Error::OpenAi(
            "agent did not produce a final answer".to_string(),
        ))
    }

    fn request(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        with_tools: bool,
        stream: bool,
    ) -> CreateChatCompletionRequest {
        CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            tools: with_tools.then(tool_definitions),
            stream: stream.then_some(true),
            ..Default::default()
        }
    }

    /// Run one tool call; failures become tool-visible error text so the
    /// model can recover or report.
    async fn dispatch_tool(&self, deps: &AgentDeps, name: &str, arguments: &str) -> String {
        match self.try_dispatch(deps, name, arguments).await {
            Ok(result) => result,
            Err(err) => {
                warn!("Tool '{}' failed: {}", name, err);
                format!("Tool '{}' failed: {}", name, err)
            }
        }
    }

    async fn try_dispatch(&self, deps: &AgentDeps, name: &str, arguments: &str) -> Result<String> {
        match name {
            "retrieve_rag" => {
                let args: RetrieveRagArgs = serde_json::from_str(arguments)?;
                deps.store
                    .query(&args.search_query, QueryMode::Mix, RETRIEVE_TOP_K)
                    .await
            }
            "store_memory" => {
                let args: StoreMemoryArgs = serde_json::from_str(arguments)?;
                let user_id = args.user_id.as_deref().unwrap_or(&deps.user_id);
                let records = deps
                    .memory
                    .add(&[MemoryMessage::user(args.messages)], user_id)
                    .await?;
                Ok(format!("Stored {} new memories.", records.len()))
            }
            "retrieve_memory" => {
                let args: RetrieveMemoryArgs = serde_json::from_str(arguments)?;
                let user_id = args.user_id.as_deref().unwrap_or(&deps.user_id);
                let records = deps.memory.search(&args.query, user_id).await?;
                if records.is_empty() {
                    return Ok("No relevant memories found.".to_string());
                }
                Ok(records
                    .iter()
                    .map(|r| format!("- {}", r.memory))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            other => Err(Error::InvalidArgument(format!("unknown tool '{}'", other))),
        }
    }
}

fn reply(question: &str, answer: String) -> AgentReply {
    AgentReply {
        new_messages: vec![ChatTurn::user(question), ChatTurn::assistant(answer.clone())],
        answer,
    }
}

fn build_messages(question: &str, history: &[ChatTurn]) -> Vec<ChatCompletionRequestMessage> {
    let mut messages = vec![system_message(SYSTEM_PROMPT)];

    for turn in history {
        match turn.role.as_str() {
            "user" => messages.push(user_message(&turn.content)),
            "assistant" => messages.push(ChatCompletionRequestMessage::Assistant(
                ChatCompletionRequestAssistantMessage {
                    content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                        turn.content.clone(),
                    )),
                    ..Default::default()
                },
            )),
            other => debug!("Skipping history turn with role '{}'", other),
        }
    }

    messages.push(user_message(question));
    messages
}

fn system_message(content: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
        content: ChatCompletionRequestSystemMessageContent::Text(content.to_string()),
        name: None,
    })
}

fn user_message(content: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
        content: ChatCompletionRequestUserMessageContent::Text(content.to_string()),
        name: None,
    })
}

fn assistant_with_tool_calls(
    content: Option<String>,
    tool_calls: Vec<ChatCompletionMessageToolCall>,
) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
        content: content.map(ChatCompletionRequestAssistantMessageContent::Text),
        tool_calls: Some(tool_calls),
        ..Default::default()
    })
}

fn tool_result(tool_call_id: String, result: String) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
        content: ChatCompletionRequestToolMessageContent::Text(result),
        tool_call_id,
    })
}

fn tool_definitions() -> Vec<ChatCompletionTool> {
    vec![
        tool(
            "retrieve_rag",
            "Retrieve relevant documents about employment policies, labor laws in Germany and HR from the knowledge base.",
            schemars::schema_for!(RetrieveRagArgs),
        ),
        tool(
            "store_memory",
            "Store a new personal memory about the user's growth or interests.",
            schemars::schema_for!(StoreMemoryArgs),
        ),
        tool(
            "retrieve_memory",
            "Search and retrieve personal memories about the user.",
            schemars::schema_for!(RetrieveMemoryArgs),
        ),
    ]
}

fn tool(
    name: &str,
    description: &str,
    schema: schemars::schema::RootSchema,
) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: name.to_string(),
            description: Some(description.to_string()),
            parameters: serde_json::to_value(schema).ok(),
            strict: None,
        },
    }
}
