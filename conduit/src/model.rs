//! External interface to a language model backend.
//!
//! This module defines the seam the turn driver calls through on every
//! step: [`Model::get_response`] and [`Model::stream_response`]. No concrete
//! backend (OpenAI's responses API, a chat-completions shim, a local
//! server) ships in this crate — callers bring their own implementation as
//! `Arc<dyn Model>`. Backend-specific quirks (tool-choice encoding, hosted
//! tool support, streaming wire formats) live entirely in that
//! implementation; the turn driver only ever sees [`ModelRequest`] in and
//! [`ModelResponse`] (or a [`ModelEvent`] stream) out.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::{ModelSettings, OutputSchema, ToolDefinition};
use crate::error::{Error, Result};
use crate::message::{InputItem, Role};
use crate::usage::Usage;

/// Reasoning effort level for o-series models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    /// No reasoning (gpt-5.1+ only).
    None,
    /// Minimal reasoning effort.
    Minimal,
    /// Low reasoning effort.
    Low,
    /// Medium reasoning effort (default for most models).
    #[default]
    Medium,
    /// High reasoning effort.
    High,
    /// Extra high reasoning effort (gpt-5.1-codex-max+).
    #[serde(rename = "xhigh")]
    XHigh,
}

impl ReasoningEffort {
    /// Returns the string representation for the API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::XHigh => "xhigh",
        }
    }
}

/// Controls how the model uses tools.
#[derive(Debug, Clone, Default)]
pub enum ToolChoice {
    /// Model decides whether to use tools.
    #[default]
    Auto,
    /// Model must use at least one tool.
    Required,
    /// Model cannot use any tools.
    None,
    /// Model must use the specified function.
    Function(String),
}

impl ToolChoice {
    /// Converts to a JSON value in the shape most chat-completions-style
    /// backends expect; a responses-style backend may translate further.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Auto => Value::String("auto".to_owned()),
            Self::Required => Value::String("required".to_owned()),
            Self::None => Value::String("none".to_owned()),
            Self::Function(name) => serde_json::json!({
                "type": "function",
                "function": {"name": name}
            }),
        }
    }
}

impl From<&str> for ToolChoice {
    fn from(s: &str) -> Self {
        match s {
            "auto" => Self::Auto,
            "required" => Self::Required,
            "none" => Self::None,
            name => Self::Function(name.to_owned()),
        }
    }
}

/// Generate a JSON Schema from a Rust type that implements [`schemars::JsonSchema`].
///
/// Returns `(name, schema)` where `name` is derived from the type name and
/// `schema` is the JSON Schema definition with the `$schema` meta field
/// removed (LLM APIs don't need it).
///
/// This is the single source of truth for schema generation, used by
/// [`OutputSchema::from_type`](crate::agent::OutputSchema::from_type).
#[cfg(feature = "schema")]
#[must_use]
pub fn generate_json_schema<T: schemars::JsonSchema>() -> (String, Value) {
    let root = schemars::schema_for!(T);
    let mut schema_value = serde_json::to_value(&root).unwrap_or_default();

    // Remove the $schema meta field — LLM APIs don't need it.
    if let Value::Object(ref mut map) = schema_value {
        map.remove("$schema");
    }

    let name = <T as schemars::JsonSchema>::schema_name();
    (name.into_owned(), schema_value)
}

/// The request shape passed to [`Model::get_response`] and
/// [`Model::stream_response`].
///
/// Every field a backend needs to build its own wire request is present
/// here; nothing about the conversion is the turn driver's concern.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    /// The resolved system prompt for the active agent, if any.
    pub system_instructions: Option<String>,
    /// The full input list: session prefix (if any), original input, and
    /// every generated item's input projection.
    pub input: Vec<InputItem>,
    /// Sampling/behavior settings, already merged (agent settings
    /// overlaid by any run-config override).
    pub model_settings: ModelSettings,
    /// Function and hosted tools available this turn.
    pub tools: Vec<ToolDefinition>,
    /// The structured output schema the final message must satisfy, if
    /// the active agent declared one.
    pub output_type: Option<OutputSchema>,
    /// Handoff targets exposed as tool definitions this turn.
    pub handoffs: Vec<ToolDefinition>,
    /// The previous response's id, for backends that support
    /// server-side conversation state instead of replaying full history.
    pub previous_response_id: Option<String>,
    /// An opaque prompt-template reference, for backends that resolve
    /// prompts server-side rather than accepting raw instructions text.
    pub prompt: Option<String>,
}

impl ModelRequest {
    /// Create a new, empty request.
    #[must_use]
    pub fn new(input: Vec<InputItem>) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    /// Set the system instructions.
    #[must_use]
    pub fn system_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.system_instructions = Some(instructions.into());
        self
    }

    /// Set the model settings.
    #[must_use]
    pub fn model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = settings;
        self
    }

    /// Set the available tools.
    #[must_use]
    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the output schema.
    #[must_use]
    pub fn output_type(mut self, schema: OutputSchema) -> Self {
        self.output_type = Some(schema);
        self
    }

    /// Set the handoff tool definitions.
    #[must_use]
    pub fn handoffs(mut self, handoffs: Vec<ToolDefinition>) -> Self {
        self.handoffs = handoffs;
        self
    }

    /// Set the previous response id.
    #[must_use]
    pub fn previous_response_id(mut self, id: impl Into<String>) -> Self {
        self.previous_response_id = Some(id.into());
        self
    }

    /// Set the prompt-template reference.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// All tool definitions a backend should advertise: function/hosted
    /// tools followed by handoffs.
    #[must_use]
    pub fn all_tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut all = self.tools.clone();
        all.extend(self.handoffs.iter().cloned());
        all
    }
}

/// One item of a [`ModelResponse`]'s output, in emission order.
///
/// Each variant carries its wire-level fields verbatim so a full round
/// trip back to an [`InputItem`](crate::message::InputItem) is lossless —
/// a backend that receives one of these back as part of a later request's
/// input should be able to reconstruct exactly what it originally sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ResponseOutputItem {
    /// A plain assistant message.
    Message {
        /// Backend-assigned item id.
        id: String,
        /// Always [`Role::Assistant`] in practice; carried explicitly so
        /// the variant stays self-describing.
        role: Role,
        /// Message text.
        text: String,
    },
    /// A function-tool call the model requested.
    FunctionCall {
        /// Backend-assigned item id.
        id: String,
        /// Id used to correlate this call with its eventual output.
        call_id: String,
        /// Name of the tool (or handoff) being invoked.
        name: String,
        /// Arguments, as the model produced them.
        arguments: Value,
    },
    /// A hosted file-search invocation.
    FileSearchCall {
        /// Backend-assigned item id.
        id: String,
        /// The queries issued to the file-search tool.
        queries: Vec<String>,
        /// Search results, if the backend returns them inline.
        #[serde(skip_serializing_if = "Option::is_none")]
        results: Option<Value>,
    },
    /// A hosted web-search invocation.
    WebSearchCall {
        /// Backend-assigned item id.
        id: String,
        /// The query issued to the web-search tool, if disclosed.
        #[serde(skip_serializing_if = "Option::is_none")]
        query: Option<String>,
    },
    /// A hosted computer-use action.
    ComputerCall {
        /// Backend-assigned item id.
        id: String,
        /// Id used to correlate this call with its eventual output.
        call_id: String,
        /// The action payload (click, type, scroll, ...), backend-specific.
        action: Value,
    },
    /// A reasoning block, passed through unchanged.
    Reasoning {
        /// Backend-assigned item id.
        id: String,
        /// Opaque, backend-specific reasoning payload.
        content: Value,
    },
    /// The model refused to produce the requested output.
    Refusal {
        /// Backend-assigned item id.
        id: String,
        /// Human-readable refusal text.
        refusal: String,
    },
    /// A hosted image-generation invocation.
    ImageGeneration {
        /// Backend-assigned item id.
        id: String,
        /// The generated image result, backend-specific.
        result: Value,
    },
    /// A hosted code-interpreter invocation.
    CodeInterpreter {
        /// Backend-assigned item id.
        id: String,
        /// Id used to correlate this call with its eventual output.
        call_id: String,
        /// The code that was executed.
        code: String,
        /// Execution result, if the backend returns it inline.
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    /// A tool call routed through an MCP server.
    McpCall {
        /// Backend-assigned item id.
        id: String,
        /// Id used to correlate this call with its eventual output.
        call_id: String,
        /// Name of the MCP server the call was routed to.
        server: String,
        /// Name of the tool invoked on that server.
        name: String,
        /// Arguments, as the model produced them.
        arguments: Value,
        /// The tool's output, if the backend returns it inline.
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
}

impl ResponseOutputItem {
    /// The backend-assigned id of this item, present on every variant.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Message { id, .. }
            | Self::FunctionCall { id, .. }
            | Self::FileSearchCall { id, .. }
            | Self::WebSearchCall { id, .. }
            | Self::ComputerCall { id, .. }
            | Self::Reasoning { id, .. }
            | Self::Refusal { id, .. }
            | Self::ImageGeneration { id, .. }
            | Self::CodeInterpreter { id, .. }
            | Self::McpCall { id, .. } => id,
        }
    }

    /// Returns the message text if this is a [`Self::Message`].
    #[must_use]
    pub fn as_message_text(&self) -> Option<&str> {
        match self {
            Self::Message { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Returns `(call_id, name, arguments)` if this is a [`Self::FunctionCall`].
    #[must_use]
    pub fn as_function_call(&self) -> Option<(&str, &str, &Value)> {
        match self {
            Self::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            } => Some((call_id, name, arguments)),
            _ => None,
        }
    }
}

/// A model's full response to one [`ModelRequest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Output items, in the order the model produced them.
    pub output: Vec<ResponseOutputItem>,
    /// Token usage for this one call.
    pub usage: Usage,
    /// Backend-assigned id for this response.
    pub response_id: String,
}

impl ModelResponse {
    /// Create a response from a single text message.
    #[must_use]
    pub fn from_text(response_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            output: vec![ResponseOutputItem::Message {
                id: format!("msg_{}", uuid::Uuid::new_v4()),
                role: Role::Assistant,
                text: text.into(),
            }],
            usage: Usage::zero(),
            response_id: response_id.into(),
        }
    }

    /// Set the usage for this response.
    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Returns `true` if any output item is a function call.
    #[must_use]
    pub fn has_function_calls(&self) -> bool {
        self.output
            .iter()
            .any(|item| matches!(item, ResponseOutputItem::FunctionCall { .. }))
    }

    /// The concatenated text of every [`ResponseOutputItem::Message`] item,
    /// in emission order, joined with no separator. Prefer
    /// [`ProcessedResponse`](crate::processor::ProcessedResponse) for
    /// tie-break-aware access to the final message.
    #[must_use]
    pub fn text(&self) -> String {
        self.output
            .iter()
            .filter_map(ResponseOutputItem::as_message_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// An incremental event emitted by [`Model::stream_response`].
///
/// A well-behaved backend emits `Created` first and a terminal `Completed`
/// (carrying the full reconstructed [`ModelResponse`] and final usage)
/// last; a stream that ends without `Completed` is a model-behavior error
/// per the turn driver's contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ModelEvent {
    /// The backend has accepted the request and begun generating.
    Created,
    /// An incremental chunk of message text for the item named `item_id`.
    OutputTextDelta {
        /// Id of the in-progress output item this delta belongs to.
        item_id: String,
        /// The incremental text.
        delta: String,
    },
    /// A new output item has started.
    OutputItemAdded {
        /// The item as known so far (may be incomplete).
        item: ResponseOutputItem,
    },
    /// An output item has finished; `item` is now complete.
    OutputItemDone {
        /// The completed item.
        item: ResponseOutputItem,
    },
    /// An incremental chunk of a reasoning summary.
    ReasoningSummaryDelta {
        /// Id of the in-progress reasoning item this delta belongs to.
        item_id: String,
        /// The incremental text.
        delta: String,
    },
    /// The response is complete.
    Completed {
        /// The full response, including final usage.
        response: ModelResponse,
    },
    /// The backend encountered an error mid-stream.
    Error {
        /// Human-readable error message.
        message: String,
    },
}

/// External interface to a language model backend.
///
/// This is the seam the turn driver calls through on every step; no
/// concrete chat-completions or responses-API backend ships in this
/// crate — callers bring their own implementation (OpenAI, Anthropic, a
/// local server, or a test double) as `Arc<dyn Model>`.
#[async_trait]
pub trait Model: Send + Sync {
    /// Call the model and wait for its full response.
    async fn get_response(&self, request: &ModelRequest) -> Result<ModelResponse>;

    /// Call the model and stream its response incrementally.
    ///
    /// The default implementation returns a [`Error::ModelBehaviorError`];
    /// override it (and [`Self::supports_streaming`]) for a backend that
    /// actually supports streaming.
    async fn stream_response(
        &self,
        _request: &ModelRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<ModelEvent>> + Send>>> {
        Err(Error::model_behavior(format!(
            "{} does not support streaming",
            self.provider_name()
        )))
    }

    /// A human-readable name for this backend, used in tracing and error
    /// messages.
    fn provider_name(&self) -> &'static str;

    /// The model identifier to use when the agent and run config don't
    /// specify one.
    fn default_model(&self) -> &str;

    /// Whether [`Self::stream_response`] is actually implemented.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Whether this backend accepts tool definitions at all.
    fn supports_tools(&self) -> bool {
        true
    }

    /// Whether this backend accepts image content.
    fn supports_vision(&self) -> bool {
        false
    }

    /// Whether this backend supports constrained JSON output.
    fn supports_json_mode(&self) -> bool {
        false
    }
}

/// A shared [`Model`] trait object.
pub type SharedModel = std::sync::Arc<dyn Model>;

/// Resolves a model name to a concrete [`Model`] instance.
///
/// The turn driver calls this last, after a run-config override and the
/// agent's own `model` field have both had a chance to name a model: see
/// the resolution order in the runner's turn-preparation step.
pub trait ModelProvider: Send + Sync {
    /// Resolve `name` to a model instance, or the provider's own default
    /// when `name` is `None`.
    fn get_model(&self, name: Option<&str>) -> Result<SharedModel>;
}

/// A [`ModelProvider`] backed by a single [`Model`], returned regardless of
/// the requested name.
///
/// This is the common case: one backend (one API key, one client) serving
/// every model string the backend itself understands.
#[derive(Clone)]
pub struct SingleModelProvider(SharedModel);

impl SingleModelProvider {
    /// Wrap a single model as a provider.
    #[must_use]
    pub const fn new(model: SharedModel) -> Self {
        Self(model)
    }
}

impl ModelProvider for SingleModelProvider {
    fn get_model(&self, _name: Option<&str>) -> Result<SharedModel> {
        Ok(std::sync::Arc::clone(&self.0))
    }
}

/// A shared [`ModelProvider`] trait object.
pub type SharedModelProvider = std::sync::Arc<dyn ModelProvider>;

/// A scriptable [`Model`] double for exercising the turn loop without a
/// real backend.
///
/// Exposed outside `#[cfg(test)]` (gated on the `test-support` feature)
/// so integration tests in `tests/` can script the exact seed scenarios
/// the turn loop is expected to satisfy.
#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{Model, ModelRequest, ModelResponse, Result};

    /// A [`Model`] that plays back a fixed sequence of responses, one per
    /// call to [`Model::get_response`], regardless of request content.
    ///
    /// Panics (via an internal error) if called more times than it has
    /// scripted responses — a scenario asking for more turns than it
    /// scripted is a test bug, not something to paper over.
    #[derive(Debug)]
    pub struct ScriptedModel {
        responses: Mutex<std::collections::VecDeque<ModelResponse>>,
        requests: Mutex<Vec<ModelRequest>>,
    }

    impl ScriptedModel {
        /// Create a model that returns `responses` in order, one per call.
        #[must_use]
        pub fn new(responses: Vec<ModelResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// The requests this model has received so far, in call order.
        #[must_use]
        pub fn requests(&self) -> Vec<ModelRequest> {
            self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        /// The number of calls made so far.
        #[must_use]
        pub fn call_count(&self) -> usize {
            self.requests().len()
        }
    }

    #[async_trait]
    impl Model for ScriptedModel {
        async fn get_response(&self, request: &ModelRequest) -> Result<ModelResponse> {
            self.requests
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(request.clone());
            self.responses
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front()
                .ok_or_else(|| {
                    super::Error::model_behavior("ScriptedModel ran out of scripted responses")
                })
        }

        async fn stream_response(
            &self,
            request: &ModelRequest,
        ) -> Result<std::pin::Pin<Box<dyn futures::Stream<Item = Result<super::ModelEvent>> + Send>>> {
            let response = self.get_response(request).await?;
            let stream = async_stream::stream! {
                yield Ok(super::ModelEvent::Created);
                yield Ok(super::ModelEvent::Completed { response });
            };
            Ok(Box::pin(stream))
        }

        fn provider_name(&self) -> &'static str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }

        fn supports_streaming(&self) -> bool {
            true
        }
    }
}
