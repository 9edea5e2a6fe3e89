//! The agent data model: `Agent`, its tools, handoffs, and settings.
//!
//! An [`Agent`] is a configuration value, not a running thing — it pairs
//! instructions and a model with the tools, handoffs, and guardrails the
//! turn driver (`runner`) consults on every step. Agents are immutable once
//! built and are shared across concurrent turns via [`AgentRef`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error as ThisError;

use crate::callback::{RunContext, SharedAgentHooks};
use crate::guardrail::{InputGuardrail, OutputGuardrail};
use crate::mcp::Mcp;
use crate::message::{Input, RunItem};
use crate::model::{ReasoningEffort, ToolChoice};

/// A shared, reference-counted handle to an [`Agent`].
///
/// Agents are never copied; only this pointer is copied, on a handoff
/// transition or when a run-item records which agent produced it.
pub type AgentRef = Arc<Agent>;

/// Default turn budget for a run, used when `RunConfig::max_turns` is unset.
pub const DEFAULT_MAX_TURNS: usize = 10;

/// An agent's instructions (system prompt), either fixed or computed per-run.
#[derive(Clone)]
pub enum Instructions {
    /// A fixed instructions string.
    Static(String),
    /// Instructions computed from the current run context, evaluated once
    /// per turn before the model call.
    Dynamic(Arc<dyn Fn(&RunContext) -> BoxFuture<'static, String> + Send + Sync>),
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(s) => f.debug_tuple("Static").field(s).finish(),
            Self::Dynamic(_) => f.debug_tuple("Dynamic").field(&"<fn>").finish(),
        }
    }
}

impl From<&str> for Instructions {
    fn from(value: &str) -> Self {
        Self::Static(value.to_owned())
    }
}

impl From<String> for Instructions {
    fn from(value: String) -> Self {
        Self::Static(value)
    }
}

/// A JSON-schema-backed structured output type requested from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSchema {
    /// Schema name, surfaced to the model.
    pub name: String,
    /// The JSON Schema itself.
    pub schema: Value,
    /// Whether to request strict schema conformance.
    pub strict: bool,
}

impl OutputSchema {
    /// Build an [`OutputSchema`] by deriving the JSON Schema from a Rust type.
    #[cfg(feature = "schema")]
    #[must_use]
    pub fn from_type<T: schemars::JsonSchema>() -> Self {
        let (name, schema) = crate::model::generate_json_schema::<T>();
        Self {
            name,
            schema,
            strict: true,
        }
    }

    /// Returns `true` if `value` conforms to this schema.
    ///
    /// When `strict` is set, conformance additionally requires that an
    /// object instance carry no properties outside the schema's own
    /// `properties` map, even if the schema itself omits an explicit
    /// `additionalProperties: false` — matching the stricter guarantee
    /// strict tool schemas promise the model.
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        let Ok(validator) = jsonschema::validator_for(&self.schema) else {
            return false;
        };
        if !validator.is_valid(value) {
            return false;
        }
        if self.strict {
            if let (Value::Object(instance_props), Some(schema_props)) = (
                value,
                self.schema.get("properties").and_then(Value::as_object),
            ) {
                if instance_props.keys().any(|k| !schema_props.contains_key(k)) {
                    return false;
                }
            }
        }
        true
    }
}

/// Per-call model parameters.
///
/// Lives on [`Agent`] as the default, and may be overridden per-field by
/// `RunConfig::model_settings` — unset (`None`) fields on the override
/// inherit from the agent's settings (see [`ModelSettings::merge`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Whether tool calls may run in parallel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    /// How the model should choose whether/which tool to call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Truncation strategy identifier, passed through to the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation: Option<String>,
    /// Whether to ask the model backend to store the completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,
    /// Reasoning effort for reasoning-capable models.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Arbitrary metadata passed through to the model backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
    /// Extra HTTP headers a concrete `Model` implementation may attach.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
    /// Extra query parameters a concrete `Model` implementation may attach.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_query: Option<HashMap<String, String>>,
}

impl ModelSettings {
    /// Merge an override on top of these settings.
    ///
    /// Every field set (`Some`) on `override_settings` wins; unset fields
    /// fall back to `self`. Used to apply `RunConfig::model_settings` on top
    /// of an agent's own settings.
    #[must_use]
    pub fn merge(&self, override_settings: &Self) -> Self {
        Self {
            temperature: override_settings.temperature.or(self.temperature),
            top_p: override_settings.top_p.or(self.top_p),
            max_tokens: override_settings.max_tokens.or(self.max_tokens),
            parallel_tool_calls: override_settings
                .parallel_tool_calls
                .or(self.parallel_tool_calls),
            tool_choice: override_settings
                .tool_choice
                .clone()
                .or_else(|| self.tool_choice.clone()),
            truncation: override_settings
                .truncation
                .clone()
                .or_else(|| self.truncation.clone()),
            store: override_settings.store.or(self.store),
            reasoning_effort: override_settings.reasoning_effort.or(self.reasoning_effort),
            metadata: override_settings
                .metadata
                .clone()
                .or_else(|| self.metadata.clone()),
            extra_headers: override_settings
                .extra_headers
                .clone()
                .or_else(|| self.extra_headers.clone()),
            extra_query: override_settings
                .extra_query
                .clone()
                .or_else(|| self.extra_query.clone()),
        }
    }
}

/// A JSON-schema-described tool the model may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool's name, as the model will refer to it.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON Schema describing the tool's arguments.
    pub parameters: Value,
}

/// Errors a tool implementation may raise during execution.
#[derive(Debug, ThisError)]
pub enum ToolError {
    /// The model supplied arguments that failed validation or parsing.
    #[error("invalid arguments for tool '{tool}': {message}")]
    InvalidArguments {
        /// Name of the tool that was called.
        tool: String,
        /// Description of what was wrong with the arguments.
        message: String,
    },
    /// The tool ran but failed.
    #[error("tool '{tool}' failed: {message}")]
    ExecutionFailed {
        /// Name of the tool that was called.
        tool: String,
        /// Description of the failure.
        message: String,
    },
}

/// A tool the model can invoke mid-turn.
///
/// Implement this on your own type and wrap it in [`BoxedTool`] to register
/// it on an [`Agent`]. Tool execution receives the current [`RunContext`] so
/// implementations can read accumulated usage or user-defined state.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's name, description, and argument schema.
    fn definition(&self) -> ToolDefinition;

    /// Invoke the tool with the model-supplied arguments.
    ///
    /// Returns the tool's output serialized as a string, which becomes the
    /// content of the corresponding `ToolCallOutputItem`.
    async fn call(&self, context: &RunContext, arguments: Value) -> Result<String, ToolError>;
}

/// A shared, thread-safe [`Tool`] trait object.
pub type BoxedTool = Arc<dyn Tool>;

/// Confirmation request presented to a [`ConfirmationHandler`] before a
/// gated tool call runs.
#[derive(Debug, Clone)]
pub struct ToolConfirmationRequest {
    /// Name of the tool about to be invoked.
    pub tool_name: String,
    /// The arguments the model supplied.
    pub arguments: Value,
}

/// A [`ConfirmationHandler`]'s decision about a pending tool call.
#[derive(Debug, Clone)]
pub struct ToolConfirmationResponse {
    /// Whether the call is approved to run.
    pub approved: bool,
    /// Optional human-readable reason, surfaced back to the model as the
    /// tool's output when denied.
    pub reason: Option<String>,
}

/// Decides whether a gated tool call is allowed to run.
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    /// Decide whether to approve the pending tool call.
    async fn confirm(&self, request: &ToolConfirmationRequest) -> ToolConfirmationResponse;
}

/// A [`ConfirmationHandler`] that approves every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApproveHandler;

#[async_trait]
impl ConfirmationHandler for AutoApproveHandler {
    async fn confirm(&self, _request: &ToolConfirmationRequest) -> ToolConfirmationResponse {
        ToolConfirmationResponse {
            approved: true,
            reason: None,
        }
    }
}

/// A [`ConfirmationHandler`] that denies every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDenyHandler;

#[async_trait]
impl ConfirmationHandler for AlwaysDenyHandler {
    async fn confirm(&self, _request: &ToolConfirmationRequest) -> ToolConfirmationResponse {
        ToolConfirmationResponse {
            approved: false,
            reason: Some("tool execution denied by policy".to_owned()),
        }
    }
}

/// A boxed [`ConfirmationHandler`] trait object.
pub type BoxedConfirmationHandler = Box<dyn ConfirmationHandler>;
/// A shared [`ConfirmationHandler`] trait object.
pub type SharedConfirmationHandler = Arc<dyn ConfirmationHandler>;

/// Governs whether tool calls may run unattended.
#[derive(Clone)]
pub enum ToolExecutionPolicy {
    /// Tool calls run without confirmation.
    Automatic,
    /// Every tool call is routed through a [`ConfirmationHandler`] first.
    RequireConfirmation(SharedConfirmationHandler),
}

impl Default for ToolExecutionPolicy {
    fn default() -> Self {
        Self::Automatic
    }
}

impl fmt::Debug for ToolExecutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => write!(f, "Automatic"),
            Self::RequireConfirmation(_) => write!(f, "RequireConfirmation(..)"),
        }
    }
}

/// The output of one function-tool call, handed to a
/// [`ToolsToFinalOutputFn`] so it can decide the next step.
#[derive(Debug, Clone)]
pub struct FunctionToolResult {
    /// Name of the tool that was called.
    pub tool_name: String,
    /// The id of the tool call this is the output of.
    pub call_id: String,
    /// The tool's output.
    pub output: String,
}

/// The decision a [`ToolsToFinalOutputFn`] makes about a batch of tool
/// results.
#[derive(Debug, Clone)]
pub struct ToolsToFinalOutputResult {
    /// Whether the batch of tool results should be treated as the run's
    /// final output.
    pub is_final_output: bool,
    /// The final output value, when `is_final_output` is `true`.
    pub final_output: Option<Value>,
}

/// A custom policy for converting tool results into a final-output decision.
pub trait ToolsToFinalOutputFn: Send + Sync {
    /// Decide whether this batch of tool results is the run's final output.
    fn call<'a>(
        &'a self,
        context: &'a RunContext,
        results: &'a [FunctionToolResult],
    ) -> BoxFuture<'a, ToolsToFinalOutputResult>;
}

/// Policy for converting function-tool results into a `NextStep`.
///
/// Drives step 2–3 of the `NextStep` decision rule in the turn driver.
#[derive(Clone)]
pub enum ToolsToFinalOutputBehavior {
    /// Feed tool outputs back to the model and run another turn (default).
    RunLlmAgain,
    /// Treat the first tool's output as the final output, skipping the
    /// extra model call.
    StopOnFirstTool,
    /// Delegate the decision to custom logic.
    Custom(Arc<dyn ToolsToFinalOutputFn>),
}

impl Default for ToolsToFinalOutputBehavior {
    fn default() -> Self {
        Self::RunLlmAgain
    }
}

impl fmt::Debug for ToolsToFinalOutputBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunLlmAgain => write!(f, "RunLlmAgain"),
            Self::StopOnFirstTool => write!(f, "StopOnFirstTool"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// The bundle passed through a handoff's input filter: everything the next
/// agent could see about the conversation so far.
#[derive(Debug, Clone)]
pub struct HandoffInputData {
    /// The original input the run started with.
    pub input_history: Input,
    /// Run items produced before the handoff was requested.
    pub pre_handoff_items: Vec<RunItem>,
    /// Run items produced by the turn that requested the handoff.
    pub new_items: Vec<RunItem>,
}

/// A function that transforms [`HandoffInputData`] before the next agent
/// sees it, e.g. to redact or summarize prior history.
pub type HandoffInputFilter =
    Arc<dyn Fn(HandoffInputData) -> Result<HandoffInputData, crate::error::Error> + Send + Sync>;

/// A predicate deciding whether a [`Handoff`] is offered to the model this
/// turn, evaluated fresh against the current [`RunContext`] before every
/// turn's tool list is built.
pub type HandoffEnabler = Arc<dyn Fn(&RunContext) -> BoxFuture<'static, bool> + Send + Sync>;

/// A handoff target: another agent this agent may transfer control to.
///
/// Handoffs are surfaced to the model as regular tools; invoking one swaps
/// the current-agent pointer rather than making a recursive, summarized
/// sub-call.
#[derive(Clone)]
pub struct Handoff {
    /// The agent control is transferred to.
    pub target: AgentRef,
    /// Overrides the tool name surfaced to the model (defaults to
    /// `transfer_to_<target.name>`).
    pub tool_name_override: Option<String>,
    /// Overrides the tool description surfaced to the model.
    pub tool_description_override: Option<String>,
    /// A per-handoff input filter. Takes exclusive precedence over any
    /// global filter configured on `RunConfig` — the global filter only
    /// runs in this filter's absence, never as a fallback after an error.
    pub input_filter: Option<HandoffInputFilter>,
    /// Gates whether this handoff is offered to the model this turn.
    /// Absent means always enabled.
    pub enabler: Option<HandoffEnabler>,
}

impl Handoff {
    /// Create a handoff to the given target agent.
    #[must_use]
    pub fn new(target: AgentRef) -> Self {
        Self {
            target,
            tool_name_override: None,
            tool_description_override: None,
            input_filter: None,
            enabler: None,
        }
    }

    /// Override the tool name surfaced to the model.
    #[must_use]
    pub fn tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name_override = Some(name.into());
        self
    }

    /// Override the tool description surfaced to the model.
    #[must_use]
    pub fn tool_description(mut self, description: impl Into<String>) -> Self {
        self.tool_description_override = Some(description.into());
        self
    }

    /// Attach a per-handoff input filter.
    #[must_use]
    pub fn input_filter(mut self, filter: HandoffInputFilter) -> Self {
        self.input_filter = Some(filter);
        self
    }

    /// Gate this handoff behind a predicate evaluated every turn.
    #[must_use]
    pub fn enabled_when(
        mut self,
        enabler: impl Fn(&RunContext) -> BoxFuture<'static, bool> + Send + Sync + 'static,
    ) -> Self {
        self.enabler = Some(Arc::new(enabler));
        self
    }

    /// Evaluate whether this handoff is enabled for the current run context.
    /// A handoff with no enabler predicate is always enabled.
    pub async fn is_enabled(&self, context: &RunContext) -> bool {
        match &self.enabler {
            None => true,
            Some(enabler) => enabler(context).await,
        }
    }

    /// The tool name the model sees for this handoff.
    #[must_use]
    pub fn tool_name_str(&self) -> String {
        self.tool_name_override
            .clone()
            .unwrap_or_else(|| format!("transfer_to_{}", self.target.name))
    }

    /// The [`ToolDefinition`] this handoff is surfaced as.
    #[must_use]
    pub fn to_tool_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.tool_name_str(),
            description: self.tool_description_override.clone().unwrap_or_else(|| {
                format!("Transfer the conversation to the '{}' agent.", self.target.name)
            }),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false,
            }),
        }
    }
}

impl fmt::Debug for Handoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handoff")
            .field("target", &self.target.name)
            .field("tool_name_override", &self.tool_name_override)
            .finish_non_exhaustive()
    }
}

/// An agent: instructions, a model, and the tools/handoffs/guardrails it may
/// use while running.
///
/// `Agent` is built with a fluent, self-consuming builder (mirroring
/// `ChatRequest`) and is then wrapped in an [`AgentRef`] for sharing across
/// concurrent turns and handoffs.
#[derive(Clone)]
pub struct Agent {
    /// The agent's name, used in tracing, hook dispatch, and as the default
    /// handoff tool name.
    pub name: String,
    instructions: Option<Instructions>,
    /// Model identifier override (falls back to `RunConfig::model`, then the
    /// `Model` implementation's own default).
    pub model: Option<String>,
    /// Default model parameters for this agent.
    pub model_settings: ModelSettings,
    /// Tools this agent may call.
    pub tools: Vec<BoxedTool>,
    /// Execution policy applied to every tool call.
    pub tool_execution_policy: ToolExecutionPolicy,
    /// Policy for turning tool results into a final-output decision.
    pub tool_use_behavior: ToolsToFinalOutputBehavior,
    /// Whether `tool_choice` resets to `Auto` after a forced-tool turn, to
    /// avoid looping on the same forced tool indefinitely.
    pub reset_tool_choice: bool,
    /// Agents this agent may hand off control to.
    pub handoffs: Vec<Handoff>,
    /// Guardrails run against the input to this agent.
    pub input_guardrails: Vec<InputGuardrail>,
    /// Guardrails run against this agent's final output.
    pub output_guardrails: Vec<OutputGuardrail>,
    /// Structured output schema this agent is expected to produce.
    pub output_type: Option<OutputSchema>,
    /// Per-agent lifecycle hooks.
    pub hooks: Option<SharedAgentHooks>,
    /// MCP servers whose tools are merged into this agent's tool list.
    pub mcp_servers: Vec<Arc<dyn Mcp>>,
}

impl Agent {
    /// Create a new agent with the given name and no instructions, tools, or
    /// handoffs configured.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: None,
            model: None,
            model_settings: ModelSettings::default(),
            tools: Vec::new(),
            tool_execution_policy: ToolExecutionPolicy::default(),
            tool_use_behavior: ToolsToFinalOutputBehavior::default(),
            reset_tool_choice: true,
            handoffs: Vec::new(),
            input_guardrails: Vec::new(),
            output_guardrails: Vec::new(),
            output_type: None,
            hooks: None,
            mcp_servers: Vec::new(),
        }
    }

    /// Set static instructions (the system prompt).
    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<Instructions>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Set instructions computed dynamically from the run context.
    #[must_use]
    pub fn instructions_fn(
        mut self,
        f: impl Fn(&RunContext) -> BoxFuture<'static, String> + Send + Sync + 'static,
    ) -> Self {
        self.instructions = Some(Instructions::Dynamic(Arc::new(f)));
        self
    }

    /// Override the model identifier for this agent.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the default model parameters for this agent.
    #[must_use]
    pub fn model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = settings;
        self
    }

    /// Register a tool.
    #[must_use]
    pub fn tool(mut self, tool: BoxedTool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Replace the tool list.
    #[must_use]
    pub fn tools(mut self, tools: Vec<BoxedTool>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the tool execution policy.
    #[must_use]
    pub fn tool_execution_policy(mut self, policy: ToolExecutionPolicy) -> Self {
        self.tool_execution_policy = policy;
        self
    }

    /// Set the tool-use behavior.
    #[must_use]
    pub fn tool_use_behavior(mut self, behavior: ToolsToFinalOutputBehavior) -> Self {
        self.tool_use_behavior = behavior;
        self
    }

    /// Set whether tool choice resets to `Auto` after a forced-tool turn.
    #[must_use]
    pub const fn reset_tool_choice(mut self, reset: bool) -> Self {
        self.reset_tool_choice = reset;
        self
    }

    /// Register a handoff target.
    #[must_use]
    pub fn handoff(mut self, handoff: Handoff) -> Self {
        self.handoffs.push(handoff);
        self
    }

    /// Replace the handoff list.
    #[must_use]
    pub fn handoffs(mut self, handoffs: Vec<Handoff>) -> Self {
        self.handoffs = handoffs;
        self
    }

    /// Register an input guardrail.
    #[must_use]
    pub fn input_guardrail(mut self, guardrail: InputGuardrail) -> Self {
        self.input_guardrails.push(guardrail);
        self
    }

    /// Register an output guardrail.
    #[must_use]
    pub fn output_guardrail(mut self, guardrail: OutputGuardrail) -> Self {
        self.output_guardrails.push(guardrail);
        self
    }

    /// Request a structured output schema derived from a Rust type.
    #[cfg(feature = "schema")]
    #[must_use]
    pub fn output_type<T: schemars::JsonSchema>(mut self) -> Self {
        self.output_type = Some(OutputSchema::from_type::<T>());
        self
    }

    /// Attach per-agent lifecycle hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: SharedAgentHooks) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Register an MCP server whose tools are merged into this agent's.
    #[must_use]
    pub fn mcp_server(mut self, server: Arc<dyn Mcp>) -> Self {
        self.mcp_servers.push(server);
        self
    }

    /// Resolve this agent's instructions for the current run context.
    ///
    /// Returns `None` when no instructions are configured (the model is
    /// called with no system prompt).
    pub async fn resolve_instructions(&self, context: &RunContext) -> Option<String> {
        match &self.instructions {
            None => None,
            Some(Instructions::Static(text)) => Some(text.clone()),
            Some(Instructions::Dynamic(f)) => Some(f(context).await),
        }
    }

    /// Find a registered tool by name.
    #[must_use]
    pub fn find_tool(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.iter().find(|t| t.definition().name == name)
    }

    /// Find a registered handoff by its surfaced tool name.
    #[must_use]
    pub fn find_handoff(&self, tool_name: &str) -> Option<&Handoff> {
        self.handoffs.iter().find(|h| h.tool_name_str() == tool_name)
    }

    /// Resolve which of this agent's handoffs are enabled for the current
    /// run context, running every enabler predicate concurrently.
    pub async fn resolve_enabled_handoffs(&self, context: &RunContext) -> Vec<Handoff> {
        let checks = self.handoffs.iter().map(|h| h.is_enabled(context));
        let enabled = join_all(checks).await;
        self.handoffs
            .iter()
            .zip(enabled)
            .filter_map(|(handoff, is_enabled)| is_enabled.then(|| handoff.clone()))
            .collect()
    }

    /// All tool definitions this agent exposes to the model, including
    /// handoffs (surfaced as tools) but excluding MCP-provided tools, which
    /// are resolved asynchronously by the turn driver.
    #[must_use]
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.iter().map(|t| t.definition()).collect();
        defs.extend(self.handoffs.iter().map(Handoff::to_tool_definition));
        defs
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.tools.len())
            .field("handoffs", &self.handoffs.len())
            .finish_non_exhaustive()
    }
}
