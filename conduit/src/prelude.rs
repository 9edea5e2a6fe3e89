//! Prelude module for convenient imports.
//!
//! Re-exports the most commonly used types and traits so you can get
//! started with a single `use` statement.
//!
//! ```rust,ignore
//! use conduit::prelude::*;
//! use std::sync::Arc;
//!
//! let agent: AgentRef = Arc::new(
//!     Agent::new("assistant")
//!         .instructions("You are helpful.")
//!         .model("gpt-4o"),
//! );
//!
//! let runner = Runner::new(provider);
//! let result = runner.run(agent, "Hello!", &RunConfig::default()).await?;
//! ```

pub use crate::agent::{
    Agent, AgentRef, AlwaysDenyHandler, AutoApproveHandler, BoxedConfirmationHandler, BoxedTool,
    ConfirmationHandler, DEFAULT_MAX_TURNS, FunctionToolResult, Handoff, HandoffEnabler,
    HandoffInputData, HandoffInputFilter, Instructions, ModelSettings, OutputSchema,
    SharedConfirmationHandler, Tool, ToolConfirmationRequest, ToolConfirmationResponse,
    ToolDefinition, ToolError, ToolExecutionPolicy, ToolsToFinalOutputBehavior, ToolsToFinalOutputFn,
    ToolsToFinalOutputResult,
};
pub use crate::callback::{
    AgentHooks, BoxedAgentHooks, BoxedRunHooks, NoopAgentHooks, NoopRunHooks, RunContext,
    RunHooks, SharedAgentHooks, SharedRunHooks,
};
pub use crate::error::{Error, Result};
pub use crate::executor::{execute_side_effects, ExecutionResult, NextStep};
pub use crate::guardrail::{
    GuardrailOutput, InputGuardrail, InputGuardrailCheck, InputGuardrailResult, OutputGuardrail,
    OutputGuardrailCheck, OutputGuardrailResult,
};
pub use crate::mcp::{Mcp, ToolFilter};
pub use crate::message::{to_input_list, Content, Input, InputItem, Message, Role, RunItem, ToolCall};
pub use crate::model::{
    Model, ModelEvent, ModelProvider, ModelRequest, ModelResponse, ReasoningEffort,
    ResponseOutputItem, SharedModel, SharedModelProvider, SingleModelProvider, ToolChoice,
};
pub use crate::processor::{process_response, McpToolCall, ProcessedResponse};
pub use crate::runner::{RunConfig, RunResult, Runner};
pub use crate::session::{BoxedSession, InMemorySession, Session, SharedSession};
pub use crate::stream::{RunResultStreaming, RunStreamEvent};
pub use crate::trace::{NoopSpan, NoopTracer, SharedTracer, Span, TraceContext, Tracer};
pub use crate::usage::{SharedUsage, Usage, UsageTracker};

#[cfg(feature = "schema")]
pub use crate::model::generate_json_schema;

#[cfg(any(test, feature = "test-support"))]
pub use crate::model::mock::ScriptedModel;
