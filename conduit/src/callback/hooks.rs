//! Core hook traits for agent lifecycle callbacks.
//!
//! This module defines two async trait hierarchies forming a dual-layer
//! hooks pattern:
//!
//! - [`RunHooks`]: Global run-level hooks that observe **all** agents in a run.
//! - [`AgentHooks`]: Per-agent hooks bound to a specific agent instance.
//!
//! Both traits use `async_trait` for object safety (`dyn RunHooks`, `dyn AgentHooks`)
//! and provide default no-op implementations for every method, so users only need
//! to override the events they care about.
//!
//! # Lifecycle Events
//!
//! 1. **`on_agent_start`** — agent begins execution
//! 2. **Step loop** (repeats until done):
//!    - `on_llm_start` → *LLM call* → `on_llm_end`
//!    - `on_tool_start` → *tool execution* → `on_tool_end`
//! 3. **`on_agent_end`** — agent produces final output, or **`on_error`** on failure

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Error;
use crate::message::InputItem;
use crate::model::ModelResponse;

use super::context::RunContext;

/// A boxed, thread-safe [`RunHooks`] trait object.
pub type BoxedRunHooks = Box<dyn RunHooks>;

/// A shared, thread-safe [`RunHooks`] trait object.
pub type SharedRunHooks = std::sync::Arc<dyn RunHooks>;

/// A boxed, thread-safe [`AgentHooks`] trait object.
pub type BoxedAgentHooks = Box<dyn AgentHooks>;

/// A shared, thread-safe [`AgentHooks`] trait object.
pub type SharedAgentHooks = std::sync::Arc<dyn AgentHooks>;

/// Global run-level lifecycle hooks.
///
/// Implementations of this trait observe **all** agents within a single run.
/// Every method receives the agent name so listeners can distinguish between
/// agents in multi-agent scenarios.
///
/// All methods have default no-op implementations, allowing users to override
/// only the events they need.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `Box<dyn RunHooks>` or
/// `Arc<dyn RunHooks>`.
#[async_trait]
pub trait RunHooks: Send + Sync {
    /// Called before the agent begins execution.
    async fn on_agent_start(&self, _ctx: &RunContext, _agent_name: &str) {}

    /// Called after the agent produces a final output.
    async fn on_agent_end(&self, _ctx: &RunContext, _agent_name: &str, _output: &Value) {}

    /// Called just before invoking the LLM.
    ///
    /// `system_prompt` is the current system prompt (if any), and `input`
    /// is the full input list assembled for this call.
    async fn on_llm_start(
        &self,
        _ctx: &RunContext,
        _agent_name: &str,
        _system_prompt: Option<&str>,
        _input: &[InputItem],
    ) {
    }

    /// Called immediately after the LLM returns a response.
    async fn on_llm_end(&self, _ctx: &RunContext, _agent_name: &str, _response: &ModelResponse) {}

    /// Called immediately before a tool is invoked.
    async fn on_tool_start(&self, _ctx: &RunContext, _agent_name: &str, _tool_name: &str) {}

    /// Called immediately after a tool completes.
    ///
    /// `result` contains the tool output as a string (success or error message).
    async fn on_tool_end(
        &self,
        _ctx: &RunContext,
        _agent_name: &str,
        _tool_name: &str,
        _result: &str,
    ) {
    }

    /// Called when control is handed off from one agent to another.
    ///
    /// This is a forward-looking hook for multi-agent orchestration.
    async fn on_handoff(&self, _ctx: &RunContext, _from_agent: &str, _to_agent: &str) {}

    /// Called when an error occurs during the agent run.
    async fn on_error(&self, _ctx: &RunContext, _agent_name: &str, _error: &Error) {}
}

/// Per-agent lifecycle hooks.
///
/// Implementations of this trait are bound to a specific agent instance and
/// only receive events for that agent. Unlike [`RunHooks`], the agent name
/// is implicit (the bound agent) and not passed as a parameter.
///
/// All methods have default no-op implementations.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `Box<dyn AgentHooks>` or
/// `Arc<dyn AgentHooks>`.
#[async_trait]
pub trait AgentHooks: Send + Sync {
    /// Called before this agent begins execution.
    async fn on_start(&self, _ctx: &RunContext) {}

    /// Called after this agent produces a final output.
    async fn on_end(&self, _ctx: &RunContext, _output: &Value) {}

    /// Called just before invoking the LLM for this agent.
    async fn on_llm_start(
        &self,
        _ctx: &RunContext,
        _system_prompt: Option<&str>,
        _input: &[InputItem],
    ) {
    }

    /// Called immediately after the LLM returns a response for this agent.
    async fn on_llm_end(&self, _ctx: &RunContext, _response: &ModelResponse) {}

    /// Called immediately before a tool is invoked by this agent.
    async fn on_tool_start(&self, _ctx: &RunContext, _tool_name: &str) {}

    /// Called immediately after a tool completes for this agent.
    async fn on_tool_end(&self, _ctx: &RunContext, _tool_name: &str, _result: &str) {}

    /// Called when this agent hands off control to another agent.
    async fn on_handoff(&self, _ctx: &RunContext, _to_agent: &str) {}

    /// Called when an error occurs during this agent's execution.
    async fn on_error(&self, _ctx: &RunContext, _error: &Error) {}
}
